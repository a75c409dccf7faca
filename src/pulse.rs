//! # Ultrasonic Pulse Timing
//!
//! Drives the sensor's trigger line and measures how long the echo line stays
//! asserted. This is the only timing-sensitive code in the pipeline.
//!
//! ## Measurement Sequence
//! 1. Trigger line low, then high for `trigger_pulse` (10 µs for an HC-SR04),
//!    then low again
//! 2. Poll the echo line until it goes high → start instant
//! 3. Poll the echo line until it goes low → end instant
//! 4. Return `end - start`
//!
//! Both polls are bounded by `echo_timeout`. A disconnected or miswired sensor
//! yields [`MeasurementError::NoEcho`] instead of hanging the monitor loop.
//!
//! The polls spin on the calling thread. They must run on a plain OS thread,
//! never on an async executor, or the measurement window gets interleaved with
//! other work.

use crate::config::SensorConfig;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;

/// GPIO access failure reported by a line implementation
#[derive(Error, Debug, Clone, PartialEq)]
#[error("GPIO line error: {0}")]
pub struct LineError(pub String);

/// Which echo edge the timer was waiting for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EchoPhase {
    /// Echo never asserted (nothing in range, sensor unplugged)
    Rise,
    /// Echo never released (line stuck high)
    Fall,
}

impl fmt::Display for EchoPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EchoPhase::Rise => write!(f, "rise"),
            EchoPhase::Fall => write!(f, "fall"),
        }
    }
}

/// A measurement that produced no usable pulse duration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeasurementError {
    #[error("no echo: line did not {phase} within {waited:?}")]
    NoEcho { phase: EchoPhase, waited: Duration },

    #[error(transparent)]
    Line(#[from] LineError),
}

/// Output line that starts an ultrasonic pulse
pub trait TriggerLine {
    fn set_high(&mut self) -> Result<(), LineError>;
    fn set_low(&mut self) -> Result<(), LineError>;
}

/// Input line whose active duration encodes the round-trip time
pub trait EchoLine {
    fn is_high(&self) -> Result<bool, LineError>;
}

/// Time source used for the trigger pulse and echo polling.
pub trait Clock {
    fn now(&self) -> Instant;
    /// Block for `duration` (used for the trigger pulse width)
    fn pause(&self, duration: Duration);
}

/// Wall clock backed by `Instant::now` and `thread::sleep`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn pause(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Poll `echo` until it reads `level`, returning the instant it was seen.
///
/// Gives up with [`MeasurementError::NoEcho`] once `timeout` has elapsed
/// since the first poll.
pub fn wait_for_level<E, C>(
    echo: &E,
    clock: &C,
    level: bool,
    phase: EchoPhase,
    timeout: Duration,
) -> Result<Instant, MeasurementError>
where
    E: EchoLine + ?Sized,
    C: Clock + ?Sized,
{
    let started = clock.now();
    loop {
        let now = clock.now();
        if echo.is_high()? == level {
            return Ok(now);
        }
        let waited = now.saturating_duration_since(started);
        if waited >= timeout {
            return Err(MeasurementError::NoEcho { phase, waited });
        }
        std::hint::spin_loop();
    }
}

/// Exclusive owner of the trigger/echo lines for the lifetime of the process.
pub struct PulseTimer<T, E, C> {
    trigger: T,
    echo: E,
    clock: C,
    trigger_pulse: Duration,
    echo_timeout: Duration,
}

impl<T: TriggerLine, E: EchoLine, C: Clock> PulseTimer<T, E, C> {
    pub fn new(
        trigger: T,
        echo: E,
        clock: C,
        trigger_pulse: Duration,
        echo_timeout: Duration,
    ) -> Self {
        Self {
            trigger,
            echo,
            clock,
            trigger_pulse,
            echo_timeout,
        }
    }

    pub fn from_config(trigger: T, echo: E, clock: C, config: &SensorConfig) -> Self {
        Self::new(
            trigger,
            echo,
            clock,
            config.trigger_pulse(),
            config.echo_timeout(),
        )
    }

    /// Fire one pulse and time the echo.
    pub fn measure_echo_duration(&mut self) -> Result<Duration, MeasurementError> {
        self.trigger.set_low()?;
        if let Err(e) = self.trigger.set_high() {
            let _ = self.trigger.set_low();
            return Err(e.into());
        }
        self.clock.pause(self.trigger_pulse);
        if let Err(e) = self.trigger.set_low() {
            // never leave the trigger driven high
            let _ = self.trigger.set_low();
            return Err(e.into());
        }

        let start = wait_for_level(
            &self.echo,
            &self.clock,
            true,
            EchoPhase::Rise,
            self.echo_timeout,
        )?;
        let end = wait_for_level(
            &self.echo,
            &self.clock,
            false,
            EchoPhase::Fall,
            self.echo_timeout,
        )?;

        Ok(end.saturating_duration_since(start))
    }

    pub fn echo_timeout(&self) -> Duration {
        self.echo_timeout
    }
}

/// Simulated sensor lines and clock for running the pipeline without hardware.
///
/// Everything here is single-threaded (`Rc`): the simulated trigger, echo and
/// clock share state the same way the physical sensor couples its two pins.
///
/// ```
/// use proximity_cam_lib::pulse::sim::{SimulatedSensor, SteppingClock};
/// use proximity_cam_lib::pulse::PulseTimer;
/// use std::time::Duration;
///
/// let clock = SteppingClock::new(Duration::from_micros(1));
/// let sensor = SimulatedSensor::new(clock.clone());
/// sensor.push_distance(100.0);
///
/// let mut timer = PulseTimer::new(
///     sensor.trigger(),
///     sensor.echo(),
///     clock,
///     Duration::from_micros(10),
///     Duration::from_millis(60),
/// );
/// let width = timer.measure_echo_duration().unwrap();
/// assert!((width.as_micros() as i64 - 5831).abs() < 5);
/// ```
pub mod sim {
    use super::{Clock, EchoLine, LineError, TriggerLine};
    use crate::distance::echo_duration_for;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    /// Typical HC-SR04 latency between trigger fall and echo rise
    pub const ECHO_DELAY: Duration = Duration::from_micros(500);

    /// Deterministic clock that advances by `step` on every `now()` call.
    #[derive(Clone, Debug)]
    pub struct SteppingClock {
        origin: Instant,
        elapsed: Rc<Cell<Duration>>,
        step: Duration,
    }

    impl SteppingClock {
        pub fn new(step: Duration) -> Self {
            Self {
                origin: Instant::now(),
                elapsed: Rc::new(Cell::new(Duration::ZERO)),
                step,
            }
        }

        /// Simulated time since creation, without advancing it
        pub fn elapsed(&self) -> Duration {
            self.elapsed.get()
        }
    }

    impl Clock for SteppingClock {
        fn now(&self) -> Instant {
            let t = self.elapsed.get();
            self.elapsed.set(t + self.step);
            self.origin + t
        }

        fn pause(&self, duration: Duration) {
            self.elapsed.set(self.elapsed.get() + duration);
        }
    }

    /// What the echo line does after a trigger pulse
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub enum EchoProfile {
        /// High for `width`, starting `delay` after the trigger falls
        Reflect { delay: Duration, width: Duration },
        /// Never goes high
        Silent,
        /// Goes high after `delay` and stays there
        StuckHigh { delay: Duration },
    }

    #[derive(Debug, Default)]
    struct SimState {
        queued: VecDeque<EchoProfile>,
        current: Option<EchoProfile>,
        fired_at: Option<Duration>,
        pulses: u32,
    }

    /// One simulated sensor. Each trigger pulse consumes the next queued
    /// [`EchoProfile`]; an empty queue behaves as [`EchoProfile::Silent`].
    #[derive(Clone, Debug)]
    pub struct SimulatedSensor {
        clock: SteppingClock,
        state: Rc<RefCell<SimState>>,
    }

    impl SimulatedSensor {
        pub fn new(clock: SteppingClock) -> Self {
            Self {
                clock,
                state: Rc::new(RefCell::new(SimState::default())),
            }
        }

        pub fn push(&self, profile: EchoProfile) {
            self.state.borrow_mut().queued.push_back(profile);
        }

        /// Queue an echo that decodes to `centimeters`
        pub fn push_distance(&self, centimeters: f64) {
            self.push(EchoProfile::Reflect {
                delay: ECHO_DELAY,
                width: echo_duration_for(centimeters),
            });
        }

        /// Number of completed trigger pulses
        pub fn pulses(&self) -> u32 {
            self.state.borrow().pulses
        }

        pub fn trigger(&self) -> SimTrigger {
            SimTrigger {
                sensor: self.clone(),
                high: false,
            }
        }

        pub fn echo(&self) -> SimEcho {
            SimEcho {
                sensor: self.clone(),
            }
        }

        fn fire(&self) {
            let mut state = self.state.borrow_mut();
            state.current = Some(state.queued.pop_front().unwrap_or(EchoProfile::Silent));
            state.fired_at = Some(self.clock.elapsed());
            state.pulses += 1;
        }
    }

    pub struct SimTrigger {
        sensor: SimulatedSensor,
        high: bool,
    }

    impl TriggerLine for SimTrigger {
        fn set_high(&mut self) -> Result<(), LineError> {
            self.high = true;
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), LineError> {
            // the sensor emits its burst on the falling edge
            if self.high {
                self.sensor.fire();
            }
            self.high = false;
            Ok(())
        }
    }

    pub struct SimEcho {
        sensor: SimulatedSensor,
    }

    impl EchoLine for SimEcho {
        fn is_high(&self) -> Result<bool, LineError> {
            let state = self.sensor.state.borrow();
            let (Some(fired_at), Some(profile)) = (state.fired_at, state.current) else {
                return Ok(false);
            };
            let since = self.sensor.clock.elapsed().saturating_sub(fired_at);
            Ok(match profile {
                EchoProfile::Reflect { delay, width } => since >= delay && since < delay + width,
                EchoProfile::Silent => false,
                EchoProfile::StuckHigh { delay } => since >= delay,
            })
        }
    }
}
