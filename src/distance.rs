//! # Distance Sampling
//!
//! Converts echo pulse widths into distances. Sound travels to the object and
//! back, so the one-way distance is half of `duration × speed of sound`.

use crate::pulse::{Clock, EchoLine, MeasurementError, PulseTimer, TriggerLine};
use crate::DistanceReading;
use std::time::Duration;

/// Speed of sound in air at ~20 °C, in centimeters per second
pub const SPEED_OF_SOUND_CM_PER_S: f64 = 34_300.0;

/// Convert a round-trip echo duration into a one-way distance.
///
/// ```
/// use proximity_cam_lib::distance::compute_distance;
/// use std::time::Duration;
///
/// let reading = compute_distance(Duration::from_millis(10));
/// assert!((reading.centimeters() - 171.5).abs() < 1e-9);
/// ```
pub fn compute_distance(duration: Duration) -> DistanceReading {
    DistanceReading::new(duration.as_secs_f64() * SPEED_OF_SOUND_CM_PER_S / 2.0)
}

/// Echo width an object at `centimeters` produces (inverse of [`compute_distance`]).
pub fn echo_duration_for(centimeters: f64) -> Duration {
    Duration::from_secs_f64(centimeters.max(0.0) * 2.0 / SPEED_OF_SOUND_CM_PER_S)
}

/// Anything that can produce one distance reading per cycle.
pub trait DistanceSource {
    fn sample(&mut self) -> Result<DistanceReading, MeasurementError>;
}

impl<S: DistanceSource + ?Sized> DistanceSource for Box<S> {
    fn sample(&mut self) -> Result<DistanceReading, MeasurementError> {
        (**self).sample()
    }
}

/// Ultrasonic distance sampler: a [`PulseTimer`] plus the conversion above.
///
/// A timed-out echo is reported as an error, never as a zero or infinite
/// distance.
pub struct DistanceSampler<T, E, C> {
    timer: PulseTimer<T, E, C>,
}

impl<T: TriggerLine, E: EchoLine, C: Clock> DistanceSampler<T, E, C> {
    pub fn new(timer: PulseTimer<T, E, C>) -> Self {
        Self { timer }
    }
}

impl<T: TriggerLine, E: EchoLine, C: Clock> DistanceSource for DistanceSampler<T, E, C> {
    fn sample(&mut self) -> Result<DistanceReading, MeasurementError> {
        let duration = self.timer.measure_echo_duration()?;
        Ok(compute_distance(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pulse::sim::{SimulatedSensor, SteppingClock};

    #[test]
    fn distance_is_half_the_round_trip() {
        assert_eq!(compute_distance(Duration::ZERO).centimeters(), 0.0);
        let one_second = compute_distance(Duration::from_secs(1)).centimeters();
        assert!((one_second - 17_150.0).abs() < 1e-9);

        for micros in [58, 1_000, 5_831, 8_746, 23_323] {
            let d = Duration::from_micros(micros);
            let expected = d.as_secs_f64() * 17_150.0;
            assert!((compute_distance(d).centimeters() - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn distance_is_monotonic_in_duration() {
        let mut previous = compute_distance(Duration::ZERO);
        for micros in (0..30_000).step_by(37) {
            let current = compute_distance(Duration::from_micros(micros));
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn echo_duration_inverts_compute_distance() {
        for cm in [2.0, 50.0, 149.99, 150.0, 400.0] {
            let back = compute_distance(echo_duration_for(cm)).centimeters();
            assert!((back - cm).abs() < 1e-4, "{cm} -> {back}");
        }
    }

    #[test]
    fn sampler_reads_simulated_distance() {
        let clock = SteppingClock::new(Duration::from_micros(1));
        let sensor = SimulatedSensor::new(clock.clone());
        sensor.push_distance(140.0);

        let timer = PulseTimer::new(
            sensor.trigger(),
            sensor.echo(),
            clock,
            Duration::from_micros(10),
            Duration::from_millis(60),
        );
        let mut sampler = DistanceSampler::new(timer);

        let reading = sampler.sample().unwrap();
        assert!((reading.centimeters() - 140.0).abs() < 0.1, "{reading}");

        // nothing queued: a missing echo is an error, not a distance
        assert!(matches!(sampler.sample(), Err(MeasurementError::NoEcho { .. })));
    }
}
