//! # Monitor Loop
//!
//! Drives the pipeline at a fixed cadence:
//!
//! 1. Sample a distance. On failure, report and skip to step 4
//! 2. Compare it with the threshold
//! 3. If detected, capture an image and upload it. A capture failure skips
//!    the upload for this cycle
//! 4. Sleep for the sampling interval and repeat
//!
//! Nothing that goes wrong inside a cycle stops the loop. Cycles never
//! overlap, so at most one capture-and-upload sequence is in flight.
//!
//! The loop stops when its [`StopSignal`] fires. The signal is only checked
//! between cycles (it interrupts the sleep), so a pulse measurement is never
//! cut short with the trigger line half-driven.

use crate::camera::{CaptureError, ImageProvider};
use crate::detector::ThresholdDetector;
use crate::distance::DistanceSource;
use crate::pulse::MeasurementError;
use crate::upload::{UploadError, UploadResponse, Uploader};
use crate::DistanceReading;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    /// Sampling, nothing detected
    Idle,
    /// Running capture + upload for the current cycle
    Acting,
}

/// What happened during one cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The sensor produced no reading
    NoReading(MeasurementError),
    /// Reading at or beyond the threshold
    Clear(DistanceReading),
    CaptureFailed {
        reading: DistanceReading,
        error: CaptureError,
    },
    UploadFailed {
        reading: DistanceReading,
        error: UploadError,
    },
    Uploaded {
        reading: DistanceReading,
        response: UploadResponse,
    },
}

impl CycleOutcome {
    /// True if the capture-and-upload sequence ran (whatever its result)
    pub fn triggered(&self) -> bool {
        matches!(
            self,
            CycleOutcome::CaptureFailed { .. }
                | CycleOutcome::UploadFailed { .. }
                | CycleOutcome::Uploaded { .. }
        )
    }

    pub fn reading(&self) -> Option<DistanceReading> {
        match self {
            CycleOutcome::NoReading(_) => None,
            CycleOutcome::Clear(reading)
            | CycleOutcome::CaptureFailed { reading, .. }
            | CycleOutcome::UploadFailed { reading, .. }
            | CycleOutcome::Uploaded { reading, .. } => Some(*reading),
        }
    }
}

/// Running counters, reported when the loop stops.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub cycles: u64,
    pub readings: u64,
    pub measurement_failures: u64,
    pub detections: u64,
    pub capture_failures: u64,
    pub upload_failures: u64,
    pub uploads: u64,
}

/// Shared view of a loop's [`MonitorState`], readable from other components.
#[derive(Clone, Debug, Default)]
pub struct StateHandle(Arc<AtomicBool>);

impl StateHandle {
    pub fn get(&self) -> MonitorState {
        if self.0.load(Ordering::Acquire) {
            MonitorState::Acting
        } else {
            MonitorState::Idle
        }
    }

    fn set(&self, state: MonitorState) {
        self.0.store(state == MonitorState::Acting, Ordering::Release);
    }
}

/// Shutdown request shared by the monitor thread and the async side.
///
/// The [`CancellationToken`] is the source of truth; async tasks await it
/// directly. The condvar only wakes the monitor thread out of its interval
/// sleep, which cannot await.
#[derive(Clone, Debug, Default)]
pub struct StopSignal {
    token: CancellationToken,
    wake: Arc<(Mutex<()>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.token.cancel();
        let (lock, condvar) = &*self.wake;
        // taken so a waiter between its check and its wait cannot miss this
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        condvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token cancelled by [`StopSignal::stop`], for async consumers.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Sleep up to `timeout`; returns true if stopped before or during the wait.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (lock, condvar) = &*self.wake;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _ = condvar
            .wait_timeout_while(guard, timeout, |_| !self.token.is_cancelled())
            .unwrap_or_else(PoisonError::into_inner);
        self.token.is_cancelled()
    }
}

pub struct MonitorLoop<S, P, U> {
    source: S,
    detector: ThresholdDetector,
    camera: P,
    uploader: U,
    interval: Duration,
    state: StateHandle,
    stats: MonitorStats,
}

impl<S: DistanceSource, P: ImageProvider, U: Uploader> MonitorLoop<S, P, U> {
    pub fn new(
        source: S,
        detector: ThresholdDetector,
        camera: P,
        uploader: U,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            detector,
            camera,
            uploader,
            interval,
            state: StateHandle::default(),
            stats: MonitorStats::default(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state.get()
    }

    /// Handle that keeps tracking this loop's state while it runs
    pub fn state_handle(&self) -> StateHandle {
        self.state.clone()
    }

    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Run one sample → detect → act cycle, without the trailing sleep.
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.stats.cycles += 1;

        let reading = match self.source.sample() {
            Ok(reading) => reading,
            Err(error) => {
                self.stats.measurement_failures += 1;
                log::warn!("Distance measurement failed: {}", error);
                return CycleOutcome::NoReading(error);
            }
        };
        self.stats.readings += 1;
        log::info!("Distance: {}", reading);

        let event = self.detector.evaluate(reading);
        if !event.detected {
            return CycleOutcome::Clear(reading);
        }

        self.stats.detections += 1;
        self.state.set(MonitorState::Acting);
        log::info!(
            "Object detected within {:.0} cm. Taking picture...",
            self.detector.threshold_cm()
        );
        let outcome = self.capture_and_upload(reading);
        self.state.set(MonitorState::Idle);
        outcome
    }

    fn capture_and_upload(&mut self, reading: DistanceReading) -> CycleOutcome {
        let image = match self.camera.capture() {
            Ok(image) => image,
            Err(error) => {
                self.stats.capture_failures += 1;
                log::error!("Error taking picture: {}", error);
                return CycleOutcome::CaptureFailed { reading, error };
            }
        };

        log::info!("Sending image to server...");
        // the image is dropped at the end of this call, whatever the result
        match self.uploader.upload(&image) {
            Ok(response) => {
                self.stats.uploads += 1;
                log::info!("Server response ({}): {}", response.status, response.text());
                CycleOutcome::Uploaded { reading, response }
            }
            Err(error) => {
                self.stats.upload_failures += 1;
                log::error!("Error sending image ({}): {}", error.kind(), error);
                CycleOutcome::UploadFailed { reading, error }
            }
        }
    }

    /// Cycle until `stop` fires, sleeping `interval` after every cycle.
    pub fn run(&mut self, stop: &StopSignal) -> MonitorStats {
        log::info!(
            "Monitoring started: threshold {:.1} cm, interval {:?}",
            self.detector.threshold_cm(),
            self.interval
        );

        while !stop.is_stopped() {
            self.run_cycle();
            if stop.wait_timeout(self.interval) {
                break;
            }
        }

        let failed = self.stats.measurement_failures
            + self.stats.capture_failures
            + self.stats.upload_failures;
        log::info!(
            "Monitoring stopped after {} cycles ({} uploads, {} failed)",
            self.stats.cycles,
            self.stats.uploads,
            failed
        );
        self.stats
    }
}
