//! # Proximity Cam Core Library
//!
//! This library provides the sense → decide → act pipeline for an unattended
//! Raspberry Pi that watches a doorway with an HC-SR04 style ultrasonic sensor.
//! When something comes closer than the configured threshold, a still image is
//! captured and posted to a remote recognition service.
//!
//! ## Design Philosophy
//!
//! ### Hardware at the edges
//! - **Injectable lines and clock**: [`pulse::PulseTimer`] is generic over the
//!   trigger line, echo line and clock, so every timing path can be driven by
//!   simulated I/O in tests
//! - **Pluggable collaborators**: image acquisition ([`camera::ImageProvider`])
//!   and upload ([`upload::Uploader`]) are traits; the loop never knows which
//!   implementation it runs against
//!
//! ### Failure containment
//! A failed measurement, capture or upload is logged and the loop moves on to
//! the next cycle. Only startup failures (unusable sensor, invalid config) are
//! fatal.
//!
//! ### Data Flow
//! 1. **Sample**: pulse the trigger line, time the echo → [`DistanceReading`]
//! 2. **Detect**: compare against the threshold → [`DetectionEvent`]
//! 3. **Act**: capture image → encode JPEG → HTTP POST → log the response
//! 4. **Wait**: sleep the sampling interval and repeat
//!
//! ## Core Types
//!
//! - [`DistanceReading`]: one distance sample in centimeters
//! - [`DetectionEvent`]: the threshold decision together with the reading behind it

use std::fmt;

// Module declarations
pub mod camera;
pub mod config;
pub mod detector;
pub mod distance;
pub mod hardware;
pub mod monitor;
pub mod pulse;
pub mod status;
pub mod upload;

/// A single distance sample in centimeters.
///
/// Produced once per sampling cycle and dropped when the cycle ends. Values
/// are never negative: they are derived from a measured pulse duration.
///
/// # Example
/// ```
/// use proximity_cam_lib::DistanceReading;
///
/// let reading = DistanceReading::new(142.5);
/// assert_eq!(reading.centimeters(), 142.5);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct DistanceReading(f64);

impl DistanceReading {
    /// Create a reading, clamping anything below zero (or NaN) to zero.
    pub fn new(centimeters: f64) -> Self {
        if centimeters > 0.0 {
            Self(centimeters)
        } else {
            Self(0.0)
        }
    }

    pub fn centimeters(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for DistanceReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} cm", self.0)
    }
}

/// Outcome of comparing a reading against the detection threshold.
///
/// Consumed immediately by the monitor loop to decide whether the
/// capture-and-upload sequence runs this cycle.
///
/// # Example
/// ```
/// use proximity_cam_lib::{DetectionEvent, DistanceReading};
///
/// let event = DetectionEvent {
///     detected: true,
///     reading: DistanceReading::new(120.0),
/// };
/// assert!(event.detected);
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionEvent {
    /// True if the object is closer than the threshold
    pub detected: bool,
    /// The reading that produced this decision
    pub reading: DistanceReading,
}
