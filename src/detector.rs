//! Threshold detection: is the object closer than the configured distance?
//!
//! Stateless. There is no debounce or hysteresis, so an object that lingers
//! inside the threshold is detected again on every cycle.

use crate::{DetectionEvent, DistanceReading};

/// True iff `distance` is strictly below `threshold` (both in cm).
pub fn is_within_threshold(distance: f64, threshold: f64) -> bool {
    distance < threshold
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ThresholdDetector {
    threshold_cm: f64,
}

impl ThresholdDetector {
    pub fn new(threshold_cm: f64) -> Self {
        Self { threshold_cm }
    }

    pub fn threshold_cm(&self) -> f64 {
        self.threshold_cm
    }

    pub fn evaluate(&self, reading: DistanceReading) -> DetectionEvent {
        DetectionEvent {
            detected: is_within_threshold(reading.centimeters(), self.threshold_cm),
            reading,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_exclusive() {
        assert!(is_within_threshold(149.99, 150.0));
        assert!(!is_within_threshold(150.0, 150.0));
        assert!(!is_within_threshold(150.01, 150.0));
        assert!(is_within_threshold(0.0, 150.0));
    }

    #[test]
    fn evaluate_keeps_the_reading() {
        let detector = ThresholdDetector::new(150.0);
        let near = detector.evaluate(DistanceReading::new(42.0));
        assert!(near.detected);
        assert_eq!(near.reading.centimeters(), 42.0);

        let far = detector.evaluate(DistanceReading::new(200.0));
        assert!(!far.detected);
    }

    #[test]
    fn repeated_readings_trigger_repeatedly() {
        let detector = ThresholdDetector::new(150.0);
        let hits = [140.0, 140.0, 140.0]
            .into_iter()
            .map(|cm| detector.evaluate(DistanceReading::new(cm)))
            .filter(|event| event.detected)
            .count();
        assert_eq!(hits, 3);
    }
}
