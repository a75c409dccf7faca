//! Raspberry Pi GPIO lines for the ultrasonic sensor.
//!
//! Only compiled with `--features hardware` on Linux. Lines are claimed once at
//! startup; failing to claim them is fatal because the pipeline is useless
//! without its sensor.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HardwareError {
    #[error("GPIO unavailable: {0}")]
    Gpio(String),

    #[error("GPIO {pin} unavailable: {reason}")]
    Pin { pin: u8, reason: String },

    #[error("hardware support not compiled in; rebuild with --features hardware")]
    Unsupported,
}

#[cfg(all(target_os = "linux", feature = "hardware"))]
pub use rpi::{open_lines, RppalEcho, RppalTrigger};

#[cfg(all(target_os = "linux", feature = "hardware"))]
mod rpi {
    use super::HardwareError;
    use crate::config::SensorConfig;
    use crate::pulse::{EchoLine, LineError, TriggerLine};
    use rppal::gpio::{Gpio, InputPin, OutputPin};

    pub struct RppalTrigger {
        pin: OutputPin,
    }

    pub struct RppalEcho {
        pin: InputPin,
    }

    impl TriggerLine for RppalTrigger {
        fn set_high(&mut self) -> Result<(), LineError> {
            self.pin.set_high();
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), LineError> {
            self.pin.set_low();
            Ok(())
        }
    }

    impl EchoLine for RppalEcho {
        fn is_high(&self) -> Result<bool, LineError> {
            Ok(self.pin.is_high())
        }
    }

    /// Claim the trigger (output, driven low) and echo (input, pull-down) pins.
    pub fn open_lines(config: &SensorConfig) -> Result<(RppalTrigger, RppalEcho), HardwareError> {
        let gpio = Gpio::new().map_err(|e| HardwareError::Gpio(e.to_string()))?;

        let trigger = gpio
            .get(config.trigger_pin)
            .map_err(|e| HardwareError::Pin {
                pin: config.trigger_pin,
                reason: e.to_string(),
            })?
            .into_output_low();
        let echo = gpio
            .get(config.echo_pin)
            .map_err(|e| HardwareError::Pin {
                pin: config.echo_pin,
                reason: e.to_string(),
            })?
            .into_input_pulldown();

        log::info!(
            "Claimed GPIO {} (trigger) and GPIO {} (echo)",
            config.trigger_pin,
            config.echo_pin
        );
        Ok((RppalTrigger { pin: trigger }, RppalEcho { pin: echo }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_name_the_pin() {
        let err = HardwareError::Pin {
            pin: 24,
            reason: "Pin 24 is not available".to_string(),
        };
        assert!(err.to_string().starts_with("GPIO 24 unavailable"));
        assert!(HardwareError::Unsupported
            .to_string()
            .contains("--features hardware"));
    }
}
