//! PCA9685 I2C PWM expander as a source of PWM and direction lines.
//!
//! The expander runs all 16 channels at one frequency, so motors and the lift
//! servo need separate chips when their calibrated frequencies differ. Each
//! channel handle implements both `SetDutyCycle` (speed/servo lines) and
//! `OutputPin` (H-bridge direction lines). Digital levels use the chip's
//! full-on and full-off bits, so a high line has no low slot per period.

use core::cell::RefCell;

use embedded_hal::{
    digital,
    i2c::I2c,
    pwm::{self, SetDutyCycle},
};
use pwm_pca9685::{Address, Channel, Error as PwmError, Pca9685};

/// Highest "off" count on a 12-bit channel.
pub const MAX_DUTY: u16 = 4095;

/// Internal oscillator frequency in Hz.
const OSC_HZ: u32 = 25_000_000;

/// Errors from the expander, usable as both PWM and digital HAL errors.
#[derive(Debug)]
pub struct ExpanderError<E>(pub PwmError<E>);

impl<E: core::fmt::Debug> pwm::Error for ExpanderError<E> {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

impl<E: core::fmt::Debug> digital::Error for ExpanderError<E> {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// Prescale register value for the requested output frequency.
///
/// The chip accepts `3..=255`, which covers roughly 24 Hz to 1526 Hz.
pub fn prescale_for(freq_hz: u32) -> u8 {
    let freq_hz = freq_hz.max(1);
    let counts = 4096u32.saturating_mul(freq_hz);
    let rounded = (OSC_HZ + counts / 2) / counts;
    rounded.saturating_sub(1).clamp(3, 255) as u8
}

/// Owns one PCA9685 and hands out per-channel line handles.
pub struct PwmExpander<I2C> {
    dev: RefCell<Pca9685<I2C>>,
}

impl<I2C> PwmExpander<I2C>
where
    I2C: I2c,
{
    /// Bring up the expander at `address`, wake it and set its frequency.
    pub fn new(
        i2c: I2C,
        address: u8,
        freq_hz: u32,
    ) -> Result<Self, ExpanderError<I2C::Error>> {
        let mut pca = Pca9685::new(i2c, Address::from(address)).map_err(ExpanderError)?;
        pca.enable().map_err(ExpanderError)?;
        let prescale = prescale_for(freq_hz);
        pca.set_prescale(prescale).map_err(ExpanderError)?;
        tracing::info!(address, freq_hz, prescale, "PWM expander enabled");
        Ok(Self {
            dev: RefCell::new(pca),
        })
    }

    /// Handle for a single output channel.
    pub fn channel(
        &self,
        channel: Channel,
    ) -> ExpanderChannel<'_, I2C> {
        ExpanderChannel {
            dev: &self.dev,
            channel,
        }
    }

    /// Put the chip to sleep; all outputs stop.
    pub fn disable(&self) -> Result<(), ExpanderError<I2C::Error>> {
        self.dev.borrow_mut().disable().map_err(ExpanderError)
    }

    pub fn destroy(self) -> I2C {
        self.dev.into_inner().destroy()
    }
}

/// One channel of a `PwmExpander`.
pub struct ExpanderChannel<'a, I2C> {
    dev: &'a RefCell<Pca9685<I2C>>,
    channel: Channel,
}


impl<I2C: I2c> pwm::ErrorType for ExpanderChannel<'_, I2C> {
    type Error = ExpanderError<I2C::Error>;
}

impl<I2C: I2c> SetDutyCycle for ExpanderChannel<'_, I2C> {
    fn max_duty_cycle(&self) -> u16 {
        MAX_DUTY
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), ExpanderError<I2C::Error>> {
        self.dev
            .borrow_mut()
            .set_channel_on_off(self.channel, 0, duty.min(MAX_DUTY))
            .map_err(ExpanderError)
    }
}

impl<I2C: I2c> digital::ErrorType for ExpanderChannel<'_, I2C> {
    type Error = ExpanderError<I2C::Error>;
}

impl<I2C: I2c> digital::OutputPin for ExpanderChannel<'_, I2C> {
    fn set_low(&mut self) -> Result<(), ExpanderError<I2C::Error>> {
        self.dev
            .borrow_mut()
            .set_channel_full_off(self.channel)
            .map_err(ExpanderError)
    }

    fn set_high(&mut self) -> Result<(), ExpanderError<I2C::Error>> {
        let mut dev = self.dev.borrow_mut();
        // full-off wins over full-on, so clear it first
        dev.set_channel_off(self.channel, 0).map_err(ExpanderError)?;
        dev.set_channel_full_on(self.channel, 0)
            .map_err(ExpanderError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prescale_for_calibrated_rates() {
        assert_eq!(prescale_for(50), 121);
        assert_eq!(prescale_for(1_500), 3);
        assert_eq!(prescale_for(60), 101);
    }

    #[test]
    fn test_prescale_saturates() {
        assert_eq!(prescale_for(10_000), 3);
        assert_eq!(prescale_for(1), 255);
        assert_eq!(prescale_for(0), 255);
    }
}
