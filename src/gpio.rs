//! GPIO control of the target's RESET and BOOT0 lines.
//!
//! The driver only ever needs two output-capable lines, manipulated through
//! the minimal [`GpioBackend`] contract. [`TargetPins`] layers the fixed
//! board polarity on top of it; [`CdevGpio`] is the shipped Linux backend
//! built on the GPIO character device.

use std::collections::HashMap;

use gpiocdev::line::{Offset, Value};
use gpiocdev::request::{Config, Request};
use log::debug;

use crate::error::{BackendError, Error, Result};

// =============================================================================
// Public Interface
// =============================================================================

/// Direction of a GPIO line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Input,
    Output,
}

/// The two operations the driver needs from a GPIO provider.
///
/// Implementations only have to handle the lines named in
/// [`Settings`](crate::Settings); both calls are synchronous.
pub trait GpioBackend {
    /// Configure the direction of a line.
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> std::result::Result<(), BackendError>;

    /// Drive an output line high (`true`) or low (`false`).
    fn digital_write(&mut self, pin: u8, high: bool) -> std::result::Result<(), BackendError>;
}

/// BOOT0 level selecting the main flash as boot source.
pub(crate) const BOOT0_MAIN_FLASH: bool = false;
/// BOOT0 level selecting system memory (the factory bootloader).
pub(crate) const BOOT0_SYSTEM_MEMORY: bool = true;
/// NRST is active low.
pub(crate) const RESET_ASSERTED: bool = false;
pub(crate) const RESET_DEASSERTED: bool = true;

/// The target's RESET and BOOT0 lines with their polarity fixed.
///
/// RESET is driven asymmetrically: while asserted the pin is released to a
/// high-impedance input and the board's pull (or an attached debugger) holds
/// the net low; only the deasserted level is actively driven. Boards share
/// the reset net with a debugger, so the pin must not fight it.
pub(crate) struct TargetPins<'a> {
    gpio: &'a mut dyn GpioBackend,
    reset_pin: u8,
    boot0_pin: u8,
}

impl<'a> TargetPins<'a> {
    pub(crate) fn new(gpio: &'a mut dyn GpioBackend, reset_pin: u8, boot0_pin: u8) -> Self {
        TargetPins {
            gpio,
            reset_pin,
            boot0_pin,
        }
    }

    pub(crate) fn select_main_flash(&mut self) -> Result<()> {
        debug!("BOOT0 -> main flash");
        self.gpio
            .digital_write(self.boot0_pin, BOOT0_MAIN_FLASH)
            .map_err(Error::Gpio)
    }

    pub(crate) fn select_system_memory(&mut self) -> Result<()> {
        debug!("BOOT0 -> system memory");
        self.gpio
            .digital_write(self.boot0_pin, BOOT0_SYSTEM_MEMORY)
            .map_err(Error::Gpio)
    }

    pub(crate) fn assert_reset(&mut self) -> Result<()> {
        debug!("RESET asserted");
        self.gpio
            .digital_write(self.reset_pin, RESET_ASSERTED)
            .map_err(Error::Gpio)?;
        self.gpio
            .pin_mode(self.reset_pin, PinMode::Input)
            .map_err(Error::Gpio)
    }

    pub(crate) fn deassert_reset(&mut self) -> Result<()> {
        debug!("RESET deasserted");
        self.gpio
            .pin_mode(self.reset_pin, PinMode::Output)
            .map_err(Error::Gpio)?;
        self.gpio
            .digital_write(self.reset_pin, RESET_DEASSERTED)
            .map_err(Error::Gpio)
    }
}

// =============================================================================
// Linux character-device backend
// =============================================================================

/// [`GpioBackend`] on top of the Linux GPIO character device.
///
/// Lines are requested lazily on the first `pin_mode` call and reconfigured
/// in place on direction changes, so a line is held for as long as the
/// driver owns it.
pub struct CdevGpio {
    chip: String,
    lines: HashMap<u8, Line>,
}

struct Line {
    request: Request,
    mode: PinMode,
}

impl CdevGpio {
    /// Create a backend for the given chip, e.g. `/dev/gpiochip0`.
    pub fn new(chip: impl Into<String>) -> Self {
        CdevGpio {
            chip: chip.into(),
            lines: HashMap::new(),
        }
    }

    fn line_config(pin: u8, mode: PinMode, level: Value) -> Config {
        let mut config = Config::default();
        match mode {
            PinMode::Input => config.with_line(pin as Offset).as_input(),
            PinMode::Output => config.with_line(pin as Offset).as_output(level),
        };
        config
    }
}

impl GpioBackend for CdevGpio {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> std::result::Result<(), BackendError> {
        debug!("gpio {}: mode {:?}", pin, mode);
        // New outputs start at the inactive level until written.
        let config = Self::line_config(pin, mode, Value::Inactive);
        if let Some(line) = self.lines.get_mut(&pin) {
            line.request.reconfigure(&config)?;
            line.mode = mode;
            return Ok(());
        }
        let request = Request::from_config(config)
            .on_chip(&self.chip)
            .with_consumer("stmboot")
            .request()?;
        self.lines.insert(pin, Line { request, mode });
        Ok(())
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> std::result::Result<(), BackendError> {
        debug!("gpio {}: write {}", pin, high as u8);
        let value = if high { Value::Active } else { Value::Inactive };
        let line = self
            .lines
            .get_mut(&pin)
            .ok_or_else(|| format!("gpio line {} has not been configured", pin))?;
        // Writing a line that currently floats latches it as a driven
        // output at the requested level.
        if line.mode == PinMode::Input {
            let config = Self::line_config(pin, PinMode::Output, value);
            line.request.reconfigure(&config)?;
            line.mode = PinMode::Output;
            return Ok(());
        }
        line.request.set_value(pin as Offset, value)?;
        Ok(())
    }
}
