//! Settings for the target wiring and the serial link.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings for one flashing target: which GPIO lines drive the
/// target's RESET and BOOT0 pins, and which serial port talks to its
/// bootloader.
///
/// The character framing on the line is not configurable: the STM32 USART
/// bootloader requires 8 data bits, even parity and 1 stop bit.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// GPIO line driving the target's NRST pin (active low).
    pub reset_pin: u8,
    /// GPIO line driving the target's BOOT0 pin (0 = main flash,
    /// 1 = system memory).
    pub boot0_pin: u8,
    /// The serial port name, usually the device path.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set. The pin defaults match the usual Raspberry Pi header
/// wiring for an STM32 target board.
///
/// **Example**
///
/// ```
/// use stmboot::SettingsBuilder;
///
/// let settings = SettingsBuilder::new().path("/dev/ttyS1").finalize();
/// assert_eq!(settings.baud_rate, 115_200);
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                reset_pin: 17,
                boot0_pin: 18,
                path: None,
                baud_rate: 115_200,
                _private_use_builder: (),
            },
        }
    }

    /// Set the GPIO line wired to the target's NRST pin
    pub fn reset_pin(mut self, reset_pin: u8) -> Self {
        self.settings.reset_pin = reset_pin;
        self
    }

    /// Set the GPIO line wired to the target's BOOT0 pin
    pub fn boot0_pin(mut self, boot0_pin: u8) -> Self {
        self.settings.boot0_pin = boot0_pin;
        self
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}

impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            reset_pin: 17,
            boot0_pin: 18,
            path: None,
            baud_rate: 115_200,
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyUSB0");
}

#[test]
fn baud_rate() {
    let baud_rate = 57_600;
    let settings = SettingsBuilder::new().baud_rate(baud_rate).finalize();
    assert_eq!(settings.baud_rate, baud_rate);
}

#[test]
fn reset_pin() {
    let settings = SettingsBuilder::new().reset_pin(4).finalize();
    assert_eq!(settings.reset_pin, 4);
}

#[test]
fn boot0_pin() {
    let settings = SettingsBuilder::new().boot0_pin(27).finalize();
    assert_eq!(settings.boot0_pin, 27);
}
