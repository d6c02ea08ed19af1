//! The public driver: a long-lived [`Flasher`] that runs one session per
//! `flash` call.

use log::{debug, info};

use crate::error::{BackendError, Error, Result};
use crate::flash::Progress;
use crate::gpio::{GpioBackend, PinMode, BOOT0_MAIN_FLASH, RESET_DEASSERTED};
use crate::session::{self, Context};
use crate::settings::Settings;
use crate::uart::{SerialBackend, UartBackend};

/// Drives one STM32 target through its factory USART bootloader.
///
/// The instance is long-lived; each [`flash`](Flasher::flash) call opens the
/// serial port, runs a full bootloader session and restores the target to
/// main-flash boot before returning, on every exit path. Between sessions
/// the target runs its application: BOOT0 selects main flash and RESET is
/// released.
///
/// **Example**
/// ```no_run
/// use stmboot::{CdevGpio, Flasher, SettingsBuilder};
///
/// let settings = SettingsBuilder::new()
///     .path("/dev/ttyS1")
///     .reset_pin(17)
///     .boot0_pin(18)
///     .finalize();
/// let gpio = CdevGpio::new("/dev/gpiochip0");
/// let mut flasher = Flasher::new(settings, Box::new(gpio));
/// flasher.init()?;
/// flasher.flash(0x0800_0000, &[0xAA, 0xBB, 0xCC, 0xDD])?;
/// # Ok::<(), stmboot::Error>(())
/// ```
pub struct Flasher {
    settings: Settings,
    gpio: Box<dyn GpioBackend>,
    uart: Box<dyn UartBackend>,
    init_done: bool,
}

impl Flasher {
    /// Create a driver talking through a real serial port.
    pub fn new(settings: Settings, gpio: Box<dyn GpioBackend>) -> Self {
        Self::with_backends(settings, gpio, Box::new(SerialBackend))
    }

    /// Create a driver with both collaborators supplied, the seam used by
    /// the protocol-level tests.
    pub fn with_backends(
        settings: Settings,
        gpio: Box<dyn GpioBackend>,
        uart: Box<dyn UartBackend>,
    ) -> Self {
        Flasher {
            settings,
            gpio,
            uart,
            init_done: false,
        }
    }

    /// Park the target pins: BOOT0 as an output selecting main flash, RESET
    /// released so the application runs. Idempotent; only the first call
    /// touches the GPIO.
    pub fn init(&mut self) -> Result<()> {
        if self.init_done {
            debug!("already initialised");
            return Ok(());
        }
        info!(
            "parking target pins (reset={}, boot0={})",
            self.settings.reset_pin, self.settings.boot0_pin
        );
        self.park_pins().map_err(Error::InitFailed)?;
        self.init_done = true;
        Ok(())
    }

    fn park_pins(&mut self) -> std::result::Result<(), BackendError> {
        let (reset, boot0) = (self.settings.reset_pin, self.settings.boot0_pin);
        self.gpio.pin_mode(boot0, PinMode::Output)?;
        self.gpio.digital_write(boot0, BOOT0_MAIN_FLASH)?;
        self.gpio.pin_mode(reset, PinMode::Output)?;
        self.gpio.digital_write(reset, RESET_DEASSERTED)?;
        Ok(())
    }

    /// Flash `data` at `address` in one bootloader session.
    pub fn flash(&mut self, address: u32, data: &[u8]) -> Result<()> {
        self.flash_with_progress(address, data, |_| {})
    }

    /// Like [`flash`](Flasher::flash), reporting one [`Progress`] per
    /// 256-byte packet written.
    pub fn flash_with_progress(
        &mut self,
        address: u32,
        data: &[u8],
        mut progress: impl FnMut(Progress),
    ) -> Result<()> {
        self.init()?;
        info!("flashing {} bytes at {:#010x}", data.len(), address);
        session::run(Context {
            settings: &self.settings,
            gpio: self.gpio.as_mut(),
            uart: self.uart.as_mut(),
            address,
            data,
            progress: &mut progress,
        })
    }
}
