//! Serial transport to the target's bootloader USART.
//!
//! The bootloader conversation is strictly request/response, so the
//! transport surface is small: open a port, write a frame, poll for inbound
//! chunks, close. Chunk boundaries carry no meaning; the protocol layer
//! reassembles the stream before parsing.

use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use retry::{delay, retry_with_index};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::error::{Error, Result};
use crate::settings::Settings;

/// Attempts and spacing for opening the port; USB serial adapters routinely
/// need a moment after re-enumeration.
const OPEN_RETRY_DELAY_MS: u64 = 1000;
const OPEN_RETRIES: usize = 4;

// =============================================================================
// Public Interface
// =============================================================================

/// An open duplex byte channel to the target.
///
/// Inbound bytes arrive as chunks of one or more bytes in arrival order;
/// nothing is promised about chunk boundaries. `close` succeeds once; a
/// second close reports an error whose message contains `"Port is not
/// open"`, which the session teardown tolerates.
pub trait UartPort {
    /// Write a complete outbound frame.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Fetch the next inbound chunk into `buf`, returning the chunk length.
    /// When nothing is pending, waits up to `wait` and returns `Ok(0)`.
    fn poll_chunk(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize>;

    /// Close the channel.
    fn close(&mut self) -> io::Result<()>;
}

/// Opens [`UartPort`]s for a session. The production implementation is
/// [`SerialBackend`]; tests substitute a scripted one.
pub trait UartBackend {
    fn open(&mut self, settings: &Settings) -> Result<Box<dyn UartPort>>;
}

/// [`UartBackend`] backed by a real serial device, fixed at 8E1 framing as
/// the STM32 bootloader requires.
pub struct SerialBackend;

impl UartBackend for SerialBackend {
    fn open(&mut self, settings: &Settings) -> Result<Box<dyn UartPort>> {
        let port = open_and_setup_port(settings)?;
        Ok(Box::new(SerialUart { port: Some(port) }))
    }
}

// =============================================================================
// Private stuff
// =============================================================================

fn open_and_setup_port(settings: &Settings) -> Result<Box<dyn SerialPort>> {
    let path = match &settings.path {
        Some(path) => path.clone(),
        None => {
            return Err(Error::SerialOpenFailed {
                path: String::new(),
                source: serialport::Error::new(
                    serialport::ErrorKind::InvalidInput,
                    "no serial port path configured",
                ),
            })
        }
    };

    let result = retry_with_index(
        delay::Fixed::from_millis(OPEN_RETRY_DELAY_MS).take(OPEN_RETRIES),
        |index| -> std::result::Result<Box<dyn SerialPort>, serialport::Error> {
            debug!("Trying to connect {}", index);
            serialport::new(&path, settings.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::Even)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .timeout(Duration::from_millis(500))
                .open()
        },
    );
    match result {
        Ok(port) => {
            info!(
                "Connected to {} at {} baud (8E1)",
                path, settings.baud_rate
            );
            Ok(port)
        }
        Err(err) => {
            let source = match err {
                retry::Error::Operation {
                    error,
                    total_delay,
                    tries,
                } => {
                    warn!(
                        "Failed to open the port after {:?} and {} tries: {}",
                        total_delay, tries, error,
                    );
                    error
                }
                retry::Error::Internal(_) => serialport::Error::new(
                    serialport::ErrorKind::Unknown,
                    "internal error while retrying to open the port",
                ),
            };
            Err(Error::SerialOpenFailed { path, source })
        }
    }
}

struct SerialUart {
    port: Option<Box<dyn SerialPort>>,
}

impl SerialUart {
    fn port(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.port.as_mut().ok_or_else(not_open)
    }
}

fn not_open() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "Port is not open")
}

impl UartPort for SerialUart {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()
    }

    fn poll_chunk(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        let port = self.port()?;
        // Checking the input buffer first keeps the read itself from ever
        // blocking, the only reliable way to get chunked delivery out of a
        // blocking port.
        let available = port.bytes_to_read().map_err(io::Error::from)? as usize;
        if available == 0 {
            thread::sleep(wait);
            return Ok(0);
        }
        let len = available.min(buf.len());
        port.read_exact(&mut buf[..len])?;
        Ok(len)
    }

    fn close(&mut self) -> io::Result<()> {
        match self.port.take() {
            Some(port) => {
                drop(port);
                Ok(())
            }
            None => Err(not_open()),
        }
    }
}
