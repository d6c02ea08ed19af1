//! Error types for the bootloader driver.

use thiserror::Error;

/// Errors reported by pluggable GPIO/UART collaborators.
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

/// Everything that can go wrong between `init()` and a finished flash
/// session. Transport and backend causes are kept as sources so the CLI can
/// print the full chain.
#[derive(Debug, Error)]
pub enum Error {
    /// GPIO setup during `init` failed; the target pins are in an undefined
    /// state until a later `init` succeeds.
    #[error("driver initialisation failed")]
    InitFailed(#[source] BackendError),

    #[error("could not open serial port `{path}`")]
    SerialOpenFailed {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("could not close serial port")]
    SerialCloseFailed(#[source] std::io::Error),

    #[error("serial write failed")]
    SerialWriteFailed(#[source] std::io::Error),

    #[error("serial read failed")]
    SerialReadFailed(#[source] std::io::Error),

    #[error("gpio operation failed")]
    Gpio(#[source] BackendError),

    /// A framed exchange did not complete before its deadline.
    #[error("no reply from the bootloader within {0} ms")]
    Timeout(u64),

    /// The bootloader answered, but not with the byte the protocol requires
    /// at this point. NACK (0x1F) and garbage are treated alike.
    #[error("unexpected byte at {phase}: expected {expected:#04x}, got {got:#04x}")]
    UnexpectedByte {
        phase: &'static str,
        expected: u8,
        got: u8,
    },

    #[error("unexpected reply length: expected {expected} byte(s), got {got}")]
    UnexpectedLength { expected: usize, got: usize },

    /// The command is not in the set advertised by Get, so it was never
    /// sent.
    #[error("bootloader does not support command {opcode:#04x}")]
    UnsupportedCommand { opcode: u8 },

    /// The flash sequence itself succeeded but restoring main-flash boot did
    /// not. The target may still be wired for system-memory boot.
    #[error("teardown failed after a successful flash")]
    TeardownFailed(#[source] Box<Error>),
}

/// Result type alias using the crate error.
pub type Result<T> = std::result::Result<T, Error>;
