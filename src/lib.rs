//! Stmboot flashes firmware into an STM32 microcontroller over the
//! factory-resident USART bootloader (the ST AN3155 protocol), from a host
//! that controls the target's RESET and BOOT0 lines through two GPIO pins
//! and talks to the target over a serial port. This allows a small
//! single-board computer wired to the target to reprogram it unattended,
//! with no debugger attached.
//!
//! A flash call is one **session**: the target is reset into system-memory
//! boot, the bootloader command set is negotiated, the application flash is
//! mass-erased and rewritten in 256-byte packets, and the target is reset
//! back into its own firmware. The session is implemented as a state
//! machine in terms of **states** and **transitions** between them with the
//! following characteristics:
//!
//! * Can only be in one state at any time.
//! * Each state owns its associated data - most importantly the open serial
//!   port, which moves from state to state.
//! * Transitions between states are triggered via typed **events** and
//!   follow defined semantics.
//! * Only explicitly defined transitions are permitted; the `From` trait
//!   converts `events` into new `states`, so an unimplemented transition is
//!   a compile-time error.
//! * Every failure transition leads into the teardown state, which restores
//!   main-flash boot before the session reports anything to the caller.
//!
//! The GPIO and UART collaborators sit behind the [`GpioBackend`] and
//! [`UartBackend`] traits; the shipped implementations use the Linux GPIO
//! character device and a real serial port, and the tests substitute
//! scripted fakes to exercise the protocol byte by byte.

mod error;
mod flash;
mod flasher;
mod gpio;
mod protocol;
mod session;
mod settings;
mod uart;

pub use error::{BackendError, Error, Result};
pub use flash::{Progress, PACKET_SIZE};
pub use flasher::Flasher;
pub use gpio::{CdevGpio, GpioBackend, PinMode};
pub use protocol::{Command, MAX_WRITE_CHUNK};
pub use settings::{Settings, SettingsBuilder};
pub use uart::{SerialBackend, UartBackend, UartPort};
