//! The AN3155 USART bootloader protocol.
//!
//! Split the way the conversation is layered on the wire: `wire` knows the
//! byte layout of frames, `exchange` runs one request/response round against
//! a deadline, `commands` gives each bootloader command a typed function.

mod commands;
mod exchange;
mod wire;

pub use wire::{Command, MAX_WRITE_CHUNK};

pub(crate) use commands::{enter_bootloader, erase_all, get, get_id, write_memory, CommandSet};
