//! Protocol-level fakes for the GPIO and UART collaborators.
//!
//! `MockGpio` records every pin operation (optionally failing one of them);
//! `ScriptedUart` pairs each outbound frame with the next scripted reply and
//! logs the raw byte stream the driver produced. Both hand out shared
//! handles so a test can keep asserting after the driver consumed the
//! boxed backends.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use stmboot::{
    BackendError, Error, PinMode, Result, Settings, SettingsBuilder, UartBackend, UartPort,
};

pub const ACK: u8 = 0x79;
pub const NACK: u8 = 0x1F;

pub const RESET_PIN: u8 = 4;
pub const BOOT0_PIN: u8 = 22;

pub fn test_settings() -> Settings {
    SettingsBuilder::new()
        .path("/dev/ttyTEST")
        .reset_pin(RESET_PIN)
        .boot0_pin(BOOT0_PIN)
        .finalize()
}

// =============================================================================
// GPIO fake
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioOp {
    Mode(u8, PinMode),
    Write(u8, bool),
}

#[derive(Clone)]
pub struct MockGpio {
    ops: Rc<RefCell<Vec<GpioOp>>>,
    fail_on: Option<usize>,
}

impl MockGpio {
    pub fn new() -> Self {
        MockGpio {
            ops: Rc::new(RefCell::new(Vec::new())),
            fail_on: None,
        }
    }

    /// Make the operation with this (zero-based) index fail; it is still
    /// recorded.
    pub fn fail_on(mut self, index: usize) -> Self {
        self.fail_on = Some(index);
        self
    }

    pub fn ops(&self) -> Vec<GpioOp> {
        self.ops.borrow().clone()
    }

    fn record(&mut self, op: GpioOp) -> std::result::Result<(), BackendError> {
        let mut ops = self.ops.borrow_mut();
        ops.push(op);
        if self.fail_on == Some(ops.len() - 1) {
            return Err("injected gpio fault".into());
        }
        Ok(())
    }
}

impl stmboot::GpioBackend for MockGpio {
    fn pin_mode(&mut self, pin: u8, mode: PinMode) -> std::result::Result<(), BackendError> {
        self.record(GpioOp::Mode(pin, mode))
    }

    fn digital_write(&mut self, pin: u8, high: bool) -> std::result::Result<(), BackendError> {
        self.record(GpioOp::Write(pin, high))
    }
}

/// GPIO operations performed by a successful `init`.
pub fn init_ops() -> Vec<GpioOp> {
    vec![
        GpioOp::Mode(BOOT0_PIN, PinMode::Output),
        GpioOp::Write(BOOT0_PIN, false),
        GpioOp::Mode(RESET_PIN, PinMode::Output),
        GpioOp::Write(RESET_PIN, true),
    ]
}

/// GPIO operations that reset the target into system memory.
pub fn enter_ops() -> Vec<GpioOp> {
    vec![
        GpioOp::Write(RESET_PIN, false),
        GpioOp::Mode(RESET_PIN, PinMode::Input),
        GpioOp::Write(BOOT0_PIN, true),
        GpioOp::Mode(RESET_PIN, PinMode::Output),
        GpioOp::Write(RESET_PIN, true),
    ]
}

/// GPIO operations of the session exit path, in the order the driver must
/// perform them.
pub fn teardown_ops() -> Vec<GpioOp> {
    vec![
        GpioOp::Write(RESET_PIN, false),
        GpioOp::Mode(RESET_PIN, PinMode::Input),
        GpioOp::Write(BOOT0_PIN, false),
        GpioOp::Mode(RESET_PIN, PinMode::Output),
        GpioOp::Write(RESET_PIN, true),
    ]
}

// =============================================================================
// UART fake
// =============================================================================

/// A scripted serial link: the n-th outbound frame makes the n-th scripted
/// reply readable. An unscripted frame gets no reply, which the driver sees
/// as silence.
#[derive(Clone)]
pub struct ScriptedUart {
    replies: Rc<RefCell<VecDeque<Vec<u8>>>>,
    writes: Rc<RefCell<Vec<Vec<u8>>>>,
    closed: Rc<RefCell<bool>>,
    close_error: Rc<RefCell<Option<String>>>,
    chunk_size: usize,
    fail_open: bool,
}

impl ScriptedUart {
    pub fn new() -> Self {
        ScriptedUart {
            replies: Rc::new(RefCell::new(VecDeque::new())),
            writes: Rc::new(RefCell::new(Vec::new())),
            closed: Rc::new(RefCell::new(false)),
            close_error: Rc::new(RefCell::new(None)),
            chunk_size: usize::MAX,
            fail_open: false,
        }
    }

    /// Deliver replies one byte at a time to exercise stream reassembly.
    pub fn chunked(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Queue the reply for the next unanswered outbound frame.
    pub fn reply(&self, bytes: &[u8]) {
        self.replies.borrow_mut().push_back(bytes.to_vec());
    }

    /// Make `close` fail with this message.
    pub fn close_error(&self, message: &str) {
        *self.close_error.borrow_mut() = Some(message.to_owned());
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.borrow().clone()
    }

    pub fn was_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl UartBackend for ScriptedUart {
    fn open(&mut self, settings: &Settings) -> Result<Box<dyn UartPort>> {
        if self.fail_open {
            return Err(Error::SerialOpenFailed {
                path: settings.path.clone().unwrap_or_default(),
                source: serialport::Error::new(serialport::ErrorKind::NoDevice, "no such device"),
            });
        }
        Ok(Box::new(ScriptedPort {
            replies: Rc::clone(&self.replies),
            inbound: VecDeque::new(),
            writes: Rc::clone(&self.writes),
            closed: Rc::clone(&self.closed),
            close_error: Rc::clone(&self.close_error),
            chunk_size: self.chunk_size,
        }))
    }
}

struct ScriptedPort {
    replies: Rc<RefCell<VecDeque<Vec<u8>>>>,
    inbound: VecDeque<u8>,
    writes: Rc<RefCell<Vec<Vec<u8>>>>,
    closed: Rc<RefCell<bool>>,
    close_error: Rc<RefCell<Option<String>>>,
    chunk_size: usize,
}

impl UartPort for ScriptedPort {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writes.borrow_mut().push(bytes.to_vec());
        if let Some(reply) = self.replies.borrow_mut().pop_front() {
            self.inbound.extend(reply);
        }
        Ok(())
    }

    fn poll_chunk(&mut self, buf: &mut [u8], wait: Duration) -> io::Result<usize> {
        if self.inbound.is_empty() {
            std::thread::sleep(wait);
            return Ok(0);
        }
        let len = self.chunk_size.min(buf.len()).min(self.inbound.len());
        for slot in &mut buf[..len] {
            *slot = self.inbound.pop_front().unwrap();
        }
        Ok(len)
    }

    fn close(&mut self) -> io::Result<()> {
        *self.closed.borrow_mut() = true;
        match self.close_error.borrow_mut().take() {
            Some(message) => Err(io::Error::new(io::ErrorKind::Other, message)),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Canned replies
// =============================================================================

/// The opcodes a typical v3.1 bootloader advertises.
pub const ADVERTISED: [u8; 11] = [
    0x00, 0x01, 0x02, 0x11, 0x21, 0x31, 0x43, 0x63, 0x73, 0x82, 0x92,
];

pub fn ack() -> Vec<u8> {
    vec![ACK]
}

/// Get reply advertising [`ADVERTISED`].
pub fn get_reply() -> Vec<u8> {
    get_reply_advertising(&ADVERTISED)
}

/// Get reply advertising everything except `dropped`.
pub fn get_reply_without(dropped: u8) -> Vec<u8> {
    let kept: Vec<u8> = ADVERTISED.iter().copied().filter(|op| *op != dropped).collect();
    get_reply_advertising(&kept)
}

fn get_reply_advertising(opcodes: &[u8]) -> Vec<u8> {
    let mut reply = vec![ACK, opcodes.len() as u8, 0x31];
    reply.extend_from_slice(opcodes);
    reply.push(ACK);
    reply
}

/// Get ID reply for PID 0x0410.
pub fn get_id_reply() -> Vec<u8> {
    vec![ACK, 0x01, 0x04, 0x10, ACK]
}

/// Script a complete successful session with `packets` Write Memory rounds.
pub fn script_session(uart: &ScriptedUart, packets: usize) {
    uart.reply(&ack()); // autobaud
    uart.reply(&get_reply());
    uart.reply(&get_id_reply());
    uart.reply(&ack()); // erase opcode
    uart.reply(&ack()); // erase selector
    for _ in 0..packets {
        uart.reply(&ack()); // write opcode
        uart.reply(&ack()); // address
        uart.reply(&ack()); // data
    }
}
