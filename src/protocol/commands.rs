//! The bootloader commands the driver issues, one function per command.
//!
//! Each function builds its frames with [`wire`](super::wire), runs them
//! through [`exchange`](super::exchange) and interprets the reply. Commands
//! that the bootloader did not advertise in its Get response are refused
//! here before a single byte goes out.

use std::time::{Duration, Instant};

use log::{debug, info};

use super::exchange::{exchange, remaining_budget, Step};
use super::wire::{
    address_frame, command_frame, data_frame, Command, ACK, AUTOBAUD, MASS_ERASE_SELECTOR,
    MAX_WRITE_CHUNK,
};
use crate::error::{Error, Result};
use crate::uart::UartPort;

/// The bootloader answers autobaud within a few character times; 1 s is
/// generous.
const AUTOBAUD_TIMEOUT: Duration = Duration::from_millis(1000);
/// Get and Get ID replies follow the command ACK immediately.
const QUERY_TIMEOUT: Duration = Duration::from_millis(1000);
/// A mass erase takes tens of milliseconds per page; whole-device erases on
/// large parts run into the tens of seconds.
const ERASE_TIMEOUT: Duration = Duration::from_millis(30_000);
/// Budget for all three phases of one Write Memory.
const WRITE_TIMEOUT: Duration = Duration::from_millis(30_000);

/// The command opcodes advertised by Get, in the order the bootloader
/// listed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandSet(Vec<u8>);

impl CommandSet {
    pub(crate) fn supports(&self, command: Command) -> bool {
        self.0.contains(&(command as u8))
    }

    fn require(&self, command: Command) -> Result<()> {
        if self.supports(command) {
            Ok(())
        } else {
            Err(Error::UnsupportedCommand {
                opcode: command as u8,
            })
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Send the autobaud byte and expect a lone ACK back.
pub(crate) fn enter_bootloader(port: &mut dyn UartPort) -> Result<()> {
    debug!("autobaud");
    exchange(port, &[AUTOBAUD], AUTOBAUD_TIMEOUT, &mut |reply| {
        if reply.len() != 1 {
            return Err(Error::UnexpectedLength {
                expected: 1,
                got: reply.len(),
            });
        }
        if reply[0] != ACK {
            return Err(Error::UnexpectedByte {
                phase: "autobaud",
                expected: ACK,
                got: reply[0],
            });
        }
        Ok(Step::Done(()))
    })
}

/// Get (0x00): bootloader version and the advertised command set.
pub(crate) fn get(port: &mut dyn UartPort) -> Result<(u8, CommandSet)> {
    let reply = exchange(
        port,
        &command_frame(Command::Get),
        QUERY_TIMEOUT,
        &mut ack_framed,
    )?;
    let version = reply[2];
    let commands = CommandSet(reply[3..reply.len() - 1].to_vec());
    info!(
        "bootloader v{}.{}, {} commands",
        version >> 4,
        version & 0x0F,
        commands.len()
    );
    Ok((version, commands))
}

/// Get ID (0x02): the 16-bit product ID. Only issued when advertised.
pub(crate) fn get_id(port: &mut dyn UartPort, commands: &CommandSet) -> Result<u16> {
    commands.require(Command::GetId)?;
    let reply = exchange(
        port,
        &command_frame(Command::GetId),
        QUERY_TIMEOUT,
        &mut ack_framed,
    )?;
    if reply.len() < 5 {
        return Err(Error::UnexpectedLength {
            expected: 5,
            got: reply.len(),
        });
    }
    let product_id = u16::from_be_bytes([reply[2], reply[3]]);
    info!("product id {:#06x}", product_id);
    Ok(product_id)
}

/// Erase (0x43) with the mass-erase selector: clears all application flash.
/// Only issued when advertised; extended erase (0x44) is not spoken.
pub(crate) fn erase_all(port: &mut dyn UartPort, commands: &CommandSet) -> Result<()> {
    commands.require(Command::Erase)?;
    info!("mass erase");
    let started = Instant::now();
    exchange(
        port,
        &command_frame(Command::Erase),
        ERASE_TIMEOUT,
        &mut expect_ack("start-ack"),
    )?;
    // The second ACK arrives only after the flash is actually blank.
    let budget = remaining_budget(started, ERASE_TIMEOUT)?;
    exchange(
        port,
        &MASS_ERASE_SELECTOR,
        budget,
        &mut expect_ack("erase-complete"),
    )
}

/// Phases of one Write Memory command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WritePhase {
    SendCommand,
    SendAddress,
    SendData,
}

/// Write Memory (0x31): one packet of up to 256 bytes at `address`.
///
/// Three frames, each acknowledged separately, all inside one shared
/// deadline. A non-ACK at any phase aborts the remaining phases.
pub(crate) fn write_memory(
    port: &mut dyn UartPort,
    commands: &CommandSet,
    address: u32,
    data: &[u8],
) -> Result<()> {
    commands.require(Command::WriteMemory)?;
    debug_assert!(!data.is_empty() && data.len() <= MAX_WRITE_CHUNK);

    let started = Instant::now();
    let mut phase = WritePhase::SendCommand;
    loop {
        let budget = remaining_budget(started, WRITE_TIMEOUT)?;
        match phase {
            WritePhase::SendCommand => {
                exchange(
                    port,
                    &command_frame(Command::WriteMemory),
                    budget,
                    &mut expect_ack("start-ack"),
                )?;
                phase = WritePhase::SendAddress;
            }
            WritePhase::SendAddress => {
                exchange(
                    port,
                    &address_frame(address),
                    budget,
                    &mut expect_ack("address-ack"),
                )?;
                phase = WritePhase::SendData;
            }
            WritePhase::SendData => {
                return exchange(
                    port,
                    &data_frame(data),
                    budget,
                    &mut expect_ack("data-ack"),
                );
            }
        }
    }
}

// =============================================================================
// Reply parsers
// =============================================================================

/// Parser for a single ACK byte; anything else is a protocol error named
/// after the phase.
fn expect_ack(phase: &'static str) -> impl FnMut(&[u8]) -> Result<Step<()>> {
    move |reply| match reply.first() {
        Some(&ACK) => Ok(Step::Done(())),
        Some(&other) => Err(Error::UnexpectedByte {
            phase,
            expected: ACK,
            got: other,
        }),
        None => Ok(Step::Wait),
    }
}

/// Parser for the ACK-framed replies of Get and Get ID:
/// `ACK, N, payload…, ACK` with a total length of `N + 4`.
fn ack_framed(reply: &[u8]) -> Result<Step<Vec<u8>>> {
    if reply[0] != ACK {
        return Err(Error::UnexpectedByte {
            phase: "start-ack",
            expected: ACK,
            got: reply[0],
        });
    }
    if reply.len() < 2 {
        return Ok(Step::Wait);
    }
    let total = reply[1] as usize + 4;
    if reply.len() < total {
        return Ok(Step::Wait);
    }
    let last = reply[total - 1];
    if last != ACK {
        return Err(Error::UnexpectedByte {
            phase: "end-ack",
            expected: ACK,
            got: last,
        });
    }
    Ok(Step::Done(reply[..total].to_vec()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(reply: &[u8]) -> Result<Step<Vec<u8>>> {
        ack_framed(reply)
    }

    #[test]
    fn ack_framed_waits_for_full_frame() {
        assert!(matches!(parse_all(&[ACK]), Ok(Step::Wait)));
        assert!(matches!(parse_all(&[ACK, 0x01, 0x04]), Ok(Step::Wait)));
        match parse_all(&[ACK, 0x01, 0x04, 0x10, ACK]) {
            Ok(Step::Done(frame)) => assert_eq!(frame, vec![ACK, 0x01, 0x04, 0x10, ACK]),
            _ => panic!("expected a complete frame"),
        }
    }

    #[test]
    fn ack_framed_rejects_bad_leading_byte() {
        assert!(matches!(
            parse_all(&[0x1F]),
            Err(Error::UnexpectedByte {
                phase: "start-ack",
                got: 0x1F,
                ..
            })
        ));
    }

    #[test]
    fn ack_framed_rejects_bad_trailer() {
        assert!(matches!(
            parse_all(&[ACK, 0x01, 0x04, 0x10, 0x00]),
            Err(Error::UnexpectedByte {
                phase: "end-ack",
                got: 0x00,
                ..
            })
        ));
    }

    #[test]
    fn command_set_membership() {
        let set = CommandSet(vec![0x00, 0x02, 0x31]);
        assert!(set.supports(Command::WriteMemory));
        assert!(!set.supports(Command::Erase));
        assert!(matches!(
            set.require(Command::Erase),
            Err(Error::UnsupportedCommand { opcode: 0x43 })
        ));
    }
}
