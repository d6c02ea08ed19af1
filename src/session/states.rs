//! States for the flash session state machine.
//!
//! This module is private and restricted to the
//! [`session`](crate::session) scope. Refer to the
//! [`state_machine`](super::state_machine) module for an overview of states,
//! events and transitions.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use super::events::*;
use super::state_machine::Context;
use crate::error::Error;
use crate::flash;
use crate::protocol::{self, Command, CommandSet};
use crate::uart::UartPort;

/// Hold time between selecting system memory and releasing reset.
const RESET_SETTLE: Duration = Duration::from_millis(10);
/// The bootloader needs this long after reset before it samples autobaud.
/// Shortening it makes autobaud fail on slow-starting parts.
const BOOTLOADER_STARTUP: Duration = Duration::from_millis(500);

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Trait adding the ability for a state to be `run` after a transition into
/// it.
///
/// During this call, the state does its part of the session and, when
/// finished, requests a transition to a new state by returning the
/// appropriate `event`. The `event` is consumed to create the new state
/// using the corresponding [`From`] trait implementation (provided such
/// implementation exists).
pub(crate) trait Runnable {
    fn run(&mut self, ctx: &mut Context<'_>) -> Event;
}

/// What the bootloader reported about itself during negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeviceState {
    pub bootloader_version: u8,
    pub available_commands: CommandSet,
    /// Observed and logged, never validated.
    pub product_id: u16,
}

// Opening State ===============================================================

/// The initial state: open the serial port.
///
/// * **[`PortOpenedEvent`] => [`InSystemMemoryState`]** once the port is
///   open and configured,
/// * **[`FailedEvent`] => [`TearingDownState`]** when the port cannot be
///   opened. Teardown still runs so the target pins end up parked.
#[derive(Debug)]
pub(crate) struct OpeningState {}
impl Runnable for OpeningState {
    fn run(&mut self, ctx: &mut Context<'_>) -> Event {
        info!("=> Opening");
        match ctx.uart.open(ctx.settings) {
            Ok(port) => Event::PortOpened(PortOpenedEvent { port }),
            Err(error) => Event::Failed(FailedEvent { port: None, error }),
        }
    }
}

// InSystemMemory State ========================================================

/// Put the target into system-memory boot and raise the bootloader.
///
/// The target is reset with BOOT0 high, given time to start its factory
/// bootloader, then probed with the autobaud byte and interrogated with Get
/// and Get ID.
///
/// * **[`BootloaderReadyEvent`] => [`NegotiatedState`]** with the device's
///   self-description,
/// * **[`FailedEvent`] => [`TearingDownState`]** on any GPIO, transport or
///   protocol failure along the way.
pub(crate) struct InSystemMemoryState {
    /// Consumed and moved on the transition out of this state.
    pub port: Option<Box<dyn UartPort>>,
}
impl Runnable for InSystemMemoryState {
    fn run(&mut self, ctx: &mut Context<'_>) -> Event {
        info!("=> InSystemMemory");
        if let Some(mut port) = self.port.take() {
            if let Err(error) = enter_system_memory(ctx) {
                return Event::Failed(FailedEvent {
                    port: Some(port),
                    error,
                });
            }

            let device = protocol::enter_bootloader(port.as_mut())
                .and_then(|_| protocol::get(port.as_mut()))
                .and_then(|(version, commands)| {
                    let product_id = protocol::get_id(port.as_mut(), &commands)?;
                    Ok(DeviceState {
                        bootloader_version: version,
                        available_commands: commands,
                        product_id,
                    })
                });
            return match device {
                Ok(device) => Event::BootloaderReady(BootloaderReadyEvent { port, device }),
                Err(error) => Event::Failed(FailedEvent {
                    port: Some(port),
                    error,
                }),
            };
        }

        // We should never reach here!
        unreachable!()
    }
}
impl std::fmt::Debug for InSystemMemoryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InSystemMemoryState").finish_non_exhaustive()
    }
}

/// Reset into the factory bootloader: BOOT0 high while reset is held, then
/// release and wait for the bootloader to come up.
fn enter_system_memory(ctx: &mut Context<'_>) -> Result<(), Error> {
    let mut pins = ctx.pins();
    pins.assert_reset()?;
    pins.select_system_memory()?;
    thread::sleep(RESET_SETTLE);
    pins.deassert_reset()?;
    debug!("waiting for the bootloader to start");
    thread::sleep(BOOTLOADER_STARTUP);
    Ok(())
}

// Negotiated State ============================================================

/// The command set is known; check it covers the flash sequence before any
/// of it goes on the wire.
///
/// * **[`WorkAuthorizedEvent`] => [`WorkingState`]** when erase and write
///   are both advertised,
/// * **[`FailedEvent`] => [`TearingDownState`]** with `UnsupportedCommand`
///   otherwise. Nothing has been erased at this point.
pub(crate) struct NegotiatedState {
    pub port: Option<Box<dyn UartPort>>,
    pub device: Option<DeviceState>,
}
impl Runnable for NegotiatedState {
    fn run(&mut self, _ctx: &mut Context<'_>) -> Event {
        info!("=> Negotiated");
        if let (Some(port), Some(device)) = (self.port.take(), self.device.take()) {
            for required in [Command::Erase, Command::WriteMemory] {
                if !device.available_commands.supports(required) {
                    return Event::Failed(FailedEvent {
                        port: Some(port),
                        error: Error::UnsupportedCommand {
                            opcode: required as u8,
                        },
                    });
                }
            }
            return Event::WorkAuthorized(WorkAuthorizedEvent { port, device });
        }

        // We should never reach here!
        unreachable!()
    }
}
impl std::fmt::Debug for NegotiatedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiatedState")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

// Working State ===============================================================

/// Erase the application flash and write the whole image.
///
/// * **[`WorkDoneEvent`] => [`TearingDownState`]** always, carrying the
///   outcome of the sequence.
pub(crate) struct WorkingState {
    pub port: Option<Box<dyn UartPort>>,
    pub device: Option<DeviceState>,
}
impl Runnable for WorkingState {
    fn run(&mut self, ctx: &mut Context<'_>) -> Event {
        info!("=> Working");
        if let (Some(mut port), Some(device)) = (self.port.take(), self.device.take()) {
            let commands = &device.available_commands;
            let outcome = protocol::erase_all(port.as_mut(), commands).and_then(|_| {
                flash::write_all(
                    port.as_mut(),
                    commands,
                    ctx.address,
                    ctx.data,
                    &mut *ctx.progress,
                )
            });
            return Event::WorkDone(WorkDoneEvent { port, outcome });
        }

        // We should never reach here!
        unreachable!()
    }
}
impl std::fmt::Debug for WorkingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingState")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

// TearingDown State ===========================================================

/// Restore the target to main-flash boot, whatever happened before.
///
/// The exit sequence always runs in full: assert reset, BOOT0 back to main
/// flash, close the port, release reset so the application starts. The
/// result carried onwards is the inner outcome, unless teardown itself
/// failed after a clean run.
///
/// * **[`TornDownEvent`] => [`DoneState`]** always.
pub(crate) struct TearingDownState {
    pub port: Option<Box<dyn UartPort>>,
    pub outcome: Option<Result<(), Error>>,
}
impl Runnable for TearingDownState {
    fn run(&mut self, ctx: &mut Context<'_>) -> Event {
        info!("=> TearingDown");
        let inner = self.outcome.take().unwrap_or(Ok(()));
        let teardown = restore_main_flash(ctx, self.port.take());
        let result = match (inner, teardown) {
            (Ok(()), Ok(())) => Ok(()),
            (Ok(()), Err(error)) => Err(Error::TeardownFailed(Box::new(error))),
            (Err(inner), Ok(())) => Err(inner),
            (Err(inner), Err(error)) => {
                warn!("teardown failed as well: {}", error);
                Err(inner)
            }
        };
        Event::TornDown(TornDownEvent { result })
    }
}
impl std::fmt::Debug for TearingDownState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TearingDownState")
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

/// Every step is attempted even when an earlier one fails; the first error
/// is the one reported.
fn restore_main_flash(ctx: &mut Context<'_>, port: Option<Box<dyn UartPort>>) -> Result<(), Error> {
    let mut first_error: Option<Error> = None;
    let mut note = |step: Result<(), Error>| {
        if let Err(error) = step {
            warn!("teardown step failed: {}", error);
            if first_error.is_none() {
                first_error = Some(error);
            }
        }
    };

    let mut pins = ctx.pins();
    note(pins.assert_reset());
    note(pins.select_main_flash());
    if let Some(mut port) = port {
        match port.close() {
            Ok(()) => debug!("serial port closed"),
            Err(error) if error.to_string().contains("Port is not open") => {
                debug!("serial port already closed");
            }
            Err(error) => note(Err(Error::SerialCloseFailed(error))),
        }
    }
    note(pins.deassert_reset());

    match first_error {
        None => Ok(()),
        Some(error) => Err(error),
    }
}

// Done State ==================================================================

/// Reached when the session is complete and the result is ready to hand
/// back to the caller. Terminal: the session loop stops here instead of
/// running it.
#[derive(Debug)]
pub(crate) struct DoneState {
    pub result: Option<Result<(), Error>>,
}
