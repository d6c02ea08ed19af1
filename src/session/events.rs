//! Events for the flash session state machine.
//!
//! This module is private and restricted to the
//! [`session`](crate::session) scope. Refer to the
//! [`state_machine`](super::state_machine) module for an overview of states,
//! events and transitions.

use std::fmt;

use super::states::DeviceState;
use crate::error::Error;
use crate::uart::UartPort;

// =============================================================================
// Crate-Public Interface
// =============================================================================

// PortOpenedEvent =============================================================

/// Fired when the serial port is open; carries the port into
/// [`InSystemMemoryState`](super::states::InSystemMemoryState).
pub(crate) struct PortOpenedEvent {
    /// The open port, consumed and moved to the next state.
    pub port: Box<dyn UartPort>,
}
impl fmt::Debug for PortOpenedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortOpenedEvent").finish_non_exhaustive()
    }
}

// BootloaderReadyEvent ========================================================

/// Fired once the target sits in system memory and has answered autobaud,
/// Get and Get ID. Triggers the transition to
/// [`NegotiatedState`](super::states::NegotiatedState).
pub(crate) struct BootloaderReadyEvent {
    pub port: Box<dyn UartPort>,
    /// What the bootloader reported about itself.
    pub device: DeviceState,
}
impl fmt::Debug for BootloaderReadyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BootloaderReadyEvent")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

// WorkAuthorizedEvent =========================================================

/// Fired when every command the flash sequence needs is in the advertised
/// set. Triggers the transition to
/// [`WorkingState`](super::states::WorkingState).
pub(crate) struct WorkAuthorizedEvent {
    pub port: Box<dyn UartPort>,
    pub device: DeviceState,
}
impl fmt::Debug for WorkAuthorizedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkAuthorizedEvent")
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}

// WorkDoneEvent ===============================================================

/// Fired when the erase + write sequence finished, successfully or not.
/// Either way the next stop is
/// [`TearingDownState`](super::states::TearingDownState).
pub(crate) struct WorkDoneEvent {
    pub port: Box<dyn UartPort>,
    pub outcome: Result<(), Error>,
}
impl fmt::Debug for WorkDoneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkDoneEvent")
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}

// FailedEvent =================================================================

/// Fired from any state that could not complete; carries whatever resources
/// are still held so teardown can release them.
pub(crate) struct FailedEvent {
    /// The port, if the failure happened after it was opened.
    pub port: Option<Box<dyn UartPort>>,
    pub error: Error,
}
impl fmt::Debug for FailedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailedEvent")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

// TornDownEvent ===============================================================

/// The last event of a session: the target is back on main-flash boot and
/// the port is closed. Carries the result surfaced to the caller.
#[derive(Debug)]
pub(crate) struct TornDownEvent {
    pub result: Result<(), Error>,
}

// Events enum =================================================================

/// Events that can be triggered within the flash session state machine.
///
/// Each value holds an event, which in turn carries the data the target
/// state needs, most importantly the open port making its way through the
/// session.
#[derive(Debug)]
pub(crate) enum Event {
    PortOpened(PortOpenedEvent),
    BootloaderReady(BootloaderReadyEvent),
    WorkAuthorized(WorkAuthorizedEvent),
    WorkDone(WorkDoneEvent),
    Failed(FailedEvent),
    TornDown(TornDownEvent),
}
