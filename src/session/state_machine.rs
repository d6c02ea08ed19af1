//! The flash session state machine.
//!
//! A session takes the target from normal execution into system-memory
//! boot, negotiates the bootloader command set, runs the erase + write
//! sequence, and restores main-flash boot. The exit path is part of the
//! machine itself: every failure transitions into `TearingDown`, so the
//! target is never left wired for system memory, whichever step gave up.
//!
//! ```text
//!            START
//!              |
//!              v
//!         .---------.
//!         | Opening |-------------------.
//!         '---------'                   |
//!              |                        |
//!              v                        |
//!     .----------------.               any
//!     | InSystemMemory |------------ failure
//!     '----------------'               |
//!              |                        |
//!              v                        |
//!       .------------.                  |
//!       | Negotiated |------------------|
//!       '------------'                  |
//!              |                        |
//!              v                        v
//!        .---------.            .-------------.
//!        | Working |----------->| TearingDown |
//!        '---------'            '-------------'
//!                                       |
//!                                       v
//!                                   .------.
//!                                   | Done |
//!                                   '------'
//! ```

use super::events::*;
use super::states::*;
use crate::error::Result;
use crate::flash::Progress;
use crate::gpio::{GpioBackend, TargetPins};
use crate::settings::Settings;
use crate::uart::UartBackend;

// =============================================================================
// Crate-Public Interface
// =============================================================================

/// Everything a session borrows from the driver for its lifetime: the
/// configuration, both collaborators, and the flash job itself.
pub(crate) struct Context<'a> {
    pub settings: &'a Settings,
    pub gpio: &'a mut dyn GpioBackend,
    pub uart: &'a mut dyn UartBackend,
    /// Base address the image is written to.
    pub address: u32,
    /// The raw image.
    pub data: &'a [u8],
    /// Invoked once per packet written.
    pub progress: &'a mut dyn FnMut(Progress),
}

impl Context<'_> {
    pub(crate) fn pins(&mut self) -> TargetPins<'_> {
        TargetPins::new(self.gpio, self.settings.reset_pin, self.settings.boot0_pin)
    }
}

/// Run one full session to completion and return what the caller should
/// see. The state machine event loop runs until the `Done` state is
/// reached.
pub(crate) fn run(mut ctx: Context<'_>) -> Result<()> {
    let mut sm = SessionStates::Opening(OpeningState {});
    loop {
        sm = sm.step(&mut ctx);
        if let SessionStates::Done(state) = &mut sm {
            if let Some(result) = state.result.take() {
                return result;
            }
        }
    }
}

// =============================================================================
// Private stuff
// =============================================================================

/// An enum wrapper around the states of the session state machine. It
/// provides a simple model for manipulating states and their transitions.
enum SessionStates {
    Opening(OpeningState),
    InSystemMemory(InSystemMemoryState),
    Negotiated(NegotiatedState),
    Working(WorkingState),
    TearingDown(TearingDownState),
    Done(DoneState),
}
impl SessionStates {
    /// The unit of work in the state machine event loop. It runs the
    /// current state and consumes the returned event to decide the next
    /// transition. State transitions from events are implemented using the
    /// rust `From`/`Into` pattern, so only the transitions spelled out
    /// below exist.
    fn step(self, ctx: &mut Context<'_>) -> Self {
        match self {
            SessionStates::Opening(mut state) => {
                let event = state.run(ctx);
                match event {
                    Event::PortOpened(ev) => SessionStates::InSystemMemory(ev.into()),
                    Event::Failed(ev) => SessionStates::TearingDown(ev.into()),
                    event => unreachable!("illegal event {:?} at current state {:?}", event, state),
                }
            }
            SessionStates::InSystemMemory(mut state) => {
                let event = state.run(ctx);
                match event {
                    Event::BootloaderReady(ev) => SessionStates::Negotiated(ev.into()),
                    Event::Failed(ev) => SessionStates::TearingDown(ev.into()),
                    event => unreachable!("illegal event {:?} at current state {:?}", event, state),
                }
            }
            SessionStates::Negotiated(mut state) => {
                let event = state.run(ctx);
                match event {
                    Event::WorkAuthorized(ev) => SessionStates::Working(ev.into()),
                    Event::Failed(ev) => SessionStates::TearingDown(ev.into()),
                    event => unreachable!("illegal event {:?} at current state {:?}", event, state),
                }
            }
            SessionStates::Working(mut state) => {
                let event = state.run(ctx);
                match event {
                    Event::WorkDone(ev) => SessionStates::TearingDown(ev.into()),
                    event => unreachable!("illegal event {:?} at current state {:?}", event, state),
                }
            }
            SessionStates::TearingDown(mut state) => {
                let event = state.run(ctx);
                match event {
                    Event::TornDown(ev) => SessionStates::Done(ev.into()),
                    event => unreachable!("illegal event {:?} at current state {:?}", event, state),
                }
            }
            SessionStates::Done(_) => {
                unreachable!("the session does not step out of Done")
            }
        }
    }
}

// -----------------------------------------------------------------------------
// State from Event transitions
// -----------------------------------------------------------------------------

impl From<PortOpenedEvent> for InSystemMemoryState {
    fn from(event: PortOpenedEvent) -> InSystemMemoryState {
        InSystemMemoryState {
            port: Some(event.port),
        }
    }
}

impl From<BootloaderReadyEvent> for NegotiatedState {
    fn from(event: BootloaderReadyEvent) -> NegotiatedState {
        NegotiatedState {
            port: Some(event.port),
            device: Some(event.device),
        }
    }
}

impl From<WorkAuthorizedEvent> for WorkingState {
    fn from(event: WorkAuthorizedEvent) -> WorkingState {
        WorkingState {
            port: Some(event.port),
            device: Some(event.device),
        }
    }
}

impl From<WorkDoneEvent> for TearingDownState {
    fn from(event: WorkDoneEvent) -> TearingDownState {
        TearingDownState {
            port: Some(event.port),
            outcome: Some(event.outcome),
        }
    }
}

impl From<FailedEvent> for TearingDownState {
    fn from(event: FailedEvent) -> TearingDownState {
        TearingDownState {
            port: event.port,
            outcome: Some(Err(event.error)),
        }
    }
}

impl From<TornDownEvent> for DoneState {
    fn from(event: TornDownEvent) -> DoneState {
        DoneState {
            result: Some(event.result),
        }
    }
}
