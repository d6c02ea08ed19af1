//! One flash session: enter system memory, do the work, always restore.
//!
//! Implemented as a state machine in terms of **states** and typed
//! transition **events** between them; only transitions for which a `From`
//! implementation exists are possible, so the recovery path - every failure
//! funnels into teardown - is part of the machine's shape rather than
//! something each call site has to remember.

mod events;
mod state_machine;
mod states;

pub(crate) use state_machine::{run, Context};
