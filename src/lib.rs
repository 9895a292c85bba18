#![crate_name = "stagecraft"]
//! A supervised in-process actor runtime.
//!
//! Applications compose programs out of independently-addressable,
//! message-driven actors. Each actor owns private state, processes one
//! invocation at a time from a private mailbox, may spawn children, and is
//! protected by a supervisor that decides how to recover from its failures.
//!
//! The [`stage::Stage`] creates actors and returns a typed
//! [`actor::Proxy`] per actor — the only reference external code ever
//! holds. Proxy calls are packaged as closure-carrying invocations, queued
//! on the target's mailbox, and answered through [`actor::Pending`]
//! futures.

mod config;

pub mod actor;
pub mod kernel;
pub mod stage;

pub use crate::config::{load_config, Config};

/// One-stop imports for applications built on the stage.
pub mod actors {
    pub use crate::actor::*;
    pub use crate::kernel::{DropReason, Mailbox, MailboxConfig, MailboxState, OverflowPolicy};
    pub use crate::stage::{
        stage, DeadLetter, DeadLetterListener, DeadLetterReason, ScheduleId, Scheduler,
        SpawnOptions, Stage, StageBuilder, StageError,
    };
    pub use crate::{load_config, Config};
}
