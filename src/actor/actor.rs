use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::actor::{Context, Definition};

/// Result type used throughout actor code.
pub type ActorResult<T> = Result<T, ActorError>;

/// An error raised by actor code or by the runtime on an actor's behalf.
///
/// Errors are cheap to clone: the same error instance travels to the
/// caller's completion handle and to the supervisor.
#[derive(Clone, Debug, Error)]
pub enum ActorError {
    /// An error raised inside a delivered invocation or a lifecycle hook.
    #[error("{0}")]
    Failure(Arc<anyhow::Error>),

    /// A delivery frame panicked; the panic payload is preserved as text.
    #[error("delivery panicked: {0}")]
    Panicked(Arc<str>),

    /// The actor's instantiator refused to produce an instance.
    #[error("failed to instantiate `{type_name}`: {reason}")]
    CreateFailed {
        type_name: Arc<str>,
        reason: Arc<str>,
    },

    /// `stop(timeout)` elapsed before the stop sequence completed.
    #[error("stop timed out after {0:?}")]
    StopTimeout(Duration),

    /// An invocation's reply could not be represented to the caller.
    #[error("reply type mismatch for `{0}`")]
    BadReply(Arc<str>),

    /// The runtime failed internally; carries a short description.
    #[error("internal: {0}")]
    Internal(Arc<str>),
}

impl ActorError {
    /// Wraps any error as an actor failure.
    pub fn failure(err: impl Into<anyhow::Error>) -> Self {
        ActorError::Failure(Arc::new(err.into()))
    }

    /// A failure from a plain message.
    pub fn msg(message: impl std::fmt::Display) -> Self {
        ActorError::Failure(Arc::new(anyhow::anyhow!("{}", message)))
    }

    /// Looks through a [`ActorError::Failure`] for a concrete error type.
    /// Supervisors use this to pick directives by error kind.
    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        match self {
            ActorError::Failure(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    pub(crate) fn internal(message: impl std::fmt::Display) -> Self {
        ActorError::Internal(Arc::from(message.to_string()))
    }
}

/// The life cycle of one actor.
///
/// `Starting → Running ↔ Suspended → Stopping → Stopped`, with `Restarting`
/// as a transient detour out of `Suspended`. `Stopped` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LifeCycle {
    Starting = 0,
    Running = 1,
    Suspended = 2,
    Restarting = 3,
    Stopping = 4,
    Stopped = 5,
}

impl LifeCycle {
    pub(crate) fn from_u8(value: u8) -> LifeCycle {
        match value {
            0 => LifeCycle::Starting,
            1 => LifeCycle::Running,
            2 => LifeCycle::Suspended,
            3 => LifeCycle::Restarting,
            4 => LifeCycle::Stopping,
            _ => LifeCycle::Stopped,
        }
    }
}

/// The behavior contract every actor implements.
///
/// An actor owns private state and processes one invocation at a time from
/// its mailbox. The only way external code interacts with it is through a
/// [`Proxy`](crate::actor::Proxy) returned by the stage.
///
/// All lifecycle hooks default to no-ops. Hook failures are logged; failures
/// of `before_start` and `start` are additionally routed to supervision.
/// The remaining hooks log-and-continue so that shutdown and restart always
/// run to completion.
#[async_trait]
pub trait Actor: Send + Sized + 'static {
    /// Short type name used to locate root actors and named supervisors in
    /// the directory. Must not collide with the reserved names
    /// `__privateRoot`, `__publicRoot` and `default`.
    fn type_name() -> &'static str;

    /// The instantiator: produces a fresh instance from a definition. Also
    /// invoked on restart, with the definition stored at creation.
    fn create(definition: &Definition) -> ActorResult<Self>;

    /// Runs synchronously before the mailbox accepts messages.
    fn before_start(&mut self, _ctx: &Context<Self>) -> ActorResult<()> {
        Ok(())
    }

    /// The first queued activity after creation.
    async fn start(&mut self, _ctx: &Context<Self>) -> ActorResult<()> {
        Ok(())
    }

    /// Runs on the failed instance before it is replaced.
    fn before_restart(&mut self, _ctx: &Context<Self>, _error: &ActorError) -> ActorResult<()> {
        Ok(())
    }

    /// Runs on the replacement instance after the swap.
    fn after_restart(&mut self, _ctx: &Context<Self>, _error: &ActorError) -> ActorResult<()> {
        Ok(())
    }

    /// Runs before a supervisor resumes this actor's mailbox.
    fn before_resume(&mut self, _ctx: &Context<Self>, _error: &ActorError) -> ActorResult<()> {
        Ok(())
    }

    /// Runs at the head of the stop sequence; may suspend.
    async fn before_stop(&mut self, _ctx: &Context<Self>) -> ActorResult<()> {
        Ok(())
    }

    /// Runs once the actor has left the directory and its mailbox is closed.
    fn after_stop(&mut self, _ctx: &Context<Self>) -> ActorResult<()> {
        Ok(())
    }
}
