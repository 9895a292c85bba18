use std::any::Any;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::oneshot;

use crate::actor::{Actor, ActorError, ActorResult, Context, ExecutionContext};

/// Why an invocation was dropped instead of delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Evicted by a bounded mailbox's `DropOldest`/`DropNewest` policy.
    Overflow,
    /// Refused by a bounded mailbox's `Reject` policy.
    MailboxFull,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DropReason::Overflow => f.write_str("dropped due to overflow"),
            DropReason::MailboxFull => f.write_str("mailbox full"),
        }
    }
}

/// The type-erased settlement of one invocation.
///
/// `Stopped` and `Dropped` are sentinels, not errors: they report that the
/// runtime disposed of the invocation without running it.
pub(crate) enum Settled {
    Value(Box<dyn Any + Send>),
    Failed(ActorError),
    Stopped,
    Dropped(DropReason),
}

/// One-shot result slot of an invocation, settled exactly once.
pub struct Completion {
    tx: oneshot::Sender<Settled>,
}

impl Completion {
    pub(crate) fn channel() -> (Completion, oneshot::Receiver<Settled>) {
        let (tx, rx) = oneshot::channel();
        (Completion { tx }, rx)
    }

    pub(crate) fn settle(self, outcome: Settled) {
        // The caller may have dropped its pending future; nothing to do then.
        let _ = self.tx.send(outcome);
    }
}

/// The closure dispatched against the actor: borrows the instance and the
/// delivery-frame context, returns the erased result.
pub(crate) type InvocationFn<A> = Box<
    dyn for<'a> FnOnce(
            &'a mut A,
            &'a Context<A>,
        ) -> BoxFuture<'a, ActorResult<Box<dyn Any + Send>>>
        + Send,
>;

/// A single queued unit of work: a closure over the target actor, a
/// completion handle and a human-readable representation used for dead
/// letters and logs. Carries a snapshot of the caller's execution context,
/// never the live instance.
pub struct Invocation<A: Actor> {
    closure: InvocationFn<A>,
    representation: Arc<str>,
    completion: Completion,
    context: ExecutionContext,
}

impl<A: Actor> Invocation<A> {
    pub(crate) fn new(
        representation: Arc<str>,
        context: ExecutionContext,
        completion: Completion,
        closure: InvocationFn<A>,
    ) -> Self {
        Invocation {
            closure,
            representation,
            completion,
            context,
        }
    }

    /// The `"method(arg1,arg2)"` projection of this invocation.
    pub fn representation(&self) -> &str {
        &self.representation
    }

    pub(crate) fn representation_arc(&self) -> Arc<str> {
        self.representation.clone()
    }

    pub(crate) fn into_parts(self) -> (InvocationFn<A>, Completion, ExecutionContext) {
        (self.closure, self.completion, self.context)
    }

    /// Settles the completion with the "actor stopped" sentinel without
    /// running the closure.
    pub(crate) fn settle_stopped(self) {
        self.completion.settle(Settled::Stopped);
    }

    /// Settles the completion with a drop sentinel without running the
    /// closure.
    pub(crate) fn settle_dropped(self, reason: DropReason) {
        self.completion.settle(Settled::Dropped(reason));
    }
}

impl<A: Actor> fmt::Debug for Invocation<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Invocation[{}]", self.representation)
    }
}
