use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use slog::{error, trace};
use std::panic::AssertUnwindSafe;

use crate::actor::{Actor, ActorError, Context, LifeCycle, Supervised};
use crate::actor::cell::ActorCell;
use crate::kernel::invocation::{Invocation, Settled};
use crate::kernel::queue::{InvocationQueue, Offered};
use crate::stage::dead_letter::DeadLetterReason;

/// What a bounded mailbox does with new work once it is at capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Evict the head of the queue to make room for the new invocation.
    DropOldest,
    /// Drop the new invocation.
    DropNewest,
    /// Refuse the new invocation and report it as a dead letter.
    Reject,
}

/// Mailbox sizing and overflow behavior.
///
/// `capacity == 0` means unbounded, in which case the overflow policy is
/// never consulted.
#[derive(Clone, Copy, Debug)]
pub struct MailboxConfig {
    pub capacity: usize,
    pub overflow_policy: OverflowPolicy,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        MailboxConfig {
            capacity: 0,
            overflow_policy: OverflowPolicy::Reject,
        }
    }
}

impl MailboxConfig {
    /// A bounded mailbox holding at most `capacity` queued invocations.
    pub fn bounded(capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        MailboxConfig {
            capacity,
            overflow_policy,
        }
    }
}

/// The observable state of a mailbox. A mailbox is in exactly one state;
/// the queue may be non-empty in `Open` and `Suspended`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MailboxState {
    Open,
    Suspended,
    Closed,
}

pub(crate) enum SendOutcome<A: Actor> {
    /// Enqueued; dispatch should be triggered if the mailbox is receivable.
    Queued,
    /// The mailbox is closed; the invocation was never enqueued.
    Closed(Invocation<A>),
    /// The new invocation was enqueued at the cost of the oldest one.
    EvictedOldest(Invocation<A>),
    /// The new invocation was dropped on arrival.
    DroppedNewest(Invocation<A>),
    /// The new invocation was refused outright.
    Rejected(Invocation<A>),
}

/// Per-actor FIFO queue driving one-at-a-time dispatch of invocations.
///
/// State transitions are cooperative: `send` enqueues and triggers a drain
/// task unless one is already scheduled, `suspend`/`resume` flip the state
/// bit, and `close` seals the mailbox for good. The `scheduled` flag
/// guarantees at most one drain task per mailbox at any moment, which is
/// what makes delivery strictly serial.
pub struct Mailbox<A: Actor> {
    inner: Arc<MailboxInner<A>>,
}

impl<A: Actor> Clone for Mailbox<A> {
    fn clone(&self) -> Self {
        Mailbox {
            inner: self.inner.clone(),
        }
    }
}

struct MailboxInner<A: Actor> {
    queue: InvocationQueue<A>,
    config: MailboxConfig,
    suspended: AtomicBool,
    closed: AtomicBool,
    scheduled: AtomicBool,
    dropped: AtomicU64,
}

impl<A: Actor> Mailbox<A> {
    /// A new mailbox, born suspended. The stage resumes it once
    /// `before_start` has run and `start` is enqueued.
    pub(crate) fn new(config: MailboxConfig) -> Self {
        Mailbox {
            inner: Arc::new(MailboxInner {
                queue: InvocationQueue::new(config.capacity.clamp(4, 64)),
                config,
                suspended: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                scheduled: AtomicBool::new(false),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    pub(crate) fn enqueue(&self, invocation: Invocation<A>) -> SendOutcome<A> {
        if self.is_closed() {
            return SendOutcome::Closed(invocation);
        }
        let bounds = (self.inner.config.capacity > 0)
            .then_some((self.inner.config.capacity, self.inner.config.overflow_policy));
        match self.inner.queue.offer(invocation, bounds) {
            Offered::Queued => SendOutcome::Queued,
            Offered::Evicted(evicted) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                SendOutcome::EvictedOldest(evicted)
            }
            Offered::RefusedNewest(refused) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                SendOutcome::DroppedNewest(refused)
            }
            Offered::Rejected(rejected) => {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Rejected(rejected)
            }
        }
    }

    pub(crate) fn pop(&self) -> Option<Invocation<A>> {
        self.inner.queue.pop()
    }

    pub(crate) fn suspend(&self) {
        self.inner.suspended.store(true, Ordering::Release);
    }

    /// Lifts suspension. The cell triggers dispatch when the mailbox
    /// becomes receivable again.
    pub(crate) fn resume(&self) {
        self.inner.suspended.store(false, Ordering::Release);
    }

    /// Seals the mailbox and returns whatever was still queued. Sealing an
    /// already-closed mailbox returns nothing; `close(); close();` is
    /// equivalent to `close();`.
    pub(crate) fn close(&self) -> Vec<Invocation<A>> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }
        self.inner.queue.drain()
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> MailboxState {
        if self.is_closed() {
            MailboxState::Closed
        } else if self.is_suspended() {
            MailboxState::Suspended
        } else {
            MailboxState::Open
        }
    }

    /// `!closed && !suspended && queue non-empty`.
    pub fn is_receivable(&self) -> bool {
        !self.is_closed() && !self.is_suspended() && !self.inner.queue.is_empty()
    }

    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    /// How many invocations this mailbox has dropped under its overflow
    /// policy.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Claims the single drain slot. Returns true when the caller must
    /// spawn the drain task.
    pub(crate) fn try_schedule(&self) -> bool {
        self.inner
            .scheduled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn set_scheduled(&self, scheduled: bool) {
        self.inner.scheduled.store(scheduled, Ordering::Release);
    }
}

/// Drains one mailbox until it stops being receivable.
///
/// At most one of these runs per mailbox. After the drain slot is released
/// the queue is re-checked: a send that raced with the release re-triggers
/// dispatch instead of being lost.
pub(crate) async fn run_mailbox<A: Actor>(cell: ActorCell<A>) {
    let mailbox = cell.mailbox().clone();

    while mailbox.is_receivable() {
        let Some(invocation) = mailbox.pop() else {
            break;
        };
        if let Some(supervised) = deliver(&cell, invocation).await {
            // Delivery failed and the mailbox is suspended; route the
            // failure before releasing the drain slot.
            cell.stage().handle_failure_of(supervised).await;
            break;
        }
    }

    mailbox.set_scheduled(false);
    if mailbox.is_receivable() {
        cell.schedule_dispatch();
    }
}

/// Delivers one invocation against the actor. Returns the failure report
/// when the closure raised and supervision must take over.
async fn deliver<A: Actor>(cell: &ActorCell<A>, invocation: Invocation<A>) -> Option<Supervised> {
    let representation = invocation.representation_arc();

    if cell.is_stopped() {
        cell.dead_letter(representation, DeadLetterReason::ActorStopped);
        invocation.settle_stopped();
        return None;
    }

    let (closure, completion, snapshot) = invocation.into_parts();

    cell.environment().publish_delivery_context(&snapshot);
    snapshot.propagate();

    let ctx = Context::new(cell.clone());
    let result = {
        let mut dock = cell.dock().lock().await;
        match dock.as_mut() {
            Some(actor) => {
                AssertUnwindSafe(async { closure(actor, &ctx).await })
                    .catch_unwind()
                    .await
            }
            None => {
                // The instance is gone; the stop sequence won the race.
                drop(dock);
                cell.environment().clear_delivery_context();
                cell.dead_letter(representation, DeadLetterReason::ActorStopped);
                completion.settle(Settled::Stopped);
                return None;
            }
        }
    };

    let failure = match result {
        Ok(Ok(value)) => {
            trace!(cell.logger(), "delivered";
                   "invocation" => %representation, "actor" => %cell.address());
            completion.settle(Settled::Value(value));
            cell.environment().clear_delivery_context();
            return None;
        }
        Ok(Err(err)) => err,
        Err(panic) => ActorError::Panicked(panic_message(panic)),
    };

    error!(cell.logger(), "invocation failed";
           "invocation" => %representation,
           "actor" => %cell.address(),
           "error" => %failure);
    completion.settle(Settled::Failed(failure.clone()));
    cell.mailbox().suspend();
    cell.set_life_cycle(LifeCycle::Suspended);
    let supervised = Supervised::new(cell.handle(), failure, snapshot.copy());
    cell.environment().clear_delivery_context();
    Some(supervised)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> Arc<str> {
    if let Some(s) = payload.downcast_ref::<&str>() {
        Arc::from(*s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        Arc::from(s.as_str())
    } else {
        Arc::from("opaque panic payload")
    }
}
