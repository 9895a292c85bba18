use std::collections::VecDeque;
use std::sync::Mutex;

use crate::actor::Actor;
use crate::kernel::invocation::Invocation;
use crate::kernel::mailbox::OverflowPolicy;

pub(crate) enum Offered<A: Actor> {
    /// Accepted into the queue.
    Queued,
    /// Accepted; the previous head was evicted to make room.
    Evicted(Invocation<A>),
    /// Not accepted; the new invocation is handed back (`DropNewest`).
    RefusedNewest(Invocation<A>),
    /// Not accepted; the new invocation is handed back (`Reject`).
    Rejected(Invocation<A>),
}

/// FIFO buffer backing a mailbox.
///
/// Enqueue order is preserved across senders. Capacity enforcement happens
/// under the queue lock so the bound is never overshot by racing senders.
pub(crate) struct InvocationQueue<A: Actor> {
    inner: Mutex<VecDeque<Invocation<A>>>,
}

impl<A: Actor> InvocationQueue<A> {
    pub fn new(capacity_hint: usize) -> Self {
        InvocationQueue {
            inner: Mutex::new(VecDeque::with_capacity(capacity_hint)),
        }
    }

    /// Offers an invocation, honoring the bound when one is set.
    pub fn offer(
        &self,
        invocation: Invocation<A>,
        bounds: Option<(usize, OverflowPolicy)>,
    ) -> Offered<A> {
        let mut queue = self.lock();
        match bounds {
            Some((capacity, policy)) if queue.len() >= capacity => match policy {
                OverflowPolicy::DropOldest => {
                    let evicted = queue.pop_front();
                    queue.push_back(invocation);
                    match evicted {
                        Some(evicted) => Offered::Evicted(evicted),
                        None => Offered::Queued,
                    }
                }
                OverflowPolicy::DropNewest => Offered::RefusedNewest(invocation),
                OverflowPolicy::Reject => Offered::Rejected(invocation),
            },
            _ => {
                queue.push_back(invocation);
                Offered::Queued
            }
        }
    }

    pub fn pop(&self) -> Option<Invocation<A>> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Empties the queue, returning everything still buffered.
    pub fn drain(&self) -> Vec<Invocation<A>> {
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Invocation<A>>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
