use std::any::Any;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context as PollContext, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use slog::Logger;
use tokio::sync::oneshot;

use crate::actor::cell::ActorCell;
use crate::actor::{
    Actor, ActorError, ActorHandle, ActorResult, Address, Context, Definition, ExecutionContext,
    LifeCycle,
};
use crate::kernel::invocation::{Completion, Invocation, InvocationFn, Settled};
use crate::kernel::{DropReason, Mailbox};
use crate::stage::Stage;

/// How an invocation ended, from the caller's point of view.
///
/// `Stopped` and `Dropped` are sentinels, not errors: they report that the
/// runtime disposed of the invocation without running it.
#[derive(Debug)]
pub enum Outcome<T> {
    /// The invocation ran and returned a value.
    Value(T),
    /// The invocation ran and raised; the same error went to supervision.
    Failed(ActorError),
    /// The target was stopped before the invocation could run.
    Stopped,
    /// A bounded mailbox disposed of the invocation.
    Dropped(DropReason),
}

impl<T> Outcome<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Outcome::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(self) -> Option<ActorError> {
        match self {
            Outcome::Failed(error) => Some(error),
            _ => None,
        }
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self, Outcome::Stopped)
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, Outcome::Dropped(_))
    }

    /// Unwraps the value; panics otherwise. Meant for tests and examples.
    pub fn expect_value(self) -> T {
        match self {
            Outcome::Value(value) => value,
            Outcome::Failed(error) => panic!("invocation failed: {}", error),
            Outcome::Stopped => panic!("invocation hit a stopped actor"),
            Outcome::Dropped(reason) => panic!("invocation dropped: {}", reason),
        }
    }
}

/// The caller's side of an invocation: a future resolving to [`Outcome`].
///
/// Dropping a `Pending` abandons the result without cancelling the
/// invocation; the completion is settled exactly once either way.
pub struct Pending<T> {
    rx: oneshot::Receiver<Settled>,
    representation: Arc<str>,
    _reply: PhantomData<fn() -> T>,
}

impl<T> Pending<T> {
    fn new(rx: oneshot::Receiver<Settled>, representation: Arc<str>) -> Self {
        Pending {
            rx,
            representation,
            _reply: PhantomData,
        }
    }
}

impl<T: Send + 'static> Future for Pending<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(Settled::Value(boxed))) => Poll::Ready(match boxed.downcast::<T>() {
                Ok(value) => Outcome::Value(*value),
                Err(_) => Outcome::Failed(ActorError::BadReply(this.representation.clone())),
            }),
            Poll::Ready(Ok(Settled::Failed(error))) => Poll::Ready(Outcome::Failed(error)),
            Poll::Ready(Ok(Settled::Dropped(reason))) => Poll::Ready(Outcome::Dropped(reason)),
            // A dropped completion means the runtime discarded the
            // invocation while tearing the actor down.
            Poll::Ready(Ok(Settled::Stopped)) | Poll::Ready(Err(_)) => Poll::Ready(Outcome::Stopped),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Typed façade over one actor.
///
/// A proxy is the only reference external code ever holds to an actor.
/// A small fixed set of metadata operations is synchronous and delegates
/// directly to the environment; every other call is packaged as an
/// [`Invocation`], enqueued on the target mailbox, and answered through a
/// [`Pending`] future.
///
/// Protocol façades are thin wrappers mapping each protocol operation onto
/// [`Proxy::call`] or [`Proxy::call_async`] with a readable representation:
///
/// ```ignore
/// #[derive(Clone)]
/// struct CounterProxy(Proxy<Counter>);
///
/// impl CounterProxy {
///     fn increment(&self) -> Pending<()> {
///         self.0.call("increment()", |counter, _| {
///             counter.count += 1;
///             Ok(())
///         })
///     }
/// }
/// ```
pub struct Proxy<A: Actor> {
    cell: ActorCell<A>,
}

impl<A: Actor> Clone for Proxy<A> {
    fn clone(&self) -> Self {
        Proxy {
            cell: self.cell.clone(),
        }
    }
}

impl<A: Actor> Proxy<A> {
    pub(crate) fn new(cell: ActorCell<A>) -> Self {
        Proxy { cell }
    }

    // --- the synchronous metadata set -----------------------------------

    pub fn address(&self) -> &Address {
        self.cell.address()
    }

    pub fn definition(&self) -> &Definition {
        self.cell.definition()
    }

    /// Copy of the actor's own declarative execution context.
    pub fn execution_context(&self) -> ExecutionContext {
        self.cell.environment().execution_context()
    }

    pub fn logger(&self) -> &Logger {
        self.cell.logger()
    }

    pub fn life_cycle(&self) -> LifeCycle {
        self.cell.life_cycle()
    }

    pub fn is_stopped(&self) -> bool {
        self.cell.is_stopped()
    }

    pub fn stage(&self) -> &Stage {
        self.cell.stage()
    }

    pub fn type_name(&self) -> &str {
        self.cell.definition().type_name()
    }

    /// The type-erased handle for this actor.
    pub fn handle(&self) -> ActorHandle {
        self.cell.handle()
    }

    /// The actor's mailbox; exposes state and drop accounting.
    pub fn mailbox(&self) -> &Mailbox<A> {
        self.cell.mailbox()
    }

    /// Suspends the mailbox: queued and new invocations are held until
    /// [`resume`](Proxy::resume).
    pub fn suspend(&self) {
        self.cell.mailbox().suspend();
    }

    /// Lifts suspension and triggers dispatch when the mailbox is
    /// receivable.
    pub fn resume(&self) {
        self.cell.resume_mailbox();
    }

    // --- asynchronous dispatch ------------------------------------------

    /// Enqueues a synchronous closure against the actor and returns the
    /// pending result.
    ///
    /// The actor's current execution context is snapshotted at this moment
    /// (the empty context when it holds no keys), so a supervisor informed
    /// of a later failure observes the keys present when the call was made.
    pub fn call<R, F>(&self, representation: impl AsRef<str>, f: F) -> Pending<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut A, &Context<A>) -> ActorResult<R> + Send + 'static,
    {
        let representation: Arc<str> = Arc::from(representation.as_ref());
        let (completion, rx) = Completion::channel();
        let closure: InvocationFn<A> = Box::new(move |actor, ctx| {
            let result = f(actor, ctx).map(|value| Box::new(value) as Box<dyn Any + Send>);
            Box::pin(futures::future::ready(result))
        });
        self.dispatch(representation.clone(), completion, closure);
        Pending::new(rx, representation)
    }

    /// Enqueues a closure that awaits inside the delivery frame. The next
    /// invocation on this mailbox is not dispatched until the returned
    /// future resolves.
    ///
    /// ```ignore
    /// proxy.call_async("refill()", |actor, ctx| Box::pin(async move {
    ///     actor.refill(ctx).await
    /// }));
    /// ```
    pub fn call_async<R, F>(&self, representation: impl AsRef<str>, f: F) -> Pending<R>
    where
        R: Send + 'static,
        F: for<'a> FnOnce(&'a mut A, &'a Context<A>) -> BoxFuture<'a, ActorResult<R>>
            + Send
            + 'static,
    {
        let representation: Arc<str> = Arc::from(representation.as_ref());
        let (completion, rx) = Completion::channel();
        let closure: InvocationFn<A> = Box::new(move |actor, ctx| {
            let reply = f(actor, ctx);
            Box::pin(async move { reply.await.map(|value| Box::new(value) as Box<dyn Any + Send>) })
        });
        self.dispatch(representation.clone(), completion, closure);
        Pending::new(rx, representation)
    }

    /// Stops the actor; see [`ActorHandle::stop`].
    pub async fn stop(&self, timeout: Option<Duration>) -> ActorResult<()> {
        self.handle().stop(timeout).await
    }

    fn dispatch(&self, representation: Arc<str>, completion: Completion, closure: InvocationFn<A>) {
        let snapshot = {
            let own = self.cell.environment().execution_context();
            if own.has_context() {
                own
            } else {
                ExecutionContext::empty()
            }
        };
        let invocation = Invocation::new(representation, snapshot, completion, closure);
        self.cell.send(invocation);
    }
}

impl<A: Actor> PartialEq for Proxy<A> {
    fn eq(&self, other: &Proxy<A>) -> bool {
        self.address() == other.address()
    }
}

impl<A: Actor> Eq for Proxy<A> {}

impl<A: Actor> Hash for Proxy<A> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state);
    }
}

impl<A: Actor> fmt::Debug for Proxy<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Proxy[{} @ {}]", self.type_name(), self.address())
    }
}

impl<A: Actor> fmt::Display for Proxy<A> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.type_name(), self.address())
    }
}
