use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use slog::{error, warn, Logger};

use crate::actor::execution::ContextValue;
use crate::actor::{
    Actor, ActorError, ActorResult, Address, Definition, ExecutionContext, LifeCycle, Proxy,
    Supervisor,
};
use crate::kernel::mailbox::{run_mailbox, Mailbox, MailboxState, SendOutcome};
use crate::kernel::invocation::Invocation;
use crate::stage::dead_letter::DeadLetterReason;
use crate::stage::{Stage, StageError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-actor runtime context.
///
/// One environment exists per actor and one mailbox per environment. The
/// environment aggregates the actor's address and definition, its position
/// in the hierarchy, its logger, its supervisor name (resolved lazily and
/// cached) and the two execution-context slots: the actor's own declarative
/// context for outgoing invocations, and the snapshot of the invocation
/// currently being delivered.
pub struct Environment {
    stage: Stage,
    address: Address,
    definition: Definition,
    parent: Option<ActorHandle>,
    children: Mutex<Vec<ActorHandle>>,
    logger: Logger,
    supervisor_name: Mutex<String>,
    supervisor: Mutex<Option<Arc<dyn Supervisor>>>,
    context: Mutex<ExecutionContext>,
    delivery_context: Mutex<ExecutionContext>,
    life_cycle: AtomicU8,
    restarts: Mutex<Vec<Instant>>,
}

impl Environment {
    pub(crate) fn new(
        stage: Stage,
        address: Address,
        definition: Definition,
        parent: Option<ActorHandle>,
        logger: Logger,
        supervisor_name: String,
    ) -> Self {
        Environment {
            stage,
            address,
            definition,
            parent,
            children: Mutex::new(Vec::new()),
            logger,
            supervisor_name: Mutex::new(supervisor_name),
            supervisor: Mutex::new(None),
            context: Mutex::new(ExecutionContext::new()),
            delivery_context: Mutex::new(ExecutionContext::empty()),
            life_cycle: AtomicU8::new(LifeCycle::Starting as u8),
            restarts: Mutex::new(Vec::new()),
        }
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    pub fn parent(&self) -> Option<ActorHandle> {
        self.parent.clone()
    }

    pub fn logger(&self) -> &Logger {
        &self.logger
    }

    pub fn life_cycle(&self) -> LifeCycle {
        LifeCycle::from_u8(self.life_cycle.load(Ordering::Acquire))
    }

    pub(crate) fn set_life_cycle(&self, state: LifeCycle) {
        self.life_cycle.store(state as u8, Ordering::Release);
    }

    /// Moves into `Stopping` unless the actor is already stopping or
    /// stopped. Returns whether this caller owns the stop sequence.
    pub(crate) fn begin_stopping(&self) -> bool {
        self.life_cycle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                match LifeCycle::from_u8(current) {
                    LifeCycle::Stopping | LifeCycle::Stopped => None,
                    _ => Some(LifeCycle::Stopping as u8),
                }
            })
            .is_ok()
    }

    pub fn supervisor_name(&self) -> String {
        lock(&self.supervisor_name).clone()
    }

    /// Resolves the supervisor name through the stage, caching the result.
    /// The cache is invalidated on restart so a re-registered name is
    /// picked up.
    pub(crate) fn resolved_supervisor(&self) -> Option<Arc<dyn Supervisor>> {
        let mut cached = lock(&self.supervisor);
        if cached.is_none() {
            *cached = self.stage.supervisor(&self.supervisor_name());
        }
        cached.clone()
    }

    pub(crate) fn invalidate_supervisor(&self) {
        lock(&self.supervisor).take();
    }

    pub(crate) fn children_snapshot(&self) -> Vec<ActorHandle> {
        lock(&self.children).clone()
    }

    pub(crate) fn add_child(&self, child: ActorHandle) {
        lock(&self.children).push(child);
    }

    pub(crate) fn remove_child(&self, address: &Address) {
        lock(&self.children).retain(|child| child.address() != *address);
    }

    /// Copy of the actor's own declarative execution context.
    pub fn execution_context(&self) -> ExecutionContext {
        lock(&self.context).copy()
    }

    pub(crate) fn update_execution_context(&self, f: impl FnOnce(&mut ExecutionContext)) {
        f(&mut lock(&self.context));
    }

    pub(crate) fn adopt_context(&self, entries: Vec<(String, ContextValue)>) {
        lock(&self.context).adopt_entries(entries);
    }

    /// Copy of the execution context of the invocation being delivered, or
    /// the empty context outside a delivery frame.
    pub fn delivery_context(&self) -> ExecutionContext {
        lock(&self.delivery_context).copy()
    }

    pub(crate) fn publish_delivery_context(&self, snapshot: &ExecutionContext) {
        *lock(&self.delivery_context) = snapshot.copy();
    }

    pub(crate) fn clear_delivery_context(&self) {
        *lock(&self.delivery_context) = ExecutionContext::empty();
    }

    pub(crate) fn note_restart(&self, at: Instant) {
        lock(&self.restarts).push(at);
    }

    /// How many restarts fall inside the rolling window ending now.
    pub(crate) fn restarts_in_window(&self, period: Duration) -> usize {
        let mut restarts = lock(&self.restarts);
        let now = Instant::now();
        restarts.retain(|at| now.duration_since(*at) <= period);
        restarts.len()
    }
}

/// The typed cell gluing one actor instance to its environment and mailbox.
///
/// The cell is the unit everything else is derived from: [`Proxy`] wraps it
/// for callers, [`ActorHandle`] erases it for the directory and the
/// supervision machinery, and [`Context`] exposes it to the actor during a
/// delivery frame.
pub struct ActorCell<A: Actor> {
    inner: Arc<CellInner<A>>,
}

impl<A: Actor> Clone for ActorCell<A> {
    fn clone(&self) -> Self {
        ActorCell {
            inner: self.inner.clone(),
        }
    }
}

struct CellInner<A: Actor> {
    env: Environment,
    mailbox: Mailbox<A>,
    dock: tokio::sync::Mutex<Option<A>>,
}

impl<A: Actor> ActorCell<A> {
    pub(crate) fn new(env: Environment, mailbox: Mailbox<A>) -> Self {
        ActorCell {
            inner: Arc::new(CellInner {
                env,
                mailbox,
                dock: tokio::sync::Mutex::new(None),
            }),
        }
    }

    pub(crate) fn install(&self, actor: A) -> ActorResult<()> {
        let mut dock = self
            .inner
            .dock
            .try_lock()
            .map_err(|_| ActorError::internal("dock contended during install"))?;
        *dock = Some(actor);
        Ok(())
    }

    pub(crate) fn environment(&self) -> &Environment {
        &self.inner.env
    }

    pub(crate) fn mailbox(&self) -> &Mailbox<A> {
        &self.inner.mailbox
    }

    pub(crate) fn dock(&self) -> &tokio::sync::Mutex<Option<A>> {
        &self.inner.dock
    }

    pub(crate) fn stage(&self) -> &Stage {
        self.inner.env.stage()
    }

    pub(crate) fn logger(&self) -> &Logger {
        self.inner.env.logger()
    }

    pub(crate) fn address(&self) -> &Address {
        self.inner.env.address()
    }

    pub(crate) fn definition(&self) -> &Definition {
        self.inner.env.definition()
    }

    pub(crate) fn life_cycle(&self) -> LifeCycle {
        self.inner.env.life_cycle()
    }

    pub(crate) fn set_life_cycle(&self, state: LifeCycle) {
        self.inner.env.set_life_cycle(state);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.life_cycle() == LifeCycle::Stopped
    }

    /// The type-erased handle for this cell.
    pub(crate) fn handle(&self) -> ActorHandle {
        ActorHandle::new(Arc::new(self.clone()))
    }

    /// Hands an invocation to the mailbox and triggers dispatch; dead
    /// letters and overflow sentinels are applied here.
    pub(crate) fn send(&self, invocation: Invocation<A>) {
        match self.inner.mailbox.enqueue(invocation) {
            SendOutcome::Queued => {
                if self.inner.mailbox.is_receivable() {
                    self.schedule_dispatch();
                }
            }
            SendOutcome::Closed(invocation) => {
                self.dead_letter(invocation.representation_arc(), DeadLetterReason::ActorStopped);
                invocation.settle_stopped();
            }
            SendOutcome::EvictedOldest(evicted) => {
                evicted.settle_dropped(crate::kernel::DropReason::Overflow);
                if self.inner.mailbox.is_receivable() {
                    self.schedule_dispatch();
                }
            }
            SendOutcome::DroppedNewest(refused) => {
                refused.settle_dropped(crate::kernel::DropReason::Overflow);
            }
            SendOutcome::Rejected(rejected) => {
                self.dead_letter(rejected.representation_arc(), DeadLetterReason::MailboxFull);
                rejected.settle_dropped(crate::kernel::DropReason::MailboxFull);
            }
        }
    }

    /// Spawns the drain task unless one is already scheduled.
    pub(crate) fn schedule_dispatch(&self) {
        if self.inner.mailbox.try_schedule() {
            let cell = self.clone();
            self.stage().run(run_mailbox(cell));
        }
    }

    pub(crate) fn resume_mailbox(&self) {
        self.inner.mailbox.resume();
        if self.inner.mailbox.is_receivable() {
            self.schedule_dispatch();
        }
    }

    pub(crate) fn dead_letter(&self, representation: Arc<str>, reason: DeadLetterReason) {
        self.stage().dead_letters().publish(
            crate::stage::dead_letter::DeadLetter::new(
                self.address().clone(),
                representation,
                reason,
            ),
            self.logger(),
        );
    }

    async fn run_before_resume(&self, error: &ActorError) {
        let ctx = Context::new(self.clone());
        let mut dock = self.inner.dock.lock().await;
        if let Some(actor) = dock.as_mut() {
            if let Err(hook_err) = actor.before_resume(&ctx, error) {
                warn!(self.logger(), "before_resume failed";
                      "actor" => %self.address(), "error" => %hook_err);
            }
        }
    }

    async fn run_restart(&self, error: &ActorError) -> ActorResult<()> {
        self.set_life_cycle(LifeCycle::Restarting);
        let ctx = Context::new(self.clone());
        let mut dock = self.inner.dock.lock().await;

        if let Some(actor) = dock.as_mut() {
            if let Err(hook_err) = actor.before_restart(&ctx, error) {
                warn!(self.logger(), "before_restart failed";
                      "actor" => %self.address(), "error" => %hook_err);
            }
        }

        match A::create(self.definition()) {
            Ok(fresh) => {
                *dock = Some(fresh);
                if let Some(actor) = dock.as_mut() {
                    if let Err(hook_err) = actor.after_restart(&ctx, error) {
                        warn!(self.logger(), "after_restart failed";
                              "actor" => %self.address(), "error" => %hook_err);
                    }
                }
                drop(dock);
                self.environment().invalidate_supervisor();
                self.set_life_cycle(LifeCycle::Running);
                Ok(())
            }
            Err(create_err) => {
                // The previous instance stays docked; the next failure
                // will come back through supervision.
                drop(dock);
                error!(self.logger(), "restart failed to instantiate replacement";
                       "actor" => %self.address(), "error" => %create_err);
                self.set_life_cycle(LifeCycle::Suspended);
                Err(create_err)
            }
        }
    }

    fn run_stop(&self, timeout: Option<Duration>) -> BoxFuture<'static, ActorResult<()>> {
        let cell = self.clone();
        Box::pin(async move {
            if !cell.environment().begin_stopping() {
                // Already stopped or stopping; stop is idempotent.
                return Ok(());
            }
            let task = cell.stage().run(stop_sequence(cell.clone()));
            match timeout {
                None => {
                    let _ = task.await;
                    Ok(())
                }
                Some(limit) => match tokio::time::timeout(limit, task).await {
                    Ok(_) => Ok(()),
                    Err(_) => {
                        // Force-close now; the background sequence still
                        // runs to completion.
                        for invocation in cell.mailbox().close() {
                            cell.dead_letter(
                                invocation.representation_arc(),
                                DeadLetterReason::ActorStopped,
                            );
                            invocation.settle_stopped();
                        }
                        Err(ActorError::StopTimeout(limit))
                    }
                },
            }
        })
    }
}

/// The ordered stop sequence. Hook and child failures are logged and never
/// abort the remaining steps.
async fn stop_sequence<A: Actor>(cell: ActorCell<A>) {
    let ctx = Context::new(cell.clone());

    {
        let mut dock = cell.dock().lock().await;
        if let Some(actor) = dock.as_mut() {
            if let Err(hook_err) = actor.before_stop(&ctx).await {
                warn!(cell.logger(), "before_stop failed";
                      "actor" => %cell.address(), "error" => %hook_err);
            }
        }
    }

    let children = cell.environment().children_snapshot();
    for child in children.iter().rev() {
        if let Err(stop_err) = child.stop(None).await {
            warn!(cell.logger(), "failed to stop child";
                  "child" => %child.address(), "error" => %stop_err);
        }
    }

    if let Some(parent) = cell.environment().parent() {
        parent.remove_child(cell.address());
    }

    for invocation in cell.mailbox().close() {
        cell.dead_letter(invocation.representation_arc(), DeadLetterReason::ActorStopped);
        invocation.settle_stopped();
    }

    cell.stage().unregister(cell.address());

    {
        let mut dock = cell.dock().lock().await;
        if let Some(actor) = dock.as_mut() {
            if let Err(hook_err) = actor.after_stop(&ctx) {
                warn!(cell.logger(), "after_stop failed";
                      "actor" => %cell.address(), "error" => %hook_err);
            }
        }
        *dock = None;
    }

    cell.environment().set_life_cycle(LifeCycle::Stopped);
}

/// Object-safe view over an [`ActorCell`]; what [`ActorHandle`] is made of.
pub(crate) trait CellControl: Send + Sync + 'static {
    fn address(&self) -> &Address;
    fn type_name(&self) -> &str;
    fn definition(&self) -> &Definition;
    fn stage(&self) -> &Stage;
    fn logger(&self) -> &Logger;
    fn life_cycle(&self) -> LifeCycle;
    fn parent(&self) -> Option<ActorHandle>;
    fn children(&self) -> Vec<ActorHandle>;
    fn add_child(&self, child: ActorHandle);
    fn remove_child(&self, address: &Address);
    fn supervisor_name(&self) -> String;
    fn resolved_supervisor(&self) -> Option<Arc<dyn Supervisor>>;
    fn adopt_context(&self, entries: Vec<(String, ContextValue)>);
    fn mailbox_state(&self) -> MailboxState;
    fn resume_mailbox(&self);
    fn resume(&self, error: &ActorError) -> BoxFuture<'static, ()>;
    fn restart(&self, error: &ActorError) -> BoxFuture<'static, ActorResult<()>>;
    fn stop(&self, timeout: Option<Duration>) -> BoxFuture<'static, ActorResult<()>>;
    fn note_restart(&self, at: Instant);
    fn restarts_in_window(&self, period: Duration) -> usize;
}

impl<A: Actor> CellControl for ActorCell<A> {
    fn address(&self) -> &Address {
        ActorCell::address(self)
    }

    fn type_name(&self) -> &str {
        self.definition().type_name()
    }

    fn definition(&self) -> &Definition {
        ActorCell::definition(self)
    }

    fn stage(&self) -> &Stage {
        ActorCell::stage(self)
    }

    fn logger(&self) -> &Logger {
        ActorCell::logger(self)
    }

    fn life_cycle(&self) -> LifeCycle {
        ActorCell::life_cycle(self)
    }

    fn parent(&self) -> Option<ActorHandle> {
        self.environment().parent()
    }

    fn children(&self) -> Vec<ActorHandle> {
        self.environment().children_snapshot()
    }

    fn add_child(&self, child: ActorHandle) {
        self.environment().add_child(child);
    }

    fn remove_child(&self, address: &Address) {
        self.environment().remove_child(address);
    }

    fn supervisor_name(&self) -> String {
        self.environment().supervisor_name()
    }

    fn resolved_supervisor(&self) -> Option<Arc<dyn Supervisor>> {
        self.environment().resolved_supervisor()
    }

    fn adopt_context(&self, entries: Vec<(String, ContextValue)>) {
        self.environment().adopt_context(entries);
    }

    fn mailbox_state(&self) -> MailboxState {
        self.mailbox().state()
    }

    fn resume_mailbox(&self) {
        ActorCell::resume_mailbox(self);
    }

    fn resume(&self, error: &ActorError) -> BoxFuture<'static, ()> {
        let cell = self.clone();
        let error = error.clone();
        Box::pin(async move {
            cell.run_before_resume(&error).await;
            cell.set_life_cycle(LifeCycle::Running);
            ActorCell::resume_mailbox(&cell);
        })
    }

    fn restart(&self, error: &ActorError) -> BoxFuture<'static, ActorResult<()>> {
        let cell = self.clone();
        let error = error.clone();
        Box::pin(async move { cell.run_restart(&error).await })
    }

    fn stop(&self, timeout: Option<Duration>) -> BoxFuture<'static, ActorResult<()>> {
        self.run_stop(timeout)
    }

    fn note_restart(&self, at: Instant) {
        self.environment().note_restart(at);
    }

    fn restarts_in_window(&self, period: Duration) -> usize {
        self.environment().restarts_in_window(period)
    }
}

/// Type-erased reference to a live actor.
///
/// Handles are what the directory stores and what parent/child links are
/// made of; they carry no knowledge of the actor's concrete type. Equality
/// and hashing are by address.
#[derive(Clone)]
pub struct ActorHandle {
    cell: Arc<dyn CellControl>,
}

impl ActorHandle {
    pub(crate) fn new(cell: Arc<dyn CellControl>) -> Self {
        ActorHandle { cell }
    }

    pub fn address(&self) -> Address {
        self.cell.address().clone()
    }

    pub fn type_name(&self) -> &str {
        self.cell.type_name()
    }

    pub fn definition(&self) -> &Definition {
        self.cell.definition()
    }

    pub fn life_cycle(&self) -> LifeCycle {
        self.cell.life_cycle()
    }

    pub fn is_stopped(&self) -> bool {
        self.cell.life_cycle() == LifeCycle::Stopped
    }

    pub fn parent(&self) -> Option<ActorHandle> {
        self.cell.parent()
    }

    pub fn children(&self) -> Vec<ActorHandle> {
        self.cell.children()
    }

    pub fn mailbox_state(&self) -> MailboxState {
        self.cell.mailbox_state()
    }

    pub fn supervisor_name(&self) -> String {
        self.cell.supervisor_name()
    }

    /// Stops the actor, optionally bounded by `timeout`. Idempotent.
    pub fn stop(&self, timeout: Option<Duration>) -> BoxFuture<'static, ActorResult<()>> {
        self.cell.stop(timeout)
    }

    pub(crate) fn stage(&self) -> &Stage {
        self.cell.stage()
    }

    pub(crate) fn logger(&self) -> &Logger {
        self.cell.logger()
    }

    pub(crate) fn add_child(&self, child: ActorHandle) {
        self.cell.add_child(child);
    }

    pub(crate) fn remove_child(&self, address: &Address) {
        self.cell.remove_child(address);
    }

    pub(crate) fn resolved_supervisor(&self) -> Option<Arc<dyn Supervisor>> {
        self.cell.resolved_supervisor()
    }

    pub(crate) fn adopt_context(&self, entries: Vec<(String, ContextValue)>) {
        self.cell.adopt_context(entries);
    }

    pub(crate) fn resume_mailbox(&self) {
        self.cell.resume_mailbox();
    }

    pub(crate) fn resume(&self, error: &ActorError) -> BoxFuture<'static, ()> {
        self.cell.resume(error)
    }

    pub(crate) fn restart(&self, error: &ActorError) -> BoxFuture<'static, ActorResult<()>> {
        self.cell.restart(error)
    }

    pub(crate) fn note_restart(&self, at: Instant) {
        self.cell.note_restart(at);
    }

    pub(crate) fn restarts_in_window(&self, period: Duration) -> usize {
        self.cell.restarts_in_window(period)
    }
}

impl PartialEq for ActorHandle {
    fn eq(&self, other: &ActorHandle) -> bool {
        self.cell.address() == other.cell.address()
    }
}

impl Eq for ActorHandle {}

impl Hash for ActorHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cell.address().hash(state);
    }
}

impl fmt::Debug for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ActorHandle[{} @ {}]", self.type_name(), self.cell.address())
    }
}

impl fmt::Display for ActorHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.type_name(), self.cell.address())
    }
}

/// What an actor sees of its own runtime during a delivery frame or a
/// lifecycle hook.
///
/// Operations are from the actor's perspective: `child_actor_for` creates a
/// child under the current actor, `myself` is the self-proxy used for
/// deferred self-sends.
pub struct Context<A: Actor> {
    cell: ActorCell<A>,
}

impl<A: Actor> Context<A> {
    pub(crate) fn new(cell: ActorCell<A>) -> Self {
        Context { cell }
    }

    /// A proxy wired to this actor's own mailbox. Sends through it are
    /// delivered only after the current frame completes.
    pub fn myself(&self) -> Proxy<A> {
        Proxy::new(self.cell.clone())
    }

    pub fn handle(&self) -> ActorHandle {
        self.cell.handle()
    }

    pub fn stage(&self) -> &Stage {
        self.cell.stage()
    }

    pub fn address(&self) -> &Address {
        self.cell.address()
    }

    pub fn definition(&self) -> &Definition {
        self.cell.definition()
    }

    pub fn logger(&self) -> &Logger {
        self.cell.logger()
    }

    pub fn parent(&self) -> Option<ActorHandle> {
        self.cell.environment().parent()
    }

    pub fn children(&self) -> Vec<ActorHandle> {
        self.cell.environment().children_snapshot()
    }

    /// Creates a child actor parented to this one. A fresh address is
    /// generated regardless of the one carried by `definition`; the
    /// supervisor defaults to this actor's own supervisor name.
    pub fn child_actor_for<C: Actor>(
        &self,
        definition: Definition,
        supervisor_name: Option<&str>,
    ) -> Result<Proxy<C>, StageError> {
        let supervisor = supervisor_name
            .map(str::to_string)
            .unwrap_or_else(|| self.cell.environment().supervisor_name());
        self.stage().spawn_child(definition, self.handle(), supervisor)
    }

    /// Copy of this actor's own declarative execution context.
    pub fn execution_context(&self) -> ExecutionContext {
        self.cell.environment().execution_context()
    }

    /// Mutates this actor's own declarative execution context in place.
    pub fn update_execution_context(&self, f: impl FnOnce(&mut ExecutionContext)) {
        self.cell.environment().update_execution_context(f);
    }

    /// Copy of the execution context snapshot of the invocation currently
    /// being delivered.
    pub fn current_message_context(&self) -> ExecutionContext {
        self.cell.environment().delivery_context()
    }

    pub(crate) fn cell(&self) -> &ActorCell<A> {
        &self.cell
    }
}
