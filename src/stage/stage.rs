use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Instant, SystemTime};

use dashmap::DashMap;
use slog::{debug, error, o, warn, Logger};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::actor::cell::ActorCell;
use crate::actor::supervision::{BootstrapSupervisor, PrivateRoot, PublicRoot};
use crate::actor::{
    Actor, ActorError, ActorHandle, Address, Context, Definition, Environment, ExecutionContext,
    LifeCycle, Proxy, Supervised, Supervisor, DEFAULT_SUPERVISOR, PRIVATE_ROOT, PUBLIC_ROOT,
};
use crate::config::{load_config, Config};
use crate::kernel::invocation::{Completion, Invocation, InvocationFn};
use crate::kernel::{Mailbox, MailboxConfig};
use crate::stage::dead_letter::DeadLetters;
use crate::stage::directory::Directory;
use crate::stage::logger::default_log;
use crate::stage::timer::Scheduler;

/// Errors surfaced by stage operations.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage is closed")]
    Closed,

    #[error("failed to create actor `{type_name}`")]
    CreateFailed {
        type_name: String,
        #[source]
        source: ActorError,
    },

    #[error("no value registered under `{0}`")]
    ValueNotRegistered(String),

    #[error("value registered under `{0}` has a different type")]
    ValueTypeMismatch(String),
}

/// Per-spawn overrides for [`Stage::actor_for_in`].
#[derive(Default)]
pub struct SpawnOptions {
    parent: Option<ActorHandle>,
    supervisor_name: Option<String>,
    mailbox: Option<MailboxConfig>,
}

impl SpawnOptions {
    pub fn new() -> Self {
        SpawnOptions::default()
    }

    /// Parents the new actor under `parent` instead of the public root.
    pub fn parent(mut self, parent: ActorHandle) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Names the supervisor responsible for the new actor.
    pub fn supervisor(mut self, name: impl Into<String>) -> Self {
        self.supervisor_name = Some(name.into());
        self
    }

    /// Overrides the mailbox configuration, e.g. to bound it.
    pub fn mailbox(mut self, mailbox: MailboxConfig) -> Self {
        self.mailbox = Some(mailbox);
        self
    }
}

struct Roots {
    private: ActorHandle,
    public: ActorHandle,
}

struct StageInner {
    id: Uuid,
    name: String,
    config: Config,
    log: Logger,
    handle: Handle,
    directory: Directory,
    dead_letters: DeadLetters,
    scheduler: Scheduler,
    supervisors: DashMap<String, Arc<dyn Supervisor>>,
    values: DashMap<String, Arc<dyn Any + Send + Sync>>,
    roots: OnceLock<Roots>,
    closed: AtomicBool,
    started_at: SystemTime,
    started_moment: Instant,
}

/// The runtime facade: creates actors, indexes them, routes failures and
/// owns the process-wide registries.
///
/// A `Stage` is cheap to clone; create one per application. Root actors are
/// bootstrapped lazily by the first operation that needs the default
/// parent.
#[derive(Clone)]
pub struct Stage {
    inner: Arc<StageInner>,
}

/// Builds a [`Stage`] with overrides for name, configuration and logger.
#[derive(Default)]
pub struct StageBuilder {
    name: Option<String>,
    cfg: Option<Config>,
    log: Option<Logger>,
}

impl StageBuilder {
    pub fn new() -> Self {
        StageBuilder::default()
    }

    pub fn name(self, name: &str) -> Self {
        StageBuilder {
            name: Some(name.to_string()),
            ..self
        }
    }

    pub fn cfg(self, cfg: Config) -> Self {
        StageBuilder {
            cfg: Some(cfg),
            ..self
        }
    }

    pub fn log(self, log: Logger) -> Self {
        StageBuilder {
            log: Some(log),
            ..self
        }
    }

    /// Creates the stage. Must run inside a tokio runtime, whose handle the
    /// stage captures for mailbox drains and scheduled jobs.
    pub fn create(self) -> Stage {
        let name = self.name.unwrap_or_else(|| "stagecraft".to_string());
        let cfg = self.cfg.unwrap_or_else(load_config);
        let log = self.log.unwrap_or_else(|| default_log(&cfg));
        Stage::create(name, log, cfg)
    }
}

static PROCESS_STAGE: OnceLock<Stage> = OnceLock::new();

/// The process-wide stage, created on first access.
pub fn stage() -> Stage {
    PROCESS_STAGE.get_or_init(Stage::new).clone()
}

impl Stage {
    /// A stage with defaults: configuration from [`load_config`], the
    /// default logger. Must run inside a tokio runtime.
    pub fn new() -> Stage {
        StageBuilder::new().create()
    }

    fn create(name: String, log: Logger, config: Config) -> Stage {
        let handle = Handle::current();
        let stage = Stage {
            inner: Arc::new(StageInner {
                id: Uuid::new_v4(),
                name,
                directory: Directory::new(&config.directory),
                dead_letters: DeadLetters::new(),
                scheduler: Scheduler::new(handle.clone()),
                supervisors: DashMap::new(),
                values: DashMap::new(),
                roots: OnceLock::new(),
                closed: AtomicBool::new(false),
                started_at: SystemTime::now(),
                started_moment: Instant::now(),
                config,
                log,
                handle,
            }),
        };

        debug!(stage.inner.log, "stage started";
               "name" => %stage.inner.name, "id" => %stage.inner.id);
        stage
    }

    // --- metadata --------------------------------------------------------

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn start_date(&self) -> SystemTime {
        self.inner.started_at
    }

    /// Seconds since the stage started.
    pub fn uptime(&self) -> u64 {
        self.inner.started_moment.elapsed().as_secs()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn logger(&self) -> &Logger {
        &self.inner.log
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn dead_letters(&self) -> &DeadLetters {
        &self.inner.dead_letters
    }

    /// A fresh actor address from the default factory.
    pub fn address(&self) -> Address {
        Address::new_unique()
    }

    /// A fresh, empty execution context.
    pub fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::new()
    }

    /// Spawns a future on the stage's runtime.
    pub fn run<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.handle.spawn(future)
    }

    // --- actor creation and lookup --------------------------------------

    /// Creates an actor from `definition` under the public root with the
    /// `default` supervisor, and returns its proxy.
    pub fn actor_for<A: Actor>(&self, definition: Definition) -> Result<Proxy<A>, StageError> {
        self.actor_for_in(definition, SpawnOptions::default())
    }

    /// Creates an actor with explicit parent/supervisor/mailbox overrides.
    pub fn actor_for_in<A: Actor>(
        &self,
        definition: Definition,
        options: SpawnOptions,
    ) -> Result<Proxy<A>, StageError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StageError::Closed);
        }
        let parent = match options.parent {
            Some(parent) => parent,
            None => self.roots().public.clone(),
        };
        let supervisor = options
            .supervisor_name
            .unwrap_or_else(|| DEFAULT_SUPERVISOR.to_string());
        self.spawn(definition, Some(parent), supervisor, options.mailbox)
    }

    /// Directory lookup by address.
    pub fn actor_of(&self, address: &Address) -> Option<ActorHandle> {
        self.inner.directory.get(address)
    }

    /// Directory lookup by type name.
    pub fn actor_of_type(&self, type_name: &str) -> Option<ActorHandle> {
        self.inner.directory.find_by_type(type_name)
    }

    /// Number of live actors, the roots included once bootstrapped.
    pub fn actor_count(&self) -> usize {
        self.inner.directory.count()
    }

    /// Alternate proxy construction over an actor's own cell; used for
    /// self-sends. No directory mutation.
    pub fn actor_proxy_for<A: Actor>(&self, ctx: &Context<A>) -> Proxy<A> {
        Proxy::new(ctx.cell().clone())
    }

    pub(crate) fn spawn_child<C: Actor>(
        &self,
        definition: Definition,
        parent: ActorHandle,
        supervisor_name: String,
    ) -> Result<Proxy<C>, StageError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(StageError::Closed);
        }
        self.spawn(definition, Some(parent), supervisor_name, None)
    }

    fn spawn<A: Actor>(
        &self,
        definition: Definition,
        parent: Option<ActorHandle>,
        supervisor_name: String,
        mailbox: Option<MailboxConfig>,
    ) -> Result<Proxy<A>, StageError> {
        let address = Address::new_unique();
        let definition = definition.at_address(address.clone());
        let logger = self
            .inner
            .log
            .new(o!("actor" => definition.type_name().to_string()));

        let env = Environment::new(
            self.clone(),
            address,
            definition.clone(),
            parent.clone(),
            logger,
            supervisor_name,
        );
        let mailbox = Mailbox::new(mailbox.unwrap_or(self.inner.config.mailbox));
        let cell = ActorCell::new(env, mailbox);

        let actor = A::create(&definition).map_err(|source| StageError::CreateFailed {
            type_name: definition.type_name().to_string(),
            source,
        })?;
        cell.install(actor).map_err(|source| StageError::CreateFailed {
            type_name: definition.type_name().to_string(),
            source,
        })?;

        let proxy = Proxy::new(cell.clone());
        let handle = cell.handle();
        self.inner.directory.set(handle.clone());
        if let Some(parent) = &parent {
            parent.add_child(handle.clone());
        }

        let started = self.run_before_start(&cell);
        self.enqueue_start(&cell);
        if started {
            cell.set_life_cycle(LifeCycle::Running);
            // Lifts the bootstrap suspension; `start` dispatches first.
            cell.resume_mailbox();
        }

        Ok(proxy)
    }

    /// Runs `before_start` synchronously, before the mailbox accepts
    /// messages. A failure is routed to supervision and leaves the mailbox
    /// suspended until the directive arrives.
    fn run_before_start<A: Actor>(&self, cell: &ActorCell<A>) -> bool {
        let Ok(mut dock) = cell.dock().try_lock() else {
            return true;
        };
        let Some(actor) = dock.as_mut() else {
            return true;
        };
        let ctx = Context::new(cell.clone());
        match actor.before_start(&ctx) {
            Ok(()) => true,
            Err(err) => {
                error!(cell.logger(), "before_start failed";
                       "actor" => %cell.address(), "error" => %err);
                cell.set_life_cycle(LifeCycle::Suspended);
                let supervised =
                    Supervised::new(cell.handle(), err, ExecutionContext::empty());
                let stage = self.clone();
                self.run(async move { stage.handle_failure_of(supervised).await });
                false
            }
        }
    }

    /// Enqueues the `start` hook as the first queued activity; its failure
    /// routes to supervision through the regular delivery failure path.
    fn enqueue_start<A: Actor>(&self, cell: &ActorCell<A>) {
        let (completion, _discarded) = Completion::channel();
        let closure: InvocationFn<A> = Box::new(|actor, ctx| {
            Box::pin(async move {
                actor
                    .start(ctx)
                    .await
                    .map(|_| Box::new(()) as Box<dyn Any + Send>)
            })
        });
        let invocation = Invocation::new(
            Arc::from("start()"),
            ExecutionContext::empty(),
            completion,
            closure,
        );
        cell.send(invocation);
    }

    // --- roots -----------------------------------------------------------

    fn roots(&self) -> &Roots {
        self.inner.roots.get_or_init(|| {
            // Two-phase bootstrap: a non-actor fallback supervisor fills
            // the private root's slot until the root actor exists to
            // supervise itself.
            self.inner
                .supervisors
                .insert(PRIVATE_ROOT.to_string(), Arc::new(BootstrapSupervisor));

            let private: Proxy<PrivateRoot> = self
                .spawn(
                    Definition::of::<PrivateRoot>(),
                    None,
                    PRIVATE_ROOT.to_string(),
                    None,
                )
                .expect("private root bootstrap");
            self.inner
                .supervisors
                .insert(PRIVATE_ROOT.to_string(), Arc::new(private.clone()));

            let public: Proxy<PublicRoot> = self
                .spawn(
                    Definition::of::<PublicRoot>(),
                    Some(private.handle()),
                    PRIVATE_ROOT.to_string(),
                    None,
                )
                .expect("public root bootstrap");
            self.inner
                .supervisors
                .insert(PUBLIC_ROOT.to_string(), Arc::new(public.clone()));
            self.inner
                .supervisors
                .insert(DEFAULT_SUPERVISOR.to_string(), Arc::new(public.clone()));

            debug!(self.inner.log, "root hierarchy started";
                   "private" => %private.address(), "public" => %public.address());

            Roots {
                private: private.handle(),
                public: public.handle(),
            }
        })
    }

    // --- supervision -----------------------------------------------------

    /// Registers a supervisor under `name`. Actors that implement
    /// [`Supervisor`] register their proxy, so `inform` is serialized
    /// through their mailbox.
    pub fn register_supervisor(&self, name: impl Into<String>, supervisor: Arc<dyn Supervisor>) {
        self.inner.supervisors.insert(name.into(), supervisor);
    }

    /// Looks a supervisor up by name. The reserved names bootstrap the
    /// root hierarchy on first use.
    pub fn supervisor(&self, name: &str) -> Option<Arc<dyn Supervisor>> {
        if let Some(found) = self.inner.supervisors.get(name) {
            return Some(found.clone());
        }
        if matches!(name, DEFAULT_SUPERVISOR | PUBLIC_ROOT | PRIVATE_ROOT) {
            self.roots();
            return self.inner.supervisors.get(name).map(|s| s.clone());
        }
        None
    }

    /// Failure-routing entry point: resolves the failed actor's supervisor
    /// and delivers `inform`. A failure of that delivery is logged and not
    /// re-routed.
    pub(crate) async fn handle_failure_of(&self, supervised: Supervised) {
        let handle = supervised.handle().clone();
        match handle.resolved_supervisor() {
            Some(supervisor) => {
                if let Err(inform_err) = supervisor.inform(supervised.error(), &supervised).await {
                    error!(self.inner.log, "supervisor failed to handle failure";
                           "actor" => %handle.address(),
                           "supervisor" => handle.supervisor_name(),
                           "error" => %inform_err);
                }
            }
            None => {
                error!(self.inner.log, "no supervisor registered for failed actor";
                       "actor" => %handle.address(),
                       "supervisor" => handle.supervisor_name(),
                       "error" => %supervised.error());
            }
        }
    }

    /// Escalation: forwards the same failure to the named supervisor.
    pub(crate) async fn escalate(
        &self,
        supervisor_name: &str,
        error: &ActorError,
        supervised: &Supervised,
    ) {
        match self.supervisor(supervisor_name) {
            Some(supervisor) => {
                if let Err(inform_err) = supervisor.inform(error, supervised).await {
                    error!(self.inner.log, "escalation target failed";
                           "supervisor" => supervisor_name, "error" => %inform_err);
                }
            }
            None => {
                error!(self.inner.log, "escalation target not registered";
                       "supervisor" => supervisor_name, "error" => %error);
            }
        }
    }

    // --- value registry --------------------------------------------------

    /// Registers `value` under `name`, overwriting any previous entry.
    pub fn register_value<T: Any + Send + Sync>(&self, name: impl Into<String>, value: T) {
        self.inner.values.insert(name.into(), Arc::new(value));
    }

    /// Reads a registered value; errors when absent or of another type.
    pub fn registered_value<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, StageError> {
        let value = self
            .inner
            .values
            .get(name)
            .map(|entry| entry.clone())
            .ok_or_else(|| StageError::ValueNotRegistered(name.to_string()))?;
        value
            .downcast::<T>()
            .map_err(|_| StageError::ValueTypeMismatch(name.to_string()))
    }

    /// Removes and returns the value registered under `name`.
    pub fn deregister_value(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.inner.values.remove(name).map(|(_, value)| value)
    }

    // --- shutdown --------------------------------------------------------

    pub(crate) fn unregister(&self, address: &Address) {
        self.inner.directory.remove(address);
    }

    /// Stops all actors in three phases: user actors first, then registered
    /// supervisors, then the roots (public before private). Errors are
    /// logged and iteration continues.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let root_addresses: HashSet<String> = self
            .inner
            .roots
            .get()
            .map(|roots| {
                [
                    roots.private.address().to_string(),
                    roots.public.address().to_string(),
                ]
                .into()
            })
            .unwrap_or_default();
        let supervisor_addresses: HashSet<String> = self
            .inner
            .supervisors
            .iter()
            .filter_map(|entry| entry.value().address().map(|a| a.to_string()))
            .collect();

        for handle in self.inner.directory.all() {
            let address = handle.address().to_string();
            if root_addresses.contains(&address) || supervisor_addresses.contains(&address) {
                continue;
            }
            self.stop_logged(&handle).await;
        }

        for handle in self.inner.directory.all() {
            let address = handle.address().to_string();
            if root_addresses.contains(&address) {
                continue;
            }
            self.stop_logged(&handle).await;
        }

        if let Some(roots) = self.inner.roots.get() {
            self.stop_logged(&roots.public).await;
            self.stop_logged(&roots.private).await;
        }

        self.inner.scheduler.shutdown();
        debug!(self.inner.log, "stage closed"; "name" => %self.inner.name);
    }

    async fn stop_logged(&self, handle: &ActorHandle) {
        if let Err(stop_err) = handle.stop(None).await {
            warn!(self.inner.log, "actor failed to stop during close";
                  "actor" => %handle.address(), "error" => %stop_err);
        }
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Stage[name: {}, uptime: {}s, actors: {}]",
            self.inner.name,
            self.uptime(),
            self.actor_count()
        )
    }
}
