use std::time::{Duration, Instant};

use async_trait::async_trait;
use slog::warn;

use crate::actor::{
    Actor, ActorError, ActorHandle, ActorResult, Address, ExecutionContext, Outcome, Proxy,
};

/// Reserved type name of the ultimate root; user code must not reuse it.
pub const PRIVATE_ROOT: &str = "__privateRoot";
/// Reserved type name of the default user root.
pub const PUBLIC_ROOT: &str = "__publicRoot";
/// Reserved supervisor name resolving to the public root.
pub const DEFAULT_SUPERVISOR: &str = "default";

/// A supervisor's decision about a failed actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Replace the instance from its definition, then resume the mailbox.
    Restart,
    /// Keep the instance and its state; resume the mailbox.
    Resume,
    /// Stop the actor; children stop recursively.
    Stop,
    /// Forward the failure to this supervisor's own supervisor.
    Escalate,
}

/// Whether a directive applies to the failed actor alone or to it and its
/// siblings (the co-children of the same parent, the failing actor
/// included).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SupervisionScope {
    One,
    All,
}

/// Restart budget of a supervisor: at most `intensity` restarts within the
/// rolling `period`; a negative intensity means unlimited. Exceeding the
/// budget coerces `Restart` into `Escalate` for that failure.
#[derive(Clone, Copy, Debug)]
pub struct SupervisionStrategy {
    pub intensity: i32,
    pub period: Duration,
    pub scope: SupervisionScope,
}

impl SupervisionStrategy {
    /// Unlimited restarts, one actor at a time.
    pub fn forever() -> Self {
        SupervisionStrategy {
            intensity: -1,
            period: Duration::ZERO,
            scope: SupervisionScope::One,
        }
    }

    /// At most `intensity` restarts within `period`.
    pub fn restart_within(intensity: i32, period: Duration) -> Self {
        SupervisionStrategy {
            intensity,
            period,
            scope: SupervisionScope::One,
        }
    }

    pub fn with_scope(mut self, scope: SupervisionScope) -> Self {
        self.scope = scope;
        self
    }
}

impl Default for SupervisionStrategy {
    fn default() -> Self {
        SupervisionStrategy::forever()
    }
}

/// Transient snapshot of a failed actor handed to its supervisor.
///
/// Carries the failing actor's handle, the error, and the execution-context
/// snapshot that was live when the failing invocation began delivery, so
/// the supervisor can read request-scoped data even though the delivery
/// frame has already exited.
#[derive(Clone)]
pub struct Supervised {
    handle: ActorHandle,
    error: ActorError,
    context: ExecutionContext,
}

impl Supervised {
    pub(crate) fn new(handle: ActorHandle, error: ActorError, context: ExecutionContext) -> Self {
        Supervised {
            handle,
            error,
            context,
        }
    }

    pub fn handle(&self) -> &ActorHandle {
        &self.handle
    }

    pub fn address(&self) -> Address {
        self.handle.address()
    }

    pub fn error(&self) -> &ActorError {
        &self.error
    }

    /// The execution context of the failing invocation, as snapshotted at
    /// enqueue time.
    pub fn execution_context(&self) -> &ExecutionContext {
        &self.context
    }
}

/// The decision-maker for failed actors.
///
/// A supervisor is a capability orthogonal to [`Actor`]: plain values can
/// implement it (the bootstrap supervisor does), and actors that implement
/// it can be registered under a name, in which case `inform` is delivered
/// through their own proxy and mailbox.
#[async_trait]
pub trait Supervisor: Send + Sync + 'static {
    /// Restart budget and scope applied by the default `inform`.
    fn strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::default()
    }

    /// Picks a directive for the error. The default restarts.
    fn decide(&self, error: &ActorError) -> Directive {
        let _ = error;
        Directive::Restart
    }

    /// Name of this supervisor's own supervisor, the escalation target.
    fn escalation_supervisor(&self) -> String {
        DEFAULT_SUPERVISOR.to_string()
    }

    /// The actor address backing this supervisor, when there is one.
    fn address(&self) -> Option<Address> {
        None
    }

    /// Receives a failure and applies a directive. The default
    /// implementation runs [`decide`](Supervisor::decide) under this
    /// supervisor's strategy; implementors needing full control may
    /// override it.
    async fn inform(&self, error: &ActorError, supervised: &Supervised) -> ActorResult<()> {
        enforce(
            self.decide(error),
            self.strategy(),
            self.escalation_supervisor(),
            error,
            supervised,
        )
        .await;
        Ok(())
    }
}

/// Applies a directive under a strategy: intensity accounting, scope
/// fan-out and escalation routing.
pub(crate) async fn enforce(
    directive: Directive,
    strategy: SupervisionStrategy,
    escalation_supervisor: String,
    error: &ActorError,
    supervised: &Supervised,
) {
    let directive = if directive == Directive::Restart && !restart_allowed(&strategy, supervised) {
        Directive::Escalate
    } else {
        directive
    };

    if directive == Directive::Escalate {
        let stage = supervised.handle().stage().clone();
        stage.escalate(&escalation_supervisor, error, supervised).await;
        return;
    }

    let targets = match strategy.scope {
        SupervisionScope::One => vec![supervised.handle().clone()],
        SupervisionScope::All => match supervised.handle().parent() {
            Some(parent) => parent.children(),
            None => vec![supervised.handle().clone()],
        },
    };

    for target in targets {
        apply(directive, error, &target).await;
    }
}

fn restart_allowed(strategy: &SupervisionStrategy, supervised: &Supervised) -> bool {
    if strategy.intensity < 0 {
        return true;
    }
    let used = supervised.handle().restarts_in_window(strategy.period);
    used < strategy.intensity as usize
}

async fn apply(directive: Directive, error: &ActorError, target: &ActorHandle) {
    match directive {
        Directive::Resume => {
            target.resume(error).await;
        }
        Directive::Restart => {
            target.note_restart(Instant::now());
            // Restart failures are logged by the cell; the mailbox is
            // resumed either way so the next bad message re-triggers
            // supervision.
            let _ = target.restart(error).await;
            target.resume_mailbox();
        }
        Directive::Stop => {
            if let Err(stop_err) = target.stop(None).await {
                warn!(target.logger(), "supervised stop failed";
                      "actor" => %target.address(), "error" => %stop_err);
            }
        }
        Directive::Escalate => unreachable!("escalation is routed before fan-out"),
    }
}

/// Actor-backed supervisors are informed through their own proxy, so the
/// decision runs serialized with the supervisor's other messages.
#[async_trait]
impl<A: Actor + Supervisor> Supervisor for Proxy<A> {
    fn address(&self) -> Option<Address> {
        Some(Proxy::address(self).clone())
    }

    fn escalation_supervisor(&self) -> String {
        self.handle().supervisor_name()
    }

    async fn inform(&self, error: &ActorError, supervised: &Supervised) -> ActorResult<()> {
        let error_for_actor = error.clone();
        let supervised_for_actor = supervised.clone();
        let pending: crate::actor::Pending<ActorResult<()>> = self.call_async(
            format!("inform({})", supervised.address()),
            move |actor, _ctx| {
                Box::pin(async move {
                    Ok(actor
                        .inform(&error_for_actor, &supervised_for_actor)
                        .await)
                })
            },
        );
        match pending.await {
            Outcome::Value(result) => result,
            Outcome::Failed(err) => Err(err),
            Outcome::Stopped => Err(ActorError::msg("supervisor is stopped")),
            Outcome::Dropped(reason) => Err(ActorError::msg(reason)),
        }
    }
}

/// Non-actor fallback installed while the roots bootstrap; only stops.
pub(crate) struct BootstrapSupervisor;

#[async_trait]
impl Supervisor for BootstrapSupervisor {
    fn strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::restart_within(0, Duration::ZERO)
    }

    fn decide(&self, _error: &ActorError) -> Directive {
        Directive::Stop
    }

    fn escalation_supervisor(&self) -> String {
        PRIVATE_ROOT.to_string()
    }
}

/// The ultimate ancestor. Stops failing children without retry and is its
/// own supervisor.
pub(crate) struct PrivateRoot;

#[async_trait]
impl Actor for PrivateRoot {
    fn type_name() -> &'static str {
        PRIVATE_ROOT
    }

    fn create(_definition: &crate::actor::Definition) -> ActorResult<Self> {
        Ok(PrivateRoot)
    }
}

#[async_trait]
impl Supervisor for PrivateRoot {
    fn strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::restart_within(0, Duration::ZERO)
    }

    fn decide(&self, _error: &ActorError) -> Directive {
        Directive::Stop
    }

    fn escalation_supervisor(&self) -> String {
        PRIVATE_ROOT.to_string()
    }
}

/// The default ancestor of user actors; restarts failing children forever.
pub(crate) struct PublicRoot;

#[async_trait]
impl Actor for PublicRoot {
    fn type_name() -> &'static str {
        PUBLIC_ROOT
    }

    fn create(_definition: &crate::actor::Definition) -> ActorResult<Self> {
        Ok(PublicRoot)
    }
}

#[async_trait]
impl Supervisor for PublicRoot {
    fn strategy(&self) -> SupervisionStrategy {
        SupervisionStrategy::forever()
    }

    fn decide(&self, _error: &ActorError) -> Directive {
        Directive::Restart
    }

    fn escalation_supervisor(&self) -> String {
        PRIVATE_ROOT.to_string()
    }
}
