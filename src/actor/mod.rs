//! Actors, proxies, environments and the supervision contract.

mod actor;
mod address;
pub(crate) mod cell;
mod definition;
pub(crate) mod execution;
mod proxy;
pub(crate) mod supervision;

pub use self::actor::{Actor, ActorError, ActorResult, LifeCycle};
pub use self::address::Address;
pub use self::cell::{ActorHandle, Context, Environment};
pub use self::definition::{Definition, Parameters};
pub use self::execution::{ContextValue, ExecutionContext};
pub use self::proxy::{Outcome, Pending, Proxy};
pub use self::supervision::{
    Directive, Supervised, SupervisionScope, SupervisionStrategy, Supervisor, DEFAULT_SUPERVISOR,
    PRIVATE_ROOT, PUBLIC_ROOT,
};
