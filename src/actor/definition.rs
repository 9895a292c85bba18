use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::actor::{Actor, Address};

/// Parameters handed to an actor's instantiator.
///
/// Actors are not constructed directly. A [`Definition`] carries whatever
/// values the actor's [`create`](crate::actor::Actor::create) method needs,
/// and the stage replays the same definition when a supervisor asks for the
/// actor to be restarted.
#[derive(Clone, Default)]
pub struct Parameters {
    value: Option<Arc<dyn Any + Send + Sync>>,
}

impl Parameters {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Parameters {
            value: Some(Arc::new(value)),
        }
    }

    pub fn none() -> Self {
        Parameters::default()
    }

    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.value.as_deref().and_then(|v| v.downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }
}

/// Immutable description of one actor: its type name, its address and its
/// construction parameters.
///
/// The type name is a short string; type names of root actors and of
/// registered supervisors must be unique process-wide since the directory
/// indexes them.
#[derive(Clone)]
pub struct Definition {
    type_name: Arc<str>,
    address: Address,
    parameters: Parameters,
}

impl Definition {
    /// A definition for actor type `A` with no parameters.
    pub fn of<A: Actor>() -> Self {
        Definition::with_parameters::<A>(Parameters::none())
    }

    /// A definition for actor type `A` carrying `parameters`.
    ///
    /// The address is a placeholder; the stage generates a fresh one at
    /// creation regardless of the address carried here.
    pub fn with_parameters<A: Actor>(parameters: Parameters) -> Self {
        Definition {
            type_name: Arc::from(A::type_name()),
            address: Address::new_unique(),
            parameters,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub(crate) fn at_address(&self, address: Address) -> Self {
        Definition {
            type_name: self.type_name.clone(),
            address,
            parameters: self.parameters.clone(),
        }
    }
}

impl fmt::Debug for Definition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Definition[{} @ {}]", self.type_name, self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameters_downcast_to_their_original_type() {
        let params = Parameters::new(("savings".to_string(), 250u64));
        let (name, balance) = params.get::<(String, u64)>().unwrap();
        assert_eq!(name, "savings");
        assert_eq!(*balance, 250);
        assert!(params.get::<String>().is_none());
    }

    #[test]
    fn empty_parameters() {
        let params = Parameters::none();
        assert!(params.is_empty());
        assert!(params.get::<u32>().is_none());
    }
}
