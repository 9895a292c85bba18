use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

static NEXT_SEQUENTIAL: AtomicU64 = AtomicU64::new(1);

/// Opaque, globally-unique identifier of a single actor.
///
/// Addresses are value types: equality and hashing are strictly by value.
/// They are created by the [`Stage`](crate::stage::Stage) when an actor is
/// born and live until the directory removes them.
///
/// Two interchangeable factories exist. [`Address::new_unique`] is the
/// default and yields a time-ordered 128-bit identifier;
/// [`Address::next_sequential`] yields a process-wide monotonic counter and
/// is intended for tests, where stable short addresses make assertions
/// readable.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    value: AddressValue,
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum AddressValue {
    Unique(Uuid),
    Sequential(u64),
}

impl Address {
    /// A fresh time-ordered identifier. This is the factory the stage uses.
    pub fn new_unique() -> Self {
        Address {
            value: AddressValue::Unique(Uuid::now_v7()),
        }
    }

    /// The next value of a process-wide monotonic counter.
    pub fn next_sequential() -> Self {
        Address {
            value: AddressValue::Sequential(NEXT_SEQUENTIAL.fetch_add(1, Ordering::Relaxed)),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.value {
            AddressValue::Unique(id) => write!(f, "{}", id),
            AddressValue::Sequential(n) => write!(f, "#{}", n),
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Address[{}]", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn sequential_addresses_are_distinct() {
        let a = Address::next_sequential();
        let b = Address::next_sequential();
        assert_ne!(a, b);
        assert_ne!(a.to_string(), b.to_string());
    }

    #[test]
    fn unique_addresses_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..1000 {
            assert!(seen.insert(Address::new_unique().to_string()));
        }
    }

    #[test]
    fn equality_is_by_value() {
        let a = Address::next_sequential();
        let b = a.clone();
        assert_eq!(a, b);
    }
}
