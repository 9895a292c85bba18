use std::any::Any;
use std::sync::Arc;

use crate::actor::ActorHandle;

/// An opaque, shareable context value.
pub type ContextValue = Arc<dyn Any + Send + Sync>;

/// Request-scoped key/value data carried alongside invocations.
///
/// An execution context is an ordered map of string keys to opaque values
/// plus a list of declared *collaborator* actors. A proxy snapshots the
/// calling actor's context at the moment of enqueue, so a supervisor that is
/// informed of a failure later observes the keys that were present when the
/// failing call was made, not the keys at delivery time.
///
/// The distinguished [empty context](ExecutionContext::empty) silently drops
/// mutations; it stands in for invocations made outside any request scope.
#[derive(Clone, Default)]
pub struct ExecutionContext {
    entries: Vec<(String, ContextValue)>,
    collaborators: Vec<ActorHandle>,
    inert: bool,
}

impl ExecutionContext {
    pub fn new() -> Self {
        ExecutionContext::default()
    }

    /// The empty context. `set` is ignored; `copy` and `propagate` remain
    /// valid operations.
    pub fn empty() -> Self {
        ExecutionContext {
            entries: Vec::new(),
            collaborators: Vec::new(),
            inert: true,
        }
    }

    pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Option<Arc<T>> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| Arc::clone(v).downcast::<T>().ok())
    }

    /// Sets `key` in place, preserving insertion order for new keys.
    /// Dropped silently on the empty context.
    pub fn set<T: Any + Send + Sync>(&mut self, key: impl Into<String>, value: T) {
        if self.inert {
            return;
        }
        let key = key.into();
        let value: ContextValue = Arc::new(value);
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Removes all keys. Collaborators stay declared.
    pub fn reset(&mut self) {
        self.entries.clear();
    }

    pub fn has_context(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// A structurally-independent clone of both the map and the
    /// collaborator list. Values themselves are shared.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Declares additional collaborators; extends, never replaces.
    pub fn collaborators(&mut self, list: Vec<ActorHandle>) {
        self.collaborators.extend(list);
    }

    pub fn collaborator_count(&self) -> usize {
        self.collaborators.len()
    }

    /// Replaces each declared collaborator's current context map with a
    /// shallow copy of this one's map. The collaborator's own declared
    /// collaborators are untouched.
    pub fn propagate(&self) {
        for collaborator in &self.collaborators {
            collaborator.adopt_context(self.entries.clone());
        }
    }

    pub(crate) fn adopt_entries(&mut self, entries: Vec<(String, ContextValue)>) {
        if self.inert {
            return;
        }
        self.entries = entries;
    }

    pub(crate) fn entries(&self) -> &[(String, ContextValue)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_roundtrip_preserves_order() {
        let mut ctx = ExecutionContext::new();
        ctx.set("tenant", "acme".to_string());
        ctx.set("request", 42u64);
        ctx.set("tenant", "initech".to_string());

        assert_eq!(ctx.count(), 2);
        assert_eq!(*ctx.get::<String>("tenant").unwrap(), "initech");
        assert_eq!(*ctx.get::<u64>("request").unwrap(), 42);
        assert_eq!(ctx.entries()[0].0, "tenant");
    }

    #[test]
    fn copy_is_structurally_independent() {
        let mut ctx = ExecutionContext::new();
        ctx.set("k", 1u32);
        let snapshot = ctx.copy();
        ctx.set("k", 2u32);
        ctx.set("extra", 3u32);

        assert_eq!(*snapshot.get::<u32>("k").unwrap(), 1);
        assert_eq!(snapshot.count(), 1);
    }

    #[test]
    fn empty_context_drops_mutations() {
        let mut ctx = ExecutionContext::empty();
        ctx.set("k", 1u32);
        assert!(!ctx.has_context());
        assert_eq!(ctx.count(), 0);

        let mut copied = ctx.copy();
        copied.set("k", 1u32);
        assert_eq!(copied.count(), 0);
    }
}
