//! In-flight resolution registry.
//!
//! Tracks the provider call currently running for each key so concurrent
//! callers share one upstream request. A pending resolution is a
//! [`Shared`] future: every caller holding a clone observes the same
//! `Result`, success or failure.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, Shared};

use tally_core::error::Result;

/// Shared handle to an in-progress provider call.
pub type PendingResolution<T> = Shared<BoxFuture<'static, Result<T>>>;

/// How a caller relates to the pending resolution it received.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// The caller registered the resolution and started the provider call.
    Leader,
    /// The caller joined a resolution another caller had already started.
    Joiner,
}

/// Key → pending resolution map.
///
/// [`join_or_register`](Self::join_or_register) and its fallible twin
/// [`try_join_or_register`](Self::try_join_or_register) check and register
/// under one shard lock, so two callers can never both observe "absent" and
/// both become leaders.
pub struct InFlightRegistry<T: Clone> {
    pending: DashMap<String, PendingResolution<T>>,
}

impl<T: Clone + Send + Sync + 'static> InFlightRegistry<T> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            pending: DashMap::new(),
        }
    }

    /// Returns the pending resolution for `key`, if one is running.
    pub fn get(&self, key: &str) -> Option<PendingResolution<T>> {
        self.pending.get(key).map(|pending| pending.clone())
    }

    /// Registers `resolution` for `key`, returning any resolution it replaced.
    ///
    /// Prefer [`join_or_register`](Self::join_or_register); this does not
    /// check for an existing registration first.
    pub fn register(
        &self,
        key: impl Into<String>,
        resolution: PendingResolution<T>,
    ) -> Option<PendingResolution<T>> {
        self.pending.insert(key.into(), resolution)
    }

    /// Removes the registration for `key`. Returns true if one existed.
    pub fn clear(&self, key: &str) -> bool {
        self.pending.remove(key).is_some()
    }

    /// Joins the resolution running for `key`, or registers the one built by `start`.
    ///
    /// `start` runs only when no resolution is registered, and while the key's
    /// shard is locked: it must build the resolution without blocking.
    pub fn join_or_register<F>(&self, key: &str, start: F) -> (PendingResolution<T>, Role)
    where
        F: FnOnce() -> PendingResolution<T>,
    {
        match self.pending.entry(key.to_string()) {
            Entry::Occupied(occupied) => (occupied.get().clone(), Role::Joiner),
            Entry::Vacant(vacant) => {
                let resolution = start();
                vacant.insert(resolution.clone());
                (resolution, Role::Leader)
            }
        }
    }

    /// Like [`join_or_register`](Self::join_or_register), but `start` may
    /// decline by returning `Err`. Nothing is registered then, and the error
    /// is handed back to the caller.
    ///
    /// `start` runs with the key's shard locked, after any previous leader
    /// for `key` has released its slot.
    pub fn try_join_or_register<F, E>(
        &self,
        key: &str,
        start: F,
    ) -> std::result::Result<(PendingResolution<T>, Role), E>
    where
        F: FnOnce() -> std::result::Result<PendingResolution<T>, E>,
    {
        match self.pending.entry(key.to_string()) {
            Entry::Occupied(occupied) => Ok((occupied.get().clone(), Role::Joiner)),
            Entry::Vacant(vacant) => {
                let resolution = start()?;
                vacant.insert(resolution.clone());
                Ok((resolution, Role::Leader))
            }
        }
    }

    /// Number of resolutions currently running.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns true if nothing is running.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for InFlightRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Clears a key's registration when dropped.
///
/// Moved into the task that runs the provider call, so the slot is released
/// on every exit path: success, failure, panic, or the task being aborted.
pub(crate) struct RegistrationGuard<T: Clone + Send + Sync + 'static> {
    registry: Arc<InFlightRegistry<T>>,
    key: String,
}

impl<T: Clone + Send + Sync + 'static> RegistrationGuard<T> {
    pub(crate) fn new(registry: Arc<InFlightRegistry<T>>, key: impl Into<String>) -> Self {
        Self {
            registry,
            key: key.into(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Drop for RegistrationGuard<T> {
    fn drop(&mut self) {
        self.registry.clear(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tally_core::TallyError;

    fn ready(value: Result<u32>) -> PendingResolution<u32> {
        futures::future::ready(value).boxed().shared()
    }

    #[test]
    fn test_first_caller_leads_second_joins() {
        let registry = InFlightRegistry::new();

        let (_, role) = registry.join_or_register("AAPL", || ready(Ok(1)));
        assert_eq!(role, Role::Leader);

        let (pending, role) = registry.join_or_register("AAPL", || panic!("must not start twice"));
        assert_eq!(role, Role::Joiner);
        assert_eq!(pending.now_or_never(), Some(Ok(1)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_keys_are_independent() {
        let registry = InFlightRegistry::new();
        let (_, a) = registry.join_or_register("A", || ready(Ok(1)));
        let (_, b) = registry.join_or_register("B", || ready(Ok(2)));
        assert_eq!((a, b), (Role::Leader, Role::Leader));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_declined_start_registers_nothing() {
        let registry = InFlightRegistry::<u32>::new();
        assert_eq!(registry.try_join_or_register("A", || Err("declined")).err(), Some("declined"));
        assert!(registry.is_empty());

        registry.join_or_register("A", || ready(Ok(1)));
        let (_, role) = registry
            .try_join_or_register::<_, ()>("A", || panic!("must not start while running"))
            .unwrap();
        assert_eq!(role, Role::Joiner);
    }

    #[test]
    fn test_register_get_clear() {
        let registry = InFlightRegistry::new();
        assert!(registry.get("A").is_none());

        assert!(registry.register("A", ready(Err(TallyError::EmptyBatch))).is_none());
        assert!(registry.get("A").is_some());

        assert!(registry.clear("A"));
        assert!(!registry.clear("A"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_guard_clears_on_drop() {
        let registry = Arc::new(InFlightRegistry::new());
        registry.join_or_register("A", || ready(Ok(1)));

        let guard = RegistrationGuard::new(registry.clone(), "A");
        assert_eq!(registry.len(), 1);
        drop(guard);
        assert!(registry.get("A").is_none());

        let (_, role) = registry.join_or_register("A", || ready(Ok(2)));
        assert_eq!(role, Role::Leader);
    }
}
