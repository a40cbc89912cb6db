//! Integer ids for indexed content units.
//!
//! Ids are keyed by (package instance, unit NTIID) so that the old and the
//! new value of a replaced package hold distinct registrations while both
//! are alive.

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::trace;

use crate::ntiid::Ntiid;
use crate::unit::ContentPackage;

#[derive(Debug, Default)]
struct Registrations {
    next_id: u64,
    by_instance: HashMap<u64, HashMap<Ntiid, u64>>,
}

/// Shared between every library of one process via `Arc`.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    inner: Mutex<Registrations>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every unit of `package`. Units already registered keep
    /// their id. Returns the number of new registrations.
    pub fn register_package(&self, package: &ContentPackage) -> usize {
        let mut inner = self.inner.lock();
        let Registrations {
            next_id,
            by_instance,
        } = &mut *inner;
        let ids = by_instance.entry(package.instance()).or_default();
        let mut registered = 0;
        for (_, unit) in package.unit().flatten() {
            if !ids.contains_key(&unit.ntiid) {
                *next_id += 1;
                ids.insert(unit.ntiid.clone(), *next_id);
                registered += 1;
            }
        }
        trace!(package = %package.ntiid(), registered, "Registered content units");
        registered
    }

    /// Drops every registration of `package`. Returns how many were dropped.
    pub fn unregister_package(&self, package: &ContentPackage) -> usize {
        let removed = self
            .inner
            .lock()
            .by_instance
            .remove(&package.instance())
            .map(|ids| ids.len())
            .unwrap_or(0);
        trace!(package = %package.ntiid(), removed, "Unregistered content units");
        removed
    }

    pub fn id_for(&self, instance: u64, ntiid: &str) -> Option<u64> {
        self.inner
            .lock()
            .by_instance
            .get(&instance)
            .and_then(|ids| ids.get(ntiid).copied())
    }

    pub fn is_registered(&self, instance: u64, ntiid: &str) -> bool {
        self.id_for(instance, ntiid).is_some()
    }

    /// Total number of registered units.
    pub fn len(&self) -> usize {
        self.inner.lock().by_instance.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::ContentUnit;

    #[test]
    fn replaced_values_hold_separate_ids() {
        let registry = IdentityRegistry::new();
        let old = ContentPackage::new(
            ContentUnit::new("P1").with_child(ContentUnit::new("P1.c1")),
            1.0,
        );
        let new = old.clone();

        assert_eq!(registry.register_package(&old), 2);
        assert_eq!(registry.register_package(&old), 0);
        assert_eq!(registry.register_package(&new), 2);
        assert_ne!(
            registry.id_for(old.instance(), "P1.c1"),
            registry.id_for(new.instance(), "P1.c1")
        );

        assert_eq!(registry.unregister_package(&old), 2);
        assert!(!registry.is_registered(old.instance(), "P1"));
        assert!(registry.is_registered(new.instance(), "P1"));
        assert_eq!(registry.len(), 2);
    }
}
