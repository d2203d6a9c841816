use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::{Entity, Error};

/// Objects that are registered by name.
pub(crate) trait Named {
    fn name(&self) -> &str;
}

/// A name-keyed registry of shared objects.
///
/// The registry holds one strong reference to every entry; every other holder of the [`Arc`]
/// counts as a user. An entry can only be removed while it has no users.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    entity: Entity,
    items: FxHashMap<String, Arc<T>>,
}

impl<T: Named> Registry<T> {
    pub(crate) fn new(entity: Entity) -> Self {
        Self { entity, items: FxHashMap::default() }
    }

    /// Non-owning lookup.
    pub(crate) fn get(&self, name: &str) -> Option<&Arc<T>> {
        self.items.get(name)
    }

    /// Non-owning lookup that fails with [`Error::NotFound`].
    pub(crate) fn lookup(&self, name: &str) -> Result<&Arc<T>, Error> {
        self.items.get(name).ok_or_else(|| Error::not_found(self.entity, name))
    }

    /// Looks up `name` and takes a reference to it.
    pub(crate) fn acquire(&self, name: &str) -> Result<Arc<T>, Error> {
        self.items.get(name).cloned().ok_or_else(|| Error::not_found(self.entity, name))
    }

    /// Registers `item`, returning the entry it replaced.
    pub(crate) fn insert(&mut self, item: Arc<T>) -> Option<Arc<T>> {
        self.items.insert(item.name().to_string(), item)
    }

    /// Removes `name` if nothing else references it.
    pub(crate) fn remove(&mut self, name: &str) -> Result<Arc<T>, Error> {
        let item = self.items.get(name).ok_or_else(|| Error::not_found(self.entity, name))?;

        let refs = users(item);
        if refs > 0 {
            return Err(Error::InUse { entity: self.entity, name: name.to_string(), refs });
        }

        self.items.remove(name).ok_or_else(|| Error::not_found(self.entity, name))
    }

    /// All entries, sorted by name.
    pub(crate) fn sorted(&self) -> Vec<&Arc<T>> {
        let mut items: Vec<_> = self.items.values().collect();
        items.sort_by(|a, b| a.name().cmp(b.name()));
        items
    }

    /// Removes and returns every entry.
    pub(crate) fn drain(&mut self) -> Vec<Arc<T>> {
        self.items.drain().map(|(_, item)| item).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

/// Number of references to a registered object, not counting the registry's own.
pub(crate) fn users<T>(item: &Arc<T>) -> usize {
    Arc::strong_count(item).saturating_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Thing(String);

    impl Named for Thing {
        fn name(&self) -> &str {
            &self.0
        }
    }

    #[test]
    fn remove_is_gated_on_users() {
        let mut registry = Registry::new(Entity::Field);
        registry.insert(Arc::new(Thing("a".into())));

        let held = registry.acquire("a").unwrap();
        assert_eq!(users(registry.get("a").unwrap()), 1);
        assert!(matches!(registry.remove("a"), Err(Error::InUse { refs: 1, .. })));

        drop(held);
        assert!(registry.remove("a").is_ok());
        assert!(matches!(registry.remove("a"), Err(Error::NotFound { .. })));
        assert_eq!(registry.len(), 0);
    }
}
