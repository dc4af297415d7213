//! Thread-safe store of entities, test functions and their associations
//!
//! Registration and linking take the write lock; every query takes the read
//! lock and hands back owned snapshots. Entities and test functions are held
//! behind `Arc`, and linking a test function replaces its `Arc` with an
//! updated copy instead of mutating it in place, so a snapshot handed out
//! earlier never changes underneath its holder.

use crate::error::RegistryError;
use crate::model::{Entity, EntityKey, EntityKind, MatchType, TestFunction};
use facet::Facet;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Handle to a registered test function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TestId(usize);

impl TestId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Counts describing a registry's contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
pub struct RegistryStats {
    pub resources: usize,
    pub data_sources: usize,
    pub actions: usize,
    pub test_functions: usize,
    pub linked_test_functions: usize,
}

#[derive(Default)]
struct Inner {
    entities: BTreeMap<EntityKey, Arc<Entity>>,
    tests: Vec<Arc<TestFunction>>,
    associations: BTreeMap<EntityKey, Vec<usize>>,
    sweeper_files: BTreeSet<String>,
}

/// The model built by one analysis session
#[derive(Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("stats", &self.stats())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // Every critical section leaves `Inner` consistent, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register an entity. Returns `false`, leaving the registry unchanged,
    /// when an entity with the same kind and name already exists.
    pub fn register_entity(&self, entity: Entity) -> bool {
        let key = entity.key();
        let mut inner = self.write();
        if inner.entities.contains_key(&key) {
            debug!("entity {} already registered, keeping the first", key);
            return false;
        }
        debug!("registered entity {} from {}", key, entity.location);
        inner.entities.insert(key, Arc::new(entity));
        true
    }

    pub fn register_test_function(&self, test: TestFunction) -> TestId {
        let mut inner = self.write();
        inner.tests.push(Arc::new(test));
        TestId(inner.tests.len() - 1)
    }

    /// Associate a test function with an entity, recording how the match was made.
    ///
    /// A test function can be linked at most once.
    pub fn link_test(
        &self,
        id: TestId,
        key: &EntityKey,
        match_type: MatchType,
        confidence: f64,
    ) -> Result<(), RegistryError> {
        let mut inner = self.write();
        if !inner.entities.contains_key(key) {
            return Err(RegistryError::UnknownEntity(key.clone()));
        }
        let slot = inner
            .tests
            .get_mut(id.0)
            .ok_or(RegistryError::UnknownTestFunction(id.0))?;
        if let Some(existing) = &slot.linked {
            return Err(RegistryError::AlreadyLinked {
                name: slot.name.clone(),
                existing: existing.clone(),
            });
        }

        let test = Arc::make_mut(slot);
        test.match_type = match_type;
        test.match_confidence = confidence.clamp(0.0, 1.0);
        test.linked = Some(key.clone());
        debug!(
            "linked {} -> {} ({}, {:.2})",
            test.name, key, match_type, test.match_confidence
        );

        inner.associations.entry(key.clone()).or_default().push(id.0);
        Ok(())
    }

    /// Like [`Registry::link_test`], resolving a bare name in resource, data
    /// source, action order.
    pub fn link_test_to_resource(
        &self,
        id: TestId,
        name: &str,
        match_type: MatchType,
        confidence: f64,
    ) -> Result<EntityKey, RegistryError> {
        let key = self
            .resolve_name(name)
            .ok_or_else(|| RegistryError::UnknownEntity(EntityKey::new(EntityKind::Resource, name)))?;
        self.link_test(id, &key, match_type, confidence)?;
        Ok(key)
    }

    /// Note that `file` registers test sweepers
    pub fn register_sweeper_file(&self, file: impl Into<String>) {
        self.write().sweeper_files.insert(file.into());
    }

    /// Files registering test sweepers, sorted
    pub fn sweeper_files(&self) -> Vec<String> {
        self.read().sweeper_files.iter().cloned().collect()
    }

    /// Key of the first entity named `name`, trying kinds in lookup order
    pub fn resolve_name(&self, name: &str) -> Option<EntityKey> {
        let inner = self.read();
        EntityKind::ALL
            .into_iter()
            .map(|kind| EntityKey::new(kind, name))
            .find(|key| inner.entities.contains_key(key))
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.read().entities.contains_key(key)
    }

    pub fn entity(&self, key: &EntityKey) -> Option<Arc<Entity>> {
        self.read().entities.get(key).cloned()
    }

    /// First entity named `name`, trying kinds in lookup order
    pub fn entity_by_name(&self, name: &str) -> Option<Arc<Entity>> {
        let key = self.resolve_name(name)?;
        self.entity(&key)
    }

    /// All entities named `name`, whatever their kind
    pub fn entities_named(&self, name: &str) -> Vec<Arc<Entity>> {
        let inner = self.read();
        EntityKind::ALL
            .into_iter()
            .filter_map(|kind| inner.entities.get(&EntityKey::new(kind, name)).cloned())
            .collect()
    }

    /// Snapshot of every entity, ordered by key
    pub fn definitions(&self) -> BTreeMap<EntityKey, Arc<Entity>> {
        self.read().entities.clone()
    }

    /// Snapshot of every test function, in registration order
    pub fn test_functions(&self) -> Vec<Arc<TestFunction>> {
        self.read().tests.clone()
    }

    pub fn test_function(&self, id: TestId) -> Option<Arc<TestFunction>> {
        self.read().tests.get(id.0).cloned()
    }

    /// Ids of every registered test function, in registration order
    pub fn test_ids(&self) -> Vec<TestId> {
        (0..self.read().tests.len()).map(TestId).collect()
    }

    /// Test functions linked to exactly this entity
    pub fn tests_for(&self, key: &EntityKey) -> Vec<Arc<TestFunction>> {
        let inner = self.read();
        inner
            .associations
            .get(key)
            .map(|ids| ids.iter().map(|&i| Arc::clone(&inner.tests[i])).collect())
            .unwrap_or_default()
    }

    /// Test functions linked to any entity named `name`, across all kinds
    pub fn resource_tests(&self, name: &str) -> Vec<Arc<TestFunction>> {
        let inner = self.read();
        EntityKind::ALL
            .into_iter()
            .filter_map(|kind| inner.associations.get(&EntityKey::new(kind, name)))
            .flatten()
            .map(|&i| Arc::clone(&inner.tests[i]))
            .collect()
    }

    /// Unlinked test functions that were expected to match an entity
    pub fn unmatched_test_functions(&self) -> Vec<Arc<TestFunction>> {
        self.read()
            .tests
            .iter()
            .filter(|t| !t.is_matched() && t.category.expects_entity())
            .cloned()
            .collect()
    }

    pub fn entities_in_file(&self, file: &str) -> Vec<Arc<Entity>> {
        self.read()
            .entities
            .values()
            .filter(|e| e.location.file == file)
            .cloned()
            .collect()
    }

    pub fn test_functions_in_file(&self, file: &str) -> Vec<Arc<TestFunction>> {
        self.read()
            .tests
            .iter()
            .filter(|t| t.location.file == file)
            .cloned()
            .collect()
    }

    /// Distinct entity names, ignoring kind
    pub fn simple_names(&self) -> BTreeSet<String> {
        self.read()
            .entities
            .keys()
            .map(|k| k.name.clone())
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        let inner = self.read();
        let count = |kind| inner.entities.keys().filter(|k| k.kind == kind).count();
        RegistryStats {
            resources: count(EntityKind::Resource),
            data_sources: count(EntityKind::DataSource),
            actions: count(EntityKind::Action),
            test_functions: inner.tests.len(),
            linked_test_functions: inner.tests.iter().filter(|t| t.linked.is_some()).count(),
        }
    }

    pub fn len(&self) -> usize {
        self.read().entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SourceLocation, TestCategory};

    fn entity(kind: EntityKind, name: &str) -> Entity {
        Entity::new(kind, name, SourceLocation::new("provider.go", 1, 1))
    }

    fn test_fn(name: &str) -> TestFunction {
        TestFunction::new(name, SourceLocation::new("provider_test.go", 1, 1))
    }

    #[test]
    fn test_same_name_different_kind_coexist() {
        let registry = Registry::new();
        assert!(registry.register_entity(entity(EntityKind::Resource, "job")));
        assert!(registry.register_entity(entity(EntityKind::Action, "job")));
        assert!(
            !registry.register_entity(entity(EntityKind::Resource, "job")),
            "duplicate key is a no-op"
        );
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.entities_named("job").len(), 2);
        assert_eq!(
            registry.resolve_name("job"),
            Some(EntityKey::new(EntityKind::Resource, "job"))
        );
    }

    #[test]
    fn test_lookup_order() {
        let registry = Registry::new();
        registry.register_entity(entity(EntityKind::Action, "thing"));
        registry.register_entity(entity(EntityKind::DataSource, "thing"));
        assert_eq!(
            registry.entity_by_name("thing").map(|e| e.kind),
            Some(EntityKind::DataSource)
        );
        assert!(registry.entity_by_name("missing").is_none());
    }

    #[test]
    fn test_snapshot_isolation() {
        let registry = Registry::new();
        registry.register_entity(entity(EntityKind::Resource, "a"));
        let before = registry.definitions();
        registry.register_entity(entity(EntityKind::Resource, "b"));
        let after = registry.definitions();
        assert_eq!(before.len(), 1, "earlier snapshot unchanged by later write");
        assert_eq!(after.len(), 2);
    }

    #[test]
    fn test_link_does_not_mutate_snapshots() {
        let registry = Registry::new();
        registry.register_entity(entity(EntityKind::Resource, "widget"));
        let id = registry.register_test_function(test_fn("TestAccWidget_basic"));
        let snapshot = registry.test_functions();

        registry
            .link_test_to_resource(id, "widget", MatchType::FunctionName, 1.0)
            .unwrap();

        assert_eq!(snapshot[0].match_type, MatchType::None);
        assert!(snapshot[0].linked.is_none());
        let now = registry.test_function(id).unwrap();
        assert_eq!(now.match_type, MatchType::FunctionName);
        assert_eq!(now.match_confidence, 1.0);
    }

    #[test]
    fn test_link_at_most_once() {
        let registry = Registry::new();
        let key = EntityKey::new(EntityKind::Resource, "widget");
        registry.register_entity(entity(EntityKind::Resource, "widget"));
        let id = registry.register_test_function(test_fn("TestAccWidget_basic"));
        registry
            .link_test(id, &key, MatchType::FileProximity, 0.9)
            .unwrap();
        let err = registry
            .link_test(id, &key, MatchType::Fuzzy, 0.8)
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyLinked { .. }));
        assert_eq!(registry.tests_for(&key).len(), 1);
    }

    #[test]
    fn test_link_errors() {
        let registry = Registry::new();
        let id = registry.register_test_function(test_fn("TestAccWidget_basic"));
        let key = EntityKey::new(EntityKind::Resource, "nope");
        assert_eq!(
            registry.link_test(id, &key, MatchType::Fuzzy, 0.8),
            Err(RegistryError::UnknownEntity(key))
        );
        registry.register_entity(entity(EntityKind::Resource, "widget"));
        assert_eq!(
            registry.link_test_to_resource(TestId(7), "widget", MatchType::Fuzzy, 0.8),
            Err(RegistryError::UnknownTestFunction(7))
        );
    }

    #[test]
    fn test_resource_tests_aggregate_kinds() {
        let registry = Registry::new();
        registry.register_entity(entity(EntityKind::Resource, "job"));
        registry.register_entity(entity(EntityKind::Action, "job"));
        let a = registry.register_test_function(test_fn("TestAccJob_basic"));
        let b = registry.register_test_function(test_fn("TestAccJobAction_basic"));
        registry
            .link_test(a, &EntityKey::new(EntityKind::Resource, "job"), MatchType::FunctionName, 1.0)
            .unwrap();
        registry
            .link_test(b, &EntityKey::new(EntityKind::Action, "job"), MatchType::FunctionName, 1.0)
            .unwrap();
        assert_eq!(registry.resource_tests("job").len(), 2);
        assert_eq!(
            registry
                .tests_for(&EntityKey::new(EntityKind::Action, "job"))
                .len(),
            1
        );
        assert!(registry.resource_tests("unknown").is_empty());
    }

    #[test]
    fn test_unmatched_excludes_provider_and_function_tests() {
        let registry = Registry::new();
        let mut provider = test_fn("TestAccProvider_basic");
        provider.category = TestCategory::ProviderConfigTest;
        let mut function = test_fn("TestParseFunction");
        function.category = TestCategory::FunctionTest;
        registry.register_test_function(provider);
        registry.register_test_function(function);
        registry.register_test_function(test_fn("TestAccMystery_basic"));

        let unmatched = registry.unmatched_test_functions();
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].name, "TestAccMystery_basic");
    }

    #[test]
    fn test_stats() {
        let registry = Registry::new();
        registry.register_entity(entity(EntityKind::Resource, "a"));
        registry.register_entity(entity(EntityKind::DataSource, "a"));
        let id = registry.register_test_function(test_fn("TestAccA_basic"));
        registry
            .link_test_to_resource(id, "a", MatchType::FunctionName, 1.0)
            .unwrap();
        let stats = registry.stats();
        assert_eq!(stats.resources, 1);
        assert_eq!(stats.data_sources, 1);
        assert_eq!(stats.actions, 0);
        assert_eq!(stats.test_functions, 1);
        assert_eq!(stats.linked_test_functions, 1);
        assert_eq!(registry.simple_names().len(), 1);
        assert_eq!(registry.entities_in_file("provider.go").len(), 2);
        assert_eq!(registry.test_functions_in_file("provider_test.go").len(), 1);
    }

    #[test]
    fn test_sweeper_files() {
        let registry = Registry::new();
        assert!(registry.sweeper_files().is_empty());
        registry.register_sweeper_file("sweep_test.go");
        registry.register_sweeper_file("sweep_test.go");
        assert_eq!(registry.sweeper_files(), vec!["sweep_test.go"]);
    }
}
