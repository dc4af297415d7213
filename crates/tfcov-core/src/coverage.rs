//! Per-entity coverage summaries

use crate::model::{Entity, EntityKey, EntityKind, TestFunction};
use crate::registry::Registry;
use facet::Facet;
use std::borrow::Borrow;
use std::sync::Arc;

/// What the tests associated with one entity cover
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
pub struct EntityCoverage {
    pub has_basic_test: bool,
    pub has_update_test: bool,
    pub has_import_test: bool,
    pub has_error_test: bool,
    pub has_state_check: bool,
    pub has_plan_check: bool,
    pub has_check_destroy: bool,
    pub test_count: usize,
    pub step_count: usize,
    pub update_step_count: usize,
    pub import_step_count: usize,
}

impl EntityCoverage {
    /// Fold an entity's associated tests into a summary.
    ///
    /// Update detection looks at each test's own step sequence only; steps of
    /// different test functions are never compared.
    pub fn compute<T: Borrow<TestFunction>>(tests: &[T]) -> Self {
        let mut coverage = EntityCoverage {
            has_basic_test: !tests.is_empty(),
            test_count: tests.len(),
            ..Default::default()
        };
        for test in tests {
            let test: &TestFunction = test.borrow();
            coverage.has_check_destroy |= test.has_check_destroy;
            coverage.has_import_test |= test.has_import_step;
            coverage.has_error_test |= test.has_error_case;
            coverage.step_count += test.steps.len();
            for step in &test.steps {
                coverage.has_state_check |= step.has_state_check;
                coverage.has_plan_check |= step.has_plan_check;
                if step.is_real_update_step() {
                    coverage.has_update_test = true;
                    coverage.update_step_count += 1;
                }
                if step.import_state {
                    coverage.import_step_count += 1;
                }
            }
        }
        coverage
    }

    /// Tested, but nothing asserts on state or plan
    pub fn missing_state_checks(&self) -> bool {
        self.has_basic_test && !self.has_state_check && !self.has_plan_check
    }
}

/// Coverage of one entity, with the entity itself
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct CoverageEntry {
    pub entity: Entity,
    pub coverage: EntityCoverage,
}

impl CoverageEntry {
    /// Tested but never destroy-checked; data sources are never destroyed
    pub fn missing_check_destroy(&self) -> bool {
        self.entity.kind != EntityKind::DataSource
            && self.coverage.has_basic_test
            && !self.coverage.has_check_destroy
    }
}

/// Coverage of every entity in a registry, in key order
#[derive(Debug, Clone, Default, PartialEq, Facet)]
pub struct CoverageReport {
    pub entries: Vec<CoverageEntry>,
}

impl CoverageReport {
    pub fn from_registry(registry: &Registry) -> Self {
        let entries = registry
            .definitions()
            .into_iter()
            .map(|(key, entity)| CoverageEntry {
                coverage: EntityCoverage::compute(&registry.tests_for(&key)),
                entity: Arc::unwrap_or_clone(entity),
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &EntityKey) -> Option<&EntityCoverage> {
        self.entries
            .iter()
            .find(|e| e.entity.kind == key.kind && e.entity.name == key.name)
            .map(|e| &e.coverage)
    }

    /// Entities with no associated test
    pub fn untested(&self) -> impl Iterator<Item = &CoverageEntry> {
        self.entries.iter().filter(|e| !e.coverage.has_basic_test)
    }

    /// Entities with tests, none of which check state or plan
    pub fn missing_state_checks(&self) -> impl Iterator<Item = &CoverageEntry> {
        self.entries
            .iter()
            .filter(|e| e.coverage.missing_state_checks())
    }

    /// Resources and actions with tests but no destroy check
    pub fn missing_check_destroy(&self) -> impl Iterator<Item = &CoverageEntry> {
        self.entries.iter().filter(|e| e.missing_check_destroy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchType, SourceLocation, TestStep};

    fn step(index: usize, fingerprint: &str) -> TestStep {
        TestStep {
            index,
            has_config: true,
            config_fingerprint: fingerprint.into(),
            ..Default::default()
        }
    }

    fn names<'a>(entries: impl Iterator<Item = &'a CoverageEntry>) -> Vec<String> {
        entries.map(|e| e.entity.key().to_string()).collect()
    }

    fn test(name: &str, steps: Vec<TestStep>) -> TestFunction {
        let mut t = TestFunction::new(name, SourceLocation::new("x_test.go", 1, 1));
        t.steps = steps;
        t
    }

    #[test]
    fn test_empty() {
        let coverage = EntityCoverage::compute::<TestFunction>(&[]);
        assert_eq!(coverage, EntityCoverage::default());
        assert!(!coverage.missing_state_checks(), "untested is reported separately");
    }

    #[test]
    fn test_update_needs_sequence_within_one_function() {
        let a = test("TestAccServer_a", vec![step(0, "aaaa")]);
        let b = test("TestAccServer_b", vec![step(0, "bbbb")]);
        let coverage = EntityCoverage::compute(&[a, b]);
        assert!(coverage.has_basic_test);
        assert!(!coverage.has_update_test);
        assert_eq!(coverage.test_count, 2);
        assert_eq!(coverage.step_count, 2);
    }

    #[test]
    fn test_import_step_is_not_an_update() {
        let mut import = step(1, "");
        import.has_config = false;
        import.import_state = true;
        let mut first = step(0, "aaaa");
        first.has_state_check = true;
        let mut t = test("TestAccWidget_basic", vec![first, import]);
        t.has_import_step = true;
        t.has_check_destroy = true;

        let coverage = EntityCoverage::compute(&[t]);
        assert!(!coverage.has_update_test);
        assert!(coverage.has_import_test);
        assert!(coverage.has_state_check);
        assert!(coverage.has_check_destroy);
        assert_eq!(coverage.import_step_count, 1);
        assert_eq!(coverage.update_step_count, 0);
    }

    #[test]
    fn test_real_update() {
        let mut second = step(1, "bbbb");
        second.previous_config_fingerprint = "aaaa".into();
        second.has_plan_check = true;
        let coverage =
            EntityCoverage::compute(&[test("TestAccWidget_update", vec![step(0, "aaaa"), second])]);
        assert!(coverage.has_update_test);
        assert_eq!(coverage.update_step_count, 1);
        assert!(coverage.has_plan_check);
        assert!(!coverage.missing_state_checks());
    }

    #[test]
    fn test_report_sets() {
        let registry = Registry::new();
        for (kind, name) in [
            (EntityKind::Resource, "item"),
            (EntityKind::Resource, "orphan"),
            (EntityKind::DataSource, "item"),
        ] {
            registry.register_entity(Entity::new(kind, name, SourceLocation::new("p.go", 1, 1)));
        }
        for kind in [EntityKind::Resource, EntityKind::DataSource] {
            let id = registry.register_test_function(test("TestAccItem", vec![step(0, "aaaa")]));
            registry
                .link_test(id, &EntityKey::new(kind, "item"), MatchType::FunctionName, 1.0)
                .unwrap();
        }

        let report = CoverageReport::from_registry(&registry);
        assert_eq!(names(report.untested()), vec!["resource:orphan"]);
        assert_eq!(
            names(report.missing_state_checks()),
            vec!["resource:item", "data source:item"]
        );
        assert_eq!(names(report.missing_check_destroy()), vec!["resource:item"]);
        assert!(
            report
                .get(&EntityKey::new(EntityKind::DataSource, "item"))
                .is_some_and(|c| c.has_basic_test)
        );
    }
}
