//! Coverage findings
//!
//! Each analyzer enabled in [`Settings`] turns coverage summaries into
//! [`Finding`]s. Severity follows how sure the linker was that the tests
//! really belong to the entity: a finding backed by a function-name match is
//! an error, one backed only by configuration inference a warning, and one
//! backed by a fuzzy guess merely informational. An entity with no tests at
//! all is always an error.

use crate::config::Settings;
use crate::coverage::{CoverageEntry, CoverageReport};
use crate::error::ConfigError;
use crate::model::{Entity, EntityKey, EntityKind, SourceLocation};
use crate::naming::to_title_case;
use crate::registry::Registry;
use facet::Facet;
use std::fmt;
use tracing::debug;

/// Which check produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
#[repr(u8)]
pub enum Analyzer {
    Basic,
    Update,
    Import,
    Error,
    StateCheck,
    CheckDestroy,
    Sweeper,
}

impl Analyzer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Analyzer::Basic => "basic",
            Analyzer::Update => "update",
            Analyzer::Import => "import",
            Analyzer::Error => "error",
            Analyzer::StateCheck => "state-check",
            Analyzer::CheckDestroy => "check-destroy",
            Analyzer::Sweeper => "sweeper",
        }
    }
}

impl fmt::Display for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
#[repr(u8)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.9 {
            Severity::Error
        } else if confidence >= 0.7 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One coverage gap
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Finding {
    pub analyzer: Analyzer,
    pub severity: Severity,
    #[facet(default)]
    pub entity: Option<EntityKey>,
    pub location: SourceLocation,
    pub message: String,
    pub suggestions: Vec<String>,
}

/// Run every enabled analyzer over a linked registry.
///
/// Findings come grouped by entity in key order, with package-level findings last.
pub fn evaluate(registry: &Registry, settings: &Settings) -> Result<Vec<Finding>, ConfigError> {
    let naming = settings.naming_pattern()?;
    let report = CoverageReport::from_registry(registry);
    let mut findings = Vec::new();

    for entry in &report.entries {
        let entity = &entry.entity;
        if let Some(pattern) = &naming
            && !pattern.is_match(&entity.name)
        {
            debug!("{} does not match the naming pattern, skipped", entity.key());
            continue;
        }
        let confidence = registry
            .tests_for(&entity.key())
            .iter()
            .map(|t| t.match_confidence)
            .fold(0.0, f64::max);
        let mut scope = EntityScope {
            entry,
            severity: Severity::from_confidence(confidence),
            findings: &mut findings,
        };

        if !entry.coverage.has_basic_test {
            if settings.enable_basic_test {
                scope.untested();
            }
            continue;
        }
        if settings.enable_update_test {
            scope.update();
        }
        if settings.enable_import_test {
            scope.import();
        }
        if settings.enable_error_test {
            scope.error();
        }
        if settings.enable_state_check && entry.coverage.missing_state_checks() {
            scope.state_check();
        }
        if settings.any_analyzer_enabled() && entry.missing_check_destroy() {
            scope.check_destroy();
        }
    }

    if settings.any_analyzer_enabled() && registry.sweeper_files().is_empty() {
        let location = registry
            .test_functions()
            .first()
            .map(|t| SourceLocation::new(t.location.file.clone(), 1, 1))
            .unwrap_or_default();
        findings.push(Finding {
            analyzer: Analyzer::Sweeper,
            severity: Severity::Warning,
            entity: None,
            location,
            message: "package has no test sweeper registrations".to_string(),
            suggestions: vec!["Add resource.AddTestSweepers() calls for cleanup".to_string()],
        });
    }
    Ok(findings)
}

struct EntityScope<'a> {
    entry: &'a CoverageEntry,
    severity: Severity,
    findings: &'a mut Vec<Finding>,
}

impl EntityScope<'_> {
    fn entity(&self) -> &Entity {
        &self.entry.entity
    }

    fn push(&mut self, analyzer: Analyzer, severity: Severity, message: String, suggestion: String) {
        let entity = &self.entry.entity;
        self.findings.push(Finding {
            analyzer,
            severity,
            entity: Some(entity.key()),
            location: entity.location.clone(),
            message,
            suggestions: vec![suggestion],
        });
    }

    fn untested(&mut self) {
        let entity = self.entity();
        let test_file = expected_test_file(entity);
        let test_function = expected_test_function(entity);
        let message = format!("{} '{}' has no acceptance test", entity.kind, entity.name);
        let suggestion = format!("Create {test_file} with function {test_function}");
        self.push(Analyzer::Basic, Severity::Error, message, suggestion);
    }

    fn update(&mut self) {
        let entity = self.entity();
        if entity.kind != EntityKind::Resource || self.entry.coverage.has_update_test {
            return;
        }
        let updatable: Vec<&str> = entity
            .attributes
            .iter()
            .filter(|a| a.needs_update_test())
            .map(|a| a.name.as_str())
            .collect();
        if updatable.is_empty() {
            return;
        }
        let message = format!(
            "resource '{}' has updatable attributes but no update test coverage (updatable: {})",
            entity.name,
            updatable.join(", ")
        );
        self.push(
            Analyzer::Update,
            self.severity,
            message,
            "Add a test step that modifies one of these attributes".to_string(),
        );
    }

    fn import(&mut self) {
        let entity = self.entity();
        if entity.kind != EntityKind::Resource
            || !entity.import_capable
            || self.entry.coverage.has_import_test
        {
            return;
        }
        let message = format!(
            "resource '{}' implements ImportState but has no import test coverage",
            entity.name
        );
        self.push(
            Analyzer::Import,
            self.severity,
            message,
            "Add a test step with ImportState: true, ImportStateVerify: true".to_string(),
        );
    }

    fn error(&mut self) {
        let entity = self.entity();
        if entity.kind != EntityKind::Resource || self.entry.coverage.has_error_test {
            return;
        }
        let validated: Vec<&str> = entity
            .attributes
            .iter()
            .filter(|a| a.needs_validation_test())
            .map(|a| a.name.as_str())
            .collect();
        if validated.is_empty() {
            return;
        }
        let message = format!(
            "resource '{}' has validation rules but no error case tests (validated: {})",
            entity.name,
            validated.join(", ")
        );
        self.push(
            Analyzer::Error,
            self.severity,
            message,
            "Add a test step with ExpectError to verify validation".to_string(),
        );
    }

    fn state_check(&mut self) {
        let entity = self.entity();
        let message = format!(
            "{} '{}' has {} test(s) but none include state validation (Check) or plan checks (ConfigPlanChecks)",
            entity.kind, entity.name, self.entry.coverage.test_count
        );
        self.push(
            Analyzer::StateCheck,
            self.severity,
            message,
            "Add Check: resource.ComposeTestCheckFunc(...) or ConfigPlanChecks to at least one test"
                .to_string(),
        );
    }

    fn check_destroy(&mut self) {
        let entity = self.entity();
        let message = format!(
            "{} '{}' has {} test(s) but none include CheckDestroy",
            entity.kind, entity.name, self.entry.coverage.test_count
        );
        self.push(
            Analyzer::CheckDestroy,
            self.severity,
            message,
            "Add CheckDestroy to at least one test's resource.TestCase".to_string(),
        );
    }
}

/// `internal/provider/widget_resource.go` -> `internal/provider/widget_resource_test.go`
pub fn expected_test_file(entity: &Entity) -> String {
    let file = entity.location.file.as_str();
    match file.strip_suffix(".go") {
        Some(stem) if !stem.is_empty() => format!("{stem}_test.go"),
        _ => format!("{}_test.go", entity.name),
    }
}

pub fn expected_test_function(entity: &Entity) -> String {
    let title = to_title_case(&entity.name);
    match entity.kind {
        EntityKind::Resource => format!("TestAcc{title}_basic"),
        EntityKind::DataSource => format!("TestAccDataSource{title}_basic"),
        EntityKind::Action => format!("TestAcc{title}Action_basic"),
    }
}
