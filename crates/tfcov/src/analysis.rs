//! One analysis run: load, build through the session cache, evaluate

use eyre::{Result, WrapErr};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tfcov_core::findings::{self, Finding, Severity};
use tfcov_core::{
    CoverageReport, EntityKey, FileFilter, Registry, RegistryCache, RegistryStats, SessionId,
    Settings, Sources, TestFunction, WalkSources, build_registry,
};
use tracing::debug;

/// Settings file looked up in the analysed root when `--config` is absent
pub const DEFAULT_SETTINGS_FILE: &str = ".tfcov.yaml";

/// Settings from an explicit file, else `<root>/.tfcov.yaml`, else defaults
pub fn load_settings(root: &Path, explicit: Option<&Path>) -> Result<Settings> {
    let settings = match explicit {
        Some(path) => Settings::load(path)?,
        None => {
            let candidate = root.join(DEFAULT_SETTINGS_FILE);
            if candidate.is_file() {
                debug!("using settings from {}", candidate.display());
                Settings::load(&candidate)?
            } else {
                Settings::default()
            }
        }
    };
    settings.validate().wrap_err("Invalid settings")?;
    Ok(settings)
}

/// Everything the renderers need, detached from the registry
#[derive(Debug)]
pub struct Analysis {
    pub root: PathBuf,
    pub stats: RegistryStats,
    pub coverage: CoverageReport,
    pub tests: BTreeMap<EntityKey, Vec<Arc<TestFunction>>>,
    pub unmatched: Vec<Arc<TestFunction>>,
    pub findings: Vec<Finding>,
    pub warnings: Vec<String>,
}

impl Analysis {
    /// Walk `root`, build its registry through `cache`, and evaluate it
    pub fn run(root: &Path, settings: &Settings, cache: &RegistryCache) -> Result<Self> {
        let filter = FileFilter::new(settings)?;
        let session = SessionId::new();
        let mut warnings = Vec::new();
        let registry = cache.get_or_build(session, || {
            let loaded = WalkSources::new(root)
                .load(&filter)
                .wrap_err_with(|| format!("Failed to load Go sources under {}", root.display()))?;
            warnings = loaded.warnings;
            build_registry(&loaded.files, settings)
        })?;
        debug!("cache after build: {:?}", cache.stats());
        cache.release(session);

        let mut analysis = Self::from_registry(root, &registry, settings)?;
        analysis.warnings = warnings;
        Ok(analysis)
    }

    pub fn from_registry(root: &Path, registry: &Registry, settings: &Settings) -> Result<Self> {
        let coverage = CoverageReport::from_registry(registry);
        let tests = coverage
            .entries
            .iter()
            .map(|entry| {
                let key = entry.entity.key();
                let tests = registry.tests_for(&key);
                (key, tests)
            })
            .collect();
        Ok(Self {
            root: root.to_path_buf(),
            stats: registry.stats(),
            tests,
            unmatched: registry.unmatched_test_functions(),
            findings: findings::evaluate(registry, settings)?,
            coverage,
            warnings: Vec::new(),
        })
    }

    pub fn entity_count(&self) -> usize {
        self.coverage.entries.len()
    }

    pub fn tested_count(&self) -> usize {
        self.entity_count() - self.coverage.untested().count()
    }

    /// Share of entities with at least one test, 0-100
    pub fn tested_percent(&self) -> f64 {
        if self.entity_count() == 0 {
            return 100.0;
        }
        self.tested_count() as f64 / self.entity_count() as f64 * 100.0
    }

    pub fn has_errors(&self) -> bool {
        self.findings.iter().any(|f| f.severity == Severity::Error)
    }
}
