//! tfcov-core - Core library for Terraform provider test coverage analysis
//!
//! This crate provides the building blocks for:
//! - Discovering resources, data sources and actions declared in provider Go source
//! - Parsing acceptance test functions and their steps
//! - Linking each test function to the entity it exercises
//! - Computing per-entity coverage and turning gaps into findings
//!
//! # Features
//!
//! - `walk` - Enable [`WalkSources`] for gitignore-aware directory walking (brings in `ignore`)
//! - `parallel` - Parse and extract files on a worker pool (brings in `rayon`)
//!
//! # Analysing a provider
//!
//! ```ignore
//! use tfcov_core::{Settings, WalkSources, analyze, findings};
//!
//! let settings = Settings::default();
//! let registry = analyze(WalkSources::new("internal/provider"), &settings)?;
//! for finding in findings::evaluate(&registry, &settings)? {
//!     println!("{}: {}", finding.severity, finding.message);
//! }
//! ```
//!
//! # In-Memory Sources (for testing)
//!
//! ```
//! use tfcov_core::{CoverageReport, MemorySources, Settings, analyze};
//!
//! let registry = analyze(
//!     MemorySources::new().add(
//!         "widget_resource.go",
//!         r#"package provider
//!
//! func NewWidgetResource() resource.Resource { return &WidgetResource{} }
//!
//! func (r *WidgetResource) Metadata(ctx context.Context, req resource.MetadataRequest, resp *resource.MetadataResponse) {
//!     resp.TypeName = req.ProviderTypeName + "_widget"
//! }
//! "#,
//!     ),
//!     &Settings::default(),
//! )
//! .unwrap();
//!
//! let report = CoverageReport::from_registry(&registry);
//! assert_eq!(report.untested().count(), 1);
//! ```

pub mod cache;
pub mod config;
pub mod coverage;
mod error;
pub mod extract;
pub mod findings;
pub mod go_ast;
pub mod linker;
pub mod model;
pub mod naming;
pub mod registry;
pub mod similarity;
mod sources;
pub mod test_functions;

pub use cache::{CacheStats, RegistryCache, SessionId};
pub use config::{FileFilter, Settings};
pub use coverage::{CoverageEntry, CoverageReport, EntityCoverage};
pub use error::{BuildError, ConfigError, RegistryError};
pub use extract::Extractor;
pub use findings::{Analyzer, Finding, Severity};
pub use go_ast::GoFile;
pub use linker::Linker;
pub use model::{
    Attribute, Entity, EntityKey, EntityKind, InferredBlock, MatchType, SourceLocation,
    TestCategory, TestFunction, TestStep,
};
pub use registry::{Registry, RegistryStats, TestId};
pub use sources::{LoadResult, MemorySources, PathSources, Sources};
pub use test_functions::TestParser;

#[cfg(feature = "walk")]
pub use sources::WalkSources;

use eyre::Result;
use tracing::{debug, info};

/// Run one discovery pass over parsed files: extract entities from source
/// files, parse test functions from test files, then link.
///
/// Files are registered in the order given, so the same input always yields
/// the same registry.
pub fn build_registry(files: &[GoFile], settings: &Settings) -> Result<Registry> {
    settings.validate()?;
    let registry = Registry::new();

    let extractor = Extractor::new(settings)?;
    let sources: Vec<&GoFile> = files.iter().filter(|f| !f.is_test).collect();
    for entity in per_file(&sources, |file| extractor.extract(file)) {
        registry.register_entity(entity);
    }

    let tests: Vec<&GoFile> = files.iter().filter(|f| f.is_test).collect();
    let helpers = test_functions::find_local_helpers(tests.iter().copied());
    let parser = TestParser::new(settings).with_local_helpers(helpers);
    for test in per_file(&tests, |file| parser.parse(file)) {
        registry.register_test_function(test);
    }

    for file in files {
        if test_functions::registers_sweepers(file) {
            debug!("{} registers test sweepers", file.path);
            registry.register_sweeper_file(file.path.clone());
        }
    }

    let linked = Linker::new(&registry, settings)?.link_all()?;
    let stats = registry.stats();
    info!(
        "discovered {} resources, {} data sources, {} actions; linked {}/{} test functions",
        stats.resources, stats.data_sources, stats.actions, linked, stats.test_functions
    );
    Ok(registry)
}

/// Load files from `sources` and build a registry from them
pub fn analyze(sources: impl Sources, settings: &Settings) -> Result<Registry> {
    let filter = FileFilter::new(settings)?;
    let loaded = sources.load(&filter)?;
    debug!(
        "loaded {} files ({} warnings)",
        loaded.files.len(),
        loaded.warnings.len()
    );
    build_registry(&loaded.files, settings)
}

/// Map every file independently, concatenating results in file order
fn per_file<T, F>(files: &[&GoFile], f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&GoFile) -> Vec<T> + Sync,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        files.par_iter().flat_map_iter(|file| f(file)).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        files.iter().flat_map(|file| f(file)).collect()
    }
}
