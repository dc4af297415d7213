//! Analysis settings
//!
//! Settings are a plain value object with defaults. They can be loaded from a
//! YAML file in which every key is optional: keys that are present override the
//! defaults, everything else keeps its default value.
//!
//! ```yaml
//! enable-fuzzy-matching: true
//! fuzzy-match-threshold: 0.8
//! custom-test-helpers:
//!   - acctest.VcrTest
//! cache-ttl: 10m
//! ```

use crate::error::ConfigError;
use eyre::{Result, WrapErr};
use facet::Facet;
use globset::{Glob, GlobMatcher, GlobSet, GlobSetBuilder};
use std::path::Path;
use std::time::Duration;

/// Suffixes stripped from test function names when none are configured
pub const DEFAULT_TEST_FUNCTION_SUFFIXES: &[&str] = &[
    "_basic",
    "_generated",
    "_complete",
    "_update",
    "_import",
    "_disappears",
    "_migrate",
    "_full",
    "_minimal",
];

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Analysis settings
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Settings {
    // Analyzer toggles
    pub enable_basic_test: bool,
    pub enable_update_test: bool,
    pub enable_import_test: bool,
    pub enable_error_test: bool,
    pub enable_state_check: bool,

    // Path conventions
    pub resource_path_pattern: String,
    pub data_source_path_pattern: String,
    /// Glob on the file name deciding whether a file holds tests
    pub test_file_pattern: String,
    /// Excluded when equal to the full path or the file name, or contained in the path
    pub exclude_paths: Vec<String>,

    // Exclusion controls for non-test files
    pub exclude_base_classes: bool,
    pub exclude_sweeper_files: bool,
    pub exclude_migration_files: bool,
    /// Globs on the file name
    pub exclude_patterns: Vec<String>,

    // Test function detection
    /// `Prefix*` or exact names; when non-empty a test must match one
    pub test_name_patterns: Vec<String>,
    /// `package.Function` wrappers around the test harness
    pub custom_test_helpers: Vec<String>,

    // Linking
    pub enable_fuzzy_matching: bool,
    pub fuzzy_match_threshold: f64,
    /// `prefix:is_data_source` entries for file-proximity matching
    pub test_file_prefix_patterns: Vec<String>,
    /// `suffix:is_data_source` entries for file-proximity matching
    pub test_file_suffix_patterns: Vec<String>,
    /// Stripped from test file stems before the tables apply
    pub test_file_suffix_strip: Vec<String>,
    /// Entity names matching these are composition helpers, not entities
    pub nested_schema_patterns: Vec<String>,
    /// CamelCase keywords removed from test names before retrying a lookup
    pub function_name_keywords_to_strip: Vec<String>,
    /// Empty means the built-in list; `["-"]` disables suffix stripping
    pub test_function_suffixes: Vec<String>,
    pub provider_prefix: String,
    /// Entities whose name does not match are left out of findings
    pub resource_naming_pattern: String,

    // Output (used by renderers only)
    pub verbose: bool,
    pub show_match_confidence: bool,
    pub show_unmatched_tests: bool,
    pub show_orphaned_resources: bool,

    /// Go-style duration; empty means 5m, `0`/`0s` disables eviction
    pub cache_ttl: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_basic_test: true,
            enable_update_test: true,
            enable_import_test: true,
            enable_error_test: true,
            enable_state_check: true,
            resource_path_pattern: "resource_*.go".into(),
            data_source_path_pattern: "data_source_*.go".into(),
            test_file_pattern: "*_test.go".into(),
            exclude_paths: Vec::new(),
            exclude_base_classes: true,
            exclude_sweeper_files: true,
            exclude_migration_files: true,
            exclude_patterns: strings(&["*_sweeper.go", "*_test_helpers.go"]),
            test_name_patterns: Vec::new(),
            custom_test_helpers: Vec::new(),
            enable_fuzzy_matching: false,
            fuzzy_match_threshold: 0.7,
            test_file_prefix_patterns: strings(&[
                "resource_:false",
                "data_source_:true",
                "ephemeral_:false",
                "action_:false",
                "iam_:false",
            ]),
            test_file_suffix_patterns: strings(&[
                "_resource:false",
                "_data_source:true",
                "_datasource:true",
                "_action:false",
            ]),
            test_file_suffix_strip: strings(&["_generated", "_gen"]),
            nested_schema_patterns: strings(&["*_schema", "*_schema_*"]),
            function_name_keywords_to_strip: strings(&[
                "IamBinding",
                "IamMember",
                "IamPolicy",
                "Iam",
                "Generated",
            ]),
            test_function_suffixes: Vec::new(),
            provider_prefix: String::new(),
            resource_naming_pattern: String::new(),
            verbose: false,
            show_match_confidence: false,
            show_unmatched_tests: false,
            show_orphaned_resources: false,
            cache_ttl: "5m".into(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Settings {
    /// Reject settings that would make a build invalid or its output vacuous
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.fuzzy_match_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::ThresholdOutOfRange(threshold));
        }
        if self.enable_fuzzy_matching && threshold < 0.5 {
            return Err(ConfigError::ThresholdTooLowForFuzzy(threshold));
        }
        if !self.any_analyzer_enabled() {
            return Err(ConfigError::NoAnalyzerEnabled);
        }
        self.cache_ttl()?;
        self.naming_pattern()?;
        FileFilter::new(self)?;
        parse_conventions(&self.test_file_prefix_patterns, "test-file-prefix-patterns")?;
        parse_conventions(&self.test_file_suffix_patterns, "test-file-suffix-patterns")?;
        build_globset(&self.nested_schema_patterns, "nested-schema-patterns")?;
        for helper in &self.custom_test_helpers {
            if !helper.contains('.') {
                return Err(ConfigError::InvalidEntry {
                    setting: "custom-test-helpers",
                    entry: helper.clone(),
                    expected: "package.Function",
                });
            }
        }
        Ok(())
    }

    pub fn any_analyzer_enabled(&self) -> bool {
        self.enable_basic_test
            || self.enable_update_test
            || self.enable_import_test
            || self.enable_error_test
            || self.enable_state_check
    }

    /// `None` when eviction is disabled
    pub fn cache_ttl(&self) -> Result<Option<Duration>, ConfigError> {
        let value = self.cache_ttl.trim();
        if value.is_empty() {
            return Ok(Some(DEFAULT_CACHE_TTL));
        }
        let ttl = parse_duration(value).map_err(|reason| ConfigError::InvalidCacheTtl {
            value: value.to_string(),
            reason,
        })?;
        Ok((!ttl.is_zero()).then_some(ttl))
    }

    /// Fuzzy threshold with the enforced floor applied
    pub fn effective_fuzzy_threshold(&self) -> f64 {
        self.fuzzy_match_threshold.max(0.5)
    }

    pub fn test_function_suffixes(&self) -> Vec<String> {
        match self.test_function_suffixes.as_slice() {
            [] => strings(DEFAULT_TEST_FUNCTION_SUFFIXES),
            [only] if only == "-" => Vec::new(),
            custom => custom.to_vec(),
        }
    }

    pub fn naming_pattern(&self) -> Result<Option<regex::Regex>, ConfigError> {
        if self.resource_naming_pattern.is_empty() {
            return Ok(None);
        }
        regex::Regex::new(&self.resource_naming_pattern)
            .map(Some)
            .map_err(|e| ConfigError::InvalidNamingPattern {
                pattern: self.resource_naming_pattern.clone(),
                reason: e.to_string(),
            })
    }

    /// Whether a test function name passes the configured name patterns
    pub fn matches_test_name_patterns(&self, name: &str) -> bool {
        if self.test_name_patterns.is_empty() {
            return true;
        }
        self.test_name_patterns
            .iter()
            .any(|pattern| match pattern.strip_suffix('*') {
                Some(prefix) => name.starts_with(prefix),
                None => name == pattern,
            })
    }

    /// Parse settings from YAML, starting from the defaults
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let file: SettingsFile =
            facet_yaml::from_str(content).wrap_err("Failed to parse settings YAML")?;
        Ok(file.apply(Settings::default()))
    }

    /// Load settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read settings from {}", path.display()))?;
        Self::from_yaml_str(&content)
            .wrap_err_with(|| format!("Failed to parse settings from {}", path.display()))
    }
}

/// On-disk settings: every key optional, kebab-case
#[derive(Debug, Default, Facet)]
#[facet(rename_all = "kebab-case")]
pub struct SettingsFile {
    #[facet(default)]
    pub enable_basic_test: Option<bool>,
    #[facet(default)]
    pub enable_update_test: Option<bool>,
    #[facet(default)]
    pub enable_import_test: Option<bool>,
    #[facet(default)]
    pub enable_error_test: Option<bool>,
    #[facet(default)]
    pub enable_state_check: Option<bool>,
    #[facet(default)]
    pub resource_path_pattern: Option<String>,
    #[facet(default)]
    pub data_source_path_pattern: Option<String>,
    #[facet(default)]
    pub test_file_pattern: Option<String>,
    #[facet(default)]
    pub exclude_paths: Option<Vec<String>>,
    #[facet(default)]
    pub exclude_base_classes: Option<bool>,
    #[facet(default)]
    pub exclude_sweeper_files: Option<bool>,
    #[facet(default)]
    pub exclude_migration_files: Option<bool>,
    #[facet(default)]
    pub exclude_patterns: Option<Vec<String>>,
    #[facet(default)]
    pub test_name_patterns: Option<Vec<String>>,
    #[facet(default)]
    pub custom_test_helpers: Option<Vec<String>>,
    #[facet(default)]
    pub enable_fuzzy_matching: Option<bool>,
    #[facet(default)]
    pub fuzzy_match_threshold: Option<f64>,
    #[facet(default)]
    pub test_file_prefix_patterns: Option<Vec<String>>,
    #[facet(default)]
    pub test_file_suffix_patterns: Option<Vec<String>>,
    #[facet(default)]
    pub test_file_suffix_strip: Option<Vec<String>>,
    #[facet(default)]
    pub nested_schema_patterns: Option<Vec<String>>,
    #[facet(default)]
    pub function_name_keywords_to_strip: Option<Vec<String>>,
    #[facet(default)]
    pub test_function_suffixes: Option<Vec<String>>,
    #[facet(default)]
    pub provider_prefix: Option<String>,
    #[facet(default)]
    pub resource_naming_pattern: Option<String>,
    #[facet(default)]
    pub verbose: Option<bool>,
    #[facet(default)]
    pub show_match_confidence: Option<bool>,
    #[facet(default)]
    pub show_unmatched_tests: Option<bool>,
    #[facet(default)]
    pub show_orphaned_resources: Option<bool>,
    #[facet(default)]
    pub cache_ttl: Option<String>,
}

impl SettingsFile {
    /// Override `base` with every key present in the file
    pub fn apply(self, mut base: Settings) -> Settings {
        macro_rules! overlay {
            ($($field:ident),* $(,)?) => {
                $(if let Some(value) = self.$field {
                    base.$field = value;
                })*
            };
        }
        overlay!(
            enable_basic_test,
            enable_update_test,
            enable_import_test,
            enable_error_test,
            enable_state_check,
            resource_path_pattern,
            data_source_path_pattern,
            test_file_pattern,
            exclude_paths,
            exclude_base_classes,
            exclude_sweeper_files,
            exclude_migration_files,
            exclude_patterns,
            test_name_patterns,
            custom_test_helpers,
            enable_fuzzy_matching,
            fuzzy_match_threshold,
            test_file_prefix_patterns,
            test_file_suffix_patterns,
            test_file_suffix_strip,
            nested_schema_patterns,
            function_name_keywords_to_strip,
            test_function_suffixes,
            provider_prefix,
            resource_naming_pattern,
            verbose,
            show_match_confidence,
            show_unmatched_tests,
            show_orphaned_resources,
            cache_ttl,
        );
        base
    }
}

/// Parse a Go-style duration such as `300ms`, `5m`, `1h30m` or `1.5h`.
///
/// A bare `0` is accepted; any other number needs a unit.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".into());
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.starts_with('-') {
        return Err("negative durations are not allowed".into());
    }
    let s = s.strip_prefix('+').unwrap_or(s);

    let mut total_nanos = 0f64;
    let mut rest = s;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("expected a number at {rest:?}"));
        }
        let value: f64 = rest[..num_len]
            .parse()
            .map_err(|_| format!("invalid number {:?}", &rest[..num_len]))?;
        rest = &rest[num_len..];

        let unit_len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let nanos_per_unit = match &rest[..unit_len] {
            "ns" => 1.0,
            "us" | "µs" | "μs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            "" => return Err(format!("missing unit in duration {input:?}")),
            unit => return Err(format!("unknown unit {unit:?} in duration {input:?}")),
        };
        rest = &rest[unit_len..];
        total_nanos += value * nanos_per_unit;
    }
    Ok(Duration::from_nanos(total_nanos.round() as u64))
}

/// A file-name convention implying an entity kind, e.g. `data_source_` prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConvention {
    pub marker: String,
    pub data_source: bool,
}

/// Parse `marker:bool` entries; a missing `:bool` means `false`
pub fn parse_conventions(
    entries: &[String],
    setting: &'static str,
) -> Result<Vec<FileConvention>, ConfigError> {
    entries
        .iter()
        .map(|entry| {
            let (marker, flag) = match entry.rsplit_once(':') {
                Some((marker, flag)) => (marker, flag.trim()),
                None => (entry.as_str(), "false"),
            };
            let data_source = match flag {
                "true" => true,
                "false" => false,
                _ => {
                    return Err(ConfigError::InvalidEntry {
                        setting,
                        entry: entry.clone(),
                        expected: "marker:true or marker:false",
                    });
                }
            };
            Ok(FileConvention {
                marker: marker.to_string(),
                data_source,
            })
        })
        .collect()
}

pub(crate) fn build_globset(
    patterns: &[String],
    setting: &'static str,
) -> Result<GlobSet, ConfigError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(compile_glob(pattern, setting)?);
    }
    builder.build().map_err(|e| ConfigError::InvalidGlob {
        setting,
        pattern: patterns.join(","),
        reason: e.to_string(),
    })
}

fn compile_glob(pattern: &str, setting: &'static str) -> Result<Glob, ConfigError> {
    Glob::new(pattern).map_err(|e| ConfigError::InvalidGlob {
        setting,
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

/// Decides which files hold tests and which non-test files are skipped
#[derive(Debug, Clone)]
pub struct FileFilter {
    test_file: GlobMatcher,
    test_pattern: String,
    exclude_patterns: GlobSet,
    exclude_paths: Vec<String>,
    exclude_base_classes: bool,
    exclude_sweeper_files: bool,
    exclude_migration_files: bool,
}

impl FileFilter {
    pub fn new(settings: &Settings) -> Result<Self, ConfigError> {
        let test_pattern = if settings.test_file_pattern.is_empty() {
            "*_test.go"
        } else {
            settings.test_file_pattern.as_str()
        };
        Ok(Self {
            test_file: compile_glob(test_pattern, "test-file-pattern")?.compile_matcher(),
            test_pattern: test_pattern.to_string(),
            exclude_patterns: build_globset(&settings.exclude_patterns, "exclude-patterns")?,
            exclude_paths: settings.exclude_paths.clone(),
            exclude_base_classes: settings.exclude_base_classes,
            exclude_sweeper_files: settings.exclude_sweeper_files,
            exclude_migration_files: settings.exclude_migration_files,
        })
    }

    pub fn is_test_file(&self, path: &str) -> bool {
        self.test_file.is_match(file_name(path))
    }

    /// A test file's name with the literal text around the pattern's wildcards removed,
    /// e.g. `resource_widget` for `resource_widget_test.go` under `*_test.go`
    pub fn test_file_stem<'p>(&self, path: &'p str) -> Option<&'p str> {
        let name = file_name(path);
        if !self.test_file.is_match(name) {
            return None;
        }
        let first = self.test_pattern.find('*')?;
        let last = self.test_pattern.rfind('*')?;
        let (head, tail) = (&self.test_pattern[..first], &self.test_pattern[last + 1..]);
        name.strip_prefix(head)?
            .strip_suffix(tail)
            .filter(|stem| !stem.is_empty())
    }

    /// Whether a non-test file is left out of entity extraction
    pub fn is_excluded(&self, path: &str) -> bool {
        let name = file_name(path);

        if self.exclude_base_classes && (name.starts_with("base_") || name.starts_with("base.")) {
            return true;
        }
        if self.exclude_sweeper_files && name.ends_with("_sweeper.go") {
            return true;
        }
        if self.exclude_migration_files
            && (name.ends_with("_migrate.go")
                || name.contains("_migration")
                || name.ends_with("_state_upgrader.go"))
        {
            return true;
        }
        if self
            .exclude_paths
            .iter()
            .any(|p| !p.is_empty() && (path == p || name == p || path.contains(p.as_str())))
        {
            return true;
        }
        self.exclude_patterns.is_match(name)
    }
}

/// Final path component, accepting both separators
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
