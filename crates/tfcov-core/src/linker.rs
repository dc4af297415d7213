//! Associating test functions with the entities they exercise
//!
//! Each unlinked test function goes through four strategies in strict
//! priority, and the first one that finds a registered entity wins:
//!
//! 1. the entity name encoded in the function name (confidence 1.0),
//! 2. the test file's naming convention (0.9),
//! 3. the first typed block in the test's embedded configuration (0.8),
//! 4. edit-distance similarity against every entity name, when enabled
//!    (confidence is the similarity score).

use crate::config::{FileConvention, FileFilter, Settings, parse_conventions};
use crate::error::{ConfigError, RegistryError};
use crate::model::{EntityKey, EntityKind, MatchType, TestFunction};
use crate::naming::{strip_provider_prefix, to_snake_case};
use crate::registry::Registry;
use crate::similarity::best_match;
use std::collections::BTreeSet;
use tracing::debug;

/// Test-name prefixes, longest first so the most specific one is stripped
pub const TEST_FUNCTION_PREFIXES: &[&str] = &[
    "TestAccDataSource",
    "TestAccResource",
    "TestAcc",
    "TestDataSource",
    "TestResource",
    "Test",
];

/// Lifecycle markers appended to action test names, e.g. `TestAccRestartActionAfterCreate`
const ACTION_LIFECYCLE_SUFFIXES: &[&str] = &[
    "AfterCreate",
    "AfterUpdate",
    "AfterDelete",
    "BeforeCreate",
    "BeforeUpdate",
    "BeforeDelete",
    "DoesNotTrigger",
    "Unrelated",
];

const KIND_SUFFIXES: &[(&str, EntityKind)] = &[
    ("DataSource", EntityKind::DataSource),
    ("Resource", EntityKind::Resource),
    ("Action", EntityKind::Action),
];

pub const FUNCTION_NAME_CONFIDENCE: f64 = 1.0;
pub const FILE_PROXIMITY_CONFIDENCE: f64 = 0.9;
pub const INFERRED_CONFIDENCE: f64 = 0.8;

/// The outcome of matching one test function
#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub key: EntityKey,
    pub match_type: MatchType,
    pub confidence: f64,
}

impl Match {
    fn new(key: EntityKey, match_type: MatchType, confidence: f64) -> Self {
        Self {
            key,
            match_type,
            confidence,
        }
    }
}

/// The entity-name portion of a test function name
#[derive(Debug, Clone, PartialEq, Eq)]
struct NamePortion {
    /// CamelCase text between the prefix and the first underscore (or known suffix)
    raw: String,
    /// `raw` with lifecycle and kind suffixes removed
    trimmed: String,
    hint: Option<EntityKind>,
}

/// Matches test functions against a registry's entities
pub struct Linker<'r> {
    registry: &'r Registry,
    keys: BTreeSet<EntityKey>,
    names: BTreeSet<String>,
    files: FileFilter,
    file_prefixes: Vec<FileConvention>,
    file_suffixes: Vec<FileConvention>,
    file_suffix_strip: Vec<String>,
    function_suffixes: Vec<String>,
    keywords: Vec<String>,
    provider_prefix: String,
    fuzzy_threshold: Option<f64>,
}

impl<'r> Linker<'r> {
    /// Takes a snapshot of the registry's entities; entities registered later are not matched.
    pub fn new(registry: &'r Registry, settings: &Settings) -> Result<Self, ConfigError> {
        let keys: BTreeSet<EntityKey> = registry.definitions().into_keys().collect();
        let names = keys.iter().map(|k| k.name.clone()).collect();
        Ok(Self {
            registry,
            keys,
            names,
            files: FileFilter::new(settings)?,
            file_prefixes: parse_conventions(
                &settings.test_file_prefix_patterns,
                "test-file-prefix-patterns",
            )?,
            file_suffixes: parse_conventions(
                &settings.test_file_suffix_patterns,
                "test-file-suffix-patterns",
            )?,
            file_suffix_strip: settings.test_file_suffix_strip.clone(),
            function_suffixes: settings.test_function_suffixes(),
            keywords: settings.function_name_keywords_to_strip.clone(),
            provider_prefix: settings.provider_prefix.clone(),
            fuzzy_threshold: settings
                .enable_fuzzy_matching
                .then(|| settings.effective_fuzzy_threshold()),
        })
    }

    /// Link every test function that is not linked yet. Returns how many were linked.
    pub fn link_all(&self) -> Result<usize, RegistryError> {
        let mut linked = 0;
        for id in self.registry.test_ids() {
            let Some(test) = self.registry.test_function(id) else {
                continue;
            };
            if test.linked.is_some() {
                continue;
            }
            match self.match_test(&test) {
                Some(m) => {
                    self.registry
                        .link_test(id, &m.key, m.match_type, m.confidence)?;
                    linked += 1;
                }
                None => debug!("no entity found for {} ({})", test.name, test.category),
            }
        }
        Ok(linked)
    }

    /// The highest-priority match for a test function, if any strategy succeeds
    pub fn match_test(&self, test: &TestFunction) -> Option<Match> {
        if let Some(key) = self.match_by_function_name(&test.name) {
            return Some(Match::new(key, MatchType::FunctionName, FUNCTION_NAME_CONFIDENCE));
        }
        if let Some(key) = self.match_by_file_proximity(&test.location.file) {
            return Some(Match::new(key, MatchType::FileProximity, FILE_PROXIMITY_CONFIDENCE));
        }
        if let Some(key) = self.match_by_inferred_config(test) {
            return Some(Match::new(key, MatchType::InferredFromConfig, INFERRED_CONFIDENCE));
        }
        let (key, score) = self.match_by_similarity(&test.name)?;
        Some(Match::new(key, MatchType::Fuzzy, score))
    }

    pub fn match_by_function_name(&self, function: &str) -> Option<EntityKey> {
        let portion = self.name_portion(function)?;
        let mut parts = vec![portion.trimmed.as_str()];
        if portion.raw != portion.trimmed {
            parts.push(portion.raw.as_str());
        }
        parts
            .into_iter()
            .find_map(|part| self.match_camel_part(part, portion.hint))
    }

    fn match_camel_part(&self, part: &str, hint: Option<EntityKind>) -> Option<EntityKey> {
        let snake = to_snake_case(part);
        if let Some(key) = self.resolve_or_unprefixed(&snake, hint) {
            return Some(key);
        }

        let mut stripped = part.to_string();
        for keyword in &self.keywords {
            if !keyword.is_empty() && stripped.contains(keyword.as_str()) {
                stripped = stripped.replacen(keyword.as_str(), "", 1);
            }
        }
        if stripped != part && !stripped.is_empty() {
            let snake = to_snake_case(&stripped);
            if let Some(key) = self.resolve_or_unprefixed(&snake, hint) {
                debug!("{} matched after keyword stripping", part);
                return Some(key);
            }
        }

        self.match_segments(&snake, hint).or_else(|| {
            self.unprefixed(&snake)
                .and_then(|rest| self.match_segments(rest, hint))
        })
    }

    /// Try dropping interior words: `big_query_external_data_table` -> `big_query_table`, ...
    fn match_segments(&self, snake: &str, hint: Option<EntityKind>) -> Option<EntityKey> {
        let parts: Vec<&str> = snake.split('_').collect();
        let n = parts.len();
        if n < 3 {
            return None;
        }
        let mut candidates = vec![
            [parts[0], parts[n - 1]].join("_"),
            [parts[0], parts[1], parts[n - 1]].join("_"),
            [parts[0], parts[n - 2], parts[n - 1]].join("_"),
        ];
        if n >= 5 {
            candidates.push([parts[0], parts[1], parts[2], parts[n - 1]].join("_"));
        }
        candidates.iter().find_map(|c| self.resolve(c, hint))
    }

    pub fn match_by_file_proximity(&self, path: &str) -> Option<EntityKey> {
        let mut stem = self.files.test_file_stem(path)?;
        if let Some(stripped) = self
            .file_suffix_strip
            .iter()
            .find_map(|suffix| stem.strip_suffix(suffix.as_str()))
        {
            stem = stripped;
        }

        let mut candidates: Vec<(&str, Option<EntityKind>)> = Vec::new();
        for convention in &self.file_prefixes {
            if let Some(rest) = stem.strip_prefix(convention.marker.as_str()) {
                candidates.push((rest, convention_kind(convention)));
            }
        }
        for convention in &self.file_suffixes {
            if let Some(rest) = stem.strip_suffix(convention.marker.as_str()) {
                candidates.push((rest, convention_kind(convention)));
            }
        }
        candidates.push((stem, None));

        candidates
            .into_iter()
            .filter(|(name, _)| !name.is_empty())
            .find_map(|(name, hint)| self.resolve(name, hint))
    }

    /// First inferred block, in source order, naming a known entity
    pub fn match_by_inferred_config(&self, test: &TestFunction) -> Option<EntityKey> {
        test.inferred_blocks.iter().find_map(|block| {
            let full = block.type_name.as_str();
            let short = self.unprefixed(full);
            [Some(full), short]
                .into_iter()
                .flatten()
                .find_map(|name| self.resolve(name, Some(block.kind)))
        })
    }

    pub fn match_by_similarity(&self, function: &str) -> Option<(EntityKey, f64)> {
        let threshold = self.fuzzy_threshold?;
        let portion = self.name_portion(function)?;
        let needle = to_snake_case(&portion.raw);
        let (name, score) = best_match(&needle, self.names.iter().map(String::as_str), threshold)?;
        debug!("{} is {:.2} similar to {}", function, score, name);
        Some((self.resolve(name, portion.hint)?, score))
    }

    fn name_portion(&self, function: &str) -> Option<NamePortion> {
        let (mut rest, mut hint) = (function, None);
        for prefix in TEST_FUNCTION_PREFIXES {
            if let Some(stripped) = function.strip_prefix(prefix) {
                rest = stripped;
                if prefix.ends_with("DataSource") {
                    hint = Some(EntityKind::DataSource);
                } else if prefix.ends_with("Resource") {
                    hint = Some(EntityKind::Resource);
                }
                break;
            }
        }
        rest = rest.strip_prefix('_').unwrap_or(rest);

        for suffix in &self.function_suffixes {
            if let Some(stripped) = rest.strip_suffix(suffix.as_str())
                && !stripped.is_empty()
                && !stripped.ends_with('_')
            {
                rest = stripped;
                break;
            }
        }
        let raw = rest.split('_').next().unwrap_or(rest);
        if raw.is_empty() {
            return None;
        }

        let mut trimmed = raw;
        if let Some(stripped) = ACTION_LIFECYCLE_SUFFIXES
            .iter()
            .find_map(|suffix| trimmed.strip_suffix(suffix))
            .filter(|s| !s.is_empty())
        {
            trimmed = stripped;
        }
        for (suffix, kind) in KIND_SUFFIXES {
            if let Some(stripped) = trimmed.strip_suffix(suffix)
                && !stripped.is_empty()
            {
                trimmed = stripped;
                hint = Some(*kind);
                break;
            }
        }

        Some(NamePortion {
            raw: raw.to_string(),
            trimmed: trimmed.to_string(),
            hint,
        })
    }

    /// Name without its provider segment
    fn unprefixed<'n>(&self, name: &'n str) -> Option<&'n str> {
        if !self.provider_prefix.is_empty()
            && let Some(rest) = name
                .strip_prefix(self.provider_prefix.as_str())
                .and_then(|r| r.strip_prefix('_'))
            && !rest.is_empty()
        {
            return Some(rest);
        }
        strip_provider_prefix(name)
    }

    fn resolve_or_unprefixed(&self, name: &str, hint: Option<EntityKind>) -> Option<EntityKey> {
        self.resolve(name, hint)
            .or_else(|| self.resolve(self.unprefixed(name)?, hint))
    }

    /// The hinted kind first, then the usual lookup order
    fn resolve(&self, name: &str, hint: Option<EntityKind>) -> Option<EntityKey> {
        hint.into_iter()
            .chain(EntityKind::ALL)
            .map(|kind| EntityKey::new(kind, name))
            .find(|key| self.keys.contains(key))
    }
}

fn convention_kind(convention: &FileConvention) -> Option<EntityKind> {
    if convention.data_source {
        Some(EntityKind::DataSource)
    } else if convention.marker.contains("action") {
        Some(EntityKind::Action)
    } else if convention.marker.contains("resource") {
        Some(EntityKind::Resource)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entity, InferredBlock, SourceLocation};

    fn registry(entities: &[(EntityKind, &str)]) -> Registry {
        let registry = Registry::new();
        for (kind, name) in entities {
            registry.register_entity(Entity::new(*kind, *name, SourceLocation::new("p.go", 1, 1)));
        }
        registry
    }

    fn key(kind: EntityKind, name: &str) -> Option<EntityKey> {
        Some(EntityKey::new(kind, name))
    }

    #[test]
    fn test_function_name() {
        let r = registry(&[
            (EntityKind::Resource, "widget"),
            (EntityKind::DataSource, "widget"),
            (EntityKind::Resource, "compute_disk"),
            (EntityKind::Resource, "s3_bucket"),
            (EntityKind::Resource, "big_query_table"),
            (EntityKind::Action, "restart"),
        ]);
        let linker = Linker::new(&r, &Settings::default()).unwrap();
        let m = |name: &str| linker.match_by_function_name(name);

        assert_eq!(m("TestAccWidgetResource_basic"), key(EntityKind::Resource, "widget"));
        assert_eq!(m("TestAccWidget_update"), key(EntityKind::Resource, "widget"));
        assert_eq!(
            m("TestAccDataSourceWidget_basic"),
            key(EntityKind::DataSource, "widget"),
            "prefix hints the kind"
        );
        assert_eq!(m("TestAccWidgetDataSource"), key(EntityKind::DataSource, "widget"));
        assert_eq!(m("TestAccAwsS3Bucket_basic"), key(EntityKind::Resource, "s3_bucket"));
        assert_eq!(
            m("TestAccComputeDiskIamBinding"),
            key(EntityKind::Resource, "compute_disk")
        );
        assert_eq!(
            m("TestAccBigQueryExternalDataTable"),
            key(EntityKind::Resource, "big_query_table")
        );
        assert_eq!(
            m("TestAccRestartActionAfterCreate"),
            key(EntityKind::Action, "restart")
        );
        assert_eq!(m("TestAccGadget_basic"), None);
        assert_eq!(m("Test"), None);
    }

    #[test]
    fn test_explicit_provider_prefix() {
        let r = registry(&[(EntityKind::Resource, "widget")]);
        let settings = Settings {
            provider_prefix: "example".into(),
            ..Settings::default()
        };
        let linker = Linker::new(&r, &settings).unwrap();
        assert_eq!(
            linker.match_by_function_name("TestAccExampleWidget_basic"),
            key(EntityKind::Resource, "widget")
        );
    }

    #[test]
    fn test_file_proximity() {
        let r = registry(&[
            (EntityKind::Resource, "widget"),
            (EntityKind::DataSource, "widget"),
            (EntityKind::Action, "restart"),
            (EntityKind::Resource, "gadget"),
        ]);
        let linker = Linker::new(&r, &Settings::default()).unwrap();
        let m = |path: &str| linker.match_by_file_proximity(path);

        assert_eq!(m("internal/resource_widget_test.go"), key(EntityKind::Resource, "widget"));
        assert_eq!(m("data_source_widget_test.go"), key(EntityKind::DataSource, "widget"));
        assert_eq!(m("widget_data_source_test.go"), key(EntityKind::DataSource, "widget"));
        assert_eq!(m("restart_action_test.go"), key(EntityKind::Action, "restart"));
        assert_eq!(m("gadget_generated_test.go"), key(EntityKind::Resource, "gadget"));
        assert_eq!(m("gadget_test.go"), key(EntityKind::Resource, "gadget"));
        assert_eq!(m("misc_test.go"), None);
        assert_eq!(m("resource_widget.go"), None, "not a test file");
    }

    #[test]
    fn test_file_proximity_uses_configured_test_pattern() {
        let r = registry(&[(EntityKind::Resource, "widget"), (EntityKind::DataSource, "zone")]);
        let settings = Settings {
            test_file_pattern: "*.test.go".into(),
            ..Settings::default()
        };
        let linker = Linker::new(&r, &settings).unwrap();
        assert_eq!(
            linker.match_by_file_proximity("internal/resource_widget.test.go"),
            key(EntityKind::Resource, "widget")
        );
        assert_eq!(
            linker.match_by_file_proximity("data_source_zone.test.go"),
            key(EntityKind::DataSource, "zone")
        );
        assert_eq!(
            linker.match_by_file_proximity("resource_widget_test.go"),
            None,
            "not a test file under this pattern"
        );

        let test = TestFunction::new(
            "TestAccLifecycle",
            SourceLocation::new("internal/resource_widget.test.go", 3, 1),
        );
        let m = linker.match_test(&test).expect("file proximity match");
        assert_eq!(m.match_type, MatchType::FileProximity);
        assert_eq!(m.confidence, FILE_PROXIMITY_CONFIDENCE);
    }

    #[test]
    fn test_inferred_config_first_block_wins() {
        let r = registry(&[
            (EntityKind::Resource, "widget"),
            (EntityKind::Resource, "network"),
            (EntityKind::DataSource, "zone"),
        ]);
        let linker = Linker::new(&r, &Settings::default()).unwrap();
        let mut test = TestFunction::new("TestAccSomething", SourceLocation::new("misc_test.go", 1, 1));
        test.inferred_blocks = vec![
            InferredBlock {
                kind: EntityKind::Resource,
                type_name: "example_unknown".into(),
            },
            InferredBlock {
                kind: EntityKind::DataSource,
                type_name: "example_zone".into(),
            },
            InferredBlock {
                kind: EntityKind::Resource,
                type_name: "example_widget".into(),
            },
        ];
        assert_eq!(
            linker.match_test(&test),
            Some(Match::new(
                EntityKey::new(EntityKind::DataSource, "zone"),
                MatchType::InferredFromConfig,
                INFERRED_CONFIDENCE
            ))
        );
    }

    #[test]
    fn test_fuzzy_is_opt_in() {
        let r = registry(&[(EntityKind::Resource, "widget")]);
        let test = TestFunction::new("TestAccWidgets_basic", SourceLocation::new("misc_test.go", 1, 1));

        let linker = Linker::new(&r, &Settings::default()).unwrap();
        assert_eq!(linker.match_test(&test), None);

        let settings = Settings {
            enable_fuzzy_matching: true,
            ..Settings::default()
        };
        let linker = Linker::new(&r, &settings).unwrap();
        let m = linker.match_test(&test).expect("fuzzy match");
        assert_eq!(m.match_type, MatchType::Fuzzy);
        assert_eq!(m.key, EntityKey::new(EntityKind::Resource, "widget"));
        assert_eq!(m.confidence, crate::similarity::similarity("widgets", "widget"));
        assert!(m.confidence >= 0.7 && m.confidence < 1.0, "got {}", m.confidence);

        let id = r.register_test_function(test);
        assert_eq!(linker.link_all().unwrap(), 1);
        let stored = r.test_function(id).unwrap();
        assert_eq!(stored.match_type, MatchType::Fuzzy);
        assert_eq!(stored.match_confidence, m.confidence, "confidence is the similarity score");
    }

    #[test]
    fn test_priority_function_name_over_file() {
        let r = registry(&[(EntityKind::Resource, "widget"), (EntityKind::Resource, "gadget")]);
        let linker = Linker::new(&r, &Settings::default()).unwrap();
        let test = TestFunction::new(
            "TestAccWidget_basic",
            SourceLocation::new("resource_gadget_test.go", 1, 1),
        );
        let m = linker.match_test(&test).unwrap();
        assert_eq!(m.match_type, MatchType::FunctionName);
        assert_eq!(m.key.name, "widget");
        assert_eq!(m.confidence, 1.0);
    }

    #[test]
    fn test_link_all_skips_linked() {
        let r = registry(&[(EntityKind::Resource, "widget")]);
        let first = r.register_test_function(TestFunction::new(
            "TestAccWidget_basic",
            SourceLocation::new("x_test.go", 1, 1),
        ));
        r.register_test_function(TestFunction::new(
            "TestAccUnknown",
            SourceLocation::new("x_test.go", 9, 1),
        ));
        let linker = Linker::new(&r, &Settings::default()).unwrap();
        assert_eq!(linker.link_all().unwrap(), 1);
        assert_eq!(linker.link_all().unwrap(), 0, "already linked tests are left alone");
        assert_eq!(
            r.test_function(first).unwrap().linked,
            key(EntityKind::Resource, "widget")
        );
        assert_eq!(r.unmatched_test_functions().len(), 1);
    }
}
