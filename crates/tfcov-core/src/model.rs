//! Entities, test functions and the values linking them

use facet::Facet;
use std::fmt;

/// What kind of provider component an entity is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
#[repr(u8)]
pub enum EntityKind {
    /// A managed resource
    Resource,
    /// A read-only data source
    DataSource,
    /// An action (imperative, lifecycle-triggered operation)
    Action,
}

impl EntityKind {
    /// Lookup order used whenever only a bare name is known
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Resource,
        EntityKind::DataSource,
        EntityKind::Action,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Resource => "resource",
            EntityKind::DataSource => "data source",
            EntityKind::Action => "action",
        }
    }

    /// The keyword introducing a block of this kind in embedded configuration text
    pub fn block_keyword(&self) -> &'static str {
        match self {
            EntityKind::Resource => "resource",
            EntityKind::DataSource => "data",
            EntityKind::Action => "action",
        }
    }

    pub fn from_block_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "resource" => Some(EntityKind::Resource),
            "data" => Some(EntityKind::DataSource),
            "action" => Some(EntityKind::Action),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an entity: a simple name is only unique within its kind
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
pub struct EntityKey {
    pub kind: EntityKind,
    pub name: String,
}

impl EntityKey {
    pub fn new(kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}

/// Where something was declared
#[derive(Debug, Clone, Default, PartialEq, Eq, Facet)]
pub struct SourceLocation {
    /// Path of the file, as given by the source provider
    pub file: String,
    /// 1-indexed line
    pub line: usize,
    /// 1-indexed column
    pub column: usize,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A schema attribute of an entity
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Attribute {
    pub name: String,
    /// Attribute constructor or schema type, e.g. `StringAttribute` or `TypeString`
    #[facet(default)]
    pub type_name: Option<String>,
    pub required: bool,
    pub optional: bool,
    pub computed: bool,
    /// False when a requires-replace modifier (or `ForceNew`) is present
    pub updatable: bool,
    pub has_validators: bool,
    pub validator_kinds: Vec<String>,
}

impl Attribute {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
            required: false,
            optional: false,
            computed: false,
            updatable: true,
            has_validators: false,
            validator_kinds: Vec::new(),
        }
    }

    /// Changing this attribute in place is possible, so a test should do it
    pub fn needs_update_test(&self) -> bool {
        self.optional && self.updatable
    }

    /// Invalid values for this attribute are rejected, so a test should provoke that
    pub fn needs_validation_test(&self) -> bool {
        self.has_validators || self.required
    }
}

/// A resource, data source or action declared in provider source
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct Entity {
    pub name: String,
    pub kind: EntityKind,
    pub location: SourceLocation,
    pub attributes: Vec<Attribute>,
    pub import_capable: bool,
}

impl Entity {
    pub fn new(kind: EntityKind, name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            kind,
            location,
            attributes: Vec::new(),
            import_capable: false,
        }
    }

    pub fn key(&self) -> EntityKey {
        EntityKey::new(self.kind, self.name.clone())
    }
}

/// Which linking strategy produced a test function's association.
///
/// Variants are declared lowest precedence first, so `Ord` follows precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Facet)]
#[repr(u8)]
pub enum MatchType {
    None,
    Fuzzy,
    FileProximity,
    FunctionName,
    InferredFromConfig,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::None => "none",
            MatchType::Fuzzy => "fuzzy",
            MatchType::FileProximity => "file_proximity",
            MatchType::FunctionName => "function_name",
            MatchType::InferredFromConfig => "inferred_from_config",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a test function is exercising
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Facet)]
#[repr(u8)]
pub enum TestCategory {
    EntityTest,
    ProviderConfigTest,
    FunctionTest,
    IntegrationTest,
}

impl TestCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCategory::EntityTest => "entity",
            TestCategory::ProviderConfigTest => "provider-config",
            TestCategory::FunctionTest => "function",
            TestCategory::IntegrationTest => "integration",
        }
    }

    /// Whether a test of this category is expected to match some entity
    pub fn expects_entity(&self) -> bool {
        !matches!(
            self,
            TestCategory::ProviderConfigTest | TestCategory::FunctionTest
        )
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed block found in embedded configuration text, e.g. `resource "example_widget" "x" {`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Facet)]
pub struct InferredBlock {
    pub kind: EntityKind,
    /// Full type name as written, provider prefix included
    pub type_name: String,
}

/// One step of an acceptance test case
#[derive(Debug, Clone, Default, PartialEq, Facet)]
pub struct TestStep {
    /// 0-based position within its test case
    pub index: usize,
    pub has_config: bool,
    /// Empty when the step has no config
    pub config_fingerprint: String,
    /// Fingerprint of the preceding step's config, empty for the first step
    pub previous_config_fingerprint: String,
    pub has_check: bool,
    pub has_state_check: bool,
    pub has_plan_check: bool,
    pub import_state: bool,
    pub import_state_verify: bool,
    pub expect_error: bool,
    pub expect_non_empty_plan: bool,
    pub refresh_state: bool,
    /// Check helpers called from `Check`, e.g. `TestCheckResourceAttr`
    pub check_functions: Vec<String>,
    pub inferred_blocks: Vec<InferredBlock>,
}

impl TestStep {
    /// A non-first step applying a new configuration, as opposed to an import step
    pub fn is_real_update_step(&self) -> bool {
        self.index > 0 && self.has_config && !self.import_state
    }

    /// Whether this step's config differs textually from the previous step's
    pub fn changes_config(&self) -> bool {
        self.is_real_update_step() && self.config_fingerprint != self.previous_config_fingerprint
    }
}

/// An acceptance test function and everything known about it
#[derive(Debug, Clone, PartialEq, Facet)]
pub struct TestFunction {
    pub name: String,
    pub location: SourceLocation,
    pub steps: Vec<TestStep>,
    pub match_type: MatchType,
    /// In `[0, 1]`; 0 while unmatched
    pub match_confidence: f64,
    pub category: TestCategory,
    pub has_check_destroy: bool,
    pub has_pre_check: bool,
    pub has_import_step: bool,
    pub has_error_case: bool,
    /// Blocks found in step configs, deduplicated, in source order
    pub inferred_blocks: Vec<InferredBlock>,
    /// The harness entry point that qualified this function, e.g. `resource.Test`
    pub helper_used: String,
    /// Set once, by the linker
    #[facet(default)]
    pub linked: Option<EntityKey>,
}

impl TestFunction {
    pub fn new(name: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            name: name.into(),
            location,
            steps: Vec::new(),
            match_type: MatchType::None,
            match_confidence: 0.0,
            category: TestCategory::IntegrationTest,
            has_check_destroy: false,
            has_pre_check: false,
            has_import_step: false,
            has_error_case: false,
            inferred_blocks: Vec::new(),
            helper_used: String::new(),
            linked: None,
        }
    }

    /// Inferred entity type names, in source order
    pub fn inferred_names(&self) -> impl Iterator<Item = &str> {
        self.inferred_blocks.iter().map(|b| b.type_name.as_str())
    }

    pub fn is_matched(&self) -> bool {
        self.match_type != MatchType::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(index: usize, has_config: bool, import_state: bool) -> TestStep {
        TestStep {
            index,
            has_config,
            import_state,
            ..Default::default()
        }
    }

    #[test]
    fn test_real_update_step() {
        assert!(
            !step(0, true, false).is_real_update_step(),
            "first step never updates"
        );
        assert!(step(1, true, false).is_real_update_step());
        assert!(!step(1, false, false).is_real_update_step(), "no config, no update");
        assert!(
            !step(1, true, true).is_real_update_step(),
            "import steps are never updates"
        );
    }

    #[test]
    fn test_changes_config() {
        let mut s = step(1, true, false);
        s.config_fingerprint = "aa".into();
        s.previous_config_fingerprint = "aa".into();
        assert!(!s.changes_config());
        s.config_fingerprint = "bb".into();
        assert!(s.changes_config());
    }

    #[test]
    fn test_match_type_precedence() {
        assert!(MatchType::InferredFromConfig > MatchType::FunctionName);
        assert!(MatchType::FunctionName > MatchType::FileProximity);
        assert!(MatchType::FileProximity > MatchType::Fuzzy);
        assert!(MatchType::Fuzzy > MatchType::None);
    }

    #[test]
    fn test_entity_key_display() {
        assert_eq!(
            EntityKey::new(EntityKind::Resource, "widget").to_string(),
            "resource:widget"
        );
        assert_eq!(
            EntityKey::new(EntityKind::DataSource, "widget").to_string(),
            "data source:widget"
        );
    }

    #[test]
    fn test_attribute_needs() {
        let mut attr = Attribute::new("name");
        attr.optional = true;
        assert!(attr.needs_update_test());
        attr.updatable = false;
        assert!(!attr.needs_update_test());
        assert!(!attr.needs_validation_test());
        attr.required = true;
        assert!(attr.needs_validation_test());
    }

    #[test]
    fn test_block_keywords() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_block_keyword(kind.block_keyword()), Some(kind));
        }
        assert_eq!(EntityKind::from_block_keyword("module"), None);
    }
}
