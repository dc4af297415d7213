//! Acceptance test discovery
//!
//! A test function is any `Test*` function whose body reaches the acceptance
//! test harness, either directly (`resource.Test`, `resource.ParallelTest`,
//! `resource.UnitTest` under whatever alias the harness package is imported
//! as), through a configured `package.Function` helper, through an exported
//! local wrapper taking `*testing.T`, or by handing a `resource.TestCase`
//! literal to any call at all.
//!
//! For each test function the `TestCase` literals are walked step by step.
//! Config expressions are fingerprinted so that later stages can tell a real
//! configuration change from a repeated one, and the embedded configuration
//! text is scanned for `resource "type" "label" {` style blocks.

use crate::config::Settings;
use crate::go_ast::{
    GoFile, assignments, call_arguments, call_target, calls, is_true, keyed_elements, literal_body,
    named_children, normalized_text, positional_elements, qualified_type_parts,
    returned_expressions, string_value, text, unparen, unwrap_element,
};
use crate::model::{EntityKind, InferredBlock, TestCategory, TestFunction, TestStep};
use arborium::tree_sitter::Node;
use regex::Regex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;
use tracing::debug;

/// Import paths of the acceptance test harness
pub const HARNESS_PACKAGES: &[&str] = &[
    "github.com/hashicorp/terraform-plugin-testing/helper/resource",
    "github.com/hashicorp/terraform-plugin-sdk/v2/helper/resource",
    "github.com/hashicorp/terraform-plugin-sdk/helper/resource",
];

const HARNESS_ENTRY_POINTS: &[&str] = &["Test", "ParallelTest", "UnitTest"];

static BLOCK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(resource|data|action)\s+"([^"]+)"\s+"[^"]*"\s*\{"#)
        .expect("block pattern is a valid regex")
});

/// Typed blocks declared in configuration text, in order of appearance
pub fn blocks_in_text(config: &str) -> Vec<InferredBlock> {
    BLOCK_PATTERN
        .captures_iter(config)
        .filter_map(|caps| {
            Some(InferredBlock {
                kind: EntityKind::from_block_keyword(caps.get(1)?.as_str())?,
                type_name: caps.get(2)?.as_str().to_string(),
            })
        })
        .collect()
}

/// Stable fingerprint of an expression's whitespace-normalised source text
pub fn fingerprint(node: Node<'_>, source: &str) -> String {
    let normalized = normalized_text(node, source);
    blake3::hash(normalized.as_bytes()).to_hex().as_str()[..16].to_string()
}

/// Aliases under which a file imports the harness package
pub fn harness_aliases(file: &GoFile) -> Vec<String> {
    file.imports()
        .into_iter()
        .filter(|import| HARNESS_PACKAGES.contains(&import.path.as_str()))
        .map(|import| import.alias)
        .collect()
}

/// Exported functions of test files that wrap the harness and take a `*testing.T`.
///
/// Calls to these qualify a test function in any file of the session.
pub fn find_local_helpers<'f>(files: impl IntoIterator<Item = &'f GoFile>) -> BTreeSet<String> {
    let mut helpers = BTreeSet::new();
    for file in files.into_iter().filter(|f| f.is_test) {
        let aliases = harness_aliases(file);
        if aliases.is_empty() {
            continue;
        }
        for func in file.functions() {
            let exported = func.name.chars().next().is_some_and(char::is_uppercase);
            if func.receiver.is_some() || !exported || func.name.starts_with("Test") {
                continue;
            }
            let Some(body) = func.body else {
                continue;
            };
            let takes_t = func
                .parameters
                .is_some_and(|params| accepts_testing_t(params, &file.source));
            let calls_harness = calls(body).into_iter().any(|call| {
                matches!(
                    call_target(call, &file.source),
                    Some((Some(op), name))
                        if aliases.iter().any(|a| a == op) && HARNESS_ENTRY_POINTS.contains(&name)
                )
            });
            if takes_t && calls_harness {
                debug!("local harness helper {} in {}", func.name, file.path);
                helpers.insert(func.name.to_string());
            }
        }
    }
    helpers
}

fn accepts_testing_t(params: Node<'_>, source: &str) -> bool {
    named_children(params)
        .into_iter()
        .filter_map(|decl| decl.child_by_field_name("type"))
        .any(|ty| {
            ty.kind() == "pointer_type" && qualified_type_parts(ty, source) == Some(("testing", "T"))
        })
}

/// Whether a file registers sweepers with the harness
pub fn registers_sweepers(file: &GoFile) -> bool {
    let aliases = harness_aliases(file);
    calls(file.root()).into_iter().any(|call| {
        matches!(
            call_target(call, &file.source),
            Some((Some(op), "AddTestSweepers")) if op == "resource" || aliases.iter().any(|a| a == op)
        )
    })
}

/// Test function category, from the first rule that applies
pub fn classify(test: &TestFunction) -> TestCategory {
    if !test.inferred_blocks.is_empty() {
        return TestCategory::EntityTest;
    }
    let name = test.name.as_str();
    let path = test.location.file.as_str();

    const PROVIDER_MARKERS: &[&str] = &[
        "ProviderConfig",
        "ProviderMeta",
        "ProviderBasePath",
        "ProviderCredentials",
        "ProviderEmptyStrings",
        "UniverseDomain",
    ];
    if PROVIDER_MARKERS.iter().any(|m| name.contains(m))
        || name.starts_with("TestAccProvider")
        || name.starts_with("TestAccFrameworkProvider")
    {
        return TestCategory::ProviderConfigTest;
    }
    if ["ProviderFunction", "Parse_", "Function_"]
        .iter()
        .any(|m| name.contains(m))
        || name.ends_with("ParseFunction")
    {
        return TestCategory::FunctionTest;
    }
    if path.contains("/functions/") || path.contains("/testing/") || path.ends_with("_function_test.go")
    {
        return TestCategory::FunctionTest;
    }
    if [
        "provider_test.go",
        "provider_config",
        "framework_provider_test.go",
        "universe_domain",
    ]
    .iter()
    .any(|m| path.contains(m))
    {
        return TestCategory::ProviderConfigTest;
    }
    TestCategory::IntegrationTest
}

/// Extracts [`TestFunction`]s from test files
#[derive(Debug, Clone)]
pub struct TestParser {
    settings: Settings,
    custom_helpers: Vec<(String, String)>,
    local_helpers: BTreeSet<String>,
}

/// Per-file lookup tables shared by all test functions of the file
struct FileScope<'f> {
    file: &'f GoFile,
    aliases: Vec<String>,
    /// Blocks found in each function's return statements
    helper_blocks: HashMap<&'f str, Vec<InferredBlock>>,
}

impl FileScope<'_> {
    fn source(&self) -> &str {
        &self.file.source
    }

    fn is_harness_alias(&self, operand: &str) -> bool {
        self.aliases.iter().any(|a| a == operand)
    }

    /// `alias.TestCase{...}` (or a pointer to one)
    fn test_case_literal<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        let literal = composite(node)?;
        let (pkg, name) = qualified_type_parts(literal.child_by_field_name("type")?, self.source())?;
        (name == "TestCase" && self.is_harness_alias(pkg)).then_some(literal)
    }

    /// `TestCase` literal passed directly, or through a local binding such as
    /// `tc := resource.TestCase{...}; resource.Test(t, tc)`
    fn test_case_argument<'t>(
        &self,
        arg: Node<'t>,
        bindings: &[(String, Node<'t>)],
    ) -> Option<Node<'t>> {
        if let Some(literal) = self.test_case_literal(arg) {
            return Some(literal);
        }
        let arg = unparen(arg);
        if arg.kind() != "identifier" {
            return None;
        }
        let name = text(arg, self.source());
        bindings
            .iter()
            .find(|(bound, _)| bound == name)
            .map(|(_, literal)| *literal)
    }

    /// Local names assigned a `TestCase` literal in `body`
    fn test_case_bindings<'t>(&self, body: Node<'t>) -> Vec<(String, Node<'t>)> {
        assignments(body)
            .into_iter()
            .filter(|(left, _)| left.kind() == "identifier")
            .filter_map(|(left, right)| {
                let literal = self.test_case_literal(right)?;
                Some((text(left, self.source()).to_string(), literal))
            })
            .collect()
    }

    /// `[]alias.TestStep{...}`
    fn step_slice_literal<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        let literal = composite(node)?;
        let ty = literal.child_by_field_name("type")?;
        if ty.kind() != "slice_type" {
            return None;
        }
        let (pkg, name) = qualified_type_parts(ty.child_by_field_name("element")?, self.source())?;
        (name == "TestStep" && self.is_harness_alias(pkg)).then_some(literal)
    }
}

fn composite(node: Node<'_>) -> Option<Node<'_>> {
    let mut node = unparen(unwrap_element(node));
    if node.kind() == "unary_expression" {
        node = node.child_by_field_name("operand")?;
    }
    (node.kind() == "composite_literal").then_some(node)
}

impl TestParser {
    pub fn new(settings: &Settings) -> Self {
        let custom_helpers = settings
            .custom_test_helpers
            .iter()
            .filter_map(|helper| helper.split_once('.'))
            .map(|(pkg, func)| (pkg.to_string(), func.to_string()))
            .collect();
        Self {
            settings: settings.clone(),
            custom_helpers,
            local_helpers: BTreeSet::new(),
        }
    }

    /// Harness wrappers found by [`find_local_helpers`] across the session
    pub fn with_local_helpers(mut self, helpers: BTreeSet<String>) -> Self {
        self.local_helpers = helpers;
        self
    }

    /// Every qualifying test function of one test file, in source order
    pub fn parse(&self, file: &GoFile) -> Vec<TestFunction> {
        let functions = file.functions();
        let mut helper_blocks = HashMap::new();
        for func in &functions {
            let Some(body) = func.body else {
                continue;
            };
            let mut blocks = Vec::new();
            for expr in returned_expressions(body) {
                blocks_in_expr(expr, &file.source, &mut blocks);
            }
            if !blocks.is_empty() {
                helper_blocks.insert(func.name, blocks);
            }
        }
        let scope = FileScope {
            file,
            aliases: harness_aliases(file),
            helper_blocks,
        };

        let mut tests = Vec::new();
        for func in &functions {
            if func.receiver.is_some() || !func.name.starts_with("Test") {
                continue;
            }
            let Some(body) = func.body else {
                continue;
            };
            if !self.settings.matches_test_name_patterns(func.name) {
                continue;
            }
            let Some(helper) = self.harness_call(&scope, body) else {
                continue;
            };
            let mut test = TestFunction::new(func.name, file.location(func.node));
            test.helper_used = helper;
            collect_test_cases(&scope, body, &mut test);
            test.category = classify(&test);
            debug!(
                "test {} ({} steps, {}) via {}",
                test.name,
                test.steps.len(),
                test.category,
                test.helper_used
            );
            tests.push(test);
        }
        tests
    }

    /// The first harness entry point reached from `body`, as written
    fn harness_call(&self, scope: &FileScope<'_>, body: Node<'_>) -> Option<String> {
        let source = scope.source();
        let bindings = scope.test_case_bindings(body);
        calls(body).into_iter().find_map(|call| {
            let target = call_target(call, source);
            match target {
                Some((Some(op), name))
                    if scope.is_harness_alias(op) && HARNESS_ENTRY_POINTS.contains(&name) =>
                {
                    return Some(format!("{op}.{name}"));
                }
                Some((Some(op), name))
                    if self.custom_helpers.iter().any(|(p, f)| p == op && f == name) =>
                {
                    return Some(format!("{op}.{name}"));
                }
                Some((None, name)) if self.local_helpers.contains(name) => {
                    return Some(name.to_string());
                }
                _ => {}
            }
            let passes_test_case = call_arguments(call)
                .into_iter()
                .any(|arg| scope.test_case_argument(arg, &bindings).is_some());
            passes_test_case.then(|| match target {
                Some((Some(op), name)) => format!("{op}.{name}"),
                Some((None, name)) => name.to_string(),
                None => "TestCase".to_string(),
            })
        })
    }
}

/// Walk every `TestCase` and step slice passed to a call in `body`, once each
fn collect_test_cases(scope: &FileScope<'_>, body: Node<'_>, test: &mut TestFunction) {
    let source = scope.source();
    let bindings = scope.test_case_bindings(body);
    let mut walked = HashSet::new();
    for call in calls(body) {
        for arg in call_arguments(call) {
            if let Some(case) = scope.test_case_argument(arg, &bindings) {
                if !walked.insert(case.id()) {
                    continue;
                }
                let Some(fields) = literal_body(case) else {
                    continue;
                };
                for field in keyed_elements(fields) {
                    match text(field.key, source) {
                        "CheckDestroy" => test.has_check_destroy = true,
                        "PreCheck" => test.has_pre_check = true,
                        "Steps" => {
                            if let Some(list) = literal_body(field.value) {
                                push_steps(scope, list, test);
                            }
                        }
                        _ => {}
                    }
                }
            } else if let Some(slice) = scope.step_slice_literal(arg)
                && let Some(list) = literal_body(slice)
            {
                push_steps(scope, list, test);
            }
        }
    }
    test.has_import_step = test.steps.iter().any(|s| s.import_state);
    test.has_error_case = test.steps.iter().any(|s| s.expect_error);
}

/// Parse one step list; indices and previous fingerprints are local to the list
fn push_steps(scope: &FileScope<'_>, list: Node<'_>, test: &mut TestFunction) {
    let mut previous = String::new();
    for (index, element) in positional_elements(list).into_iter().enumerate() {
        let mut step = parse_step(scope, element, index);
        step.previous_config_fingerprint = std::mem::take(&mut previous);
        previous = step.config_fingerprint.clone();
        for block in &step.inferred_blocks {
            if !test.inferred_blocks.contains(block) {
                test.inferred_blocks.push(block.clone());
            }
        }
        test.steps.push(step);
    }
}

fn parse_step(scope: &FileScope<'_>, element: Node<'_>, index: usize) -> TestStep {
    let source = scope.source();
    let mut step = TestStep {
        index,
        ..TestStep::default()
    };
    let Some(fields) = literal_body(element) else {
        return step;
    };
    for field in keyed_elements(fields) {
        let value = field.value;
        match text(field.key, source) {
            "Config" => {
                step.has_config = true;
                step.config_fingerprint = fingerprint(value, source);
                blocks_in_expr(value, source, &mut step.inferred_blocks);
                if let Some((None, helper)) = call_target(unparen(value), source)
                    && let Some(blocks) = scope.helper_blocks.get(helper)
                {
                    step.inferred_blocks.extend(blocks.iter().cloned());
                }
                dedup_in_order(&mut step.inferred_blocks);
            }
            "Check" => {
                step.has_check = true;
                step.has_state_check = true;
                step.check_functions = calls(value)
                    .into_iter()
                    .filter_map(|call| match call_target(call, source)? {
                        (Some(_), name) => Some(name.to_string()),
                        (None, _) => None,
                    })
                    .collect();
            }
            "ConfigStateChecks" => step.has_state_check = true,
            "ConfigPlanChecks" => step.has_plan_check = true,
            "ImportState" => step.import_state = is_true(value),
            "ImportStateVerify" => step.import_state_verify = is_true(value),
            "ExpectNonEmptyPlan" => step.expect_non_empty_plan = is_true(value),
            "RefreshState" => step.refresh_state = is_true(value),
            "ExpectError" => step.expect_error = true,
            _ => {}
        }
    }
    step
}

fn dedup_in_order(blocks: &mut Vec<InferredBlock>) {
    let mut seen = Vec::with_capacity(blocks.len());
    blocks.retain(|block| {
        if seen.contains(block) {
            false
        } else {
            seen.push(block.clone());
            true
        }
    });
}

/// Blocks in string literals, concatenations and call arguments under `expr`
fn blocks_in_expr(expr: Node<'_>, source: &str, out: &mut Vec<InferredBlock>) {
    let expr = unparen(expr);
    match expr.kind() {
        "interpreted_string_literal" | "raw_string_literal" => {
            if let Some(config) = string_value(expr, source) {
                out.extend(blocks_in_text(&config));
            }
        }
        "binary_expression" => {
            let is_concat = expr
                .child_by_field_name("operator")
                .is_some_and(|op| text(op, source) == "+");
            if is_concat {
                for side in ["left", "right"] {
                    if let Some(operand) = expr.child_by_field_name(side) {
                        blocks_in_expr(operand, source, out);
                    }
                }
            }
        }
        "call_expression" => {
            for arg in call_arguments(expr) {
                blocks_in_expr(arg, source, out);
            }
        }
        _ => {}
    }
}
