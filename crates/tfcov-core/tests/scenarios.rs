//! End-to-end scenarios over in-memory provider sources

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tfcov_core::similarity::similarity;
use tfcov_core::{
    CoverageReport, Entity, EntityKey, EntityKind, MatchType, MemorySources, Registry,
    RegistryCache, SessionId, Settings, SourceLocation, analyze,
};

const HARNESS_IMPORT: &str = r#"import (
    "testing"

    "github.com/hashicorp/terraform-plugin-testing/helper/resource"
)
"#;

fn test_file(body: &str) -> String {
    format!("package provider\n\n{HARNESS_IMPORT}\n{body}")
}

const WIDGET_RESOURCE: &str = r#"package provider

import (
    "context"

    "github.com/hashicorp/terraform-plugin-framework/resource"
    "github.com/hashicorp/terraform-plugin-framework/resource/schema"
)

type WidgetResource struct{}

func NewWidgetResource() resource.Resource {
    return &WidgetResource{}
}

func (r *WidgetResource) Metadata(ctx context.Context, req resource.MetadataRequest, resp *resource.MetadataResponse) {
    resp.TypeName = req.ProviderTypeName + "_widget"
}

func (r *WidgetResource) Schema(ctx context.Context, req resource.SchemaRequest, resp *resource.SchemaResponse) {
    resp.Schema = schema.Schema{
        Attributes: map[string]schema.Attribute{
            "name": schema.StringAttribute{
                Required: true,
            },
        },
    }
}
"#;

fn sdk_resource(factory: &str) -> String {
    format!(
        r#"package provider

import "github.com/hashicorp/terraform-plugin-sdk/v2/helper/schema"

func {factory}() *schema.Resource {{
    return &schema.Resource{{}}
}}
"#
    )
}

fn analyze_memory(files: &[(&str, &str)]) -> Registry {
    analyze_memory_with(files, &Settings::default())
}

fn analyze_memory_with(files: &[(&str, &str)], settings: &Settings) -> Registry {
    let sources = files
        .iter()
        .fold(MemorySources::new(), |sources, (path, content)| {
            sources.add(*path, *content)
        });
    analyze(sources, settings).expect("analysis succeeds")
}

fn widget() -> EntityKey {
    EntityKey::new(EntityKind::Resource, "widget")
}

#[test]
fn test_function_name_match_with_state_check() {
    let test = test_file(
        r#"func TestAccWidgetResource_basic(t *testing.T) {
    resource.Test(t, resource.TestCase{
        Steps: []resource.TestStep{
            {
                Config: `resource "example_widget" "test" { name = "a" }`,
                Check:  resource.TestCheckResourceAttr("example_widget.test", "name", "a"),
            },
        },
    })
}
"#,
    );
    let registry = analyze_memory(&[
        ("widget_resource.go", WIDGET_RESOURCE),
        ("widget_resource_test.go", &test),
    ]);

    let keys: Vec<_> = registry.definitions().into_keys().collect();
    assert_eq!(keys, vec![widget()]);
    let widget_entity = registry.entity(&widget()).unwrap();
    assert_eq!(widget_entity.attributes.len(), 1);
    assert!(widget_entity.attributes[0].required);

    let tests = registry.tests_for(&widget());
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].match_type, MatchType::FunctionName);
    assert_eq!(tests[0].match_confidence, 1.0);

    let report = CoverageReport::from_registry(&registry);
    let coverage = report.get(&widget()).unwrap();
    assert!(coverage.has_basic_test);
    assert!(coverage.has_state_check);
    assert!(!coverage.has_update_test);
}

#[test]
fn test_config_inference_when_names_say_nothing() {
    let test = test_file(
        r#"func TestAccProvisioningFlow_basic(t *testing.T) {
    resource.Test(t, resource.TestCase{
        Steps: []resource.TestStep{
            {
                Config: "resource \"example_widget\" \"test\" { name = \"x\" }",
            },
        },
    })
}
"#,
    );
    let registry = analyze_memory(&[
        ("widget_resource.go", WIDGET_RESOURCE),
        ("misc_test.go", &test),
    ]);

    let tests = registry.tests_for(&widget());
    assert_eq!(tests.len(), 1, "linked through the embedded config");
    assert_eq!(tests[0].match_type, MatchType::InferredFromConfig);
    assert_eq!(tests[0].match_confidence, 0.8);
}

#[test]
fn test_config_inference_through_helper_function() {
    let test = test_file(
        r#"func TestAccProvisioningFlow_basic(t *testing.T) {
    resource.Test(t, resource.TestCase{
        Steps: []resource.TestStep{
            {
                Config: testAccFlowConfig("x"),
                Check:  resource.TestCheckResourceAttrSet("example_widget.test", "id"),
            },
        },
    })
}

func testAccFlowConfig(name string) string {
    return fmt.Sprintf(`
resource "example_widget" "test" {
  name = %q
}
`, name)
}
"#,
    );
    let registry = analyze_memory(&[
        ("widget_resource.go", WIDGET_RESOURCE),
        ("misc_test.go", &test),
    ]);

    let tests = registry.tests_for(&widget());
    assert_eq!(tests.len(), 1, "linked through the helper's returned config");
    assert_eq!(tests[0].name, "TestAccProvisioningFlow_basic");
    assert_eq!(tests[0].match_type, MatchType::InferredFromConfig);
    assert_eq!(tests[0].match_confidence, 0.8);
    assert!(registry.unmatched_test_functions().is_empty());
}

#[test]
fn test_fuzzy_link_records_similarity() {
    let test = test_file(
        r#"func TestAccWidgt_basic(t *testing.T) {
    resource.Test(t, resource.TestCase{
        Steps: []resource.TestStep{
            {Config: testAccWidgtConfig()},
        },
    })
}
"#,
    );
    let files = [("widget_resource.go", WIDGET_RESOURCE), ("misc_test.go", test.as_str())];

    let registry = analyze_memory(&files);
    assert!(registry.tests_for(&widget()).is_empty(), "fuzzy matching is off by default");

    let settings = Settings {
        enable_fuzzy_matching: true,
        ..Settings::default()
    };
    let registry = analyze_memory_with(&files, &settings);
    let tests = registry.tests_for(&widget());
    assert_eq!(tests.len(), 1);
    assert_eq!(tests[0].match_type, MatchType::Fuzzy);
    assert_eq!(tests[0].match_confidence, similarity("widgt", "widget"));
}

#[test]
fn test_missing_state_checks() {
    let test = test_file(
        r#"func TestAccItem_basic(t *testing.T) {
    resource.Test(t, resource.TestCase{
        Steps: []resource.TestStep{
            {
                Config: `resource "example_item" "test" {}`,
            },
        },
    })
}
"#,
    );
    let item = sdk_resource("resourceItem");
    let registry = analyze_memory(&[("resource_item.go", &item), ("resource_item_test.go", &test)]);

    let report = CoverageReport::from_registry(&registry);
    let key = EntityKey::new(EntityKind::Resource, "item");
    let coverage = report.get(&key).expect("item discovered");
    assert!(coverage.has_basic_test);
    assert!(!coverage.has_state_check);
    assert!(!coverage.has_plan_check);
    let missing: Vec<_> = report
        .missing_state_checks()
        .map(|e| e.entity.key())
        .collect();
    assert_eq!(missing, vec![key]);
}

#[test]
fn test_update_detection_stays_within_one_function() {
    let test = test_file(
        r#"func TestAccServer_small(t *testing.T) {
    resource.Test(t, resource.TestCase{
        Steps: []resource.TestStep{
            {Config: `resource "example_server" "a" { size = 1 }`},
        },
    })
}

func TestAccServer_large(t *testing.T) {
    resource.Test(t, resource.TestCase{
        Steps: []resource.TestStep{
            {Config: `resource "example_server" "a" { size = 2 }`},
        },
    })
}
"#,
    );
    let server = sdk_resource("resourceServer");
    let registry = analyze_memory(&[("resource_server.go", &server), ("resource_server_test.go", &test)]);

    let key = EntityKey::new(EntityKind::Resource, "server");
    let tests = registry.tests_for(&key);
    assert_eq!(tests.len(), 2);
    assert!(tests.iter().all(|t| t.steps.len() == 1 && t.steps[0].index == 0));
    assert_ne!(
        tests[0].steps[0].config_fingerprint,
        tests[1].steps[0].config_fingerprint
    );

    let report = CoverageReport::from_registry(&registry);
    assert!(!report.get(&key).unwrap().has_update_test);
}

#[test]
fn test_same_name_across_kinds() {
    let action = r#"package provider

import "github.com/hashicorp/terraform-plugin-framework/action"

type JobAction struct{}

func NewJobAction() action.Action {
    return &JobAction{}
}

func (a *JobAction) Metadata(ctx context.Context, req action.MetadataRequest, resp *action.MetadataResponse) {
    resp.TypeName = req.ProviderTypeName + "_job"
}
"#;
    let job = sdk_resource("resourceJob");
    let registry = analyze_memory(&[("job_action.go", action), ("resource_job.go", &job)]);

    let keys: Vec<_> = registry.definitions().into_keys().collect();
    assert_eq!(
        keys,
        vec![
            EntityKey::new(EntityKind::Resource, "job"),
            EntityKey::new(EntityKind::Action, "job"),
        ]
    );
    assert_eq!(registry.entities_named("job").len(), 2);
}

#[test]
fn test_empty_input_is_an_empty_registry() {
    let registry = analyze(MemorySources::new(), &Settings::default()).unwrap();
    assert!(registry.is_empty());
    assert!(CoverageReport::from_registry(&registry).entries.is_empty());
}

#[test]
fn test_invalid_settings_fail_the_build() {
    let settings = Settings {
        enable_fuzzy_matching: true,
        fuzzy_match_threshold: 0.3,
        ..Settings::default()
    };
    let err = analyze(MemorySources::new(), &settings).unwrap_err();
    assert!(format!("{err}").contains("at least 0.5"), "got {err}");
}

#[test]
fn test_snapshots_are_not_affected_by_later_writes() {
    let registry = analyze_memory(&[("widget_resource.go", WIDGET_RESOURCE)]);
    let before = registry.definitions();
    registry.register_entity(Entity::new(
        EntityKind::DataSource,
        "late",
        SourceLocation::new("late.go", 1, 1),
    ));
    let after = registry.definitions();
    assert_eq!(before.len(), 1);
    assert_eq!(after.len(), 2);
    assert!(!registry.register_entity(Entity::new(
        EntityKind::DataSource,
        "late",
        SourceLocation::new("again.go", 1, 1),
    )));
    assert_eq!(registry.definitions().len(), 2, "keys stay unique");
}

#[test]
fn test_cached_build_runs_once_per_session() {
    let cache = Arc::new(RegistryCache::new(Some(Duration::from_secs(60))));
    let builds = Arc::new(AtomicUsize::new(0));
    let session = SessionId::new();
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let (cache, builds, barrier) = (cache.clone(), builds.clone(), barrier.clone());
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_build(session, || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        analyze(
                            MemorySources::new().add("widget_resource.go", WIDGET_RESOURCE),
                            &Settings::default(),
                        )
                    })
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        let registry = handle.join().unwrap();
        assert!(registry.contains(&widget()));
    }
    assert_eq!(builds.load(Ordering::SeqCst), 1);

    let other = SessionId::new();
    cache.get_or_build(other, || Ok(Registry::new())).unwrap();
    assert_eq!(cache.len(), 2);
    assert!(cache.release(session));
    assert_eq!(cache.stats().total_entries, 1);
}
