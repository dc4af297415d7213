//! The discovery strategies, in pipeline order

use super::{Discovery, DiscoveryState, DiscoveryStrategy, FileContext, attributes};
use crate::go_ast::{
    FuncDecl, assignments, call_arguments, call_target, calls, composite_literals, field_value,
    literal_body, named_children, qualified_type_parts, returned_expressions, selector_field,
    string_value, text, unparen,
};
use crate::model::{Entity, EntityKind};
use crate::naming::{strip_provider_prefix, to_snake_case};
use arborium::tree_sitter::Node;

/// The six strategies in the order they must run
pub fn default_strategies() -> Vec<Box<dyn DiscoveryStrategy>> {
    vec![
        Box::new(SchemaMethodStrategy),
        Box::new(FactoryFunctionStrategy),
        Box::new(MetadataMethodStrategy),
        Box::new(ActionFactoryStrategy),
        Box::new(ReturnTypeStrategy),
        Box::new(RegistryCallStrategy),
    ]
}

/// `Schema` methods on `*Resource` / `*DataSource` receivers.
///
/// Names derived here are provisional: `Metadata` overrides them.
pub struct SchemaMethodStrategy;

impl DiscoveryStrategy for SchemaMethodStrategy {
    fn name(&self) -> &'static str {
        "schema-method"
    }

    fn discover(&self, ctx: &FileContext<'_>, _state: &DiscoveryState) -> Vec<Discovery> {
        let mut out = Vec::new();
        for func in methods_named(ctx, "Schema") {
            let Some(receiver) = func.receiver else {
                continue;
            };
            // composition bases such as BaseResource carry a shared schema only
            if receiver.starts_with("Base") {
                continue;
            }
            let Some(kind) = receiver_kind(receiver) else {
                continue;
            };
            // actions are named by their factory
            if kind == EntityKind::Action {
                continue;
            }
            let name = name_from_type(receiver);
            if name.is_empty() {
                continue;
            }
            let mut entity = Entity::new(kind, name, ctx.file.location(func.node));
            if let Some(body) = func.body {
                entity.attributes = attributes::framework_attributes(body, ctx.source());
            }
            out.push(Discovery::Insert {
                entity,
                receiver: Some(receiver.to_string()),
            });
        }
        out
    }
}

/// `New*Resource` / `New*DataSource` functions carrying a `MetadataEntitySlug: "name"` field
pub struct FactoryFunctionStrategy;

impl DiscoveryStrategy for FactoryFunctionStrategy {
    fn name(&self) -> &'static str {
        "factory-function"
    }

    fn discover(&self, ctx: &FileContext<'_>, _state: &DiscoveryState) -> Vec<Discovery> {
        let mut out = Vec::new();
        for func in plain_functions(ctx) {
            let Some(rest) = func.name.strip_prefix("New") else {
                continue;
            };
            let kind = if rest.len() > "DataSource".len() && rest.ends_with("DataSource") {
                EntityKind::DataSource
            } else if rest.len() > "Resource".len() && rest.ends_with("Resource") {
                EntityKind::Resource
            } else {
                continue;
            };
            let Some(slug) = func.body.and_then(|body| entity_slug(body, ctx.source())) else {
                continue;
            };
            out.push(Discovery::Insert {
                entity: Entity::new(kind, slug, ctx.file.location(func.node)),
                receiver: None,
            });
        }
        out
    }
}

fn entity_slug(body: Node<'_>, source: &str) -> Option<String> {
    composite_literals(body).into_iter().find_map(|literal| {
        let fields = literal_body(literal)?;
        let value = field_value(fields, "MetadataEntitySlug", source)?;
        string_value(value, source).filter(|s| !s.is_empty())
    })
}

/// `Metadata` methods assigning `resp.TypeName`: the authoritative name
pub struct MetadataMethodStrategy;

impl DiscoveryStrategy for MetadataMethodStrategy {
    fn name(&self) -> &'static str {
        "metadata-method"
    }

    fn discover(&self, ctx: &FileContext<'_>, _state: &DiscoveryState) -> Vec<Discovery> {
        let mut out = Vec::new();
        for func in methods_named(ctx, "Metadata") {
            let Some(receiver) = func.receiver else {
                continue;
            };
            let kind = match receiver_kind(receiver) {
                Some(kind @ (EntityKind::Resource | EntityKind::DataSource)) => kind,
                _ => continue,
            };
            let Some(name) = func.body.and_then(|body| metadata_type_name(body, ctx)) else {
                continue;
            };
            out.push(Discovery::ReplaceIfPresent {
                receiver: receiver.to_string(),
                entity: Entity::new(kind, name, ctx.file.location(func.node)),
            });
        }
        out
    }
}

/// `New*Action` functions returning an action capability.
///
/// The `Metadata` method of the returned type names the action; without one
/// the name comes from the factory function.
pub struct ActionFactoryStrategy;

impl DiscoveryStrategy for ActionFactoryStrategy {
    fn name(&self) -> &'static str {
        "action-factory"
    }

    fn discover(&self, ctx: &FileContext<'_>, _state: &DiscoveryState) -> Vec<Discovery> {
        let mut out = Vec::new();
        for func in plain_functions(ctx) {
            let Some(stem) = func
                .name
                .strip_prefix("New")
                .filter(|s| s.ends_with("Action"))
            else {
                continue;
            };
            let returns_action = first_result_type(func)
                .and_then(|t| qualified_type_parts(t, ctx.source()))
                .is_some_and(|(pkg, name)| {
                    name == "Action"
                        && ctx
                            .import_path(pkg)
                            .map_or(pkg == "action", |path| path.ends_with("/action"))
                });
            if !returns_action {
                continue;
            }

            let type_name = func
                .body
                .and_then(|body| returned_type_name(body, ctx.source()))
                .unwrap_or(stem);
            let name = ctx
                .method(type_name, "Metadata")
                .and_then(|m| m.body)
                .and_then(|body| metadata_type_name(body, ctx))
                .unwrap_or_else(|| to_snake_case(stem.trim_end_matches("Action")));
            if name.is_empty() {
                continue;
            }
            out.push(Discovery::Insert {
                entity: Entity::new(EntityKind::Action, name, ctx.file.location(func.node)),
                receiver: Some(type_name.to_string()),
            });
        }
        out
    }
}

/// Plain functions whose return type resolves, through the file's imports, to a
/// framework `resource.Resource` / `datasource.DataSource` or a legacy SDK
/// `*schema.Resource`
pub struct ReturnTypeStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Capability {
    Framework(EntityKind),
    /// Legacy SDK: one type for resources and data sources alike
    Sdk,
}

impl ReturnTypeStrategy {
    fn classify(ctx: &FileContext<'_>, result: Node<'_>) -> Option<Capability> {
        let (pkg, name) = qualified_type_parts(result, ctx.source())?;
        let path = ctx.import_path(pkg)?;
        match name {
            "Resource" if path.ends_with("helper/schema") => Some(Capability::Sdk),
            "Resource" if path.ends_with("/resource") => {
                Some(Capability::Framework(EntityKind::Resource))
            }
            "DataSource" if path.ends_with("/datasource") => {
                Some(Capability::Framework(EntityKind::DataSource))
            }
            _ => None,
        }
    }
}

impl DiscoveryStrategy for ReturnTypeStrategy {
    fn name(&self) -> &'static str {
        "return-type"
    }

    fn discover(&self, ctx: &FileContext<'_>, _state: &DiscoveryState) -> Vec<Discovery> {
        let mut out = Vec::new();
        for func in plain_functions(ctx) {
            let Some(capability) = first_result_type(func).and_then(|t| Self::classify(ctx, t))
            else {
                continue;
            };
            let kind = match capability {
                Capability::Framework(kind) => kind,
                Capability::Sdk if ctx.file.file_name().starts_with("data_source_") => {
                    EntityKind::DataSource
                }
                Capability::Sdk => EntityKind::Resource,
            };

            let returned = func
                .body
                .and_then(|body| returned_type_name(body, ctx.source()));
            let from_metadata = returned
                .and_then(|t| ctx.method(t, "Metadata"))
                .and_then(|m| m.body)
                .and_then(|body| metadata_type_name(body, ctx));
            let (kind, name) = match from_metadata {
                Some(name) => (kind, name),
                None => match name_from_factory(func.name, kind) {
                    Some(named) => named,
                    None => continue,
                },
            };

            let mut entity = Entity::new(kind, name, ctx.file.location(func.node));
            if capability == Capability::Sdk
                && let Some(body) = func.body.and_then(sdk_resource_body)
            {
                entity.attributes = attributes::sdk_attributes(body, ctx.source());
                entity.import_capable = field_value(body, "Importer", ctx.source()).is_some();
            }
            out.push(Discovery::Insert {
                entity,
                receiver: returned.map(str::to_string),
            });
        }
        out
    }
}

/// Body of the first `&schema.Resource{...}` returned by a function
fn sdk_resource_body(body: Node<'_>) -> Option<Node<'_>> {
    returned_expressions(body).into_iter().find_map(literal_body)
}

/// `registry.AddResourceFactory("name", ...)` style registrations
pub struct RegistryCallStrategy;

impl DiscoveryStrategy for RegistryCallStrategy {
    fn name(&self) -> &'static str {
        "registry-call"
    }

    fn discover(&self, ctx: &FileContext<'_>, _state: &DiscoveryState) -> Vec<Discovery> {
        let source = ctx.source();
        calls(ctx.file.root())
            .into_iter()
            .filter_map(|call| {
                let kind = match call_target(call, source)? {
                    (Some(_), "AddResourceFactory") => EntityKind::Resource,
                    // list resources are plural data sources
                    (Some(_), "AddDataSourceFactory" | "AddListResourceFactory") => {
                        EntityKind::DataSource
                    }
                    _ => return None,
                };
                let first = call_arguments(call).into_iter().next()?;
                let name = string_value(first, source).filter(|s| !s.is_empty())?;
                Some(Discovery::Insert {
                    entity: Entity::new(kind, name, ctx.file.location(call)),
                    receiver: None,
                })
            })
            .collect()
    }
}

fn methods_named<'c, 'a>(
    ctx: &'c FileContext<'a>,
    name: &'c str,
) -> impl Iterator<Item = &'c FuncDecl<'a>> {
    ctx.functions
        .iter()
        .filter(move |f| f.receiver.is_some() && f.name == name)
}

fn plain_functions<'c, 'a>(ctx: &'c FileContext<'a>) -> impl Iterator<Item = &'c FuncDecl<'a>> {
    ctx.functions.iter().filter(|f| f.receiver.is_none())
}

fn receiver_kind(receiver: &str) -> Option<EntityKind> {
    if receiver.ends_with("DataSource") {
        Some(EntityKind::DataSource)
    } else if receiver.ends_with("Action") {
        Some(EntityKind::Action)
    } else if receiver.ends_with("Resource") {
        Some(EntityKind::Resource)
    } else {
        None
    }
}

/// `WidgetThingResource` -> `widget_thing`
fn name_from_type(type_name: &str) -> String {
    let stem = ["DataSource", "Resource", "Action"]
        .iter()
        .find_map(|suffix| type_name.strip_suffix(suffix))
        .unwrap_or(type_name);
    to_snake_case(stem)
}

/// Entity name from a factory function name, e.g. `NewWidgetResource`,
/// `ResourceWidget`, `dataSourceWidget`. A data source prefix overrides `kind`.
fn name_from_factory(func_name: &str, kind: EntityKind) -> Option<(EntityKind, String)> {
    let (kind, rest) = if let Some(rest) = func_name.strip_prefix("New") {
        (kind, rest)
    } else if let Some(rest) = func_name.strip_prefix("Resource") {
        (kind, rest)
    } else if let Some(rest) = func_name
        .strip_prefix("DataSource")
        .or_else(|| func_name.strip_prefix("dataSource"))
    {
        (EntityKind::DataSource, rest)
    } else if let Some(rest) = func_name.strip_prefix("resource") {
        (kind, rest)
    } else {
        (kind, func_name)
    };
    let rest = rest.strip_suffix("Resource").unwrap_or(rest);
    let rest = rest.strip_suffix("DataSource").unwrap_or(rest);
    if rest.is_empty() {
        return None;
    }
    Some((kind, to_snake_case(rest)))
}

/// The type of a single (or the first) declared result
fn first_result_type<'t>(func: &FuncDecl<'t>) -> Option<Node<'t>> {
    let result = func.result?;
    if result.kind() != "parameter_list" {
        return Some(result);
    }
    named_children(result)
        .into_iter()
        .find(|c| c.kind() == "parameter_declaration")
        .and_then(|decl| decl.child_by_field_name("type"))
}

/// `T` from the first `return &T{...}` or `return T{...}`
fn returned_type_name<'s>(body: Node<'_>, source: &'s str) -> Option<&'s str> {
    returned_expressions(body).into_iter().find_map(|expr| {
        let mut expr = unparen(expr);
        if expr.kind() == "unary_expression" {
            expr = expr.child_by_field_name("operand")?;
        }
        if expr.kind() != "composite_literal" {
            return None;
        }
        let ty = expr.child_by_field_name("type")?;
        (ty.kind() == "type_identifier").then(|| text(ty, source))
    })
}

/// Entity name from a `X.TypeName = ...` assignment inside a `Metadata` body
fn metadata_type_name(body: Node<'_>, ctx: &FileContext<'_>) -> Option<String> {
    let source = ctx.source();
    assignments(body).into_iter().find_map(|(left, right)| {
        let (_, field) = selector_field(left, source)?;
        if field != "TypeName" {
            return None;
        }
        let right = unparen(right);
        let name = if let Some(literal) = string_value(right, source) {
            name_from_literal(&literal, &ctx.settings.provider_prefix)
        } else if right.kind() == "binary_expression" {
            let operator = right.child_by_field_name("operator")?;
            if text(operator, source) != "+" {
                return None;
            }
            let suffix = string_value(right.child_by_field_name("right")?, source)?;
            suffix.trim_start_matches('_').to_string()
        } else if call_target(right, source) == Some((Some("fmt"), "Sprintf")) {
            let format = call_arguments(right)
                .into_iter()
                .next()
                .and_then(|f| string_value(f, source))?;
            format.strip_prefix("%s")?.trim_start_matches('_').to_string()
        } else {
            return None;
        };
        (!name.is_empty()).then_some(name)
    })
}

/// `"_widget"` and `"example_widget"` both name `widget`
fn name_from_literal(literal: &str, provider_prefix: &str) -> String {
    if let Some(rest) = literal.strip_prefix('_') {
        return rest.to_string();
    }
    if !provider_prefix.is_empty() {
        let prefixed = format!("{}_", provider_prefix.trim_end_matches('_'));
        if let Some(rest) = literal.strip_prefix(&prefixed) {
            return rest.to_string();
        }
    }
    strip_provider_prefix(literal).unwrap_or(literal).to_string()
}
