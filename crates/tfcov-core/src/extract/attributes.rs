//! Schema attribute extraction
//!
//! Two schema shapes are recognised:
//!
//! - plugin framework: `schema.Schema{Attributes: map[string]schema.Attribute{"name": schema.StringAttribute{...}}}`
//! - legacy SDK: `map[string]*schema.Schema{"name": {Type: schema.TypeString, ...}}`

use crate::go_ast::{
    self, base_type_name, field_value, is_true, keyed_elements, literal_body, named_children,
    text, unwrap_element, visit,
};
use crate::model::Attribute;
use arborium::tree_sitter::Node;

/// Top-level attributes of the first framework `Schema{...}` literal under `node`
pub fn framework_attributes(node: Node<'_>, source: &str) -> Vec<Attribute> {
    let mut attributes = None;
    visit(node, &mut |n| {
        if attributes.is_some() {
            return false;
        }
        if n.kind() != "composite_literal" {
            return true;
        }
        let is_schema = n
            .child_by_field_name("type")
            .and_then(|t| base_type_name(t, source))
            == Some("Schema");
        if !is_schema {
            return true;
        }
        if let Some(map) = n
            .child_by_field_name("body")
            .and_then(|body| field_value(body, "Attributes", source))
            .and_then(literal_body)
        {
            attributes = Some(attribute_map(map, source, framework_attribute));
            return false;
        }
        true
    });
    attributes.unwrap_or_default()
}

/// Attributes of a legacy `schema.Resource{Schema: map[string]*schema.Schema{...}}` body
pub fn sdk_attributes(resource_body: Node<'_>, source: &str) -> Vec<Attribute> {
    field_value(resource_body, "Schema", source)
        .and_then(literal_body)
        .map(|map| attribute_map(map, source, sdk_attribute))
        .unwrap_or_default()
}

fn attribute_map(
    map: Node<'_>,
    source: &str,
    parse: fn(&mut Attribute, Node<'_>, &str),
) -> Vec<Attribute> {
    keyed_elements(map)
        .into_iter()
        .filter_map(|element| {
            let name = go_ast::string_value(element.key, source)?;
            let mut attribute = Attribute::new(name);
            parse(&mut attribute, element.value, source);
            Some(attribute)
        })
        .collect()
}

fn framework_attribute(attribute: &mut Attribute, value: Node<'_>, source: &str) {
    let value = unwrap_element(value);
    if value.kind() == "composite_literal" {
        attribute.type_name = value
            .child_by_field_name("type")
            .and_then(|t| base_type_name(t, source))
            .map(str::to_string);
    }
    let Some(body) = literal_body(value) else {
        return;
    };
    for field in keyed_elements(body) {
        match text(field.key, source) {
            "Required" => attribute.required = is_true(field.value),
            "Optional" => attribute.optional = is_true(field.value),
            "Computed" => attribute.computed = is_true(field.value),
            "Validators" => {
                let kinds = validator_kinds(field.value, source);
                attribute.has_validators |= !kinds.is_empty();
                attribute.validator_kinds.extend(kinds);
            }
            "PlanModifiers" if text(field.value, source).contains("RequiresReplace") => {
                attribute.updatable = false;
            }
            _ => {}
        }
    }
}

fn sdk_attribute(attribute: &mut Attribute, value: Node<'_>, source: &str) {
    let Some(body) = literal_body(value) else {
        return;
    };
    for field in keyed_elements(body) {
        match text(field.key, source) {
            "Type" => {
                attribute.type_name = go_ast::selector_field(field.value, source)
                    .map(|(_, name)| name.to_string())
                    .or_else(|| Some(text(field.value, source).to_string()));
            }
            "Required" => attribute.required = is_true(field.value),
            "Optional" => attribute.optional = is_true(field.value),
            "Computed" => attribute.computed = is_true(field.value),
            "ForceNew" if is_true(field.value) => attribute.updatable = false,
            "ValidateFunc" | "ValidateDiagFunc" => {
                attribute.has_validators = true;
                attribute
                    .validator_kinds
                    .push(validator_name(field.value, source));
            }
            _ => {}
        }
    }
}

/// Names of the validator constructors in a `Validators: []validator.String{...}` list
fn validator_kinds(list: Node<'_>, source: &str) -> Vec<String> {
    let Some(body) = literal_body(list) else {
        return Vec::new();
    };
    named_children(body)
        .into_iter()
        .map(|element| validator_name(unwrap_element(element), source))
        .collect()
}

fn validator_name(node: Node<'_>, source: &str) -> String {
    let node = go_ast::unparen(node);
    if let Some((_, name)) = go_ast::call_target(node, source) {
        return name.to_string();
    }
    if let Some((_, field)) = go_ast::selector_field(node, source) {
        return field.to_string();
    }
    text(node, source).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::go_ast::GoFile;

    #[test]
    fn test_framework_attributes() {
        let file = GoFile::parse(
            "resource_widget.go",
            r#"package provider

func (r *WidgetResource) Schema(ctx context.Context, req resource.SchemaRequest, resp *resource.SchemaResponse) {
    resp.Schema = schema.Schema{
        Attributes: map[string]schema.Attribute{
            "id": schema.StringAttribute{
                Computed: true,
            },
            "name": schema.StringAttribute{
                Required: true,
                PlanModifiers: []planmodifier.String{
                    stringplanmodifier.RequiresReplace(),
                },
            },
            "size": schema.Int64Attribute{
                Optional: true,
                Validators: []validator.Int64{
                    int64validator.AtLeast(1),
                    int64validator.AtMost(10),
                },
            },
        },
    }
}
"#,
            false,
        )
        .unwrap();
        let attrs = framework_attributes(file.root(), &file.source);
        assert_eq!(attrs.len(), 3, "got {:?}", attrs);

        assert_eq!(attrs[0].name, "id");
        assert!(attrs[0].computed);

        assert_eq!(attrs[1].name, "name");
        assert!(attrs[1].required);
        assert!(!attrs[1].updatable, "RequiresReplace makes it immutable");
        assert_eq!(attrs[1].type_name.as_deref(), Some("StringAttribute"));

        assert_eq!(attrs[2].name, "size");
        assert!(attrs[2].optional);
        assert!(attrs[2].has_validators);
        assert_eq!(attrs[2].validator_kinds, vec!["AtLeast", "AtMost"]);
        assert!(attrs[2].needs_update_test());
    }

    #[test]
    fn test_sdk_attributes() {
        let file = GoFile::parse(
            "resource_widget.go",
            r#"package provider

func resourceWidget() *schema.Resource {
    return &schema.Resource{
        Schema: map[string]*schema.Schema{
            "name": {
                Type:     schema.TypeString,
                Required: true,
                ForceNew: true,
            },
            "size": {
                Type:         schema.TypeInt,
                Optional:     true,
                ValidateFunc: validation.IntBetween(1, 10),
            },
        },
    }
}
"#,
            false,
        )
        .unwrap();
        let literal = go_ast::composite_literals(file.root())[0];
        let body = literal_body(literal).unwrap();
        let attrs = sdk_attributes(body, &file.source);
        assert_eq!(attrs.len(), 2, "got {:?}", attrs);
        assert_eq!(attrs[0].type_name.as_deref(), Some("TypeString"));
        assert!(!attrs[0].updatable);
        assert!(attrs[1].has_validators);
        assert_eq!(attrs[1].validator_kinds, vec!["IntBetween"]);
    }

    #[test]
    fn test_no_schema_literal() {
        let file = GoFile::parse("x.go", "package p\n\nfunc f() {}\n", false).unwrap();
        assert!(framework_attributes(file.root(), &file.source).is_empty());
    }
}
