//! Parsed Go source files and tree-sitter node helpers
//!
//! Everything downstream works on [`GoFile`]s: the source text, its
//! tree-sitter tree, and whether the file holds tests. The helpers here paper
//! over differences between grammar versions (for example whether keyed
//! composite-literal elements wrap their key and value in `literal_element`
//! nodes) so extraction code can stay declarative.

use crate::model::SourceLocation;
use arborium::tree_sitter::{Node, Parser, Tree};
use eyre::{Result, WrapErr};

/// One parsed Go source file
pub struct GoFile {
    pub path: String,
    pub source: String,
    pub tree: Tree,
    pub is_test: bool,
}

impl std::fmt::Debug for GoFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoFile")
            .field("path", &self.path)
            .field("is_test", &self.is_test)
            .field("len", &self.source.len())
            .finish()
    }
}

/// An import: `alias` is the explicit name, or the last path segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Import {
    pub alias: String,
    pub path: String,
}

/// A top-level function or method declaration
#[derive(Debug, Clone, Copy)]
pub struct FuncDecl<'t> {
    pub node: Node<'t>,
    pub name: &'t str,
    /// Receiver type with pointer and type arguments stripped; `None` for plain functions
    pub receiver: Option<&'t str>,
    pub parameters: Option<Node<'t>>,
    pub result: Option<Node<'t>>,
    pub body: Option<Node<'t>>,
}

impl GoFile {
    /// Parse Go source. Syntax errors do not fail the parse; the affected
    /// regions simply show up as error nodes.
    pub fn parse(path: impl Into<String>, source: impl Into<String>, is_test: bool) -> Result<Self> {
        let path = path.into();
        let source = source.into();
        let mut parser = Parser::new();
        parser
            .set_language(&arborium_go::language().into())
            .wrap_err("Failed to load Go grammar")?;
        let tree = parser
            .parse(&source, None)
            .ok_or_else(|| eyre::eyre!("Go parser produced no tree for {}", path))?;
        Ok(Self {
            path,
            source,
            tree,
            is_test,
        })
    }

    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text(&self, node: Node<'_>) -> &str {
        &self.source[node.byte_range()]
    }

    pub fn file_name(&self) -> &str {
        crate::config::file_name(&self.path)
    }

    pub fn location(&self, node: Node<'_>) -> SourceLocation {
        let pos = node.start_position();
        SourceLocation::new(self.path.clone(), pos.row + 1, pos.column + 1)
    }

    pub fn imports(&self) -> Vec<Import> {
        let mut imports = Vec::new();
        visit(self.root(), &mut |node| {
            if node.kind() != "import_spec" {
                return true;
            }
            let Some(path) = node
                .child_by_field_name("path")
                .and_then(|p| string_value(p, &self.source))
            else {
                return false;
            };
            let alias = match node.child_by_field_name("name") {
                Some(name) => self.text(name).to_string(),
                None => path.rsplit('/').next().unwrap_or(&path).to_string(),
            };
            imports.push(Import { alias, path });
            false
        });
        imports
    }

    /// Aliases under which `path` is imported (usually zero or one)
    pub fn aliases_for(&self, path: &str) -> Vec<String> {
        self.imports()
            .into_iter()
            .filter(|i| i.path == path)
            .map(|i| i.alias)
            .collect()
    }

    /// Top-level function and method declarations, in source order
    pub fn functions(&self) -> Vec<FuncDecl<'_>> {
        let root = self.root();
        let mut cursor = root.walk();
        root.named_children(&mut cursor)
            .filter_map(|node| self.func_decl(node))
            .collect()
    }

    fn func_decl<'t>(&'t self, node: Node<'t>) -> Option<FuncDecl<'t>> {
        let receiver = match node.kind() {
            "function_declaration" => None,
            "method_declaration" => node
                .child_by_field_name("receiver")
                .and_then(|r| receiver_type(r, &self.source)),
            _ => return None,
        };
        let name = &self.source[node.child_by_field_name("name")?.byte_range()];
        Some(FuncDecl {
            node,
            name,
            receiver,
            parameters: node.child_by_field_name("parameters"),
            result: node.child_by_field_name("result"),
            body: node.child_by_field_name("body"),
        })
    }
}

/// Pre-order walk; `f` returns whether to descend into the node's children
pub fn visit<'t>(node: Node<'t>, f: &mut impl FnMut(Node<'t>) -> bool) {
    if !f(node) {
        return;
    }
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        visit(child, f);
    }
}

/// Named children, comments excluded
pub fn named_children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|c| c.kind() != "comment")
        .collect()
}

pub fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    &source[node.byte_range()]
}

fn receiver_type<'s>(params: Node<'_>, source: &'s str) -> Option<&'s str> {
    let decl = named_children(params)
        .into_iter()
        .find(|c| c.kind() == "parameter_declaration")?;
    base_type_name(decl.child_by_field_name("type")?, source)
}

/// `*pkg.Widget[T]` -> `Widget`
pub fn base_type_name<'s>(node: Node<'_>, source: &'s str) -> Option<&'s str> {
    match node.kind() {
        "type_identifier" | "identifier" => Some(text(node, source)),
        "pointer_type" | "parenthesized_type" => named_children(node)
            .into_iter()
            .next()
            .and_then(|inner| base_type_name(inner, source)),
        "generic_type" => base_type_name(node.child_by_field_name("type")?, source),
        "qualified_type" => Some(text(node.child_by_field_name("name")?, source)),
        _ => None,
    }
}

/// `*schema.Resource` -> `Some(("schema", "Resource"))`
pub fn qualified_type_parts<'s>(node: Node<'_>, source: &'s str) -> Option<(&'s str, &'s str)> {
    match node.kind() {
        "pointer_type" | "parenthesized_type" => named_children(node)
            .into_iter()
            .next()
            .and_then(|inner| qualified_type_parts(inner, source)),
        "qualified_type" => Some((
            text(node.child_by_field_name("package")?, source),
            text(node.child_by_field_name("name")?, source),
        )),
        _ => None,
    }
}

/// Strip `literal_element` wrappers introduced by newer grammar versions
pub fn unwrap_element(node: Node<'_>) -> Node<'_> {
    if node.kind() != "literal_element" {
        return node;
    }
    named_children(node).into_iter().next().unwrap_or(node)
}

/// Strip parentheses around an expression
pub fn unparen(mut node: Node<'_>) -> Node<'_> {
    while node.kind() == "parenthesized_expression" {
        match named_children(node).into_iter().next() {
            Some(inner) => node = inner,
            None => break,
        }
    }
    node
}

/// The `literal_value` body of a composite literal, of `&T{...}`, or of an elided `{...}`
pub fn literal_body(node: Node<'_>) -> Option<Node<'_>> {
    let node = unparen(unwrap_element(node));
    match node.kind() {
        "literal_value" => Some(node),
        "composite_literal" => node.child_by_field_name("body"),
        "unary_expression" => literal_body(node.child_by_field_name("operand")?),
        _ => None,
    }
}

/// A keyed element of a composite literal body
#[derive(Debug, Clone, Copy)]
pub struct KeyedElement<'t> {
    pub key: Node<'t>,
    pub value: Node<'t>,
}

impl<'t> KeyedElement<'t> {
    /// Field name, or the unquoted map key when the key is a string literal
    pub fn key_name(&self, source: &str) -> String {
        string_value(self.key, source).unwrap_or_else(|| text(self.key, source).to_string())
    }
}

pub fn keyed_elements(body: Node<'_>) -> Vec<KeyedElement<'_>> {
    named_children(body)
        .into_iter()
        .filter(|c| c.kind() == "keyed_element")
        .filter_map(|element| {
            let mut parts = named_children(element).into_iter();
            let key = unwrap_element(parts.next()?);
            let value = unwrap_element(parts.next()?);
            Some(KeyedElement { key, value })
        })
        .collect()
}

/// Unkeyed elements of a composite literal body (e.g. the items of a slice literal)
pub fn positional_elements(body: Node<'_>) -> Vec<Node<'_>> {
    named_children(body)
        .into_iter()
        .filter(|c| c.kind() != "keyed_element")
        .map(unwrap_element)
        .collect()
}

/// Value of the element keyed `field`, if present
pub fn field_value<'t>(body: Node<'t>, field: &str, source: &str) -> Option<Node<'t>> {
    keyed_elements(body)
        .into_iter()
        .find(|e| text(e.key, source) == field)
        .map(|e| e.value)
}

pub fn is_true(node: Node<'_>) -> bool {
    unparen(node).kind() == "true"
}

/// Decoded value of a string literal node
pub fn string_value(node: Node<'_>, source: &str) -> Option<String> {
    let node = unparen(node);
    let raw = text(node, source);
    match node.kind() {
        "raw_string_literal" => Some(raw.trim_matches('`').to_string()),
        "interpreted_string_literal" => {
            let inner = raw
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(raw);
            Some(unescape(inner))
        }
        _ => None,
    }
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// The callee of a call expression: `(Some("resource"), "Test")` for `resource.Test(...)`
pub fn call_target<'s>(call: Node<'_>, source: &'s str) -> Option<(Option<&'s str>, &'s str)> {
    let function = unparen(call.child_by_field_name("function")?);
    match function.kind() {
        "identifier" => Some((None, text(function, source))),
        "selector_expression" => {
            let operand = function.child_by_field_name("operand")?;
            let field = function.child_by_field_name("field")?;
            Some((Some(text(operand, source)), text(field, source)))
        }
        _ => None,
    }
}

pub fn call_arguments(call: Node<'_>) -> Vec<Node<'_>> {
    call.child_by_field_name("arguments")
        .map(named_children)
        .unwrap_or_default()
}

/// Whether an expression is a selector `operand.field` with the given field
pub fn selector_field<'s>(node: Node<'_>, source: &'s str) -> Option<(&'s str, &'s str)> {
    let node = unparen(node);
    if node.kind() != "selector_expression" {
        return None;
    }
    Some((
        text(node.child_by_field_name("operand")?, source),
        text(node.child_by_field_name("field")?, source),
    ))
}

/// Expressions of every `return` statement inside `body`, excluding nested function literals
pub fn returned_expressions(body: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    visit(body, &mut |node| match node.kind() {
        "func_literal" => false,
        "return_statement" => {
            for child in named_children(node) {
                if child.kind() == "expression_list" {
                    out.extend(named_children(child));
                } else {
                    out.push(child);
                }
            }
            false
        }
        _ => true,
    });
    out
}

/// `(left, right)` pairs of every `=` / `:=` statement inside `body`, positionally zipped
pub fn assignments(body: Node<'_>) -> Vec<(Node<'_>, Node<'_>)> {
    let mut out = Vec::new();
    visit(body, &mut |node| {
        if matches!(node.kind(), "assignment_statement" | "short_var_declaration") {
            let side = |field: &str| {
                node.child_by_field_name(field)
                    .map(|list| {
                        if list.kind() == "expression_list" {
                            named_children(list)
                        } else {
                            vec![list]
                        }
                    })
                    .unwrap_or_default()
            };
            out.extend(side("left").into_iter().zip(side("right")));
        }
        true
    });
    out
}

/// Every composite literal under `node` (including `node` itself)
pub fn composite_literals(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    visit(node, &mut |n| {
        if n.kind() == "composite_literal" {
            out.push(n);
        }
        true
    });
    out
}

/// Every call expression under `node` (including `node` itself)
pub fn calls(node: Node<'_>) -> Vec<Node<'_>> {
    let mut out = Vec::new();
    visit(node, &mut |n| {
        if n.kind() == "call_expression" {
            out.push(n);
        }
        true
    });
    out
}

/// Whitespace-collapsed text, the normal form used for fingerprints
pub fn normalized_text(node: Node<'_>, source: &str) -> String {
    text(node, source)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
