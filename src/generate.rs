//! Configuration text generator.
//!
//! Renders a [`RepresentationMap`] into a configuration block for a named
//! resource or data source. Rendering is pure and total: every well-formed
//! map produces a fragment that can be concatenated with other fragments.
//!
//! ```text
//! resource "oci_core_cpe" "test_cpe" {
//!   compartment_id = var.compartment_id
//!   display_name = "MyCpe"
//!   ip_address = "203.0.113.6"
//! }
//! ```

use crate::directive::Directive;
use crate::representation::{ConfigValue, Phase, Representation, RepresentationMap, Selector};
use std::fmt::Write as _;

const INDENT: &str = "  ";

/// Render `resource "<block_type>" "<name>" { ... }`.
#[must_use]
pub fn generate_resource_from_representation_map(
    block_type: &str,
    name: &str,
    selector: Selector,
    phase: Phase,
    map: &RepresentationMap,
) -> String {
    let header = format!("resource {} {}", quote(block_type), quote(name));
    render_top_level(&header, selector, phase, map)
}

/// Render `data "<block_type>" "<name>" { ... }`.
#[must_use]
pub fn generate_data_source_from_representation_map(
    block_type: &str,
    name: &str,
    selector: Selector,
    phase: Phase,
    map: &RepresentationMap,
) -> String {
    let header = format!("data {} {}", quote(block_type), quote(name));
    render_top_level(&header, selector, phase, map)
}

/// Render `variable "<name>" { default = <value> }`.
#[must_use]
pub fn generate_variable(name: &str, default: impl Into<ConfigValue>) -> String {
    format!(
        "variable {} {{ default = {} }}\n",
        quote(name),
        render_value(&default.into())
    )
}

/// Render a single value as a configuration expression.
#[must_use]
pub fn render_value(value: &ConfigValue) -> String {
    match value {
        ConfigValue::String(s) => quote(s),
        ConfigValue::Reference(expr) => expr.clone(),
        ConfigValue::Number(n) => n.to_string(),
        ConfigValue::Bool(b) => b.to_string(),
        ConfigValue::List(items) => {
            let items: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", items.join(", "))
        }
        ConfigValue::Map(entries) => {
            if entries.is_empty() {
                return "{}".to_string();
            }
            let entries: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{} = {}", quote(k), render_value(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

/// Quote and escape a string literal.
///
/// `${...}` is left alone for the engine to interpolate. `%{` would open a
/// template directive, so it is written as the literal escape `%%{`.
#[must_use]
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '%' if chars.peek() == Some(&'{') => out.push_str("%%"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

fn render_top_level(
    header: &str,
    selector: Selector,
    phase: Phase,
    map: &RepresentationMap,
) -> String {
    let mut out = String::new();
    render_block(&mut out, header, 0, selector, phase, map);
    out.push('\n');
    out
}

fn render_block(
    out: &mut String,
    header: &str,
    depth: usize,
    selector: Selector,
    phase: Phase,
    map: &RepresentationMap,
) {
    let mut body = String::new();
    render_body(&mut body, depth + 1, selector, phase, map);

    let pad = INDENT.repeat(depth);
    if body.is_empty() {
        let _ = write!(out, "{pad}{header} {{}}");
    } else {
        let _ = write!(out, "{pad}{header} {{\n{body}{pad}}}");
    }
}

fn render_body(
    out: &mut String,
    depth: usize,
    selector: Selector,
    phase: Phase,
    map: &RepresentationMap,
) {
    let pad = INDENT.repeat(depth);
    for (key, representation) in map.iter() {
        if !representation.is_emitted(selector) {
            continue;
        }
        match representation {
            Representation::Leaf { .. } => {
                if let Some(value) = representation.value_for(phase) {
                    let _ = writeln!(out, "{pad}{key} = {}", render_value(value));
                }
            }
            Representation::Group { children, .. } => {
                render_block(out, key, depth, selector, phase, children);
                out.push('\n');
            }
            Representation::Repeated { blocks, .. } => {
                for block in blocks {
                    render_block(out, key, depth, selector, phase, block);
                    out.push('\n');
                }
            }
        }
    }
    render_directives(out, depth, map.directives());
}

fn render_directives(out: &mut String, depth: usize, directives: &[Directive]) {
    let pad = INDENT.repeat(depth);
    for directive in directives {
        if let Directive::DependsOn(addresses) = directive {
            let _ = writeln!(out, "{pad}depends_on = [{}]", addresses.as_slice().join(", "));
        }
    }

    let lifecycle: Vec<&Directive> = directives.iter().filter(|d| d.is_lifecycle()).collect();
    if lifecycle.is_empty() {
        return;
    }
    let inner = INDENT.repeat(depth + 1);
    let _ = writeln!(out, "{pad}lifecycle {{");
    for directive in lifecycle {
        match directive {
            Directive::IgnoreChanges(paths) => {
                let _ = writeln!(out, "{inner}ignore_changes = [{}]", paths.as_slice().join(", "));
            }
            Directive::CreateBeforeDestroy => {
                let _ = writeln!(out, "{inner}create_before_destroy = true");
            }
            Directive::DependsOn(_) => {}
        }
    }
    let _ = writeln!(out, "{pad}}}");
}
