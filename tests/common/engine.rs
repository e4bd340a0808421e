//! In-memory apply engine.
//!
//! Parses configuration text with `hcl`, resolves `var.*` and resource
//! references, and converges a [`FakeCloud`] to it. Enough behaviour to drive
//! real lifecycle tests: create, update in place, force-new replacement,
//! removal, data sources with `filter` blocks, import and destroy.

#![allow(dead_code)]

use super::cloud::FakeCloud;
use acctest::engine::ApplyEngine;
use acctest::state::{ResourceState, State};
use acctest::{CloudClient, Error, Result};
use hcl::{Block, Body, Expression, Traversal, TraversalOperator};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Per-type behaviour of the fake provider.
#[derive(Debug, Clone, Default)]
pub struct KindSchema {
    pub required: Vec<String>,
    pub force_new: Vec<String>,
    /// Stored but never returned by import.
    pub write_only: Vec<String>,
}

impl KindSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required<const N: usize>(mut self, keys: [&str; N]) -> Self {
        self.required.extend(keys.iter().map(ToString::to_string));
        self
    }

    pub fn force_new<const N: usize>(mut self, keys: [&str; N]) -> Self {
        self.force_new.extend(keys.iter().map(ToString::to_string));
        self
    }

    pub fn write_only<const N: usize>(mut self, keys: [&str; N]) -> Self {
        self.write_only.extend(keys.iter().map(ToString::to_string));
        self
    }
}

#[derive(Debug, Clone)]
enum Value {
    Scalar(String),
    List(Vec<Value>),
    Map(Vec<(String, Value)>),
}

pub struct FakeEngine {
    cloud: Arc<FakeCloud>,
    schemas: BTreeMap<String, KindSchema>,
    state: State,
    applied: Vec<String>,
    leak_on_destroy: bool,
}

impl FakeEngine {
    pub fn new(cloud: Arc<FakeCloud>) -> Self {
        Self {
            cloud,
            schemas: BTreeMap::new(),
            state: State::new(),
            applied: Vec::new(),
            leak_on_destroy: false,
        }
    }

    pub fn with_schema(mut self, kind: &str, schema: KindSchema) -> Self {
        self.schemas.insert(kind.to_string(), schema);
        self
    }

    /// Destroy reports success but leaves everything behind.
    pub fn leaking(mut self) -> Self {
        self.leak_on_destroy = true;
        self
    }

    /// Every configuration applied so far.
    pub fn applied_configs(&self) -> &[String] {
        &self.applied
    }

    fn schema(&self, kind: &str) -> KindSchema {
        self.schemas.get(kind).cloned().unwrap_or_default()
    }

    fn apply_resource(
        &self,
        block: &Block,
        vars: &BTreeMap<String, String>,
        next: &mut State,
    ) -> Result<()> {
        let (kind, name) = labels(block)?;
        let address = format!("{kind}.{name}");
        let mut attributes = BTreeMap::new();
        flatten(block.body(), "", vars, next, &mut attributes)?;

        let schema = self.schema(&kind);
        if let Some(missing) = schema
            .required
            .iter()
            .find(|key| !attributes.contains_key(key.as_str()))
        {
            return Err(Error::apply(format!(
                "{address}: Missing required argument: The argument \"{missing}\" is required"
            )));
        }

        let compartment = attributes.get("compartment_id").cloned().unwrap_or_default();
        let id = match self.state.resource(&address) {
            Some(prior) if !forces_new(&schema, prior, &attributes) => prior.id.clone(),
            Some(prior) => {
                delete_ignoring_missing(&self.cloud, &kind, &prior.id)?;
                self.cloud.allocate_id(&kind)
            }
            None => self.cloud.allocate_id(&kind),
        };
        let resource = ResourceState {
            id,
            attributes,
        };
        self.cloud.put(&kind, &compartment, resource.clone());

        let mut visible = resource;
        visible
            .attributes
            .insert("state".to_string(), "AVAILABLE".to_string());
        next.resources.insert(address, visible);
        Ok(())
    }

    fn read_data_source(
        block: &Block,
        vars: &BTreeMap<String, String>,
        next: &mut State,
    ) -> Result<()> {
        let (kind, name) = labels(block)?;
        let address = format!("data.{kind}.{name}");
        let mut attributes = BTreeMap::new();
        flatten(block.body(), "", vars, next, &mut attributes)?;

        let singular = kind.strip_suffix('s').unwrap_or(&kind).to_string();
        let field = kind.rsplit('_').next().unwrap_or(&kind).to_string();
        let filters = filters(&attributes);

        let matches: Vec<(String, ResourceState)> = next
            .managed()
            .filter(|(a, _)| a.split_once('.').is_some_and(|(k, _)| k == singular))
            .filter(|(_, r)| {
                filters.iter().all(|(key, values)| {
                    r.attribute(key).is_some_and(|v| values.contains(v))
                })
            })
            .map(|(a, r)| (a.to_string(), r.clone()))
            .collect();

        attributes.insert(format!("{field}.#"), matches.len().to_string());
        for (i, (_, resource)) in matches.iter().enumerate() {
            attributes.insert(format!("{field}.{i}.id"), resource.id.clone());
            for (key, value) in &resource.attributes {
                attributes.insert(format!("{field}.{i}.{key}"), value.clone());
            }
        }
        next.resources.insert(
            address,
            ResourceState {
                id: format!("{kind}-{name}"),
                attributes,
            },
        );
        Ok(())
    }
}

impl ApplyEngine for FakeEngine {
    fn apply(&mut self, config: &str) -> Result<State> {
        let body: Body = hcl::from_str(config)
            .map_err(|err| Error::apply(format!("invalid configuration: {err}")))?;
        self.applied.push(config.to_string());

        let mut vars = BTreeMap::new();
        for block in body.blocks().filter(|b| b.identifier.as_str() == "variable") {
            let name = block
                .labels
                .first()
                .map(|l| l.as_str().to_string())
                .ok_or_else(|| Error::apply("variable block without a name"))?;
            let default = block
                .body()
                .attributes()
                .find(|a| a.key.as_str() == "default")
                .map(|a| scalar(&a.expr))
                .unwrap_or_default();
            vars.insert(name, default);
        }

        let mut next = State::new();
        for block in body.blocks().filter(|b| b.identifier.as_str() == "resource") {
            self.apply_resource(block, &vars, &mut next)?;
        }

        let gone: Vec<(String, String)> = self
            .state
            .managed()
            .filter(|(address, _)| next.resource(address).is_none())
            .map(|(address, r)| (address.to_string(), r.id.clone()))
            .collect();
        for (address, id) in gone {
            let kind = address.split_once('.').map_or(address.as_str(), |(k, _)| k);
            delete_ignoring_missing(&self.cloud, kind, &id)?;
        }

        for block in body.blocks().filter(|b| b.identifier.as_str() == "data") {
            Self::read_data_source(block, &vars, &mut next)?;
        }

        self.state = next.clone();
        Ok(next)
    }

    fn import(&mut self, address: &str, id: &str) -> Result<ResourceState> {
        let kind = address.split_once('.').map_or(address, |(k, _)| k);
        let stored = self
            .cloud
            .stored(id)
            .filter(|r| r.kind == kind)
            .ok_or_else(|| {
                Error::apply(format!(
                    "Cannot import non-existent remote object: {address} ({id})"
                ))
            })?;
        let schema = self.schema(kind);
        let mut imported = stored.state;
        imported
            .attributes
            .retain(|key, _| !schema.write_only.iter().any(|w| key.starts_with(w.as_str())));
        imported
            .attributes
            .insert("state".to_string(), stored.lifecycle_state);
        Ok(imported)
    }

    fn destroy(&mut self) -> Result<()> {
        if !self.leak_on_destroy {
            for (address, resource) in self.state.managed() {
                let kind = address.split_once('.').map_or(address, |(k, _)| k);
                delete_ignoring_missing(&self.cloud, kind, &resource.id)?;
            }
        }
        self.state = State::new();
        Ok(())
    }

    fn state(&self) -> &State {
        &self.state
    }
}

fn labels(block: &Block) -> Result<(String, String)> {
    let labels: Vec<&str> = block.labels.iter().map(|l| l.as_str()).collect();
    match labels.as_slice() {
        [kind, name] => Ok(((*kind).to_string(), (*name).to_string())),
        _ => Err(Error::apply(format!(
            "{} block needs a type and a name label",
            block.identifier.as_str()
        ))),
    }
}

fn forces_new(schema: &KindSchema, prior: &ResourceState, next: &BTreeMap<String, String>) -> bool {
    schema
        .force_new
        .iter()
        .any(|key| prior.attributes.get(key) != next.get(key))
}

fn delete_ignoring_missing(cloud: &FakeCloud, kind: &str, id: &str) -> Result<()> {
    match cloud.delete(kind, id) {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

/// `filter { name = "id" values = [...] }` blocks from flattened attributes.
fn filters(attributes: &BTreeMap<String, String>) -> Vec<(String, BTreeSet<String>)> {
    let count: usize = attributes
        .get("filter.#")
        .and_then(|n| n.parse().ok())
        .unwrap_or(0);
    (0..count)
        .filter_map(|i| {
            let name = attributes.get(&format!("filter.{i}.name"))?.clone();
            let prefix = format!("filter.{i}.values.");
            let values = attributes
                .iter()
                .filter(|(k, _)| k.starts_with(&prefix) && !k.ends_with('#'))
                .map(|(_, v)| v.clone())
                .collect();
            Some((name, values))
        })
        .collect()
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn flatten(
    body: &Body,
    prefix: &str,
    vars: &BTreeMap<String, String>,
    state: &State,
    out: &mut BTreeMap<String, String>,
) -> Result<()> {
    for attribute in body.attributes() {
        let key = attribute.key.as_str();
        if prefix.is_empty() && key == "depends_on" {
            continue;
        }
        let value = evaluate(&attribute.expr, vars, state)?;
        write_value(&join(prefix, key), &value, out);
    }

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for block in body.blocks() {
        let ident = block.identifier.as_str();
        if prefix.is_empty() && ident == "lifecycle" {
            continue;
        }
        let index = counts.entry(ident).or_insert(0);
        let nested = join(prefix, &format!("{ident}.{index}"));
        *index += 1;
        flatten(block.body(), &nested, vars, state, out)?;
    }
    for (ident, count) in counts {
        out.insert(format!("{}.#", join(prefix, ident)), count.to_string());
    }
    Ok(())
}

fn write_value(path: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    match value {
        Value::Scalar(s) => {
            out.insert(path.to_string(), s.clone());
        }
        Value::List(items) => {
            out.insert(format!("{path}.#"), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                write_value(&format!("{path}.{i}"), item, out);
            }
        }
        Value::Map(entries) => {
            out.insert(format!("{path}.%"), entries.len().to_string());
            for (key, item) in entries {
                write_value(&format!("{path}.{key}"), item, out);
            }
        }
    }
}

fn scalar(expr: &Expression) -> String {
    match expr {
        Expression::String(s) => s.clone(),
        Expression::Number(n) => n.to_string(),
        Expression::Bool(b) => b.to_string(),
        Expression::TemplateExpr(t) => t.to_string(),
        other => other.to_string(),
    }
}

fn evaluate(expr: &Expression, vars: &BTreeMap<String, String>, state: &State) -> Result<Value> {
    Ok(match expr {
        Expression::Array(items) => Value::List(
            items
                .iter()
                .map(|item| evaluate(item, vars, state))
                .collect::<Result<_>>()?,
        ),
        Expression::Object(object) => {
            let mut entries = Vec::new();
            for (key, item) in object.iter() {
                let key = match key {
                    hcl::expr::ObjectKey::Identifier(ident) => ident.to_string(),
                    hcl::expr::ObjectKey::Expression(expr) => scalar(expr),
                    _ => return Err(Error::apply("unsupported object key")),
                };
                entries.push((key, evaluate(item, vars, state)?));
            }
            Value::Map(entries)
        }
        Expression::Traversal(traversal) => Value::Scalar(resolve(traversal, vars, state)?),
        other => Value::Scalar(scalar(other)),
    })
}

fn resolve(traversal: &Traversal, vars: &BTreeMap<String, String>, state: &State) -> Result<String> {
    let root = traversal.expr.to_string();
    let mut path: Vec<String> = Vec::new();
    for operator in &traversal.operators {
        match operator {
            TraversalOperator::GetAttr(ident) => path.push(ident.to_string()),
            TraversalOperator::LegacyIndex(i) => path.push(i.to_string()),
            TraversalOperator::Index(index) => path.push(scalar(index)),
            _ => return Err(Error::apply(format!("unsupported traversal on {root}"))),
        }
    }

    if root == "var" {
        let name = path.first().map(String::as_str).unwrap_or_default();
        return vars
            .get(name)
            .cloned()
            .ok_or_else(|| Error::apply(format!("Reference to undeclared input variable var.{name}")));
    }

    let (address, rest) = if root == "data" && path.len() >= 2 {
        (format!("data.{}.{}", path[0], path[1]), &path[2..])
    } else if let Some((name, rest)) = path.split_first() {
        (format!("{root}.{name}"), rest)
    } else {
        return Err(Error::apply(format!("incomplete reference {root}")));
    };
    let resource = state
        .resource(&address)
        .ok_or_else(|| Error::apply(format!("Reference to undeclared resource {address}")))?;
    let attribute = rest.join(".");
    resource
        .attribute(&attribute)
        .map(str::to_string)
        .ok_or_else(|| Error::apply(format!("{address} has no attribute {attribute}")))
}
