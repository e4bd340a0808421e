//! Representation model: typed fixture descriptors for configuration attributes.
//!
//! A [`RepresentationMap`] describes one resource or data-source fixture. Each
//! entry says whether the attribute is always emitted ([`RepresentationKind::Required`])
//! or only in fully-populated variants ([`RepresentationKind::Optional`]), and which
//! value to use in the create and update phases. Nested blocks are
//! [`Representation::Group`] (one block) or [`Representation::Repeated`]
//! (the same block several times).
//!
//! Entries are stored behind [`Arc`], so composing a variant from a base map shares
//! every untouched entry instead of deep-cloning it.

use crate::directive::Directive;
use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

// ============================================================================
// Lifecycle axes
// ============================================================================

/// Whether an attribute must appear in every generated variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepresentationKind {
    Required,
    Optional,
}

/// Which attributes a render emits: only required ones, or everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Selector {
    Required,
    Optional,
}

/// Which value variant a render uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Create,
    Update,
}

impl RepresentationKind {
    /// Emission gate: required entries always render, optional ones only under
    /// [`Selector::Optional`].
    #[must_use]
    pub const fn is_emitted(self, selector: Selector) -> bool {
        matches!(
            (self, selector),
            (Self::Required, _) | (Self::Optional, Selector::Optional)
        )
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update => write!(f, "update"),
        }
    }
}

// ============================================================================
// Values
// ============================================================================

/// An attribute value.
///
/// `String` is a literal and is quoted on render; `Reference` is an expression
/// (`var.compartment_id`, `oci_core_vcn.test_vcn.id`) emitted verbatim and
/// resolved by the apply engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ConfigValue {
    String(String),
    Reference(String),
    Number(serde_json::Number),
    Bool(bool),
    List(Vec<ConfigValue>),
    Map(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// An opaque expression passed through to the engine.
    pub fn reference(expr: impl Into<String>) -> Self {
        Self::Reference(expr.into())
    }

    /// A map of string literals, the shape of freeform tags.
    pub fn string_map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), Self::String(v.into())))
                .collect(),
        )
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<i32> for ConfigValue {
    fn from(value: i32) -> Self {
        Self::Number(i64::from(value).into())
    }
}

impl From<u32> for ConfigValue {
    fn from(value: u32) -> Self {
        Self::Number(u64::from(value).into())
    }
}

impl From<f64> for ConfigValue {
    /// Non-finite floats have no configuration literal and become the string `"NaN"`/`"inf"`.
    fn from(value: f64) -> Self {
        serde_json::Number::from_f64(value)
            .map_or_else(|| Self::String(value.to_string()), Self::Number)
    }
}

impl<T: Into<ConfigValue>> From<Vec<T>> for ConfigValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

// ============================================================================
// Representation
// ============================================================================

/// One attribute's behaviour across lifecycle phases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Representation {
    /// A plain attribute. `update` falls back to `create` when absent.
    Leaf {
        kind: RepresentationKind,
        create: ConfigValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        update: Option<ConfigValue>,
    },
    /// A nested block. Its own kind gates whether the block appears at all.
    Group {
        kind: RepresentationKind,
        children: RepresentationMap,
    },
    /// The same nested block emitted once per entry, in order.
    Repeated {
        kind: RepresentationKind,
        blocks: Vec<RepresentationMap>,
    },
}

impl Representation {
    pub fn required(create: impl Into<ConfigValue>) -> Self {
        Self::Leaf {
            kind: RepresentationKind::Required,
            create: create.into(),
            update: None,
        }
    }

    pub fn optional(create: impl Into<ConfigValue>) -> Self {
        Self::Leaf {
            kind: RepresentationKind::Optional,
            create: create.into(),
            update: None,
        }
    }

    #[must_use]
    pub const fn required_group(children: RepresentationMap) -> Self {
        Self::Group {
            kind: RepresentationKind::Required,
            children,
        }
    }

    #[must_use]
    pub const fn optional_group(children: RepresentationMap) -> Self {
        Self::Group {
            kind: RepresentationKind::Optional,
            children,
        }
    }

    #[must_use]
    pub const fn repeated(kind: RepresentationKind, blocks: Vec<RepresentationMap>) -> Self {
        Self::Repeated { kind, blocks }
    }

    /// Set a distinct update-phase value.
    ///
    /// Blocks have no value of their own; for them this returns `self` unchanged.
    #[must_use]
    pub fn with_update(self, value: impl Into<ConfigValue>) -> Self {
        match self {
            Self::Leaf { kind, create, .. } => Self::Leaf {
                kind,
                create,
                update: Some(value.into()),
            },
            block => block,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> RepresentationKind {
        match self {
            Self::Leaf { kind, .. } | Self::Group { kind, .. } | Self::Repeated { kind, .. } => {
                *kind
            }
        }
    }

    #[must_use]
    pub const fn is_emitted(&self, selector: Selector) -> bool {
        self.kind().is_emitted(selector)
    }

    /// Value used for `phase`, or `None` for blocks.
    #[must_use]
    pub const fn value_for(&self, phase: Phase) -> Option<&ConfigValue> {
        match self {
            Self::Leaf {
                create,
                update: Some(update),
                ..
            } => match phase {
                Phase::Create => Some(create),
                Phase::Update => Some(update),
            },
            Self::Leaf { create, .. } => Some(create),
            Self::Group { .. } | Self::Repeated { .. } => None,
        }
    }
}

// ============================================================================
// RepresentationMap
// ============================================================================

/// Meta-arguments that only a [`Directive`] may produce.
pub const RESERVED_KEYS: [&str; 2] = ["depends_on", "lifecycle"];

static KEY_REGEX: OnceLock<Regex> = OnceLock::new();

fn key_regex() -> &'static Regex {
    KEY_REGEX.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("key regex"))
}

/// Check that `key` can stand on the left of `=` or name a nested block.
pub fn validate_key(key: &str) -> Result<()> {
    if !key_regex().is_match(key) {
        return Err(Error::validation(format!("invalid attribute key: {key:?}")));
    }
    if RESERVED_KEYS.contains(&key) {
        return Err(Error::validation(format!(
            "attribute key {key:?} is reserved; express it as a Directive"
        )));
    }
    Ok(())
}

/// A resource or data-source fixture: attribute name to representation, plus
/// configuration directives.
///
/// Every key is a valid identifier and none is reserved, whether the map was
/// built in code or deserialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedMap")]
pub struct RepresentationMap {
    #[serde(default)]
    entries: BTreeMap<String, Arc<Representation>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    directives: Vec<Directive>,
}

#[derive(Deserialize)]
struct UncheckedMap {
    #[serde(default)]
    entries: BTreeMap<String, Arc<Representation>>,
    #[serde(default)]
    directives: Vec<Directive>,
}

impl TryFrom<UncheckedMap> for RepresentationMap {
    type Error = Error;

    fn try_from(raw: UncheckedMap) -> Result<Self> {
        for key in raw.entries.keys() {
            validate_key(key)?;
        }
        Ok(Self {
            entries: raw.entries,
            directives: raw.directives,
        })
    }
}

impl RepresentationMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry, for keys written out in fixture code.
    ///
    /// # Panics
    ///
    /// If `key` fails [`validate_key`]. Use [`Self::try_with`] for keys that
    /// come from data.
    #[must_use]
    #[track_caller]
    pub fn with(self, key: impl Into<String>, representation: Representation) -> Self {
        match self.try_with(key, representation) {
            Ok(map) => map,
            Err(err) => panic!("{err}"),
        }
    }

    /// Insert or replace an entry; an invalid or reserved key is
    /// [`Error::Validation`].
    pub fn try_with(
        mut self,
        key: impl Into<String>,
        representation: Representation,
    ) -> Result<Self> {
        let key = key.into();
        validate_key(&key)?;
        self.entries.insert(key, Arc::new(representation));
        Ok(self)
    }

    #[must_use]
    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Representation> {
        self.entries.get(key).map(AsRef::as_ref)
    }

    /// Shared handle to an entry; composition uses this to avoid cloning values.
    #[must_use]
    pub fn get_shared(&self, key: &str) -> Option<&Arc<Representation>> {
        self.entries.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Representation)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub(crate) fn insert_shared(&mut self, key: String, representation: Arc<Representation>) {
        self.entries.insert(key, representation);
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Arc<Representation>> {
        self.entries.remove(key)
    }
}
