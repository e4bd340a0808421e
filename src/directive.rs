//! Configuration-modifier directives.
//!
//! Instead of splicing raw `lifecycle { ... }` text into fixtures, a
//! [`RepresentationMap`](crate::representation::RepresentationMap) carries a
//! small closed set of directives. Their arguments are validated when they
//! are constructed, so rendering never has to reject anything.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static ATTRIBUTE_PATH_REGEX: OnceLock<Regex> = OnceLock::new();
static ADDRESS_REGEX: OnceLock<Regex> = OnceLock::new();

fn attribute_path_regex() -> &'static Regex {
    ATTRIBUTE_PATH_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*(\.[A-Za-z_][A-Za-z0-9_-]*|\[[0-9]+\])*$")
            .expect("attribute path regex")
    })
}

fn address_regex() -> &'static Regex {
    ADDRESS_REGEX.get_or_init(|| {
        Regex::new(r"^(data\.)?[A-Za-z_][A-Za-z0-9_-]*\.[A-Za-z_][A-Za-z0-9_-]*$")
            .expect("address regex")
    })
}

/// Non-empty list of attribute paths such as `defined_tags` or `rules[0].port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AttributePaths(Vec<String>);

impl AttributePaths {
    pub fn parse<I, S>(paths: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return Err(Error::validation("attribute path list must not be empty"));
        }
        if let Some(bad) = paths.iter().find(|p| !attribute_path_regex().is_match(p)) {
            return Err(Error::validation(format!("invalid attribute path: {bad:?}")));
        }
        Ok(Self(paths))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<Vec<String>> for AttributePaths {
    type Error = Error;

    fn try_from(paths: Vec<String>) -> Result<Self> {
        Self::parse(paths)
    }
}

impl From<AttributePaths> for Vec<String> {
    fn from(paths: AttributePaths) -> Self {
        paths.0
    }
}

/// Non-empty list of `type.name` (or `data.type.name`) addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ResourceAddresses(Vec<String>);

impl ResourceAddresses {
    pub fn parse<I, S>(addresses: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let addresses: Vec<String> = addresses.into_iter().map(Into::into).collect();
        if addresses.is_empty() {
            return Err(Error::validation("address list must not be empty"));
        }
        if let Some(bad) = addresses.iter().find(|a| !address_regex().is_match(a)) {
            return Err(Error::validation(format!("invalid resource address: {bad:?}")));
        }
        Ok(Self(addresses))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl TryFrom<Vec<String>> for ResourceAddresses {
    type Error = Error;

    fn try_from(addresses: Vec<String>) -> Result<Self> {
        Self::parse(addresses)
    }
}

impl From<ResourceAddresses> for Vec<String> {
    fn from(addresses: ResourceAddresses) -> Self {
        addresses.0
    }
}

/// A configuration modifier attached to a fixture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Directive {
    /// `lifecycle { ignore_changes = [...] }`
    IgnoreChanges(AttributePaths),
    /// `lifecycle { create_before_destroy = true }`
    CreateBeforeDestroy,
    /// `depends_on = [...]`
    DependsOn(ResourceAddresses),
}

impl Directive {
    pub fn ignore_changes<I, S>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttributePaths::parse(fields).map(Self::IgnoreChanges)
    }

    pub fn depends_on<I, S>(addresses: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ResourceAddresses::parse(addresses).map(Self::DependsOn)
    }

    #[must_use]
    pub const fn create_before_destroy() -> Self {
        Self::CreateBeforeDestroy
    }

    /// Whether the directive renders inside the `lifecycle` block.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::IgnoreChanges(_) | Self::CreateBeforeDestroy)
    }
}
