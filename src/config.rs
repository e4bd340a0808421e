//! Environment settings and harness configuration.
//!
//! Precedence, lowest to highest: built-in defaults, the JSON file named by
//! `TF_ACC_CONFIG`, then individual environment settings.

use crate::error::{Error, Result};
use crate::generate::{generate_variable, quote};
use crate::vcr::{VCR_ENV_DIR, VCR_ENV_MODE, VcrMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "TF_ACC_CONFIG";
pub const SWEEP_EXCLUDE_ENV: &str = "SWEEP_EXCLUDE";
pub const DEFAULT_CASSETTE_DIR: &str = "tests/fixtures/vcr";
pub const DEFAULT_PROVIDER: &str = "oci";

#[derive(Debug, Clone)]
enum Source {
    Process,
    Map(HashMap<String, String>),
}

/// String-keyed setting lookups.
///
/// Every lookup tries `TF_VAR_<name>` first, then `<name>`. Empty values count
/// as unset.
#[derive(Debug, Clone)]
pub struct EnvSettings {
    source: Source,
}

impl Default for EnvSettings {
    fn default() -> Self {
        Self::from_env()
    }
}

impl EnvSettings {
    /// Read from the process environment.
    #[must_use]
    pub const fn from_env() -> Self {
        Self {
            source: Source::Process,
        }
    }

    /// Read from a fixed map; used by tests.
    pub fn from_map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            source: Source::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Exact-name lookup, used for harness control variables.
    fn raw(&self, key: &str) -> Option<String> {
        let value = match &self.source {
            Source::Process => std::env::var(key).ok(),
            Source::Map(map) => map.get(key).cloned(),
        };
        value.filter(|v| !v.is_empty())
    }

    /// `TF_VAR_<name>`, then `<name>`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<String> {
        self.raw(&format!("TF_VAR_{name}"))
            .or_else(|| self.raw(name))
    }

    /// Value of `name`, or the empty string.
    #[must_use]
    pub fn get_env_setting_with_blank_default(&self, name: &str) -> String {
        self.lookup(name).unwrap_or_default()
    }

    /// Value of `name`, or `default`.
    #[must_use]
    pub fn get_env_setting_with_default(&self, name: &str, default: &str) -> String {
        self.lookup(name).unwrap_or_else(|| default.to_string())
    }

    /// Value of `name`, or [`Error::Config`] naming both accepted keys.
    pub fn get_required_env_setting(&self, name: &str) -> Result<String> {
        self.lookup(name).ok_or_else(|| {
            Error::config(format!(
                "missing required setting: set TF_VAR_{name} or {name}"
            ))
        })
    }
}

/// Harness-wide settings shared by every acceptance test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub provider: String,
    pub tenancy_ocid: String,
    pub compartment_id: String,
    pub region: String,
    pub vcr_mode: VcrMode,
    pub cassette_dir: PathBuf,
    pub sweep_exclude: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            tenancy_ocid: String::new(),
            compartment_id: String::new(),
            region: String::new(),
            vcr_mode: VcrMode::default(),
            cassette_dir: PathBuf::from(DEFAULT_CASSETTE_DIR),
            sweep_exclude: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// Defaults, then the `TF_ACC_CONFIG` file if set, then env overrides.
    pub fn load(settings: &EnvSettings) -> Result<Self> {
        let base = match settings.raw(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        base.with_overrides(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::config(format!("cannot read {}: {err}", path.display()))
        })?;
        serde_json::from_str(&content)
            .map_err(|err| Error::config(format!("invalid config {}: {err}", path.display())))
    }

    /// Apply individual settings on top of `self`.
    pub fn with_overrides(mut self, settings: &EnvSettings) -> Result<Self> {
        if let Some(value) = settings.lookup("tenancy_ocid") {
            self.tenancy_ocid = value;
        }
        if let Some(value) = settings.lookup("compartment_ocid") {
            self.compartment_id = value;
        }
        if let Some(value) = settings.lookup("region") {
            self.region = value;
        }
        if let Some(raw) = settings.raw(VCR_ENV_MODE) {
            self.vcr_mode = VcrMode::parse(&raw)
                .ok_or_else(|| Error::config(format!("invalid {VCR_ENV_MODE}: {raw}")))?;
        }
        if let Some(dir) = settings.raw(VCR_ENV_DIR) {
            self.cassette_dir = PathBuf::from(dir);
        }
        if let Some(raw) = settings.raw(SWEEP_EXCLUDE_ENV) {
            self.sweep_exclude = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        Ok(self)
    }

    /// Variable declarations plus the provider block every test config starts with.
    #[must_use]
    pub fn provider_config(&self) -> String {
        let mut out = String::new();
        out.push_str(&generate_variable("tenancy_ocid", self.tenancy_ocid.as_str()));
        out.push_str(&generate_variable("compartment_id", self.compartment_id.as_str()));
        out.push_str(&generate_variable("region", self.region.as_str()));
        let _ = write!(
            out,
            "\nprovider {} {{\n  tenancy_ocid = var.tenancy_ocid\n  region = var.region\n}}\n\n",
            quote(&self.provider)
        );
        out
    }
}
