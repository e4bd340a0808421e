//! Sweeper registry: best-effort cleanup of resources leaked by test runs.
//!
//! Registration happens in one explicit bootstrap phase through
//! [`SweeperRegistry::builder`]; the built registry is immutable and can be
//! installed process-wide exactly once with [`install_global`].

use crate::cloud::CloudClient;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{OnceLock, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Cleanup callback for one resource kind.
pub type SweepFn = Box<dyn Fn(&SweepContext) -> Result<()> + Send + Sync>;

/// A registered cleanup function and the sweepers that must run before it.
pub struct Sweeper {
    pub dependencies: Vec<String>,
    pub f: SweepFn,
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

impl Sweeper {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&SweepContext) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            dependencies: Vec::new(),
            f: Box::new(f),
        }
    }

    #[must_use]
    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies
            .extend(dependencies.into_iter().map(Into::into));
        self
    }
}

/// Ids owned by test infrastructure that sweepers must never delete.
#[derive(Debug, Default)]
pub struct DefaultResources {
    ids: RwLock<BTreeSet<String>>,
}

impl DefaultResources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when `id` was already known.
    ///
    /// Lock poisoning is ignored; the set only ever grows.
    pub fn insert(&self, id: impl Into<String>) -> bool {
        self.ids
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.into())
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.ids
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Scope handed to every sweeper.
#[derive(Debug, Default)]
pub struct SweepContext {
    pub compartment_id: String,
    pub defaults: DefaultResources,
}

impl SweepContext {
    pub fn new(compartment_id: impl Into<String>) -> Self {
        Self {
            compartment_id: compartment_id.into(),
            defaults: DefaultResources::new(),
        }
    }
}

/// Counts from one [`sweep_resources`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub listed: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Delete every `kind` resource in the context's compartment that is not a
/// default resource and not already terminated.
///
/// Listing errors are returned. Individual delete failures are logged and
/// counted; they never fail the sweep.
pub fn sweep_resources(
    client: &dyn CloudClient,
    kind: &str,
    ctx: &SweepContext,
) -> Result<SweepStats> {
    let resources = client.list(kind, &ctx.compartment_id)?;
    let mut stats = SweepStats {
        listed: resources.len(),
        ..SweepStats::default()
    };
    for resource in resources {
        if resource.is_terminated() || ctx.defaults.contains(&resource.id) {
            stats.skipped += 1;
            continue;
        }
        match client.delete(kind, &resource.id) {
            Ok(()) => {
                debug!(kind, id = %resource.id, "swept");
                stats.deleted += 1;
            }
            Err(err) => {
                warn!(kind, id = %resource.id, "failed to sweep: {err}");
                stats.failed += 1;
            }
        }
    }
    info!(
        kind,
        compartment = %ctx.compartment_id,
        deleted = stats.deleted,
        failed = stats.failed,
        "sweep finished"
    );
    Ok(stats)
}

#[derive(Debug, Default)]
pub struct SweeperRegistryBuilder {
    sweepers: BTreeMap<String, Sweeper>,
    duplicates: Vec<String>,
    exclude: BTreeSet<String>,
}

impl SweeperRegistryBuilder {
    /// Register `sweeper` under `name`. Registering a name twice fails `build`.
    #[must_use]
    pub fn add_test_sweepers(mut self, name: impl Into<String>, sweeper: Sweeper) -> Self {
        let name = name.into();
        if self.sweepers.contains_key(&name) {
            self.duplicates.push(name);
        } else {
            self.sweepers.insert(name, sweeper);
        }
        self
    }

    /// Never run `name`. Unknown names are allowed.
    #[must_use]
    pub fn exclude(mut self, name: impl Into<String>) -> Self {
        self.exclude.insert(name.into());
        self
    }

    #[must_use]
    pub fn exclude_all<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(names.into_iter().map(Into::into));
        self
    }

    /// Validate names and dependencies.
    pub fn build(self) -> Result<SweeperRegistry> {
        if !self.duplicates.is_empty() {
            return Err(Error::validation(format!(
                "sweeper registered more than once: {}",
                self.duplicates.join(", ")
            )));
        }
        for (name, sweeper) in &self.sweepers {
            if let Some(missing) = sweeper
                .dependencies
                .iter()
                .find(|dep| !self.sweepers.contains_key(dep.as_str()))
            {
                return Err(Error::validation(format!(
                    "sweeper '{name}' depends on unknown sweeper '{missing}'"
                )));
            }
        }
        let registry = SweeperRegistry {
            sweepers: self.sweepers,
            exclude: self.exclude,
        };
        {
            let all: BTreeSet<&str> = registry.names().collect();
            registry.topological(&all)?;
        }
        Ok(registry)
    }
}

/// Immutable set of sweepers keyed by resource kind.
#[derive(Debug)]
pub struct SweeperRegistry {
    sweepers: BTreeMap<String, Sweeper>,
    exclude: BTreeSet<String>,
}

/// Which sweepers ran and which were skipped by exclusion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub ran: Vec<String>,
    pub excluded: Vec<String>,
}

impl SweeperRegistry {
    #[must_use]
    pub fn builder() -> SweeperRegistryBuilder {
        SweeperRegistryBuilder::default()
    }

    #[must_use]
    pub fn in_sweeper_exclude_list(&self, name: &str) -> bool {
        self.exclude.contains(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.sweepers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sweepers.keys().map(String::as_str)
    }

    /// Names to run for `filter` (all when empty) plus their transitive
    /// dependencies, dependencies first, ties broken by name.
    pub fn execution_order<S: AsRef<str>>(&self, filter: &[S]) -> Result<Vec<&str>> {
        let mut selected = BTreeSet::new();
        if filter.is_empty() {
            selected.extend(self.sweepers.keys().map(String::as_str));
        } else {
            let mut pending: Vec<&str> = Vec::new();
            for name in filter {
                let name = name.as_ref();
                let (key, _) = self
                    .sweepers
                    .get_key_value(name)
                    .ok_or_else(|| Error::validation(format!("unknown sweeper '{name}'")))?;
                pending.push(key.as_str());
            }
            while let Some(name) = pending.pop() {
                if selected.insert(name) {
                    if let Some(sweeper) = self.sweepers.get(name) {
                        pending.extend(sweeper.dependencies.iter().map(String::as_str));
                    }
                }
            }
        }
        self.topological(&selected)
    }

    fn topological<'a>(&'a self, selected: &BTreeSet<&'a str>) -> Result<Vec<&'a str>> {
        let mut remaining: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for &name in selected {
            let deps = self
                .sweepers
                .get(name)
                .map(|s| s.dependencies.as_slice())
                .unwrap_or_default();
            let mut count = 0;
            for dep in deps.iter().filter(|d| selected.contains(d.as_str())) {
                dependents.entry(dep.as_str()).or_default().push(name);
                count += 1;
            }
            remaining.insert(name, count);
        }

        let mut ready: BTreeSet<&str> = remaining
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut order = Vec::with_capacity(selected.len());
        while let Some(name) = ready.pop_first() {
            order.push(name);
            for &dependent in dependents.get(name).map(Vec::as_slice).unwrap_or_default() {
                if let Some(count) = remaining.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if order.len() < selected.len() {
            let stuck: Vec<&str> = remaining
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(name, _)| *name)
                .collect();
            return Err(Error::validation(format!(
                "sweeper dependency cycle among: {}",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }

    /// Run the selected sweepers once each, in [`Self::execution_order`].
    ///
    /// Excluded sweepers are skipped and reported. The first sweeper error
    /// stops the run.
    pub fn run<S: AsRef<str>>(&self, ctx: &SweepContext, filter: &[S]) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        for name in self.execution_order(filter)? {
            if self.in_sweeper_exclude_list(name) {
                info!(sweeper = name, "sweeper excluded");
                report.excluded.push(name.to_string());
                continue;
            }
            let Some(sweeper) = self.sweepers.get(name) else {
                continue;
            };
            info!(sweeper = name, compartment = %ctx.compartment_id, "running sweeper");
            (sweeper.f)(ctx).map_err(|err| Error::sweep(name, err.to_string()))?;
            report.ran.push(name.to_string());
        }
        Ok(report)
    }
}

static GLOBAL: OnceLock<SweeperRegistry> = OnceLock::new();

/// Install the process-wide registry. Fails if one is already installed.
pub fn install_global(registry: SweeperRegistry) -> Result<&'static SweeperRegistry> {
    GLOBAL
        .set(registry)
        .map_err(|_| Error::validation("sweeper registry already installed"))?;
    GLOBAL
        .get()
        .ok_or_else(|| Error::validation("sweeper registry not installed"))
}

/// The process-wide registry, if installed.
#[must_use]
pub fn global() -> Option<&'static SweeperRegistry> {
    GLOBAL.get()
}
