//! Lifecycle test driver.
//!
//! A [`ResourceTest`] is an ordered list of [`TestStep`]s run against an
//! [`ApplyEngine`]. Steps run strictly in order and the first failure aborts
//! the rest. Whatever happens, the engine is asked to destroy everything at
//! the end; the destroy check only runs when every step passed.
//!
//! ```ignore
//! ResourceTest::new("cpe_basic")
//!     .check_destroy(|state| check_destroyed(&client, "cpe", &ids_of(state)))
//!     .step(TestStep::config(required).check(check_resource_attr(CPE, "ip_address", "203.0.113.6")))
//!     .step(TestStep::config(optional_update).check(ids.expect_same_id(CPE)))
//!     .step(TestStep::import(CPE).import_state_verify_ignore(["defined_tags"]))
//!     .run(&mut engine)?;
//! ```

use crate::check::Check;
use crate::engine::ApplyEngine;
use crate::error::{Error, Result};
use crate::state::{ResourceState, State};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

/// Side-effecting hook run before a test or a step.
pub type Hook = Box<dyn Fn() -> Result<()> + Send + Sync>;

/// Where one resource address stands in the test's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    NotApplied,
    Created,
    Updated,
    /// Same address, new id (force-new change).
    Replaced,
    Imported,
    Destroyed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StepKind {
    Config(String),
    Import {
        address: String,
        id: Option<String>,
        verify_ignore: Vec<String>,
    },
}

/// One step of a lifecycle test.
pub struct TestStep {
    kind: StepKind,
    checks: Vec<Check>,
    pre_config: Option<Hook>,
    expect_error: Option<Regex>,
}

impl std::fmt::Debug for TestStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestStep")
            .field("kind", &self.kind)
            .field("checks", &self.checks.len())
            .field("pre_config", &self.pre_config.is_some())
            .field("expect_error", &self.expect_error)
            .finish()
    }
}

impl TestStep {
    /// Apply `config` (the full configuration text for this step).
    pub fn config(config: impl Into<String>) -> Self {
        Self::with_kind(StepKind::Config(config.into()))
    }

    /// Re-acquire `address` by id and verify it against the last applied state.
    pub fn import(address: impl Into<String>) -> Self {
        Self::with_kind(StepKind::Import {
            address: address.into(),
            id: None,
            verify_ignore: Vec::new(),
        })
    }

    const fn with_kind(kind: StepKind) -> Self {
        Self {
            kind,
            checks: Vec::new(),
            pre_config: None,
            expect_error: None,
        }
    }

    /// Add an assertion; assertions run in the order added.
    #[must_use]
    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// Run `hook` before applying (waits for eventual consistency and the like).
    #[must_use]
    pub fn pre_config<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.pre_config = Some(Box::new(hook));
        self
    }

    /// The apply must fail with a message matching `pattern`.
    #[must_use]
    pub fn expect_error(mut self, pattern: Regex) -> Self {
        self.expect_error = Some(pattern);
        self
    }

    /// Attribute path prefixes excluded from import verification.
    /// No-op on config steps.
    #[must_use]
    pub fn import_state_verify_ignore<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let StepKind::Import { verify_ignore, .. } = &mut self.kind {
            verify_ignore.extend(paths.into_iter().map(Into::into));
        }
        self
    }

    /// Import this id instead of the one recorded in state.
    #[must_use]
    pub fn import_state_id(mut self, import_id: impl Into<String>) -> Self {
        if let StepKind::Import { id, .. } = &mut self.kind {
            *id = Some(import_id.into());
        }
        self
    }

    const fn label(&self) -> &'static str {
        match self.kind {
            StepKind::Config(_) => "config",
            StepKind::Import { .. } => "import",
        }
    }
}

/// What one step did to each address it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: usize,
    pub kind: &'static str,
    /// Present when the step was an expected failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_error: Option<String>,
    pub transitions: BTreeMap<String, Lifecycle>,
}

/// Outcome of a passing lifecycle test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub name: String,
    pub steps: Vec<StepReport>,
    pub destroyed: Vec<String>,
}

impl TestReport {
    /// Every transition of `address`, oldest first.
    #[must_use]
    pub fn history(&self, address: &str) -> Vec<Lifecycle> {
        let mut history: Vec<Lifecycle> = self
            .steps
            .iter()
            .filter_map(|step| step.transitions.get(address).copied())
            .collect();
        if self.destroyed.iter().any(|a| a == address) {
            history.push(Lifecycle::Destroyed);
        }
        history
    }

    /// Final lifecycle state of `address`.
    #[must_use]
    pub fn lifecycle(&self, address: &str) -> Lifecycle {
        self.history(address).last().copied().unwrap_or_default()
    }
}

/// A sequential create/update/import/destroy test against one engine.
pub struct ResourceTest {
    name: String,
    pre_check: Option<Hook>,
    check_destroy: Option<Check>,
    steps: Vec<TestStep>,
}

impl std::fmt::Debug for ResourceTest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceTest")
            .field("name", &self.name)
            .field("pre_check", &self.pre_check.is_some())
            .field("check_destroy", &self.check_destroy.is_some())
            .field("steps", &self.steps)
            .finish()
    }
}

impl ResourceTest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pre_check: None,
            check_destroy: None,
            steps: Vec::new(),
        }
    }

    /// Runs once before the first step; an error aborts without applying anything.
    #[must_use]
    pub fn pre_check<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> Result<()> + Send + Sync + 'static,
    {
        self.pre_check = Some(Box::new(hook));
        self
    }

    /// Runs after teardown with the last applied state, to confirm the
    /// backend no longer has the resources.
    #[must_use]
    pub fn check_destroy<F>(mut self, check: F) -> Self
    where
        F: Fn(&State) -> Result<()> + Send + Sync + 'static,
    {
        self.check_destroy = Some(Box::new(check));
        self
    }

    #[must_use]
    pub fn step(mut self, step: TestStep) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn steps(mut self, steps: impl IntoIterator<Item = TestStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Run every step, then tear down.
    ///
    /// A step failure is returned as [`Error::StepFailed`] (1-based index) even
    /// when teardown also fails; teardown errors are then only logged.
    pub fn run<E: ApplyEngine + ?Sized>(&self, engine: &mut E) -> Result<TestReport> {
        info!(test = %self.name, steps = self.steps.len(), "resource test started");
        if let Some(pre_check) = &self.pre_check {
            pre_check()?;
        }

        let mut report = TestReport {
            name: self.name.clone(),
            steps: Vec::with_capacity(self.steps.len()),
            destroyed: Vec::new(),
        };
        let mut applied = engine.state().clone();
        let mut failure = None;

        for (index, step) in self.steps.iter().enumerate() {
            let number = index + 1;
            debug!(test = %self.name, step = number, kind = step.label(), "step started");
            match run_step(engine, step, number, &mut applied) {
                Ok(step_report) => report.steps.push(step_report),
                Err(err) => {
                    warn!(test = %self.name, step = number, "step failed: {err}");
                    failure = Some(Error::step_failed(number, err));
                    break;
                }
            }
        }

        let teardown = engine.destroy();
        if teardown.is_ok() {
            report.destroyed = applied.managed().map(|(a, _)| a.to_string()).collect();
        }

        if let Some(failure) = failure {
            if let Err(err) = teardown {
                warn!(test = %self.name, "teardown after failure also failed: {err}");
            }
            return Err(failure);
        }
        teardown?;

        if let Some(check_destroy) = &self.check_destroy {
            check_destroy(&applied)?;
        }
        info!(test = %self.name, "resource test passed");
        Ok(report)
    }
}

fn run_step<E: ApplyEngine + ?Sized>(
    engine: &mut E,
    step: &TestStep,
    number: usize,
    applied: &mut State,
) -> Result<StepReport> {
    if let Some(hook) = &step.pre_config {
        hook()?;
    }

    let mut report = StepReport {
        step: number,
        kind: step.label(),
        expected_error: None,
        transitions: BTreeMap::new(),
    };

    let observed = match &step.kind {
        StepKind::Config(config) => match (engine.apply(config), &step.expect_error) {
            (Ok(_), Some(pattern)) => {
                return Err(Error::apply(format!(
                    "expected an error matching /{pattern}/, but apply succeeded"
                )));
            }
            (Ok(state), None) => {
                report.transitions = transitions(applied, &state);
                *applied = state.clone();
                state
            }
            (Err(err), Some(pattern)) => {
                let message = err.to_string();
                if !pattern.is_match(&message) {
                    return Err(Error::apply(format!(
                        "expected an error matching /{pattern}/, got: {message}"
                    )));
                }
                report.expected_error = Some(message);
                return Ok(report);
            }
            (Err(err), None) => return Err(err),
        },
        StepKind::Import {
            address,
            id,
            verify_ignore,
        } => {
            let expected = applied.resource(address).ok_or_else(|| {
                Error::validation(format!("cannot import {address}: it was never applied"))
            })?;
            let import_id = id.clone().unwrap_or_else(|| expected.id.clone());
            let imported = engine.import(address, &import_id)?;
            verify_import(address, expected, &imported, verify_ignore)?;
            report
                .transitions
                .insert(address.clone(), Lifecycle::Imported);
            applied
                .clone()
                .with_resource(address.clone(), imported)
        }
    };

    for check in &step.checks {
        check(&observed)?;
    }
    Ok(report)
}

/// Per-address transitions between two applied states. Unchanged resources
/// are omitted.
fn transitions(before: &State, after: &State) -> BTreeMap<String, Lifecycle> {
    let mut out = BTreeMap::new();
    for (address, resource) in after.managed() {
        let transition = match before.resource(address) {
            None => Some(Lifecycle::Created),
            Some(prior) if prior.id != resource.id => Some(Lifecycle::Replaced),
            Some(prior) if prior.attributes != resource.attributes => Some(Lifecycle::Updated),
            Some(_) => None,
        };
        if let Some(transition) = transition {
            out.insert(address.to_string(), transition);
        }
    }
    for (address, _) in before.managed() {
        if after.resource(address).is_none() {
            out.insert(address.to_string(), Lifecycle::Destroyed);
        }
    }
    out
}

fn is_ignored(path: &str, ignore: &[String]) -> bool {
    ignore.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

fn verify_import(
    address: &str,
    expected: &ResourceState,
    imported: &ResourceState,
    ignore: &[String],
) -> Result<()> {
    let mut diffs = Vec::new();
    if expected.id != imported.id && !is_ignored("id", ignore) {
        diffs.push(format!("id: expected {:?}, got {:?}", expected.id, imported.id));
    }
    let keys: BTreeSet<&String> = expected
        .attributes
        .keys()
        .chain(imported.attributes.keys())
        .collect();
    for key in keys {
        if is_ignored(key, ignore) {
            continue;
        }
        let (want, got) = (expected.attributes.get(key), imported.attributes.get(key));
        if want != got {
            diffs.push(format!("{key}: expected {want:?}, got {got:?}"));
        }
    }
    if diffs.is_empty() {
        Ok(())
    } else {
        Err(Error::ImportMismatch {
            address: address.to_string(),
            diffs,
        })
    }
}
