//! State assertions for lifecycle steps.
//!
//! A [`Check`] inspects the state produced by one step. Helpers cover the
//! common shapes (attribute equals, attribute set, attribute absent, two
//! attributes equal) and compose either fail-fast or aggregated.

use crate::error::{Error, Result};
use crate::state::{ResourceState, State};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Assertion run against the state after a step.
pub type Check = Box<dyn Fn(&State) -> Result<()> + Send + Sync>;

fn lookup<'a>(state: &'a State, address: &str) -> Result<&'a ResourceState> {
    state
        .resource(address)
        .ok_or_else(|| Error::assertion(address, "not found in state"))
}

/// `address.key == value`.
pub fn check_resource_attr(
    address: impl Into<String>,
    key: impl Into<String>,
    value: impl Into<String>,
) -> Check {
    let (address, key, value) = (address.into(), key.into(), value.into());
    Box::new(move |state: &State| {
        let resource = lookup(state, &address)?;
        match resource.attribute(&key) {
            Some(actual) if actual == value => Ok(()),
            Some(actual) => Err(Error::assertion(
                &address,
                format!("attribute '{key}' expected {value:?}, got {actual:?}"),
            )),
            None => Err(Error::assertion(
                &address,
                format!("attribute '{key}' expected {value:?}, but it is not set"),
            )),
        }
    })
}

/// `address.key` is present and non-empty.
pub fn check_resource_attr_set(address: impl Into<String>, key: impl Into<String>) -> Check {
    let (address, key) = (address.into(), key.into());
    Box::new(move |state: &State| {
        let resource = lookup(state, &address)?;
        match resource.attribute(&key) {
            Some(actual) if !actual.is_empty() => Ok(()),
            _ => Err(Error::assertion(
                &address,
                format!("attribute '{key}' expected to be set"),
            )),
        }
    })
}

/// `address.key` is absent.
pub fn check_no_resource_attr(address: impl Into<String>, key: impl Into<String>) -> Check {
    let (address, key) = (address.into(), key.into());
    Box::new(move |state: &State| {
        let resource = lookup(state, &address)?;
        match resource.attribute(&key) {
            None => Ok(()),
            Some(actual) => Err(Error::assertion(
                &address,
                format!("attribute '{key}' expected to be absent, got {actual:?}"),
            )),
        }
    })
}

/// `first.first_key == second.second_key`.
pub fn check_resource_attr_pair(
    first: impl Into<String>,
    first_key: impl Into<String>,
    second: impl Into<String>,
    second_key: impl Into<String>,
) -> Check {
    let (first, first_key) = (first.into(), first_key.into());
    let (second, second_key) = (second.into(), second_key.into());
    Box::new(move |state: &State| {
        let left = lookup(state, &first)?.attribute(&first_key);
        let right = lookup(state, &second)?.attribute(&second_key);
        if left == right {
            Ok(())
        } else {
            Err(Error::assertion(
                &first,
                format!(
                    "attribute '{first_key}' ({left:?}) does not match {second}.{second_key} ({right:?})"
                ),
            ))
        }
    })
}

/// The resource exists in state with a non-empty id.
pub fn check_resource_exists(address: impl Into<String>) -> Check {
    check_resource_attr_set(address, "id")
}

/// Run checks in order, stopping at the first failure.
#[must_use]
pub fn compose_checks(checks: Vec<Check>) -> Check {
    Box::new(move |state: &State| checks.iter().try_for_each(|check| check(state)))
}

/// Run every check and report all failures together.
#[must_use]
pub fn compose_aggregate_checks(checks: Vec<Check>) -> Check {
    Box::new(move |state: &State| {
        let failures: Vec<String> = checks
            .iter()
            .enumerate()
            .filter_map(|(i, check)| check(state).err().map(|e| format!("check {}: {e}", i + 1)))
            .collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::assertion(
                "aggregate",
                format!("{} check(s) failed:\n{}", failures.len(), failures.join("\n")),
            ))
        }
    })
}

// ============================================================================
// Id tracking
// ============================================================================

/// Remembers resource ids across steps to detect unexpected recreation.
///
/// ```ignore
/// let ids = IdTracker::new();
/// step1.check(ids.capture("oci_core_cpe.test_cpe"));
/// step2.check(ids.expect_same_id("oci_core_cpe.test_cpe"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct IdTracker {
    ids: Arc<Mutex<HashMap<String, String>>>,
}

impl IdTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last captured id for `address`.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<String> {
        self.ids
            .lock()
            .ok()
            .and_then(|ids| ids.get(address).cloned())
    }

    /// Record the current id of `address`.
    #[must_use]
    pub fn capture(&self, address: impl Into<String>) -> Check {
        let ids = Arc::clone(&self.ids);
        let address = address.into();
        Box::new(move |state: &State| {
            let id = lookup(state, &address)?.id.clone();
            ids.lock()
                .map_err(|_| Error::assertion(&address, "id tracker poisoned"))?
                .insert(address.clone(), id);
            Ok(())
        })
    }

    /// Fail if `address` has a different id than when it was captured.
    #[must_use]
    pub fn expect_same_id(&self, address: impl Into<String>) -> Check {
        self.compare(address.into(), true)
    }

    /// Fail if `address` kept the captured id (a force-new change should replace it).
    #[must_use]
    pub fn expect_new_id(&self, address: impl Into<String>) -> Check {
        self.compare(address.into(), false)
    }

    fn compare(&self, address: String, same: bool) -> Check {
        let ids = Arc::clone(&self.ids);
        Box::new(move |state: &State| {
            let current = lookup(state, &address)?.id.clone();
            let captured = ids
                .lock()
                .map_err(|_| Error::assertion(&address, "id tracker poisoned"))?
                .get(&address)
                .cloned()
                .ok_or_else(|| Error::assertion(&address, "no id captured"))?;
            match (same, captured == current) {
                (true, true) | (false, false) => Ok(()),
                (true, false) => Err(Error::assertion(
                    &address,
                    format!("resource recreated when it was supposed to be updated ({captured} -> {current})"),
                )),
                (false, true) => Err(Error::assertion(
                    &address,
                    format!("resource kept id {current} when it was supposed to be replaced"),
                )),
            }
        })
    }
}
