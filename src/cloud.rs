//! Cloud API client boundary and destroy verification.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lifecycle states that count as gone.
pub const TERMINAL_LIFECYCLE_STATES: [&str; 2] = ["DELETED", "TERMINATED"];

/// Minimal view of a live resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lifecycle_state: Option<String>,
}

impl ResourceSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
            lifecycle_state: None,
        }
    }

    #[must_use]
    pub fn with_lifecycle_state(mut self, state: impl Into<String>) -> Self {
        self.lifecycle_state = Some(state.into());
        self
    }

    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.lifecycle_state
            .as_deref()
            .is_some_and(|s| TERMINAL_LIFECYCLE_STATES.contains(&s))
    }
}

/// Typed list/get/delete access to one cloud, keyed by resource kind.
///
/// Errors carrying a status code use [`Error::Api`]; a 404 from `get` means
/// the resource does not exist.
pub trait CloudClient: Send + Sync {
    fn list(&self, kind: &str, compartment_id: &str) -> Result<Vec<ResourceSummary>>;

    fn get(&self, kind: &str, id: &str) -> Result<ResourceSummary>;

    fn delete(&self, kind: &str, id: &str) -> Result<()>;
}

/// Confirm every id of `kind` is gone after destroy.
///
/// A 404 or a terminal lifecycle state is success. A live resource is
/// [`Error::Destroy`]; any other error is returned as-is.
pub fn check_destroyed<S: AsRef<str>>(
    client: &dyn CloudClient,
    kind: &str,
    ids: &[S],
) -> Result<()> {
    for id in ids {
        let id = id.as_ref();
        match client.get(kind, id) {
            Ok(resource) if resource.is_terminated() => {
                debug!(kind, id, state = ?resource.lifecycle_state, "resource terminated");
            }
            Ok(resource) => {
                return Err(Error::destroy(format!(
                    "{kind} {id} still exists in state {}",
                    resource.lifecycle_state.as_deref().unwrap_or("UNKNOWN")
                )));
            }
            Err(err) if err.is_not_found() => {
                debug!(kind, id, "resource not found");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}
