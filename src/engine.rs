//! Apply-engine boundary.
//!
//! The harness never plans or applies configuration itself. An [`ApplyEngine`]
//! takes complete configuration text, converges real (or replayed)
//! infrastructure to it, and reports the resulting flat state.

use crate::error::Result;
use crate::state::{ResourceState, State};

/// The declarative-configuration engine the lifecycle driver runs against.
///
/// Implementations decide create vs. update vs. replace by diffing against
/// their own prior state; the driver only observes the result.
pub trait ApplyEngine {
    /// Converge to `config` and return the full resulting state.
    fn apply(&mut self, config: &str) -> Result<State>;

    /// Re-acquire `address` from its live identifier, without configuration.
    fn import(&mut self, address: &str, id: &str) -> Result<ResourceState>;

    /// Destroy everything created so far.
    fn destroy(&mut self) -> Result<()>;

    /// State after the most recent operation.
    fn state(&self) -> &State;
}
