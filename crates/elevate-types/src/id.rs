//! Invocation identifiers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlates the log lines and the audit record of one sudo call.
///
/// # Example
///
/// ```
/// use elevate_types::InvocationId;
///
/// let a = InvocationId::new();
/// let b = InvocationId::new();
/// assert_ne!(a, b);
/// assert!(a.to_string().starts_with("inv:"));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(pub Uuid);

#[allow(clippy::new_without_default)]
impl InvocationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "inv:{}", self.0)
    }
}
