//! Unified error interface for elevate.
//!
//! Every error enum in the workspace implements [`ErrorCode`] so the
//! service layer can log a stable machine-readable code next to the
//! human-readable message, and so callers can tell a transient failure
//! (policy source unreachable, directory timeout) from a permanent one
//! (malformed policy, unknown group).
//!
//! # Example
//!
//! ```
//! use elevate_types::ErrorCode;
//!
//! #[derive(Debug)]
//! enum FetchError {
//!     Unreachable,
//!     Malformed,
//! }
//!
//! impl ErrorCode for FetchError {
//!     fn code(&self) -> &'static str {
//!         match self {
//!             Self::Unreachable => "FETCH_UNREACHABLE",
//!             Self::Malformed => "FETCH_MALFORMED",
//!         }
//!     }
//!
//!     fn is_recoverable(&self) -> bool {
//!         matches!(self, Self::Unreachable)
//!     }
//! }
//!
//! assert_eq!(FetchError::Unreachable.code(), "FETCH_UNREACHABLE");
//! assert!(!FetchError::Malformed.is_recoverable());
//! ```

/// Machine-readable error code interface.
///
/// # Code Format
///
/// - **UPPER_SNAKE_CASE**: e.g. `"POLICY_SCHEMA"`
/// - **Prefixed by crate concern**: `POLICY_`, `SUDO_`, `CONFIG_`, `DIRECTORY_`
/// - **Stable**: codes are written to the audit trail and must not change
///
/// # Recoverability
///
/// An error is recoverable when retrying later, or after the operator
/// fixes something outside the process, may succeed. A policy document
/// that fails validation is not recoverable until it is replaced; a
/// policy server that timed out is.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;

    /// Returns whether the error is recoverable.
    fn is_recoverable(&self) -> bool;
}

/// Validates that an error code follows the naming conventions.
///
/// # Panics
///
/// Panics with a descriptive message if the code is empty, lacks the
/// expected prefix, or is not UPPER_SNAKE_CASE.
///
/// # Example
///
/// ```
/// use elevate_types::{ErrorCode, assert_error_code};
///
/// #[derive(Debug)]
/// enum MyError { Timeout }
///
/// impl ErrorCode for MyError {
///     fn code(&self) -> &'static str { "MY_TIMEOUT" }
///     fn is_recoverable(&self) -> bool { true }
/// }
///
/// assert_error_code(&MyError::Timeout, "MY_");
/// ```
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "Error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "Error code '{}' must start with prefix '{}'",
        code,
        expected_prefix
    );
    assert!(
        is_upper_snake_case(code),
        "Error code '{}' must be UPPER_SNAKE_CASE",
        code
    );
}

/// Validates every error in `errors` with [`assert_error_code`].
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}
