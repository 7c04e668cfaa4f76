//! Core types for elevate.
//!
//! Leaf crate of the workspace: identities, the stable result-code
//! taxonomy, and the small value types shared by policy evaluation and
//! the service runtime.
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  elevate-types   : UserName, ResultCode, TriState  ◄── HERE  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  elevate-policy  : document model, attribute chain, store   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  elevate-auth    : collaborator traits, authorization engine│
//! ├─────────────────────────────────────────────────────────────┤
//! │  elevate-runtime : grant manager, credentials, sudo service │
//! ├─────────────────────────────────────────────────────────────┤
//! │  elevate-cli     : `elevate` binary                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use elevate_types::{ResultCode, TriState, UserName};
//!
//! let user: UserName = "HOST\\alice".parse().unwrap();
//! assert_eq!(user.name(), "alice");
//!
//! assert_eq!(ResultCode::CommandNotAllowed.code(), 1);
//! assert!(TriState::Unset.unwrap_or(true));
//! ```

mod error;
mod id;
mod identity;
mod logging;
mod result;
mod tristate;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::InvocationId;
pub use identity::{GroupName, NameError, UserName};
pub use logging::LoggingLevel;
pub use result::{AuditClass, ResultCode};
pub use tristate::TriState;
