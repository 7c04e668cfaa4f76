//! Authorization for elevate.
//!
//! # Crate Architecture
//!
//! ```text
//! elevate-types   (UserName, ResultCode, TriState, LoggingLevel)
//!        ↑
//! elevate-policy  (PolicyDocument, UserNode, CommandNode, PolicyStore)
//!        ↑
//! elevate-auth  ◄── THIS CRATE
//!   ├── AuthorizationEngine   policy decisions
//!   ├── Membership            AddRemoveUser over a DirectoryProvider
//!   └── collaborator traits   AuthenticationProvider, DirectoryProvider,
//!                             ProcessLauncher, HostInfo, CommandFiles
//!        ↑
//! elevate-runtime (grant manager, credentials cache, audit, SudoService)
//! ```
//!
//! The OS-specific collaborators are traits only. Real implementations
//! are supplied by the embedding service; [`testing`] has in-memory
//! fakes.

mod decision;
mod engine;
mod error;
mod files;
mod membership;
mod provider;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use decision::{CommandDecision, DenyReason, UserInfo, Verdict};
pub use engine::{AuthorizationEngine, AuthorizationProvider};
pub use error::{AuthError, DirectoryError, LaunchError, SudoError};
pub use files::{is_shell_builtin, CommandFiles, LocalFiles, PROBE_EXTENSIONS};
pub use membership::{Membership, MembershipOp};
pub use provider::{
    AccountKind, AuthenticationProvider, DirectoryEntry, DirectoryProvider, DirectoryScope,
    HostInfo, LaunchRequest, ProcessHandle, ProcessLauncher, SystemHost,
};
