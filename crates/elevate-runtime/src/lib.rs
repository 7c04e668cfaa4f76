//! Runtime for elevate: grants, logons, audit and the sudo service.
//!
//! # Crate Architecture
//!
//! ```text
//! elevate-auth     (AuthorizationEngine, Membership, collaborator traits)
//!        ↑
//! elevate-runtime ◄── THIS CRATE
//!   ├── config       ServiceConfig, ConfigLoader (TOML + ELEVATE_* env)
//!   ├── grant        GrantManager: reference-counted privileges-group leases
//!   ├── credentials  CredentialsCache: logon cache, invalid-logon counter
//!   ├── audit        AuditLogger and sinks (tracing, JSON lines)
//!   ├── phase        Elevation lifecycle
//!   └── service      SudoService: sudo / unsudo orchestration
//!        ↑
//! elevate-cli
//! ```
//!
//! # Example
//!
//! ```ignore
//! use elevate_runtime::{config::ConfigLoader, Backends, SudoRequest, SudoService};
//!
//! let config = ConfigLoader::new().load()?;
//! let service = SudoService::from_config(&config, backends)?;
//! let outcome = service
//!     .sudo(SudoRequest::new(user, secret, "build.exe", "--release"))
//!     .await;
//! println!("{} ({})", outcome.result, outcome.result.code());
//! ```

pub mod audit;
pub mod config;
mod credentials;
mod error;
mod grant;
mod phase;
mod service;

pub use audit::{AuditLogger, AuditRecord, AuditSink, JsonLinesAuditSink, TracingAuditSink};
pub use credentials::{CredentialPolicy, CredentialsCache};
pub use error::ServiceError;
pub use grant::{GrantKey, GrantLease, GrantManager, UnsudoOutcome};
pub use phase::{Elevation, ElevationPhase, InvalidTransition};
pub use service::{quote_msi_package, Backends, SudoOutcome, SudoRequest, SudoService};
