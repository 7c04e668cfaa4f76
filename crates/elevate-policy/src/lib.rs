//! Policy documents for elevate.
//!
//! - [`model`]: the document tree (users, user groups, commands,
//!   command groups, defaults)
//! - [`attributes`]: typed attribute resolution along the inheritance
//!   chain
//! - [`schema`]: strict parsing plus semantic validation
//! - [`feed`]: central CSV feed import
//! - [`store`]: primary source / cache policy and atomic publication
//!
//! # Example
//!
//! ```
//! use elevate_policy::{parse_document, PolicyFormat, UserNode, DEFAULT_SCHEMA};
//!
//! let body = r#"{
//!     "schema": "urn:elevate:policy:v1",
//!     "allowAllCommands": false,
//!     "users": [ { "name": "HOST\\bob", "allowAllCommands": true } ]
//! }"#;
//! let doc = parse_document(body, PolicyFormat::Json, DEFAULT_SCHEMA, "inline").unwrap();
//! let bob = UserNode::listed(&doc, &"host\\BOB".parse().unwrap()).unwrap();
//! assert_eq!(
//!     bob.attribute::<elevate_policy::attributes::AllowAllCommands>(true),
//!     Some(true)
//! );
//! ```

pub mod attributes;
mod error;
pub mod feed;
pub mod model;
pub mod schema;
pub mod source;
pub mod store;
mod values;

pub use attributes::{CommandNode, CommandOrigin, Principal, UserNode};
pub use error::PolicyError;
pub use feed::import_csv;
pub use model::{
    CommandEntry, CommandGroupEntry, PolicyDocument, UserEntry, UserGroupEntry, DEFAULT_SCHEMA,
};
pub use schema::{parse_document, validate, PolicyFormat};
pub use source::{FileSource, HttpSource, PolicySource, RawPolicy};
pub use store::{CacheState, LoadOrigin, PolicyStore, PolicyStoreConfig};
pub use values::{AllowedNetworks, ArgumentSpec, Md5Checksum, NetworkRule, TimeOfDay, TimeWindow};
