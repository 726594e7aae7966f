//! Mount resolution, driver construction, and the filesystem facade that
//! ties them to the persistence and caching services in `cfk-cache`.
//!
//! This is the layer both the HTTP/JSON API and the WebDAV server dispatch
//! through: everything downstream of "which mount owns this path" lives
//! here, everything about how a request arrived (headers, auth, WebDAV
//! framing) stays in the server crate.

pub mod credentials;
pub mod driver_factory;
pub mod facade;
pub mod repository;
pub mod resolver;

pub use credentials::{CredentialCipher, NoopCipher};
pub use facade::FileSystem;
pub use repository::{MountRepository, SledRepository, StorageConfigRepository};
pub use resolver::{MountManager, Resolution};
