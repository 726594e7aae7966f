//! Core traits and types for the storage gateway's unified filesystem.

pub mod backend;
pub mod entry;
pub mod error;
pub mod link;
pub mod mount;
pub mod operations;
pub mod path;
pub mod session;

pub use backend::{ByteStream, DriverCapabilities, DriverCapabilityBit, DriverContext, StorageDriver};
pub use entry::{DirectoryListing, FileEntry};
pub use error::{CfkError, CfkResult};
pub use link::{LinkKind, LinkOutcome};
pub use mount::{Mount, StorageConfig, WebdavPolicy};
pub use path::VirtualPath;
pub use session::{SessionStatus, UploadSession, UploadSessionInit, UploadStrategy};
