//! Domain types and models

pub mod asset;
pub mod credential;
pub mod cursor;
pub mod event;

pub use asset::{AssetRef, AssignmentRecord, VersionedPage};
pub use credential::{Credential, SecretToken, TenantKey};
pub use cursor::SearchCursor;
pub use event::{Event, EventKey, EventMetadata, TimeRange};
