//! Local filesystem service for the omniterm host.
//!
//! Exposes a small set of validated, quota-enforced operations (stat, list,
//! read/write text, create, delete, batch-open) against the host filesystem.
//! Writes are atomic: the target is replaced via a same-directory temp file
//! and rename, so readers observe either the old or the new contents.
//!
//! The service is stateless and safe for concurrent use; every operation
//! honors a [`CancellationToken`](tokio_util::sync::CancellationToken).

mod error;
mod path;
mod service;

pub use error::FsError;
pub use path::{is_filesystem_root, resolve_absolute};
pub use service::{FsConfig, FsService, ListEntry, ReadResult, StatResult};
