//! Git integration module.
//!
//! Provides:
//! - [`RepoSpec`] wrapping git2 for bootstrap, fetch, stage, commit, push
//! - [`SyncError`] with the remote-branch-absent classification

pub mod error;
pub mod transport;

pub use error::{SyncError, Transience};
pub use transport::RepoSpec;
