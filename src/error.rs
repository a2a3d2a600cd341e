use thiserror::Error;

use crate::core::CoreError;
use crate::git::SyncError;

/// Crate-level convenience error: a thin wrapper over the capability
/// errors, not a god type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
