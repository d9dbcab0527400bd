use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] wishsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No queued action with id {0}")]
    ActionNotFound(i64),
    #[error(
        "Sync is not configured. Set WISHSYNC_ENDPOINT (and optionally WISHSYNC_AUTH_TOKEN) to enable `wishsync drain`."
    )]
    SyncNotConfigured,
}
