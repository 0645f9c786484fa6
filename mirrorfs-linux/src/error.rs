use mirrorfs_core::MirrorError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while setting up or running a FUSE mount.
#[derive(Debug, Error)]
pub enum MountError {
    #[error(transparent)]
    Core(#[from] MirrorError),

    #[error("Failed to mount {}: {source}", .mount_point.display())]
    MountFailed {
        mount_point: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, MountError>;
