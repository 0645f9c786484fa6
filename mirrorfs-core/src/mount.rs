//! Per-mount shared state.

use crate::config::MirrorConfig;
use crate::dir::Directory;
use crate::error::{MirrorError, Result};
use crate::inode::{InodeRegistry, ROOT_INO};
use crate::transform::{EntryAttr, Pipeline};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// State shared by every node of one mount.
///
/// Created once when the mount starts; the inode registry it owns starts
/// empty and lives as long as the mount.
#[derive(Debug)]
pub struct MountContext {
    source: PathBuf,
    mount_point: PathBuf,
    inodes: InodeRegistry,
}

impl MountContext {
    /// Creates the context for mirroring `source` at `mount_point`.
    pub fn new(source: &Path, mount_point: &Path) -> Arc<Self> {
        Arc::new(Self {
            source: source.to_path_buf(),
            mount_point: mount_point.to_path_buf(),
            inodes: InodeRegistry::new(),
        })
    }

    /// Creates the context described by a configuration.
    pub fn from_config(config: &MirrorConfig) -> Arc<Self> {
        Self::new(&config.source, &config.target)
    }

    /// Real root directory being mirrored.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Where the mirror is presented.
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }

    /// Inode registry of this mount.
    pub fn inodes(&self) -> &InodeRegistry {
        &self.inodes
    }

    /// Builds the root directory node.
    ///
    /// The root itself is never renamed; its mode comes straight from the
    /// real source directory.
    pub fn root(self: &Arc<Self>, pipeline: Pipeline) -> Result<Directory> {
        let metadata = fs::metadata(&self.source).map_err(|e| MirrorError::io(&self.source, e))?;
        if !metadata.is_dir() {
            return Err(MirrorError::InvalidArgument(format!(
                "source {} is not a directory",
                self.source.display()
            )));
        }

        info!(
            source = %self.source.display(),
            mount_point = %self.mount_point.display(),
            writable = pipeline.is_writable(),
            "mirror root ready"
        );

        let attr = EntryAttr::from_metadata(OsString::new(), &metadata);
        Ok(Directory::new(
            ROOT_INO,
            self.source.clone(),
            self.mount_point.clone(),
            attr,
            pipeline,
            self.clone(),
        ))
    }
}
