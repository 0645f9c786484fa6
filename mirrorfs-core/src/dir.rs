//! Directory listing and name resolution through the transform pipeline.
//!
//! Each [`Directory`] keeps a presented-name to real-name cache. The cache
//! is replaced by every successful [`Directory::readdir`]; a lookup that
//! misses it triggers exactly one refresh before giving up.

use crate::error::{MirrorError, Result};
use crate::file::FileEntry;
use crate::mount::MountContext;
use crate::node::{Node, NodeAttr};
use crate::transform::{EntryAttr, OpContext, Pipeline, TransformContext};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// One entry returned by [`Directory::readdir`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    /// Presented name
    pub name: OsString,
    /// Native `st_mode` bits of the presented entry
    pub mode: u32,
    /// Inode of the real child
    pub ino: u64,
}

/// A mirrored directory.
#[derive(Debug)]
pub struct Directory {
    ino: u64,
    real_path: PathBuf,
    presented_path: PathBuf,
    attr: EntryAttr,
    pipeline: Pipeline,
    mount: Arc<MountContext>,
    names: RwLock<HashMap<OsString, OsString>>,
}

impl Directory {
    pub(crate) fn new(
        ino: u64,
        real_path: PathBuf,
        presented_path: PathBuf,
        attr: EntryAttr,
        pipeline: Pipeline,
        mount: Arc<MountContext>,
    ) -> Self {
        Self {
            ino,
            real_path,
            presented_path,
            attr,
            pipeline,
            mount,
            names: RwLock::new(HashMap::new()),
        }
    }

    /// Inode number.
    pub fn ino(&self) -> u64 {
        self.ino
    }

    /// Real on-disk path.
    pub fn real_path(&self) -> &Path {
        &self.real_path
    }

    /// Presented path inside the mount.
    pub fn presented_path(&self) -> &Path {
        &self.presented_path
    }

    /// Presented attributes.
    pub fn attr(&self) -> &EntryAttr {
        &self.attr
    }

    /// Pipeline shared with every child.
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Attributes reported to the kernel.
    pub fn getattr(&self) -> NodeAttr {
        NodeAttr {
            ino: self.ino,
            size: self.attr.len,
            mode: self.attr.mode.to_native(),
            modified: self.attr.modified,
        }
    }

    fn context(&self, op: &OpContext) -> TransformContext {
        TransformContext::new(&self.real_path, &self.presented_path, self.mount.source(), op)
    }

    fn cached(&self, name: &OsStr) -> Option<OsString> {
        self.names.read().get(name).cloned()
    }

    /// Lists the real directory through the attribute transform.
    ///
    /// Entries come back in the order the real listing yields them. When two
    /// real entries present the same name the later one replaces the earlier.
    /// Any failure aborts the whole listing and leaves the name cache as it was.
    pub fn readdir(&self, op: &OpContext) -> Result<Vec<DirEntry>> {
        let ctx = self.context(op);
        let entries =
            fs::read_dir(&self.real_path).map_err(|e| MirrorError::io(&self.real_path, e))?;

        let mut names: HashMap<OsString, OsString> = HashMap::new();
        let mut listed: Vec<DirEntry> = Vec::new();

        for entry in entries {
            let entry = entry.map_err(|e| MirrorError::io(&self.real_path, e))?;
            let real_child = entry.path();
            let metadata = entry.metadata().map_err(|e| MirrorError::io(&real_child, e))?;

            let attr = EntryAttr::from_metadata(entry.file_name(), &metadata);
            let presented = self
                .pipeline
                .forward()
                .transform_attr(&ctx, attr)
                .map_err(|e| MirrorError::transform(&real_child, e))?;

            if let Some(previous) = names.insert(presented.name.clone(), entry.file_name()) {
                warn!(
                    dir = %self.presented_path.display(),
                    name = ?presented.name,
                    replaced = ?previous,
                    "presented name collision, keeping the later entry"
                );
                listed.retain(|e| e.name != presented.name);
            }

            listed.push(DirEntry {
                mode: presented.mode.to_native(),
                ino: self.mount.inodes().ino(&real_child),
                name: presented.name,
            });
        }

        *self.names.write() = names;
        debug!(real = %self.real_path.display(), entries = listed.len(), "readdir");
        Ok(listed)
    }

    /// Resolves a presented child name to a node.
    ///
    /// The real child is re-read and re-transformed on every call; if the
    /// transform no longer yields `name` the lookup fails as not found.
    pub fn lookup(&self, op: &OpContext, name: &OsStr) -> Result<Node> {
        let real_name = match self.cached(name) {
            Some(real_name) => real_name,
            None => {
                self.readdir(op)?;
                self.cached(name)
                    .ok_or_else(|| MirrorError::not_found(&self.presented_path.join(name)))?
            }
        };

        let real_child = self.real_path.join(&real_name);
        let metadata =
            fs::symlink_metadata(&real_child).map_err(|e| MirrorError::io(&real_child, e))?;

        let attr = EntryAttr::from_metadata(real_name, &metadata);
        let presented = self
            .pipeline
            .forward()
            .transform_attr(&self.context(op), attr)
            .map_err(|e| MirrorError::transform(&real_child, e))?;

        let presented_path = self.presented_path.join(name);
        if presented.name.as_os_str() != name {
            warn!(
                real = %real_child.display(),
                requested = ?name,
                presented = ?presented.name,
                "transform no longer yields the requested name"
            );
            return Err(MirrorError::not_found(&presented_path));
        }

        let ino = self.mount.inodes().ino(&real_child);
        debug!(real = %real_child.display(), presented = %presented_path.display(), ino, "lookup");

        let node = if presented.mode.is_dir() {
            Node::Directory(Arc::new(Directory::new(
                ino,
                real_child,
                presented_path,
                presented,
                self.pipeline.clone(),
                self.mount.clone(),
            )))
        } else {
            Node::File(FileEntry::new(
                ino,
                real_child,
                presented_path,
                presented,
                self.pipeline.clone(),
                self.mount.clone(),
            ))
        };
        Ok(node)
    }
}
