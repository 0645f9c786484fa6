//! Nodes produced by directory lookups.

use crate::dir::Directory;
use crate::file::FileEntry;
use crate::mode::EntryKind;
use crate::transform::EntryAttr;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

/// Attributes reported for a node or an open handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttr {
    /// Inode number
    pub ino: u64,
    /// Presented size in bytes
    pub size: u64,
    /// Native `st_mode` bits
    pub mode: u32,
    /// Last modification time of the real entry
    pub modified: SystemTime,
}

impl NodeAttr {
    /// Entry type encoded in `mode`.
    pub fn kind(&self) -> EntryKind {
        EntryKind::from_native(self.mode)
    }
}

/// A resolved child: either a directory or anything else.
#[derive(Debug, Clone)]
pub enum Node {
    /// Directory node; shared so its name cache survives across callers.
    Directory(Arc<Directory>),
    /// Regular file, symlink or special file.
    File(FileEntry),
}

impl Node {
    /// Inode number of the node.
    pub fn ino(&self) -> u64 {
        match self {
            Node::Directory(dir) => dir.ino(),
            Node::File(file) => file.ino(),
        }
    }

    /// Presented attributes from the lookup that created the node.
    pub fn attr(&self) -> &EntryAttr {
        match self {
            Node::Directory(dir) => dir.attr(),
            Node::File(file) => file.attr(),
        }
    }

    /// Real on-disk path.
    pub fn real_path(&self) -> &Path {
        match self {
            Node::Directory(dir) => dir.real_path(),
            Node::File(file) => file.real_path(),
        }
    }

    /// Presented path inside the mount.
    pub fn presented_path(&self) -> &Path {
        match self {
            Node::Directory(dir) => dir.presented_path(),
            Node::File(file) => file.presented_path(),
        }
    }

    /// Returns the directory, if this is one.
    pub fn as_directory(&self) -> Option<&Arc<Directory>> {
        match self {
            Node::Directory(dir) => Some(dir),
            Node::File(_) => None,
        }
    }

    /// Returns the file entry, if this is one.
    pub fn as_file(&self) -> Option<&FileEntry> {
        match self {
            Node::Directory(_) => None,
            Node::File(file) => Some(file),
        }
    }
}
