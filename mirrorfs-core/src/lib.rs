//! # MirrorFS Core
//!
//! The core library for MirrorFS - a userspace filesystem that mirrors a real
//! directory tree and presents it through a pluggable transform pipeline.
//!
//! ## Overview
//!
//! Every name, mode and byte read through the mirror passes through a
//! [`Transform`]. When the pipeline also carries a [`ReverseTransform`],
//! edits made through the mirror are mapped back and written to the real
//! files. This is useful for:
//!
//! - Presenting encrypted or encoded trees in their decoded form
//! - Renaming entries on the fly without touching the source
//! - Exposing a read-only view of a live directory
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use mirrorfs_core::{MountContext, OpContext, Pipeline};
//! use std::ffi::OsStr;
//! use std::path::Path;
//!
//! fn example() -> mirrorfs_core::Result<()> {
//!     let mount = MountContext::new(Path::new("/source/directory"), Path::new("/mount/point"));
//!     let root = mount.root(Pipeline::clone_pipeline())?;
//!
//!     let op = OpContext::new();
//!     for entry in root.readdir(&op)? {
//!         println!("{:?}", entry.name);
//!     }
//!
//!     let node = root.lookup(&op, OsStr::new("notes.txt"))?;
//!     if let Some(file) = node.as_file() {
//!         let handle = file.open(&op)?;
//!         let head = handle.read(0, 64);
//!         println!("{} bytes", head.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`transform`]: the pipeline and the per-call contexts
//! - [`dir`]: directory listing and name resolution
//! - [`file`]: presented file content and write-back
//! - [`inode`]: stable inode numbers per real path
//! - [`mode`]: conversion between host metadata and native mode bits
//! - [`mount`]: state shared by one mount
//! - [`config`]: mount configuration
//! - [`error`]: error types and errno translation
//!
//! The kernel-facing FUSE front-end lives in `mirrorfs-linux`.

pub mod config;
pub mod dir;
pub mod error;
pub mod file;
pub mod inode;
pub mod mode;
pub mod mount;
pub mod node;
pub mod transform;

pub use config::{LogLevel, MirrorConfig, MirrorConfigBuilder};
pub use dir::{DirEntry, Directory};
pub use error::{MirrorError, Result, TransformError, TransformResult};
pub use file::{FileEntry, FileHandle};
pub use inode::{InodeRegistry, FIRST_INO, ROOT_INO};
pub use mode::{EntryKind, FileMode};
pub use mount::MountContext;
pub use node::{Node, NodeAttr};
pub use transform::{
    CloneTransform, EntryAttr, OpContext, Pipeline, ReverseTransform, Transform, TransformContext,
};
