//! # MirrorFS Linux
//!
//! FUSE mount front-end for MirrorFS. [`MirrorFs`] implements
//! [`fuser::Filesystem`] on top of `mirrorfs-core`: it keeps the inode and
//! handle tables the kernel refers to and turns core errors into errno
//! replies.

pub mod error;
pub mod fuse;
pub mod options;

pub use error::{MountError, Result};
pub use fuse::{mount, spawn_mount, MirrorFs};
pub use options::{mount_options, parse_option};
