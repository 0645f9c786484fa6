//! The transform pipeline: how real names, modes and bytes are presented.
//!
//! A mirror is built from a [`Transform`] (attributes and content) and,
//! optionally, a [`ReverseTransform`] that maps edited content back to the
//! bytes stored on disk. Only a [`Pipeline::ReadWrite`] pipeline accepts
//! writes.
//!
//! The reverse transform must invert `transform_content`. Writes persist
//! `reverse_content(edited)` and keep `edited` as the presented view
//! without running the forward transform again, so a pair that is not a
//! true inverse silently diverges from what a fresh open would show.

use crate::error::TransformResult;
use crate::mode::FileMode;
use bytes::Bytes;
use std::ffi::OsString;
use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;

/// Per-call state supplied by the caller of a core operation.
#[derive(Debug, Clone, Default)]
pub struct OpContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl OpContext {
    /// Creates a context with a fresh token and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the given cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Sets an absolute deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Token that cancels the call.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Deadline for the call, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

/// Immutable context handed to every transform invocation.
///
/// For attribute transforms `real_path` and `presented_path` name the
/// directory being listed; for content transforms they name the file.
#[derive(Debug, Clone)]
pub struct TransformContext {
    real_path: PathBuf,
    presented_path: PathBuf,
    mount_root: PathBuf,
    op: OpContext,
}

impl TransformContext {
    /// Creates a context for one operation.
    pub fn new(real_path: &Path, presented_path: &Path, mount_root: &Path, op: &OpContext) -> Self {
        Self {
            real_path: real_path.to_path_buf(),
            presented_path: presented_path.to_path_buf(),
            mount_root: mount_root.to_path_buf(),
            op: op.clone(),
        }
    }

    /// Real on-disk path.
    pub fn real_path(&self) -> &Path {
        &self.real_path
    }

    /// Path as presented in the mirror.
    pub fn presented_path(&self) -> &Path {
        &self.presented_path
    }

    /// Real root directory being mirrored.
    pub fn mount_root(&self) -> &Path {
        &self.mount_root
    }

    /// Returns true once the triggering call is cancelled or past its deadline.
    ///
    /// The core never checks this; long-running transforms may.
    pub fn is_cancelled(&self) -> bool {
        self.op.cancel.is_cancelled()
            || self.op.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Name and metadata of an entry, as seen before and after an attribute transform.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryAttr {
    /// Entry name
    pub name: OsString,
    /// Type and permission bits
    pub mode: FileMode,
    /// Size in bytes of the real entry
    pub len: u64,
    /// Last modification time
    pub modified: SystemTime,
}

impl EntryAttr {
    /// Builds the attributes of a real entry from its `symlink_metadata`.
    pub fn from_metadata(name: OsString, metadata: &Metadata) -> Self {
        Self {
            name,
            mode: FileMode::from_metadata(metadata),
            len: metadata.len(),
            modified: metadata.modified().unwrap_or(UNIX_EPOCH),
        }
    }
}

/// Maps real attributes and content to their presented form.
pub trait Transform: Send + Sync {
    /// Maps a real entry's name and mode to what readers see.
    ///
    /// Must keep the entry kind meaningful; directories presented as files
    /// (or the reverse) are resolved as whatever kind is returned.
    fn transform_attr(&self, ctx: &TransformContext, attr: EntryAttr) -> TransformResult<EntryAttr>;

    /// Maps a whole file's on-disk bytes to the presented bytes.
    fn transform_content(&self, ctx: &TransformContext, raw: Bytes) -> TransformResult<Bytes>;
}

/// Maps presented content back to on-disk bytes.
pub trait ReverseTransform: Send + Sync {
    /// Inverse of [`Transform::transform_content`].
    fn reverse_content(&self, ctx: &TransformContext, presented: Bytes) -> TransformResult<Bytes>;
}

/// A transform together with its write capability.
#[derive(Clone)]
pub enum Pipeline {
    /// Presents content; every write is refused.
    ReadOnly(Arc<dyn Transform>),
    /// Presents content and persists edits through the reverse transform.
    ReadWrite {
        forward: Arc<dyn Transform>,
        reverse: Arc<dyn ReverseTransform>,
    },
}

impl Pipeline {
    /// Wraps a transform without write support.
    pub fn read_only<T>(transform: T) -> Self
    where
        T: Transform + 'static,
    {
        Pipeline::ReadOnly(Arc::new(transform))
    }

    /// Wraps a transform that can also invert its content mapping.
    pub fn read_write<T>(transform: T) -> Self
    where
        T: Transform + ReverseTransform + 'static,
    {
        let transform = Arc::new(transform);
        Pipeline::ReadWrite {
            forward: transform.clone(),
            reverse: transform,
        }
    }

    /// The default pass-through pipeline, fully writable.
    pub fn clone_pipeline() -> Self {
        Self::read_write(CloneTransform)
    }

    /// Drops the write capability, keeping the forward transform.
    pub fn into_read_only(self) -> Self {
        match self {
            Pipeline::ReadOnly(forward) | Pipeline::ReadWrite { forward, .. } => {
                Pipeline::ReadOnly(forward)
            }
        }
    }

    /// The forward transform.
    pub fn forward(&self) -> &dyn Transform {
        match self {
            Pipeline::ReadOnly(forward) | Pipeline::ReadWrite { forward, .. } => forward.as_ref(),
        }
    }

    /// The reverse transform, present only for writable pipelines.
    pub fn reverse(&self) -> Option<&dyn ReverseTransform> {
        match self {
            Pipeline::ReadOnly(_) => None,
            Pipeline::ReadWrite { reverse, .. } => Some(reverse.as_ref()),
        }
    }

    /// Returns true if the pipeline accepts writes.
    pub fn is_writable(&self) -> bool {
        self.reverse().is_some()
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pipeline::ReadOnly(_) => f.write_str("Pipeline::ReadOnly"),
            Pipeline::ReadWrite { .. } => f.write_str("Pipeline::ReadWrite"),
        }
    }
}

/// Identity transform: names, modes and bytes pass through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloneTransform;

impl Transform for CloneTransform {
    fn transform_attr(
        &self,
        _ctx: &TransformContext,
        attr: EntryAttr,
    ) -> TransformResult<EntryAttr> {
        Ok(attr)
    }

    fn transform_content(&self, _ctx: &TransformContext, raw: Bytes) -> TransformResult<Bytes> {
        Ok(raw)
    }
}

impl ReverseTransform for CloneTransform {
    fn reverse_content(&self, _ctx: &TransformContext, presented: Bytes) -> TransformResult<Bytes> {
        Ok(presented)
    }
}
