//! File content through the transform pipeline.
//!
//! Opening a file reads it whole and runs the content transform once. The
//! resulting presented buffer belongs to the [`FileHandle`]; reads slice it,
//! writes and resizes edit a copy of it, persist the reverse-transformed
//! copy over the real file and then adopt it. Two handles on the same path
//! never share a buffer: the last one to write back wins.

use crate::error::{MirrorError, Result};
use crate::mode::EntryKind;
use crate::mount::MountContext;
use crate::node::NodeAttr;
use crate::transform::{EntryAttr, OpContext, Pipeline, TransformContext};
use bytes::Bytes;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// A mirrored non-directory entry.
#[derive(Debug, Clone)]
pub struct FileEntry {
    ino: u64,
    real_path: PathBuf,
    presented_path: PathBuf,
    attr: EntryAttr,
    pipeline: Pipeline,
    mount: Arc<MountContext>,
}

impl FileEntry {
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

    /// Presented attributes from the lookup that created this entry.
    pub fn attr(&self) -> &EntryAttr {
        &self.attr
    }

    /// Returns true if writes through this entry can succeed.
    pub fn is_writable(&self) -> bool {
        self.pipeline.is_writable()
    }

    fn context(&self, op: &OpContext) -> TransformContext {
        TransformContext::new(&self.real_path, &self.presented_path, self.mount.source(), op)
    }

    fn presented_mode(&self) -> u32 {
        if self.pipeline.is_writable() {
            self.attr.mode.to_native()
        } else {
            self.attr.mode.without_write().to_native()
        }
    }

    /// Reads the real file and materializes its presented content.
    pub fn open(&self, op: &OpContext) -> Result<FileHandle> {
        let raw = fs::read(&self.real_path).map_err(|e| MirrorError::io(&self.real_path, e))?;
        let data = self
            .pipeline
            .forward()
            .transform_content(&self.context(op), Bytes::from(raw))
            .map_err(|e| MirrorError::transform(&self.real_path, e))?;

        debug!(real = %self.real_path.display(), ino = self.ino, size = data.len(), "open");
        Ok(FileHandle {
            file: self.clone(),
            data,
        })
    }

    /// Attributes known from the lookup, without touching content.
    ///
    /// The size is the one the attribute transform reported, which for
    /// content-changing transforms may differ from the presented length.
    pub fn lookup_attr(&self) -> NodeAttr {
        NodeAttr {
            ino: self.ino,
            size: self.attr.len,
            mode: self.presented_mode(),
            modified: self.attr.modified,
        }
    }

    /// Attributes without an open handle.
    ///
    /// Regular files are opened to learn their presented size. If the
    /// content cannot be read or transformed the lookup attributes are
    /// reported instead; the failure surfaces at [`open`](Self::open).
    pub fn getattr(&self, op: &OpContext) -> NodeAttr {
        if self.attr.mode.kind != EntryKind::Regular {
            return self.lookup_attr();
        }
        match self.open(op) {
            Ok(handle) => handle.getattr(),
            Err(e) => {
                debug!(real = %self.real_path.display(), error = %e, "getattr without content");
                self.lookup_attr()
            }
        }
    }

    /// Resizes the presented content through a transient handle.
    pub fn set_len(&self, op: &OpContext, size: u64) -> Result<NodeAttr> {
        if !self.pipeline.is_writable() {
            return Err(MirrorError::read_only(&self.real_path));
        }
        self.open(op)?.set_len(op, size)
    }
}

/// An open file: the presented content of one [`FileEntry`].
#[derive(Debug)]
pub struct FileHandle {
    file: FileEntry,
    data: Bytes,
}

impl FileHandle {
    /// The entry this handle was opened from.
    pub fn file(&self) -> &FileEntry {
        &self.file
    }

    /// Presented content length.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the presented content is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns up to `len` presented bytes starting at `offset`.
    ///
    /// Ranges past the end are clamped; an empty range yields no bytes.
    pub fn read(&self, offset: u64, len: u64) -> Bytes {
        slice(&self.data, offset, len)
    }

    /// Attributes of the presented content.
    ///
    /// Write bits are cleared unless the pipeline can write back.
    pub fn getattr(&self) -> NodeAttr {
        NodeAttr {
            ino: self.file.ino,
            size: self.data.len() as u64,
            mode: self.file.presented_mode(),
            modified: self.file.attr.modified,
        }
    }

    /// Writes `data` at `offset` in presented space and persists the result.
    ///
    /// A gap between the current end and `offset` is zero-filled. Returns
    /// the number of bytes accepted.
    pub fn write(&mut self, op: &OpContext, offset: u64, data: &[u8]) -> Result<usize> {
        self.ensure_writable()?;

        let start = to_index(offset)?;
        let end = start
            .checked_add(data.len())
            .ok_or_else(|| {
                MirrorError::InvalidArgument(format!("write past {} overflows", offset))
            })?;

        let mut next = self.data.to_vec();
        if next.len() < end {
            next.resize(end, 0);
        }
        next[start..end].copy_from_slice(data);

        self.commit(op, next)?;
        debug!(real = %self.file.real_path.display(), offset, len = data.len(), "write");
        Ok(data.len())
    }

    /// Grows (zero-filled) or truncates the presented content and persists it.
    pub fn set_len(&mut self, op: &OpContext, size: u64) -> Result<NodeAttr> {
        self.ensure_writable()?;

        let mut next = self.data.to_vec();
        next.resize(to_index(size)?, 0);

        self.commit(op, next)?;
        debug!(real = %self.file.real_path.display(), size, "setattr");
        Ok(self.getattr())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.file.pipeline.is_writable() {
            Ok(())
        } else {
            Err(MirrorError::read_only(&self.file.real_path))
        }
    }

    /// Reverse-transforms `next`, overwrites the real file, then adopts `next`.
    fn commit(&mut self, op: &OpContext, next: Vec<u8>) -> Result<()> {
        let reverse = self
            .file
            .pipeline
            .reverse()
            .ok_or_else(|| MirrorError::read_only(&self.file.real_path))?;

        let next = Bytes::from(next);
        let raw = reverse
            .reverse_content(&self.file.context(op), next.clone())
            .map_err(|e| MirrorError::transform(&self.file.real_path, e))?;
        fs::write(&self.file.real_path, &raw)
            .map_err(|e| MirrorError::io(&self.file.real_path, e))?;

        self.data = next;
        Ok(())
    }
}

fn to_index(value: u64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| MirrorError::InvalidArgument(format!("offset {} out of range", value)))
}

fn slice(data: &Bytes, offset: u64, len: u64) -> Bytes {
    let size = data.len() as u64;
    let end = offset.saturating_add(len);
    if offset >= size || offset >= end {
        return Bytes::new();
    }
    data.slice(offset as usize..end.min(size) as usize)
}
