//! FUSE front-end dispatching kernel requests into the mirror core.

use crate::error::{MountError, Result};
use crate::options::mount_options;
use dashmap::DashMap;
use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use mirrorfs_core::{
    Directory, EntryKind, FileHandle, MirrorConfig, MirrorError, MountContext, Node, NodeAttr,
    OpContext, Pipeline, ROOT_INO,
};
use std::ffi::OsStr;
use std::fs;
use std::os::unix::ffi::OsStrExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

const BLOCK_SIZE: u32 = 512;

/// Maps a mirrored entry kind to the FUSE file type.
pub fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Regular => FileType::RegularFile,
        EntryKind::Directory => FileType::Directory,
        EntryKind::Symlink => FileType::Symlink,
        EntryKind::NamedPipe => FileType::NamedPipe,
        EntryKind::Socket => FileType::Socket,
        EntryKind::BlockDevice => FileType::BlockDevice,
        EntryKind::CharDevice => FileType::CharDevice,
    }
}

/// Converts core attributes to the form the kernel expects.
pub fn file_attr(attr: &NodeAttr, uid: u32, gid: u32) -> FileAttr {
    let kind = file_type(attr.kind());
    FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: (attr.size + BLOCK_SIZE as u64 - 1) / BLOCK_SIZE as u64,
        atime: attr.modified,
        mtime: attr.modified,
        ctime: attr.modified,
        crtime: UNIX_EPOCH,
        kind,
        perm: (attr.mode & 0o7777) as u16,
        nlink: if kind == FileType::Directory { 2 } else { 1 },
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

fn wants_write(flags: i32) -> bool {
    flags & libc::O_ACCMODE != libc::O_RDONLY
}

/// A mounted mirror.
///
/// Nodes are registered by inode as the kernel looks them up and dropped
/// once the kernel forgets every lookup; open handles own their presented
/// buffers until released.
pub struct MirrorFs {
    mount: Arc<MountContext>,
    pipeline: Pipeline,
    nodes: DashMap<u64, Node>,
    parents: DashMap<u64, u64>,
    lookups: DashMap<u64, u64>,
    handles: DashMap<u64, FileHandle>,
    next_handle: AtomicU64,
    ttl: Duration,
    uid: u32,
    gid: u32,
}

impl MirrorFs {
    /// Creates the filesystem and registers the root directory.
    pub fn new(mount: Arc<MountContext>, pipeline: Pipeline, ttl: Duration) -> Result<Self> {
        let root = mount.root(pipeline.clone())?;
        let nodes = DashMap::new();
        nodes.insert(ROOT_INO, Node::Directory(Arc::new(root)));
        let parents = DashMap::new();
        parents.insert(ROOT_INO, ROOT_INO);

        Ok(Self {
            mount,
            pipeline,
            nodes,
            parents,
            lookups: DashMap::new(),
            handles: DashMap::new(),
            next_handle: AtomicU64::new(1),
            ttl,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        })
    }

    /// Creates the filesystem described by `config`.
    ///
    /// A read-only config strips the write capability from `pipeline`.
    pub fn from_config(config: &MirrorConfig, pipeline: Pipeline) -> Result<Self> {
        config.check()?;
        let pipeline = if config.read_only {
            pipeline.into_read_only()
        } else {
            pipeline
        };
        Self::new(
            MountContext::from_config(config),
            pipeline,
            Duration::from_secs(config.attr_ttl_secs),
        )
    }

    /// Shared mount state.
    pub fn mount_context(&self) -> &Arc<MountContext> {
        &self.mount
    }

    /// Returns true if writes can be accepted.
    pub fn is_writable(&self) -> bool {
        self.pipeline.is_writable()
    }

    /// Number of open file handles.
    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    /// Number of nodes the kernel currently holds, the root included.
    pub fn known_nodes(&self) -> usize {
        self.nodes.len()
    }

    fn node(&self, ino: u64) -> std::result::Result<Node, i32> {
        self.nodes.get(&ino).map(|n| n.value().clone()).ok_or(libc::ENOENT)
    }

    fn directory(&self, ino: u64) -> std::result::Result<Arc<Directory>, i32> {
        match self.node(ino)? {
            Node::Directory(dir) => Ok(dir),
            Node::File(_) => Err(libc::ENOTDIR),
        }
    }

    /// Registers a looked-up node. A known directory keeps its existing
    /// node so its name cache survives; files are replaced with the fresh
    /// lookup result.
    fn register(&self, parent: u64, node: Node) -> Node {
        let ino = node.ino();
        self.parents.insert(ino, parent);
        let mut slot = self.nodes.entry(ino).or_insert_with(|| node.clone());
        if let (Node::Directory(_), Node::Directory(_)) = (slot.value(), &node) {
            return slot.value().clone();
        }
        *slot = node.clone();
        node
    }

    fn attr_of(&self, node: &Node, op: &OpContext) -> FileAttr {
        let attr = match node {
            Node::Directory(dir) => dir.getattr(),
            Node::File(file) => file.getattr(op),
        };
        file_attr(&attr, self.uid, self.gid)
    }

    /// Resolves `name` under `parent` and counts one kernel lookup of it.
    fn resolve(&self, parent: u64, name: &OsStr) -> std::result::Result<FileAttr, i32> {
        let dir = self.directory(parent)?;
        let op = OpContext::new();
        let node = dir
            .lookup(&op, name)
            .map_err(|e| self.errno("lookup", parent, &e))?;
        let node = self.register(parent, node);
        *self.lookups.entry(node.ino()).or_insert(0) += 1;
        Ok(self.attr_of(&node, &op))
    }

    fn attr(&self, ino: u64) -> std::result::Result<FileAttr, i32> {
        let node = self.node(ino)?;
        Ok(self.attr_of(&node, &OpContext::new()))
    }

    /// Drops `nlookup` kernel references to `ino`, unregistering the node
    /// once none remain. The inode number itself stays allocated.
    fn forget_node(&self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }
        let remaining = match self.lookups.get_mut(&ino) {
            Some(mut count) => {
                *count = count.saturating_sub(nlookup);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            self.lookups.remove(&ino);
            self.nodes.remove(&ino);
            self.parents.remove(&ino);
        }
    }

    fn errno(&self, op: &str, ino: u64, err: &MirrorError) -> i32 {
        let errno = err.errno();
        if errno == libc::ENOENT {
            debug!(op, ino, error = %err, "request failed");
        } else {
            warn!(op, ino, errno, error = %err, "request failed");
        }
        errno
    }
}

impl Filesystem for MirrorFs {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        debug!(parent, name = ?name, "lookup");
        match self.resolve(parent, name) {
            Ok(attr) => reply.entry(&self.ttl, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn forget(&mut self, _req: &Request, ino: u64, nlookup: u64) {
        debug!(ino, nlookup, "forget");
        self.forget_node(ino, nlookup);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        debug!(ino, "getattr");
        match self.attr(ino) {
            Ok(attr) => reply.attr(&self.ttl, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        debug!(ino, ?size, ?fh, "setattr");
        let node = match self.node(ino) {
            Ok(node) => node,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let op = OpContext::new();

        // only size changes reach the real file
        let Some(size) = size else {
            reply.attr(&self.ttl, &self.attr_of(&node, &op));
            return;
        };

        let file = match &node {
            Node::File(file) => file,
            Node::Directory(_) => {
                reply.error(libc::EISDIR);
                return;
            }
        };

        let resized = match fh.and_then(|fh| self.handles.get_mut(&fh)) {
            Some(mut handle) => handle.set_len(&op, size),
            None => file.set_len(&op, size),
        };

        match resized {
            Ok(attr) => reply.attr(&self.ttl, &file_attr(&attr, self.uid, self.gid)),
            Err(e) => reply.error(self.errno("setattr", ino, &e)),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        debug!(ino, "readlink");
        let node = match self.node(ino) {
            Ok(node) => node,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        match node.as_file() {
            Some(file) if file.attr().mode.kind == EntryKind::Symlink => {
                match fs::read_link(file.real_path()) {
                    Ok(target) => reply.data(target.as_os_str().as_bytes()),
                    Err(e) => {
                        let err = MirrorError::Io {
                            path: file.real_path().to_path_buf(),
                            source: e,
                        };
                        reply.error(self.errno("readlink", ino, &err));
                    }
                }
            }
            _ => reply.error(libc::EINVAL),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, flags: i32, reply: ReplyOpen) {
        debug!(ino, flags, "open");
        let file = match self.node(ino) {
            Ok(Node::File(file)) => file,
            Ok(Node::Directory(_)) => {
                reply.error(libc::EISDIR);
                return;
            }
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        if wants_write(flags) && !file.is_writable() {
            reply.error(libc::EROFS);
            return;
        }

        match file.open(&OpContext::new()) {
            Ok(handle) => {
                let fh = self.next_handle.fetch_add(1, Ordering::SeqCst);
                self.handles.insert(fh, handle);
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(self.errno("open", ino, &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock: Option<u64>,
        reply: ReplyData,
    ) {
        debug!(ino, fh, offset, size, "read");
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        match self.handles.get(&fh) {
            Some(handle) if handle.file().ino() == ino => {
                reply.data(&handle.read(offset as u64, size as u64));
            }
            _ => reply.error(libc::EBADF),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        debug!(ino, fh, offset, len = data.len(), "write");
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }

        let written = match self.handles.get_mut(&fh) {
            Some(mut handle) if handle.file().ino() == ino => {
                handle.write(&OpContext::new(), offset as u64, data)
            }
            _ => {
                reply.error(libc::EBADF);
                return;
            }
        };

        match written {
            Ok(n) => reply.written(n as u32),
            Err(e) => reply.error(self.errno("write", ino, &e)),
        }
    }

    fn flush(&mut self, _req: &Request, _ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        // every write is already on disk
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request, _ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        debug!(ino, fh, "release");
        self.handles.remove(&fh);
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        debug!(ino, offset, "readdir");
        let dir = match self.directory(ino) {
            Ok(dir) => dir,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        let listed = match dir.readdir(&OpContext::new()) {
            Ok(listed) => listed,
            Err(e) => {
                reply.error(self.errno("readdir", ino, &e));
                return;
            }
        };

        let parent = self.parents.get(&ino).map(|p| *p).unwrap_or(ROOT_INO);
        let mut entries = vec![
            (ino, FileType::Directory, OsStr::new(".").to_os_string()),
            (parent, FileType::Directory, OsStr::new("..").to_os_string()),
        ];
        entries.extend(
            listed
                .into_iter()
                .map(|e| (e.ino, file_type(EntryKind::from_native(e.mode)), e.name)),
        );

        for (i, (entry_ino, kind, name)) in entries.iter().enumerate().skip(offset as usize) {
            if reply.add(*entry_ino, (i + 1) as i64, *kind, name) {
                break;
            }
        }
        reply.ok();
    }
}

/// Mounts the mirror and serves requests until it is unmounted.
pub fn mount(fs: MirrorFs, config: &MirrorConfig) -> Result<()> {
    fuser::mount2(fs, &config.target, &mount_options(config)).map_err(|source| {
        MountError::MountFailed {
            mount_point: config.target.clone(),
            source,
        }
    })
}

/// Mounts the mirror on a background thread.
///
/// Dropping the returned session unmounts the filesystem.
pub fn spawn_mount(fs: MirrorFs, config: &MirrorConfig) -> Result<fuser::BackgroundSession> {
    fuser::spawn_mount2(fs, &config.target, &mount_options(config)).map_err(|source| {
        MountError::MountFailed {
            mount_point: config.target.clone(),
            source,
        }
    })
}
