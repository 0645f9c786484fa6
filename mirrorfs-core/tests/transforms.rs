//! Mirrors built on non-trivial transforms.

use bytes::Bytes;
use mirrorfs_core::{
    EntryAttr, MirrorError, MountContext, OpContext, Pipeline, ReverseTransform, Transform,
    TransformContext, TransformError, TransformResult,
};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Presents `name` as `name.rot` and shifts every byte by one.
struct Rot;

impl Transform for Rot {
    fn transform_attr(
        &self,
        _ctx: &TransformContext,
        mut attr: EntryAttr,
    ) -> TransformResult<EntryAttr> {
        if !attr.mode.is_dir() {
            attr.name.push(".rot");
        }
        Ok(attr)
    }

    fn transform_content(&self, _ctx: &TransformContext, raw: Bytes) -> TransformResult<Bytes> {
        Ok(raw.iter().map(|b| b.wrapping_add(1)).collect::<Vec<u8>>().into())
    }
}

impl ReverseTransform for Rot {
    fn reverse_content(&self, _ctx: &TransformContext, presented: Bytes) -> TransformResult<Bytes> {
        Ok(presented.iter().map(|b| b.wrapping_sub(1)).collect::<Vec<u8>>().into())
    }
}

/// Upper-cases content; has no inverse.
struct Upper;

impl Transform for Upper {
    fn transform_attr(
        &self,
        _ctx: &TransformContext,
        attr: EntryAttr,
    ) -> TransformResult<EntryAttr> {
        Ok(attr)
    }

    fn transform_content(&self, _ctx: &TransformContext, raw: Bytes) -> TransformResult<Bytes> {
        Ok(raw.to_ascii_uppercase().into())
    }
}

/// Fails attributes while `armed`, and always fails content of `*.bad` files.
struct Failing {
    armed: AtomicBool,
}

impl Transform for Failing {
    fn transform_attr(
        &self,
        _ctx: &TransformContext,
        attr: EntryAttr,
    ) -> TransformResult<EntryAttr> {
        if self.armed.load(Ordering::SeqCst) {
            return Err(TransformError::new("listing refused"));
        }
        Ok(attr)
    }

    fn transform_content(&self, ctx: &TransformContext, raw: Bytes) -> TransformResult<Bytes> {
        if ctx.real_path().extension() == Some(OsStr::new("bad")) {
            return Err(TransformError::new("corrupt payload").with_errno(libc::EIO));
        }
        Ok(raw)
    }
}

/// Presents every regular file under the same name.
struct Colliding;

impl Transform for Colliding {
    fn transform_attr(
        &self,
        _ctx: &TransformContext,
        mut attr: EntryAttr,
    ) -> TransformResult<EntryAttr> {
        if !attr.mode.is_dir() {
            attr.name = OsString::from("same");
        }
        Ok(attr)
    }

    fn transform_content(&self, _ctx: &TransformContext, raw: Bytes) -> TransformResult<Bytes> {
        Ok(raw)
    }
}

fn fixture() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("a.txt"), b"hi").unwrap();
    fs::create_dir(dir.path().join("sub")).unwrap();
    dir
}

#[test]
fn test_reversible_renaming_transform() {
    let dir = fixture();
    let mount = MountContext::new(dir.path(), Path::new("/mnt/mirror"));
    let root = mount.root(Pipeline::read_write(Rot)).unwrap();
    let op = OpContext::new();

    let names: Vec<OsString> = root.readdir(&op).unwrap().into_iter().map(|e| e.name).collect();
    assert!(names.contains(&OsString::from("a.txt.rot")));
    assert!(names.contains(&OsString::from("sub")));

    let node = root.lookup(&op, OsStr::new("a.txt.rot")).unwrap();
    let file = node.as_file().unwrap();
    let mut handle = file.open(&op).unwrap();
    assert_eq!(handle.read(0, 2), &b"ij"[..]);

    handle.write(&op, 1, b"k").unwrap();
    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"hj");
    assert_eq!(file.open(&op).unwrap().read(0, 2), &b"ik"[..]);
}

#[test]
fn test_read_only_transform_refuses_writes() {
    let dir = fixture();
    let mount = MountContext::new(dir.path(), Path::new("/mnt/mirror"));
    let root = mount.root(Pipeline::read_only(Upper)).unwrap();
    let op = OpContext::new();

    let node = root.lookup(&op, OsStr::new("a.txt")).unwrap();
    let file = node.as_file().unwrap();
    assert!(!file.is_writable());

    let mut handle = file.open(&op).unwrap();
    assert_eq!(handle.read(0, 2), &b"HI"[..]);

    let err = handle.write(&op, 0, b"yo").unwrap_err();
    assert!(matches!(err, MirrorError::ReadOnly { .. }));
    let err = handle.set_len(&op, 0).unwrap_err();
    assert!(matches!(err, MirrorError::ReadOnly { .. }));
    let err = file.set_len(&op, 10).unwrap_err();
    assert_eq!(err.errno(), libc::EROFS);

    assert_eq!(fs::read(dir.path().join("a.txt")).unwrap(), b"hi");
}

#[test]
fn test_failed_listing_keeps_previous_cache() {
    let dir = fixture();
    let mount = MountContext::new(dir.path(), Path::new("/mnt/mirror"));
    let failing = Arc::new(Failing {
        armed: AtomicBool::new(false),
    });
    let root = mount.root(Pipeline::ReadOnly(failing.clone())).unwrap();
    let op = OpContext::new();

    assert_eq!(root.readdir(&op).unwrap().len(), 2);

    failing.armed.store(true, Ordering::SeqCst);
    let err = root.readdir(&op).unwrap_err();
    assert!(matches!(err, MirrorError::Transform { .. }));
    assert_eq!(err.errno(), libc::ENOENT);

    // cache miss forces a refresh, whose failure is reported as is
    let err = root.lookup(&op, OsStr::new("new.txt")).unwrap_err();
    assert!(matches!(err, MirrorError::Transform { .. }));

    failing.armed.store(false, Ordering::SeqCst);
    assert!(root.lookup(&op, OsStr::new("a.txt")).is_ok());
}

#[test]
fn test_content_transform_errno_is_kept() {
    let dir = fixture();
    fs::write(dir.path().join("x.bad"), b"???").unwrap();
    let mount = MountContext::new(dir.path(), Path::new("/mnt/mirror"));
    let root = mount
        .root(Pipeline::ReadOnly(Arc::new(Failing {
            armed: AtomicBool::new(false),
        })))
        .unwrap();
    let op = OpContext::new();

    let node = root.lookup(&op, OsStr::new("x.bad")).unwrap();
    let err = node.as_file().unwrap().open(&op).unwrap_err();
    assert_eq!(err.errno(), libc::EIO);
    assert!(err.to_string().contains("corrupt payload"));
}

#[test]
fn test_colliding_names_keep_one_entry() {
    let dir = fixture();
    fs::write(dir.path().join("b.txt"), b"bee").unwrap();
    let mount = MountContext::new(dir.path(), Path::new("/mnt/mirror"));
    let root = mount.root(Pipeline::read_only(Colliding)).unwrap();
    let op = OpContext::new();

    let entries = root.readdir(&op).unwrap();
    let same: Vec<_> = entries.iter().filter(|e| e.name == "same").collect();
    assert_eq!(same.len(), 1);
    assert_eq!(entries.len(), 2);

    // lookup resolves to whichever real file won the listing
    let node = root.lookup(&op, OsStr::new("same")).unwrap();
    assert_eq!(node.ino(), same[0].ino);
    let winner = node.real_path().file_name().unwrap().to_owned();
    assert!(winner == "a.txt" || winner == "b.txt");
}

#[test]
fn test_transform_sees_context() {
    struct PathEcho;

    impl Transform for PathEcho {
        fn transform_attr(
            &self,
            ctx: &TransformContext,
            attr: EntryAttr,
        ) -> TransformResult<EntryAttr> {
            if ctx.presented_path() != Path::new("/mnt/mirror") {
                return Err(TransformError::new("unexpected directory").with_errno(libc::EINVAL));
            }
            Ok(attr)
        }

        fn transform_content(&self, ctx: &TransformContext, _raw: Bytes) -> TransformResult<Bytes> {
            let relative = ctx.real_path().strip_prefix(ctx.mount_root()).unwrap();
            Ok(Bytes::from(relative.to_string_lossy().into_owned()))
        }
    }

    let dir = fixture();
    let mount = MountContext::new(dir.path(), Path::new("/mnt/mirror"));
    let root = mount.root(Pipeline::read_only(PathEcho)).unwrap();
    let op = OpContext::new();

    let node = root.lookup(&op, OsStr::new("a.txt")).unwrap();
    let handle = node.as_file().unwrap().open(&op).unwrap();
    assert_eq!(handle.read(0, 64), &b"a.txt"[..]);
}
