//! Stable inode numbers for real paths.

use dashmap::DashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Inode of the mount root, as fixed by the FUSE protocol.
pub const ROOT_INO: u64 = 1;

/// First number handed out by [`InodeRegistry`]. Everything below is reserved.
pub const FIRST_INO: u64 = 10;

/// Maps canonical real paths to inode numbers for the lifetime of a mount.
///
/// Numbers grow monotonically and are never reclaimed, so memory grows with
/// the number of distinct paths ever seen.
#[derive(Debug)]
pub struct InodeRegistry {
    next: AtomicU64,
    by_path: DashMap<PathBuf, u64>,
}

impl InodeRegistry {
    /// Creates an empty registry. Call once per mount.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(FIRST_INO),
            by_path: DashMap::new(),
        }
    }

    /// Returns the inode for `path`, allocating one on first sight.
    pub fn ino(&self, path: &Path) -> u64 {
        let key = canonical(path);
        if let Some(ino) = self.by_path.get(&key) {
            return *ino;
        }
        *self
            .by_path
            .entry(key)
            .or_insert_with(|| self.next.fetch_add(1, Ordering::SeqCst))
    }

    /// Returns the inode for `path` without allocating.
    pub fn get(&self, path: &Path) -> Option<u64> {
        self.by_path.get(&canonical(path)).map(|ino| *ino)
    }

    /// Number of paths registered so far.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Returns true if no path has been registered.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}

impl Default for InodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Lexically normalizes a path by dropping `.` and resolving `..`.
fn canonical(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                }
            }
            _ => components.push(component),
        }
    }

    components.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_first_ino_is_above_reserved_range() {
        let registry = InodeRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.ino(Path::new("/src/a")), FIRST_INO);
        assert_eq!(registry.ino(Path::new("/src/b")), FIRST_INO + 1);
    }

    #[test]
    fn test_same_path_same_ino() {
        let registry = InodeRegistry::new();
        let a = registry.ino(Path::new("/src/a"));
        let b = registry.ino(Path::new("/src/b"));

        assert_ne!(a, b);
        assert_eq!(registry.ino(Path::new("/src/a")), a);
        assert_eq!(registry.get(Path::new("/src/b")), Some(b));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_canonical_forms_share_ino() {
        let registry = InodeRegistry::new();
        let ino = registry.ino(Path::new("/src/dir/file"));

        assert_eq!(registry.ino(Path::new("/src/./dir/file")), ino);
        assert_eq!(registry.ino(Path::new("/src/other/../dir/file")), ino);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_does_not_allocate() {
        let registry = InodeRegistry::new();
        assert_eq!(registry.get(Path::new("/src/missing")), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_concurrent_allocation_is_unique() {
        let registry = Arc::new(InodeRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let registry = registry.clone();
                thread::spawn(move || {
                    (0..100)
                        .map(|i| {
                            // every thread also touches a shared path
                            registry.ino(Path::new("/src/shared"));
                            registry.ino(&PathBuf::from(format!("/src/{}/{}", t, i)))
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for ino in handle.join().unwrap() {
                assert!(seen.insert(ino), "duplicate inode {}", ino);
            }
        }

        let shared = registry.get(Path::new("/src/shared")).unwrap();
        assert!(!seen.contains(&shared));
        assert_eq!(registry.len(), 801);
    }
}
