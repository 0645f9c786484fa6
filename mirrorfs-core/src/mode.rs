//! Portable file-type/permission encoding and its translation to native
//! `st_mode` bits.
//!
//! Transforms work with [`FileMode`]; the kernel-facing layer only ever sees
//! the `u32` produced by [`FileMode::to_native`].

use std::fs::{FileType, Metadata};
use std::os::unix::fs::{FileTypeExt, PermissionsExt};

const PERM_MASK: u32 = 0o777;
const WRITE_BITS: u32 = 0o222;

/// The type of a mirrored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// FIFO
    NamedPipe,
    /// Unix domain socket
    Socket,
    /// Block device
    BlockDevice,
    /// Character device
    CharDevice,
}

impl EntryKind {
    /// Classifies a std file type.
    pub fn from_file_type(file_type: FileType) -> Self {
        if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_fifo() {
            EntryKind::NamedPipe
        } else if file_type.is_socket() {
            EntryKind::Socket
        } else if file_type.is_block_device() {
            EntryKind::BlockDevice
        } else if file_type.is_char_device() {
            EntryKind::CharDevice
        } else {
            EntryKind::Regular
        }
    }

    /// Recovers the kind from native mode bits. Unknown type bits read as regular.
    pub fn from_native(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => EntryKind::Directory,
            m if m == libc::S_IFLNK as u32 => EntryKind::Symlink,
            m if m == libc::S_IFIFO as u32 => EntryKind::NamedPipe,
            m if m == libc::S_IFSOCK as u32 => EntryKind::Socket,
            m if m == libc::S_IFBLK as u32 => EntryKind::BlockDevice,
            m if m == libc::S_IFCHR as u32 => EntryKind::CharDevice,
            _ => EntryKind::Regular,
        }
    }

    fn native_bits(self) -> u32 {
        let bits = match self {
            EntryKind::Regular => libc::S_IFREG,
            EntryKind::Directory => libc::S_IFDIR,
            EntryKind::Symlink => libc::S_IFLNK,
            EntryKind::NamedPipe => libc::S_IFIFO,
            EntryKind::Socket => libc::S_IFSOCK,
            EntryKind::BlockDevice => libc::S_IFBLK,
            EntryKind::CharDevice => libc::S_IFCHR,
        };
        bits as u32
    }
}

/// File type plus permission bits in a platform-agnostic form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileMode {
    /// Entry type
    pub kind: EntryKind,
    /// Owner/group/other rwx bits
    pub perm: u32,
    /// Set-user-id bit
    pub setuid: bool,
    /// Set-group-id bit
    pub setgid: bool,
    /// Sticky bit
    pub sticky: bool,
}

impl FileMode {
    /// Creates a mode with the given kind and rwx bits and no special bits.
    pub fn new(kind: EntryKind, perm: u32) -> Self {
        Self {
            kind,
            perm: perm & PERM_MASK,
            setuid: false,
            setgid: false,
            sticky: false,
        }
    }

    /// Reads the mode of a real entry. Use `symlink_metadata` to keep links as links.
    pub fn from_metadata(metadata: &Metadata) -> Self {
        let raw = metadata.permissions().mode();
        Self {
            kind: EntryKind::from_file_type(metadata.file_type()),
            perm: raw & PERM_MASK,
            setuid: raw & libc::S_ISUID as u32 != 0,
            setgid: raw & libc::S_ISGID as u32 != 0,
            sticky: raw & libc::S_ISVTX as u32 != 0,
        }
    }

    /// Returns true for directories.
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Returns a copy with every write bit cleared.
    pub fn without_write(mut self) -> Self {
        self.perm &= !WRITE_BITS;
        self
    }

    /// Encodes the mode as native `st_mode` bits.
    pub fn to_native(&self) -> u32 {
        let mut mode = self.kind.native_bits() | (self.perm & PERM_MASK);
        if self.setuid {
            mode |= libc::S_ISUID as u32;
        }
        if self.setgid {
            mode |= libc::S_ISGID as u32;
        }
        if self.sticky {
            mode |= libc::S_ISVTX as u32;
        }
        mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_native_type_bits() {
        let cases = [
            (EntryKind::Regular, libc::S_IFREG as u32),
            (EntryKind::Directory, libc::S_IFDIR as u32),
            (EntryKind::Symlink, libc::S_IFLNK as u32),
            (EntryKind::NamedPipe, libc::S_IFIFO as u32),
            (EntryKind::Socket, libc::S_IFSOCK as u32),
            (EntryKind::BlockDevice, libc::S_IFBLK as u32),
            (EntryKind::CharDevice, libc::S_IFCHR as u32),
        ];

        for (kind, bits) in cases {
            let native = FileMode::new(kind, 0o640).to_native();
            assert_eq!(native & libc::S_IFMT as u32, bits, "{:?}", kind);
            assert_eq!(native & 0o777, 0o640);
            assert_eq!(EntryKind::from_native(native), kind);
        }
    }

    #[test]
    fn test_char_and_block_devices_differ() {
        let chr = FileMode::new(EntryKind::CharDevice, 0o600).to_native();
        let blk = FileMode::new(EntryKind::BlockDevice, 0o600).to_native();
        assert_ne!(chr, blk);
    }

    #[test]
    fn test_special_bits_are_encoded() {
        let mut mode = FileMode::new(EntryKind::Directory, 0o1777);
        assert_eq!(mode.perm, 0o777);
        mode.sticky = true;
        mode.setgid = true;

        let native = mode.to_native();
        assert_ne!(native & libc::S_ISVTX as u32, 0);
        assert_ne!(native & libc::S_ISGID as u32, 0);
        assert_eq!(native & libc::S_ISUID as u32, 0);
    }

    #[test]
    fn test_without_write() {
        let mode = FileMode::new(EntryKind::Regular, 0o664).without_write();
        assert_eq!(mode.perm, 0o444);
    }

    #[test]
    fn test_from_metadata() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"hi").unwrap();
        fs::set_permissions(&file, fs::Permissions::from_mode(0o640)).unwrap();

        let mode = FileMode::from_metadata(&fs::symlink_metadata(&file).unwrap());
        assert_eq!(mode.kind, EntryKind::Regular);
        assert_eq!(mode.perm, 0o640);

        let mode = FileMode::from_metadata(&fs::symlink_metadata(dir.path()).unwrap());
        assert!(mode.is_dir());

        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&file, &link).unwrap();
        let mode = FileMode::from_metadata(&fs::symlink_metadata(&link).unwrap());
        assert_eq!(mode.kind, EntryKind::Symlink);
    }
}
