//! Translation of configuration option strings into FUSE mount options.

use fuser::MountOption;
use mirrorfs_core::MirrorConfig;

/// Filesystem name used when no `fsname=` option is given.
pub const DEFAULT_FSNAME: &str = "mirrorfs";

/// Maps one option string onto a typed [`MountOption`].
///
/// Unknown options are forwarded verbatim as [`MountOption::CUSTOM`].
pub fn parse_option(option: &str) -> MountOption {
    match option {
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "default_permissions" => MountOption::DefaultPermissions,
        "auto_unmount" => MountOption::AutoUnmount,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        "dirsync" => MountOption::DirSync,
        other => {
            if let Some(name) = other.strip_prefix("fsname=") {
                MountOption::FSName(name.to_string())
            } else if let Some(subtype) = other.strip_prefix("subtype=") {
                MountOption::Subtype(subtype.to_string())
            } else {
                MountOption::CUSTOM(other.to_string())
            }
        }
    }
}

/// Builds the full option list for a mount.
///
/// Comma-separated entries are split, `FSName("mirrorfs")` is added unless
/// an `fsname=` is present, and a read-only config forces `RO` over any `rw`.
pub fn mount_options(config: &MirrorConfig) -> Vec<MountOption> {
    let mut options: Vec<MountOption> = config
        .options
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|option| !option.is_empty())
        .map(parse_option)
        .collect();

    if !options.iter().any(|o| matches!(o, MountOption::FSName(_))) {
        options.push(MountOption::FSName(DEFAULT_FSNAME.to_string()));
    }

    if config.read_only {
        options.retain(|o| *o != MountOption::RW);
        if !options.contains(&MountOption::RO) {
            options.push(MountOption::RO);
        }
    }

    options
}
