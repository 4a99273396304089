use std::{os::unix::fs::MetadataExt, path::Path};

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;

lazy_static! {
    static ref DISK_DIR: Regex = Regex::new("^disk[0-9]+$").expect("fixed pattern compiles");
}

/// True iff `entry` names a per-disk mountpoint: the basename is `disk<N>`
/// and the entry itself (symlinks not followed) is a directory we can read
/// and descend into.
pub fn is_mountpoint<P: AsRef<Path>>(entry: P) -> bool {
    let entry = entry.as_ref();
    let name = match entry.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };
    if !DISK_DIR.is_match(name) {
        return false;
    }
    let meta = match std::fs::symlink_metadata(entry) {
        Ok(meta) => meta,
        Err(e) => {
            debug!("lstat fails on {} - {}", entry.display(), e);
            return false;
        }
    };
    meta.is_dir()
        && meta.mode() & libc::S_IRUSR as u32 != 0
        && meta.mode() & libc::S_IXUSR as u32 != 0
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn accepts_only_disk_n_directories() {
        let root = tempfile::tempdir().unwrap();
        for dir in ["disk0", "disk12345", "disks", "disk", "Disk1", "disk1x"] {
            fs::create_dir(root.path().join(dir)).unwrap();
        }
        assert!(is_mountpoint(root.path().join("disk0")));
        assert!(is_mountpoint(root.path().join("disk12345")));
        assert!(!is_mountpoint(root.path().join("disks")));
        assert!(!is_mountpoint(root.path().join("disk")));
        assert!(!is_mountpoint(root.path().join("Disk1")));
        assert!(!is_mountpoint(root.path().join("disk1x")));
    }

    #[test]
    fn rejects_plain_files_and_missing_entries() {
        let root = tempfile::tempdir().unwrap();
        fs::File::create(root.path().join("disk1")).unwrap();
        assert!(!is_mountpoint(root.path().join("disk1")));
        assert!(!is_mountpoint(root.path().join("disk2")));
    }

    #[test]
    fn does_not_follow_symlinks() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("real")).unwrap();
        std::os::unix::fs::symlink(root.path().join("real"), root.path().join("disk3")).unwrap();
        assert!(!is_mountpoint(root.path().join("disk3")));
    }
}
