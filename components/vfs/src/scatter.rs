use std::{fs, io, path::Path};

use snafu::ResultExt;
use tracing::debug;
use vbsfs_common::CHUNK_SUFFIX_DIGITS;
use vbsfs_types::chunk::{Chunk, Chunks};
use vbsfs_utils::pattern::chunk_pattern;

use crate::err::{Result, UnknownIOSnafu};

/// Collect every piece of a scattered recording across the given
/// mountpoints. Each mountpoint keeps its pieces in an independent
/// `<mountpoint>/<recording>/` subdirectory, so they are walked in turn.
pub(crate) fn scan_recording<P: AsRef<Path>>(recname: &str, mountpoints: &[P]) -> Result<Chunks> {
    let mut chunks = Chunks::new();
    for mountpoint in mountpoints {
        scan_mountpoint(recname, mountpoint.as_ref(), &mut chunks)?;
    }
    Ok(chunks)
}

fn scan_mountpoint(recname: &str, mountpoint: &Path, chunks: &mut Chunks) -> Result<()> {
    let dir = mountpoint.join(recname);
    match fs::symlink_metadata(&dir) {
        Ok(meta) if meta.is_dir() => scan_directory(recname, &dir, chunks),
        // a mountpoint without this recording, or with something else
        // squatting on the name, simply contributes nothing
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            debug!("lstat fails on {} - {}", dir.display(), e);
            Ok(())
        }
    }
}

fn scan_directory(recname: &str, dir: &Path, chunks: &mut Chunks) -> Result<()> {
    let is_chunk = chunk_pattern(recname);
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("opendir fails on {} - {}", dir.display(), e);
            return Ok(());
        }
    };
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("readdir fails in {} - {}", dir.display(), e);
                return Ok(());
            }
        };
        let name = entry.file_name();
        let name = match name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if !is_chunk.is_match(name) {
            continue;
        }
        let number: u32 = name[name.len() - CHUNK_SUFFIX_DIGITS..]
            .parse()
            .expect("suffix is eight decimal digits");
        let size = fs::metadata(entry.path()).context(UnknownIOSnafu)?.len();
        chunks.insert(Chunk::scattered(entry.path(), number, size))?;
    }
    Ok(())
}
