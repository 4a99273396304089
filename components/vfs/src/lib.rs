//! A scattered, multi-disk recording presented as one contiguous read-only
//! byte stream.
//!
//! A recording lands on disk in one of two layouts: *scattered*, one file
//! per chunk under `<mountpoint>/<recording>/`, or *packed*, one block file
//! per mountpoint named `<mountpoint>/<recording>`. [open_scattered] and
//! [open_block] locate every piece across the given mountpoints, stitch
//! them into a virtual file, and hand back a handle for POSIX-shaped
//! [read], [seek] and [close]. C callers get the same surface through
//! [ffi].

mod block;
mod err;
pub mod ffi;
mod file;
mod handle;
mod scatter;

use std::path::Path;

use snafu::ensure;

use crate::{
    err::{InvalidArgumentSnafu, NotFoundSnafu},
    file::VirtualFile,
    handle::HandleTable,
};
use vbsfs_types::chunk::Chunks;

pub use crate::err::{Error, Result};
pub use crate::file::Whence;
pub use vbsfs_common::Handle;

/// Open a recording stored as one file per chunk. Fails with
/// [Error::NotFound] when no mountpoint holds any piece of it.
pub fn open_scattered<P: AsRef<Path> + Sync>(
    recording: &str,
    mountpoints: &[P],
) -> Result<Handle> {
    ensure!(
        !recording.is_empty() && !mountpoints.is_empty(),
        InvalidArgumentSnafu
    );
    install(recording, scatter::scan_recording(recording, mountpoints)?)
}

/// Open a recording packed into one block file per mountpoint. Mountpoints
/// are scanned in parallel; files in a stale or foreign format are skipped.
pub fn open_block<P: AsRef<Path> + Sync>(recording: &str, mountpoints: &[P]) -> Result<Handle> {
    ensure!(
        !recording.is_empty() && !mountpoints.is_empty(),
        InvalidArgumentSnafu
    );
    install(recording, block::scan_recording(recording, mountpoints)?)
}

fn install(recording: &str, chunks: Chunks) -> Result<Handle> {
    ensure!(!chunks.is_empty(), NotFoundSnafu { name: recording });
    Ok(HandleTable::global().install(VirtualFile::new(chunks)))
}

/// Read up to `buf.len()` bytes from the current position. A short count
/// signals the end of the stream or a chunk that failed mid-way; the next
/// call may retry.
pub fn read(handle: Handle, buf: &mut [u8]) -> Result<usize> {
    HandleTable::global().with_file(handle, |file| file.read(buf))
}

/// Reposition the stream, lseek(2)-style. Positions past the end are legal;
/// reads from there return 0.
pub fn seek(handle: Handle, offset: i64, whence: Whence) -> Result<u64> {
    HandleTable::global().with_file(handle, |file| file.seek(offset, whence))?
}

/// Release the handle and every descriptor its recording held.
pub fn close(handle: Handle) -> Result<()> {
    HandleTable::global().remove(handle)
}
