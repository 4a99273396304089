//! The C-compatible surface: the same open/read/seek/close semantics with
//! return-value-plus-errno reporting, for callers that treat a recording
//! handle like a file descriptor.

use std::ffi::CStr;

use libc::{c_char, c_int, c_void, off_t, size_t, ssize_t};
use vbsfs_types::{Errno, ToErrno};

use crate::{
    err::{BadAddressSnafu, BadHandleSnafu, Result},
    file::Whence,
    handle::HandleTable,
};

fn set_errno(errno: Errno) {
    // SAFETY: libc hands out a valid thread-local errno slot.
    unsafe { *libc::__errno_location() = errno }
}

fn report<T>(result: Result<T>, fail_value: T) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            set_errno(e.to_errno());
            fail_value
        }
    }
}

unsafe fn collect_args(
    recname: *const c_char,
    rootdirs: *const *const c_char,
) -> Option<(String, Vec<String>)> {
    if recname.is_null() || rootdirs.is_null() {
        return None;
    }
    let name = CStr::from_ptr(recname).to_string_lossy().into_owned();
    let mut mountpoints = Vec::new();
    let mut cursor = rootdirs;
    while !(*cursor).is_null() {
        mountpoints.push(CStr::from_ptr(*cursor).to_string_lossy().into_owned());
        cursor = cursor.add(1);
    }
    Some((name, mountpoints))
}

/// Open a scattered recording; returns a handle, or -1 with errno set.
///
/// # Safety
/// `recname` must be NUL-terminated and `rootdirs` a NULL-terminated array
/// of NUL-terminated paths. Either may be null, which fails with EINVAL.
#[no_mangle]
pub unsafe extern "C" fn vbs_open(
    recname: *const c_char,
    rootdirs: *const *const c_char,
) -> c_int {
    match collect_args(recname, rootdirs) {
        Some((name, mountpoints)) => report(crate::open_scattered(&name, &mountpoints), -1),
        None => {
            set_errno(libc::EINVAL);
            -1
        }
    }
}

/// Open a block-file recording; returns a handle, or -1 with errno set.
///
/// # Safety
/// Same contract as [vbs_open].
#[no_mangle]
pub unsafe extern "C" fn mk6_open(
    recname: *const c_char,
    rootdirs: *const *const c_char,
) -> c_int {
    match collect_args(recname, rootdirs) {
        Some((name, mountpoints)) => report(crate::open_block(&name, &mountpoints), -1),
        None => {
            set_errno(libc::EINVAL);
            -1
        }
    }
}

/// See read(2): returns the bytes served, 0 at end of stream, or -1 with
/// errno set.
///
/// # Safety
/// `buf` must point at `count` writable bytes, or be null (EFAULT).
#[no_mangle]
pub unsafe extern "C" fn vbs_read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    let result = if !HandleTable::global().contains(fd) {
        BadHandleSnafu { handle: fd }.fail()
    } else if buf.is_null() {
        BadAddressSnafu.fail()
    } else {
        let dst = std::slice::from_raw_parts_mut(buf as *mut u8, count);
        crate::read(fd, dst).map(|n| n as ssize_t)
    };
    report(result, -1)
}

/// See lseek(2): returns the new position, or -1 with errno set.
#[no_mangle]
pub extern "C" fn vbs_lseek(fd: c_int, offset: off_t, whence: c_int) -> off_t {
    let whence = match whence {
        libc::SEEK_SET => Whence::Set,
        libc::SEEK_CUR => Whence::Cur,
        libc::SEEK_END => Whence::End,
        _ => {
            set_errno(libc::EINVAL);
            return -1;
        }
    };
    report(crate::seek(fd, offset, whence).map(|pos| pos as off_t), -1)
}

/// Close a recording handle; 0 on success, -1 with errno set.
#[no_mangle]
pub extern "C" fn vbs_close(fd: c_int) -> c_int {
    report(crate::close(fd).map(|()| 0), -1)
}
