// Extended attribute reads with absent-vs-error discrimination.
// "Attribute absent" is a contract outcome, not an errno: Linux reports it
// as ENODATA, the Apple/BSD family as ENOATTR.
use std::ffi::{CStr, CString};
use std::path::Path;

use crate::core::error::Error;
use crate::core::stat::c_path;

/// Result of an attribute read that did not fail outright.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum XattrOutcome {
    /// Logical attribute length in bytes. May exceed the supplied buffer's
    /// capacity, in which case only the first `buffer.len()` bytes were
    /// written (truncation, not failure).
    Value(u64),
    /// The attribute does not exist on the entry.
    Absent,
}

/// Reads attribute `name` of `path` into `buffer`, following symlinks.
pub fn get_xattr(path: &Path, name: &str, buffer: &mut [u8]) -> Result<XattrOutcome, Error> {
    read_xattr(path, name, buffer, true)
}

/// Reads attribute `name` of `path` into `buffer` without following a
/// terminal symlink.
pub fn get_xattr_nofollow(
    path: &Path,
    name: &str,
    buffer: &mut [u8],
) -> Result<XattrOutcome, Error> {
    read_xattr(path, name, buffer, false)
}

fn read_xattr(
    path: &Path,
    name: &str,
    buffer: &mut [u8],
    follow: bool,
) -> Result<XattrOutcome, Error> {
    let c_path = c_path(path)?;
    let c_name = attr_name(name, path)?;

    match platform::get(&c_path, &c_name, Some(&mut *buffer), follow) {
        Ok(len) => Ok(XattrOutcome::Value(len)),
        Err(errno) if errno == platform::ATTR_ABSENT_ERRNO => Ok(XattrOutcome::Absent),
        Err(errno) if errno == libc::ERANGE => read_truncated(&c_path, &c_name, buffer, follow)
            .map_err(|errno| xattr_error(errno, path, name)),
        Err(errno) => Err(xattr_error(errno, path, name)),
    }
}

// The value is larger than the caller's buffer. Size it, read it whole, and
// hand back the truncated prefix together with the logical length.
fn read_truncated(
    c_path: &CStr,
    c_name: &CStr,
    buffer: &mut [u8],
    follow: bool,
) -> Result<XattrOutcome, i32> {
    let logical = match platform::get(c_path, c_name, None, follow) {
        Ok(len) => len,
        Err(errno) if errno == platform::ATTR_ABSENT_ERRNO => return Ok(XattrOutcome::Absent),
        Err(errno) => return Err(errno),
    };
    let mut scratch = vec![0u8; logical as usize];
    match platform::get(c_path, c_name, Some(scratch.as_mut_slice()), follow) {
        Ok(len) => {
            let copy = buffer.len().min(len as usize);
            buffer[..copy].copy_from_slice(&scratch[..copy]);
            Ok(XattrOutcome::Value(len))
        }
        Err(errno) if errno == platform::ATTR_ABSENT_ERRNO => Ok(XattrOutcome::Absent),
        Err(errno) => Err(errno),
    }
}

fn xattr_error(errno: i32, path: &Path, name: &str) -> Error {
    Error::from_errno(
        errno,
        format!("cannot read attribute {name} of {}", path.display()),
    )
    .with_path(path)
}

fn attr_name(name: &str, path: &Path) -> Result<CString, Error> {
    CString::new(name).map_err(|_| {
        Error::new(crate::core::error::ErrorKind::Io)
            .with_message(format!("attribute name {name:?} contains a NUL byte"))
            .with_path(path)
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod platform {
    use std::ffi::CStr;
    use std::io;
    use std::os::raw::c_void;
    use std::ptr;

    pub(super) const ATTR_ABSENT_ERRNO: i32 = libc::ENODATA;

    // A None buffer is the size query: the syscall reports the logical
    // length without writing anything.
    pub(super) fn get(
        path: &CStr,
        name: &CStr,
        buffer: Option<&mut [u8]>,
        follow: bool,
    ) -> Result<u64, i32> {
        let (ptr, len) = match buffer {
            Some(buffer) => (buffer.as_mut_ptr() as *mut c_void, buffer.len()),
            None => (ptr::null_mut(), 0),
        };
        let rc = unsafe {
            if follow {
                libc::getxattr(path.as_ptr(), name.as_ptr(), ptr, len)
            } else {
                libc::lgetxattr(path.as_ptr(), name.as_ptr(), ptr, len)
            }
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO));
        }
        Ok(rc as u64)
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
mod platform {
    use std::ffi::CStr;
    use std::io;
    use std::os::raw::c_void;
    use std::ptr;

    pub(super) const ATTR_ABSENT_ERRNO: i32 = libc::ENOATTR;

    pub(super) fn get(
        path: &CStr,
        name: &CStr,
        buffer: Option<&mut [u8]>,
        follow: bool,
    ) -> Result<u64, i32> {
        let (ptr, len) = match buffer {
            Some(buffer) => (buffer.as_mut_ptr() as *mut c_void, buffer.len()),
            None => (ptr::null_mut(), 0),
        };
        let options = if follow { 0 } else { libc::XATTR_NOFOLLOW };
        let rc = unsafe { libc::getxattr(path.as_ptr(), name.as_ptr(), ptr, len, 0, options) };
        if rc < 0 {
            return Err(io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO));
        }
        Ok(rc as u64)
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
mod platform {
    use std::ffi::CStr;

    pub(super) const ATTR_ABSENT_ERRNO: i32 = 0;

    pub(super) fn get(
        _path: &CStr,
        _name: &CStr,
        _buffer: Option<&mut [u8]>,
        _follow: bool,
    ) -> Result<u64, i32> {
        Err(libc::ENOTSUP)
    }
}

#[cfg(test)]
mod tests {
    use super::{XattrOutcome, attr_name};
    use std::path::Path;

    #[test]
    fn outcomes_are_mutually_exclusive() {
        assert_ne!(XattrOutcome::Value(0), XattrOutcome::Absent);
        assert_eq!(XattrOutcome::Value(7), XattrOutcome::Value(7));
    }

    #[test]
    fn attribute_name_with_nul_is_rejected() {
        assert!(attr_name("user.\0bad", Path::new("f")).is_err());
    }
}
