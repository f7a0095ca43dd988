// Portable stat/lstat/fstatat over the platform-matched metadata structure.
// The platform layout (64-bit variant on glibc, plain stat elsewhere) is
// selected at build time and never escapes this module.
use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::os::raw::{c_char, c_int};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use crate::core::error::{Error, ErrorKind};

/// Pass to [`fstatat`] to stat the entry itself rather than a symlink target.
pub const NO_FOLLOW: i32 = libc::AT_SYMLINK_NOFOLLOW;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod platform {
    use std::os::raw::{c_char, c_int};

    pub(super) type RawStat = libc::stat64;

    pub(super) unsafe fn stat(path: *const c_char, buf: *mut RawStat) -> c_int {
        unsafe { libc::stat64(path, buf) }
    }

    pub(super) unsafe fn lstat(path: *const c_char, buf: *mut RawStat) -> c_int {
        unsafe { libc::lstat64(path, buf) }
    }

    pub(super) unsafe fn fstatat(
        dirfd: c_int,
        name: *const c_char,
        buf: *mut RawStat,
        flags: c_int,
    ) -> c_int {
        unsafe { libc::fstatat64(dirfd, name, buf, flags) }
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
mod platform {
    use std::os::raw::{c_char, c_int};

    pub(super) type RawStat = libc::stat;

    pub(super) unsafe fn stat(path: *const c_char, buf: *mut RawStat) -> c_int {
        unsafe { libc::stat(path, buf) }
    }

    pub(super) unsafe fn lstat(path: *const c_char, buf: *mut RawStat) -> c_int {
        unsafe { libc::lstat(path, buf) }
    }

    pub(super) unsafe fn fstatat(
        dirfd: c_int,
        name: *const c_char,
        buf: *mut RawStat,
        flags: c_int,
    ) -> c_int {
        unsafe { libc::fstatat(dirfd, name, buf, flags) }
    }
}

use platform::RawStat;

/// Which of the three stat timestamps to extract.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TimeField {
    Access,
    Modification,
    StatusChange,
}

/// Portable file-metadata record, produced fresh per call and never cached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FileStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    atime: (i64, i64),
    mtime: (i64, i64),
    ctime: (i64, i64),
}

impl FileStat {
    fn from_raw(raw: &RawStat) -> Self {
        Self {
            dev: raw.st_dev as u64,
            ino: raw.st_ino as u64,
            mode: raw.st_mode as u32,
            nlink: raw.st_nlink as u64,
            uid: raw.st_uid as u32,
            gid: raw.st_gid as u32,
            rdev: raw.st_rdev as u64,
            size: raw.st_size as i64,
            blksize: raw.st_blksize as i64,
            blocks: raw.st_blocks as i64,
            atime: (raw.st_atime as i64, raw.st_atime_nsec as i64),
            mtime: (raw.st_mtime as i64, raw.st_mtime_nsec as i64),
            ctime: (raw.st_ctime as i64, raw.st_ctime_nsec as i64),
        }
    }

    fn time(&self, field: TimeField) -> (i64, i64) {
        match field {
            TimeField::Access => self.atime,
            TimeField::Modification => self.mtime,
            TimeField::StatusChange => self.ctime,
        }
    }
}

/// Returns the whole seconds of the selected timestamp. Pure extraction.
pub fn stat_seconds(stat: &FileStat, field: TimeField) -> i64 {
    stat.time(field).0
}

/// Returns the nanosecond remainder of the selected timestamp. Pure extraction.
pub fn stat_nanoseconds(stat: &FileStat, field: TimeField) -> i64 {
    stat.time(field).1
}

/// Stats `path`, following a terminal symlink.
pub fn stat(path: &Path) -> Result<FileStat, Error> {
    stat_with(path, platform::stat)
}

/// Stats `path` without following a terminal symlink.
pub fn lstat(path: &Path) -> Result<FileStat, Error> {
    stat_with(path, platform::lstat)
}

/// Stats `name` relative to the open directory descriptor `dirfd`.
///
/// `flags` is passed through to the syscall; [`NO_FOLLOW`] selects lstat
/// behavior. Where the syscall is missing the result is an `Unsupported`
/// error, which callers treat as a capability probe rather than a failure.
pub fn fstatat(dirfd: i32, name: &Path, flags: i32) -> Result<FileStat, Error> {
    let c_name = c_path(name)?;
    let mut raw = MaybeUninit::<RawStat>::uninit();
    let rc = unsafe { platform::fstatat(dirfd, c_name.as_ptr(), raw.as_mut_ptr(), flags) };
    if rc != 0 {
        return Err(stat_error(io::Error::last_os_error(), name));
    }
    Ok(FileStat::from_raw(&unsafe { raw.assume_init() }))
}

fn stat_with(
    path: &Path,
    call: unsafe fn(*const c_char, *mut RawStat) -> c_int,
) -> Result<FileStat, Error> {
    let c_path = c_path(path)?;
    let mut raw = MaybeUninit::<RawStat>::uninit();
    let rc = unsafe { call(c_path.as_ptr(), raw.as_mut_ptr()) };
    if rc != 0 {
        return Err(stat_error(io::Error::last_os_error(), path));
    }
    Ok(FileStat::from_raw(&unsafe { raw.assume_init() }))
}

fn stat_error(err: io::Error, path: &Path) -> Error {
    let errno = err.raw_os_error().unwrap_or(libc::EIO);
    Error::from_errno(errno, format!("cannot stat {}", path.display())).with_path(path)
}

pub(crate) fn c_path(path: &Path) -> Result<CString, Error> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        Error::new(ErrorKind::Io)
            .with_message("path contains an interior NUL byte")
            .with_path(path)
    })
}

#[cfg(test)]
mod tests {
    use super::{FileStat, TimeField, c_path, stat_nanoseconds, stat_seconds};
    use std::path::Path;

    fn sample() -> FileStat {
        FileStat {
            dev: 1,
            ino: 2,
            mode: 0o100644,
            nlink: 1,
            uid: 1000,
            gid: 1000,
            rdev: 0,
            size: 42,
            blksize: 4096,
            blocks: 1,
            atime: (100, 1),
            mtime: (200, 2),
            ctime: (300, 3),
        }
    }

    #[test]
    fn extraction_selects_the_right_timestamp() {
        let stat = sample();
        assert_eq!(stat_seconds(&stat, TimeField::Access), 100);
        assert_eq!(stat_nanoseconds(&stat, TimeField::Access), 1);
        assert_eq!(stat_seconds(&stat, TimeField::Modification), 200);
        assert_eq!(stat_nanoseconds(&stat, TimeField::Modification), 2);
        assert_eq!(stat_seconds(&stat, TimeField::StatusChange), 300);
        assert_eq!(stat_nanoseconds(&stat, TimeField::StatusChange), 3);
    }

    #[test]
    fn extraction_is_pure() {
        let stat = sample();
        assert_eq!(
            stat_seconds(&stat, TimeField::Modification),
            stat_seconds(&stat, TimeField::Modification)
        );
        assert_eq!(
            stat_nanoseconds(&stat, TimeField::Modification),
            stat_nanoseconds(&stat, TimeField::Modification)
        );
    }

    #[test]
    fn interior_nul_is_rejected() {
        let err = c_path(Path::new("bad\0path")).unwrap_err();
        assert_eq!(err.kind(), crate::core::error::ErrorKind::Io);
    }
}
