//! Purpose: C ABI bridge for the host runtime (libsysbridge).
//! Exports: C-callable stat/xattr/sysctl/sleep/monitor functions and error helpers.
//! Role: Stable ABI surface loaded by the host as a shared library.
//! Invariants: Out-parameters are written only on success; failures go through `sysb_error`.
//! Invariants: Error kind codes and event enum values map 1:1 with host-side constants.
//! Invariants: Buffers are host-owned; this layer writes into them and reports logical lengths.
#![allow(non_camel_case_types)]

use crate::core::error::{Error, ErrorKind};
use crate::core::monitor::memory::MemoryPressureLevel;
use crate::core::monitor::suspend::SuspensionReason;
use crate::core::monitor::{
    start_memory_pressure_monitoring, start_suspend_monitoring,
    start_system_load_advisory_monitoring, start_thermal_monitoring, system_load_advisory,
    thermal_load,
};
use crate::core::sleep::{SleepSupport, pop_disable_sleep, push_disable_sleep};
use crate::core::stat::{FileStat, TimeField, stat_nanoseconds, stat_seconds};
use crate::core::{stat, sysctl, xattr};
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use std::ptr;

/// Timestamp selectors for `sysb_stat_seconds`/`sysb_stat_nanoseconds`.
pub const SYSB_STAT_ATIME: i32 = 0;
pub const SYSB_STAT_MTIME: i32 = 1;
pub const SYSB_STAT_CTIME: i32 = 2;

#[repr(C)]
pub struct sysb_stat {
    dev: u64,
    ino: u64,
    mode: u32,
    nlink: u64,
    uid: u32,
    gid: u32,
    rdev: u64,
    size: i64,
    blksize: i64,
    blocks: i64,
    atime_sec: i64,
    atime_nsec: i64,
    mtime_sec: i64,
    mtime_nsec: i64,
    ctime_sec: i64,
    ctime_nsec: i64,
}

#[repr(C)]
pub struct sysb_error {
    kind: i32,
    os_errno: i32,
    message: *mut c_char,
    path: *mut c_char,
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_stat_path(
    path: *const c_char,
    out_stat: *mut sysb_stat,
    out_err: *mut *mut sysb_error,
) -> i32 {
    stat_call(path, out_stat, out_err, stat::stat)
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_lstat_path(
    path: *const c_char,
    out_stat: *mut sysb_stat,
    out_err: *mut *mut sysb_error,
) -> i32 {
    stat_call(path, out_stat, out_err, stat::lstat)
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_fstatat(
    dirfd: i32,
    name: *const c_char,
    flags: i32,
    out_stat: *mut sysb_stat,
    out_err: *mut *mut sysb_error,
) -> i32 {
    let name = match parse_path(name, "name") {
        Ok(name) => name,
        Err(err) => return fail(out_err, err),
    };
    let record = match stat::fstatat(dirfd, &name, flags) {
        Ok(record) => record,
        Err(err) => return fail(out_err, err),
    };
    write_stat(out_stat, &record, out_err)
}

/// Returns the whole seconds of the selected timestamp. Unknown selectors
/// and null records yield 0; extraction itself has no failure path.
#[unsafe(no_mangle)]
pub extern "C" fn sysb_stat_seconds(record: *const sysb_stat, field: i32) -> i64 {
    let Some(record) = (unsafe { record.as_ref() }) else {
        return 0;
    };
    match field {
        SYSB_STAT_ATIME => record.atime_sec,
        SYSB_STAT_MTIME => record.mtime_sec,
        SYSB_STAT_CTIME => record.ctime_sec,
        _ => 0,
    }
}

/// Returns the nanosecond remainder of the selected timestamp.
#[unsafe(no_mangle)]
pub extern "C" fn sysb_stat_nanoseconds(record: *const sysb_stat, field: i32) -> i64 {
    let Some(record) = (unsafe { record.as_ref() }) else {
        return 0;
    };
    match field {
        SYSB_STAT_ATIME => record.atime_nsec,
        SYSB_STAT_MTIME => record.mtime_nsec,
        SYSB_STAT_CTIME => record.ctime_nsec,
        _ => 0,
    }
}

/// Reads an extended attribute into the host buffer. Returns 0 on success
/// (logical length through `out_len`, possibly exceeding `buf_len`), 1 when
/// the attribute is absent, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn sysb_get_xattr(
    path: *const c_char,
    name: *const c_char,
    buf: *mut u8,
    buf_len: u64,
    follow: u32,
    out_len: *mut u64,
    out_err: *mut *mut sysb_error,
) -> i32 {
    let path = match parse_path(path, "path") {
        Ok(path) => path,
        Err(err) => return fail(out_err, err),
    };
    let name = match parse_text(name, "attribute name") {
        Ok(name) => name,
        Err(err) => return fail(out_err, err),
    };
    let buffer = match borrow_buffer(buf, buf_len) {
        Ok(buffer) => buffer,
        Err(err) => return fail(out_err, err),
    };
    let outcome = if follow != 0 {
        xattr::get_xattr(&path, &name, buffer)
    } else {
        xattr::get_xattr_nofollow(&path, &name, buffer)
    };
    match outcome {
        Ok(xattr::XattrOutcome::Value(len)) => {
            if out_len.is_null() {
                return fail(out_err, null_argument("out_len"));
            }
            unsafe {
                *out_len = len;
            }
            0
        }
        Ok(xattr::XattrOutcome::Absent) => 1,
        Err(err) => fail(out_err, err),
    }
}

/// Resolves a named system control into the host buffer. Returns 0 on
/// success (logical length through `out_len`), -1 on error; platforms
/// without the facility report the `Unsupported` kind.
#[unsafe(no_mangle)]
pub extern "C" fn sysb_sysctl_by_name(
    name: *const c_char,
    buf: *mut u8,
    buf_len: u64,
    out_len: *mut u64,
    out_err: *mut *mut sysb_error,
) -> i32 {
    let name = match parse_text(name, "control name") {
        Ok(name) => name,
        Err(err) => return fail(out_err, err),
    };
    let buffer = match borrow_buffer(buf, buf_len) {
        Ok(buffer) => buffer,
        Err(err) => return fail(out_err, err),
    };
    match sysctl::sysctl_by_name_into(&name, buffer) {
        Ok(len) => {
            if out_len.is_null() {
                return fail(out_err, null_argument("out_len"));
            }
            unsafe {
                *out_len = len;
            }
            0
        }
        Err(err) => fail(out_err, err),
    }
}

/// Increments the sleep-inhibition depth. Returns 0, or -1 where the
/// platform has no sleep-block primitive (a no-op for the host, not an
/// error).
#[unsafe(no_mangle)]
pub extern "C" fn sysb_push_disable_sleep() -> i32 {
    match push_disable_sleep() {
        SleepSupport::Supported => 0,
        SleepSupport::Unsupported => -1,
    }
}

/// Decrements the sleep-inhibition depth. Same convention as push.
#[unsafe(no_mangle)]
pub extern "C" fn sysb_pop_disable_sleep() -> i32 {
    match pop_disable_sleep() {
        SleepSupport::Supported => 0,
        SleepSupport::Unsupported => -1,
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_start_suspend_monitoring(callback: extern "C" fn(i32)) {
    start_suspend_monitoring(Box::new(move |reason: SuspensionReason| {
        callback(reason as i32);
    }));
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_start_thermal_monitoring(callback: extern "C" fn(i32)) {
    start_thermal_monitoring(Box::new(move |value| callback(value)));
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_thermal_load() -> i32 {
    thermal_load()
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_start_system_load_advisory_monitoring(callback: extern "C" fn(i32)) {
    start_system_load_advisory_monitoring(Box::new(move |value| callback(value)));
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_system_load_advisory() -> i32 {
    system_load_advisory()
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_start_memory_pressure_monitoring(callback: extern "C" fn(i32)) {
    start_memory_pressure_monitoring(Box::new(move |level: MemoryPressureLevel| {
        callback(level as i32);
    }));
}

/// Host-invoked diagnostic logging setup. Env-filter driven, idempotent,
/// never fails.
#[unsafe(no_mangle)]
pub extern "C" fn sysb_init_logging() {
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

#[unsafe(no_mangle)]
pub extern "C" fn sysb_error_free(err: *mut sysb_error) {
    if err.is_null() {
        return;
    }
    unsafe {
        let err = Box::from_raw(err);
        if !err.message.is_null() {
            drop(CString::from_raw(err.message));
        }
        if !err.path.is_null() {
            drop(CString::from_raw(err.path));
        }
    }
}

fn stat_call(
    path: *const c_char,
    out_stat: *mut sysb_stat,
    out_err: *mut *mut sysb_error,
    call: fn(&std::path::Path) -> Result<FileStat, Error>,
) -> i32 {
    let path = match parse_path(path, "path") {
        Ok(path) => path,
        Err(err) => return fail(out_err, err),
    };
    let record = match call(&path) {
        Ok(record) => record,
        Err(err) => return fail(out_err, err),
    };
    write_stat(out_stat, &record, out_err)
}

fn write_stat(out_stat: *mut sysb_stat, record: &FileStat, out_err: *mut *mut sysb_error) -> i32 {
    if out_stat.is_null() {
        return fail(out_err, null_argument("out_stat"));
    }
    unsafe {
        *out_stat = stat_record(record);
    }
    0
}

fn stat_record(record: &FileStat) -> sysb_stat {
    sysb_stat {
        dev: record.dev,
        ino: record.ino,
        mode: record.mode,
        nlink: record.nlink,
        uid: record.uid,
        gid: record.gid,
        rdev: record.rdev,
        size: record.size,
        blksize: record.blksize,
        blocks: record.blocks,
        atime_sec: stat_seconds(record, TimeField::Access),
        atime_nsec: stat_nanoseconds(record, TimeField::Access),
        mtime_sec: stat_seconds(record, TimeField::Modification),
        mtime_nsec: stat_nanoseconds(record, TimeField::Modification),
        ctime_sec: stat_seconds(record, TimeField::StatusChange),
        ctime_nsec: stat_nanoseconds(record, TimeField::StatusChange),
    }
}

fn parse_path(input: *const c_char, what: &str) -> Result<PathBuf, Error> {
    if input.is_null() {
        return Err(null_argument(what));
    }
    let bytes = unsafe { CStr::from_ptr(input) }.to_bytes();
    Ok(PathBuf::from(std::ffi::OsStr::from_bytes(bytes)))
}

fn parse_text(input: *const c_char, what: &str) -> Result<String, Error> {
    if input.is_null() {
        return Err(null_argument(what));
    }
    unsafe { CStr::from_ptr(input) }
        .to_str()
        .map(str::to_owned)
        .map_err(|_| Error::new(ErrorKind::Io).with_message(format!("{what} is not valid UTF-8")))
}

fn borrow_buffer<'a>(buf: *mut u8, buf_len: u64) -> Result<&'a mut [u8], Error> {
    if buf_len == 0 {
        return Ok(&mut []);
    }
    if buf.is_null() {
        return Err(null_argument("buf"));
    }
    Ok(unsafe { std::slice::from_raw_parts_mut(buf, buf_len as usize) })
}

fn null_argument(what: &str) -> Error {
    Error::new(ErrorKind::Io).with_message(format!("{what} is null"))
}

fn fail(out_err: *mut *mut sysb_error, err: Error) -> i32 {
    if out_err.is_null() {
        return -1;
    }
    let error = Box::new(sysb_error {
        kind: error_kind_code(err.kind()),
        os_errno: err.errno().unwrap_or(0),
        message: to_c_string(&err.to_string()),
        path: err
            .path()
            .map(|path| to_c_string(path.to_string_lossy().as_ref()))
            .unwrap_or(ptr::null_mut()),
    });
    unsafe {
        *out_err = Box::into_raw(error);
    }
    -1
}

fn to_c_string(input: &str) -> *mut c_char {
    CString::new(input)
        .or_else(|_| CString::new(input.replace('\0', "?")))
        .map(|s| s.into_raw())
        .unwrap_or(ptr::null_mut())
}

fn error_kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::NotFound => 1,
        ErrorKind::Permission => 2,
        ErrorKind::AlreadyExists => 3,
        ErrorKind::NotADirectory => 4,
        ErrorKind::NoSpace => 5,
        ErrorKind::Interrupted => 6,
        ErrorKind::Unsupported => 7,
        ErrorKind::Io => 8,
    }
}
