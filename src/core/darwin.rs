// Raw FFI to the Apple-only notification and power-management APIs.
// Everything here is process-lifetime state; nothing is ever unregistered.
use std::ffi::CString;
use std::io;
use std::os::raw::{c_char, c_int, c_long, c_void};

pub type CFAllocatorRef = *const c_void;
pub type CFStringRef = *const c_void;
pub type CFRunLoopRef = *mut c_void;
pub type CFRunLoopSourceRef = *mut c_void;

pub type IOReturn = c_int;
pub type IOPMAssertionID = u32;
pub type IONotificationPortRef = *mut c_void;
pub type IoObject = u32;
pub type IoConnect = u32;

pub const KCF_STRING_ENCODING_UTF8: u32 = 0x0800_0100;
pub const KIOPM_ASSERTION_LEVEL_ON: u32 = 255;
pub const KIO_RETURN_SUCCESS: IOReturn = 0;

// Power-interest message types delivered to the system-power callback.
pub const KIO_MESSAGE_CAN_SYSTEM_SLEEP: u32 = 0xE000_0270;
pub const KIO_MESSAGE_SYSTEM_WILL_SLEEP: u32 = 0xE000_0280;
pub const KIO_MESSAGE_SYSTEM_HAS_POWERED_ON: u32 = 0xE000_0300;

pub const PREVENT_IDLE_SLEEP_ASSERTION: &str = "PreventUserIdleSystemSleep";

// notify(3) channels backing the thermal and load-advisory monitors.
pub const THERMAL_PRESSURE_NOTIFY_NAME: &str = "com.apple.system.thermalpressurelevel";
pub const SYSTEM_LOAD_ADVISORY_NOTIFY_NAME: &str =
    "com.apple.system.powermanagement.SystemLoadAdvisory";

pub const NOTIFY_STATUS_OK: u32 = 0;

// Memory-pressure dispatch source event mask bits.
pub const DISPATCH_MEMORYPRESSURE_WARN: usize = 0x2;
pub const DISPATCH_MEMORYPRESSURE_CRITICAL: usize = 0x4;

pub type DispatchObject = *mut c_void;
pub type DispatchQueue = *mut c_void;
pub type DispatchSource = *mut c_void;

#[repr(C)]
pub struct DispatchSourceType {
    _private: [u8; 0],
}

pub type PowerCallback =
    extern "C" fn(refcon: *mut c_void, service: IoObject, message_type: u32, argument: *mut c_void);

#[link(name = "CoreFoundation", kind = "framework")]
unsafe extern "C" {
    pub static kCFRunLoopDefaultMode: CFStringRef;

    pub fn CFStringCreateWithCString(
        alloc: CFAllocatorRef,
        c_str: *const c_char,
        encoding: u32,
    ) -> CFStringRef;
    pub fn CFRelease(cf: *const c_void);
    pub fn CFRunLoopGetCurrent() -> CFRunLoopRef;
    pub fn CFRunLoopAddSource(rl: CFRunLoopRef, source: CFRunLoopSourceRef, mode: CFStringRef);
    pub fn CFRunLoopRun();
}

#[link(name = "IOKit", kind = "framework")]
unsafe extern "C" {
    pub fn IOPMAssertionCreateWithName(
        assertion_type: CFStringRef,
        level: u32,
        name: CFStringRef,
        id: *mut IOPMAssertionID,
    ) -> IOReturn;
    pub fn IOPMAssertionRelease(id: IOPMAssertionID) -> IOReturn;

    pub fn IORegisterForSystemPower(
        refcon: *mut c_void,
        port: *mut IONotificationPortRef,
        callback: PowerCallback,
        notifier: *mut IoObject,
    ) -> IoConnect;
    pub fn IONotificationPortGetRunLoopSource(port: IONotificationPortRef) -> CFRunLoopSourceRef;
    pub fn IOAllowPowerChange(kernel_port: IoConnect, notification_id: c_long) -> IOReturn;
}

// libnotify and libdispatch live in libSystem; no framework link is needed.
unsafe extern "C" {
    pub static _dispatch_source_type_memorypressure: DispatchSourceType;

    pub fn notify_register_file_descriptor(
        name: *const c_char,
        notify_fd: *mut c_int,
        flags: c_int,
        out_token: *mut c_int,
    ) -> u32;
    pub fn notify_get_state(token: c_int, state: *mut u64) -> u32;

    pub fn dispatch_get_global_queue(identifier: isize, flags: usize) -> DispatchQueue;
    pub fn dispatch_source_create(
        source_type: *const DispatchSourceType,
        handle: usize,
        mask: usize,
        queue: DispatchQueue,
    ) -> DispatchSource;
    pub fn dispatch_source_set_event_handler_f(
        source: DispatchSource,
        handler: extern "C" fn(context: *mut c_void),
    );
    pub fn dispatch_source_get_data(source: DispatchSource) -> usize;
    pub fn dispatch_set_context(object: DispatchObject, context: *mut c_void);
    pub fn dispatch_resume(object: DispatchObject);
}

/// Creates a CFString from UTF-8 text. The caller releases it.
pub fn cf_string(text: &str) -> Option<CFStringRef> {
    let c_text = CString::new(text).ok()?;
    let cf = unsafe {
        CFStringCreateWithCString(std::ptr::null(), c_text.as_ptr(), KCF_STRING_ENCODING_UTF8)
    };
    if cf.is_null() { None } else { Some(cf) }
}

/// A registered notify(3) channel: a token plus the file descriptor the
/// kernel writes fired tokens to. Lives until process exit.
pub struct NotifyChannel {
    fd: c_int,
    token: c_int,
}

impl NotifyChannel {
    pub fn open(name: &str) -> io::Result<Self> {
        let c_name = CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "NUL in notify name"))?;
        let mut fd: c_int = -1;
        let mut token: c_int = -1;
        let status =
            unsafe { notify_register_file_descriptor(c_name.as_ptr(), &mut fd, 0, &mut token) };
        if status != NOTIFY_STATUS_OK {
            return Err(io::Error::other(format!(
                "notify registration for {name} failed with status {status}"
            )));
        }
        Ok(Self { fd, token })
    }

    /// Current state of the channel, readable at any time.
    pub fn state(&self) -> u64 {
        let mut state: u64 = 0;
        let status = unsafe { notify_get_state(self.token, &mut state) };
        if status != NOTIFY_STATUS_OK {
            return 0;
        }
        state
    }

    /// Blocks until the channel fires, then returns its fresh state.
    /// Returns None only if the descriptor goes bad.
    pub fn wait(&self) -> Option<u64> {
        // Fired tokens arrive on the fd as big-endian 32-bit integers.
        let mut raw = [0u8; 4];
        let mut read = 0usize;
        while read < raw.len() {
            let n = unsafe {
                libc::read(
                    self.fd,
                    raw[read..].as_mut_ptr().cast(),
                    raw.len() - read,
                )
            };
            if n > 0 {
                read += n as usize;
                continue;
            }
            if n < 0 && io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return None;
        }
        let fired = i32::from_be_bytes(raw);
        if fired != self.token {
            // Shared descriptor delivered someone else's token; state is
            // still the freshest answer for ours.
            tracing::debug!(fired, token = self.token, "unexpected notify token");
        }
        Some(self.state())
    }
}
