// Named system-control queries. Darwin exposes sysctlbyname(3); everywhere
// else the facility is reported as unsupported.
use crate::core::error::Error;

/// Resolves a named system control to its current value.
///
/// Uses the standard two-call sizing protocol: a size query first, then the
/// value read into a buffer of exactly that size.
#[cfg(any(target_os = "macos", target_os = "ios"))]
pub fn sysctl_by_name(name: &str) -> Result<Vec<u8>, Error> {
    use std::ptr;

    let c_name = control_name(name)?;
    let mut size: libc::size_t = 0;
    let rc = unsafe {
        libc::sysctlbyname(
            c_name.as_ptr(),
            ptr::null_mut(),
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(query_error(name));
    }

    let mut value = vec![0u8; size];
    let rc = unsafe {
        libc::sysctlbyname(
            c_name.as_ptr(),
            value.as_mut_ptr().cast(),
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if rc != 0 {
        return Err(query_error(name));
    }
    value.truncate(size);
    Ok(value)
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
pub fn sysctl_by_name(name: &str) -> Result<Vec<u8>, Error> {
    Err(unsupported(name))
}

/// Buffer-filling variant for the host boundary: writes up to
/// `buffer.len()` bytes and returns the logical value length.
pub fn sysctl_by_name_into(name: &str, buffer: &mut [u8]) -> Result<u64, Error> {
    let value = sysctl_by_name(name)?;
    let copy = buffer.len().min(value.len());
    buffer[..copy].copy_from_slice(&value[..copy]);
    Ok(value.len() as u64)
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn control_name(name: &str) -> Result<std::ffi::CString, Error> {
    std::ffi::CString::new(name).map_err(|_| {
        Error::new(crate::core::error::ErrorKind::Io)
            .with_message(format!("control name {name:?} contains a NUL byte"))
    })
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
fn query_error(name: &str) -> Error {
    let errno = std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(libc::EIO);
    Error::from_errno(errno, format!("cannot query system control {name}"))
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
fn unsupported(name: &str) -> Error {
    Error::new(crate::core::error::ErrorKind::Unsupported)
        .with_message(format!(
            "system control queries are not available on this platform ({name})"
        ))
        .with_errno(libc::ENOSYS)
}

#[cfg(test)]
mod tests {
    use super::{sysctl_by_name, sysctl_by_name_into};

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    #[test]
    fn query_is_unsupported_off_darwin() {
        use crate::core::error::ErrorKind;

        let err = sysctl_by_name("kern.ostype").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);

        let mut buf = [0u8; 16];
        let err = sysctl_by_name_into("kern.ostype", &mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    #[test]
    fn kernel_ostype_reads_back() {
        let value = sysctl_by_name("kern.ostype").expect("kern.ostype");
        assert!(!value.is_empty());

        // Truncation reports the logical length while filling the buffer.
        let mut small = [0u8; 2];
        let logical = sysctl_by_name_into("kern.ostype", &mut small).expect("sized read");
        assert_eq!(logical, value.len() as u64);
        assert_eq!(&small[..], &value[..2]);
    }

    #[cfg(any(target_os = "macos", target_os = "ios"))]
    #[test]
    fn unknown_control_is_an_error() {
        assert!(sysctl_by_name("sysbridge.no.such.control").is_err());
    }
}
