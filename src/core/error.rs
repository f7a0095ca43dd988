// Errno classification and the error carrier shared by every bridge call.
// Classification must agree with std::io so bridged and native errors are
// indistinguishable to downstream consumers.
use std::error::Error as StdError;
use std::ffi::CStr;
use std::fmt;
use std::os::raw::c_char;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    NotFound,
    Permission,
    AlreadyExists,
    NotADirectory,
    NoSpace,
    Interrupted,
    Unsupported,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    path: Option<PathBuf>,
    errno: Option<i32>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            path: None,
            errno: None,
            source: None,
        }
    }

    /// Classifies a raw OS error number and attaches the caller's context.
    pub fn from_errno(errno: i32, message: impl Into<String>) -> Self {
        Self::new(classify_errno(errno))
            .with_message(message)
            .with_errno(errno)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn path(&self) -> Option<&PathBuf> {
        self.path.as_ref()
    }

    pub fn errno(&self) -> Option<i32> {
        self.errno
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(errno) = self.errno {
            write!(f, ": {}", error_message(errno))?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

/// Maps a raw OS error number to the canonical POSIX error kind.
///
/// The mapping mirrors `std::io::Error::kind` for every number both sides
/// classify, so host-visible kinds never depend on which path raised them.
pub fn classify_errno(errno: i32) -> ErrorKind {
    match errno {
        n if n == libc::ENOENT => ErrorKind::NotFound,
        n if n == libc::EACCES || n == libc::EPERM => ErrorKind::Permission,
        n if n == libc::EEXIST => ErrorKind::AlreadyExists,
        n if n == libc::ENOTDIR => ErrorKind::NotADirectory,
        n if n == libc::ENOSPC || n == libc::EDQUOT => ErrorKind::NoSpace,
        n if n == libc::EINTR => ErrorKind::Interrupted,
        n if n == libc::ENOSYS || n == libc::ENOTSUP || n == libc::EOPNOTSUPP => {
            ErrorKind::Unsupported
        }
        _ => ErrorKind::Io,
    }
}

/// Returns the platform's standard description for an OS error number.
///
/// Unknown numbers get a generic fallback; this never fails.
pub fn error_message(errno: i32) -> String {
    let mut buf = [0 as c_char; 256];
    let rc = unsafe { libc::strerror_r(errno, buf.as_mut_ptr(), buf.len()) };
    if rc == 0 {
        let text = unsafe { CStr::from_ptr(buf.as_ptr()) };
        if !text.is_empty() {
            return text.to_string_lossy().into_owned();
        }
    }
    format!("unknown error {errno}")
}
