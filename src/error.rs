//! Module `error` implements the flat error taxonomy shared across the
//! crate. Errors are values: every fallible operation returns
//! `Result<T, Error>`, nothing panics on a caller-reachable path.

use std::{ffi, fmt, io, result};

/// Result alias used throughout this crate.
pub type Result<T> = result::Result<T, Error>;

/// Crate-wide error taxonomy. Variant names double as the `err_at!` macro's
/// first argument, e.g. `err_at!(IoError, file.sync_all())?`.
#[derive(Debug)]
pub enum Error {
    /// A required argument was null/empty where a value was mandatory.
    NullArgument(String),
    /// A supplied path was malformed, missing, or not a directory.
    InvalidPath(String),
    /// Growing the reverse-map, cache, or mmap region failed.
    AllocationFailed(String),
    /// Any I/O failure: open, read, write, sync, truncate, lock.
    IoError(String),
    /// A node record failed structural validation (bad name, bad payload
    /// tag, size mismatch).
    InvalidNode(String),
    /// The evaluation-mode or licensed-tier node cap was exceeded.
    QuotaExceeded(String),
    /// The license token's expiry has passed.
    LicenseExpired(String),
    /// The license token failed verification or was malformed.
    LicenseInvalid(String),
    /// A reader exceeded its seqlock retry budget; transient, retry later.
    Busy(String),
    /// A writer exceeded its seqlock spin budget.
    Timeout(String),
    /// The store file, or a value read back from it, failed a hard
    /// structural check (bad magic, slot-size mismatch, unreachable state).
    Fatal(String),
    /// A background thread's channel hung up or its join panicked.
    IpcFail(String),
    /// A background thread panicked instead of returning normally.
    ThreadFail(String),
    /// A numeric conversion (e.g. u64 -> usize) could not be represented.
    FailConvert(String),
    /// Decoding a serialized structure found fewer bytes than it declared.
    DecodeFail(String),
    /// The same store file is already open (advisory lock held) in this or
    /// another process.
    AlreadyOpen(String),
    /// An operation expected an id that is not present in the store.
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::NullArgument(msg) => write!(f, "null-argument: {}", msg),
            Error::InvalidPath(msg) => write!(f, "invalid-path: {}", msg),
            Error::AllocationFailed(msg) => write!(f, "allocation-failed: {}", msg),
            Error::IoError(msg) => write!(f, "io-error: {}", msg),
            Error::InvalidNode(msg) => write!(f, "invalid-node: {}", msg),
            Error::QuotaExceeded(msg) => write!(f, "quota-exceeded: {}", msg),
            Error::LicenseExpired(msg) => write!(f, "license-expired: {}", msg),
            Error::LicenseInvalid(msg) => write!(f, "license-invalid: {}", msg),
            Error::Busy(msg) => write!(f, "busy: {}", msg),
            Error::Timeout(msg) => write!(f, "timeout: {}", msg),
            Error::Fatal(msg) => write!(f, "fatal: {}", msg),
            Error::IpcFail(msg) => write!(f, "ipc-fail: {}", msg),
            Error::ThreadFail(msg) => write!(f, "thread-fail: {}", msg),
            Error::FailConvert(msg) => write!(f, "fail-convert: {}", msg),
            Error::DecodeFail(msg) => write!(f, "decode-fail: {}", msg),
            Error::AlreadyOpen(msg) => write!(f, "already-open: {}", msg),
            Error::NotFound(msg) => write!(f, "not-found: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Stable integer error code for FFI-style consumers built on top of
    /// this core (the FFI surface itself is an external collaborator, but
    /// the numeric mapping belongs to the core, per spec.md section 6).
    pub fn to_code(&self) -> i32 {
        match self {
            Error::NullArgument(_) => -1,
            Error::InvalidPath(_) => -2,
            Error::AllocationFailed(_) => -3,
            Error::IoError(_) => -4,
            Error::InvalidNode(_) => -5,
            Error::QuotaExceeded(_) => -100,
            Error::LicenseExpired(_) => -101,
            Error::LicenseInvalid(_) => -102,
            Error::Busy(_) => -6,
            Error::Timeout(_) => -7,
            Error::Fatal(_) => -8,
            Error::IpcFail(_) => -9,
            Error::ThreadFail(_) => -10,
            Error::FailConvert(_) => -11,
            Error::DecodeFail(_) => -12,
            Error::AlreadyOpen(_) => -13,
            Error::NotFound(_) => -14,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err.to_string())
    }
}

impl From<ffi::OsString> for Error {
    fn from(err: ffi::OsString) -> Error {
        Error::InvalidPath(format!("{:?}", err))
    }
}

/// Format-and-wrap helper, the crate's equivalent of `anyhow::Context`
/// without adding a dependency the teacher doesn't already carry.
///
/// Three call shapes:
/// * `err_at!(Variant)` -> `Err(Error::Variant(String::new()))`
/// * `err_at!(Variant, msg: "fmt", args...)` -> `Err(Error::Variant(format!(...)))`
/// * `err_at!(Variant, result_expr)` -> maps `Err(e)` to `Error::Variant(e.to_string())`
#[macro_export]
macro_rules! err_at {
    ($v:ident) => {
        Err($crate::Error::$v(String::new()))
    };
    ($v:ident, msg: $($arg:expr),+ $(,)?) => {
        Err($crate::Error::$v(format!($($arg),+)))
    };
    ($v:ident, $e:expr $(,)?) => {
        match $e {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::Error::$v(format!("{}", err))),
        }
    };
    ($v:ident, $e:expr, $($arg:expr),+ $(,)?) => {
        match $e {
            Ok(val) => Ok(val),
            Err(err) => Err($crate::Error::$v(format!("{}: {}", format!($($arg),+), err))),
        }
    };
}
