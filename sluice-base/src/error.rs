// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. A way for callers to distinguish the handful of error kinds the operators actually
//    raise, without downcasting or string-matching.

use std::borrow::Cow;
use std::fmt;

use backtrace_error::DynBacktraceError;
use tracing::error;

#[cfg(test)]
use test_log::test;

pub type Result<T> = std::result::Result<T, Error>;

/// The error kinds an operator can raise. `ResourceExhausted` (the block pool being
/// empty on `accept`) is deliberately absent: it is not an error, it is signalled by
/// the `accept` return value and recovered by the caller issuing a spill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Programming error: a method was called in the wrong state, a watermark went
    /// backwards, `dispose` was called twice, etc. Fatal; surfaced immediately.
    InvariantViolation,
    /// A spill file read or write failed. Fatal for the operator instance; the
    /// operator enters a terminal broken state that rejects everything but `dispose`.
    IoFailure,
    /// Construction-time validation failure (non-positive sizes, bad offsets, etc).
    ConfigurationError,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    inner: DynBacktraceError,
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "sluice", kind = ?kind, "{:?}", err);
        Error {
            kind,
            inner: DynBacktraceError::from(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.inner)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner)
    }
}

struct SimpleErr(Cow<'static, str>);
impl fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::new(ErrorKind::IoFailure, e)
    }
}

/// Build an ad hoc error of the given kind from a message, analogous to
/// `submerge_base::err` but tagged with a kind so callers can match on it.
pub fn err(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(kind, SimpleErr(msg.into()))
}

pub fn invariant(msg: impl Into<Cow<'static, str>>) -> Error {
    err(ErrorKind::InvariantViolation, msg)
}

pub fn config_error(msg: impl Into<Cow<'static, str>>) -> Error {
    err(ErrorKind::ConfigurationError, msg)
}

#[test]
fn test_error_kinds() {
    assert_eq!(invariant("bad state").kind(), ErrorKind::InvariantViolation);
    assert_eq!(config_error("bad size").kind(), ErrorKind::ConfigurationError);
    let io_err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
    assert_eq!(io_err.kind(), ErrorKind::IoFailure);
}
