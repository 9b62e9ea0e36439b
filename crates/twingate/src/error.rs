use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::fmt;

/// All possible error kinds.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A method type is unknown or registered twice.
    MethodType,
    /// A constraint description is malformed.
    Constraint,
    /// A parameter description is malformed or a value does not fit
    /// a parameter.
    Parameter,
    /// An executor failed while performing its unit of work.
    Execution,
    /// A `JSON` value could not be serialized or deserialized.
    Json,
}

impl ErrorKind {
    pub(crate) const fn description(self) -> &'static str {
        match self {
            Self::MethodType => "Method Type",
            Self::Constraint => "Constraint",
            Self::Parameter => "Parameter",
            Self::Execution => "Execution",
            Self::Json => "Json",
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.description().fmt(f)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.description().fmt(f)
    }
}

/// A `twingate` error.
///
/// It is composed of an [`ErrorKind`] and a description of the
/// encountered error. When backtraces are enabled through
/// `RUST_BACKTRACE`, it also carries the backtrace of the place where it
/// was created.
pub struct Error {
    kind: ErrorKind,
    info: Cow<'static, str>,
    backtrace: Option<Box<Backtrace>>,
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.info == other.info
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error(f)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error(f)
    }
}

impl std::error::Error for Error {}

impl Error {
    /// Creates an [`Error`] from an [`ErrorKind`] and a description.
    #[must_use]
    #[inline]
    pub fn new(kind: ErrorKind, info: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            info: info.into(),
            backtrace: None,
        }
        .with_backtrace(Backtrace::capture())
    }

    /// Replaces the [`Backtrace`] of the [`Error`].
    ///
    /// A disabled or unsupported backtrace leaves the error without one.
    #[must_use]
    pub fn with_backtrace(mut self, backtrace: Backtrace) -> Self {
        self.backtrace =
            (backtrace.status() == BacktraceStatus::Captured).then(|| Box::new(backtrace));
        self
    }

    /// Creates an [`ErrorKind::Execution`] error.
    ///
    /// Executors return this error to notify the dispatch engine that
    /// their unit of work has failed.
    #[must_use]
    #[inline]
    pub fn execution(info: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorKind::Execution, info)
    }

    /// Returns the [`ErrorKind`].
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error description.
    #[must_use]
    pub fn info(&self) -> &str {
        &self.info
    }

    /// Returns the [`Backtrace`] captured when the [`Error`] was created.
    #[must_use]
    pub fn backtrace(&self) -> Option<&Backtrace> {
        self.backtrace.as_deref()
    }

    fn error(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.info)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorKind::Json, e.to_string())
    }
}

/// A specialized [`Result`] type for [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use std::backtrace::Backtrace;

    use super::{Error, ErrorKind};

    #[test]
    fn error_display() {
        let error = Error::execution("Sensor unreachable");

        assert_eq!(error.kind(), ErrorKind::Execution);
        assert_eq!(error.info(), "Sensor unreachable");
        assert_eq!(error.to_string(), "Execution: Sensor unreachable");
    }

    #[test]
    fn error_backtrace() {
        let error =
            Error::execution("Sensor unreachable").with_backtrace(Backtrace::force_capture());
        assert!(error.backtrace().is_some());

        // Backtraces do not take part in comparisons.
        assert_eq!(error, Error::execution("Sensor unreachable"));

        let error = Error::new(ErrorKind::Parameter, "Bad value").with_backtrace(Backtrace::disabled());
        assert!(error.backtrace().is_none());
    }

    #[test]
    fn json_error() {
        let error: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();

        assert_eq!(error.kind(), ErrorKind::Json);
    }
}
