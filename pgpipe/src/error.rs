//! `pgpipe` error types.
use std::{backtrace::Backtrace, fmt, io};

use crate::{
    common::unit_error,
    connection::{ParseError, UnsupportedAuth},
    notice::Notice,
    postgres::ProtocolError,
};

/// A specialized [`Result`] type for `pgpipe` operation.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All possible error from `pgpipe` library.
pub struct Error {
    context: String,
    backtrace: Backtrace,
    kind: ErrorKind,
}

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Prefix the error message with `context`.
    pub(crate) fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Returns the backend diagnostic if this is a database error.
    pub fn as_database(&self) -> Option<&Notice> {
        match &self.kind {
            ErrorKind::Database(notice) => Some(notice),
            _ => None,
        }
    }

    /// Returns `true` if the connection can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, ErrorKind::Protocol(_) | ErrorKind::Io(_) | ErrorKind::Closed(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::Closed(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout(_))
    }

    pub fn is_submission(&self) -> bool {
        matches!(self.kind, ErrorKind::Submission(_))
    }

    pub(crate) fn closed() -> Self {
        ConnectionClosed.into()
    }
}

/// All possible error kind from `pgpipe` library.
pub enum ErrorKind {
    Config(ParseError),
    Protocol(ProtocolError),
    Io(io::Error),
    /// Error reported by the backend.
    Database(Notice),
    /// Request rejected before anything is sent.
    Submission(SubmissionError),
    Closed(ConnectionClosed),
    /// Request skipped by the backend after an earlier error in the pipeline.
    Aborted(PipelineAborted),
    Timeout(RequestTimeout),
    Copy(CopyNotInitiated),
    UnsupportedAuth(UnsupportedAuth),
}

unit_error! {
    /// The connection is closed, or was torn down while the request was queued.
    pub struct ConnectionClosed("connection closed");

    /// The backend discarded the request while skipping to the next `Sync`.
    pub struct PipelineAborted("request aborted by an earlier error in the pipeline");

    /// The caller stopped waiting for the response.
    pub struct RequestTimeout("request timed out");

    /// `copy_out` with a command that did not start a COPY OUT.
    pub struct CopyNotInitiated("command not initiated: COPY OUT");
}

/// Caller misuse detected before any message is sent.
pub enum SubmissionError {
    /// `max_rows` must not be negative.
    NegativeMaxRows(i32),
    /// Parameter formats must be empty, a single format, or one per parameter.
    ParameterFormats { formats: usize, params: usize },
    /// Postgres accepts at most `u16::MAX` parameters or formats.
    TooManyParameters(usize),
    /// The portal ran to completion or was closed.
    PortalNotResumable { portal: String },
    /// A parameter value longer than `i32::MAX` bytes.
    ValueTooLarge { index: usize, len: usize },
    /// Parameter values exceed the protocol message size.
    MessageTooLarge,
}

impl std::error::Error for SubmissionError { }

impl fmt::Display for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NegativeMaxRows(n) => write!(f, "max rows must not be negative, found {n}"),
            Self::ParameterFormats { formats, params } => write!(
                f,
                "parameter formats must be 0, 1, or equal to the {params} parameters, found {formats}"
            ),
            Self::TooManyParameters(n) => write!(f, "too many parameters: {n}"),
            Self::PortalNotResumable { portal } => write!(f, "portal `{portal}` is not resumable"),
            Self::ValueTooLarge { index, len } => write!(f, "parameter {index} is too large: {len} bytes"),
            Self::MessageTooLarge => f.write_str("parameter values exceed the message size limit"),
        }
    }
}

impl fmt::Debug for SubmissionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for Error {
            fn from($pat: $ty) -> Self {
                let backtrace = std::backtrace::Backtrace::capture();
                Self { context: String::new(), backtrace, kind: $body }
            }
        }
    };
}

from!(<ErrorKind>e => e);
from!(<ParseError>e => ErrorKind::Config(e));
from!(<ProtocolError>e => ErrorKind::Protocol(e));
from!(<io::Error>e => ErrorKind::Io(e));
from!(<Notice>e => ErrorKind::Database(e));
from!(<SubmissionError>e => ErrorKind::Submission(e));
from!(<ConnectionClosed>e => ErrorKind::Closed(e));
from!(<PipelineAborted>e => ErrorKind::Aborted(e));
from!(<RequestTimeout>e => ErrorKind::Timeout(e));
from!(<CopyNotInitiated>e => ErrorKind::Copy(e));
from!(<UnsupportedAuth>e => ErrorKind::UnsupportedAuth(e));

impl std::error::Error for Error { }

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.context.is_empty() {
            write!(f, "{}: ", self.context)?;
        }

        fmt::Display::fmt(&self.kind, f)?;

        if let std::backtrace::BacktraceStatus::Captured = self.backtrace.status() {
            let mut backtrace = self.backtrace.to_string();
            write!(f, "\n\n")?;
            writeln!(f, "Stack backtrace:")?;
            backtrace.truncate(backtrace.trim_end().len());
            write!(f, "{}", backtrace)?;
        }

        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl std::error::Error for ErrorKind { }

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => fmt::Display::fmt(e, f),
            Self::Protocol(e) => fmt::Display::fmt(e, f),
            Self::Io(e) => fmt::Display::fmt(e, f),
            Self::Database(e) => fmt::Display::fmt(e, f),
            Self::Submission(e) => fmt::Display::fmt(e, f),
            Self::Closed(e) => fmt::Display::fmt(e, f),
            Self::Aborted(e) => fmt::Display::fmt(e, f),
            Self::Timeout(e) => fmt::Display::fmt(e, f),
            Self::Copy(e) => fmt::Display::fmt(e, f),
            Self::UnsupportedAuth(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}
