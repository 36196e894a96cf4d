//! Error handling for plexer.
//!
//! Every fallible operation returns [`Result`]. Its [`Error`] carries an
//! [`ErrorKind`] that says what sort of failure happened, borrowed from the
//! gRPC status codes, and the cause itself. Domain modules define their own
//! `thiserror` enums, such as [`QueueError`](crate::queue::QueueError) and
//! [`ResolveError`](crate::resolver::ResolveError), and convert them into
//! this type at module boundaries.
//!
//! # Example
//!
//! ```rust
//! use plexer::error::{Error, ErrorKind, Result};
//!
//! fn lookup(key: &str) -> Result<String> {
//!     Err(Error::not_found(format!("{key} is not cached")))
//! }
//!
//! assert_eq!(lookup("a").unwrap_err().kind, ErrorKind::NotFound);
//! ```

use std::fmt;

use thiserror::Error;

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// What went wrong, and why.
#[derive(Debug)]
pub struct Error {
    pub kind: ErrorKind,

    /// The underlying error, for display and downcasting.
    pub error: Cause,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure categories, named after the gRPC status codes.
#[derive(Clone, Copy, Debug, Eq, Error, Hash, PartialEq)]
pub enum ErrorKind {
    #[error("cancelled")]
    Cancelled,

    #[error("unknown error")]
    Unknown,

    #[error("invalid argument")]
    InvalidArgument,

    #[error("timed out")]
    DeadlineExceeded,

    #[error("not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("rate limited or out of space")]
    ResourceExhausted,

    #[error("not in a state to do that")]
    FailedPrecondition,

    #[error("aborted")]
    Aborted,

    #[error("out of range")]
    OutOfRange,

    #[error("unsupported")]
    Unimplemented,

    #[error("internal error")]
    Internal,

    #[error("unavailable")]
    Unavailable,

    #[error("data lost or corrupted")]
    DataLoss,

    #[error("not signed in or token rejected")]
    Unauthenticated,
}

impl Error {
    pub fn new<E: Into<Cause>>(kind: ErrorKind, error: E) -> Self {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// The cause as `E`, if it is one.
    #[must_use]
    pub fn downcast<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.error.downcast_ref()
    }
}

macro_rules! constructors {
    ($($name:ident => $kind:ident),+ $(,)?) => {
        impl Error {
            $(
                #[doc = concat!("An error of kind [`ErrorKind::", stringify!($kind), "`].")]
                pub fn $name<E: Into<Cause>>(error: E) -> Self {
                    Self::new(ErrorKind::$kind, error)
                }
            )+
        }
    };
}

constructors! {
    aborted => Aborted,
    cancelled => Cancelled,
    data_loss => DataLoss,
    deadline_exceeded => DeadlineExceeded,
    failed_precondition => FailedPrecondition,
    internal => Internal,
    invalid_argument => InvalidArgument,
    not_found => NotFound,
    out_of_range => OutOfRange,
    permission_denied => PermissionDenied,
    resource_exhausted => ResourceExhausted,
    unauthenticated => Unauthenticated,
    unavailable => Unavailable,
    unimplemented => Unimplemented,
    unknown => Unknown,
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.error)
    }
}

impl From<std::io::ErrorKind> for ErrorKind {
    fn from(kind: std::io::ErrorKind) -> Self {
        use std::io::ErrorKind as Io;

        match kind {
            Io::NotFound => Self::NotFound,
            Io::PermissionDenied => Self::PermissionDenied,
            Io::ConnectionRefused
            | Io::NotConnected
            | Io::AddrInUse
            | Io::AddrNotAvailable => Self::Unavailable,
            Io::ConnectionReset | Io::ConnectionAborted | Io::BrokenPipe => Self::Aborted,
            Io::TimedOut => Self::DeadlineExceeded,
            Io::Interrupted | Io::WouldBlock => Self::Cancelled,
            Io::InvalidInput | Io::InvalidData => Self::InvalidArgument,
            Io::UnexpectedEof => Self::DataLoss,
            Io::WriteZero | Io::OutOfMemory => Self::ResourceExhausted,
            _ => Self::Unknown,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.kind().into(), err)
    }
}

/// Status errors are split by code: `401` means the token was rejected,
/// `404` a missing resource, `429` throttling. Any other status is a server
/// that answered but cannot serve the request.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        use reqwest::StatusCode;

        let kind = match err.status() {
            Some(StatusCode::UNAUTHORIZED) => ErrorKind::Unauthenticated,
            Some(StatusCode::FORBIDDEN) => ErrorKind::PermissionDenied,
            Some(StatusCode::NOT_FOUND) => ErrorKind::NotFound,
            Some(StatusCode::TOO_MANY_REQUESTS) => ErrorKind::ResourceExhausted,
            Some(_) => ErrorKind::FailedPrecondition,
            None if err.is_timeout() => ErrorKind::DeadlineExceeded,
            None if err.is_connect() => ErrorKind::Unavailable,
            None if err.is_body() => ErrorKind::DataLoss,
            None if err.is_decode() => ErrorKind::InvalidArgument,
            None if err.is_builder() => ErrorKind::Internal,
            None if err.is_redirect() => ErrorKind::ResourceExhausted,
            None => ErrorKind::Unknown,
        };
        Self::new(kind, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        use serde_json::error::Category;

        let kind = match err.classify() {
            Category::Io => ErrorKind::Unknown,
            Category::Eof => ErrorKind::DataLoss,
            Category::Syntax | Category::Data => ErrorKind::InvalidArgument,
        };
        Self::new(kind, err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::internal(err)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(err)
    }
}

/// A background task that panicked or was aborted.
impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        let kind = if err.is_cancelled() {
            ErrorKind::Cancelled
        } else {
            ErrorKind::Internal
        };
        Self::new(kind, err.to_string())
    }
}

impl<S: stream_download::source::SourceStream> From<stream_download::StreamInitializationError<S>>
    for Error
{
    fn from(err: stream_download::StreamInitializationError<S>) -> Self {
        Self::unavailable(err.to_string())
    }
}

/// A stream that broke off lost data; one whose response was refused is
/// unavailable.
impl<C: stream_download::http::Client> From<stream_download::http::HttpStreamError<C>> for Error {
    fn from(err: stream_download::http::HttpStreamError<C>) -> Self {
        use stream_download::http::HttpStreamError;

        match err {
            HttpStreamError::FetchFailure(e) => Self::data_loss(e.to_string()),
            HttpStreamError::ResponseFailure(e) => Self::unavailable(e.to_string()),
        }
    }
}

/// No device is `NotFound`; a device that would not open is `Unavailable`.
impl From<rodio::StreamError> for Error {
    fn from(err: rodio::StreamError) -> Self {
        match err {
            rodio::StreamError::NoDevice => Self::not_found(err),
            _ => Self::unavailable(err),
        }
    }
}

impl From<rodio::PlayError> for Error {
    fn from(err: rodio::PlayError) -> Self {
        match err {
            rodio::PlayError::NoDevice => Self::not_found(err),
            rodio::PlayError::DecoderError(e) => e.into(),
        }
    }
}

/// Formats that no enabled decoder understands are `Unimplemented`; anything
/// else went wrong while reading the stream.
impl From<rodio::decoder::DecoderError> for Error {
    fn from(err: rodio::decoder::DecoderError) -> Self {
        match err {
            rodio::decoder::DecoderError::UnrecognizedFormat => Self::unimplemented(err),
            _ => Self::data_loss(err),
        }
    }
}

impl From<rodio::source::SeekError> for Error {
    fn from(err: rodio::source::SeekError) -> Self {
        match err {
            rodio::source::SeekError::NotSupported { .. } => Self::unimplemented(err.to_string()),
            _ => Self::unknown(err.to_string()),
        }
    }
}
