//! Error types shared by decoders, links and workers.

use std::time::Duration;

use crate::mailbox::MailboxError;

/// Errors raised while opening a link or acquiring frames from it.
///
/// `LinkTimeout` and `MalformedRecord` are per-record conditions that a
/// worker logs and skips. Everything else ends the worker.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The physical link could not be opened or connected
    #[error("link unavailable: {0}")]
    LinkUnavailable(String),

    /// No record arrived within the read timeout
    #[error("no record within {0:?}")]
    LinkTimeout(Duration),

    /// A record arrived but could not be decoded
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// The remote end closed the link
    #[error("link closed by peer")]
    LinkClosed,

    /// Mailbox rejected the operation
    #[error(transparent)]
    Mailbox(#[from] MailboxError),

    /// I/O error from the underlying transport
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// BLE stack error
    #[error("BLE error: {0}")]
    Ble(#[from] btleplug::Error),

    /// Invalid configuration value
    #[error("configuration error: {0}")]
    Config(String),

    /// The worker was forcibly aborted by its supervisor
    #[error("worker aborted")]
    Aborted,

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether a worker may skip this error and keep acquiring.
    pub fn is_per_record(&self) -> bool {
        matches!(self, Error::LinkTimeout(_) | Error::MalformedRecord(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedRecord(e.to_string())
    }
}

impl From<tokio_util::codec::LinesCodecError> for Error {
    fn from(e: tokio_util::codec::LinesCodecError) -> Self {
        match e {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => {
                Error::MalformedRecord("line exceeds maximum length".into())
            }
            tokio_util::codec::LinesCodecError::Io(e) => Error::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
