//! Errors that can occur while talking to a mailbox, watching it, and decoding what it delivers.

use std::error::Error as StdError;
use std::fmt;
use std::io::{self, Error as IoError};
use std::result;

use crate::types::SequenceRange;

/// A convenience wrapper around `Result` for [`Error`].
pub type Result<T> = result::Result<T, Error>;

/// A failure reported by a remote mailbox [`Endpoint`](crate::endpoint::Endpoint).
#[derive(Debug)]
#[non_exhaustive]
pub enum Error {
    /// An `io::Error` that occurred while trying to read or write to a network stream.
    Io(IoError),
    /// A BAD response from the IMAP server.
    Bad(String),
    /// A NO response from the IMAP server.
    No(String),
    /// The connection was terminated unexpectedly.
    ConnectionLost,
    /// Any other protocol failure the endpoint could not classify further.
    Protocol(String),
    /// The endpoint has no open connection, either because it was never established or because
    /// it has been logged out.
    NotConnected,
    /// A command was issued while an `IDLE` was still outstanding on the connection.
    IdleInProgress,
}

/// The shape of an [`Error`], without any of the free-form text that came with it.
///
/// Two failures with the same kind are considered to be the same failure when deciding whether a
/// watch loop is stuck; see [`crate::watch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`Error::Io`].
    Io(io::ErrorKind),
    /// See [`Error::Bad`].
    Bad,
    /// See [`Error::No`].
    No,
    /// See [`Error::ConnectionLost`].
    ConnectionLost,
    /// See [`Error::Protocol`].
    Protocol,
    /// See [`Error::NotConnected`].
    NotConnected,
    /// See [`Error::IdleInProgress`].
    IdleInProgress,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match *self {
            Error::Io(ref e) => ErrorKind::Io(e.kind()),
            Error::Bad(_) => ErrorKind::Bad,
            Error::No(_) => ErrorKind::No,
            Error::ConnectionLost => ErrorKind::ConnectionLost,
            Error::Protocol(_) => ErrorKind::Protocol,
            Error::NotConnected => ErrorKind::NotConnected,
            Error::IdleInProgress => ErrorKind::IdleInProgress,
        }
    }
}

impl From<IoError> for Error {
    fn from(err: IoError) -> Error {
        Error::Io(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::Io(ref e) => fmt::Display::fmt(e, f),
            Error::Bad(ref data) => write!(f, "Bad Response: {}", data),
            Error::No(ref data) => write!(f, "No Response: {}", data),
            Error::ConnectionLost => f.write_str("Connection Lost"),
            Error::Protocol(ref data) => write!(f, "Protocol Error: {}", data),
            Error::NotConnected => f.write_str("Not connected"),
            Error::IdleInProgress => f.write_str("IDLE in progress"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            Error::Io(ref e) => Some(e),
            _ => None,
        }
    }
}

/// Establishing a [`Session`](crate::Session) failed.
///
/// Connect errors are never retried internally; they are handed straight back to the caller.
#[derive(Debug)]
pub enum ConnectError {
    /// The server could not be reached, or the transport could not be set up.
    Network(Error),
    /// The server rejected the credentials.
    Auth(Error),
    /// The configured folder could not be selected.
    FolderNotFound {
        /// The folder that was asked for.
        folder: String,
        /// What the server said about it.
        source: Error,
    },
}

impl fmt::Display for ConnectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ConnectError::Network(ref e) => write!(f, "failed to connect: {}", e),
            ConnectError::Auth(ref e) => write!(f, "failed to log in: {}", e),
            ConnectError::FolderNotFound {
                ref folder,
                ref source,
            } => write!(f, "failed to select folder {:?}: {}", folder, source),
        }
    }
}

impl StdError for ConnectError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            ConnectError::Network(ref e) | ConnectError::Auth(ref e) => Some(e),
            ConnectError::FolderNotFound { ref source, .. } => Some(source),
        }
    }
}

/// Fetching a range of messages failed. No messages of the range were delivered.
#[derive(Debug)]
pub struct FetchError {
    /// The range that was requested.
    pub range: SequenceRange,
    /// Why it could not be fetched.
    pub source: Error,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to fetch messages {}: {}", self.range, self.source)
    }
}

impl StdError for FetchError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.source)
    }
}

/// A step of the `IDLE` exchange failed.
#[derive(Debug)]
pub enum IdleError {
    /// The server did not accept the `IDLE` command.
    Start(Error),
    /// Ending the `IDLE` (sending `DONE`) failed.
    Close(Error),
    /// The `IDLE` did not complete cleanly after it was closed.
    Wait(Error),
}

impl IdleError {
    /// The endpoint error underneath this one.
    pub fn inner(&self) -> &Error {
        match *self {
            IdleError::Start(ref e) | IdleError::Close(ref e) | IdleError::Wait(ref e) => e,
        }
    }
}

impl fmt::Display for IdleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            IdleError::Start(ref e) => write!(f, "failed to start IDLE: {}", e),
            IdleError::Close(ref e) => write!(f, "failed to close IDLE: {}", e),
            IdleError::Wait(ref e) => write!(f, "IDLE did not complete: {}", e),
        }
    }
}

impl StdError for IdleError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.inner())
    }
}

/// A raw message could not be turned into a [`Message`](crate::Message), or a decoded message
/// could not produce the requested content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The header block is not valid mail framing.
    MalformedHeader(String),
    /// A `multipart/alternative` message carries no usable `boundary` parameter.
    MissingBoundary,
    /// The multipart body does not follow its declared boundary.
    MalformedMultipart(String),
    /// The message has no part of the given content type.
    NotFound(String),
    /// An RFC 2047 encoded word could not be decoded.
    EncodedWord(String),
    /// An encoded word uses a charset that is not supported.
    Charset(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            DecodeError::MalformedHeader(ref why) => write!(f, "malformed header: {}", why),
            DecodeError::MissingBoundary => f.write_str("invalid multipart message type: no boundary"),
            DecodeError::MalformedMultipart(ref why) => write!(f, "malformed multipart body: {}", why),
            DecodeError::NotFound(ref content_type) => {
                write!(f, "content type {} not found", content_type)
            }
            DecodeError::EncodedWord(ref word) => write!(f, "malformed encoded word {:?}", word),
            DecodeError::Charset(ref charset) => write!(f, "unhandled charset {:?}", charset),
        }
    }
}

impl StdError for DecodeError {}

/// A failed iteration of the watch loop.
#[derive(Debug)]
pub enum LoopError {
    /// Entering or leaving `IDLE` failed.
    Idle(IdleError),
    /// Fetching the newly arrived messages failed.
    Fetch(FetchError),
}

impl From<IdleError> for LoopError {
    fn from(err: IdleError) -> LoopError {
        LoopError::Idle(err)
    }
}

impl From<FetchError> for LoopError {
    fn from(err: FetchError) -> LoopError {
        LoopError::Fetch(err)
    }
}

impl fmt::Display for LoopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            LoopError::Idle(ref e) => fmt::Display::fmt(e, f),
            LoopError::Fetch(ref e) => fmt::Display::fmt(e, f),
        }
    }
}

impl StdError for LoopError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match *self {
            LoopError::Idle(ref e) => Some(e),
            LoopError::Fetch(ref e) => Some(e),
        }
    }
}

/// The watch loop gave up: the same failure came back right after it had already been retried.
#[derive(Debug)]
pub struct WatchError {
    cause: LoopError,
}

impl WatchError {
    pub(crate) fn new(cause: LoopError) -> WatchError {
        WatchError { cause }
    }

    /// The failure that recurred.
    pub fn cause(&self) -> &LoopError {
        &self.cause
    }
}

impl fmt::Display for WatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unrecoverable error: {}", self.cause)
    }
}

impl StdError for WatchError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.cause)
    }
}
