//! What this crate needs from a remote mailbox.
//!
//! The session and the watch loop never speak IMAP themselves. They drive an [`Endpoint`], which
//! a [`Connector`] produces, and they learn about server-initiated changes through the
//! [`UnilateralHandler`] handed to the connector at dial time. [`crate::remote`] provides the
//! implementation backed by the `imap` crate.

use std::fmt;

use crate::config::Config;
use crate::error::Result;
use crate::trace::Trace;
use crate::types::{
    CapabilitySet, FetchEvent, FolderStatus, MailboxStatusEvent, RawFetchedMessage, SelectedFolder,
    Seq, SequenceRange,
};

/// Opens connections to a mailbox server.
pub trait Connector: Send + Sync {
    /// Connect to the server named in `config`. The returned endpoint is not yet authenticated.
    ///
    /// Every unilateral response the endpoint reads from now on must be reported to `handler`,
    /// and every protocol line to `trace`.
    fn dial(
        &self,
        config: &Config,
        handler: UnilateralHandler,
        trace: Trace,
    ) -> Result<Box<dyn Endpoint>>;
}

/// One connection to a mailbox server.
///
/// Only one command runs at a time. While an [`IdleHandle`] is outstanding, other commands fail
/// with [`Error::IdleInProgress`](crate::Error::IdleInProgress), except `logout`, which abandons
/// the idle.
pub trait Endpoint: Send {
    /// Authenticate with `LOGIN`.
    fn login(&mut self, username: &str, password: &str) -> Result<()>;

    /// Select `folder` for reading.
    fn select(&mut self, folder: &str) -> Result<SelectedFolder>;

    /// Ask the server what it supports.
    fn capabilities(&mut self) -> Result<CapabilitySet>;

    /// Enter `IDLE`. Push events keep arriving at the handler until the idle is closed.
    fn idle(&mut self) -> Result<Box<dyn IdleHandle>>;

    /// Fetch envelope, flags, internal date, size and the full body of every message in `range`.
    fn fetch(&mut self, range: &SequenceRange) -> Result<Vec<RawFetchedMessage>>;

    /// Run `LIST reference pattern`.
    fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<FolderStatus>>;

    /// Log out and shut the connection down.
    fn logout(&mut self) -> Result<()>;
}

impl fmt::Debug for dyn Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Endpoint")
    }
}

/// An `IDLE` in progress.
pub trait IdleHandle: Send {
    /// Ask the server to end the idle (send `DONE`).
    fn close(&mut self) -> Result<()>;

    /// Block until the server has confirmed the end of the idle.
    fn wait(self: Box<Self>) -> Result<()>;
}

type Callback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Where an endpoint reports what the server says without being asked.
///
/// The callbacks run on whatever thread the endpoint reads responses on. They may block while a
/// subscriber catches up, which holds up that thread.
pub struct UnilateralHandler {
    expunge: Callback<Seq>,
    mailbox: Callback<MailboxStatusEvent>,
    fetch: Callback<FetchEvent>,
}

impl UnilateralHandler {
    /// Build a handler from one callback per kind of push.
    pub fn new<E, M, F>(expunge: E, mailbox: M, fetch: F) -> Self
    where
        E: Fn(Seq) + Send + Sync + 'static,
        M: Fn(MailboxStatusEvent) + Send + Sync + 'static,
        F: Fn(FetchEvent) + Send + Sync + 'static,
    {
        UnilateralHandler {
            expunge: Box::new(expunge),
            mailbox: Box::new(mailbox),
            fetch: Box::new(fetch),
        }
    }

    /// A handler that drops everything.
    pub fn ignore() -> Self {
        UnilateralHandler::new(|_| {}, |_| {}, |_| {})
    }

    /// Message `seq` was expunged.
    pub fn expunge(&self, seq: Seq) {
        (self.expunge)(seq)
    }

    /// The mailbox status changed.
    pub fn mailbox(&self, event: MailboxStatusEvent) {
        (self.mailbox)(event)
    }

    /// The server sent a `FETCH` nobody asked for.
    pub fn fetch(&self, event: FetchEvent) {
        (self.fetch)(event)
    }
}

impl fmt::Debug for UnilateralHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UnilateralHandler")
    }
}
