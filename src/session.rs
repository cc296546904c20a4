use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::Span;

use crate::config::Config;
use crate::endpoint::{Connector, Endpoint, IdleHandle};
use crate::error::{ConnectError, Error, FetchError, Result};
use crate::remote::ImapConnector;
use crate::router::EventRouter;
use crate::trace::Trace;
use crate::types::{Capability, CapabilitySet, FolderStatus, RawFetchedMessage, SequenceRange};
use crate::watch::{self, Canceller, Watch};

/// An open connection with the folder selected.
pub(crate) struct Connected {
    endpoint: Box<dyn Endpoint>,
    num_messages: u32,
    uid_next: Option<u32>,
    capabilities: CapabilitySet,
}

/// The connection as seen by both the [`Session`] and its watch loop.
///
/// The lock is only ever held for the duration of a single endpoint call.
#[derive(Clone)]
pub(crate) struct Shared {
    inner: Arc<Mutex<Option<Connected>>>,
    turn: Arc<Mutex<()>>,
}

impl Shared {
    fn new() -> Self {
        Shared {
            inner: Arc::new(Mutex::new(None)),
            turn: Arc::new(Mutex::new(())),
        }
    }

    /// Held by a watch loop for as long as it runs, so a restarted watch waits for the
    /// cancelled one to leave `IDLE`.
    pub(crate) fn turn(&self) -> MutexGuard<'_, ()> {
        self.turn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connected>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_endpoint<T>(&self, f: impl FnOnce(&mut dyn Endpoint) -> Result<T>) -> Result<T> {
        match *self.lock() {
            Some(ref mut conn) => f(&mut *conn.endpoint),
            None => Err(Error::NotConnected),
        }
    }

    pub(crate) fn start_idle(&self) -> Result<Box<dyn IdleHandle>> {
        self.with_endpoint(|endpoint| endpoint.idle())
    }

    pub(crate) fn fetch_range(
        &self,
        range: &SequenceRange,
    ) -> std::result::Result<Vec<RawFetchedMessage>, FetchError> {
        self.with_endpoint(|endpoint| endpoint.fetch(range))
            .map_err(|source| FetchError {
                range: *range,
                source,
            })
    }

    pub(crate) fn num_messages(&self) -> Option<u32> {
        self.lock().as_ref().map(|conn| conn.num_messages)
    }

    pub(crate) fn set_num_messages(&self, count: u32) {
        if let Some(ref mut conn) = *self.lock() {
            conn.num_messages = count;
        }
    }

    /// Drop the connection and log out. The lock is released before logging out.
    pub(crate) fn close(&self) -> Result<()> {
        let conn = self.lock().take();
        match conn {
            Some(mut conn) => conn.endpoint.logout(),
            None => Ok(()),
        }
    }
}

/// A connection to one folder of a mailbox server.
///
/// ```no_run
/// use mailwatch::{ConfigBuilder, Session};
///
/// let config = ConfigBuilder::new("imap.example.com", "me@example.com", "password").build();
/// let mut session = Session::new(config);
/// session.connect()?;
///
/// let watch = session.wait_for_messages()?;
/// for message in watch.messages() {
///     println!("{}", message.subject()?);
/// }
/// watch.done().recv()??;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Session {
    config: Config,
    connector: Box<dyn Connector>,
    router: EventRouter,
    shared: Shared,
    watch: Option<Canceller>,
    span: Span,
}

impl Session {
    /// A session that talks to a real server through the `imap` crate.
    pub fn new(config: Config) -> Self {
        Session::with_connector(config, ImapConnector)
    }

    /// A session that reaches the server through `connector`.
    pub fn with_connector(config: Config, connector: impl Connector + 'static) -> Self {
        let span = tracing::info_span!("mailbox", folder = %config.folder());
        Session {
            router: EventRouter::new(span.clone()),
            connector: Box::new(connector),
            shared: Shared::new(),
            watch: None,
            config,
            span,
        }
    }

    /// Connect, log in, and select the configured folder.
    ///
    /// An existing connection is closed first. If the folder cannot be selected, the folders that
    /// do exist are logged before the error is returned.
    pub fn connect(&mut self) -> std::result::Result<(), ConnectError> {
        self.disconnect();

        let handler = self
            .router
            .handler()
            .map_err(|e| ConnectError::Network(Error::Io(e)))?;
        let trace = Trace::new(self.config.password(), self.span.clone());
        let mut endpoint = self
            .connector
            .dial(&self.config, handler, trace)
            .map_err(ConnectError::Network)?;

        if let Err(e) = endpoint.login(self.config.username(), self.config.password()) {
            self.close(endpoint);
            return Err(ConnectError::Auth(e));
        }

        let selected = match endpoint.select(self.config.folder()) {
            Ok(selected) => selected,
            Err(e) => {
                self.log_folders(&mut *endpoint);
                self.close(endpoint);
                return Err(ConnectError::FolderNotFound {
                    folder: self.config.folder().to_string(),
                    source: e,
                });
            }
        };

        let capabilities = endpoint.capabilities().unwrap_or_else(|e| {
            tracing::warn!(parent: &self.span, error = %e, "could not read capabilities");
            CapabilitySet::default()
        });

        tracing::info!(
            parent: &self.span,
            supports_imap4rev1 = capabilities.has(&Capability::Imap4rev1),
            supports_imap4rev2 = capabilities.has(&Capability::Imap4rev2),
            supports_idle = capabilities.has(&Capability::Idle),
            uid_next = ?selected.uid_next,
            num_messages = selected.exists,
            "connected"
        );

        *self.shared.lock() = Some(Connected {
            endpoint,
            num_messages: selected.exists,
            uid_next: selected.uid_next,
            capabilities,
        });
        Ok(())
    }

    fn log_folders(&self, endpoint: &mut dyn Endpoint) {
        match endpoint.list("", "*") {
            Ok(folders) => {
                tracing::info!(parent: &self.span, "available folders:");
                for folder in folders {
                    tracing::info!(
                        parent: &self.span,
                        messages = ?folder.messages(),
                        unseen = ?folder.unseen(),
                        "{}",
                        folder.name()
                    );
                }
            }
            Err(e) => {
                tracing::warn!(parent: &self.span, error = %e, "could not list folders");
            }
        }
    }

    fn close(&self, mut endpoint: Box<dyn Endpoint>) {
        if let Err(e) = endpoint.logout() {
            tracing::debug!(parent: &self.span, error = %e, "logout failed");
        }
    }

    /// Fetch every message in `range`. Either all of them come back or none do.
    pub fn fetch_range(
        &self,
        range: &SequenceRange,
    ) -> std::result::Result<Vec<RawFetchedMessage>, FetchError> {
        self.shared.fetch_range(range)
    }

    /// All folders on the server.
    pub fn list_folders(&self) -> Result<Vec<FolderStatus>> {
        self.shared.with_endpoint(|endpoint| endpoint.list("", "*"))
    }

    /// Start watching the folder for new messages on a background thread.
    ///
    /// A watch that is already running is cancelled first.
    pub fn wait_for_messages(&mut self) -> Result<Watch> {
        self.cancel_watch();
        if self.shared.num_messages().is_none() {
            return Err(Error::NotConnected);
        }
        let watch = watch::spawn(self.shared.clone(), &self.router, self.span.clone())?;
        self.watch = Some(watch.canceller());
        Ok(watch)
    }

    fn cancel_watch(&mut self) {
        if let Some(canceller) = self.watch.take() {
            canceller.cancel();
        }
    }

    /// Stop any watch and log out. Calling this on a closed session does nothing.
    ///
    /// This never waits for the watch loop to finish.
    pub fn disconnect(&mut self) {
        self.cancel_watch();
        if let Err(e) = self.shared.close() {
            tracing::debug!(parent: &self.span, error = %e, "logout failed");
        }
    }

    /// Whether the session currently holds a connection.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().is_some()
    }

    /// How many messages the folder held when last looked at.
    pub fn message_count(&self) -> Option<u32> {
        self.shared.num_messages()
    }

    /// The next UID the server reported when the folder was selected.
    pub fn uid_next(&self) -> Option<u32> {
        self.shared.lock().as_ref().and_then(|conn| conn.uid_next)
    }

    /// What the server said it supports.
    pub fn capabilities(&self) -> Option<CapabilitySet> {
        self.shared
            .lock()
            .as_ref()
            .map(|conn| conn.capabilities.clone())
    }

    /// The folder this session watches.
    pub fn folder(&self) -> &str {
        self.config.folder()
    }

    /// Subscribe to server pushes, such as expunges, directly.
    pub fn events(&self) -> &EventRouter {
        &self.router
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}
