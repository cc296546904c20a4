//! [`Connector`] and [`Endpoint`] on top of the `imap` crate.
//!
//! The `imap` crate blocks the calling thread for the whole length of an `IDLE`. To let the watch
//! loop race server pushes against cancellation, [`Endpoint::idle`] hands the IMAP session to a
//! worker thread that keeps re-issuing `IDLE` until the server reports a new message count, the
//! idle is closed, or something fails. The worker then parks the session again.
//!
//! Untagged responses that arrive in the middle of another command are queued by the `imap`
//! crate and drained after every command. Expunges and fetches go to the [`UnilateralHandler`]
//! right away. A new message count is held back and reported by the next idle worker, which then
//! returns without issuing `IDLE`.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use imap::extensions::idle::WaitOutcome;
use imap::types::UnsolicitedResponse;
use imap::{ClientBuilder, ConnectionMode};

use crate::config::{Config, TlsMode};
use crate::endpoint::{Connector, Endpoint, IdleHandle, UnilateralHandler};
use crate::error::{Error, Result};
use crate::trace::Trace;
use crate::types::{
    CapabilitySet, FetchEvent, Flag, FolderStatus, MailboxStatusEvent, RawFetchedMessage,
    SelectedFolder, SequenceRange,
};

type ImapClient = imap::Client<imap::Connection>;
type ImapSession = imap::Session<imap::Connection>;

/// `BODY.PEEK[]` leaves the `\Seen` flag alone.
const FETCH_QUERY: &str = "(ENVELOPE FLAGS INTERNALDATE RFC822.SIZE BODY.PEEK[])";

const STATUS_ITEMS: &str = "(MESSAGES UNSEEN)";

/// Capabilities looked up after login.
const KNOWN_CAPABILITIES: &[&str] = &[
    "IMAP4rev1",
    "IMAP4rev2",
    "IDLE",
    "STARTTLS",
    "LOGINDISABLED",
    "UIDPLUS",
    "CONDSTORE",
    "LIST-STATUS",
    "AUTH=PLAIN",
    "AUTH=LOGIN",
    "AUTH=XOAUTH2",
];

fn from_imap(err: imap::Error) -> Error {
    match err {
        imap::Error::Io(e) => Error::Io(e),
        imap::Error::ConnectionLost => Error::ConnectionLost,
        other @ imap::Error::No(_) => Error::No(other.to_string()),
        other @ imap::Error::Bad(_) => Error::Bad(other.to_string()),
        other => Error::Protocol(other.to_string()),
    }
}

fn connection_mode(mode: TlsMode) -> Result<ConnectionMode> {
    match mode {
        TlsMode::Auto => Ok(ConnectionMode::Auto),
        TlsMode::Plaintext => Ok(ConnectionMode::Plaintext),
        #[cfg(any(feature = "native-tls", feature = "rustls-tls"))]
        TlsMode::Tls => Ok(ConnectionMode::Tls),
        #[cfg(any(feature = "native-tls", feature = "rustls-tls"))]
        TlsMode::StartTls => Ok(ConnectionMode::StartTls),
        #[cfg(not(any(feature = "native-tls", feature = "rustls-tls")))]
        other => Err(Error::Protocol(format!(
            "{:?} needs the native-tls or rustls-tls feature",
            other
        ))),
    }
}

fn convert_flag(flag: &imap::types::Flag<'_>) -> Flag {
    use imap::types::Flag as F;
    match flag {
        F::Seen => Flag::Seen,
        F::Answered => Flag::Answered,
        F::Flagged => Flag::Flagged,
        F::Deleted => Flag::Deleted,
        F::Draft => Flag::Draft,
        F::Recent => Flag::Recent,
        F::Custom(name) => Flag::from(&**name),
        #[allow(unreachable_patterns)]
        other => Flag::Custom(format!("{:?}", other)),
    }
}

/// Connects through the `imap` crate.
///
/// The transport follows [`Config::tls_mode`]; implicit TLS and `STARTTLS` need the `native-tls`
/// or `rustls-tls` feature.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImapConnector;

impl Connector for ImapConnector {
    fn dial(
        &self,
        config: &Config,
        handler: UnilateralHandler,
        trace: Trace,
    ) -> Result<Box<dyn Endpoint>> {
        let mode = connection_mode(config.tls_mode())?;
        tracing::debug!(
            host = config.host(),
            port = config.port(),
            mode = ?config.tls_mode(),
            "connecting"
        );

        let builder = ClientBuilder::new(config.host(), config.port()).mode(mode);
        #[cfg(any(feature = "native-tls", feature = "rustls-tls"))]
        let builder = builder.danger_skip_tls_verify(config.danger_skip_tls_verify());
        let client = builder.connect().map_err(from_imap)?;

        Ok(Box::new(ImapEndpoint::new(
            client,
            handler,
            trace,
            config.idle_refresh(),
        )))
    }
}

/// Shared between an endpoint, its idle handle and the idle worker.
#[derive(Debug, Default)]
struct IdleControl {
    stop: AtomicBool,
    logout: AtomicBool,
}

type Worker = Arc<Mutex<Option<JoinHandle<Result<()>>>>>;
type Parked = Arc<Mutex<Option<ImapSession>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reports untagged responses and keeps the last known message count.
#[derive(Clone)]
struct Unilateral {
    exists: Arc<AtomicU32>,
    /// A count arrived outside of `IDLE` and the handler has not heard of it.
    stale: Arc<AtomicBool>,
    handler: Arc<UnilateralHandler>,
    trace: Trace,
}

impl Unilateral {
    fn new(handler: UnilateralHandler, trace: Trace) -> Self {
        Unilateral {
            exists: Arc::new(AtomicU32::new(0)),
            stale: Arc::new(AtomicBool::new(false)),
            handler: Arc::new(handler),
            trace,
        }
    }

    /// Report a response read during `IDLE`. Returns false once the message count changed.
    fn route(&self, response: UnsolicitedResponse) -> bool {
        self.trace.server(&format!("{:?}", response));
        match response {
            UnsolicitedResponse::Exists(count) => {
                self.exists.store(count, Ordering::SeqCst);
                self.stale.store(false, Ordering::SeqCst);
                self.handler.mailbox(MailboxStatusEvent::exists(count));
                false
            }
            UnsolicitedResponse::Expunge(seq) => {
                let _ = self
                    .exists
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                        Some(n.saturating_sub(1))
                    });
                self.handler.expunge(seq);
                true
            }
            UnsolicitedResponse::Fetch { id, .. } => {
                self.handler.fetch(FetchEvent { seq: id });
                true
            }
            _ => true,
        }
    }

    /// Route whatever the `imap` crate queued while a command ran.
    fn drain(&self, session: &ImapSession) {
        for response in session.unsolicited_responses.try_iter() {
            match response {
                UnsolicitedResponse::Exists(count) => {
                    self.trace.server(&format!("Exists({})", count));
                    self.exists.store(count, Ordering::SeqCst);
                    self.stale.store(true, Ordering::SeqCst);
                }
                other => {
                    self.route(other);
                }
            }
        }
    }

    /// Tell the handler about a held-back count. Returns whether there was one.
    fn flush(&self) -> bool {
        if !self.stale.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.wake();
        true
    }

    /// Push the count as it stands.
    fn wake(&self) {
        self.handler
            .mailbox(MailboxStatusEvent::exists(self.exists.load(Ordering::SeqCst)));
    }
}

struct ImapEndpoint {
    /// Until login succeeds.
    client: Option<ImapClient>,
    /// Empty while an idle worker holds the session.
    session: Parked,
    logged_in: bool,
    /// Whether `LIST` can carry `STATUS` counts. Unknown until capabilities are asked for.
    list_status: Option<bool>,
    worker: Worker,
    control: Option<Arc<IdleControl>>,
    unilateral: Unilateral,
    trace: Trace,
    refresh: Duration,
}

impl ImapEndpoint {
    fn new(
        client: ImapClient,
        handler: UnilateralHandler,
        trace: Trace,
        refresh: Duration,
    ) -> Self {
        ImapEndpoint {
            client: Some(client),
            session: Arc::new(Mutex::new(None)),
            logged_in: false,
            list_status: None,
            worker: Arc::new(Mutex::new(None)),
            control: None,
            unilateral: Unilateral::new(handler, trace.clone()),
            trace,
            refresh,
        }
    }

    /// Take back the session from a finished idle worker. Never waits on one still running.
    fn settle(&mut self) -> Result<()> {
        let control = match self.control {
            Some(ref control) => control,
            None => return Ok(()),
        };
        if !control.stop.load(Ordering::SeqCst) {
            return Err(Error::IdleInProgress);
        }
        {
            let mut worker = lock(&self.worker);
            match worker.take() {
                Some(running) if !running.is_finished() => {
                    *worker = Some(running);
                    return Err(Error::IdleInProgress);
                }
                Some(finished) => {
                    let _ = finished.join();
                }
                None => {}
            }
        }
        self.control = None;
        Ok(())
    }

    /// Run one command on the parked session. `line` is what gets traced once it is sent.
    fn run<T>(
        &mut self,
        line: &str,
        command: impl FnOnce(&mut ImapSession) -> imap::Result<T>,
    ) -> Result<T> {
        if !self.logged_in {
            return Err(Error::NotConnected);
        }
        self.settle()?;
        let mut parked = lock(&self.session);
        let session = parked.as_mut().ok_or(Error::NotConnected)?;
        self.trace.client(line);
        let result = command(session).map_err(from_imap);
        self.unilateral.drain(session);
        result
    }
}

impl Endpoint for ImapEndpoint {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let client = self.client.take().ok_or(Error::NotConnected)?;
        self.trace.client(&format!("LOGIN {} ***", username));
        match client.login(username, password) {
            Ok(session) => {
                *lock(&self.session) = Some(session);
                self.logged_in = true;
                Ok(())
            }
            Err((e, client)) => {
                self.client = Some(client);
                Err(from_imap(e))
            }
        }
    }

    fn select(&mut self, folder: &str) -> Result<SelectedFolder> {
        let line = format!("SELECT {}", folder);
        let mailbox = self.run(&line, |session| session.select(folder))?;
        self.unilateral
            .exists
            .store(mailbox.exists, Ordering::SeqCst);
        Ok(SelectedFolder {
            exists: mailbox.exists,
            uid_next: mailbox.uid_next,
        })
    }

    fn capabilities(&mut self) -> Result<CapabilitySet> {
        let caps: CapabilitySet = self.run("CAPABILITY", |session| {
            let caps = session.capabilities()?;
            Ok(KNOWN_CAPABILITIES
                .iter()
                .copied()
                .filter(|atom| caps.has_str(*atom))
                .collect())
        })?;
        self.list_status = Some(caps.has_str("LIST-STATUS"));
        Ok(caps)
    }

    fn idle(&mut self) -> Result<Box<dyn IdleHandle>> {
        if !self.logged_in {
            return Err(Error::NotConnected);
        }
        if let Some(ref control) = self.control {
            if !control.stop.load(Ordering::SeqCst) {
                return Err(Error::IdleInProgress);
            }
        }

        // An abandoned worker may still hold the session; the new one queues up behind it.
        let control = Arc::new(IdleControl::default());
        let mut worker = lock(&self.worker);
        let job = IdleJob {
            previous: worker.take(),
            control: Arc::clone(&control),
            slot: Arc::clone(&self.session),
            unilateral: self.unilateral.clone(),
            trace: self.trace.clone(),
            refresh: self.refresh,
        };
        let spawned = thread::Builder::new()
            .name("mailwatch-idle".to_string())
            .spawn(move || job.run())
            .map_err(Error::Io)?;
        *worker = Some(spawned);
        drop(worker);

        self.control = Some(Arc::clone(&control));
        Ok(Box::new(ImapIdle {
            control,
            worker: Arc::clone(&self.worker),
        }))
    }

    fn fetch(&mut self, range: &SequenceRange) -> Result<Vec<RawFetchedMessage>> {
        let line = format!("FETCH {} {}", range, FETCH_QUERY);
        self.run(&line, |session| {
            let fetches = session.fetch(range.to_string(), FETCH_QUERY)?;
            Ok(fetches
                .iter()
                .map(|fetch| {
                    let mut raw = RawFetchedMessage::new(
                        fetch.message,
                        fetch.body().unwrap_or_default().to_vec(),
                    )
                    .with_flags(fetch.flags().iter().map(convert_flag).collect());
                    if let Some(date) = fetch.internal_date() {
                        raw = raw.with_internal_date(date);
                    }
                    if let Some(size) = fetch.size {
                        raw = raw.with_size(size);
                    }
                    if let Some(subject) = fetch.envelope().and_then(|e| e.subject.as_ref()) {
                        raw = raw.with_envelope_subject(subject.to_vec());
                    }
                    raw
                })
                .collect())
        })
    }

    fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<FolderStatus>> {
        let extended = match self.list_status {
            Some(extended) => extended,
            None => self
                .capabilities()
                .map(|caps| caps.has_str("LIST-STATUS"))
                .unwrap_or(false),
        };
        if !extended {
            let line = format!("LIST \"{}\" {}", reference, pattern);
            return self.run(&line, |session| {
                let names = session.list(Some(reference), Some(pattern))?;
                Ok(names
                    .iter()
                    .map(|name| FolderStatus::new(name.name()))
                    .collect())
            });
        }

        let line = format!(
            "LIST \"{}\" {} RETURN (STATUS {})",
            reference, pattern, STATUS_ITEMS
        );
        self.run(&line, |session| {
            let names = session.list_status(Some(reference), Some(pattern), STATUS_ITEMS)?;
            Ok(names
                .iter()
                .map(|(name, status)| match status {
                    Some(status) => FolderStatus {
                        name: name.name().to_string(),
                        messages: Some(status.exists),
                        unseen: status.unseen,
                    },
                    None => FolderStatus::new(name.name()),
                })
                .collect())
        })
    }

    fn logout(&mut self) -> Result<()> {
        if self.client.take().is_some() {
            return Ok(());
        }
        if !self.logged_in {
            return Err(Error::NotConnected);
        }
        self.logged_in = false;

        if let Some(ref control) = self.control {
            control.stop.store(true, Ordering::SeqCst);
            control.logout.store(true, Ordering::SeqCst);
        }
        // A session still held by an idle worker is logged out by the worker.
        let session = lock(&self.session).take();
        match session {
            Some(mut session) => {
                self.trace.client("LOGOUT");
                session.logout().map_err(from_imap)
            }
            None => Ok(()),
        }
    }
}

struct IdleJob {
    /// An abandoned worker that may not have parked the session yet.
    previous: Option<JoinHandle<Result<()>>>,
    control: Arc<IdleControl>,
    slot: Parked,
    unilateral: Unilateral,
    trace: Trace,
    refresh: Duration,
}

impl IdleJob {
    fn run(mut self) -> Result<()> {
        if let Some(previous) = self.previous.take() {
            let _ = previous.join();
        }
        let session = lock(&self.slot).take();
        let mut session = match session {
            Some(session) => session,
            None => {
                self.unilateral.wake();
                return Err(Error::NotConnected);
            }
        };

        let result = self.idle(&mut session);
        if result.is_err() {
            // The failure itself is reported when the idle is waited on.
            self.unilateral.wake();
        }
        self.unilateral.drain(&session);
        self.park(session);
        result
    }

    fn idle(&self, session: &mut ImapSession) -> Result<()> {
        if self.stopped() || self.unilateral.flush() {
            return Ok(());
        }
        while !self.stopped() {
            self.trace.client("IDLE");
            let outcome = session
                .idle()
                .timeout(self.refresh)
                .keepalive(false)
                .wait_while(|response| self.unilateral.route(response) && !self.stopped())
                .map_err(from_imap)?;
            self.trace.client("DONE");
            if let WaitOutcome::MailboxChanged = outcome {
                break;
            }
        }
        Ok(())
    }

    fn stopped(&self) -> bool {
        self.control.stop.load(Ordering::SeqCst)
    }

    fn park(&self, mut session: ImapSession) {
        let mut slot = lock(&self.slot);
        if self.control.logout.load(Ordering::SeqCst) {
            drop(slot);
            self.trace.client("LOGOUT");
            let _ = session.logout();
        } else {
            *slot = Some(session);
        }
    }
}

struct ImapIdle {
    control: Arc<IdleControl>,
    worker: Worker,
}

impl IdleHandle for ImapIdle {
    fn close(&mut self) -> Result<()> {
        self.control.stop.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn wait(self: Box<Self>) -> Result<()> {
        let worker = lock(&self.worker).take();
        match worker {
            Some(worker) => worker
                .join()
                .unwrap_or_else(|_| Err(Error::Protocol("idle worker panicked".to_string()))),
            None => Ok(()),
        }
    }
}

impl Drop for ImapIdle {
    fn drop(&mut self) {
        self.control.stop.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigBuilder;
    use crate::mock_stream::{self, MockStream};
    use crate::types::Seq;
    use std::io::{self, Write};
    use std::net::TcpListener;
    use std::sync::mpsc::{self, Receiver};
    use std::time::Instant;
    use tracing::Span;

    const TIMEOUT: Duration = Duration::from_secs(5);

    const LOGIN_SELECT: &[u8] = b"a1 OK Logged in\r\n\
        * 3 EXISTS\r\n\
        * OK [UIDNEXT 4] Predicted next UID\r\n\
        a2 OK [READ-WRITE] Select completed\r\n";

    #[derive(Debug, PartialEq, Eq)]
    enum Event {
        Expunge(Seq),
        Mailbox(MailboxStatusEvent),
        Fetch(Seq),
    }

    struct Harness {
        endpoint: ImapEndpoint,
        events: Receiver<Event>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    fn connect(stream: MockStream) -> Harness {
        let written = stream.written();
        let (tx, events) = mpsc::sync_channel(16);
        let (expunge, mailbox, fetch) = (tx.clone(), tx.clone(), tx);
        let handler = UnilateralHandler::new(
            move |seq| {
                let _ = expunge.send(Event::Expunge(seq));
            },
            move |event| {
                let _ = mailbox.send(Event::Mailbox(event));
            },
            move |event: FetchEvent| {
                let _ = fetch.send(Event::Fetch(event.seq));
            },
        );
        let client = imap::Client::new(Box::new(stream) as imap::Connection);
        let mut endpoint = ImapEndpoint::new(
            client,
            handler,
            Trace::new("pw", Span::none()),
            Duration::from_secs(60),
        );
        endpoint.login("me", "pw").unwrap();
        let selected = endpoint.select("INBOX").unwrap();
        assert_eq!(selected.exists, 3);
        assert_eq!(selected.uid_next, Some(4));
        Harness {
            endpoint,
            events,
            written,
        }
    }

    fn wait_for_written(written: &Mutex<Vec<u8>>, needle: &str) {
        let deadline = Instant::now() + TIMEOUT;
        while !mock_stream::written(written).contains(needle) {
            assert!(Instant::now() < deadline, "never wrote {:?}", needle);
            thread::sleep(Duration::from_millis(5));
        }
    }

    fn join_worker(endpoint: &ImapEndpoint) -> Result<()> {
        let worker = lock(&endpoint.worker).take().unwrap();
        worker.join().unwrap()
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            lock(&self.0).extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn imap_errors_keep_their_shape() {
        assert_eq!(
            from_imap(imap::Error::ConnectionLost).kind(),
            Error::ConnectionLost.kind()
        );
        let io = from_imap(imap::Error::Io(io::Error::new(io::ErrorKind::TimedOut, "slow")));
        assert_eq!(io.kind(), crate::error::ErrorKind::Io(io::ErrorKind::TimedOut));
    }

    #[test]
    fn plaintext_is_always_available() {
        assert!(matches!(
            connection_mode(TlsMode::Plaintext),
            Ok(ConnectionMode::Plaintext)
        ));
        assert!(matches!(
            connection_mode(TlsMode::Auto),
            Ok(ConnectionMode::Auto)
        ));
    }

    #[test]
    fn dial_reports_a_refused_connection() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let config = ConfigBuilder::new("127.0.0.1", "me", "pw")
            .port(port)
            .tls_mode(TlsMode::Plaintext)
            .build();
        let dialed = ImapConnector.dial(
            &config,
            UnilateralHandler::ignore(),
            Trace::new("pw", Span::none()),
        );
        assert!(matches!(dialed, Err(Error::Io(_))));
    }

    #[test]
    fn idle_wait_without_worker_is_ok() {
        let idle = Box::new(ImapIdle {
            control: Arc::new(IdleControl::default()),
            worker: Arc::new(Mutex::new(None)),
        });
        let control = Arc::clone(&idle.control);
        assert!(idle.wait().is_ok());
        assert!(control.stop.load(Ordering::SeqCst));
    }

    #[test]
    fn only_commands_sent_are_traced() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            connect(MockStream::new(LOGIN_SELECT));
        });

        let output = mock_stream::written(&captured.0);
        assert!(output.contains("LOGIN me ***"), "{}", output);
        assert!(output.contains("SELECT INBOX"), "{}", output);
        assert!(!output.contains("LOGIN me pw"));
        assert!(!output.contains("OK LOGIN completed"));
        assert!(!output.contains("EXISTS"));
    }

    #[test]
    fn exists_during_idle_ends_the_worker() {
        let stream = MockStream::new(
            [
                LOGIN_SELECT,
                b"+ idling\r\n* 4 EXISTS\r\na3 OK Idle completed\r\n",
            ]
            .concat(),
        );
        let mut h = connect(stream);

        let idle = h.endpoint.idle().unwrap();
        assert!(idle.wait().is_ok());
        assert_eq!(
            h.events.recv_timeout(TIMEOUT).unwrap(),
            Event::Mailbox(MailboxStatusEvent::exists(4))
        );
        assert!(mock_stream::written(&h.written).ends_with("a3 IDLE\r\nDONE\r\n"));
        assert!(lock(&h.endpoint.session).is_some());
    }

    #[test]
    fn refused_idle_wakes_the_waiter() {
        let stream = MockStream::new([LOGIN_SELECT, b"a3 NO IDLE not allowed here\r\n"].concat());
        let mut h = connect(stream);

        let idle = h.endpoint.idle().unwrap();
        assert_eq!(
            h.events.recv_timeout(TIMEOUT).unwrap(),
            Event::Mailbox(MailboxStatusEvent::exists(3))
        );
        assert!(matches!(idle.wait(), Err(Error::No(_))));
        assert!(lock(&h.endpoint.session).is_some());
    }

    #[test]
    fn abandoned_idle_does_not_block_other_commands() {
        let (stream, server) = MockStream::fed(LOGIN_SELECT);
        let mut h = connect(stream);

        let idle = h.endpoint.idle().unwrap();
        wait_for_written(&h.written, "a3 IDLE");
        server.send(b"+ idling\r\n".to_vec()).unwrap();
        drop(idle);

        let started = Instant::now();
        assert!(matches!(
            h.endpoint.list("", "*"),
            Err(Error::IdleInProgress)
        ));
        assert!(started.elapsed() < TIMEOUT);

        server
            .send(b"* 2 EXPUNGE\r\na3 OK Idle completed\r\n".to_vec())
            .unwrap();
        assert_eq!(h.events.recv_timeout(TIMEOUT).unwrap(), Event::Expunge(2));
        assert!(join_worker(&h.endpoint).is_ok());

        server
            .send(
                b"* CAPABILITY IMAP4rev1 IDLE\r\na4 OK Capability completed\r\n\
                  * LIST () \".\" INBOX\r\na5 OK List completed\r\n"
                    .to_vec(),
            )
            .unwrap();
        let folders = h.endpoint.list("", "*").unwrap();
        assert_eq!(folders, vec![FolderStatus::new("INBOX")]);
        assert!(mock_stream::written(&h.written).ends_with("a5 LIST \"\" *\r\n"));
    }

    #[test]
    fn logout_during_idle_is_left_to_the_worker() {
        let (stream, server) = MockStream::fed(LOGIN_SELECT);
        let mut h = connect(stream);

        let _idle = h.endpoint.idle().unwrap();
        wait_for_written(&h.written, "a3 IDLE");
        server.send(b"+ idling\r\n".to_vec()).unwrap();
        assert!(h.endpoint.logout().is_ok());
        let range = SequenceRange::new(3, 4).unwrap();
        assert!(matches!(h.endpoint.fetch(&range), Err(Error::NotConnected)));

        server
            .send(
                b"* 4 EXISTS\r\na3 OK Idle completed\r\n* BYE see you\r\na4 OK Logout completed\r\n"
                    .to_vec(),
            )
            .unwrap();
        assert!(join_worker(&h.endpoint).is_ok());
        assert!(mock_stream::written(&h.written).ends_with("DONE\r\na4 LOGOUT\r\n"));
        assert!(lock(&h.endpoint.session).is_none());
    }

    #[test]
    fn exists_during_fetch_is_reported_by_the_next_idle() {
        let stream = MockStream::new(
            [
                LOGIN_SELECT,
                b"* 4 FETCH (FLAGS (\\Seen $Forwarded) INTERNALDATE \"08-Dec-2023 23:01:50 +0100\" \
                  RFC822.SIZE 17 ENVELOPE (\"Fri, 8 Dec 2023 23:01:39 +0100\" \"hi\" NIL NIL NIL \
                  NIL NIL NIL NIL NIL) BODY[] {17}\r\nSubject: hi\r\n\r\nyo)\r\n\
                  * 5 EXISTS\r\n\
                  * 1 EXPUNGE\r\n\
                  a3 OK Fetch completed\r\n",
            ]
            .concat(),
        );
        let mut h = connect(stream);

        let range = SequenceRange::new(3, 4).unwrap();
        let fetched = h.endpoint.fetch(&range).unwrap();
        assert_eq!(fetched.len(), 1);
        let raw = &fetched[0];
        assert_eq!(raw.seq, 4);
        assert_eq!(raw.body, b"Subject: hi\r\n\r\nyo");
        assert_eq!(
            raw.flags(),
            &[Flag::Seen, Flag::Custom("$Forwarded".to_string())]
        );
        assert_eq!(raw.size(), Some(17));
        assert_eq!(
            raw.internal_date().map(|d| d.to_rfc3339()),
            Some("2023-12-08T23:01:50+01:00".to_string())
        );
        assert_eq!(raw.envelope_subject(), Some(&b"hi"[..]));

        // The expunge goes out at once; the count waits for the next idle.
        assert_eq!(h.events.recv_timeout(TIMEOUT).unwrap(), Event::Expunge(1));
        assert!(h.events.try_recv().is_err());

        let idle = h.endpoint.idle().unwrap();
        assert!(idle.wait().is_ok());
        assert_eq!(
            h.events.recv_timeout(TIMEOUT).unwrap(),
            Event::Mailbox(MailboxStatusEvent::exists(4))
        );
        assert!(!mock_stream::written(&h.written).contains("IDLE"));
    }

    #[test]
    fn list_carries_counts_when_the_server_can() {
        let stream = MockStream::new(
            [
                LOGIN_SELECT,
                b"* CAPABILITY IMAP4rev1 IDLE LIST-STATUS\r\na3 OK Capability completed\r\n",
                b"* LIST () \".\" INBOX\r\n\
                  * STATUS INBOX (MESSAGES 3 UNSEEN 1)\r\n\
                  * LIST (\\HasNoChildren) \".\" Archive\r\n\
                  a4 OK List completed\r\n",
            ]
            .concat(),
        );
        let mut h = connect(stream);

        // Capabilities are asked for on the first listing.
        let folders = h.endpoint.list("", "*").unwrap();
        assert_eq!(folders.len(), 2);
        assert_eq!(folders[0].name(), "INBOX");
        assert_eq!(folders[0].messages(), Some(3));
        assert_eq!(folders[0].unseen(), Some(1));
        assert_eq!(folders[1], FolderStatus::new("Archive"));
        assert!(mock_stream::written(&h.written)
            .ends_with("a4 LIST \"\" * RETURN (STATUS (MESSAGES UNSEEN))\r\n"));
    }
}
