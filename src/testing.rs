//! Enable the test_helpers feature to get a scripted, in-memory mailbox server for testing code
//! that uses a [`Session`](crate::Session).
//!
//! To use it, add a dev-dependency on this crate with the feature "test_helpers":
//!
//! ```toml
//! [dependencies]
//! mailwatch = { version = "0.1" }
//!
//! [dev-dependencies]
//! # mirror the same configuration your dependencies and add test_helpers
//! mailwatch = { version = "0.1", features = ["test_helpers"] }
//! ```
//!
//! A [`MockConnector`] is cheap to clone: keep one clone in the test to script the server and
//! inspect what was asked of it, and give another to the session.
//!
//! ```
//! use std::time::Duration;
//! use mailwatch::{testing::MockConnector, ConfigBuilder, Session};
//!
//! let mock = MockConnector::new();
//! let config = ConfigBuilder::new("mock", "me", "pw").build();
//! let mut session = Session::with_connector(config, mock.clone());
//! session.connect().unwrap();
//!
//! let watch = session.wait_for_messages().unwrap();
//! assert!(mock.wait_for_idle(Duration::from_secs(5)));
//! mock.deliver("Subject: hi\r\nContent-Type: text/plain\r\n\r\nhello");
//!
//! let message = watch.messages().recv().unwrap();
//! assert_eq!(message.plain_text().unwrap(), "hello");
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::endpoint::{Connector, Endpoint, IdleHandle, UnilateralHandler};
use crate::error::{Error, Result};
use crate::trace::Trace;
use crate::types::{
    CapabilitySet, FolderStatus, MailboxStatusEvent, RawFetchedMessage, SelectedFolder, Seq,
    SequenceRange,
};

/// A command the mock server received.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    /// A connection was opened.
    Dial,
    /// `LOGIN` with the given user name.
    Login(String),
    /// `SELECT` of the given folder.
    Select(String),
    /// `CAPABILITY`.
    Capabilities,
    /// `IDLE` was entered.
    Idle,
    /// `DONE` was sent.
    IdleClose,
    /// The end of the idle was awaited.
    IdleWait,
    /// `FETCH` of the given range.
    Fetch(SequenceRange),
    /// `LIST`.
    List,
    /// `LOGOUT`.
    Logout,
}

#[derive(Default)]
struct Script {
    handler: Option<Arc<UnilateralHandler>>,
    messages: Vec<Vec<u8>>,
    uid_next: Option<u32>,
    capabilities: Vec<String>,
    folders: Vec<String>,
    dial_error: Option<Error>,
    login_error: Option<Error>,
    select_error: Option<Error>,
    idle_errors: VecDeque<Error>,
    close_errors: VecDeque<Error>,
    wait_errors: VecDeque<Error>,
    fetch_errors: VecDeque<Error>,
    idling: bool,
    calls: Vec<Call>,
}

struct State {
    script: Mutex<Script>,
    idle_changed: Condvar,
}

/// A [`Connector`] for a pretend server whose behaviour is scripted by the test.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<State>,
}

impl Default for MockConnector {
    fn default() -> Self {
        MockConnector {
            state: Arc::new(State {
                script: Mutex::new(Script {
                    capabilities: vec!["IMAP4rev1".to_string(), "IDLE".to_string()],
                    folders: vec!["INBOX".to_string()],
                    ..Script::default()
                }),
                idle_changed: Condvar::new(),
            }),
        }
    }
}

impl MockConnector {
    /// An empty folder on a server that supports `IMAP4rev1` and `IDLE`.
    pub fn new() -> Self {
        MockConnector::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.state.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start with `count` placeholder messages in the folder.
    pub fn with_messages(self, count: u32) -> Self {
        {
            let mut script = self.script();
            for n in 0..count {
                let raw = format!(
                    "Subject: message {}\r\nContent-Type: text/plain\r\n\r\n{}",
                    n + 1,
                    n + 1
                );
                script.messages.push(raw.into_bytes());
            }
        }
        self
    }

    /// Report `uid` as the next UID on select.
    pub fn with_uid_next(self, uid: u32) -> Self {
        self.script().uid_next = Some(uid);
        self
    }

    /// Advertise exactly these capabilities.
    pub fn with_capabilities(self, capabilities: &[&str]) -> Self {
        self.script().capabilities = capabilities.iter().map(|c| c.to_string()).collect();
        self
    }

    /// List exactly these folders.
    pub fn with_folders(self, folders: &[&str]) -> Self {
        self.script().folders = folders.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Refuse the next connection.
    pub fn fail_dial(self, err: Error) -> Self {
        self.script().dial_error = Some(err);
        self
    }

    /// Reject the next login.
    pub fn fail_login(self, err: Error) -> Self {
        self.script().login_error = Some(err);
        self
    }

    /// Reject the next select.
    pub fn fail_select(self, err: Error) -> Self {
        self.script().select_error = Some(err);
        self
    }

    /// Make the next attempt to enter `IDLE` fail. Queued failures are used up in order.
    pub fn fail_next_idle(&self, err: Error) {
        self.script().idle_errors.push_back(err);
    }

    /// Make the next `DONE` fail.
    pub fn fail_next_idle_close(&self, err: Error) {
        self.script().close_errors.push_back(err);
    }

    /// Make waiting for the next idle to end fail.
    pub fn fail_next_idle_wait(&self, err: Error) {
        self.script().wait_errors.push_back(err);
    }

    /// Make the next fetch fail.
    pub fn fail_next_fetch(&self, err: Error) {
        self.script().fetch_errors.push_back(err);
    }

    /// Add a message to the folder without telling anyone.
    pub fn append(&self, raw: impl Into<Vec<u8>>) -> u32 {
        let mut script = self.script();
        script.messages.push(raw.into());
        script.messages.len() as u32
    }

    /// Add a message to the folder and push the new message count.
    pub fn deliver(&self, raw: impl Into<Vec<u8>>) {
        let count = self.append(raw);
        self.push_status(MailboxStatusEvent::exists(count));
    }

    /// Push a mailbox status update to the session.
    pub fn push_status(&self, event: MailboxStatusEvent) {
        if let Some(handler) = self.handler() {
            handler.mailbox(event);
        }
    }

    /// Remove message `seq` from the folder and push the expunge.
    pub fn expunge(&self, seq: Seq) {
        {
            let mut script = self.script();
            let index = seq as usize - 1;
            if index < script.messages.len() {
                script.messages.remove(index);
            }
        }
        if let Some(handler) = self.handler() {
            handler.expunge(seq);
        }
    }

    fn handler(&self) -> Option<Arc<UnilateralHandler>> {
        self.script().handler.clone()
    }

    /// Every command received so far, oldest first.
    pub fn calls(&self) -> Vec<Call> {
        self.script().calls.clone()
    }

    /// Block until the session is in `IDLE`, or `timeout` passes. Returns whether it is.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut script = self.script();
        while !script.idling {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return false;
            }
            script = self
                .state
                .idle_changed
                .wait_timeout(script, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Whether the session is in `IDLE` right now.
    pub fn is_idling(&self) -> bool {
        self.script().idling
    }

    fn set_idling(&self, idling: bool) {
        self.script().idling = idling;
        self.state.idle_changed.notify_all();
    }
}

impl std::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MockConnector")
    }
}

impl Connector for MockConnector {
    fn dial(
        &self,
        config: &Config,
        handler: UnilateralHandler,
        trace: Trace,
    ) -> Result<Box<dyn Endpoint>> {
        let mut script = self.script();
        script.calls.push(Call::Dial);
        if let Some(err) = script.dial_error.take() {
            return Err(err);
        }
        script.handler = Some(Arc::new(handler));
        trace.server(&format!("* OK mock server for {} ready", config.host()));
        drop(script);

        Ok(Box::new(MockEndpoint {
            mock: self.clone(),
            trace,
            open: true,
        }))
    }
}

struct MockEndpoint {
    mock: MockConnector,
    trace: Trace,
    open: bool,
}

impl MockEndpoint {
    fn command(&mut self, call: Call, line: &str) -> Result<MutexGuard<'_, Script>> {
        self.trace.client(line);
        let mut script = self.mock.script();
        script.calls.push(call);
        if !self.open {
            return Err(Error::NotConnected);
        }
        if script.idling {
            return Err(Error::IdleInProgress);
        }
        Ok(script)
    }
}

impl Endpoint for MockEndpoint {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let line = format!("LOGIN {} {}", username, password);
        let mut script = self.command(Call::Login(username.to_string()), &line)?;
        match script.login_error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn select(&mut self, folder: &str) -> Result<SelectedFolder> {
        let line = format!("SELECT {}", folder);
        let mut script = self.command(Call::Select(folder.to_string()), &line)?;
        if let Some(err) = script.select_error.take() {
            return Err(err);
        }
        Ok(SelectedFolder {
            exists: script.messages.len() as u32,
            uid_next: script.uid_next,
        })
    }

    fn capabilities(&mut self) -> Result<CapabilitySet> {
        let script = self.command(Call::Capabilities, "CAPABILITY")?;
        Ok(script.capabilities.iter().map(String::as_str).collect())
    }

    fn idle(&mut self) -> Result<Box<dyn IdleHandle>> {
        let mut script = self.command(Call::Idle, "IDLE")?;
        if let Some(err) = script.idle_errors.pop_front() {
            return Err(err);
        }
        drop(script);
        self.mock.set_idling(true);
        Ok(Box::new(MockIdle {
            mock: self.mock.clone(),
        }))
    }

    fn fetch(&mut self, range: &SequenceRange) -> Result<Vec<RawFetchedMessage>> {
        let line = format!("FETCH {} BODY.PEEK[]", range);
        let mut script = self.command(Call::Fetch(*range), &line)?;
        if let Some(err) = script.fetch_errors.pop_front() {
            return Err(err);
        }
        Ok(range
            .iter()
            .filter_map(|seq| {
                let body = script.messages.get(seq as usize - 1)?;
                Some(RawFetchedMessage::new(seq, body.clone()).with_size(body.len() as u32))
            })
            .collect())
    }

    fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<FolderStatus>> {
        let line = format!("LIST \"{}\" {}", reference, pattern);
        let script = self.command(Call::List, &line)?;
        Ok(script.folders.iter().map(FolderStatus::new).collect())
    }

    fn logout(&mut self) -> Result<()> {
        self.trace.client("LOGOUT");
        let mut script = self.mock.script();
        script.calls.push(Call::Logout);
        if !self.open {
            return Err(Error::NotConnected);
        }
        self.open = false;
        script.handler = None;
        drop(script);
        self.mock.set_idling(false);
        Ok(())
    }
}

struct MockIdle {
    mock: MockConnector,
}

impl IdleHandle for MockIdle {
    fn close(&mut self) -> Result<()> {
        let mut script = self.mock.script();
        script.calls.push(Call::IdleClose);
        match script.close_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn wait(self: Box<Self>) -> Result<()> {
        let mut script = self.mock.script();
        script.calls.push(Call::IdleWait);
        match script.wait_errors.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for MockIdle {
    fn drop(&mut self) {
        self.mock.set_idling(false);
    }
}
