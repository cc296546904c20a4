//! The loop that turns `IDLE` notifications into decoded messages.
//!
//! Each pass of the loop enters `IDLE`, waits for the server to report a new message count (or
//! for the watch to be cancelled), leaves `IDLE`, fetches whatever arrived since the last pass
//! and hands the decoded messages to the consumer one at a time.
//!
//! A failing pass is retried. If the very next pass fails the same way, the loop gives up and
//! reports a [`WatchError`]. Failures are compared by where they happened and by their
//! [`ErrorKind`], never by their text.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread;

use tracing::Span;

use crate::error::{ErrorKind, FetchError, IdleError, LoopError, WatchError};
use crate::message::Message;
use crate::router::EventRouter;
use crate::session::Shared;
use crate::types::{MailboxStatusEvent, RawFetchedMessage, SequenceRange};

/// What can wake the loop while it waits.
#[derive(Debug)]
pub(crate) enum Wake {
    Mailbox(MailboxStatusEvent),
    Cancelled,
}

impl From<MailboxStatusEvent> for Wake {
    fn from(event: MailboxStatusEvent) -> Self {
        Wake::Mailbox(event)
    }
}

/// Stops a running watch. Cheap to clone; every clone stops the same watch.
#[derive(Clone, Debug)]
pub struct Canceller {
    cancelled: Arc<AtomicBool>,
    wake: SyncSender<Wake>,
}

impl Canceller {
    /// Ask the watch to stop. The loop notices right away if it is waiting for the server, and
    /// otherwise as soon as the current pass is over. A fetch in progress is not interrupted.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // A full slot means the loop is about to wake up anyway.
        let _ = self.wake.try_send(Wake::Cancelled);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A running watch.
///
/// [`messages`](Self::messages) yields every newly arrived message and closes when the watch
/// ends. [`done`](Self::done) then yields exactly one value: `Ok(())` if the watch was cancelled
/// or its consumer went away, or the [`WatchError`] that made it give up.
#[derive(Debug)]
pub struct Watch {
    messages: Receiver<Message>,
    done: Receiver<Result<(), WatchError>>,
    canceller: Canceller,
}

impl Watch {
    /// Newly arrived messages, in the order they arrived.
    pub fn messages(&self) -> &Receiver<Message> {
        &self.messages
    }

    /// How the watch ended.
    pub fn done(&self) -> &Receiver<Result<(), WatchError>> {
        &self.done
    }

    /// A handle that stops this watch.
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Stop this watch.
    pub fn cancel(&self) {
        self.canceller.cancel()
    }

    /// Split the watch into its channels and its canceller.
    pub fn into_parts(
        self,
    ) -> (
        Receiver<Message>,
        Receiver<Result<(), WatchError>>,
        Canceller,
    ) {
        (self.messages, self.done, self.canceller)
    }
}

/// Where in a pass a failure happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Stage {
    IdleStart,
    IdleClose,
    IdleWait,
    Fetch,
}

/// Two failures with the same fingerprint count as the same failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Fingerprint {
    stage: Stage,
    kind: ErrorKind,
}

impl Fingerprint {
    fn of(err: &LoopError) -> Self {
        let (stage, source) = match *err {
            LoopError::Idle(IdleError::Start(ref e)) => (Stage::IdleStart, e),
            LoopError::Idle(IdleError::Close(ref e)) => (Stage::IdleClose, e),
            LoopError::Idle(IdleError::Wait(ref e)) => (Stage::IdleWait, e),
            LoopError::Fetch(FetchError { ref source, .. }) => (Stage::Fetch, source),
        };
        Fingerprint {
            stage,
            kind: source.kind(),
        }
    }
}

/// What to do about a failed pass.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    Retry,
    Fatal,
}

/// The failure the loop is currently recovering from, if any.
#[derive(Debug, Default)]
struct Recovery {
    baseline: Option<Fingerprint>,
}

impl Recovery {
    fn failed(&mut self, err: &LoopError) -> Verdict {
        let fingerprint = Fingerprint::of(err);
        if self.baseline == Some(fingerprint) {
            return Verdict::Fatal;
        }
        self.baseline = Some(fingerprint);
        Verdict::Retry
    }

    fn succeeded(&mut self) {
        self.baseline = None;
    }
}

/// Why a pass ended early without an error.
enum Stop {
    Cancelled,
    ConsumerGone,
}

enum Pass {
    Done,
    Stopped(Stop),
    Failed(LoopError),
}

struct WatchLoop {
    shared: Shared,
    wake: Receiver<Wake>,
    cancelled: Arc<AtomicBool>,
    messages: SyncSender<Message>,
    span: Span,
}

/// Start a watch on its own thread.
pub(crate) fn spawn(shared: Shared, router: &EventRouter, span: Span) -> io::Result<Watch> {
    let (wake_tx, wake_rx) = mpsc::sync_channel(1);
    let (messages_tx, messages_rx) = mpsc::sync_channel(0);
    let (done_tx, done_rx) = mpsc::sync_channel(1);

    let canceller = Canceller {
        cancelled: Arc::new(AtomicBool::new(false)),
        wake: wake_tx.clone(),
    };
    let subscription = router.subscribe_mailbox(wake_tx);

    let watch_loop = WatchLoop {
        shared,
        wake: wake_rx,
        cancelled: Arc::clone(&canceller.cancelled),
        messages: messages_tx,
        span,
    };

    thread::Builder::new()
        .name("mailwatch-watch".to_string())
        .spawn(move || {
            let _subscription = subscription;
            let result = watch_loop.run();
            // The slot is reserved for this one value.
            let _ = done_tx.send(result);
        })?;

    Ok(Watch {
        messages: messages_rx,
        done: done_rx,
        canceller,
    })
}

impl WatchLoop {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn run(self) -> Result<(), WatchError> {
        let _turn = self.shared.turn();
        let mut recovery = Recovery::default();
        let mut failure: Option<LoopError> = None;

        loop {
            if let Some(err) = failure.take() {
                if recovery.failed(&err) == Verdict::Fatal {
                    tracing::error!(parent: &self.span, error = %err, "giving up");
                    if let Err(e) = self.shared.close() {
                        tracing::debug!(parent: &self.span, error = %e, "logout failed");
                    }
                    return Err(WatchError::new(err));
                }
                tracing::error!(
                    parent: &self.span,
                    error = %err,
                    "error while waiting for messages, trying to recover"
                );
            }

            if self.is_cancelled() {
                tracing::debug!(parent: &self.span, "watch cancelled");
                return Ok(());
            }

            match self.pass() {
                Pass::Done => recovery.succeeded(),
                Pass::Failed(err) => failure = Some(err),
                Pass::Stopped(Stop::Cancelled) => {
                    tracing::debug!(parent: &self.span, "watch cancelled");
                    return Ok(());
                }
                Pass::Stopped(Stop::ConsumerGone) => {
                    tracing::debug!(parent: &self.span, "message receiver dropped, stopping");
                    return Ok(());
                }
            }
        }
    }

    fn pass(&self) -> Pass {
        let mut idle = match self.shared.start_idle() {
            Ok(idle) => idle,
            Err(e) => return Pass::Failed(IdleError::Start(e).into()),
        };

        let count = loop {
            match self.wake.recv() {
                Ok(_) if self.is_cancelled() => return Pass::Stopped(Stop::Cancelled),
                Ok(Wake::Mailbox(MailboxStatusEvent {
                    num_messages: Some(count),
                })) => break count,
                Ok(Wake::Mailbox(_)) => {
                    tracing::trace!(parent: &self.span, "mailbox status without count");
                }
                Ok(Wake::Cancelled) | Err(_) => return Pass::Stopped(Stop::Cancelled),
            }
        };
        tracing::info!(parent: &self.span, num_messages = count, "mailbox changed");

        if let Err(e) = idle.close() {
            return Pass::Failed(IdleError::Close(e).into());
        }
        if let Err(e) = idle.wait() {
            return Pass::Failed(IdleError::Wait(e).into());
        }

        let last_known = self.shared.num_messages().unwrap_or(0);
        if let Some(range) = SequenceRange::new(last_known, count) {
            let fetched = match self.shared.fetch_range(&range) {
                Ok(fetched) => fetched,
                Err(e) => return Pass::Failed(e.into()),
            };
            if let Err(stop) = self.deliver(fetched) {
                self.shared.set_num_messages(count);
                return Pass::Stopped(stop);
            }
        }

        self.shared.set_num_messages(count);
        Pass::Done
    }

    fn deliver(&self, fetched: Vec<RawFetchedMessage>) -> Result<(), Stop> {
        for raw in fetched {
            tracing::debug!(
                parent: &self.span,
                seq = raw.seq,
                size = raw.size(),
                flags = ?raw.flags(),
                internal_date = ?raw.internal_date(),
                "fetched message"
            );
            let message = match Message::parse(&raw.body) {
                Ok(message) => message,
                Err(e) => {
                    let subject = raw.envelope_subject().map(String::from_utf8_lossy);
                    tracing::error!(
                        parent: &self.span,
                        error = %e,
                        seq = raw.seq,
                        len = raw.body.len(),
                        size = raw.size(),
                        internal_date = ?raw.internal_date(),
                        flags = ?raw.flags(),
                        subject = ?subject,
                        "failed to parse message"
                    );
                    continue;
                }
            };
            if self.messages.send(message).is_err() {
                return Err(Stop::ConsumerGone);
            }
        }
        Ok(())
    }
}
