//! Fan-out of server-initiated responses.
//!
//! An [`EventRouter`] hands the endpoint a [`UnilateralHandler`] whose callbacks enqueue onto a
//! single-slot queue per kind of event. One forwarder thread per kind drains that queue in order
//! and passes each event on to the current subscriber, if there is one. Events that arrive while
//! nobody is subscribed are dropped.
//!
//! Nothing is buffered beyond the channels themselves. A subscriber that stops reading fills its
//! own channel, then the forwarder's slot, and from then on the endpoint blocks when it reports
//! the next event of that kind.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use tracing::Span;

use crate::endpoint::UnilateralHandler;
use crate::types::{FetchEvent, MailboxStatusEvent, Seq};

type Forward<T> = Arc<dyn Fn(T) -> bool + Send + Sync>;

struct Slot<T> {
    id: u64,
    forward: Forward<T>,
}

struct Lane<T> {
    name: &'static str,
    slot: Arc<Mutex<Option<Slot<T>>>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for Lane<T> {
    fn clone(&self) -> Self {
        Lane {
            name: self.name,
            slot: Arc::clone(&self.slot),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T: Send + 'static> Lane<T> {
    fn new(name: &'static str) -> Self {
        Lane {
            name,
            slot: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    fn subscribe<E>(&self, tx: SyncSender<E>) -> Subscription
    where
        E: From<T> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let forward: Forward<T> = Arc::new(move |event: T| tx.send(E::from(event)).is_ok());
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(Slot { id, forward });

        let slot = Arc::clone(&self.slot);
        Subscription {
            release: Some(Box::new(move || clear(&slot, id))),
        }
    }

    /// Start the forwarder thread and return the queue that feeds it.
    fn spawn(&self, span: &Span) -> io::Result<SyncSender<T>> {
        let (tx, rx) = mpsc::sync_channel(1);
        let lane = self.clone();
        let span = span.clone();
        thread::Builder::new()
            .name(format!("mailwatch-{}", self.name))
            .spawn(move || lane.forward_all(rx, span))?;
        Ok(tx)
    }

    fn forward_all(self, rx: Receiver<T>, span: Span) {
        for event in rx {
            let current = {
                let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
                slot.as_ref().map(|s| (s.id, Arc::clone(&s.forward)))
            };
            match current {
                Some((id, forward)) => {
                    if !forward(event) {
                        tracing::trace!(parent: &span, lane = self.name, "subscriber went away");
                        clear(&self.slot, id);
                    }
                }
                None => {
                    tracing::trace!(parent: &span, lane = self.name, "no subscriber, event dropped");
                }
            }
        }
    }
}

fn clear<T>(slot: &Mutex<Option<Slot<T>>>, id: u64) {
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if slot.as_ref().map(|s| s.id) == Some(id) {
        *slot = None;
    }
}

/// Keeps a subscription alive. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}

/// Routes push events from an endpoint to at most one subscriber per kind.
///
/// Subscribers receive over their own bounded channel. A subscriber that does not keep up holds
/// back its forwarder and, one event later, the endpoint.
#[derive(Clone)]
pub struct EventRouter {
    expunge: Lane<Seq>,
    mailbox: Lane<MailboxStatusEvent>,
    fetch: Lane<FetchEvent>,
    span: Span,
}

impl EventRouter {
    /// A router with no subscribers, logging under `span`.
    pub fn new(span: Span) -> Self {
        EventRouter {
            expunge: Lane::new("expunge"),
            mailbox: Lane::new("mailbox"),
            fetch: Lane::new("fetch"),
            span,
        }
    }

    /// Start forwarding and return the callbacks to give to a new endpoint.
    ///
    /// The forwarder threads exit once the returned handler is dropped.
    pub fn handler(&self) -> io::Result<UnilateralHandler> {
        let expunge = self.expunge.spawn(&self.span)?;
        let mailbox = self.mailbox.spawn(&self.span)?;
        let fetch = self.fetch.spawn(&self.span)?;
        let span = self.span.clone();

        Ok(UnilateralHandler::new(
            move |seq| {
                tracing::info!(parent: &span, seq, "message expunged");
                enqueue(&expunge, seq);
            },
            move |event| enqueue(&mailbox, event),
            move |event| enqueue(&fetch, event),
        ))
    }

    /// Receive message-expunged events on `tx`.
    pub fn subscribe_expunge<E>(&self, tx: SyncSender<E>) -> Subscription
    where
        E: From<Seq> + Send + 'static,
    {
        self.expunge.subscribe(tx)
    }

    /// Receive mailbox-status events on `tx`.
    pub fn subscribe_mailbox<E>(&self, tx: SyncSender<E>) -> Subscription
    where
        E: From<MailboxStatusEvent> + Send + 'static,
    {
        self.mailbox.subscribe(tx)
    }

    /// Receive unsolicited fetch events on `tx`.
    pub fn subscribe_fetch<E>(&self, tx: SyncSender<E>) -> Subscription
    where
        E: From<FetchEvent> + Send + 'static,
    {
        self.fetch.subscribe(tx)
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EventRouter")
    }
}

/// Blocks while the forwarder still holds the previous event.
fn enqueue<T>(queue: &SyncSender<T>, event: T) {
    // A closed queue means the forwarder is gone, and so is anyone who cared.
    let _ = queue.send(event);
}
