//! Watch an IMAP folder and hand newly arrived messages to your code as they come in.
//!
//! A [`Session`] owns one authenticated connection with one folder selected. Once connected,
//! [`Session::wait_for_messages`] starts a background loop that idles on the folder (RFC 2177),
//! fetches whatever the server reports as new, and delivers them over a channel as decoded
//! [`Message`]s.
//!
//! # Usage
//!
//! ```no_run
//! use mailwatch::{ConfigBuilder, Session};
//!
//! let config = ConfigBuilder::new("imap.example.com", "me@example.com", "secret")
//!     .folder("INBOX")
//!     .build();
//! let mut session = Session::new(config);
//! session.connect().unwrap();
//!
//! let watch = session.wait_for_messages().unwrap();
//! for message in watch.messages() {
//!     println!("{}: {}", message.from().unwrap(), message.subject().unwrap());
//! }
//! // The loop only stops on cancellation or an error it could not recover from.
//! if let Ok(Err(e)) = watch.done().recv() {
//!     eprintln!("watch ended: {}", e);
//! }
//! ```
//!
//! # Unilateral events
//!
//! Servers report expunges, flag changes, and new message counts whenever they like, both during
//! `IDLE` and in the middle of other commands. Every such event is routed through an
//! [`EventRouter`]; subscribe with [`EventRouter::subscribe_expunge`] and friends on
//! [`Session::events`] to see them. Events nobody subscribed to are dropped. A subscriber that
//! stops reading eventually holds up the connection, since each kind of event has room for only
//! one in flight.
//!
//! # Logging
//!
//! The crate logs through [`tracing`]. Protocol lines are emitted at `DEBUG` under the
//! `mailwatch::trace` target, with the password masked.
//!
//! # Testing
//!
//! With the `test_helpers` feature, the [`testing`] module offers a scripted server so code built
//! on this crate can be tested without a network.

mod config;
mod endpoint;
mod error;
pub mod message;
#[cfg(test)]
mod mock_stream;
mod remote;
mod router;
mod session;
pub mod trace;
pub mod types;
mod watch;

#[cfg(any(test, feature = "test_helpers"))]
pub mod testing;

pub use crate::config::{Config, ConfigBuilder, TlsMode};
pub use crate::endpoint::{Connector, Endpoint, IdleHandle, UnilateralHandler};
pub use crate::error::{
    ConnectError, DecodeError, Error, ErrorKind, FetchError, IdleError, LoopError, Result,
    WatchError,
};
pub use crate::message::Message;
pub use crate::remote::ImapConnector;
pub use crate::router::{EventRouter, Subscription};
pub use crate::session::Session;
pub use crate::watch::{Canceller, Watch};
