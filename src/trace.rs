//! Raw protocol tracing.
//!
//! Endpoints report every command they send and every untagged response they hand on to a
//! [`Trace`]. Lines are emitted at `debug` level on the `mailwatch::trace` target, with the
//! session password masked.

use std::borrow::Cow;
use std::sync::Arc;

use tracing::Span;

const MASK: &str = "***";

/// Replace every occurrence of `secret` in `text` with `***`.
///
/// ```
/// assert_eq!(
///     mailwatch::trace::redact("a1 LOGIN me hunter2", "hunter2"),
///     "a1 LOGIN me ***"
/// );
/// ```
pub fn redact<'a>(text: &'a str, secret: &str) -> Cow<'a, str> {
    if secret.is_empty() || !text.contains(secret) {
        Cow::Borrowed(text)
    } else {
        Cow::Owned(text.replace(secret, MASK))
    }
}

/// Which way a traced line travelled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Sent by us.
    Client,
    /// Read from the server.
    Server,
}

impl Direction {
    fn as_str(self) -> &'static str {
        match self {
            Direction::Client => "C",
            Direction::Server => "S",
        }
    }
}

/// A sink for protocol lines. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Trace {
    secret: Arc<str>,
    span: Span,
}

impl Trace {
    /// Trace under `span`, hiding `secret` from every line.
    pub fn new(secret: &str, span: Span) -> Self {
        Trace {
            secret: Arc::from(secret),
            span,
        }
    }

    /// Record a line sent to the server.
    pub fn client(&self, line: &str) {
        self.emit(Direction::Client, line);
    }

    /// Record a line read from the server.
    pub fn server(&self, line: &str) {
        self.emit(Direction::Server, line);
    }

    /// The text that would be emitted for `line`.
    pub fn render<'a>(&self, line: &'a str) -> Cow<'a, str> {
        redact(line, &self.secret)
    }

    fn emit(&self, direction: Direction, line: &str) {
        tracing::debug!(
            target: "mailwatch::trace",
            parent: &self.span,
            direction = direction.as_str(),
            "{}",
            self.render(line.trim_end())
        );
    }
}
