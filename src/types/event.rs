use super::Seq;

/// A mailbox-status update pushed by the server while the folder is selected, typically an
/// untagged [`EXISTS` response](https://tools.ietf.org/html/rfc3501#section-7.3.1).
///
/// An event without a message count is informational only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MailboxStatusEvent {
    /// The number of messages in the mailbox, if this update carries it.
    pub num_messages: Option<u32>,
}

impl MailboxStatusEvent {
    /// An update announcing the mailbox now holds `count` messages.
    pub fn exists(count: u32) -> Self {
        MailboxStatusEvent {
            num_messages: Some(count),
        }
    }
}

/// An unsolicited [`FETCH` response](https://tools.ietf.org/html/rfc3501#section-7.4.2), such as
/// a flag change made by another client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchEvent {
    /// Message identifier.
    pub seq: Seq,
}
