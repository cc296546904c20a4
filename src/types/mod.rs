//! This module contains the plain data types that travel between the endpoint, the session and
//! the watch loop.

use std::fmt;

/// From section [2.3.1.2 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.2).
///
/// A relative position from 1 to the number of messages in the mailbox. As each new message is
/// added, it is assigned a message sequence number that is 1 higher than the number of messages
/// in the mailbox before that new message was added.
///
/// Message sequence numbers can be reassigned during the session. When a message is expunged, the
/// sequence number of every later message is decremented, as is the number of messages in the
/// mailbox. If an untagged "11 EXISTS" is received, and previously an untagged "8 EXISTS" was
/// received, three new messages have arrived with message sequence numbers of 9, 10, and 11.
pub type Seq = u32;

/// The inclusive range of sequence numbers that arrived since the mailbox was last looked at.
///
/// A range can only be built from a count that grew, so it is never empty.
///
/// ```
/// use mailwatch::types::SequenceRange;
///
/// let range = SequenceRange::new(8, 11).unwrap();
/// assert_eq!(range.to_string(), "9:11");
/// assert_eq!(range.len(), 3);
/// assert!(SequenceRange::new(11, 11).is_none());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SequenceRange {
    start: Seq,
    end: Seq,
}

impl SequenceRange {
    /// The messages after `last_known` up to and including `new_count`, or `None` if the mailbox
    /// did not grow.
    pub fn new(last_known: u32, new_count: u32) -> Option<SequenceRange> {
        if new_count <= last_known {
            return None;
        }
        Some(SequenceRange {
            start: last_known + 1,
            end: new_count,
        })
    }

    /// The first sequence number in the range.
    pub fn start(&self) -> Seq {
        self.start
    }

    /// The last sequence number in the range.
    pub fn end(&self) -> Seq {
        self.end
    }

    /// How many messages the range covers.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    /// Iterate over the sequence numbers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = Seq> {
        self.start..=self.end
    }

    /// Whether `seq` falls inside the range.
    pub fn contains(&self, seq: Seq) -> bool {
        (self.start..=self.end).contains(&seq)
    }
}

impl fmt::Display for SequenceRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

mod mailbox;
pub use self::mailbox::SelectedFolder;

mod flag;
pub use self::flag::Flag;

mod fetch;
pub use self::fetch::RawFetchedMessage;

mod name;
pub use self::name::FolderStatus;

mod capabilities;
pub use self::capabilities::{Capability, CapabilitySet};

mod event;
pub use self::event::{FetchEvent, MailboxStatusEvent};
