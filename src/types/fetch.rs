use chrono::{DateTime, FixedOffset};

use super::{Flag, Seq};

/// One message as it came back from a range fetch, before any MIME decoding.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RawFetchedMessage {
    /// The ordinal number of this message in its containing mailbox.
    pub seq: Seq,

    /// The full `BODY[]` section: header block, blank line, body.
    pub body: Vec<u8>,

    pub(crate) flags: Vec<Flag>,
    pub(crate) internal_date: Option<DateTime<FixedOffset>>,
    pub(crate) size: Option<u32>,
    pub(crate) subject: Option<Vec<u8>>,
}

impl RawFetchedMessage {
    /// A message that only carries its sequence number and raw bytes.
    pub fn new(seq: Seq, body: impl Into<Vec<u8>>) -> Self {
        RawFetchedMessage {
            seq,
            body: body.into(),
            ..Default::default()
        }
    }

    /// Attach the flags the server reported.
    pub fn with_flags(mut self, flags: Vec<Flag>) -> Self {
        self.flags = flags;
        self
    }

    /// Attach the `INTERNALDATE` the server reported.
    pub fn with_internal_date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.internal_date = Some(date);
        self
    }

    /// Attach the `RFC822.SIZE` the server reported.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Attach the undecoded subject from the envelope.
    pub fn with_envelope_subject(mut self, subject: impl Into<Vec<u8>>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// A list of flags that are set for this message.
    pub fn flags(&self) -> &[Flag] {
        &self.flags[..]
    }

    /// The date and time at which the server received the message.
    pub fn internal_date(&self) -> Option<DateTime<FixedOffset>> {
        self.internal_date
    }

    /// The size of the message in octets, as counted by the server.
    pub fn size(&self) -> Option<u32> {
        self.size
    }

    /// The subject from the envelope, still in its encoded-word form.
    pub fn envelope_subject(&self) -> Option<&[u8]> {
        self.subject.as_deref()
    }
}
