use std::fmt;

/// A folder that matched a `LIST` command.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct FolderStatus {
    pub(crate) name: String,
    pub(crate) messages: Option<u32>,
    pub(crate) unseen: Option<u32>,
}

impl FolderStatus {
    /// A listed folder with no counts attached.
    pub fn new(name: impl Into<String>) -> Self {
        FolderStatus {
            name: name.into(),
            messages: None,
            unseen: None,
        }
    }

    /// Attach the message and unseen counts, as reported by `STATUS`.
    pub fn with_counts(mut self, messages: u32, unseen: u32) -> Self {
        self.messages = Some(messages);
        self.unseen = Some(unseen);
        self
    }

    /// The name represents an unambiguous left-to-right hierarchy, and MUST be valid for use as a
    /// reference in `LIST` command.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many messages are in the folder, if known.
    pub fn messages(&self) -> Option<u32> {
        self.messages
    }

    /// How many messages in the folder lack the `\Seen` flag, if known.
    pub fn unseen(&self) -> Option<u32> {
        self.unseen
    }
}

impl fmt::Display for FolderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.messages, self.unseen) {
            (Some(messages), Some(unseen)) => {
                write!(f, "{} ({} messages, {} unseen)", self.name, messages, unseen)
            }
            _ => f.write_str(&self.name),
        }
    }
}
