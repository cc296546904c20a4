use std::fmt;

/// What the server reported when a folder was selected.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct SelectedFolder {
    /// Number of messages in the folder.
    pub exists: u32,
    /// The next unique identifier the server expects to assign, if it said so.
    pub uid_next: Option<u32>,
}

impl fmt::Display for SelectedFolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exists: {}, uid_next: {:?}", self.exists, self.uid_next)
    }
}
