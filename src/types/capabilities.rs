use std::collections::hash_set::Iter;
use std::collections::HashSet;
use std::fmt;

/// The capabilities this crate cares about, from
/// [section 7.2.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-7.2.1).
///
/// Anything the server advertises that is not listed here ends up in [`Capability::Other`].
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
#[non_exhaustive]
pub enum Capability {
    /// `IMAP4rev1`, [RFC 3501](https://tools.ietf.org/html/rfc3501).
    Imap4rev1,
    /// `IMAP4rev2`, [RFC 9051](https://tools.ietf.org/html/rfc9051).
    Imap4rev2,
    /// `IDLE`, [RFC 2177](https://tools.ietf.org/html/rfc2177).
    Idle,
    /// `STARTTLS`.
    StartTls,
    /// `LOGINDISABLED`: the `LOGIN` command will be refused.
    LoginDisabled,
    /// `UIDPLUS`, [RFC 4315](https://tools.ietf.org/html/rfc4315).
    UidPlus,
    /// `CONDSTORE`, [RFC 7162](https://tools.ietf.org/html/rfc7162).
    CondStore,
    /// `LIST-STATUS`, [RFC 5819](https://tools.ietf.org/html/rfc5819).
    ListStatus,
    /// `AUTH=<mechanism>`.
    Auth(String),
    /// Any other capability atom, as sent.
    Other(String),
}

impl From<&str> for Capability {
    fn from(atom: &str) -> Self {
        let upper = atom.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Capability::Imap4rev1,
            "IMAP4REV2" => Capability::Imap4rev2,
            "IDLE" => Capability::Idle,
            "STARTTLS" => Capability::StartTls,
            "LOGINDISABLED" => Capability::LoginDisabled,
            "UIDPLUS" => Capability::UidPlus,
            "CONDSTORE" => Capability::CondStore,
            "LIST-STATUS" => Capability::ListStatus,
            _ => match upper.strip_prefix("AUTH=") {
                Some(mechanism) => Capability::Auth(mechanism.to_string()),
                None => Capability::Other(atom.to_string()),
            },
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Capability::Imap4rev1 => f.write_str("IMAP4rev1"),
            Capability::Imap4rev2 => f.write_str("IMAP4rev2"),
            Capability::Idle => f.write_str("IDLE"),
            Capability::StartTls => f.write_str("STARTTLS"),
            Capability::LoginDisabled => f.write_str("LOGINDISABLED"),
            Capability::UidPlus => f.write_str("UIDPLUS"),
            Capability::CondStore => f.write_str("CONDSTORE"),
            Capability::ListStatus => f.write_str("LIST-STATUS"),
            Capability::Auth(ref mechanism) => write!(f, "AUTH={}", mechanism),
            Capability::Other(ref atom) => f.write_str(atom),
        }
    }
}

/// The set of capabilities the server announced after login.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CapabilitySet(HashSet<Capability>);

impl CapabilitySet {
    /// Check if the server has the given capability.
    pub fn has(&self, cap: &Capability) -> bool {
        self.0.contains(cap)
    }

    /// Check if the server has the capability with the given atom.
    pub fn has_str(&self, atom: &str) -> bool {
        self.0.contains(&Capability::from(atom))
    }

    /// Iterate over all the server's capabilities
    pub fn iter(&self) -> Iter<'_, Capability> {
        self.0.iter()
    }

    /// Returns how many capabilities the server has.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the server purports to have no capabilities.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        CapabilitySet(iter.into_iter().map(Capability::from).collect())
    }
}

impl FromIterator<Capability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        CapabilitySet(iter.into_iter().collect())
    }
}
