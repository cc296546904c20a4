use std::fmt;
use std::time::Duration;

/// How the connection to the server is secured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[non_exhaustive]
pub enum TlsMode {
    /// Use `STARTTLS` if the server offers it, otherwise stay in plaintext.
    Auto,
    /// Implicit TLS from the first byte, usually on port 993.
    #[default]
    Tls,
    /// Connect in plaintext and upgrade with `STARTTLS`, usually on port 143.
    StartTls,
    /// No encryption at all. Only useful against local test servers.
    Plaintext,
}

/// Everything needed to open a [`Session`](crate::Session) on one folder.
///
/// Built with a [`ConfigBuilder`]:
/// ```
/// use mailwatch::{ConfigBuilder, TlsMode};
///
/// let config = ConfigBuilder::new("imap.example.com", "me@example.com", "hunter2")
///     .folder("Receipts")
///     .tls_mode(TlsMode::StartTls)
///     .port(143)
///     .build();
/// assert_eq!(config.folder(), "Receipts");
/// assert_eq!(config.port(), 143);
/// assert!(!format!("{:?}", config).contains("hunter2"));
/// ```
#[derive(Clone)]
pub struct Config {
    host: String,
    port: u16,
    username: String,
    password: String,
    folder: String,
    tls_mode: TlsMode,
    skip_tls_verify: bool,
    idle_refresh: Duration,
}

impl Config {
    /// The server to connect to.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port to connect to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The login name.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The login password.
    pub fn password(&self) -> &str {
        &self.password
    }

    /// The folder to select and watch.
    pub fn folder(&self) -> &str {
        &self.folder
    }

    /// How the connection is secured.
    pub fn tls_mode(&self) -> TlsMode {
        self.tls_mode
    }

    /// Whether certificate and hostname verification is turned off.
    pub fn danger_skip_tls_verify(&self) -> bool {
        self.skip_tls_verify
    }

    /// How long a single `IDLE` is held before it is re-issued.
    pub fn idle_refresh(&self) -> Duration {
        self.idle_refresh
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"***")
            .field("folder", &self.folder)
            .field("tls_mode", &self.tls_mode)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("idle_refresh", &self.idle_refresh)
            .finish()
    }
}

/// A convenience builder for [`Config`].
///
/// Unless told otherwise, the builder connects with implicit TLS on port 993, watches `INBOX`,
/// and re-issues `IDLE` every five minutes.
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Make a new `ConfigBuilder` for the given server and credentials.
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        ConfigBuilder {
            config: Config {
                host: host.into(),
                port: 993,
                username: username.into(),
                password: password.into(),
                folder: "INBOX".to_string(),
                tls_mode: TlsMode::default(),
                skip_tls_verify: false,
                idle_refresh: Duration::from_secs(5 * 60),
            },
        }
    }

    /// Connect to `port` instead of 993.
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Watch `folder` instead of `INBOX`.
    pub fn folder(mut self, folder: impl Into<String>) -> Self {
        self.config.folder = folder.into();
        self
    }

    /// Choose how the connection is secured.
    pub fn tls_mode(mut self, mode: TlsMode) -> Self {
        self.config.tls_mode = mode;
        self
    }

    /// Controls the use of certificate validation.
    ///
    /// Defaults to `false`.
    ///
    /// # Warning
    ///
    /// You should only use this as a last resort as it allows another server to impersonate the
    /// server you think you're talking to, which would include being able to receive your
    /// credentials.
    pub fn danger_skip_tls_verify(mut self, skip_tls_verify: bool) -> Self {
        self.config.skip_tls_verify = skip_tls_verify;
        self
    }

    /// Re-issue `IDLE` after `refresh`. Servers may drop clients that idle for longer than 29
    /// minutes, so keep this well below that.
    pub fn idle_refresh(mut self, refresh: Duration) -> Self {
        self.config.idle_refresh = refresh;
        self
    }

    /// Finish building.
    pub fn build(self) -> Config {
        self.config
    }
}
