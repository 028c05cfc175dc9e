use tracing::Dispatch;

/// Startup settings for a [`Server`](crate::Server).
///
/// ```
/// use birb::Config;
///
/// let config = Config {
///     name: "Sparrow".into(),
///     ..Config::default()
/// };
/// assert_eq!(config.port, 8080);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Display name, used for the default `Server` response header and in
    /// the startup log line (default: `"Birb"`).
    pub name: String,

    /// TCP port the server binds on all interfaces when no listener is
    /// supplied (default: `8080`).
    pub port: u16,

    /// Subscriber receiving the server's events. `None` uses whatever
    /// subscriber is the default where the server is launched.
    pub logger: Option<Dispatch>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "Birb".to_owned(),
            port: 8080,
            logger: None,
        }
    }
}
