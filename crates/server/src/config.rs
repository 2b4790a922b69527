//! HTTP listener bind settings

/// Where the HTTP listener binds
///
/// `host` may be an IP address or a resolvable name. Port 0 asks the OS for
/// an ephemeral port.
///
/// # Example
///
/// ```
/// use server::config::ServerConfig;
///
/// let config = ServerConfig::new("127.0.0.1", 3000);
/// assert_eq!(config.address(), "127.0.0.1:3000");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, for logs and errors
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Same host, different port
    pub(crate) fn with_port(&self, port: u16) -> Self {
        Self::new(self.host.clone(), port)
    }
}
