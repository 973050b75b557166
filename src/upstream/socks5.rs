//! SOCKS5 upstream dialer
//!
//! Each dial opens a fresh TCP connection to the relay, runs the SOCKS5
//! greeting (optionally with RFC 1929 username/password authentication) and a
//! CONNECT for the original destination, then hands back the bare TCP stream.
//! The handshake itself is done by `tokio-socks`.
//!
//! # Relay Address Format
//!
//! ```text
//! [USER:PASS@]HOST:PORT
//! ```
//!
//! The credentials part is split at the last `@`, so passwords may contain
//! `@`. IPv6 hosts use brackets: `[2001:db8::80]:1080`.
//!
//! # Example
//!
//! ```no_run
//! use redirsocks::config::UpstreamConfig;
//! use redirsocks::upstream::{Socks5Dialer, UpstreamDialer};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let dialer = Socks5Dialer::new(&UpstreamConfig {
//!     relay: "user:secret@10.0.0.80:1080".into(),
//!     connect_timeout_secs: 10,
//! })?;
//!
//! let stream = dialer.dial("203.0.113.5:443".parse()?).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_socks::tcp::Socks5Stream;
use tracing::{debug, trace};

use super::traits::UpstreamDialer;
use crate::config::UpstreamConfig;
use crate::error::DialError;

/// Username/password pair for RFC 1929 authentication
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// A parsed `[USER:PASS@]HOST:PORT` relay address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayEndpoint {
    host: String,
    port: u16,
    credentials: Option<Credentials>,
}

impl RelayEndpoint {
    /// Parse a relay address.
    ///
    /// # Errors
    ///
    /// Returns `DialError::InvalidRelay` if the host or port is missing, the
    /// port is not a valid non-zero number, or the credentials lack a `:`.
    pub fn parse(input: &str) -> Result<Self, DialError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DialError::InvalidRelay("empty relay address".into()));
        }

        let (credentials, hostport) = match input.rsplit_once('@') {
            Some((userinfo, hostport)) => {
                let (username, password) = userinfo.split_once(':').ok_or_else(|| {
                    DialError::InvalidRelay(format!(
                        "credentials must be USER:PASS in '{}'",
                        redact(input)
                    ))
                })?;
                if username.is_empty() {
                    return Err(DialError::InvalidRelay("empty username".into()));
                }
                let credentials = Credentials {
                    username: username.to_string(),
                    password: password.to_string(),
                };
                (Some(credentials), hostport)
            }
            None => (None, input),
        };

        let (host, port) = hostport.rsplit_once(':').ok_or_else(|| {
            DialError::InvalidRelay(format!("missing port in '{hostport}'"))
        })?;

        // Bracketed IPv6 literal: the colon split must land after the ']'
        if host.starts_with('[') && !host.ends_with(']') {
            return Err(DialError::InvalidRelay(format!(
                "malformed IPv6 host in '{hostport}'"
            )));
        }
        if host.is_empty() || host == "[]" {
            return Err(DialError::InvalidRelay(format!("missing host in '{hostport}'")));
        }

        let port: u16 = port
            .parse()
            .map_err(|_| DialError::InvalidRelay(format!("invalid port '{port}'")))?;
        if port == 0 {
            return Err(DialError::InvalidRelay("port must not be 0".into()));
        }

        Ok(Self {
            host: host.to_string(),
            port,
            credentials,
        })
    }

    /// Relay host (brackets kept for IPv6 literals)
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Relay port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Credentials, if any
    #[must_use]
    pub const fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// `host:port` without credentials
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for RelayEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(creds) = &self.credentials {
            write!(f, "{}:***@", creds.username)?;
        }
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Hide the password part of a raw relay string
fn redact(input: &str) -> String {
    match input.rsplit_once('@') {
        Some((userinfo, hostport)) => {
            let user = userinfo.split(':').next().unwrap_or_default();
            format!("{user}:***@{hostport}")
        }
        None => input.to_string(),
    }
}

/// Dialer that tunnels every connection through a SOCKS5 relay
#[derive(Debug, Clone)]
pub struct Socks5Dialer {
    endpoint: RelayEndpoint,
    /// `host:port` handed to the SOCKS5 client
    address: String,
    connect_timeout: Duration,
}

impl Socks5Dialer {
    /// Create a dialer for the configured relay.
    ///
    /// # Errors
    ///
    /// Returns `DialError::InvalidRelay` if the relay address is malformed.
    pub fn new(config: &UpstreamConfig) -> Result<Self, DialError> {
        let endpoint = RelayEndpoint::parse(&config.relay)?;
        let address = endpoint.address();

        debug!(
            "SOCKS5 dialer for {} (auth={}, timeout={}s)",
            address,
            endpoint.credentials.is_some(),
            config.connect_timeout_secs
        );

        Ok(Self {
            endpoint,
            address,
            connect_timeout: config.connect_timeout(),
        })
    }

    /// Get the relay endpoint
    #[must_use]
    pub const fn endpoint(&self) -> &RelayEndpoint {
        &self.endpoint
    }

    /// Get the connect timeout
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    async fn handshake(&self, target: SocketAddr) -> Result<TcpStream, tokio_socks::Error> {
        let proxy = self.address.as_str();
        let stream = match &self.endpoint.credentials {
            Some(creds) => {
                Socks5Stream::connect_with_password(
                    proxy,
                    target,
                    &creds.username,
                    &creds.password,
                )
                .await?
            }
            None => Socks5Stream::connect(proxy, target).await?,
        };
        Ok(stream.into_inner())
    }
}

#[async_trait]
impl UpstreamDialer for Socks5Dialer {
    async fn dial(&self, target: SocketAddr) -> Result<TcpStream, DialError> {
        trace!("SOCKS5 CONNECT {} via {}", target, self.address);

        match timeout(self.connect_timeout, self.handshake(target)).await {
            Ok(Ok(stream)) => {
                debug!("SOCKS5 tunnel to {} established via {}", target, self.address);
                Ok(stream)
            }
            Ok(Err(e)) => Err(DialError::connection_failed(
                target,
                &self.address,
                e.to_string(),
            )),
            Err(_) => Err(DialError::Timeout {
                target,
                relay: self.address.clone(),
                timeout_secs: self.connect_timeout.as_secs(),
            }),
        }
    }

    fn relay(&self) -> &str {
        &self.address
    }
}
