//! Connection configuration

use std::time::Duration;

use burrow_proto::{FieldTable, Writer};
use bytes::Bytes;
use tokio::net::TcpStream;
use tracing::debug;

use crate::{connection, Connection, Result};

/// Port brokers listen on by default
pub const DEFAULT_PORT: u16 = 5672;

/// User name and password sent during the handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    /// User name
    pub user: String,
    /// Password
    pub password: String,
}

impl Login {
    /// Create a login
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    /// AMQPLAIN response: a `LOGIN`/`PASSWORD` table without its length prefix
    pub fn amqplain_response(&self) -> Result<Bytes> {
        let table = FieldTable::new()
            .with("LOGIN", self.user.as_str())
            .with("PASSWORD", self.password.as_str());
        let mut writer = Writer::new();
        writer.write_table(&table)?;
        Ok(writer.finish().slice(4..))
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Virtual host opened after tuning
    pub virtual_host: String,
    /// Credentials, if any
    pub login: Option<Login>,
    /// Security mechanism named in `start-ok`
    pub login_method: String,
    /// Locale named in `start-ok`
    pub locale: String,
    /// Ask the broker not to redirect
    pub insist: bool,
    /// Highest channel id the client asks for
    pub channel_max: u16,
    /// Largest frame the client accepts, header and terminator included
    pub frame_max: u32,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Deadline for each blocking frame read
    pub read_timeout: Duration,
    /// Overall deadline for a wait that keeps deferring methods
    pub wait_timeout: Option<Duration>,
    /// Inflate bodies according to their `content_encoding`
    pub auto_decode: bool,
    /// Properties announced to the broker in `start-ok`
    pub client_properties: FieldTable,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            virtual_host: "/".to_string(),
            login: None,
            login_method: "AMQPLAIN".to_string(),
            locale: "en_US".to_string(),
            insist: false,
            channel_max: u16::MAX,
            frame_max: 131_072,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(3),
            wait_timeout: None,
            auto_decode: true,
            client_properties: FieldTable::new()
                .with("library", "burrow")
                .with("library_version", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ConnectionConfig {
    /// Response sent with `start-ok` and `secure-ok`
    pub fn login_response(&self) -> Result<Bytes> {
        match &self.login {
            Some(login) => login.amqplain_response(),
            None => Ok(Bytes::new()),
        }
    }
}

/// Builder for configuring connections
pub struct ConnectionBuilder {
    /// Broker address as `host:port`
    address: String,
    /// Configuration being built
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Create a builder from a target of the form `[user[:password]@]host[:port][/vhost]`
    pub fn new(target: &str) -> Self {
        let (login, address, virtual_host) = Self::parse_target(target);
        let mut config = ConnectionConfig {
            login,
            ..Default::default()
        };
        if let Some(virtual_host) = virtual_host {
            config.virtual_host = virtual_host;
        }
        Self { address, config }
    }

    /// Parse a target string into login, address and virtual host
    fn parse_target(target: &str) -> (Option<Login>, String, Option<String>) {
        let mut rest = target;
        let mut login = None;
        let mut virtual_host = None;

        // Credentials come before the last '@'
        if let Some(at_pos) = rest.rfind('@') {
            let credentials = &rest[..at_pos];
            login = Some(match credentials.split_once(':') {
                Some((user, password)) => Login::new(user, password),
                None => Login::new(credentials, ""),
            });
            rest = &rest[at_pos + 1..];
        }

        // Everything after the first '/' names the virtual host
        if let Some(slash_pos) = rest.find('/') {
            let vhost = &rest[slash_pos + 1..];
            virtual_host = Some(if vhost.is_empty() {
                "/".to_string()
            } else {
                vhost.to_string()
            });
            rest = &rest[..slash_pos];
        }

        let address = match rest.rsplit_once(':') {
            Some((_, port)) if port.parse::<u16>().is_ok() => rest.to_string(),
            _ => format!("{}:{}", rest, DEFAULT_PORT),
        };

        (login, address, virtual_host)
    }

    /// Broker address this builder connects to
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Set credentials
    pub fn with_login(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.login = Some(Login::new(user, password));
        self
    }

    /// Set the virtual host
    pub fn with_virtual_host(mut self, virtual_host: impl Into<String>) -> Self {
        self.config.virtual_host = virtual_host.into();
        self
    }

    /// Set the security mechanism
    pub fn with_login_method(mut self, login_method: impl Into<String>) -> Self {
        self.config.login_method = login_method.into();
        self
    }

    /// Set the locale
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.config.locale = locale.into();
        self
    }

    /// Ask the broker not to redirect
    pub fn with_insist(mut self, insist: bool) -> Self {
        self.config.insist = insist;
        self
    }

    /// Set the highest channel id to ask for
    pub fn with_channel_max(mut self, channel_max: u16) -> Self {
        self.config.channel_max = channel_max;
        self
    }

    /// Set the largest frame to accept
    pub fn with_frame_max(mut self, frame_max: u32) -> Self {
        self.config.frame_max = frame_max;
        self
    }

    /// Set TCP connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the per-frame read timeout
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the overall wait deadline
    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_timeout = Some(timeout);
        self
    }

    /// Enable/disable content-encoding auto-decode
    pub fn with_auto_decode(mut self, auto_decode: bool) -> Self {
        self.config.auto_decode = auto_decode;
        self
    }

    /// Add a client property
    pub fn with_client_property(mut self, key: &str, value: &str) -> Self {
        self.config.client_properties.insert(key, value);
        self
    }

    /// Build the connection configuration
    pub fn build_config(self) -> ConnectionConfig {
        self.config
    }

    /// Connect over TCP and run the handshake
    pub async fn connect(self) -> Result<Connection<TcpStream>> {
        debug!(address = %self.address, "Connecting");
        connection::connect(self.address.as_str(), self.config).await
    }
}
