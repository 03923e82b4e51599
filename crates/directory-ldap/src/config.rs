//! Configuration types for directory connections.

use directory_core::{DirectoryCredentials, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Default port for plain LDAP.
pub const DEFAULT_LDAP_PORT: u16 = 389;
/// Default port for LDAP over TLS.
pub const DEFAULT_LDAPS_PORT: u16 = 636;

/// Wire protocol used to reach the directory server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain LDAP, optionally upgraded with STARTTLS.
    #[default]
    Ldap,
    /// LDAP over TLS.
    Ldaps,
}

impl Protocol {
    /// URL scheme for this protocol.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Ldap => "ldap",
            Self::Ldaps => "ldaps",
        }
    }

    /// Well-known port for this protocol.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Ldap => DEFAULT_LDAP_PORT,
            Self::Ldaps => DEFAULT_LDAPS_PORT,
        }
    }
}

/// Configuration for connecting to a directory server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    host: String,
    credentials: DirectoryCredentials,
    #[serde(default)]
    protocol: Protocol,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default = "default_use_starttls")]
    use_starttls: bool,
    #[serde(default = "default_protocol_version")]
    protocol_version: u32,
    #[serde(default)]
    base_dn: Option<String>,
    #[serde(default = "default_tls_verify")]
    tls_verify: bool,
    #[serde(default)]
    tls_ca_cert: Option<PathBuf>,
    #[serde(default = "default_connection_timeout_secs")]
    connection_timeout_secs: u64,
    #[serde(default = "default_operation_timeout_secs")]
    operation_timeout_secs: u64,
}

const fn default_use_starttls() -> bool {
    true
}

const fn default_protocol_version() -> u32 {
    3
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

impl DirectoryConfig {
    /// Creates a new directory configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectSyntax`] if the host is empty.
    pub fn new(host: impl Into<String>, credentials: DirectoryCredentials) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(Error::ConnectSyntax("host must not be empty".to_string()));
        }

        Ok(Self {
            host,
            credentials,
            protocol: Protocol::default(),
            port: None,
            use_starttls: default_use_starttls(),
            protocol_version: default_protocol_version(),
            base_dn: None,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: default_connection_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
        })
    }

    /// Returns the directory server host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &DirectoryCredentials {
        &self.credentials
    }

    /// Returns the configured wire protocol.
    #[must_use]
    pub const fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Returns the effective port (explicit override or protocol default).
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.protocol.default_port())
    }

    /// Returns true if the connection should be upgraded with STARTTLS.
    ///
    /// Only meaningful for plain LDAP; `ldaps` connections are already
    /// TLS-wrapped and never STARTTLS-upgraded.
    #[must_use]
    pub fn starttls(&self) -> bool {
        self.use_starttls && matches!(self.protocol, Protocol::Ldap)
    }

    /// Returns the requested LDAP protocol version.
    #[must_use]
    pub const fn protocol_version(&self) -> u32 {
        self.protocol_version
    }

    /// Returns the default search base, when configured.
    #[must_use]
    pub fn base_dn(&self) -> Option<&str> {
        self.base_dn.as_deref()
    }

    /// Returns whether TLS certificate verification is enabled.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Optional custom CA certificate path.
    #[must_use]
    pub fn tls_ca_cert(&self) -> Option<&PathBuf> {
        self.tls_ca_cert.as_ref()
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    /// Renders and validates the connection URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectSyntax`] when the host/protocol/port
    /// combination does not form a valid URL. This is a pure syntax check;
    /// no network attempt is made.
    pub fn url(&self) -> Result<String> {
        let rendered = format!("{}://{}:{}", self.protocol.scheme(), self.host, self.port());
        let parsed = Url::parse(&rendered)?;
        if parsed.host_str().is_none() {
            return Err(Error::ConnectSyntax(format!(
                "`{rendered}` has no usable host"
            )));
        }
        Ok(rendered)
    }

    /// Overrides the wire protocol.
    #[must_use]
    pub const fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Overrides the server port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Enables or disables the STARTTLS upgrade for plain LDAP.
    #[must_use]
    pub const fn with_starttls(mut self, use_starttls: bool) -> Self {
        self.use_starttls = use_starttls;
        self
    }

    /// Overrides the requested LDAP protocol version.
    #[must_use]
    pub const fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    /// Sets the default search base for attribute lookups.
    #[must_use]
    pub fn with_base_dn(mut self, base_dn: impl Into<String>) -> Self {
        self.base_dn = Some(base_dn.into());
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }
}
