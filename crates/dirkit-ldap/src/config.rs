//! Runtime configuration for directory sessions.

use crate::{dn::DistinguishedName, Result};
use dirkit_core::config::{DirectorySettings, ProtocolLimits};
use dirkit_core::credentials::BindCredentials;
use dirkit_core::Error;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 10;
/// Default cap on concurrently open connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 4;

/// Configuration for connecting to and querying the directory.
#[derive(Debug)]
pub struct DirectoryConfig {
    url: String,
    credentials: BindCredentials,
    base_dn: DistinguishedName,
    limits: ProtocolLimits,
    tls_verify: bool,
    tls_ca_cert: Option<PathBuf>,
    connection_timeout_secs: u64,
    operation_timeout_secs: u64,
    max_connections: usize,
}

impl DirectoryConfig {
    /// Creates a new configuration with default limits and timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if the provided URL is invalid.
    pub fn new(
        url: impl Into<String>,
        credentials: BindCredentials,
        base_dn: DistinguishedName,
    ) -> Result<Self> {
        let url_string = url.into();
        Url::parse(&url_string)?;

        Ok(Self {
            url: url_string,
            credentials,
            base_dn,
            limits: ProtocolLimits::default(),
            tls_verify: true,
            tls_ca_cert: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        })
    }

    /// Builds a configuration from validated settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or base DN cannot be parsed.
    pub fn from_settings(settings: &DirectorySettings) -> Result<Self> {
        settings.parse_url()?;
        let base_dn = DistinguishedName::parse(&settings.base_dn)
            .map_err(|err| Error::ConfigError(format!("invalid base DN: {err}")))?;

        let mut config = Self::new(settings.url.clone(), settings.credentials(), base_dn)?
            .with_limits(settings.limits)
            .with_tls_verification(settings.tls_verify)
            .with_connection_timeout_secs(settings.connection_timeout_secs)
            .with_operation_timeout_secs(settings.operation_timeout_secs)
            .with_max_connections(settings.max_connections as usize);
        if let Some(path) = &settings.tls_ca_cert {
            config = config.with_tls_ca_cert(path.clone());
        }
        Ok(config)
    }

    /// Returns the directory endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the bind credentials.
    #[must_use]
    pub const fn credentials(&self) -> &BindCredentials {
        &self.credentials
    }

    /// Returns the search base distinguished name.
    #[must_use]
    pub const fn base_dn(&self) -> &DistinguishedName {
        &self.base_dn
    }

    /// Returns the protocol limits.
    #[must_use]
    pub const fn limits(&self) -> &ProtocolLimits {
        &self.limits
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

    /// Maximum number of concurrently open connections.
    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Overrides the protocol limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: ProtocolLimits) -> Self {
        self.limits = limits;
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

    /// Overrides the connection cap (at least one).
    #[must_use]
    pub fn with_max_connections(mut self, connections: usize) -> Self {
        self.max_connections = connections.max(1);
        self
    }
}
