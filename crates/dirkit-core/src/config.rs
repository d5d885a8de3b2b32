//! Serializable directory client settings.
//!
//! [`DirectorySettings`] is the on-disk / environment shape of a client configuration.
//! It is validated with `validator` before the runtime configuration is built from it.

use crate::{credentials::BindCredentials, Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Maximum number of entries the directory returns for one search request.
pub const DEFAULT_PAGE_SIZE: u32 = 1000;
/// Number of values the directory returns per range-retrieval window.
pub const DEFAULT_RANGE_WINDOW: u32 = 1500;
/// Upper bound on range-retrieval windows requested for a single attribute.
pub const DEFAULT_MAX_RANGE_WINDOWS: u32 = 1000;
/// Maximum length, in characters, of an entry label such as a group name.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Settings for a directory client instance.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DirectorySettings {
    /// Directory URL (`ldap://` or `ldaps://`)
    #[validate(url)]
    pub url: String,

    /// Distinguished name used to bind
    #[validate(length(min = 1))]
    pub bind_dn: String,

    /// Bind password
    #[serde(skip_serializing)]
    pub bind_password: String,

    /// Search base for every lookup
    #[validate(length(min = 1))]
    pub base_dn: String,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to custom CA certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<std::path::PathBuf>,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per-operation timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Protocol limits
    #[validate(nested)]
    #[serde(default)]
    pub limits: ProtocolLimits,

    /// Maximum number of concurrently open connections
    #[validate(range(min = 1, max = 64))]
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_max_connections() -> u32 {
    4
}

impl DirectorySettings {
    /// Parses and validates settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the document is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        settings.parse_url()?;
        Ok(settings)
    }

    /// Parse and validate the directory URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or uses a non-LDAP scheme.
    pub fn parse_url(&self) -> Result<Url> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "ldap" | "ldaps" | "ldapi" => Ok(url),
            other => Err(Error::ConfigError(format!(
                "unsupported directory URL scheme `{other}`"
            ))),
        }
    }

    /// Builds the bind credentials.
    #[must_use]
    pub fn credentials(&self) -> BindCredentials {
        BindCredentials::new(self.bind_dn.clone(), self.bind_password.clone())
    }

    /// Get the connection timeout as a Duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Get the operation timeout as a Duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Server-imposed limits that shape searches and range retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct ProtocolLimits {
    /// Entries per search request
    #[validate(range(min = 1, max = 1000))]
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Values per range-retrieval window
    #[validate(range(min = 1, max = 1500))]
    #[serde(default = "default_range_window")]
    pub range_window: u32,

    /// Windows requested before range retrieval is abandoned
    #[validate(range(min = 1))]
    #[serde(default = "default_max_range_windows")]
    pub max_range_windows: u32,
}

const fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

const fn default_range_window() -> u32 {
    DEFAULT_RANGE_WINDOW
}

const fn default_max_range_windows() -> u32 {
    DEFAULT_MAX_RANGE_WINDOWS
}

impl ProtocolLimits {
    /// Limits matching the directory's architectural defaults.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            range_window: DEFAULT_RANGE_WINDOW,
            max_range_windows: DEFAULT_MAX_RANGE_WINDOWS,
        }
    }

    /// Set the search page size.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Set the range-retrieval window size.
    #[must_use]
    pub const fn with_range_window(mut self, range_window: u32) -> Self {
        self.range_window = range_window;
        self
    }

    /// Set the range-retrieval window bound.
    #[must_use]
    pub const fn with_max_range_windows(mut self, windows: u32) -> Self {
        self.max_range_windows = windows;
        self
    }
}

impl Default for ProtocolLimits {
    fn default() -> Self {
        Self::new()
    }
}
