//! Directory connection abstraction and its `ldap3` implementation.
//!
//! [`DirectoryConnector`] hands out bound [`DirectoryConnection`]s. A connection is used for
//! one logical operation and then unbound, so a connector can pool, cap or recreate
//! connections freely.

use crate::{config::DirectoryConfig, entry::DirectoryEntry, Result};
use async_trait::async_trait;
use dirkit_core::Error;
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry, SearchOptions};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::debug;

/// `success` result code.
const RC_SUCCESS: u32 = 0;
/// `sizeLimitExceeded`: the search returned a truncated page.
const RC_SIZE_LIMIT_EXCEEDED: u32 = 4;
/// `noSuchObject`: the base or target entry does not exist.
const RC_NO_SUCH_OBJECT: u32 = 32;

/// Represents the search scope for LDAP queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// A single search as sent to the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base path.
    pub base: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Filter text.
    pub filter: String,
    /// Requested attributes; empty requests all user attributes.
    pub attributes: Vec<String>,
    /// Maximum number of entries returned.
    pub size_limit: u32,
    /// Return attribute names without values.
    pub types_only: bool,
}

/// LDAP modification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes attribute).
        values: Vec<String>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

/// A bound connection to the directory.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnection: Send {
    /// Executes a search and returns the matching entries.
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>>;
    /// Creates an entry.
    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()>;
    /// Applies modifications to an entry.
    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()>;
    /// Deletes an entry.
    async fn delete(&mut self, dn: &str) -> Result<()>;
    /// Moves and/or renames an entry in one operation.
    async fn rename(&mut self, dn: &str, new_rdn: &str, new_parent: &str) -> Result<()>;
    /// Releases the connection.
    async fn unbind(&mut self) -> Result<()>;
}

/// Source of bound directory connections.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Opens (or checks out) a bound connection.
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>>;
}

/// `ldap3` connector: one bound connection per operation, at most
/// [`DirectoryConfig::max_connections`] open at a time.
pub struct LdapConnector {
    config: Arc<DirectoryConfig>,
    slots: Arc<Semaphore>,
}

impl LdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub fn new(config: Arc<DirectoryConfig>) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_connections()));
        Self { config, slots }
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::connection("connect", "connection pool closed"))?;

        let settings = build_ldap_settings(&self.config)?;
        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, self.config.url())
            .await
            .map_err(|err| map_ldap_error("connect", &err))?;
        ldap3::drive!(conn);

        let credentials = self.config.credentials();
        let result = timeout(
            self.config.operation_timeout(),
            ldap.simple_bind(credentials.bind_dn(), credentials.bind_password()),
        )
        .await
        .map_err(|_| Error::Timeout("directory bind timed out".to_string()))?
        .map_err(|err| map_ldap_error("bind", &err))?;
        check_result("bind", &result)?;
        debug!(url = self.config.url(), "bound directory connection");

        Ok(Box::new(LdapConnection {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
            _permit: permit,
        }))
    }
}

struct LdapConnection {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl DirectoryConnection for LdapConnection {
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>> {
        let options = SearchOptions::new()
            .sizelimit(i32::try_from(request.size_limit).unwrap_or(i32::MAX))
            .typesonly(request.types_only);
        let ldap3::SearchResult(entries, status) = run(
            self.operation_timeout,
            "search",
            self.inner.with_search_options(options).search(
                &request.base,
                request.scope.into(),
                &request.filter,
                request.attributes.clone(),
            ),
        )
        .await?;

        match status.rc {
            RC_SUCCESS => {}
            RC_SIZE_LIMIT_EXCEEDED => debug!(
                filter = %request.filter,
                returned = entries.len(),
                "search truncated at size limit"
            ),
            _ => check_result("search", &status)?,
        }

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(DirectoryEntry::from)
            .collect())
    }

    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| (name.as_bytes().to_vec(), byte_set(values)))
            .collect::<Vec<_>>();
        let result = run(self.operation_timeout, "add", self.inner.add(dn, attrs)).await?;
        check_result("add", &result)
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                DirectoryModification::Add { attribute, values } => {
                    Mod::Add(attribute.as_bytes().to_vec(), byte_set(values))
                }
                DirectoryModification::Delete { attribute, values } => {
                    Mod::Delete(attribute.as_bytes().to_vec(), byte_set(values))
                }
                DirectoryModification::Replace { attribute, values } => {
                    Mod::Replace(attribute.as_bytes().to_vec(), byte_set(values))
                }
            })
            .collect::<Vec<_>>();

        let result = run(self.operation_timeout, "modify", self.inner.modify(dn, mods)).await?;
        check_result("modify", &result)
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let result = run(self.operation_timeout, "delete", self.inner.delete(dn)).await?;
        check_result("delete", &result)
    }

    async fn rename(&mut self, dn: &str, new_rdn: &str, new_parent: &str) -> Result<()> {
        let result = run(
            self.operation_timeout,
            "rename",
            self.inner.modifydn(dn, new_rdn, true, Some(new_parent)),
        )
        .await?;
        check_result("rename", &result)
    }

    async fn unbind(&mut self) -> Result<()> {
        run(self.operation_timeout, "unbind", self.inner.unbind()).await
    }
}

async fn run<F, T>(limit: Duration, operation: &str, fut: F) -> Result<T>
where
    F: std::future::Future<Output = ldap3::result::Result<T>>,
{
    timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(format!("directory {operation} timed out")))?
        .map_err(|err| map_ldap_error(operation, &err))
}

fn byte_set(values: &[String]) -> HashSet<Vec<u8>> {
    values
        .iter()
        .map(|value| value.as_bytes().to_vec())
        .collect()
}

fn build_ldap_settings(config: &DirectoryConfig) -> Result<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify() {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = config.tls_ca_cert() {
        let pem = fs::read(cert_path).map_err(|err| {
            Error::ConfigError(format!(
                "failed to read directory CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem).map_err(|err| {
            Error::ConfigError(format!("invalid directory CA certificate: {err}"))
        })?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                Error::ConfigError(format!("failed to load directory CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(operation: &str, err: &ldap3::LdapError) -> Error {
    Error::connection(operation, err.to_string())
}

fn check_result(operation: &str, result: &ldap3::LdapResult) -> Result<()> {
    match result.rc {
        RC_SUCCESS => Ok(()),
        RC_NO_SUCH_OBJECT => Err(Error::NotFound(if result.matched.is_empty() {
            result.text.clone()
        } else {
            format!("no entry below `{}`", result.matched)
        })),
        rc => Err(Error::connection(
            operation,
            format!("result code {rc}: {}", result.text),
        )),
    }
}
