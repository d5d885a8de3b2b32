//! Directory session: filter construction, lookups, mutations and move/rename.

use crate::{
    config::DirectoryConfig,
    connection::{
        DirectoryConnection, DirectoryConnector, DirectoryModification, LdapConnector,
        SearchRequest, SearchScope,
    },
    dn::{DistinguishedName, RelativeDistinguishedName},
    entry::{AttributeValue, DirectoryEntry, OBJECT_CLASS, OBJECT_GUID},
    filter,
    group::GroupType,
    object::DirectoryObject,
    Result,
};
use dirkit_core::config::{ProtocolLimits, MAX_LABEL_LENGTH};
use dirkit_core::{Error, ObjectGuid};
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Multi-valued address attribute carrying `SMTP:`/`smtp:` prefixed addresses.
pub const PROXY_ADDRESSES: &str = "proxyAddresses";
/// Plain e-mail attribute.
pub const MAIL: &str = "mail";
/// Prefix of the primary proxy address (case-sensitive).
pub const PRIMARY_SMTP_PREFIX: &str = "SMTP:";
/// Prefix of secondary proxy addresses (case-sensitive).
pub const SECONDARY_SMTP_PREFIX: &str = "smtp:";

/// Returns true if `label` is acceptable as a group or container name.
///
/// A label must be non-empty, at most 63 characters, must not begin with a space or a
/// period and must contain at least one alphabetic character.
#[must_use]
pub fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.chars().count() <= MAX_LABEL_LENGTH
        && !label.starts_with([' ', '.'])
        && label.chars().any(char::is_alphabetic)
}

/// Entry point for all directory operations.
///
/// Cheap to clone: clones share the configuration and the connector.
#[derive(Clone)]
pub struct DirectorySession {
    config: Arc<DirectoryConfig>,
    connector: Arc<dyn DirectoryConnector>,
}

impl DirectorySession {
    /// Creates a session that uses the `ldap3` connector.
    #[must_use]
    pub fn new(config: DirectoryConfig) -> Self {
        let config = Arc::new(config);
        let connector: Arc<dyn DirectoryConnector> =
            Arc::new(LdapConnector::new(Arc::clone(&config)));
        Self { config, connector }
    }

    /// Creates a session over a custom connector.
    #[must_use]
    pub fn with_connector(config: DirectoryConfig, connector: Arc<dyn DirectoryConnector>) -> Self {
        Self {
            config: Arc::new(config),
            connector,
        }
    }

    /// Returns the session configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Returns the protocol limits in effect.
    #[must_use]
    pub fn limits(&self) -> &ProtocolLimits {
        self.config.limits()
    }

    /// Subtree search from the configured base, truncated at the page size.
    ///
    /// # Errors
    ///
    /// Returns a connection fault or timeout from the directory.
    pub async fn search(&self, filter: &str, attributes: &[&str]) -> Result<Vec<DirectoryEntry>> {
        self.search_within(self.config.base_dn(), SearchScope::Subtree, filter, attributes)
            .await
    }

    /// Search below an explicit base with an explicit scope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the base does not exist, or a connection fault.
    pub async fn search_within(
        &self,
        base: &DistinguishedName,
        scope: SearchScope,
        filter: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>> {
        let request = SearchRequest {
            base: base.as_str().to_string(),
            scope,
            filter: filter.to_string(),
            attributes: requested_attributes(attributes),
            size_limit: self.limits().page_size,
            types_only: false,
        };
        debug!(base = %request.base, filter = %request.filter, "directory search");

        let mut connection = self.open().await?;
        let result = self.execute_with_timeout(connection.search(&request)).await;
        self.release(connection).await;
        result
    }

    /// Returns the first entry whose `name` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty name or value; nothing is sent.
    pub async fn find_by_attribute(
        &self,
        name: &str,
        value: &str,
        attributes: &[&str],
    ) -> Result<Option<DirectoryEntry>> {
        Ok(self
            .find_all_by_attribute(name, value, attributes)
            .await?
            .into_iter()
            .next())
    }

    /// Returns every entry whose `name` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty name or value; nothing is sent.
    pub async fn find_all_by_attribute(
        &self,
        name: &str,
        value: &str,
        attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>> {
        if name.is_empty() || value.is_empty() {
            return Err(Error::InvalidInput(
                "attribute name and value are required".to_string(),
            ));
        }
        self.search(&filter::equality(name, value), attributes).await
    }

    /// Canonical lookup by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for the nil identifier, or a connection fault.
    pub async fn find_by_guid(
        &self,
        guid: &ObjectGuid,
        attributes: &[&str],
    ) -> Result<Option<DirectoryEntry>> {
        if guid.is_nil() {
            return Err(Error::InvalidInput("GUID must not be empty".to_string()));
        }
        Ok(self
            .search(&filter::guid(guid), attributes)
            .await?
            .into_iter()
            .next())
    }

    /// Base-scope lookup of the entry at `path`.
    ///
    /// # Errors
    ///
    /// Returns a connection fault or timeout; a missing entry is `Ok(None)`.
    pub async fn find_by_path(
        &self,
        path: &DistinguishedName,
        attributes: &[&str],
    ) -> Result<Option<DirectoryEntry>> {
        match self
            .search_within(path, SearchScope::Base, filter::MATCH_ALL, attributes)
            .await
        {
            Ok(entries) => Ok(entries.into_iter().next()),
            Err(Error::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Resolves a mail address: primary proxy address, then secondary proxy address,
    /// then the plain `mail` attribute.
    ///
    /// Directory equality matching ignores case, so a `SMTP:` query also matches `smtp:`
    /// values. Proxy-address matches only count when the entry holds the address under
    /// the exact prefix being tried.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty address, or a connection fault.
    pub async fn find_by_email(
        &self,
        address: &str,
        attributes: &[&str],
    ) -> Result<Option<DirectoryEntry>> {
        if address.is_empty() {
            return Err(Error::InvalidInput("mail address is required".to_string()));
        }
        let mut requested = attributes.to_vec();
        if !requested.is_empty()
            && !requested
                .iter()
                .any(|name| name.eq_ignore_ascii_case(PROXY_ADDRESSES))
        {
            requested.push(PROXY_ADDRESSES);
        }

        for prefix in [PRIMARY_SMTP_PREFIX, SECONDARY_SMTP_PREFIX] {
            let proxy = format!("{prefix}{address}");
            let holder = self
                .find_all_by_attribute(PROXY_ADDRESSES, &proxy, &requested)
                .await?
                .into_iter()
                .find(|entry| holds_proxy_address(entry, prefix, address));
            if holder.is_some() {
                return Ok(holder);
            }
        }
        self.find_by_attribute(MAIL, address, attributes).await
    }

    /// Resolves an object by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entry carries the identifier.
    pub async fn object_by_guid(
        &self,
        guid: &ObjectGuid,
        attributes: &[&str],
    ) -> Result<DirectoryObject> {
        let entry = self
            .find_by_guid(guid, attributes)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no entry with GUID {guid}")))?;
        self.wrap(entry)
    }

    /// Resolves an object by path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if nothing lives at the path.
    pub async fn object_by_path(
        &self,
        path: &DistinguishedName,
        attributes: &[&str],
    ) -> Result<DirectoryObject> {
        let entry = self
            .find_by_path(path, attributes)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no entry at `{path}`")))?;
        self.wrap(entry)
    }

    /// Resolves an object by mail address, see [`Self::find_by_email`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entry matches.
    pub async fn object_by_email(
        &self,
        address: &str,
        attributes: &[&str],
    ) -> Result<DirectoryObject> {
        let entry = self
            .find_by_email(address, attributes)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no entry with address `{address}`")))?;
        self.wrap(entry)
    }

    /// Wraps an entry from a prior search into an object bound to this session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the entry lacks an identifier or a valid path.
    pub fn wrap(&self, entry: DirectoryEntry) -> Result<DirectoryObject> {
        DirectoryObject::from_entry(self.clone(), &entry)
    }

    /// Reads one attribute of the entry with the given identifier, unpaged.
    ///
    /// Oversized attributes come back range-qualified and therefore empty here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry no longer exists.
    pub async fn fetch_attribute(
        &self,
        guid: &ObjectGuid,
        attribute: &str,
    ) -> Result<Vec<AttributeValue>> {
        let entry = self
            .find_by_guid(guid, &[attribute])
            .await?
            .ok_or_else(|| Error::NotFound(format!("no entry with GUID {guid}")))?;
        Ok(entry.values(attribute).map(<[_]>::to_vec).unwrap_or_default())
    }

    /// Current path of the entry with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entry carries the identifier.
    pub async fn resolve_path(&self, guid: &ObjectGuid) -> Result<DistinguishedName> {
        let entry = self
            .find_by_guid(guid, &[OBJECT_GUID])
            .await?
            .ok_or_else(|| Error::NotFound(format!("no entry with GUID {guid}")))?;
        Ok(DistinguishedName::parse(&entry.dn)?)
    }

    /// Creates an entry below `parent` and returns it as an object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] without object classes, or the directory's error.
    pub async fn create_entry(
        &self,
        parent: &DistinguishedName,
        rdn: RelativeDistinguishedName,
        object_classes: &[&str],
        attributes: Vec<(String, Vec<String>)>,
    ) -> Result<DirectoryObject> {
        if object_classes.is_empty() {
            return Err(Error::InvalidInput(
                "at least one object class is required".to_string(),
            ));
        }
        let path = parent.child(rdn);
        let mut all = vec![(
            OBJECT_CLASS.to_string(),
            object_classes.iter().map(ToString::to_string).collect(),
        )];
        all.extend(attributes);

        let mut connection = self.open().await?;
        let result = self
            .execute_with_timeout(connection.add(path.as_str(), &all))
            .await;
        self.release(connection).await;
        result?;
        debug!(path = %path, "created directory entry");

        self.object_by_path(&path, &[]).await
    }

    /// Creates a group named `label` in the container with identifier `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid label, [`Error::NotFound`] for an
    /// unknown parent.
    pub async fn create_group(
        &self,
        parent: &ObjectGuid,
        label: &str,
        group_type: GroupType,
    ) -> Result<DirectoryObject> {
        if !is_valid_label(label) {
            return Err(Error::InvalidInput(format!("invalid group name `{label}`")));
        }
        let parent_path = self.resolve_path(parent).await?;
        self.create_entry(
            &parent_path,
            RelativeDistinguishedName::new("CN", label),
            &["top", "group"],
            vec![
                ("sAMAccountName".to_string(), vec![label.to_string()]),
                ("groupType".to_string(), vec![group_type.to_raw().to_string()]),
            ],
        )
        .await
    }

    /// Deletes the entry with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entry carries the identifier.
    pub async fn delete(&self, guid: &ObjectGuid) -> Result<()> {
        let path = self.resolve_path(guid).await?;
        let mut connection = self.open().await?;
        let result = self
            .execute_with_timeout(connection.delete(path.as_str()))
            .await;
        self.release(connection).await;
        result?;
        debug!(%guid, path = %path, "deleted directory entry");
        Ok(())
    }

    /// Applies raw modifications to the entry with the given identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no entry carries the identifier, or the directory's error.
    pub async fn modify(
        &self,
        guid: &ObjectGuid,
        modifications: &[DirectoryModification],
    ) -> Result<()> {
        if modifications.is_empty() {
            return Ok(());
        }
        let path = self.resolve_path(guid).await?;
        let mut connection = self.open().await?;
        let result = self
            .execute_with_timeout(connection.modify(path.as_str(), modifications))
            .await;
        self.release(connection).await;
        result
    }

    /// Replaces every value of `attribute`, creating it if absent.
    ///
    /// # Errors
    ///
    /// See [`Self::modify`].
    pub async fn replace_attribute(
        &self,
        guid: &ObjectGuid,
        attribute: &str,
        values: Vec<String>,
    ) -> Result<()> {
        require_attribute_name(attribute)?;
        self.modify(
            guid,
            &[DirectoryModification::Replace {
                attribute: attribute.to_string(),
                values,
            }],
        )
        .await
    }

    /// Adds values to `attribute`.
    ///
    /// # Errors
    ///
    /// See [`Self::modify`].
    pub async fn add_attribute_values(
        &self,
        guid: &ObjectGuid,
        attribute: &str,
        values: Vec<String>,
    ) -> Result<()> {
        require_attribute_name(attribute)?;
        if values.is_empty() {
            return Ok(());
        }
        self.modify(
            guid,
            &[DirectoryModification::Add {
                attribute: attribute.to_string(),
                values,
            }],
        )
        .await
    }

    /// Deletes the given values of `attribute`, or the whole attribute when `values` is empty.
    ///
    /// # Errors
    ///
    /// See [`Self::modify`].
    pub async fn delete_attribute(
        &self,
        guid: &ObjectGuid,
        attribute: &str,
        values: Vec<String>,
    ) -> Result<()> {
        require_attribute_name(attribute)?;
        self.modify(
            guid,
            &[DirectoryModification::Delete {
                attribute: attribute.to_string(),
                values,
            }],
        )
        .await
    }

    /// Moves and/or renames the entry with identifier `guid` in a single directory call.
    ///
    /// An omitted parent keeps the current container, an omitted leaf name keeps the
    /// current one. Returns the entry's new path; on any error the entry is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the object or the new parent cannot be resolved,
    /// [`Error::InvalidInput`] for an empty leaf name or a root entry, or the directory's
    /// error.
    pub async fn move_rename(
        &self,
        guid: &ObjectGuid,
        new_parent: Option<&ObjectGuid>,
        new_leaf_name: Option<&str>,
    ) -> Result<DistinguishedName> {
        if new_leaf_name.is_some_and(str::is_empty) {
            return Err(Error::InvalidInput("leaf name must not be empty".to_string()));
        }

        let current = self.resolve_path(guid).await?;
        let parent = match new_parent {
            Some(parent_guid) => self.resolve_path(parent_guid).await?,
            None => current
                .parent()
                .ok_or_else(|| Error::InvalidInput(format!("`{current}` has no parent")))?,
        };
        let leaf = current
            .leaf()
            .ok_or_else(|| Error::InvalidInput(format!("`{current}` has no leaf")))?;
        let new_rdn = match new_leaf_name {
            Some(name) => leaf.with_value(name),
            None => leaf.clone(),
        };

        let mut connection = self.open().await?;
        let result = self
            .execute_with_timeout(connection.rename(
                current.as_str(),
                &new_rdn.to_string(),
                parent.as_str(),
            ))
            .await;
        self.release(connection).await;
        result?;

        let moved = parent.child(new_rdn);
        debug!(%guid, from = %current, to = %moved, "moved directory entry");
        Ok(moved)
    }

    async fn open(&self) -> Result<Box<dyn DirectoryConnection>> {
        self.execute_with_timeout(self.connector.connect()).await
    }

    async fn release(&self, mut connection: Box<dyn DirectoryConnection>) {
        if let Err(err) = connection.unbind().await {
            warn!(error = %err, "failed to release directory connection");
        }
    }

    async fn execute_with_timeout<F, T>(&self, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = Result<T>>,
    {
        timeout(self.config.operation_timeout(), fut)
            .await
            .map_err(|_| Error::Timeout("directory operation timed out".to_string()))?
    }
}

fn require_attribute_name(attribute: &str) -> Result<()> {
    if attribute.is_empty() {
        return Err(Error::InvalidInput("attribute name is required".to_string()));
    }
    Ok(())
}

/// Adds the identity attributes every object needs; an empty list stays empty (all).
/// Returns true if `entry` lists `address` under exactly `prefix`.
fn holds_proxy_address(entry: &DirectoryEntry, prefix: &str, address: &str) -> bool {
    entry.values(PROXY_ADDRESSES).is_some_and(|values| {
        values.iter().filter_map(AttributeValue::as_text).any(|value| {
            value
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.eq_ignore_ascii_case(address))
        })
    })
}

fn requested_attributes(attributes: &[&str]) -> Vec<String> {
    if attributes.is_empty() {
        return Vec::new();
    }
    let mut list: Vec<String> = attributes.iter().map(ToString::to_string).collect();
    for required in [OBJECT_GUID, OBJECT_CLASS] {
        if !list.iter().any(|name| name.eq_ignore_ascii_case(required)) {
            list.push(required.to_string());
        }
    }
    list
}
