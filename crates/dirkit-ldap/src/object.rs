//! Directory objects: identity, kind, path and lazily loaded attributes.

use crate::{
    codec,
    dn::DistinguishedName,
    entry::{AttributeValue, DirectoryEntry, OBJECT_CLASS},
    group::Group,
    pager::RangeRetrievalPager,
    principal::Principal,
    session::DirectorySession,
    user::User,
    Result,
};
use chrono::{DateTime, Utc};
use dirkit_core::{Error, ObjectGuid};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Most specific kind of a directory object, derived from its `objectClass` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// Security or distribution group.
    Group,
    /// User account.
    User,
    /// Computer account.
    Computer,
    /// Mail contact.
    Contact,
    /// Organizational unit.
    OrganizationalUnit,
    /// Generic container, including the domain root.
    Container,
    /// Anything else.
    Other,
}

/// Schema classes of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectKinds {
    classes: Vec<String>,
}

impl ObjectKinds {
    /// Builds the kind set from raw `objectClass` values.
    #[must_use]
    pub fn from_classes(classes: Vec<String>) -> Self {
        Self { classes }
    }

    /// Raw class names in server order.
    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Case-insensitive class membership.
    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c.eq_ignore_ascii_case(class))
    }

    /// The most specific kind. Computer accounts also carry the `user` class.
    #[must_use]
    pub fn primary(&self) -> ObjectKind {
        if self.has_class("group") {
            ObjectKind::Group
        } else if self.has_class("computer") {
            ObjectKind::Computer
        } else if self.has_class("user") {
            ObjectKind::User
        } else if self.has_class("contact") {
            ObjectKind::Contact
        } else if self.has_class("organizationalUnit") {
            ObjectKind::OrganizationalUnit
        } else if ["container", "builtinDomain", "domainDNS"]
            .iter()
            .any(|class| self.has_class(class))
        {
            ObjectKind::Container
        } else {
            ObjectKind::Other
        }
    }

    /// Groups, users and computers are security principals.
    #[must_use]
    pub fn is_principal(&self) -> bool {
        matches!(
            self.primary(),
            ObjectKind::Group | ObjectKind::User | ObjectKind::Computer
        )
    }
}

/// Per-object attribute values keyed by case-folded name.
///
/// Every invalidation bumps [`generation`](Self::generation), so a caller holding a
/// generation number can tell whether what it read is still current.
#[derive(Debug, Clone, Default)]
pub struct AttributeCache {
    entries: HashMap<String, Vec<AttributeValue>>,
    generation: u64,
}

impl AttributeCache {
    /// Seeds the cache from a search entry. Range-qualified and empty attributes are skipped.
    #[must_use]
    pub fn from_entry(entry: &DirectoryEntry) -> Self {
        let entries = entry
            .attributes
            .iter()
            .filter(|(name, values)| !name.contains(';') && !values.is_empty())
            .map(|(name, values)| (name.to_ascii_lowercase(), values.clone()))
            .collect();
        Self {
            entries,
            generation: 0,
        }
    }

    /// Cached values, if loaded.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&[AttributeValue]> {
        self.entries
            .get(&attribute.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// Returns true if the attribute is loaded.
    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.entries.contains_key(&attribute.to_ascii_lowercase())
    }

    /// Number of loaded attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    fn insert(&mut self, attribute: &str, values: Vec<AttributeValue>) {
        self.entries.insert(attribute.to_ascii_lowercase(), values);
    }

    /// Drops one attribute. Returns true if it was loaded.
    pub fn invalidate(&mut self, attribute: &str) -> bool {
        self.generation += 1;
        self.entries.remove(&attribute.to_ascii_lowercase()).is_some()
    }

    /// Drops every attribute.
    pub fn clear(&mut self) {
        self.generation += 1;
        self.entries.clear();
    }
}

/// A directory entry bound to a session.
///
/// The identifier never changes; the path does whenever the entry is moved or renamed.
/// Attribute reads go through the cache and fall back to range retrieval for attributes
/// the directory will not return in one piece.
pub struct DirectoryObject {
    session: DirectorySession,
    guid: ObjectGuid,
    dn: DistinguishedName,
    kinds: ObjectKinds,
    cache: AttributeCache,
}

impl fmt::Debug for DirectoryObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryObject")
            .field("guid", &self.guid)
            .field("dn", &self.dn.as_str())
            .field("kind", &self.kinds.primary())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

impl DirectoryObject {
    pub(crate) fn from_entry(session: DirectorySession, entry: &DirectoryEntry) -> Result<Self> {
        let guid = entry.guid()?;
        let dn = DistinguishedName::parse(&entry.dn)?;
        Ok(Self {
            session,
            guid,
            dn,
            kinds: ObjectKinds::from_classes(entry.object_classes()),
            cache: AttributeCache::from_entry(entry),
        })
    }

    /// Rename-stable identifier.
    #[must_use]
    pub const fn guid(&self) -> ObjectGuid {
        self.guid
    }

    /// Current path.
    #[must_use]
    pub const fn dn(&self) -> &DistinguishedName {
        &self.dn
    }

    /// Schema classes.
    #[must_use]
    pub const fn kinds(&self) -> &ObjectKinds {
        &self.kinds
    }

    /// Most specific kind.
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        self.kinds.primary()
    }

    /// Returns true for groups.
    #[must_use]
    pub fn is_group(&self) -> bool {
        self.kind() == ObjectKind::Group
    }

    /// Returns true for user accounts (not computers).
    #[must_use]
    pub fn is_user(&self) -> bool {
        self.kind() == ObjectKind::User
    }

    /// Returns true for groups, users and computers.
    #[must_use]
    pub fn is_principal(&self) -> bool {
        self.kinds.is_principal()
    }

    /// Session the object is bound to.
    #[must_use]
    pub const fn session(&self) -> &DirectorySession {
        &self.session
    }

    /// Read-only view of the attribute cache.
    #[must_use]
    pub const fn cache(&self) -> &AttributeCache {
        &self.cache
    }

    /// Principal view, if this is a security principal.
    pub fn as_principal(&mut self) -> Option<Principal<'_>> {
        if self.is_principal() {
            Some(Principal::new(self))
        } else {
            None
        }
    }

    /// Group view, if this is a group.
    pub fn as_group(&mut self) -> Option<Group<'_>> {
        if self.is_group() {
            Some(Group::new(self))
        } else {
            None
        }
    }

    /// User view, if this is a user account.
    pub fn as_user(&mut self) -> Option<User<'_>> {
        if self.is_user() {
            Some(User::new(self))
        } else {
            None
        }
    }

    /// All values of an attribute, loading them on first use.
    ///
    /// Absent attributes yield `None` and are not remembered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry no longer exists, or any retrieval error.
    pub async fn values(&mut self, attribute: &str) -> Result<Option<&[AttributeValue]>> {
        if attribute.is_empty() || attribute.contains(';') {
            return Err(Error::InvalidInput(format!(
                "`{attribute}` is not a plain attribute name"
            )));
        }
        if !self.cache.contains(attribute) {
            self.load(attribute).await?;
        }
        Ok(self.cache.get(attribute))
    }

    async fn load(&mut self, attribute: &str) -> Result<()> {
        let mut values = self.session.fetch_attribute(&self.guid, attribute).await?;
        if values.is_empty() {
            values = RangeRetrievalPager::new(&self.session, self.guid)
                .retrieve(attribute)
                .await?;
        }
        if values.is_empty() {
            debug!(guid = %self.guid, attribute, "attribute absent");
        } else {
            self.cache.insert(attribute, values);
        }
        Ok(())
    }

    /// First value as text.
    ///
    /// # Errors
    ///
    /// See [`Self::values`].
    pub async fn get_string(&mut self, attribute: &str) -> Result<Option<String>> {
        Ok(self.values(attribute).await?.and_then(codec::decode_string))
    }

    /// All values as text, empty if absent.
    ///
    /// # Errors
    ///
    /// See [`Self::values`].
    pub async fn get_strings(&mut self, attribute: &str) -> Result<Vec<String>> {
        Ok(self
            .values(attribute)
            .await?
            .map(codec::decode_strings)
            .unwrap_or_default())
    }

    /// First value as raw octets.
    ///
    /// # Errors
    ///
    /// See [`Self::values`].
    pub async fn get_bytes(&mut self, attribute: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values(attribute).await?.and_then(codec::decode_bytes))
    }

    /// All values as raw octets, empty if absent.
    ///
    /// # Errors
    ///
    /// See [`Self::values`].
    pub async fn get_all_bytes(&mut self, attribute: &str) -> Result<Vec<Vec<u8>>> {
        Ok(self
            .values(attribute)
            .await?
            .map(codec::decode_all_bytes)
            .unwrap_or_default())
    }

    /// First value as a decimal integer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value is not an integer, or see [`Self::values`].
    pub async fn get_integer(&mut self, attribute: &str) -> Result<Option<i64>> {
        match self.values(attribute).await?.and_then(<[_]>::first) {
            Some(value) => codec::decode_integer(value)
                .map(Some)
                .ok_or_else(|| codec::malformed(attribute, value)),
            None => Ok(None),
        }
    }

    /// First value as a tick-encoded timestamp. "Never" markers decode to `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value is not an integer, or see [`Self::values`].
    pub async fn get_time(&mut self, attribute: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .get_integer(attribute)
            .await?
            .and_then(codec::filetime_to_datetime))
    }

    /// First value as generalized time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the value does not parse, or see [`Self::values`].
    pub async fn get_generalized_time(&mut self, attribute: &str) -> Result<Option<DateTime<Utc>>> {
        match self.values(attribute).await?.and_then(<[_]>::first) {
            Some(value) => value
                .as_text()
                .and_then(codec::decode_generalized_time)
                .map(Some)
                .ok_or_else(|| codec::malformed(attribute, value)),
            None => Ok(None),
        }
    }

    /// Forgets one cached attribute.
    pub fn invalidate(&mut self, attribute: &str) {
        self.cache.invalidate(attribute);
    }

    /// Re-reads path and classes and drops the whole cache.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry no longer exists.
    pub async fn refresh(&mut self) -> Result<()> {
        let entry = self
            .session
            .find_by_guid(&self.guid, &[OBJECT_CLASS])
            .await?
            .ok_or_else(|| Error::NotFound(format!("no entry with GUID {}", self.guid)))?;
        self.dn = DistinguishedName::parse(&entry.dn)?;
        self.kinds = ObjectKinds::from_classes(entry.object_classes());
        self.cache.clear();
        Ok(())
    }

    /// Replaces all values of an attribute.
    ///
    /// # Errors
    ///
    /// Returns the directory's error; the cached value is kept on failure.
    pub async fn set_attribute(&mut self, attribute: &str, values: Vec<String>) -> Result<()> {
        self.session
            .replace_attribute(&self.guid, attribute, values)
            .await?;
        self.cache.invalidate(attribute);
        Ok(())
    }

    /// Removes an attribute entirely.
    ///
    /// # Errors
    ///
    /// Returns the directory's error.
    pub async fn clear_attribute(&mut self, attribute: &str) -> Result<()> {
        self.session
            .delete_attribute(&self.guid, attribute, Vec::new())
            .await?;
        self.cache.invalidate(attribute);
        Ok(())
    }

    /// Adds values to a multi-valued attribute.
    ///
    /// # Errors
    ///
    /// Returns the directory's error.
    pub async fn add_values(&mut self, attribute: &str, values: Vec<String>) -> Result<()> {
        self.session
            .add_attribute_values(&self.guid, attribute, values)
            .await?;
        self.cache.invalidate(attribute);
        Ok(())
    }

    /// Removes specific values from a multi-valued attribute.
    ///
    /// # Errors
    ///
    /// Returns the directory's error.
    pub async fn remove_values(&mut self, attribute: &str, values: Vec<String>) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.session
            .delete_attribute(&self.guid, attribute, values)
            .await?;
        self.cache.invalidate(attribute);
        Ok(())
    }

    /// Moves and/or renames the entry; see [`DirectorySession::move_rename`].
    ///
    /// On success the path is updated and the cache dropped. On failure nothing changes.
    ///
    /// # Errors
    ///
    /// See [`DirectorySession::move_rename`].
    pub async fn move_rename(
        &mut self,
        new_parent: Option<&ObjectGuid>,
        new_leaf_name: Option<&str>,
    ) -> Result<&DistinguishedName> {
        let moved = self
            .session
            .move_rename(&self.guid, new_parent, new_leaf_name)
            .await?;
        self.dn = moved;
        self.cache.clear();
        Ok(&self.dn)
    }

    /// Moves the entry into the container with identifier `parent`.
    ///
    /// # Errors
    ///
    /// See [`DirectorySession::move_rename`].
    pub async fn move_to(&mut self, parent: &ObjectGuid) -> Result<&DistinguishedName> {
        self.move_rename(Some(parent), None).await
    }

    /// Deletes the entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if it is already gone.
    pub async fn delete(self) -> Result<()> {
        self.session.delete(&self.guid).await
    }
}
