//! Raw directory entries as returned by a search.

use std::collections::HashMap;

use dirkit_core::{Error, ObjectGuid, Result};

use crate::codec;

/// Attribute holding the rename-stable identifier.
pub const OBJECT_GUID: &str = "objectGUID";
/// Attribute holding the schema classes of an entry.
pub const OBJECT_CLASS: &str = "objectClass";

/// A single attribute value. Values that are valid UTF-8 arrive as text, anything else
/// (identifiers, security descriptors) as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeValue {
    /// UTF-8 value.
    Text(String),
    /// Raw octets.
    Binary(Vec<u8>),
}

impl AttributeValue {
    /// Borrows the raw octets of the value.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Returns the value as text if it is valid UTF-8.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(bytes) => std::str::from_utf8(bytes).ok(),
        }
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value)
    }
}

/// Directory entry: a path plus a map from attribute name to its values.
///
/// Attribute names are matched case-insensitively; values keep server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name of the entry.
    pub dn: String,
    /// Attribute map (values preserve order from server).
    pub attributes: HashMap<String, Vec<AttributeValue>>,
}

impl DirectoryEntry {
    /// Creates an entry with no attributes.
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: HashMap::new(),
        }
    }

    /// Adds text values for an attribute.
    #[must_use]
    pub fn with_text<I, S>(mut self, attribute: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes.insert(
            attribute.into(),
            values
                .into_iter()
                .map(|value| AttributeValue::Text(value.into()))
                .collect(),
        );
        self
    }

    /// Adds a single binary value for an attribute.
    #[must_use]
    pub fn with_binary(mut self, attribute: impl Into<String>, value: Vec<u8>) -> Self {
        self.attributes
            .insert(attribute.into(), vec![AttributeValue::Binary(value)]);
        self
    }

    /// Returns the stored name and values for an attribute, matched case-insensitively.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<(&str, &[AttributeValue])> {
        self.attributes
            .get_key_value(attribute)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(attribute))
            })
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[AttributeValue]> {
        self.get(attribute).map(|(_, values)| values)
    }

    /// Schema classes of the entry, in server order.
    #[must_use]
    pub fn object_classes(&self) -> Vec<String> {
        self.values(OBJECT_CLASS)
            .map(codec::decode_strings)
            .unwrap_or_default()
    }

    /// Decodes the entry's `objectGUID`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the attribute is missing or malformed.
    pub fn guid(&self) -> Result<ObjectGuid> {
        let value = self
            .values(OBJECT_GUID)
            .and_then(|values| values.first())
            .ok_or_else(|| {
                Error::InvalidInput(format!("entry `{}` carries no {OBJECT_GUID}", self.dn))
            })?;
        codec::decode_guid(value)
    }
}

impl From<ldap3::SearchEntry> for DirectoryEntry {
    fn from(entry: ldap3::SearchEntry) -> Self {
        let mut attributes: HashMap<String, Vec<AttributeValue>> = entry
            .attrs
            .into_iter()
            .map(|(name, values)| {
                (
                    name,
                    values.into_iter().map(AttributeValue::Text).collect(),
                )
            })
            .collect();
        for (name, values) in entry.bin_attrs {
            attributes
                .entry(name)
                .or_default()
                .extend(values.into_iter().map(AttributeValue::Binary));
        }
        Self {
            dn: entry.dn,
            attributes,
        }
    }
}
