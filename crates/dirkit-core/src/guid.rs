//! Strongly-typed directory object identifier.
//!
//! Directory servers store `objectGUID` as 16 raw octets whose first three fields are
//! little-endian (the Microsoft GUID layout). [`ObjectGuid`] keeps the canonical
//! [`Uuid`] and converts to and from that on-the-wire byte order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Number of octets in a directory object identifier.
pub const GUID_LEN: usize = 16;

/// Globally unique, rename-stable identifier of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectGuid(Uuid);

impl ObjectGuid {
    /// Creates an identifier from a [`Uuid`].
    #[must_use]
    pub const fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Creates a new random identifier (v4).
    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the inner [`Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns true for the all-zero identifier, which never names an entry.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }

    /// Parses an identifier from its hyphenated string form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the string is not a valid GUID.
    pub fn parse_str(input: &str) -> Result<Self> {
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("invalid GUID `{input}`")))
    }

    /// Decodes the raw `objectGUID` octets returned by the directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] unless exactly 16 bytes are supplied.
    pub fn from_directory_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; GUID_LEN] = bytes.try_into().map_err(|_| {
            Error::InvalidInput(format!(
                "objectGUID must be {GUID_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(Uuid::from_bytes_le(raw)))
    }

    /// Encodes the identifier in the directory's octet order.
    #[must_use]
    pub fn to_directory_bytes(&self) -> [u8; GUID_LEN] {
        self.0.to_bytes_le()
    }
}

impl From<Uuid> for ObjectGuid {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<ObjectGuid> for Uuid {
    fn from(guid: ObjectGuid) -> Self {
        guid.0
    }
}

impl FromStr for ObjectGuid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse_str(s)
    }
}

impl fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
