//! Group view and group type flags.

use serde::{Deserialize, Serialize};

use crate::{
    dn::DistinguishedName,
    object::DirectoryObject,
    principal::{parse_paths, Principal},
    Result,
};

/// Multi-valued attribute holding member paths.
pub const MEMBER: &str = "member";
/// Integer attribute encoding scope and security flag.
pub const GROUP_TYPE: &str = "groupType";

const GLOBAL_SCOPE: u32 = 0x2;
const DOMAIN_LOCAL_SCOPE: u32 = 0x4;
const UNIVERSAL_SCOPE: u32 = 0x8;
const SECURITY_ENABLED: u32 = 0x8000_0000;

/// Where a group can be used and who can be a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupScope {
    /// Members from the own domain, usable forest-wide.
    Global,
    /// Members from anywhere, usable in the own domain.
    DomainLocal,
    /// Members from anywhere, usable forest-wide.
    Universal,
}

/// Decoded `groupType` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupType {
    scope: GroupScope,
    security: bool,
}

impl GroupType {
    /// Creates a group type.
    #[must_use]
    pub const fn new(scope: GroupScope, security: bool) -> Self {
        Self { scope, security }
    }

    /// The directory's default for new groups.
    #[must_use]
    pub const fn global_security() -> Self {
        Self::new(GroupScope::Global, true)
    }

    /// Group scope.
    #[must_use]
    pub const fn scope(&self) -> GroupScope {
        self.scope
    }

    /// Returns true for security groups, false for distribution lists.
    #[must_use]
    pub const fn is_security(&self) -> bool {
        self.security
    }

    /// Decodes a raw `groupType`. The value is a signed 32-bit integer on the wire.
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        // Only the low 32 bits are meaningful, whatever sign extension the server applied.
        let bits = raw as u32;
        let scope = if bits & GLOBAL_SCOPE != 0 {
            GroupScope::Global
        } else if bits & DOMAIN_LOCAL_SCOPE != 0 {
            GroupScope::DomainLocal
        } else if bits & UNIVERSAL_SCOPE != 0 {
            GroupScope::Universal
        } else {
            return None;
        };
        Some(Self::new(scope, bits & SECURITY_ENABLED != 0))
    }

    /// Encodes as the signed value the directory stores.
    #[must_use]
    pub const fn to_raw(&self) -> i32 {
        let scope = match self.scope {
            GroupScope::Global => GLOBAL_SCOPE,
            GroupScope::DomainLocal => DOMAIN_LOCAL_SCOPE,
            GroupScope::Universal => UNIVERSAL_SCOPE,
        };
        let bits = if self.security {
            scope | SECURITY_ENABLED
        } else {
            scope
        };
        i32::from_ne_bytes(bits.to_ne_bytes())
    }
}

/// Group view of a [`DirectoryObject`].
pub struct Group<'a> {
    object: &'a mut DirectoryObject,
}

impl<'a> Group<'a> {
    pub(crate) fn new(object: &'a mut DirectoryObject) -> Self {
        Self { object }
    }

    /// Underlying object.
    pub fn object(&mut self) -> &mut DirectoryObject {
        self.object
    }

    /// Principal view of the same group.
    pub fn principal(&mut self) -> Principal<'_> {
        Principal::new(self.object)
    }

    /// Paths of the direct members, range retrieval included.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn member_paths(&mut self) -> Result<Vec<DistinguishedName>> {
        Ok(parse_paths(MEMBER, self.object.get_strings(MEMBER).await?))
    }

    /// Number of direct members.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn member_count(&mut self) -> Result<usize> {
        Ok(self
            .object
            .values(MEMBER)
            .await?
            .map_or(0, <[_]>::len))
    }

    /// Checks whether the given path is a direct member of this group.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn has_member(&mut self, member: &DistinguishedName) -> Result<bool> {
        Ok(self
            .member_paths()
            .await?
            .iter()
            .any(|path| path.same_entry(member)))
    }

    /// Decoded `groupType`, if present and recognised.
    ///
    /// # Errors
    ///
    /// Returns [`dirkit_core::Error::InvalidInput`] if the value is not an integer.
    pub async fn group_type(&mut self) -> Result<Option<GroupType>> {
        Ok(self
            .object
            .get_integer(GROUP_TYPE)
            .await?
            .and_then(GroupType::from_raw))
    }

    /// Optional description.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn description(&mut self) -> Result<Option<String>> {
        self.object.get_string("description").await
    }
}
