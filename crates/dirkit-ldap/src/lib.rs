//! Directory object resolution over LDAP.
//!
//! This crate resolves directory entries by rename-stable identifier, path or mail address,
//! exposes them as objects with lazily loaded attributes, transparently pages attributes the
//! server only returns in range windows, and resolves nested group membership.
//!
//! ## Modules
//!
//! - [`session`] - Lookups, searches, mutations and move/rename
//! - [`object`] - Directory objects and their attribute cache
//! - [`pager`] - Range retrieval of oversized attributes
//! - [`membership`] - Direct and nested group membership
//! - [`codec`] / [`filter`] - Value conversions and filter text
//! - [`connection`] - The connector seam and its `ldap3` implementation

#![deny(missing_docs)]

pub mod codec;
mod config;
pub mod connection;
mod dn;
mod entry;
pub mod filter;
mod group;
pub mod membership;
pub mod object;
pub mod pager;
mod principal;
pub mod session;
#[cfg(test)]
mod testing;
mod user;

pub use config::{
    DirectoryConfig, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_MAX_CONNECTIONS,
    DEFAULT_OPERATION_TIMEOUT_SECS,
};
pub use connection::{
    DirectoryConnection, DirectoryConnector, DirectoryModification, LdapConnector,
    SearchRequest, SearchScope,
};
pub use dn::{
    escape_value as escape_dn_value, DistinguishedName, DistinguishedNameError,
    RelativeDistinguishedName,
};
pub use entry::{AttributeValue, DirectoryEntry, OBJECT_CLASS, OBJECT_GUID};
pub use group::{Group, GroupScope, GroupType, GROUP_TYPE, MEMBER};
pub use membership::GroupMembershipResolver;
pub use object::{AttributeCache, DirectoryObject, ObjectKind, ObjectKinds};
pub use pager::{RangeRetrievalPager, RangeWindow};
pub use principal::{
    Principal, ProxyAddress, MEMBER_OF, SAM_ACCOUNT_NAME, USER_PRINCIPAL_NAME,
};
pub use session::{is_valid_label, DirectorySession};
pub use user::{
    AccountControl, User, ACCOUNT_EXPIRES, LOCKOUT_TIME, PWD_LAST_SET, USER_ACCOUNT_CONTROL,
};

pub use dirkit_core::{Error, ObjectGuid};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirkit_core::Result<T>;
