//! Security principal view: naming, mail addresses, group links and rename.

use crate::{
    connection::DirectoryModification,
    dn::DistinguishedName,
    object::DirectoryObject,
    session::{is_valid_label, MAIL, PRIMARY_SMTP_PREFIX, PROXY_ADDRESSES, SECONDARY_SMTP_PREFIX},
    Result,
};
use dirkit_core::Error;
use tracing::{info, warn};

/// Pre-Windows 2000 logon name.
pub const SAM_ACCOUNT_NAME: &str = "sAMAccountName";
/// `name@domain` logon name.
pub const USER_PRINCIPAL_NAME: &str = "userPrincipalName";
/// Back-link listing the groups a principal belongs to.
pub const MEMBER_OF: &str = "memberOf";

/// A proxy address split into its kind and address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyAddress<'a> {
    /// `SMTP:` prefixed, the reply address.
    Primary(&'a str),
    /// `smtp:` prefixed.
    Secondary(&'a str),
}

impl<'a> ProxyAddress<'a> {
    /// Parses an SMTP proxy address. Other address types (`X500:`, `SIP:`) yield `None`.
    #[must_use]
    pub fn parse(value: &'a str) -> Option<Self> {
        if let Some(address) = value.strip_prefix(PRIMARY_SMTP_PREFIX) {
            Some(Self::Primary(address))
        } else {
            value.strip_prefix(SECONDARY_SMTP_PREFIX).map(Self::Secondary)
        }
    }
}

/// Principal view of a [`DirectoryObject`] (users, computers and groups).
pub struct Principal<'a> {
    object: &'a mut DirectoryObject,
}

impl<'a> Principal<'a> {
    pub(crate) fn new(object: &'a mut DirectoryObject) -> Self {
        Self { object }
    }

    /// Underlying object.
    pub fn object(&mut self) -> &mut DirectoryObject {
        self.object
    }

    /// Short logon name.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn sam_account_name(&mut self) -> Result<Option<String>> {
        self.object.get_string(SAM_ACCOUNT_NAME).await
    }

    /// `name@domain` logon name.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn user_principal_name(&mut self) -> Result<Option<String>> {
        self.object.get_string(USER_PRINCIPAL_NAME).await
    }

    /// Display name.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn display_name(&mut self) -> Result<Option<String>> {
        self.object.get_string("displayName").await
    }

    /// Reply address: the `SMTP:` proxy address, else the `mail` attribute.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn primary_email(&mut self) -> Result<Option<String>> {
        let primary = self
            .object
            .get_strings(PROXY_ADDRESSES)
            .await?
            .iter()
            .find_map(|value| match ProxyAddress::parse(value) {
                Some(ProxyAddress::Primary(address)) => Some(address.to_string()),
                _ => None,
            });
        match primary {
            Some(address) => Ok(Some(address)),
            None => self.object.get_string(MAIL).await,
        }
    }

    /// Every `smtp:` proxy address.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn secondary_emails(&mut self) -> Result<Vec<String>> {
        Ok(self
            .object
            .get_strings(PROXY_ADDRESSES)
            .await?
            .iter()
            .filter_map(|value| match ProxyAddress::parse(value) {
                Some(ProxyAddress::Secondary(address)) => Some(address.to_string()),
                _ => None,
            })
            .collect())
    }

    /// Paths of the groups this principal is a direct member of.
    ///
    /// # Errors
    ///
    /// Returns any attribute retrieval error.
    pub async fn member_of(&mut self) -> Result<Vec<DistinguishedName>> {
        Ok(parse_paths(MEMBER_OF, self.object.get_strings(MEMBER_OF).await?))
    }

    /// Renames the principal and rewrites its logon names to match.
    ///
    /// Logon names are only rewritten when `sAMAccountName` equals the old leaf value; a
    /// short name chosen independently of the leaf is left alone, and so is the
    /// `userPrincipalName` built from it.
    ///
    /// The path change and the logon name change are separate directory operations. If the
    /// second fails the path change is reverted and the original error returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an invalid name, the directory's error if either
    /// step fails, or [`Error::RenameIncomplete`] if the revert fails too.
    pub async fn rename(&mut self, new_name: &str) -> Result<DistinguishedName> {
        if !is_valid_label(new_name) {
            return Err(Error::InvalidInput(format!("invalid principal name `{new_name}`")));
        }
        let old_leaf = self
            .object
            .dn()
            .leaf()
            .map(|rdn| rdn.value().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("`{}` has no leaf", self.object.dn())))?;
        let old_sam = self.sam_account_name().await?;
        let old_upn = self.user_principal_name().await?;

        let moved = self.object.move_rename(None, Some(new_name)).await?.clone();

        let mut modifications = Vec::new();
        if let Some(sam) = old_sam.filter(|sam| sam.eq_ignore_ascii_case(&old_leaf)) {
            modifications.push(DirectoryModification::Replace {
                attribute: SAM_ACCOUNT_NAME.to_string(),
                values: vec![new_name.to_string()],
            });
            let upn = old_upn
                .as_deref()
                .and_then(|upn| rewrite_logon(upn, &sam, new_name));
            if let Some(upn) = upn {
                modifications.push(DirectoryModification::Replace {
                    attribute: USER_PRINCIPAL_NAME.to_string(),
                    values: vec![upn],
                });
            }
        }

        let guid = self.object.guid();
        let Err(err) = self.object.session().modify(&guid, &modifications).await else {
            self.object.invalidate(SAM_ACCOUNT_NAME);
            self.object.invalidate(USER_PRINCIPAL_NAME);
            info!(%guid, path = %moved, "renamed principal");
            return Ok(moved);
        };

        warn!(%guid, error = %err, "logon name update failed, reverting rename");
        match self.object.move_rename(None, Some(&old_leaf)).await {
            Ok(_) => Err(err),
            Err(revert) => Err(Error::RenameIncomplete {
                path: moved.to_string(),
                message: format!("{err}; revert failed: {revert}"),
            }),
        }
    }
}

/// Replaces the local part of `upn` when it equals `old_sam`.
fn rewrite_logon(upn: &str, old_sam: &str, new_name: &str) -> Option<String> {
    let (local, domain) = upn.split_once('@')?;
    local
        .eq_ignore_ascii_case(old_sam)
        .then(|| format!("{new_name}@{domain}"))
}

/// Parses path-valued attribute values, skipping any the directory sent malformed.
pub(crate) fn parse_paths(attribute: &str, values: Vec<String>) -> Vec<DistinguishedName> {
    values
        .into_iter()
        .filter_map(|value| match DistinguishedName::parse(&value) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(attribute, value = %value, error = %err, "skipping malformed path");
                None
            }
        })
        .collect()
}
