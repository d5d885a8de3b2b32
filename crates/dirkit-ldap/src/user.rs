//! User account view and account control flags.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{codec, object::DirectoryObject, principal::Principal, Result};

/// Integer attribute holding the account control flags.
pub const USER_ACCOUNT_CONTROL: &str = "userAccountControl";
/// Tick timestamp of the last lockout, `0` when unlocked.
pub const LOCKOUT_TIME: &str = "lockoutTime";
/// Tick timestamp of the last password change, `0` forces a change at next logon.
pub const PWD_LAST_SET: &str = "pwdLastSet";
/// Tick timestamp the account expires at; `0` or `i64::MAX` mean never.
pub const ACCOUNT_EXPIRES: &str = "accountExpires";

/// `userAccountControl` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountControl(u32);

impl AccountControl {
    /// Logon script is executed.
    pub const SCRIPT: u32 = 0x0001;
    /// Account is disabled.
    pub const ACCOUNT_DISABLE: u32 = 0x0002;
    /// Home directory is required.
    pub const HOMEDIR_REQUIRED: u32 = 0x0008;
    /// Account is locked out.
    pub const LOCKOUT: u32 = 0x0010;
    /// No password is required.
    pub const PASSWD_NOTREQD: u32 = 0x0020;
    /// Password is stored with reversible encryption.
    pub const ENCRYPTED_TEXT_PWD_ALLOWED: u32 = 0x0080;
    /// Default account type for a regular user.
    pub const NORMAL_ACCOUNT: u32 = 0x0200;
    /// Computer account of a member server or workstation.
    pub const WORKSTATION_TRUST_ACCOUNT: u32 = 0x1000;
    /// Computer account of a domain controller.
    pub const SERVER_TRUST_ACCOUNT: u32 = 0x2000;
    /// Password never expires.
    pub const DONT_EXPIRE_PASSWORD: u32 = 0x0001_0000;
    /// Smart card is required for logon.
    pub const SMARTCARD_REQUIRED: u32 = 0x0004_0000;
    /// Trusted for unconstrained delegation.
    pub const TRUSTED_FOR_DELEGATION: u32 = 0x0008_0000;
    /// Account cannot be delegated.
    pub const NOT_DELEGATED: u32 = 0x0010_0000;
    /// Kerberos pre-authentication is not required.
    pub const DONT_REQ_PREAUTH: u32 = 0x0040_0000;
    /// Password has expired.
    pub const PASSWORD_EXPIRED: u32 = 0x0080_0000;

    /// Wraps raw flags.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw flags.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns true if every bit of `flag` is set.
    #[must_use]
    pub const fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Sets or clears `flag`.
    #[must_use]
    pub const fn with(mut self, flag: u32, enabled: bool) -> Self {
        if enabled {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
        self
    }

    /// Returns true if the account is disabled.
    #[must_use]
    pub const fn is_disabled(&self) -> bool {
        self.contains(Self::ACCOUNT_DISABLE)
    }

    /// Returns true if the lockout flag is set.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.contains(Self::LOCKOUT)
    }

    /// Returns true if the password never expires.
    #[must_use]
    pub const fn password_never_expires(&self) -> bool {
        self.contains(Self::DONT_EXPIRE_PASSWORD)
    }

    /// Returns true if logon requires a smart card.
    #[must_use]
    pub const fn smartcard_required(&self) -> bool {
        self.contains(Self::SMARTCARD_REQUIRED)
    }
}

/// User view of a [`DirectoryObject`].
pub struct User<'a> {
    object: &'a mut DirectoryObject,
}

impl<'a> User<'a> {
    pub(crate) fn new(object: &'a mut DirectoryObject) -> Self {
        Self { object }
    }

    /// Underlying object.
    pub fn object(&mut self) -> &mut DirectoryObject {
        self.object
    }

    /// Principal view of the same user.
    pub fn principal(&mut self) -> Principal<'_> {
        Principal::new(self.object)
    }

    /// Account control flags; empty when the attribute is absent.
    ///
    /// # Errors
    ///
    /// Returns [`dirkit_core::Error::InvalidInput`] if the value is not an integer.
    pub async fn account_control(&mut self) -> Result<AccountControl> {
        let raw = self.object.get_integer(USER_ACCOUNT_CONTROL).await?;
        Ok(AccountControl::from_bits(
            raw.and_then(|value| u32::try_from(value & 0xFFFF_FFFF).ok())
                .unwrap_or_default(),
        ))
    }

    /// Returns true if the account is disabled.
    ///
    /// # Errors
    ///
    /// See [`Self::account_control`].
    pub async fn is_disabled(&mut self) -> Result<bool> {
        Ok(self.account_control().await?.is_disabled())
    }

    /// Returns true if the account is locked out.
    ///
    /// The directory reports lockouts through `lockoutTime`; the control flag is only
    /// honoured by older servers.
    ///
    /// # Errors
    ///
    /// See [`Self::account_control`].
    pub async fn is_locked(&mut self) -> Result<bool> {
        if self.lockout_time().await?.is_some() {
            return Ok(true);
        }
        Ok(self.account_control().await?.is_locked())
    }

    /// Enables or disables the account.
    ///
    /// # Errors
    ///
    /// Returns the directory's error.
    pub async fn set_disabled(&mut self, disabled: bool) -> Result<()> {
        let control = self
            .account_control()
            .await?
            .with(AccountControl::ACCOUNT_DISABLE, disabled);
        self.object
            .set_attribute(USER_ACCOUNT_CONTROL, vec![control.bits().to_string()])
            .await
    }

    /// Clears a lockout.
    ///
    /// # Errors
    ///
    /// Returns the directory's error.
    pub async fn unlock(&mut self) -> Result<()> {
        self.object
            .set_attribute(LOCKOUT_TIME, vec!["0".to_string()])
            .await
    }

    /// Returns true if the user must change the password at next logon.
    ///
    /// # Errors
    ///
    /// See [`DirectoryObject::get_integer`].
    pub async fn must_change_password(&mut self) -> Result<bool> {
        Ok(self.object.get_integer(PWD_LAST_SET).await? == Some(0))
    }

    /// When the password was last set.
    ///
    /// # Errors
    ///
    /// See [`DirectoryObject::get_time`].
    pub async fn password_last_set(&mut self) -> Result<Option<DateTime<Utc>>> {
        self.object.get_time(PWD_LAST_SET).await
    }

    /// When the account expires, `None` for never.
    ///
    /// # Errors
    ///
    /// See [`DirectoryObject::get_time`].
    pub async fn account_expires(&mut self) -> Result<Option<DateTime<Utc>>> {
        self.object.get_time(ACCOUNT_EXPIRES).await
    }

    /// Sets the account expiry; `None` clears it so the account never expires.
    ///
    /// # Errors
    ///
    /// Returns the directory's error.
    pub async fn set_account_expires(&mut self, expires: Option<DateTime<Utc>>) -> Result<()> {
        let ticks = expires.map_or(0, codec::datetime_to_filetime);
        self.object
            .set_attribute(ACCOUNT_EXPIRES, vec![ticks.to_string()])
            .await
    }

    /// Replicated last logon time (`lastLogonTimestamp`).
    ///
    /// # Errors
    ///
    /// See [`DirectoryObject::get_time`].
    pub async fn last_logon(&mut self) -> Result<Option<DateTime<Utc>>> {
        self.object.get_time("lastLogonTimestamp").await
    }

    /// When the account was locked out, `None` when unlocked.
    ///
    /// # Errors
    ///
    /// See [`DirectoryObject::get_time`].
    pub async fn lockout_time(&mut self) -> Result<Option<DateTime<Utc>>> {
        self.object.get_time(LOCKOUT_TIME).await
    }

    /// Creation time (`whenCreated`).
    ///
    /// # Errors
    ///
    /// See [`DirectoryObject::get_generalized_time`].
    pub async fn created_at(&mut self) -> Result<Option<DateTime<Utc>>> {
        self.object.get_generalized_time("whenCreated").await
    }

    /// Last modification time (`whenChanged`).
    ///
    /// # Errors
    ///
    /// See [`DirectoryObject::get_generalized_time`].
    pub async fn updated_at(&mut self) -> Result<Option<DateTime<Utc>>> {
        self.object.get_generalized_time("whenChanged").await
    }
}
