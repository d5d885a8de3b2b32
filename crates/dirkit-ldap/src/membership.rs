//! Group membership: direct and nested members, membership tests and edits.
//!
//! Nested groups are walked with an explicit worklist and a visited set keyed by object
//! identifier, so cyclic nesting terminates and each group is expanded at most once.

use crate::{
    dn::DistinguishedName,
    entry::OBJECT_CLASS,
    group::{Group, MEMBER},
    object::DirectoryObject,
    principal::Principal,
    session::DirectorySession,
    Result,
};
use dirkit_core::{Error, ObjectGuid};
use std::collections::{HashSet, VecDeque};
use tracing::{debug, warn};

/// Resolves and edits group membership through a session.
#[derive(Clone)]
pub struct GroupMembershipResolver {
    session: DirectorySession,
}

impl GroupMembershipResolver {
    /// Creates a resolver over `session`.
    #[must_use]
    pub fn new(session: DirectorySession) -> Self {
        Self { session }
    }

    /// Every direct member, whatever its kind. Dangling member paths are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `group` is not a group, or any retrieval error.
    pub async fn direct_members(
        &self,
        group: &mut DirectoryObject,
    ) -> Result<Vec<DirectoryObject>> {
        let paths = require_group(group)?.member_paths().await?;
        self.resolve_all(&paths).await
    }

    /// Direct members that are user accounts.
    ///
    /// # Errors
    ///
    /// See [`Self::direct_members`].
    pub async fn direct_user_members(
        &self,
        group: &mut DirectoryObject,
    ) -> Result<Vec<DirectoryObject>> {
        let mut members = self.direct_members(group).await?;
        members.retain(DirectoryObject::is_user);
        Ok(members)
    }

    /// Direct members that are groups.
    ///
    /// # Errors
    ///
    /// See [`Self::direct_members`].
    pub async fn direct_group_members(
        &self,
        group: &mut DirectoryObject,
    ) -> Result<Vec<DirectoryObject>> {
        let mut members = self.direct_members(group).await?;
        members.retain(DirectoryObject::is_group);
        Ok(members)
    }

    /// Every user reachable through nested groups, each reported once.
    ///
    /// # Errors
    ///
    /// See [`Self::direct_members`].
    pub async fn transitive_user_members(
        &self,
        group: &mut DirectoryObject,
    ) -> Result<Vec<DirectoryObject>> {
        let mut expanded = HashSet::from([group.guid()]);
        let mut seen_users = HashSet::new();
        let mut users = Vec::new();
        let mut pending: VecDeque<DirectoryObject> = self.direct_members(group).await?.into();

        while let Some(mut member) = pending.pop_front() {
            if member.is_group() {
                if expanded.insert(member.guid()) {
                    pending.extend(self.direct_members(&mut member).await?);
                } else {
                    debug!(group = %member.dn(), "group already expanded");
                }
            } else if member.is_user() && seen_users.insert(member.guid()) {
                users.push(member);
            }
        }

        debug!(
            group = %group.dn(),
            users = users.len(),
            groups = expanded.len(),
            "expanded nested membership"
        );
        Ok(users)
    }

    /// Returns true if `principal` is a member of `group`.
    ///
    /// A direct check costs one attribute lookup. A recursive check walks nested groups
    /// and stops at the first match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `group` is not a group, or any retrieval error.
    pub async fn is_member(
        &self,
        group: &mut DirectoryObject,
        principal: &DirectoryObject,
        recursive: bool,
    ) -> Result<bool> {
        if !recursive {
            return require_group(group)?.has_member(principal.dn()).await;
        }

        let target = principal.guid();
        let mut expanded = HashSet::from([group.guid()]);
        let mut pending: VecDeque<DirectoryObject> = self.direct_members(group).await?.into();
        while let Some(mut member) = pending.pop_front() {
            if member.guid() == target {
                return Ok(true);
            }
            if member.is_group() && expanded.insert(member.guid()) {
                pending.extend(self.direct_members(&mut member).await?);
            }
        }
        Ok(false)
    }

    /// Adds principals to `group`, ignoring ones already present.
    ///
    /// The member list is rewritten as a whole: existing members plus the new ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `group` is not a group or a candidate is not a
    /// principal, or the directory's error.
    pub async fn add_members(
        &self,
        group: &mut DirectoryObject,
        principals: &[&DirectoryObject],
    ) -> Result<()> {
        require_principals(principals)?;
        let mut members = require_group(group)?.member_paths().await?;
        let before = members.len();
        for principal in principals {
            if !members.iter().any(|path| path.same_entry(principal.dn())) {
                members.push(principal.dn().clone());
            }
        }
        if members.len() == before {
            return Ok(());
        }

        group
            .set_attribute(MEMBER, members.into_iter().map(String::from).collect())
            .await?;
        debug!(group = %group.dn(), added = principals.len(), "updated group members");
        Ok(())
    }

    /// Removes principals from `group`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `group` is not a group, or the directory's error
    /// (including when a principal is not a member).
    pub async fn remove_members(
        &self,
        group: &mut DirectoryObject,
        principals: &[&DirectoryObject],
    ) -> Result<()> {
        require_group(group)?;
        let paths = principals
            .iter()
            .map(|principal| principal.dn().to_string())
            .collect();
        group.remove_values(MEMBER, paths).await
    }

    /// Groups `principal` is a direct member of.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `principal` is not a principal, or any
    /// retrieval error.
    pub async fn direct_groups(
        &self,
        principal: &mut DirectoryObject,
    ) -> Result<Vec<DirectoryObject>> {
        let paths = require_principal(principal)?.member_of().await?;
        self.resolve_all(&paths).await
    }

    /// Every group `principal` belongs to, directly or through nesting, each once.
    ///
    /// # Errors
    ///
    /// See [`Self::direct_groups`].
    pub async fn transitive_groups(
        &self,
        principal: &mut DirectoryObject,
    ) -> Result<Vec<DirectoryObject>> {
        let mut seen: HashSet<ObjectGuid> = HashSet::from([principal.guid()]);
        let mut groups = Vec::new();
        let mut pending: VecDeque<DirectoryObject> = self.direct_groups(principal).await?.into();

        while let Some(mut group) = pending.pop_front() {
            if !seen.insert(group.guid()) {
                continue;
            }
            pending.extend(self.direct_groups(&mut group).await?);
            groups.push(group);
        }
        Ok(groups)
    }

    async fn resolve_all(&self, paths: &[DistinguishedName]) -> Result<Vec<DirectoryObject>> {
        let mut objects = Vec::with_capacity(paths.len());
        for path in paths {
            match self.session.find_by_path(path, &[OBJECT_CLASS]).await? {
                Some(entry) => objects.push(self.session.wrap(entry)?),
                None => warn!(path = %path, "skipping dangling member reference"),
            }
        }
        Ok(objects)
    }
}

fn require_group(object: &mut DirectoryObject) -> Result<Group<'_>> {
    let path = object.dn().to_string();
    object
        .as_group()
        .ok_or_else(|| Error::InvalidInput(format!("`{path}` is not a group")))
}

fn require_principal(object: &mut DirectoryObject) -> Result<Principal<'_>> {
    let path = object.dn().to_string();
    object
        .as_principal()
        .ok_or_else(|| Error::InvalidInput(format!("`{path}` is not a security principal")))
}

fn require_principals(principals: &[&DirectoryObject]) -> Result<()> {
    match principals.iter().find(|object| !object.is_principal()) {
        Some(object) => Err(Error::InvalidInput(format!(
            "`{}` is not a security principal",
            object.dn()
        ))),
        None => Ok(()),
    }
}
