//! In-memory directory for unit tests.
//!
//! Behaves like the real server where it matters to this crate: attributes with more values
//! than the window size come back range-qualified, `memberOf` is kept in sync with `member`,
//! renames carry links along, and base searches on missing entries fail with `NotFound`.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use dirkit_core::{credentials::BindCredentials, Error, ObjectGuid};

use crate::{
    config::DirectoryConfig,
    connection::{
        DirectoryConnection, DirectoryConnector, DirectoryModification, SearchRequest,
        SearchScope,
    },
    dn::DistinguishedName,
    entry::{AttributeValue, DirectoryEntry, OBJECT_CLASS, OBJECT_GUID},
    filter, Result,
};

pub(crate) fn sample_config() -> DirectoryConfig {
    DirectoryConfig::new(
        "ldap://dc01.example.com",
        BindCredentials::new("CN=svc,DC=example,DC=com", "secret"),
        DistinguishedName::parse("DC=example,DC=com").unwrap(),
    )
    .unwrap()
}

pub(crate) fn well_known_guid() -> ObjectGuid {
    ObjectGuid::parse_str("00000000-0000-0000-0000-000000000001").unwrap()
}

pub(crate) fn numbered_values(count: usize) -> Vec<String> {
    (0..count)
        .map(|index| format!("CN=Member{index:05},OU=People,DC=example,DC=com"))
        .collect()
}

#[derive(Debug, Clone)]
struct StoredEntry {
    guid: ObjectGuid,
    dn: String,
    attributes: Vec<(String, Vec<String>)>,
}

impl StoredEntry {
    fn stored(&self, name: &str) -> Option<&(String, Vec<String>)> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Stored values plus the naming attributes the server derives from the path.
    fn values(&self, name: &str) -> Option<(String, Vec<String>)> {
        if let Some((key, values)) = self.stored(name) {
            return Some((key.clone(), values.clone()));
        }
        if name.eq_ignore_ascii_case("distinguishedName") {
            return Some(("distinguishedName".to_string(), vec![self.dn.clone()]));
        }
        let path = DistinguishedName::parse(&self.dn).ok()?;
        let leaf = path.leaf()?;
        if name.eq_ignore_ascii_case("name") {
            return Some(("name".to_string(), vec![leaf.value().to_string()]));
        }
        leaf.attribute()
            .eq_ignore_ascii_case(name)
            .then(|| (leaf.attribute().to_ascii_lowercase(), vec![leaf.value().to_string()]))
    }

    fn set(&mut self, name: &str, values: Vec<String>) {
        self.attributes.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
        if !values.is_empty() {
            self.attributes.push((name.to_string(), values));
        }
    }
}

#[derive(Debug, Default)]
struct State {
    entries: Vec<StoredEntry>,
    range_window: usize,
    searches: Vec<SearchRequest>,
    failing_attributes: Vec<String>,
    rename_budget: Option<usize>,
}

impl State {
    fn position(&self, dn: &str) -> Result<usize> {
        self.entries
            .iter()
            .position(|entry| entry.dn.eq_ignore_ascii_case(dn))
            .ok_or_else(|| Error::NotFound(format!("no entry at `{dn}`")))
    }

    fn refresh_back_links(&mut self) {
        let links: Vec<(String, String)> = self
            .entries
            .iter()
            .flat_map(|group| {
                group
                    .stored("member")
                    .map(|(_, members)| members.clone())
                    .unwrap_or_default()
                    .into_iter()
                    .map(move |member| (member.to_ascii_lowercase(), group.dn.clone()))
            })
            .collect();
        for entry in &mut self.entries {
            let own = entry.dn.to_ascii_lowercase();
            let groups = links
                .iter()
                .filter(|(member, _)| *member == own)
                .map(|(_, group)| group.clone())
                .collect();
            entry.set("memberOf", groups);
        }
    }

    fn project(&self, entry: &StoredEntry, requested: &[String]) -> DirectoryEntry {
        let mut names: Vec<String> = requested.to_vec();
        if names.is_empty() {
            names = entry.attributes.iter().map(|(key, _)| key.clone()).collect();
            names.extend(["distinguishedName", "name", OBJECT_GUID].map(String::from));
            let leaf = DistinguishedName::parse(&entry.dn)
                .ok()
                .and_then(|path| path.leaf().cloned());
            if let Some(leaf) = leaf {
                if entry.stored(leaf.attribute()).is_none() {
                    names.push(leaf.attribute().to_string());
                }
            }
        }

        let window = self.range_window;
        let mut out = DirectoryEntry::new(entry.dn.clone());
        for name in names {
            if name.eq_ignore_ascii_case(OBJECT_GUID) {
                out.attributes.insert(
                    OBJECT_GUID.to_string(),
                    vec![AttributeValue::Binary(entry.guid.to_directory_bytes().to_vec())],
                );
                continue;
            }
            let (attribute, start) = match name.split_once(";range=") {
                Some((attribute, bounds)) => {
                    let start = bounds
                        .split('-')
                        .next()
                        .and_then(|start| start.parse().ok())
                        .unwrap_or(0);
                    (attribute.to_string(), Some(start))
                }
                None => (name.clone(), None),
            };
            let Some((key, values)) = entry.values(&attribute) else {
                continue;
            };
            let from = start.unwrap_or(0).min(values.len());
            let rest = &values[from..];
            let (key, served) = if rest.len() > window {
                (
                    filter::range_attribute(&key, from, Some(from + window - 1)),
                    &rest[..window],
                )
            } else if start.is_some() {
                (filter::range_attribute(&key, from, None), rest)
            } else {
                (key, rest)
            };
            out.attributes.insert(
                key,
                served.iter().cloned().map(AttributeValue::Text).collect(),
            );
        }
        out
    }
}

/// Shared in-memory directory; clones see the same entries.
#[derive(Clone, Default)]
pub(crate) struct InMemoryDirectory {
    state: Arc<Mutex<State>>,
}

impl InMemoryDirectory {
    pub(crate) fn new(range_window: usize) -> Self {
        let directory = Self::default();
        directory.lock().range_window = range_window;
        directory
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub(crate) fn insert(
        &self,
        dn: &str,
        classes: &[&str],
        attributes: &[(&str, Vec<&str>)],
    ) -> ObjectGuid {
        let owned = attributes
            .iter()
            .map(|(name, values)| (*name, values.iter().map(ToString::to_string).collect()))
            .collect::<Vec<_>>();
        self.insert_entry(ObjectGuid::new_v4(), dn, classes, owned)
    }

    pub(crate) fn insert_with_values(
        &self,
        guid: ObjectGuid,
        dn: &str,
        classes: &[&str],
        attribute: &str,
        values: Vec<String>,
    ) -> ObjectGuid {
        self.insert_entry(guid, dn, classes, vec![(attribute, values)])
    }

    fn insert_entry(
        &self,
        guid: ObjectGuid,
        dn: &str,
        classes: &[&str],
        attributes: Vec<(&str, Vec<String>)>,
    ) -> ObjectGuid {
        let mut entry = StoredEntry {
            guid,
            dn: dn.to_string(),
            attributes: Vec::new(),
        };
        entry.set(OBJECT_CLASS, classes.iter().map(ToString::to_string).collect());
        for (name, values) in attributes {
            entry.set(name, values);
        }
        let mut state = self.lock();
        state.entries.push(entry);
        state.refresh_back_links();
        guid
    }

    /// Appends `member` to the group at `group`.
    pub(crate) fn link(&self, group: &str, member: &str) {
        let mut state = self.lock();
        let index = state.position(group).unwrap();
        let entry = &mut state.entries[index];
        let mut members = entry.stored("member").map(|(_, v)| v.clone()).unwrap_or_default();
        members.push(member.to_string());
        entry.set("member", members);
        state.refresh_back_links();
    }

    pub(crate) fn searches(&self) -> Vec<SearchRequest> {
        self.lock().searches.clone()
    }

    /// Range-qualified attribute names requested so far, in order.
    pub(crate) fn range_requests(&self) -> Vec<String> {
        self.lock()
            .searches
            .iter()
            .flat_map(|request| request.attributes.iter())
            .filter(|name| name.contains(";range="))
            .cloned()
            .collect()
    }

    /// Every later modification touching `attribute` fails.
    pub(crate) fn fail_modifications_of(&self, attribute: &str) {
        self.lock().failing_attributes.push(attribute.to_string());
    }

    /// Allows `count` more renames, then fails every one after.
    pub(crate) fn fail_renames_after(&self, count: usize) {
        self.lock().rename_budget = Some(count);
    }
}

#[async_trait]
impl DirectoryConnector for InMemoryDirectory {
    async fn connect(&self) -> Result<Box<dyn DirectoryConnection>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl DirectoryConnection for InMemoryDirectory {
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>> {
        let mut state = self.lock();
        state.searches.push(request.clone());

        if request.scope == SearchScope::Base {
            state.position(&request.base)?;
        }
        let node = Node::parse(&request.filter)
            .ok_or_else(|| Error::connection("search", format!("bad filter {}", request.filter)))?;
        let base = request.base.to_ascii_lowercase();
        let limit = usize::try_from(request.size_limit).unwrap_or(usize::MAX);

        Ok(state
            .entries
            .iter()
            .filter(|entry| in_scope(&entry.dn, &base, request.scope))
            .filter(|entry| node.matches(entry))
            .take(limit)
            .map(|entry| state.project(entry, &request.attributes))
            .collect())
    }

    async fn add(&mut self, dn: &str, attributes: &[(String, Vec<String>)]) -> Result<()> {
        if self.lock().position(dn).is_ok() {
            return Err(Error::connection("add", "result code 68: entry already exists"));
        }
        let attributes = attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.clone()))
            .collect();
        self.insert_entry(ObjectGuid::new_v4(), dn, &[], attributes);
        Ok(())
    }

    async fn modify(&mut self, dn: &str, modifications: &[DirectoryModification]) -> Result<()> {
        let mut state = self.lock();
        let touched = modifications.iter().map(|m| match m {
            DirectoryModification::Add { attribute, .. }
            | DirectoryModification::Delete { attribute, .. }
            | DirectoryModification::Replace { attribute, .. } => attribute,
        });
        for attribute in touched {
            if state
                .failing_attributes
                .iter()
                .any(|failing| failing.eq_ignore_ascii_case(attribute))
            {
                return Err(Error::connection("modify", "injected failure"));
            }
        }

        let index = state.position(dn)?;
        let mut entry = state.entries[index].clone();
        for modification in modifications {
            apply(&mut entry, modification)?;
        }
        state.entries[index] = entry;
        state.refresh_back_links();
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<()> {
        let mut state = self.lock();
        let index = state.position(dn)?;
        state.entries.remove(index);
        for entry in &mut state.entries {
            if let Some((_, members)) = entry.stored("member").cloned() {
                let kept = members
                    .into_iter()
                    .filter(|member| !member.eq_ignore_ascii_case(dn))
                    .collect();
                entry.set("member", kept);
            }
        }
        state.refresh_back_links();
        Ok(())
    }

    async fn rename(&mut self, dn: &str, new_rdn: &str, new_parent: &str) -> Result<()> {
        let mut state = self.lock();
        if let Some(budget) = state.rename_budget {
            if budget == 0 {
                return Err(Error::connection("rename", "injected failure"));
            }
            state.rename_budget = Some(budget - 1);
        }
        let index = state.position(dn)?;
        let target = format!("{new_rdn},{new_parent}");
        if let Ok(existing) = state.position(&target) {
            if existing != index {
                return Err(Error::connection("rename", "result code 68: entry already exists"));
            }
        }

        let old_suffix = format!(",{}", dn.to_ascii_lowercase());
        for entry in &mut state.entries {
            if entry.dn.eq_ignore_ascii_case(dn) {
                entry.dn.clone_from(&target);
            } else if entry.dn.to_ascii_lowercase().ends_with(&old_suffix) {
                let keep = entry.dn.len() - old_suffix.len();
                entry.dn = format!("{},{target}", &entry.dn[..keep]);
            }
            if let Some((_, members)) = entry.stored("member").cloned() {
                let renamed = members
                    .into_iter()
                    .map(|member| {
                        if member.eq_ignore_ascii_case(dn) {
                            target.clone()
                        } else {
                            member
                        }
                    })
                    .collect();
                entry.set("member", renamed);
            }
        }
        state.refresh_back_links();
        Ok(())
    }

    async fn unbind(&mut self) -> Result<()> {
        Ok(())
    }
}

fn apply(entry: &mut StoredEntry, modification: &DirectoryModification) -> Result<()> {
    match modification {
        DirectoryModification::Replace { attribute, values } => {
            entry.set(attribute, values.clone());
        }
        DirectoryModification::Add { attribute, values } => {
            let mut current = entry.stored(attribute).map(|(_, v)| v.clone()).unwrap_or_default();
            for value in values {
                if current.iter().any(|existing| existing.eq_ignore_ascii_case(value)) {
                    return Err(Error::connection("modify", "result code 20: value exists"));
                }
                current.push(value.clone());
            }
            entry.set(attribute, current);
        }
        DirectoryModification::Delete { attribute, values } => {
            let Some((_, current)) = entry.stored(attribute).cloned() else {
                return Err(Error::connection("modify", "result code 16: no such attribute"));
            };
            if values.is_empty() {
                entry.set(attribute, Vec::new());
                return Ok(());
            }
            let mut kept = current;
            for value in values {
                let before = kept.len();
                kept.retain(|existing| !existing.eq_ignore_ascii_case(value));
                if kept.len() == before {
                    return Err(Error::connection("modify", "result code 16: no such value"));
                }
            }
            entry.set(attribute, kept);
        }
    }
    Ok(())
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    let dn = dn.to_ascii_lowercase();
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => dn
            .split_once(',')
            .is_some_and(|(_, parent)| parent == base),
        SearchScope::Subtree => dn == base || dn.ends_with(&format!(",{base}")),
    }
}

/// Parsed search filter, limited to the forms this crate produces.
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Present(String),
    Equal(String, Vec<u8>),
}

impl Node {
    fn parse(filter: &str) -> Option<Self> {
        match Self::parse_one(filter)? {
            (node, "") => Some(node),
            _ => None,
        }
    }

    fn parse_one(input: &str) -> Option<(Self, &str)> {
        let body = input.strip_prefix('(')?;
        let (node, rest) = match body.chars().next()? {
            '&' => {
                let (children, rest) = Self::parse_list(&body[1..])?;
                (Self::And(children), rest)
            }
            '|' => {
                let (children, rest) = Self::parse_list(&body[1..])?;
                (Self::Or(children), rest)
            }
            '!' => {
                let (child, rest) = Self::parse_one(&body[1..])?;
                (Self::Not(Box::new(child)), rest)
            }
            _ => {
                let end = body.find(')')?;
                let (attribute, value) = body[..end].split_once('=')?;
                let node = if value == "*" {
                    Self::Present(attribute.to_string())
                } else {
                    Self::Equal(attribute.to_string(), filter::unescape_value(value).ok()?)
                };
                (node, &body[end..])
            }
        };
        Some((node, rest.strip_prefix(')')?))
    }

    fn parse_list(mut input: &str) -> Option<(Vec<Self>, &str)> {
        let mut children = Vec::new();
        while input.starts_with('(') {
            let (child, rest) = Self::parse_one(input)?;
            children.push(child);
            input = rest;
        }
        Some((children, input))
    }

    fn matches(&self, entry: &StoredEntry) -> bool {
        match self {
            Self::And(children) => children.iter().all(|child| child.matches(entry)),
            Self::Or(children) => children.iter().any(|child| child.matches(entry)),
            Self::Not(child) => !child.matches(entry),
            Self::Present(attribute) => {
                attribute.eq_ignore_ascii_case(OBJECT_GUID) || entry.values(attribute).is_some()
            }
            Self::Equal(attribute, value) => {
                if attribute.eq_ignore_ascii_case(OBJECT_GUID) {
                    return value.as_slice() == entry.guid.to_directory_bytes();
                }
                let wanted = String::from_utf8_lossy(value);
                entry.values(attribute).is_some_and(|(_, values)| {
                    values.iter().any(|candidate| candidate.eq_ignore_ascii_case(&wanted))
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oversized_attributes_are_range_qualified() {
        let mut directory = InMemoryDirectory::new(2);
        let guid = directory.insert(
            "CN=G,OU=Groups,DC=example,DC=com",
            &["group"],
            &[("member", vec!["a", "b", "c"])],
        );
        let request = SearchRequest {
            base: "DC=example,DC=com".to_string(),
            scope: SearchScope::Subtree,
            filter: filter::guid(&guid),
            attributes: vec!["member".to_string(), "cn".to_string()],
            size_limit: 1000,
            types_only: false,
        };

        let entries = directory.search(&request).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].values("member").is_none());
        assert_eq!(entries[0].values("member;range=0-1").unwrap().len(), 2);
        assert_eq!(entries[0].values("cn").unwrap(), &[AttributeValue::from("G")]);
    }

    #[test]
    fn filter_parsing() {
        assert!(Node::parse("(&(objectClass=group)(|(cn=a)(!(cn=b))))").is_some());
        assert!(Node::parse("(cn=a").is_none());
        assert!(Node::parse("(cn=a)(cn=b)").is_none());
    }
}
