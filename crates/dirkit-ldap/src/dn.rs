//! Distinguished name (entry path) handling.
//!
//! Paths are the mutable half of an entry's identity: they change on move and rename
//! while the GUID does not. Comparisons are case-insensitive, as on the server.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use dirkit_core::Error as CoreError;

/// Errors that can occur when parsing a distinguished name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// The distinguished name was empty.
    #[error("distinguished name cannot be empty")]
    Empty,
    /// A component in the distinguished name was invalid.
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    /// A component was missing the attribute name to the left of the `=`.
    #[error("distinguished name component missing attribute: {0}")]
    MissingAttribute(String),
    /// The distinguished name ended with an escape character.
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::InvalidInput(err.to_string())
    }
}

/// Relative distinguished name: one `attribute=value` pair such as `CN=Sales`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// Create a new relative distinguished name from an unescaped value.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Attribute portion of the RDN (e.g. `CN`).
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value portion of the RDN.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns a copy with the same attribute and a new value.
    #[must_use]
    pub fn with_value(&self, value: impl Into<String>) -> Self {
        Self::new(self.attribute.clone(), value)
    }
}

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape_value(&self.value))
    }
}

/// Parsed entry path.
///
/// Keeps the canonical string next to the RDN sequence (leaf first). Multi-valued RDNs
/// (`cn=a+uid=b`) are kept as one element holding several pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses a distinguished name from a string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the input is empty or malformed.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let rdns = split_unescaped(raw, ',')?
            .into_iter()
            .map(|component| {
                split_unescaped(&component, '+')?
                    .iter()
                    .map(|pair| parse_pair(pair))
                    .collect::<std::result::Result<Vec<_>, _>>()
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self::from_rdns(rdns))
    }

    fn from_rdns(rdns: Vec<Vec<RelativeDistinguishedName>>) -> Self {
        let raw = rdns
            .iter()
            .map(|set| {
                set.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("+")
            })
            .collect::<Vec<_>>()
            .join(",");
        Self { raw, rdns }
    }

    /// Borrows the canonical distinguished name string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the RDN sets, leaf first.
    #[must_use]
    pub fn rdns(&self) -> &[Vec<RelativeDistinguishedName>] {
        &self.rdns
    }

    /// Looks up the value for the first attribute that matches `attribute` (case-insensitive).
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.rdns
            .iter()
            .flatten()
            .find(|rdn| rdn.attribute.eq_ignore_ascii_case(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// The leaf RDN, e.g. `CN=Sales` for `CN=Sales,OU=Groups,DC=example,DC=com`.
    #[must_use]
    pub fn leaf(&self) -> Option<&RelativeDistinguishedName> {
        self.rdns.first().and_then(|set| set.first())
    }

    /// The container path, or `None` for a single-component name.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.rdns.len() < 2 {
            return None;
        }
        Some(Self::from_rdns(self.rdns[1..].to_vec()))
    }

    /// Builds the path of a child entry below this one.
    #[must_use]
    pub fn child(&self, rdn: RelativeDistinguishedName) -> Self {
        let mut rdns = Vec::with_capacity(self.rdns.len() + 1);
        rdns.push(vec![rdn]);
        rdns.extend(self.rdns.iter().cloned());
        Self::from_rdns(rdns)
    }

    /// Case-insensitive path comparison.
    #[must_use]
    pub fn same_entry(&self, other: &Self) -> bool {
        self.raw.eq_ignore_ascii_case(&other.raw)
    }

    /// Returns true if this path lies at or below `base`.
    #[must_use]
    pub fn is_within(&self, base: &Self) -> bool {
        let lower = self.raw.to_ascii_lowercase();
        let base = base.raw.to_ascii_lowercase();
        lower == base || lower.ends_with(&format!(",{base}"))
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

/// Splits on `delimiter` while honouring backslash escapes; escapes are kept verbatim.
fn split_unescaped(
    input: &str,
    delimiter: char,
) -> std::result::Result<Vec<String>, DistinguishedNameError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                let escaped = chars
                    .next()
                    .ok_or(DistinguishedNameError::UnterminatedEscape)?;
                current.push('\\');
                current.push(escaped);
            }
            c if c == delimiter => parts.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    parts.push(current);

    let parts: Vec<String> = parts.into_iter().map(|p| p.trim().to_string()).collect();
    if parts.iter().any(String::is_empty) {
        return Err(DistinguishedNameError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn parse_pair(
    pair: &str,
) -> std::result::Result<RelativeDistinguishedName, DistinguishedNameError> {
    let (attribute, value) = pair
        .split_once('=')
        .ok_or_else(|| DistinguishedNameError::InvalidComponent(pair.to_string()))?;
    let attribute = attribute.trim();
    if attribute.is_empty() {
        return Err(DistinguishedNameError::MissingAttribute(pair.to_string()));
    }
    if attribute.contains('\\') {
        return Err(DistinguishedNameError::InvalidComponent(pair.to_string()));
    }
    Ok(RelativeDistinguishedName::new(
        attribute,
        unescape_value(value.trim_start())?,
    ))
}

fn unescape_value(value: &str) -> std::result::Result<String, DistinguishedNameError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    let mut buf = [0u8; 4];

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let next = chars
            .next()
            .ok_or(DistinguishedNameError::UnterminatedEscape)?;
        // `\C3\A9` style escapes carry one UTF-8 octet each.
        match (next.to_digit(16), chars.peek().and_then(|c| c.to_digit(16))) {
            (Some(high), Some(low)) => {
                chars.next();
                bytes.push(u8::try_from(high * 16 + low).unwrap_or(b'?'));
            }
            _ => bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes()),
        }
    }

    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Escapes an RDN value for inclusion in a path.
#[must_use]
pub fn escape_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (ch == ' ' || ch == '#'))
            || (idx == last && ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}
