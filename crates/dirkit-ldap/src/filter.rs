//! Search filter construction.
//!
//! Produces the exact textual forms the directory expects:
//!
//! - equality `(name=value)`
//! - compound `(&(c1)(c2)...)` / `(|(c1)(c2)...)`
//! - identifier `(objectGUID=\xx\xx...)`, one lowercase hex escape per octet
//! - range-qualified attribute names `name;range=start-end` / `name;range=start-*`

use std::fmt::Write as _;

use dirkit_core::{Error, ObjectGuid, Result};

use crate::entry::OBJECT_GUID;

/// Filter matching every entry.
pub const MATCH_ALL: &str = "(objectClass=*)";

/// Escapes a value per RFC 4515 so it can be embedded in a filter.
#[must_use]
pub fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '*' => escaped.push_str("\\2a"),
            '(' => escaped.push_str("\\28"),
            ')' => escaped.push_str("\\29"),
            '\\' => escaped.push_str("\\5c"),
            '\0' => escaped.push_str("\\00"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Escapes every octet as `\xx`.
#[must_use]
pub fn escape_bytes(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 3), |mut out, byte| {
        let _ = write!(out, "\\{byte:02x}");
        out
    })
}

/// Decodes an escaped filter value back into octets.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] on a truncated or non-hex escape.
pub fn unescape_value(value: &str) -> Result<Vec<u8>> {
    let bytes = value.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;

    while index < bytes.len() {
        if bytes[index] != b'\\' {
            decoded.push(bytes[index]);
            index += 1;
            continue;
        }
        let hex = value
            .get(index + 1..index + 3)
            .ok_or_else(|| Error::InvalidInput(format!("truncated escape in `{value}`")))?;
        let byte = u8::from_str_radix(hex, 16)
            .map_err(|_| Error::InvalidInput(format!("invalid escape `\\{hex}` in `{value}`")))?;
        decoded.push(byte);
        index += 3;
    }

    Ok(decoded)
}

/// `(name=value)` with the value escaped.
#[must_use]
pub fn equality(attribute: &str, value: &str) -> String {
    format!("({attribute}={})", escape_value(value))
}

/// `(name=*)`.
#[must_use]
pub fn presence(attribute: &str) -> String {
    format!("({attribute}=*)")
}

/// `(&(c1)(c2)...)`.
#[must_use]
pub fn and<I, S>(conditions: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    compound('&', conditions)
}

/// `(|(c1)(c2)...)`.
#[must_use]
pub fn or<I, S>(conditions: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    compound('|', conditions)
}

fn compound<I, S>(operator: char, conditions: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut filter = format!("({operator}");
    for condition in conditions {
        filter.push_str(condition.as_ref());
    }
    filter.push(')');
    filter
}

/// Equality filter on the identifier attribute, octets in directory order.
#[must_use]
pub fn guid(guid: &ObjectGuid) -> String {
    format!("({OBJECT_GUID}={})", escape_bytes(&guid.to_directory_bytes()))
}

/// Recovers the identifier from a filter produced by [`guid`].
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if the filter is not an identifier filter.
pub fn parse_guid(filter: &str) -> Result<ObjectGuid> {
    let value = filter
        .strip_prefix('(')
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|inner| inner.split_once('='))
        .filter(|(attribute, _)| attribute.eq_ignore_ascii_case(OBJECT_GUID))
        .map(|(_, value)| value)
        .ok_or_else(|| Error::InvalidInput(format!("not an identifier filter: `{filter}`")))?;
    ObjectGuid::from_directory_bytes(&unescape_value(value)?)
}

/// `name;range=start-end`, or `name;range=start-*` when `end` is open.
#[must_use]
pub fn range_attribute(attribute: &str, start: usize, end: Option<usize>) -> String {
    match end {
        Some(end) => format!("{attribute};range={start}-{end}"),
        None => format!("{attribute};range={start}-*"),
    }
}

/// Window bounds carried by a range-qualified attribute name in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServedRange {
    /// Index of the first value in the window.
    pub start: usize,
    /// Index of the last value, or `None` for the final (`*`) window.
    pub end: Option<usize>,
}

impl ServedRange {
    /// Parses `key` if it is a range-qualified form of `attribute`.
    #[must_use]
    pub fn parse(key: &str, attribute: &str) -> Option<Self> {
        let (name, options) = key.split_once(';')?;
        if !name.eq_ignore_ascii_case(attribute) {
            return None;
        }
        let bounds = options
            .split(';')
            .find_map(|option| {
                option
                    .get(..6)
                    .filter(|prefix| prefix.eq_ignore_ascii_case("range="))
                    .map(|_| &option[6..])
            })?;
        let (start, end) = bounds.split_once('-')?;
        let start = start.parse().ok()?;
        let end = if end == "*" {
            None
        } else {
            Some(end.parse().ok()?)
        };
        Some(Self { start, end })
    }

    /// Returns true if the server marked this as the last window.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        self.end.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_escapes_special_characters() {
        assert_eq!(equality("cn", "Sales"), "(cn=Sales)");
        assert_eq!(equality("cn", "a*(b)\\"), "(cn=a\\2a\\28b\\29\\5c)");
    }

    #[test]
    fn compound_filters() {
        assert_eq!(
            and(["(objectClass=group)", "(cn=Sales)"]),
            "(&(objectClass=group)(cn=Sales))"
        );
        assert_eq!(or(vec![presence("mail")]), "(|(mail=*))");
    }

    #[test]
    fn guid_filter_is_lowercase_hex_in_directory_order() {
        let id = ObjectGuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
        assert_eq!(
            guid(&id),
            "(objectGUID=\\33\\22\\11\\00\\55\\44\\77\\66\\88\\99\\aa\\bb\\cc\\dd\\ee\\ff)"
        );
    }

    #[test]
    fn guid_filter_round_trips() {
        for _ in 0..32 {
            let id = ObjectGuid::new_v4();
            assert_eq!(parse_guid(&guid(&id)).unwrap(), id);
        }
    }

    #[test]
    fn unescape_rejects_bad_sequences() {
        assert!(unescape_value("\\4").is_err());
        assert!(unescape_value("\\zz").is_err());
        assert_eq!(unescape_value("a\\2ab").unwrap(), b"a*b".to_vec());
    }

    #[test]
    fn range_names() {
        assert_eq!(range_attribute("member", 0, None), "member;range=0-*");
        assert_eq!(
            range_attribute("member", 1500, Some(2999)),
            "member;range=1500-2999"
        );
    }

    #[test]
    fn served_range_parsing() {
        assert_eq!(
            ServedRange::parse("member;range=0-1499", "member"),
            Some(ServedRange {
                start: 0,
                end: Some(1499)
            })
        );
        let last = ServedRange::parse("Member;Range=3000-*", "member").unwrap();
        assert!(last.is_final());
        assert_eq!(last.start, 3000);
        assert!(ServedRange::parse("member", "member").is_none());
        assert!(ServedRange::parse("memberOf;range=0-*", "member").is_none());
    }
}
