//! Range retrieval of attributes too large for a single response.
//!
//! The directory caps the number of values it returns for one attribute. Past the cap
//! the attribute comes back under a qualified name such as `member;range=0-1499` and the
//! client has to walk forward one window at a time until a window ending in `*` arrives.

use crate::{
    entry::{AttributeValue, DirectoryEntry},
    filter::{self, ServedRange},
    session::DirectorySession,
    Result,
};
use dirkit_core::{Error, ObjectGuid};
use tracing::{debug, warn};

/// One window of a range retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeWindow {
    attribute: String,
    start: usize,
    size: usize,
}

impl RangeWindow {
    /// The window at index 0.
    #[must_use]
    pub fn first(attribute: impl Into<String>, size: usize) -> Self {
        Self {
            attribute: attribute.into(),
            start: 0,
            size: size.max(1),
        }
    }

    /// Base attribute name.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Index of the first value in this window.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// `name;range=start-*`, the open form sent to the directory.
    #[must_use]
    pub fn request_name(&self) -> String {
        filter::range_attribute(&self.attribute, self.start, None)
    }

    /// `name;range=start-end` for a full window of the configured size.
    #[must_use]
    pub fn expected_name(&self) -> String {
        let end = self.start.saturating_add(self.size - 1);
        filter::range_attribute(&self.attribute, self.start, Some(end))
    }

    /// Window following a served window that ended at `end`, `None` if `end` is the
    /// last representable index.
    #[must_use]
    pub fn next_after(&self, end: usize) -> Option<Self> {
        end.checked_add(1).map(|start| Self {
            attribute: self.attribute.clone(),
            start,
            size: self.size,
        })
    }
}

/// Walks the range windows of one attribute on one entry.
pub struct RangeRetrievalPager<'a> {
    session: &'a DirectorySession,
    guid: ObjectGuid,
    window_size: usize,
    max_windows: usize,
}

impl<'a> RangeRetrievalPager<'a> {
    /// Creates a pager using the session's protocol limits.
    #[must_use]
    pub fn new(session: &'a DirectorySession, guid: ObjectGuid) -> Self {
        let limits = session.limits();
        Self {
            session,
            guid,
            window_size: limits.range_window as usize,
            max_windows: limits.max_range_windows as usize,
        }
    }

    /// Overrides the expected window size.
    #[must_use]
    pub fn with_window_size(mut self, size: usize) -> Self {
        self.window_size = size.max(1);
        self
    }

    /// Overrides the number of windows requested before giving up.
    #[must_use]
    pub fn with_max_windows(mut self, windows: usize) -> Self {
        self.max_windows = windows.max(1);
        self
    }

    /// Retrieves every value of `attribute`, in server order.
    ///
    /// An attribute with no values yields an empty vector after one request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the entry disappears between windows,
    /// [`Error::PaginationExceeded`] if the directory never marks a final window, or
    /// any connection fault from a window request (values gathered so far are dropped).
    pub async fn retrieve(&self, attribute: &str) -> Result<Vec<AttributeValue>> {
        let mut window = RangeWindow::first(attribute, self.window_size);
        let mut values = Vec::new();

        for requested in 1..=self.max_windows {
            let request_name = window.request_name();
            let entry = self
                .session
                .find_by_guid(&self.guid, &[request_name.as_str()])
                .await?
                .ok_or_else(|| Error::NotFound(format!("no entry with GUID {}", self.guid)))?;

            let served = served_window(&entry, &window);
            let end = match served {
                Some((range, window_values)) if !window_values.is_empty() => {
                    values.extend_from_slice(window_values);
                    range.and_then(|range| range.end)
                }
                _ => None,
            };
            let Some(end) = end else {
                debug!(
                    attribute,
                    windows = requested,
                    total = values.len(),
                    "range retrieval complete"
                );
                return Ok(values);
            };
            if end < window.start() {
                return Err(Error::connection(
                    "search",
                    format!(
                        "directory served `{attribute}` ending at {end} before {}",
                        window.start()
                    ),
                ));
            }
            window = window.next_after(end).ok_or_else(|| {
                Error::connection(
                    "search",
                    format!("directory served `{attribute}` ending at {end}, past the last index"),
                )
            })?;
        }

        warn!(
            attribute,
            windows = self.max_windows,
            "range retrieval did not terminate"
        );
        Err(Error::PaginationExceeded {
            attribute: attribute.to_string(),
            windows: self.max_windows,
        })
    }
}

/// Locates the window's values in a response.
///
/// Prefers the exact `start-end` key, then any qualified key for the same start, then any
/// qualified key at all. A server that ignores the range option returns the plain
/// attribute, which is treated as a final window (`None` range).
fn served_window<'e>(
    entry: &'e DirectoryEntry,
    window: &RangeWindow,
) -> Option<(Option<ServedRange>, &'e [AttributeValue])> {
    if let Some((name, values)) = entry.get(&window.expected_name()) {
        return Some((ServedRange::parse(name, window.attribute()), values));
    }

    let qualified = entry.attributes.iter().filter_map(|(name, values)| {
        ServedRange::parse(name, window.attribute()).map(|range| (range, values.as_slice()))
    });
    let mut fallback = None;
    for (range, values) in qualified {
        if range.start == window.start() {
            return Some((Some(range), values));
        }
        fallback.get_or_insert((Some(range), values));
    }
    fallback.or_else(|| entry.values(window.attribute()).map(|values| (None, values)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::{MockDirectoryConnection, MockDirectoryConnector};
    use crate::entry::OBJECT_GUID;
    use crate::testing::{numbered_values, sample_config, well_known_guid, InMemoryDirectory};
    use dirkit_core::config::ProtocolLimits;
    use std::sync::Arc;

    fn member_entry(key: &str, count: usize) -> DirectoryEntry {
        DirectoryEntry::new("CN=Big,OU=Groups,DC=example,DC=com")
            .with_text(key, numbered_values(count))
    }

    #[test]
    fn window_names() {
        let window = RangeWindow::first("member", 1500);
        assert_eq!(window.request_name(), "member;range=0-*");
        assert_eq!(window.expected_name(), "member;range=0-1499");
        let next = window.next_after(1499).unwrap();
        assert_eq!(next.request_name(), "member;range=1500-*");
        assert_eq!(next.expected_name(), "member;range=1500-2999");
        assert!(window.next_after(usize::MAX).is_none());
    }

    #[test]
    fn served_window_fallbacks() {
        let window = RangeWindow::first("member", 1500);
        let exact = member_entry("member;range=0-1499", 3);
        assert_eq!(served_window(&exact, &window).unwrap().1.len(), 3);

        let last = member_entry("member;range=0-*", 2);
        let (range, values) = served_window(&last, &window).unwrap();
        assert!(range.unwrap().is_final());
        assert_eq!(values.len(), 2);

        let smaller = member_entry("member;range=0-999", 1000);
        assert_eq!(served_window(&smaller, &window).unwrap().0.unwrap().end, Some(999));

        let plain = member_entry("member", 4);
        let (range, values) = served_window(&plain, &window).unwrap();
        assert!(range.is_none());
        assert_eq!(values.len(), 4);

        let none = DirectoryEntry::new("CN=Big,OU=Groups,DC=example,DC=com");
        assert!(served_window(&none, &window).is_none());
    }

    #[tokio::test]
    async fn single_final_window_needs_one_request() {
        let guid = ObjectGuid::new_v4();
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(1).returning(move || {
            let mut connection = MockDirectoryConnection::new();
            connection
                .expect_search()
                .withf(|request| {
                    request.attributes.first().map(String::as_str) == Some("member;range=0-*")
                })
                .returning(move |_| {
                    Ok(vec![member_entry("member;range=0-*", 3)
                        .with_binary(OBJECT_GUID, guid.to_directory_bytes().to_vec())])
                });
            connection.expect_unbind().returning(|| Ok(()));
            Ok(Box::new(connection))
        });
        let session = DirectorySession::with_connector(sample_config(), Arc::new(connector));

        let values = RangeRetrievalPager::new(&session, guid)
            .retrieve("member")
            .await
            .unwrap();
        assert_eq!(values.len(), 3);
    }

    #[tokio::test]
    async fn range_ending_at_last_index_is_a_fault() {
        let guid = ObjectGuid::new_v4();
        let mut connector = MockDirectoryConnector::new();
        connector.expect_connect().times(1).returning(move || {
            let mut connection = MockDirectoryConnection::new();
            connection.expect_search().returning(move |_| {
                let key = format!("member;range=0-{}", usize::MAX);
                Ok(vec![member_entry(&key, 2)
                    .with_binary(OBJECT_GUID, guid.to_directory_bytes().to_vec())])
            });
            connection.expect_unbind().returning(|| Ok(()));
            Ok(Box::new(connection))
        });
        let session = DirectorySession::with_connector(sample_config(), Arc::new(connector));

        let err = RangeRetrievalPager::new(&session, guid)
            .retrieve("member")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ConnectionFault { ref operation, .. } if operation == "search"
        ));
    }

    #[tokio::test]
    async fn walks_windows_in_order() {
        let directory = InMemoryDirectory::new(1500);
        let guid = directory.insert_with_values(
            well_known_guid(),
            "CN=Big,OU=Groups,DC=example,DC=com",
            &["top", "group"],
            "member",
            numbered_values(3400),
        );
        let session =
            DirectorySession::with_connector(sample_config(), Arc::new(directory.clone()));

        let values = RangeRetrievalPager::new(&session, guid)
            .retrieve("member")
            .await
            .unwrap();
        let expected: Vec<AttributeValue> = numbered_values(3400)
            .into_iter()
            .map(AttributeValue::from)
            .collect();
        assert_eq!(values, expected);
        assert_eq!(
            directory.range_requests(),
            vec!["member;range=0-*", "member;range=1500-*", "member;range=3000-*"]
        );
    }

    #[tokio::test]
    async fn exact_multiple_of_window_size() {
        let directory = InMemoryDirectory::new(1500);
        let guid = directory.insert_with_values(
            ObjectGuid::new_v4(),
            "CN=Big,OU=Groups,DC=example,DC=com",
            &["group"],
            "member",
            numbered_values(3000),
        );
        let session =
            DirectorySession::with_connector(sample_config(), Arc::new(directory.clone()));

        let values = RangeRetrievalPager::new(&session, guid)
            .retrieve("member")
            .await
            .unwrap();
        assert_eq!(values.len(), 3000);
        assert_eq!(directory.range_requests().len(), 2);
    }

    #[tokio::test]
    async fn absent_attribute_is_empty() {
        let directory = InMemoryDirectory::new(1500);
        let guid = directory.insert("CN=Empty,OU=Groups,DC=example,DC=com", &["group"], &[]);
        let session =
            DirectorySession::with_connector(sample_config(), Arc::new(directory.clone()));

        let values = RangeRetrievalPager::new(&session, guid)
            .retrieve("member")
            .await
            .unwrap();
        assert!(values.is_empty());
        assert_eq!(directory.range_requests().len(), 1);
    }

    #[tokio::test]
    async fn bounded_window_count() {
        let directory = InMemoryDirectory::new(10);
        let guid = directory.insert_with_values(
            ObjectGuid::new_v4(),
            "CN=Big,OU=Groups,DC=example,DC=com",
            &["group"],
            "member",
            numbered_values(100),
        );
        let config = sample_config().with_limits(ProtocolLimits::new().with_max_range_windows(3));
        let session = DirectorySession::with_connector(config, Arc::new(directory.clone()));

        let err = RangeRetrievalPager::new(&session, guid)
            .retrieve("member")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::PaginationExceeded {
                attribute: "member".to_string(),
                windows: 3
            }
        );
        assert_eq!(directory.range_requests().len(), 3);
    }

    #[tokio::test]
    async fn vanished_entry_is_not_found() {
        let directory = InMemoryDirectory::new(1500);
        let session = DirectorySession::with_connector(sample_config(), Arc::new(directory));

        let err = RangeRetrievalPager::new(&session, ObjectGuid::new_v4())
            .retrieve("member")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
