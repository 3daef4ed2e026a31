//! [RFC 7233 §3.2: If-Range](https://www.rfc-editor.org/rfc/rfc7233#section-3.2)
//!
//! A value containing a `"` is an entity tag, anything else is tried as an
//! HTTP-date. Both are compared for exact equality with the current
//! validator; weak and strong tags are not told apart.

use std::time::SystemTime;

use httpdate::HttpDate;

/// Classified `If-Range` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IfRange<'a> {
    EntityTag(&'a str),
    Date(HttpDate),
    Unparseable,
}

impl<'a> IfRange<'a> {
    pub fn classify(value: &'a str) -> Self {
        let value = value.trim();
        if value.contains('"') {
            return IfRange::EntityTag(value);
        }
        match value.parse::<HttpDate>() {
            Ok(date) => IfRange::Date(date),
            Err(_) => IfRange::Unparseable,
        }
    }

    /// `true` when partial content may be served.
    pub fn is_satisfied_by(&self, etag: &str, last_modified: SystemTime) -> bool {
        match self {
            IfRange::EntityTag(tag) => *tag == etag,
            IfRange::Date(date) => *date == HttpDate::from(last_modified),
            IfRange::Unparseable => false,
        }
    }
}

/// Evaluate an `If-Range` header value against the current validator.
///
/// Returning `false` means the `Range` header must be ignored and the full
/// representation served with 200.
pub fn if_range_satisfied(value: &str, etag: &str, last_modified: SystemTime) -> bool {
    let satisfied = IfRange::classify(value).is_satisfied_by(etag, last_modified);
    tracing::trace!(if_range = value, current_etag = etag, satisfied, "evaluated If-Range");
    satisfied
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    const ETAG: &str = "\"8d2f0c\"";

    fn last_modified() -> SystemTime {
        // Sun, 06 Nov 1994 08:49:37 GMT
        UNIX_EPOCH + Duration::from_secs(784111777)
    }

    #[test]
    fn matching_etag_is_satisfied() {
        assert!(if_range_satisfied(ETAG, ETAG, last_modified()));
        assert!(if_range_satisfied("  \"8d2f0c\" ", ETAG, last_modified()));
    }

    #[test]
    fn etag_comparison_is_literal() {
        assert!(!if_range_satisfied("\"other\"", ETAG, last_modified()));
        assert!(!if_range_satisfied("W/\"8d2f0c\"", ETAG, last_modified()));
        assert!(if_range_satisfied("W/\"8d2f0c\"", "W/\"8d2f0c\"", last_modified()));
    }

    #[test]
    fn matching_date_is_satisfied() {
        assert!(if_range_satisfied(
            "Sun, 06 Nov 1994 08:49:37 GMT",
            ETAG,
            last_modified()
        ));
    }

    #[test]
    fn date_must_be_equal_not_earlier() {
        assert!(!if_range_satisfied(
            "Sun, 06 Nov 1994 08:49:38 GMT",
            ETAG,
            last_modified()
        ));
        assert!(!if_range_satisfied(
            "Sun, 06 Nov 1994 08:49:36 GMT",
            ETAG,
            last_modified()
        ));
    }

    #[test]
    fn unparseable_values_fail_safe() {
        assert!(!if_range_satisfied("yesterday", ETAG, last_modified()));
        assert!(!if_range_satisfied("", ETAG, last_modified()));
        assert_eq!(IfRange::classify("8d2f0c"), IfRange::Unparseable);
    }

    #[test]
    fn classify_prefers_entity_tags() {
        assert_eq!(IfRange::classify(ETAG), IfRange::EntityTag(ETAG));
        assert_eq!(
            IfRange::classify("Sun, 06 Nov 1994 08:49:37 GMT"),
            IfRange::Date(HttpDate::from(last_modified()))
        );
    }
}
