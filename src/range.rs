//! Parsing of the `Range` request header.
//!
//! The accepted grammar is `<unit>=<spec>[,<spec>]*` where each spec is one
//! of `A-B`, `A-` or `-N`. Parsing is all or nothing: one bad spec rejects
//! the whole header, and the caller answers 416.

/// A single inclusive byte interval, `start <= end < total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    /// Number of bytes covered, both bounds included.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// A parsed `Range` header: the unit token (lowercased) and the resolved
/// intervals in request order. Ranges may overlap and are not sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSet {
    pub unit: String,
    pub ranges: Vec<ByteRange>,
}

impl RangeSet {
    pub fn is_bytes(&self) -> bool {
        self.unit == "bytes"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRangeError {
    #[error("range header has no '=' after the unit")]
    MissingUnit,

    #[error("range header has no range specs")]
    Empty,

    #[error("malformed range spec {0:?}")]
    Malformed(String),

    #[error("range spec {spec:?} starts beyond the representation length {total}")]
    StartOutOfBounds { spec: String, total: u64 },
}

/// Parse a `Range` header value against a representation of `total` bytes.
///
/// Open ends are clamped to `total - 1`. A suffix spec `-N` selects
/// `total - (N + 1) ..= total - 1`, or the whole representation once
/// `N >= total - 1`.
pub fn parse_range(header: &str, total: u64) -> Result<RangeSet, ParseRangeError> {
    let (unit, specs) = header
        .trim()
        .split_once('=')
        .ok_or(ParseRangeError::MissingUnit)?;
    let unit = unit.trim().to_ascii_lowercase();

    let mut ranges = Vec::new();
    for spec in specs.split(',') {
        let spec = spec.trim();
        if spec.is_empty() {
            continue;
        }
        ranges.push(parse_spec(spec, total)?);
    }

    if ranges.is_empty() {
        return Err(ParseRangeError::Empty);
    }

    Ok(RangeSet { unit, ranges })
}

fn parse_spec(spec: &str, total: u64) -> Result<ByteRange, ParseRangeError> {
    let malformed = || ParseRangeError::Malformed(spec.to_string());
    let out_of_bounds = || ParseRangeError::StartOutOfBounds {
        spec: spec.to_string(),
        total,
    };

    let (first, last) = spec.split_once('-').ok_or_else(malformed)?;
    let (first, last) = (first.trim(), last.trim());

    match (first.is_empty(), last.is_empty()) {
        (true, true) => Err(malformed()),

        // -N
        (true, false) => {
            let suffix = parse_position(last).ok_or_else(malformed)?;
            if total == 0 {
                return Err(out_of_bounds());
            }
            let end = total - 1;
            if suffix >= end {
                Ok(ByteRange::new(0, end))
            } else {
                Ok(ByteRange::new(total - (suffix + 1), end))
            }
        }

        // A-
        (false, true) => {
            let start = parse_position(first).ok_or_else(malformed)?;
            if start >= total {
                return Err(out_of_bounds());
            }
            Ok(ByteRange::new(start, total - 1))
        }

        // A-B
        (false, false) => {
            let start = parse_position(first).ok_or_else(malformed)?;
            let end = parse_position(last).ok_or_else(malformed)?;
            if start > end {
                return Err(malformed());
            }
            if start >= total {
                return Err(out_of_bounds());
            }
            Ok(ByteRange::new(start, end.min(total - 1)))
        }
    }
}

/// `1*DIGIT`, no sign and no whitespace inside.
fn parse_position(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(pairs: &[(u64, u64)]) -> Vec<ByteRange> {
        pairs.iter().map(|&(s, e)| ByteRange::new(s, e)).collect()
    }

    #[test]
    fn test_parse_range_header() {
        let tests = [
            ("bytes=0-100", 200, ranges(&[(0, 100)])),
            ("bytes=0-100,200-300", 500, ranges(&[(0, 100), (200, 300)])),
            ("bytes=0-", 500, ranges(&[(0, 499)])),
            ("bytes=100-", 500, ranges(&[(100, 499)])),
            ("bytes=0-0", 500, ranges(&[(0, 0)])),
            ("bytes=0-24646", 500, ranges(&[(0, 499)])),
            ("bytes=499-499", 500, ranges(&[(499, 499)])),
            ("bytes= 1-2 , 3-4 ", 500, ranges(&[(1, 2), (3, 4)])),
            ("bytes=0-0,,2-2", 500, ranges(&[(0, 0), (2, 2)])),
            // request order is preserved, overlaps are kept
            ("bytes=300-400,0-500,350-360", 1000, ranges(&[(300, 400), (0, 500), (350, 360)])),
            // suffix specs select the last N + 1 bytes
            ("bytes=-100", 500, ranges(&[(399, 499)])),
            ("bytes=-0", 500, ranges(&[(499, 499)])),
            ("bytes=-498", 500, ranges(&[(1, 499)])),
            ("bytes=-499", 500, ranges(&[(0, 499)])),
            ("bytes=-5000", 500, ranges(&[(0, 499)])),
            ("bytes=0-0,-1", 500, ranges(&[(0, 0), (498, 499)])),
        ];

        for (i, (header, total, expected)) in tests.iter().enumerate() {
            let parsed = parse_range(header, *total)
                .unwrap_or_else(|e| panic!("range header #{i} {header:?} failed: {e}"));
            assert_eq!(parsed.unit, "bytes");
            assert_eq!(&parsed.ranges, expected, "range header #{i}: {header}");
        }
    }

    #[test]
    fn test_parse_range_header_errors() {
        let tests = [
            ("none", 500, ParseRangeError::MissingUnit),
            ("", 500, ParseRangeError::MissingUnit),
            ("bytes=", 500, ParseRangeError::Empty),
            ("bytes= , ,", 500, ParseRangeError::Empty),
            ("bytes=-", 500, ParseRangeError::Malformed("-".into())),
            ("bytes=5", 500, ParseRangeError::Malformed("5".into())),
            ("bytes=a-5", 500, ParseRangeError::Malformed("a-5".into())),
            ("bytes=5-b", 500, ParseRangeError::Malformed("5-b".into())),
            ("bytes=+5-9", 500, ParseRangeError::Malformed("+5-9".into())),
            ("bytes=30-20", 500, ParseRangeError::Malformed("30-20".into())),
            ("bytes=1-2-3", 500, ParseRangeError::Malformed("1-2-3".into())),
            ("bytes=--5", 500, ParseRangeError::Malformed("--5".into())),
            (
                "bytes=500-510",
                500,
                ParseRangeError::StartOutOfBounds { spec: "500-510".into(), total: 500 },
            ),
            (
                "bytes=500-",
                500,
                ParseRangeError::StartOutOfBounds { spec: "500-".into(), total: 500 },
            ),
            (
                "bytes=-1",
                0,
                ParseRangeError::StartOutOfBounds { spec: "-1".into(), total: 0 },
            ),
        ];

        for (i, (header, total, expected)) in tests.iter().enumerate() {
            assert_eq!(
                parse_range(header, *total).as_ref(),
                Err(expected),
                "range header #{i}: {header:?}"
            );
        }
    }

    #[test]
    fn one_bad_spec_rejects_the_whole_header() {
        let err = parse_range("bytes=0-9,oops,20-29", 100).unwrap_err();
        assert_eq!(err, ParseRangeError::Malformed("oops".into()));

        let err = parse_range("bytes=0-9,200-299", 100).unwrap_err();
        assert_matches::assert_matches!(err, ParseRangeError::StartOutOfBounds { total: 100, .. });
    }

    #[test]
    fn unit_is_lowercased_and_returned() {
        let parsed = parse_range("Bytes=0-1", 10).unwrap();
        assert!(parsed.is_bytes());

        let parsed = parse_range("bleets=100-324", 500).unwrap();
        assert_eq!(parsed.unit, "bleets");
        assert!(!parsed.is_bytes());
    }

    #[test]
    fn closed_ranges_inside_the_representation_are_exact() {
        let total = 37;
        for start in 0..total {
            for end in start..total + 5 {
                let parsed = parse_range(&format!("bytes={start}-{end}"), total).unwrap();
                assert_eq!(parsed.ranges, vec![ByteRange::new(start, end.min(total - 1))]);
            }
        }
    }

    #[test]
    fn byte_range_len_is_inclusive() {
        assert_eq!(ByteRange::new(0, 0).len(), 1);
        assert_eq!(ByteRange::new(10, 19).len(), 10);
    }
}
