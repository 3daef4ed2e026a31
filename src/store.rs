use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum_extra::headers::ContentEncoding;
use bytes::Bytes;
use flate2::write::GzEncoder;
use flate2::Compression;
use mime_guess::{mime, Mime};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::{ByteRange, RangeBody};

/// Process-wide version toggle.
///
/// While flipped, the raw representation reports a weak ETag and a fresh
/// `Last-Modified`, so stored `If-Range` validators stop matching. The bytes
/// never change.
#[derive(Debug, Default)]
pub struct VersionState {
    flipped: AtomicBool,
}

impl VersionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_flipped(&self) -> bool {
        self.flipped.load(Ordering::Acquire)
    }

    /// Toggles the flag and returns the new value.
    pub fn flip(&self) -> bool {
        !self.flipped.fetch_xor(true, Ordering::AcqRel)
    }
}

/// The validator pair a client can echo back in `If-Range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validator {
    pub etag: String,
    pub last_modified: SystemTime,
}

impl Validator {
    /// `Last-Modified` in IMF-fixdate form.
    pub fn last_modified_http(&self) -> String {
        httpdate::fmt_http_date(self.last_modified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Identity,
    Gzip,
}

impl Encoding {
    pub fn content_encoding(&self) -> Option<ContentEncoding> {
        match self {
            Encoding::Identity => None,
            Encoding::Gzip => Some(ContentEncoding::gzip()),
        }
    }
}

/// One encoded form of the resource with its own validator. Range
/// arithmetic always applies to these bytes, compressed or not.
#[derive(Debug)]
pub struct Representation {
    bytes: Bytes,
    etag: String,
    last_modified: SystemTime,
    encoding: Encoding,
    content_type: Mime,
    version: Option<Arc<VersionState>>,
}

impl Representation {
    pub fn new(bytes: impl Into<Bytes>, encoding: Encoding, last_modified: SystemTime) -> Self {
        let bytes = bytes.into();
        let etag = strong_etag(&bytes);
        Representation {
            bytes,
            etag,
            last_modified: whole_seconds(last_modified),
            encoding,
            content_type: mime::APPLICATION_OCTET_STREAM,
            version: None,
        }
    }

    /// Ties the reported validator to a [`VersionState`].
    pub fn tracked(mut self, version: Arc<VersionState>) -> Self {
        self.version = Some(version);
        self
    }

    /// The validator computed at startup, ignoring the version toggle.
    pub fn strong_validator(&self) -> Validator {
        Validator {
            etag: self.etag.clone(),
            last_modified: self.last_modified,
        }
    }

    /// The validator as currently reported to clients.
    pub fn current_validator(&self) -> Validator {
        match &self.version {
            Some(version) if version.is_flipped() => Validator {
                etag: weaken(&self.etag),
                last_modified: whole_seconds(SystemTime::now()),
            },
            _ => self.strong_validator(),
        }
    }
}

impl RangeBody for Representation {
    fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn slice(&self, range: ByteRange) -> Bytes {
        self.bytes.slice(range.start as usize..=range.end as usize)
    }

    fn full(&self) -> Bytes {
        self.bytes.clone()
    }

    fn validator(&self) -> Validator {
        self.current_validator()
    }

    fn content_type(&self) -> &Mime {
        &self.content_type
    }

    fn content_encoding(&self) -> Option<ContentEncoding> {
        self.encoding.content_encoding()
    }
}

/// The raw and gzip representations of one logical resource, built once at
/// startup and read-only afterwards.
#[derive(Debug)]
pub struct ResourceStore {
    raw: Representation,
    gzip: Representation,
    version: Arc<VersionState>,
}

impl ResourceStore {
    /// Builds the store with `Last-Modified` set one hour in the past.
    pub fn new(content: impl Into<Bytes>) -> Result<Self> {
        let last_modified = SystemTime::now()
            .checked_sub(Duration::from_secs(60 * 60))
            .unwrap_or(UNIX_EPOCH);
        Self::with_last_modified(content, last_modified)
    }

    pub fn with_last_modified(content: impl Into<Bytes>, last_modified: SystemTime) -> Result<Self> {
        let content = content.into();
        let compressed = gzip(&content)?;
        let version = Arc::new(VersionState::new());

        let raw = Representation::new(content, Encoding::Identity, last_modified)
            .tracked(version.clone());
        let gzip = Representation::new(compressed, Encoding::Gzip, last_modified);

        Ok(ResourceStore { raw, gzip, version })
    }

    /// `size` bytes following the pattern `i % 256`.
    pub fn synthetic(size: usize) -> Result<Self> {
        let content: Vec<u8> = (0..size).map(|i| (i % 256) as u8).collect();
        Self::new(content)
    }

    pub fn raw(&self) -> &Representation {
        &self.raw
    }

    pub fn gzip(&self) -> &Representation {
        &self.gzip
    }

    /// Toggles the version flag, returning the new value.
    pub fn flip_version(&self) -> bool {
        self.version.flip()
    }
}

fn strong_etag(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("\"{}\"", hex::encode(digest))
}

fn weaken(etag: &str) -> String {
    format!("W/\"{}\"", etag.trim_matches('"'))
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

// HTTP-dates carry whole seconds only.
fn whole_seconds(time: SystemTime) -> SystemTime {
    match time.duration_since(UNIX_EPOCH) {
        Ok(since_epoch) => UNIX_EPOCH + Duration::from_secs(since_epoch.as_secs()),
        Err(_) => UNIX_EPOCH,
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    fn store() -> ResourceStore {
        ResourceStore::synthetic(4096).unwrap()
    }

    #[test]
    fn synthetic_content_follows_byte_pattern() {
        let store = store();
        assert_eq!(4096, store.raw().byte_size());
        assert_eq!(
            &[254, 255, 0, 1][..],
            &store.raw().slice(ByteRange::new(254, 257))[..]
        );
    }

    #[test]
    fn gzip_representation_decodes_to_raw() {
        let store = store();
        let mut decoded = Vec::new();
        GzDecoder::new(&store.gzip().full()[..])
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(store.raw().full(), Bytes::from(decoded));
        assert_ne!(store.raw().byte_size(), store.gzip().byte_size());
    }

    #[test]
    fn gzip_slices_address_compressed_bytes() {
        let store = store();
        let head = store.gzip().slice(ByteRange::new(0, 9));
        // gzip magic
        assert_eq!(&[0x1f, 0x8b], &head[..2]);
        assert_eq!(10, head.len());
    }

    #[test]
    fn etags_are_strong_and_independent() {
        let store = store();
        let raw = store.raw().current_validator();
        let gzip = store.gzip().current_validator();

        assert!(raw.etag.starts_with('"') && raw.etag.ends_with('"'));
        assert_eq!(66, raw.etag.len());
        assert_ne!(raw.etag, gzip.etag);
        assert_eq!(raw.last_modified, gzip.last_modified);
    }

    #[test]
    fn last_modified_is_whole_seconds_in_the_past() {
        let store = store();
        let validator = store.raw().current_validator();
        let since_epoch = validator.last_modified.duration_since(UNIX_EPOCH).unwrap();
        assert_eq!(0, since_epoch.subsec_nanos());
        assert!(validator.last_modified < SystemTime::now());

        let parsed = httpdate::parse_http_date(&validator.last_modified_http()).unwrap();
        assert_eq!(validator.last_modified, parsed);
    }

    #[test]
    fn flip_only_changes_the_raw_validator() {
        let store = store();
        let raw_before = store.raw().current_validator();
        let gzip_before = store.gzip().current_validator();
        let bytes_before = store.raw().full();

        assert!(store.flip_version());
        let raw_after = store.raw().current_validator();
        assert_eq!(weaken(&raw_before.etag), raw_after.etag);
        assert!(raw_after.etag.starts_with("W/\""));
        assert!(raw_after.last_modified > raw_before.last_modified);
        assert_eq!(gzip_before, store.gzip().current_validator());
        assert_eq!(bytes_before, store.raw().full());
        assert_eq!(raw_before, store.raw().strong_validator());

        assert!(!store.flip_version());
        assert_eq!(raw_before, store.raw().current_validator());
    }

    #[test]
    fn version_state_flip_toggles() {
        let version = VersionState::new();
        assert!(!version.is_flipped());
        assert!(version.flip());
        assert!(version.is_flipped());
        assert!(!version.flip());
        assert!(!version.is_flipped());
    }

    // Last-Modified only has second resolution: a date echoed back within
    // the same second as a flipped response still matches.
    #[test]
    fn flipped_date_matches_only_within_the_same_second() {
        let store = store();
        store.flip_version();
        let echoed = store.raw().current_validator();
        let current = store.raw().current_validator();

        let satisfied = crate::if_range_satisfied(
            &echoed.last_modified_http(),
            &current.etag,
            current.last_modified,
        );
        assert_eq!(echoed.last_modified == current.last_modified, satisfied);

        let startup = store.raw().strong_validator();
        assert!(!crate::if_range_satisfied(
            &startup.last_modified_http(),
            &current.etag,
            current.last_modified,
        ));
    }

    #[test]
    fn empty_content_is_allowed() {
        let store = ResourceStore::new(Bytes::new()).unwrap();
        assert_eq!(0, store.raw().byte_size());
        assert!(store.gzip().byte_size() > 0);
    }
}
