//! # resume-range
//!
//! Resumable delivery of a single resource over HTTP: byte ranges,
//! `If-Range` re-validation and `multipart/byteranges`, served for both the
//! raw bytes and a gzip-encoded variant.
//!
//! The engine works on any type implementing [`RangeBody`]. The
//! [`ResourceStore`] provides the two representations used by the bundled
//! server, and [`endpoint::deliver`] answers one request for a given
//! [`DeliveryMode`].
//!
//! ```
//! use resume_range::{Ranged, RangedResponse, ResourceStore};
//!
//! let store = ResourceStore::synthetic(1024).unwrap();
//! let response = Ranged::new(store.raw(), Some("bytes=0-9"), None)
//!     .try_respond()
//!     .unwrap();
//! assert!(matches!(response, RangedResponse::Single { .. }));
//! ```

pub mod config;
pub mod endpoint;
pub mod error;
pub mod if_range;
pub mod logging;
pub mod range;
pub mod routes;
mod store;
mod stream;

use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{
    AcceptRanges, ContentEncoding, ContentLength, ContentRange, ContentType, HeaderMapExt,
    LastModified,
};
use axum_extra::TypedHeader;
use bytes::Bytes;
use mime_guess::Mime;

pub use endpoint::{deliver, DeliveryMode};
pub use if_range::if_range_satisfied;
pub use range::{parse_range, ByteRange, ParseRangeError, RangeSet};
pub use store::{Encoding, Representation, ResourceStore, Validator, VersionState};
pub use stream::{extract_boundary, Boundary, BoundaryPolicy, MultipartStream, Part, RangedStream};

/// A representation the engine can serve ranges of.
///
/// The byte size must not change for the lifetime of the object.
pub trait RangeBody {
    /// Total length of the representation in bytes.
    fn byte_size(&self) -> u64;

    /// The bytes of an inclusive range already validated against
    /// [`byte_size`](RangeBody::byte_size).
    fn slice(&self, range: ByteRange) -> Bytes;

    /// The whole representation.
    fn full(&self) -> Bytes;

    /// The validator currently reported for this representation.
    fn validator(&self) -> Validator;

    fn content_type(&self) -> &Mime;

    fn content_encoding(&self) -> Option<ContentEncoding> {
        None
    }
}

/// Why a `Range` header could not be satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unsatisfiable {
    Malformed(ParseRangeError),
    UnsupportedUnit(String),
    /// A resolved range the representation cannot cover.
    Inconsistent(ByteRange),
}

/// What a request resolves to, before any bytes are touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeOutcome {
    Full,
    Single(ByteRange),
    Multiple(Vec<ByteRange>),
    NotSatisfiable(Unsatisfiable),
}

impl RangeOutcome {
    /// Decides between full and partial delivery.
    ///
    /// A failed `If-Range` precondition wins over any `Range` header; the
    /// range is only parsed when the precondition holds or is absent.
    pub fn resolve(
        range: Option<&str>,
        if_range: Option<&str>,
        validator: &Validator,
        total: u64,
    ) -> Self {
        let Some(range) = range else {
            return RangeOutcome::Full;
        };

        if let Some(if_range) = if_range {
            if !if_range_satisfied(if_range, &validator.etag, validator.last_modified) {
                return RangeOutcome::Full;
            }
        }

        match parse_range(range, total) {
            Err(e) => RangeOutcome::NotSatisfiable(Unsatisfiable::Malformed(e)),
            Ok(set) if !set.is_bytes() => {
                RangeOutcome::NotSatisfiable(Unsatisfiable::UnsupportedUnit(set.unit))
            }
            Ok(RangeSet { mut ranges, .. }) => {
                if ranges.len() == 1 {
                    RangeOutcome::Single(ranges.remove(0))
                } else {
                    RangeOutcome::Multiple(ranges)
                }
            }
        }
    }
}

/// `Accept-Ranges` advertisement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptRangesMode {
    Bytes,
    None,
}

/// Headers describing the selected representation, sent on every response.
#[derive(Debug, Clone)]
pub struct RepresentationHeaders {
    pub accept_ranges: AcceptRangesMode,
    pub validator: Validator,
    pub content_type: Mime,
    pub content_encoding: Option<ContentEncoding>,
}

impl RepresentationHeaders {
    /// `Accept-Ranges`, `ETag` and `Last-Modified`.
    pub fn validator_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self.accept_ranges {
            AcceptRangesMode::Bytes => headers.typed_insert(AcceptRanges::bytes()),
            AcceptRangesMode::None => {
                headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
            }
        }
        match HeaderValue::from_str(&self.validator.etag) {
            Ok(etag) => {
                headers.insert(header::ETAG, etag);
            }
            Err(_) => tracing::warn!(etag = %self.validator.etag, "etag is not a valid header value"),
        }
        headers.typed_insert(LastModified::from(self.validator.last_modified));
        headers
    }

    /// Validator headers plus `Content-Type` and `Content-Encoding`.
    pub fn entity_headers(&self) -> HeaderMap {
        let mut headers = self.validator_headers();
        headers.typed_insert(ContentType::from(self.content_type.clone()));
        if let Some(encoding) = &self.content_encoding {
            headers.typed_insert(encoding.clone());
        }
        headers
    }
}

/// The main responder type. Implements [`IntoResponse`].
#[derive(Debug)]
pub struct Ranged<'a, B: RangeBody> {
    body: &'a B,
    range: Option<&'a str>,
    if_range: Option<&'a str>,
    boundary: BoundaryPolicy,
    validator: Option<Validator>,
    head: bool,
    ignore_ranges: bool,
}

impl<'a, B: RangeBody> Ranged<'a, B> {
    /// Construct a ranged response over any type implementing [`RangeBody`]
    /// from the raw `Range` and `If-Range` header values.
    pub fn new(body: &'a B, range: Option<&'a str>, if_range: Option<&'a str>) -> Self {
        Ranged {
            body,
            range,
            if_range,
            boundary: BoundaryPolicy::Fixed,
            validator: None,
            head: false,
            ignore_ranges: false,
        }
    }

    pub fn boundary(mut self, policy: BoundaryPolicy) -> Self {
        self.boundary = policy;
        self
    }

    /// Answer a `HEAD` request: headers only.
    pub fn head(mut self, head: bool) -> Self {
        self.head = head;
        self
    }

    /// Advertise `Accept-Ranges: none` and serve the full body no matter
    /// what the request asked for.
    pub fn ignore_ranges(mut self) -> Self {
        self.ignore_ranges = true;
        self
    }

    /// Report `validator` instead of the body's current one.
    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }

    /// Responds to the request, returning headers and body as
    /// [`RangedResponse`]. Returns [`RangeNotSatisfiable`] error if requested
    /// range in header was not satisfiable.
    pub fn try_respond(self) -> Result<RangedResponse, RangeNotSatisfiable> {
        let total_bytes = self.body.byte_size();
        let headers = RepresentationHeaders {
            accept_ranges: if self.ignore_ranges {
                AcceptRangesMode::None
            } else {
                AcceptRangesMode::Bytes
            },
            validator: self.validator.unwrap_or_else(|| self.body.validator()),
            content_type: self.body.content_type().clone(),
            content_encoding: self.body.content_encoding(),
        };

        if self.head {
            return Ok(RangedResponse::Head {
                content_length: ContentLength(total_bytes),
                headers,
            });
        }

        let outcome = if self.ignore_ranges {
            RangeOutcome::Full
        } else {
            RangeOutcome::resolve(self.range, self.if_range, &headers.validator, total_bytes)
        };
        tracing::debug!(?outcome, total_bytes, range = ?self.range, if_range = ?self.if_range, "resolved range request");

        match outcome {
            RangeOutcome::Full => Ok(RangedResponse::Full {
                content_length: ContentLength(total_bytes),
                stream: RangedStream::new(self.body.full()),
                headers,
            }),

            RangeOutcome::Single(range) => match single_content_range(range, total_bytes) {
                Ok(content_range) => Ok(RangedResponse::Single {
                    content_range,
                    content_length: ContentLength(range.len()),
                    stream: RangedStream::new(self.body.slice(range)),
                    headers,
                }),
                Err(reason) => Err(RangeNotSatisfiable::new(total_bytes, headers, reason)),
            },

            RangeOutcome::Multiple(ranges) => {
                let parts: Vec<Part> = ranges
                    .into_iter()
                    .map(|range| Part { range, data: self.body.slice(range) })
                    .collect();
                let boundary = self.boundary.boundary_for(&parts);
                let stream = MultipartStream::new(
                    parts,
                    total_bytes,
                    boundary,
                    headers.content_type.clone(),
                );
                Ok(RangedResponse::Multiple {
                    content_length: ContentLength(stream.content_length()),
                    stream,
                    headers,
                })
            }

            RangeOutcome::NotSatisfiable(reason) => {
                Err(RangeNotSatisfiable::new(total_bytes, headers, reason))
            }
        }
    }
}

fn single_content_range(range: ByteRange, total_bytes: u64) -> Result<ContentRange, Unsatisfiable> {
    if range.start > range.end || range.end >= total_bytes {
        tracing::error!(?range, total_bytes, "resolved range outside the representation");
        return Err(Unsatisfiable::Inconsistent(range));
    }
    ContentRange::bytes(range.start..=range.end, total_bytes)
        .map_err(|_| Unsatisfiable::Inconsistent(range))
}

impl<B: RangeBody> IntoResponse for Ranged<'_, B> {
    fn into_response(self) -> Response {
        self.try_respond().into_response()
    }
}

/// Error type indicating that the requested range was not satisfiable. Implements [`IntoResponse`].
#[derive(Debug, Clone)]
pub struct RangeNotSatisfiable {
    pub content_range: ContentRange,
    pub headers: RepresentationHeaders,
    pub reason: Unsatisfiable,
}

impl RangeNotSatisfiable {
    fn new(total_bytes: u64, headers: RepresentationHeaders, reason: Unsatisfiable) -> Self {
        RangeNotSatisfiable {
            content_range: ContentRange::unsatisfied_bytes(total_bytes),
            headers,
            reason,
        }
    }
}

impl IntoResponse for RangeNotSatisfiable {
    fn into_response(self) -> Response {
        let status = StatusCode::RANGE_NOT_SATISFIABLE;
        let headers = self.headers.validator_headers();
        let content_range = TypedHeader(self.content_range);
        (status, headers, content_range, "Range Not Satisfiable\n").into_response()
    }
}

/// Data type containing computed headers and body for a range response. Implements [`IntoResponse`].
#[derive(Debug)]
pub enum RangedResponse {
    /// Headers of the full representation, no body.
    Head {
        content_length: ContentLength,
        headers: RepresentationHeaders,
    },
    /// Full content response, no range requested or `If-Range` failed.
    Full {
        content_length: ContentLength,
        stream: RangedStream,
        headers: RepresentationHeaders,
    },
    Single {
        content_range: ContentRange,
        content_length: ContentLength,
        stream: RangedStream,
        headers: RepresentationHeaders,
    },
    Multiple {
        content_length: ContentLength,
        stream: MultipartStream,
        headers: RepresentationHeaders,
    },
}

impl RangedResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            RangedResponse::Head { .. } | RangedResponse::Full { .. } => StatusCode::OK,
            RangedResponse::Single { .. } | RangedResponse::Multiple { .. } => {
                StatusCode::PARTIAL_CONTENT
            }
        }
    }

    pub fn headers(&self) -> &RepresentationHeaders {
        match self {
            RangedResponse::Head { headers, .. }
            | RangedResponse::Full { headers, .. }
            | RangedResponse::Single { headers, .. }
            | RangedResponse::Multiple { headers, .. } => headers,
        }
    }
}

impl IntoResponse for RangedResponse {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            RangedResponse::Head { content_length, headers } => {
                (status, headers.entity_headers(), TypedHeader(content_length)).into_response()
            }
            RangedResponse::Full { content_length, stream, headers } => {
                (status, headers.entity_headers(), TypedHeader(content_length), stream)
                    .into_response()
            }
            RangedResponse::Single { content_range, content_length, stream, headers } => (
                status,
                headers.entity_headers(),
                TypedHeader(content_range),
                TypedHeader(content_length),
                stream,
            )
                .into_response(),
            RangedResponse::Multiple { content_length, stream, headers } => {
                let mut entity = headers.entity_headers();
                entity.insert(header::CONTENT_TYPE, stream.boundary().content_type());
                (status, entity, TypedHeader(content_length), stream).into_response()
            }
        }
    }
}
