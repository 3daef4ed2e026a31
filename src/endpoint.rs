//! Per-request orchestration over the resource store.

use std::borrow::Cow;

use axum::http::{header, HeaderMap, HeaderName, Method};
use axum::response::{IntoResponse, Response};

use crate::{BoundaryPolicy, Ranged, ResourceStore};

/// Which representation is served and what range support is advertised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Raw bytes, ranges and `If-Range` honoured.
    Full,
    /// Gzip bytes; range arithmetic over the compressed stream.
    Compressed,
    /// Raw bytes, always 200 with `Accept-Ranges: none`.
    NoRange,
}

impl DeliveryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryMode::Full => "full",
            DeliveryMode::Compressed => "compressed",
            DeliveryMode::NoRange => "no-range",
        }
    }
}

/// Answers one `GET` or `HEAD` request in the given mode.
pub fn deliver(
    store: &ResourceStore,
    mode: DeliveryMode,
    method: &Method,
    headers: &HeaderMap,
    boundary: BoundaryPolicy,
) -> Response {
    let head = method == Method::HEAD;
    let range = header_text(headers, header::RANGE);
    let if_range = header_text(headers, header::IF_RANGE);
    let (range, if_range) = (range.as_deref(), if_range.as_deref());

    tracing::debug!(mode = mode.as_str(), %method, ?range, ?if_range, "delivering resource");

    match mode {
        DeliveryMode::Full => Ranged::new(store.raw(), range, if_range)
            .boundary(boundary)
            .head(head)
            .into_response(),
        DeliveryMode::Compressed => Ranged::new(store.gzip(), range, if_range)
            .boundary(boundary)
            .head(head)
            .into_response(),
        DeliveryMode::NoRange => Ranged::new(store.raw(), None, None)
            .ignore_ranges()
            .with_validator(store.raw().strong_validator())
            .head(head)
            .into_response(),
    }
}

/// An empty value counts as absent. Non UTF-8 bytes are decoded lossily, so
/// such a `Range` fails to parse and such an `If-Range` never matches.
fn header_text(headers: &HeaderMap, name: HeaderName) -> Option<Cow<'_, str>> {
    let value = headers.get(name)?;
    if value.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(value.as_bytes()))
}
