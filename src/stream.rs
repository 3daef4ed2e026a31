use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use memchr::memmem;
use mime_guess::Mime;
use rand::distr::Alphanumeric;
use rand::Rng;

use crate::ByteRange;

const IO_BUFFER_SIZE: usize = 64 * 1024;

const FIXED_BOUNDARY: &str = "THIS_STRING_SEPARATES";
const FIXED_CONTENT_TYPE: &str = "multipart/byteranges; boundary=THIS_STRING_SEPARATES";
const RANDOM_BOUNDARY_LEN: usize = 32;

/// Response body over one contiguous slice, yielded in bounded chunks.
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
#[derive(Debug)]
pub struct RangedStream {
    remaining: Bytes,
}

impl RangedStream {
    pub(crate) fn new(data: Bytes) -> Self {
        RangedStream { remaining: data }
    }
}

impl IntoResponse for RangedStream {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl Body for RangedStream {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining.len() as u64)
    }

    fn is_end_stream(&self) -> bool {
        self.remaining.is_empty()
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
        -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl Stream for RangedStream {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let this = self.get_mut();
        Poll::Ready(next_chunk(&mut this.remaining).map(Ok))
    }
}

/// Multipart boundary token shared by every part of one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Boundary {
    token: String,
}

impl Boundary {
    /// The constant `THIS_STRING_SEPARATES`.
    pub fn fixed() -> Self {
        Boundary { token: FIXED_BOUNDARY.to_string() }
    }

    /// A random alphanumeric token whose delimiter occurs in none of `parts`.
    pub fn random_for<'a>(parts: impl IntoIterator<Item = &'a [u8]> + Clone) -> Self {
        loop {
            let token: String = rand::rng()
                .sample_iter(&Alphanumeric)
                .take(RANDOM_BOUNDARY_LEN)
                .map(char::from)
                .collect();
            let delimiter = format!("--{token}");
            let finder = memmem::Finder::new(delimiter.as_bytes());
            if parts.clone().into_iter().all(|part| finder.find(part).is_none()) {
                return Boundary { token };
            }
            tracing::debug!(%token, "boundary collides with content, regenerating");
        }
    }

    pub fn as_str(&self) -> &str {
        &self.token
    }

    /// `multipart/byteranges; boundary=...` as a header value.
    pub fn content_type(&self) -> HeaderValue {
        if self.token == FIXED_BOUNDARY {
            return HeaderValue::from_static(FIXED_CONTENT_TYPE);
        }
        HeaderValue::from_str(&format!("multipart/byteranges; boundary={}", self.token))
            .unwrap_or_else(|_| HeaderValue::from_static(FIXED_CONTENT_TYPE))
    }
}

impl Default for Boundary {
    fn default() -> Self {
        Boundary::fixed()
    }
}

/// How a multipart response picks its boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BoundaryPolicy {
    #[default]
    Fixed,
    Random,
}

impl BoundaryPolicy {
    pub fn from_random(random: bool) -> Self {
        if random {
            BoundaryPolicy::Random
        } else {
            BoundaryPolicy::Fixed
        }
    }

    pub fn boundary_for(&self, parts: &[Part]) -> Boundary {
        match self {
            BoundaryPolicy::Fixed => Boundary::fixed(),
            BoundaryPolicy::Random => Boundary::random_for(parts.iter().map(|part| &part.data[..])),
        }
    }
}

/// Reads the `boundary` parameter from a `Content-Type` value.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// One part of a `multipart/byteranges` body.
#[derive(Debug, Clone)]
pub struct Part {
    pub range: ByteRange,
    pub data: Bytes,
}

/// Multipart response body stream for multiple byte ranges.
/// Implements [`Stream`], [`Body`], and [`IntoResponse`].
#[derive(Debug)]
pub struct MultipartStream {
    state: MultipartState,
    parts: Vec<Part>,
    current_part: usize,
    total_size: u64,
    boundary: Boundary,
    content_type: Mime,
    remaining_len: u64,
}

#[derive(Debug)]
enum MultipartState {
    WritingHeaders,
    Reading { remaining: Bytes },
    WritingFinalBoundary,
    Finished,
}

impl MultipartStream {
    pub(crate) fn new(parts: Vec<Part>, total_size: u64, boundary: Boundary, content_type: Mime) -> Self {
        let mut stream = MultipartStream {
            state: MultipartState::WritingHeaders,
            parts,
            current_part: 0,
            total_size,
            boundary,
            content_type,
            remaining_len: 0,
        };
        stream.remaining_len = stream.encoded_len();
        stream
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Exact number of bytes the stream yields in total.
    pub fn content_length(&self) -> u64 {
        self.encoded_len()
    }

    fn encoded_len(&self) -> u64 {
        let parts: u64 = self
            .parts
            .iter()
            .map(|part| self.part_headers(part.range).len() as u64 + part.data.len() as u64 + 2)
            .sum();
        parts + self.final_boundary().len() as u64
    }

    fn part_headers(&self, range: ByteRange) -> String {
        format!(
            "--{}\r\nContent-Type: {}\r\nContent-Range: bytes {}-{}/{}\r\n\r\n",
            self.boundary.as_str(),
            self.content_type,
            range.start,
            range.end,
            self.total_size
        )
    }

    fn final_boundary(&self) -> String {
        format!("--{}--\r\n", self.boundary.as_str())
    }

    fn emit(&mut self, chunk: Bytes) -> Poll<Option<io::Result<Bytes>>> {
        self.remaining_len -= chunk.len() as u64;
        Poll::Ready(Some(Ok(chunk)))
    }
}

impl IntoResponse for MultipartStream {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl Body for MultipartStream {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact(self.remaining_len)
    }

    fn is_end_stream(&self) -> bool {
        matches!(self.state, MultipartState::Finished)
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>)
                  -> Poll<Option<io::Result<Frame<Bytes>>>>
    {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl Stream for MultipartStream {
    type Item = io::Result<Bytes>;

    fn poll_next(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>
    ) -> Poll<Option<io::Result<Bytes>>> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                MultipartState::WritingHeaders => {
                    let Some(part) = this.parts.get(this.current_part) else {
                        this.state = MultipartState::WritingFinalBoundary;
                        continue;
                    };
                    let headers = this.part_headers(part.range);
                    let remaining = part.data.clone();
                    this.state = MultipartState::Reading { remaining };
                    return this.emit(Bytes::from(headers));
                }

                MultipartState::Reading { remaining } => {
                    if let Some(chunk) = next_chunk(remaining) {
                        return this.emit(chunk);
                    }
                    // end of the current part
                    this.current_part += 1;
                    this.state = MultipartState::WritingHeaders;
                    return this.emit(Bytes::from_static(b"\r\n"));
                }

                MultipartState::WritingFinalBoundary => {
                    let final_boundary = this.final_boundary();
                    this.state = MultipartState::Finished;
                    return this.emit(Bytes::from(final_boundary));
                }

                MultipartState::Finished => {
                    return Poll::Ready(None);
                }
            }
        }
    }
}

fn next_chunk(remaining: &mut Bytes) -> Option<Bytes> {
    if remaining.is_empty() {
        return None;
    }
    let n = remaining.len().min(IO_BUFFER_SIZE);
    Some(remaining.split_to(n))
}
