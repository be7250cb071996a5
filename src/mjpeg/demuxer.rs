//! Incremental `multipart/x-mixed-replace` demuxer
//!
//! Bytes are pushed in as they arrive from the network and complete parts are
//! pulled out. The demuxer never emits a partial payload: a part is only
//! returned once its whole body and the start of the next boundary have been
//! seen.
//!
//! A declared `Content-Length` is trusted when the body is followed by a line
//! break and then nothing, part of a delimiter, or a whole one. The part is
//! emitted right away, without waiting for the next boundary. Otherwise the
//! demuxer falls back to scanning for the delimiter, so cameras that omit or
//! misreport the length still work. Both CRLF and bare LF line endings are
//! accepted.

use bytes::{Buf, Bytes, BytesMut};

use super::part::Part;

/// Default upper bound for a single part, and for garbage before a boundary
pub const DEFAULT_MAX_PART_SIZE: usize = 4 * 1024 * 1024;

/// Upper bound for a part header block
pub const MAX_HEADER_SIZE: usize = 16 * 1024;

const JPEG_SOI: &[u8] = &[0xFF, 0xD8];
const JPEG_EOI: &[u8] = &[0xFF, 0xD9];

/// Framing error, reported by [`MultipartDemuxer::next_part`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemuxError {
    /// No boundary delimiter found within the size limit
    BoundaryNotFound {
        /// Bytes buffered without finding a delimiter
        buffered: usize,
    },
    /// Part header block exceeds [`MAX_HEADER_SIZE`]
    HeaderTooLarge {
        /// Bytes buffered without finding the end of the headers
        buffered: usize,
    },
    /// Part body exceeds the configured maximum
    PartTooLarge {
        /// Bytes buffered without finding the end of the part
        buffered: usize,
    },
    /// The camera sent the closing delimiter (`--boundary--`)
    StreamClosed,
}

impl std::fmt::Display for DemuxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DemuxError::BoundaryNotFound { buffered } => {
                write!(f, "No multipart boundary in {} bytes", buffered)
            }
            DemuxError::HeaderTooLarge { buffered } => {
                write!(f, "Part headers exceed limit ({} bytes buffered)", buffered)
            }
            DemuxError::PartTooLarge { buffered } => {
                write!(f, "Part exceeds size limit ({} bytes buffered)", buffered)
            }
            DemuxError::StreamClosed => write!(f, "Multipart stream closed by upstream"),
        }
    }
}

impl std::error::Error for DemuxError {}

/// How parts are delimited in the byte stream
#[derive(Debug, Clone)]
enum Framing {
    /// `--<boundary>` delimited parts
    Multipart(Bytes),
    /// Bare concatenated JPEG images, split on SOI/EOI markers
    JpegMarkers,
}

#[derive(Debug)]
enum State {
    /// Looking for the next delimiter line
    Boundary,
    /// Reading the part header block
    Headers,
    /// Reading the body; `scanned` is how far the delimiter search got
    Body {
        headers: Bytes,
        declared: Option<usize>,
        scanned: usize,
    },
}

/// Result of checking the bytes after a `Content-Length` sized body
enum LengthCheck {
    /// Body is complete; skip this many separator bytes
    Valid(usize),
    NeedMore,
    Invalid,
}

/// Splits a continuous multipart byte stream into [`Part`]s
#[derive(Debug)]
pub struct MultipartDemuxer {
    framing: Framing,
    buf: BytesMut,
    state: State,
    max_part_size: usize,
}

impl MultipartDemuxer {
    /// Create a demuxer for parts separated by `--<boundary>`
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = BytesMut::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary.as_bytes());
        Self::with_framing(Framing::Multipart(delimiter.freeze()))
    }

    /// Create a demuxer that locates images by JPEG start/end markers
    ///
    /// Used when the upstream does not declare a multipart boundary.
    pub fn jpeg_markers() -> Self {
        Self::with_framing(Framing::JpegMarkers)
    }

    fn with_framing(framing: Framing) -> Self {
        Self {
            framing,
            buf: BytesMut::with_capacity(64 * 1024),
            state: State::Boundary,
            max_part_size: DEFAULT_MAX_PART_SIZE,
        }
    }

    /// Set the maximum part size
    pub fn max_part_size(mut self, size: usize) -> Self {
        self.max_part_size = size;
        self
    }

    /// Number of bytes buffered but not yet emitted
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Feed bytes read from the upstream
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pull the next complete part
    ///
    /// Returns `Ok(None)` when more input is needed. Zero-length parts are
    /// dropped here and never returned.
    pub fn next_part(&mut self) -> Result<Option<Part>, DemuxError> {
        loop {
            let part = match self.framing.clone() {
                Framing::Multipart(delimiter) => self.next_multipart(&delimiter)?,
                Framing::JpegMarkers => self.next_jpeg()?,
            };

            match part {
                Some(part) if part.body.is_empty() => {
                    tracing::warn!(
                        headers = %String::from_utf8_lossy(&part.headers),
                        "Dropping zero-length part"
                    );
                }
                other => return Ok(other),
            }
        }
    }

    fn next_multipart(&mut self, delimiter: &[u8]) -> Result<Option<Part>, DemuxError> {
        loop {
            match std::mem::replace(&mut self.state, State::Boundary) {
                State::Boundary => {
                    let Some(pos) = find(&self.buf, delimiter) else {
                        if self.buf.len() > self.max_part_size {
                            return Err(DemuxError::BoundaryNotFound {
                                buffered: self.buf.len(),
                            });
                        }
                        return Ok(None);
                    };

                    let after = pos + delimiter.len();
                    if self.buf.len() < after + 2 {
                        return Ok(None);
                    }
                    if &self.buf[after..after + 2] == b"--" {
                        return Err(DemuxError::StreamClosed);
                    }

                    let Some(eol) = find(&self.buf[after..], b"\n") else {
                        if self.buf.len() - after > MAX_HEADER_SIZE {
                            return Err(DemuxError::HeaderTooLarge {
                                buffered: self.buf.len() - after,
                            });
                        }
                        return Ok(None);
                    };

                    if pos > 0 {
                        tracing::trace!(skipped = pos, "Skipped bytes before boundary");
                    }
                    self.buf.advance(after + eol + 1);
                    self.state = State::Headers;
                }
                State::Headers => {
                    let headers = if self.buf.starts_with(b"\r\n") {
                        self.buf.advance(2);
                        Bytes::new()
                    } else if self.buf.starts_with(b"\n") {
                        self.buf.advance(1);
                        Bytes::new()
                    } else if let Some((end, terminator)) = find_header_end(&self.buf) {
                        let headers = self.buf.split_to(end).freeze();
                        self.buf.advance(terminator);
                        headers
                    } else {
                        if self.buf.len() > MAX_HEADER_SIZE {
                            return Err(DemuxError::HeaderTooLarge {
                                buffered: self.buf.len(),
                            });
                        }
                        self.state = State::Headers;
                        return Ok(None);
                    };

                    let declared = Part::new(headers.clone(), Bytes::new()).content_length;
                    self.state = State::Body {
                        headers,
                        declared,
                        scanned: 0,
                    };
                }
                State::Body {
                    headers,
                    declared,
                    scanned,
                } => match self.take_body(delimiter, declared, scanned)? {
                    Ok(body) => {
                        let mut part = Part::new(headers, body);
                        part.content_length = declared;
                        return Ok(Some(part));
                    }
                    Err(scanned) => {
                        self.state = State::Body {
                            headers,
                            declared,
                            scanned,
                        };
                        return Ok(None);
                    }
                },
            }
        }
    }

    /// Take the body of the current part
    ///
    /// Returns `Ok(body)` when complete, or `Err(scanned)` with the updated
    /// scan position when more input is needed.
    fn take_body(
        &mut self,
        delimiter: &[u8],
        declared: Option<usize>,
        scanned: usize,
    ) -> Result<Result<Bytes, usize>, DemuxError> {
        if let Some(len) = declared.filter(|&len| len <= self.max_part_size) {
            if self.buf.len() < len {
                return Ok(Err(scanned));
            }
            match check_declared_length(&self.buf[len..], delimiter) {
                LengthCheck::Valid(separator) => {
                    let body = self.buf.split_to(len).freeze();
                    self.buf.advance(separator);
                    return Ok(Ok(body));
                }
                LengthCheck::NeedMore => return Ok(Err(scanned)),
                LengthCheck::Invalid => {
                    tracing::debug!(declared = len, "Content-Length mismatch, scanning for boundary");
                }
            }
        }

        let from = scanned.saturating_sub(delimiter.len());
        match find(&self.buf[from..], delimiter) {
            Some(offset) => {
                let mut body = self.buf.split_to(from + offset);
                if body.ends_with(b"\r\n") {
                    body.truncate(body.len() - 2);
                } else if body.ends_with(b"\n") {
                    body.truncate(body.len() - 1);
                }
                Ok(Ok(body.freeze()))
            }
            None if self.buf.len() > self.max_part_size => Err(DemuxError::PartTooLarge {
                buffered: self.buf.len(),
            }),
            None => Ok(Err(self.buf.len())),
        }
    }

    fn next_jpeg(&mut self) -> Result<Option<Part>, DemuxError> {
        let Some(start) = find(&self.buf, JPEG_SOI) else {
            // Keep a trailing 0xFF that may begin a marker.
            let keep = usize::from(self.buf.last() == Some(&0xFF));
            let drop = self.buf.len() - keep;
            self.buf.advance(drop);
            return Ok(None);
        };

        let Some(end) = find(&self.buf[start + JPEG_SOI.len()..], JPEG_EOI) else {
            if self.buf.len() - start > self.max_part_size {
                return Err(DemuxError::PartTooLarge {
                    buffered: self.buf.len() - start,
                });
            }
            return Ok(None);
        };

        let len = JPEG_SOI.len() + end + JPEG_EOI.len();
        self.buf.advance(start);
        let body = self.buf.split_to(len).freeze();
        Ok(Some(Part::jpeg(body)))
    }
}

fn check_declared_length(tail: &[u8], delimiter: &[u8]) -> LengthCheck {
    // After the line break: nothing yet, part of the delimiter, or all of it.
    let opens_delimiter = |rest: &[u8]| rest.starts_with(delimiter) || delimiter.starts_with(rest);

    for separator in [b"\r\n".as_slice(), b"\n".as_slice()] {
        if let Some(rest) = tail.strip_prefix(separator) {
            if opens_delimiter(rest) {
                return LengthCheck::Valid(separator.len());
            }
        }
    }
    if tail.starts_with(delimiter) {
        return LengthCheck::Valid(0);
    }
    if tail == b"\r" || delimiter.starts_with(tail) {
        return LengthCheck::NeedMore;
    }
    LengthCheck::Invalid
}

/// Find the blank line ending a header block: offset and terminator length
fn find_header_end(buf: &[u8]) -> Option<(usize, usize)> {
    let crlf = find(buf, b"\r\n\r\n").map(|pos| (pos, 4));
    let lf = find(buf, b"\n\n").map(|pos| (pos, 2));
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
