//! Multipart parts and viewer framing
//!
//! A part is one segment of a `multipart/x-mixed-replace` body: a header block
//! and a body. Parts coming from a camera are re-framed under the fixed
//! viewer boundary so every relayed chunk can be written verbatim.
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! Content-Length: N\r\n
//! \r\n
//! <N bytes of JPEG>\r\n
//! ```

use bytes::{BufMut, Bytes, BytesMut};

/// Boundary used for every stream relayed to viewers
pub const VIEWER_BOUNDARY: &str = "frame";

/// Content type of the relayed stream
pub const VIEWER_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const DEFAULT_PART_CONTENT_TYPE: &str = "image/jpeg";

/// One complete multipart part
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    /// Raw header block, without the terminating blank line
    pub headers: Bytes,
    /// Part payload (normally a complete JPEG image)
    pub body: Bytes,
    /// Declared `Content-Length`, if the camera sent a parsable one
    pub content_length: Option<usize>,
}

impl Part {
    /// Create a part from a raw header block and body
    pub fn new(headers: Bytes, body: Bytes) -> Self {
        let content_length = header_value(&headers, "content-length")
            .and_then(|v| std::str::from_utf8(v).ok())
            .and_then(|v| v.trim().parse().ok());

        Self {
            headers,
            body,
            content_length,
        }
    }

    /// Create a part for a bare JPEG image (no upstream headers)
    pub fn jpeg(body: Bytes) -> Self {
        Self {
            headers: Bytes::new(),
            body,
            content_length: None,
        }
    }

    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        header_value(&self.headers, name)
    }

    /// Whether the body starts with a JPEG start-of-image marker
    pub fn is_jpeg(&self) -> bool {
        self.body.starts_with(&[0xFF, 0xD8])
    }

    /// Render this part as a chunk under [`VIEWER_BOUNDARY`]
    ///
    /// Upstream headers are passed through unchanged, except that
    /// `Content-Type` and `Content-Length` are added when missing and a
    /// `Content-Length` that disagrees with the body is rewritten.
    ///
    /// Returns the chunk and the byte range of the body within it.
    pub fn to_viewer_chunk(&self) -> (Bytes, std::ops::Range<usize>) {
        let mut out = BytesMut::with_capacity(self.body.len() + self.headers.len() + 96);

        out.put_slice(b"--");
        out.put_slice(VIEWER_BOUNDARY.as_bytes());
        out.put_slice(b"\r\n");

        let mut has_type = false;
        for line in header_lines(&self.headers) {
            match header_name(line) {
                Some(name) if name.eq_ignore_ascii_case(b"content-length") => continue,
                Some(name) if name.eq_ignore_ascii_case(b"content-type") => has_type = true,
                _ => {}
            }
            out.put_slice(line);
            out.put_slice(b"\r\n");
        }

        if !has_type {
            out.put_slice(b"Content-Type: ");
            out.put_slice(DEFAULT_PART_CONTENT_TYPE.as_bytes());
            out.put_slice(b"\r\n");
        }
        out.put_slice(format!("Content-Length: {}\r\n\r\n", self.body.len()).as_bytes());

        let start = out.len();
        out.put_slice(&self.body);
        let end = out.len();
        out.put_slice(b"\r\n");

        (out.freeze(), start..end)
    }
}

/// Extract the boundary token from a `Content-Type` header value
///
/// Quotes are stripped, and a leading `--` (sent by some cameras) is removed
/// so the token can be used to build the `--<token>` delimiter.
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');
    let mime = params.next()?.trim();
    if !mime.to_ascii_lowercase().starts_with("multipart/") {
        return None;
    }

    params.find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if !key.trim().eq_ignore_ascii_case("boundary") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        let value = value.strip_prefix("--").unwrap_or(value);
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    })
}

fn header_lines(block: &[u8]) -> impl Iterator<Item = &[u8]> {
    block
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
}

fn header_name(line: &[u8]) -> Option<&[u8]> {
    let colon = line.iter().position(|&b| b == b':')?;
    Some(trim_ascii(&line[..colon]))
}

fn header_value<'a>(block: &'a [u8], name: &str) -> Option<&'a [u8]> {
    header_lines(block).find_map(|line| {
        let colon = line.iter().position(|&b| b == b':')?;
        if trim_ascii(&line[..colon]).eq_ignore_ascii_case(name.as_bytes()) {
            Some(trim_ascii(&line[colon + 1..]))
        } else {
            None
        }
    })
}

fn trim_ascii(mut s: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = s {
        if first.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    while let [rest @ .., last] = s {
        if last.is_ascii_whitespace() {
            s = rest;
        } else {
            break;
        }
    }
    s
}
