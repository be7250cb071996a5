//! Viewer response headers
//!
//! Every viewer response is a `multipart/x-mixed-replace` stream with the
//! fixed boundary `frame`. Caching is disabled so browsers always reconnect
//! to the live stream. The HTTP server applies these headers; the body is the
//! sequence of chunks from a viewer session.

use crate::mjpeg::VIEWER_CONTENT_TYPE;

/// Headers sent with every viewer response, besides `Content-Type`
pub const NO_CACHE_HEADERS: [(&str, &str); 3] = [
    ("Cache-Control", "no-cache, no-store, must-revalidate"),
    ("Pragma", "no-cache"),
    ("Expires", "0"),
];

/// Content type of a viewer response
pub fn content_type() -> &'static str {
    VIEWER_CONTENT_TYPE
}

/// Every header of a viewer response, `Content-Type` first
pub fn response_headers() -> impl Iterator<Item = (&'static str, &'static str)> {
    std::iter::once(("Content-Type", VIEWER_CONTENT_TYPE)).chain(NO_CACHE_HEADERS)
}
