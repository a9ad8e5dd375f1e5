//! Byte-level decoders for captured HTTP request bodies.
//!
//! The dissector hands bodies over as hex text. Both decoders accept that text
//! directly and never fail: malformed input degrades to an empty result, and
//! anything dropped along the way is reported through [`SkipReason`].

pub mod multipart;
pub mod types;
pub mod urlencoded;

pub use multipart::decode_multipart;
pub use types::{MultipartForm, MultipartImage, SkipReason};
pub use urlencoded::decode_urlencoded;

use log::trace;

/// Converts dissector hex text into raw bytes.
///
/// ASCII whitespace between digits is tolerated. Odd length or any non-hex
/// character yields `None`.
pub fn decode_hex_body(body_hex: &str) -> Option<Vec<u8>> {
    let compact: String = body_hex
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    match hex::decode(&compact) {
        Ok(bytes) => Some(bytes),
        Err(e) => {
            trace!("rejecting body hex ({} chars): {}", compact.len(), e);
            None
        }
    }
}
