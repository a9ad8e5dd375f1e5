//! Output types of the body decoders.

use std::collections::HashMap;

/// A file attachment carried in a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartImage {
    /// Filename as announced by the uploader, quotes removed.
    pub filename: String,
    /// Value of the part's `content-type` header, always starting with `image/`.
    pub content_type: String,
    /// Raw payload bytes of the part.
    pub bytes: Vec<u8>,
}

/// Why a multipart unit was dropped while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The part has no blank line separating headers from payload.
    MissingHeaderTerminator,
    /// A header line is not valid UTF-8.
    UndecodableHeaderLine,
    /// The part carries no `content-disposition` header.
    MissingContentDisposition,
    /// `content-disposition` has no `name=` attribute.
    MissingFieldName,
    /// A file part whose `content-type` is absent or not `image/*`.
    NonImageAttachment,
    /// A text field whose payload is not valid UTF-8.
    UndecodableField,
}

/// Decoded `multipart/form-data` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartForm {
    /// Text fields by name; a later part with the same name replaces an earlier one.
    pub fields: HashMap<String, String>,
    /// Image attachments in body order.
    pub images: Vec<MultipartImage>,
    /// Units dropped while decoding, in the order they were met.
    pub skipped: Vec<SkipReason>,
}

impl MultipartForm {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.images.is_empty()
    }
}
