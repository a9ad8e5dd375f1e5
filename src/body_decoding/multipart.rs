//! `multipart/form-data` decoding.
//!
//! The decoder works on the whole body at once and is lenient:
//! the boundary is taken from the first line instead of the request headers
//! (which the dissector does not hand over), and every part that cannot be
//! understood is dropped on its own without affecting its neighbours.

use std::collections::HashMap;

use log::{debug, trace};

use super::decode_hex_body;
use super::types::{MultipartForm, MultipartImage, SkipReason};

const CRLF: &[u8] = b"\r\n";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const PART_DELIMITERS: &[u8] = b"\r\n-";

/// Decodes a hex encoded `multipart/form-data` body into text fields and
/// image attachments.
///
/// Never fails: invalid hex or a body without a usable boundary line yields an
/// empty [`MultipartForm`].
pub fn decode_multipart(body_hex: &str) -> MultipartForm {
    let mut form = MultipartForm::default();

    let data = match decode_hex_body(body_hex) {
        Some(data) => data,
        None => {
            debug!("multipart body is not valid hex, ignoring it");
            return form;
        }
    };

    let first_line = match find(&data, CRLF) {
        Some(end) => &data[..end],
        None => &data[..],
    };
    let boundary = trim_bytes(first_line, b"-");
    if boundary.is_empty() {
        debug!("multipart body has no boundary line");
        return form;
    }
    trace!(
        "multipart boundary: {}",
        String::from_utf8_lossy(boundary)
    );

    for raw_part in split_on(&data, boundary) {
        let part = trim_bytes(raw_part, PART_DELIMITERS);
        if part.is_empty() {
            continue;
        }
        if let Err(reason) = decode_part(part, &mut form) {
            debug!("skipping multipart unit: {:?}", reason);
            form.skipped.push(reason);
        }
    }

    form
}

fn decode_part(part: &[u8], form: &mut MultipartForm) -> Result<(), SkipReason> {
    let split = find(part, HEADER_TERMINATOR).ok_or(SkipReason::MissingHeaderTerminator)?;
    let (headers_raw, content) = (&part[..split], &part[split + HEADER_TERMINATOR.len()..]);

    let headers = parse_headers(headers_raw, &mut form.skipped);
    let disposition = headers
        .get("content-disposition")
        .ok_or(SkipReason::MissingContentDisposition)?;

    let mut field_name = None;
    let mut filename = None;
    for attribute in disposition.split(';').map(str::trim) {
        if let Some(value) = attribute.strip_prefix("name=") {
            field_name = Some(value.trim_matches('"').to_string());
        } else if let Some(value) = attribute.strip_prefix("filename=") {
            filename = Some(value.trim_matches('"').to_string());
        }
    }

    let field_name = match field_name {
        Some(name) if !name.is_empty() => name,
        _ => return Err(SkipReason::MissingFieldName),
    };

    match filename.filter(|f| !f.is_empty()) {
        Some(filename) => {
            let content_type = headers
                .get("content-type")
                .filter(|ct| ct.starts_with("image/"))
                .ok_or(SkipReason::NonImageAttachment)?;
            trace!(
                "multipart image {} ({}, {} bytes)",
                filename,
                content_type,
                content.len()
            );
            form.images.push(MultipartImage {
                filename,
                content_type: content_type.clone(),
                bytes: content.to_vec(),
            });
        }
        None => {
            let value = std::str::from_utf8(content).map_err(|_| SkipReason::UndecodableField)?;
            form.fields.insert(field_name, value.trim().to_string());
        }
    }
    Ok(())
}

/// Parses `key: value` header lines, lower-casing keys. Lines that are not
/// UTF-8 are recorded as skipped; lines without a colon are ignored.
fn parse_headers(raw: &[u8], skipped: &mut Vec<SkipReason>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in split_on(raw, CRLF) {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(_) => {
                skipped.push(SkipReason::UndecodableHeaderLine);
                continue;
            }
        };
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn split_on<'a>(data: &'a [u8], separator: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    let mut rest = data;
    while let Some(pos) = find(rest, separator) {
        pieces.push(&rest[..pos]);
        rest = &rest[pos + separator.len()..];
    }
    pieces.push(rest);
    pieces
}

fn trim_bytes<'a>(mut bytes: &'a [u8], set: &[u8]) -> &'a [u8] {
    while let [first, rest @ ..] = bytes {
        if !set.contains(first) {
            break;
        }
        bytes = rest;
    }
    while let [rest @ .., last] = bytes {
        if !set.contains(last) {
            break;
        }
        bytes = rest;
    }
    bytes
}
