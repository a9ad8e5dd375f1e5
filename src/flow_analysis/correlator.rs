//! Per-flow correlation of credentials, personal fields and card images.
//!
//! Requests are replayed in capture order. Each request is routed by URI
//! prefix to one of three endpoints; each endpoint fixes the decoder, the
//! field update rule, the crop policy and the output naming rule.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, trace, warn};

use crate::body_decoding::{decode_multipart, decode_urlencoded, MultipartImage};
use crate::image_crop::CropPolicy;

use super::types::{CapturedRequest, FlowKey, FlowResult, RequestBody, SensitiveRecord};

/// The application endpoints whose uploads are inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// Login form, URL-encoded credentials.
    Credential,
    /// Survey form, multipart fields plus a bank card photo.
    Survey,
    /// Identity verification, multipart identity card photo.
    Verification,
}

impl Endpoint {
    /// Routes a request URI by prefix. Unknown URIs are not inspected.
    pub fn classify(uri: &str) -> Option<Self> {
        if uri.starts_with("/login.php") {
            Some(Endpoint::Credential)
        } else if uri.starts_with("/survey.php") {
            Some(Endpoint::Survey)
        } else if uri.starts_with("/verify.php") {
            Some(Endpoint::Verification)
        } else {
            None
        }
    }
}

/// Replays one flow's requests and returns its final record.
///
/// Cropped images are written into `image_dir`. Image failures are logged and
/// skipped; they never abort the flow.
pub fn correlate_flow(key: FlowKey, requests: &[CapturedRequest], image_dir: &Path) -> FlowResult {
    let mut record = SensitiveRecord::default();
    let mut images_written = 0usize;

    for request in requests {
        let body = match &request.body {
            RequestBody::Hex(body) => body,
            RequestBody::Absent => continue,
        };
        let endpoint = match Endpoint::classify(&request.uri) {
            Some(endpoint) => endpoint,
            None => {
                trace!("[{}] ignoring {}", key, request.uri);
                continue;
            }
        };
        debug!("[{}] {:?} request {}", key, endpoint, request.uri);

        match endpoint {
            Endpoint::Credential => {
                let params = decode_urlencoded(body);
                record.overwrite_from(&params);
            }
            Endpoint::Survey => {
                let form = decode_multipart(body);
                record.overwrite_from(&form.fields);
                for image in &form.images {
                    let stem = match record.known_phone() {
                        Some(phone) => phone.to_string(),
                        None => fallback_stem(key),
                    };
                    if persist_crop(key, image, CropPolicy::BankCard, &stem, image_dir).is_some() {
                        images_written += 1;
                    }
                }
            }
            Endpoint::Verification => {
                let form = decode_multipart(body);
                for image in &form.images {
                    let stem = filename_stem(&image.filename).unwrap_or_else(|| fallback_stem(key));
                    if persist_crop(key, image, CropPolicy::IdCard, &stem, image_dir).is_some() {
                        images_written += 1;
                    }
                }
            }
        }
    }

    if images_written > 0 || !record.is_empty() {
        info!(
            "[{}] flow done: {} request(s), {} image(s) written",
            key,
            requests.len(),
            images_written
        );
    }

    FlowResult { key, record }
}

fn fallback_stem(key: FlowKey) -> String {
    format!("flow_{}", key.stream_id)
}

/// Stem of an uploaded filename, ignoring any client side directory part.
fn filename_stem(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    Path::new(base)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

fn persist_crop(
    key: FlowKey,
    image: &MultipartImage,
    policy: CropPolicy,
    stem: &str,
    image_dir: &Path,
) -> Option<PathBuf> {
    let cropped = match policy.apply(&image.bytes) {
        Some(cropped) => cropped,
        None => {
            warn!(
                "[{}] could not crop {} image {}",
                key,
                policy.label(),
                image.filename
            );
            return None;
        }
    };

    // stems come from captured traffic
    let stem = stem.replace(['/', '\\', '\0'], "_");
    let path = image_dir.join(format!("{}_{}.{}", stem, policy.label(), cropped.extension));
    match fs::write(&path, &cropped.bytes) {
        Ok(()) => {
            debug!("[{}] wrote {} ({} bytes)", key, path.display(), cropped.bytes.len());
            Some(path)
        }
        Err(e) => {
            warn!("[{}] failed to write {}: {}", key, path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_crop::sample_jpeg;

    const KEY: FlowKey = FlowKey {
        src_port: 51234,
        stream_id: 17,
    };
    const BOUNDARY: &str = "----formboundaryQ9";

    fn urlencoded(uri: &str, text: &str) -> CapturedRequest {
        CapturedRequest {
            uri: uri.to_string(),
            body: RequestBody::Hex(hex::encode(text)),
        }
    }

    fn multipart(uri: &str, fields: &[(&str, &str)], files: &[(&str, &[u8])]) -> CapturedRequest {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        for (filename, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: image/jpeg\r\n\r\n",
                    BOUNDARY, filename
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        CapturedRequest {
            uri: uri.to_string(),
            body: RequestBody::Hex(hex::encode(body)),
        }
    }

    fn written_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn classifies_endpoints_by_prefix() {
        assert_eq!(Endpoint::classify("/login.php?next=/"), Some(Endpoint::Credential));
        assert_eq!(Endpoint::classify("/survey.php"), Some(Endpoint::Survey));
        assert_eq!(Endpoint::classify("/verify.php"), Some(Endpoint::Verification));
        assert_eq!(Endpoint::classify("/static/login.php"), None);
        assert_eq!(Endpoint::classify(""), None);
    }

    #[test]
    fn login_then_survey_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = sample_jpeg(120, 80);
        let requests = vec![
            urlencoded("/login.php", "username=alice&password=secret"),
            multipart("/survey.php", &[("phone", "5551234")], &[("card.jpg", jpeg.as_slice())]),
        ];

        let result = correlate_flow(KEY, &requests, dir.path());
        assert_eq!(result.key, KEY);
        let rec = result.record;
        assert_eq!(rec.username.as_deref(), Some("alice"));
        assert_eq!(rec.password.as_deref(), Some("secret"));
        assert_eq!(rec.phone.as_deref(), Some("5551234"));
        assert_eq!(rec.name.as_deref().unwrap_or(""), "");
        assert_eq!(written_files(dir.path()), ["5551234_bankcard.jpeg"]);
    }

    #[test]
    fn later_empty_value_overwrites_within_flow() {
        let dir = tempfile::tempdir().unwrap();
        let requests = vec![
            urlencoded("/login.php", "phone=123"),
            urlencoded("/login.php", "phone="),
        ];
        let rec = correlate_flow(KEY, &requests, dir.path()).record;
        assert_eq!(rec.phone.as_deref(), Some(""));
    }

    #[test]
    fn absent_bodies_and_unknown_uris_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let requests = vec![
            CapturedRequest {
                uri: "/login.php".to_string(),
                body: RequestBody::Absent,
            },
            urlencoded("/other.php", "username=mallory"),
        ];
        let rec = correlate_flow(KEY, &requests, dir.path()).record;
        assert_eq!(rec, SensitiveRecord::default());
    }

    #[test]
    fn bankcard_without_phone_uses_stream_id() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = sample_jpeg(60, 40);
        let requests = vec![multipart(
            "/survey.php",
            &[("name", "Bob")],
            &[("card.jpg", jpeg.as_slice())],
        )];
        let rec = correlate_flow(KEY, &requests, dir.path()).record;
        assert_eq!(rec.name.as_deref(), Some("Bob"));
        assert_eq!(written_files(dir.path()), ["flow_17_bankcard.jpeg"]);
    }

    #[test]
    fn verification_uses_upload_stem_and_ignores_fields() {
        let dir = tempfile::tempdir().unwrap();
        let jpeg = sample_jpeg(100, 100);
        let requests = vec![multipart(
            "/verify.php",
            &[("phone", "999")],
            &[("C:\\Users\\me\\13800138000.jpg", jpeg.as_slice())],
        )];
        let rec = correlate_flow(KEY, &requests, dir.path()).record;
        assert_eq!(rec.phone, None);
        assert_eq!(written_files(dir.path()), ["13800138000_idcard.jpeg"]);
    }

    #[test]
    fn broken_images_are_skipped_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let requests = vec![
            multipart("/survey.php", &[("phone", "42")], &[("bad.jpg", &b"\x01\x02garbage"[..])]),
            urlencoded("/login.php", "username=carol"),
        ];
        let rec = correlate_flow(KEY, &requests, dir.path()).record;
        assert_eq!(rec.username.as_deref(), Some("carol"));
        assert_eq!(rec.phone.as_deref(), Some("42"));
        assert!(written_files(dir.path()).is_empty());
    }

    #[test]
    fn unwritable_image_dir_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let jpeg = sample_jpeg(60, 40);
        let requests = vec![
            multipart("/survey.php", &[("phone", "42")], &[("card.jpg", jpeg.as_slice())]),
            urlencoded("/login.php", "password=pw"),
        ];
        let rec = correlate_flow(KEY, &requests, &missing).record;
        assert_eq!(rec.password.as_deref(), Some("pw"));
    }

    #[test]
    fn stems_are_derived_safely() {
        assert_eq!(filename_stem("a/b/138.png").as_deref(), Some("138"));
        assert_eq!(filename_stem("archive.tar.gz").as_deref(), Some("archive.tar"));
        assert_eq!(filename_stem("noext").as_deref(), Some("noext"));
        assert_eq!(filename_stem("dir/"), None);
        assert_eq!(filename_stem(".."), None);
    }
}
