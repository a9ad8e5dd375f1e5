//! Adapter around the external packet dissector.
//!
//! The dissector is `tshark` filtered to HTTP requests and asked for four
//! fields in JSON form:
//!
//! ```text
//! tshark -r <input> -Y http.request -T json \
//!        -e tcp.srcport -e tcp.stream -e http.request.uri -e http.file_data
//! ```
//!
//! Each element of the emitted array looks like
//! `{"_source": {"layers": {"tcp.srcport": ["51234"], ...}}}`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, trace, warn};
use serde::Deserialize;

use crate::error_handling::types::DissectError;

use super::types::{CapturedRequest, FlowKey, PacketRecord, RequestBody};

const FIELD_SRC_PORT: &str = "tcp.srcport";
const FIELD_STREAM: &str = "tcp.stream";
const FIELD_URI: &str = "http.request.uri";
const FIELD_BODY: &str = "http.file_data";

/// Source of per-request packet records for one capture file.
pub trait Dissector: Send + Sync {
    fn dissect(&self, input: &Path) -> Result<Vec<PacketRecord>, DissectError>;
}

/// [`Dissector`] backed by a `tshark` executable.
#[derive(Debug, Clone)]
pub struct TsharkDissector {
    executable: PathBuf,
}

impl TsharkDissector {
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    fn command(&self, input: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("-r")
            .arg(input)
            .args(["-Y", "http.request", "-T", "json"])
            .args(["-e", FIELD_SRC_PORT])
            .args(["-e", FIELD_STREAM])
            .args(["-e", FIELD_URI])
            .args(["-e", FIELD_BODY]);
        cmd
    }
}

impl Dissector for TsharkDissector {
    fn dissect(&self, input: &Path) -> Result<Vec<PacketRecord>, DissectError> {
        debug!(
            "Running dissector {} on {}",
            self.executable.display(),
            input.display()
        );
        let output = self
            .command(input)
            .output()
            .map_err(DissectError::SpawnFailed)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("dissector stderr: {}", stderr.trim());
            return Err(DissectError::NonZeroExit(output.status.code()));
        }

        parse_dissector_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[derive(Debug, Deserialize)]
struct RawPacket {
    #[serde(rename = "_source")]
    source: Option<RawSource>,
}

#[derive(Debug, Deserialize)]
struct RawSource {
    layers: Option<HashMap<String, Vec<String>>>,
}

/// Parses the JSON emitted by the dissector into packet records.
///
/// Empty output means no HTTP requests. Elements without `_source.layers`, or
/// whose port or stream id do not parse, are skipped. A missing or empty body
/// field becomes [`RequestBody::Absent`].
pub fn parse_dissector_output(stdout: &str) -> Result<Vec<PacketRecord>, DissectError> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let packets: Vec<RawPacket> =
        serde_json::from_str(stdout).map_err(|e| DissectError::MalformedOutput(e.to_string()))?;

    let mut records = Vec::with_capacity(packets.len());
    for (index, packet) in packets.into_iter().enumerate() {
        let layers = match packet.source.and_then(|s| s.layers) {
            Some(layers) => layers,
            None => {
                trace!("packet #{} has no layers, skipping", index);
                continue;
            }
        };
        let key = match (
            first_value(&layers, FIELD_SRC_PORT).parse(),
            first_value(&layers, FIELD_STREAM).parse(),
        ) {
            (Ok(src_port), Ok(stream_id)) => FlowKey {
                src_port,
                stream_id,
            },
            _ => {
                warn!(
                    "packet #{} has unusable flow identity (port {:?}, stream {:?}), skipping",
                    index,
                    first_value(&layers, FIELD_SRC_PORT),
                    first_value(&layers, FIELD_STREAM)
                );
                continue;
            }
        };

        let body = match first_value(&layers, FIELD_BODY) {
            "" => RequestBody::Absent,
            hex => RequestBody::Hex(hex.to_string()),
        };

        records.push(PacketRecord {
            key,
            request: CapturedRequest {
                uri: first_value(&layers, FIELD_URI).to_string(),
                body,
            },
        });
    }
    Ok(records)
}

fn first_value<'a>(layers: &'a HashMap<String, Vec<String>>, field: &str) -> &'a str {
    layers
        .get(field)
        .and_then(|values| values.first())
        .map(String::as_str)
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fields_and_absent_bodies() {
        let json = r#"[
            {"_index": "packets", "_source": {"layers": {
                "tcp.srcport": ["51234"], "tcp.stream": ["3"],
                "http.request.uri": ["/login.php"], "http.file_data": ["757365723d61"]}}},
            {"_source": {"layers": {
                "tcp.srcport": ["51234"], "tcp.stream": ["3"],
                "http.request.uri": ["/index.html"]}}},
            {"_source": {"layers": {
                "tcp.srcport": ["40000"], "tcp.stream": ["9"],
                "http.request.uri": ["/verify.php"], "http.file_data": [""]}}}
        ]"#;
        let records = parse_dissector_output(json).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(
            records[0].key,
            FlowKey {
                src_port: 51234,
                stream_id: 3
            }
        );
        assert_eq!(records[0].request.uri, "/login.php");
        assert_eq!(
            records[0].request.body,
            RequestBody::Hex("757365723d61".to_string())
        );
        assert_eq!(records[1].request.body, RequestBody::Absent);
        assert_eq!(records[2].request.body, RequestBody::Absent);
    }

    #[test]
    fn skips_packets_without_identity_or_layers() {
        let json = r#"[
            {"_source": {}},
            {"_source": {"layers": {"tcp.stream": ["1"], "http.request.uri": ["/"]}}},
            {"_source": {"layers": {"tcp.srcport": ["80"], "tcp.stream": ["1"]}}}
        ]"#;
        let records = parse_dissector_output(json).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].request.uri, "");
    }

    #[test]
    fn empty_output_is_no_requests() {
        assert!(parse_dissector_output("").unwrap().is_empty());
        assert!(parse_dissector_output("  \n").unwrap().is_empty());
        assert!(parse_dissector_output("[]").unwrap().is_empty());
    }

    #[test]
    fn garbage_output_is_an_error() {
        assert!(matches!(
            parse_dissector_output("tshark: some warning\n[{"),
            Err(DissectError::MalformedOutput(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn failing_executable_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("tshark");
        std::fs::write(&script, "#!/bin/sh\necho 'cannot open' >&2\nexit 2\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = TsharkDissector::new(&script)
            .dissect(Path::new("capture.pcap"))
            .unwrap_err();
        assert!(matches!(err, DissectError::NonZeroExit(Some(2))));

        let missing = TsharkDissector::new(dir.path().join("nope"))
            .dissect(Path::new("capture.pcap"))
            .unwrap_err();
        assert!(matches!(missing, DissectError::SpawnFailed(_)));
    }

    #[cfg(unix)]
    #[test]
    fn passes_expected_arguments() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("tshark");
        // Echo the argument list back as the uri of a single packet.
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf '[{\"_source\":{\"layers\":{\"tcp.srcport\":[\"1\"],\"tcp.stream\":[\"2\"],\"http.request.uri\":[\"%s\"]}}}]' \"$*\"\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let records = TsharkDissector::new(&script)
            .dissect(Path::new("in.pcap"))
            .unwrap();
        assert_eq!(
            records[0].request.uri,
            "-r in.pcap -Y http.request -T json -e tcp.srcport -e tcp.stream -e http.request.uri -e http.file_data"
        );
    }
}
