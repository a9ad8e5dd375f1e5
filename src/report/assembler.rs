//! Cross-chunk aggregation and CSV output.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::{debug, info};

use crate::error_handling::types::ReportError;
use crate::flow_analysis::types::{FlowKey, FlowResult, SensitiveField, SensitiveRecord};

/// Column order of the report.
pub const REPORT_HEADER: [&str; 4] = ["username", "password", "name", "phone"];

const COLUMNS: [SensitiveField; 4] = [
    SensitiveField::Username,
    SensitiveField::Password,
    SensitiveField::Name,
    SensitiveField::Phone,
];

/// Aggregates worker results, one record per [`FlowKey`].
///
/// Results may arrive in any order. A field only changes when an incoming
/// value is non-empty, so a chunk that saw a blank form field never erases
/// what another chunk found.
#[derive(Debug, Default)]
pub struct ReportAssembler {
    records: BTreeMap<FlowKey, SensitiveRecord>,
}

impl ReportAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, result: FlowResult) {
        let entry = self.records.entry(result.key).or_default();
        *entry = std::mem::take(entry).merge_guarded(&result.record);
    }

    pub fn absorb_all<I: IntoIterator<Item = FlowResult>>(&mut self, results: I) {
        for result in results {
            self.absorb(result);
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, key: &FlowKey) -> Option<&SensitiveRecord> {
        self.records.get(key)
    }

    /// Writes the report, creating missing parent directories. Returns the
    /// number of data rows.
    pub fn write_csv(&self, path: &Path) -> Result<usize, ReportError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(REPORT_HEADER)?;
        for (key, record) in &self.records {
            debug!("row for flow {}", key);
            writer.write_record(COLUMNS.iter().map(|field| record.get(*field).unwrap_or("")))?;
        }
        writer.flush()?;

        info!("Wrote {} row(s) to {}", self.records.len(), path.display());
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(stream: u64) -> FlowKey {
        FlowKey {
            src_port: 51000,
            stream_id: stream,
        }
    }

    fn flow(stream: u64, username: Option<&str>, phone: Option<&str>) -> FlowResult {
        FlowResult {
            key: key(stream),
            record: SensitiveRecord {
                username: username.map(String::from),
                phone: phone.map(String::from),
                ..Default::default()
            },
        }
    }

    #[test]
    fn merge_is_order_independent_for_blank_values() {
        let full = flow(1, Some("alice"), Some("123"));
        let blank = flow(1, Some(""), Some(""));

        let mut forward = ReportAssembler::new();
        forward.absorb_all([full.clone(), blank.clone()]);
        let mut backward = ReportAssembler::new();
        backward.absorb_all([blank, full]);

        assert_eq!(forward.get(&key(1)), backward.get(&key(1)));
        assert_eq!(forward.get(&key(1)).unwrap().phone.as_deref(), Some("123"));
        assert_eq!(forward.len(), 1);
    }

    #[test]
    fn later_non_empty_value_wins() {
        let mut assembler = ReportAssembler::new();
        assembler.absorb(flow(1, Some("old"), None));
        assembler.absorb(flow(1, Some("new"), None));
        assert_eq!(
            assembler.get(&key(1)).unwrap().username.as_deref(),
            Some("new")
        );
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/report.csv");

        let mut assembler = ReportAssembler::new();
        assembler.absorb(flow(2, None, Some("555")));
        assembler.absorb(flow(1, Some("bob, jr"), None));

        assert_eq!(assembler.write_csv(&path).unwrap(), 2);
        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "username,password,name,phone\n\"bob, jr\",,,\n,,,555\n"
        );
    }

    #[test]
    fn empty_report_has_only_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        assert!(ReportAssembler::new().is_empty());
        assert_eq!(ReportAssembler::new().write_csv(&path).unwrap(), 0);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "username,password,name,phone\n"
        );
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, b"x").unwrap();
        assert!(ReportAssembler::new()
            .write_csv(&blocker.join("report.csv"))
            .is_err());
    }
}
