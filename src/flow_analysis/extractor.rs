use std::path::Path;

use log::{info, warn};

use super::dissector::Dissector;
use super::types::{FlowTable, PacketRecord};

/// Groups packet records per flow, keeping arrival order inside each flow.
pub fn group_flows(records: Vec<PacketRecord>) -> FlowTable {
    let mut flows = FlowTable::new();
    for record in records {
        flows.entry(record.key).or_default().push(record.request);
    }
    flows
}

/// Runs `dissector` over `input` and groups the result per flow.
///
/// A dissector failure is scoped to this input: it is logged and reported as
/// `None` so the caller can carry on with other chunks.
pub fn extract_flows(dissector: &dyn Dissector, input: &Path) -> Option<FlowTable> {
    match dissector.dissect(input) {
        Ok(records) => {
            let request_count = records.len();
            let flows = group_flows(records);
            info!(
                "Extracted {} HTTP request(s) in {} flow(s) from {}",
                request_count,
                flows.len(),
                input.display()
            );
            Some(flows)
        }
        Err(e) => {
            warn!("No data from {}: {}", input.display(), e);
            None
        }
    }
}
