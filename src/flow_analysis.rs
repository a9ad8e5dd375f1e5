//! Flow reconstruction and per-flow correlation.
//!
//! The dissector turns a capture file into HTTP request events, the extractor
//! groups them per connection and the correlator replays each connection to
//! collect its sensitive fields and card images.

pub mod correlator;
pub mod dissector;
pub mod extractor;
pub mod types;

pub use correlator::{correlate_flow, Endpoint};
pub use dissector::{Dissector, TsharkDissector};
pub use extractor::{extract_flows, group_flows};
pub use types::{CapturedRequest, FlowKey, FlowResult, FlowTable, PacketRecord, RequestBody, SensitiveRecord};
