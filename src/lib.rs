pub mod body_decoding;
pub mod chunk_dispatch;
pub mod configuration;
pub mod error_handling;
pub mod flow_analysis;
pub mod housekeeping;
pub mod image_crop;
pub mod pipeline;
pub mod report;

pub use configuration::{Config, ConfigOverrides};
pub use pipeline::{run_analysis, RunSummary};
