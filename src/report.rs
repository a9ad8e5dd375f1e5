pub mod assembler;

pub use assembler::{ReportAssembler, REPORT_HEADER};
