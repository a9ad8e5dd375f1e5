pub mod config;
pub mod types;

pub use config::ConfigOverrides;
pub use types::Config;
