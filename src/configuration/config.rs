use std::path::PathBuf;

use clap::Args;
use log::info;

use super::types::Config;
use crate::error_handling::types::ConfigError;

/// Command line overrides layered on top of the configuration file.
///
/// Path options can also be given through `FLOWSIFT_*` environment variables.
/// A value given on the command line wins over the environment, which wins
/// over the file, which wins over the built-in defaults.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Packet dissector executable
    #[arg(long, env = "FLOWSIFT_TSHARK", value_name = "PATH")]
    pub tshark: Option<PathBuf>,

    /// Capture splitting executable
    #[arg(long, env = "FLOWSIFT_EDITCAP", value_name = "PATH")]
    pub editcap: Option<PathBuf>,

    /// Directory receiving chunk files of a split input
    #[arg(long, value_name = "DIR")]
    pub chunk_dir: Option<PathBuf>,

    /// Directory receiving cropped card images
    #[arg(long, env = "FLOWSIFT_IMAGE_DIR", value_name = "DIR")]
    pub image_dir: Option<PathBuf>,

    /// Path of the CSV report
    #[arg(long, env = "FLOWSIFT_REPORT", value_name = "PATH")]
    pub report: Option<PathBuf>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(tshark) = &self.tshark {
            config.tshark_path = tshark.clone();
        }
        if let Some(editcap) = &self.editcap {
            config.editcap_path = Some(editcap.clone());
        }
        if let Some(chunk_dir) = &self.chunk_dir {
            config.chunk_dir = Some(chunk_dir.clone());
        }
        if let Some(image_dir) = &self.image_dir {
            config.image_dir = image_dir.clone();
        }
        if let Some(report) = &self.report {
            config.report_path = report.clone();
        }
    }

    /// Builds the effective configuration: file (or defaults), then overrides.
    pub fn load(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => {
                info!("Importing configuration from {}", path.display());
                Config::from_file(path)?
            }
            None => Config::default(),
        };
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }
}
