use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::error_handling::types::ConfigError;

const DEFAULT_TSHARK: &str = "tshark";
const DEFAULT_EDITCAP: &str = "editcap";

/// Runtime parameters of an analysis run.
///
/// Every field has a default so a configuration file only needs to name what
/// it changes:
///
/// ```toml
/// tshark_path = "/opt/wireshark/tshark"
/// image_dir = "out/images"
/// worker_fraction = 0.5
/// max_workers = 8
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Packet dissector executable.
    pub tshark_path: PathBuf,

    /// Capture splitting executable. When unset, `editcap` next to
    /// `tshark_path` is used, or plain `editcap` from `PATH`.
    pub editcap_path: Option<PathBuf>,

    /// Directory receiving chunk files of a split input. A fresh temporary
    /// directory is used when unset.
    pub chunk_dir: Option<PathBuf>,

    /// Directory receiving cropped card images.
    pub image_dir: PathBuf,

    /// Path of the CSV report.
    pub report_path: PathBuf,

    /// Inputs strictly larger than this are split before analysis.
    pub split_threshold_bytes: u64,

    /// Packets per chunk handed to the splitting tool.
    pub packets_per_chunk: u64,

    /// Share of the available CPUs used for chunk workers, in (0, 1].
    pub worker_fraction: f64,

    /// Lower bound on the worker pool size.
    pub min_workers: usize,

    /// Optional upper bound on the worker pool size.
    pub max_workers: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tshark_path: PathBuf::from(DEFAULT_TSHARK),
            editcap_path: None,
            chunk_dir: None,
            image_dir: PathBuf::from("Temp/Temp_img"),
            report_path: PathBuf::from("Temp/Temp_result_1.csv"),
            split_threshold_bytes: 1024 * 1024 * 1024,
            packets_per_chunk: 500_000,
            worker_fraction: 0.75,
            min_workers: 2,
            max_workers: None,
        }
    }
}

impl Config {
    /// Reads and validates a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            toml::from_str(content).map_err(|e| ConfigError::TomlError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.worker_fraction > 0.0 && self.worker_fraction <= 1.0) {
            return Err(ConfigError::NotInRange(format!(
                "worker_fraction must be in (0, 1], got {}",
                self.worker_fraction
            )));
        }
        if self.min_workers == 0 {
            return Err(ConfigError::NotInRange(
                "min_workers must be at least 1".to_string(),
            ));
        }
        if self.packets_per_chunk == 0 {
            return Err(ConfigError::NotInRange(
                "packets_per_chunk must be at least 1".to_string(),
            ));
        }
        if let Some(max) = self.max_workers {
            if max < self.min_workers {
                return Err(ConfigError::NotInRange(format!(
                    "max_workers ({}) is below min_workers ({})",
                    max, self.min_workers
                )));
            }
        }
        Ok(())
    }

    /// The splitting tool to run, resolved against `tshark_path` when not set.
    pub fn editcap(&self) -> PathBuf {
        if let Some(path) = &self.editcap_path {
            return path.clone();
        }
        let mut name = PathBuf::from(DEFAULT_EDITCAP);
        if let Some(ext) = self.tshark_path.extension() {
            name.set_extension(ext);
        }
        match self.tshark_path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.join(name),
            _ => name,
        }
    }
}
