use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failure of the external dissector for one input. Always chunk-scoped.
#[derive(Debug)]
pub enum DissectError {
    SpawnFailed(std::io::Error),
    NonZeroExit(Option<i32>),
    MalformedOutput(String),
}

impl fmt::Display for DissectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DissectError::SpawnFailed(e) => write!(f, "Dissector could not be started: {}", e),
            DissectError::NonZeroExit(Some(code)) => {
                write!(f, "Dissector exited with status {}", code)
            }
            DissectError::NonZeroExit(None) => write!(f, "Dissector terminated by signal"),
            DissectError::MalformedOutput(e) => write!(f, "Dissector output unparsable: {}", e),
        }
    }
}

impl std::error::Error for DissectError {}

#[derive(Debug)]
pub enum DispatchError {
    IoError(std::io::Error),
    SplitFailed(String),
    NoChunks,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::IoError(e) => write!(f, "Dispatch IO error: {}", e),
            DispatchError::SplitFailed(e) => write!(f, "Splitting tool failed: {}", e),
            DispatchError::NoChunks => write!(f, "Splitting tool produced no chunk files"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        DispatchError::IoError(err)
    }
}

#[derive(Debug)]
pub enum WorkerError {
    SpawnFailed(std::io::Error),
    Crashed(String),
    Panicked(String),
}

impl fmt::Display for WorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerError::SpawnFailed(e) => write!(f, "Worker process could not be started: {}", e),
            WorkerError::Crashed(e) => write!(f, "Worker process crashed: {}", e),
            WorkerError::Panicked(e) => write!(f, "Worker panicked: {}", e),
        }
    }
}

impl std::error::Error for WorkerError {}

impl From<std::io::Error> for WorkerError {
    fn from(err: std::io::Error) -> Self {
        WorkerError::SpawnFailed(err)
    }
}

#[derive(Debug)]
pub enum ReportError {
    IoError(std::io::Error),
    CsvError(csv::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportError::IoError(e) => write!(f, "Report IO error: {}", e),
            ReportError::CsvError(e) => write!(f, "Report CSV error: {}", e),
        }
    }
}

impl std::error::Error for ReportError {}

impl From<std::io::Error> for ReportError {
    fn from(err: std::io::Error) -> Self {
        ReportError::IoError(err)
    }
}

impl From<csv::Error> for ReportError {
    fn from(err: csv::Error) -> Self {
        ReportError::CsvError(err)
    }
}

#[derive(Debug)]
pub enum HousekeepingError {
    IoError(std::io::Error),
}

impl fmt::Display for HousekeepingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HousekeepingError::IoError(e) => write!(f, "Cleanup IO error: {}", e),
        }
    }
}

impl std::error::Error for HousekeepingError {}

impl From<std::io::Error> for HousekeepingError {
    fn from(err: std::io::Error) -> Self {
        HousekeepingError::IoError(err)
    }
}

/// Top level failure of an analysis run.
#[derive(Debug)]
pub enum PipelineError {
    DispatchError(DispatchError),
    ReportError(ReportError),
    IoError(std::io::Error),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::DispatchError(e) => write!(f, "Dispatch error: {}", e),
            PipelineError::ReportError(e) => write!(f, "Report error: {}", e),
            PipelineError::IoError(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<DispatchError> for PipelineError {
    fn from(err: DispatchError) -> Self {
        PipelineError::DispatchError(err)
    }
}

impl From<ReportError> for PipelineError {
    fn from(err: ReportError) -> Self {
        PipelineError::ReportError(err)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err)
    }
}
