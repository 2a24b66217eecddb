use thiserror::Error;

#[derive(Error, Debug)]
pub enum CpuSimError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid workload {label}: {reason}")]
    InvalidWorkload { label: String, reason: String },
}
