use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("monitor is not open")]
    NotOpen,
}
