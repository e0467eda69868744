use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid GDAL option: {option}. Expected KEY=VALUE")]
    InvalidGdalOption { option: String },

    #[error("Block height does not fit in memory addressing: {rows}")]
    BlockRowsOverflow { rows: u64 },

    #[error(transparent)]
    Pipeline(#[from] bandcast::Error),
}
