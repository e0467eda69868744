//! Crate-level error type and `Result` alias.
//!
//! Failures fall into two tiers. Configuration, dataset and inference errors
//! are fatal and abort the run. Block I/O errors are local to one block: the
//! streamer reports them and moves on to the next block.
use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Block I/O error: {0}")]
    BlockIo(#[from] BlockIoError),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },
}

impl Error {
    pub fn config<E: fmt::Display>(e: E) -> Self {
        Error::Config(e.to_string())
    }

    pub fn dataset<E: fmt::Display>(e: E) -> Self {
        Error::Dataset(e.to_string())
    }

    pub fn inference<E: fmt::Display>(e: E) -> Self {
        Error::Inference(e.to_string())
    }

    /// Only block I/O failures are survivable; everything else ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::BlockIo(_))
    }
}

/// Direction of a failed block transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BlockIoKind {
    Read,
    Write,
}

impl fmt::Display for BlockIoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockIoKind::Read => write!(f, "read"),
            BlockIoKind::Write => write!(f, "write"),
        }
    }
}

/// A single block's read or write failure.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockIoError {
    pub kind: BlockIoKind,
    pub block_index: usize,
    pub row_start: usize,
    pub rows: usize,
    /// 0-based source band, for reads
    pub band: Option<usize>,
    pub message: String,
}

impl fmt::Display for BlockIoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed for block {} at row {} ({} rows)",
            self.kind, self.block_index, self.row_start, self.rows
        )?;
        if let Some(band) = self.band {
            write!(f, ", band {}", band + 1)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for BlockIoError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_block_io_is_survivable() {
        let block = Error::BlockIo(BlockIoError {
            kind: BlockIoKind::Read,
            block_index: 2,
            row_start: 600,
            rows: 300,
            band: Some(4),
            message: "short read".into(),
        });
        assert!(!block.is_fatal());
        assert!(Error::config("bad scaler").is_fatal());
        assert!(Error::dataset("missing").is_fatal());
        assert!(Error::inference("bad batch").is_fatal());
    }

    #[test]
    fn block_error_names_block_row_and_band() {
        let err = BlockIoError {
            kind: BlockIoKind::Read,
            block_index: 3,
            row_start: 900,
            rows: 100,
            band: Some(0),
            message: "checksum".into(),
        };
        assert_eq!(
            err.to_string(),
            "read failed for block 3 at row 900 (100 rows), band 1: checksum"
        );
    }
}
