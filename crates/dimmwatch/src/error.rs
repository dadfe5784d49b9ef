//! Error types for dimmwatch.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DimmWatchError {
    #[error("Firmware inventory error: {0}")]
    Firmware(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
