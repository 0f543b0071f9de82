//! Error types for BloomSonic

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BloomSonicError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Clip error: {0}")]
    Clip(String),

    #[error("Graph error: {0}")]
    Graph(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, BloomSonicError>;
