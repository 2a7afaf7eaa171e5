//! Error types for chess-replay-core

use thiserror::Error;

use crate::engine::EngineError;
use crate::parser::PgnError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("PGN error: {0}")]
    Pgn(#[from] PgnError),

    #[error("Invalid move: {0}")]
    InvalidMove(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid settings: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Analysis task is no longer running")]
    OrchestratorClosed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
