//! Chess Replay Core Library
//!
//! Replays a game move by move and analyses it with a UCI engine in three
//! stages: a quick forward scan, a deeper backward scan, and interactive
//! exploration. See [`orchestrator`] for the state machine.

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod orchestrator;
pub mod parser;

pub use config::AnalysisSettings;
pub use engine::{EngineSession, StockfishEngine};
pub use error::{Error, Result};
pub use history::History;
pub use orchestrator::{spawn, AnalysisStage, AnalysisState, Command, NavTarget, OrchestratorHandle};
