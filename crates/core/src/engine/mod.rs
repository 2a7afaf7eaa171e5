//! Chess engine integration
//!
//! Provides the engine session interface used by the orchestrator and its
//! implementation for UCI-compatible engines like Stockfish.

pub mod analysis;
pub mod session;
pub mod stockfish;
pub mod uci;

// Re-export main types for convenience
pub use analysis::{Evaluation, PvLine, Score, MATE_SCORE};
pub use session::{EngineOptions, EngineSession, EngineUpdate, RequestFence, SearchLimit, UpdateKind};
pub use stockfish::{EngineError, StockfishEngine};
pub use uci::{EngineMessage, InfoLine};
