//! The engine session seam
//!
//! The orchestrator talks to the engine only through [`EngineSession`], so a
//! real Stockfish process and the scripted engine used in tests are
//! interchangeable. Every returned future is `Send`.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use super::stockfish::EngineError;
use super::uci::InfoLine;

/// Identifies one search request.
///
/// Every update the engine pushes back carries the fence it was started
/// with; the orchestrator drops updates whose fence is no longer current.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestFence {
    pub id: u64,
    pub fen: String,
}

/// How long a search runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    Depth(u32),
    MoveTime(Duration),
}

/// Options applied to the engine before a search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineOptions {
    pub threads: u32,
    pub hash_mb: u32,
    pub multi_pv: u32,
    pub use_nnue: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            hash_mb: 16,
            multi_pv: 1,
            use_nnue: true,
        }
    }
}

/// Something the engine reported for a search
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateKind {
    /// A (partial) principal variation
    Info(InfoLine),
    /// The search is over
    Finished { best_move: Option<String> },
}

/// Pushed from the engine to the orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct EngineUpdate {
    pub fence: RequestFence,
    pub kind: UpdateKind,
}

/// A long-lived connection to an analysis engine.
///
/// Results are not returned from `start_search`; they are pushed on the update
/// channel handed out when the session was created. Unresponsiveness is never
/// a panic: callers watch [`EngineSession::is_alive`] and the updates, and
/// call [`EngineSession::restart`] when the engine went quiet.
pub trait EngineSession: Send {
    /// Stores options; they take effect on the next search.
    fn configure(
        &mut self,
        options: &EngineOptions,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Clears the engine's hash and history.
    fn new_game(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Starts a search on `fence.fen`. Does not wait for results.
    fn start_search(
        &mut self,
        fence: RequestFence,
        limit: SearchLimit,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Stops the running search, if any. Safe to call redundantly.
    fn stop(&mut self) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Kills and relaunches the engine, re-applying the last options.
    /// Returns whether it came back healthy.
    fn restart(&mut self) -> impl Future<Output = bool> + Send;

    /// Whether the engine process is running and talking to us
    fn is_alive(&self) -> bool;

    /// Points the session at another engine binary. A running engine is shut
    /// down; the next [`EngineSession::restart`] launches the new one.
    fn set_engine_path(&mut self, path: &str);

    fn analyze_fixed_depth(
        &mut self,
        fence: RequestFence,
        depth: u32,
    ) -> impl Future<Output = Result<(), EngineError>> + Send {
        self.start_search(fence, SearchLimit::Depth(depth))
    }

    fn analyze_timed(
        &mut self,
        fence: RequestFence,
        millis: u64,
    ) -> impl Future<Output = Result<(), EngineError>> + Send {
        self.start_search(fence, SearchLimit::MoveTime(Duration::from_millis(millis)))
    }
}
