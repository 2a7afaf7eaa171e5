//! Observable analysis state

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::engine::{PvLine, Score};
use crate::history::{History, InvalidMove};

/// Analysis stages, in the order a loaded game goes through them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStage {
    /// Quick forward scan; navigation is ignored
    Preview,
    /// Slower backward scan; navigation jumps straight to `Manual`
    Analyse,
    /// Free navigation with a live engine result
    Manual,
}

impl AnalysisStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStage::Preview => "preview",
            AnalysisStage::Analyse => "analyse",
            AnalysisStage::Manual => "manual",
        }
    }
}

/// A navigation request. Move indices are 0-based; `Move(None)` is the
/// position before the first move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", content = "index", rename_all = "lowercase")]
pub enum NavTarget {
    Start,
    Previous,
    Next,
    End,
    Move(Option<usize>),
}

impl NavTarget {
    /// Resolves the target against `current` in a line of `move_count` moves.
    /// Out-of-range indices clamp to the last move.
    pub fn resolve(self, current: Option<usize>, move_count: usize) -> Option<usize> {
        let last = move_count.checked_sub(1);
        match self {
            NavTarget::Start => None,
            NavTarget::Previous => current.and_then(|index| index.checked_sub(1)),
            NavTarget::Next => {
                let next = current.map_or(0, |index| index + 1);
                last.map(|last| next.min(last))
            }
            NavTarget::End => last,
            NavTarget::Move(index) => index.and_then(|index| last.map(|last| index.min(last))),
        }
    }
}

/// The engine's current lines for the displayed position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveResult {
    /// Fence id the lines were computed for
    pub fence: u64,
    /// Position the lines were computed for
    pub fen: String,
    /// Sorted by `multipv`
    pub lines: Vec<PvLine>,
    /// Whether the search ran to completion
    pub finished: bool,
}

impl LiveResult {
    pub fn new(fence: u64, fen: String) -> Self {
        Self {
            fence,
            fen,
            lines: Vec::new(),
            finished: false,
        }
    }

    /// Whether this result belongs to `fen`
    pub fn is_for(&self, fen: &str) -> bool {
        self.fen == fen
    }

    pub fn best(&self) -> Option<&PvLine> {
        self.lines.first()
    }

    /// Replaces the line with the same `multipv`, keeping the order
    pub fn upsert(&mut self, line: PvLine) {
        match self.lines.binary_search_by_key(&line.multipv, |l| l.multipv) {
            Ok(pos) => self.lines[pos] = line,
            Err(pos) => self.lines.insert(pos, line),
        }
    }
}

/// What the presentation layer sees of an exploration line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationView {
    pub root_fen: String,
    pub moves: Vec<String>,
    pub current: Option<usize>,
    /// Main-line index restored by "return to game"
    pub return_to: Option<usize>,
}

/// Snapshot of the orchestrator, published after every change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisState {
    pub stage: AnalysisStage,
    /// Main line in SAN
    pub moves: Vec<String>,
    /// Where the loaded move list was cut short, if it was
    pub invalid_move: Option<InvalidMove>,
    /// Displayed main-line move; `None` is the initial position
    pub current: Option<usize>,
    /// Move whose position the current scan stage is searching
    pub scanning: Option<usize>,
    pub preview_scores: BTreeMap<usize, Score>,
    pub analyse_scores: BTreeMap<usize, Score>,
    /// Position on the board, from the exploration line when exploring
    pub fen: String,
    pub live: Option<LiveResult>,
    pub exploration: Option<ExplorationView>,
}

impl AnalysisState {
    /// Fresh state for a newly loaded history
    pub fn for_history(history: &History, stage: AnalysisStage, invalid_move: Option<InvalidMove>) -> Self {
        Self {
            stage,
            moves: history.san_moves(),
            invalid_move,
            current: None,
            scanning: None,
            preview_scores: BTreeMap::new(),
            analyse_scores: BTreeMap::new(),
            fen: history.first().fen.clone(),
            live: None,
            exploration: None,
        }
    }

    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    pub fn is_exploring(&self) -> bool {
        self.exploration.is_some()
    }

    /// Live result for the displayed position, if the engine produced one
    pub fn current_result(&self) -> Option<&LiveResult> {
        self.live.as_ref().filter(|live| live.is_for(&self.fen))
    }
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self::for_history(&History::default(), AnalysisStage::Manual, None)
    }
}
