//! Types for representing engine evaluations

use serde::{Deserialize, Serialize};
use shakmaty::Color;
use std::fmt;

/// Pawn value given to forced mates so they sort above any material score
pub const MATE_SCORE: f32 = 100.0;

/// Raw engine evaluation, relative to the side to move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Evaluation {
    /// Centipawn score (positive = side to move is better)
    Centipawns(i32),
    /// Forced mate in N moves (negative = side to move gets mated)
    Mate(i32),
}

impl Evaluation {
    /// Flips the point of view
    pub fn negate(self) -> Self {
        match self {
            Evaluation::Centipawns(cp) => Evaluation::Centipawns(-cp),
            Evaluation::Mate(moves) => Evaluation::Mate(-moves),
        }
    }

    /// Converts evaluation to pawns
    pub fn as_pawns(&self) -> f32 {
        match self {
            Evaluation::Centipawns(cp) => *cp as f32 / 100.0,
            Evaluation::Mate(moves) => {
                // "mate 0" means the side to move is already mated
                if *moves > 0 {
                    MATE_SCORE
                } else {
                    -MATE_SCORE
                }
            }
        }
    }
}

impl fmt::Display for Evaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Evaluation::Centipawns(cp) => write!(f, "{:+.2}", *cp as f32 / 100.0),
            Evaluation::Mate(moves) => write!(f, "M{}", moves),
        }
    }
}

/// An evaluation normalized to White's point of view.
///
/// Scores are always stored this way; flipping to the viewer's side is a
/// presentation concern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    /// Pawns, positive = White is better
    pub value: f32,
    pub is_mate: bool,
    /// Moves to mate, positive = White mates. Zero when `is_mate` is false.
    pub mate_in: i32,
    pub depth: u32,
    pub nodes: u64,
}

impl Score {
    /// Builds a White-relative score from an engine evaluation reported for
    /// `side_to_move`.
    pub fn from_engine(evaluation: Evaluation, side_to_move: Color, depth: u32, nodes: u64) -> Self {
        // Convert before flipping so "mate 0" keeps its sign
        let pawns = evaluation.as_pawns();
        let (value, white) = match side_to_move {
            Color::White => (pawns, evaluation),
            Color::Black => (-pawns, evaluation.negate()),
        };

        let (is_mate, mate_in) = match white {
            Evaluation::Mate(moves) => (true, moves),
            Evaluation::Centipawns(_) => (false, 0),
        };

        Score {
            value,
            is_mate,
            mate_in,
            depth,
            nodes,
        }
    }

    /// Score seen from `color`'s side
    pub fn for_side(&self, color: Color) -> f32 {
        match color {
            Color::White => self.value,
            Color::Black => -self.value,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_mate {
            write!(f, "M{}", self.mate_in)
        } else {
            write!(f, "{:+.2}", self.value)
        }
    }
}

/// One principal variation reported by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvLine {
    /// 1-based line number when the engine runs with MultiPV > 1
    pub multipv: u32,
    pub score: Score,
    /// Moves in UCI notation (e.g., "e2e4")
    pub moves: Vec<String>,
}

impl PvLine {
    /// Returns a brief summary of the line
    pub fn summary(&self) -> String {
        format!(
            "#{} {} d{} | {}",
            self.multipv,
            self.score,
            self.score.depth,
            self.moves.iter().take(6).cloned().collect::<Vec<_>>().join(" ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_to_move_is_flipped() {
        let score = Score::from_engine(Evaluation::Centipawns(150), Color::Black, 12, 1000);
        assert_eq!(score.value, -1.5);
        assert!(!score.is_mate);
        assert_eq!(score.for_side(Color::Black), 1.5);
    }

    #[test]
    fn test_mate_normalization() {
        let score = Score::from_engine(Evaluation::Mate(3), Color::Black, 20, 0);
        assert!(score.is_mate);
        assert_eq!(score.mate_in, -3);
        assert_eq!(score.value, -MATE_SCORE);
        assert_eq!(score.to_string(), "M-3");
    }

    #[test]
    fn test_checkmated_side_to_move() {
        let score = Score::from_engine(Evaluation::Mate(0), Color::Black, 0, 0);
        assert_eq!(score.value, MATE_SCORE);
    }

    #[test]
    fn test_display() {
        assert_eq!(Evaluation::Centipawns(35).to_string(), "+0.35");
        assert_eq!(Evaluation::Centipawns(-120).to_string(), "-1.20");
    }
}
