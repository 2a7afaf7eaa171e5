//! Move history store
//!
//! A [`History`] holds one immutable [`BoardSnapshot`] per ply, including the
//! initial position, plus a [`MoveRecord`] for every move between them.
//! Snapshot `0` is the start position and snapshot `i + 1` is the position
//! after move `i`, so there is always exactly one more snapshot than moves.

use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::san::{San, SanPlus};
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position, Role, Square};

/// Metadata for one move of a history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    /// SAN with check/mate suffix, e.g. "Qxf7#"
    pub san: String,
    pub uci: String,
    /// `None` only for piece drops, which standard chess never produces
    pub from: Option<Square>,
    pub to: Square,
    pub is_capture: bool,
    pub piece: Role,
    /// Remaining clock after the move, when the source recorded it
    pub clock: Option<String>,
}

/// A position in a history
#[derive(Debug, Clone)]
pub struct BoardSnapshot {
    pub position: Chess,
    pub fen: String,
}

impl BoardSnapshot {
    pub fn new(position: Chess) -> Self {
        let fen = Fen::from_position(&position, EnPassantMode::Legal).to_string();
        Self { position, fen }
    }

    pub fn turn(&self) -> Color {
        self.position.turn()
    }
}

/// The first move that could not be applied while building a history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidMove {
    /// Index of the offending move in the input
    pub index: usize,
    pub token: String,
}

/// Outcome of [`History::build`]
#[derive(Debug, Clone)]
pub struct HistoryBuild {
    pub history: History,
    /// The moves that were applied; always a prefix of the input
    pub valid_moves: Vec<String>,
    pub invalid: Option<InvalidMove>,
}

/// Ordered position snapshots with per-move metadata
#[derive(Debug, Clone)]
pub struct History {
    snapshots: Vec<BoardSnapshot>,
    moves: Vec<MoveRecord>,
}

impl Default for History {
    fn default() -> Self {
        Self::new(Chess::default())
    }
}

impl History {
    /// Creates a history holding only `start`
    pub fn new(start: Chess) -> Self {
        Self {
            snapshots: vec![BoardSnapshot::new(start)],
            moves: Vec::new(),
        }
    }

    /// Replays SAN moves from the standard starting position
    pub fn build(moves_san: &[String]) -> HistoryBuild {
        Self::build_from(Chess::default(), moves_san, &[])
    }

    /// Replays SAN moves from `start`.
    ///
    /// Stops at the first token that does not parse or is illegal, keeping
    /// every snapshot computed up to that point. `clocks[i]` is attached to
    /// move `i` when present.
    pub fn build_from(start: Chess, moves_san: &[String], clocks: &[Option<String>]) -> HistoryBuild {
        let mut history = Self::new(start);
        let mut valid_moves = Vec::with_capacity(moves_san.len());
        let mut invalid = None;

        for (index, token) in moves_san.iter().enumerate() {
            let mv = token
                .parse::<SanPlus>()
                .ok()
                .and_then(|san| san.san.to_move(&history.last().position).ok());

            let Some(mv) = mv else {
                invalid = Some(InvalidMove {
                    index,
                    token: token.clone(),
                });
                break;
            };

            let clock = clocks.get(index).cloned().flatten();
            history.push_with_clock(mv, clock);
            valid_moves.push(token.clone());
        }

        HistoryBuild {
            history,
            valid_moves,
            invalid,
        }
    }

    /// Snapshot at `index`, where 0 is the initial position
    pub fn board_at(&self, index: usize) -> Option<&BoardSnapshot> {
        self.snapshots.get(index)
    }

    /// Position displayed for a move index; `None` is the initial position
    pub fn board_after(&self, move_index: Option<usize>) -> Option<&BoardSnapshot> {
        self.board_at(move_index.map_or(0, |index| index + 1))
    }

    /// Number of snapshots, i.e. `move_count() + 1`
    pub fn size(&self) -> usize {
        self.snapshots.len()
    }

    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    pub fn moves(&self) -> &[MoveRecord] {
        &self.moves
    }

    pub fn san_moves(&self) -> Vec<String> {
        self.moves.iter().map(|record| record.san.clone()).collect()
    }

    pub fn first(&self) -> &BoardSnapshot {
        &self.snapshots[0]
    }

    pub fn last(&self) -> &BoardSnapshot {
        // Never empty: the initial snapshot is created with the history
        &self.snapshots[self.snapshots.len() - 1]
    }

    /// Drops every move, keeping the initial position
    pub fn reset(&mut self) {
        self.truncate(0);
    }

    /// Keeps only the first `move_count` moves
    pub fn truncate(&mut self, move_count: usize) {
        self.moves.truncate(move_count);
        self.snapshots.truncate(move_count + 1);
    }

    /// Appends a move that is legal in the last position
    pub fn push(&mut self, mv: Move) -> &MoveRecord {
        self.push_with_clock(mv, None)
    }

    /// Appends a move given in UCI notation; returns `None` if it is not
    /// legal in the last position.
    pub fn push_uci(&mut self, uci: &str) -> Option<&MoveRecord> {
        let mv = uci
            .parse::<UciMove>()
            .ok()?
            .to_move(&self.last().position)
            .ok()?;
        Some(self.push(mv))
    }

    /// Finds the legal move from `from` to `to` in the snapshot at `index`.
    /// Castling is given as the king's two-square move.
    pub fn legal_move(
        &self,
        index: usize,
        from: Square,
        to: Square,
        promotion: Option<Role>,
    ) -> Option<Move> {
        let position = &self.board_at(index)?.position;
        UciMove::Normal { from, to, promotion }.to_move(position).ok()
    }

    fn push_with_clock(&mut self, mv: Move, clock: Option<String>) -> &MoveRecord {
        let mut after = self.last().position.clone();
        let san = San::from_move(&after, mv).to_string();
        let uci = mv.to_uci(CastlingMode::Standard).to_string();
        let record_from = mv.from();
        let record_to = mv.to();
        let is_capture = mv.is_capture();
        let piece = mv.role();

        after.play_unchecked(mv);
        let suffix = if after.is_checkmate() {
            "#"
        } else if after.is_check() {
            "+"
        } else {
            ""
        };

        self.snapshots.push(BoardSnapshot::new(after));
        self.moves.push(MoveRecord {
            san: format!("{}{}", san, suffix),
            uci,
            from: record_from,
            to: record_to,
            is_capture,
            piece,
            clock,
        });
        &self.moves[self.moves.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(moves: &[&str]) -> Vec<String> {
        moves.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_build_full_game() {
        let moves = tokens(&["e4", "e5", "Nf3", "Nc6", "Bb5"]);
        let build = History::build(&moves);

        assert!(build.invalid.is_none());
        assert_eq!(build.valid_moves, moves);
        assert_eq!(build.history.size(), 6);
        assert_eq!(build.history.move_count(), 5);
        assert_eq!(build.history.last().turn(), Color::Black);
        assert_eq!(
            build.history.board_at(1).unwrap().fen,
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"
        );
    }

    #[test]
    fn test_build_stops_at_first_bad_move() {
        let moves = tokens(&["e4", "e5", "Ke3", "Nc6", "!!?"]);
        let build = History::build(&moves);

        assert_eq!(
            build.invalid,
            Some(InvalidMove {
                index: 2,
                token: "Ke3".to_string()
            })
        );
        assert_eq!(build.valid_moves, tokens(&["e4", "e5"]));
        assert_eq!(build.history.size(), 3);
    }

    #[test]
    fn test_valid_moves_are_prefix_of_input() {
        let inputs = [
            tokens(&[]),
            tokens(&["e4"]),
            tokens(&["garbage"]),
            tokens(&["d4", "d5", "c4", "dxc4", "e3", "b5", "a4", "c6", "axb5", "cxb5", "Qf3"]),
            tokens(&["f3", "e5", "g4", "Qh4#", "a3"]),
        ];

        for moves in &inputs {
            let build = History::build(moves);
            assert!(moves.starts_with(&build.valid_moves));
            assert_eq!(build.valid_moves.len(), build.history.size() - 1);
        }
    }

    #[test]
    fn test_move_records() {
        let build = History::build(&tokens(&["e4", "d5", "exd5", "Qxd5", "Nc3", "Qe5+"]));
        let moves = build.history.moves();

        assert_eq!(moves[2].san, "exd5");
        assert!(moves[2].is_capture);
        assert_eq!(moves[2].piece, Role::Pawn);
        assert_eq!(moves[2].from, Some(Square::E4));
        assert_eq!(moves[2].to, Square::D5);
        assert_eq!(moves[4].uci, "b1c3");
        assert_eq!(moves[5].san, "Qe5+");
        assert!(!moves[4].is_capture);
    }

    #[test]
    fn test_clocks_attach_to_moves() {
        let clocks = vec![Some("0:05:00".to_string()), None];
        let build = History::build_from(Chess::default(), &tokens(&["e4", "c5"]), &clocks);
        assert_eq!(build.history.moves()[0].clock.as_deref(), Some("0:05:00"));
        assert_eq!(build.history.moves()[1].clock, None);
    }

    #[test]
    fn test_checkmate_suffix() {
        let build = History::build(&tokens(&["f3", "e5", "g4", "Qh4"]));
        assert_eq!(build.history.moves()[3].san, "Qh4#");
    }

    #[test]
    fn test_push_uci_and_truncate() {
        let mut history = History::default();
        assert!(history.push_uci("e2e4").is_some());
        assert!(history.push_uci("e7e5").is_some());
        assert!(history.push_uci("e1e3").is_none());
        assert_eq!(history.move_count(), 2);

        history.truncate(1);
        assert_eq!(history.size(), 2);
        assert_eq!(history.last().turn(), Color::Black);

        history.reset();
        assert_eq!(history.size(), 1);
        assert_eq!(history.first().fen, history.last().fen);
    }

    #[test]
    fn test_legal_move_handles_castling() {
        let build = History::build(&tokens(&["e4", "e5", "Nf3", "Nc6", "Bc4", "Bc5"]));
        let history = build.history;

        let castle = history.legal_move(6, Square::E1, Square::G1, None).unwrap();
        assert!(castle.is_castle());
        assert!(history.legal_move(6, Square::E1, Square::E3, None).is_none());
        assert_eq!(history.board_after(Some(5)).unwrap().fen, history.last().fen);
        assert_eq!(history.board_after(None).unwrap().fen, history.first().fen);
    }
}
