//! A side line explored away from the main game

use shakmaty::{Chess, Move, Role, Square};

use super::state::{ExplorationView, NavTarget};
use crate::history::{BoardSnapshot, History};

/// A secondary history rooted at some position, with its own cursor and the
/// main-line index to return to.
#[derive(Debug, Clone)]
pub struct Exploration {
    history: History,
    current: Option<usize>,
    return_to: Option<usize>,
}

impl Exploration {
    /// An empty line rooted at `root`
    pub fn new(root: Chess, return_to: Option<usize>) -> Self {
        Self {
            history: History::new(root),
            current: None,
            return_to,
        }
    }

    /// A line following a principal variation. Moves after the first one
    /// that is not legal are dropped. The cursor is placed on `ply`.
    pub fn from_variation(root: Chess, uci_moves: &[String], ply: usize, return_to: Option<usize>) -> Self {
        let mut exploration = Self::new(root, return_to);
        for uci in uci_moves {
            if exploration.history.push_uci(uci).is_none() {
                break;
            }
        }
        exploration.current = NavTarget::Move(Some(ply)).resolve(None, exploration.history.move_count());
        exploration
    }

    /// The legal move from `from` to `to` in the displayed position
    pub fn legal_move(&self, from: Square, to: Square, promotion: Option<Role>) -> Option<Move> {
        let index = self.current.map_or(0, |index| index + 1);
        self.history.legal_move(index, from, to, promotion)
    }

    /// Plays `mv` after the cursor, dropping any moves that followed it
    pub fn play(&mut self, mv: Move) {
        let keep = self.current.map_or(0, |index| index + 1);
        self.history.truncate(keep);
        self.history.push(mv);
        self.current = Some(keep);
    }

    pub fn navigate(&mut self, target: NavTarget) {
        self.current = target.resolve(self.current, self.history.move_count());
    }

    pub fn displayed(&self) -> &BoardSnapshot {
        self.history
            .board_after(self.current)
            .unwrap_or_else(|| self.history.last())
    }

    pub fn return_to(&self) -> Option<usize> {
        self.return_to
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn view(&self) -> ExplorationView {
        ExplorationView {
            root_fen: self.history.first().fen.clone(),
            moves: self.history.san_moves(),
            current: self.current,
            return_to: self.return_to,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(moves: &[&str]) -> Vec<String> {
        moves.iter().map(|m| m.to_string()).collect()
    }

    #[test]
    fn test_variation_stops_at_illegal_move() {
        let exploration =
            Exploration::from_variation(Chess::default(), &line(&["e2e4", "e7e5", "e1e5", "g1f3"]), 5, Some(3));

        assert_eq!(exploration.history().move_count(), 2);
        // Cursor clamps to the last legal move
        assert_eq!(exploration.view().current, Some(1));
        assert_eq!(exploration.view().moves, vec!["e4", "e5"]);
        assert_eq!(exploration.return_to(), Some(3));
    }

    #[test]
    fn test_play_truncates_forward_moves() {
        let mut exploration =
            Exploration::from_variation(Chess::default(), &line(&["e2e4", "e7e5", "g1f3"]), 0, None);

        exploration.navigate(NavTarget::Next);
        assert_eq!(exploration.view().current, Some(1));

        assert!(exploration.legal_move(Square::E7, Square::E5, None).is_none());
        let mv = exploration.legal_move(Square::D2, Square::D4, None).unwrap();
        exploration.play(mv);

        assert_eq!(exploration.view().moves, vec!["e4", "e5", "d4"]);
        assert_eq!(exploration.view().current, Some(2));
        assert_eq!(exploration.displayed().fen, exploration.history().last().fen);
    }

    #[test]
    fn test_navigation_stays_inside_line() {
        let mut exploration = Exploration::from_variation(Chess::default(), &line(&["d2d4"]), 0, None);
        exploration.navigate(NavTarget::Start);
        assert_eq!(exploration.displayed().fen, exploration.history().first().fen);
        exploration.navigate(NavTarget::End);
        exploration.navigate(NavTarget::Next);
        assert_eq!(exploration.view().current, Some(0));
    }
}
