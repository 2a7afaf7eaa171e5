//! Commands and the handle used to drive a running orchestrator

use shakmaty::uci::UciMove;
use shakmaty::{Role, Square};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::state::{AnalysisState, NavTarget};
use super::Orchestrator;
use crate::config::AnalysisSettings;
use crate::engine::{EngineSession, EngineUpdate};
use crate::error::{Error, Result};
use crate::parser::{parse_pgn_string, PgnError, PgnGame};

const COMMAND_QUEUE: usize = 64;

/// The moves of a game to load, as SAN tokens
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameMoves {
    pub moves: Vec<String>,
    /// Optional clock per move; may be shorter than `moves`
    pub clocks: Vec<Option<String>>,
}

impl From<PgnGame> for GameMoves {
    fn from(game: PgnGame) -> Self {
        Self {
            moves: game.moves,
            clocks: game.clocks,
        }
    }
}

impl From<Vec<String>> for GameMoves {
    fn from(moves: Vec<String>) -> Self {
        Self {
            moves,
            clocks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Command {
    /// Replace the game and start scanning it
    Load(GameMoves),
    Clear,
    Navigate(NavTarget),
    /// Go to the move with the largest evaluation swing
    JumpToBiggestChange,
    /// Explore the `line`-th principal variation of the displayed position,
    /// with the cursor on its `ply`-th move
    EnterVariation { line: usize, ply: usize },
    PlayMove {
        from: Square,
        to: Square,
        promotion: Option<Role>,
    },
    ReturnToGame,
    UpdateSettings(AnalysisSettings),
    Shutdown,
}

impl Command {
    /// A [`Command::PlayMove`] from UCI notation such as "e7e8q"
    pub fn play_uci(uci: &str) -> Result<Self> {
        match uci.trim().parse::<UciMove>() {
            Ok(UciMove::Normal { from, to, promotion }) => Ok(Command::PlayMove { from, to, promotion }),
            _ => Err(Error::InvalidMove(uci.to_string())),
        }
    }
}

/// Cheap, clonable access to a running orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<AnalysisState>,
}

impl OrchestratorHandle {
    pub async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::OrchestratorClosed)
    }

    /// Parses `pgn` and loads its first game; returns the number of moves
    /// read. Parse errors are returned here rather than swallowed by the
    /// orchestrator.
    pub async fn load_pgn(&self, pgn: &str) -> Result<usize> {
        let game = parse_pgn_string(pgn)?
            .into_iter()
            .next()
            .ok_or(PgnError::NoGamesFound)?;
        let count = game.move_count();
        self.send(Command::Load(game.into())).await?;
        Ok(count)
    }

    pub async fn navigate(&self, target: NavTarget) -> Result<()> {
        self.send(Command::Navigate(target)).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    /// The most recently published state
    pub fn state(&self) -> AnalysisState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AnalysisState> {
        self.state.clone()
    }
}

/// Starts an orchestrator task driving `engine`.
///
/// `updates` must be the receiver paired with `engine`.
pub fn spawn<E>(
    engine: E,
    updates: mpsc::UnboundedReceiver<EngineUpdate>,
    settings: AnalysisSettings,
) -> (OrchestratorHandle, JoinHandle<()>)
where
    E: EngineSession + 'static,
{
    let (commands, receiver) = mpsc::channel(COMMAND_QUEUE);
    let (orchestrator, state) = Orchestrator::new(engine, settings);
    let task = tokio::spawn(orchestrator.run(receiver, updates));
    (OrchestratorHandle { commands, state }, task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_play_uci() {
        match Command::play_uci("e7e8q").unwrap() {
            Command::PlayMove { from, to, promotion } => {
                assert_eq!(from, Square::E7);
                assert_eq!(to, Square::E8);
                assert_eq!(promotion, Some(Role::Queen));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert!(matches!(Command::play_uci("0000"), Err(Error::InvalidMove(_))));
        assert!(matches!(Command::play_uci("e9e4"), Err(Error::InvalidMove(_))));
    }

    #[test]
    fn test_game_moves_from_pgn() {
        let game = parse_pgn_string("1. e4 { [%clk 0:03:00] } e5 *").unwrap().remove(0);
        let moves = GameMoves::from(game);
        assert_eq!(moves.moves, vec!["e4", "e5"]);
        assert_eq!(moves.clocks, vec![Some("0:03:00".to_string()), None]);
    }
}
