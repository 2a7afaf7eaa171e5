//! Three-stage game analysis
//!
//! A loaded game is scanned forward with quick timed searches (preview),
//! then backward with slower ones (analyse), and is finally handed over for
//! free navigation with a depth-limited live search (manual).
//!
//! One task owns the [`Orchestrator`] and handles one event at a time:
//! commands from [`OrchestratorHandle`]s, engine updates, and the deadline of
//! the single outstanding search. Every search carries a
//! [`RequestFence`]; updates for any other fence, or for a position that is
//! no longer on the board, are dropped.

mod command;
mod delta;
mod exploration;
mod state;

pub use command::{spawn, Command, GameMoves, OrchestratorHandle};
pub use delta::{find_biggest_change_move, merged_score};
pub use exploration::Exploration;
pub use state::{AnalysisStage, AnalysisState, ExplorationView, LiveResult, NavTarget};

use shakmaty::{Chess, Color, Role, Square};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::config::AnalysisSettings;
use crate::engine::{
    EngineError, EngineOptions, EngineSession, EngineUpdate, PvLine, RequestFence, Score, UpdateKind,
};
use crate::history::{BoardSnapshot, History};

/// Time a timed scan search may overrun its movetime before it is abandoned
const SCAN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchKind {
    /// One ply of the preview or analyse scan
    Scan { stage: AnalysisStage, ply: usize },
    /// The manual search; `attempt` counts engine restarts spent on it
    Live { attempt: u32 },
    /// No search running; restart attempt `attempt` for the manual search is
    /// due at the deadline
    Restart { attempt: u32 },
}

#[derive(Debug)]
struct PendingSearch {
    fence: RequestFence,
    kind: SearchKind,
    deadline: Instant,
    side_to_move: Color,
    /// Latest first-line score, for scans
    best: Option<Score>,
}

/// Owns the engine session, the game and the published [`AnalysisState`]
pub struct Orchestrator<E> {
    engine: E,
    settings: AnalysisSettings,
    history: History,
    exploration: Option<Exploration>,
    state: AnalysisState,
    /// Id of the last fence issued or invalidated
    fence: u64,
    pending: Option<PendingSearch>,
    publisher: watch::Sender<AnalysisState>,
}

impl<E: EngineSession> Orchestrator<E> {
    pub fn new(engine: E, settings: AnalysisSettings) -> (Self, watch::Receiver<AnalysisState>) {
        let state = AnalysisState::default();
        let (publisher, receiver) = watch::channel(state.clone());
        let orchestrator = Self {
            engine,
            settings,
            history: History::default(),
            exploration: None,
            state,
            fence: 0,
            pending: None,
            publisher,
        };
        (orchestrator, receiver)
    }

    /// Processes events until a [`Command::Shutdown`] arrives or every
    /// handle is dropped
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut updates: mpsc::UnboundedReceiver<EngineUpdate>,
    ) {
        info!("analysis started");

        loop {
            let deadline = self.pending.as_ref().map(|pending| pending.deadline);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                Some(update) = updates.recv() => self.handle_update(update).await,
                () = wait_until(deadline) => self.handle_deadline().await,
            }
        }

        self.invalidate();
        self.stop_engine().await;
        info!("analysis stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Load(game) => self.load(game).await,
            Command::Clear => self.clear().await,
            Command::Navigate(target) => self.navigate(target).await,
            Command::JumpToBiggestChange => self.jump_to_biggest_change().await,
            Command::EnterVariation { line, ply } => self.enter_variation(line, ply).await,
            Command::PlayMove { from, to, promotion } => self.play_move(from, to, promotion).await,
            Command::ReturnToGame => self.return_to_game().await,
            Command::UpdateSettings(settings) => self.update_settings(settings).await,
            Command::Shutdown => {}
        }
    }

    async fn handle_update(&mut self, update: EngineUpdate) {
        let displayed = self.displayed().fen.clone();
        let Some(pending) = self.pending.as_mut() else {
            debug!(fence = update.fence.id, "no search outstanding, update dropped");
            return;
        };
        if update.fence != pending.fence || update.fence.fen != displayed {
            debug!(fence = update.fence.id, outstanding = pending.fence.id, "stale update dropped");
            return;
        }

        match (update.kind, pending.kind) {
            (UpdateKind::Info(info), kind) => {
                let Some(evaluation) = info.evaluation else {
                    return;
                };
                let score = Score::from_engine(evaluation, pending.side_to_move, info.depth, info.nodes);
                match kind {
                    SearchKind::Scan { .. } => {
                        if info.multipv <= 1 {
                            pending.best = Some(score);
                        }
                    }
                    SearchKind::Restart { .. } => {}
                    SearchKind::Live { .. } => {
                        let fence = update.fence;
                        self.state
                            .live
                            .get_or_insert_with(|| LiveResult::new(fence.id, fence.fen))
                            .upsert(PvLine {
                                multipv: info.multipv.max(1),
                                score,
                                moves: info.pv,
                            });
                        self.publish();
                    }
                }
            }
            (UpdateKind::Finished { best_move }, SearchKind::Scan { stage, ply }) => {
                let best = pending.best;
                self.pending = None;
                debug!(stage = stage.as_str(), ply, ?best_move, "scan search finished");
                self.record_score(stage, ply, best);
                self.advance_scan(Some(ply), true).await;
            }
            (UpdateKind::Finished { best_move }, SearchKind::Live { .. }) => {
                self.pending = None;
                let fence = update.fence;
                debug!(fence = fence.id, ?best_move, "search finished");
                self.state
                    .live
                    .get_or_insert_with(|| LiveResult::new(fence.id, fence.fen))
                    .finished = true;
                self.publish();
            }
            (UpdateKind::Finished { .. }, SearchKind::Restart { .. }) => {}
        }
    }

    async fn handle_deadline(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        match pending.kind {
            SearchKind::Scan { stage, ply } => {
                warn!(stage = stage.as_str(), ply, "scan search overran its budget");
                let stopped = self.stop_engine().await;
                let responsive = stopped && pending.best.is_some() && self.engine.is_alive();
                self.record_score(stage, ply, pending.best);
                let ready = if responsive {
                    true
                } else {
                    warn!(stage = stage.as_str(), ply, "engine unresponsive, restarting");
                    self.engine.restart().await
                };
                self.advance_scan(Some(ply), ready).await;
            }
            SearchKind::Live { attempt } => {
                let partial = self
                    .state
                    .live
                    .as_ref()
                    .is_some_and(|live| live.fence == pending.fence.id);
                if partial {
                    info!(fence = pending.fence.id, "search timed out, keeping partial result");
                    self.stop_engine().await;
                } else {
                    warn!(fence = pending.fence.id, "no engine output before the deadline");
                    self.retry_live_search(attempt + 1).await;
                }
            }
            SearchKind::Restart { attempt } => self.retry_live_search(attempt).await,
        }
    }

    async fn load(&mut self, game: GameMoves) {
        self.invalidate();
        self.exploration = None;

        let build = History::build_from(Chess::default(), &game.moves, &game.clocks);
        if let Some(invalid) = &build.invalid {
            warn!(index = invalid.index, token = %invalid.token, "game truncated at invalid move");
        }
        info!(moves = build.history.move_count(), "game loaded");

        self.history = build.history;
        self.state = AnalysisState::for_history(&self.history, AnalysisStage::Preview, build.invalid);
        self.start_scans().await;
    }

    async fn clear(&mut self) {
        self.invalidate();
        self.stop_engine().await;
        self.exploration = None;
        self.history = History::default();
        self.state = AnalysisState::for_history(&self.history, AnalysisStage::Manual, None);
        info!("game cleared");
        self.publish();
    }

    async fn start_scans(&mut self) {
        let ready = self.enter_stage(AnalysisStage::Preview).await;
        self.advance_scan(None, ready).await;
    }

    /// Switches to `stage` and readies the engine with its options; returns
    /// whether the engine is usable
    async fn enter_stage(&mut self, stage: AnalysisStage) -> bool {
        self.state.stage = stage;
        self.state.scanning = None;
        info!(stage = stage.as_str(), "stage started");
        self.publish();

        let options = match stage {
            AnalysisStage::Preview => self.settings.preview.engine_options(),
            AnalysisStage::Analyse => self.settings.analyse.engine_options(),
            AnalysisStage::Manual => self.settings.manual.engine_options(),
        };
        match self.prepare_engine(&options).await {
            Ok(()) => true,
            Err(e) => {
                warn!(stage = stage.as_str(), error = %e, "engine unavailable");
                false
            }
        }
    }

    async fn prepare_engine(&mut self, options: &EngineOptions) -> Result<(), EngineError> {
        if !self.engine.is_alive() && !self.engine.restart().await {
            return Err(EngineError::NotRunning);
        }
        self.engine.stop().await?;
        self.engine.configure(options).await?;
        self.engine.new_game().await
    }

    fn next_scan_ply(&self, stage: AnalysisStage, after: Option<usize>) -> Option<usize> {
        let count = self.history.move_count();
        match (stage, after) {
            (AnalysisStage::Preview, None) => (count > 0).then_some(0),
            (AnalysisStage::Preview, Some(ply)) => (ply + 1 < count).then_some(ply + 1),
            (AnalysisStage::Analyse, None) => count.checked_sub(1),
            (AnalysisStage::Analyse, Some(ply)) => ply.checked_sub(1),
            (AnalysisStage::Manual, _) => None,
        }
    }

    /// Starts the scan search following `after`, crossing into the next stage
    /// when the current one is exhausted. A stage whose engine is not `ready`
    /// is skipped.
    async fn advance_scan(&mut self, mut after: Option<usize>, mut ready: bool) {
        loop {
            let stage = self.state.stage;
            let next = if ready {
                self.next_scan_ply(stage, after)
            } else {
                None
            };

            match (stage, next) {
                (AnalysisStage::Manual, _) => return,
                (_, Some(ply)) => {
                    if self.start_scan_search(stage, ply).await {
                        return;
                    }
                    ready = false;
                }
                (AnalysisStage::Preview, None) => {
                    ready = self.enter_stage(AnalysisStage::Analyse).await;
                    after = None;
                }
                (AnalysisStage::Analyse, None) => {
                    self.finish_analyse().await;
                    return;
                }
            }
        }
    }

    async fn start_scan_search(&mut self, stage: AnalysisStage, ply: usize) -> bool {
        self.state.current = Some(ply);
        self.state.scanning = Some(ply);
        self.publish();

        let scan = match stage {
            AnalysisStage::Analyse => &self.settings.analyse,
            _ => &self.settings.preview,
        };
        let (movetime_ms, budget) = (scan.movetime_ms, scan.movetime() + SCAN_GRACE);
        let (fence, side_to_move) = self.issue_fence();

        match self.engine.analyze_timed(fence.clone(), movetime_ms).await {
            Ok(()) => {
                debug!(stage = stage.as_str(), ply, fence = fence.id, "scan search started");
                self.pending = Some(PendingSearch {
                    fence,
                    kind: SearchKind::Scan { stage, ply },
                    deadline: Instant::now() + budget,
                    side_to_move,
                    best: None,
                });
                true
            }
            Err(e) => {
                warn!(stage = stage.as_str(), ply, error = %e, "scan search failed to start");
                false
            }
        }
    }

    fn record_score(&mut self, stage: AnalysisStage, ply: usize, score: Option<Score>) {
        let Some(score) = score else {
            debug!(stage = stage.as_str(), ply, "no score");
            return;
        };
        let scores = match stage {
            AnalysisStage::Preview => &mut self.state.preview_scores,
            AnalysisStage::Analyse => &mut self.state.analyse_scores,
            AnalysisStage::Manual => return,
        };
        scores.insert(ply, score);
    }

    async fn finish_analyse(&mut self) {
        let target = self.biggest_change_or_last();
        info!(?target, "analysis complete");
        self.enter_manual(target).await;
    }

    async fn enter_manual(&mut self, index: Option<usize>) {
        self.invalidate();
        self.exploration = None;
        self.state.current = index;
        self.enter_stage(AnalysisStage::Manual).await;
        self.restart_live_search().await;
    }

    async fn interrupt_analyse(&mut self, index: Option<usize>) {
        info!(?index, "analysis interrupted");
        self.invalidate();
        self.stop_engine().await;
        self.enter_manual(index).await;
    }

    /// Bumps the fence, resets the engine and searches the displayed position
    async fn restart_live_search(&mut self) {
        self.invalidate();
        self.state.live = None;
        self.publish();

        self.stop_engine().await;
        sleep(self.settings.settle_delay()).await;
        if let Err(e) = self.engine.new_game().await {
            warn!(error = %e, "engine did not accept a new game");
        }
        sleep(self.settings.settle_delay()).await;

        if !self.start_live_search(0).await {
            self.retry_live_search(1).await;
        }
    }

    async fn start_live_search(&mut self, attempt: u32) -> bool {
        let depth = self.settings.manual.depth;
        let (fence, side_to_move) = self.issue_fence();

        match self.engine.analyze_fixed_depth(fence.clone(), depth).await {
            Ok(()) => {
                debug!(fence = fence.id, depth, attempt, "search started");
                self.pending = Some(PendingSearch {
                    fence,
                    kind: SearchKind::Live { attempt },
                    deadline: Instant::now() + self.settings.manual.timeout(),
                    side_to_move,
                    best: None,
                });
                true
            }
            Err(e) => {
                warn!(attempt, error = %e, "search failed to start");
                false
            }
        }
    }

    /// Restarts the engine and searches again. A failed attempt schedules
    /// the next one a settle delay later, so queued commands run in between.
    async fn retry_live_search(&mut self, attempt: u32) {
        let max = self.settings.max_restart_attempts;
        if attempt > max {
            warn!(fen = %self.displayed().fen, "engine restarts exhausted, no evaluation");
            self.invalidate();
            self.state.live = None;
            self.publish();
            return;
        }

        warn!(attempt, max, "restarting engine");
        // A restarted engine comes back with the options last configured
        if self.engine.restart().await && self.start_live_search(attempt).await {
            return;
        }

        let (fence, side_to_move) = self.issue_fence();
        self.pending = Some(PendingSearch {
            fence,
            kind: SearchKind::Restart { attempt: attempt + 1 },
            deadline: Instant::now() + self.settings.settle_delay(),
            side_to_move,
            best: None,
        });
    }

    async fn navigate(&mut self, target: NavTarget) {
        match self.state.stage {
            AnalysisStage::Preview => debug!(?target, "navigation ignored during preview"),
            AnalysisStage::Analyse => {
                let index = target.resolve(self.state.current, self.history.move_count());
                self.interrupt_analyse(index).await;
            }
            AnalysisStage::Manual => {
                match self.exploration.as_mut() {
                    Some(exploration) => exploration.navigate(target),
                    None => {
                        self.state.current = target.resolve(self.state.current, self.history.move_count());
                    }
                }
                self.restart_live_search().await;
            }
        }
    }

    async fn jump_to_biggest_change(&mut self) {
        let target = self.biggest_change_or_last();
        match self.state.stage {
            AnalysisStage::Preview => debug!("navigation ignored during preview"),
            AnalysisStage::Analyse => self.interrupt_analyse(target).await,
            AnalysisStage::Manual => {
                self.exploration = None;
                self.state.current = target;
                self.restart_live_search().await;
            }
        }
    }

    async fn enter_variation(&mut self, line: usize, ply: usize) {
        if self.state.stage != AnalysisStage::Manual {
            debug!("variations can only be explored in manual mode");
            return;
        }

        let displayed = self.displayed();
        let moves = self
            .state
            .live
            .as_ref()
            .filter(|live| live.is_for(&displayed.fen))
            .and_then(|live| live.lines.get(line))
            .map(|pv| pv.moves.clone())
            .filter(|moves| !moves.is_empty());
        let Some(moves) = moves else {
            debug!(line, "no such variation");
            return;
        };

        let root = displayed.position.clone();
        let return_to = self
            .exploration
            .as_ref()
            .map_or(self.state.current, Exploration::return_to);
        info!(line, ply, ?return_to, "exploring variation");
        self.exploration = Some(Exploration::from_variation(root, &moves, ply, return_to));
        self.restart_live_search().await;
    }

    async fn play_move(&mut self, from: Square, to: Square, promotion: Option<Role>) {
        if self.state.stage != AnalysisStage::Manual {
            debug!("moves can only be played in manual mode");
            return;
        }

        match self.exploration.as_mut() {
            Some(exploration) => {
                let Some(mv) = exploration.legal_move(from, to, promotion) else {
                    warn!(%from, %to, "illegal move ignored");
                    return;
                };
                exploration.play(mv);
            }
            None => {
                let index = self.state.current.map_or(0, |index| index + 1);
                let Some(mv) = self.history.legal_move(index, from, to, promotion) else {
                    warn!(%from, %to, "illegal move ignored");
                    return;
                };
                let mut exploration = Exploration::new(self.displayed().position.clone(), self.state.current);
                exploration.play(mv);
                self.exploration = Some(exploration);
            }
        }

        info!(%from, %to, "move played");
        self.restart_live_search().await;
    }

    async fn return_to_game(&mut self) {
        if self.state.stage != AnalysisStage::Manual {
            return;
        }
        let Some(exploration) = self.exploration.take() else {
            debug!("not exploring");
            return;
        };

        self.state.current = exploration.return_to();
        info!(index = ?self.state.current, "returned to game");
        self.restart_live_search().await;
    }

    async fn update_settings(&mut self, settings: AnalysisSettings) {
        let scan_changed = self.settings.scan_changed(&settings);
        let manual_changed = self.settings.manual_changed(&settings);
        if self.settings.engine_path != settings.engine_path {
            self.engine.set_engine_path(&settings.engine_path);
        }
        self.settings = settings;

        if scan_changed && self.history.move_count() > 0 {
            info!("scan settings changed, rescanning");
            self.invalidate();
            self.stop_engine().await;
            self.exploration = None;
            self.state.preview_scores.clear();
            self.state.analyse_scores.clear();
            self.state.live = None;
            self.state.current = None;
            self.start_scans().await;
        } else if manual_changed && self.state.stage == AnalysisStage::Manual {
            info!("manual settings changed");
            self.invalidate();
            let options = self.settings.manual.engine_options();
            if let Err(e) = self.engine.configure(&options).await {
                warn!(error = %e, "engine rejected new options");
            }
            self.restart_live_search().await;
        } else {
            debug!("settings stored");
        }
    }

    fn biggest_change_or_last(&self) -> Option<usize> {
        find_biggest_change_move(&self.state.preview_scores, &self.state.analyse_scores)
            .or_else(|| self.history.move_count().checked_sub(1))
    }

    /// The board being shown: the exploration line's when exploring
    fn displayed(&self) -> &BoardSnapshot {
        match &self.exploration {
            Some(exploration) => exploration.displayed(),
            None => self
                .history
                .board_after(self.state.current)
                .unwrap_or_else(|| self.history.last()),
        }
    }

    /// A fresh fence for the displayed position, plus its side to move
    fn issue_fence(&mut self) -> (RequestFence, Color) {
        self.fence += 1;
        let displayed = self.displayed();
        let fence = RequestFence {
            id: self.fence,
            fen: displayed.fen.clone(),
        };
        (fence, displayed.turn())
    }

    /// Makes every outstanding update stale
    fn invalidate(&mut self) {
        self.fence += 1;
        self.pending = None;
    }

    /// Returns whether the engine acknowledged the stop
    async fn stop_engine(&mut self) -> bool {
        match self.engine.stop().await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "engine did not stop cleanly");
                false
            }
        }
    }

    fn publish(&mut self) {
        self.state.fen = self.displayed().fen.clone();
        self.state.exploration = self.exploration.as_ref().map(Exploration::view);
        self.publisher.send_replace(self.state.clone());
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
