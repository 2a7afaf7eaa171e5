//! Stockfish chess engine interface
//!
//! Spawns Stockfish as a subprocess and communicates via UCI protocol. A
//! reader task owns the engine's stdout: every `info`/`bestmove` line is tagged
//! with the fence of the search in flight and pushed to the update channel,
//! while handshake replies (`uciok`, `readyok`, `bestmove`) are routed back to
//! the adapter so it can wait on them.

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::session::{
    EngineOptions, EngineSession, EngineUpdate, RequestFence, SearchLimit, UpdateKind,
};
use super::uci::{parse_line, EngineMessage};

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const STOP_TIMEOUT: Duration = Duration::from_secs(2);
const QUIT_TIMEOUT: Duration = Duration::from_millis(500);

/// Error type for engine operations
#[derive(Debug)]
pub enum EngineError {
    /// Failed to start the engine process
    SpawnError(String),
    /// Failed to communicate with engine
    IoError(io::Error),
    /// Engine returned unexpected response
    ProtocolError(String),
    /// Engine did not answer in time
    Timeout(&'static str),
    /// No engine process is running
    NotRunning,
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::SpawnError(s) => write!(f, "Failed to start engine: {}", s),
            EngineError::IoError(e) => write!(f, "I/O error: {}", e),
            EngineError::ProtocolError(s) => write!(f, "Protocol error: {}", s),
            EngineError::Timeout(what) => write!(f, "Engine timed out waiting for {}", what),
            EngineError::NotRunning => write!(f, "Engine not running"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<io::Error> for EngineError {
    fn from(error: io::Error) -> Self {
        EngineError::IoError(error)
    }
}

/// Replies the adapter waits for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    UciOk,
    ReadyOk,
    BestMove,
}

impl Control {
    fn name(self) -> &'static str {
        match self {
            Control::UciOk => "uciok",
            Control::ReadyOk => "readyok",
            Control::BestMove => "bestmove",
        }
    }
}

type SearchSlot = Arc<Mutex<Option<RequestFence>>>;

/// A running engine process
struct Process {
    child: Child,
    stdin: ChildStdin,
    control: mpsc::UnboundedReceiver<Control>,
    /// Fence of the search in flight; the reader tags output with it
    searching: SearchSlot,
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

/// Wrapper around a Stockfish process
pub struct StockfishEngine {
    /// Path to stockfish binary (or "stockfish" if in PATH)
    path: String,
    options: EngineOptions,
    updates: mpsc::UnboundedSender<EngineUpdate>,
    process: Option<Process>,
}

impl StockfishEngine {
    /// Creates an adapter for the binary at `path` without starting it.
    ///
    /// The returned receiver yields every search update for the lifetime of
    /// the adapter, across restarts.
    ///
    /// # Example
    /// ```ignore
    /// let (mut engine, updates) = StockfishEngine::new("stockfish");
    /// engine.restart().await;
    /// ```
    pub fn new(path: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<EngineUpdate>) {
        let (updates, receiver) = mpsc::unbounded_channel();
        let engine = StockfishEngine {
            path: path.into(),
            options: EngineOptions::default(),
            updates,
            process: None,
        };
        (engine, receiver)
    }

    /// Creates the adapter and performs the UCI handshake
    pub async fn launch(
        path: impl Into<String>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<EngineUpdate>), EngineError> {
        let (mut engine, receiver) = Self::new(path);
        engine.start().await?;
        Ok((engine, receiver))
    }

    async fn start(&mut self) -> Result<(), EngineError> {
        let mut child = Command::new(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::SpawnError(e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::SpawnError("Failed to open stdin".into()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::SpawnError("Failed to open stdout".into()))?;

        let (control_tx, control) = mpsc::unbounded_channel();
        let searching: SearchSlot = Arc::new(Mutex::new(None));
        let alive = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_output(
            stdout,
            self.updates.clone(),
            control_tx,
            searching.clone(),
            alive.clone(),
        ));

        self.process = Some(Process {
            child,
            stdin,
            control,
            searching,
            alive,
            reader,
        });

        if let Err(e) = self.handshake().await {
            self.shutdown().await;
            return Err(e);
        }

        info!(path = %self.path, "engine started");
        Ok(())
    }

    async fn handshake(&mut self) -> Result<(), EngineError> {
        self.send("uci").await?;
        self.wait_for(Control::UciOk, HANDSHAKE_TIMEOUT).await?;
        self.apply_options().await
    }

    /// Sends a command to the engine
    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        let process = self.process.as_mut().ok_or(EngineError::NotRunning)?;
        debug!(command = cmd, "to engine");
        process.stdin.write_all(cmd.as_bytes()).await?;
        process.stdin.write_all(b"\n").await?;
        process.stdin.flush().await?;
        Ok(())
    }

    /// Throws away replies nobody waited for
    fn drain_control(&mut self) {
        if let Some(process) = self.process.as_mut() {
            while process.control.try_recv().is_ok() {}
        }
    }

    /// Waits until the reader routes back `expected`
    async fn wait_for(&mut self, expected: Control, limit: Duration) -> Result<(), EngineError> {
        let process = self.process.as_mut().ok_or(EngineError::NotRunning)?;

        let wait = async {
            while let Some(reply) = process.control.recv().await {
                if reply == expected {
                    return Ok(());
                }
            }
            Err(EngineError::ProtocolError("engine output closed".into()))
        };

        timeout(limit, wait)
            .await
            .map_err(|_| EngineError::Timeout(expected.name()))?
    }

    /// `isready` round trip
    async fn sync(&mut self) -> Result<(), EngineError> {
        self.drain_control();
        self.send("isready").await?;
        self.wait_for(Control::ReadyOk, HANDSHAKE_TIMEOUT).await
    }

    async fn apply_options(&mut self) -> Result<(), EngineError> {
        let options = self.options.clone();
        let commands = [
            format!("setoption name Threads value {}", options.threads),
            format!("setoption name Hash value {}", options.hash_mb),
            format!("setoption name MultiPV value {}", options.multi_pv),
            format!("setoption name Use NNUE value {}", options.use_nnue),
        ];

        for command in &commands {
            self.send(command).await?;
        }
        self.sync().await
    }

    fn searching(&self) -> Option<RequestFence> {
        self.process
            .as_ref()
            .and_then(|process| lock(&process.searching).clone())
    }

    /// Quit the engine, killing it if it does not exit promptly
    async fn shutdown(&mut self) {
        let Some(mut process) = self.process.take() else {
            return;
        };

        let _ = process.stdin.write_all(b"quit\n").await;
        let _ = process.stdin.flush().await;
        if timeout(QUIT_TIMEOUT, process.child.wait()).await.is_err() {
            let _ = process.child.start_kill();
            let _ = process.child.wait().await;
        }
        process.reader.abort();
        debug!(path = %self.path, "engine shut down");
    }
}

impl EngineSession for StockfishEngine {
    async fn configure(&mut self, options: &EngineOptions) -> Result<(), EngineError> {
        self.options = options.clone();
        if self.process.is_none() {
            return Ok(());
        }

        self.stop().await?;
        self.apply_options().await
    }

    async fn new_game(&mut self) -> Result<(), EngineError> {
        self.stop().await?;
        self.send("ucinewgame").await?;
        self.sync().await
    }

    async fn start_search(&mut self, fence: RequestFence, limit: SearchLimit) -> Result<(), EngineError> {
        // One search at a time
        self.stop().await?;

        let go = match limit {
            SearchLimit::Depth(depth) => format!("go depth {}", depth),
            SearchLimit::MoveTime(time) => format!("go movetime {}", time.as_millis()),
        };
        let position = format!("position fen {}", fence.fen);

        let process = self.process.as_ref().ok_or(EngineError::NotRunning)?;
        *lock(&process.searching) = Some(fence);

        let sent = async {
            self.send(&position).await?;
            self.send(&go).await
        }
        .await;

        if sent.is_err() {
            if let Some(process) = self.process.as_ref() {
                lock(&process.searching).take();
            }
        }
        sent
    }

    async fn stop(&mut self) -> Result<(), EngineError> {
        if self.searching().is_none() {
            return Ok(());
        }

        self.drain_control();
        self.send("stop").await?;
        let result = self.wait_for(Control::BestMove, STOP_TIMEOUT).await;

        if let Err(ref e) = result {
            warn!(error = %e, "engine did not acknowledge stop");
            if let Some(process) = self.process.as_ref() {
                lock(&process.searching).take();
            }
        }
        result
    }

    async fn restart(&mut self) -> bool {
        self.shutdown().await;
        match self.start().await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path, error = %e, "engine restart failed");
                false
            }
        }
    }

    fn is_alive(&self) -> bool {
        self.process
            .as_ref()
            .is_some_and(|process| process.alive.load(Ordering::SeqCst))
    }

    fn set_engine_path(&mut self, path: &str) {
        if self.path == path {
            return;
        }
        info!(from = %self.path, to = path, "engine path changed");
        self.path = path.to_string();
        if let Some(mut process) = self.process.take() {
            let _ = process.child.start_kill();
            process.reader.abort();
        }
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        if let Some(process) = self.process.as_mut() {
            let _ = process.child.start_kill();
            process.reader.abort();
        }
    }
}

fn lock(slot: &SearchSlot) -> MutexGuard<'_, Option<RequestFence>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Reads engine output until the pipe closes
async fn read_output(
    stdout: ChildStdout,
    updates: mpsc::UnboundedSender<EngineUpdate>,
    control: mpsc::UnboundedSender<Control>,
    searching: SearchSlot,
    alive: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(stdout).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "failed to read engine output");
                break;
            }
        };

        match parse_line(&line) {
            EngineMessage::UciOk => {
                let _ = control.send(Control::UciOk);
            }
            EngineMessage::ReadyOk => {
                let _ = control.send(Control::ReadyOk);
            }
            EngineMessage::Info(info) => {
                let fence = lock(&searching).clone();
                if let Some(fence) = fence {
                    let update = EngineUpdate {
                        fence,
                        kind: UpdateKind::Info(info),
                    };
                    if updates.send(update).is_err() {
                        break;
                    }
                }
            }
            EngineMessage::BestMove(best_move) => {
                let fence = lock(&searching).take();
                if let Some(fence) = fence {
                    let _ = updates.send(EngineUpdate {
                        fence,
                        kind: UpdateKind::Finished { best_move },
                    });
                }
                let _ = control.send(Control::BestMove);
            }
            EngineMessage::Other => {}
        }
    }

    alive.store(false, Ordering::SeqCst);
    debug!("engine output closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::uci::InfoLine;
    use shakmaty::fen::Fen;
    use shakmaty::{Chess, EnPassantMode};

    fn start_fence(id: u64) -> RequestFence {
        RequestFence {
            id,
            fen: Fen::from_position(&Chess::default(), EnPassantMode::Legal).to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_binary_is_not_alive() {
        let (mut engine, _updates) = StockfishEngine::new("./definitely-not-a-stockfish-binary");
        assert!(!engine.is_alive());
        assert!(!engine.restart().await);
        assert!(engine.stop().await.is_ok());
        assert!(matches!(
            engine.start_search(start_fence(1), SearchLimit::Depth(1)).await,
            Err(EngineError::NotRunning)
        ));
    }

    #[tokio::test]
    #[ignore] // Ignore by default - requires stockfish installed
    async fn test_stockfish_init() {
        let engine = StockfishEngine::launch("stockfish").await;
        assert!(engine.is_ok());
    }

    #[tokio::test]
    #[ignore]
    async fn test_analyze_starting_position() {
        let (mut engine, mut updates) = StockfishEngine::launch("stockfish").await.unwrap();
        let fence = start_fence(7);
        engine.analyze_fixed_depth(fence.clone(), 10).await.unwrap();

        let mut last_info: Option<InfoLine> = None;
        while let Some(update) = updates.recv().await {
            assert_eq!(update.fence, fence);
            match update.kind {
                UpdateKind::Info(info) => last_info = Some(info),
                UpdateKind::Finished { best_move } => {
                    assert!(best_move.is_some());
                    break;
                }
            }
        }

        let info = last_info.expect("engine reported no info lines");
        assert_eq!(info.depth, 10);
        assert!(!info.pv.is_empty());
    }
}
