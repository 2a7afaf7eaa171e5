//! Analysis settings
//!
//! Settings are read from a TOML file; every field has a default so a file
//! only needs the values it changes:
//!
//! ```toml
//! engine_path = "/usr/local/bin/stockfish"
//!
//! [analyse]
//! threads = 4
//! movetime_ms = 1500
//!
//! [manual]
//! depth = 30
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::engine::EngineOptions;
use crate::error::Result;

/// Overrides `engine_path` when set
pub const ENGINE_PATH_ENV: &str = "CHESS_REPLAY_ENGINE";

/// Engine settings for one of the scan stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub threads: u32,
    pub hash_mb: u32,
    pub multi_pv: u32,
    pub use_nnue: bool,
    /// Search time per ply
    pub movetime_ms: u64,
}

impl ScanSettings {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            threads: self.threads,
            hash_mb: self.hash_mb,
            multi_pv: self.multi_pv,
            use_nnue: self.use_nnue,
        }
    }

    pub fn movetime(&self) -> Duration {
        Duration::from_millis(self.movetime_ms)
    }

    /// Quick forward scan
    pub fn preview() -> Self {
        Self {
            threads: 1,
            hash_mb: 16,
            multi_pv: 1,
            use_nnue: false,
            movetime_ms: 100,
        }
    }

    /// Slower backward scan
    pub fn analyse() -> Self {
        Self {
            threads: 2,
            hash_mb: 64,
            multi_pv: 1,
            use_nnue: true,
            movetime_ms: 1000,
        }
    }
}

/// A partially specified scan section; missing fields keep the stage's own
/// defaults rather than a shared one
#[derive(Deserialize)]
struct ScanPatch {
    threads: Option<u32>,
    hash_mb: Option<u32>,
    multi_pv: Option<u32>,
    use_nnue: Option<bool>,
    movetime_ms: Option<u64>,
}

impl ScanPatch {
    fn apply(self, base: ScanSettings) -> ScanSettings {
        ScanSettings {
            threads: self.threads.unwrap_or(base.threads),
            hash_mb: self.hash_mb.unwrap_or(base.hash_mb),
            multi_pv: self.multi_pv.unwrap_or(base.multi_pv),
            use_nnue: self.use_nnue.unwrap_or(base.use_nnue),
            movetime_ms: self.movetime_ms.unwrap_or(base.movetime_ms),
        }
    }
}

fn preview_section<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<ScanSettings, D::Error> {
    Ok(ScanPatch::deserialize(deserializer)?.apply(ScanSettings::preview()))
}

fn analyse_section<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<ScanSettings, D::Error> {
    Ok(ScanPatch::deserialize(deserializer)?.apply(ScanSettings::analyse()))
}

/// Engine settings for interactive analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualSettings {
    pub threads: u32,
    pub hash_mb: u32,
    pub multi_pv: u32,
    pub use_nnue: bool,
    pub depth: u32,
    /// Wall-clock limit after which the engine is presumed hung
    pub timeout_ms: u64,
}

impl ManualSettings {
    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            threads: self.threads,
            hash_mb: self.hash_mb,
            multi_pv: self.multi_pv,
            use_nnue: self.use_nnue,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ManualSettings {
    fn default() -> Self {
        Self {
            threads: 2,
            hash_mb: 128,
            multi_pv: 3,
            use_nnue: true,
            depth: 22,
            timeout_ms: 30_000,
        }
    }
}

/// Everything the orchestrator can be tuned with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisSettings {
    pub engine_path: String,
    #[serde(deserialize_with = "preview_section")]
    pub preview: ScanSettings,
    #[serde(deserialize_with = "analyse_section")]
    pub analyse: ScanSettings,
    pub manual: ManualSettings,
    /// Pause after `stop` and `ucinewgame` before the next command
    pub settle_delay_ms: u64,
    /// Engine restarts tried when an interactive search yields nothing
    pub max_restart_attempts: u32,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            engine_path: "stockfish".to_string(),
            preview: ScanSettings::preview(),
            analyse: ScanSettings::analyse(),
            manual: ManualSettings::default(),
            settle_delay_ms: 50,
            max_restart_attempts: 2,
        }
    }
}

impl AnalysisSettings {
    /// Reads settings from a TOML file, then applies the environment override
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let settings = Self::from_toml(&contents)?;
        Ok(settings.with_env_override())
    }

    /// Like [`AnalysisSettings::load`], but falls back to defaults when the
    /// file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default().with_env_override())
        }
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn with_env_override(mut self) -> Self {
        if let Ok(path) = std::env::var(ENGINE_PATH_ENV) {
            if !path.trim().is_empty() {
                self.engine_path = path;
            }
        }
        self
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Whether a change from `self` to `other` invalidates scan scores
    pub fn scan_changed(&self, other: &Self) -> bool {
        self.engine_path != other.engine_path
            || self.preview != other.preview
            || self.analyse != other.analyse
    }

    pub fn manual_changed(&self, other: &Self) -> bool {
        self.manual != other.manual
    }
}
