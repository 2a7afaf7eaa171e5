//! Runs a PGN game through every analysis stage and prints the scores

use std::process::exit;

use chess_replay_core::engine::Score;
use chess_replay_core::orchestrator::{find_biggest_change_move, merged_score};
use chess_replay_core::parser::parse_pgn_file;
use chess_replay_core::{spawn, AnalysisSettings, AnalysisStage, AnalysisState, Command, History, StockfishEngine};
use tokio::time::timeout;
use tracing_subscriber::EnvFilter;

const SETTINGS_FILE: &str = "analyzer.toml";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let path = args.next().unwrap_or_else(|| {
        eprintln!("Usage: replay <file.pgn> [--json]");
        exit(1);
    });
    let json = args.any(|arg| arg == "--json");

    let game = match parse_pgn_file(&path) {
        Ok(games) => games.into_iter().next(),
        Err(e) => {
            eprintln!("Failed to read {}: {}", path, e);
            exit(1);
        }
    };
    let Some(game) = game else {
        eprintln!("No games in {}", path);
        exit(1);
    };

    eprintln!("{}", game.summary());
    let valid = History::build(&game.moves).valid_moves.len();
    if valid == 0 {
        eprintln!("Game has no playable moves");
        exit(1);
    }

    let settings = AnalysisSettings::load_or_default(SETTINGS_FILE).expect("Failed to load settings");
    let manual_budget = settings.manual.timeout() * (settings.max_restart_attempts + 2);
    let (engine, updates) = StockfishEngine::new(settings.engine_path.clone());
    let (handle, task) = spawn(engine, updates, settings);

    handle
        .send(Command::Load(game.into()))
        .await
        .expect("Analysis task stopped");

    let mut state = handle.subscribe();
    state
        .wait_for(|s| s.stage == AnalysisStage::Manual && s.moves.len() == valid)
        .await
        .expect("Analysis task stopped");

    let finished = timeout(
        manual_budget,
        state.wait_for(|s| s.live.as_ref().is_some_and(|live| live.finished)),
    )
    .await
    .is_ok_and(|result| result.is_ok());
    if !finished {
        eprintln!("Engine produced no final result for the current position");
    }

    let snapshot = state.borrow().clone();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot).expect("Failed to encode state"));
    } else {
        print_report(&snapshot);
    }

    let _ = handle.shutdown().await;
    let _ = task.await;
}

fn move_label(state: &AnalysisState, index: usize) -> String {
    let dots = if index % 2 == 0 { "." } else { "..." };
    format!("{}{} {}", index / 2 + 1, dots, state.moves[index])
}

fn cell(score: Option<&Score>) -> String {
    score.map_or_else(|| "-".to_string(), |score| score.to_string())
}

fn print_report(state: &AnalysisState) {
    println!("{:<16} {:>8} {:>8}", "Move", "Preview", "Analyse");
    for index in 0..state.move_count() {
        println!(
            "{:<16} {:>8} {:>8}",
            move_label(state, index),
            cell(state.preview_scores.get(&index)),
            cell(state.analyse_scores.get(&index)),
        );
    }

    if let Some(invalid) = &state.invalid_move {
        println!("\nStopped at move {}: \"{}\" is not playable", invalid.index + 1, invalid.token);
    }

    match find_biggest_change_move(&state.preview_scores, &state.analyse_scores) {
        Some(index) => {
            let before = merged_score(&state.preview_scores, &state.analyse_scores, index - 1);
            let after = merged_score(&state.preview_scores, &state.analyse_scores, index);
            if let (Some(before), Some(after)) = (before, after) {
                println!(
                    "\nBiggest change: {} ({:+.2} -> {:+.2})",
                    move_label(state, index),
                    before,
                    after
                );
            }
        }
        None => println!("\nNo evaluation changes recorded"),
    }

    if let Some(live) = state.current_result() {
        println!("\nEngine lines at the current position:");
        for line in &live.lines {
            println!("  {}", line.summary());
        }
    }
}
