use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use chess_replay_core::{spawn, AnalysisSettings, OrchestratorHandle, StockfishEngine};

mod routes;

const SETTINGS_FILE: &str = "analyzer.toml";

pub struct AppState {
    pub analysis: OrchestratorHandle,
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/state", get(routes::analysis::current_state))
        .route(
            "/game",
            post(routes::analysis::load_game).delete(routes::analysis::clear_game),
        )
        .route("/navigate", post(routes::analysis::navigate))
        .route("/biggest-change", post(routes::analysis::biggest_change))
        .route("/variation", post(routes::analysis::enter_variation))
        .route("/move", post(routes::analysis::play_move))
        .route("/return", post(routes::analysis::return_to_game))
        .route("/settings", put(routes::analysis::update_settings))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

#[tokio::main]
async fn main() {
    // Honors RUST_LOG, e.g. RUST_LOG=chess_replay_core=debug,tower_http=debug
    tracing_subscriber::fmt::init();

    let settings = AnalysisSettings::load_or_default(SETTINGS_FILE).expect("Failed to load settings");
    let (engine, updates) = StockfishEngine::new(settings.engine_path.clone());
    let (analysis, _task) = spawn(engine, updates, settings);

    let state = Arc::new(AppState { analysis });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000")
        .await
        .unwrap();

    println!("Server running at http://localhost:3000");

    axum::serve(listener, app(state)).await.unwrap();
}
