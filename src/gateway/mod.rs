pub mod handlers;
pub mod state;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::service::WalletService;
use state::AppState;

/// Start the seamless-wallet HTTP gateway. Provider endpoints rely on network
/// isolation; there is no auth middleware on this surface.
pub async fn run_server(host: &str, port: u16, service: Arc<WalletService>) {
    let state = Arc::new(AppState::new(service));

    let seamless_routes = Router::new()
        .route("/checkBalance", post(handlers::check_balance))
        .route("/placeBets", post(handlers::place_bets))
        .route("/settleBets", post(handlers::settle_bets))
        .route("/winRewards", post(handlers::win_rewards))
        .route("/placeTips", post(handlers::place_tips))
        .route("/adjustBets", post(handlers::adjust_bets))
        .route("/adjustBalance", post(handlers::adjust_balance))
        .route("/cancelBets", post(handlers::cancel_bets))
        .route("/cancelTips", post(handlers::cancel_tips))
        .route("/rollback", post(handlers::rollback))
        .route("/voidSettled", post(handlers::void_settled));

    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/seamless", seamless_routes);

    // [SECURITY] Mock API routes - only compiled when 'mock-api' feature is
    // enabled. Production builds MUST be compiled with `--no-default-features`
    // to exclude this.
    #[cfg(feature = "mock-api")]
    let app = app.nest(
        "/internal/mock",
        Router::new()
            .route("/account", post(handlers::mock::seed_account))
            .route("/block", post(handlers::mock::block_account))
            .route("/game", post(handlers::mock::register_game)),
    );

    let app = app.with_state(state);

    let addr = format!("{}:{}", host, port);
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            eprintln!("❌ FATAL: Failed to bind to {}: {}", addr, e);
            eprintln!(
                "   Hint: Port {} may already be in use. Check with: lsof -i :{}",
                port, port
            );
            std::process::exit(1);
        }
    };

    println!("🚀 Wallet gateway listening on http://{}", addr);
    println!("📂 Provider API: /seamless/*");

    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("❌ FATAL: Server error: {}", e);
        std::process::exit(1);
    }
}
