//! Ruster Swap API Server
//!
//! REST API for Uniswap V3 quotes, approvals, swap building and simulation on Base
//!
//! Usage:
//!   cargo run --bin ruster_swap_api
//!
//! Environment:
//!   RUSTER_PORT          - Server port (default: 8080, `PORT` takes precedence)
//!   RUSTER_HOST          - Server host (default: 0.0.0.0)
//!   RUSTER_RPC_URLS      - Comma separated RPC endpoints in priority order
//!   ALCHEMY_API_KEY      - Alchemy key, used when no RPC URLs are given
//!   RUST_LOG             - Log filter (default: info)

use ruster_swap::api::{create_router, AppState};
use ruster_swap::utils::telemetry::TelemetryCollector;
use ruster_swap::SwapConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> eyre::Result<()> {
    FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = SwapConfig::from_env()?;

    let telemetry = Arc::new(TelemetryCollector::new());
    let telemetry_for_shutdown = telemetry.clone();

    let state = Arc::new(AppState::from_config(config, telemetry)?);
    let app = create_router(state);

    // Railway uses PORT, RUSTER_PORT for local dev
    let host = std::env::var("RUSTER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = std::env::var("PORT")
        .or_else(|_| std::env::var("RUSTER_PORT"))
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;

    info!("🚀 Ruster Swap API starting on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /v1/get-quote        - Best quote across fee tiers");
    info!("  POST /v1/build-approval   - Unsigned ERC20 approval");
    info!("  POST /v1/check-approval   - Current allowance");
    info!("  POST /v1/build-swap       - Unsigned exactInputSingle swap");
    info!("  POST /v1/simulate         - Dry run a transaction");
    info!("  GET  /v1/rpc-health       - RPC provider probes");
    info!("  GET  /v1/stats            - Engine statistics");
    info!("  GET  /v1/health           - Health check");

    let listener = TcpListener::bind(addr).await?;

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("⚠️ Failed to listen for Ctrl+C: {}", e);
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("🛑 Shutdown signal received, cleaning up...");

    let stats = telemetry_for_shutdown.get_stats();
    info!("   Quotes served: {}", stats.quotes_served);
    info!("   Simulations failed: {}", stats.simulations_failed);
    info!("   Swaps completed: {}", stats.swaps_completed);

    match telemetry_for_shutdown.export_stats_json() {
        Ok(path) => info!("   ✅ Stats exported to: {}", path.display()),
        Err(e) => warn!("   ⚠️ Failed to export stats: {}", e),
    }

    info!("👋 Ruster Swap API shutdown complete");

    Ok(())
}
