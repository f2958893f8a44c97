// ============================================================================
// funnel-health - stand-alone health-check server
// ============================================================================
// Serves `GET /health` on 0.0.0.0:$PORT (default 3000).
// ============================================================================

use anyhow::Result;
use funnel_core::{FunnelConfig, HealthServer};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("funnel_core=info".parse()?))
        .init();

    let config = FunnelConfig::from_env();
    let server = HealthServer::bind(&format!("0.0.0.0:{}", config.port))?;
    server.serve()
}
