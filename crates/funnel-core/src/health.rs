//! ============================================================================
//! Health Server - Stand-alone status endpoint
//! ============================================================================
//! One route: `GET /health` returns a fixed JSON status payload. Everything
//! else is a 404. Blocking tiny_http server; run it on its own thread.
//! ============================================================================

use anyhow::{anyhow, Result};
use chrono::Utc;
use std::net::SocketAddr;
use tiny_http::{Header, Method, Request, Response, Server};
use tracing::{debug, info, warn};

pub const HEALTH_MESSAGE: &str = "Funnel API gateway is active";
pub const HEALTH_ENGINE: &str = "FUNNEL_CORE_V1";

pub struct HealthServer {
    server: Server,
}

impl HealthServer {
    /// Bind to `addr` (use port 0 for an ephemeral port)
    pub fn bind(addr: &str) -> Result<Self> {
        let server = Server::http(addr)
            .map_err(|e| anyhow!("Failed to start health server on {}: {}", addr, e))?;
        Ok(Self { server })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }

    /// Serve requests until the listener fails
    pub fn serve(&self) -> Result<()> {
        if let Some(addr) = self.local_addr() {
            info!("Health server listening on {}", addr);
        }
        loop {
            self.handle_next()?;
        }
    }

    /// Block for one request and answer it
    pub fn handle_next(&self) -> Result<()> {
        let request = self
            .server
            .recv()
            .map_err(|e| anyhow!("Health server error: {}", e))?;
        respond(request)
    }
}

/// Status payload returned by `GET /health`
pub fn health_payload() -> serde_json::Value {
    serde_json::json!({
        "status": "OK",
        "message": HEALTH_MESSAGE,
        "timestamp": Utc::now().to_rfc3339(),
        "engine": HEALTH_ENGINE,
    })
}

fn respond(request: Request) -> Result<()> {
    let path = request.url().split('?').next().unwrap_or("").to_string();
    debug!("{} {}", request.method(), path);

    let (status, body) = match (request.method(), path.as_str()) {
        (Method::Get, "/health") => (200, health_payload()),
        _ => (404, serde_json::json!({ "error": "Not found" })),
    };

    let response = Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(header("Content-Type", "application/json")?)
        .with_header(header("Access-Control-Allow-Origin", "*")?);

    if let Err(e) = request.respond(response) {
        warn!("Failed to write health response: {}", e);
    }
    Ok(())
}

fn header(name: &str, value: &str) -> Result<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes())
        .map_err(|_| anyhow!("Invalid header {}: {}", name, value))
}
