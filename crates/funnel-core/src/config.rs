//! ============================================================================
//! Funnel Configuration - Environment-driven settings
//! ============================================================================
//! All settings come from the process environment (binaries load `.env`
//! first via dotenvy). Missing backend credentials are not an error: they
//! switch the gateway and telemetry into local-only mode.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default port for the health-check server
pub const DEFAULT_PORT: u16 = 3000;

/// Default timeout for hosted-backend requests
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 10;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelConfig {
    /// Hosted backend endpoint (Supabase project URL)
    pub backend_url: String,
    /// Hosted backend access key (anon key)
    pub backend_key: String,
    pub backend_timeout_secs: u64,
    /// Local store path override
    pub db_path: Option<String>,
    pub port: u16,
    /// Hex-encoded SHA-256 of the admin password
    pub admin_password_sha256: Option<String>,
    // Email notifications (Resend)
    pub resend_api_key: Option<String>,
    pub notify_to_email: Option<String>,
    pub email_from_address: String,
    pub email_from_name: String,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            backend_key: String::new(),
            backend_timeout_secs: DEFAULT_BACKEND_TIMEOUT_SECS,
            db_path: None,
            port: DEFAULT_PORT,
            admin_password_sha256: None,
            resend_api_key: None,
            notify_to_email: None,
            email_from_address: "bookings@localhost".to_string(),
            email_from_name: "Funnel".to_string(),
        }
    }
}

impl FunnelConfig {
    /// Read configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            backend_url: env_string("SUPABASE_URL").unwrap_or_default(),
            backend_key: env_string("SUPABASE_ANON_KEY").unwrap_or_default(),
            backend_timeout_secs: env_string("BACKEND_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.backend_timeout_secs),
            db_path: env_string("FUNNEL_DB_PATH"),
            port: env_string("PORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            admin_password_sha256: env_string("ADMIN_PASSWORD_SHA256"),
            resend_api_key: env_string("RESEND_API_KEY"),
            notify_to_email: env_string("NOTIFY_TO_EMAIL"),
            email_from_address: env_string("EMAIL_FROM_ADDRESS")
                .unwrap_or(defaults.email_from_address),
            email_from_name: env_string("EMAIL_FROM_NAME").unwrap_or(defaults.email_from_name),
        }
    }

    /// Backend availability flag: both credentials present and the endpoint
    /// looks like an HTTP(S) URL.
    pub fn backend_available(&self) -> bool {
        !self.backend_url.is_empty()
            && !self.backend_key.is_empty()
            && self.backend_url.starts_with("http")
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }
}

/// Non-empty, trimmed environment value
fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
