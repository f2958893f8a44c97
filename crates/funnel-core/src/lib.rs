//! ============================================================================
//! FUNNEL-CORE: Lead Capture & Session Telemetry
//! ============================================================================
//! This crate handles all backend logic for the consultancy funnel:
//! - Persistence gateway with hosted-backend priority and local fallback
//! - Session telemetry accumulation with ordered best-effort sync
//! - Admin session handling and dashboard aggregation
//! - Booking/lead email notifications and the health-check endpoint
//! ============================================================================

pub mod auth;
pub mod backend;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod gateway;
pub mod health;
pub mod notify;
pub mod store;
pub mod telemetry;
pub mod types;

// Re-export main types for convenience
pub use types::*;
pub use auth::AdminAuth;
pub use backend::{BackendError, PostgrestClient, RemoteStore};
pub use clock::{Clock, SystemClock};
pub use config::FunnelConfig;
pub use gateway::{GatewayError, PersistenceGateway};
pub use health::HealthServer;
pub use notify::EmailNotifier;
pub use store::{LocalStore, StorageError};
pub use telemetry::{
    CtaZone, HandshakeKind, SessionRecord, TelemetryContext, TelemetrySession, Visibility,
};
