//! ============================================================================
//! Telemetry Module - Per-session behavioral tracking
//! ============================================================================
//! One `TelemetrySession` per visitor session accumulates CTA clicks, funnel
//! progress, per-step dwell time and escalation handshakes.
//!
//! ## Lifecycle
//! ```text
//! init ──► restore from local store ──────────────┐
//!     └──► new record ─► persist ─► register sync ─┤
//!                                                  ▼
//!          mutators: update record ─► persist ─► enqueue update sync
//!                                                  ▼
//!          page hidden ─► flush: duration + exit page ─► enqueue upsert
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use funnel_core::telemetry::{TelemetryContext, TelemetrySession, CtaZone, Visibility};
//!
//! let mut session = TelemetrySession::init(TelemetryContext::new(Some(store), remote), "/");
//! session.log_cta_click(CtaZone::Hero);
//! session.update_form_progress(1);
//! session.on_visibility_change(Visibility::Hidden);
//! session.shutdown(Duration::from_secs(2)).await;
//! ```
//! ============================================================================

mod session;
mod sync;
mod types;

use std::sync::Arc;

use crate::backend::RemoteStore;
use crate::clock::{Clock, SystemClock};
use crate::store::LocalStore;

pub use session::TelemetrySession;
pub use types::{
    CtaClicks, CtaZone, HandshakeKind, SessionRecord, SessionUpdate, Visibility,
};

/// Funnel step holding the budget selection
pub const DEFAULT_PRICING_STEP: u32 = 4;

/// Dwell time on the pricing step beyond which a visitor is pricing-sensitive
pub const DEFAULT_PRICING_THRESHOLD_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    pub pricing_step: u32,
    pub pricing_threshold_secs: u64,
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            pricing_step: DEFAULT_PRICING_STEP,
            pricing_threshold_secs: DEFAULT_PRICING_THRESHOLD_SECS,
        }
    }
}

/// Everything a session needs from its host
pub struct TelemetryContext {
    /// Durable local storage; None runs the session in memory only
    pub store: Option<Arc<LocalStore>>,
    /// Remote analytics store; None disables remote sync
    pub remote: Option<Arc<dyn RemoteStore>>,
    pub clock: Arc<dyn Clock>,
    pub settings: TelemetrySettings,
}

impl TelemetryContext {
    pub fn new(store: Option<Arc<LocalStore>>, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self {
            store,
            remote,
            clock: Arc::new(SystemClock),
            settings: TelemetrySettings::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: TelemetrySettings) -> Self {
        self.settings = settings;
        self
    }
}
