//! ============================================================================
//! Backend Module - Hosted database access
//! ============================================================================
//! `RemoteStore` is the seam between the gateway/telemetry and the hosted
//! backend. `PostgrestClient` talks to a Supabase-style PostgREST API.
//! ============================================================================

mod postgrest;

#[cfg(test)]
pub(crate) mod fake;

pub use postgrest::{PostgrestClient, ANALYTICS_TABLE, BOOKINGS_TABLE, LEADS_TABLE};

use async_trait::async_trait;

use crate::telemetry::{SessionRecord, SessionUpdate};
use crate::types::{Booking, Lead, LeadStatus, NewLead};

/// Any failure talking to the hosted backend. Callers treat transient and
/// permanent failures alike.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BackendError {
    #[error("Backend unreachable: {0}")]
    Transport(String),

    #[error("Backend rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Failed to decode backend response: {0}")]
    Decode(String),
}

/// Operations the funnel needs from the hosted backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// All leads, newest first
    async fn fetch_leads(&self) -> Result<Vec<Lead>, BackendError>;

    /// All session records, newest session first
    async fn fetch_analytics(&self) -> Result<Vec<SessionRecord>, BackendError>;

    /// Insert a lead and return the stored row (with its assigned id)
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, BackendError>;

    async fn insert_booking(&self, booking: &Booking) -> Result<Booking, BackendError>;

    /// Returns whether a row matched `id`
    async fn update_lead_status(&self, id: &str, status: LeadStatus)
        -> Result<bool, BackendError>;

    /// Returns whether a row matched `id`
    async fn delete_lead(&self, id: &str) -> Result<bool, BackendError>;

    /// Register a new session row
    async fn insert_session(&self, record: &SessionRecord) -> Result<(), BackendError>;

    async fn update_session(
        &self,
        visitor_id: &str,
        update: &SessionUpdate,
    ) -> Result<(), BackendError>;

    /// Insert-or-merge the finalized session row keyed by visitor id
    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), BackendError>;
}
