//! ============================================================================
//! Persistence Gateway - Hosted backend first, local store as fallback
//! ============================================================================
//! Routing for every operation:
//! 1. Backend unavailable (not configured) -> local store directly
//! 2. Otherwise try the backend and return its result on success
//! 3. On backend failure:
//!    - reads and creates log a warning and fall back to the local store
//!    - status updates and deletes propagate the error
//!
//! A remote update/delete that matches no row is applied to the local store,
//! since the lead may have been saved there during an earlier outage.
//!
//! Local store failures surface as `GatewayError::Storage`. A local list that
//! no longer decodes is reported, never replaced: list reads show it as empty
//! while every write touching it fails.
//! ============================================================================

use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{BackendError, PostgrestClient, RemoteStore};
use crate::clock::{Clock, SystemClock};
use crate::config::FunnelConfig;
use crate::store::{LocalStore, StorageError, ANALYTICS_LOG_KEY, BOOKINGS_KEY, LEADS_KEY};
use crate::telemetry::SessionRecord;
use crate::types::{Booking, BookingInput, Lead, LeadInput, LeadStatus, NewLead};

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote backend error: {0}")]
    Remote(#[from] BackendError),

    #[error("Local storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// CRUD entry point used by the form, booking calendar and admin dashboard
pub struct PersistenceGateway {
    remote: Option<Arc<dyn RemoteStore>>,
    store: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
}

impl PersistenceGateway {
    /// Create a gateway. `remote = None` means local-only mode.
    pub fn new(store: Arc<LocalStore>, remote: Option<Arc<dyn RemoteStore>>) -> Self {
        Self::with_clock(store, remote, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            remote,
            store,
            clock,
        }
    }

    /// Gateway wired to the configured backend (if available)
    pub fn from_config(config: &FunnelConfig, store: Arc<LocalStore>) -> Self {
        let remote = PostgrestClient::from_config(config)
            .map(|client| Arc::new(client) as Arc<dyn RemoteStore>);
        if remote.is_none() {
            info!("Backend not configured - persistence is local-only");
        }
        Self::new(store, remote)
    }

    /// The backend availability flag this gateway routes on
    pub fn backend_available(&self) -> bool {
        self.remote.is_some()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// All leads, newest first
    pub async fn get_leads(&self) -> Result<Vec<Lead>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.fetch_leads().await {
                Ok(leads) => return Ok(leads),
                Err(e) => warn!("Lead fetch failed, falling back to local store: {}", e),
            }
        }
        Ok(self.store.read_list_lenient(LEADS_KEY)?)
    }

    /// All session records, newest session first
    pub async fn get_analytics(&self) -> Result<Vec<SessionRecord>, GatewayError> {
        if let Some(remote) = &self.remote {
            match remote.fetch_analytics().await {
                Ok(records) => return Ok(records),
                Err(e) => warn!("Analytics fetch failed, falling back to local store: {}", e),
            }
        }
        let mut records: Vec<SessionRecord> = self.store.read_list_lenient(ANALYTICS_LOG_KEY)?;
        records.sort_by(|a, b| b.session_start.cmp(&a.session_start));
        Ok(records)
    }

    // ========================================================================
    // Creates (always fall back locally)
    // ========================================================================

    pub async fn save_lead(&self, input: LeadInput) -> Result<Lead, GatewayError> {
        input.validate().map_err(GatewayError::InvalidInput)?;
        let new_lead = NewLead::from_input(input, self.clock.now());

        if let Some(remote) = &self.remote {
            match remote.insert_lead(&new_lead).await {
                Ok(saved) => {
                    info!("Lead {} saved to backend", saved.session_id);
                    return Ok(saved);
                }
                Err(e) => warn!(
                    "Lead insert failed, saving {} locally: {}",
                    new_lead.session_id, e
                ),
            }
        }

        let lead = new_lead.with_id(Uuid::new_v4().to_string());
        self.store.prepend(LEADS_KEY, lead.clone())?;
        info!("Lead {} saved locally as {}", lead.session_id, lead.id);
        Ok(lead)
    }

    pub async fn save_booking(&self, input: BookingInput) -> Result<Booking, GatewayError> {
        let booking = input.into_booking(self.clock.now());

        if let Some(remote) = &self.remote {
            match remote.insert_booking(&booking).await {
                Ok(saved) => {
                    info!("Booking for {} saved to backend", saved.session_id);
                    return Ok(saved);
                }
                Err(e) => warn!(
                    "Booking insert failed, saving {} locally: {}",
                    booking.session_id, e
                ),
            }
        }

        let booking = Booking {
            id: Some(Uuid::new_v4().to_string()),
            ..booking
        };
        self.store.prepend(BOOKINGS_KEY, booking.clone())?;
        info!("Booking for {} saved locally", booking.session_id);
        Ok(booking)
    }

    // ========================================================================
    // Admin mutations (propagate backend errors)
    // ========================================================================

    /// Set a lead's status. Unknown ids are a no-op.
    pub async fn update_lead_status(
        &self,
        id: &str,
        status: LeadStatus,
    ) -> Result<(), GatewayError> {
        if let Some(remote) = &self.remote {
            if remote.update_lead_status(id, status).await? {
                return Ok(());
            }
            debug!("Lead {} not found in backend, trying local store", id);
        }

        let mut leads: Vec<Lead> = self.store.read_list(LEADS_KEY)?;
        let mut found = false;
        for lead in leads.iter_mut().filter(|l| l.id == id) {
            lead.status = status;
            found = true;
        }
        if found {
            self.store.write_list(LEADS_KEY, &leads)?;
            debug!("Updated local lead {} to {}", id, status);
        } else {
            debug!("Lead {} not found, status update ignored", id);
        }
        Ok(())
    }

    /// Delete a lead. Unknown ids are a no-op.
    pub async fn delete_lead(&self, id: &str) -> Result<(), GatewayError> {
        if let Some(remote) = &self.remote {
            if remote.delete_lead(id).await? {
                return Ok(());
            }
            debug!("Lead {} not found in backend, trying local store", id);
        }

        let mut leads: Vec<Lead> = self.store.read_list(LEADS_KEY)?;
        let before = leads.len();
        leads.retain(|l| l.id != id);
        if leads.len() != before {
            self.store.write_list(LEADS_KEY, &leads)?;
            debug!("Deleted local lead {}", id);
        }
        Ok(())
    }
}
