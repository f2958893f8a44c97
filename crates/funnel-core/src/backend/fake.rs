//! In-memory `RemoteStore` with failure injection for gateway/telemetry tests.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{BackendError, RemoteStore};
use crate::telemetry::{SessionRecord, SessionUpdate};
use crate::types::{Booking, Lead, LeadStatus, NewLead};

/// One observed session call, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum SessionCall {
    Insert(SessionRecord),
    Update(String, SessionUpdate),
    Upsert(SessionRecord),
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    pub(crate) leads: Mutex<Vec<Lead>>,
    pub(crate) bookings: Mutex<Vec<Booking>>,
    pub(crate) sessions: Mutex<Vec<SessionRecord>>,
    pub(crate) session_calls: Mutex<Vec<SessionCall>>,
    /// Every call fails with a rejection
    pub(crate) failing: AtomicBool,
    /// Per-`form_progress` delay applied to session updates
    pub(crate) update_delays: Mutex<Vec<(u32, Duration)>>,
}

impl FakeBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn failing() -> Self {
        let fake = Self::default();
        fake.set_failing(true);
        fake
    }

    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn delay_update_at(&self, form_progress: u32, delay: Duration) {
        self.update_delays
            .lock()
            .unwrap()
            .push((form_progress, delay));
    }

    pub(crate) fn calls(&self) -> Vec<SessionCall> {
        self.session_calls.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), BackendError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BackendError::Rejected {
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FakeBackend {
    async fn fetch_leads(&self) -> Result<Vec<Lead>, BackendError> {
        self.check()?;
        let mut leads = self.leads.lock().unwrap().clone();
        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    async fn fetch_analytics(&self) -> Result<Vec<SessionRecord>, BackendError> {
        self.check()?;
        let mut sessions = self.sessions.lock().unwrap().clone();
        sessions.sort_by(|a, b| b.session_start.cmp(&a.session_start));
        Ok(sessions)
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, BackendError> {
        self.check()?;
        let mut leads = self.leads.lock().unwrap();
        let saved = lead.clone().with_id(format!("remote-{}", leads.len() + 1));
        leads.push(saved.clone());
        Ok(saved)
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<Booking, BackendError> {
        self.check()?;
        let mut bookings = self.bookings.lock().unwrap();
        let mut saved = booking.clone();
        saved.id = Some(format!("booking-{}", bookings.len() + 1));
        bookings.push(saved.clone());
        Ok(saved)
    }

    async fn update_lead_status(
        &self,
        id: &str,
        status: LeadStatus,
    ) -> Result<bool, BackendError> {
        self.check()?;
        let mut leads = self.leads.lock().unwrap();
        let mut matched = false;
        for lead in leads.iter_mut().filter(|l| l.id == id) {
            lead.status = status;
            matched = true;
        }
        Ok(matched)
    }

    async fn delete_lead(&self, id: &str) -> Result<bool, BackendError> {
        self.check()?;
        let mut leads = self.leads.lock().unwrap();
        let before = leads.len();
        leads.retain(|l| l.id != id);
        Ok(leads.len() != before)
    }

    async fn insert_session(&self, record: &SessionRecord) -> Result<(), BackendError> {
        self.check()?;
        self.session_calls
            .lock()
            .unwrap()
            .push(SessionCall::Insert(record.clone()));
        self.sessions.lock().unwrap().push(record.clone());
        Ok(())
    }

    async fn update_session(
        &self,
        visitor_id: &str,
        update: &SessionUpdate,
    ) -> Result<(), BackendError> {
        let delay = self
            .update_delays
            .lock()
            .unwrap()
            .iter()
            .find(|(step, _)| *step == update.form_progress)
            .map(|(_, d)| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check()?;
        self.session_calls
            .lock()
            .unwrap()
            .push(SessionCall::Update(visitor_id.to_string(), update.clone()));
        Ok(())
    }

    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), BackendError> {
        self.check()?;
        self.session_calls
            .lock()
            .unwrap()
            .push(SessionCall::Upsert(record.clone()));
        let mut sessions = self.sessions.lock().unwrap();
        sessions.retain(|s| s.visitor_id != record.visitor_id);
        sessions.push(record.clone());
        Ok(())
    }
}
