//! ============================================================================
//! Telemetry Session - Accumulator for one visitor session
//! ============================================================================
//! Every mutator updates the in-memory record, writes the full record to the
//! local store and enqueues a remote partial update. Nothing here returns an
//! error: local storage failures degrade the session to memory-only and
//! remote failures are logged by the sync worker.
//! ============================================================================

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::sync::{SyncOp, SyncQueue};
use super::types::{CtaZone, HandshakeKind, SessionRecord, Visibility};
use super::{TelemetryContext, TelemetrySettings};
use crate::clock::Clock;
use crate::store::{LocalStore, StorageError, ANALYTICS_LOG_KEY, CURRENT_SESSION_KEY};

pub struct TelemetrySession {
    record: SessionRecord,
    store: Option<Arc<LocalStore>>,
    sync: SyncQueue,
    clock: Arc<dyn Clock>,
    settings: TelemetrySettings,
    /// Step the visitor is currently on (may be below form_progress after
    /// back-navigation)
    active_step: u32,
    step_started: DateTime<Utc>,
    current_page: String,
    flushed: bool,
}

impl TelemetrySession {
    /// Restore this client's session from the local store, or start a new one
    pub fn init(context: TelemetryContext, page: &str) -> Self {
        let TelemetryContext {
            mut store,
            remote,
            clock,
            settings,
        } = context;

        let sync = match remote {
            Some(remote) => SyncQueue::spawn(remote),
            None => SyncQueue::disabled(),
        };

        let stored = store
            .as_ref()
            .map(|local| local.read_json::<SessionRecord>(CURRENT_SESSION_KEY));
        let restored = match stored {
            Some(Ok(record)) => record,
            Some(Err(StorageError::Corrupt { message, .. })) => {
                warn!("Discarding undecodable stored session: {}", message);
                None
            }
            Some(Err(e)) => {
                warn!("Telemetry local store unreadable, running in memory: {}", e);
                store = None;
                None
            }
            None => None,
        };

        let now = clock.now();
        let is_new = restored.is_none();
        let record = match restored {
            Some(mut record) => {
                debug!("Restored telemetry session {}", record.visitor_id);
                record.exit_page = page.to_string();
                record
            }
            None => SessionRecord::new(Uuid::new_v4().to_string(), now, page),
        };

        let mut session = Self {
            active_step: record.form_progress,
            record,
            store,
            sync,
            clock,
            settings,
            step_started: now,
            current_page: page.to_string(),
            flushed: false,
        };

        if is_new {
            session.persist();
            session
                .sync
                .push(SyncOp::Register(session.record.clone()));
            info!("Started telemetry session {}", session.record.visitor_id);
        }

        session
    }

    pub fn record(&self) -> &SessionRecord {
        &self.record
    }

    pub fn visitor_id(&self) -> &str {
        &self.record.visitor_id
    }

    /// True once local storage has failed and the session is memory-only
    pub fn is_memory_only(&self) -> bool {
        self.store.is_none()
    }

    // ========================================================================
    // Mutators
    // ========================================================================

    pub fn log_cta_click(&mut self, zone: CtaZone) {
        self.record.cta_clicks.increment(zone);
        debug!("CTA click: {} ({})", zone, self.record.cta_clicks.get(zone));
        self.commit();
    }

    pub fn log_handshake(&mut self, kind: HandshakeKind) {
        match kind {
            HandshakeKind::Whatsapp => self.record.whatsapp_handshake = true,
            HandshakeKind::Calendly => self.record.calendly_handshake = true,
        }
        debug!("Handshake: {:?}", kind);
        self.commit();
    }

    /// Move to funnel step `step`, charging the elapsed time to the step
    /// being left
    pub fn update_form_progress(&mut self, step: u32) {
        let now = self.clock.now();
        let elapsed = (now - self.step_started).num_seconds().max(0) as u64;
        let leaving = self.active_step;

        if leaving > 0 {
            *self.record.step_durations.entry(leaving).or_insert(0) += elapsed;
            if leaving == self.settings.pricing_step
                && elapsed > self.settings.pricing_threshold_secs
            {
                self.record.is_pricing_sensitive = true;
            }
        }

        self.active_step = step;
        self.record.form_progress = self.record.form_progress.max(step);
        self.step_started = now;

        debug!(
            "Form progress: step {} -> {} ({}s on step {})",
            leaving, step, elapsed, leaving
        );
        self.commit();
    }

    pub fn set_submitted(&mut self) {
        self.record.submitted = true;
        debug!("Funnel submitted for {}", self.record.visitor_id);
        self.commit();
    }

    /// Record the page currently shown; finalized as exit page at flush
    pub fn set_page(&mut self, path: &str) {
        self.current_page = path.to_string();
        self.record.exit_page = path.to_string();
        self.persist();
    }

    // ========================================================================
    // Terminal flush
    // ========================================================================

    /// Page-visibility hook: hiding the page flushes the session
    pub fn on_visibility_change(&mut self, visibility: Visibility) {
        if visibility == Visibility::Hidden {
            self.flush();
        }
    }

    /// Finalize duration and exit page and enqueue the single upsert.
    /// Returns false if the session was already flushed.
    pub fn flush(&mut self) -> bool {
        if self.flushed {
            debug!("Telemetry session {} already flushed", self.record.visitor_id);
            return false;
        }
        self.flushed = true;

        let now = self.clock.now();
        self.record.duration_seconds =
            (now - self.record.session_start).num_seconds().max(0) as u64;
        self.record.exit_page = self.current_page.clone();
        self.persist();

        if self.sync.is_enabled() {
            self.sync.push(SyncOp::Finalize(self.record.clone()));
        } else {
            self.archive_locally();
        }

        info!(
            "Flushed telemetry session {} ({}s, step {}, submitted: {})",
            self.record.visitor_id,
            self.record.duration_seconds,
            self.record.form_progress,
            self.record.submitted
        );
        true
    }

    /// Wait up to `grace` for queued syncs to be delivered
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        self.sync.close(grace).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Persist locally and, until the session is flushed, sync remotely
    fn commit(&mut self) {
        self.persist();
        if self.flushed {
            debug!(
                "Session {} already finalized, skipping remote update",
                self.record.visitor_id
            );
            return;
        }
        self.sync.push(SyncOp::Update {
            visitor_id: self.record.visitor_id.clone(),
            update: self.record.update_payload(),
        });
    }

    fn persist(&mut self) {
        let result = match &self.store {
            Some(store) => store.write_json(CURRENT_SESSION_KEY, &self.record),
            None => return,
        };
        if let Err(e) = result {
            warn!("Telemetry local save failed, continuing in memory: {}", e);
            self.store = None;
        }
    }

    /// Keep the finalized record in the local analytics log when there is no
    /// remote store to receive it
    fn archive_locally(&mut self) {
        let Some(store) = &self.store else {
            return;
        };
        let result = store
            .read_list::<SessionRecord>(ANALYTICS_LOG_KEY)
            .and_then(|mut records| {
                records.retain(|r| r.visitor_id != self.record.visitor_id);
                records.insert(0, self.record.clone());
                store.write_list(ANALYTICS_LOG_KEY, &records)
            });
        if let Err(e) = result {
            warn!("Telemetry local archive failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{FakeBackend, SessionCall};
    use crate::backend::RemoteStore;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    const GRACE: Duration = Duration::from_secs(5);

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 12, 0, 0).unwrap()
    }

    fn context(
        store: Option<Arc<LocalStore>>,
        remote: Option<Arc<FakeBackend>>,
        clock: Arc<ManualClock>,
    ) -> TelemetryContext {
        TelemetryContext::new(store, remote.map(|r| r as Arc<dyn RemoteStore>)).with_clock(clock)
    }

    fn updates(calls: &[SessionCall]) -> Vec<u32> {
        calls
            .iter()
            .filter_map(|c| match c {
                SessionCall::Update(_, update) => Some(update.form_progress),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_fresh_session_registers_and_persists() {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let fake = Arc::new(FakeBackend::new());
        let clock = Arc::new(ManualClock::new(start()));
        let session = TelemetrySession::init(
            context(Some(store.clone()), Some(fake.clone()), clock),
            "/",
        );

        let record = session.record().clone();
        assert!(!record.visitor_id.is_empty());
        assert_eq!(record.form_progress, 0);
        assert!(!record.submitted);
        assert_eq!(record.session_start, start());

        let saved: SessionRecord = store.read_json(CURRENT_SESSION_KEY).unwrap().unwrap();
        assert_eq!(saved, record);

        assert!(session.shutdown(GRACE).await);
        assert_eq!(fake.calls(), vec![SessionCall::Insert(record)]);
    }

    #[tokio::test]
    async fn test_restored_session_keeps_visitor_id() {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(start()));

        let mut first = TelemetrySession::init(context(Some(store.clone()), None, clock.clone()), "/");
        first.log_cta_click(CtaZone::Navbar);
        let visitor_id = first.visitor_id().to_string();
        drop(first);

        let fake = Arc::new(FakeBackend::new());
        let second = TelemetrySession::init(
            context(Some(store), Some(fake.clone()), clock),
            "/pricing",
        );
        assert_eq!(second.visitor_id(), visitor_id);
        assert_eq!(second.record().cta_clicks.navbar, 1);
        assert_eq!(second.record().exit_page, "/pricing");

        second.shutdown(GRACE).await;
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_form_progress_is_max_of_steps() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(context(None, None, clock), "/");

        for step in [1, 2, 3, 5] {
            session.update_form_progress(step);
        }
        assert_eq!(session.record().form_progress, 5);

        // Going back never lowers the high-water mark
        session.update_form_progress(2);
        assert_eq!(session.record().form_progress, 5);
    }

    #[tokio::test]
    async fn test_submitted_is_sticky() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(context(None, None, clock), "/");

        session.set_submitted();
        session.log_cta_click(CtaZone::Hero);
        session.log_handshake(HandshakeKind::Whatsapp);
        session.update_form_progress(1);
        session.set_page("/thanks");
        assert!(session.record().submitted);
    }

    #[tokio::test]
    async fn test_cta_clicks_count_per_zone() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(context(None, None, clock), "/");

        for _ in 0..7 {
            session.log_cta_click(CtaZone::Hero);
        }
        let clicks = &session.record().cta_clicks;
        assert_eq!(clicks.hero, 7);
        assert_eq!(clicks.footer, 0);
        assert_eq!(clicks.navbar, 0);
    }

    #[tokio::test]
    async fn test_handshakes_set_flags() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(context(None, None, clock), "/");

        session.log_handshake(HandshakeKind::Calendly);
        assert!(session.record().calendly_handshake);
        assert!(!session.record().whatsapp_handshake);

        session.log_handshake(HandshakeKind::Whatsapp);
        session.log_handshake(HandshakeKind::Calendly);
        assert!(session.record().calendly_handshake);
        assert!(session.record().whatsapp_handshake);
    }

    #[tokio::test]
    async fn test_step_duration_and_pricing_sensitivity() {
        let clock = Arc::new(ManualClock::new(start()));
        let settings = TelemetrySettings {
            pricing_step: 1,
            ..TelemetrySettings::default()
        };
        let mut session = TelemetrySession::init(
            context(None, None, clock.clone()).with_settings(settings),
            "/",
        );
        assert_eq!(session.record().form_progress, 0);
        assert!(!session.record().submitted);

        session.update_form_progress(1);
        clock.advance_secs(35);
        session.update_form_progress(2);

        let record = session.record();
        assert!(record.step_durations[&1] >= 35);
        assert!(record.is_pricing_sensitive);
        assert!(!record.step_durations.contains_key(&2));
    }

    #[tokio::test]
    async fn test_pricing_threshold_on_default_step() {
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(context(None, None, clock.clone()), "/");

        session.update_form_progress(3);
        clock.advance_secs(45);
        session.update_form_progress(4);
        // Long dwell on a non-pricing step does not count
        assert!(!session.record().is_pricing_sensitive);

        clock.advance_secs(20);
        session.update_form_progress(3);
        assert!(!session.record().is_pricing_sensitive);

        session.update_form_progress(4);
        clock.advance_secs(31);
        session.update_form_progress(5);
        assert!(session.record().is_pricing_sensitive);
        // Both visits to step 4 accumulate
        assert_eq!(session.record().step_durations[&4], 51);
        assert_eq!(session.record().step_durations[&3], 45);
    }

    #[tokio::test]
    async fn test_remote_updates_stay_ordered_under_slow_network() {
        let fake = Arc::new(FakeBackend::new());
        fake.delay_update_at(2, Duration::from_millis(50));
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(context(None, Some(fake.clone()), clock), "/");

        session.update_form_progress(1);
        session.update_form_progress(2);
        session.update_form_progress(3);
        assert!(session.shutdown(GRACE).await);

        let calls = fake.calls();
        assert!(matches!(calls[0], SessionCall::Insert(_)));
        assert_eq!(updates(&calls), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_flush_once_with_duration_and_exit_page() {
        let fake = Arc::new(FakeBackend::new());
        let clock = Arc::new(ManualClock::new(start()));
        let mut session =
            TelemetrySession::init(context(None, Some(fake.clone()), clock.clone()), "/");

        session.set_page("/audit");
        clock.advance_secs(90);
        session.on_visibility_change(Visibility::Visible);
        session.on_visibility_change(Visibility::Hidden);
        assert!(!session.flush());
        session.shutdown(GRACE).await;

        let upserts: Vec<SessionRecord> = fake
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                SessionCall::Upsert(record) => Some(record),
                _ => None,
            })
            .collect();
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].duration_seconds, 90);
        assert_eq!(upserts[0].exit_page, "/audit");
    }

    #[tokio::test]
    async fn test_remote_failures_never_surface() {
        let fake = Arc::new(FakeBackend::failing());
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(
            context(Some(store.clone()), Some(fake.clone()), clock),
            "/",
        );

        session.log_cta_click(CtaZone::Footer);
        session.update_form_progress(1);
        session.set_submitted();
        assert!(session.flush());

        let saved: SessionRecord = store.read_json(CURRENT_SESSION_KEY).unwrap().unwrap();
        assert!(saved.submitted);
        assert_eq!(saved.cta_clicks.footer, 1);

        assert!(session.shutdown(GRACE).await);
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_only_flush_archives_record() {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(context(Some(store.clone()), None, clock), "/");
        session.update_form_progress(1);
        session.flush();

        let gateway = crate::gateway::PersistenceGateway::new(store, None);
        let records = gateway.get_analytics().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].visitor_id, session.visitor_id());
        assert_eq!(records[0].form_progress, 1);
    }

    #[test]
    fn test_init_without_runtime_disables_sync() {
        let fake = Arc::new(FakeBackend::new());
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(context(None, Some(fake.clone()), clock), "/");
        session.log_cta_click(CtaZone::Hero);
        assert_eq!(session.record().cta_clicks.hero, 1);
        assert!(session.is_memory_only());
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn test_local_write_failure_degrades_to_memory() {
        let (backend, fail) = crate::store::failing::FailingBackend::new();
        let store = Arc::new(LocalStore::with_backend(backend).unwrap());
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(context(Some(store), None, clock), "/");
        assert!(!session.is_memory_only());

        fail.store(true, std::sync::atomic::Ordering::SeqCst);
        session.log_cta_click(CtaZone::Hero);
        assert!(session.is_memory_only());

        session.log_cta_click(CtaZone::Hero);
        session.update_form_progress(2);
        session.set_submitted();
        assert!(session.flush());
        assert_eq!(session.record().cta_clicks.hero, 2);
        assert_eq!(session.record().form_progress, 2);
        assert!(session.record().submitted);
    }

    #[tokio::test]
    async fn test_undecodable_stored_session_starts_fresh() {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        store.set_item(CURRENT_SESSION_KEY, "{\"visitor_id\":").unwrap();
        let clock = Arc::new(ManualClock::new(start()));

        let session = TelemetrySession::init(context(Some(store.clone()), None, clock), "/");
        assert!(!session.is_memory_only());
        let saved: SessionRecord = store.read_json(CURRENT_SESSION_KEY).unwrap().unwrap();
        assert_eq!(saved.visitor_id, session.visitor_id());
    }

    #[tokio::test]
    async fn test_mutations_after_flush_stay_local() {
        let fake = Arc::new(FakeBackend::new());
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let clock = Arc::new(ManualClock::new(start()));
        let mut session = TelemetrySession::init(
            context(Some(store.clone()), Some(fake.clone()), clock),
            "/",
        );

        session.update_form_progress(1);
        assert!(session.flush());
        session.log_cta_click(CtaZone::Footer);
        session.log_handshake(HandshakeKind::Calendly);
        assert!(session.shutdown(GRACE).await);

        let calls = fake.calls();
        assert!(matches!(calls.last(), Some(SessionCall::Upsert(_))));
        assert_eq!(updates(&calls), vec![1]);

        let saved: SessionRecord = store.read_json(CURRENT_SESSION_KEY).unwrap().unwrap();
        assert_eq!(saved.cta_clicks.footer, 1);
        assert!(saved.calendly_handshake);
    }
}
