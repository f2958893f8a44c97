//! ============================================================================
//! PostgREST Client - Hosted backend over Supabase's REST interface
//! ============================================================================
//! Tables:
//! - audit_submissions: captured leads
//! - session_bookings: strategy session bookings
//! - site_analytics: one row per visitor session
//! ============================================================================

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{BackendError, RemoteStore};
use crate::config::FunnelConfig;
use crate::telemetry::{SessionRecord, SessionUpdate};
use crate::types::{Booking, Lead, LeadStatus, NewLead};

pub const LEADS_TABLE: &str = "audit_submissions";
pub const BOOKINGS_TABLE: &str = "session_bookings";
pub const ANALYTICS_TABLE: &str = "site_analytics";

const RETURN_ROWS: &str = "return=representation";
const RETURN_NONE: &str = "return=minimal";
const UPSERT_MERGE: &str = "resolution=merge-duplicates,return=minimal";

/// REST client for the hosted backend
pub struct PostgrestClient {
    client: reqwest::Client,
    rest_url: String,
    api_key: String,
}

impl PostgrestClient {
    /// Create a client for `base_url` (project URL, without `/rest/v1`)
    pub fn new(base_url: &str, api_key: String, timeout: std::time::Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            rest_url: format!("{}/rest/v1", base_url.trim_end_matches('/')),
            api_key,
        }
    }

    /// Client for the configured backend, or None when it is unavailable
    pub fn from_config(config: &FunnelConfig) -> Option<Self> {
        if !config.backend_available() {
            return None;
        }
        Some(Self::new(
            &config.backend_url,
            config.backend_key.clone(),
            config.backend_timeout(),
        ))
    }

    fn table_url(&self, table: &str, query: &str) -> String {
        if query.is_empty() {
            format!("{}/{}", self.rest_url, table)
        } else {
            format!("{}/{}?{}", self.rest_url, table, query)
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    /// Send and check status; returns the response body on success
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(BackendError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        order: &str,
    ) -> Result<Vec<T>, BackendError> {
        let url = self.table_url(table, &format!("select=*&order={}.desc", order));
        let body = self.send(self.request(reqwest::Method::GET, &url)).await?;
        decode(&body)
    }

    /// Insert one row and return the stored representation
    async fn insert_returning<B: Serialize, T: DeserializeOwned>(
        &self,
        table: &str,
        row: &B,
    ) -> Result<T, BackendError> {
        let url = self.table_url(table, "");
        let request = self
            .request(reqwest::Method::POST, &url)
            .header("Prefer", RETURN_ROWS)
            .json(&[row]);
        let body = self.send(request).await?;
        let mut rows: Vec<T> = decode(&body)?;
        if rows.is_empty() {
            return Err(BackendError::Decode(format!(
                "insert into {} returned no rows",
                table
            )));
        }
        Ok(rows.swap_remove(0))
    }

    /// Count rows returned by a filtered PATCH/DELETE
    async fn matched_rows(&self, request: reqwest::RequestBuilder) -> Result<usize, BackendError> {
        let body = self.send(request.header("Prefer", RETURN_ROWS)).await?;
        let rows: Vec<serde_json::Value> = decode(&body)?;
        Ok(rows.len())
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BackendError> {
    serde_json::from_str(body).map_err(|e| BackendError::Decode(e.to_string()))
}

fn eq_filter(column: &str, value: &str) -> String {
    format!("{}=eq.{}", column, urlencoding::encode(value))
}

#[async_trait]
impl RemoteStore for PostgrestClient {
    async fn fetch_leads(&self) -> Result<Vec<Lead>, BackendError> {
        let leads: Vec<Lead> = self.select(LEADS_TABLE, "created_at").await?;
        debug!("Fetched {} leads from backend", leads.len());
        Ok(leads)
    }

    async fn fetch_analytics(&self) -> Result<Vec<SessionRecord>, BackendError> {
        let records: Vec<SessionRecord> = self.select(ANALYTICS_TABLE, "session_start").await?;
        debug!("Fetched {} session records from backend", records.len());
        Ok(records)
    }

    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, BackendError> {
        let saved: Lead = self.insert_returning(LEADS_TABLE, lead).await?;
        debug!("Inserted lead {} ({})", saved.id, saved.session_id);
        Ok(saved)
    }

    async fn insert_booking(&self, booking: &Booking) -> Result<Booking, BackendError> {
        let saved: Booking = self.insert_returning(BOOKINGS_TABLE, booking).await?;
        debug!("Inserted booking for {}", saved.session_id);
        Ok(saved)
    }

    async fn update_lead_status(
        &self,
        id: &str,
        status: LeadStatus,
    ) -> Result<bool, BackendError> {
        let url = self.table_url(LEADS_TABLE, &eq_filter("id", id));
        let request = self
            .request(reqwest::Method::PATCH, &url)
            .json(&serde_json::json!({ "status": status }));
        let matched = self.matched_rows(request).await?;
        debug!("Updated lead {} to {} ({} rows)", id, status, matched);
        Ok(matched > 0)
    }

    async fn delete_lead(&self, id: &str) -> Result<bool, BackendError> {
        let url = self.table_url(LEADS_TABLE, &eq_filter("id", id));
        let matched = self
            .matched_rows(self.request(reqwest::Method::DELETE, &url))
            .await?;
        debug!("Deleted lead {} ({} rows)", id, matched);
        Ok(matched > 0)
    }

    async fn insert_session(&self, record: &SessionRecord) -> Result<(), BackendError> {
        let url = self.table_url(ANALYTICS_TABLE, "");
        let request = self
            .request(reqwest::Method::POST, &url)
            .header("Prefer", RETURN_NONE)
            .json(&[record]);
        self.send(request).await?;
        Ok(())
    }

    async fn update_session(
        &self,
        visitor_id: &str,
        update: &SessionUpdate,
    ) -> Result<(), BackendError> {
        let url = self.table_url(ANALYTICS_TABLE, &eq_filter("visitor_id", visitor_id));
        let request = self
            .request(reqwest::Method::PATCH, &url)
            .header("Prefer", RETURN_NONE)
            .json(update);
        self.send(request).await?;
        Ok(())
    }

    async fn upsert_session(&self, record: &SessionRecord) -> Result<(), BackendError> {
        let url = self.table_url(ANALYTICS_TABLE, "on_conflict=visitor_id");
        let request = self
            .request(reqwest::Method::POST, &url)
            .header("Prefer", UPSERT_MERGE)
            .json(&[record]);
        self.send(request).await?;
        Ok(())
    }
}
