//! ============================================================================
//! Core Types for the Funnel
//! ============================================================================
//! Lead and booking records as stored locally and in the hosted backend.
//! Field names match the backend column names so records round-trip
//! through JSON unchanged.
//! ============================================================================

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Placeholder problem statement when the form did not provide one
pub const DEFAULT_CORE_PROBLEM: &str = "PENDING_ANALYSIS";

/// CTA source used when the entry point is unknown
pub const DEFAULT_CTA_SOURCE: &str = "direct";

/// Phone placeholder for bookings made without a number
pub const SKIPPED_PHONE: &str = "SKIPPED";

/// Admin-controlled lead status. New leads always start as `Pending`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    Pending,
    Contacted,
    AuditDelivered,
    Closed,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 4] = [
        LeadStatus::Pending,
        LeadStatus::Contacted,
        LeadStatus::AuditDelivered,
        LeadStatus::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Contacted => "contacted",
            Self::AuditDelivered => "audit_delivered",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(Self::Pending),
            "contacted" => Ok(Self::Contacted),
            "audit_delivered" | "delivered" => Ok(Self::AuditDelivered),
            "closed" => Ok(Self::Closed),
            _ => Err(format!(
                "Unknown status '{}'. Valid values: pending, contacted, audit_delivered, closed",
                s
            )),
        }
    }
}

/// A captured lead from the audit funnel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lead {
    pub id: String,
    /// Client-side correlation token (AUD-NNNN)
    pub session_id: String,
    pub target_url: String,
    pub user_email: String,
    pub user_phone: String,
    pub revenue_tier: String,
    pub core_problem: String,
    pub cta_source: String,
    #[serde(default)]
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

/// Form submission payload for `save_lead`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadInput {
    pub session_id: String,
    pub target_url: String,
    pub user_email: String,
    pub user_phone: String,
    pub revenue_tier: String,
    pub core_problem: Option<String>,
    pub cta_source: Option<String>,
}

impl LeadInput {
    /// Same acceptance rules as the funnel form steps
    pub fn validate(&self) -> Result<(), String> {
        let url = self.target_url.trim();
        if url.len() <= 5 || !url.contains('.') {
            return Err(format!("invalid website: {}", self.target_url));
        }
        if !is_plausible_email(&self.user_email) {
            return Err(format!("invalid email address: {}", self.user_email));
        }
        if self.user_phone.trim().len() <= 8 {
            return Err(format!("phone number too short: {}", self.user_phone));
        }
        if self.revenue_tier.trim().is_empty() {
            return Err("revenue_tier is required".to_string());
        }
        Ok(())
    }
}

/// Lead row as inserted into the backend (id assigned on insert)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewLead {
    pub session_id: String,
    pub target_url: String,
    pub user_email: String,
    pub user_phone: String,
    pub revenue_tier: String,
    pub core_problem: String,
    pub cta_source: String,
    pub status: LeadStatus,
    pub created_at: DateTime<Utc>,
}

impl NewLead {
    pub fn from_input(input: LeadInput, created_at: DateTime<Utc>) -> Self {
        Self {
            session_id: input.session_id,
            target_url: input.target_url,
            user_email: input.user_email,
            user_phone: input.user_phone,
            revenue_tier: input.revenue_tier,
            core_problem: input
                .core_problem
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CORE_PROBLEM.to_string()),
            cta_source: input
                .cta_source
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CTA_SOURCE.to_string()),
            status: LeadStatus::Pending,
            created_at,
        }
    }

    pub fn with_id(self, id: String) -> Lead {
        Lead {
            id,
            session_id: self.session_id,
            target_url: self.target_url,
            user_email: self.user_email,
            user_phone: self.user_phone,
            revenue_tier: self.revenue_tier,
            core_problem: self.core_problem,
            cta_source: self.cta_source,
            status: self.status,
            created_at: self.created_at,
        }
    }
}

/// A scheduled strategy session
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    /// Backend-assigned id; absent for locally stored bookings from older data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub email: String,
    #[serde(default = "skipped_phone")]
    pub phone: String,
    pub date: String,
    pub time: String,
    pub session_id: String,
    pub created_at: DateTime<Utc>,
}

/// Booking calendar payload for `save_booking`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingInput {
    pub email: String,
    pub phone: Option<String>,
    pub date: String,
    pub time: String,
    pub session_id: String,
}

impl BookingInput {
    pub fn into_booking(self, created_at: DateTime<Utc>) -> Booking {
        Booking {
            id: None,
            email: self.email,
            phone: self
                .phone
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(skipped_phone),
            date: self.date,
            time: self.time,
            session_id: self.session_id,
            created_at,
        }
    }
}

fn skipped_phone() -> String {
    SKIPPED_PHONE.to_string()
}

/// Generate a form correlation token, e.g. `AUD-4821`
pub fn generate_session_id() -> String {
    let n: u32 = rand::thread_rng().gen_range(1000..=9999);
    format!("AUD-{}", n)
}

/// `local@domain.tld` with no whitespace
fn is_plausible_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}
