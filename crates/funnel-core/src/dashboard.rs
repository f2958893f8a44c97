//! ============================================================================
//! Dashboard Aggregation - Admin analytics and lead views
//! ============================================================================
//! Pure functions over records returned by the gateway:
//! - AnalyticsSummary: all-time session stats
//! - funnel_counts: sessions reaching each form step
//! - WeeklySummary: last-7-days report plus projected pipeline value
//! - LeadFilter: search / tier / status filtering and date sort
//! ============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::SessionRecord;
use crate::types::{Lead, LeadStatus};

/// Number of steps in the audit funnel
pub const FUNNEL_STEPS: u32 = 4;

/// All-time session statistics (percentages rounded)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_sessions: usize,
    pub avg_duration_secs: u64,
    pub completion_rate: u32,
    pub whatsapp_rate: u32,
}

impl AnalyticsSummary {
    pub fn from_records(records: &[SessionRecord]) -> Self {
        let total = records.len();
        if total == 0 {
            return Self::default();
        }

        let total_duration: u64 = records.iter().map(|r| r.duration_seconds).sum();
        let completed = records.iter().filter(|r| r.submitted).count();
        let whatsapp = records.iter().filter(|r| r.whatsapp_handshake).count();

        Self {
            total_sessions: total,
            avg_duration_secs: (total_duration as f64 / total as f64).round() as u64,
            completion_rate: percent(completed, total),
            whatsapp_rate: percent(whatsapp, total),
        }
    }
}

/// Sessions that reached at least each step, for steps `1..=steps`
pub fn funnel_counts(records: &[SessionRecord], steps: u32) -> Vec<(u32, usize)> {
    (1..=steps)
        .map(|step| {
            let count = records.iter().filter(|r| r.form_progress >= step).count();
            (step, count)
        })
        .collect()
}

/// Weekly report shown at the top of the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummary {
    pub total_visitors: usize,
    pub avg_duration_secs: u64,
    /// Share of sessions with at least one CTA click
    pub cta_rate: u32,
    pub form_submissions: usize,
    pub conversion_percentage: u32,
    pub whatsapp_count: usize,
    pub calendly_count: usize,
    /// Estimated value of all leads by revenue tier
    pub projected_revenue: u64,
}

impl WeeklySummary {
    pub fn compute(records: &[SessionRecord], leads: &[Lead], now: DateTime<Utc>) -> Self {
        let week_ago = now - Duration::days(7);
        let recent: Vec<&SessionRecord> = records
            .iter()
            .filter(|r| r.session_start >= week_ago)
            .collect();

        let visitors = recent.len();
        let total_duration: u64 = recent.iter().map(|r| r.duration_seconds).sum();
        let avg_duration_secs = if visitors > 0 {
            (total_duration as f64 / visitors as f64).round() as u64
        } else {
            0
        };
        let cta_triggers = recent.iter().filter(|r| r.cta_clicks.any()).count();
        let submissions = recent.iter().filter(|r| r.submitted).count();

        Self {
            total_visitors: visitors,
            avg_duration_secs,
            cta_rate: percent(cta_triggers, visitors),
            form_submissions: submissions,
            conversion_percentage: percent(submissions, visitors),
            whatsapp_count: recent.iter().filter(|r| r.whatsapp_handshake).count(),
            calendly_count: recent.iter().filter(|r| r.calendly_handshake).count(),
            projected_revenue: leads.iter().map(|l| tier_value(&l.revenue_tier)).sum(),
        }
    }
}

/// Estimated deal value for a revenue tier
pub fn tier_value(tier: &str) -> u64 {
    if tier.contains("GAMMA") {
        5000
    } else if tier.contains("BETA") {
        2000
    } else {
        1000
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Lead list filter used by the dashboard table
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    /// Case-insensitive match on email or session id
    pub search: Option<String>,
    /// Substring match on revenue tier
    pub tier: Option<String>,
    pub status: Option<LeadStatus>,
    pub order: SortOrder,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        let search_ok = match &self.search {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                lead.user_email.to_lowercase().contains(&term)
                    || lead.session_id.to_lowercase().contains(&term)
            }
            _ => true,
        };
        let tier_ok = self
            .tier
            .as_ref()
            .map_or(true, |tier| lead.revenue_tier.contains(tier.as_str()));
        let status_ok = self.status.map_or(true, |status| lead.status == status);

        search_ok && tier_ok && status_ok
    }

    pub fn apply(&self, leads: &[Lead]) -> Vec<Lead> {
        let mut filtered: Vec<Lead> = leads.iter().filter(|l| self.matches(l)).cloned().collect();
        match self.order {
            SortOrder::Desc => filtered.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortOrder::Asc => filtered.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        }
        filtered
    }
}

fn percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round() as u32
}
