//! ============================================================================
//! Telemetry Types - Session record and sync payloads
//! ============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// On-page entry points whose CTA interactions are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CtaZone {
    Hero,
    Footer,
    Navbar,
}

impl CtaZone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hero => "hero",
            Self::Footer => "footer",
            Self::Navbar => "navbar",
        }
    }
}

impl fmt::Display for CtaZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// External escalation channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandshakeKind {
    Whatsapp,
    Calendly,
}

/// Page visibility signal delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Click counts per CTA zone
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CtaClicks {
    #[serde(default)]
    pub hero: u64,
    #[serde(default)]
    pub footer: u64,
    #[serde(default)]
    pub navbar: u64,
}

impl CtaClicks {
    pub fn get(&self, zone: CtaZone) -> u64 {
        match zone {
            CtaZone::Hero => self.hero,
            CtaZone::Footer => self.footer,
            CtaZone::Navbar => self.navbar,
        }
    }

    pub fn increment(&mut self, zone: CtaZone) {
        let slot = match zone {
            CtaZone::Hero => &mut self.hero,
            CtaZone::Footer => &mut self.footer,
            CtaZone::Navbar => &mut self.navbar,
        };
        *slot = slot.saturating_add(1);
    }

    /// Whether any zone was clicked at least once
    pub fn any(&self) -> bool {
        self.hero > 0 || self.footer > 0 || self.navbar > 0
    }
}

/// One browser session's behavioral record.
/// Stored as-is locally and in the `site_analytics` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub visitor_id: String,
    pub session_start: DateTime<Utc>,
    /// Only meaningful after flush
    #[serde(default, deserialize_with = "null_as_default")]
    pub duration_seconds: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub cta_clicks: CtaClicks,
    /// Highest funnel step reached
    #[serde(default, deserialize_with = "null_as_default")]
    pub form_progress: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub submitted: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub exit_page: String,
    /// Funnel step -> cumulative seconds spent on it
    #[serde(default, deserialize_with = "null_as_default")]
    pub step_durations: BTreeMap<u32, u64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_pricing_sensitive: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub whatsapp_handshake: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub calendly_handshake: bool,
}

impl SessionRecord {
    pub fn new(visitor_id: String, session_start: DateTime<Utc>, page: &str) -> Self {
        Self {
            visitor_id,
            session_start,
            duration_seconds: 0,
            cta_clicks: CtaClicks::default(),
            form_progress: 0,
            submitted: false,
            exit_page: page.to_string(),
            step_durations: BTreeMap::new(),
            is_pricing_sensitive: false,
            whatsapp_handshake: false,
            calendly_handshake: false,
        }
    }

    /// Fields sent on every mid-session sync
    pub fn update_payload(&self) -> SessionUpdate {
        SessionUpdate {
            cta_clicks: self.cta_clicks.clone(),
            form_progress: self.form_progress,
            submitted: self.submitted,
            is_pricing_sensitive: self.is_pricing_sensitive,
            step_durations: self.step_durations.clone(),
            whatsapp_handshake: self.whatsapp_handshake,
            calendly_handshake: self.calendly_handshake,
        }
    }
}

/// Partial update for an existing `site_analytics` row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUpdate {
    pub cta_clicks: CtaClicks,
    pub form_progress: u32,
    pub submitted: bool,
    pub is_pricing_sensitive: bool,
    pub step_durations: BTreeMap<u32, u64>,
    pub whatsapp_handshake: bool,
    pub calendly_handshake: bool,
}

/// Backend rows may carry NULL for columns added after the row was created
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
