//! ============================================================================
//! Email Notifier - Booking and lead alerts via Resend API
//! ============================================================================
//! Sends a plain-text message to the consultancy inbox when:
//! - a strategy session is booked
//! - a new audit lead is captured
//! Callers treat send failures as non-fatal; the record is already saved.
//! ============================================================================

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::FunnelConfig;
use crate::types::{Booking, Lead};

/// Resend API endpoint
const RESEND_API: &str = "https://api.resend.com/emails";

/// Notification sender for the consultancy inbox
pub struct EmailNotifier {
    client: reqwest::Client,
    api_key: String,
    to_email: String,
    from_email: String,
    from_name: String,
}

impl EmailNotifier {
    pub fn new(api_key: String, to_email: String, from_email: String, from_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            to_email,
            from_email,
            from_name,
        }
    }

    /// Notifier for the configured inbox, or None when email is not set up
    pub fn from_config(config: &FunnelConfig) -> Option<Self> {
        let api_key = config.resend_api_key.clone()?;
        let to_email = config.notify_to_email.clone()?;
        Some(Self::new(
            api_key,
            to_email,
            config.email_from_address.clone(),
            config.email_from_name.clone(),
        ))
    }

    pub async fn notify_booking(&self, booking: &Booking) -> Result<String> {
        let (subject, body) = booking_message(booking);
        self.send(&subject, &body, Some(&booking.email)).await
    }

    pub async fn notify_lead(&self, lead: &Lead) -> Result<String> {
        let (subject, body) = lead_message(lead);
        self.send(&subject, &body, Some(&lead.user_email)).await
    }

    /// Send one plain-text email; returns the Resend message id
    async fn send(&self, subject: &str, body: &str, reply_to: Option<&str>) -> Result<String> {
        info!("Sending notification to {}: {}", self.to_email, subject);

        let request = EmailRequest {
            from: format!("{} <{}>", self.from_name, self.from_email),
            to: vec![self.to_email.clone()],
            subject: subject.to_string(),
            text: body.to_string(),
            reply_to: reply_to.map(|r| r.to_string()),
        };

        let response = self
            .client
            .post(RESEND_API)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send email: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Resend API error {}: {}", status, body));
        }

        let email_response: ResendResponse = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse Resend response: {}", e))?;

        info!("Notification sent: {}", email_response.id);
        Ok(email_response.id)
    }
}

fn booking_message(booking: &Booking) -> (String, String) {
    let subject = format!(
        "Strategy session booked: {} at {}",
        booking.date, booking.time
    );
    let body = format!(
        "New strategy session locked: {} at {}.\n\n\
         Email:   {}\n\
         Phone:   {}\n\
         Session: {}\n",
        booking.date, booking.time, booking.email, booking.phone, booking.session_id
    );
    (subject, body)
}

fn lead_message(lead: &Lead) -> (String, String) {
    let subject = format!("New audit lead {} ({})", lead.session_id, lead.revenue_tier);
    let body = format!(
        "Target:   {}\n\
         Email:    {}\n\
         Phone:    {}\n\
         Tier:     {}\n\
         Problem:  {}\n\
         Source:   {}\n\
         Received: {}\n",
        lead.target_url,
        lead.user_email,
        lead.user_phone,
        lead.revenue_tier,
        lead.core_problem,
        lead.cta_source,
        lead.created_at.to_rfc3339()
    );
    (subject, body)
}

// ============================================================================
// Resend API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct EmailRequest {
    from: String,
    to: Vec<String>,
    subject: String,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LeadStatus;
    use chrono::Utc;

    #[test]
    fn test_from_config_requires_key_and_recipient() {
        let mut config = FunnelConfig::default();
        assert!(EmailNotifier::from_config(&config).is_none());

        config.resend_api_key = Some("re_test".to_string());
        assert!(EmailNotifier::from_config(&config).is_none());

        config.notify_to_email = Some("inbox@consultancy.dev".to_string());
        assert!(EmailNotifier::from_config(&config).is_some());
    }

    #[test]
    fn test_booking_message() {
        let booking = Booking {
            id: None,
            email: "a@b.com".to_string(),
            phone: "SKIPPED".to_string(),
            date: "10/20/2026".to_string(),
            time: "10:00 AM".to_string(),
            session_id: "AUD-1234".to_string(),
            created_at: Utc::now(),
        };
        let (subject, body) = booking_message(&booking);
        assert!(subject.contains("10/20/2026 at 10:00 AM"));
        assert!(body.contains("AUD-1234"));
        assert!(body.contains("a@b.com"));
    }

    #[test]
    fn test_lead_message() {
        let lead = Lead {
            id: "id-1".to_string(),
            session_id: "AUD-1234".to_string(),
            target_url: "example.com".to_string(),
            user_email: "a@b.com".to_string(),
            user_phone: "+10000000000".to_string(),
            revenue_tier: "BETA".to_string(),
            core_problem: "PENDING_ANALYSIS".to_string(),
            cta_source: "hero".to_string(),
            status: LeadStatus::Pending,
            created_at: Utc::now(),
        };
        let (subject, body) = lead_message(&lead);
        assert_eq!(subject, "New audit lead AUD-1234 (BETA)");
        assert!(body.contains("example.com"));
    }

    #[test]
    fn test_request_serialization_skips_empty_reply_to() {
        let request = EmailRequest {
            from: "Funnel <bookings@localhost>".to_string(),
            to: vec!["inbox@consultancy.dev".to_string()],
            subject: "s".to_string(),
            text: "t".to_string(),
            reply_to: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("reply_to"));
    }
}
