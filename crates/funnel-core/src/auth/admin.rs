//! ============================================================================
//! Admin Session - Credential check and expiring local session
//! ============================================================================
//! The configured credential is the hex SHA-256 of the admin password. A
//! successful login stores a random session token plus its expiry in the
//! local store; every `is_authenticated` call re-checks the expiry and logs
//! out once it has passed.
//! ============================================================================

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::store::{LocalStore, ADMIN_EXPIRY_KEY, ADMIN_SESSION_KEY};

/// Session lifetime (2 hours)
pub const SESSION_TTL_SECS: i64 = 2 * 60 * 60;

/// Hex-encoded SHA-256 of `password`
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Admin dashboard authentication
pub struct AdminAuth {
    store: Arc<LocalStore>,
    /// Expected password hash; None disables login entirely
    credential_sha256: Option<String>,
    clock: Arc<dyn Clock>,
}

impl AdminAuth {
    pub fn new(store: Arc<LocalStore>, credential_sha256: Option<String>) -> Self {
        Self::with_clock(store, credential_sha256, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: Arc<LocalStore>,
        credential_sha256: Option<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        if credential_sha256.is_none() {
            warn!("No admin credential configured - admin login is disabled");
        }
        Self {
            store,
            credential_sha256: credential_sha256.map(|h| h.trim().to_lowercase()),
            clock,
        }
    }

    /// Verify `password` and open a session. Returns whether login succeeded.
    pub fn login(&self, password: &str) -> bool {
        let Some(expected) = &self.credential_sha256 else {
            return false;
        };
        if !constant_time_eq(hash_password(password).as_bytes(), expected.as_bytes()) {
            warn!("Admin login rejected");
            return false;
        }

        let token = generate_token();
        let expiry = self.clock.now() + chrono::Duration::seconds(SESSION_TTL_SECS);
        let stored = self
            .store
            .set_item(ADMIN_SESSION_KEY, &token)
            .and_then(|_| self.store.set_item(ADMIN_EXPIRY_KEY, &expiry.to_rfc3339()));

        match stored {
            Ok(()) => {
                info!("Admin session opened, expires {}", expiry.to_rfc3339());
                true
            }
            Err(e) => {
                warn!("Failed to persist admin session: {}", e);
                false
            }
        }
    }

    /// Whether a live session exists. An expired session is logged out.
    pub fn is_authenticated(&self) -> bool {
        let session = self.store.get_item(ADMIN_SESSION_KEY);
        let expiry = self.store.get_item(ADMIN_EXPIRY_KEY);

        let (token, expiry) = match (session, expiry) {
            (Ok(Some(token)), Ok(Some(expiry))) => (token, expiry),
            (Err(e), _) | (_, Err(e)) => {
                warn!("Failed to read admin session: {}", e);
                return false;
            }
            _ => return false,
        };

        let expires_at = match DateTime::parse_from_rfc3339(&expiry) {
            Ok(ts) => ts.with_timezone(&Utc),
            Err(_) => {
                debug!("Admin session expiry unreadable, logging out");
                self.logout();
                return false;
            }
        };

        if self.clock.now() > expires_at {
            info!("Admin session expired");
            self.logout();
            return false;
        }

        !token.is_empty()
    }

    /// Expiry of the current session, if any
    pub fn session_expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.store.get_item(ADMIN_EXPIRY_KEY).ok()??;
        DateTime::parse_from_rfc3339(&raw)
            .ok()
            .map(|ts| ts.with_timezone(&Utc))
    }

    pub fn logout(&self) {
        for key in [ADMIN_SESSION_KEY, ADMIN_EXPIRY_KEY] {
            if let Err(e) = self.store.remove_item(key) {
                warn!("Failed to clear {}: {}", key, e);
            }
        }
        debug!("Admin session cleared");
    }
}

/// 32 random bytes, hex-encoded
fn generate_token() -> String {
    (0..32)
        .map(|_| format!("{:02x}", rand::random::<u8>()))
        .collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn auth_with_clock(clock: Arc<ManualClock>) -> AdminAuth {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        AdminAuth::with_clock(store, Some(hash_password("correct horse")), clock)
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 16, 8, 0, 0).unwrap(),
        ))
    }

    #[test]
    fn test_hash_password_known_vector() {
        assert_eq!(
            hash_password("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_login_logout() {
        let auth = auth_with_clock(clock());
        assert!(!auth.is_authenticated());

        assert!(!auth.login("wrong"));
        assert!(!auth.is_authenticated());

        assert!(auth.login("correct horse"));
        assert!(auth.is_authenticated());

        auth.logout();
        assert!(!auth.is_authenticated());
    }

    #[test]
    fn test_session_expires_after_ttl() {
        let clock = clock();
        let auth = auth_with_clock(clock.clone());
        assert!(auth.login("correct horse"));

        clock.advance_secs(SESSION_TTL_SECS - 1);
        assert!(auth.is_authenticated());

        clock.advance_secs(2);
        assert!(!auth.is_authenticated());
        // Expiry logs out implicitly
        assert!(auth.session_expiry().is_none());
    }

    #[test]
    fn test_no_credential_disables_login() {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let auth = AdminAuth::new(store, None);
        assert!(!auth.login(""));
        assert!(!auth.login("anything"));
    }

    #[test]
    fn test_credential_hash_case_insensitive() {
        let store = Arc::new(LocalStore::in_memory().unwrap());
        let auth = AdminAuth::new(store, Some(hash_password("pw").to_uppercase()));
        assert!(auth.login("pw"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
