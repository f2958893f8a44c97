//! ============================================================================
//! Auth Module - Admin dashboard access
//! ============================================================================
//! Handles authentication for the admin dashboard:
//! - Hashed shared credential check
//! - Local session token with a fixed time-to-live
//! ============================================================================

mod admin;

pub use admin::{hash_password, AdminAuth, SESSION_TTL_SECS};
