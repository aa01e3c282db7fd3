//! Pairing and session authentication.
//!
//! `registrar` owns the server-side state machine (employees, pairing
//! codes, devices), `session` exchanges credentials for bearer tokens,
//! `claims` reads and verifies them, `code` handles the pairing-code
//! format and its scannable payload.

pub mod claims;
pub mod code;
pub mod registrar;
pub mod session;

use serde::{Deserialize, Serialize};

/// Coarse-grained role carried in the session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Employee => "employee",
        }
    }
}

/// Which login path a per-employee policy disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginPath {
    Password,
    Biometric,
}

/// Failure taxonomy for pairing and session operations.
///
/// `Unauthorized` is deliberately detail-free: callers must never learn
/// which half of a credential pair was wrong.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    Unauthorized,
    #[error("{0:?} login is disabled for this employee")]
    PolicyDisabled(LoginPath),
    #[error("a pending pairing code or active device already exists")]
    Conflict,
    #[error("unknown employee, code, or device")]
    NotFound,
    #[error("pairing code expired")]
    Expired,
    #[error("invalid input: {0}")]
    Invalid(&'static str),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_serde() {
        let json = serde_json::to_string(&Role::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
        let back: Role = serde_json::from_str("\"employee\"").unwrap();
        assert_eq!(back, Role::Employee);
    }

    #[test]
    fn unknown_role_value_is_rejected() {
        assert!(serde_json::from_str::<Role>("\"manager\"").is_err());
    }

    #[test]
    fn unauthorized_message_is_opaque() {
        let msg = AuthError::Unauthorized.to_string();
        assert!(!msg.contains("email"));
        assert!(!msg.contains("password"));
        assert!(!msg.contains("secret"));
    }
}
