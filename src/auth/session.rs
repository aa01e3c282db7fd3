//! Credential-for-token exchange.
//!
//! Two entry points: `password_login` (email + password, web and admin
//! console) and `device_login` (paired-device secret, presented after a
//! fresh on-device biometric confirmation). Both return the same bearer
//! envelope; both fail opaquely when a credential is wrong.

use serde::Serialize;

use super::claims::{self, Claims};
use super::registrar::{constant_time_eq, epoch_secs, hash_token, Registrar, User};
use super::{AuthError, LoginPath, Role};

/// Default session lifetime: 8 hours (seconds).
const DEFAULT_SESSION_TTL_SECS: i64 = 8 * 60 * 60;

/// Bearer-token envelope returned by every login endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: &'static str,
}

/// Signs short-lived session tokens against registrar-held credentials.
pub struct SessionIssuer {
    secret: Vec<u8>,
    ttl_secs: i64,
}

impl SessionIssuer {
    pub fn new(secret: Vec<u8>, ttl_secs: Option<i64>) -> Self {
        Self {
            secret,
            ttl_secs: ttl_secs.unwrap_or(DEFAULT_SESSION_TTL_SECS),
        }
    }

    /// Exchange email + password for a session token.
    ///
    /// For employees the password path must be enabled by policy; the
    /// policy check comes first so a disabled account answers 403 even
    /// on a wrong password, revealing policy state but never credential
    /// validity.
    pub fn password_login(
        &self,
        registrar: &Registrar,
        email: &str,
        password: &str,
    ) -> Result<AccessToken, AuthError> {
        // Policy gate before password verification
        if let Some(user) = self.lookup_by_email(registrar, email)? {
            if user.role == Role::Employee {
                let policy = registrar.auth_policy(&user.id)?;
                if !policy.allow_password_login {
                    return Err(AuthError::PolicyDisabled(LoginPath::Password));
                }
            }
        }

        let user = registrar.authenticate(email, password)?;
        tracing::info!(role = user.role.as_str(), "Password login succeeded");
        self.issue(&user)
    }

    /// Exchange a paired device's identifier + secret for a session
    /// token. The caller is expected to have passed the biometric gate
    /// immediately before presenting the secret.
    pub fn device_login(
        &self,
        registrar: &Registrar,
        device_id: &str,
        device_secret: &str,
    ) -> Result<AccessToken, AuthError> {
        let cred = registrar
            .device_credential(device_id)?
            .ok_or(AuthError::Unauthorized)?;

        let user = registrar
            .get_user(&cred.employee_user_id)?
            .filter(|u| u.is_active && u.role == Role::Employee)
            .ok_or(AuthError::Unauthorized)?;

        let policy = registrar.auth_policy(&user.id)?;
        if !policy.allow_face_login {
            return Err(AuthError::PolicyDisabled(LoginPath::Biometric));
        }

        let attempt = hash_token(device_secret);
        if !constant_time_eq(cred.secret_hash.as_bytes(), attempt.as_bytes()) {
            return Err(AuthError::Unauthorized);
        }

        tracing::info!(device_id = cred.device_id, "Device login succeeded");
        self.issue(&user)
    }

    /// Verify a bearer token against this issuer's secret.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        claims::verify(token, &self.secret, epoch_secs())
    }

    fn issue(&self, user: &User) -> Result<AccessToken, AuthError> {
        let now = epoch_secs();
        let claims = Claims {
            sub: user.id.clone(),
            role: user.role,
            iat: now,
            exp: now + self.ttl_secs,
        };
        let token = claims::sign(&claims, &self.secret)
            .map_err(|_| AuthError::Invalid("claims serialization failed"))?;
        Ok(AccessToken {
            access_token: token,
            token_type: "bearer",
        })
    }

    fn lookup_by_email(
        &self,
        registrar: &Registrar,
        email: &str,
    ) -> Result<Option<User>, AuthError> {
        registrar.user_by_email(email)
    }
}
