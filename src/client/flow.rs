//! Mobile pairing and login flow.
//!
//! Drives the device through its three screens: `Pair` (no secret),
//! `Login` (paired, no session), `Home` (live session). The flow owns
//! the ordering rules the endpoints alone cannot enforce:
//!
//! - the biometric gate runs immediately before *every* device login,
//!   and a non-confirmed outcome means the secret never leaves the
//!   device;
//! - a pairing secret that cannot be persisted is discarded on the
//!   spot — a secret held only in memory would strand the employee
//!   after the single-use code is already burned;
//! - one attempt at a time: a second tap while a scan or login is in
//!   flight is rejected instead of queued.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::auth::claims::decode_role;
use crate::auth::code::normalize_scanned;
use crate::auth::Role;
use crate::biometric::{BiometricGate, BiometricOutcome};
use crate::credentials::{ensure_device_id, CredentialBundle, CredentialStore};

use super::api::{ApiError, AuthApi};

/// Which screen the app should present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Pair,
    Login,
    Home,
}

/// Flow-level failures, layered over transport errors.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("another attempt is already in progress")]
    Busy,
    #[error("scanned payload is not a pairing code")]
    BadScan,
    #[error("biometric confirmation was cancelled")]
    BiometricCancelled,
    #[error("biometric authentication is unavailable on this device")]
    BiometricUnavailable,
    #[error("device is not paired")]
    NotPaired,
    #[error("pairing succeeded but the secret could not be stored; pair again")]
    SecretPersistFailed,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("credential storage failed: {0}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for FlowError {
    fn from(e: anyhow::Error) -> Self {
        FlowError::Store(e)
    }
}

/// State machine for one device.
pub struct MobileFlow<A, S, G> {
    api: A,
    store: S,
    gate: G,
    in_flight: AtomicBool,
}

impl<A: AuthApi, S: CredentialStore, G: BiometricGate> MobileFlow<A, S, G> {
    pub fn new(api: A, store: S, gate: G) -> Self {
        Self {
            api,
            store,
            gate,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Screen the app should show for the current credential state.
    pub fn screen(&self) -> Result<Screen, FlowError> {
        let bundle = self.bundle()?;
        Ok(match (&bundle.device_secret, &bundle.session_token) {
            (None, _) => Screen::Pair,
            (Some(_), None) => Screen::Login,
            (Some(_), Some(_)) => Screen::Home,
        })
    }

    /// Role from the stored session token. UI hint only.
    pub fn session_role(&self) -> Result<Option<Role>, FlowError> {
        let bundle = self.bundle()?;
        Ok(bundle.session_token.as_deref().and_then(decode_role))
    }

    /// Consume a scanned or typed pairing code.
    pub async fn pair(&self, raw_input: &str, device_name: Option<&str>) -> Result<(), FlowError> {
        let _guard = self.begin()?;
        let code = normalize_scanned(raw_input).ok_or(FlowError::BadScan)?;

        let mut bundle = self.bundle()?;
        let paired = self
            .api
            .pair_device(&code, &bundle.device_id, device_name)
            .await?;

        bundle.device_secret = Some(paired.device_secret);
        bundle.session_token = None;
        if let Err(e) = self.store.save(&bundle) {
            // The code is burned; a memory-only secret is useless after
            // the next app restart, so drop it and ask for a re-pair.
            tracing::error!(error = %e, "Failed to persist device secret after pairing");
            return Err(FlowError::SecretPersistFailed);
        }
        tracing::info!("Device paired");
        Ok(())
    }

    /// Biometric-gated device login.
    pub async fn biometric_login(&self) -> Result<(), FlowError> {
        let _guard = self.begin()?;
        let mut bundle = self.bundle()?;
        let secret = bundle
            .device_secret
            .clone()
            .ok_or(FlowError::NotPaired)?;

        // Fresh confirmation on every attempt; no caching
        match self.gate.authenticate().await {
            BiometricOutcome::Confirmed => {}
            BiometricOutcome::Cancelled => return Err(FlowError::BiometricCancelled),
            BiometricOutcome::Unavailable => return Err(FlowError::BiometricUnavailable),
        }

        match self.api.device_login(&bundle.device_id, &secret).await {
            Ok(token) => {
                bundle.session_token = Some(token.access_token);
                self.store.save(&bundle)?;
                Ok(())
            }
            Err(ApiError::Unauthorized(_)) => {
                // The secret is dead (revoked or re-paired elsewhere);
                // drop it so the app returns to the pairing screen.
                bundle.device_secret = None;
                bundle.session_token = None;
                self.store.save(&bundle)?;
                Err(FlowError::NotPaired)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Password fallback login (does not touch the pairing secret).
    pub async fn password_login(&self, email: &str, password: &str) -> Result<(), FlowError> {
        let _guard = self.begin()?;
        let mut bundle = self.bundle()?;
        let token = self.api.login(email, password).await?;
        bundle.session_token = Some(token.access_token);
        self.store.save(&bundle)?;
        Ok(())
    }

    /// End the session. Pairing (and the device id) survive.
    pub fn logout(&self) -> Result<(), FlowError> {
        let mut bundle = self.bundle()?;
        bundle.session_token = None;
        self.store.save(&bundle)?;
        Ok(())
    }

    /// Forget the pairing entirely; the device id is kept so a re-pair
    /// presents the same identity.
    pub fn reset_pairing(&self) -> Result<(), FlowError> {
        let mut bundle = self.bundle()?;
        bundle.device_secret = None;
        bundle.session_token = None;
        self.store.save(&bundle)?;
        tracing::info!("Pairing reset");
        Ok(())
    }

    fn bundle(&self) -> Result<CredentialBundle, FlowError> {
        Ok(ensure_device_id(&self.store)?)
    }

    fn begin(&self) -> Result<FlightGuard<'_>, FlowError> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(FlowError::Busy);
        }
        Ok(FlightGuard {
            flag: &self.in_flight,
        })
    }
}

/// Releases the busy flag even on early return.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
