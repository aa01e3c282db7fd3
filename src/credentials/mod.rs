//! Client-side credential persistence.
//!
//! A device carries up to three credentials with very different
//! lifetimes: a stable `device_id` (generated once, survives everything
//! short of app data deletion), a long-lived `device_secret` (minted at
//! pairing, rotated by re-pairing), and a short-lived `session_token`
//! (cleared on logout). `CredentialStore` is the single seam through
//! which flows read and write them — nothing else touches platform
//! storage.

pub mod cookie;
pub mod secure;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Everything a paired client persists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialBundle {
    /// Stable client-generated identity, `pf-<32 hex>`.
    pub device_id: String,
    /// Pairing secret; present only while paired.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_secret: Option<String>,
    /// Current bearer session; present only while logged in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
}

/// Storage seam for the credential bundle.
pub trait CredentialStore: Send + Sync {
    /// Read the persisted bundle, `None` if nothing was ever saved.
    fn load(&self) -> anyhow::Result<Option<CredentialBundle>>;
    /// Persist the bundle, replacing any previous one.
    fn save(&self, bundle: &CredentialBundle) -> anyhow::Result<()>;
    /// Remove the bundle entirely.
    fn clear(&self) -> anyhow::Result<()>;
}

/// Generate a fresh client device identifier.
pub fn generate_device_id() -> String {
    let mut bytes = [0u8; 16];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    format!("pf-{}", hex::encode(bytes))
}

/// Load the bundle, minting and persisting a device id on first run.
pub fn ensure_device_id(store: &dyn CredentialStore) -> anyhow::Result<CredentialBundle> {
    if let Some(bundle) = store.load()? {
        if !bundle.device_id.is_empty() {
            return Ok(bundle);
        }
    }
    let bundle = CredentialBundle {
        device_id: generate_device_id(),
        ..Default::default()
    };
    store.save(&bundle)?;
    Ok(bundle)
}

/// In-memory store for unit tests across the crate.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub(crate) struct MemoryStore {
        inner: Mutex<Option<CredentialBundle>>,
        pub(crate) fail_saves: std::sync::atomic::AtomicBool,
    }

    impl CredentialStore for MemoryStore {
        fn load(&self) -> anyhow::Result<Option<CredentialBundle>> {
            Ok(self.inner.lock().clone())
        }
        fn save(&self, bundle: &CredentialBundle) -> anyhow::Result<()> {
            if self.fail_saves.load(std::sync::atomic::Ordering::Relaxed) {
                anyhow::bail!("simulated storage failure");
            }
            *self.inner.lock() = Some(bundle.clone());
            Ok(())
        }
        fn clear(&self) -> anyhow::Result<()> {
            *self.inner.lock() = None;
            Ok(())
        }
    }
}
