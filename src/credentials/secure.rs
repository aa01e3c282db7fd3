//! Encrypted on-disk credential store.
//!
//! The bundle is serialized to JSON and sealed with AES-256-GCM under a
//! caller-supplied key. File layout: 12-byte nonce followed by the
//! ciphertext. A fresh nonce is drawn for every save, so rewriting the
//! same bundle still produces a different file.

use aes_gcm::aead::{Aead, OsRng};
use aes_gcm::{AeadCore, Aes256Gcm, Key, KeyInit, Nonce};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::path::PathBuf;

use super::{CredentialBundle, CredentialStore};

const NONCE_LEN: usize = 12;

/// File-backed `CredentialStore` sealed with AES-256-GCM.
pub struct SecureFileStore {
    path: PathBuf,
    key: [u8; 32],
}

impl SecureFileStore {
    pub fn new(path: PathBuf, key: [u8; 32]) -> Self {
        Self { path, key }
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }
}

impl CredentialStore for SecureFileStore {
    fn load(&self) -> Result<Option<CredentialBundle>> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).context("reading credential store"),
        };
        if data.len() < NONCE_LEN {
            return Err(anyhow!("credential store truncated"));
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("credential store decryption failed"))?;
        let bundle = serde_json::from_slice(&plaintext).context("parsing credential store")?;
        Ok(Some(bundle))
    }

    fn save(&self, bundle: &CredentialBundle) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("creating credential store directory")?;
        }

        let plaintext = serde_json::to_vec(bundle)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher()
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| anyhow!("credential store encryption failed"))?;

        let mut data = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        data.extend_from_slice(&nonce);
        data.extend_from_slice(&ciphertext);

        // Write-then-rename so a crash mid-save never leaves a torn file
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, &data).context("writing credential store")?;
        fs::rename(&tmp, &self.path).context("committing credential store")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("clearing credential store"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir, key: [u8; 32]) -> SecureFileStore {
        SecureFileStore::new(dir.path().join("credentials.bin"), key)
    }

    fn sample_bundle() -> CredentialBundle {
        CredentialBundle {
            device_id: "pf-0011223344556677889900112233aa".into(),
            device_secret: Some("a".repeat(64)),
            session_token: Some("header.payload.sig".into()),
        }
    }

    #[test]
    fn save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, [7u8; 32]);

        assert!(store.load().unwrap().is_none());
        store.save(&sample_bundle()).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), sample_bundle());
    }

    #[test]
    fn ciphertext_hides_the_secret() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, [7u8; 32]);
        store.save(&sample_bundle()).unwrap();

        let raw = std::fs::read(dir.path().join("credentials.bin")).unwrap();
        let needle = "a".repeat(64);
        assert!(!raw.windows(needle.len()).any(|w| w == needle.as_bytes()));
    }

    #[test]
    fn wrong_key_fails_to_load() {
        let dir = TempDir::new().unwrap();
        store_in(&dir, [7u8; 32]).save(&sample_bundle()).unwrap();
        assert!(store_in(&dir, [8u8; 32]).load().is_err());
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, [7u8; 32]);
        store.save(&sample_bundle()).unwrap();
        store.clear().unwrap();
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn device_id_survives_session_clear() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir, [7u8; 32]);
        let mut bundle = sample_bundle();
        store.save(&bundle).unwrap();

        bundle.session_token = None;
        store.save(&bundle).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.device_id, bundle.device_id);
        assert!(loaded.session_token.is_none());
        assert!(loaded.device_secret.is_some());
    }
}
