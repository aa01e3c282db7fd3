//! Configuration: a small TOML file with environment overrides.
//!
//! Precedence: environment variables, then the config file, then
//! defaults. The signing secret should be set explicitly in production;
//! a missing secret is replaced by a random one, which invalidates all
//! sessions on restart.

use anyhow::{Context, Result};
use rand::RngCore;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

const DEFAULT_BIND: &str = "127.0.0.1:8011";
const DEFAULT_CODE_TTL_SECS: u64 = 600;
const DEFAULT_SESSION_TTL_SECS: i64 = 8 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Gateway bind address.
    pub bind: String,
    /// SQLite database path. Defaults to the platform data directory.
    pub db_path: Option<PathBuf>,
    /// Hex-encoded token signing secret.
    pub token_secret: Option<String>,
    /// Pairing-code lifetime in seconds.
    pub code_ttl_secs: u64,
    /// Session-token lifetime in seconds.
    pub session_ttl_secs: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            db_path: None,
            token_secret: None,
            code_ttl_secs: DEFAULT_CODE_TTL_SECS,
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
        }
    }
}

impl Config {
    /// Load from an optional TOML file, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(bind) = std::env::var("PONTOFACIL_BIND") {
            config.bind = bind;
        }
        if let Ok(db) = std::env::var("PONTOFACIL_DB") {
            config.db_path = Some(PathBuf::from(db));
        }
        if let Ok(secret) = std::env::var("PONTOFACIL_TOKEN_SECRET") {
            config.token_secret = Some(secret);
        }
        Ok(config)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        self.bind
            .parse()
            .with_context(|| format!("invalid bind address {:?}", self.bind))
    }

    /// Database path, defaulting to the platform data directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(path.clone());
        }
        let dirs = directories::ProjectDirs::from("", "", "pontofacil")
            .context("no home directory available for the default database path")?;
        Ok(dirs.data_dir().join("registrar.db"))
    }

    /// Signing secret bytes. Generates an ephemeral one when unset.
    pub fn signing_secret(&self) -> Result<Vec<u8>> {
        match &self.token_secret {
            Some(hex_secret) => {
                let bytes = hex::decode(hex_secret).context("token_secret must be hex")?;
                anyhow::ensure!(bytes.len() >= 32, "token_secret must be at least 32 bytes");
                Ok(bytes)
            }
            None => {
                tracing::warn!(
                    "No token_secret configured; using an ephemeral secret — \
                     all sessions will be invalidated on restart"
                );
                let mut bytes = vec![0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut bytes);
                Ok(bytes)
            }
        }
    }
}
