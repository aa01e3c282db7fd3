//! SQLite-backed device registrar.
//!
//! Tables:
//! - `users`: email, password_hash, salt, role, is_active
//! - `auth_policies`: per-employee login-path switches
//! - `pairing_codes`: code_hash, employee, issued_at/expires_at/consumed_at
//! - `devices`: device_id, secret_hash, created_at/revoked_at
//!
//! ## Invariants
//! - At most one *pending* (unconsumed, unexpired) pairing code per
//!   employee; issuing while one pends is a `Conflict`.
//! - At most one *active* (unrevoked) device per employee; code
//!   consumption and device creation commit in one transaction, so a
//!   single code can never mint two devices.
//! - Pairing codes and device secrets are stored hashed and are never
//!   retrievable after issue.

use anyhow::Result;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::{AuthError, Role};

/// Default pairing-code lifetime: 10 minutes (seconds).
const DEFAULT_CODE_TTL_SECS: u64 = 600;

/// Device-secret byte length before hex encoding (32 bytes = 64 hex chars).
const SECRET_BYTES: usize = 32;

/// Salt byte length for password hashing.
const SALT_BYTES: usize = 16;

/// Number of SHA-256 iterations for password stretching.
const HASH_ITERATIONS: u32 = 100_000;

/// Minimum accepted client-generated device identifier length.
const MIN_DEVICE_ID_LEN: usize = 8;

/// A registered user (admin or employee).
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub email: String,
    pub nome: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: i64,
}

/// Per-employee login-path policy.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
    pub allow_password_login: bool,
    pub allow_face_login: bool,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            allow_password_login: true,
            allow_face_login: false,
        }
    }
}

/// An active paired device, as reported to the admin console.
#[derive(Debug, Clone)]
pub struct Device {
    pub employee_user_id: String,
    pub device_id: String,
    pub device_name: Option<String>,
    pub created_at: i64,
}

/// Internal row used by the session issuer to check a device secret.
#[derive(Debug, Clone)]
pub struct DeviceCredential {
    pub employee_user_id: String,
    pub device_id: String,
    pub secret_hash: String,
}

/// A freshly issued pairing code. The plaintext code exists only here.
#[derive(Debug, Clone)]
pub struct IssuedCode {
    pub code: String,
    pub expires_at: i64,
}

/// Result of consuming a pairing code. The secret exists only here and
/// must be persisted by the client immediately.
#[derive(Debug, Clone)]
pub struct PairedDevice {
    pub device_secret: String,
    pub employee_user_id: String,
}

/// SQLite-backed registrar owning employees, pairing codes, and devices.
pub struct Registrar {
    conn: Mutex<rusqlite::Connection>,
    code_ttl_secs: u64,
}

impl Registrar {
    /// Open (or create) the registrar database at the given path.
    pub fn open(db_path: &Path, code_ttl_secs: Option<u64>) -> Result<Self> {
        let conn = rusqlite::Connection::open(db_path)?;
        Self::init(conn, code_ttl_secs)
    }

    /// In-memory registrar for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = rusqlite::Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    fn init(conn: rusqlite::Connection, code_ttl_secs: Option<u64>) -> Result<Self> {
        // WAL mode for concurrent reads + crash safety
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                salt TEXT NOT NULL,
                nome TEXT NOT NULL,
                role TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS auth_policies (
                employee_user_id TEXT PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                allow_password_login INTEGER NOT NULL DEFAULT 1,
                allow_face_login INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS pairing_codes (
                code_hash TEXT PRIMARY KEY,
                employee_user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                issued_at INTEGER NOT NULL,
                expires_at INTEGER NOT NULL,
                consumed_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_pairing_codes_employee
                ON pairing_codes(employee_user_id);

            CREATE TABLE IF NOT EXISTS devices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                employee_user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                device_id TEXT NOT NULL,
                device_secret_hash TEXT NOT NULL,
                device_name TEXT,
                created_at INTEGER NOT NULL,
                revoked_at INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_devices_employee ON devices(employee_user_id);
            CREATE INDEX IF NOT EXISTS idx_devices_device_id ON devices(device_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_devices_active_device_id
                ON devices(device_id) WHERE revoked_at IS NULL;",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            code_ttl_secs: code_ttl_secs.unwrap_or(DEFAULT_CODE_TTL_SECS),
        })
    }

    // ── User Management ─────────────────────────────────────────────

    /// Register a new user. Returns the user ID.
    pub fn add_user(
        &self,
        email: &str,
        nome: &str,
        password: &str,
        role: Role,
    ) -> Result<String, AuthError> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(AuthError::Invalid("email must be a valid address"));
        }
        if password.len() < 8 {
            return Err(AuthError::Invalid("password must be at least 8 characters"));
        }

        let user_id = uuid::Uuid::new_v4().to_string();
        let salt = generate_salt();
        let password_hash = hash_password(password, &salt);
        let now = epoch_secs();

        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO users (id, email, password_hash, salt, nome, role, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7)",
            rusqlite::params![user_id, email, password_hash, salt, nome, role.as_str(), now],
        );

        match result {
            Ok(_) => {
                tracing::info!(role = role.as_str(), "User registered");
                Ok(user_id)
            }
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(AuthError::Conflict)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Authenticate by email + password. Opaque failure: callers learn
    /// only that the pair was invalid, never which half.
    pub fn authenticate(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let conn = self.conn.lock();
        let row: Result<(User, String, String), _> = conn.query_row(
            "SELECT id, email, nome, role, is_active, created_at, password_hash, salt
             FROM users WHERE email = ?1 COLLATE NOCASE",
            rusqlite::params![email.trim()],
            |row| Ok((user_from_row(row)?, row.get(6)?, row.get(7)?)),
        );

        match row {
            Ok((user, stored_hash, salt)) => {
                let attempt = hash_password(password, &salt);
                if !constant_time_eq(stored_hash.as_bytes(), attempt.as_bytes()) {
                    return Err(AuthError::Unauthorized);
                }
                if !user.is_active {
                    return Err(AuthError::Unauthorized);
                }
                Ok(user)
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                // Dummy hash to keep timing flat when the email is unknown
                let _ = hash_password(password, "0000000000000000");
                Err(AuthError::Unauthorized)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by email (case-insensitive).
    pub fn user_by_email(&self, email: &str) -> Result<Option<User>, AuthError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, email, nome, role, is_active, created_at
             FROM users WHERE email = ?1 COLLATE NOCASE",
            rusqlite::params![email.trim()],
            user_from_row,
        );
        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a user by ID.
    pub fn get_user(&self, user_id: &str) -> Result<Option<User>, AuthError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT id, email, nome, role, is_active, created_at FROM users WHERE id = ?1",
            rusqlite::params![user_id],
            user_from_row,
        );
        match row {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Deactivate an employee: blocks both login paths, revokes the
    /// active device, and discards any pending pairing code.
    pub fn deactivate_employee(&self, employee_user_id: &str) -> Result<(), AuthError> {
        let employee = self.require_active_employee(employee_user_id)?;
        let now = epoch_secs();
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE users SET is_active = 0 WHERE id = ?1",
            rusqlite::params![employee.id],
        )?;
        conn.execute(
            "UPDATE devices SET revoked_at = ?1
             WHERE employee_user_id = ?2 AND revoked_at IS NULL",
            rusqlite::params![now, employee.id],
        )?;
        conn.execute(
            "DELETE FROM pairing_codes WHERE employee_user_id = ?1 AND consumed_at IS NULL",
            rusqlite::params![employee.id],
        )?;
        tracing::info!("Employee deactivated; device revoked");
        Ok(())
    }

    // ── Auth Policy ─────────────────────────────────────────────────

    /// Fetch the employee's login-path policy, creating the default row
    /// (password on, face off) on first read.
    pub fn auth_policy(&self, employee_user_id: &str) -> Result<AuthPolicy, AuthError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT allow_password_login, allow_face_login
             FROM auth_policies WHERE employee_user_id = ?1",
            rusqlite::params![employee_user_id],
            |row| {
                Ok(AuthPolicy {
                    allow_password_login: row.get(0)?,
                    allow_face_login: row.get(1)?,
                })
            },
        );
        match row {
            Ok(policy) => Ok(policy),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                let policy = AuthPolicy::default();
                conn.execute(
                    "INSERT INTO auth_policies
                        (employee_user_id, allow_password_login, allow_face_login, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        employee_user_id,
                        policy.allow_password_login,
                        policy.allow_face_login,
                        epoch_secs()
                    ],
                )?;
                Ok(policy)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the employee's login-path policy.
    pub fn set_auth_policy(
        &self,
        employee_user_id: &str,
        policy: AuthPolicy,
    ) -> Result<(), AuthError> {
        self.require_employee(employee_user_id)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO auth_policies
                (employee_user_id, allow_password_login, allow_face_login, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(employee_user_id) DO UPDATE SET
                allow_password_login = excluded.allow_password_login,
                allow_face_login = excluded.allow_face_login,
                updated_at = excluded.updated_at",
            rusqlite::params![
                employee_user_id,
                policy.allow_password_login,
                policy.allow_face_login,
                epoch_secs()
            ],
        )?;
        Ok(())
    }

    // ── Pairing Codes ───────────────────────────────────────────────

    /// Issue a single-use pairing code for an employee.
    ///
    /// Fails with `Conflict` while a pending code or an active device
    /// exists — the admin must revoke the device first.
    pub fn issue_pairing_code(&self, employee_user_id: &str) -> Result<IssuedCode, AuthError> {
        let employee = self.require_active_employee(employee_user_id)?;

        let code = super::code::generate_code();
        let now = epoch_secs();
        let expires_at = now + self.code_ttl_secs as i64;

        // Check + insert under one transaction, so two concurrent issue
        // requests cannot both observe "no pending code" and insert.
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let active: i64 = tx.query_row(
            "SELECT COUNT(*) FROM devices
             WHERE employee_user_id = ?1 AND revoked_at IS NULL",
            rusqlite::params![employee.id],
            |row| row.get(0),
        )?;
        if active > 0 {
            return Err(AuthError::Conflict);
        }

        let pending: i64 = tx.query_row(
            "SELECT COUNT(*) FROM pairing_codes
             WHERE employee_user_id = ?1 AND consumed_at IS NULL AND expires_at > ?2",
            rusqlite::params![employee.id, now],
            |row| row.get(0),
        )?;
        if pending > 0 {
            return Err(AuthError::Conflict);
        }

        tx.execute(
            "INSERT INTO pairing_codes (code_hash, employee_user_id, issued_at, expires_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![hash_token(&code), employee.id, now, expires_at],
        )?;
        tx.commit()?;

        tracing::info!(
            ttl_secs = self.code_ttl_secs,
            "Pairing code issued for employee"
        );
        Ok(IssuedCode { code, expires_at })
    }

    /// Consume a pairing code: marks it used and creates the device in
    /// one transaction. The returned secret is shown exactly once.
    pub fn consume_pairing_code(
        &self,
        code: &str,
        device_id: &str,
        device_name: Option<&str>,
    ) -> Result<PairedDevice, AuthError> {
        if device_id.len() < MIN_DEVICE_ID_LEN {
            return Err(AuthError::Invalid("device_id must be at least 8 characters"));
        }

        let code_hash = hash_token(code.trim());
        let now = epoch_secs();

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let row: Result<(String, i64, Option<i64>), _> = tx.query_row(
            "SELECT employee_user_id, expires_at, consumed_at
             FROM pairing_codes WHERE code_hash = ?1",
            rusqlite::params![code_hash],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        );

        let (employee_user_id, expires_at, consumed_at) = match row {
            Ok(r) => r,
            Err(rusqlite::Error::QueryReturnedNoRows) => return Err(AuthError::NotFound),
            Err(e) => return Err(e.into()),
        };

        // Two phones scanning the same code: the first consume creates
        // the device, so the loser must see Conflict here — before the
        // consumed check, which covers codes burned by a since-revoked
        // pairing.
        let active: i64 = tx.query_row(
            "SELECT COUNT(*) FROM devices
             WHERE employee_user_id = ?1 AND revoked_at IS NULL",
            rusqlite::params![employee_user_id],
            |row| row.get(0),
        )?;
        if active > 0 {
            return Err(AuthError::Conflict);
        }

        if consumed_at.is_some() {
            return Err(AuthError::NotFound);
        }
        if expires_at <= now {
            return Err(AuthError::Expired);
        }

        let consumed = tx.execute(
            "UPDATE pairing_codes SET consumed_at = ?1
             WHERE code_hash = ?2 AND consumed_at IS NULL",
            rusqlite::params![now, code_hash],
        )?;
        if consumed != 1 {
            return Err(AuthError::Conflict);
        }

        let device_secret = generate_secret();
        let inserted = tx.execute(
            "INSERT INTO devices
                (employee_user_id, device_id, device_secret_hash, device_name, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                employee_user_id,
                device_id,
                hash_token(&device_secret),
                device_name,
                now
            ],
        );
        match inserted {
            Ok(_) => {}
            // device_id already active for another employee; the
            // rollback leaves this code unconsumed so the phone can
            // retry with a fresh identifier
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(AuthError::Conflict);
            }
            Err(e) => return Err(e.into()),
        }
        tx.commit()?;

        tracing::info!(device_id = device_id, "Pairing code consumed, device created");
        Ok(PairedDevice {
            device_secret,
            employee_user_id,
        })
    }

    // ── Devices ─────────────────────────────────────────────────────

    /// The employee's active device, if any.
    pub fn device_status(&self, employee_user_id: &str) -> Result<Option<Device>, AuthError> {
        self.require_employee(employee_user_id)?;
        self.active_device(employee_user_id)
    }

    /// Revoke the employee's active device. Idempotent; returns whether
    /// a device was actually revoked. Punches already recorded through
    /// the device are untouched.
    pub fn revoke_device(&self, employee_user_id: &str) -> Result<bool, AuthError> {
        self.require_employee(employee_user_id)?;
        let now = epoch_secs();
        let conn = self.conn.lock();
        let revoked = conn.execute(
            "UPDATE devices SET revoked_at = ?1
             WHERE employee_user_id = ?2 AND revoked_at IS NULL",
            rusqlite::params![now, employee_user_id],
        )?;
        if revoked > 0 {
            tracing::info!("Device revoked by admin");
        }
        Ok(revoked > 0)
    }

    /// Credential lookup for device login: the active device matching
    /// this client-generated identifier, if any. At most one active row
    /// per device_id (unique partial index).
    pub fn device_credential(&self, device_id: &str) -> Result<Option<DeviceCredential>, AuthError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT employee_user_id, device_id, device_secret_hash
             FROM devices WHERE device_id = ?1 AND revoked_at IS NULL",
            rusqlite::params![device_id],
            |row| {
                Ok(DeviceCredential {
                    employee_user_id: row.get(0)?,
                    device_id: row.get(1)?,
                    secret_hash: row.get(2)?,
                })
            },
        );
        match row {
            Ok(cred) => Ok(Some(cred)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // ── Internals ───────────────────────────────────────────────────

    fn active_device(&self, employee_user_id: &str) -> Result<Option<Device>, AuthError> {
        let conn = self.conn.lock();
        let row = conn.query_row(
            "SELECT employee_user_id, device_id, device_name, created_at
             FROM devices WHERE employee_user_id = ?1 AND revoked_at IS NULL",
            rusqlite::params![employee_user_id],
            |row| {
                Ok(Device {
                    employee_user_id: row.get(0)?,
                    device_id: row.get(1)?,
                    device_name: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        );
        match row {
            Ok(device) => Ok(Some(device)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn require_employee(&self, user_id: &str) -> Result<User, AuthError> {
        match self.get_user(user_id)? {
            Some(user) if user.role == Role::Employee => Ok(user),
            _ => Err(AuthError::NotFound),
        }
    }

    fn require_active_employee(&self, user_id: &str) -> Result<User, AuthError> {
        let user = self.require_employee(user_id)?;
        if !user.is_active {
            return Err(AuthError::NotFound);
        }
        Ok(user)
    }

    #[cfg(test)]
    fn force_expire_codes(&self, employee_user_id: &str) {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE pairing_codes SET expires_at = 0 WHERE employee_user_id = ?1",
            rusqlite::params![employee_user_id],
        )
        .unwrap();
    }
}

fn user_from_row(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let role: String = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        nome: row.get(2)?,
        role: if role == "admin" { Role::Admin } else { Role::Employee },
        is_active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

// ── Cryptographic Helpers ───────────────────────────────────────────

/// Generate a random salt (hex-encoded).
fn generate_salt() -> String {
    let mut bytes = [0u8; SALT_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Generate a random device secret (hex-encoded).
fn generate_secret() -> String {
    let mut bytes = [0u8; SECRET_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a password with salt using iterated SHA-256.
fn hash_password(password: &str, salt: &str) -> String {
    let mut hash = Sha256::new();
    hash.update(salt.as_bytes());
    hash.update(password.as_bytes());
    let mut result = hash.finalize();

    // Iterated hashing for key stretching
    for _ in 1..HASH_ITERATIONS {
        let mut h = Sha256::new();
        h.update(result);
        h.update(salt.as_bytes());
        result = h.finalize();
    }

    hex::encode(result)
}

/// Hash a pairing code or device secret (SHA-256, single pass — both
/// are short-lived or high-entropy, not user-chosen passwords).
pub(crate) fn hash_token(token: &str) -> String {
    let mut h = Sha256::new();
    h.update(token.as_bytes());
    hex::encode(h.finalize())
}

/// Constant-time byte comparison to prevent timing attacks.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Current Unix epoch in seconds.
pub(crate) fn epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registrar() -> Registrar {
        Registrar::open_in_memory().unwrap()
    }

    fn add_employee(reg: &Registrar) -> String {
        reg.add_user("ana@empresa.com", "Ana Souza", "senha-segura-1", Role::Employee)
            .unwrap()
    }

    #[test]
    fn add_and_authenticate_user() {
        let reg = test_registrar();
        let id = add_employee(&reg);

        let user = reg.authenticate("ana@empresa.com", "senha-segura-1").unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Employee);
    }

    #[test]
    fn authenticate_is_opaque_for_wrong_password_and_unknown_email() {
        let reg = test_registrar();
        add_employee(&reg);

        let wrong = reg.authenticate("ana@empresa.com", "senha-errada").unwrap_err();
        let ghost = reg.authenticate("ghost@empresa.com", "qualquer-senha").unwrap_err();
        assert!(matches!(wrong, AuthError::Unauthorized));
        assert!(matches!(ghost, AuthError::Unauthorized));
    }

    #[test]
    fn duplicate_email_is_conflict() {
        let reg = test_registrar();
        add_employee(&reg);
        let err = reg
            .add_user("ANA@empresa.com", "Outra", "outra-senha-1", Role::Employee)
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
    }

    #[test]
    fn issue_code_then_pending_code_conflicts() {
        let reg = test_registrar();
        let id = add_employee(&reg);

        let issued = reg.issue_pairing_code(&id).unwrap();
        assert_eq!(issued.code.len(), crate::auth::code::CODE_LEN);
        assert!(issued.expires_at > epoch_secs());

        let err = reg.issue_pairing_code(&id).unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
    }

    #[test]
    fn issue_code_after_expiry_succeeds() {
        let reg = test_registrar();
        let id = add_employee(&reg);

        reg.issue_pairing_code(&id).unwrap();
        reg.force_expire_codes(&id);
        assert!(reg.issue_pairing_code(&id).is_ok());
    }

    #[test]
    fn issue_code_for_unknown_or_admin_user_is_not_found() {
        let reg = test_registrar();
        let admin = reg
            .add_user("chefe@empresa.com", "Chefe", "senha-segura-1", Role::Admin)
            .unwrap();

        assert!(matches!(
            reg.issue_pairing_code("nao-existe").unwrap_err(),
            AuthError::NotFound
        ));
        assert!(matches!(
            reg.issue_pairing_code(&admin).unwrap_err(),
            AuthError::NotFound
        ));
    }

    #[test]
    fn consume_code_creates_device_and_flips_status() {
        let reg = test_registrar();
        let id = add_employee(&reg);
        assert!(reg.device_status(&id).unwrap().is_none());

        let issued = reg.issue_pairing_code(&id).unwrap();
        let paired = reg
            .consume_pairing_code(&issued.code, "pf-1122334455", Some("Celular da Ana"))
            .unwrap();
        assert_eq!(paired.employee_user_id, id);
        assert_eq!(paired.device_secret.len(), SECRET_BYTES * 2);

        let device = reg.device_status(&id).unwrap().unwrap();
        assert_eq!(device.device_id, "pf-1122334455");
        assert_eq!(device.device_name.as_deref(), Some("Celular da Ana"));
    }

    #[test]
    fn second_phone_consuming_same_code_gets_conflict() {
        let reg = test_registrar();
        let id = add_employee(&reg);
        let issued = reg.issue_pairing_code(&id).unwrap();

        reg.consume_pairing_code(&issued.code, "pf-primeiro1", None).unwrap();
        let err = reg
            .consume_pairing_code(&issued.code, "pf-segundo22", None)
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));
    }

    #[test]
    fn concurrent_issue_yields_single_pending_code() {
        use std::sync::{Arc, Barrier};

        let reg = Arc::new(test_registrar());
        let id = add_employee(&reg);

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let reg = Arc::clone(&reg);
                let id = id.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    reg.issue_pairing_code(&id).is_ok()
                })
            })
            .collect();

        let issued = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(issued, 1);

        let conn = reg.conn.lock();
        let pending: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM pairing_codes
                 WHERE employee_user_id = ?1 AND consumed_at IS NULL",
                rusqlite::params![id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(pending, 1);
    }

    #[test]
    fn device_id_taken_by_another_employee_is_conflict() {
        let reg = test_registrar();
        let ana = add_employee(&reg);
        let bia = reg
            .add_user("bia@empresa.com", "Bia Lima", "senha-segura-2", Role::Employee)
            .unwrap();

        let issued = reg.issue_pairing_code(&ana).unwrap();
        reg.consume_pairing_code(&issued.code, "pf-12345678", None).unwrap();

        let issued = reg.issue_pairing_code(&bia).unwrap();
        let err = reg
            .consume_pairing_code(&issued.code, "pf-12345678", None)
            .unwrap_err();
        assert!(matches!(err, AuthError::Conflict));

        // The code was not burned; a fresh identifier pairs fine and
        // Ana's login credential is untouched
        let paired = reg
            .consume_pairing_code(&issued.code, "pf-87654321", None)
            .unwrap();
        assert_eq!(paired.employee_user_id, bia);
        assert_eq!(
            reg.device_credential("pf-12345678").unwrap().unwrap().employee_user_id,
            ana
        );
    }

    #[test]
    fn consume_unknown_or_consumed_code_is_not_found() {
        let reg = test_registrar();
        let id = add_employee(&reg);
        let issued = reg.issue_pairing_code(&id).unwrap();

        assert!(matches!(
            reg.consume_pairing_code("NAOEXIST", "pf-12345678", None).unwrap_err(),
            AuthError::NotFound
        ));

        reg.consume_pairing_code(&issued.code, "pf-12345678", None).unwrap();
        reg.revoke_device(&id).unwrap();
        // Consumed code stays consumed even after the device is gone
        assert!(matches!(
            reg.consume_pairing_code(&issued.code, "pf-87654321", None).unwrap_err(),
            AuthError::NotFound
        ));
    }

    #[test]
    fn consume_expired_code_is_expired_regardless_of_device_id() {
        let reg = test_registrar();
        let id = add_employee(&reg);
        let issued = reg.issue_pairing_code(&id).unwrap();
        reg.force_expire_codes(&id);

        for device_id in ["pf-aaaaaaaa", "pf-bbbbbbbb"] {
            let err = reg
                .consume_pairing_code(&issued.code, device_id, None)
                .unwrap_err();
            assert!(matches!(err, AuthError::Expired));
        }
    }

    #[test]
    fn consume_with_short_device_id_is_invalid() {
        let reg = test_registrar();
        let id = add_employee(&reg);
        let issued = reg.issue_pairing_code(&id).unwrap();

        let err = reg.consume_pairing_code(&issued.code, "curto", None).unwrap_err();
        assert!(matches!(err, AuthError::Invalid(_)));
    }

    #[test]
    fn issue_while_device_active_conflicts_until_revoked() {
        let reg = test_registrar();
        let id = add_employee(&reg);

        let issued = reg.issue_pairing_code(&id).unwrap();
        reg.consume_pairing_code(&issued.code, "pf-12345678", None).unwrap();

        assert!(matches!(
            reg.issue_pairing_code(&id).unwrap_err(),
            AuthError::Conflict
        ));

        assert!(reg.revoke_device(&id).unwrap());
        // Idempotent
        assert!(!reg.revoke_device(&id).unwrap());

        let fresh = reg.issue_pairing_code(&id).unwrap();
        assert!(reg
            .consume_pairing_code(&fresh.code, "pf-87654321", None)
            .is_ok());
    }

    #[test]
    fn revoked_device_yields_no_credential() {
        let reg = test_registrar();
        let id = add_employee(&reg);
        let issued = reg.issue_pairing_code(&id).unwrap();
        reg.consume_pairing_code(&issued.code, "pf-12345678", None).unwrap();

        assert!(reg.device_credential("pf-12345678").unwrap().is_some());
        reg.revoke_device(&id).unwrap();
        assert!(reg.device_credential("pf-12345678").unwrap().is_none());
    }

    #[test]
    fn deactivate_employee_revokes_device_and_codes() {
        let reg = test_registrar();
        let id = add_employee(&reg);
        let issued = reg.issue_pairing_code(&id).unwrap();
        reg.consume_pairing_code(&issued.code, "pf-12345678", None).unwrap();

        reg.deactivate_employee(&id).unwrap();
        assert!(reg.device_credential("pf-12345678").unwrap().is_none());
        assert!(matches!(
            reg.authenticate("ana@empresa.com", "senha-segura-1").unwrap_err(),
            AuthError::Unauthorized
        ));
    }

    #[test]
    fn auth_policy_defaults_and_update() {
        let reg = test_registrar();
        let id = add_employee(&reg);

        let policy = reg.auth_policy(&id).unwrap();
        assert!(policy.allow_password_login);
        assert!(!policy.allow_face_login);

        reg.set_auth_policy(
            &id,
            AuthPolicy {
                allow_password_login: false,
                allow_face_login: true,
            },
        )
        .unwrap();

        let updated = reg.auth_policy(&id).unwrap();
        assert!(!updated.allow_password_login);
        assert!(updated.allow_face_login);
    }

    #[test]
    fn password_hash_is_salt_sensitive() {
        let h1 = hash_password("mesma-senha", "salt_a");
        let h2 = hash_password("mesma-senha", "salt_b");
        assert_ne!(h1, h2);
        assert_eq!(hash_password("mesma-senha", "salt_a"), h1);
    }

    #[test]
    fn constant_time_eq_works() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
