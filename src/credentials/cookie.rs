//! Web session cookie handling.
//!
//! Browsers hold the session token in an HttpOnly cookie set by the
//! backend; page scripts never see it. A small in-memory mirror lets
//! server-rendered UI code ask "is someone logged in, and as what role"
//! without another round trip — it is advisory state only, the cookie
//! remains the credential.

use parking_lot::RwLock;

use crate::auth::claims::decode_role;
use crate::auth::Role;

/// Cookie that carries the web session token.
pub const TOKEN_COOKIE: &str = "pf_token";

/// `Set-Cookie` value installing a session token.
///
/// HttpOnly keeps it away from scripts; SameSite=Lax keeps cross-site
/// POSTs from carrying it.
pub fn session_cookie(token: &str) -> String {
    format!("{TOKEN_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// `Set-Cookie` value that expires the session cookie immediately.
pub fn clear_cookie() -> String {
    format!("{TOKEN_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

/// Extract the session token from a `Cookie` request header.
pub fn token_from_cookie_header(header: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == TOKEN_COOKIE && !value.is_empty()).then(|| value.to_string())
    })
}

/// Non-authoritative mirror of the browser session for UI decisions.
#[derive(Default)]
pub struct SessionMirror {
    token: RwLock<Option<String>>,
}

impl SessionMirror {
    pub fn set(&self, token: &str) {
        *self.token.write() = Some(token.to_string());
    }

    pub fn clear(&self) {
        *self.token.write() = None;
    }

    /// Role decoded from the mirrored token, if one is present and
    /// readable. Purely a UI hint.
    pub fn role_hint(&self) -> Option<Role> {
        self.token.read().as_deref().and_then(decode_role)
    }
}
