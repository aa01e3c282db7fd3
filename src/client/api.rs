//! Typed HTTP client for the pairing and session endpoints.
//!
//! Every backend error arrives as `{"detail": "..."}` with a status
//! code; `ApiError` keeps the status distinction (a revoked device
//! answers 401, an expired code 410) because the flow layer reacts
//! differently to each. Transport failures are reported separately from
//! rejections so the UI can say "server unreachable" instead of
//! "wrong credentials".

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::auth::registrar::{Device, IssuedCode};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Header carrying the client device identifier.
pub const DEVICE_ID_HEADER: &str = "X-Device-Id";

/// Client-side view of an endpoint failure.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Expired(String),
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Falha ao conectar na API ({0})")]
    Network(String),
}

/// Bearer envelope returned by the login endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

/// Response of a successful pairing call.
#[derive(Debug, Clone, Deserialize)]
pub struct PairResponse {
    pub device_secret: String,
    #[serde(default)]
    pub employee_user_id: String,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct DeviceLoginRequest<'a> {
    device_id: &'a str,
    device_secret: &'a str,
}

#[derive(Serialize)]
struct PairRequest<'a> {
    code: &'a str,
    device_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    device_name: Option<&'a str>,
}

/// Wire shape of backend rejections.
#[derive(Deserialize)]
struct Detail {
    detail: String,
}

/// The subset of endpoints the mobile flow drives. A seam so flow tests
/// can substitute a recording fake.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn pair_device(
        &self,
        code: &str,
        device_id: &str,
        device_name: Option<&str>,
    ) -> Result<PairResponse, ApiError>;
    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError>;
    async fn device_login(
        &self,
        device_id: &str,
        device_secret: &str,
    ) -> Result<TokenResponse, ApiError>;
}

/// HTTP client bound to one backend base URL.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<B: Serialize, T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
        bearer: Option<&str>,
        device_id: Option<&str>,
    ) -> Result<T, ApiError> {
        let mut req = self.http.post(self.url(path)).json(body);
        if let Some(token) = bearer {
            req = req.bearer_auth(token);
        }
        if let Some(id) = device_id {
            req = req.header(DEVICE_ID_HEADER, id);
        }

        let resp = req
            .send()
            .await
            .map_err(|_| ApiError::Network(self.base_url.clone()))?;
        Self::decode(resp).await
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        bearer: &str,
    ) -> Result<T, ApiError> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(bearer)
            .send()
            .await
            .map_err(|_| ApiError::Network(self.base_url.clone()))?;
        Self::decode(resp).await
    }

    async fn decode<T: for<'de> Deserialize<'de>>(resp: reqwest::Response) -> Result<T, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return resp
                .json()
                .await
                .map_err(|e| ApiError::Api {
                    status: status.as_u16(),
                    message: format!("resposta inválida: {e}"),
                });
        }

        let message = resp
            .json::<Detail>()
            .await
            .map(|d| d.detail)
            .unwrap_or_else(|_| format!("HTTP {status}"));

        Err(match status {
            StatusCode::UNAUTHORIZED => ApiError::Unauthorized(message),
            StatusCode::FORBIDDEN => ApiError::Forbidden(message),
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            StatusCode::CONFLICT => ApiError::Conflict(message),
            StatusCode::GONE => ApiError::Expired(message),
            _ => ApiError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    // ── Admin endpoints (bearer-authenticated) ──────────────────────

    /// Ask the backend to issue a pairing code for an employee.
    pub async fn issue_pairing_code(
        &self,
        bearer: &str,
        employee_id: &str,
    ) -> Result<IssuedCode, ApiError> {
        #[derive(Deserialize)]
        struct Issued {
            code: String,
            expires_at: i64,
        }
        let issued: Issued = self
            .post_json(
                &format!("/admin/funcionarios/{employee_id}/device-pairing-code"),
                &serde_json::json!({}),
                Some(bearer),
                None,
            )
            .await?;
        Ok(IssuedCode {
            code: issued.code,
            expires_at: issued.expires_at,
        })
    }

    /// Current device pairing status for an employee.
    pub async fn device_status(
        &self,
        bearer: &str,
        employee_id: &str,
    ) -> Result<Option<Device>, ApiError> {
        #[derive(Deserialize)]
        struct Status {
            paired: bool,
            device_id: Option<String>,
            device_name: Option<String>,
            created_at: Option<i64>,
        }
        let status: Status = self
            .get_json(&format!("/admin/funcionarios/{employee_id}/device"), bearer)
            .await?;
        Ok(if status.paired {
            Some(Device {
                employee_user_id: employee_id.to_string(),
                device_id: status.device_id.unwrap_or_default(),
                device_name: status.device_name,
                created_at: status.created_at.unwrap_or_default(),
            })
        } else {
            None
        })
    }

    /// Revoke an employee's active device. Returns whether one existed.
    pub async fn revoke_device(&self, bearer: &str, employee_id: &str) -> Result<bool, ApiError> {
        #[derive(Deserialize)]
        struct Revoked {
            revoked: bool,
        }
        let r: Revoked = self
            .post_json(
                &format!("/admin/funcionarios/{employee_id}/device/revoke"),
                &serde_json::json!({}),
                Some(bearer),
                None,
            )
            .await?;
        Ok(r.revoked)
    }
}

#[async_trait]
impl AuthApi for ApiClient {
    async fn pair_device(
        &self,
        code: &str,
        device_id: &str,
        device_name: Option<&str>,
    ) -> Result<PairResponse, ApiError> {
        self.post_json(
            "/pair-device",
            &PairRequest {
                code,
                device_id,
                device_name,
            },
            None,
            Some(device_id),
        )
        .await
    }

    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        self.post_json("/auth/login", &LoginRequest { email, password }, None, None)
            .await
    }

    async fn device_login(
        &self,
        device_id: &str,
        device_secret: &str,
    ) -> Result<TokenResponse, ApiError> {
        self.post_json(
            "/auth/device-login",
            &DeviceLoginRequest {
                device_id,
                device_secret,
            },
            None,
            Some(device_id),
        )
        .await
    }
}
