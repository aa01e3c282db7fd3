//! Axum HTTP gateway exposing the pairing and session endpoints.
//!
//! Three surfaces share one router: the mobile endpoints (`/pair-device`,
//! `/auth/device-login`), the credential login (`/auth/login`), and the
//! admin console (`/admin/...`, bearer-gated) plus its cookie-based web
//! session endpoints (`/web/...`). Rejections are `{"detail": "..."}`
//! with user-facing Portuguese messages; body limits and a request
//! timeout are applied router-wide.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::auth::claims::decode_role;
use crate::auth::code::scan_payload;
use crate::auth::registrar::Registrar;
use crate::auth::session::SessionIssuer;
use crate::auth::{AuthError, LoginPath, Role};
use crate::credentials::cookie;

/// Maximum request body size (16KB) — these endpoints carry only small
/// JSON payloads.
pub const MAX_BODY_SIZE: usize = 16_384;
/// Request timeout.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub registrar: Arc<Registrar>,
    pub sessions: Arc<SessionIssuer>,
}

/// Build the full router.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-device-id"),
        ])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(handle_health))
        .route("/auth/login", post(handle_login))
        .route("/auth/device-login", post(handle_device_login))
        .route("/pair-device", post(handle_pair_device))
        .route(
            "/admin/funcionarios/{id}/device-pairing-code",
            post(handle_issue_code),
        )
        .route("/admin/funcionarios/{id}/device", get(handle_device_status))
        .route(
            "/admin/funcionarios/{id}/device/revoke",
            post(handle_revoke_device),
        )
        .route("/web/login", post(handle_web_login))
        .route("/web/logout", post(handle_web_logout))
        .route("/web/session", get(handle_web_session))
        .with_state(state)
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ))
}

/// Bind and serve until Ctrl-C.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Gateway listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

type ApiResponse = (StatusCode, Json<serde_json::Value>);

fn detail(status: StatusCode, message: &str) -> ApiResponse {
    (status, Json(json!({ "detail": message })))
}

/// Default mapping of domain failures onto the wire, with the opaque
/// 401 message supplied per endpoint.
fn reject(err: AuthError, unauthorized_msg: &str) -> ApiResponse {
    match err {
        AuthError::Unauthorized => detail(StatusCode::UNAUTHORIZED, unauthorized_msg),
        AuthError::PolicyDisabled(LoginPath::Password) => detail(
            StatusCode::FORBIDDEN,
            "Login por senha desabilitado para este funcionário",
        ),
        AuthError::PolicyDisabled(LoginPath::Biometric) => detail(
            StatusCode::FORBIDDEN,
            "Login por reconhecimento facial desabilitado para este funcionário",
        ),
        AuthError::Conflict => detail(
            StatusCode::CONFLICT,
            "Funcionário já possui um código pendente ou dispositivo ativo",
        ),
        AuthError::NotFound => detail(StatusCode::NOT_FOUND, "Funcionário não encontrado"),
        AuthError::Expired => detail(StatusCode::GONE, "Código de pareamento expirado"),
        AuthError::Invalid(msg) => detail(StatusCode::BAD_REQUEST, msg),
        AuthError::Storage(e) => {
            tracing::error!(error = %e, "Storage failure in gateway handler");
            detail(StatusCode::INTERNAL_SERVER_ERROR, "Erro interno")
        }
    }
}

/// Require a valid admin bearer token.
fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiResponse> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Não autenticado"))?;

    let claims = state
        .sessions
        .verify(token)
        .ok_or_else(|| detail(StatusCode::UNAUTHORIZED, "Não autenticado"))?;

    if claims.role != Role::Admin {
        return Err(detail(
            StatusCode::FORBIDDEN,
            "Acesso restrito ao administrador",
        ));
    }
    Ok(())
}

// ── Handlers ────────────────────────────────────────────────────────

async fn handle_health() -> ApiResponse {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn handle_login(State(state): State<AppState>, Json(body): Json<LoginBody>) -> ApiResponse {
    match state
        .sessions
        .password_login(&state.registrar, &body.email, &body.password)
    {
        Ok(token) => (
            StatusCode::OK,
            Json(json!({
                "access_token": token.access_token,
                "token_type": token.token_type,
            })),
        ),
        Err(e) => reject(e, "Credenciais inválidas"),
    }
}

#[derive(Deserialize)]
struct DeviceLoginBody {
    device_id: String,
    device_secret: String,
}

async fn handle_device_login(
    State(state): State<AppState>,
    Json(body): Json<DeviceLoginBody>,
) -> ApiResponse {
    match state
        .sessions
        .device_login(&state.registrar, &body.device_id, &body.device_secret)
    {
        Ok(token) => (
            StatusCode::OK,
            Json(json!({
                "access_token": token.access_token,
                "token_type": token.token_type,
            })),
        ),
        Err(e) => reject(e, "Dispositivo não cadastrado"),
    }
}

#[derive(Deserialize)]
struct PairBody {
    code: String,
    device_id: String,
    device_name: Option<String>,
}

async fn handle_pair_device(
    State(state): State<AppState>,
    Json(body): Json<PairBody>,
) -> ApiResponse {
    match state
        .registrar
        .consume_pairing_code(&body.code, &body.device_id, body.device_name.as_deref())
    {
        Ok(paired) => (
            StatusCode::OK,
            Json(json!({
                "device_secret": paired.device_secret,
                "employee_user_id": paired.employee_user_id,
            })),
        ),
        Err(AuthError::NotFound) => {
            detail(StatusCode::NOT_FOUND, "Código inválido ou já utilizado")
        }
        Err(AuthError::Conflict) => detail(
            StatusCode::CONFLICT,
            "Funcionário já possui um dispositivo ativo",
        ),
        Err(e) => reject(e, "Credenciais inválidas"),
    }
}

async fn handle_issue_code(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }
    match state.registrar.issue_pairing_code(&employee_id) {
        Ok(issued) => (
            StatusCode::OK,
            Json(json!({
                "code": issued.code,
                "expires_at": issued.expires_at,
                "scan_payload": scan_payload(&issued.code),
            })),
        ),
        Err(e) => reject(e, "Não autenticado"),
    }
}

async fn handle_device_status(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }
    match state.registrar.device_status(&employee_id) {
        Ok(Some(device)) => (
            StatusCode::OK,
            Json(json!({
                "paired": true,
                "device_id": device.device_id,
                "device_name": device.device_name,
                "created_at": device.created_at,
            })),
        ),
        Ok(None) => (StatusCode::OK, Json(json!({ "paired": false }))),
        Err(e) => reject(e, "Não autenticado"),
    }
}

async fn handle_revoke_device(
    State(state): State<AppState>,
    Path(employee_id): Path<String>,
    headers: HeaderMap,
) -> ApiResponse {
    if let Err(resp) = require_admin(&state, &headers) {
        return resp;
    }
    match state.registrar.revoke_device(&employee_id) {
        Ok(revoked) => (StatusCode::OK, Json(json!({ "ok": true, "revoked": revoked }))),
        Err(e) => reject(e, "Não autenticado"),
    }
}

// ── Web session (cookie) endpoints ──────────────────────────────────

async fn handle_web_login(State(state): State<AppState>, Json(body): Json<LoginBody>) -> Response {
    match state
        .sessions
        .password_login(&state.registrar, &body.email, &body.password)
    {
        Ok(token) => {
            let role = decode_role(&token.access_token);
            (
                StatusCode::OK,
                [(header::SET_COOKIE, cookie::session_cookie(&token.access_token))],
                Json(json!({ "ok": true, "role": role })),
            )
                .into_response()
        }
        Err(e) => reject(e, "Credenciais inválidas").into_response(),
    }
}

async fn handle_web_logout() -> Response {
    (
        StatusCode::OK,
        [(header::SET_COOKIE, cookie::clear_cookie())],
        Json(json!({ "ok": true })),
    )
        .into_response()
}

/// Session probe for the web UI. The role here is decoded after a full
/// signature + expiry check; an unreadable or stale cookie simply reads
/// as logged out.
async fn handle_web_session(State(state): State<AppState>, headers: HeaderMap) -> ApiResponse {
    let claims = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(cookie::token_from_cookie_header)
        .and_then(|token| state.sessions.verify(&token));

    match claims {
        Some(claims) => (
            StatusCode::OK,
            Json(json!({ "authenticated": true, "role": claims.role })),
        ),
        None => (
            StatusCode::OK,
            Json(json!({ "authenticated": false, "role": null })),
        ),
    }
}
