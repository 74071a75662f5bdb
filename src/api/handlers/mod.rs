pub mod health;
pub use self::health::health;

pub mod register;
pub use self::register::register;

pub mod activate;
pub use self::activate::activate;

// common functions for the handlers
use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header::InvalidHeaderValue},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::error;
use utoipa::ToSchema;

use crate::registration::{Error, RequestContext, UserRecord, ValidationError};

const SESSION_COOKIE_NAME: &str = "emailfirst_session";

/// Public view of a user record.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct UserResponse {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub has_usable_password: bool,
}

impl From<&UserRecord> for UserResponse {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id.get(),
            username: user.username.clone(),
            email: user.email.clone(),
            has_usable_password: user.has_usable_password(),
        }
    }
}

/// Extract a client IP from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext::new().with_client_ip(extract_client_ip(headers))
}

/// `HttpOnly` cookie carrying the session token; `Secure` behind https.
pub(crate) fn session_cookie(token: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Set the session cookie for the request's login, if any.
pub(crate) fn session_headers(ctx: &RequestContext, frontend_base_url: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let secure = frontend_base_url.starts_with("https://");
    if let Some(session) = ctx.session() {
        match session_cookie(&session.token, secure) {
            Ok(cookie) => {
                headers.insert(axum::http::header::SET_COOKIE, cookie);
            }
            Err(err) => error!("Failed to build session cookie: {err}"),
        }
    }
    headers
}

pub(crate) fn validation_response(err: &ValidationError) -> (StatusCode, Json<Value>) {
    if let ValidationError::Store(store) = err {
        error!("User store failed during validation: {store}");
        return internal_error();
    }
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "field": err.field(), "error": err.to_string() })),
    )
}

pub(crate) fn error_response(err: &Error) -> (StatusCode, Json<Value>) {
    match err {
        Error::InvalidArgument(reason) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": reason })),
        ),
        Error::RegistrationClosed => registration_closed(),
        other => {
            error!("Registration backend failed: {other}");
            internal_error()
        }
    }
}

pub(crate) fn registration_closed() -> (StatusCode, Json<Value>) {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "Registration is closed" })),
    )
}

pub(crate) fn internal_error() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
}
