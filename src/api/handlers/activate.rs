use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, instrument};
use utoipa::ToSchema;

use super::{
    UserResponse, error_response, internal_error, request_context, session_headers,
    validation_response,
};
use crate::registration::{ActivationForm, EmailOnlyBackend};

#[derive(ToSchema, Deserialize)]
pub struct ActivationRequest {
    activation_key: String,
    username: String,
    password: String,
}

impl std::fmt::Debug for ActivationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationRequest")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[utoipa::path(
    post,
    path= "/v1/activate",
    request_body = ActivationRequest,
    responses (
        (status = 200, description = "Username and password set, user logged in", body = UserResponse, content_type = "application/json"),
        (status = 400, description = "Invalid form data, or invalid or expired activation link"),
    ),
    tag= "register"
)]
// axum handler for the second signup step
#[instrument(skip(backend, headers, payload))]
pub async fn activate(
    backend: Extension<Arc<EmailOnlyBackend>>,
    headers: HeaderMap,
    payload: Option<Json<ActivationRequest>>,
) -> Response {
    let request: ActivationRequest = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let backend = backend.0;
    let mut ctx = request_context(&headers);

    let result = tokio::task::spawn_blocking(move || {
        let form = ActivationForm {
            username: request.username,
            password: request.password,
        };
        let input = match form.clean(backend.users()) {
            Ok(input) => input,
            Err(err) => {
                debug!("activation form rejected: {err}");
                return validation_response(&err).into_response();
            }
        };

        match backend.activate(
            &mut ctx,
            &request.activation_key,
            &input.username,
            &input.password,
        ) {
            Ok(Some(user)) => (
                StatusCode::OK,
                session_headers(&ctx, backend.settings().frontend_base_url()),
                Json(UserResponse::from(&user)),
            )
                .into_response(),
            Ok(None) => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "Invalid or expired activation link" })),
            )
                .into_response(),
            Err(err) => error_response(&err).into_response(),
        }
    })
    .await;

    result.unwrap_or_else(|err| {
        error!("Activation task failed: {err}");
        internal_error().into_response()
    })
}
