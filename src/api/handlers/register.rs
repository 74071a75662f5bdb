use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error, instrument};

use super::{
    UserResponse, error_response, internal_error, registration_closed, request_context,
    session_headers, validation_response,
};
use crate::registration::{EmailOnlyBackend, RegistrationForm};

#[utoipa::path(
    post,
    path= "/v1/register",
    request_body = RegistrationForm,
    responses (
        (status = 201, description = "User created, logged in, activation email sent", body = UserResponse, content_type = "application/json"),
        (status = 400, description = "Missing or invalid email, or email already in use"),
        (status = 403, description = "Registration is closed"),
    ),
    tag= "register"
)]
// axum handler for the first signup step
#[instrument(skip(backend, headers, payload))]
pub async fn register(
    backend: Extension<Arc<EmailOnlyBackend>>,
    headers: HeaderMap,
    payload: Option<Json<RegistrationForm>>,
) -> Response {
    if !backend.registration_allowed() {
        return registration_closed().into_response();
    }

    let form: RegistrationForm = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let backend = backend.0;
    let mut ctx = request_context(&headers);

    // the backend and its collaborators block
    let result = tokio::task::spawn_blocking(move || {
        let email = match form.clean(backend.users()) {
            Ok(email) => email,
            Err(err) => {
                debug!("registration form rejected: {err}");
                return validation_response(&err).into_response();
            }
        };

        match backend.register(&mut ctx, Some(&email)) {
            Ok(user) => (
                StatusCode::CREATED,
                session_headers(&ctx, backend.settings().frontend_base_url()),
                Json(UserResponse::from(&user)),
            )
                .into_response(),
            Err(err) => error_response(&err).into_response(),
        }
    })
    .await;

    result.unwrap_or_else(|err| {
        error!("Registration task failed: {err}");
        internal_error().into_response()
    })
}
