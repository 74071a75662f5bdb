#![allow(clippy::needless_for_each)]

use utoipa::OpenApi;

use super::handlers::{
    UserResponse, activate, activate::__path_activate, health, health::__path_health,
    register, register::__path_register,
};
use crate::registration::RegistrationForm;

#[derive(OpenApi)]
#[openapi(
    paths(health, register, activate),
    components(schemas(
        health::Health,
        RegistrationForm,
        activate::ActivationRequest,
        UserResponse
    )),
    tags(
        (name = "emailfirst", description = "Email-first two-step signup API")
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_every_route() {
        let spec = openapi();
        let paths: Vec<&str> = spec.paths.paths.keys().map(String::as_str).collect();
        assert!(paths.contains(&"/health"));
        assert!(paths.contains(&"/v1/register"));
        assert!(paths.contains(&"/v1/activate"));
    }
}
