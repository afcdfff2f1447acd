//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, cars, health, stats, users};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Car Portal API",
        version = "1.0.0",
        description = "Dealership inventory REST API"
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::register,
        auth::verify_otp,
        auth::login,
        auth::admin_login,
        auth::me,
        auth::forgot_password,
        auth::reset_password,
        // Cars
        cars::list_cars,
        cars::get_car,
        cars::create_car,
        cars::update_car,
        cars::delete_car,
        cars::export_cars,
        // Stats
        stats::get_stats,
        // Users
        users::list_users,
        users::get_user,
        users::delete_user,
    ),
    components(
        schemas(
            // Auth
            auth::RegisterResponse,
            auth::LoginResponse,
            auth::VerifyOtpResponse,
            crate::models::user::RegisterRequest,
            crate::models::user::VerifyOtpRequest,
            crate::models::user::LoginRequest,
            crate::models::user::ForgotPasswordRequest,
            crate::models::user::ResetPasswordRequest,
            // Users
            crate::models::user::User,
            crate::models::user::Role,
            // Cars
            crate::models::car::Car,
            crate::models::car::InOutStatus,
            crate::models::car::CarSortBy,
            crate::models::car::SortDir,
            cars::CarUpload,
            // Stats
            crate::models::stats::StatsResult,
            crate::models::stats::StatsDebug,
            crate::models::stats::TopEntry,
            crate::models::stats::DailyCount,
            crate::models::stats::WindowSource,
            // Common
            super::MessageResponse,
            health::HealthResponse,
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Registration and authentication"),
        (name = "cars", description = "Car inventory management"),
        (name = "stats", description = "Dashboard statistics"),
        (name = "users", description = "User management")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new().merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_dashboard_endpoint() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/cars/stats"));
        assert!(doc.paths.paths.contains_key("/auth/verify-otp"));
        let components = doc.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
