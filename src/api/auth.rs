//! Registration, login and password reset endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::AppResult,
    models::user::{
        ForgotPasswordRequest, LoginRequest, RegisterRequest, ResetPasswordRequest, Role, User,
        VerifyOtpRequest,
    },
    services::users::RESET_REQUESTED_MESSAGE,
    AppState,
};

use super::{AuthenticatedUser, MessageResponse};

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    /// Pending registration id to send back with the OTP
    pub user_id: Uuid,
}

#[derive(Serialize, ToSchema)]
pub struct LoginResponse {
    pub user: User,
    /// JWT bearer token
    pub token: String,
}

#[derive(Serialize, ToSchema)]
pub struct VerifyOtpResponse {
    pub message: String,
    pub user: User,
    pub token: String,
}

/// Start a registration and email a one-time password
#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "OTP sent", body = RegisterResponse),
        (status = 400, description = "Invalid input or OTP already sent", body = crate::error::ErrorResponse),
        (status = 409, description = "Email already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let user_id = state.services.users.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "OTP sent to your email".to_string(),
            user_id,
        }),
    ))
}

/// Confirm a registration with its OTP
#[utoipa::path(
    post,
    path = "/auth/verify-otp",
    tag = "auth",
    request_body = VerifyOtpRequest,
    responses(
        (status = 201, description = "Account created", body = VerifyOtpResponse),
        (status = 400, description = "Invalid or expired OTP", body = crate::error::ErrorResponse)
    )
)]
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(request): Json<VerifyOtpRequest>,
) -> AppResult<(StatusCode, Json<VerifyOtpResponse>)> {
    let (token, user) = state
        .services
        .users
        .verify_otp(request.user_id, &request.otp)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(VerifyOtpResponse {
            message: "Registration complete".to_string(),
            user,
            token,
        }),
    ))
}

/// Login for regular users
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 403, description = "Account is an admin", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (token, user) = state
        .services
        .users
        .authenticate(&request.email, &request.password, Role::User)
        .await?;

    Ok(Json(LoginResponse { user, token }))
}

/// Login for administrators
#[utoipa::path(
    post,
    path = "/auth/admin/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ErrorResponse),
        (status = 403, description = "Account is not an admin", body = crate::error::ErrorResponse)
    )
)]
pub async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (token, user) = state
        .services
        .users
        .authenticate(&request.email, &request.password, Role::Admin)
        .await?;

    Ok(Json(LoginResponse { user, token }))
}

/// Get current user profile
#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current user", body = User),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<User>> {
    let user = state.services.users.get_by_id(claims.sub).await?;
    Ok(Json(user))
}

/// Request a password reset link
#[utoipa::path(
    post,
    path = "/auth/forgot-password",
    tag = "auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset requested", body = MessageResponse),
        (status = 400, description = "Invalid email", body = crate::error::ErrorResponse)
    )
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    request.validate()?;
    state.services.users.forgot_password(&request.email).await?;
    Ok(Json(MessageResponse::new(RESET_REQUESTED_MESSAGE)))
}

/// Set a new password using an emailed reset token
#[utoipa::path(
    post,
    path = "/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid input or expired link", body = crate::error::ErrorResponse)
    )
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    state.services.users.reset_password(request).await?;
    Ok(Json(MessageResponse::new("Password has been reset")))
}
