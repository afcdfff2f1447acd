//! Car record endpoints

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::Multipart;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::car::{Car, CarForm, CarQuery},
    services::cars::{MediaUpload, XLSX_CONTENT_TYPE},
    AppState,
};

use super::{AuthenticatedUser, MessageResponse, PaginatedResponse};

/// Maximum number of photos per submission
pub const MAX_PHOTOS: usize = 10;

/// Multipart body of create and update requests
#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct CarUpload {
    /// Required on create
    reg_no: Option<String>,
    make: Option<String>,
    model: Option<String>,
    variant: Option<String>,
    year: Option<i32>,
    colour: Option<String>,
    kmp: Option<String>,
    person_name: Option<String>,
    cell_no: Option<String>,
    price: Option<String>,
    referral_id: Option<String>,
    /// `IN` or `OUT`
    in_out_status: Option<String>,
    /// RFC 3339 timestamp
    in_out_date_time: Option<String>,
    /// Image files; replace all existing photos on update
    #[schema(value_type = Option<Vec<String>>, format = Binary)]
    photos: Option<Vec<Vec<u8>>>,
    #[schema(value_type = Option<String>, format = Binary)]
    video: Option<Vec<u8>>,
}

/// Text fields and files of a multipart car submission
pub struct CarSubmission {
    pub form: CarForm,
    pub photos: Vec<MediaUpload>,
    pub video: Option<MediaUpload>,
}

async fn read_submission(mut multipart: Multipart) -> AppResult<CarSubmission> {
    let mut form = CarForm::default();
    let mut photos = Vec::new();
    let mut video = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart request: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);

        match (name.as_str(), file_name) {
            ("photos" | "photos[]", Some(file_name)) => {
                if photos.len() >= MAX_PHOTOS {
                    return Err(AppError::Validation(format!(
                        "At most {} photos are allowed",
                        MAX_PHOTOS
                    )));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Multipart error: {}", e)))?;
                if !data.is_empty() {
                    photos.push(MediaUpload {
                        file_name: Some(file_name),
                        data: data.to_vec(),
                    });
                }
            }
            ("video", Some(file_name)) => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Multipart error: {}", e)))?;
                if !data.is_empty() {
                    video = Some(MediaUpload {
                        file_name: Some(file_name),
                        data: data.to_vec(),
                    });
                }
            }
            // Existing media is managed by the server, not echoed back by clients
            ("photos" | "photos[]" | "video", None) => {}
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Multipart error: {}", e)))?;
                form.set_field(&name, value)?;
            }
        }
    }

    Ok(CarSubmission { form, photos, video })
}

/// List cars with search, filters and pagination
#[utoipa::path(
    get,
    path = "/cars",
    tag = "cars",
    security(("bearer_auth" = [])),
    params(CarQuery),
    responses(
        (status = 200, description = "Page of cars", body = PaginatedResponse<Car>),
        (status = 400, description = "Invalid filter", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn list_cars(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<CarQuery>,
) -> AppResult<Json<PaginatedResponse<Car>>> {
    let scope = state.services.users.resolve_scope(&claims).await?;
    let (items, total) = state.services.cars.list(&scope, &query).await?;

    Ok(Json(PaginatedResponse {
        total,
        page: query.page(),
        limit: query.limit(),
        items,
    }))
}

/// Get car details by ID
#[utoipa::path(
    get,
    path = "/cars/{id}",
    tag = "cars",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Car ID")),
    responses(
        (status = 200, description = "Car details", body = Car),
        (status = 404, description = "Car not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_car(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Car>> {
    let scope = state.services.users.resolve_scope(&claims).await?;
    let car = state.services.cars.get(&scope, id).await?;
    Ok(Json(car))
}

/// Create a car record
#[utoipa::path(
    post,
    path = "/cars",
    tag = "cars",
    security(("bearer_auth" = [])),
    request_body(content = CarUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Car created", body = Car),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_car(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<Car>)> {
    let scope = state.services.users.resolve_scope(&claims).await?;
    let submission = read_submission(multipart).await?;

    let car = state
        .services
        .cars
        .create(&scope, claims.sub, submission.form, submission.photos, submission.video)
        .await?;

    Ok((StatusCode::CREATED, Json(car)))
}

/// Update a car record
#[utoipa::path(
    put,
    path = "/cars/{id}",
    tag = "cars",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Car ID")),
    request_body(content = CarUpload, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Car updated", body = Car),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Car not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_car(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> AppResult<Json<Car>> {
    let scope = state.services.users.resolve_scope(&claims).await?;
    let submission = read_submission(multipart).await?;

    let car = state
        .services
        .cars
        .update(&scope, id, submission.form, submission.photos, submission.video)
        .await?;

    Ok(Json(car))
}

/// Delete a car record and its media
#[utoipa::path(
    delete,
    path = "/cars/{id}",
    tag = "cars",
    security(("bearer_auth" = [])),
    params(("id" = Uuid, Path, description = "Car ID")),
    responses(
        (status = 200, description = "Car deleted", body = MessageResponse),
        (status = 404, description = "Car not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_car(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MessageResponse>> {
    let scope = state.services.users.resolve_scope(&claims).await?;
    state.services.cars.delete(&scope, id).await?;
    Ok(Json(MessageResponse::new("Car deleted")))
}

/// Export the whole inventory as an Excel workbook (admin only)
#[utoipa::path(
    get,
    path = "/cars/export",
    tag = "cars",
    security(("bearer_auth" = [])),
    responses(
        (
            status = 200,
            description = "Excel workbook attachment",
            content_type = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            body = Vec<u8>
        ),
        (status = 403, description = "Admin only", body = crate::error::ErrorResponse)
    )
)]
pub async fn export_cars(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<impl IntoResponse> {
    claims.require_admin()?;

    let (file_name, body) = state.services.cars.export().await?;
    let headers = [
        (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        ),
    ];

    Ok((headers, body))
}
