//! Dashboard statistics endpoint

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    error::AppResult,
    models::stats::{StatsQuery, StatsResult},
    services::stats::StatsParams,
    AppState,
};

use super::AuthenticatedUser;

/// Dashboard counts bucketed on the caller's calendar
///
/// Send `tzOffset` (e.g. `%2B05:30`) and `today` (`YYYY-MM-DD`) to get
/// `today`, `thisWeek` and the seven-day series on the browser's local days.
/// Records are restricted to the caller's scope.
#[utoipa::path(
    get,
    path = "/cars/stats",
    tag = "stats",
    security(("bearer_auth" = [])),
    params(StatsQuery),
    responses(
        (status = 200, description = "Dashboard statistics", body = StatsResult),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 500, description = "Store unavailable", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<StatsQuery>,
) -> AppResult<Json<StatsResult>> {
    let scope = state.services.users.resolve_scope(&claims).await?;
    let params = StatsParams::from(query);

    let stats = state.services.stats.compute_stats(&scope, &params).await?;
    Ok(Json(stats))
}
