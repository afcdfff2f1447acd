//! Cars repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        car::{Car, CarExportRow, CarForm, CarQuery, DateWindow, GroupField, InOutStatus, RecordScope, SortDir},
        stats::TopEntry,
    },
};

/// Read-only queries the dashboard aggregator issues against car records.
///
/// Every method takes the caller's scope and must AND it into its query.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CarStore: Send + Sync {
    /// Count records in scope, optionally restricted to a date window
    async fn count(&self, scope: &RecordScope, window: DateWindow) -> AppResult<i64>;

    /// Most recent records by `in_out_date_time`
    async fn recent(&self, scope: &RecordScope, limit: i64) -> AppResult<Vec<Car>>;

    /// Distinct values of `field` with their counts, most frequent first
    async fn top_values(&self, scope: &RecordScope, field: GroupField, limit: i64) -> AppResult<Vec<TopEntry>>;

    /// Per-day counts for one status, bucketed by calendar date at `offset`,
    /// for days in `[from, to]`. Days without records are omitted.
    async fn daily_counts(
        &self,
        scope: &RecordScope,
        status: InOutStatus,
        offset: FixedOffset,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<Vec<(NaiveDate, i64)>>;
}

#[derive(Clone)]
pub struct CarsRepository {
    pool: Pool<Postgres>,
}

/// Resolved lower/upper bounds of a listing query
pub struct DateBounds {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

fn push_scope(qb: &mut QueryBuilder<'_, Postgres>, scope: &RecordScope) {
    match scope {
        RecordScope::All => {
            qb.push(" TRUE");
        }
        RecordScope::Referral(referral_id) => {
            qb.push(" referral_id = ").push_bind(referral_id.clone());
        }
        RecordScope::Denied => {
            qb.push(" FALSE");
        }
    }
}

/// Calendar date of `in_out_date_time` on a clock set to `offset`
fn push_local_date(qb: &mut QueryBuilder<'_, Postgres>, offset: &FixedOffset) {
    qb.push("((in_out_date_time AT TIME ZONE 'UTC') + make_interval(mins => ")
        .push_bind(offset.local_minus_utc() / 60)
        .push("))::date");
}

fn push_window(qb: &mut QueryBuilder<'_, Postgres>, window: &DateWindow) {
    match window {
        DateWindow::Any => {}
        DateWindow::Since(since) => {
            qb.push(" AND in_out_date_time >= ").push_bind(*since);
        }
        DateWindow::LocalDays { offset, from, to } => {
            qb.push(" AND ");
            push_local_date(qb, offset);
            qb.push(" BETWEEN ").push_bind(*from).push(" AND ").push_bind(*to);
        }
    }
}

/// Escape LIKE wildcards and wrap for a substring match
fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_listing_filters(
    qb: &mut QueryBuilder<'_, Postgres>,
    scope: &RecordScope,
    query: &CarQuery,
    bounds: &DateBounds,
) {
    push_scope(qb, scope);

    if let Some(term) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
        let pattern = like_pattern(term.trim());
        qb.push(" AND (");
        let mut any = qb.separated(" OR ");
        for column in ["reg_no", "person_name", "make", "model", "variant", "colour", "referral_id"] {
            any.push(column)
                .push_unseparated(" ILIKE ")
                .push_bind_unseparated(pattern.clone());
        }
        qb.push(")");
    }

    let field_filters = [
        ("reg_no", &query.reg_no),
        ("person_name", &query.person_name),
        ("make", &query.make),
        ("model", &query.model),
    ];
    for (column, value) in field_filters {
        if let Some(value) = value.as_deref().filter(|s| !s.is_empty()) {
            qb.push(format!(" AND {} ILIKE ", column))
                .push_bind(like_pattern(value));
        }
    }

    if let Some(status) = query.status {
        qb.push(" AND in_out_status = ").push_bind(status);
    }
    if let Some(start) = bounds.start {
        qb.push(" AND in_out_date_time >= ").push_bind(start);
    }
    if let Some(end) = bounds.end {
        qb.push(" AND in_out_date_time <= ").push_bind(end);
    }
}

impl CarsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Search cars with filters, sorting and pagination
    pub async fn search(
        &self,
        scope: &RecordScope,
        query: &CarQuery,
        bounds: &DateBounds,
    ) -> AppResult<(Vec<Car>, i64)> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM cars WHERE");
        push_listing_filters(&mut count_qb, scope, query, bounds);
        let total = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let sort_by = query.sort_by.unwrap_or_default();
        let direction = match query.sort_dir.unwrap_or_default() {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        };

        let mut select_qb = QueryBuilder::new("SELECT * FROM cars WHERE");
        push_listing_filters(&mut select_qb, scope, query, bounds);
        select_qb
            .push(format!(" ORDER BY {} {}, id", sort_by.column(), direction))
            .push(" LIMIT ")
            .push_bind(query.limit())
            .push(" OFFSET ")
            .push_bind((query.page() - 1) * query.limit());

        let cars = select_qb
            .build_query_as::<Car>()
            .fetch_all(&self.pool)
            .await?;

        Ok((cars, total))
    }

    /// Get a car visible in `scope`
    pub async fn get_by_id(&self, scope: &RecordScope, id: Uuid) -> AppResult<Car> {
        let mut qb = QueryBuilder::new("SELECT * FROM cars WHERE");
        push_scope(&mut qb, scope);
        qb.push(" AND id = ").push_bind(id);

        qb.build_query_as::<Car>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Car with id {} not found", id)))
    }

    /// Insert a new car record
    pub async fn create(
        &self,
        form: &CarForm,
        photos: &[String],
        video: Option<&str>,
        created_by: Uuid,
    ) -> AppResult<Car> {
        let reg_no = form
            .reg_no
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation("regNo is required".to_string()))?;
        let now = Utc::now();

        let car = sqlx::query_as::<_, Car>(
            r#"
            INSERT INTO cars (
                id, reg_no, make, model, variant, year, colour, kmp,
                person_name, cell_no, price, referral_id, in_out_status,
                in_out_date_time, photos, video, created_by, created_at, updated_at
            ) VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                $14, $15, $16, $17, $18, $18
            )
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(reg_no)
        .bind(&form.make)
        .bind(&form.model)
        .bind(&form.variant)
        .bind(form.year)
        .bind(&form.colour)
        .bind(&form.kmp)
        .bind(&form.person_name)
        .bind(&form.cell_no)
        .bind(&form.price)
        .bind(&form.referral_id)
        .bind(form.in_out_status.unwrap_or(InOutStatus::In))
        .bind(form.in_out_date_time.unwrap_or(now))
        .bind(photos)
        .bind(video)
        .bind(created_by)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(car)
    }

    /// Update the fields present in `form`; `photos`/`video` replace the stored media when set
    pub async fn update(
        &self,
        id: Uuid,
        form: &CarForm,
        photos: Option<&[String]>,
        video: Option<&str>,
    ) -> AppResult<Car> {
        if form.reg_no.as_deref() == Some("") {
            return Err(AppError::Validation("regNo cannot be empty".to_string()));
        }

        let mut qb = QueryBuilder::new("UPDATE cars SET ");
        let mut sets = qb.separated(", ");
        sets.push("updated_at = ").push_bind_unseparated(Utc::now());

        macro_rules! set_field {
            ($field:expr, $column:literal) => {
                if let Some(ref value) = $field {
                    sets.push(concat!($column, " = "))
                        .push_bind_unseparated(value.clone());
                }
            };
        }

        set_field!(form.reg_no, "reg_no");
        set_field!(form.make, "make");
        set_field!(form.model, "model");
        set_field!(form.variant, "variant");
        set_field!(form.year, "year");
        set_field!(form.colour, "colour");
        set_field!(form.kmp, "kmp");
        set_field!(form.person_name, "person_name");
        set_field!(form.cell_no, "cell_no");
        set_field!(form.price, "price");
        set_field!(form.referral_id, "referral_id");
        set_field!(form.in_out_status, "in_out_status");
        set_field!(form.in_out_date_time, "in_out_date_time");

        if let Some(photos) = photos {
            sets.push("photos = ").push_bind_unseparated(photos.to_vec());
        }
        if let Some(video) = video {
            sets.push("video = ").push_bind_unseparated(video.to_string());
        }

        qb.push(" WHERE id = ").push_bind(id).push(" RETURNING *");

        qb.build_query_as::<Car>()
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Car with id {} not found", id)))
    }

    /// Delete a car record
    pub async fn delete(&self, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM cars WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Car with id {} not found", id)));
        }
        Ok(())
    }

    /// Whether any car still references a media path
    pub async fn media_in_use(&self, path: &str) -> AppResult<bool> {
        let in_use: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM cars WHERE $1 = ANY(photos) OR video = $1)",
        )
        .bind(path)
        .fetch_one(&self.pool)
        .await?;
        Ok(in_use)
    }

    /// All cars with the creator's name, oldest first
    pub async fn export_rows(&self) -> AppResult<Vec<CarExportRow>> {
        let rows = sqlx::query_as::<_, CarExportRow>(
            r#"
            SELECT c.*, u.name AS created_by_name
            FROM cars c
            LEFT JOIN users u ON c.created_by = u.id
            ORDER BY c.created_at, c.id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[async_trait]
impl CarStore for CarsRepository {
    async fn count(&self, scope: &RecordScope, window: DateWindow) -> AppResult<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM cars WHERE");
        push_scope(&mut qb, scope);
        push_window(&mut qb, &window);

        let count = qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn recent(&self, scope: &RecordScope, limit: i64) -> AppResult<Vec<Car>> {
        let mut qb = QueryBuilder::new("SELECT * FROM cars WHERE");
        push_scope(&mut qb, scope);
        qb.push(" ORDER BY in_out_date_time DESC, id LIMIT ").push_bind(limit);

        let cars = qb.build_query_as::<Car>().fetch_all(&self.pool).await?;
        Ok(cars)
    }

    async fn top_values(&self, scope: &RecordScope, field: GroupField, limit: i64) -> AppResult<Vec<TopEntry>> {
        let column = field.column();
        let mut qb = QueryBuilder::new(format!("SELECT {column} AS key, COUNT(*) AS count FROM cars WHERE"));
        push_scope(&mut qb, scope);
        qb.push(format!(" GROUP BY {column} ORDER BY count DESC, {column} LIMIT "))
            .push_bind(limit);

        let rows = qb
            .build_query_as::<(Option<String>, i64)>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(key, count)| TopEntry { key, count })
            .collect())
    }

    async fn daily_counts(
        &self,
        scope: &RecordScope,
        status: InOutStatus,
        offset: FixedOffset,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<Vec<(NaiveDate, i64)>> {
        let mut qb = QueryBuilder::new("SELECT ");
        push_local_date(&mut qb, &offset);
        qb.push(" AS day, COUNT(*) AS count FROM cars WHERE");
        push_scope(&mut qb, scope);
        qb.push(" AND in_out_status = ").push_bind(status);
        push_window(&mut qb, &DateWindow::LocalDays { offset, from, to });
        qb.push(" GROUP BY 1 ORDER BY 1");

        let rows = qb
            .build_query_as::<(NaiveDate, i64)>()
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(%status, %offset, %from, %to, buckets = rows.len(), "Daily bucket query");
        Ok(rows)
    }
}
