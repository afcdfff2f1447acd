//! Car record model and related types

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Decode, Encode, FromRow, Postgres};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Whether the vehicle entered or left the yard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum InOutStatus {
    In,
    Out,
}

impl InOutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InOutStatus::In => "IN",
            InOutStatus::Out => "OUT",
        }
    }
}

impl std::fmt::Display for InOutStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InOutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "IN" => Ok(InOutStatus::In),
            "OUT" => Ok(InOutStatus::Out),
            _ => Err(format!("Invalid in/out status: {}", s)),
        }
    }
}

impl sqlx::Type<Postgres> for InOutStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<Postgres>>::compatible(ty)
    }
}

impl<'r> Decode<'r, Postgres> for InOutStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s: String = Decode::<Postgres>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl Encode<'_, Postgres> for InOutStatus {
    fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
        <&str as Encode<Postgres>>::encode(self.as_str(), buf)
    }
}

/// Full car record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    pub id: Uuid,
    pub reg_no: String,
    pub make: Option<String>,
    pub model: Option<String>,
    pub variant: Option<String>,
    pub year: Option<i32>,
    pub colour: Option<String>,
    pub kmp: Option<String>,
    pub person_name: Option<String>,
    pub cell_no: Option<String>,
    pub price: Option<String>,
    /// Employee id of the referring user; non-admin scopes match on it
    pub referral_id: Option<String>,
    pub in_out_status: InOutStatus,
    /// Instant the vehicle entered or left; all date bucketing uses this field
    pub in_out_date_time: DateTime<Utc>,
    /// Public URLs of the uploaded photos
    pub photos: Vec<String>,
    pub video: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Car record joined with the creator's display name, for exports
#[derive(Debug, Clone, FromRow)]
pub struct CarExportRow {
    #[sqlx(flatten)]
    pub car: Car,
    pub created_by_name: Option<String>,
}

/// Which records a caller may see
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordScope {
    /// Administrators see every record
    All,
    /// Restricted callers see records referred by their employee id
    Referral(String),
    /// Restricted caller without a linkable identity
    Denied,
}

/// Date restriction applied on `in_out_date_time`
#[derive(Debug, Clone, PartialEq)]
pub enum DateWindow {
    Any,
    /// Instants at or after the given one
    Since(DateTime<Utc>),
    /// Records whose calendar date at `offset` falls in `[from, to]`
    LocalDays {
        offset: FixedOffset,
        from: NaiveDate,
        to: NaiveDate,
    },
}

/// Columns the top-N aggregation can group on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    RegNo,
    PersonName,
}

impl GroupField {
    pub fn column(&self) -> &'static str {
        match self {
            GroupField::RegNo => "reg_no",
            GroupField::PersonName => "person_name",
        }
    }
}

/// Sortable columns for car listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
pub enum CarSortBy {
    #[default]
    #[serde(rename = "createdAt")]
    CreatedAt,
    #[serde(rename = "updatedAt")]
    UpdatedAt,
    #[serde(rename = "inOutDateTime")]
    InOutDateTime,
    #[serde(rename = "regNo")]
    RegNo,
    #[serde(rename = "personName")]
    PersonName,
    #[serde(rename = "make")]
    Make,
    #[serde(rename = "model")]
    Model,
}

impl CarSortBy {
    pub fn column(&self) -> &'static str {
        match self {
            CarSortBy::CreatedAt => "created_at",
            CarSortBy::UpdatedAt => "updated_at",
            CarSortBy::InOutDateTime => "in_out_date_time",
            CarSortBy::RegNo => "reg_no",
            CarSortBy::PersonName => "person_name",
            CarSortBy::Make => "make",
            CarSortBy::Model => "model",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortDir {
    Asc,
    #[default]
    Desc,
}

/// Car listing query parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct CarQuery {
    /// Free-text search across the descriptive fields
    pub search: Option<String>,
    pub reg_no: Option<String>,
    pub person_name: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub status: Option<InOutStatus>,
    /// Lower bound on inOutDateTime (RFC 3339 or YYYY-MM-DD)
    pub start_date: Option<String>,
    /// Upper bound on inOutDateTime (RFC 3339 or YYYY-MM-DD)
    pub end_date: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<CarSortBy>,
    pub sort_dir: Option<SortDir>,
}

impl CarQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(25).clamp(1, 100)
    }
}

/// Parse a listing bound. Date-only bounds resolve to UTC midnight.
pub fn parse_date_bound(value: &str) -> AppResult<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| AppError::Validation(format!("Invalid date: {}", value)))
}

/// Text fields of a create/update form. Absent fields are left untouched on update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CarForm {
    pub reg_no: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub variant: Option<String>,
    pub year: Option<i32>,
    pub colour: Option<String>,
    pub kmp: Option<String>,
    pub person_name: Option<String>,
    pub cell_no: Option<String>,
    pub price: Option<String>,
    pub referral_id: Option<String>,
    pub in_out_status: Option<InOutStatus>,
    pub in_out_date_time: Option<DateTime<Utc>>,
}

impl CarForm {
    /// Assign a multipart text field by its client-side name.
    /// Unknown fields (including `createdBy`) are ignored.
    pub fn set_field(&mut self, name: &str, value: String) -> AppResult<()> {
        let value = value.trim().to_string();
        match name {
            "regNo" => self.reg_no = Some(value),
            "make" => self.make = Some(value),
            "model" => self.model = Some(value),
            "variant" => self.variant = Some(value),
            "year" if value.is_empty() => self.year = None,
            "year" => {
                self.year = Some(
                    value
                        .parse()
                        .map_err(|_| AppError::Validation(format!("Invalid year: {}", value)))?,
                )
            }
            "colour" => self.colour = Some(value),
            "kmp" => self.kmp = Some(value),
            "personName" => self.person_name = Some(value),
            "cellNo" => self.cell_no = Some(value),
            "price" => self.price = Some(value),
            "referralId" => {
                if value.chars().count() > 16 {
                    return Err(AppError::Validation(
                        "Referral ID must be 16 characters or less".to_string(),
                    ));
                }
                self.referral_id = Some(value)
            }
            "inOutStatus" => {
                self.in_out_status = Some(value.parse().map_err(AppError::Validation)?)
            }
            "inOutDateTime" => self.in_out_date_time = Some(parse_date_bound(&value)?),
            other => tracing::debug!(field = %other, "Ignoring unknown car form field"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!("in".parse::<InOutStatus>(), Ok(InOutStatus::In));
        assert_eq!(" OUT ".parse::<InOutStatus>(), Ok(InOutStatus::Out));
        assert!("sideways".parse::<InOutStatus>().is_err());
    }

    #[test]
    fn test_status_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&InOutStatus::Out).unwrap(), "\"OUT\"");
    }

    #[test]
    fn test_query_bounds() {
        let q = CarQuery {
            page: Some(-3),
            limit: Some(500),
            ..Default::default()
        };
        assert_eq!(q.page(), 1);
        assert_eq!(q.limit(), 100);
        assert_eq!(CarQuery::default().limit(), 25);
    }

    #[test]
    fn test_parse_date_bound() {
        let d = parse_date_bound("2025-11-20").unwrap();
        assert_eq!(d.to_rfc3339(), "2025-11-20T00:00:00+00:00");
        let d = parse_date_bound("2025-11-20T23:30:00+05:30").unwrap();
        assert_eq!(d.to_rfc3339(), "2025-11-20T18:00:00+00:00");
        assert!(parse_date_bound("yesterday").is_err());
    }

    #[test]
    fn test_form_fields() {
        let mut form = CarForm::default();
        form.set_field("regNo", " KA01AB1234 ".into()).unwrap();
        form.set_field("year", "2019".into()).unwrap();
        form.set_field("inOutStatus", "out".into()).unwrap();
        form.set_field("createdBy", "someone".into()).unwrap();
        assert_eq!(form.reg_no.as_deref(), Some("KA01AB1234"));
        assert_eq!(form.year, Some(2019));
        assert_eq!(form.in_out_status, Some(InOutStatus::Out));
        assert!(form.set_field("year", "old".into()).is_err());
        assert!(form.set_field("referralId", "x".repeat(17)).is_err());
    }
}
