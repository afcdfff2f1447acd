//! Dashboard statistics types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use super::car::Car;

/// Query parameters for the dashboard endpoint
#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct StatsQuery {
    /// Client UTC offset as `+HH:MM` / `-HH:MM` (default `+00:00`)
    #[serde(rename = "tzOffset")]
    pub tz_offset: Option<String>,
    /// Client-local calendar date `YYYY-MM-DD` (default: server UTC date)
    pub today: Option<String>,
    /// Presence adds diagnostic fields to the response
    pub debug: Option<String>,
}

/// Distinct value with its number of records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TopEntry {
    #[serde(rename = "_id")]
    pub key: Option<String>,
    pub count: i64,
}

/// Number of records on one client-local day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DailyCount {
    /// `YYYY-MM-DD`
    pub date: String,
    pub count: i64,
}

/// Which computation produced `today` and `thisWeek`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum WindowSource {
    /// Bucketed by the client's offset and calendar date
    ClientLocal,
    /// Server clock and timezone
    ServerLocal,
    /// Caller had no scope; nothing was queried
    NoScope,
}

/// Diagnostics for timezone bucketing
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsDebug {
    pub tz_offset: String,
    pub client_today: String,
    pub week_start: String,
    pub days: Vec<String>,
    pub window_source: WindowSource,
    pub in_counts: BTreeMap<String, i64>,
    pub out_counts: BTreeMap<String, i64>,
}

/// Dashboard statistics response
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResult {
    pub total: i64,
    pub today: i64,
    pub this_week: i64,
    /// Ten most recent records by inOutDateTime
    pub recent: Vec<Car>,
    pub top_reg: Vec<TopEntry>,
    pub top_persons: Vec<TopEntry>,
    /// Sum of the IN and OUT series
    pub daily_counts: Vec<DailyCount>,
    pub daily_counts_in: Vec<DailyCount>,
    pub daily_counts_out: Vec<DailyCount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<StatsDebug>,
}
