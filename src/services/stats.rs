//! Dashboard statistics service
//!
//! `today`, `thisWeek` and the seven-day series are bucketed on the caller's
//! calendar: the client sends its UTC offset and its local date, and every
//! date computation below works on `NaiveDate` so the host timezone never
//! shifts a bucket. When the client parameters are missing or unusable the
//! scalar counts fall back to the server clock.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Datelike, Days, Duration, FixedOffset, Local, NaiveDate, Offset, TimeZone, Utc};

use crate::{
    error::{AppError, AppResult},
    models::{
        car::{DateWindow, GroupField, InOutStatus, RecordScope},
        stats::{DailyCount, StatsDebug, StatsQuery, StatsResult, TopEntry, WindowSource},
    },
    repository::CarStore,
};

/// Number of records in `recent`
pub const RECENT_LIMIT: i64 = 10;
/// Length of `topReg` / `topPersons`
pub const TOP_LIMIT: i64 = 5;
/// Length of the daily series
pub const WINDOW_DAYS: u64 = 7;

/// Parse a `+HH:MM` / `-HH:MM` UTC offset.
///
/// An unescaped `+` in a query string is decoded as a space, so a leading
/// space is read as a plus sign.
pub fn parse_offset(value: &str) -> Result<FixedOffset, String> {
    let invalid = || format!("Invalid UTC offset: {:?}", value);

    let value = value.trim_end();
    let (sign, rest) = match value.chars().next() {
        Some('+') | Some(' ') => (1, value[1..].trim_start()),
        Some('-') => (-1, &value[1..]),
        _ => return Err(invalid()),
    };

    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let two_digits = |s: &str| s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hours) || !two_digits(minutes) {
        return Err(invalid());
    }

    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if hours > 14 || minutes > 59 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Parse a `YYYY-MM-DD` calendar date: four-digit year, two-digit month and day.
pub fn parse_client_date(value: &str) -> Result<NaiveDate, String> {
    let invalid = || format!("Invalid date: {:?}", value);

    let value = value.trim();
    let bytes = value.as_bytes();
    let well_formed = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !well_formed {
        return Err(invalid());
    }

    let year: i32 = value[0..4].parse().map_err(|_| invalid())?;
    let month: u32 = value[5..7].parse().map_err(|_| invalid())?;
    let day: u32 = value[8..10].parse().map_err(|_| invalid())?;
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
}

/// Sunday on or before `date`; `None` at the start of the calendar
pub fn week_start(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_sunday())))
}

/// The `WINDOW_DAYS` consecutive dates ending at `today`, oldest first
pub fn window_days(today: NaiveDate) -> Option<Vec<NaiveDate>> {
    (0..WINDOW_DAYS)
        .rev()
        .map(|back| today.checked_sub_days(Days::new(back)))
        .collect()
}

/// Calendar date of `instant` on a clock set to `offset`
pub fn local_date(instant: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    instant.with_timezone(&offset).date_naive()
}

/// Seven-day window and week start for `today`, when both are representable
fn calendar_for(today: NaiveDate) -> Option<(Vec<NaiveDate>, NaiveDate)> {
    Some((window_days(today)?, week_start(today)?))
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

/// Start of the current day and week (Sunday) on the server clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerWindow {
    pub start_of_today: DateTime<Utc>,
    pub start_of_week: DateTime<Utc>,
}

impl ServerWindow {
    pub fn at<Tz: TimeZone>(now: &DateTime<Tz>) -> AppResult<Self> {
        let tz = now.timezone();
        let today = now.date_naive();

        // Midnight may not exist on a DST transition day; take the first valid hour.
        let midnight = |day: NaiveDate| -> Option<DateTime<Utc>> {
            let naive = day.and_hms_opt(0, 0, 0)?;
            tz.from_local_datetime(&naive)
                .earliest()
                .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
                .map(|t| t.with_timezone(&Utc))
        };

        let start_of_today = midnight(today)
            .ok_or_else(|| AppError::Internal(format!("No local midnight for {}", today)))?;
        let start_of_week = week_start(today)
            .and_then(midnight)
            .ok_or_else(|| AppError::Internal(format!("No local midnight for week of {}", today)))?;

        Ok(Self {
            start_of_today,
            start_of_week,
        })
    }
}

/// Dashboard request parameters after boundary parsing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsParams {
    pub tz_offset: Option<String>,
    pub client_today: Option<String>,
    pub debug: bool,
}

impl From<StatsQuery> for StatsParams {
    fn from(query: StatsQuery) -> Self {
        Self {
            tz_offset: query.tz_offset.filter(|s| !s.is_empty()),
            client_today: query.today.filter(|s| !s.is_empty()),
            debug: query.debug.is_some(),
        }
    }
}

/// `today` / `thisWeek` along with the branch that produced them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodCounts {
    pub today: i64,
    pub this_week: i64,
    pub source: WindowSource,
}

fn series(days: &[NaiveDate], counts: &BTreeMap<String, i64>) -> Vec<DailyCount> {
    days.iter()
        .map(|day| {
            let date = day.to_string();
            let count = counts.get(&date).copied().unwrap_or(0);
            DailyCount { date, count }
        })
        .collect()
}

fn sum_series(a: &[DailyCount], b: &[DailyCount]) -> Vec<DailyCount> {
    a.iter()
        .zip(b)
        .map(|(x, y)| DailyCount {
            date: x.date.clone(),
            count: x.count + y.count,
        })
        .collect()
}

#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn CarStore>,
}

impl StatsService {
    pub fn new(store: Arc<dyn CarStore>) -> Self {
        Self { store }
    }

    /// Compute the dashboard statistics for records visible in `scope`
    pub async fn compute_stats(&self, scope: &RecordScope, params: &StatsParams) -> AppResult<StatsResult> {
        let offset = params.tz_offset.as_deref().map(parse_offset);
        let client_date = params.client_today.as_deref().map(|value| {
            parse_client_date(value).and_then(|date| match calendar_for(date) {
                Some(_) => Ok(date),
                None => Err(format!("Date out of range: {:?}", value)),
            })
        });

        // The daily series always bucket by offset; an unusable one means UTC.
        let bucket_offset = match &offset {
            Some(Ok(o)) => *o,
            _ => utc_offset(),
        };
        let today = match &client_date {
            Some(Ok(d)) => *d,
            _ => Utc::now().date_naive(),
        };
        let (days, this_week_start) = calendar_for(today)
            .ok_or_else(|| AppError::Internal(format!("No seven-day window ends at {}", today)))?;

        let client_window = match (offset, client_date) {
            (Some(Ok(o)), Some(Ok(d))) => Some((o, d)),
            (Some(Err(e)), _) | (_, Some(Err(e))) => {
                tracing::warn!(error = %e, "Ignoring malformed client timezone parameters");
                None
            }
            _ => None,
        };

        if *scope == RecordScope::Denied {
            tracing::debug!("Caller has no record scope, returning empty statistics");
            let zeros = series(&days, &BTreeMap::new());
            return Ok(StatsResult {
                total: 0,
                today: 0,
                this_week: 0,
                recent: Vec::new(),
                top_reg: Vec::new(),
                top_persons: Vec::new(),
                daily_counts: zeros.clone(),
                daily_counts_in: zeros.clone(),
                daily_counts_out: zeros,
                debug: params.debug.then(|| StatsDebug {
                    tz_offset: bucket_offset.to_string(),
                    client_today: today.to_string(),
                    week_start: this_week_start.to_string(),
                    days: days.iter().map(NaiveDate::to_string).collect(),
                    window_source: WindowSource::NoScope,
                    in_counts: BTreeMap::new(),
                    out_counts: BTreeMap::new(),
                }),
            });
        }

        let (first, last) = (days[0], today);
        let (total, periods, recent, top_reg, top_persons, in_counts, out_counts) = tokio::try_join!(
            self.store.count(scope, DateWindow::Any),
            self.period_counts(scope, client_window),
            self.store.recent(scope, RECENT_LIMIT),
            self.top(scope, GroupField::RegNo),
            self.top(scope, GroupField::PersonName),
            self.day_buckets(scope, InOutStatus::In, bucket_offset, first, last),
            self.day_buckets(scope, InOutStatus::Out, bucket_offset, first, last),
        )?;

        let daily_counts_in = series(&days, &in_counts);
        let daily_counts_out = series(&days, &out_counts);
        let daily_counts = sum_series(&daily_counts_in, &daily_counts_out);

        tracing::debug!(
            total,
            today = periods.today,
            this_week = periods.this_week,
            source = ?periods.source,
            offset = %bucket_offset,
            client_today = %today,
            "Computed dashboard statistics"
        );

        let debug = params.debug.then(|| StatsDebug {
            tz_offset: bucket_offset.to_string(),
            client_today: today.to_string(),
            week_start: this_week_start.to_string(),
            days: days.iter().map(NaiveDate::to_string).collect(),
            window_source: periods.source,
            in_counts,
            out_counts,
        });

        Ok(StatsResult {
            total,
            today: periods.today,
            this_week: periods.this_week,
            recent,
            top_reg,
            top_persons,
            daily_counts,
            daily_counts_in,
            daily_counts_out,
            debug,
        })
    }

    /// `today` / `thisWeek`, on the client's calendar when possible
    pub async fn period_counts(
        &self,
        scope: &RecordScope,
        client_window: Option<(FixedOffset, NaiveDate)>,
    ) -> AppResult<PeriodCounts> {
        if let Some((offset, today)) = client_window {
            match self.client_local_counts(scope, offset, today).await {
                Ok(counts) => return Ok(counts),
                Err(e) => tracing::warn!(
                    error = %e,
                    %offset,
                    %today,
                    "Client-local counts failed, falling back to server-local"
                ),
            }
        }

        let window = ServerWindow::at(&Local::now())?;
        self.server_local_counts(scope, window).await
    }

    async fn client_local_counts(
        &self,
        scope: &RecordScope,
        offset: FixedOffset,
        today: NaiveDate,
    ) -> AppResult<PeriodCounts> {
        let from = week_start(today)
            .ok_or_else(|| AppError::BadRequest(format!("No week start for {}", today)))?;
        let (today_count, week_count) = tokio::try_join!(
            self.store.count(
                scope,
                DateWindow::LocalDays { offset, from: today, to: today }
            ),
            self.store.count(
                scope,
                DateWindow::LocalDays { offset, from, to: today }
            ),
        )?;

        Ok(PeriodCounts {
            today: today_count,
            this_week: week_count,
            source: WindowSource::ClientLocal,
        })
    }

    async fn server_local_counts(&self, scope: &RecordScope, window: ServerWindow) -> AppResult<PeriodCounts> {
        let (today_count, week_count) = tokio::try_join!(
            self.store.count(scope, DateWindow::Since(window.start_of_today)),
            self.store.count(scope, DateWindow::Since(window.start_of_week)),
        )?;

        Ok(PeriodCounts {
            today: today_count,
            this_week: week_count,
            source: WindowSource::ServerLocal,
        })
    }

    async fn top(&self, scope: &RecordScope, field: GroupField) -> AppResult<Vec<TopEntry>> {
        let mut entries = self.store.top_values(scope, field, TOP_LIMIT).await?;
        entries.truncate(TOP_LIMIT as usize);
        Ok(entries)
    }

    /// Raw per-day counts keyed by `YYYY-MM-DD`
    async fn day_buckets(
        &self,
        scope: &RecordScope,
        status: InOutStatus,
        offset: FixedOffset,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<BTreeMap<String, i64>> {
        let rows = self.store.daily_counts(scope, status, offset, from, to).await?;
        Ok(rows
            .into_iter()
            .map(|(day, count)| (day.to_string(), count))
            .collect())
    }
}
