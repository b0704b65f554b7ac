use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::*;

use crate::entity::file_asset;
use crate::error::AppError;
use crate::lifecycle::ProcessStatus;

/// Named relative time windows for upload-time filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    Today,
    Week,
    Month,
    Custom,
}

impl std::str::FromStr for TimeFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "custom" => Ok(Self::Custom),
            _ => Err(format!(
                "Invalid time filter '{s}'. Must be one of: today, week, month, custom"
            )),
        }
    }
}

/// Resolved upload-time window. `end` is exclusive when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// Resolve the requested time filter into a concrete window.
///
/// `today` starts at UTC midnight, `week` covers the trailing 7 days and
/// `month` the trailing 30. `custom` requires both dates and treats them
/// as inclusive UTC calendar days.
pub fn resolve_time_window(
    filter: Option<&str>,
    start_date: Option<&str>,
    end_date: Option<&str>,
    now: DateTime<Utc>,
) -> Result<Option<TimeWindow>, AppError> {
    let Some(filter) = filter else {
        return Ok(None);
    };
    let filter: TimeFilter = filter.parse().map_err(AppError::Validation)?;

    match filter {
        TimeFilter::Today => Ok(Some(TimeWindow {
            start: now.date_naive().and_time(NaiveTime::MIN).and_utc(),
            end: None,
        })),
        TimeFilter::Week => Ok(Some(TimeWindow {
            start: now - Duration::days(7),
            end: None,
        })),
        TimeFilter::Month => Ok(Some(TimeWindow {
            start: now - Duration::days(30),
            end: None,
        })),
        TimeFilter::Custom => {
            let (Some(start_date), Some(end_date)) = (start_date, end_date) else {
                return Err(AppError::Validation(
                    "Custom time filter requires start_date and end_date".into(),
                ));
            };
            let start = parse_date(start_date)?;
            let end = parse_date(end_date)?;
            if end < start {
                return Err(AppError::Validation(
                    "end_date must not be before start_date".into(),
                ));
            }
            Ok(Some(TimeWindow {
                start: start.and_time(NaiveTime::MIN).and_utc(),
                end: Some((end + Duration::days(1)).and_time(NaiveTime::MIN).and_utc()),
            }))
        }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("Invalid date '{value}'. Expected YYYY-MM-DD")))
}

/// Apply an optional upload-time window to a file query.
pub fn apply_time_window(
    mut select: Select<file_asset::Entity>,
    window: Option<TimeWindow>,
) -> Select<file_asset::Entity> {
    if let Some(window) = window {
        select = select.filter(file_asset::Column::UploadTime.gte(window.start));
        if let Some(end) = window.end {
            select = select.filter(file_asset::Column::UploadTime.lt(end));
        }
    }
    select
}

/// Interpret the `status` query parameter as a process-status filter.
/// Unknown values mean no filter rather than an error.
pub fn process_status_filter(raw: Option<&str>) -> Option<ProcessStatus> {
    raw.and_then(|s| s.parse().ok())
}

/// Default ordering for file listings: active rows before deleted ones,
/// then newest uploads first.
pub fn default_file_order(select: Select<file_asset::Entity>) -> Select<file_asset::Entity> {
    let active_first = Expr::cust("CASE status WHEN 'active' THEN 0 ELSE 1 END");
    select
        .order_by(active_first, Order::Asc)
        .order_by(file_asset::Column::UploadTime, Order::Desc)
        .order_by(file_asset::Column::Id, Order::Desc)
}

/// Normalized pagination parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageParams {
    pub page: u64,
    pub limit: u64,
}

impl PageParams {
    /// Normalize raw query values: page at least 1, limit in 1..=100
    /// with a default of 10.
    pub fn from_query(page: Option<u64>, limit: Option<u64>) -> Self {
        Self {
            page: std::cmp::Ord::max(page.unwrap_or(1), 1),
            limit: limit.unwrap_or(10).clamp(1, 100),
        }
    }

    pub fn offset(&self) -> u64 {
        (self.page - 1) * self.limit
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}
