//! Feed pagination and filtering.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 20;
pub const MAX_TAGS: usize = 5;
pub const MAX_SEARCH_LEN: usize = 100;

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Raw query-string parameters, exactly as the client sent them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedParams {
    pub limit: Option<String>,
    pub offset: Option<String>,
    pub sort: Option<String>,
    pub tags: Option<String>,
    pub search: Option<String>,
    pub since: Option<String>,
    pub until: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedQueryError {
    #[error("limit must be an integer between 1 and {MAX_LIMIT}")]
    Limit,
    #[error("offset must be a non-negative integer")]
    Offset,
    #[error("sort must be one of: asc, desc")]
    Sort,
    #[error("at most {MAX_TAGS} tags may be given")]
    TooManyTags,
    #[error("search must be at most {MAX_SEARCH_LEN} characters")]
    SearchTooLong,
}

/// A validated feed query.
///
/// `None` bounds are open: a `since` or `until` that does not parse as
/// `YYYY-MM-DD HH:MM:SS` lifts that side of the time filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub limit: i64,
    pub offset: i64,
    pub sort: SortOrder,
    pub tags: Vec<String>,
    pub search: String,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl FeedQuery {
    /// Earliest `since` used when the client does not send one.
    pub fn default_since() -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(2025, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Parses and validates raw parameters. `now` is the default `until`.
    pub fn parse(params: &FeedParams, now: DateTime<Utc>) -> Result<Self, FeedQueryError> {
        let limit = match non_empty(&params.limit) {
            Some(raw) => raw.parse::<i64>().map_err(|_| FeedQueryError::Limit)?,
            None => DEFAULT_LIMIT,
        };
        if !(1..=MAX_LIMIT).contains(&limit) {
            return Err(FeedQueryError::Limit);
        }

        let offset = match non_empty(&params.offset) {
            Some(raw) => raw.parse::<i64>().map_err(|_| FeedQueryError::Offset)?,
            None => 0,
        };
        if offset < 0 {
            return Err(FeedQueryError::Offset);
        }

        let sort = match non_empty(&params.sort) {
            Some("asc") => SortOrder::Asc,
            Some("desc") | None => SortOrder::Desc,
            Some(_) => return Err(FeedQueryError::Sort),
        };

        let tags: Vec<String> = non_empty(&params.tags)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if tags.len() > MAX_TAGS {
            return Err(FeedQueryError::TooManyTags);
        }

        let search = non_empty(&params.search).unwrap_or_default().to_string();
        if search.chars().count() > MAX_SEARCH_LEN {
            return Err(FeedQueryError::SearchTooLong);
        }

        let since = match non_empty(&params.since) {
            Some(raw) => parse_timestamp(raw),
            None => Some(Self::default_since()),
        };
        let until = match non_empty(&params.until) {
            Some(raw) => parse_timestamp(raw),
            None => Some(now),
        };

        Ok(Self {
            limit,
            offset,
            sort,
            tags,
            search,
            since,
            until,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, DATE_TIME_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}
