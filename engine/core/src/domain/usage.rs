// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::business::BusinessId;

#[derive(Debug, Error)]
pub enum UsageError {
    #[error("Invalid usage period '{0}', expected YYYY-MM")]
    InvalidPeriod(String),
}

/// Calendar-month accounting period, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsagePeriod {
    pub year: i32,
    pub month: u32,
}

impl UsagePeriod {
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    pub fn current() -> Self {
        Self::from_datetime(Utc::now())
    }
}

impl std::fmt::Display for UsagePeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl std::str::FromStr for UsagePeriod {
    type Err = UsageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UsageError::InvalidPeriod(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

/// Counter kinds aggregated per business and period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageMetric {
    RunsStarted,
    RunsSucceeded,
    RunsFailed,
    Cost,
    ApiCalls,
}

impl UsageMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageMetric::RunsStarted => "runs_started",
            UsageMetric::RunsSucceeded => "runs_succeeded",
            UsageMetric::RunsFailed => "runs_failed",
            UsageMetric::Cost => "cost",
            UsageMetric::ApiCalls => "api_calls",
        }
    }
}

impl std::fmt::Display for UsageMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UsageMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "runs_started" => Ok(UsageMetric::RunsStarted),
            "runs_succeeded" => Ok(UsageMetric::RunsSucceeded),
            "runs_failed" => Ok(UsageMetric::RunsFailed),
            "cost" => Ok(UsageMetric::Cost),
            "api_calls" => Ok(UsageMetric::ApiCalls),
            other => Err(format!("unknown usage metric: {other}")),
        }
    }
}

/// Increment applied to one counter when a run reaches a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageDelta {
    pub metric: UsageMetric,
    pub value: f64,
}

impl UsageDelta {
    pub fn new(metric: UsageMetric, value: f64) -> Self {
        Self { metric, value }
    }
}

/// Aggregate counter row keyed by (business, period, metric).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub business_id: BusinessId,
    pub period: UsagePeriod,
    pub metric: UsageMetric,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_period_from_datetime() {
        let at = Utc.with_ymd_and_hms(2026, 3, 7, 12, 0, 0).unwrap();
        let period = UsagePeriod::from_datetime(at);
        assert_eq!(period.to_string(), "2026-03");
    }

    #[test]
    fn test_period_round_trip() {
        let period: UsagePeriod = "2026-11".parse().unwrap();
        assert_eq!(period.year, 2026);
        assert_eq!(period.month, 11);
        assert_eq!(period.to_string(), "2026-11");
    }

    #[test]
    fn test_period_rejects_garbage() {
        assert!("2026".parse::<UsagePeriod>().is_err());
        assert!("2026-13".parse::<UsagePeriod>().is_err());
        assert!("late-rent".parse::<UsagePeriod>().is_err());
    }

    #[test]
    fn test_metric_round_trip() {
        for metric in [
            UsageMetric::RunsStarted,
            UsageMetric::RunsSucceeded,
            UsageMetric::RunsFailed,
            UsageMetric::Cost,
            UsageMetric::ApiCalls,
        ] {
            assert_eq!(metric.as_str().parse::<UsageMetric>().unwrap(), metric);
        }
    }
}
