//! Per-member activity statistics, provided by an external collaborator.

use std::iter::Sum;
use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sprint_storage::MemberId;
use thiserror::Error;

/// Window a statistics query covers, anchored at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportingPeriod {
    Daily,
    Weekly,
}

impl std::fmt::Display for ReportingPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportingPeriod::Daily => f.write_str("daily"),
            ReportingPeriod::Weekly => f.write_str("weekly"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ActivityStatistics {
    pub total_seconds: f64,
    pub distance: f64,
    pub calories: f64,
}

impl AddAssign for ActivityStatistics {
    fn add_assign(&mut self, other: Self) {
        self.total_seconds += other.total_seconds;
        self.distance += other.distance;
        self.calories += other.calories;
    }
}

impl<'a> Sum<&'a ActivityStatistics> for ActivityStatistics {
    fn sum<I: Iterator<Item = &'a ActivityStatistics>>(iter: I) -> Self {
        iter.fold(ActivityStatistics::default(), |mut acc, s| {
            acc += *s;
            acc
        })
    }
}

#[derive(Debug, Error)]
pub enum StatisticsError {
    #[error("statistics unavailable for member {member_id}: {reason}")]
    Unavailable { member_id: MemberId, reason: String },
}

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait StatisticsProvider: Send + Sync {
    /// Aggregated activity of `member_id` over the `period` containing `at`.
    async fn statistics_for(
        &self,
        member_id: &MemberId,
        period: ReportingPeriod,
        at: DateTime<Utc>,
    ) -> Result<ActivityStatistics, StatisticsError>;
}

/// Provider for deployments without an activity backend: every member has
/// recorded nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unreported;

#[async_trait::async_trait]
impl StatisticsProvider for Unreported {
    async fn statistics_for(
        &self,
        _member_id: &MemberId,
        _period: ReportingPeriod,
        _at: DateTime<Utc>,
    ) -> Result<ActivityStatistics, StatisticsError> {
        Ok(ActivityStatistics::default())
    }
}
