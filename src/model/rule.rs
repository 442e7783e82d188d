//! Per-tenant posting preferences.

use std::collections::BTreeSet;

use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::core::SchedulerError;
use crate::util::serde::TenantId;

/// Named posting window, each mapped to a canonical local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeWindow {
    /// 09:00 local.
    Morning,
    /// 14:00 local.
    Afternoon,
    /// 19:00 local.
    Evening,
    /// 12:00 local unless a fixed time is set.
    Custom,
}

impl TimeWindow {
    /// Canonical local wall-clock time of the window.
    #[must_use]
    pub fn canonical_time(self) -> NaiveTime {
        let (h, m) = match self {
            Self::Morning => (9, 0),
            Self::Afternoon => (14, 0),
            Self::Evening => (19, 0),
            Self::Custom => (12, 0),
        };
        NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
    }
}

fn default_timezone() -> Tz {
    Tz::UTC
}

/// When a tenant wants content posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingRule {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Weekday ordinals, 1 = Monday through 7 = Sunday.
    pub days_of_week: BTreeSet<u8>,
    /// Posting window.
    pub time_window: TimeWindow,
    /// `HH:MM` override for the window's canonical time.
    #[serde(default)]
    pub fixed_time: Option<String>,
    /// Informational cadence label.
    #[serde(default)]
    pub frequency: Option<String>,
    /// Tenant timezone used to place local times.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

impl PostingRule {
    /// Create a rule in UTC without a fixed time.
    pub fn new(
        tenant_id: impl Into<TenantId>,
        days_of_week: impl IntoIterator<Item = u8>,
        time_window: TimeWindow,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            days_of_week: days_of_week.into_iter().collect(),
            time_window,
            fixed_time: None,
            frequency: None,
            timezone: default_timezone(),
        }
    }

    /// Set the fixed `HH:MM` time.
    #[must_use]
    pub fn with_fixed_time(mut self, fixed_time: impl Into<String>) -> Self {
        self.fixed_time = Some(fixed_time.into());
        self
    }

    /// Set the tenant timezone.
    #[must_use]
    pub const fn with_timezone(mut self, timezone: Tz) -> Self {
        self.timezone = timezone;
        self
    }

    /// Check the rule invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidPostingRule`] when `days_of_week` is
    /// empty or out of range, or `fixed_time` is not a valid `HH:MM`.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        if self.days_of_week.is_empty() {
            return Err(SchedulerError::InvalidPostingRule(
                "days_of_week must not be empty".into(),
            ));
        }
        if let Some(day) = self.days_of_week.iter().find(|d| !(1..=7).contains(*d)) {
            return Err(SchedulerError::InvalidPostingRule(format!(
                "weekday {day} out of range 1-7"
            )));
        }
        self.local_time().map(|_| ())
    }

    /// Local time of day to post at: the fixed time if set, else the window's.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidPostingRule`] for a malformed fixed time.
    pub fn local_time(&self) -> Result<NaiveTime, SchedulerError> {
        match self.fixed_time.as_deref() {
            Some(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(|e| {
                SchedulerError::InvalidPostingRule(format!("fixed_time `{raw}`: {e}"))
            }),
            None => Ok(self.time_window.canonical_time()),
        }
    }
}
