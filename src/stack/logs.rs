//! Log sink (CloudWatch log group)

use super::{Construct, SynthContext};
use anyhow::{Result, bail};
use cfnkit::{RemovalPolicy, ResourceEntry};
use serde_json::json;

/// Retention periods CloudWatch Logs accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionDays {
    OneDay,
    ThreeDays,
    FiveDays,
    OneWeek,
    TwoWeeks,
    OneMonth,
    TwoMonths,
    ThreeMonths,
    FourMonths,
    FiveMonths,
    SixMonths,
    OneYear,
    ThirteenMonths,
    EighteenMonths,
    TwoYears,
    ThreeYears,
    FiveYears,
    SixYears,
    SevenYears,
    EightYears,
    NineYears,
    TenYears,
    Infinite,
}

impl RetentionDays {
    const TABLE: &'static [(RetentionDays, u32)] = &[
        (Self::OneDay, 1),
        (Self::ThreeDays, 3),
        (Self::FiveDays, 5),
        (Self::OneWeek, 7),
        (Self::TwoWeeks, 14),
        (Self::OneMonth, 30),
        (Self::TwoMonths, 60),
        (Self::ThreeMonths, 90),
        (Self::FourMonths, 120),
        (Self::FiveMonths, 150),
        (Self::SixMonths, 180),
        (Self::OneYear, 365),
        (Self::ThirteenMonths, 400),
        (Self::EighteenMonths, 545),
        (Self::TwoYears, 731),
        (Self::ThreeYears, 1096),
        (Self::FiveYears, 1827),
        (Self::SixYears, 2192),
        (Self::SevenYears, 2557),
        (Self::EightYears, 2922),
        (Self::NineYears, 3288),
        (Self::TenYears, 3653),
    ];

    /// Number of days, or `None` for infinite retention
    pub fn days(&self) -> Option<u32> {
        Self::TABLE
            .iter()
            .find(|(r, _)| r == self)
            .map(|(_, days)| *days)
    }

    /// Map a day count to a supported retention period. Zero means the
    /// logs never expire.
    pub fn from_days(days: u32) -> Result<Self> {
        if days == 0 {
            return Ok(Self::Infinite);
        }
        match Self::TABLE.iter().find(|(_, d)| *d == days) {
            Some((retention, _)) => Ok(*retention),
            None => {
                let allowed: Vec<String> = Self::TABLE.iter().map(|(_, d)| d.to_string()).collect();
                bail!(
                    "unsupported log retention of {days} days (allowed: {})",
                    allowed.join(", ")
                )
            }
        }
    }
}

/// Destination for container logs.
#[derive(Debug, Clone, PartialEq)]
pub struct LogSinkSpec {
    pub retention: RetentionDays,
    pub removal: RemovalPolicy,
}

impl Default for LogSinkSpec {
    /// One day of retention, deleted with the stack
    fn default() -> Self {
        Self {
            retention: RetentionDays::OneDay,
            removal: RemovalPolicy::Destroy,
        }
    }
}

impl Construct for LogSinkSpec {
    fn construct_type(&self) -> &'static str {
        "log-sink"
    }

    fn description(&self) -> String {
        let retention = match self.retention.days() {
            Some(1) => "1 day".to_string(),
            Some(days) => format!("{days} days"),
            None => "forever".to_string(),
        };
        format!("Log group kept {retention}, {} on teardown", self.removal)
    }

    fn synthesize(&self, id: &str, ctx: &mut SynthContext) -> Result<()> {
        let mut entry =
            ResourceEntry::new("AWS::Logs::LogGroup").with_removal_policy(self.removal);
        if let Some(days) = self.retention.days() {
            entry = entry.with_property("RetentionInDays", json!(days));
        }

        let logical_id = ctx.add(&[id, "Resource"], entry)?;
        ctx.register_log_sink(id, logical_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retention_days_round_trip_table() {
        assert_eq!(RetentionDays::OneDay.days(), Some(1));
        assert_eq!(RetentionDays::Infinite.days(), None);
        assert_eq!(RetentionDays::from_days(14).unwrap(), RetentionDays::TwoWeeks);
        assert_eq!(RetentionDays::from_days(0).unwrap(), RetentionDays::Infinite);
    }

    #[test]
    fn test_multi_year_retention() {
        for (days, expected) in [
            (1096, RetentionDays::ThreeYears),
            (2192, RetentionDays::SixYears),
            (2557, RetentionDays::SevenYears),
            (2922, RetentionDays::EightYears),
            (3288, RetentionDays::NineYears),
        ] {
            assert_eq!(RetentionDays::from_days(days).unwrap(), expected);
            assert_eq!(expected.days(), Some(days));
        }
        assert!(RetentionDays::from_days(1095).is_err());
    }

    #[test]
    fn test_unsupported_retention() {
        let err = RetentionDays::from_days(2).unwrap_err();
        assert!(err.to_string().contains("unsupported log retention of 2 days"));
    }

    #[test]
    fn test_default_is_one_day_destroy() {
        let sink = LogSinkSpec::default();
        assert_eq!(sink.retention, RetentionDays::OneDay);
        assert_eq!(sink.removal, RemovalPolicy::Destroy);
        assert_eq!(sink.description(), "Log group kept 1 day, Delete on teardown");
    }
}
