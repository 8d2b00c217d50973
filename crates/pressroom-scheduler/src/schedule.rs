use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use croner::Cron;
use pressroom_core::Schedule;
use tracing::warn;

use crate::error::{Result, SchedulerError};

/// Longest accepted interval: ten years.
pub const MAX_INTERVAL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Compute the next UTC execution time for `schedule` starting *after* `from`.
///
/// Returns `None` when the schedule is exhausted (a `Once` job whose time
/// has already passed), the cron expression has no future occurrence, or the
/// next instant is not representable.
pub fn compute_next_run(schedule: &Schedule, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match schedule {
        Schedule::Once { at } => {
            if *at > from {
                Some(*at)
            } else {
                None
            }
        }

        Schedule::Interval { every_secs } => i64::try_from(*every_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|step| from.checked_add_signed(step)),

        Schedule::Daily { hour, minute } => {
            let candidate = Utc
                .with_ymd_and_hms(
                    from.year(),
                    from.month(),
                    from.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()?;
            if candidate > from {
                Some(candidate)
            } else {
                // Today's window has passed, advance to tomorrow.
                Some(candidate + Duration::days(1))
            }
        }

        Schedule::Weekly { day, hour, minute } => {
            // `day` follows ISO weekday numbering: 0=Monday … 6=Sunday,
            // which matches chrono's `num_days_from_monday`.
            let today_dow = from.weekday().num_days_from_monday() as i64;
            let target_dow = (*day as i64).clamp(0, 6);
            let days_ahead = (target_dow - today_dow).rem_euclid(7);

            let candidate_day = from + Duration::days(days_ahead);
            let candidate = Utc
                .with_ymd_and_hms(
                    candidate_day.year(),
                    candidate_day.month(),
                    candidate_day.day(),
                    *hour as u32,
                    *minute as u32,
                    0,
                )
                .single()?;

            if candidate > from {
                Some(candidate)
            } else {
                // Same weekday but the time already passed.
                Some(candidate + Duration::days(7))
            }
        }

        Schedule::Cron { expression } => match parse_cron(expression) {
            Ok(cron) => match cron.find_next_occurrence(&from, false) {
                Ok(next) => Some(next),
                Err(e) => {
                    warn!(%expression, "cron has no next occurrence: {e}");
                    None
                }
            },
            Err(e) => {
                warn!(%expression, "{e}");
                None
            }
        },
    }
}

/// Reject schedules that can never fire or that name impossible times.
pub fn validate_schedule(schedule: &Schedule) -> Result<()> {
    match schedule {
        Schedule::Once { .. } => Ok(()),
        Schedule::Interval { every_secs } => {
            if *every_secs == 0 {
                return Err(SchedulerError::InvalidSchedule(
                    "interval must be at least one second".into(),
                ));
            }
            if *every_secs > MAX_INTERVAL_SECS {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "interval of {every_secs}s exceeds the {MAX_INTERVAL_SECS}s maximum"
                )));
            }
            Ok(())
        }
        Schedule::Daily { hour, minute } => validate_time(*hour, *minute),
        Schedule::Weekly { day, hour, minute } => {
            if *day > 6 {
                return Err(SchedulerError::InvalidSchedule(format!(
                    "weekday {day} out of range 0-6"
                )));
            }
            validate_time(*hour, *minute)
        }
        Schedule::Cron { expression } => parse_cron(expression).map(|_| ()),
    }
}

fn validate_time(hour: u8, minute: u8) -> Result<()> {
    if hour > 23 || minute > 59 {
        return Err(SchedulerError::InvalidSchedule(format!(
            "time {hour:02}:{minute:02} is not a valid UTC time of day"
        )));
    }
    Ok(())
}

/// Accepts 5-field expressions and 6-field ones with a leading seconds column.
fn parse_cron(expression: &str) -> Result<Cron> {
    Cron::new(expression)
        .with_seconds_optional()
        .parse()
        .map_err(|e| SchedulerError::InvalidSchedule(format!("'{expression}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn once_fires_only_in_the_future() {
        let when = at("2026-03-01T10:00:00Z");
        let s = Schedule::Once { at: when };
        assert_eq!(compute_next_run(&s, at("2026-03-01T09:00:00Z")), Some(when));
        assert_eq!(compute_next_run(&s, when), None);
    }

    #[test]
    fn interval_counts_from_the_given_instant() {
        let s = Schedule::Interval { every_secs: 90 };
        let from = at("2026-03-01T10:00:00Z");
        assert_eq!(compute_next_run(&s, from), Some(at("2026-03-01T10:01:30Z")));
    }

    #[test]
    fn oversized_interval_has_no_next_run() {
        let from = at("2026-03-01T10:00:00Z");
        for every_secs in [10_000_000_000_000_000, u64::MAX] {
            assert_eq!(
                compute_next_run(&Schedule::Interval { every_secs }, from),
                None
            );
        }
    }

    #[test]
    fn daily_rolls_to_tomorrow_after_window() {
        let s = Schedule::Daily { hour: 9, minute: 30 };
        assert_eq!(
            compute_next_run(&s, at("2026-03-01T08:00:00Z")),
            Some(at("2026-03-01T09:30:00Z"))
        );
        assert_eq!(
            compute_next_run(&s, at("2026-03-01T09:30:00Z")),
            Some(at("2026-03-02T09:30:00Z"))
        );
    }

    #[test]
    fn weekly_lands_on_requested_weekday() {
        // 2026-03-04 is a Wednesday; day 0 is Monday.
        let s = Schedule::Weekly {
            day: 0,
            hour: 8,
            minute: 0,
        };
        assert_eq!(
            compute_next_run(&s, at("2026-03-04T12:00:00Z")),
            Some(at("2026-03-09T08:00:00Z"))
        );
        // Monday after 08:00 rolls a full week.
        assert_eq!(
            compute_next_run(&s, at("2026-03-09T09:00:00Z")),
            Some(at("2026-03-16T08:00:00Z"))
        );
    }

    #[test]
    fn cron_expression_is_evaluated_in_utc() {
        let s = Schedule::Cron {
            expression: "0 */6 * * *".into(),
        };
        assert_eq!(
            compute_next_run(&s, at("2026-03-01T07:15:00Z")),
            Some(at("2026-03-01T12:00:00Z"))
        );
    }

    #[test]
    fn invalid_schedules_are_rejected() {
        assert!(validate_schedule(&Schedule::Interval { every_secs: 0 }).is_err());
        assert!(validate_schedule(&Schedule::Interval {
            every_secs: MAX_INTERVAL_SECS + 1
        })
        .is_err());
        assert!(validate_schedule(&Schedule::Interval {
            every_secs: MAX_INTERVAL_SECS
        })
        .is_ok());
        assert!(validate_schedule(&Schedule::Daily { hour: 24, minute: 0 }).is_err());
        assert!(validate_schedule(&Schedule::Weekly {
            day: 7,
            hour: 1,
            minute: 0
        })
        .is_err());
        assert!(validate_schedule(&Schedule::Cron {
            expression: "not a cron".into()
        })
        .is_err());
        assert!(validate_schedule(&Schedule::Cron {
            expression: "0 30 4 * * *".into()
        })
        .is_ok());
    }
}
