// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure schedule math (spec §4.2, §8).
//!
//! Every function here returns a time strictly greater than `now`, and
//! never produces a backlog of missed occurrences after a long offline
//! period ("no catch-up storm", spec §9).

use chrono::{TimeZone, Utc};
use cron::Schedule as CronSchedule;
use halo_core::{DomainError, Schedule};
use std::str::FromStr;

/// First grid point `anchor + k*every` strictly greater than `now`.
///
/// If `now < anchor`, returns `anchor`. If `now` exactly equals a grid
/// point, returns the *next* grid point.
pub fn next_every(anchor_ms: i64, every_ms: u64, now_ms: i64) -> i64 {
    if now_ms < anchor_ms {
        return anchor_ms;
    }
    let every_ms = every_ms.max(1) as i64;
    let elapsed = now_ms - anchor_ms;
    let k = elapsed / every_ms + 1;
    anchor_ms + k * every_ms
}

/// Returns `at_ms` if it is strictly in the future, else `None`.
pub fn next_once(at_ms: i64, now_ms: i64) -> Option<i64> {
    if at_ms > now_ms {
        Some(at_ms)
    } else {
        None
    }
}

/// Next fire time strictly after `now` for a cron expression, honoring an
/// optional IANA timezone (defaults to UTC — the scheduler stores
/// everything as epoch ms, so "system tz" resolution is the caller's
/// concern at the configuration boundary).
pub fn next_cron(expr: &str, tz: Option<&str>, now_ms: i64) -> Result<Option<i64>, DomainError> {
    let normalized = normalize_cron_expr(expr);
    let schedule = CronSchedule::from_str(&normalized).map_err(|e| DomainError::InvalidCron {
        expr: expr.to_string(),
        reason: e.to_string(),
    })?;

    match tz {
        None | Some("UTC") | Some("utc") => {
            let now = Utc.timestamp_millis_opt(now_ms).single().ok_or_else(|| DomainError::InvalidCron {
                expr: expr.to_string(),
                reason: "out-of-range timestamp".to_string(),
            })?;
            Ok(schedule.after(&now).next().map(|dt| dt.timestamp_millis()))
        }
        Some(tz_name) => {
            let tz: chrono_tz::Tz = tz_name.parse().map_err(|_| DomainError::InvalidCron {
                expr: expr.to_string(),
                reason: format!("unknown timezone {tz_name:?}"),
            })?;
            let now_utc = Utc.timestamp_millis_opt(now_ms).single().ok_or_else(|| DomainError::InvalidCron {
                expr: expr.to_string(),
                reason: "out-of-range timestamp".to_string(),
            })?;
            let now_local = now_utc.with_timezone(&tz);
            Ok(schedule.after(&now_local).next().map(|dt| dt.with_timezone(&Utc).timestamp_millis()))
        }
    }
}

/// The `cron` crate requires 6 (or 7) fields with seconds first; the spec
/// grammar allows a bare 5-field expression (minute-first), so prepend a
/// `0` seconds field when only 5 fields are given.
fn normalize_cron_expr(expr: &str) -> String {
    let field_count = expr.split_whitespace().count();
    if field_count == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    }
}

/// Dispatch by schedule variant (spec §4.2 `compute_next`).
pub fn compute_next(schedule: &Schedule, anchor_ms: i64, now_ms: i64) -> Result<Option<i64>, DomainError> {
    match schedule {
        Schedule::Every { interval_ms } => Ok(Some(next_every(anchor_ms, *interval_ms, now_ms))),
        Schedule::Once { at_ms } => Ok(next_once(*at_ms, now_ms)),
        Schedule::Cron { expr, tz } => next_cron(expr, tz.as_deref(), now_ms),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn no_catch_up_after_long_offline() {
        // Scenario 2: anchor=1_000_000, every=60_000, now=anchor+10*60_000+30_000.
        let anchor: i64 = 1_000_000;
        let every: u64 = 60_000;
        let now = anchor + 10 * every as i64 + 30_000;
        assert_eq!(next_every(anchor, every, now), anchor + 11 * every as i64);
    }

    #[test]
    fn now_before_anchor_returns_anchor() {
        assert_eq!(next_every(1_000_000, 60_000, 500_000), 1_000_000);
    }

    #[test]
    fn now_exactly_on_grid_returns_next_point() {
        let anchor = 0;
        let every = 60_000;
        assert_eq!(next_every(anchor, every, 60_000), 120_000);
    }

    #[test]
    fn once_in_the_past_is_none() {
        assert_eq!(next_once(1_000, 2_000), None);
        assert_eq!(next_once(1_000, 1_000), None);
        assert_eq!(next_once(2_000, 1_000), Some(2_000));
    }

    #[test]
    fn cron_daily_nine_am_utc() {
        // 2023-11-14T12:30:00Z -> next daily 9am UTC is 2023-11-15T09:00:00Z.
        let now = chrono::Utc.with_ymd_and_hms(2023, 11, 14, 12, 30, 0).unwrap().timestamp_millis();
        let next = next_cron("0 9 * * *", Some("UTC"), now).unwrap().unwrap();
        let expected = chrono::Utc.with_ymd_and_hms(2023, 11, 15, 9, 0, 0).unwrap().timestamp_millis();
        assert_eq!(next, expected);
    }

    #[test]
    fn cron_daily_nine_am_shanghai() {
        let now = chrono::Utc.with_ymd_and_hms(2023, 11, 14, 12, 30, 0).unwrap().timestamp_millis();
        let next = next_cron("0 9 * * *", Some("Asia/Shanghai"), now).unwrap().unwrap();
        // 09:00 CST (UTC+8) on 2023-11-15 == 01:00 UTC.
        let expected = chrono::Utc.with_ymd_and_hms(2023, 11, 15, 1, 0, 0).unwrap().timestamp_millis();
        assert_eq!(next, expected);
    }

    #[test]
    fn malformed_cron_expression_errors() {
        assert!(next_cron("not a cron", None, 0).is_err());
        assert!(next_cron("* *", None, 0).is_err());
    }

    proptest! {
        #[test]
        fn every_is_always_strictly_after_now(anchor in -1_000_000_000i64..1_000_000_000, every in 1u64..1_000_000, now in -1_000_000_000i64..1_000_000_000) {
            let next = next_every(anchor, every, now);
            prop_assert!(next > now);
        }

        #[test]
        fn every_is_always_on_the_grid(anchor in -1_000_000i64..1_000_000, every in 1u64..100_000, now in -1_000_000i64..1_000_000) {
            let next = next_every(anchor, every, now);
            prop_assert_eq!((next - anchor).rem_euclid(every as i64), 0);
        }
    }
}
