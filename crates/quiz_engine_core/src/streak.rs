//! crates/quiz_engine_core/src/streak.rs
//!
//! Study streak counting. A study day starts at 04:00 so late-night sessions
//! belong to the previous day, and an inactive Saturday or Sunday never breaks
//! a streak.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Weekday};

/// Hour at which a new virtual day begins.
pub const DAY_START_HOUR: i64 = 4;

const MAX_STREAK_SCAN: u32 = 5000;

/// Maps a local timestamp onto the study day it belongs to.
pub fn virtual_date(now: NaiveDateTime) -> NaiveDate {
    (now - Duration::hours(DAY_START_HOUR)).date()
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Counts consecutive active study days ending today (or yesterday, if
/// today has no activity yet).
pub fn calculate_streak(
    active_days: &HashSet<NaiveDate>,
    first_activity: Option<NaiveDate>,
    now: NaiveDateTime,
) -> u32 {
    let mut check = virtual_date(now);
    let mut streak = 0u32;
    let mut skipped_today = false;

    loop {
        if active_days.contains(&check) {
            streak += 1;
            check -= Duration::days(1);
        } else if is_weekend(check) {
            check -= Duration::days(1);
            continue;
        } else if streak == 0 && !skipped_today {
            skipped_today = true;
            check -= Duration::days(1);
            continue;
        } else {
            break;
        }

        if first_activity.is_some_and(|first| check < first) || streak > MAX_STREAK_SCAN {
            break;
        }
    }

    streak
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreakMilestones {
    pub max_streak: u32,
    /// Day on which a seven-day streak was first reached.
    pub first_7_streak_date: Option<NaiveDate>,
}

/// True when every day strictly between `prev` and `day` is a Saturday or Sunday.
fn only_weekend_between(prev: NaiveDate, day: NaiveDate) -> bool {
    prev.iter_days().skip(1).take_while(|d| *d < day).all(is_weekend)
}

/// Walks a sorted list of active days and reports the longest streak.
pub fn calculate_streak_milestones(active_days: &[NaiveDate]) -> StreakMilestones {
    let mut milestones = StreakMilestones::default();
    let mut current = 0u32;
    let mut last: Option<NaiveDate> = None;

    for &day in active_days {
        current = match last {
            None => 1,
            Some(prev) if prev == day => continue,
            Some(prev) if only_weekend_between(prev, day) => current + 1,
            Some(_) => 1,
        };

        milestones.max_streak = milestones.max_streak.max(current);
        if milestones.first_7_streak_date.is_none() && current >= 7 {
            milestones.first_7_streak_date = Some(day);
        }
        last = Some(day);
    }

    milestones
}
