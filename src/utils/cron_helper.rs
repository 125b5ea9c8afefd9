//! Cron utility functions for refresh schedules
//!
//! The `cron` crate expects a seconds field. Classic five-field expressions
//! (`"0 3 * * *"`) are accepted too and run at second zero.

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

/// Prefix a seconds field onto five-field expressions
pub fn normalize_cron_expression(expression: &str) -> String {
    let trimmed = expression.trim();
    if trimmed.split_whitespace().count() == 5 {
        format!("0 {trimmed}")
    } else {
        trimmed.to_string()
    }
}

/// Parse a cron expression into a schedule
///
/// # Returns
/// * `Ok(Schedule)` - The parsed schedule
/// * `Err(String)` - Invalid cron expression with error message
pub fn parse_schedule(expression: &str) -> Result<Schedule, String> {
    if expression.trim().is_empty() {
        return Err("Cron expression is empty".to_string());
    }

    let normalized = normalize_cron_expression(expression);
    Schedule::from_str(&normalized)
        .map_err(|e| format!("Invalid cron expression '{expression}': {e}"))
}

/// Next fire time strictly after `after`
pub fn next_run(schedule: &Schedule, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule.after(after).next()
}
