//! Predictive rate/acceleration warnings for (actor, context) pairs
//! approaching their quota (§4.5 "Rate/acceleration warnings").

use crate::constants::{
    WARNING_DAY_WINDOW_HOURS, WARNING_FILL_HIGH_WATERMARK, WARNING_FILL_LOW_WATERMARK,
    WARNING_MIN_RATE_PER_HOUR, WARNING_WEEK_WINDOW_HOURS,
};
use crate::error::Result;
use crate::traits::AttestationBackend;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

/// A single predictive quota warning for one (actor, context) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    /// The actor this warning concerns.
    pub actor: String,
    /// The context this warning concerns.
    pub context: String,
    /// Current attestation count for this (actor, context) pair.
    pub count: i64,
    /// The configured limit for this pair.
    pub limit: i64,
    /// `count / limit`.
    pub fill_percent: f64,
    /// Attestations created in the last 24 hours.
    pub last_day_count: i64,
    /// Attestations created in the last 168 hours.
    pub last_week_count: i64,
    /// `last_day_count / 24`.
    pub rate_per_hour: f64,
    /// `rate_per_hour / normal_rate`, or `1.0` if `normal_rate` is below the
    /// noise floor.
    pub acceleration_factor: f64,
    /// Projected hours until the limit is reached at `rate_per_hour`.
    pub time_until_full_hours: f64,
}

/// Compute a predictive warning for `(actor, context)`, if its fill
/// percentage falls in `[0.5, 1.0)` and its rate is not noise-floor.
/// Returns `Ok(None)` when no warning is warranted.
///
/// # Errors
/// Propagates any backend error encountered while counting rows.
pub async fn evaluate<B: AttestationBackend + ?Sized>(
    backend: &B,
    actor: &str,
    context: &str,
    limit: i64,
) -> Result<Option<Warning>> {
    if limit <= 0 {
        return Ok(None);
    }

    let count = backend.count_actor_context(actor, context).await?;
    let fill_percent = count as f64 / limit as f64;
    if !(WARNING_FILL_LOW_WATERMARK..WARNING_FILL_HIGH_WATERMARK).contains(&fill_percent) {
        return Ok(None);
    }

    let now = Utc::now();
    let day_start = now - Duration::hours(WARNING_DAY_WINDOW_HOURS);
    let week_start = now - Duration::hours(WARNING_WEEK_WINDOW_HOURS);

    let last_day_count = backend.count_created_between(actor, context, day_start, now).await?;
    let last_week_count = backend.count_created_between(actor, context, week_start, now).await?;

    let rate_per_hour = last_day_count as f64 / WARNING_DAY_WINDOW_HOURS as f64;
    if rate_per_hour < WARNING_MIN_RATE_PER_HOUR {
        return Ok(None);
    }

    let normal_rate = last_week_count as f64 / WARNING_WEEK_WINDOW_HOURS as f64;
    let acceleration_factor = if normal_rate >= WARNING_MIN_RATE_PER_HOUR {
        rate_per_hour / normal_rate
    } else {
        1.0
    };

    let time_until_full_hours = (limit - count) as f64 / rate_per_hour;

    Ok(Some(Warning {
        actor: actor.to_string(),
        context: context.to_string(),
        count,
        limit,
        fill_percent,
        last_day_count,
        last_week_count,
        rate_per_hour,
        acceleration_factor,
        time_until_full_hours,
    }))
}
