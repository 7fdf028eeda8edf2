//! Proxy performance score
//!
//! `score = 0.5·success_rate + 0.2·speed + 0.1·recency + 0.2·ban_factor`
//!
//! - speed: `min(1, 5000 / avg_response_time_ms)`, 1 before any timing
//! - recency: linear decay from 1 (just used) to 0 (unused for 24h or never)
//! - ban_factor: `max(0.1, 1 − ban_count · 0.1)`

use chrono::{DateTime, Utc};
use scrapeshield_domain::constants::{
    SCORE_BAN_FLOOR, SCORE_BAN_PENALTY, SCORE_RECENCY_WINDOW_HOURS, SCORE_REFERENCE_RESPONSE_MS,
    SCORE_WEIGHT_BANS, SCORE_WEIGHT_RECENCY, SCORE_WEIGHT_SPEED, SCORE_WEIGHT_SUCCESS,
};
use scrapeshield_domain::ProxyStats;

pub fn speed_factor(avg_response_time_ms: f64) -> f64 {
    if avg_response_time_ms <= 0.0 || !avg_response_time_ms.is_finite() {
        return 1.0;
    }
    (SCORE_REFERENCE_RESPONSE_MS / avg_response_time_ms).min(1.0)
}

pub fn recency_factor(last_used: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    let Some(last_used) = last_used else {
        return 0.0;
    };
    let hours = (now - last_used).num_milliseconds().max(0) as f64 / 3_600_000.0;
    (1.0 - hours / SCORE_RECENCY_WINDOW_HOURS).clamp(0.0, 1.0)
}

pub fn ban_factor(ban_count: u32) -> f64 {
    (1.0 - f64::from(ban_count) * SCORE_BAN_PENALTY).max(SCORE_BAN_FLOOR)
}

pub fn score(stats: &ProxyStats, now: DateTime<Utc>) -> f64 {
    SCORE_WEIGHT_SUCCESS * stats.success_rate.clamp(0.0, 1.0)
        + SCORE_WEIGHT_SPEED * speed_factor(stats.avg_response_time_ms)
        + SCORE_WEIGHT_RECENCY * recency_factor(stats.last_used, now)
        + SCORE_WEIGHT_BANS * ban_factor(stats.ban_count)
}

/// Recomputes and stores `stats.score`.
pub fn refresh(stats: &mut ProxyStats, now: DateTime<Utc>) {
    stats.score = score(stats, now);
}
