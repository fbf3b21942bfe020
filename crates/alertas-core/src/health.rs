use crate::reconcile::CycleSummary;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// No completed cycle for this long counts as stale.
const STALE_AFTER_SECS: i64 = 180;

#[derive(Debug, Clone, Default, Serialize)]
pub struct EngineHealth {
    pub cycles_total: u64,
    pub cycles_failed: u64,
    pub consecutive_failures: u64,
    pub last_cycle_ts: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub lookup_failures: u64,
    pub active_incidents: usize,
    pub tracked_closed: usize,
}

impl EngineHealth {
    pub fn record_success(&mut self, summary: &CycleSummary) {
        self.cycles_total += 1;
        self.consecutive_failures = 0;
        self.last_cycle_ts = Some(Utc::now());
        self.last_error = None;
        self.lookup_failures += summary.lookup_failures as u64;
        self.active_incidents = summary.active;
    }

    pub fn record_failure(&mut self, error: &str) {
        self.cycles_total += 1;
        self.cycles_failed += 1;
        self.consecutive_failures += 1;
        self.last_error = Some(error.to_string());
    }

    pub fn success_rate(&self) -> f64 {
        if self.cycles_total == 0 {
            1.0
        } else {
            (self.cycles_total - self.cycles_failed) as f64 / self.cycles_total as f64
        }
    }

    pub fn health_score(&self) -> u8 {
        let mut score = 100u8;

        let fail_rate = 1.0 - self.success_rate();
        if fail_rate > 0.01 {
            score = score.saturating_sub((fail_rate * 100.0) as u8);
        }

        if self.consecutive_failures > 0 {
            score = score.saturating_sub((self.consecutive_failures.min(10) * 10) as u8);
        }

        // Stale: no successful cycle recently
        if let Some(last_ts) = self.last_cycle_ts {
            let age = Utc::now().signed_duration_since(last_ts);
            if age.num_seconds() > STALE_AFTER_SECS {
                score = score.saturating_sub(30);
            }
        } else {
            score = score.saturating_sub(30);
        }

        score
    }

    pub fn status(&self) -> HealthStatus {
        let score = self.health_score();
        if score >= 90 {
            HealthStatus::Ok
        } else if score >= 70 {
            HealthStatus::Warn
        } else {
            HealthStatus::Fail
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Ok,
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallHealth {
    pub status: HealthStatus,
    pub engine: EngineHealth,
    pub uptime_seconds: u64,
}
