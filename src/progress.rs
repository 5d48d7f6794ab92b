use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TripTimes {
    pub departure_planned: DateTime<Utc>,
    #[serde(default)]
    pub departure_real: Option<DateTime<Utc>>,
    #[serde(default)]
    pub departure_manual: Option<DateTime<Utc>>,
    pub arrival_planned: DateTime<Utc>,
    #[serde(default)]
    pub arrival_real: Option<DateTime<Utc>>,
}

impl TripTimes {
    pub fn departure(&self) -> DateTime<Utc> {
        self.departure_manual
            .or(self.departure_real)
            .unwrap_or(self.departure_planned)
    }

    pub fn arrival(&self) -> DateTime<Utc> {
        self.arrival_real.unwrap_or(self.arrival_planned)
    }

    pub fn fraction(&self, now: DateTime<Utc>) -> f64 {
        calculate_progress(self.departure(), self.arrival(), now)
    }

    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        (now - self.departure()).max(Duration::zero())
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.arrival() - now).max(Duration::zero())
    }

    pub fn minutes_to_arrival(&self, now: DateTime<Utc>) -> i64 {
        (self.arrival() - now).num_minutes().abs()
    }
}

pub fn calculate_progress(from: DateTime<Utc>, to: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let total = (to - from).num_milliseconds();
    if total <= 0 {
        return if now >= to { 1.0 } else { 0.0 };
    }
    let elapsed = (now - from).num_milliseconds();
    (elapsed as f64 / total as f64).clamp(0.0, 1.0)
}
