//! ---
//! psc_section: "08-energy-models-optimization"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Inflow forecasting model inference."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of the inflow over the first hour of the forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Rising,
    Stable,
    Falling,
}

/// One tick's forecast, shared read-only by every specialist agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSnapshot {
    /// 24 steps of 15 minutes.
    pub next_6h: Vec<f64>,
    /// 96 steps of 15 minutes.
    pub next_24h: Vec<f64>,
    pub peak_value: f64,
    /// Steps until the peak within the 24-hour horizon.
    pub peak_offset_steps: usize,
    pub trend: Trend,
    pub storm_detected: bool,
    pub confidence: f64,
    /// True when the model could not run and the forecast is persistence.
    pub degraded: bool,
}

impl ForecastSnapshot {
    /// Persistence forecast: the last observation held flat across both
    /// horizons at low confidence. Used below the model window and when no
    /// model artifact is configured.
    pub fn persistence(last_value: f64) -> Self {
        Self {
            next_6h: vec![last_value; 24],
            next_24h: vec![last_value; 96],
            peak_value: last_value,
            peak_offset_steps: 0,
            trend: Trend::Stable,
            storm_detected: false,
            confidence: 0.2,
            degraded: true,
        }
    }

    /// Inflow expected `steps` ticks ahead, saturating at the horizon end.
    pub fn inflow_at(&self, steps: usize) -> f64 {
        let idx = steps.min(self.next_24h.len().saturating_sub(1));
        self.next_24h.get(idx).copied().unwrap_or(0.0)
    }

    pub fn peak_offset_hours(&self) -> f64 {
        self.peak_offset_steps as f64 * 0.25
    }
}

/// Borrowed view over the historical inflow arrays bound at start-up.
#[derive(Debug, Clone, Copy)]
pub struct InflowSeries<'a> {
    pub timestamps: &'a [DateTime<Utc>],
    pub values: &'a [f64],
}

impl<'a> InflowSeries<'a> {
    /// The trailing window of `n` samples ending at `index` (inclusive).
    /// `None` when fewer than `n` samples precede the index.
    pub fn window(&self, index: usize, n: usize) -> Option<&'a [f64]> {
        if index >= self.values.len() || index + 1 < n {
            return None;
        }
        Some(&self.values[index + 1 - n..=index])
    }

    pub fn timestamp(&self, index: usize) -> Option<DateTime<Utc>> {
        self.timestamps.get(index).copied()
    }

    pub fn value(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn window_bounds() {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let timestamps: Vec<DateTime<Utc>> = (0..5)
            .map(|i| base + chrono::Duration::minutes(15 * i))
            .collect();
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let series = InflowSeries {
            timestamps: &timestamps,
            values: &values,
        };
        assert_eq!(series.window(4, 3), Some(&values[2..=4]));
        assert_eq!(series.window(1, 3), None);
        assert_eq!(series.window(9, 2), None);
    }

    #[test]
    fn inflow_at_saturates() {
        let snapshot = ForecastSnapshot {
            next_6h: vec![100.0; 24],
            next_24h: vec![100.0, 200.0, 300.0],
            peak_value: 300.0,
            peak_offset_steps: 2,
            trend: Trend::Rising,
            storm_detected: false,
            confidence: 0.85,
            degraded: false,
        };
        assert_eq!(snapshot.inflow_at(1), 200.0);
        assert_eq!(snapshot.inflow_at(50), 300.0);
        assert_eq!(snapshot.peak_offset_hours(), 0.5);
    }
}
