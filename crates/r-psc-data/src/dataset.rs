//! ---
//! psc_section: "11-simulation-test-harness"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Historical dataset bindings and price outlook."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use std::fs;
use std::path::Path;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Timelike, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use r_psc_common::config::Scenario;
use r_psc_forecast::InflowSeries;
use r_psc_hydraulics::{SystemState, TunnelGeometry};

pub type Result<T> = std::result::Result<T, DataError>;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset is empty")]
    Empty,
    #[error("row {index} outside dataset of {len} rows")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Raw row representation when deserializing the operational dataset.
#[derive(Debug, Deserialize)]
struct HistoryRow {
    timestamp: DateTime<Utc>,
    l1_m: f64,
    v_m3: f64,
    f1_m3_15min: f64,
    f2_m3h: f64,
    price_high_eur_kwh: f64,
    price_normal_eur_kwh: f64,
}

/// Raw row of a tunnel geometry table.
#[derive(Debug, Deserialize)]
struct GeometryRow {
    level_m: f64,
    volume_m3: f64,
}

/// Column-oriented, read-only view of the station's operational history.
/// Bound once at start-up; the kernel reads but never writes.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    timestamps: Vec<DateTime<Utc>>,
    l1: Vec<f64>,
    v: Vec<f64>,
    f1: Vec<f64>,
    f2: Vec<f64>,
    price_high: Vec<f64>,
    price_normal: Vec<f64>,
}

impl HistoryStore {
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let mut store = Self::with_capacity(1024);
        for row in reader.deserialize::<HistoryRow>() {
            let row = row?;
            store.push(row);
        }
        if store.is_empty() {
            return Err(DataError::Empty);
        }
        info!(
            rows = store.len(),
            from = %store.timestamps[0],
            to = %store.timestamps[store.len() - 1],
            "historical dataset loaded"
        );
        Ok(store)
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(capacity),
            l1: Vec::with_capacity(capacity),
            v: Vec::with_capacity(capacity),
            f1: Vec::with_capacity(capacity),
            f2: Vec::with_capacity(capacity),
            price_high: Vec::with_capacity(capacity),
            price_normal: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, row: HistoryRow) {
        self.timestamps.push(row.timestamp);
        self.l1.push(row.l1_m);
        self.v.push(row.v_m3);
        self.f1.push(row.f1_m3_15min);
        self.f2.push(row.f2_m3h);
        self.price_high.push(row.price_high_eur_kwh);
        self.price_normal.push(row.price_normal_eur_kwh);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Build the immutable per-tick state for `index` under `scenario`.
    pub fn state_at(&self, index: usize, scenario: Scenario) -> Result<SystemState> {
        if index >= self.len() {
            return Err(DataError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok(SystemState {
            timestamp: self.timestamps[index],
            l1_m: self.l1[index],
            v_m3: self.v[index],
            f1_m3_15min: self.f1[index],
            f2_m3h: self.f2[index],
            electricity_price_eur_kwh: self.price_at(index, scenario),
            price_scenario: scenario,
            history_index: index,
        })
    }

    pub fn price_at(&self, index: usize, scenario: Scenario) -> f64 {
        match scenario {
            Scenario::High => self.price_high[index],
            Scenario::Normal => self.price_normal[index],
        }
    }

    /// Prices for the next `steps` ticks starting at `index` (inclusive),
    /// truncated at the dataset end.
    pub fn price_window(&self, index: usize, steps: usize, scenario: Scenario) -> Vec<f64> {
        let source = match scenario {
            Scenario::High => &self.price_high,
            Scenario::Normal => &self.price_normal,
        };
        let end = (index + steps).min(source.len());
        source.get(index..end).map(<[f64]>::to_vec).unwrap_or_default()
    }

    /// Borrowed inflow arrays for the forecaster.
    pub fn inflow_series(&self) -> InflowSeries<'_> {
        InflowSeries {
            timestamps: &self.timestamps,
            values: &self.f1,
        }
    }

    /// Deterministic synthetic history: diurnal inflow with morning and
    /// evening peaks, matching level/volume via the default tunnel geometry,
    /// and two price tracks (contemporary vs high-volatility).
    pub fn synthetic(rows: usize, seed: u64) -> Self {
        use rand::{rngs::StdRng, Rng, SeedableRng};
        use rand_distr::{Distribution, Normal};

        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 30.0).expect("sigma must be positive");
        let geometry = TunnelGeometry::default();
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();

        let mut store = Self::with_capacity(rows);
        let mut level: f64 = 1.8;
        for i in 0..rows {
            let timestamp = start + ChronoDuration::minutes(15 * i as i64);
            let hour = timestamp.hour() as f64 + timestamp.minute() as f64 / 60.0;
            // Two daily inflow peaks around 08:00 and 19:00.
            let daily = 500.0
                + 260.0 * (std::f64::consts::TAU * (hour - 8.0) / 24.0).cos().max(0.0)
                + 180.0 * (std::f64::consts::TAU * (hour - 19.0) / 24.0).cos().max(0.0);
            let f1 = (daily + noise.sample(&mut rng)).max(50.0);

            let f2 = (f1 * 4.0 + rng.gen_range(-400.0..400.0)).max(0.0);
            level = (level + (f1 - f2 * 0.25) / 4_000.0).clamp(0.2, 7.9);
            let v = geometry.level_to_volume(level);

            let price_shape = (std::f64::consts::TAU * (hour - 18.0) / 24.0).cos() * 0.5 + 0.5;
            let price_normal = 0.05 + 0.12 * price_shape + rng.gen_range(-0.01..0.01);
            let price_high = 0.05 + 3.5 * price_shape.powi(2) + rng.gen_range(0.0..0.4);

            store.push(HistoryRow {
                timestamp,
                l1_m: level,
                v_m3: v,
                f1_m3_15min: f1,
                f2_m3h: f2,
                price_high_eur_kwh: price_high,
                price_normal_eur_kwh: price_normal,
            });
        }
        store
    }
}

/// Load a level↔volume table from CSV with `level_m,volume_m3` columns.
pub fn load_geometry_csv(path: &Path) -> Result<Vec<(f64, f64)>> {
    let file = fs::File::open(path)?;
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
    let mut points = Vec::new();
    for row in reader.deserialize::<GeometryRow>() {
        let row = row?;
        points.push((row.level_m, row.volume_m3));
    }
    if points.len() < 2 {
        return Err(DataError::Empty);
    }
    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn synthetic_is_deterministic_and_plausible() {
        let a = HistoryStore::synthetic(192, 11);
        let b = HistoryStore::synthetic(192, 11);
        assert_eq!(a.len(), 192);
        assert_eq!(a.f1, b.f1);
        assert_eq!(a.price_high, b.price_high);
        assert!(a.f1.iter().all(|&v| v >= 50.0));
        assert!(a.l1.iter().all(|&v| (0.0..8.0).contains(&v)));
    }

    #[test]
    fn state_at_selects_scenario_price() {
        let store = HistoryStore::synthetic(10, 1);
        let normal = store.state_at(4, Scenario::Normal).unwrap();
        let high = store.state_at(4, Scenario::High).unwrap();
        assert_eq!(normal.history_index, 4);
        assert_eq!(normal.electricity_price_eur_kwh, store.price_at(4, Scenario::Normal));
        assert_eq!(high.electricity_price_eur_kwh, store.price_at(4, Scenario::High));
        assert!(store.state_at(10, Scenario::Normal).is_err());
    }

    #[test]
    fn price_window_truncates_at_end() {
        let store = HistoryStore::synthetic(100, 2);
        let window = store.price_window(90, 96, Scenario::Normal);
        assert_eq!(window.len(), 10);
    }

    #[test]
    fn loads_csv_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "timestamp,l1_m,v_m3,f1_m3_15min,f2_m3h,price_high_eur_kwh,price_normal_eur_kwh"
        )
        .unwrap();
        writeln!(
            file,
            "2024-03-01T00:00:00Z,1.82,5405.0,1708.0,6980.0,2.4,0.14"
        )
        .unwrap();
        file.flush().unwrap();
        let store = HistoryStore::from_csv(file.path()).unwrap();
        assert_eq!(store.len(), 1);
        let state = store.state_at(0, Scenario::Normal).unwrap();
        assert_eq!(state.l1_m, 1.82);
        assert_eq!(state.electricity_price_eur_kwh, 0.14);
    }

    #[test]
    fn geometry_csv_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "level_m,volume_m3").unwrap();
        writeln!(file, "0.0,0.0").unwrap();
        writeln!(file, "8.0,98000.0").unwrap();
        file.flush().unwrap();
        let points = load_geometry_csv(file.path()).unwrap();
        assert_eq!(points.len(), 2);
        assert!(TunnelGeometry::from_points(points).is_ok());
    }
}
