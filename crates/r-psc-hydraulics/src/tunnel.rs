//! ---
//! psc_section: "02-hydraulic-models"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Pump physics, constraints and plant state."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

use crate::errors::{HydraulicsError, Result};

/// Piecewise-linear level↔volume map of the storage tunnel.
///
/// The tunnel cross-section widens with height, so the map is non-linear.
/// Lookups interpolate linearly between survey points and saturate at the
/// table ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelGeometry {
    /// `(level_m, volume_m3)` pairs, strictly increasing in both columns.
    points: Vec<(f64, f64)>,
}

impl TunnelGeometry {
    pub fn from_points(mut points: Vec<(f64, f64)>) -> Result<Self> {
        points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let monotonic = points.len() >= 2
            && points.windows(2).all(|w| w[0].0 < w[1].0 && w[0].1 < w[1].1);
        if !monotonic {
            return Err(HydraulicsError::DegenerateGeometry);
        }
        Ok(Self { points })
    }

    pub fn volume_to_level(&self, volume_m3: f64) -> f64 {
        Self::interpolate(self.points.iter().map(|&(l, v)| (v, l)), volume_m3)
    }

    pub fn level_to_volume(&self, level_m: f64) -> f64 {
        Self::interpolate(self.points.iter().copied(), level_m)
    }

    fn interpolate(pairs: impl Iterator<Item = (f64, f64)>, x: f64) -> f64 {
        let pairs: Vec<(f64, f64)> = pairs.collect();
        let first = pairs[0];
        let last = pairs[pairs.len() - 1];
        if x <= first.0 {
            return first.1;
        }
        if x >= last.0 {
            return last.1;
        }
        for w in pairs.windows(2) {
            let (x0, y0) = w[0];
            let (x1, y1) = w[1];
            if x <= x1 {
                return y0 + (y1 - y0) * (x - x0) / (x1 - x0);
            }
        }
        last.1
    }
}

impl Default for TunnelGeometry {
    fn default() -> Self {
        // Survey table for the storage tunnel.
        Self {
            points: vec![
                (0.0, 0.0),
                (0.5, 1_200.0),
                (1.0, 2_800.0),
                (1.82, 5_405.0),
                (3.0, 12_000.0),
                (4.0, 20_000.0),
                (5.0, 32_000.0),
                (6.0, 46_000.0),
                (7.0, 64_000.0),
                (7.5, 80_000.0),
                (8.0, 98_000.0),
            ],
        }
    }
}
