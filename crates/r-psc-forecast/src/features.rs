//! ---
//! psc_section: "08-energy-models-optimization"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Inflow forecasting model inference."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Number of features fed to the model per step.
pub const FEATURE_COUNT: usize = 10;

/// Build the model's feature vector from the trailing inflow window and the
/// current wall-clock. The window carries 15-minute samples, newest last.
///
/// Layout matches the training pipeline; the order is load-bearing:
/// hour sin/cos, day-of-week sin/cos, weekend flag, rolling means over
/// 3 h / 6 h / 12 h, rolling std over 6 h, current inflow.
pub fn feature_vector(window: &[f64], timestamp: DateTime<Utc>) -> [f64; FEATURE_COUNT] {
    let hour = timestamp.hour() as f64;
    let dow = timestamp.weekday().num_days_from_monday() as f64;
    let is_weekend = if dow >= 5.0 { 1.0 } else { 0.0 };

    let tau = std::f64::consts::TAU;
    let hour_sin = (tau * hour / 24.0).sin();
    let hour_cos = (tau * hour / 24.0).cos();
    let dow_sin = (tau * dow / 7.0).sin();
    let dow_cos = (tau * dow / 7.0).cos();

    let mean_3h = trailing_mean(window, 12);
    let mean_6h = trailing_mean(window, 24);
    let mean_12h = trailing_mean(window, window.len());
    let std_6h = trailing_std(window, 24);
    let current = window.last().copied().unwrap_or(0.0);

    [
        hour_sin, hour_cos, dow_sin, dow_cos, is_weekend, mean_3h, mean_6h, mean_12h, std_6h,
        current,
    ]
}

fn trailing(window: &[f64], n: usize) -> &[f64] {
    let n = n.min(window.len());
    &window[window.len() - n..]
}

fn trailing_mean(window: &[f64], n: usize) -> f64 {
    let slice = trailing(window, n);
    if slice.is_empty() {
        return 0.0;
    }
    slice.iter().sum::<f64>() / slice.len() as f64
}

fn trailing_std(window: &[f64], n: usize) -> f64 {
    let slice = trailing(window, n);
    if slice.len() < 2 {
        return 0.0;
    }
    let mean = slice.iter().sum::<f64>() / slice.len() as f64;
    let var = slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / slice.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn constant_window_features() {
        let window = vec![500.0; 48];
        // Monday noon.
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap();
        let f = feature_vector(&window, ts);
        assert!((f[0] - 0.0).abs() < 1e-9); // sin(π) ≈ 0 at hour 12
        assert!((f[1] + 1.0).abs() < 1e-9);
        assert_eq!(f[4], 0.0);
        assert_eq!(f[5], 500.0);
        assert_eq!(f[6], 500.0);
        assert_eq!(f[7], 500.0);
        assert_eq!(f[8], 0.0);
        assert_eq!(f[9], 500.0);
    }

    #[test]
    fn weekend_flag() {
        let window = vec![100.0; 48];
        let saturday = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        assert_eq!(feature_vector(&window, saturday)[4], 1.0);
    }

    #[test]
    fn rolling_std_reflects_variation() {
        let mut window = vec![100.0; 48];
        window[47] = 300.0;
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 3, 0, 0).unwrap();
        let f = feature_vector(&window, ts);
        assert!(f[8] > 0.0);
        assert_eq!(f[9], 300.0);
    }
}
