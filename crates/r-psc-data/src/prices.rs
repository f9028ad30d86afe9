//! ---
//! psc_section: "11-simulation-test-harness"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Historical dataset bindings and price outlook."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// A contiguous span of ticks whose price sits on one side of a percentile
/// threshold. Offsets are relative to the window start (0 = now).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceWindow {
    pub start_step: usize,
    pub end_step: usize,
    pub avg_price_eur_kwh: f64,
}

impl PriceWindow {
    pub fn start_hours(&self) -> f64 {
        self.start_step as f64 * 0.25
    }

    pub fn duration_hours(&self) -> f64 {
        (self.end_step - self.start_step + 1) as f64 * 0.25
    }
}

/// Contiguous spans at or below the `percentile` threshold (default caller
/// value: 25.0). Spans are ordered and non-overlapping.
pub fn cheap_windows(prices: &[f64], percentile: f64) -> Vec<PriceWindow> {
    let threshold = quantile(prices, percentile / 100.0);
    spans(prices, |p| p <= threshold)
}

/// Contiguous spans at or above the upper threshold.
pub fn expensive_windows(prices: &[f64], percentile: f64) -> Vec<PriceWindow> {
    let threshold = quantile(prices, percentile / 100.0);
    spans(prices, |p| p >= threshold)
}

/// Max/min ratio over the window, the cost agent's volatility signal.
/// A non-positive minimum (negative spot prices) is extreme volatility by
/// definition and reported as infinite.
pub fn spread_ratio(prices: &[f64]) -> f64 {
    let max = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = prices.iter().copied().fold(f64::INFINITY, f64::min);
    if prices.is_empty() || !max.is_finite() || !min.is_finite() {
        return 1.0;
    }
    if min <= 0.0 {
        return f64::INFINITY;
    }
    max / min
}

fn spans(prices: &[f64], keep: impl Fn(f64) -> bool) -> Vec<PriceWindow> {
    let mut windows = Vec::new();
    let mut open: Option<(usize, f64, usize)> = None;
    for (i, &price) in prices.iter().enumerate() {
        match (&mut open, keep(price)) {
            (None, true) => open = Some((i, price, 1)),
            (Some((_, sum, count)), true) => {
                *sum += price;
                *count += 1;
            }
            (Some((start, sum, count)), false) => {
                windows.push(PriceWindow {
                    start_step: *start,
                    end_step: i - 1,
                    avg_price_eur_kwh: *sum / *count as f64,
                });
                open = None;
            }
            (None, false) => {}
        }
    }
    if let Some((start, sum, count)) = open {
        windows.push(PriceWindow {
            start_step: start,
            end_step: prices.len() - 1,
            avg_price_eur_kwh: sum / count as f64,
        });
    }
    windows
}

fn quantile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = pos - lower as f64;
        sorted[lower] * (1.0 - frac) + sorted[upper] * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_contiguous_cheap_spans() {
        let prices = [0.5, 0.1, 0.1, 0.5, 0.1, 0.5];
        let windows = cheap_windows(&prices, 40.0);
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].start_step, 1);
        assert_eq!(windows[0].end_step, 2);
        assert_eq!(windows[1].start_step, 4);
        assert!((windows[0].avg_price_eur_kwh - 0.1).abs() < 1e-12);
    }

    #[test]
    fn window_extending_to_end_is_closed() {
        let prices = [0.5, 0.5, 0.1, 0.1];
        let windows = cheap_windows(&prices, 50.0);
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].end_step, 3);
        assert_eq!(windows[0].duration_hours(), 0.5);
    }

    #[test]
    fn spread_ratio_signals_volatility() {
        assert!((spread_ratio(&[0.1, 0.2, 1.2]) - 12.0).abs() < 1e-9);
        assert_eq!(spread_ratio(&[-0.05, 0.5]), f64::INFINITY);
        assert_eq!(spread_ratio(&[]), 1.0);
    }

    #[test]
    fn expensive_windows_are_disjoint_from_cheap() {
        let prices: Vec<f64> = (0..8).map(|i| i as f64).collect();
        let cheap = cheap_windows(&prices, 25.0);
        let expensive = expensive_windows(&prices, 75.0);
        assert!(!cheap.is_empty() && !expensive.is_empty());
        let cheap_end = cheap.last().unwrap().end_step;
        let expensive_start = expensive[0].start_step;
        assert!(cheap_end < expensive_start);
    }
}
