//! Forecast series handed to the automatic dispatch policies.

use serde::{Deserialize, Serialize};

/// How a forecast is derived from the actual series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMode {
    /// Perfect foresight: the forecast is the actual series.
    #[default]
    LookAhead,
    /// "Today is yesterday": each step sees the value one day earlier.
    LookBehind,
}

impl ForecastMode {
    /// Builds a forecast of `horizon` steps from `actual`.
    ///
    /// # Arguments
    ///
    /// * `actual` - Actual per-step values
    /// * `steps_per_day` - Substeps in one day, used for the look-behind shift
    /// * `horizon` - Number of steps to forecast
    ///
    /// # Returns
    ///
    /// A vector of length `horizon`. Look-ahead wraps past the end of
    /// `actual`; look-behind repeats the first day for the first day.
    pub fn forecast(self, actual: &[f64], steps_per_day: usize, horizon: usize) -> Vec<f64> {
        if horizon == 0 {
            return Vec::new();
        }
        if actual.is_empty() {
            return vec![0.0; horizon];
        }

        let len = actual.len();
        match self {
            Self::LookAhead => (0..horizon).map(|i| actual[i % len]).collect(),
            Self::LookBehind => (0..horizon)
                .map(|i| {
                    let src = if i >= steps_per_day { i - steps_per_day } else { i };
                    actual[src % len]
                })
                .collect(),
        }
    }
}

/// Appends the first `extra` values to the end of a series so look-ahead
/// windows near its end stay in bounds.
pub fn extend_for_look_ahead(series: &[f64], extra: usize) -> Vec<f64> {
    let mut out = series.to_vec();
    if !series.is_empty() {
        out.extend((0..extra).map(|i| series[i % series.len()]));
    }
    out
}
