use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

/// Observations Pearson's r needs before it means anything.
pub const MIN_CORRELATION_ROWS: usize = 2;

// ── Pearson helper ────────────────────────────────────────────────────────────

/// Pearson correlation coefficient of two equally long series.
///
/// Returns `None` when the series are shorter than [`MIN_CORRELATION_ROWS`],
/// differ in length, or either has zero variance (r is undefined there).
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < MIN_CORRELATION_ROWS {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return None;
    }
    // Clamp away floating-point drift just outside [-1, 1].
    Some((cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0))
}

// ── CorrelationMatrix ─────────────────────────────────────────────────────────

/// Symmetric matrix of pairwise Pearson coefficients.
///
/// `None` entries are undefined (a zero-variance column), never a made-up 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
    /// Number of observations each coefficient was computed over.
    pub observations: usize,
}

impl CorrelationMatrix {
    /// Build the matrix from one series per column.
    ///
    /// Fails with [`RegistryError::Config`] when the column names and series
    /// disagree in number or the series differ in length, and with
    /// [`RegistryError::InsufficientData`] for fewer than two observations.
    pub fn from_series(columns: Vec<String>, series: &[Vec<f64>]) -> Result<Self> {
        if columns.len() != series.len() {
            return Err(RegistryError::Config(format!(
                "correlation needs one series per column: {} columns, {} series",
                columns.len(),
                series.len()
            )));
        }
        let observations = series.first().map(|s| s.len()).unwrap_or(0);
        if let Some(ragged) = series.iter().position(|s| s.len() != observations) {
            return Err(RegistryError::Config(format!(
                "series for `{}` has {} observations, expected {}",
                columns[ragged],
                series[ragged].len(),
                observations
            )));
        }
        if observations < MIN_CORRELATION_ROWS {
            return Err(RegistryError::InsufficientData {
                statistic: "pearson correlation".to_string(),
                required: MIN_CORRELATION_ROWS,
                actual: observations,
            });
        }

        let k = series.len();
        let mut values = vec![vec![None; k]; k];
        for i in 0..k {
            for j in i..k {
                let r = pearson(&series[i], &series[j]);
                values[i][j] = r;
                values[j][i] = r;
            }
        }

        Ok(Self {
            columns,
            values,
            observations,
        })
    }

    /// Coefficient between two named columns.
    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }
}
