//! Derived metrics and descriptive statistics.
//!
//! Everything here works on plain values so it can be tested without a
//! frame. Statistics skip missing values the way the column reductions do.

use crate::classify::ReorderPriority;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Business Metrics
// =============================================================================

/// Percentage of orders that were returned or cancelled. 0 when there were
/// no orders.
pub fn return_rate(returns: f64, orders: f64) -> f64 {
    percent_of(returns, orders)
}

/// `part` as a percentage of `whole`; 0 when `whole` is 0.
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole == 0.0 { 0.0 } else { part / whole * 100.0 }
}

/// Markup over cost as a percentage: (price - cost) / cost * 100.
///
/// `None` when the cost is zero or the result is not finite; those rows are
/// dropped from margin statistics.
pub fn profit_margin(cost: f64, price: f64) -> Option<f64> {
    if cost == 0.0 {
        return None;
    }
    Some((price - cost) / cost * 100.0).filter(|m| m.is_finite())
}

/// stock / (total_sales + 1).
pub fn stock_to_sales_ratio(stock: f64, total_sales: f64) -> f64 {
    stock / (total_sales + 1.0)
}

/// Daily cost of holding `stock` units. A missing average price counts as 0.
pub fn holding_cost(
    stock: f64,
    avg_sale_price: Option<f64>,
    per_unit: f64,
    price_rate: f64,
) -> f64 {
    stock * per_unit + avg_sale_price.unwrap_or(0.0) * price_rate
}

/// Mean gap in days between consecutive sale dates. Needs at least two dates.
pub fn average_gap_days(dates: &[NaiveDate]) -> Option<f64> {
    if dates.len() < 2 {
        return None;
    }
    let mut sorted = dates.to_vec();
    sorted.sort();
    let gaps: Vec<f64> = sorted
        .windows(2)
        .map(|w| (w[1] - w[0]).num_days() as f64)
        .collect();
    mean(&gaps)
}

/// Units to reorder for a low-stock SKU.
///
/// Only High priority SKUs with sales get a quantity. With a known positive
/// gap between sales the quantity covers `horizon_days` of demand twice over;
/// otherwise it is the average units per sale times `horizon_days`.
pub fn recommended_reorder_qty(
    priority: ReorderPriority,
    sale_count: usize,
    total_qty: f64,
    avg_gap_days: Option<f64>,
    horizon_days: f64,
) -> u64 {
    if priority != ReorderPriority::High || sale_count == 0 {
        return 0;
    }
    let per_sale = total_qty / sale_count as f64;
    let qty = match avg_gap_days {
        Some(gap) if gap > 0.0 => (horizon_days / gap) * per_sale * 2.0,
        _ => per_sale * horizon_days,
    };
    if qty.is_finite() && qty > 0.0 {
        qty.trunc() as u64
    } else {
        0
    }
}

// =============================================================================
// Descriptive Statistics
// =============================================================================

/// The present values of a column.
pub fn present(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().flatten().copied().collect()
}

pub fn sum(values: &[f64]) -> f64 {
    values.iter().sum()
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(sum(values) / values.len() as f64)
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    quantile(values, 0.5)
}

/// Quantile with linear interpolation between closest ranks.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let fraction = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

// =============================================================================
// Correlation and Trend
// =============================================================================

/// Pearson correlation over complete pairs.
///
/// `None` with fewer than two pairs or when either side has zero variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Option<f64> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mx = mean(xs)?;
    let my = mean(ys)?;

    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        cov += (x - mx) * (y - my);
        vx += (x - mx).powi(2);
        vy += (y - my).powi(2);
    }

    if vx == 0.0 || vy == 0.0 {
        return None;
    }
    Some(cov / (vx.sqrt() * vy.sqrt()))
}

/// Pearson correlation over the rows where both values are present.
pub fn pearson_pairwise(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip();
    pearson(&xs, &ys)
}

/// Least-squares line `y = slope * x + intercept`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendLine {
    pub slope: f64,
    pub intercept: f64,
    /// Correlation between x and y (0 when y is constant).
    pub r_value: f64,
    pub observations: usize,
}

impl TrendLine {
    pub fn r_squared(&self) -> f64 {
        self.r_value * self.r_value
    }

    pub fn predict(&self, x: f64) -> f64 {
        self.slope * x + self.intercept
    }
}

/// Ordinary least squares fit. `None` with fewer than two points or when
/// every x is the same.
pub fn linear_fit(xs: &[f64], ys: &[f64]) -> Option<TrendLine> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mx = mean(xs)?;
    let my = mean(ys)?;

    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let slope = sxy / sxx;

    Some(TrendLine {
        slope,
        intercept: my - slope * mx,
        r_value: pearson(xs, ys).unwrap_or(0.0),
        observations: n,
    })
}

/// Trend over an ordered series, using the position (0, 1, 2, ...) as x.
pub fn linear_trend(ys: &[f64]) -> Option<TrendLine> {
    let xs: Vec<f64> = (0..ys.len()).map(|i| i as f64).collect();
    linear_fit(&xs, ys)
}

/// Pairwise correlations between named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub labels: Vec<String>,
    /// `values[i][j]` is the correlation of `labels[i]` with `labels[j]`.
    pub values: Vec<Vec<Option<f64>>>,
}

pub fn correlation_matrix(columns: &[(&str, Vec<Option<f64>>)]) -> CorrelationMatrix {
    let values = columns
        .iter()
        .map(|(_, a)| {
            columns
                .iter()
                .map(|(_, b)| pearson_pairwise(a, b))
                .collect()
        })
        .collect();

    CorrelationMatrix {
        labels: columns.iter().map(|(name, _)| name.to_string()).collect(),
        values,
    }
}
