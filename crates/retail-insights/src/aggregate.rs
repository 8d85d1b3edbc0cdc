//! Grouping, ranking and pivoting.
//!
//! Groups come out in first-seen order and rankings use stable sorts, so two
//! runs over the same file give the same tables.

use crate::error::{DashboardError, Result, ResultExt};
use crate::types::{GroupShare, LabeledValue};
use crate::utils::{f64_values, require_columns, str_values};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reduction applied to a column within each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reduction {
    /// Sum of non-null values (0 for an all-null group).
    Sum,
    /// Mean of non-null values.
    Mean,
    /// Number of non-null values.
    Count,
    /// Number of distinct non-null values.
    NUnique,
    Max,
    Min,
}

/// One `(column, reduction)` pair with its output name.
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    pub column: String,
    pub reduction: Reduction,
    pub alias: String,
}

impl Aggregation {
    /// Aggregate `column`, naming the output after the column.
    pub fn new(column: impl Into<String>, reduction: Reduction) -> Self {
        let column = column.into();
        Self {
            alias: column.clone(),
            column,
            reduction,
        }
    }

    pub fn sum(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Sum)
    }

    pub fn mean(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Mean)
    }

    pub fn count(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Count)
    }

    pub fn n_unique(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::NUnique)
    }

    pub fn max(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Max)
    }

    pub fn min(column: impl Into<String>) -> Self {
        Self::new(column, Reduction::Min)
    }

    /// Rename the output column.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    fn expr(&self) -> Expr {
        let c = col(self.column.as_str());
        let reduced = match self.reduction {
            Reduction::Sum => c.sum(),
            Reduction::Mean => c.mean(),
            Reduction::Count => c.count(),
            Reduction::NUnique => c.drop_nulls().n_unique(),
            Reduction::Max => c.max(),
            Reduction::Min => c.min(),
        };
        reduced.alias(self.alias.as_str())
    }
}

/// Group `df` by `keys` and apply each aggregation.
///
/// Rows with a null in any key are excluded. Groups appear in the order
/// their first row appears in `df`.
pub fn group_by(df: &DataFrame, keys: &[&str], aggregations: &[Aggregation]) -> Result<DataFrame> {
    require_columns(df, "grouped table", keys)?;
    let value_columns: Vec<&str> = aggregations.iter().map(|a| a.column.as_str()).collect();
    require_columns(df, "grouped table", &value_columns)?;

    let mut lf = df.clone().lazy();
    for key in keys {
        lf = lf.filter(col(*key).is_not_null());
    }

    let key_exprs: Vec<Expr> = keys.iter().map(|k| col(*k)).collect();
    let agg_exprs: Vec<Expr> = aggregations.iter().map(Aggregation::expr).collect();

    lf.group_by_stable(key_exprs)
        .agg(agg_exprs)
        .collect()
        .context(format!("Grouping by {}", keys.join(", ")))
}

/// Sort descending by `by`, nulls last, ties in original order.
pub fn sort_descending(df: &DataFrame, by: &[&str]) -> Result<DataFrame> {
    require_columns(df, "sorted table", by)?;
    let by: Vec<String> = by.iter().map(|c| c.to_string()).collect();
    Ok(df.sort(
        by,
        SortMultipleOptions::default()
            .with_order_descending(true)
            .with_nulls_last(true)
            .with_maintain_order(true),
    )?)
}

/// First `n` rows after a stable descending sort on `by`.
pub fn top_n(df: &DataFrame, by: &str, n: usize) -> Result<DataFrame> {
    Ok(sort_descending(df, &[by])?.head(Some(n)))
}

/// `(key, value)` rows of a grouped frame, skipping null keys and values.
pub fn labeled_values(df: &DataFrame, key: &str, value: &str) -> Result<Vec<LabeledValue>> {
    let keys = str_values(df, key)?;
    let values = f64_values(df, value)?;
    Ok(keys
        .into_iter()
        .zip(values)
        .filter_map(|(k, v)| Some(LabeledValue::new(k?, v?)))
        .collect())
}

/// Group by one key, reduce one column and rank descending.
pub fn ranked(
    df: &DataFrame,
    key: &str,
    aggregation: Aggregation,
    n: Option<usize>,
) -> Result<Vec<LabeledValue>> {
    let alias = aggregation.alias.clone();
    let grouped = group_by(df, &[key], &[aggregation])?;
    let sorted = match n {
        Some(n) => top_n(&grouped, &alias, n)?,
        None => sort_descending(&grouped, &[alias.as_str()])?,
    };
    labeled_values(&sorted, key, &alias)
}

/// A row-key by column-key matrix of summed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PivotTable {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    /// `values[r][c]` for `rows[r]` and `columns[c]`; missing pairs are 0.
    pub values: Vec<Vec<f64>>,
}

impl PivotTable {
    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        let r = self.rows.iter().position(|x| x == row)?;
        let c = self.columns.iter().position(|x| x == column)?;
        Some(self.values[r][c])
    }
}

/// Sum `value` for every `(row_key, column_key)` pair.
///
/// Rows appear in first-seen order. Columns follow `column_order` when given
/// (keys not listed are dropped), otherwise first-seen order.
pub fn pivot(
    df: &DataFrame,
    row_key: &str,
    column_key: &str,
    value: &str,
    column_order: Option<&[String]>,
) -> Result<PivotTable> {
    let grouped = group_by(df, &[row_key, column_key], &[Aggregation::sum(value)])?;
    let row_keys = str_values(&grouped, row_key)?;
    let column_keys = str_values(&grouped, column_key)?;
    let sums = f64_values(&grouped, value)?;

    let mut rows: Vec<String> = Vec::new();
    let mut columns: Vec<String> = column_order.map(<[String]>::to_vec).unwrap_or_default();
    let mut cells: HashMap<(String, String), f64> = HashMap::new();

    for ((r, c), v) in row_keys.into_iter().zip(column_keys).zip(sums) {
        let (Some(r), Some(c)) = (r, c) else {
            continue;
        };
        if column_order.is_some_and(|order| !order.contains(&c)) {
            continue;
        }
        if !rows.contains(&r) {
            rows.push(r.clone());
        }
        if !columns.contains(&c) {
            columns.push(c.clone());
        }
        *cells.entry((r, c)).or_insert(0.0) += v.unwrap_or(0.0);
    }

    let values = rows
        .iter()
        .map(|r| {
            columns
                .iter()
                .map(|c| cells.get(&(r.clone(), c.clone())).copied().unwrap_or(0.0))
                .collect()
        })
        .collect();

    Ok(PivotTable {
        rows,
        columns,
        values,
    })
}

/// Sum `value` per `(group, label)` and express each as a percentage of its
/// group total. Groups with a zero total get 0%.
pub fn share_within(
    df: &DataFrame,
    group_key: &str,
    label_key: &str,
    aggregation: Aggregation,
) -> Result<Vec<GroupShare>> {
    if group_key == label_key {
        return Err(DashboardError::InvalidFilter(format!(
            "cannot compute shares of '{}' within itself",
            group_key
        )));
    }
    let alias = aggregation.alias.clone();
    let grouped = group_by(df, &[group_key, label_key], &[aggregation])?;
    let groups = str_values(&grouped, group_key)?;
    let labels = str_values(&grouped, label_key)?;
    let values = f64_values(&grouped, &alias)?;

    let mut totals: HashMap<String, f64> = HashMap::new();
    let rows: Vec<(String, String, f64)> = groups
        .into_iter()
        .zip(labels)
        .zip(values)
        .filter_map(|((g, l), v)| Some((g?, l?, v.unwrap_or(0.0))))
        .inspect(|(g, _, v)| *totals.entry(g.clone()).or_insert(0.0) += v)
        .collect();

    Ok(rows
        .into_iter()
        .map(|(group, label, value)| {
            let total = totals.get(&group).copied().unwrap_or(0.0);
            let percentage = if total == 0.0 { 0.0 } else { value / total * 100.0 };
            GroupShare {
                group,
                label,
                value,
                percentage,
            }
        })
        .collect())
}
