//! Product performance in the national marketplace.
//!
//! Category and size sums per state keep each state's top entries and give
//! their share of what is listed for that state. Orders missing a state,
//! category, size, quantity or sale are left out, as are one-letter state
//! codes. The monthly shares use every dated order regardless of state.

use super::{SectionContext, ensure_rows};
use crate::aggregate::{Aggregation, group_by, share_within, sort_descending};
use crate::error::Result;
use crate::filters::{GeoMetric, PerformanceFilter, ProductDimension};
use crate::loader::{MONTH_COLUMN, NATIONAL_SALES_SCHEMA};
use crate::types::{GroupShare, LabeledValue};
use crate::utils::{f64_values, filter_rows, has_values, month_name, require_columns, str_values};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub metric: GeoMetric,
    /// Top categories per state, largest sums first.
    pub by_category: Vec<GroupShare>,
    /// Top sizes per state, largest sums first.
    pub by_size: Vec<GroupShare>,
    pub dimension: ProductDimension,
    /// Each value of `dimension` split over the other dimension.
    pub cross: Vec<CrossBreakdown>,
    pub monthly: Vec<MonthlyShare>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrossBreakdown {
    pub group: String,
    pub values: Vec<LabeledValue>,
}

/// One dimension value's share of a calendar month, summed across years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyShare {
    pub month: u32,
    pub label: &'static str,
    pub item: String,
    pub value: f64,
    pub percentage: f64,
}

/// A lone letter in the state column.
fn is_state_initial(state: &str) -> bool {
    let mut chars = state.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if c.is_ascii_alphabetic())
}

/// Sum `value` per `(state, label)`, keep the `n` largest per state and
/// express each as a percentage of what is kept for its state.
fn top_shares_per_state(
    rows: &DataFrame,
    label_key: &str,
    value: &str,
    n: usize,
) -> Result<Vec<GroupShare>> {
    let grouped = group_by(rows, &["state", label_key], &[Aggregation::sum(value)])?;
    let ranked = sort_descending(&grouped, &[value])?;
    let states = str_values(&ranked, "state")?;
    let labels = str_values(&ranked, label_key)?;
    let values = f64_values(&ranked, value)?;

    let mut listed: HashMap<String, usize> = HashMap::new();
    let mut totals: HashMap<String, f64> = HashMap::new();
    let mut shares = Vec::new();
    for ((state, label), v) in states.into_iter().zip(labels).zip(values) {
        let (Some(state), Some(label)) = (state, label) else { continue };
        let count = listed.entry(state.clone()).or_insert(0);
        if *count == n {
            continue;
        }
        *count += 1;
        let value = v.unwrap_or(0.0);
        *totals.entry(state.clone()).or_insert(0.0) += value;
        shares.push(GroupShare {
            group: state,
            label,
            value,
            percentage: 0.0,
        });
    }

    for share in &mut shares {
        let total = totals.get(&share.group).copied().unwrap_or(0.0);
        share.percentage = if total == 0.0 { 0.0 } else { share.value / total * 100.0 };
    }
    Ok(shares)
}

fn cross_breakdown(
    rows: &DataFrame,
    dimension: ProductDimension,
    value: &str,
    only: Option<&str>,
) -> Result<Vec<CrossBreakdown>> {
    let (key, other) = (dimension.column(), dimension.other().column());
    let grouped = group_by(rows, &[key, other], &[Aggregation::sum(value)])?;
    let groups = str_values(&grouped, key)?;
    let labels = str_values(&grouped, other)?;
    let values = f64_values(&grouped, value)?;

    let mut cross: Vec<CrossBreakdown> = Vec::new();
    for ((group, label), v) in groups.into_iter().zip(labels).zip(values) {
        let (Some(group), Some(label)) = (group, label) else { continue };
        if only.is_some_and(|o| o != group) {
            continue;
        }
        let entry = LabeledValue::new(label, v.unwrap_or(0.0));
        match cross.iter_mut().find(|c| c.group == group) {
            Some(breakdown) => breakdown.values.push(entry),
            None => cross.push(CrossBreakdown {
                group,
                values: vec![entry],
            }),
        }
    }
    Ok(cross)
}

fn monthly_shares(
    national: &DataFrame,
    filter: &PerformanceFilter,
    metric: GeoMetric,
) -> Result<Vec<MonthlyShare>> {
    let mask: Vec<bool> = f64_values(national, MONTH_COLUMN)?
        .into_iter()
        .map(|m| m.is_some_and(|m| filter.allows_month(m as u32)))
        .collect();
    let dated = filter_rows(national, &mask)?;
    let shares = share_within(
        &dated,
        MONTH_COLUMN,
        filter.dimension.column(),
        Aggregation::sum(metric.column()),
    )?;

    let mut monthly: Vec<MonthlyShare> = shares
        .into_iter()
        .filter_map(|s| {
            let month: u32 = s.group.parse().ok()?;
            Some(MonthlyShare {
                month,
                label: month_name(month),
                item: s.label,
                value: s.value,
                percentage: s.percentage,
            })
        })
        .collect();
    monthly.sort_by_key(|m| m.month);
    Ok(monthly)
}

pub fn build(ctx: &SectionContext) -> Result<PerformanceReport> {
    let national = ctx.sources.national_sales()?;
    let filter = &ctx.filters.performance;
    let geo = &ctx.filters.geo;
    let metric = filter.metric();

    let mut required = vec!["state", "category", "size", "quantity", "sale"];
    if !required.contains(&metric.column()) {
        required.push(metric.column());
    }
    require_columns(national, NATIONAL_SALES_SCHEMA.name, &required)?;

    let mut mask: Vec<bool> = str_values(national, "state")?
        .iter()
        .map(|s| {
            s.as_deref()
                .is_some_and(|s| !is_state_initial(s) && geo.allows_state(s))
        })
        .collect();
    for column in &required[1..] {
        for (keep, value) in mask.iter_mut().zip(str_values(national, column)?) {
            *keep &= value.is_some();
        }
    }
    let rows = filter_rows(national, &mask)?;
    ensure_rows(&rows, "no complete national orders match the state filter")?;
    debug!(
        "{} of {} national orders used for product performance",
        rows.height(),
        national.height()
    );

    let n = ctx.top_n();
    let value = metric.column();
    let by_category = top_shares_per_state(&rows, "category", value, n)?;
    let by_size = top_shares_per_state(&rows, "size", value, n)?;

    let mut notes = Vec::new();
    let cross = cross_breakdown(&rows, filter.dimension, value, filter.group.as_deref())?;
    if let (Some(group), true) = (&filter.group, cross.is_empty()) {
        notes.push(format!(
            "No orders with {} '{}'",
            filter.dimension.column(),
            group
        ));
    }

    let monthly = if has_values(national, MONTH_COLUMN) {
        monthly_shares(national, filter, metric)?
    } else {
        notes.push("No dated orders for the monthly product shares".to_string());
        Vec::new()
    };

    Ok(PerformanceReport {
        metric,
        by_category,
        by_size,
        dimension: filter.dimension,
        cross,
        monthly,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifiers;
    use crate::config::DashboardConfig;
    use crate::error::DashboardError;
    use crate::filters::DashboardFilters;
    use crate::loader::SourceTables;

    fn national() -> DataFrame {
        df!(
            "state" => ["KERALA", "KERALA", "KERALA", "KERALA", "GOA", "K", "GOA"],
            "category" => [Some("Kurta"), Some("Kurta"), Some("Set"), Some("Top"), Some("Set"), Some("Kurta"), None],
            "size" => ["M", "L", "M", "S", "M", "M", "M"],
            "quantity" => ["1", "2", "1", "1", "3", "5", "2"],
            "sale" => ["500", "800", "300", "100", "900", "50", "200"],
            "date" => ["2022-04-01", "2022-04-15", "2022-05-01", "2022-05-03", "2021-05-02", "2022-06-01", "2022-06-02"]
        )
        .unwrap()
    }

    fn report_with(filters: DashboardFilters) -> Result<PerformanceReport> {
        let sources = SourceTables::empty().with_national_sales(national());
        let config = DashboardConfig::builder().top_n(2).build().unwrap();
        let classifiers = Classifiers::default();
        build(&SectionContext {
            sources: &sources,
            config: &config,
            filters: &filters,
            classifiers: &classifiers,
        })
    }

    fn share(shares: &[GroupShare], group: &str, label: &str) -> Option<f64> {
        shares
            .iter()
            .find(|s| s.group == group && s.label == label)
            .map(|s| s.percentage)
    }

    #[test]
    fn test_state_initials() {
        assert!(is_state_initial("K"));
        assert!(!is_state_initial("GOA"));
        assert!(!is_state_initial("1"));
    }

    #[test]
    fn test_top_categories_per_state() {
        let r = report_with(DashboardFilters::default()).unwrap();
        assert_eq!(r.metric, GeoMetric::Quantity);

        // KERALA keeps Kurta and Set; Top is cut by the top-2 limit
        let listed: Vec<(&str, &str)> = r
            .by_category
            .iter()
            .map(|s| (s.group.as_str(), s.label.as_str()))
            .collect();
        assert_eq!(
            listed,
            vec![("KERALA", "Kurta"), ("GOA", "Set"), ("KERALA", "Set")]
        );
        assert_eq!(share(&r.by_category, "KERALA", "Kurta"), Some(75.0));
        assert_eq!(share(&r.by_category, "GOA", "Set"), Some(100.0));
        assert!(r.by_category.iter().all(|s| s.group != "K"));

        assert_eq!(share(&r.by_size, "KERALA", "M"), Some(50.0));
        assert_eq!(share(&r.by_size, "KERALA", "S"), None);
    }

    #[test]
    fn test_cross_breakdown() {
        let r = report_with(DashboardFilters::default()).unwrap();
        let groups: Vec<&str> = r.cross.iter().map(|c| c.group.as_str()).collect();
        assert_eq!(groups, vec!["Kurta", "Set", "Top"]);
        assert_eq!(
            r.cross[0].values,
            vec![LabeledValue::new("M", 1.0), LabeledValue::new("L", 2.0)]
        );
        assert_eq!(r.cross[1].values, vec![LabeledValue::new("M", 4.0)]);

        let mut filters = DashboardFilters::default();
        filters.performance.dimension = ProductDimension::Size;
        filters.performance.group = Some("XL".to_string());
        let r = report_with(filters).unwrap();
        assert!(r.cross.is_empty());
        assert_eq!(r.notes, vec!["No orders with size 'XL'"]);
    }

    #[test]
    fn test_monthly_shares_across_years() {
        let r = report_with(DashboardFilters::default()).unwrap();
        let rows: Vec<(&str, &str, f64)> = r
            .monthly
            .iter()
            .map(|m| (m.label, m.item.as_str(), m.percentage))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("April", "Kurta", 100.0),
                ("May", "Set", 80.0),
                ("May", "Top", 20.0),
                ("June", "Kurta", 100.0),
            ]
        );

        let mut filters = DashboardFilters::default();
        filters.performance.months = vec![5];
        filters.performance.metric = Some(GeoMetric::Sale);
        let r = report_with(filters).unwrap();
        assert_eq!(r.monthly.len(), 2);
        assert_eq!(r.monthly[0].value, 1200.0);
    }

    #[test]
    fn test_state_filter_and_empty_selection() {
        let mut filters = DashboardFilters::default();
        filters.geo.states = vec!["GOA".to_string()];
        let r = report_with(filters).unwrap();
        assert!(r.by_category.iter().all(|s| s.group == "GOA"));

        let mut filters = DashboardFilters::default();
        filters.geo.states = vec!["K".to_string()];
        assert!(matches!(report_with(filters), Err(DashboardError::EmptySelection(_))));
    }
}
