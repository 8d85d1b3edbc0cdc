//! State and city breakdowns of the national marketplace orders.
//!
//! State totals honour the state filter and the metric ranges; city totals
//! honour the state and city filters. Cities with a one-letter name are
//! export noise and never reported.

use super::{SectionContext, ensure_rows};
use crate::aggregate::{Aggregation, group_by, labeled_values, share_within, sort_descending, top_n};
use crate::error::Result;
use crate::filters::{GeoFilter, GeoMetric};
use crate::loader::{MONTH_COLUMN, NATIONAL_SALES_SCHEMA};
use crate::types::{GroupShare, LabeledCount, LabeledValue};
use crate::utils::{
    f64_values, filter_rows, has_values, month_name, require_columns, str_values,
};
use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

const PROMOTIONS: &str = "Promotion_ID_Count";

#[derive(Debug, Clone, Serialize)]
pub struct GeographyReport {
    pub metrics: Vec<GeoMetric>,
    /// Every state passing the filters, ordered by the first metric.
    pub states: Vec<RegionTotals>,
    /// Top states for each metric on its own.
    pub state_leaders: Vec<MetricLeaders>,
    /// Top cities ordered by the first metric.
    pub cities: Vec<RegionTotals>,
    pub state_promotions: Vec<LabeledCount>,
    pub city_promotions: Vec<LabeledCount>,
    /// Order status counts and shares within each state.
    pub order_status: Vec<GroupShare>,
    /// B2B flag counts and shares within each state.
    pub b2b: Vec<GroupShare>,
    pub monthly: Vec<MonthlyNational>,
    pub notes: Vec<String>,
}

/// Metric sums for one state or city.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionTotals {
    pub name: String,
    pub totals: Vec<MetricTotal>,
}

impl RegionTotals {
    pub fn total(&self, metric: GeoMetric) -> Option<f64> {
        self.totals.iter().find(|t| t.metric == metric).map(|t| t.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricTotal {
    pub metric: GeoMetric,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricLeaders {
    pub metric: GeoMetric,
    pub leaders: Vec<LabeledValue>,
}

/// Calendar-month sums across all years.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyNational {
    pub month: u32,
    pub label: &'static str,
    pub quantity: f64,
    pub sale: f64,
    pub avg_value: f64,
}

/// A usable city name: longer than one character.
fn is_real_city(city: &str) -> bool {
    city.trim().chars().count() > 1
}

/// A lone capital letter in the city column.
fn is_city_initial(city: &str) -> bool {
    city.len() == 1 && city.chars().all(|c| c.is_ascii_uppercase())
}

/// Row masks over the national table, shared by the sub-analyses.
struct Rows {
    states: Vec<Option<String>>,
    cities: Vec<Option<String>>,
}

impl Rows {
    fn read(national: &DataFrame) -> Result<Self> {
        Ok(Self {
            states: str_values(national, "state")?,
            cities: str_values(national, "city")?,
        })
    }

    fn state_allowed(&self, i: usize, geo: &GeoFilter) -> bool {
        self.states[i].as_deref().is_some_and(|s| geo.allows_state(s))
    }

    fn city_allowed(&self, i: usize, geo: &GeoFilter) -> bool {
        self.cities[i]
            .as_deref()
            .is_some_and(|c| is_real_city(c) && geo.allows_city(c))
    }
}

fn range_mask(national: &DataFrame, geo: &GeoFilter) -> Result<Vec<bool>> {
    let mut mask = vec![true; national.height()];
    for range in &geo.ranges {
        let values = f64_values(national, range.metric.column())?;
        for (keep, value) in mask.iter_mut().zip(values) {
            *keep &= value.is_some_and(|v| range.contains(v));
        }
    }
    Ok(mask)
}

fn sums(metrics: &[GeoMetric]) -> Vec<Aggregation> {
    metrics.iter().map(|m| Aggregation::sum(m.column())).collect()
}

fn region_totals(
    grouped: &DataFrame,
    key: &str,
    metrics: &[GeoMetric],
) -> Result<Vec<RegionTotals>> {
    let names = str_values(grouped, key)?;
    let columns = metrics
        .iter()
        .map(|m| Ok((*m, f64_values(grouped, m.column())?)))
        .collect::<Result<Vec<_>>>()?;

    Ok(names
        .into_iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let totals = columns
                .iter()
                .map(|(metric, values)| MetricTotal {
                    metric: *metric,
                    value: values[i].unwrap_or(0.0),
                })
                .collect();
            Some(RegionTotals { name: name?, totals })
        })
        .collect())
}

fn promotion_counts(
    national: &DataFrame,
    mask: &[bool],
    key: &str,
    n: usize,
    min_promotions: usize,
) -> Result<Vec<LabeledCount>> {
    let rows = filter_rows(national, mask)?;
    if rows.height() == 0 {
        return Ok(Vec::new());
    }
    let counts = [Aggregation::n_unique(PROMOTIONS).alias("promotions")];
    let grouped = group_by(&rows, &[key], &counts)?;
    let ranked = sort_descending(&grouped, &["promotions"])?;
    Ok(labeled_values(&ranked, key, "promotions")?
        .into_iter()
        .map(|v| LabeledCount::new(v.label, v.value as usize))
        .filter(|c| c.count >= min_promotions)
        .take(n)
        .collect())
}

fn monthly_series(national: &DataFrame) -> Result<Vec<MonthlyNational>> {
    let grouped = group_by(national, &[MONTH_COLUMN], &sums(&GeoMetric::ALL))?;
    let months = f64_values(&grouped, MONTH_COLUMN)?;
    let quantity = f64_values(&grouped, GeoMetric::Quantity.column())?;
    let sale = f64_values(&grouped, GeoMetric::Sale.column())?;
    let avg_value = f64_values(&grouped, GeoMetric::AvgValue.column())?;

    let mut monthly: Vec<MonthlyNational> = months
        .into_iter()
        .enumerate()
        .filter_map(|(i, month)| {
            let month = month? as u32;
            Some(MonthlyNational {
                month,
                label: month_name(month),
                quantity: quantity[i].unwrap_or(0.0),
                sale: sale[i].unwrap_or(0.0),
                avg_value: avg_value[i].unwrap_or(0.0),
            })
        })
        .collect();
    monthly.sort_by_key(|m| m.month);
    Ok(monthly)
}

pub fn build(ctx: &SectionContext) -> Result<GeographyReport> {
    let national = ctx.sources.national_sales()?;
    let geo = &ctx.filters.geo;
    let n = ctx.top_n();

    let mut metrics: Vec<GeoMetric> = Vec::new();
    for metric in geo.selected_metrics() {
        if !metrics.contains(&metric) {
            metrics.push(metric);
        }
    }
    let mut required = vec!["state", "city"];
    required.extend(metrics.iter().map(|m| m.column()));
    required.extend(geo.ranges.iter().map(|r| r.metric.column()));
    require_columns(national, NATIONAL_SALES_SCHEMA.name, &required)?;

    let rows = Rows::read(national)?;
    let height = national.height();
    let mut notes = Vec::new();

    let in_range = range_mask(national, geo)?;
    let state_mask: Vec<bool> = (0..height)
        .map(|i| rows.state_allowed(i, geo) && in_range[i])
        .collect();
    let state_rows = filter_rows(national, &state_mask)?;
    ensure_rows(&state_rows, "no national orders match the state and metric filters")?;
    debug!("{} of {} national orders pass the state filters", state_rows.height(), height);

    let by_state = group_by(&state_rows, &["state"], &sums(&metrics))?;
    let lead = metrics[0].column();
    let states = region_totals(&sort_descending(&by_state, &[lead])?, "state", &metrics)?;
    let state_leaders = metrics
        .iter()
        .map(|m| {
            let top = top_n(&by_state, m.column(), n)?;
            Ok(MetricLeaders {
                metric: *m,
                leaders: labeled_values(&top, "state", m.column())?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let city_mask: Vec<bool> = (0..height)
        .map(|i| rows.state_allowed(i, geo) && rows.city_allowed(i, geo))
        .collect();
    let city_rows = filter_rows(national, &city_mask)?;
    let cities = if city_rows.height() == 0 {
        notes.push("No cities match the state and city filters".to_string());
        Vec::new()
    } else {
        let by_city = group_by(&city_rows, &["city"], &sums(&metrics))?;
        region_totals(&top_n(&by_city, lead, n)?, "city", &metrics)?
    };

    let (state_promotions, city_promotions) = if national.column(PROMOTIONS).is_ok() {
        let by_state: Vec<bool> = (0..height).map(|i| rows.state_allowed(i, geo)).collect();
        (
            promotion_counts(national, &by_state, "state", n, geo.min_promotions)?,
            promotion_counts(national, &city_mask, "city", n, geo.min_promotions)?,
        )
    } else {
        notes.push(format!("{} has no {} column", NATIONAL_SALES_SCHEMA.name, PROMOTIONS));
        (Vec::new(), Vec::new())
    };

    let order_status = if national.column("Order_Status").is_ok()
        && national.column("shipping_level").is_ok()
    {
        let statuses = str_values(national, "Order_Status")?;
        let shipping = str_values(national, "shipping_level")?;
        let mask: Vec<bool> = (0..height)
            .map(|i| {
                rows.state_allowed(i, geo)
                    && rows.cities[i]
                        .as_deref()
                        .is_some_and(|c| !is_city_initial(c) && geo.allows_city(c))
                    && statuses[i].is_some()
                    && shipping[i].is_some()
            })
            .collect();
        let shipped = filter_rows(national, &mask)?;
        share_within(&shipped, "state", "Order_Status", Aggregation::count("Order_Status"))?
    } else {
        notes.push("Order status analysis needs Order_Status and shipping_level".to_string());
        Vec::new()
    };

    let b2b = if national.column("b2b").is_ok() {
        let flags = str_values(national, "b2b")?;
        let mask: Vec<bool> = (0..height)
            .map(|i| {
                flags[i].is_some()
                    && rows.state_allowed(i, geo)
                    && rows.cities[i].as_deref().is_some_and(is_real_city)
            })
            .collect();
        share_within(&filter_rows(national, &mask)?, "state", "b2b", Aggregation::count("b2b"))?
    } else {
        notes.push(format!("{} has no b2b column", NATIONAL_SALES_SCHEMA.name));
        Vec::new()
    };

    let has_all_metrics = GeoMetric::ALL.iter().all(|m| national.column(m.column()).is_ok());
    let monthly = if has_all_metrics && has_values(national, MONTH_COLUMN) {
        monthly_series(national)?
    } else {
        notes.push(
            "No dated orders with quantity, sale and avg. value for the monthly series".to_string(),
        );
        Vec::new()
    };

    Ok(GeographyReport {
        metrics,
        states,
        state_leaders,
        cities,
        state_promotions,
        city_promotions,
        order_status,
        b2b,
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
    use crate::filters::{DashboardFilters, MetricRange};
    use crate::loader::SourceTables;

    fn national() -> DataFrame {
        df!(
            "state" => ["KERALA", "KERALA", "KERALA", "GOA", "GOA"],
            "city" => ["KOCHI", "KOCHI", "K", "PANAJI", "PANAJI"],
            "quantity" => ["1", "2", "1", "3", "1"],
            "sale" => ["500", "800", "100", "900", "50"],
            "avg. value" => ["500", "400", "100", "300", "50"],
            "Promotion_ID_Count" => [Some("P1"), Some("P2"), Some("P3"), Some("P1"), None],
            "Order_Status" => ["Shipped", "Cancelled", "Shipped", "Shipped", "Shipped"],
            "shipping_level" => [Some("Expedited"), Some("Expedited"), Some("Standard"), Some("Standard"), None],
            "b2b" => ["False", "True", "False", "False", "False"],
            "date" => ["2022-04-01", "2022-04-15", "2022-05-01", "2022-05-02", "2022-06-01"]
        )
        .unwrap()
    }

    fn report_with(filters: DashboardFilters) -> Result<GeographyReport> {
        let sources = SourceTables::empty().with_national_sales(national());
        let config = DashboardConfig::default();
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
    fn test_state_and_city_totals() {
        let r = report_with(DashboardFilters::default()).unwrap();
        assert_eq!(r.metrics, GeoMetric::ALL.to_vec());

        let kerala = &r.states[0];
        assert_eq!(kerala.name, "KERALA");
        assert_eq!(kerala.total(GeoMetric::Sale), Some(1400.0));
        assert_eq!(kerala.total(GeoMetric::Quantity), Some(4.0));

        // one-letter cities are dropped
        let cities: Vec<&str> = r.cities.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(cities, vec!["KOCHI", "PANAJI"]);

        let sale_leaders = r
            .state_leaders
            .iter()
            .find(|l| l.metric == GeoMetric::Sale)
            .unwrap();
        assert_eq!(sale_leaders.leaders[1], LabeledValue::new("GOA", 950.0));
    }

    #[test]
    fn test_promotions_count_distinct_ids() {
        let r = report_with(DashboardFilters::default()).unwrap();
        assert_eq!(
            r.state_promotions,
            vec![LabeledCount::new("KERALA", 3), LabeledCount::new("GOA", 1)]
        );
        assert_eq!(
            r.city_promotions,
            vec![LabeledCount::new("KOCHI", 2), LabeledCount::new("PANAJI", 1)]
        );

        let mut filters = DashboardFilters::default();
        filters.geo.min_promotions = 2;
        let r = report_with(filters).unwrap();
        assert_eq!(r.state_promotions, vec![LabeledCount::new("KERALA", 3)]);
    }

    #[test]
    fn test_order_status_and_b2b_shares() {
        let r = report_with(DashboardFilters::default()).unwrap();
        assert_eq!(share(&r.order_status, "KERALA", "Shipped"), Some(50.0));
        assert_eq!(share(&r.order_status, "KERALA", "Cancelled"), Some(50.0));
        assert_eq!(share(&r.order_status, "GOA", "Shipped"), Some(100.0));

        assert_eq!(share(&r.b2b, "KERALA", "True"), Some(50.0));
        assert_eq!(share(&r.b2b, "GOA", "False"), Some(100.0));
    }

    #[test]
    fn test_monthly_series_in_calendar_order() {
        let r = report_with(DashboardFilters::default()).unwrap();
        let labels: Vec<&str> = r.monthly.iter().map(|m| m.label).collect();
        assert_eq!(labels, vec!["April", "May", "June"]);
        assert_eq!(r.monthly[0].sale, 1300.0);
        assert_eq!(r.monthly[1].quantity, 4.0);
        assert!(r.notes.is_empty());
    }

    #[test]
    fn test_metric_ranges_are_inclusive() {
        let mut filters = DashboardFilters::default();
        filters.geo.metrics = vec![GeoMetric::Sale];
        filters.geo.ranges = vec![MetricRange {
            metric: GeoMetric::Sale,
            min: 50.0,
            max: 500.0,
        }];
        let r = report_with(filters).unwrap();
        assert_eq!(r.states[0].total(GeoMetric::Sale), Some(600.0));
        assert_eq!(r.states[1].total(GeoMetric::Sale), Some(50.0));
        assert_eq!(r.states[0].total(GeoMetric::Quantity), None);

        let mut filters = DashboardFilters::default();
        filters.geo.states = vec!["GOA".to_string()];
        filters.geo.ranges = vec![MetricRange {
            metric: GeoMetric::Sale,
            min: 1000.0,
            max: 5000.0,
        }];
        assert!(matches!(report_with(filters), Err(DashboardError::EmptySelection(_))));
    }
}
