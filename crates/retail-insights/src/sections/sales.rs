//! Sales overview over the international sales export.
//!
//! Sales rows are joined to the stock catalog for category and colour, then
//! filtered to the selected year and summarized by month, category, colour
//! and SKU.

use super::{SectionContext, distinct_sorted, ensure_rows};
use crate::aggregate::{Aggregation, PivotTable, group_by, pivot, ranked, top_n};
use crate::error::{DashboardError, Result};
use crate::join::{JoinStats, left_join};
use crate::loader::{INTERNATIONAL_SALES_SCHEMA, MONTH_COLUMN, YEAR_COLUMN};
use crate::metrics::{TrendLine, linear_trend, mean, present, sum};
use crate::types::LabeledValue;
use crate::utils::{f64_values, filter_rows, has_values, month_name, require_columns, str_values};
use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

const REQUIRED: [&str; 4] = ["sku", "date", "Quantity_Purchased", "Gross_Amount"];
const PERIOD_COLUMN: &str = "__period";

#[derive(Debug, Clone, Serialize)]
pub struct SalesOverview {
    pub available_years: Vec<i32>,
    /// Year the figures cover; None means every year.
    pub year: Option<i32>,
    pub kpis: SalesKpis,
    /// Months in chronological order.
    pub monthly: Vec<MonthlySales>,
    /// Trend of monthly sales over the month index.
    pub trend: Option<TrendLine>,
    pub category_sales: Option<PivotTable>,
    pub category_quantity: Option<PivotTable>,
    pub top_colours: Vec<LabeledValue>,
    pub top_products: Vec<ProductSales>,
    pub catalog_join: Option<JoinStats>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SalesKpis {
    pub total_sales: f64,
    pub total_quantity: f64,
    pub total_orders: usize,
    pub avg_order_value: f64,
    pub unique_categories: usize,
    pub unique_products: usize,
    pub best_month: Option<LabeledValue>,
    pub avg_monthly_sales: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlySales {
    pub year: i32,
    pub month: u32,
    pub label: String,
    pub sales: f64,
    pub quantity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductSales {
    pub sku: String,
    pub sales: f64,
    pub quantity: f64,
}

fn period_label(year: i32, month: u32) -> String {
    format!("{} {}", month_name(month), year)
}

/// Year and month of every row, when both are known.
fn row_periods(df: &DataFrame) -> Result<Vec<Option<(i32, u32)>>> {
    let years = f64_values(df, YEAR_COLUMN)?;
    let months = f64_values(df, MONTH_COLUMN)?;
    Ok(years
        .into_iter()
        .zip(months)
        .map(|(y, m)| Some((y? as i32, m? as u32)))
        .collect())
}

fn monthly_sales(df: &DataFrame) -> Result<Vec<MonthlySales>> {
    let grouped = group_by(
        df,
        &[YEAR_COLUMN, MONTH_COLUMN],
        &[
            Aggregation::sum("Gross_Amount"),
            Aggregation::sum("Quantity_Purchased"),
        ],
    )?;

    let periods = row_periods(&grouped)?;
    let sales = f64_values(&grouped, "Gross_Amount")?;
    let quantity = f64_values(&grouped, "Quantity_Purchased")?;

    let mut monthly: Vec<MonthlySales> = periods
        .into_iter()
        .zip(sales.into_iter().zip(quantity))
        .filter_map(|(period, (s, q))| {
            let (year, month) = period?;
            Some(MonthlySales {
                year,
                month,
                label: period_label(year, month),
                sales: s.unwrap_or(0.0),
                quantity: q.unwrap_or(0.0),
            })
        })
        .collect();
    monthly.sort_by_key(|m| (m.year, m.month));
    Ok(monthly)
}

/// First month with the highest sales.
fn best_month(monthly: &[MonthlySales]) -> Option<LabeledValue> {
    let mut best: Option<&MonthlySales> = None;
    for m in monthly {
        if best.is_none_or(|b| m.sales > b.sales) {
            best = Some(m);
        }
    }
    best.map(|m| LabeledValue::new(m.label.clone(), m.sales))
}

fn top_products(df: &DataFrame, n: usize) -> Result<Vec<ProductSales>> {
    let grouped = group_by(
        df,
        &["sku"],
        &[
            Aggregation::sum("Gross_Amount"),
            Aggregation::sum("Quantity_Purchased"),
        ],
    )?;
    let top = top_n(&grouped, "Gross_Amount", n)?;

    let skus = str_values(&top, "sku")?;
    let sales = f64_values(&top, "Gross_Amount")?;
    let quantity = f64_values(&top, "Quantity_Purchased")?;
    Ok(skus
        .into_iter()
        .zip(sales.into_iter().zip(quantity))
        .filter_map(|(sku, (s, q))| {
            Some(ProductSales {
                sku: sku?,
                sales: s.unwrap_or(0.0),
                quantity: q.unwrap_or(0.0),
            })
        })
        .collect())
}

pub fn build(ctx: &SectionContext) -> Result<SalesOverview> {
    let sales = ctx.sources.international_sales()?;
    require_columns(sales, INTERNATIONAL_SALES_SCHEMA.name, &REQUIRED)?;

    let mut notes = Vec::new();
    let (joined, catalog_join) = match ctx.catalog() {
        Ok(catalog) => {
            let outcome = left_join(sales, &catalog, "sku", &ctx.config.join_suffix)?;
            (outcome.frame, Some(outcome.stats))
        }
        Err(e) => {
            notes.push(format!("Catalog details unavailable: {}", e));
            (sales.clone(), None)
        }
    };

    let periods = row_periods(&joined)?;
    let mut available_years: Vec<i32> = periods.iter().flatten().map(|(y, _)| *y).collect();
    available_years.sort_unstable();
    available_years.dedup();

    let mut df = match ctx.filters.year {
        Some(year) => {
            if !available_years.contains(&year) {
                return Err(DashboardError::EmptySelection(format!(
                    "no international sales in {}",
                    year
                )));
            }
            let mask: Vec<bool> = periods
                .iter()
                .map(|p| p.is_some_and(|(y, _)| y == year))
                .collect();
            filter_rows(&joined, &mask)?
        }
        None => joined,
    };
    ensure_rows(&df, "international sales")?;
    debug!("Sales overview over {} rows", df.height());

    let total_sales = sum(&present(&f64_values(&df, "Gross_Amount")?));
    let total_quantity = sum(&present(&f64_values(&df, "Quantity_Purchased")?));
    let total_orders = df.height();
    let unique_categories = if df.column("category").is_ok() {
        distinct_sorted(&df, "category")?.len()
    } else {
        0
    };

    let monthly = monthly_sales(&df)?;
    let monthly_values: Vec<f64> = monthly.iter().map(|m| m.sales).collect();

    let kpis = SalesKpis {
        total_sales,
        total_quantity,
        total_orders,
        avg_order_value: if total_orders > 0 {
            total_sales / total_orders as f64
        } else {
            0.0
        },
        unique_categories,
        unique_products: distinct_sorted(&df, "sku")?.len(),
        best_month: best_month(&monthly),
        avg_monthly_sales: mean(&monthly_values).unwrap_or(0.0),
    };

    let (category_sales, category_quantity) = if has_values(&df, "category") {
        let labels: Vec<Option<String>> = row_periods(&df)?
            .into_iter()
            .map(|p| p.map(|(y, m)| period_label(y, m)))
            .collect();
        df.with_column(Series::new(PERIOD_COLUMN.into(), labels))?;
        let order: Vec<String> = monthly.iter().map(|m| m.label.clone()).collect();
        (
            Some(pivot(&df, "category", PERIOD_COLUMN, "Gross_Amount", Some(&order))?),
            Some(pivot(&df, "category", PERIOD_COLUMN, "Quantity_Purchased", Some(&order))?),
        )
    } else {
        notes.push("No category data available for the selected period".to_string());
        (None, None)
    };

    let top_colours = if has_values(&df, "colour") {
        ranked(&df, "colour", Aggregation::sum("Gross_Amount"), Some(ctx.top_n()))?
    } else {
        notes.push("No colour data available for the selected period".to_string());
        Vec::new()
    };

    Ok(SalesOverview {
        available_years,
        year: ctx.filters.year,
        kpis,
        trend: linear_trend(&monthly_values),
        monthly,
        category_sales,
        category_quantity,
        top_colours,
        top_products: top_products(&df, ctx.top_n())?,
        catalog_join,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifiers;
    use crate::config::DashboardConfig;
    use crate::filters::DashboardFilters;
    use crate::loader::SourceTables;

    fn sources() -> SourceTables {
        let sales = df!(
            "date" => ["05-04-2021", "20-04-2021", "02-05-2021", "10-01-2022", "bad"],
            "sku" => ["A", "B", "A", "C", "A"],
            "Quantity_Purchased" => ["2", "1", "3", "5", "1"],
            "Gross_Amount" => ["200", "150", "300", "500", "100"]
        )
        .unwrap();
        let stock = df!(
            "sku" => ["A", "B", "C"],
            "category" => ["Set", "Kurta", "Set"],
            "colour" => ["Red", "Blue", "Blue"],
            "size" => ["M", "L", "S"],
            "stock" => ["5", "20", "60"]
        )
        .unwrap();
        SourceTables::empty()
            .with_international_sales(sales)
            .with_stock(stock)
    }

    fn overview(filters: DashboardFilters) -> Result<SalesOverview> {
        let sources = sources();
        let config = DashboardConfig::default();
        let classifiers = Classifiers::default();
        build(&SectionContext {
            sources: &sources,
            config: &config,
            filters: &filters,
            classifiers: &classifiers,
        })
    }

    #[test]
    fn test_overview_for_one_year() {
        let report = overview(DashboardFilters {
            year: Some(2021),
            ..DashboardFilters::default()
        })
        .unwrap();

        assert_eq!(report.available_years, vec![2021, 2022]);
        assert_eq!(report.kpis.total_sales, 650.0);
        assert_eq!(report.kpis.total_quantity, 6.0);
        assert_eq!(report.kpis.total_orders, 3);
        assert_eq!(report.kpis.unique_products, 2);
        assert_eq!(report.kpis.unique_categories, 2);

        let labels: Vec<&str> = report.monthly.iter().map(|m| m.label.as_str()).collect();
        assert_eq!(labels, vec!["April 2021", "May 2021"]);
        assert_eq!(report.kpis.best_month, Some(LabeledValue::new("April 2021", 350.0)));
        assert_eq!(report.kpis.avg_monthly_sales, 325.0);

        let pivot = report.category_sales.unwrap();
        assert_eq!(pivot.get("Set", "April 2021"), Some(200.0));
        assert_eq!(pivot.get("Kurta", "May 2021"), Some(0.0));

        assert_eq!(report.top_products[0].sku, "A");
        assert_eq!(report.top_products[0].sales, 500.0);
        assert_eq!(report.top_colours[0], LabeledValue::new("Red", 500.0));
    }

    #[test]
    fn test_overview_all_years_keeps_undated_rows_in_totals() {
        let report = overview(DashboardFilters::default()).unwrap();
        assert_eq!(report.kpis.total_orders, 5);
        assert_eq!(report.kpis.total_sales, 1250.0);
        assert_eq!(report.monthly.len(), 3);
        assert!(report.trend.is_some());
    }

    #[test]
    fn test_unknown_year_is_empty_selection() {
        let err = overview(DashboardFilters {
            year: Some(1999),
            ..DashboardFilters::default()
        })
        .unwrap_err();
        assert_eq!(err.error_code(), "EMPTY_SELECTION");
    }
}
