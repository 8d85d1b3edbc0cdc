//! Profit margins from the yearly product info sheets.
//!
//! Margin is markup over the transfer price: (mrp - cost) / cost * 100.
//! Products with a missing price or a zero cost are left out.

use super::{SectionContext, distinct_sorted, optional_str_values};
use crate::error::{DashboardError, Result};
use crate::loader::PRODUCT_SHEET_SCHEMA;
use crate::metrics::{mean, median, profit_margin};
use crate::utils::{f64_values, require_columns, str_values};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

const REQUIRED: [&str; 3] = ["sku", "cost_price", "mrp"];
const CATEGORY_MOVERS: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct MarginReport {
    /// Sheet the figures come from.
    pub sheet: String,
    pub categories: Vec<String>,
    /// Over every product in the sheet, before filters.
    pub summary: MarginSummary,
    pub products: Vec<ProductMargin>,
    /// Per-category statistics of the filtered products, highest mean first.
    /// Empty when the filtered products span a single category.
    pub category_stats: Vec<CategoryMargin>,
    pub year_over_year: Option<YearOverYear>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MarginSummary {
    pub mean: Option<f64>,
    pub median: Option<f64>,
    pub products: usize,
    pub min_margin: Option<f64>,
    pub max_margin: Option<f64>,
}

impl MarginSummary {
    fn of(rows: &[ProductMargin]) -> Self {
        let margins: Vec<f64> = rows.iter().map(|r| r.margin).collect();
        Self {
            mean: mean(&margins),
            median: median(&margins),
            products: margins.len(),
            min_margin: margins.iter().copied().reduce(f64::min),
            max_margin: margins.iter().copied().reduce(f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductMargin {
    pub sku: String,
    pub category: Option<String>,
    pub catalog: Option<String>,
    pub cost_price: f64,
    pub mrp: f64,
    pub profit_amount: f64,
    pub margin: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryMargin {
    pub category: String,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub products: usize,
}

/// Comparison of the earliest and latest configured sheets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearOverYear {
    pub from: String,
    pub to: String,
    pub from_mean: Option<f64>,
    pub to_mean: Option<f64>,
    pub mean_change: Option<f64>,
    pub from_median: Option<f64>,
    pub to_median: Option<f64>,
    pub median_change: Option<f64>,
    pub common_skus: usize,
    /// Categories present in both sheets, largest gain first.
    pub category_changes: Vec<CategoryChange>,
    pub top_gainers: Vec<CategoryChange>,
    pub top_decliners: Vec<CategoryChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryChange {
    pub category: String,
    pub from: f64,
    pub to: f64,
    pub change: f64,
}

/// Products of a sheet with a computable margin.
pub fn margin_rows(sheet: &DataFrame, table: &str) -> Result<Vec<ProductMargin>> {
    require_columns(sheet, table, &REQUIRED)?;
    let skus = str_values(sheet, "sku")?;
    let costs = f64_values(sheet, "cost_price")?;
    let prices = f64_values(sheet, "mrp")?;
    let categories = optional_str_values(sheet, "category")?;
    let catalogs = optional_str_values(sheet, "catalog")?;

    Ok(skus
        .into_iter()
        .zip(costs.into_iter().zip(prices))
        .zip(categories.into_iter().zip(catalogs))
        .filter_map(|((sku, (cost, mrp)), (category, catalog))| {
            let (cost_price, mrp) = (cost?, mrp?);
            Some(ProductMargin {
                sku: sku?,
                category,
                catalog,
                cost_price,
                mrp,
                profit_amount: mrp - cost_price,
                margin: profit_margin(cost_price, mrp)?,
            })
        })
        .collect())
}

fn category_margins(rows: &[ProductMargin]) -> Vec<(String, Vec<f64>)> {
    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    for row in rows {
        let Some(category) = &row.category else { continue };
        match groups.iter_mut().find(|(c, _)| c == category) {
            Some((_, margins)) => margins.push(row.margin),
            None => groups.push((category.clone(), vec![row.margin])),
        }
    }
    groups
}

fn category_stats(rows: &[ProductMargin]) -> Vec<CategoryMargin> {
    let mut stats: Vec<CategoryMargin> = category_margins(rows)
        .into_iter()
        .filter_map(|(category, margins)| {
            Some(CategoryMargin {
                mean: mean(&margins)?,
                median: median(&margins)?,
                min: margins.iter().copied().reduce(f64::min)?,
                max: margins.iter().copied().reduce(f64::max)?,
                products: margins.len(),
                category,
            })
        })
        .collect();
    stats.sort_by(|a, b| b.mean.total_cmp(&a.mean));
    stats
}

fn compare(
    from_label: &str,
    from: &[ProductMargin],
    to_label: &str,
    to: &[ProductMargin],
) -> YearOverYear {
    let (before, after) = (MarginSummary::of(from), MarginSummary::of(to));
    let change = |a: Option<f64>, b: Option<f64>| Some(b? - a?);

    let from_skus: HashSet<&str> = from.iter().map(|r| r.sku.as_str()).collect();
    let to_skus: HashSet<&str> = to.iter().map(|r| r.sku.as_str()).collect();

    let later = category_margins(to);
    let mut category_changes: Vec<CategoryChange> = category_margins(from)
        .into_iter()
        .filter_map(|(category, earlier)| {
            let (_, margins) = later.iter().find(|(c, _)| *c == category)?;
            let (from, to) = (mean(&earlier)?, mean(margins)?);
            Some(CategoryChange {
                category,
                from,
                to,
                change: to - from,
            })
        })
        .collect();
    category_changes.sort_by(|a, b| b.change.total_cmp(&a.change));

    let top_gainers = category_changes.iter().take(CATEGORY_MOVERS).cloned().collect();
    let skip = category_changes.len().saturating_sub(CATEGORY_MOVERS);
    let top_decliners = category_changes[skip..].to_vec();

    YearOverYear {
        from: from_label.to_string(),
        to: to_label.to_string(),
        mean_change: change(before.mean, after.mean),
        median_change: change(before.median, after.median),
        from_mean: before.mean,
        to_mean: after.mean,
        from_median: before.median,
        to_median: after.median,
        common_skus: from_skus.intersection(&to_skus).count(),
        category_changes,
        top_gainers,
        top_decliners,
    }
}

fn sheet_table(label: &str) -> String {
    format!("{} {}", PRODUCT_SHEET_SCHEMA.name, label)
}

pub fn build(ctx: &SectionContext) -> Result<MarginReport> {
    let labels = ctx.sources.product_sheet_labels();
    let sheet = match &ctx.filters.margin.sheet {
        Some(label) => label.clone(),
        None => labels.last().map(|l| l.to_string()).ok_or_else(|| {
            DashboardError::InvalidConfig("no product sheets configured".to_string())
        })?,
    };

    let rows = margin_rows(ctx.sources.product_sheet(&sheet)?, &sheet_table(&sheet))?;
    if rows.is_empty() {
        return Err(DashboardError::InsufficientData(format!(
            "no products with a usable cost and price in {}",
            sheet
        )));
    }
    debug!("{} products with margins in {}", rows.len(), sheet);

    let filter = &ctx.filters.margin;
    let products: Vec<ProductMargin> = rows
        .iter()
        .filter(|r| {
            filter
                .category
                .as_ref()
                .is_none_or(|c| r.category.as_ref() == Some(c))
        })
        .filter(|r| filter.contains(r.margin))
        .cloned()
        .collect();

    let category_stats = if category_margins(&products).len() > 1 {
        category_stats(&products)
    } else {
        Vec::new()
    };

    let mut notes = Vec::new();
    if products.is_empty() {
        notes.push("No products match the selected filters".to_string());
    }

    let year_over_year = match (labels.first(), labels.last()) {
        (Some(first), Some(last)) if first != last => {
            let load = |label: &str| {
                ctx.sources
                    .product_sheet(label)
                    .and_then(|df| margin_rows(df, &sheet_table(label)))
            };
            match (load(first), load(last)) {
                (Ok(from), Ok(to)) => Some(compare(first, &from, last, &to)),
                (Err(e), _) | (_, Err(e)) => {
                    warn!("Year-over-year comparison skipped: {}", e);
                    notes.push(format!("Could not compare sheets: {}", e));
                    None
                }
            }
        }
        _ => None,
    };

    let sheet_frame = ctx.sources.product_sheet(&sheet)?;
    let categories = if sheet_frame.column("category").is_ok() {
        distinct_sorted(sheet_frame, "category")?
    } else {
        Vec::new()
    };

    Ok(MarginReport {
        sheet,
        categories,
        summary: MarginSummary::of(&rows),
        products,
        category_stats,
        year_over_year,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifiers;
    use crate::config::DashboardConfig;
    use crate::filters::{DashboardFilters, MarginFilter};
    use crate::loader::SourceTables;

    fn sources() -> SourceTables {
        let march = df!(
            "sku" => ["A", "B", "C", "D"],
            "category" => ["Set", "Set", "Kurta", "Kurta"],
            "cost_price" => ["100", "200", "100", "0"],
            "mrp" => ["150", "300", "120", "99"]
        )
        .unwrap();
        let may = df!(
            "sku" => ["A", "B", "E", "F"],
            "category" => ["Set", "Set", "Kurta", "Top"],
            "cost_price" => ["100", "100", "100", "50"],
            "mrp" => ["200", "150", "110", ""]
        )
        .unwrap();
        SourceTables::empty()
            .with_product_sheet("March 2021", march)
            .with_product_sheet("May 2022", may)
    }

    fn report(margin: MarginFilter) -> Result<MarginReport> {
        let sources = sources();
        let config = DashboardConfig::default();
        let filters = DashboardFilters {
            margin,
            ..DashboardFilters::default()
        };
        let classifiers = Classifiers::default();
        build(&SectionContext {
            sources: &sources,
            config: &config,
            filters: &filters,
            classifiers: &classifiers,
        })
    }

    #[test]
    fn test_latest_sheet_by_default() {
        let r = report(MarginFilter::default()).unwrap();
        assert_eq!(r.sheet, "May 2022");
        // F has no mrp
        assert_eq!(r.summary.products, 3);
        assert_eq!(r.summary.median, Some(50.0));
        assert_eq!(r.products[0].profit_amount, 100.0);
        assert_eq!(r.products[0].margin, 100.0);
    }

    #[test]
    fn test_zero_cost_rows_are_dropped() {
        let r = report(MarginFilter {
            sheet: Some("March 2021".to_string()),
            ..MarginFilter::default()
        })
        .unwrap();
        assert_eq!(r.summary.products, 3);
        assert!(r.products.iter().all(|p| p.sku != "D"));

        let set = &r.category_stats[0];
        assert_eq!(set.category, "Set");
        assert_eq!(set.mean, 50.0);
        assert_eq!(set.products, 2);
    }

    #[test]
    fn test_filters_and_single_category() {
        let r = report(MarginFilter {
            category: Some("Set".to_string()),
            min_margin: Some(60.0),
            ..MarginFilter::default()
        })
        .unwrap();
        assert_eq!(r.products.len(), 1);
        assert_eq!(r.products[0].sku, "A");
        assert!(r.category_stats.is_empty());
    }

    #[test]
    fn test_year_over_year() {
        let yoy = report(MarginFilter::default()).unwrap().year_over_year.unwrap();
        assert_eq!(yoy.from, "March 2021");
        assert_eq!(yoy.common_skus, 2);
        // Set: 50 -> 75, Kurta: 20 -> 10
        assert_eq!(yoy.category_changes[0].category, "Set");
        assert_eq!(yoy.category_changes[0].change, 25.0);
        assert_eq!(yoy.category_changes[1].change, -10.0);
        assert_eq!(yoy.top_decliners.len(), 2);
    }

    #[test]
    fn test_unknown_sheet() {
        let err = report(MarginFilter {
            sheet: Some("June 2023".to_string()),
            ..MarginFilter::default()
        })
        .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_FILTER");
    }
}
