//! Inventory management: stock bands, reorder alerts and overstock.
//!
//! Low-stock and overstock rows come from every stock report row, not the
//! deduplicated catalog, so a SKU listed twice is reviewed twice. Sales
//! history per SKU comes from the international export and is measured
//! against the configured reference date.

use super::{SectionContext, optional_str_values};
use crate::aggregate::{Aggregation, ranked};
use crate::classify::{OverstockAction, OverstockInput, ReorderInput, ReorderPriority, StockLevel};
use crate::error::Result;
use crate::loader::{INTERNATIONAL_SALES_SCHEMA, STOCK_SCHEMA};
use crate::metrics::{
    average_gap_days, mean, present, recommended_reorder_qty, stock_to_sales_ratio, sum,
};
use crate::types::{LabeledCount, LabeledValue};
use crate::utils::{date_values, f64_values, require_columns, str_values};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

const STOCK_COLUMNS: [&str; 5] = ["sku", "category", "colour", "size", "stock"];
const SALES_COLUMNS: [&str; 3] = ["sku", "date", "Quantity_Purchased"];
const TOP_COLOURS: usize = 15;

#[derive(Debug, Clone, Serialize)]
pub struct InventoryReport {
    /// Items per stock level, Low first. Rows without a stock figure are left out.
    pub stock_levels: Vec<LabeledCount>,
    /// Items at or below the low-stock mark, lowest stock first.
    pub low_stock: Vec<LowStockItem>,
    pub high_priority_count: usize,
    pub overstocked: Vec<OverstockedItem>,
    pub overstock_by_category: Vec<CategoryOverstock>,
    pub stock_by_category: Vec<LabeledValue>,
    pub stock_by_colour: Vec<LabeledValue>,
    pub stock_by_size: Vec<LabeledValue>,
    pub metrics: InventoryMetrics,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowStockItem {
    pub sku: String,
    pub design_no: Option<String>,
    pub category: Option<String>,
    pub colour: Option<String>,
    pub stock: f64,
    pub sale_count: usize,
    pub days_since_last_sale: Option<i64>,
    pub avg_days_between_sales: Option<f64>,
    pub total_quantity_sold: f64,
    pub priority: ReorderPriority,
    pub recommended_reorder_qty: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverstockedItem {
    pub sku: String,
    pub design_no: Option<String>,
    pub category: Option<String>,
    pub colour: Option<String>,
    pub stock: f64,
    pub total_sales: f64,
    pub stock_to_sales_ratio: f64,
    pub days_since_last_sale: Option<i64>,
    pub recommendation: OverstockAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryOverstock {
    pub category: String,
    pub total_stock: f64,
    pub products: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventoryMetrics {
    pub total_stock: f64,
    pub average_stock: Option<f64>,
    pub low_stock_items: usize,
    pub unique_skus: usize,
}

/// Sales history of one SKU.
#[derive(Debug, Default)]
struct SkuSales {
    sale_count: usize,
    quantity: f64,
    dates: Vec<NaiveDate>,
}

impl SkuSales {
    fn last_sale(&self) -> Option<NaiveDate> {
        self.dates.iter().max().copied()
    }

    fn days_since_last_sale(&self, today: NaiveDate) -> Option<i64> {
        self.last_sale().map(|d| (today - d).num_days())
    }
}

fn sales_by_sku(sales: &DataFrame) -> Result<HashMap<String, SkuSales>> {
    let skus = str_values(sales, "sku")?;
    let dates = date_values(sales, "date")?;
    let quantities = f64_values(sales, "Quantity_Purchased")?;

    let mut by_sku: HashMap<String, SkuSales> = HashMap::new();
    for ((sku, date), qty) in skus.into_iter().zip(dates).zip(quantities) {
        let Some(sku) = sku else { continue };
        let entry = by_sku.entry(sku).or_default();
        entry.sale_count += 1;
        entry.quantity += qty.unwrap_or(0.0);
        entry.dates.extend(date);
    }
    Ok(by_sku)
}

/// One stock report row.
struct StockRow {
    sku: String,
    design_no: Option<String>,
    category: Option<String>,
    colour: Option<String>,
    stock: Option<f64>,
}

fn stock_rows(stock: &DataFrame) -> Result<Vec<StockRow>> {
    let skus = str_values(stock, "sku")?;
    let designs = optional_str_values(stock, "design_no")?;
    let categories = str_values(stock, "category")?;
    let colours = str_values(stock, "colour")?;
    let levels = f64_values(stock, "stock")?;

    Ok(skus
        .into_iter()
        .zip(designs)
        .zip(categories.into_iter().zip(colours))
        .zip(levels)
        .filter_map(|(((sku, design_no), (category, colour)), stock)| {
            Some(StockRow {
                sku: sku?,
                design_no,
                category,
                colour,
                stock,
            })
        })
        .collect())
}

fn category_overstock(items: &[OverstockedItem]) -> Vec<CategoryOverstock> {
    let mut groups: Vec<CategoryOverstock> = Vec::new();
    for item in items {
        let Some(category) = &item.category else { continue };
        match groups.iter_mut().find(|g| &g.category == category) {
            Some(group) => {
                group.total_stock += item.stock;
                group.products += 1;
            }
            None => groups.push(CategoryOverstock {
                category: category.clone(),
                total_stock: item.stock,
                products: 1,
            }),
        }
    }
    groups.sort_by(|a, b| b.total_stock.total_cmp(&a.total_stock));
    groups
}

pub fn build(ctx: &SectionContext) -> Result<InventoryReport> {
    let stock = ctx.sources.stock()?;
    require_columns(stock, STOCK_SCHEMA.name, &STOCK_COLUMNS)?;
    let thresholds = &ctx.config.thresholds;
    let classifiers = ctx.classifiers;
    let today = ctx.reference_date();

    let mut notes = Vec::new();
    let history = match ctx.sources.international_sales() {
        Ok(sales) => {
            require_columns(sales, INTERNATIONAL_SALES_SCHEMA.name, &SALES_COLUMNS)?;
            Some(sales_by_sku(sales)?)
        }
        Err(e) => {
            notes.push(format!(
                "Sales history unavailable, reorder and overstock analysis skipped: {}",
                e
            ));
            None
        }
    };

    let rows = stock_rows(stock)?;
    debug!("Reviewing {} stock rows against {}", rows.len(), today);

    let stock_levels = StockLevel::ALL
        .iter()
        .map(|level| {
            let count = rows
                .iter()
                .filter_map(|r| r.stock)
                .filter(|s| classifiers.stock_level.classify(s) == *level)
                .count();
            LabeledCount::new(level.to_string(), count)
        })
        .collect();

    let empty = SkuSales::default();
    let mut low_stock: Vec<LowStockItem> = rows
        .iter()
        .filter_map(|row| {
            let stock = row
                .stock
                .filter(|s| classifiers.stock_level.classify(s) == StockLevel::Low)?;
            let sold = history
                .as_ref()
                .and_then(|h| h.get(&row.sku))
                .unwrap_or(&empty);
            let days_since_last_sale = sold.days_since_last_sale(today);
            let avg_days_between_sales = average_gap_days(&sold.dates);
            let priority = classifiers.reorder_priority.classify(&ReorderInput {
                sale_count: sold.sale_count,
                days_since_last_sale,
            });
            Some(LowStockItem {
                sku: row.sku.clone(),
                design_no: row.design_no.clone(),
                category: row.category.clone(),
                colour: row.colour.clone(),
                stock,
                sale_count: sold.sale_count,
                days_since_last_sale,
                avg_days_between_sales,
                total_quantity_sold: sold.quantity,
                priority,
                recommended_reorder_qty: recommended_reorder_qty(
                    priority,
                    sold.sale_count,
                    sold.quantity,
                    avg_days_between_sales,
                    thresholds.reorder_horizon_days,
                ),
            })
        })
        .collect();
    low_stock.sort_by(|a, b| a.stock.total_cmp(&b.stock));
    let high_priority_count = low_stock
        .iter()
        .filter(|i| i.priority == ReorderPriority::High)
        .count();

    let overstocked: Vec<OverstockedItem> = match &history {
        Some(history) => rows
            .iter()
            .filter_map(|row| {
                let stock = row.stock?;
                let sold = history.get(&row.sku);
                let total_sales = sold.map_or(0.0, |s| s.quantity);
                if !classifiers.is_overstocked(stock, total_sales) {
                    return None;
                }
                let ratio = stock_to_sales_ratio(stock, total_sales);
                let days_since_last_sale = sold.and_then(|s| s.days_since_last_sale(today));
                Some(OverstockedItem {
                    sku: row.sku.clone(),
                    design_no: row.design_no.clone(),
                    category: row.category.clone(),
                    colour: row.colour.clone(),
                    stock,
                    total_sales,
                    stock_to_sales_ratio: ratio,
                    days_since_last_sale,
                    recommendation: classifiers.overstock_action.classify(&OverstockInput {
                        days_since_last_sale,
                        total_sales,
                        ratio,
                    }),
                })
            })
            .collect(),
        None => Vec::new(),
    };

    let levels = present(&f64_values(stock, "stock")?);
    let unique_skus: HashSet<&str> = rows.iter().map(|r| r.sku.as_str()).collect();
    let metrics = InventoryMetrics {
        total_stock: sum(&levels),
        average_stock: mean(&levels),
        low_stock_items: low_stock.len(),
        unique_skus: unique_skus.len(),
    };

    Ok(InventoryReport {
        stock_levels,
        high_priority_count,
        low_stock,
        overstock_by_category: category_overstock(&overstocked),
        overstocked,
        stock_by_category: ranked(stock, "category", Aggregation::sum("stock"), None)?,
        stock_by_colour: ranked(stock, "colour", Aggregation::sum("stock"), Some(TOP_COLOURS))?,
        stock_by_size: ranked(stock, "size", Aggregation::sum("stock"), None)?,
        metrics,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifiers;
    use crate::config::{DashboardConfig, Thresholds};
    use crate::filters::DashboardFilters;
    use crate::loader::SourceTables;

    fn report(sources: SourceTables) -> InventoryReport {
        let config = DashboardConfig::builder()
            .reference_date(NaiveDate::from_ymd_opt(2022, 6, 30).unwrap())
            .build()
            .unwrap();
        let filters = DashboardFilters::default();
        let classifiers = Classifiers::default();
        build(&SectionContext {
            sources: &sources,
            config: &config,
            filters: &filters,
            classifiers: &classifiers,
        })
        .unwrap()
    }

    fn stock() -> DataFrame {
        df!(
            "sku" => ["HOT", "COLD", "BULK", "MID", "LOST"],
            "design_no" => ["D1", "D2", "D3", "D4", "D5"],
            "category" => ["Set", "Kurta", "Set", "Top", "Top"],
            "colour" => ["Red", "Blue", "Blue", "Red", "Red"],
            "size" => ["M", "L", "M", "S", "S"],
            "stock" => ["4", "9", "600", "30", ""]
        )
        .unwrap()
    }

    fn sales() -> DataFrame {
        // HOT sells 12 times, every 5 days up to 25-06-2022.
        let mut dates: Vec<String> = (0..12)
            .map(|i| {
                let d = NaiveDate::from_ymd_opt(2022, 4, 1).unwrap() + chrono::Duration::days(i * 5 + 30);
                d.format("%d-%m-%Y").to_string()
            })
            .collect();
        let mut skus = vec!["HOT".to_string(); 12];
        let mut qty = vec!["1".to_string(); 12];
        dates.push("01-01-2021".to_string());
        skus.push("BULK".to_string());
        qty.push("2".to_string());
        df!(
            "sku" => skus,
            "date" => dates,
            "Quantity_Purchased" => qty
        )
        .unwrap()
    }

    #[test]
    fn test_low_stock_priorities() {
        let r = report(
            SourceTables::empty()
                .with_stock(stock())
                .with_international_sales(sales()),
        );

        assert_eq!(r.low_stock.len(), 2);
        let hot = &r.low_stock[0];
        assert_eq!(hot.sku, "HOT");
        assert_eq!(hot.sale_count, 12);
        assert_eq!(hot.days_since_last_sale, Some(5));
        assert_eq!(hot.avg_days_between_sales, Some(5.0));
        assert_eq!(hot.priority, ReorderPriority::High);
        // (30 / 5) * (12 / 12) * 2
        assert_eq!(hot.recommended_reorder_qty, 12);

        let cold = &r.low_stock[1];
        assert_eq!(cold.sale_count, 0);
        assert_eq!(cold.days_since_last_sale, None);
        assert_eq!(cold.priority, ReorderPriority::Low);
        assert_eq!(cold.recommended_reorder_qty, 0);
        assert_eq!(r.high_priority_count, 1);
    }

    #[test]
    fn test_overstock_recommendations() {
        let r = report(
            SourceTables::empty()
                .with_stock(stock())
                .with_international_sales(sales()),
        );

        assert_eq!(r.overstocked.len(), 1);
        let bulk = &r.overstocked[0];
        assert_eq!(bulk.sku, "BULK");
        assert_eq!(bulk.total_sales, 2.0);
        assert_eq!(bulk.stock_to_sales_ratio, 200.0);
        assert!(bulk.days_since_last_sale.unwrap() > 180);
        assert_eq!(bulk.recommendation, OverstockAction::ConsiderDiscontinuing);
        assert_eq!(
            r.overstock_by_category,
            vec![CategoryOverstock {
                category: "Set".to_string(),
                total_stock: 600.0,
                products: 1
            }]
        );
    }

    #[test]
    fn test_levels_and_metrics() {
        let r = report(
            SourceTables::empty()
                .with_stock(stock())
                .with_international_sales(sales()),
        );
        assert_eq!(
            r.stock_levels,
            vec![
                LabeledCount::new("Low", 2),
                LabeledCount::new("Medium", 1),
                LabeledCount::new("High", 1),
            ]
        );
        assert_eq!(r.metrics.total_stock, 643.0);
        assert_eq!(r.metrics.low_stock_items, 2);
        assert_eq!(r.metrics.unique_skus, 5);
        assert_eq!(r.stock_by_category[0], LabeledValue::new("Set", 604.0));
    }

    #[test]
    fn test_low_stock_follows_stock_level_rules() {
        let sources = SourceTables::empty().with_stock(stock());
        let config = DashboardConfig::default();
        let filters = DashboardFilters::default();
        let thresholds = Thresholds {
            stock_low_max: 30.0,
            ..Thresholds::default()
        };
        let classifiers = Classifiers::from_thresholds(&thresholds);
        let r = build(&SectionContext {
            sources: &sources,
            config: &config,
            filters: &filters,
            classifiers: &classifiers,
        })
        .unwrap();

        let skus: Vec<&str> = r.low_stock.iter().map(|i| i.sku.as_str()).collect();
        assert_eq!(skus, vec!["HOT", "COLD", "MID"]);
        assert_eq!(r.stock_levels[0], LabeledCount::new("Low", 3));
    }

    #[test]
    fn test_without_sales_history() {
        let r = report(SourceTables::empty().with_stock(stock()));
        assert!(r.overstocked.is_empty());
        assert_eq!(r.low_stock.len(), 2);
        assert_eq!(r.notes.len(), 1);
    }
}
