//! Product returns from the national sales export.
//!
//! An order counts as a return when its status mentions "cancelled" or
//! "returned", in any case. Rates are percentages of a SKU's orders.

use super::SectionContext;
use crate::aggregate::{Aggregation, group_by, ranked};
use crate::classify::{CorrelationStrength, RETURN_BANDS, correlation_direction};
use crate::error::Result;
use crate::loader::{NATIONAL_SALES_SCHEMA, STOCK_SCHEMA};
use crate::metrics::{TrendLine, linear_fit, pearson, return_rate};
use crate::types::{LabeledCount, LabeledValue};
use crate::utils::{
    date_values, f64_values, frame_from_series, has_values, require_columns, str_values,
    year_month_key,
};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

const REQUIRED: [&str; 3] = ["sku", "Order_ID", "Order_Status"];
const HIGH_RETURN_LIMIT: usize = 20;
const CATEGORY_HIGHLIGHTS: usize = 5;
const IS_RETURN: &str = "is_return";

static RETURN_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)cancelled|returned").expect("Invalid regex: return status"));

/// True when an order status marks a return or cancellation.
pub fn is_return_status(status: &str) -> bool {
    RETURN_STATUS.is_match(status)
}

/// Return flag per order row; a missing status is not a return.
pub(crate) fn return_flags(national: &DataFrame) -> Result<Vec<bool>> {
    Ok(str_values(national, "Order_Status")?
        .iter()
        .map(|s| s.as_deref().is_some_and(is_return_status))
        .collect())
}

/// Order and return counts for one SKU.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkuReturns {
    pub sku: String,
    /// Rows with an order id.
    pub orders: usize,
    /// Rows with an order id flagged as returns.
    pub returns: usize,
    /// Mean sale amount, when the export has a `sale` column.
    pub avg_sale_price: Option<f64>,
    pub return_rate: f64,
}

/// Per-SKU return metrics, in first-seen SKU order.
pub fn sku_returns(national: &DataFrame) -> Result<Vec<SkuReturns>> {
    // returns are counted among the same rows as orders
    let flags: Vec<bool> = str_values(national, "Order_ID")?
        .iter()
        .zip(return_flags(national)?)
        .map(|(id, is_return)| id.is_some() && is_return)
        .collect();
    let mut df = national.clone();
    df.with_column(Series::new(IS_RETURN.into(), flags))?;

    let mut aggregations = vec![
        Aggregation::count("Order_ID").alias("orders"),
        Aggregation::sum(IS_RETURN).alias("returns"),
    ];
    let with_price = df.column("sale").is_ok();
    if with_price {
        aggregations.push(Aggregation::mean("sale").alias("avg_sale_price"));
    }
    let grouped = group_by(&df, &["sku"], &aggregations)?;

    let skus = str_values(&grouped, "sku")?;
    let orders = f64_values(&grouped, "orders")?;
    let returns = f64_values(&grouped, "returns")?;
    let prices = if with_price {
        f64_values(&grouped, "avg_sale_price")?
    } else {
        vec![None; grouped.height()]
    };

    Ok(skus
        .into_iter()
        .zip(orders.into_iter().zip(returns))
        .zip(prices)
        .filter_map(|((sku, (o, r)), avg_sale_price)| {
            let (orders, returns) = (o.unwrap_or(0.0), r.unwrap_or(0.0));
            Some(SkuReturns {
                sku: sku?,
                orders: orders as usize,
                returns: returns as usize,
                avg_sale_price,
                return_rate: return_rate(returns, orders),
            })
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnsReport {
    pub headline: ReturnHeadline,
    /// Products at or above the high-return mark, highest rate first.
    pub high_return_products: Vec<ProductReturns>,
    /// Products per return-rate band, in band order. Empty bands are omitted.
    pub bands: Vec<LabeledCount>,
    /// Mean return rate per category, highest first.
    pub category_rates: Vec<LabeledValue>,
    pub stock_correlation: StockReturnCorrelation,
    pub monthly: Vec<MonthlyReturns>,
    pub highest_categories: Vec<LabeledValue>,
    /// Lowest mean rates, lowest first.
    pub lowest_categories: Vec<LabeledValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReturnHeadline {
    /// Distinct order ids.
    pub total_orders: usize,
    /// Return rows with an order id.
    pub total_returns: usize,
    /// Returns as a percentage of all order rows.
    pub overall_return_rate: f64,
    pub high_return_products: usize,
}

/// A catalogued SKU with its return metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductReturns {
    pub sku: String,
    pub category: String,
    pub orders: usize,
    pub returns: usize,
    pub return_rate: f64,
    pub stock: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StockReturnCorrelation {
    /// Products below the stock cap.
    pub points: usize,
    pub correlation: Option<f64>,
    pub strength: Option<CorrelationStrength>,
    pub direction: Option<&'static str>,
    pub trend: Option<TrendLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyReturns {
    /// "YYYY-MM".
    pub month: String,
    pub orders: usize,
    pub returns: usize,
    pub return_rate: f64,
}

/// SKU metrics joined to the catalog; SKUs without a category or stock
/// figure are dropped.
fn catalogued(metrics: &[SkuReturns], catalog: &DataFrame) -> Result<Vec<ProductReturns>> {
    let skus = str_values(catalog, "sku")?;
    let categories = str_values(catalog, "category")?;
    let stock = f64_values(catalog, "stock")?;
    let index: HashMap<String, (String, f64)> = skus
        .into_iter()
        .zip(categories.into_iter().zip(stock))
        .filter_map(|(sku, (category, stock))| Some((sku?, (category?, stock?))))
        .collect();

    Ok(metrics
        .iter()
        .filter_map(|m| {
            let (category, stock) = index.get(&m.sku)?;
            Some(ProductReturns {
                sku: m.sku.clone(),
                category: category.clone(),
                orders: m.orders,
                returns: m.returns,
                return_rate: m.return_rate,
                stock: *stock,
            })
        })
        .collect())
}

fn products_frame(products: &[ProductReturns]) -> Result<DataFrame> {
    frame_from_series(vec![
        Series::new(
            "category".into(),
            products.iter().map(|p| p.category.as_str()).collect::<Vec<_>>(),
        ),
        Series::new(
            "return_rate".into(),
            products.iter().map(|p| p.return_rate).collect::<Vec<_>>(),
        ),
    ])
}

fn headline(
    national: &DataFrame,
    flags: &[bool],
    high_return_products: usize,
) -> Result<ReturnHeadline> {
    let order_ids = str_values(national, "Order_ID")?;
    let distinct: HashSet<&str> = order_ids.iter().flatten().map(String::as_str).collect();
    let total_returns = order_ids
        .iter()
        .zip(flags)
        .filter(|(id, is_return)| id.is_some() && **is_return)
        .count();

    Ok(ReturnHeadline {
        total_orders: distinct.len(),
        total_returns,
        overall_return_rate: return_rate(total_returns as f64, national.height() as f64),
        high_return_products,
    })
}

fn monthly_returns(national: &DataFrame, flags: &[bool]) -> Result<Vec<MonthlyReturns>> {
    if !has_values(national, "date") {
        return Ok(Vec::new());
    }
    let dates = date_values(national, "date")?;
    let order_ids = str_values(national, "Order_ID")?;

    let mut months: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    for ((date, id), is_return) in dates.into_iter().zip(order_ids).zip(flags) {
        let Some(date) = date else { continue };
        let entry = months.entry(year_month_key(date)).or_default();
        if id.is_some() {
            entry.0 += 1;
        }
        if *is_return {
            entry.1 += 1;
        }
    }

    Ok(months
        .into_iter()
        .map(|(month, (orders, returns))| MonthlyReturns {
            month,
            orders,
            returns,
            return_rate: return_rate(returns as f64, orders as f64),
        })
        .collect())
}

pub fn build(ctx: &SectionContext) -> Result<ReturnsReport> {
    let national = ctx.sources.national_sales()?;
    require_columns(national, NATIONAL_SALES_SCHEMA.name, &REQUIRED)?;
    let catalog = ctx.catalog()?;
    require_columns(&catalog, STOCK_SCHEMA.name, &["sku", "category", "stock"])?;
    let thresholds = &ctx.config.thresholds;

    let flags = return_flags(national)?;
    let metrics = sku_returns(national)?;
    let products = catalogued(&metrics, &catalog)?;
    debug!(
        "{} of {} returned SKUs found in the catalog",
        products.len(),
        metrics.len()
    );

    let mut high_return_products: Vec<ProductReturns> = products
        .iter()
        .filter(|p| p.return_rate >= thresholds.high_return_rate)
        .cloned()
        .collect();
    let high_return_count = high_return_products.len();
    high_return_products.sort_by(|a, b| b.return_rate.total_cmp(&a.return_rate));
    high_return_products.truncate(HIGH_RETURN_LIMIT);

    let mut band_counts: HashMap<&str, usize> = HashMap::new();
    for p in &products {
        *band_counts
            .entry(ctx.classifiers.return_band.classify(&p.return_rate))
            .or_default() += 1;
    }
    let bands = RETURN_BANDS
        .iter()
        .filter_map(|band| {
            let count = band_counts.get(band).copied()?;
            Some(LabeledCount::new(*band, count))
        })
        .collect();

    let category_rates = if products.is_empty() {
        Vec::new()
    } else {
        ranked(
            &products_frame(&products)?,
            "category",
            Aggregation::mean("return_rate"),
            None,
        )?
    };
    let highest_categories = category_rates.iter().take(CATEGORY_HIGHLIGHTS).cloned().collect();
    let mut lowest_categories: Vec<LabeledValue> = category_rates
        .iter()
        .rev()
        .take(CATEGORY_HIGHLIGHTS)
        .cloned()
        .collect();
    lowest_categories.sort_by(|a, b| a.value.total_cmp(&b.value));

    let (xs, ys): (Vec<f64>, Vec<f64>) = products
        .iter()
        .filter(|p| p.stock < thresholds.stock_scatter_cap)
        .map(|p| (p.stock, p.return_rate))
        .unzip();
    let correlation = pearson(&xs, &ys);
    let stock_correlation = StockReturnCorrelation {
        points: xs.len(),
        correlation,
        strength: correlation.map(|r| ctx.classifiers.correlation_strength.classify(&r)),
        direction: correlation.map(correlation_direction),
        trend: linear_fit(&xs, &ys),
    };

    Ok(ReturnsReport {
        headline: headline(national, &flags, high_return_count)?,
        high_return_products,
        bands,
        category_rates,
        stock_correlation,
        monthly: monthly_returns(national, &flags)?,
        highest_categories,
        lowest_categories,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifiers;
    use crate::config::DashboardConfig;
    use crate::filters::DashboardFilters;
    use crate::loader::SourceTables;

    fn national() -> DataFrame {
        let mut skus = vec!["RET"; 10];
        let mut ids: Vec<String> = (0..10).map(|i| format!("R{}", i)).collect();
        let mut statuses = vec!["Shipped - Returned to Seller"; 9];
        statuses.push("Shipped");
        let mut dates = vec!["2022-04-02"; 10];

        skus.extend(["OK", "OK", "OK", "OK", "GHOST"]);
        ids.extend(["K1", "K2", "K2", "K3", "G1"].map(String::from));
        statuses.extend(["Shipped", "CANCELLED", "Delivered", "Shipped", "Cancelled"]);
        dates.extend(["2022-05-01", "2022-05-03", "2022-05-04", "not a date", "2022-05-09"]);

        df!(
            "sku" => skus,
            "Order_ID" => ids,
            "Order_Status" => statuses,
            "date" => dates,
            "sale" => vec!["100"; 15]
        )
        .unwrap()
    }

    fn stock() -> DataFrame {
        df!(
            "sku" => ["RET", "OK", "RET"],
            "category" => ["Set", "Kurta", "Top"],
            "stock" => ["40", "120", "1"]
        )
        .unwrap()
    }

    fn report() -> ReturnsReport {
        let sources = SourceTables::empty()
            .with_national_sales(national())
            .with_stock(stock());
        let config = DashboardConfig::default();
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

    #[test]
    fn test_status_matching_ignores_case() {
        assert!(is_return_status("Shipped - Returned to Seller"));
        assert!(is_return_status("CANCELLED"));
        assert!(!is_return_status("Shipped - Delivered to Buyer"));
    }

    #[test]
    fn test_nine_of_ten_returned_is_high_return() {
        let r = report();
        assert_eq!(r.high_return_products.len(), 1);
        let ret = &r.high_return_products[0];
        assert_eq!(ret.sku, "RET");
        assert_eq!((ret.orders, ret.returns), (10, 9));
        assert!((ret.return_rate - 90.0).abs() < 1e-9);
        // first catalog row wins
        assert_eq!(ret.category, "Set");
        assert_eq!(r.headline.high_return_products, 1);
    }

    #[test]
    fn test_returns_without_order_id_are_not_counted() {
        let df = df!(
            "sku" => ["X", "X", "X"],
            "Order_ID" => [Some("1"), None, None],
            "Order_Status" => ["Cancelled", "Cancelled", "Returned"]
        )
        .unwrap();

        let rows = sku_returns(&df).unwrap();
        assert_eq!((rows[0].orders, rows[0].returns), (1, 1));
        assert!(rows[0].return_rate <= 100.0);
        assert!((rows[0].return_rate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_headline_and_bands() {
        let r = report();
        assert_eq!(r.headline.total_orders, 14);
        assert_eq!(r.headline.total_returns, 11);
        assert!((r.headline.overall_return_rate - 11.0 / 15.0 * 100.0).abs() < 1e-9);

        // RET at 90% sits in the 80-90% band; OK at 25% in 20-30%.
        assert_eq!(
            r.bands,
            vec![LabeledCount::new("20-30%", 1), LabeledCount::new("80-90%", 1)]
        );
        assert_eq!(r.category_rates[0].label, "Set");
        assert_eq!(r.lowest_categories[0].label, "Kurta");
    }

    #[test]
    fn test_monthly_trend_skips_undated_rows() {
        let r = report();
        let months: Vec<&str> = r.monthly.iter().map(|m| m.month.as_str()).collect();
        assert_eq!(months, vec!["2022-04", "2022-05"]);
        assert_eq!(r.monthly[1].orders, 4);
        assert_eq!(r.monthly[1].returns, 2);
    }

    #[test]
    fn test_sku_returns_carries_average_price() {
        let metrics = sku_returns(&national()).unwrap();
        let ghost = metrics.iter().find(|m| m.sku == "GHOST").unwrap();
        assert_eq!(ghost.return_rate, 100.0);
        assert_eq!(ghost.avg_sale_price, Some(100.0));
    }
}
