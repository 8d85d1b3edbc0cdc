//! Stock against returns, with an estimated daily holding cost per item.

use super::SectionContext;
use super::returns::{SkuReturns, sku_returns};
use crate::classify::{CorrelationStrength, StockReturnPattern};
use crate::error::{DashboardError, Result};
use crate::loader::{NATIONAL_SALES_SCHEMA, STOCK_SCHEMA};
use crate::metrics::{
    CorrelationMatrix, correlation_matrix, holding_cost, mean, median, pearson, quantile, sum,
};
use crate::types::LabeledValue;
use crate::utils::{f64_values, require_columns, str_values};
use serde::Serialize;
use std::collections::HashMap;

const REQUIRED: [&str; 3] = ["sku", "Order_ID", "Order_Status"];
const DAYS_PER_MONTH: f64 = 30.0;

#[derive(Debug, Clone, Serialize)]
pub struct CorrelationReport {
    pub overview: CorrelationOverview,
    pub stock_vs_return: StockVsReturn,
    pub cost_vs_return: CostVsReturn,
    pub categories: CategoryReturns,
    pub high_risk: HighRiskSummary,
    /// Pairwise correlations of stock, daily cost, return rate and orders.
    pub matrix: CorrelationMatrix,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CorrelationOverview {
    pub avg_return_rate: f64,
    pub total_stock: f64,
    pub avg_daily_cost: f64,
    pub high_risk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockVsReturn {
    pub points: usize,
    pub correlation: Option<f64>,
    pub pattern: StockReturnPattern,
    /// Items in the top stock quartile with an elevated return rate.
    pub high_stock_high_return: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostVsReturn {
    pub points: usize,
    pub correlation: Option<f64>,
    pub strength: Option<CorrelationStrength>,
    /// Items in the top daily-cost quartile with an elevated return rate.
    pub high_cost_high_return: usize,
    /// Their combined daily holding cost.
    pub high_cost_high_return_daily_cost: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CategoryReturns {
    /// Mean return rate per category, highest first.
    pub averages: Vec<LabeledValue>,
    pub worst: Option<LabeledValue>,
    pub best: Option<LabeledValue>,
    pub above_elevated: usize,
    pub overall_average: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HighRiskSummary {
    /// Highest return rate first, then highest daily cost.
    pub items: Vec<RiskItem>,
    pub daily_cost: f64,
    pub monthly_cost: f64,
}

/// One stock row with its return metrics and holding cost.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskItem {
    pub sku: String,
    pub category: String,
    pub stock: f64,
    pub daily_cost: f64,
    pub return_rate: f64,
    pub orders: usize,
}

/// Every stock row with a category and stock figure, joined to its SKU's
/// return metrics. SKUs without orders get a 0% rate.
fn risk_items(ctx: &SectionContext, metrics: &[SkuReturns]) -> Result<Vec<RiskItem>> {
    let stock = ctx.sources.stock()?;
    require_columns(stock, STOCK_SCHEMA.name, &["sku", "category", "stock"])?;
    let t = &ctx.config.thresholds;

    let by_sku: HashMap<&str, &SkuReturns> = metrics.iter().map(|m| (m.sku.as_str(), m)).collect();
    let skus = str_values(stock, "sku")?;
    let categories = str_values(stock, "category")?;
    let levels = f64_values(stock, "stock")?;

    Ok(skus
        .into_iter()
        .zip(categories.into_iter().zip(levels))
        .filter_map(|(sku, (category, level))| {
            let (sku, category, level) = (sku?, category?, level?);
            let returns = by_sku.get(sku.as_str());
            Some(RiskItem {
                daily_cost: holding_cost(
                    level,
                    returns.and_then(|r| r.avg_sale_price),
                    t.holding_cost_per_unit,
                    t.holding_cost_price_rate,
                ),
                return_rate: returns.map_or(0.0, |r| r.return_rate),
                orders: returns.map_or(0, |r| r.orders),
                sku,
                category,
                stock: level,
            })
        })
        .collect())
}

fn category_returns(items: &[RiskItem], elevated: f64) -> CategoryReturns {
    let mut groups: Vec<(String, Vec<f64>)> = Vec::new();
    for item in items {
        match groups.iter_mut().find(|(c, _)| c == &item.category) {
            Some((_, rates)) => rates.push(item.return_rate),
            None => groups.push((item.category.clone(), vec![item.return_rate])),
        }
    }
    let mut averages: Vec<LabeledValue> = groups
        .into_iter()
        .filter_map(|(category, rates)| Some(LabeledValue::new(category, mean(&rates)?)))
        .collect();
    averages.sort_by(|a, b| b.value.total_cmp(&a.value));

    let values: Vec<f64> = averages.iter().map(|a| a.value).collect();
    CategoryReturns {
        worst: averages.first().cloned(),
        best: averages.last().cloned(),
        above_elevated: values.iter().filter(|v| **v > elevated).count(),
        overall_average: mean(&values),
        averages,
    }
}

pub fn build(ctx: &SectionContext) -> Result<CorrelationReport> {
    let national = ctx.sources.national_sales()?;
    require_columns(national, NATIONAL_SALES_SCHEMA.name, &REQUIRED)?;
    let t = &ctx.config.thresholds;

    let metrics = sku_returns(national)?;
    let items = risk_items(ctx, &metrics)?;
    if items.is_empty() {
        return Err(DashboardError::InsufficientData(
            "no stock rows with a category and stock level".to_string(),
        ));
    }

    let stock: Vec<f64> = items.iter().map(|i| i.stock).collect();
    let costs: Vec<f64> = items.iter().map(|i| i.daily_cost).collect();
    let rates: Vec<f64> = items.iter().map(|i| i.return_rate).collect();
    let median_stock = median(&stock).unwrap_or(0.0);

    let mut high_risk: Vec<RiskItem> = items
        .iter()
        .filter(|i| i.return_rate > t.high_risk_return_rate && i.stock > median_stock)
        .cloned()
        .collect();
    high_risk.sort_by(|a, b| {
        b.return_rate
            .total_cmp(&a.return_rate)
            .then(b.daily_cost.total_cmp(&a.daily_cost))
    });

    let overview = CorrelationOverview {
        avg_return_rate: mean(&rates).unwrap_or(0.0),
        total_stock: sum(&stock),
        avg_daily_cost: mean(&costs).unwrap_or(0.0),
        high_risk_count: high_risk.len(),
    };

    let below_stock_cap: Vec<&RiskItem> = items
        .iter()
        .filter(|i| i.stock < t.stock_scatter_cap)
        .collect();
    let (xs, ys): (Vec<f64>, Vec<f64>) = below_stock_cap
        .iter()
        .map(|i| (i.stock, i.return_rate))
        .unzip();
    let stock_q75 = quantile(&xs, 0.75);
    let stock_correlation = pearson(&xs, &ys);
    let stock_vs_return = StockVsReturn {
        points: xs.len(),
        correlation: stock_correlation,
        pattern: stock_correlation
            .map_or(StockReturnPattern::Independent, |r| {
                ctx.classifiers.stock_return_pattern.classify(&r)
            }),
        high_stock_high_return: below_stock_cap
            .iter()
            .filter(|i| {
                stock_q75.is_some_and(|q| i.stock > q) && i.return_rate > t.elevated_return_rate
            })
            .count(),
    };

    let below_cost_cap: Vec<&RiskItem> = items
        .iter()
        .filter(|i| i.daily_cost < t.cost_scatter_cap)
        .collect();
    let (xs, ys): (Vec<f64>, Vec<f64>) = below_cost_cap
        .iter()
        .map(|i| (i.daily_cost, i.return_rate))
        .unzip();
    let cost_q75 = quantile(&xs, 0.75);
    let costly: Vec<&&RiskItem> = below_cost_cap
        .iter()
        .filter(|i| {
            cost_q75.is_some_and(|q| i.daily_cost > q) && i.return_rate > t.elevated_return_rate
        })
        .collect();
    let cost_correlation = pearson(&xs, &ys);
    let cost_vs_return = CostVsReturn {
        points: xs.len(),
        correlation: cost_correlation,
        strength: cost_correlation.map(|r| ctx.classifiers.correlation_strength.classify(&r)),
        high_cost_high_return: costly.len(),
        high_cost_high_return_daily_cost: costly.iter().map(|i| i.daily_cost).sum(),
    };

    let daily_cost: f64 = high_risk.iter().map(|i| i.daily_cost).sum();
    let orders: Vec<Option<f64>> = items.iter().map(|i| Some(i.orders as f64)).collect();
    let matrix = correlation_matrix(&[
        ("stock", stock.iter().copied().map(Some).collect()),
        ("daily_cost", costs.iter().copied().map(Some).collect()),
        ("return_rate", rates.iter().copied().map(Some).collect()),
        ("orders", orders),
    ]);

    Ok(CorrelationReport {
        overview,
        stock_vs_return,
        cost_vs_return,
        categories: category_returns(&items, t.elevated_return_rate),
        high_risk: HighRiskSummary {
            items: high_risk,
            daily_cost,
            monthly_cost: daily_cost * DAYS_PER_MONTH,
        },
        matrix,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Classifiers;
    use crate::config::DashboardConfig;
    use crate::filters::DashboardFilters;
    use crate::loader::SourceTables;
    use polars::prelude::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn sources() -> SourceTables {
        // A: 4 orders, all returned. B: 2 orders, none returned. C never ordered.
        let national = df!(
            "sku" => ["A", "A", "A", "A", "B", "B"],
            "Order_ID" => ["1", "2", "3", "4", "5", "6"],
            "Order_Status" => ["Cancelled", "Returned", "Cancelled", "Cancelled", "Shipped", "Shipped"],
            "sale" => ["1000", "1000", "1000", "1000", "500", "500"]
        )
        .unwrap();
        let stock = df!(
            "sku" => ["A", "B", "C", "D"],
            "category" => ["Set", "Kurta", "Kurta", "Top"],
            "stock" => ["200", "10", "40", ""]
        )
        .unwrap();
        SourceTables::empty()
            .with_national_sales(national)
            .with_stock(stock)
    }

    fn report() -> CorrelationReport {
        let sources = sources();
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
    fn test_holding_costs_and_overview() {
        let r = report();
        // 200 * 0.15 + 1000 * 0.001
        assert!(close(r.high_risk.items[0].daily_cost, 31.0));
        assert_eq!(r.overview.total_stock, 250.0);
        assert!(close(r.overview.avg_return_rate, 100.0 / 3.0));
        assert_eq!(r.overview.high_risk_count, 1);
        assert!(close(r.high_risk.monthly_cost, 31.0 * 30.0));
    }

    #[test]
    fn test_stock_pattern_and_categories() {
        let r = report();
        assert_eq!(r.stock_vs_return.points, 3);
        assert_eq!(r.stock_vs_return.pattern, StockReturnPattern::Concerning);
        assert_eq!(r.stock_vs_return.high_stock_high_return, 1);

        assert_eq!(r.categories.worst, Some(LabeledValue::new("Set", 100.0)));
        assert_eq!(r.categories.best, Some(LabeledValue::new("Kurta", 0.0)));
        assert_eq!(r.categories.above_elevated, 1);
    }

    #[test]
    fn test_matrix_diagonal() {
        let r = report();
        assert_eq!(r.matrix.labels, vec!["stock", "daily_cost", "return_rate", "orders"]);
        for i in 0..4 {
            assert!(close(r.matrix.values[i][i].unwrap(), 1.0));
        }
    }
}
