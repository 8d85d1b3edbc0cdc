//! The dashboard's rule sets and their labels.

use super::RuleSet;
use crate::config::Thresholds;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Return-rate bands, lowest first. A rate on a boundary belongs to the
/// lower band (10% is "0-10%").
pub const RETURN_BANDS: [&str; 10] = [
    "0-10%", "10-20%", "20-30%", "30-40%", "40-50%", "50-60%", "60-70%", "70-80%", "80-90%",
    "90-100%",
];

/// |r| below this is a weak correlation.
pub const WEAK_CORRELATION: f64 = 0.3;
/// |r| below this (and not weak) is a moderate correlation.
pub const MODERATE_CORRELATION: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockLevel {
    Low,
    Medium,
    High,
}

impl StockLevel {
    pub const ALL: [StockLevel; 3] = [StockLevel::Low, StockLevel::Medium, StockLevel::High];
}

impl fmt::Display for StockLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StockLevel::Low => "Low",
            StockLevel::Medium => "Medium",
            StockLevel::High => "High",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReorderPriority {
    High,
    Medium,
    Low,
}

impl fmt::Display for ReorderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReorderPriority::High => "High",
            ReorderPriority::Medium => "Medium",
            ReorderPriority::Low => "Low",
        };
        f.write_str(label)
    }
}

/// What to do with an overstocked item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverstockAction {
    #[serde(rename = "Consider discontinuing")]
    ConsiderDiscontinuing,
    #[serde(rename = "Urgent discount needed")]
    UrgentDiscount,
    #[serde(rename = "Promote heavily")]
    PromoteHeavily,
    #[serde(rename = "Monitor closely")]
    MonitorClosely,
}

impl fmt::Display for OverstockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OverstockAction::ConsiderDiscontinuing => "Consider discontinuing",
            OverstockAction::UrgentDiscount => "Urgent discount needed",
            OverstockAction::PromoteHeavily => "Promote heavily",
            OverstockAction::MonitorClosely => "Monitor closely",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CorrelationStrength {
    Weak,
    Moderate,
    Strong,
}

impl fmt::Display for CorrelationStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CorrelationStrength::Weak => "Weak",
            CorrelationStrength::Moderate => "Moderate",
            CorrelationStrength::Strong => "Strong",
        };
        f.write_str(label)
    }
}

/// "positive" for r > 0, otherwise "negative".
pub fn correlation_direction(r: f64) -> &'static str {
    if r > 0.0 { "positive" } else { "negative" }
}

/// How stock levels relate to return rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockReturnPattern {
    /// Higher stock goes with higher returns.
    Concerning,
    /// Higher stock goes with lower returns.
    Favorable,
    /// No strong relationship.
    Independent,
}

/// Inputs to the reorder-priority rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReorderInput {
    pub sale_count: usize,
    /// None when the SKU has no dated sale. Counts as 0 days.
    pub days_since_last_sale: Option<i64>,
}

/// Stock against units sold, for the overstock flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockPosition {
    pub stock: f64,
    pub total_sales: f64,
}

impl StockPosition {
    /// stock / (total_sales + 1); the +1 keeps never-sold items finite.
    pub fn ratio(&self) -> f64 {
        crate::metrics::stock_to_sales_ratio(self.stock, self.total_sales)
    }
}

/// Inputs to the overstock recommendation rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverstockInput {
    /// None when the SKU never sold; no day-based rule applies then.
    pub days_since_last_sale: Option<i64>,
    pub total_sales: f64,
    pub ratio: f64,
}

/// Every rule set the dashboard uses, built from one set of thresholds.
#[derive(Debug)]
pub struct Classifiers {
    pub stock_level: RuleSet<f64, StockLevel>,
    pub reorder_priority: RuleSet<ReorderInput, ReorderPriority>,
    pub overstock: RuleSet<StockPosition, bool>,
    pub overstock_action: RuleSet<OverstockInput, OverstockAction>,
    pub return_band: RuleSet<f64, &'static str>,
    pub correlation_strength: RuleSet<f64, CorrelationStrength>,
    pub stock_return_pattern: RuleSet<f64, StockReturnPattern>,
}

impl Default for Classifiers {
    fn default() -> Self {
        Self::from_thresholds(&Thresholds::default())
    }
}

impl Classifiers {
    pub fn from_thresholds(t: &Thresholds) -> Self {
        let (low, medium) = (t.stock_low_max, t.stock_medium_max);
        let stock_level = RuleSet::new("stock_level", StockLevel::High)
            .rule(StockLevel::Low, move |s: &f64| *s <= low)
            .rule(StockLevel::Medium, move |s: &f64| *s <= medium);

        let (high_sales, medium_sales, recent) = (
            t.high_priority_min_sales,
            t.medium_priority_min_sales,
            t.recent_sale_days,
        );
        let reorder_priority = RuleSet::new("reorder_priority", ReorderPriority::Low)
            .rule(ReorderPriority::High, move |i: &ReorderInput| {
                i.sale_count > high_sales && i.days_since_last_sale.unwrap_or(0) < recent
            })
            .rule(ReorderPriority::Medium, move |i: &ReorderInput| {
                i.sale_count > medium_sales
            });

        let (min_stock, min_ratio) = (t.overstock_min_stock, t.overstock_min_ratio);
        let overstock = RuleSet::new("overstock", false).rule(true, move |p: &StockPosition| {
            p.stock > min_stock && p.ratio() > min_ratio
        });

        let (discontinue_days, discount_days, max_sales, promote_ratio) = (
            t.stale_discontinue_days,
            t.stale_discount_days,
            t.discontinue_max_sales,
            t.promote_ratio,
        );
        let overstock_action = RuleSet::new("overstock_action", OverstockAction::MonitorClosely)
            .rule(OverstockAction::ConsiderDiscontinuing, move |i: &OverstockInput| {
                i.days_since_last_sale.is_some_and(|d| d > discontinue_days)
                    && i.total_sales < max_sales
            })
            .rule(OverstockAction::UrgentDiscount, move |i: &OverstockInput| {
                i.days_since_last_sale.is_some_and(|d| d > discount_days)
            })
            .rule(OverstockAction::PromoteHeavily, move |i: &OverstockInput| {
                i.ratio > promote_ratio
            });

        let last = RETURN_BANDS.len() - 1;
        let return_band = RETURN_BANDS[..last].iter().enumerate().fold(
            RuleSet::new("return_band", RETURN_BANDS[last]),
            |set, (i, &label)| {
                let upper = (i as f64 + 1.0) * 10.0;
                set.rule(label, move |rate: &f64| *rate <= upper)
            },
        );

        let correlation_strength = RuleSet::new("correlation_strength", CorrelationStrength::Strong)
            .rule(CorrelationStrength::Weak, |r: &f64| r.abs() < WEAK_CORRELATION)
            .rule(CorrelationStrength::Moderate, |r: &f64| {
                r.abs() < MODERATE_CORRELATION
            });

        let stock_return_pattern =
            RuleSet::new("stock_return_pattern", StockReturnPattern::Independent)
                .rule(StockReturnPattern::Concerning, |r: &f64| *r > WEAK_CORRELATION)
                .rule(StockReturnPattern::Favorable, |r: &f64| *r < -WEAK_CORRELATION);

        Self {
            stock_level,
            reorder_priority,
            overstock,
            overstock_action,
            return_band,
            correlation_strength,
            stock_return_pattern,
        }
    }

    /// Overstocked: stock above the minimum and stock/(sales+1) above the
    /// minimum ratio.
    pub fn is_overstocked(&self, stock: f64, total_sales: f64) -> bool {
        self.overstock.classify(&StockPosition { stock, total_sales })
    }
}
