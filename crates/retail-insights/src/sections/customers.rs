//! Customer insights from the international sales export.
//!
//! Rows without a customer name, amount or date are ignored throughout.

use super::SectionContext;
use crate::aggregate::{Aggregation, ranked};
use crate::error::{DashboardError, Result};
use crate::loader::INTERNATIONAL_SALES_SCHEMA;
use crate::metrics::{mean, percent_of, sum};
use crate::types::LabeledValue;
use crate::utils::{
    date_values, f64_values, filter_rows, require_columns, str_values, year_month_key,
};
use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

const REQUIRED: [&str; 3] = ["Customer_Name", "Gross_Amount", "date"];
/// Share of customers counted as the top tier in the concentration check.
const TOP_TIER_SHARE: f64 = 0.2;
const DAYS_PER_MONTH: f64 = 30.0;

#[derive(Debug, Clone, Serialize)]
pub struct CustomerInsights {
    pub top_customers: Vec<LabeledValue>,
    /// Combined sales of the listed top customers.
    pub top_customers_total: f64,
    /// Their share of all sales, in percent.
    pub top_customers_share: f64,
    /// Customers by month of first purchase ("YYYY-MM"), oldest first.
    pub new_customers: Vec<MonthlyCount>,
    pub overall: CustomerMetrics,
    pub profile: Option<CustomerProfile>,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyCount {
    pub month: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CustomerMetrics {
    pub total_customers: usize,
    pub average_spend: f64,
    /// Size of the top 20% of customers (rounded down).
    pub top_tier_customers: usize,
    /// Their share of sales, in percent.
    pub top_tier_share: f64,
    pub repeat_customers: usize,
    pub repeat_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerProfile {
    pub customer: String,
    pub total_spent: f64,
    pub total_orders: usize,
    pub avg_order_value: f64,
    pub total_items: f64,
    pub history: Vec<CustomerMonth>,
    /// Spending per style, highest first.
    pub style_preferences: Vec<LabeledValue>,
    pub first_purchase: NaiveDate,
    pub last_purchase: NaiveDate,
    pub lifetime_days: i64,
    pub favourite_style: Option<LabeledValue>,
    /// Favourite style's share of spending, in percent.
    pub favourite_style_share: Option<f64>,
    pub orders_per_month: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomerMonth {
    /// e.g. "Jun-2021".
    pub label: String,
    pub amount: f64,
    pub quantity: f64,
    pub orders: usize,
}

#[derive(Debug, Clone)]
struct Purchase {
    customer: String,
    amount: f64,
    quantity: f64,
    date: NaiveDate,
    style: Option<String>,
}

fn purchases(df: &DataFrame) -> Result<Vec<Purchase>> {
    let names = str_values(df, "Customer_Name")?;
    let amounts = f64_values(df, "Gross_Amount")?;
    let dates = date_values(df, "date")?;
    let quantities = match df.column("Quantity_Purchased") {
        Ok(_) => f64_values(df, "Quantity_Purchased")?,
        Err(_) => vec![None; df.height()],
    };
    let styles = match df.column("style") {
        Ok(_) => str_values(df, "style")?,
        Err(_) => vec![None; df.height()],
    };

    Ok(names
        .into_iter()
        .zip(amounts.into_iter().zip(dates))
        .zip(quantities.into_iter().zip(styles))
        .filter_map(|((name, (amount, date)), (quantity, style))| {
            Some(Purchase {
                customer: name?,
                amount: amount?,
                quantity: quantity.unwrap_or(0.0),
                date: date?,
                style,
            })
        })
        .collect())
}

fn new_customers(rows: &[Purchase]) -> Vec<MonthlyCount> {
    let mut first: HashMap<&str, NaiveDate> = HashMap::new();
    for p in rows {
        first
            .entry(p.customer.as_str())
            .and_modify(|d| *d = (*d).min(p.date))
            .or_insert(p.date);
    }
    let mut months: BTreeMap<String, usize> = BTreeMap::new();
    for date in first.values() {
        *months.entry(year_month_key(*date)).or_default() += 1;
    }
    months
        .into_iter()
        .map(|(month, count)| MonthlyCount { month, count })
        .collect()
}

fn overall(rows: &[Purchase], spend: &[LabeledValue]) -> CustomerMetrics {
    let totals: Vec<f64> = spend.iter().map(|s| s.value).collect();
    let total_customers = totals.len();
    let top_tier_customers = (total_customers as f64 * TOP_TIER_SHARE) as usize;
    let top_tier_sales = sum(&totals[..top_tier_customers]);

    let mut orders: HashMap<&str, usize> = HashMap::new();
    for p in rows {
        *orders.entry(p.customer.as_str()).or_default() += 1;
    }
    let repeat_customers = orders.values().filter(|n| **n > 1).count();

    CustomerMetrics {
        total_customers,
        average_spend: mean(&totals).unwrap_or(0.0),
        top_tier_customers,
        top_tier_share: percent_of(top_tier_sales, sum(&totals)),
        repeat_customers,
        repeat_rate: percent_of(repeat_customers as f64, total_customers as f64),
    }
}

fn profile(customer: &str, rows: &[Purchase]) -> Option<CustomerProfile> {
    let mine: Vec<&Purchase> = rows.iter().filter(|p| p.customer == customer).collect();
    let first_purchase = mine.iter().map(|p| p.date).min()?;
    let last_purchase = mine.iter().map(|p| p.date).max()?;

    let total_spent: f64 = mine.iter().map(|p| p.amount).sum();
    let total_orders = mine.len();

    let mut months: BTreeMap<(i32, u32), CustomerMonth> = BTreeMap::new();
    for p in &mine {
        let month = months
            .entry((p.date.year(), p.date.month()))
            .or_insert_with(|| CustomerMonth {
                label: p.date.format("%b-%Y").to_string(),
                amount: 0.0,
                quantity: 0.0,
                orders: 0,
            });
        month.amount += p.amount;
        month.quantity += p.quantity;
        month.orders += 1;
    }

    let mut style_preferences: Vec<LabeledValue> = Vec::new();
    for p in &mine {
        let Some(style) = &p.style else { continue };
        match style_preferences.iter_mut().find(|s| &s.label == style) {
            Some(s) => s.value += p.amount,
            None => style_preferences.push(LabeledValue::new(style.clone(), p.amount)),
        }
    }
    style_preferences.sort_by(|a, b| b.value.total_cmp(&a.value));
    let favourite_style = style_preferences.first().cloned();

    let lifetime_days = (last_purchase - first_purchase).num_days();
    let months_active = (lifetime_days as f64 / DAYS_PER_MONTH).max(1.0);

    Some(CustomerProfile {
        customer: customer.to_string(),
        total_spent,
        total_orders,
        avg_order_value: total_spent / total_orders as f64,
        total_items: mine.iter().map(|p| p.quantity).sum(),
        history: months.into_values().collect(),
        favourite_style_share: favourite_style
            .as_ref()
            .map(|s| percent_of(s.value, total_spent)),
        favourite_style,
        style_preferences,
        first_purchase,
        last_purchase,
        lifetime_days,
        orders_per_month: total_orders as f64 / months_active,
    })
}

pub fn build(ctx: &SectionContext) -> Result<CustomerInsights> {
    let sales = ctx.sources.international_sales()?;
    require_columns(sales, INTERNATIONAL_SALES_SCHEMA.name, &REQUIRED)?;

    let rows = purchases(sales)?;
    if rows.is_empty() {
        return Err(DashboardError::InsufficientData(
            "no sales with a customer, amount and date".to_string(),
        ));
    }
    debug!("{} customer purchases", rows.len());

    // Same rows as `purchases`, as a frame for the grouped rankings.
    let mask: Vec<bool> = {
        let names = str_values(sales, "Customer_Name")?;
        let amounts = f64_values(sales, "Gross_Amount")?;
        let dates = date_values(sales, "date")?;
        names
            .iter()
            .zip(amounts.iter().zip(&dates))
            .map(|(n, (a, d))| n.is_some() && a.is_some() && d.is_some())
            .collect()
    };
    let valid = filter_rows(sales, &mask)?;
    let spend = ranked(&valid, "Customer_Name", Aggregation::sum("Gross_Amount"), None)?;

    let top_customers: Vec<LabeledValue> = spend.iter().take(ctx.top_n()).cloned().collect();
    let top_customers_total: f64 = top_customers.iter().map(|c| c.value).sum();
    let all_sales: f64 = rows.iter().map(|p| p.amount).sum();

    let mut notes = Vec::new();
    let profile = match &ctx.filters.customer {
        Some(name) => {
            let found = profile(name, &rows);
            if found.is_none() {
                notes.push(format!("No purchases found for customer '{}'", name));
            }
            found
        }
        None => None,
    };

    Ok(CustomerInsights {
        top_customers,
        top_customers_total,
        top_customers_share: percent_of(top_customers_total, all_sales),
        new_customers: new_customers(&rows),
        overall: overall(&rows, &spend),
        profile,
        notes,
    })
}
