//! Product analysis: the stock catalog sliced by category, size and colour,
//! plus the best sellers from the international export.

use super::{SectionContext, distinct_sorted, ensure_rows, filter_equals};
use crate::aggregate::{Aggregation, group_by, ranked, sort_descending};
use crate::error::Result;
use crate::loader::{INTERNATIONAL_SALES_SCHEMA, STOCK_SCHEMA};
use crate::metrics::{present, sum};
use crate::types::{LabeledCount, LabeledValue};
use crate::utils::{f64_values, require_columns, str_values};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;

const STOCK_COLUMNS: [&str; 5] = ["sku", "category", "size", "colour", "stock"];
const SALES_COLUMNS: [&str; 2] = ["sku", "Quantity_Purchased"];

#[derive(Debug, Clone, Serialize)]
pub struct ProductAnalysis {
    pub options: FilterOptions,
    pub stock_by_category: Vec<LabeledValue>,
    pub size_distribution: Vec<LabeledCount>,
    pub top_products: Vec<TopProduct>,
    pub summary: ProductSummary,
}

/// Values a product filter can take.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterOptions {
    pub categories: Vec<String>,
    pub sizes: Vec<String>,
    pub colours: Vec<String>,
}

/// A best seller with whatever the catalog knows about it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopProduct {
    pub sku: String,
    pub units_sold: f64,
    pub category: Option<String>,
    pub size: Option<String>,
    pub colour: Option<String>,
    pub stock: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProductSummary {
    pub total_products: usize,
    pub total_stock: f64,
    /// Units sold across every SKU; the catalog filters do not apply.
    pub units_sold: f64,
    pub categories: usize,
}

struct CatalogEntry {
    category: Option<String>,
    size: Option<String>,
    colour: Option<String>,
    stock: Option<f64>,
}

fn catalog_index(catalog: &DataFrame) -> Result<HashMap<String, CatalogEntry>> {
    let skus = str_values(catalog, "sku")?;
    let categories = str_values(catalog, "category")?;
    let sizes = str_values(catalog, "size")?;
    let colours = str_values(catalog, "colour")?;
    let stock = f64_values(catalog, "stock")?;

    let mut index = HashMap::new();
    for (i, sku) in skus.into_iter().enumerate() {
        let Some(sku) = sku else { continue };
        index.insert(
            sku,
            CatalogEntry {
                category: categories[i].clone(),
                size: sizes[i].clone(),
                colour: colours[i].clone(),
                stock: stock[i],
            },
        );
    }
    Ok(index)
}

fn size_distribution(df: &DataFrame) -> Result<Vec<LabeledCount>> {
    let counts = group_by(df, &["size"], &[Aggregation::count("sku").alias("skus")])?;
    let counts = sort_descending(&counts, &["skus"])?;
    let sizes = str_values(&counts, "size")?;
    let n = f64_values(&counts, "skus")?;
    Ok(sizes
        .into_iter()
        .zip(n)
        .filter_map(|(s, n)| Some(LabeledCount::new(s?, n? as usize)))
        .collect())
}

pub fn build(ctx: &SectionContext) -> Result<ProductAnalysis> {
    let stock = ctx.sources.stock()?;
    require_columns(stock, STOCK_SCHEMA.name, &STOCK_COLUMNS)?;
    let sales = ctx.sources.international_sales()?;
    require_columns(sales, INTERNATIONAL_SALES_SCHEMA.name, &SALES_COLUMNS)?;

    let options = FilterOptions {
        categories: distinct_sorted(stock, "category")?,
        sizes: distinct_sorted(stock, "size")?,
        colours: distinct_sorted(stock, "colour")?,
    };

    let filter = &ctx.filters.product;
    let mut filtered = filter_equals(stock, "category", filter.category.as_deref())?;
    filtered = filter_equals(&filtered, "size", filter.size.as_deref())?;
    filtered = filter_equals(&filtered, "colour", filter.colour.as_deref())?;
    ensure_rows(&filtered, "no products match the selected filters")?;

    let best_sellers = ranked(
        sales,
        "sku",
        Aggregation::sum("Quantity_Purchased"),
        Some(ctx.top_n()),
    )?;
    let catalog = catalog_index(&ctx.catalog()?)?;
    let top_products = best_sellers
        .into_iter()
        .map(|b| {
            let entry = catalog.get(&b.label);
            TopProduct {
                units_sold: b.value,
                category: entry.and_then(|e| e.category.clone()),
                size: entry.and_then(|e| e.size.clone()),
                colour: entry.and_then(|e| e.colour.clone()),
                stock: entry.and_then(|e| e.stock),
                sku: b.label,
            }
        })
        .collect();

    let summary = ProductSummary {
        total_products: filtered.height(),
        total_stock: sum(&present(&f64_values(&filtered, "stock")?)),
        units_sold: sum(&present(&f64_values(sales, "Quantity_Purchased")?)),
        categories: distinct_sorted(&filtered, "category")?.len(),
    };

    Ok(ProductAnalysis {
        options,
        stock_by_category: ranked(&filtered, "category", Aggregation::sum("stock"), None)?,
        size_distribution: size_distribution(&filtered)?,
        top_products,
        summary,
    })
}
