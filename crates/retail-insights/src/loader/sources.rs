//! The set of source tables for one run.
//!
//! Each file is read exactly once. A file that fails to load is kept as a
//! [`LoadFailure`] so that only the sections needing it are skipped.

use super::{
    INTERNATIONAL_SALES_SCHEMA, NATIONAL_SALES_SCHEMA, PRODUCT_SHEET_SCHEMA, STOCK_SCHEMA,
    TableSchema, apply_schema, load_table,
};
use crate::config::DashboardConfig;
use crate::error::{DashboardError, Result};
use polars::prelude::*;
use serde::Serialize;
use tracing::warn;

/// Why a table is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadFailure {
    pub code: &'static str,
    pub message: String,
}

impl From<&DashboardError> for LoadFailure {
    fn from(error: &DashboardError) -> Self {
        Self {
            code: error.error_code(),
            message: error.to_string(),
        }
    }
}

type Slot = std::result::Result<DataFrame, LoadFailure>;

/// Load status of one table, for report headers.
#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub table: String,
    pub rows: Option<usize>,
    pub error: Option<LoadFailure>,
}

/// Read-only source tables shared by every section of a run.
#[derive(Debug, Clone)]
pub struct SourceTables {
    stock: Slot,
    international_sales: Slot,
    national_sales: Slot,
    product_sheets: Vec<(String, Slot)>,
}

static_assertions::assert_impl_all!(SourceTables: Send, Sync);

fn not_provided(schema: &TableSchema) -> Slot {
    Err(LoadFailure {
        code: "SOURCE_UNAVAILABLE",
        message: format!("{} was not provided", schema.name),
    })
}

fn load_slot(config: &DashboardConfig, file: &str, schema: &TableSchema) -> Slot {
    load_table(&config.path_for(file), schema).map_err(|e| {
        warn!("{} could not be loaded: {}", schema.name, e);
        LoadFailure::from(&e)
    })
}

fn prepared_slot(df: DataFrame, schema: &TableSchema) -> Slot {
    apply_schema(df, schema).map_err(|e| LoadFailure::from(&e))
}

fn slot_ref<'a>(slot: &'a Slot, table: &str) -> Result<&'a DataFrame> {
    slot.as_ref().map_err(|failure| DashboardError::SourceUnavailable {
        table: table.to_string(),
        reason: failure.message.clone(),
    })
}

impl SourceTables {
    /// An empty set where every table reports "not provided".
    pub fn empty() -> Self {
        Self {
            stock: not_provided(&STOCK_SCHEMA),
            international_sales: not_provided(&INTERNATIONAL_SALES_SCHEMA),
            national_sales: not_provided(&NATIONAL_SALES_SCHEMA),
            product_sheets: Vec::new(),
        }
    }

    /// Read every configured file once.
    pub fn load(config: &DashboardConfig) -> Self {
        let files = &config.files;
        Self {
            stock: load_slot(config, &files.stock, &STOCK_SCHEMA),
            international_sales: load_slot(
                config,
                &files.international_sales,
                &INTERNATIONAL_SALES_SCHEMA,
            ),
            national_sales: load_slot(config, &files.national_sales, &NATIONAL_SALES_SCHEMA),
            product_sheets: files
                .product_sheets
                .iter()
                .map(|sheet| {
                    (
                        sheet.label.clone(),
                        load_slot(config, &sheet.file, &PRODUCT_SHEET_SCHEMA),
                    )
                })
                .collect(),
        }
    }

    /// Use an in-memory stock table. Text columns are typed like a loaded file.
    pub fn with_stock(mut self, df: DataFrame) -> Self {
        self.stock = prepared_slot(df, &STOCK_SCHEMA);
        self
    }

    /// Use an in-memory international sales table.
    pub fn with_international_sales(mut self, df: DataFrame) -> Self {
        self.international_sales = prepared_slot(df, &INTERNATIONAL_SALES_SCHEMA);
        self
    }

    /// Use an in-memory national sales table.
    pub fn with_national_sales(mut self, df: DataFrame) -> Self {
        self.national_sales = prepared_slot(df, &NATIONAL_SALES_SCHEMA);
        self
    }

    /// Add or replace an in-memory product sheet.
    pub fn with_product_sheet(mut self, label: impl Into<String>, df: DataFrame) -> Self {
        let label = label.into();
        let slot = prepared_slot(df, &PRODUCT_SHEET_SCHEMA);
        match self.product_sheets.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = slot,
            None => self.product_sheets.push((label, slot)),
        }
        self
    }

    pub fn stock(&self) -> Result<&DataFrame> {
        slot_ref(&self.stock, STOCK_SCHEMA.name)
    }

    pub fn international_sales(&self) -> Result<&DataFrame> {
        slot_ref(&self.international_sales, INTERNATIONAL_SALES_SCHEMA.name)
    }

    pub fn national_sales(&self) -> Result<&DataFrame> {
        slot_ref(&self.national_sales, NATIONAL_SALES_SCHEMA.name)
    }

    /// A product sheet by label. Unknown labels are a filter error.
    pub fn product_sheet(&self, label: &str) -> Result<&DataFrame> {
        let (_, slot) = self
            .product_sheets
            .iter()
            .find(|(l, _)| l == label)
            .ok_or_else(|| {
                DashboardError::InvalidFilter(format!(
                    "unknown product sheet '{}' (available: {})",
                    label,
                    self.product_sheet_labels().join(", ")
                ))
            })?;
        slot_ref(slot, &format!("{} {}", PRODUCT_SHEET_SCHEMA.name, label))
    }

    /// Product sheet labels in configured order.
    pub fn product_sheet_labels(&self) -> Vec<&str> {
        self.product_sheets.iter().map(|(l, _)| l.as_str()).collect()
    }

    /// Load status of every table.
    pub fn status(&self) -> Vec<TableStatus> {
        let describe = |table: String, slot: &Slot| TableStatus {
            table,
            rows: slot.as_ref().ok().map(DataFrame::height),
            error: slot.as_ref().err().cloned(),
        };

        let mut statuses = vec![
            describe(STOCK_SCHEMA.name.to_string(), &self.stock),
            describe(
                INTERNATIONAL_SALES_SCHEMA.name.to_string(),
                &self.international_sales,
            ),
            describe(NATIONAL_SALES_SCHEMA.name.to_string(), &self.national_sales),
        ];
        statuses.extend(self.product_sheets.iter().map(|(label, slot)| {
            describe(format!("{} {}", PRODUCT_SHEET_SCHEMA.name, label), slot)
        }));
        statuses
    }
}
