//! Column-name comparison across the source exports.
//!
//! The output has one column per table. Column `i` lists that table's column
//! names top to bottom and is padded with empty cells up to the widest table.

use crate::config::DashboardConfig;
use crate::error::{Result, ResultExt};
use crate::loader::read_csv_strings;
use crate::utils::frame_from_series;
use polars::prelude::*;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default output file name.
pub const DEFAULT_OUTPUT: &str = "new_columns_comparison.csv";

/// A table to include in the comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSource {
    /// Output column header, e.g. `Stock_Report`.
    pub name: String,
    pub path: PathBuf,
}

/// The configured exports under their comparison names: product sheets newest
/// first (`Product_Info_<year>`), then `International_Sales`, `Stock_Report`
/// and `Amazon_Sales`.
pub fn default_sources(config: &DashboardConfig) -> Vec<ColumnSource> {
    let files = &config.files;
    let mut sources: Vec<ColumnSource> = files
        .product_sheets
        .iter()
        .rev()
        .map(|sheet| {
            let year = sheet.label.rsplit(' ').next().unwrap_or(&sheet.label);
            ColumnSource {
                name: format!("Product_Info_{}", year),
                path: config.path_for(&sheet.file),
            }
        })
        .collect();

    for (name, file) in [
        ("International_Sales", &files.international_sales),
        ("Stock_Report", &files.stock),
        ("Amazon_Sales", &files.national_sales),
    ] {
        sources.push(ColumnSource {
            name: name.to_string(),
            path: config.path_for(file),
        });
    }
    sources
}

/// Trimmed column names of a CSV file.
pub fn column_names(path: &Path) -> Result<Vec<String>> {
    let df = read_csv_strings(path).context(format!("Reading columns of {}", path.display()))?;
    Ok(df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect())
}

/// Side-by-side, null-padded frame of each table's column names.
pub fn comparison_frame(tables: &[(String, Vec<String>)]) -> Result<DataFrame> {
    let rows = tables.iter().map(|(_, cols)| cols.len()).max().unwrap_or(0);
    let columns = tables
        .iter()
        .map(|(name, cols)| {
            let mut padded: Vec<Option<&str>> = cols.iter().map(|c| Some(c.as_str())).collect();
            padded.resize(rows, None);
            Series::new(name.as_str().into(), padded)
        })
        .collect();
    frame_from_series(columns)
}

/// Read every source's header and write the comparison CSV.
pub fn compare_columns(sources: &[ColumnSource], output: &Path) -> Result<DataFrame> {
    let tables = sources
        .iter()
        .map(|source| {
            let names = column_names(&source.path)?;
            debug!("{}: {} columns", source.name, names.len());
            Ok((source.name.clone(), names))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut df = comparison_frame(&tables)?;
    let mut file = File::create(output)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(&mut df)
        .context(format!("Writing {}", output.display()))?;
    info!(
        "Column comparison of {} tables written to {}",
        tables.len(),
        output.display()
    );
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::str_values;

    #[test]
    fn test_comparison_pads_shorter_tables() {
        let tables = vec![
            ("Stock_Report".to_string(), vec!["sku".to_string(), "stock".to_string()]),
            ("Amazon_Sales".to_string(), vec!["Order_ID".to_string()]),
        ];
        let df = comparison_frame(&tables).unwrap();

        assert_eq!(df.shape(), (2, 2));
        assert_eq!(
            str_values(&df, "Amazon_Sales").unwrap(),
            vec![Some("Order_ID".to_string()), None]
        );
    }

    #[test]
    fn test_default_sources_order() {
        let names: Vec<String> = default_sources(&DashboardConfig::default())
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "Product_Info_2022",
                "Product_Info_2021",
                "International_Sales",
                "Stock_Report",
                "Amazon_Sales"
            ]
        );
    }

    #[test]
    fn test_compare_columns_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let stock = dir.path().join("stock.csv");
        let sales = dir.path().join("sales.csv");
        std::fs::write(&stock, " sku ,stock\nA,1\n").unwrap();
        std::fs::write(&sales, "Order_ID,sku,qty\n1,A,2\n").unwrap();

        let sources = vec![
            ColumnSource {
                name: "Stock_Report".to_string(),
                path: stock,
            },
            ColumnSource {
                name: "Amazon_Sales".to_string(),
                path: sales,
            },
        ];
        let output = dir.path().join(DEFAULT_OUTPUT);
        compare_columns(&sources, &output).unwrap();

        let written = std::fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines, vec!["Stock_Report,Amazon_Sales", "sku,Order_ID", "stock,sku", ",qty"]);
    }
}
