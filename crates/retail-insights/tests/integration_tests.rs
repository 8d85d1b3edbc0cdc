//! Integration tests for the retail dashboard.
//!
//! These run whole dashboard reports over the CSV exports in `tests/fixtures`.

use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use retail_insights::report::write_report;
use retail_insights::schema::{compare_columns, default_sources};
use retail_insights::{
    Dashboard, DashboardConfig, DashboardFilters, DashboardReport, LabeledValue, Section,
    SourceFiles,
};
use std::path::{Path, PathBuf};

// ============================================================================
// Helper Functions
// ============================================================================

fn fixtures_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn fixture_config(data_dir: &Path) -> DashboardConfig {
    DashboardConfig::builder()
        .data_dir(data_dir)
        .reference_date(NaiveDate::from_ymd_opt(2022, 6, 30).unwrap())
        .build()
        .unwrap()
}

fn run(filters: &DashboardFilters, sections: &[Section]) -> DashboardReport {
    Dashboard::new(fixture_config(&fixtures_path()))
        .expect("fixture config is valid")
        .run(filters, sections)
}

/// Copy every fixture except `skip` into a fresh directory.
fn fixtures_without(skip: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for entry in std::fs::read_dir(fixtures_path()).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap();
        if name != skip {
            std::fs::copy(&path, dir.path().join(name)).unwrap();
        }
    }
    dir
}

// ============================================================================
// Full Dashboard
// ============================================================================

#[test]
fn test_every_section_builds_over_fixtures() {
    let report = run(&DashboardFilters::default(), &Section::ALL);

    assert_eq!(report.skipped(), Vec::<(Section, &str)>::new());
    for section in Section::ALL {
        assert!(report.was_requested(section), "{} missing", section);
    }
    assert!(report.tables.iter().all(|t| t.error.is_none()));
    assert_eq!(report.tables[0].rows, Some(5));
}

#[test]
fn test_sales_overview_year_filter() {
    let filters = DashboardFilters {
        year: Some(2022),
        ..DashboardFilters::default()
    };
    let report = run(&filters, &[Section::Sales]);
    let sales = report.sales.as_ref().and_then(|s| s.ready()).unwrap();

    assert_eq!(sales.available_years, vec![2021, 2022]);
    assert_eq!(sales.kpis.total_sales, 1500.0);
    assert_eq!(sales.kpis.total_quantity, 5.0);
    assert_eq!(
        sales.kpis.best_month,
        Some(LabeledValue::new("March 2022", 1000.0))
    );

    let missing_year = DashboardFilters {
        year: Some(2019),
        ..DashboardFilters::default()
    };
    let report = run(&missing_year, &[Section::Sales]);
    assert!(report.skip_message(Section::Sales).unwrap().contains("2019"));
}

#[test]
fn test_returns_and_inventory_over_fixtures() {
    let report = run(
        &DashboardFilters::default(),
        &[Section::Returns, Section::Inventory],
    );

    let returns = report.returns.as_ref().and_then(|s| s.ready()).unwrap();
    assert_eq!(returns.headline.total_orders, 6);
    assert_eq!(returns.headline.total_returns, 2);
    assert_eq!(returns.highest_categories[0].label, "Kurta");

    let inventory = report.inventory.as_ref().and_then(|s| s.ready()).unwrap();
    // every stock row counts, including the duplicated SKU
    assert_eq!(inventory.metrics.total_stock, 261.0);
    assert_eq!(inventory.metrics.unique_skus, 4);
    let low: Vec<&str> = inventory.low_stock.iter().map(|i| i.sku.as_str()).collect();
    assert!(low.contains(&"JNE-K1-M"));
    assert!(low.contains(&"TOP-T3-S"));
}

#[test]
fn test_margins_and_customers_over_fixtures() {
    let mut filters = DashboardFilters::default();
    filters.customer = Some("ALPHA TRADERS".to_string());
    let report = run(&filters, &[Section::Margins, Section::Customers]);

    let margins = report.margins.as_ref().and_then(|s| s.ready()).unwrap();
    assert_eq!(margins.sheet, "May 2022");
    assert_eq!(margins.summary.products, 3);
    assert_eq!(margins.summary.median, Some(80.0));
    assert!(margins.year_over_year.is_some());

    let customers = report.customers.as_ref().and_then(|s| s.ready()).unwrap();
    assert_eq!(customers.top_customers[0].label, "ALPHA TRADERS");
    let profile = customers.profile.as_ref().unwrap();
    assert_eq!(profile.total_spent, 4400.0);
    assert_eq!(profile.total_orders, 3);
}

#[test]
fn test_geography_over_fixtures() {
    let report = run(&DashboardFilters::default(), &[Section::Geography]);
    let geo = report.geography.as_ref().and_then(|s| s.ready()).unwrap();

    // ordered by quantity, the first default metric
    assert_eq!(geo.states[0].name, "MAHARASHTRA");
    assert!(geo.cities.iter().all(|c| c.name != "K"));
    assert_eq!(geo.monthly.len(), 2);
}

#[test]
fn test_product_performance_over_fixtures() {
    let report = run(&DashboardFilters::default(), &[Section::Performance]);
    let perf = report.performance.as_ref().and_then(|s| s.ready()).unwrap();

    let kerala = &perf.by_category[0];
    assert_eq!((kerala.group.as_str(), kerala.label.as_str()), ("KERALA", "Kurta"));
    assert_eq!(kerala.percentage, 100.0);
    let set = perf
        .by_category
        .iter()
        .find(|s| s.group == "MAHARASHTRA" && s.label == "Set")
        .unwrap();
    assert_eq!(set.percentage, 75.0);

    // April and May, split by category
    let may: Vec<(&str, f64)> = perf
        .monthly
        .iter()
        .filter(|m| m.month == 5)
        .map(|m| (m.item.as_str(), m.percentage))
        .collect();
    assert_eq!(may, vec![("Set", 75.0), ("Kurta", 25.0)]);
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[test]
fn test_missing_national_sales_only_skips_dependent_sections() {
    let dir = fixtures_without("new_amazon_national_sales.csv");
    let report = Dashboard::new(fixture_config(dir.path()))
        .unwrap()
        .run(&DashboardFilters::default(), &Section::ALL);

    let skipped: Vec<Section> = report.skipped().into_iter().map(|(s, _)| s).collect();
    assert_eq!(
        skipped,
        vec![
            Section::Returns,
            Section::Correlation,
            Section::Geography,
            Section::Performance
        ]
    );
    assert!(
        report
            .skip_message(Section::Returns)
            .unwrap()
            .contains("File not found")
    );
}

#[test]
fn test_missing_columns_are_named() {
    let dir = fixtures_without("new_international_sales_report.csv");
    std::fs::write(
        dir.path().join("new_international_sales_report.csv"),
        "date,sku\n01-01-2022,JNE-K1-M\n",
    )
    .unwrap();

    let report = Dashboard::new(fixture_config(dir.path()))
        .unwrap()
        .run(&DashboardFilters::default(), &[Section::Sales]);
    assert_eq!(
        report.skip_message(Section::Sales),
        Some("Missing columns in International Sales: Quantity_Purchased, Gross_Amount")
    );
}

// ============================================================================
// Output Files
// ============================================================================

#[test]
fn test_emitted_report_is_valid_json() {
    let report = run(&DashboardFilters::default(), &[Section::Products]);
    let dir = tempfile::tempdir().unwrap();
    let path = write_report(&report, &dir.path().join("dashboard_report.json")).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["products"]["status"], "ready");
    assert_eq!(json["products"]["data"]["summary"]["total_products"], 5);
    assert!(json.get("returns").is_none());
}

#[test]
fn test_column_comparison_over_fixtures() {
    let config = fixture_config(&fixtures_path());
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("new_columns_comparison.csv");

    let df = compare_columns(&default_sources(&config), &output).unwrap();
    // the national export is the widest with 15 columns
    assert_eq!(df.shape(), (15, 5));

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(
        written.lines().next(),
        Some("Product_Info_2022,Product_Info_2021,International_Sales,Stock_Report,Amazon_Sales")
    );
}

#[test]
fn test_config_file_names_are_respected() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::copy(
        fixtures_path().join("new_stock_report.csv"),
        dir.path().join("stock.csv"),
    )
    .unwrap();

    let config = DashboardConfig::builder()
        .data_dir(dir.path())
        .files(SourceFiles {
            stock: "stock.csv".to_string(),
            ..SourceFiles::default()
        })
        .build()
        .unwrap();
    let report = Dashboard::new(config)
        .unwrap()
        .run(&DashboardFilters::default(), &[Section::Inventory]);

    assert!(report.skip_message(Section::Inventory).is_none());
    assert_eq!(report.tables[0].rows, Some(5));
}
