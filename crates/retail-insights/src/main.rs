//! CLI entry point for the retail dashboard.

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use retail_insights::report::{to_json, write_report};
use retail_insights::schema::{self, DEFAULT_OUTPUT};
use retail_insights::{
    Dashboard, DashboardConfig, DashboardFilters, DashboardReport, GeoMetric, ProductDimension,
    Section, SectionOutcome,
};
use std::path::PathBuf;
use tracing::{error, info};

/// Environment variable holding the default data directory.
const DATA_DIR_ENV: &str = "RETAIL_DATA_DIR";

/// CLI-compatible section names
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSection {
    /// Sales KPIs, monthly trend and top products
    Sales,
    /// Stock by category and best sellers
    Products,
    /// Stock levels, reorder and overstock lists
    Inventory,
    /// Return rates by product and category
    Returns,
    /// Stock, holding cost and return-rate correlation
    Correlation,
    /// Customer concentration and profiles
    Customers,
    /// Profit margins and year-over-year change
    Margins,
    /// State and city breakdowns
    Geography,
    /// Category and size sales per state and month
    Performance,
}

impl From<CliSection> for Section {
    fn from(cli: CliSection) -> Self {
        match cli {
            CliSection::Sales => Section::Sales,
            CliSection::Products => Section::Products,
            CliSection::Inventory => Section::Inventory,
            CliSection::Returns => Section::Returns,
            CliSection::Correlation => Section::Correlation,
            CliSection::Customers => Section::Customers,
            CliSection::Margins => Section::Margins,
            CliSection::Geography => Section::Geography,
            CliSection::Performance => Section::Performance,
        }
    }
}

/// CLI-compatible geography metric enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMetric {
    Quantity,
    Sale,
    AvgValue,
}

/// CLI-compatible product dimension
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliDimension {
    Category,
    Size,
}

impl From<CliDimension> for ProductDimension {
    fn from(cli: CliDimension) -> Self {
        match cli {
            CliDimension::Category => ProductDimension::Category,
            CliDimension::Size => ProductDimension::Size,
        }
    }
}

impl From<CliMetric> for GeoMetric {
    fn from(cli: CliMetric) -> Self {
        match cli {
            CliMetric::Quantity => GeoMetric::Quantity,
            CliMetric::Sale => GeoMetric::Sale,
            CliMetric::AvgValue => GeoMetric::AvgValue,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Retail sales, inventory and margin dashboard",
    long_about = "Analytics over retail CSV exports: sales, inventory, returns, \
                  customers, margins, geography and product performance.\n\n\
                  ENVIRONMENT VARIABLES:\n  \
                  RETAIL_DATA_DIR    Default directory holding the CSV exports\n  \
                  RUST_LOG           Log filter, overrides --log-level\n\n\
                  EXAMPLES:\n  \
                  # Every section over ./data\n  \
                  retail-insights report\n\n  \
                  # Sales for 2022 as JSON\n  \
                  retail-insights report --section sales --year 2022 --json\n\n  \
                  # Compare export columns\n  \
                  retail-insights compare-columns --data-dir exports"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Only show warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build dashboard sections
    Report(ReportArgs),
    /// Write a side-by-side comparison of every export's columns
    CompareColumns(CompareArgs),
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Directory holding the CSV exports
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// JSON configuration file; flags given here override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sections to build (repeatable); all when omitted
    #[arg(short, long, value_enum)]
    section: Vec<CliSection>,

    /// Year for the sales overview
    #[arg(long)]
    year: Option<i32>,

    /// Product category filter
    #[arg(long)]
    category: Option<String>,

    /// Product size filter
    #[arg(long)]
    size: Option<String>,

    /// Product colour filter
    #[arg(long)]
    colour: Option<String>,

    /// Customer to profile
    #[arg(long)]
    customer: Option<String>,

    /// Product sheet label for margins (e.g. "May 2022")
    #[arg(long)]
    margin_sheet: Option<String>,

    /// Category filter for margins
    #[arg(long)]
    margin_category: Option<String>,

    /// Minimum profit margin in percent
    #[arg(long)]
    margin_min: Option<f64>,

    /// Maximum profit margin in percent
    #[arg(long)]
    margin_max: Option<f64>,

    /// States to include (repeatable)
    #[arg(long)]
    state: Vec<String>,

    /// Cities to include (repeatable)
    #[arg(long)]
    city: Vec<String>,

    /// Geography metrics (repeatable); all when omitted
    #[arg(long, value_enum)]
    metric: Vec<CliMetric>,

    /// Minimum distinct promotions for a state or city to be listed
    #[arg(long)]
    min_promotions: Option<usize>,

    /// Metric for product performance (quantity when omitted)
    #[arg(long, value_enum)]
    performance_metric: Option<CliMetric>,

    /// Dimension for the cross breakdown and monthly shares
    #[arg(long, value_enum, default_value = "category")]
    dimension: CliDimension,

    /// Only this category or size in the cross breakdown
    #[arg(long)]
    dimension_value: Option<String>,

    /// Calendar months (1-12) for the monthly shares (repeatable)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=12))]
    month: Vec<u32>,

    /// Length of top-N rankings
    #[arg(long)]
    top_n: Option<usize>,

    /// Date recency is measured from (YYYY-MM-DD); today when omitted
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    /// Output JSON to stdout instead of a human-readable summary
    ///
    /// Disables all logs so stdout carries only the report.
    #[arg(long)]
    json: bool,

    /// Also write the JSON report to this file
    #[arg(short = 'r', long)]
    emit_report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CompareArgs {
    /// Directory holding the CSV exports
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Output CSV path
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is disabled so that stdout only
/// carries the JSON report.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load .env first so RUST_LOG and RETAIL_DATA_DIR can come from it
    dotenv().ok();

    let json_output = matches!(&cli.command, Command::Report(args) if args.json);
    init_logging(&cli.log_level, cli.quiet, json_output);

    match cli.command {
        Command::Report(args) => run_report(args),
        Command::CompareColumns(args) => run_compare(args),
    }
}

/// Data directory from the flag, then the environment, then the config.
fn resolve_data_dir(flag: Option<PathBuf>, config: &mut DashboardConfig) {
    if let Some(dir) = flag.or_else(|| std::env::var(DATA_DIR_ENV).ok().map(PathBuf::from)) {
        config.data_dir = dir;
    }
}

fn build_config(args: &ReportArgs) -> Result<DashboardConfig> {
    let mut config = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            DashboardConfig::from_json_file(path)?
        }
        None => DashboardConfig::default(),
    };

    resolve_data_dir(args.data_dir.clone(), &mut config);
    if let Some(n) = args.top_n {
        config.top_n = n;
    }
    if let Some(date) = args.reference_date {
        config.reference_date = Some(date);
    }

    config
        .validate()
        .map_err(|e| anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

fn build_filters(args: &ReportArgs) -> DashboardFilters {
    let mut filters = DashboardFilters {
        year: args.year,
        customer: args.customer.clone(),
        ..DashboardFilters::default()
    };

    filters.product.category = args.category.clone();
    filters.product.size = args.size.clone();
    filters.product.colour = args.colour.clone();

    filters.margin.sheet = args.margin_sheet.clone();
    filters.margin.category = args.margin_category.clone();
    filters.margin.min_margin = args.margin_min;
    filters.margin.max_margin = args.margin_max;

    filters.geo.states = args.state.clone();
    filters.geo.cities = args.city.clone();
    filters.geo.metrics = args.metric.iter().map(|m| (*m).into()).collect();
    if let Some(min) = args.min_promotions {
        filters.geo.min_promotions = min;
    }

    filters.performance.metric = args.performance_metric.map(Into::into);
    filters.performance.dimension = args.dimension.into();
    filters.performance.group = args.dimension_value.clone();
    filters.performance.months = args.month.clone();
    filters
}

fn run_report(args: ReportArgs) -> Result<()> {
    let config = build_config(&args)?;
    let filters = build_filters(&args);
    let sections: Vec<Section> = if args.section.is_empty() {
        Section::ALL.to_vec()
    } else {
        args.section.iter().map(|s| (*s).into()).collect()
    };

    let dashboard = Dashboard::new(config)?;
    let report = dashboard.run(&filters, &sections);

    if let Some(path) = &args.emit_report {
        let written = write_report(&report, path)?;
        info!("Report written to: {}", written.display());
    }

    if args.json {
        println!("{}", to_json(&report)?);
        return Ok(());
    }

    print_human_readable_summary(&report);
    Ok(())
}

fn run_compare(args: CompareArgs) -> Result<()> {
    let mut config = DashboardConfig::default();
    resolve_data_dir(args.data_dir, &mut config);

    let sources = schema::default_sources(&config);
    match schema::compare_columns(&sources, &args.output) {
        Ok(df) => {
            println!(
                "Compared {} tables ({} rows) -> {}",
                df.width(),
                df.height(),
                args.output.display()
            );
            Ok(())
        }
        Err(e) => {
            error!("Column comparison failed: {}", e);
            Err(anyhow!("Column comparison failed: {}", e))
        }
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{:.2}", v))
}

/// Print the section header and return its data when the section is ready.
fn section_header<'a, T>(
    section: Section,
    outcome: Option<&'a SectionOutcome<T>>,
) -> Option<&'a T> {
    let outcome = outcome?;
    println!("{}", section.title().to_uppercase());
    println!("{}", "-".repeat(40));
    match outcome {
        SectionOutcome::Ready { data } => Some(data),
        SectionOutcome::Skipped { message, .. } => {
            println!("  Skipped: {}", message);
            println!();
            None
        }
    }
}

fn print_notes(notes: &[String]) {
    for note in notes {
        println!("  ! {}", note);
    }
    println!();
}

/// Print a human-readable summary of the dashboard run.
///
/// This is the default output when `--json` is not given.
fn print_human_readable_summary(report: &DashboardReport) {
    println!();
    println!("{}", "=".repeat(80));
    println!("RETAIL DASHBOARD");
    println!("{}", "=".repeat(80));
    println!();
    println!("Data:      {}", report.data_dir.display());
    println!("As of:     {}", report.reference_date);
    println!("Generated: {}", report.generated_at);
    println!();

    println!("Tables:");
    for table in &report.tables {
        match (&table.rows, &table.error) {
            (Some(rows), _) => println!("  {:<28} {} rows", table.table, rows),
            (None, Some(e)) => println!("  {:<28} unavailable ({})", table.table, e.message),
            (None, None) => println!("  {:<28} unavailable", table.table),
        }
    }
    println!();

    if let Some(s) = section_header(Section::Sales, report.sales.as_ref()) {
        let k = &s.kpis;
        if let Some(year) = s.year {
            println!("  Year: {}", year);
        }
        println!("  Total sales: {:.2}", k.total_sales);
        println!("  Quantity: {:.0} across {} orders", k.total_quantity, k.total_orders);
        println!("  Average order value: {:.2}", k.avg_order_value);
        if let Some(best) = &k.best_month {
            println!("  Best month: {} ({:.2})", best.label, best.value);
        }
        for p in s.top_products.iter().take(5) {
            println!("    {:<24} {:>12.2}", p.sku, p.sales);
        }
        print_notes(&s.notes);
    }

    if let Some(p) = section_header(Section::Products, report.products.as_ref()) {
        let summary = &p.summary;
        println!(
            "  {} products, {:.0} in stock, {:.0} units sold, {} categories",
            summary.total_products, summary.total_stock, summary.units_sold, summary.categories
        );
        for top in p.top_products.iter().take(5) {
            println!("    {:<24} {:>8.0} sold", top.sku, top.units_sold);
        }
        println!();
    }

    if let Some(inv) = section_header(Section::Inventory, report.inventory.as_ref()) {
        let m = &inv.metrics;
        println!(
            "  Total stock: {:.0} over {} SKUs (average {})",
            m.total_stock,
            m.unique_skus,
            fmt_opt(m.average_stock)
        );
        println!(
            "  Low stock: {} ({} high priority)",
            m.low_stock_items, inv.high_priority_count
        );
        println!("  Overstocked: {}", inv.overstocked.len());
        for item in inv.overstocked.iter().take(5) {
            println!("    {:<24} {}", item.sku, item.recommendation);
        }
        print_notes(&inv.notes);
    }

    if let Some(r) = section_header(Section::Returns, report.returns.as_ref()) {
        let h = &r.headline;
        println!(
            "  {} orders, {} returns ({:.1}%)",
            h.total_orders, h.total_returns, h.overall_return_rate
        );
        println!("  High-return products: {}", h.high_return_products);
        if let Some(worst) = r.highest_categories.first() {
            println!("  Highest category rate: {} ({:.1}%)", worst.label, worst.value);
        }
        println!();
    }

    if let Some(c) = section_header(Section::Correlation, report.correlation.as_ref()) {
        let o = &c.overview;
        println!("  Average return rate: {:.1}%", o.avg_return_rate);
        println!("  Daily holding cost: {:.2} average", o.avg_daily_cost);
        println!(
            "  Stock vs returns: r = {} ({:?})",
            fmt_opt(c.stock_vs_return.correlation),
            c.stock_vs_return.pattern
        );
        println!(
            "  High-risk products: {} costing {:.2}/month",
            o.high_risk_count, c.high_risk.monthly_cost
        );
        println!();
    }

    if let Some(c) = section_header(Section::Customers, report.customers.as_ref()) {
        let o = &c.overall;
        println!(
            "  {} customers, average spend {:.2}",
            o.total_customers, o.average_spend
        );
        println!(
            "  Top 20% hold {:.1}% of sales; repeat rate {:.1}%",
            o.top_tier_share, o.repeat_rate
        );
        if let Some(profile) = &c.profile {
            println!(
                "  {}: {:.2} over {} orders since {}",
                profile.customer, profile.total_spent, profile.total_orders, profile.first_purchase
            );
        }
        print_notes(&c.notes);
    }

    if let Some(m) = section_header(Section::Margins, report.margins.as_ref()) {
        println!(
            "  {}: {} products, mean margin {}%, median {}%",
            m.sheet,
            m.summary.products,
            fmt_opt(m.summary.mean),
            fmt_opt(m.summary.median)
        );
        if let Some(yoy) = &m.year_over_year {
            println!(
                "  {} -> {}: mean change {} points over {} common SKUs",
                yoy.from,
                yoy.to,
                fmt_opt(yoy.mean_change),
                yoy.common_skus
            );
        }
        print_notes(&m.notes);
    }

    if let Some(g) = section_header(Section::Geography, report.geography.as_ref()) {
        if let Some(lead) = g.metrics.first() {
            for state in g.states.iter().take(5) {
                println!(
                    "    {:<24} {:>14} {}",
                    state.name,
                    fmt_opt(state.total(*lead)),
                    lead.column()
                );
            }
        }
        println!("  Cities reported: {}", g.cities.len());
        print_notes(&g.notes);
    }

    if let Some(p) = section_header(Section::Performance, report.performance.as_ref()) {
        println!("  Metric: {}", p.metric.column());
        for share in p.by_category.iter().take(5) {
            println!(
                "    {:<20} {:<12} {:>10.0} {:>6.1}%",
                share.group, share.label, share.value, share.percentage
            );
        }
        println!("  Monthly entries: {}", p.monthly.len());
        print_notes(&p.notes);
    }

    let skipped = report.skipped();
    if !skipped.is_empty() {
        println!("Skipped sections: {}", skipped.len());
    }
    println!("Use --json for machine-readable output");
    println!("Use --emit-report FILE to save the JSON report");
    println!("{}", "=".repeat(80));
}
