//! User-selected filters, passed explicitly to every section.
//!
//! `None` (or an empty list) means "All".

use serde::{Deserialize, Serialize};

/// Every filter a dashboard run can apply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardFilters {
    /// Calendar year for the sales overview.
    pub year: Option<i32>,
    pub product: ProductFilter,
    /// Customer for the per-customer profile.
    pub customer: Option<String>,
    pub margin: MarginFilter,
    pub geo: GeoFilter,
    pub performance: PerformanceFilter,
}

/// Catalog attribute filters for product analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub size: Option<String>,
    pub colour: Option<String>,
}

impl ProductFilter {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.size.is_none() && self.colour.is_none()
    }
}

/// Profit-margin filters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginFilter {
    /// Product sheet label; defaults to the latest configured sheet.
    pub sheet: Option<String>,
    pub category: Option<String>,
    /// Inclusive margin bounds in percent.
    pub min_margin: Option<f64>,
    pub max_margin: Option<f64>,
}

impl MarginFilter {
    pub fn contains(&self, margin: f64) -> bool {
        self.min_margin.is_none_or(|min| margin >= min)
            && self.max_margin.is_none_or(|max| margin <= max)
    }
}

/// National sales metric columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeoMetric {
    Quantity,
    Sale,
    AvgValue,
}

impl GeoMetric {
    pub const ALL: [GeoMetric; 3] = [GeoMetric::Quantity, GeoMetric::Sale, GeoMetric::AvgValue];

    /// Source column name.
    pub fn column(self) -> &'static str {
        match self {
            GeoMetric::Quantity => "quantity",
            GeoMetric::Sale => "sale",
            GeoMetric::AvgValue => "avg. value",
        }
    }
}

/// Inclusive bounds on one metric, applied to order rows before grouping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricRange {
    pub metric: GeoMetric,
    pub min: f64,
    pub max: f64,
}

impl MetricRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// State/city filters for the geography section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeoFilter {
    pub states: Vec<String>,
    pub cities: Vec<String>,
    /// Metrics to report; empty means all three.
    pub metrics: Vec<GeoMetric>,
    pub ranges: Vec<MetricRange>,
    /// Minimum distinct promotions for a state or city to be listed.
    pub min_promotions: usize,
}

impl GeoFilter {
    pub fn selected_metrics(&self) -> Vec<GeoMetric> {
        if self.metrics.is_empty() {
            GeoMetric::ALL.to_vec()
        } else {
            self.metrics.clone()
        }
    }

    pub fn allows_state(&self, state: &str) -> bool {
        self.states.is_empty() || self.states.iter().any(|s| s == state)
    }

    pub fn allows_city(&self, city: &str) -> bool {
        self.cities.is_empty() || self.cities.iter().any(|c| c == city)
    }
}

/// Product attribute used to split national sales.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductDimension {
    #[default]
    Category,
    Size,
}

impl ProductDimension {
    pub fn column(self) -> &'static str {
        match self {
            ProductDimension::Category => "category",
            ProductDimension::Size => "size",
        }
    }

    /// The other dimension.
    pub fn other(self) -> Self {
        match self {
            ProductDimension::Category => ProductDimension::Size,
            ProductDimension::Size => ProductDimension::Category,
        }
    }
}

/// Filters for the product performance section.
///
/// The state list is shared with [`GeoFilter::states`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceFilter {
    /// Metric to sum; quantity when unset.
    pub metric: Option<GeoMetric>,
    /// Dimension whose values anchor the cross breakdown and the monthly shares.
    pub dimension: ProductDimension,
    /// Only this value of `dimension` in the cross breakdown.
    pub group: Option<String>,
    /// Calendar months (1-12) for the monthly shares; empty means all.
    pub months: Vec<u32>,
}

impl PerformanceFilter {
    pub fn metric(&self) -> GeoMetric {
        self.metric.unwrap_or(GeoMetric::Quantity)
    }

    pub fn allows_month(&self, month: u32) -> bool {
        self.months.is_empty() || self.months.contains(&month)
    }
}
