//! Column coercion for raw text columns.
//!
//! Parsing never fails on bad cells: an unparsable value becomes null and is
//! counted so the loader can report how much was lost.

use crate::error::Result;
use crate::utils::{
    DateFormat, date_to_epoch_days, epoch_days_to_date, parse_date, parse_numeric_string,
};
use chrono::Datelike;
use polars::prelude::*;

/// Name of the derived calendar-year column added next to a parsed date.
pub const YEAR_COLUMN: &str = "year";
/// Name of the derived month-number (1-12) column added next to a parsed date.
pub const MONTH_COLUMN: &str = "month";

/// Result of coercing one column.
#[derive(Debug)]
pub struct Coerced {
    pub series: Series,
    /// Non-blank cells that could not be parsed.
    pub unparsable: usize,
}

/// Convert a column to `Float64`.
///
/// Text cells go through [`parse_numeric_string`]; columns that are already
/// numeric are cast.
pub fn coerce_numeric(series: &Series) -> Result<Coerced> {
    if series.dtype() != &DataType::String {
        return Ok(Coerced {
            series: series.cast(&DataType::Float64)?,
            unparsable: 0,
        });
    }

    let str_series = series.str()?;
    let mut unparsable = 0;
    let mut values: Vec<Option<f64>> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        match opt_val {
            Some(raw) => {
                let parsed = parse_numeric_string(raw);
                if parsed.is_none() && !raw.trim().is_empty() {
                    unparsable += 1;
                }
                values.push(parsed);
            }
            None => values.push(None),
        }
    }

    Ok(Coerced {
        series: Series::new(series.name().clone(), values),
        unparsable,
    })
}

/// Convert a column to polars `Date` using the expected layout.
pub fn parse_dates(series: &Series, format: DateFormat) -> Result<Coerced> {
    match series.dtype() {
        DataType::Date => {
            return Ok(Coerced {
                series: series.clone(),
                unparsable: 0,
            });
        }
        DataType::String => {}
        _ => return parse_dates(&series.cast(&DataType::String)?, format),
    }

    let str_series = series.str()?;
    let mut unparsable = 0;
    let mut days: Vec<Option<i32>> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        let parsed = opt_val.and_then(|raw| {
            let date = parse_date(raw, format);
            if date.is_none() && !raw.trim().is_empty() {
                unparsable += 1;
            }
            date
        });
        days.push(parsed.map(date_to_epoch_days));
    }

    let series = Series::new(series.name().clone(), days).cast(&DataType::Date)?;
    Ok(Coerced { series, unparsable })
}

/// Add [`YEAR_COLUMN`] and [`MONTH_COLUMN`] derived from a `Date` column.
pub fn add_date_parts(df: &mut DataFrame, date_column: &str) -> Result<()> {
    let days = df
        .column(date_column)?
        .as_materialized_series()
        .cast(&DataType::Int32)?;

    let (years, months): (Vec<Option<i32>>, Vec<Option<i32>>) = days
        .i32()?
        .into_iter()
        .map(|d| match d.and_then(epoch_days_to_date) {
            Some(date) => (Some(date.year()), Some(date.month() as i32)),
            None => (None, None),
        })
        .unzip();

    df.with_column(Series::new(YEAR_COLUMN.into(), years))?;
    df.with_column(Series::new(MONTH_COLUMN.into(), months))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::date_values;
    use chrono::NaiveDate;

    #[test]
    fn test_coerce_numeric_turns_failures_into_nulls() {
        let series = Series::new(
            "stock".into(),
            [Some("12"), Some("1,500"), Some("abc"), Some(""), None, Some("N/A")],
        );
        let coerced = coerce_numeric(&series).unwrap();
        let values: Vec<Option<f64>> = coerced.series.f64().unwrap().into_iter().collect();

        assert_eq!(values, vec![Some(12.0), Some(1500.0), None, None, None, None]);
        assert_eq!(coerced.unparsable, 2);
    }

    #[test]
    fn test_coerce_numeric_casts_numeric_columns() {
        let series = Series::new("qty".into(), [1i64, 2, 3]);
        let coerced = coerce_numeric(&series).unwrap();
        assert_eq!(coerced.series.dtype(), &DataType::Float64);
        assert_eq!(coerced.unparsable, 0);
    }

    #[test]
    fn test_parse_dates_flags_bad_dates_missing() {
        let series = Series::new(
            "date".into(),
            [Some("05-06-2021"), Some("2021-06-05"), Some("not a date"), None],
        );
        let coerced = parse_dates(&series, DateFormat::DayMonthYear).unwrap();
        assert_eq!(coerced.series.dtype(), &DataType::Date);
        assert_eq!(coerced.unparsable, 2);

        let df = DataFrame::new(vec![coerced.series.into_column()]).unwrap();
        assert_eq!(
            date_values(&df, "date").unwrap(),
            vec![NaiveDate::from_ymd_opt(2021, 6, 5), None, None, None]
        );
    }

    #[test]
    fn test_add_date_parts() {
        let series = Series::new("date".into(), [Some("2022-04-30"), None]);
        let parsed = parse_dates(&series, DateFormat::YearMonthDay).unwrap();
        let mut df = DataFrame::new(vec![parsed.series.into_column()]).unwrap();

        add_date_parts(&mut df, "date").unwrap();

        let parts = |name: &str| -> Vec<Option<i32>> {
            df.column(name)
                .unwrap()
                .as_materialized_series()
                .i32()
                .unwrap()
                .into_iter()
                .collect()
        };
        let years = parts(YEAR_COLUMN);
        let months = parts(MONTH_COLUMN);
        assert_eq!(years, vec![Some(2022), None]);
        assert_eq!(months, vec![Some(4), None]);
    }
}
