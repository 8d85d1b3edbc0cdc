//! Key-based joins between source tables.
//!
//! [`left_join`] keeps every left row in its original order. A right-hand key
//! that appears more than once multiplies the matching left rows; the join
//! counts those keys and logs a warning since sums over the result will
//! double count. Use [`dedup_first`] on a catalog before joining when one row
//! per key is wanted.

use crate::error::{Result, ResultExt};
use crate::utils::{filter_rows, require_columns, str_values};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

const ROW_INDEX: &str = "__row_idx";

/// A joined frame plus what the join noticed on the way.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    pub frame: DataFrame,
    pub stats: JoinStats,
}

/// Join diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JoinStats {
    /// Left rows whose key found no right row.
    pub unmatched_left: usize,
    /// Right rows whose key already appeared earlier in the right table.
    pub duplicate_right_keys: usize,
}

/// Number of rows whose non-null key already appeared in an earlier row.
pub fn duplicate_key_count(df: &DataFrame, key: &str) -> Result<usize> {
    let mut seen = HashSet::new();
    Ok(str_values(df, key)?
        .into_iter()
        .flatten()
        .filter(|k| !seen.insert(k.clone()))
        .count())
}

/// Keep the first row for each key. Rows with a null key are kept.
pub fn dedup_first(df: &DataFrame, key: &str) -> Result<DataFrame> {
    let mut seen = HashSet::new();
    let mask: Vec<bool> = str_values(df, key)?
        .into_iter()
        .map(|k| match k {
            Some(k) => seen.insert(k),
            None => true,
        })
        .collect();
    let removed = mask.iter().filter(|keep| !**keep).count();
    if removed > 0 {
        debug!("Collapsed {} duplicate '{}' rows", removed, key);
    }
    filter_rows(df, &mask)
}

/// Left join on `key`, preserving left row order.
///
/// Right-only columns are null for unmatched rows. Columns present on both
/// sides keep the left name; the right copy gets `suffix`.
pub fn left_join(
    left: &DataFrame,
    right: &DataFrame,
    key: &str,
    suffix: &str,
) -> Result<JoinOutcome> {
    require_columns(left, "left join input", &[key])?;
    require_columns(right, "right join input", &[key])?;

    let duplicate_right_keys = duplicate_key_count(right, key)?;
    if duplicate_right_keys > 0 {
        warn!(
            "Right table has {} duplicate '{}' values; matching rows will be repeated",
            duplicate_right_keys, key
        );
    }

    let right_keys: HashSet<String> = str_values(right, key)?.into_iter().flatten().collect();
    let unmatched_left = str_values(left, key)?
        .iter()
        .filter(|k| k.as_ref().is_none_or(|k| !right_keys.contains(k)))
        .count();

    let joined = left
        .clone()
        .lazy()
        .with_column(col(key).cast(DataType::String))
        .with_row_index(ROW_INDEX, None)
        .join(
            right
                .clone()
                .lazy()
                .with_column(col(key).cast(DataType::String)),
            [col(key)],
            [col(key)],
            JoinArgs::new(JoinType::Left).with_suffix(Some(suffix.into())),
        )
        .sort(
            [ROW_INDEX],
            SortMultipleOptions::default().with_maintain_order(true),
        )
        .collect()
        .context(format!("Left join on '{}'", key))?;

    let frame = joined.drop(ROW_INDEX)?;
    debug!(
        "Left join on '{}': {} -> {} rows, {} unmatched",
        key,
        left.height(),
        frame.height(),
        unmatched_left
    );

    Ok(JoinOutcome {
        frame,
        stats: JoinStats {
            unmatched_left,
            duplicate_right_keys,
        },
    })
}
