use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::{error::ViewError, table::Column, view::ColumnarView};

/// Allowed values of one categorical dimension.
///
/// An empty selection means "no filter": the whole view passes through.
pub type FilterSelection = BTreeSet<String>;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub mean: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupMean {
    pub key: String,
    pub mean: f64,
    pub count: usize,
}

/// Grouped means ordered by mean descending, then by key ascending.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AggregateResult {
    pub dimension: String,
    pub measure: String,
    pub groups: Vec<GroupMean>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ColumnStats {
    pub column: String,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

pub fn apply_filter(
    view: &ColumnarView,
    dimension: &str,
    selection: &FilterSelection,
) -> Result<ColumnarView, ViewError> {
    let column = view.text_column(dimension)?;
    if selection.is_empty() {
        return Ok(view.clone());
    }

    let rows = match column {
        Column::Categorical { dictionary, codes } => {
            let allowed: Vec<bool> = dictionary
                .iter()
                .map(|value| selection.contains(value))
                .collect();
            view.row_ids()
                .filter(|row| allowed[codes[*row] as usize])
                .collect()
        }
        column => view
            .row_ids()
            .filter(|row| column.text(*row).is_some_and(|text| selection.contains(text)))
            .collect(),
    };

    Ok(view.select(rows))
}

/// Keeps the rows whose text in `column` contains `needle`.
pub fn filter_contains(
    view: &ColumnarView,
    column: &str,
    needle: &str,
) -> Result<ColumnarView, ViewError> {
    let column = view.text_column(column)?;
    let rows = view
        .row_ids()
        .filter(|row| column.text(*row).is_some_and(|text| text.contains(needle)))
        .collect();
    Ok(view.select(rows))
}

pub fn summarize(
    view: &ColumnarView,
    measure: &str,
) -> Result<Summary, ViewError> {
    let column = view.numeric(measure)?;
    let mut sum = 0.0;
    let mut present = 0usize;
    let mut max: Option<f64> = None;

    for value in column.values().flatten() {
        sum += value;
        present += 1;
        max = Some(max.map_or(value, |current| current.max(value)));
    }

    Ok(Summary {
        count: view.row_count(),
        mean: (present > 0).then(|| sum / present as f64),
        max,
    })
}

pub fn group_mean(
    view: &ColumnarView,
    group_dimension: &str,
    measure: &str,
) -> Result<AggregateResult, ViewError> {
    let keys = view.text_column(group_dimension)?;
    let values = view.numeric(measure)?;

    let mut groups: Vec<GroupMean> = match keys {
        Column::Categorical { dictionary, codes } => {
            let mut totals = vec![(0.0, 0usize); dictionary.len()];
            for (row, value) in view.row_ids().zip(values.values()) {
                if let Some(value) = value {
                    let total = &mut totals[codes[row] as usize];
                    total.0 += value;
                    total.1 += 1;
                }
            }
            dictionary
                .iter()
                .zip(totals)
                .filter(|(_, (_, count))| *count > 0)
                .map(|(key, (sum, count))| GroupMean {
                    key: key.clone(),
                    mean: sum / count as f64,
                    count,
                })
                .collect()
        }
        column => {
            let mut totals: HashMap<&str, (f64, usize)> = HashMap::new();
            for (row, value) in view.row_ids().zip(values.values()) {
                if let (Some(key), Some(value)) = (column.text(row), value) {
                    let total = totals.entry(key).or_insert((0.0, 0));
                    total.0 += value;
                    total.1 += 1;
                }
            }
            totals
                .into_iter()
                .map(|(key, (sum, count))| GroupMean {
                    key: key.to_string(),
                    mean: sum / count as f64,
                    count,
                })
                .collect()
        }
    };

    groups.sort_by(|left, right| {
        right
            .mean
            .total_cmp(&left.mean)
            .then_with(|| left.key.cmp(&right.key))
    });

    Ok(AggregateResult {
        dimension: group_dimension.to_string(),
        measure: measure.to_string(),
        groups,
    })
}

/// Upper bound on histogram bins accepted from callers.
pub const MAX_HISTOGRAM_BINS: usize = 10_000;

/// Equal-width histogram over `[min, max]`; the last bin is closed.
///
/// A measure holding a single distinct value yields one bin of zero width.
pub fn histogram(
    view: &ColumnarView,
    measure: &str,
    bins: usize,
) -> Result<Vec<HistogramBin>, ViewError> {
    if bins == 0 || bins > MAX_HISTOGRAM_BINS {
        return Err(ViewError::InvalidBins {
            requested: bins,
            max: MAX_HISTOGRAM_BINS,
        });
    }
    let column = view.numeric(measure)?;

    let mut bounds: Option<(f64, f64)> = None;
    for value in column.values().flatten() {
        bounds = Some(match bounds {
            Some((min, max)) => (min.min(value), max.max(value)),
            None => (value, value),
        });
    }
    let Some((min, max)) = bounds else {
        return Ok(Vec::new());
    };

    if min == max {
        return Ok(vec![HistogramBin {
            lower: min,
            upper: max,
            count: column.values().flatten().count(),
        }]);
    }

    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for value in column.values().flatten() {
        let index = (((value - min) / width) as usize).min(bins - 1);
        counts[index] += 1;
    }

    Ok(counts
        .into_iter()
        .enumerate()
        .map(|(index, count)| HistogramBin {
            lower: min + width * index as f64,
            upper: if index + 1 == bins {
                max
            } else {
                min + width * (index + 1) as f64
            },
            count,
        })
        .collect())
}

/// Statistics of every numeric column, derived columns included.
pub fn describe(view: &ColumnarView) -> Result<Vec<ColumnStats>, ViewError> {
    view.column_names()
        .into_iter()
        .filter(|name| view.is_numeric(name))
        .map(|name| column_stats(view, name))
        .collect()
}

fn column_stats(
    view: &ColumnarView,
    name: &str,
) -> Result<ColumnStats, ViewError> {
    let column = view.numeric(name)?;
    let mut count = 0usize;
    let mut mean = 0.0;
    let mut squares = 0.0;
    let mut min: Option<f64> = None;
    let mut max: Option<f64> = None;

    // Welford's online update keeps the variance stable for large prices.
    for value in column.values().flatten() {
        count += 1;
        let delta = value - mean;
        mean += delta / count as f64;
        squares += delta * (value - mean);
        min = Some(min.map_or(value, |current| current.min(value)));
        max = Some(max.map_or(value, |current| current.max(value)));
    }

    Ok(ColumnStats {
        column: name.to_string(),
        count,
        mean: (count > 0).then_some(mean),
        std: (count > 1).then(|| (squares / (count - 1) as f64).sqrt()),
        min,
        max,
    })
}
