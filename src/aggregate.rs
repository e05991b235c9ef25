use crate::error::PipelineError;
use crate::normalize::{numeric_of, parse_number};
use crate::types::{ColumnKind, Dataset, Record};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::debug;

pub const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Metric {
    Sum(String),
    Count,
}

impl Metric {
    /// `None` or `"count"` select count mode; anything else names the column to sum.
    pub fn from_option(column: Option<&str>) -> Self {
        match column.map(str::trim) {
            None | Some("") => Metric::Count,
            Some(c) if c.eq_ignore_ascii_case("count") => Metric::Count,
            Some(c) => Metric::Sum(c.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Metric::Sum(column) => column,
            Metric::Count => "count",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub label: String,
    pub value: f64,
}

impl Entry {
    pub fn new(label: impl Into<String>, value: f64) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Ranked (label, value) pairs ready for a bar or pie chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub group_by: String,
    pub metric: String,
    pub entries: Vec<Entry>,
    /// Sum over every group, before truncation.
    pub total: f64,
    /// Number of groups before truncation.
    pub groups: usize,
    pub fallback_to_count: bool,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.label.as_str()).collect()
    }
}

/// Groups `records` by `group_by`, sums the metric (or counts records) per
/// group, and keeps the `top_n` largest groups.
///
/// Records without a group value are skipped, as are records whose metric
/// cell holds no number. Summing a column in which no cell parses falls back
/// to counts.
/// Equal totals keep the order in which their groups first appeared.
pub fn aggregate(
    dataset: &Dataset,
    records: &[&Record],
    group_by: &str,
    metric: &Metric,
    top_n: usize,
) -> Result<AggregationResult, PipelineError> {
    let group_idx = dataset.column_index(group_by)?;
    let (metric_idx, fallback_to_count) = match metric {
        Metric::Count => (None, false),
        Metric::Sum(column) => {
            let idx = dataset.column_index(column)?;
            let summable = dataset.schema().kind_of(column) == Some(ColumnKind::Numeric)
                || dataset
                    .records()
                    .iter()
                    .any(|record| numeric_of(record.get(idx)).is_some());
            if summable {
                (Some(idx), false)
            } else {
                debug!(dataset = %dataset.key(), column, "metric has no numbers, counting records instead");
                (None, true)
            }
        }
    };

    let mut groups: Vec<Entry> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for record in records {
        let Some(label) = record.get(group_idx).label() else {
            continue;
        };
        let contribution = match metric_idx {
            Some(idx) => match numeric_of(record.get(idx)) {
                Some(value) => value,
                None => continue,
            },
            None => 1.0,
        };
        match positions.get(&label) {
            Some(&pos) => groups[pos].value += contribution,
            None => {
                positions.insert(label.clone(), groups.len());
                groups.push(Entry::new(label, contribution));
            }
        }
    }

    let total = groups.iter().map(|e| e.value).sum();
    let group_count = groups.len();

    Ok(AggregationResult {
        group_by: group_by.to_string(),
        metric: if fallback_to_count {
            Metric::Count.name().to_string()
        } else {
            metric.name().to_string()
        },
        entries: top(groups, top_n),
        total,
        groups: group_count,
        fallback_to_count,
    })
}

/// Stable descending sort then truncate.
pub fn top(mut entries: Vec<Entry>, n: usize) -> Vec<Entry> {
    entries.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
    entries.truncate(n);
    entries
}

/// Calendar position of a month name or three-letter abbreviation.
pub fn month_rank(label: &str) -> Option<usize> {
    let label = label.trim();
    MONTHS.iter().position(|m| {
        m.eq_ignore_ascii_case(label) || (label.len() == 3 && m[..3].eq_ignore_ascii_case(label))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelOrder {
    FirstSeen,
    /// Numeric when every label is a number, otherwise lexicographic.
    Ascending,
    /// Month names in calendar order; other labels follow in first-seen order.
    Calendar,
}

/// Index permutation that puts `labels` in `order`.
fn arrange(labels: &[String], order: LabelOrder) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..labels.len()).collect();
    match order {
        LabelOrder::FirstSeen => {}
        LabelOrder::Ascending => {
            let numbers: Option<Vec<f64>> = labels.iter().map(|l| parse_number(l)).collect();
            match numbers {
                Some(numbers) => idx.sort_by(|&a, &b| {
                    numbers[a].partial_cmp(&numbers[b]).unwrap_or(Ordering::Equal)
                }),
                None => idx.sort_by(|&a, &b| labels[a].cmp(&labels[b])),
            }
        }
        LabelOrder::Calendar => {
            idx.sort_by_key(|&i| month_rank(&labels[i]).unwrap_or(MONTHS.len()));
        }
    }
    idx
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedSeries {
    pub name: String,
    pub values: Vec<f64>,
}

/// Several metrics summed per x value, for line and stacked bar charts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub x_column: String,
    pub x: Vec<String>,
    pub series: Vec<NamedSeries>,
}

impl Series {
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn values_of(&self, name: &str) -> Option<&[f64]> {
        self.series
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.values.as_slice())
    }
}

pub fn series_by(
    dataset: &Dataset,
    records: &[&Record],
    x_column: &str,
    metric_columns: &[&str],
    order: LabelOrder,
) -> Result<Series, PipelineError> {
    let x_idx = dataset.column_index(x_column)?;
    let metric_idx = metric_columns
        .iter()
        .map(|c| dataset.column_index(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut labels: Vec<String> = Vec::new();
    let mut sums: Vec<Vec<f64>> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for record in records {
        let Some(label) = record.get(x_idx).label() else {
            continue;
        };
        let pos = *positions.entry(label.clone()).or_insert_with(|| {
            labels.push(label);
            sums.push(vec![0.0; metric_idx.len()]);
            sums.len() - 1
        });
        for (slot, &idx) in sums[pos].iter_mut().zip(&metric_idx) {
            *slot += numeric_of(record.get(idx)).unwrap_or(0.0);
        }
    }

    let perm = arrange(&labels, order);
    Ok(Series {
        x_column: x_column.to_string(),
        x: perm.iter().map(|&i| labels[i].clone()).collect(),
        series: metric_columns
            .iter()
            .enumerate()
            .map(|(m, name)| NamedSeries {
                name: name.to_string(),
                values: perm.iter().map(|&i| sums[i][m]).collect(),
            })
            .collect(),
    })
}

/// Two-key sum table, e.g. month x year for a seasonality heatmap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotTable {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    /// `cells[row][column]`; absent combinations are 0.
    pub cells: Vec<Vec<f64>>,
}

impl PivotTable {
    /// Puts rows in exactly `labels` order, adding zero rows for labels
    /// with no data and dropping rows not listed.
    pub fn reindex_rows(self, labels: &[&str]) -> PivotTable {
        let width = self.columns.len();
        let cells = labels
            .iter()
            .map(|label| {
                self.rows
                    .iter()
                    .position(|r| r == label)
                    .map(|i| self.cells[i].clone())
                    .unwrap_or_else(|| vec![0.0; width])
            })
            .collect();
        PivotTable {
            rows: labels.iter().map(|l| l.to_string()).collect(),
            columns: self.columns,
            cells,
        }
    }

    pub fn cell(&self, row: &str, column: &str) -> Option<f64> {
        let r = self.rows.iter().position(|x| x == row)?;
        let c = self.columns.iter().position(|x| x == column)?;
        Some(self.cells[r][c])
    }
}

pub fn pivot(
    dataset: &Dataset,
    records: &[&Record],
    (row_column, row_order): (&str, LabelOrder),
    (col_column, col_order): (&str, LabelOrder),
    metric_columns: &[&str],
) -> Result<PivotTable, PipelineError> {
    let row_idx = dataset.column_index(row_column)?;
    let col_idx = dataset.column_index(col_column)?;
    let metric_idx = metric_columns
        .iter()
        .map(|c| dataset.column_index(c))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows: Vec<String> = Vec::new();
    let mut cols: Vec<String> = Vec::new();
    let mut sums: HashMap<(usize, usize), f64> = HashMap::new();
    for record in records {
        let (Some(row), Some(col)) = (record.get(row_idx).label(), record.get(col_idx).label())
        else {
            continue;
        };
        let r = position_or_push(&mut rows, row);
        let c = position_or_push(&mut cols, col);
        let value: f64 = metric_idx
            .iter()
            .map(|&i| numeric_of(record.get(i)).unwrap_or(0.0))
            .sum();
        *sums.entry((r, c)).or_default() += value;
    }

    let row_perm = arrange(&rows, row_order);
    let col_perm = arrange(&cols, col_order);
    Ok(PivotTable {
        rows: row_perm.iter().map(|&i| rows[i].clone()).collect(),
        columns: col_perm.iter().map(|&i| cols[i].clone()).collect(),
        cells: row_perm
            .iter()
            .map(|&r| {
                col_perm
                    .iter()
                    .map(|&c| sums.get(&(r, c)).copied().unwrap_or(0.0))
                    .collect()
            })
            .collect(),
    })
}

fn position_or_push(labels: &mut Vec<String>, label: String) -> usize {
    match labels.iter().position(|l| *l == label) {
        Some(i) => i,
        None => {
            labels.push(label);
            labels.len() - 1
        }
    }
}

/// Per-column sums, in the order the columns are given.
pub fn column_totals(
    dataset: &Dataset,
    records: &[&Record],
    columns: &[&str],
) -> Result<Vec<Entry>, PipelineError> {
    columns
        .iter()
        .map(|column| {
            let idx = dataset.column_index(column)?;
            let sum = records
                .iter()
                .filter_map(|r| numeric_of(r.get(idx)))
                .sum();
            Ok(Entry::new(*column, sum))
        })
        .collect()
}

/// Reads a wide table (one id column, one column per period) as long form
/// and sums each period. Columns with no numeric cell are left out.
pub fn melt_sum(
    dataset: &Dataset,
    records: &[&Record],
    id_column: &str,
) -> Result<Vec<Entry>, PipelineError> {
    let id_idx = dataset.column_index(id_column)?;
    Ok(dataset
        .schema()
        .columns()
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != id_idx)
        .filter_map(|(i, column)| {
            let values: Vec<f64> = records
                .iter()
                .filter_map(|r| numeric_of(r.get(i)))
                .collect();
            (!values.is_empty()).then(|| Entry::new(column.name.clone(), values.iter().sum()))
        })
        .collect())
}
