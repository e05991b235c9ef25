use crate::error::PipelineError;
use crate::normalize::parse_number;
use crate::types::{ColumnKind, Dataset, Record};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Value(String),
}

impl Selection {
    /// Maps a picked option to a selection; any of `sentinels` (and the
    /// empty string) means no restriction.
    pub fn from_option(value: &str, sentinels: &[&str]) -> Self {
        let value = value.trim();
        if value.is_empty() || sentinels.iter().any(|s| s.trim() == value) {
            Selection::All
        } else {
            Selection::Value(value.to_string())
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Selection::All)
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            Selection::All => None,
            Selection::Value(v) => Some(v),
        }
    }
}

/// Current widget selections, one per dimension. Built fresh for every
/// interaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterState {
    selections: BTreeMap<String, Selection>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dimension: &str, selection: Selection) -> Self {
        self.set(dimension, selection);
        self
    }

    pub fn only(self, dimension: &str, value: &str) -> Self {
        self.with(dimension, Selection::Value(value.trim().to_string()))
    }

    pub fn set(&mut self, dimension: &str, selection: Selection) {
        self.selections
            .insert(dimension.trim().to_string(), selection);
    }

    pub fn from_pairs<I, K, V>(pairs: I, sentinels: &[&str]) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut state = Self::new();
        for (dimension, value) in pairs {
            state.set(
                dimension.as_ref(),
                Selection::from_option(value.as_ref(), sentinels),
            );
        }
        state
    }

    pub fn selection(&self, dimension: &str) -> &Selection {
        self.selections.get(dimension).unwrap_or(&Selection::All)
    }

    pub fn restrictions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.selections
            .iter()
            .filter_map(|(dim, sel)| sel.value().map(|v| (dim.as_str(), v)))
    }

    pub fn restricted_count(&self) -> usize {
        self.restrictions().count()
    }

    pub fn is_unrestricted(&self) -> bool {
        self.restricted_count() == 0
    }
}

/// Outcome of a selection. No matches is a normal result, not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected<'a> {
    Matches(Vec<&'a Record>),
    NoMatches,
}

impl<'a> Selected<'a> {
    pub fn from_records(records: Vec<&'a Record>) -> Self {
        if records.is_empty() {
            Selected::NoMatches
        } else {
            Selected::Matches(records)
        }
    }

    pub fn records(&self) -> &[&'a Record] {
        match self {
            Selected::Matches(records) => records,
            Selected::NoMatches => &[],
        }
    }
}

pub fn select<'a>(dataset: &'a Dataset, filter: &FilterState) -> Vec<&'a Record> {
    select_from(dataset, dataset.records().iter(), filter)
}

/// Keeps, in order, the records whose value for every restricted dimension
/// equals the selected value. Comparison is exact after trimming. A dimension
/// the dataset doesn't have matches nothing.
pub fn select_from<'a>(
    dataset: &Dataset,
    records: impl IntoIterator<Item = &'a Record>,
    filter: &FilterState,
) -> Vec<&'a Record> {
    let checks: Vec<(Option<usize>, &str)> = filter
        .restrictions()
        .map(|(dim, wanted)| (dataset.schema().index_of(dim), wanted.trim()))
        .collect();

    records
        .into_iter()
        .filter(|record| {
            checks.iter().all(|(idx, wanted)| match idx {
                Some(idx) => record.get(*idx).label().as_deref() == Some(*wanted),
                None => false,
            })
        })
        .collect()
}

/// Distinct values of `column`, sorted, optionally led by a sentinel option.
pub fn options(
    dataset: &Dataset,
    column: &str,
    sentinel: Option<&str>,
) -> Result<Vec<String>, PipelineError> {
    let idx = dataset.column_index(column)?;
    let mut seen = HashSet::new();
    let mut values: Vec<String> = dataset
        .records()
        .iter()
        .filter_map(|r| r.get(idx).label())
        .filter(|label| seen.insert(label.clone()))
        .collect();

    if dataset.schema().kind_of(column) == Some(ColumnKind::Numeric) {
        values.sort_by(|a, b| {
            parse_number(a)
                .partial_cmp(&parse_number(b))
                .unwrap_or(Ordering::Equal)
        });
    } else {
        values.sort();
    }

    Ok(sentinel
        .map(str::to_string)
        .into_iter()
        .chain(values)
        .collect())
}
