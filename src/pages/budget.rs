use super::{PageContext, PageParams, Panel};
use crate::aggregate::{
    aggregate, column_totals, pivot, series_by, AggregationResult, Entry, LabelOrder, Metric,
    PivotTable, Series,
};
use crate::error::PipelineError;
use crate::normalize::{numeric_of, require_numeric};
use crate::types::{format_number, Column, Dataset, Record};
use serde::Serialize;
use std::collections::HashMap;

const YEAR: &str = "Year";
const TYPE: &str = "Type";
const TOTAL_BUDGET: &str = "Total Budget";
const TOTAL_TOURISTS: &str = "Total Tourists";
const STATE: &str = "State";
const STATE_BUDGET: &str = "State Budget";
const CENTRAL_BUDGET: &str = "Central Budget";
const BUDGET_COLUMNS: [&str; 2] = [STATE_BUDGET, CENTRAL_BUDGET];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetChoice {
    pub key: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Preview {
    pub rows: usize,
    pub columns: Vec<Column>,
    pub numeric_columns: Vec<String>,
    pub categorical_columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetPage {
    pub datasets: Vec<DatasetChoice>,
    pub selected: Option<String>,
    pub preview: Panel<Preview>,
    /// Present for datasets with a year column; replaces the breakdowns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<Panel<Series>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Panel<AggregationResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<Panel<AggregationResult>>,
}

impl BudgetPage {
    fn bare(datasets: Vec<DatasetChoice>, selected: Option<String>, preview: Panel<Preview>) -> Self {
        Self {
            datasets,
            selected,
            preview,
            trend: None,
            breakdown: None,
            distribution: None,
        }
    }
}

/// `params[name]` when it is one of `candidates`, else the first candidate.
fn choose<'a>(params: &'a PageParams, name: &str, candidates: &[&'a str]) -> Option<&'a str> {
    params
        .get(name)
        .filter(|v| candidates.contains(v))
        .or_else(|| candidates.first().copied())
}

fn not_empty(result: AggregationResult) -> Panel<AggregationResult> {
    if result.is_empty() {
        Panel::no_matches(format!("Nothing to chart for {}.", result.group_by))
    } else {
        Panel::ok(result)
    }
}

fn trend(dataset: &Dataset, year: &str, numeric: &[&str]) -> Result<Panel<Series>, PipelineError> {
    let metrics: Vec<&str> = numeric.iter().copied().filter(|c| *c != year).collect();
    if metrics.is_empty() {
        return Ok(Panel::no_matches("No numeric trend columns found."));
    }
    let records = require_numeric(dataset, &dataset.all(), year)?;
    let series = series_by(dataset, &records, year, &metrics, LabelOrder::Ascending)?;
    Ok(if series.is_empty() {
        Panel::no_matches("No rows carry a numeric year.")
    } else {
        Panel::ok(series)
    })
}

fn explore(
    page: &mut BudgetPage,
    dataset: &Dataset,
    params: &PageParams,
    top_n: usize,
) -> Result<(), PipelineError> {
    let schema = dataset.schema();
    let numeric = schema.numeric_columns();
    let categorical = schema.categorical_columns();

    if let Some(year) = schema.find_ignore_case("YEAR") {
        page.trend = Some(Panel::from_result(trend(dataset, &year.name, &numeric)));
        return Ok(());
    }

    if let (Some(metric), Some(group_by)) = (
        choose(params, "metric", &numeric),
        choose(params, "group_by", &categorical),
    ) {
        let result = aggregate(dataset, &dataset.all(), group_by, &Metric::Sum(metric.to_string()), top_n)?;
        page.breakdown = Some(not_empty(result));
    }

    if let Some(column) = choose(params, "pie_column", &categorical) {
        let metric = match choose(params, "pie_metric", &numeric) {
            Some(metric) => Metric::Sum(metric.to_string()),
            None => Metric::Count,
        };
        let result = aggregate(dataset, &dataset.all(), column, &metric, top_n)?;
        page.distribution = Some(not_empty(result));
    }
    Ok(())
}

/// Budget explorer: preview any configured dataset and break it down.
pub fn render(ctx: &mut PageContext<'_>, params: &PageParams) -> Result<BudgetPage, PipelineError> {
    let config = ctx.config();
    let keys: Vec<&str> = if config.pages.explorer.is_empty() {
        config.datasets.keys().map(String::as_str).collect()
    } else {
        config.pages.explorer.iter().map(String::as_str).collect()
    };
    let datasets = keys
        .iter()
        .map(|key| DatasetChoice {
            key: key.to_string(),
            label: config.dataset_label(key).to_string(),
        })
        .collect();

    let selected = match params.get("dataset") {
        Some(key) if keys.contains(&key) => key,
        Some(key) => return Err(PipelineError::UnknownDataset(key.to_string())),
        None => match keys.first() {
            Some(key) => *key,
            None => {
                return Ok(BudgetPage::bare(
                    datasets,
                    None,
                    Panel::no_matches("No datasets configured."),
                ))
            }
        },
    };

    let dataset = match ctx.load(selected) {
        Ok(dataset) => dataset,
        Err(e) => {
            let preview = Panel::from_result(Err(e));
            return Ok(BudgetPage::bare(datasets, Some(selected.to_string()), preview));
        }
    };
    if dataset.is_empty() {
        let notice = format!("No data available for {}", config.dataset_label(selected));
        return Ok(BudgetPage::bare(
            datasets,
            Some(selected.to_string()),
            Panel::no_matches(notice),
        ));
    }

    let schema = dataset.schema();
    let preview = Preview {
        rows: dataset.len(),
        columns: schema.columns().to_vec(),
        numeric_columns: schema.numeric_columns().into_iter().map(String::from).collect(),
        categorical_columns: schema.categorical_columns().into_iter().map(String::from).collect(),
    };
    let mut page = BudgetPage::bare(datasets, Some(selected.to_string()), Panel::ok(preview));
    if let Err(e) = explore(&mut page, &dataset, params, ctx.top_n()) {
        page.breakdown = Some(Panel::from_result(Err(e)));
    }
    Ok(page)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetSplitPage {
    pub by_year: Panel<Series>,
    pub latest_year: Option<String>,
    pub latest_split: Panel<Vec<Entry>>,
    pub top_states: Panel<AggregationResult>,
    /// Year x budget type, for budget tables that carry a `Type` column.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub by_type: Option<Panel<PivotTable>>,
    pub budget_vs_footfall: Panel<Vec<GrowthPoint>>,
}

/// One state-year with both a state budget and a tourist count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GrowthPoint {
    pub state: String,
    pub year: String,
    pub budget: f64,
    pub tourists: f64,
}

type StateYear = (String, String);

/// Sums `metric` per (State, Year), keeping first-seen order.
fn per_state_year(dataset: &Dataset, metric: &str) -> Result<Vec<(StateYear, f64)>, PipelineError> {
    let state_idx = dataset.column_index(STATE)?;
    let year_idx = dataset.column_index(YEAR)?;
    let metric_idx = dataset.column_index(metric)?;

    let mut sums: Vec<(StateYear, f64)> = Vec::new();
    let mut positions: HashMap<StateYear, usize> = HashMap::new();
    for record in dataset.records() {
        let (Some(state), Some(year), Some(value)) = (
            record.get(state_idx).label(),
            record.get(year_idx).label(),
            numeric_of(record.get(metric_idx)),
        ) else {
            continue;
        };
        let key = (state, year);
        match positions.get(&key) {
            Some(&pos) => sums[pos].1 += value,
            None => {
                positions.insert(key.clone(), sums.len());
                sums.push((key, value));
            }
        }
    }
    Ok(sums)
}

/// Inner join of state budget and tourist footfall on (State, Year).
pub fn budget_vs_footfall(budget: &Dataset, footfall: &Dataset) -> Result<Vec<GrowthPoint>, PipelineError> {
    let tourists: HashMap<StateYear, f64> = per_state_year(footfall, TOTAL_TOURISTS)?.into_iter().collect();
    Ok(per_state_year(budget, STATE_BUDGET)?
        .into_iter()
        .filter_map(|(key, budget)| {
            let tourists = *tourists.get(&key)?;
            let (state, year) = key;
            Some(GrowthPoint {
                state,
                year,
                budget,
                tourists,
            })
        })
        .collect())
}

fn by_type(dataset: &Dataset, records: &[&Record]) -> Option<Result<PivotTable, PipelineError>> {
    let schema = dataset.schema();
    if schema.index_of(TYPE).is_none() || schema.index_of(TOTAL_BUDGET).is_none() {
        return None;
    }
    Some(pivot(
        dataset,
        records,
        (YEAR, LabelOrder::Ascending),
        (TYPE, LabelOrder::FirstSeen),
        &[TOTAL_BUDGET],
    ))
}

fn latest_year<'a>(dataset: &Dataset, records: &[&'a Record]) -> Result<Option<(f64, Vec<&'a Record>)>, PipelineError> {
    let idx = dataset.column_index(YEAR)?;
    let Some(latest) = records
        .iter()
        .filter_map(|r| numeric_of(r.get(idx)))
        .reduce(f64::max)
    else {
        return Ok(None);
    };
    let rows = records
        .iter()
        .copied()
        .filter(|r| numeric_of(r.get(idx)) == Some(latest))
        .collect();
    Ok(Some((latest, rows)))
}

fn split(dataset: &Dataset) -> Result<BudgetSplitPage, PipelineError> {
    let records = require_numeric(dataset, &dataset.all(), YEAR)?;
    let by_year = series_by(dataset, &records, YEAR, &BUDGET_COLUMNS, LabelOrder::Ascending)?;
    let by_type = by_type(dataset, &records).map(|result| Panel::from_result(result.map(Panel::ok)));

    let Some((year, latest)) = latest_year(dataset, &records)? else {
        let notice = "No budget years recorded.";
        return Ok(BudgetSplitPage {
            by_year: Panel::no_matches(notice),
            latest_year: None,
            latest_split: Panel::no_matches(notice),
            top_states: Panel::no_matches(notice),
            by_type,
            budget_vs_footfall: Panel::no_matches(notice),
        });
    };

    let top_states = aggregate(
        dataset,
        &latest,
        STATE,
        &Metric::Sum(STATE_BUDGET.to_string()),
        usize::MAX,
    )?;
    Ok(BudgetSplitPage {
        by_year: Panel::ok(by_year),
        latest_year: Some(format_number(year)),
        latest_split: Panel::ok(column_totals(dataset, &latest, &BUDGET_COLUMNS)?),
        top_states: not_empty(top_states),
        by_type,
        budget_vs_footfall: Panel::no_matches("No footfall figures loaded."),
    })
}

fn footfall_panel(budget: &Dataset, footfall: &Dataset) -> Result<Panel<Vec<GrowthPoint>>, PipelineError> {
    let points = budget_vs_footfall(budget, footfall)?;
    Ok(if points.is_empty() {
        Panel::no_matches("No state and year appears in both budget and footfall figures.")
    } else {
        Panel::ok(points)
    })
}

/// Central vs state budget over the years and in the latest year, plus
/// budget against tourist footfall.
pub fn render_split(ctx: &mut PageContext<'_>) -> BudgetSplitPage {
    let config = ctx.config();
    let budget = match ctx.load(&config.pages.budget_split) {
        Ok(budget) => budget,
        Err(e) => return unavailable_split(e),
    };
    let mut page = match split(&budget) {
        Ok(page) => page,
        Err(e) => return unavailable_split(e),
    };
    if page.latest_year.is_some() {
        page.budget_vs_footfall = Panel::from_result(
            ctx.load(&config.pages.tourism_growth)
                .and_then(|footfall| footfall_panel(&budget, &footfall)),
        );
    }
    page
}

fn unavailable_split(e: PipelineError) -> BudgetSplitPage {
    BudgetSplitPage {
        by_year: Panel::unavailable(&e),
        latest_year: None,
        latest_split: Panel::unavailable(&e),
        top_states: Panel::unavailable(&e),
        by_type: None,
        budget_vs_footfall: Panel::from_result(Err(e)),
    }
}
