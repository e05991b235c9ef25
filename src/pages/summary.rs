use super::{PageContext, PageParams, Panel};
use crate::aggregate::{melt_sum, Entry};
use crate::error::PipelineError;
use crate::filter::{options, select, FilterState};
use crate::map::{assemble, MapView, MarkerFields};
use crate::normalize::numeric_of;
use crate::types::Dataset;
use serde::Serialize;

pub const STATE_COLUMN: &str = "LOCATION (STATE)";
const LATITUDE: &str = "LATITUDE";
const LONGITUDE: &str = "LONGITUDE";
const SITE_NAME: &str = "SITE NAME";
const YEAR_LISTED: &str = "YEAR LISTED";
const BUDGET_ID: &str = "State/UT";
const FOOTFALL_COLUMNS: [&str; 4] = ["total", "footfall", "visitors", "count"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub cultural_sites: usize,
    pub tourist_footfall: f64,
    pub endangered_art_forms: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryPage {
    pub metrics: Panel<Metrics>,
    pub state: String,
    pub state_options: Vec<String>,
    pub hotspots: Panel<MapView>,
    pub budget_by_year: Panel<Vec<Entry>>,
}

/// Sum of the first column that names a visitor total, or of every numeric
/// column when none does.
pub fn total_footfall(dataset: &Dataset) -> f64 {
    let schema = dataset.schema();
    let columns: Vec<&str> = schema
        .columns()
        .iter()
        .find(|c| {
            FOOTFALL_COLUMNS
                .iter()
                .any(|name| c.name.eq_ignore_ascii_case(name))
        })
        .map(|c| vec![c.name.as_str()])
        .unwrap_or_else(|| schema.numeric_columns());

    columns
        .iter()
        .filter_map(|c| schema.index_of(c))
        .map(|idx| {
            dataset
                .records()
                .iter()
                .filter_map(|r| numeric_of(r.get(idx)))
                .sum::<f64>()
        })
        .sum()
}

fn metrics(ctx: &mut PageContext<'_>) -> Result<Panel<Metrics>, PipelineError> {
    let pages = &ctx.config().pages;
    Ok(Panel::ok(Metrics {
        cultural_sites: ctx.load(&pages.heritage_sites)?.len(),
        tourist_footfall: total_footfall(&*ctx.load(&pages.footfall)?),
        endangered_art_forms: ctx.load(&pages.art_forms)?.len(),
    }))
}

fn hotspots(
    ctx: &mut PageContext<'_>,
    state: &str,
) -> Result<(Vec<String>, Panel<MapView>), PipelineError> {
    let config = ctx.config();
    let sentinel = config.aggregation.all_states_label.as_str();
    let sites = ctx.load(&config.pages.heritage_sites)?;
    let state_options = options(&sites, STATE_COLUMN, Some(sentinel))?;

    let filter = FilterState::from_pairs([(STATE_COLUMN, state)], &[sentinel]);
    let records = select(&sites, &filter);
    let fields = MarkerFields {
        state: Some(STATE_COLUMN.to_string()),
        details: vec![YEAR_LISTED.to_string()],
        ..MarkerFields::new(LATITUDE, LONGITUDE, SITE_NAME)
    };
    let view = assemble(&sites, &records, &filter, &fields, &config.map)?;
    let panel = if view.markers.is_empty() {
        Panel::no_matches_with(format!("No heritage sites to show for {state}."), view)
    } else {
        Panel::ok(view)
    };
    Ok((state_options, panel))
}

fn budget_by_year(ctx: &mut PageContext<'_>) -> Result<Panel<Vec<Entry>>, PipelineError> {
    let config = ctx.config();
    let budget = ctx.load(&config.pages.culture_budget)?;
    let entries = melt_sum(&budget, &budget.all(), BUDGET_ID)?;
    Ok(if entries.is_empty() {
        Panel::no_matches("No budget allocations recorded.")
    } else {
        Panel::ok(entries)
    })
}

pub fn render(ctx: &mut PageContext<'_>, params: &PageParams) -> SummaryPage {
    let state = params
        .get("state")
        .unwrap_or(ctx.config.aggregation.all_states_label.as_str())
        .to_string();

    let metrics = Panel::from_result(metrics(ctx));
    let (state_options, hotspots) = match hotspots(ctx, &state) {
        Ok((options, panel)) => (options, panel),
        Err(e) => (Vec::new(), Panel::from_result(Err(e))),
    };
    let budget_by_year = Panel::from_result(budget_by_year(ctx));

    SummaryPage {
        metrics,
        state,
        state_options,
        hotspots,
        budget_by_year,
    }
}
