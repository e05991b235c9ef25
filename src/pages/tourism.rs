use super::{PageContext, PageParams, Panel};
use crate::aggregate::{
    column_totals, month_rank, pivot, series_by, Entry, LabelOrder, PivotTable, Series, MONTHS,
};
use crate::error::PipelineError;
use crate::filter::{options, select, FilterState};
use crate::types::Dataset;
use serde::Serialize;

pub const STATE_COLUMN: &str = "State";
pub const YEAR_COLUMN: &str = "Year";
pub const MONTH_COLUMN: &str = "Month";
const DOMESTIC: &str = "Domestic";
const FOREIGN: &str = "Foreign";
const VISITOR_COLUMNS: [&str; 2] = [DOMESTIC, FOREIGN];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Circuit {
    pub name: &'static str,
    pub route: &'static str,
    pub highlights: &'static str,
    pub best_time: &'static str,
}

pub const CIRCUITS: [Circuit; 5] = [
    Circuit {
        name: "Golden Triangle",
        route: "Delhi → Agra → Jaipur",
        highlights: "Taj Mahal, Red Fort, Amber Palace, local bazaars",
        best_time: "October to March",
    },
    Circuit {
        name: "Eastern Explorer",
        route: "Kolkata → Bhubaneswar → Puri → Konark",
        highlights: "Jagannath Temple, Sun Temple, Chilika Lake",
        best_time: "November to February",
    },
    Circuit {
        name: "Himalayan Heritage",
        route: "Shimla → Manali → Dharamshala",
        highlights: "Snow peaks, monasteries, rivers, apple orchards",
        best_time: "April to June & October",
    },
    Circuit {
        name: "Southern Spice Trail",
        route: "Kochi → Munnar → Thekkady → Alleppey",
        highlights: "Backwaters, tea estates, wildlife sanctuaries",
        best_time: "September to March",
    },
    Circuit {
        name: "Cultural Karnataka",
        route: "Hampi → Badami → Pattadakal → Aihole",
        highlights: "UNESCO temples, rock-cut architecture",
        best_time: "October to February",
    },
];

/// Places worth visiting in each month, January first.
const RECOMMENDED: [&str; 12] = [
    "Rajasthan, Gujarat, Kerala",
    "Goa, Tamil Nadu, Punjab",
    "Varanasi, Mathura, West Bengal",
    "Himachal Pradesh, Uttarakhand, Kerala",
    "Sikkim, Northeast, Ladakh",
    "Kerala, Goa, Odisha",
    "Leh-Ladakh, Rajasthan, Gujarat",
    "Himachal Pradesh, Jammu & Kashmir, Assam",
    "Kashmir, Himachal, Rajasthan",
    "Delhi, Uttar Pradesh, Punjab",
    "Goa, Rajasthan, Karnataka",
    "Kerala, Tamil Nadu, Gujarat",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub month: String,
    pub places: &'static str,
}

pub fn recommendation_for(month: &str) -> Option<Recommendation> {
    let rank = month_rank(month)?;
    Some(Recommendation {
        month: MONTHS[rank].to_string(),
        places: RECOMMENDED[rank],
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TourismPage {
    pub state_options: Vec<String>,
    pub year_options: Vec<String>,
    pub state: Option<String>,
    pub year: Option<String>,
    pub monthly: Panel<Series>,
    /// Month x year of domestic plus foreign visitors, for the state across all years.
    pub seasonality: Panel<PivotTable>,
    pub visitor_mix: Panel<Vec<Entry>>,
    pub circuit: Circuit,
    pub recommendation: Option<Recommendation>,
}

/// The picked value when it is one of the options, otherwise the first option.
fn pick(params: &PageParams, name: &str, options: &[String]) -> Option<String> {
    params
        .get(name)
        .filter(|v| options.iter().any(|o| o == *v))
        .map(str::to_string)
        .or_else(|| options.first().cloned())
}

struct Panels {
    state_options: Vec<String>,
    year_options: Vec<String>,
    state: Option<String>,
    year: Option<String>,
    monthly: Panel<Series>,
    seasonality: Panel<PivotTable>,
    visitor_mix: Panel<Vec<Entry>>,
}

fn panels(footfall: &Dataset, params: &PageParams) -> Result<Panels, PipelineError> {
    let state_options = options(footfall, STATE_COLUMN, None)?;
    let year_options = options(footfall, YEAR_COLUMN, None)?;
    let state = pick(params, "state", &state_options);
    let year = pick(params, "year", &year_options);

    let (Some(state), Some(year)) = (state, year) else {
        let notice = "No footfall records to chart.";
        return Ok(Panels {
            state_options,
            year_options,
            state: None,
            year: None,
            monthly: Panel::no_matches(notice),
            seasonality: Panel::no_matches(notice),
            visitor_mix: Panel::no_matches(notice),
        });
    };

    let state_filter = FilterState::new().only(STATE_COLUMN, &state);
    let year_filter = state_filter.clone().only(YEAR_COLUMN, &year);
    let state_records = select(footfall, &state_filter);
    let year_records = select(footfall, &year_filter);

    let (monthly, visitor_mix) = if year_records.is_empty() {
        let notice = format!("No footfall recorded for {state} in {year}.");
        (Panel::no_matches(notice.clone()), Panel::no_matches(notice))
    } else {
        (
            Panel::ok(series_by(
                footfall,
                &year_records,
                MONTH_COLUMN,
                &VISITOR_COLUMNS,
                LabelOrder::Calendar,
            )?),
            Panel::ok(column_totals(footfall, &year_records, &VISITOR_COLUMNS)?),
        )
    };

    let seasonality = if state_records.is_empty() {
        Panel::no_matches(format!("No footfall recorded for {state}."))
    } else {
        Panel::ok(
            pivot(
                footfall,
                &state_records,
                (MONTH_COLUMN, LabelOrder::Calendar),
                (YEAR_COLUMN, LabelOrder::Ascending),
                &VISITOR_COLUMNS,
            )?
            .reindex_rows(&MONTHS),
        )
    };

    Ok(Panels {
        state_options,
        year_options,
        state: Some(state),
        year: Some(year),
        monthly,
        seasonality,
        visitor_mix,
    })
}

pub fn render(ctx: &mut PageContext<'_>, params: &PageParams) -> TourismPage {
    let circuit = params
        .get("circuit")
        .and_then(|name| CIRCUITS.iter().find(|c| c.name == name))
        .copied()
        .unwrap_or(CIRCUITS[0]);
    let recommendation = recommendation_for(params.get("month").unwrap_or(MONTHS[0]));

    let config = ctx.config();
    let outcome = ctx
        .load(&config.pages.monthly_footfall)
        .and_then(|footfall| panels(&footfall, params));
    let panels = match outcome {
        Ok(panels) => panels,
        Err(e) => Panels {
            state_options: Vec::new(),
            year_options: Vec::new(),
            state: None,
            year: None,
            monthly: Panel::unavailable(&e),
            seasonality: Panel::unavailable(&e),
            visitor_mix: Panel::from_result(Err(e)),
        },
    };

    TourismPage {
        state_options: panels.state_options,
        year_options: panels.year_options,
        state: panels.state,
        year: panels.year,
        monthly: panels.monthly,
        seasonality: panels.seasonality,
        visitor_mix: panels.visitor_mix,
        circuit,
        recommendation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DatasetCache;
    use crate::pages::testing::fixture;
    use crate::pages::Status;

    const FOOTFALL: &str = "\
State,Year,Month,Domestic,Foreign
 Kerala ,2019,March,300,30
Kerala,2019,January,100,10
Kerala,2020,January,50,5
Goa,2019,December,900,90
Kerala,2019,January,20,2
";

    fn render_with(params: PageParams) -> TourismPage {
        let (_dir, config) = fixture(&[("monthly_footfall", FOOTFALL)]);
        let mut cache = DatasetCache::new();
        render(&mut PageContext::new(&mut cache, &config), &params)
    }

    #[test]
    fn defaults_to_the_first_state_and_year() {
        let page = render_with(PageParams::new());
        assert_eq!(page.state_options, vec!["Goa", "Kerala"]);
        assert_eq!(page.year_options, vec!["2019", "2020"]);
        assert_eq!(page.state.as_deref(), Some("Goa"));
        assert_eq!(page.year.as_deref(), Some("2019"));
        assert_eq!(page.circuit.name, "Golden Triangle");
        assert_eq!(page.recommendation.unwrap().places, "Rajasthan, Gujarat, Kerala");
    }

    #[test]
    fn monthly_series_and_mix_for_the_picked_year() {
        let page = render_with(PageParams::new().with("state", "Kerala").with("year", "2019"));
        let monthly = page.monthly.body.unwrap();
        assert_eq!(monthly.x, vec!["January", "March"]);
        assert_eq!(monthly.values_of("Domestic"), Some(&[120.0, 300.0][..]));
        assert_eq!(
            page.visitor_mix.body.unwrap(),
            vec![Entry::new("Domestic", 420.0), Entry::new("Foreign", 42.0)]
        );
    }

    #[test]
    fn seasonality_spans_every_month_and_year() {
        let page = render_with(PageParams::new().with("state", "Kerala").with("year", "2020"));
        let table = page.seasonality.body.unwrap();
        assert_eq!(table.rows.len(), 12);
        assert_eq!(table.columns, vec!["2019", "2020"]);
        assert_eq!(table.cell("January", "2019"), Some(132.0));
        assert_eq!(table.cell("January", "2020"), Some(55.0));
        assert_eq!(table.cell("July", "2020"), Some(0.0));
    }

    #[test]
    fn state_without_that_year_has_no_monthly_data() {
        let page = render_with(PageParams::new().with("state", "Goa").with("year", "2020"));
        assert_eq!(page.monthly.status, Status::NoMatches);
        assert_eq!(page.visitor_mix.status, Status::NoMatches);
        assert!(page.seasonality.is_ok());
    }

    #[test]
    fn unknown_picks_fall_back_to_first_option() {
        let page = render_with(PageParams::new().with("state", "Atlantis").with("circuit", "Nope"));
        assert_eq!(page.state.as_deref(), Some("Goa"));
        assert_eq!(page.circuit, CIRCUITS[0]);
    }
}
