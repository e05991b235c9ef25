use super::{PageContext, PageParams, Panel};
use crate::aggregate::month_rank;
use crate::filter::{options, select, FilterState, Selection};
use serde::Serialize;

pub const STATE_COLUMN: &str = "Location (State)";
pub const MONTH_COLUMN: &str = "MONTH";
const NAME_COLUMN: &str = "FESTIVAL";
const DESCRIPTION_COLUMN: &str = "DESCRIPTION";
pub const PAN_INDIA: &str = "PAN India";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FestivalCard {
    pub name: String,
    pub state: String,
    pub month: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FestivalsPage {
    pub state_options: Vec<String>,
    pub month_options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<String>,
    pub cards: Panel<Vec<FestivalCard>>,
}

fn heading(state: &Selection) -> Option<String> {
    match state.value() {
        None => Some("All Festivals (State-specific and National)".to_string()),
        Some(PAN_INDIA) => Some("National Festivals Celebrated Across India".to_string()),
        Some(_) => None,
    }
}

pub fn render(ctx: &mut PageContext<'_>, params: &PageParams) -> FestivalsPage {
    let config = ctx.config();
    let all = config.aggregation.all_label.as_str();
    let state = params.selection("state", all);
    let filter = FilterState::new()
        .with(STATE_COLUMN, state.clone())
        .with(MONTH_COLUMN, params.selection("month", all));

    let outcome = ctx.load(&config.pages.festivals).and_then(|festivals| {
        let mut state_options = options(&festivals, STATE_COLUMN, Some(all))?;
        if !state_options.iter().any(|s| s == PAN_INDIA) {
            state_options.push(PAN_INDIA.to_string());
        }
        let mut month_options = options(&festivals, MONTH_COLUMN, None)?;
        month_options.sort_by_key(|m| month_rank(m).unwrap_or(usize::MAX));
        month_options.insert(0, all.to_string());

        let cards: Vec<FestivalCard> = select(&festivals, &filter)
            .iter()
            .map(|r| {
                let cell = |c: &str| festivals.label(r, c).unwrap_or_default();
                FestivalCard {
                    name: cell(NAME_COLUMN),
                    state: cell(STATE_COLUMN),
                    month: cell(MONTH_COLUMN),
                    description: cell(DESCRIPTION_COLUMN),
                }
            })
            .collect();
        let cards = if cards.is_empty() {
            Panel::no_matches("No festivals match your filters.")
        } else {
            Panel::ok(cards)
        };
        Ok((state_options, month_options, cards))
    });

    let (state_options, month_options, cards) = match outcome {
        Ok(parts) => parts,
        Err(e) => (Vec::new(), Vec::new(), Panel::from_result(Err(e))),
    };
    FestivalsPage {
        state_options,
        month_options,
        heading: heading(&state),
        cards,
    }
}
