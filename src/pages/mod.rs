//! Per-page pipelines. Each page reads its datasets through the session cache,
//! applies the picked filters and returns a serializable payload whose panels
//! carry their own status, so one missing source never blanks a whole page.

pub mod art_forms;
pub mod budget;
pub mod festivals;
pub mod heritage;
pub mod summary;
pub mod tips;
pub mod tourism;

use crate::config::AppConfig;
use crate::data::DatasetCache;
use crate::error::PipelineError;
use crate::filter::Selection;
use crate::types::Dataset;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, warn};

pub const PAGES: [&str; 8] = [
    "summary",
    "heritage",
    "art_forms",
    "festivals",
    "tourism",
    "budget",
    "budget_split",
    "tips",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Ok,
    NoMatches,
    Unavailable,
}

/// One independently rendered part of a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Panel<T> {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<T>,
}

impl<T> Panel<T> {
    pub fn ok(body: T) -> Self {
        Self {
            status: Status::Ok,
            notice: None,
            body: Some(body),
        }
    }

    pub fn no_matches(notice: impl Into<String>) -> Self {
        Self {
            status: Status::NoMatches,
            notice: Some(notice.into()),
            body: None,
        }
    }

    /// No matches, but still something to draw (e.g. an empty map on the
    /// national centre).
    pub fn no_matches_with(notice: impl Into<String>, body: T) -> Self {
        Self {
            status: Status::NoMatches,
            notice: Some(notice.into()),
            body: Some(body),
        }
    }

    pub fn unavailable(error: &PipelineError) -> Self {
        Self {
            status: Status::Unavailable,
            notice: Some(error.to_string()),
            body: None,
        }
    }

    pub fn from_result(result: Result<Panel<T>, PipelineError>) -> Self {
        result.unwrap_or_else(|e| {
            if e.is_degradable() {
                warn!(error = %e, "panel degraded");
            } else {
                error!(error = %e, "panel failed");
            }
            Panel::unavailable(&e)
        })
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Everything a page needs for one interaction.
pub struct PageContext<'a> {
    pub cache: &'a mut DatasetCache,
    pub config: &'a AppConfig,
}

impl<'a> PageContext<'a> {
    pub fn new(cache: &'a mut DatasetCache, config: &'a AppConfig) -> Self {
        Self { cache, config }
    }

    /// The config outlives the context, so callers can hold it across loads.
    pub fn config(&self) -> &'a AppConfig {
        self.config
    }

    pub fn load(&mut self, dataset: &str) -> Result<Arc<Dataset>, PipelineError> {
        let key = self.config.source_key(dataset)?;
        self.cache.get(&key)
    }

    pub fn top_n(&self) -> usize {
        self.config.aggregation.top_n
    }

    pub fn all_label(&self) -> &str {
        &self.config.aggregation.all_label
    }
}

/// Widget values picked on a page, by input name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageParams(BTreeMap<String, String>);

impl PageParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn with(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }

    /// Trimmed value, `None` when absent or blank.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn selection(&self, name: &str, sentinel: &str) -> Selection {
        Selection::from_option(self.get(name).unwrap_or(sentinel), &[sentinel])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Page {
    Summary(summary::SummaryPage),
    Heritage(heritage::HeritagePage),
    ArtForms(art_forms::ArtFormsPage),
    Festivals(festivals::FestivalsPage),
    Tourism(tourism::TourismPage),
    Budget(budget::BudgetPage),
    BudgetSplit(budget::BudgetSplitPage),
    Tips(tips::TipsPage),
}

pub fn render(
    ctx: &mut PageContext<'_>,
    page: &str,
    params: &PageParams,
) -> Result<Page, PipelineError> {
    Ok(match page {
        "summary" => Page::Summary(summary::render(ctx, params)),
        "heritage" => Page::Heritage(heritage::render(ctx, params)),
        "art_forms" => Page::ArtForms(art_forms::render(ctx, params)),
        "festivals" => Page::Festivals(festivals::render(ctx, params)),
        "tourism" => Page::Tourism(tourism::render(ctx, params)),
        "budget" => Page::Budget(budget::render(ctx, params)?),
        "budget_split" => Page::BudgetSplit(budget::render_split(ctx)),
        "tips" => Page::Tips(tips::render(ctx)),
        other => return Err(PipelineError::UnknownPage(other.to_string())),
    })
}
