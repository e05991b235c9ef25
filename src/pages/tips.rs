use super::{PageContext, Panel};
use crate::error::PipelineError;
use crate::types::Dataset;
use serde::Serialize;

const CATEGORY: &str = "CATEGORY";
const TIP: &str = "TIP";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chapter {
    pub number: usize,
    pub category: String,
    pub tips: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TipsPage {
    pub chapters: Panel<Vec<Chapter>>,
}

/// Tips grouped under their category, chapters numbered from 1 in the order
/// categories first appear.
pub fn chapters(dataset: &Dataset) -> Result<Vec<Chapter>, PipelineError> {
    let category_idx = dataset.column_index(CATEGORY)?;
    let tip_idx = dataset.column_index(TIP)?;

    let mut chapters: Vec<Chapter> = Vec::new();
    for record in dataset.records() {
        let (Some(category), Some(tip)) = (record.get(category_idx).label(), record.get(tip_idx).label())
        else {
            continue;
        };
        match chapters.iter_mut().find(|c| c.category == category) {
            Some(chapter) => chapter.tips.push(tip),
            None => chapters.push(Chapter {
                number: chapters.len() + 1,
                category,
                tips: vec![tip],
            }),
        }
    }
    Ok(chapters)
}

pub fn render(ctx: &mut PageContext<'_>) -> TipsPage {
    let config = ctx.config();
    let chapters = ctx.load(&config.pages.tips).and_then(|tips| {
        let chapters = chapters(&tips)?;
        Ok(if chapters.is_empty() {
            Panel::no_matches("No travel tips yet.")
        } else {
            Panel::ok(chapters)
        })
    });
    TipsPage {
        chapters: Panel::from_result(chapters),
    }
}
