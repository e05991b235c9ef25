use super::{PageContext, PageParams, Panel};
use crate::data::RawTable;
use crate::error::PipelineError;
use crate::filter::{options, select, FilterState};
use crate::normalize::{build_dataset, to_raw};
use crate::types::{Dataset, SourceKey};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub const ART_COLUMN: &str = "ART FORM";
pub const STATE_COLUMN: &str = "LOCATION (STATE)";
pub const CATEGORY_COLUMN: &str = "art_category";
pub const FALLBACK_DESCRIPTION: &str = "A forgotten gem in India's cultural crown.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArtCategory {
    Dance,
    Music,
    Theatre,
    Painting,
    Handicraft,
    Others,
}

impl ArtCategory {
    pub fn classify(art_form: &str) -> Self {
        match art_form.trim() {
            "Kathakali" | "Chhau Dance" | "Khon" | "Birhor Dance" | "Pung Cholom" => Self::Dance,
            "Taiko Drumming" => Self::Music,
            "Bhavai" | "Kutiyattam" | "Tholu Bommalata" => Self::Theatre,
            "Warli Painting" | "Phad Painting" | "Kalighat Paintings" | "Saora Art"
            | "Gond Art" | "Chitrakathi" | "Pattachitra" => Self::Painting,
            "Patola Weaving" | "Channapatna Toys" | "Kalamkari" | "Charkha Weaving" => {
                Self::Handicraft
            }
            _ => Self::Others,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dance => "Dance",
            Self::Music => "Music",
            Self::Theatre => "Theatre",
            Self::Painting => "Painting",
            Self::Handicraft => "Handicraft",
            Self::Others => "Others",
        }
    }
}

impl fmt::Display for ArtCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn description(art_form: &str) -> &'static str {
    match art_form.trim() {
        "Kathakali" => "Eyes that speak, colours that roar. A classical dance-drama from Kerala that tells the epics through costume and gesture.",
        "Chhau Dance" => "A masked dance of martial grace from the tribal regions of eastern India.",
        "Khon" => "A masked dance-drama that brings the Ramayana to the stage.",
        "Birhor Dance" => "Ritual dance of the Birhor tribe, set to earthy forest beats.",
        "Pung Cholom" => "Manipur's drum dance, performed while the drummers leap and spin.",
        "Taiko Drumming" => "Thunderous ensemble drumming with synchronised choreography.",
        "Bhavai" => "Gujarat's folk theatre of satire, song and dance.",
        "Kutiyattam" => "Sanskrit temple theatre from Kerala, one of the oldest living stage traditions.",
        "Tholu Bommalata" => "Leather shadow puppetry from Andhra Pradesh.",
        "Warli Painting" => "Tribal paintings from Maharashtra built from circles, triangles and lines.",
        "Phad Painting" => "Rajasthani scroll paintings of local deities and heroes.",
        "Kalighat Paintings" => "Bold, satirical brushwork from the temples of Kolkata.",
        "Saora Art" => "Ritual wall paintings of the Saora tribe of Odisha.",
        "Gond Art" => "Vivid dot-and-line paintings of the forest from Madhya Pradesh.",
        "Chitrakathi" => "Narrative paintings from Maharashtra, shown alongside sung stories.",
        "Pattachitra" => "Cloth and palm-leaf paintings of deities from Odisha.",
        "Patola Weaving" => "Double ikat silk from Gujarat, dyed before it is woven.",
        "Channapatna Toys" => "Lacquered wooden toys turned on the lathe in Karnataka.",
        "Kalamkari" => "Hand-painted textiles drawn with a bamboo pen and plant dyes.",
        "Charkha Weaving" => "Hand-spun cotton, a symbol of swadeshi self-reliance.",
        _ => FALLBACK_DESCRIPTION,
    }
}

/// "Chhau Dance" -> "chhaudance.jpg"
pub fn image_file_name(art_form: &str) -> String {
    let stem: String = art_form
        .to_lowercase()
        .chars()
        .filter(|c| *c != ' ' && *c != '/')
        .collect();
    format!("{stem}.jpg")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtCard {
    pub name: String,
    pub state: String,
    pub category: String,
    pub description: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtFormsPage {
    pub category_options: Vec<String>,
    pub state_options: Vec<String>,
    pub cards: Panel<Vec<ArtCard>>,
}

/// Art forms with their category column, memoized for the session.
pub fn categorized(ctx: &mut PageContext<'_>) -> Result<Arc<Dataset>, PipelineError> {
    let config = ctx.config();
    let key = config.source_key(&config.pages.art_forms)?;
    ctx.cache.derive("art_forms_categorized", |cache| {
        let source = cache.get(&key)?;
        let art_idx = source.column_index(ART_COLUMN)?;
        let mut raw: RawTable = to_raw(&source);
        let categories = source
            .records()
            .iter()
            .map(|r| {
                let name = r.get(art_idx).label().unwrap_or_default();
                Some(ArtCategory::classify(&name).to_string())
            })
            .collect();
        raw.push_column(CATEGORY_COLUMN, categories);
        Ok(build_dataset(
            SourceKey::Derived("art_forms_categorized".into()),
            raw,
        ))
    })
}

pub fn render(ctx: &mut PageContext<'_>, params: &PageParams) -> ArtFormsPage {
    let all = ctx.all_label().to_string();
    let filter = FilterState::new()
        .with(CATEGORY_COLUMN, params.selection("category", &all))
        .with(STATE_COLUMN, params.selection("state", &all));

    let outcome = categorized(ctx).and_then(|art| {
        let category_options = options(&art, CATEGORY_COLUMN, Some(all.as_str()))?;
        let state_options = options(&art, STATE_COLUMN, Some(all.as_str()))?;
        let cards: Vec<ArtCard> = select(&art, &filter)
            .iter()
            .map(|r| {
                let name = art.label(r, ART_COLUMN).unwrap_or_default();
                ArtCard {
                    state: art.label(r, STATE_COLUMN).unwrap_or_default(),
                    category: art.label(r, CATEGORY_COLUMN).unwrap_or_default(),
                    description: description(&name).to_string(),
                    image: image_file_name(&name),
                    name,
                }
            })
            .collect();
        let cards = if cards.is_empty() {
            Panel::no_matches("No results match your filters.")
        } else {
            Panel::ok(cards)
        };
        Ok((category_options, state_options, cards))
    });

    let (category_options, state_options, cards) = match outcome {
        Ok(parts) => parts,
        Err(e) => (Vec::new(), Vec::new(), Panel::from_result(Err(e))),
    };
    ArtFormsPage {
        category_options,
        state_options,
        cards,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DatasetCache;
    use crate::pages::testing::fixture;
    use crate::pages::Status;

    const ART: &str = "\
ART FORM,LOCATION (STATE)
Kathakali,Kerala
Kutiyattam,Kerala
Pattachitra,Odisha
Saora Art,Odisha
Dhokra Casting,Chhattisgarh
";

    fn render_with(params: PageParams) -> ArtFormsPage {
        let (_dir, config) = fixture(&[("art_forms", ART)]);
        let mut cache = DatasetCache::new();
        render(&mut PageContext::new(&mut cache, &config), &params)
    }

    #[test]
    fn classifies_known_names_and_defaults_to_others() {
        assert_eq!(ArtCategory::classify("Chhau Dance"), ArtCategory::Dance);
        assert_eq!(ArtCategory::classify("Kalamkari"), ArtCategory::Handicraft);
        assert_eq!(ArtCategory::classify("kathakali"), ArtCategory::Others);
        assert_eq!(ArtCategory::classify("Dhokra Casting"), ArtCategory::Others);
    }

    #[test]
    fn image_names_drop_spaces_and_slashes() {
        assert_eq!(image_file_name("Chhau Dance"), "chhaudance.jpg");
        assert_eq!(image_file_name("Tholu/Bommalata"), "tholubommalata.jpg");
    }

    #[test]
    fn category_and_state_filters_combine() {
        let page = render_with(PageParams::new().with("category", "Painting").with("state", "Odisha"));
        let cards = page.cards.body.unwrap();
        assert_eq!(
            cards.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["Pattachitra", "Saora Art"]
        );
        assert_eq!(
            page.category_options,
            vec!["All", "Dance", "Others", "Painting", "Theatre"]
        );
    }

    #[test]
    fn unknown_art_forms_get_the_fallback_description() {
        let page = render_with(PageParams::new().with("state", "Chhattisgarh"));
        let cards = page.cards.body.unwrap();
        assert_eq!(cards[0].category, "Others");
        assert_eq!(cards[0].description, FALLBACK_DESCRIPTION);
    }

    #[test]
    fn empty_selection_is_reported() {
        let page = render_with(PageParams::new().with("category", "Music"));
        assert_eq!(page.cards.status, Status::NoMatches);
    }
}
