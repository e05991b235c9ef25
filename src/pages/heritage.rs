use super::{PageContext, PageParams, Panel};
use crate::data::RawTable;
use crate::error::PipelineError;
use crate::export::{to_csv_bytes, ExportError};
use crate::filter::{options, select, FilterState};
use crate::map::{assemble, MapView, MarkerFields};
use crate::normalize::{build_dataset, parse_coordinate, to_raw};
use crate::types::{Dataset, SourceKey};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

pub const TYPE_COLUMN: &str = "Type";
pub const TEMPLES: &str = "Temples";
pub const FORTS: &str = "Forts";
const NAME: &str = "Name";
const STATE: &str = "State";
const LATITUDE: &str = "Latitude";
const LONGITUDE: &str = "Longitude";
const DESCRIPTION: &str = "Description";
const URL: &str = "URL";
const IMAGE_URL: &str = "ImageURL";
pub const TABLE_COLUMNS: [&str; 4] = [NAME, STATE, TYPE_COLUMN, DESCRIPTION];
pub const EXPORT_FILE_NAME: &str = "heritage_sites_filtered.csv";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SiteRow {
    pub name: String,
    pub state: String,
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeritagePage {
    pub type_options: Vec<String>,
    pub state_options: Vec<String>,
    pub map: Panel<MapView>,
    pub sites: Panel<Vec<SiteRow>>,
}

/// Tags a source's rows with its site type and drops rows without a usable
/// position.
fn tagged(dataset: &Dataset, kind: &str) -> RawTable {
    let mut raw = to_raw(dataset);
    raw.push_constant_column(TYPE_COLUMN, kind);
    let lat = raw.headers.iter().position(|h| h == LATITUDE);
    let lon = raw.headers.iter().position(|h| h == LONGITUDE);
    let before = raw.rows.len();
    raw.rows.retain(|row| {
        let coordinate = |idx: Option<usize>| {
            idx.and_then(|i| parse_coordinate(row.get(i).and_then(|c| c.as_deref())))
        };
        coordinate(lat).is_some() && coordinate(lon).is_some()
    });
    if raw.rows.len() < before {
        debug!(kind, dropped = before - raw.rows.len(), "sites without coordinates dropped");
    }
    raw
}

/// Temples and forts as one dataset, memoized for the session.
pub fn sites(ctx: &mut PageContext<'_>) -> Result<Arc<Dataset>, PipelineError> {
    let config = ctx.config();
    let temples_key = config.source_key(&config.pages.temples)?;
    let forts_key = config.source_key(&config.pages.forts)?;
    ctx.cache.derive("heritage_sites", |cache| {
        let temples = cache.get(&temples_key)?;
        let forts = cache.get(&forts_key)?;
        let raw = RawTable::concat(vec![tagged(&temples, TEMPLES), tagged(&forts, FORTS)]);
        Ok(build_dataset(SourceKey::Derived("heritage_sites".into()), raw))
    })
}

fn filter_for(ctx: &PageContext<'_>, params: &PageParams) -> FilterState {
    let all = ctx.all_label();
    FilterState::new()
        .with(TYPE_COLUMN, params.selection("type", all))
        .with(STATE, params.selection("state", all))
}

pub fn render(ctx: &mut PageContext<'_>, params: &PageParams) -> HeritagePage {
    let type_options = [ctx.all_label(), TEMPLES, FORTS]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let filter = filter_for(ctx, params);
    let config = ctx.config();

    let outcome = sites(ctx).and_then(|sites| {
        let state_options = options(&sites, STATE, Some(config.aggregation.all_label.as_str()))?;
        let records = select(&sites, &filter);
        let fields = MarkerFields {
            state: Some(STATE.to_string()),
            description: Some(DESCRIPTION.to_string()),
            url: sites.schema().index_of(URL).map(|_| URL.to_string()),
            image_url: sites.schema().index_of(IMAGE_URL).map(|_| IMAGE_URL.to_string()),
            style_key: Some(TYPE_COLUMN.to_string()),
            ..MarkerFields::new(LATITUDE, LONGITUDE, NAME)
        };
        let view = assemble(&sites, &records, &filter, &fields, &config.map)?;

        let rows: Vec<SiteRow> = records
            .iter()
            .map(|r| {
                let cell = |c: &str| sites.label(r, c).unwrap_or_default();
                SiteRow {
                    name: cell(NAME),
                    state: cell(STATE),
                    kind: cell(TYPE_COLUMN),
                    description: cell(DESCRIPTION),
                }
            })
            .collect();

        Ok(if rows.is_empty() {
            let notice = "No sites match your filters.";
            (state_options, Panel::no_matches_with(notice, view), Panel::no_matches(notice))
        } else {
            (state_options, Panel::ok(view), Panel::ok(rows))
        })
    });

    let (state_options, map, sites) = match outcome {
        Ok(parts) => parts,
        Err(e) => {
            warn!(error = %e, "heritage sites unavailable");
            (Vec::new(), Panel::unavailable(&e), Panel::unavailable(&e))
        }
    };
    HeritagePage {
        type_options,
        state_options,
        map,
        sites,
    }
}

/// Every column of the filtered sites, as a CSV download.
pub fn export_csv(ctx: &mut PageContext<'_>, params: &PageParams) -> Result<Vec<u8>, ExportError> {
    let filter = filter_for(ctx, params);
    let sites = sites(ctx)?;
    to_csv_bytes(&sites, &select(&sites, &filter), None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DatasetCache;
    use crate::map::LatLon;
    use crate::pages::testing::fixture;
    use crate::pages::Status;

    const TEMPLES_CSV: &str = "\
Name,State,Latitude,Longitude,Description,URL
Konark Sun Temple,Odisha,19.8876,86.0945,Chariot of the sun god,https://example.org/konark
Jagannath Temple,Odisha,19.8048,85.8179,Abode of Lord Jagannath,
Padmanabhaswamy,Kerala,8.4828,76.9436,Temple of gold,
Unmapped Shrine,Kerala,unknown,76.0,Somewhere,
";

    const FORTS_CSV: &str = "\
Name,State,Latitude,Longitude,Description
Amber Fort,Rajasthan,26.9855,75.8513,Hill fort of Jaipur
Bekal Fort,Kerala,12.3925,75.0330,Keyhole shaped fort on the sea
";

    fn render_with(params: PageParams) -> HeritagePage {
        let (_dir, config) = fixture(&[("temples", TEMPLES_CSV), ("forts", FORTS_CSV)]);
        let mut cache = DatasetCache::new();
        render(&mut PageContext::new(&mut cache, &config), &params)
    }

    #[test]
    fn merges_sources_and_drops_unmapped_rows() {
        let page = render_with(PageParams::new());
        let rows = page.sites.body.unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.name != "Unmapped Shrine"));
        assert_eq!(rows[0].kind, "Temples");
        assert_eq!(rows[4].kind, "Forts");
        assert_eq!(page.state_options, vec!["All", "Kerala", "Odisha", "Rajasthan"]);
        assert_eq!(page.type_options, vec!["All", "Temples", "Forts"]);
    }

    #[test]
    fn temples_in_odisha() {
        let page = render_with(PageParams::new().with("type", "Temples").with("state", "Odisha"));
        let map = page.map.body.unwrap();
        assert_eq!(map.markers.len(), 2);
        assert!(map.markers.iter().all(|m| m.colour == "red"));
        assert_eq!(map.zoom, 5);
        assert!((map.center.lat - (19.8876 + 19.8048) / 2.0).abs() < 1e-9);
        assert_eq!(map.markers[0].url.as_deref(), Some("https://example.org/konark"));
        assert_eq!(map.markers[1].url, None);
    }

    #[test]
    fn forts_in_kerala_and_nothing_in_goa() {
        let page = render_with(PageParams::new().with("type", "Forts").with("state", "Kerala"));
        let map = page.map.body.unwrap();
        assert_eq!(map.markers.len(), 1);
        assert_eq!(map.markers[0].colour, "green");
        assert_eq!(map.zoom, 10);

        let page = render_with(PageParams::new().with("state", "Goa"));
        assert_eq!(page.sites.status, Status::NoMatches);
        assert_eq!(page.map.status, Status::NoMatches);
        assert_eq!(
            page.map.body.unwrap().center,
            LatLon { lat: 22.9734, lon: 78.6569 }
        );
    }

    #[test]
    fn export_keeps_the_filter() {
        let (_dir, config) = fixture(&[("temples", TEMPLES_CSV), ("forts", FORTS_CSV)]);
        let mut cache = DatasetCache::new();
        let mut ctx = PageContext::new(&mut cache, &config);
        let csv = export_csv(&mut ctx, &PageParams::new().with("type", "Forts")).unwrap();
        let text = String::from_utf8(csv).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("Name,State,Latitude,Longitude,Description,URL,Type")
        );
        assert_eq!(lines.count(), 2);
    }

    #[test]
    fn missing_forts_marks_the_page_unavailable() {
        let (_dir, config) = fixture(&[("temples", TEMPLES_CSV)]);
        let mut cache = DatasetCache::new();
        let page = render(&mut PageContext::new(&mut cache, &config), &PageParams::new());
        assert_eq!(page.map.status, Status::Unavailable);
        assert_eq!(page.sites.status, Status::Unavailable);
    }
}
