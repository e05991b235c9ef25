use crate::config::MapConfig;
use crate::error::PipelineError;
use crate::filter::FilterState;
use crate::normalize::geo_records;
use crate::types::{Dataset, GeoRecord, Record, Schema};
use geo::{Centroid, MultiPoint, Point};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use serde::Serialize;
use std::collections::BTreeMap;

/// Which columns feed each part of a marker.
#[derive(Debug, Clone)]
pub struct MarkerFields {
    pub latitude: String,
    pub longitude: String,
    pub name: String,
    pub state: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub image_url: Option<String>,
    /// Column whose value picks the marker colour.
    pub style_key: Option<String>,
    /// Extra hover columns, shown as-is.
    pub details: Vec<String>,
}

impl MarkerFields {
    pub fn new(latitude: &str, longitude: &str, name: &str) -> Self {
        Self {
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
            name: name.to_string(),
            state: None,
            description: None,
            url: None,
            image_url: None,
            style_key: None,
            details: Vec::new(),
        }
    }

    /// Guesses marker columns from common header names, case-insensitively.
    /// Latitude and longitude are required; the name falls back to the first
    /// categorical column.
    pub fn infer(schema: &Schema) -> Result<Self, PipelineError> {
        let find = |names: &[&str]| {
            names
                .iter()
                .find_map(|n| schema.find_ignore_case(n))
                .map(|c| c.name.clone())
        };
        let required = |names: &[&str], what: &str| {
            find(names).ok_or_else(|| PipelineError::UnknownColumn {
                dataset: "map".to_string(),
                column: what.to_string(),
            })
        };

        let latitude = required(&["Latitude", "Lat"], "latitude")?;
        let longitude = required(&["Longitude", "Lon", "Lng"], "longitude")?;
        let name = find(&["Name", "SITE NAME", "FESTIVAL", "ART FORM"])
            .or_else(|| schema.categorical_columns().first().map(|c| c.to_string()))
            .ok_or_else(|| PipelineError::UnknownColumn {
                dataset: "map".to_string(),
                column: "name".to_string(),
            })?;

        Ok(Self {
            state: find(&["State", "LOCATION (STATE)", "Location (State)"]),
            description: find(&["Description"]),
            url: find(&["URL"]),
            image_url: find(&["ImageURL", "Image_URL"]),
            style_key: find(&["Type"]),
            ..Self::new(&latitude, &longitude, &name)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl From<Point<f64>> for LatLon {
    fn from(point: Point<f64>) -> Self {
        Self {
            lat: point.y(),
            lon: point.x(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    pub position: LatLon,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub colour: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    pub center: LatLon,
    pub zoom: u8,
    pub markers: Vec<Marker>,
    /// Selected records left off the map for lack of coordinates.
    pub excluded: usize,
}

/// Mean of the points, or the national centre when there are none.
pub fn center_of(points: &[GeoRecord<'_>], config: &MapConfig) -> LatLon {
    let multi: MultiPoint<f64> = points.iter().map(|g| g.point).collect();
    multi.centroid().map(LatLon::from).unwrap_or(LatLon {
        lat: config.national_center[0],
        lon: config.national_center[1],
    })
}

/// One marker: closest. Any restriction: medium. Otherwise the whole country.
pub fn zoom_for(markers: usize, filter: &FilterState, config: &MapConfig) -> u8 {
    if markers == 1 {
        config.closest_zoom
    } else if !filter.is_unrestricted() {
        config.medium_zoom
    } else {
        config.widest_zoom
    }
}

/// Cuts `text` to `budget` characters, marking the cut with `ellipsis`.
pub fn truncate_description(text: &str, budget: usize, ellipsis: &str) -> String {
    let text = text.trim();
    match text.char_indices().nth(budget) {
        Some((cut, _)) => format!("{}{}", text[..cut].trim_end(), ellipsis),
        None => text.to_string(),
    }
}

pub fn assemble(
    dataset: &Dataset,
    records: &[&Record],
    filter: &FilterState,
    fields: &MarkerFields,
    config: &MapConfig,
) -> Result<MapView, PipelineError> {
    dataset.column_index(&fields.name)?;
    let geo = geo_records(dataset, records, &fields.latitude, &fields.longitude)?;

    let text = |record: &Record, column: &Option<String>| {
        column
            .as_deref()
            .and_then(|c| dataset.label(record, c))
            .filter(|s| !s.is_empty())
    };

    let markers = geo
        .iter()
        .map(|g| {
            let kind = text(g.record, &fields.style_key);
            let colour = kind
                .as_ref()
                .and_then(|k| config.colours.get(k))
                .cloned()
                .unwrap_or_else(|| config.default_colour.clone());
            Marker {
                position: g.point.into(),
                name: dataset.label(g.record, &fields.name).unwrap_or_default(),
                state: text(g.record, &fields.state),
                description: text(g.record, &fields.description).map(|d| {
                    truncate_description(&d, config.description_chars, &config.ellipsis)
                }),
                url: text(g.record, &fields.url),
                image_url: text(g.record, &fields.image_url),
                kind,
                colour,
                details: fields
                    .details
                    .iter()
                    .filter_map(|c| dataset.label(g.record, c).map(|v| (c.clone(), v)))
                    .collect(),
            }
        })
        .collect::<Vec<_>>();

    Ok(MapView {
        center: center_of(&geo, config),
        zoom: zoom_for(markers.len(), filter, config),
        excluded: records.len() - geo.len(),
        markers,
    })
}

/// Point features for map front-ends that take GeoJSON directly.
pub fn to_geojson(view: &MapView) -> FeatureCollection {
    let features = view
        .markers
        .iter()
        .map(|marker| {
            let mut properties = JsonObject::new();
            properties.insert("name".into(), marker.name.clone().into());
            properties.insert("style".into(), marker.colour.clone().into());
            if let Some(state) = &marker.state {
                properties.insert("state".into(), state.clone().into());
            }
            if let Some(description) = &marker.description {
                properties.insert("description".into(), description.clone().into());
            }
            if let Some(url) = &marker.url {
                properties.insert("url".into(), url.clone().into());
            }
            if let Some(image_url) = &marker.image_url {
                properties.insert("image_url".into(), image_url.clone().into());
            }
            if let Some(kind) = &marker.kind {
                properties.insert("kind".into(), kind.clone().into());
            }
            for (key, value) in &marker.details {
                properties.insert(key.clone(), value.clone().into());
            }
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(GeoValue::Point(vec![
                    marker.position.lon,
                    marker.position.lat,
                ]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
