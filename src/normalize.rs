use crate::data::RawTable;
use crate::error::PipelineError;
use crate::types::{Column, ColumnKind, Dataset, GeoRecord, Record, Schema, SourceKey, Value};
use geo::Point;
use tracing::debug;

/// Parses a coordinate such as `12.5N`, `77.2° W` or `-8.3`.
///
/// A trailing hemisphere letter fixes the sign: `N`/`E` positive, `S`/`W`
/// negative. Without one the number keeps its own sign.
pub fn parse_coordinate(raw: Option<&str>) -> Option<f64> {
    let cleaned = raw?.replace('°', "");
    let cleaned = cleaned.trim();
    let last = cleaned.chars().last()?;

    let (body, sign) = match last.to_ascii_uppercase() {
        'N' | 'E' => (&cleaned[..cleaned.len() - last.len_utf8()], Some(1.0)),
        'S' | 'W' => (&cleaned[..cleaned.len() - last.len_utf8()], Some(-1.0)),
        _ => (cleaned, None),
    };

    let value: f64 = body.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(match sign {
        Some(sign) => sign * value.abs(),
        None => value,
    })
}

/// Parses a metric cell. Thousands separators are accepted, anything else
/// non-numeric is "no value".
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value: f64 = trimmed.replace(',', "").parse().ok()?;
    value.is_finite().then_some(value)
}

pub fn parse_year(raw: &str) -> Option<i32> {
    let value = parse_number(raw)?;
    if value.fract() != 0.0 || value < i32::MIN as f64 || value > i32::MAX as f64 {
        return None;
    }
    Some(value as i32)
}

const NA_TOKENS: [&str; 9] = ["na", "n/a", "n.a.", "nan", "null", "none", "nil", "-", "--"];

/// Placeholder text a source uses for "no value".
pub fn is_na_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    NA_TOKENS.iter().any(|t| trimmed.eq_ignore_ascii_case(t))
}

/// A column is numeric when it has at least one number and every other
/// non-empty cell is an NA placeholder.
pub fn infer_kind<'a>(cells: impl IntoIterator<Item = Option<&'a str>>) -> ColumnKind {
    let mut seen = false;
    for cell in cells.into_iter().flatten() {
        if cell.trim().is_empty() || is_na_token(cell) {
            continue;
        }
        if parse_number(cell).is_none() {
            return ColumnKind::Categorical;
        }
        seen = true;
    }
    if seen {
        ColumnKind::Numeric
    } else {
        ColumnKind::Categorical
    }
}

/// Types a raw table once, at load time.
pub fn build_dataset(key: SourceKey, raw: RawTable) -> Dataset {
    let width = raw.headers.len();
    let kinds: Vec<ColumnKind> = (0..width)
        .map(|i| infer_kind(raw.rows.iter().map(|row| row.get(i).and_then(|c| c.as_deref()))))
        .collect();

    let schema = Schema::new(
        raw.headers
            .iter()
            .zip(&kinds)
            .map(|(name, kind)| Column {
                name: name.trim().to_string(),
                kind: *kind,
            })
            .collect(),
    );

    let records = raw
        .rows
        .into_iter()
        .map(|row| {
            let mut cells = row.into_iter();
            let values = kinds
                .iter()
                .map(|kind| typed_cell(cells.next().flatten(), *kind))
                .collect();
            Record::new(values)
        })
        .collect();

    Dataset::new(key, schema, records)
}

fn typed_cell(cell: Option<String>, kind: ColumnKind) -> Value {
    let Some(cell) = cell else {
        return Value::Missing;
    };
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Missing;
    }
    match kind {
        ColumnKind::Numeric => parse_number(trimmed).map_or(Value::Missing, Value::Number),
        ColumnKind::Categorical => Value::Text(trimmed.to_string()),
    }
}

/// Converts a typed dataset back to strings so it can be merged with
/// another source and re-typed.
pub fn to_raw(dataset: &Dataset) -> RawTable {
    RawTable {
        headers: dataset
            .schema()
            .columns()
            .iter()
            .map(|c| c.name.clone())
            .collect(),
        rows: dataset
            .records()
            .iter()
            .map(|record| {
                record
                    .values()
                    .iter()
                    .map(|value| match value {
                        Value::Text(s) => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        Value::Missing => None,
                    })
                    .collect()
            })
            .collect(),
    }
}

pub fn coordinate_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.is_finite().then_some(*n),
        Value::Text(s) => parse_coordinate(Some(s)),
        Value::Missing => None,
    }
}

/// Numeric reading of a cell, also accepting numbers stored in a
/// categorical column (e.g. a `Year` column with one "N/A" row).
pub fn numeric_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => Some(*n),
        Value::Text(s) => parse_number(s),
        Value::Missing => None,
    }
}

/// Pairs records with their map position, dropping those whose coordinates
/// don't parse. The dataset itself is untouched.
pub fn geo_records<'a>(
    dataset: &Dataset,
    records: &[&'a Record],
    lat_column: &str,
    lon_column: &str,
) -> Result<Vec<GeoRecord<'a>>, PipelineError> {
    let lat_idx = dataset.column_index(lat_column)?;
    let lon_idx = dataset.column_index(lon_column)?;

    let geo: Vec<GeoRecord<'a>> = records
        .iter()
        .filter_map(|record| {
            let lat = coordinate_of(record.get(lat_idx))?;
            let lon = coordinate_of(record.get(lon_idx))?;
            Some(GeoRecord {
                record,
                point: Point::new(lon, lat),
            })
        })
        .collect();

    let dropped = records.len() - geo.len();
    if dropped > 0 {
        debug!(dataset = %dataset.key(), dropped, "records without usable coordinates left off the map");
    }
    Ok(geo)
}

/// Keeps the records that carry a number in `column`.
pub fn require_numeric<'a>(
    dataset: &Dataset,
    records: &[&'a Record],
    column: &str,
) -> Result<Vec<&'a Record>, PipelineError> {
    let idx = dataset.column_index(column)?;
    let kept: Vec<&'a Record> = records
        .iter()
        .copied()
        .filter(|record| numeric_of(record.get(idx)).is_some())
        .collect();
    if kept.len() < records.len() {
        debug!(
            dataset = %dataset.key(),
            column,
            dropped = records.len() - kept.len(),
            "records without a numeric value dropped from view"
        );
    }
    Ok(kept)
}
