use crate::error::PipelineError;
use crate::types::{Dataset, Record};
use std::io::Write;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes the selected records as CSV, either every column or just `columns`
/// in the given order.
pub fn write_csv<W: Write>(
    dataset: &Dataset,
    records: &[&Record],
    columns: Option<&[&str]>,
    writer: W,
) -> Result<(), ExportError> {
    let indices: Vec<(usize, &str)> = match columns {
        Some(columns) => columns
            .iter()
            .map(|c| dataset.column_index(c).map(|i| (i, *c)))
            .collect::<Result<_, PipelineError>>()?,
        None => dataset
            .schema()
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| (i, c.name.as_str()))
            .collect(),
    };

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(indices.iter().map(|(_, name)| *name))?;
    for record in records {
        wtr.write_record(
            indices
                .iter()
                .map(|(i, _)| record.get(*i).label().unwrap_or_default()),
        )?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn to_csv_bytes(
    dataset: &Dataset,
    records: &[&Record],
    columns: Option<&[&str]>,
) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    write_csv(dataset, records, columns, &mut buf)?;
    Ok(buf)
}
