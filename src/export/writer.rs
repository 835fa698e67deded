//! CSV export of result rows.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

use super::layout::BatchLayout;
use super::row::ResultRow;
use crate::capture::RunRecord;
use crate::error::ExportError;

/// Checks that every row has exactly the layout's columns, in order.
pub fn validate_rows(rows: &[ResultRow], layout: &BatchLayout) -> Result<(), ExportError> {
    for row in rows {
        let mut expected = layout.columns().iter();
        for column in row.columns() {
            match expected.next() {
                Some(e) if e == column => {}
                _ => return Err(ExportError::UnknownColumn(column.to_string())),
            }
        }
        if let Some(missing) = expected.next() {
            return Err(ExportError::UnknownColumn(missing.clone()));
        }
    }
    Ok(())
}

/// Serializes rows as CSV: a header record in layout order, then one
/// record per row. Every field is a string.
pub fn rows_to_csv(rows: &[ResultRow], layout: &BatchLayout) -> Result<Vec<u8>, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(layout.columns())?;
    for row in rows {
        writer.write_record(row.cells().iter().map(|(_, value)| value.as_str()))?;
    }
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Writes rows to `path` as CSV, creating parent directories.
///
/// Returns the number of rows written.
pub async fn write_rows(path: &Path, rows: &[ResultRow], layout: &BatchLayout) -> Result<usize, ExportError> {
    if rows.is_empty() {
        return Err(ExportError::NoRows);
    }
    validate_rows(rows, layout)?;

    let content = rows_to_csv(rows, layout)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let mut file = fs::File::create(path).await?;
    file.write_all(&content).await?;
    file.flush().await?;

    info!(
        path = %path.display(),
        rows = rows.len(),
        columns = layout.columns().len(),
        "Results saved"
    );
    Ok(rows.len())
}

/// Writes a run record as pretty JSON.
pub async fn write_run_record(path: &Path, record: &RunRecord) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(record)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    fs::write(path, json).await?;
    Ok(())
}
