use std::{io::Write, path::PathBuf};

use crate::pipeline::{PipelineError, SheetSink};
use crate::report::Sheet;

/// Write `sheet` as CSV. Rows keep their own width (the title row has a
/// single cell), so the writer runs in flexible mode.
pub fn write_csv<W: Write>(sheet: &Sheet, out: W) -> Result<(), PipelineError> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(out);

    for row in &sheet.rows {
        writer
            .write_record(&row.cells)
            .map_err(|e| PipelineError::Sink(format!("failed to write CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| PipelineError::Sink(format!("failed to flush CSV output: {e}")))
}

pub fn encode_csv(sheet: &Sheet) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vec::new();
    write_csv(sheet, &mut buf)?;
    Ok(buf)
}

/// Exports sheets to a CSV file, replacing any previous content.
pub struct CsvSheetSink {
    path: PathBuf,
}

impl CsvSheetSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SheetSink for CsvSheetSink {
    async fn write(&self, sheet: &Sheet) -> Result<(), PipelineError> {
        let bytes = encode_csv(sheet)?;
        tokio::fs::write(&self.path, &bytes).await.map_err(|e| {
            PipelineError::Sink(format!("failed to write {}: {e}", self.path.display()))
        })?;

        metrics::counter!("report_sheets_exported_total").increment(1);
        tracing::info!(
            sheet = %sheet.name,
            rows = sheet.rows.len(),
            path = %self.path.display(),
            "sheet exported"
        );
        Ok(())
    }
}
