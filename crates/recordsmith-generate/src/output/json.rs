use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use recordsmith_core::Record;
use serde::Serialize;

use crate::errors::GenerationError;

/// Write records as a pretty JSON array of objects.
pub fn write_records_json(path: &Path, records: &[Record]) -> Result<(), GenerationError> {
    write_json(path, &records)
}

/// Write any serializable artifact (report, plan) as pretty JSON.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), GenerationError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}
