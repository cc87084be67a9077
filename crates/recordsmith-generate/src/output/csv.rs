use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use recordsmith_core::{ObjectSchema, Record};

/// Write records as CSV, one column per generatable field in declaration
/// order. Returns the number of bytes written.
pub fn write_records_csv(
    path: &Path,
    object: &ObjectSchema,
    records: &[Record],
) -> Result<u64, csv::Error> {
    let writer = BufWriter::new(File::create(path).map_err(csv::Error::from)?);
    write_records(writer, object, records)
}

pub fn write_records<W: Write>(
    writer: W,
    object: &ObjectSchema,
    records: &[Record],
) -> Result<u64, csv::Error> {
    let counting = CountingWriter::new(writer);
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(counting);

    let columns: Vec<&str> = object
        .fields
        .iter()
        .filter(|field| field.is_generatable())
        .map(|field| field.name.as_str())
        .collect();
    writer.write_record(&columns)?;

    for record in records {
        let row: Vec<String> = columns
            .iter()
            .map(|column| {
                record
                    .get(*column)
                    .map(|value| value.to_field_string())
                    .unwrap_or_default()
            })
            .collect();
        writer.write_record(&row)?;
    }

    writer.flush()?;
    let counting = writer.into_inner().map_err(|err| err.into_error())?;
    Ok(counting.bytes_written())
}

struct CountingWriter<W: Write> {
    inner: W,
    bytes: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, bytes: 0 }
    }

    fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let size = self.inner.write(buf)?;
        self.bytes = self.bytes.saturating_add(size as u64);
        Ok(size)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use recordsmith_core::{FieldDescriptor, FieldType, RecordValue};

    #[test]
    fn writes_native_encodings_in_declaration_order() {
        let object = ObjectSchema {
            name: "Event".to_string(),
            label: None,
            fields: vec![
                FieldDescriptor::new("Id", FieldType::Identifier),
                FieldDescriptor::new("Subject", FieldType::Text),
                FieldDescriptor::new("Topics", FieldType::MultiSelect),
                FieldDescriptor::new("EventDate", FieldType::Date),
            ],
            validation_rules: Vec::new(),
        };
        let mut record = Record::new();
        record.insert("Subject".to_string(), RecordValue::Text("Kickoff, day 1".to_string()));
        record.insert(
            "Topics".to_string(),
            RecordValue::MultiSelect(vec!["Sales".to_string(), "Ops".to_string()]),
        );
        record.insert(
            "EventDate".to_string(),
            RecordValue::Date(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
        );

        let mut buffer = Vec::new();
        let bytes = write_records(&mut buffer, &object, &[record]).expect("write csv");
        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(
            text,
            "Subject,Topics,EventDate\n\"Kickoff, day 1\",Sales;Ops,2024-02-01\n"
        );
        assert_eq!(bytes, text.len() as u64);
    }
}
