//! Delimited row formatting for segregated records.

use crate::schema::FieldDescriptor;
use std::io::Write;

/// Returns the bytes of `line` covered by `field`.
/// Ranges past the end of the line are clamped, so short lines give short or empty values.
pub fn slice_field<'l>(line: &'l [u8], field: &FieldDescriptor) -> &'l [u8] {
    let range = field.byte_range();
    let start = range.start.min(line.len());
    let end = range.end.min(line.len());
    &line[start..end.max(start)]
}

/// Writes the header row and the data rows of one output file.
pub(crate) struct RecordWriter<'f, W: Write> {
    fields: &'f [FieldDescriptor],
    delimiter: u8,
    writer: W,
    /// Reused for every record
    row: Vec<u8>,
}

impl<'f, W: Write> RecordWriter<'f, W> {
    pub(crate) fn new(fields: &'f [FieldDescriptor], delimiter: u8, writer: W) -> Self {
        RecordWriter {
            fields,
            delimiter,
            writer,
            row: Vec::new(),
        }
    }

    /// Every name is followed by the delimiter, the last one included.
    pub(crate) fn write_header(&mut self) -> std::io::Result<()> {
        for field in self.fields {
            self.writer.write_all(field.name.as_bytes())?;
            self.writer.write_all(&[self.delimiter])?;
        }
        self.writer.write_all(b"\n")
    }

    /// Joins the field slices of `line` and strips every trailing delimiter.
    pub(crate) fn write_record(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.row.clear();
        for field in self.fields {
            self.row.extend_from_slice(slice_field(line, field));
            self.row.push(self.delimiter);
        }
        while self.row.last() == Some(&self.delimiter) {
            self.row.pop();
        }
        self.row.push(b'\n');
        self.writer.write_all(&self.row)
    }

    pub(crate) fn finish(mut self) -> std::io::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}
