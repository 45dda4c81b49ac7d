//! # Fixed-Width Segregation
//!
//! Splits every line of a fixed-width data file into delimited values, one output
//! row per input line, following a list of [`FieldDescriptor`]s.
mod writer;

pub use writer::slice_field;

use crate::error::FieldSegregatorError;
use crate::error::ResultMessage;
use crate::schema::FieldDescriptor;
use log::debug;
use log::info;
use log::warn;
use std::fs;
use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use writer::RecordWriter;

/// Characters trimmed from the end of the input path when deriving the output path
const STRIPPED_SUFFIX_CHARS: [char; 3] = ['.', 't', 'x'];
const OUTPUT_EXTENSION: &str = ".csv";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SegregateOptions {
    /// Single byte written between values
    pub delimiter: u8,
}

impl Default for SegregateOptions {
    fn default() -> Self {
        SegregateOptions { delimiter: b',' }
    }
}

/// Outcome of one segregation run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SegregationReport {
    pub output_path: String,
    /// Data rows written, the header excluded
    pub records: usize,
}

/// Derives the output path by trimming trailing `.`, `t` and `x` characters and appending `.csv`.
///
/// `data.txt` becomes `data.csv`, while `matrix` becomes `matri.csv`.
pub fn default_output_path(input_path: &str) -> String {
    let stem = input_path.trim_end_matches(STRIPPED_SUFFIX_CHARS);
    format!("{}{}", stem, OUTPUT_EXTENSION)
}

/// True when both paths resolve to one existing file.
fn is_same_file(input_path: &str, output_path: &str) -> bool {
    match (fs::canonicalize(input_path), fs::canonicalize(output_path)) {
        (Ok(input), Ok(output)) => input == output,
        _ => false,
    }
}

fn create_output(output_path: &str) -> Result<File, FieldSegregatorError> {
    File::create(output_path)
        .map_err(FieldSegregatorError::from)
        .with_prefix(&format!("Cannot create the output file '{}'", output_path))
}

pub struct FixedWidthSegregator<'f> {
    fields: &'f [FieldDescriptor],
    options: SegregateOptions,
}

impl<'f> FixedWidthSegregator<'f> {
    pub fn new(fields: &'f [FieldDescriptor], options: SegregateOptions) -> Self {
        FixedWidthSegregator { fields, options }
    }

    /// Segregates `input_path` into `output_path`, or into [`default_output_path`] when unset.
    pub fn segregate(&self, input_path: &str, output_path: Option<&str>) -> Result<SegregationReport, FieldSegregatorError> {
        let output_path = output_path
            .map(str::to_owned)
            .unwrap_or_else(|| default_output_path(input_path));
        info!("Segregating the data fields of '{}' into '{}'", input_path, output_path);

        let mut input = File::open(input_path)
            .map_err(FieldSegregatorError::from)
            .with_prefix(&format!("Cannot open the data file '{}'", input_path))?;

        // Creating the output truncates it, so an in-place run must load the input first
        let records = if is_same_file(input_path, &output_path) {
            warn!("'{}' is both the data file and the output, reading it into memory first", input_path);
            let mut content = Vec::new();
            input.read_to_end(&mut content).map_err(FieldSegregatorError::from).with_prefix(input_path)?;
            drop(input);
            let output = create_output(&output_path)?;
            self.segregate_stream(content.as_slice(), BufWriter::new(output))
                .with_prefix(input_path)?
        } else {
            let output = create_output(&output_path)?;
            self.segregate_stream(BufReader::new(input), BufWriter::new(output))
                .with_prefix(input_path)?
        };
        info!("Wrote {} record(s) to '{}'", records, output_path);

        Ok(SegregationReport {
            output_path,
            records,
        })
    }

    /// Writes the header and one row per line of `reader`, returning the number of rows.
    ///
    /// Lines end at `\n`; a trailing `\r` is dropped. A final line without a newline
    /// still counts, but a newline at the very end does not open another record.
    pub fn segregate_stream<R: BufRead, W: Write>(&self, reader: R, writer: W) -> Result<usize, FieldSegregatorError> {
        let mut writer = RecordWriter::new(self.fields, self.options.delimiter, writer);
        writer.write_header()?;

        let mut records = 0usize;
        for line in reader.split(b'\n') {
            let line = line?;
            let line = line.strip_suffix(b"\r").unwrap_or(&line);
            writer.write_record(line)?;
            records += 1;
            if records % 100_000 == 0 {
                debug!("Segregated {} records", records);
            }
        }

        writer.finish()?;
        Ok(records)
    }
}
