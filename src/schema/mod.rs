//! # Field Layout
//!
//! Field descriptors and the extraction of a named section from a layout workbook.
pub mod extractor;

use crate::spreadsheet::SheetSelector;
use std::collections::HashSet;
use std::ops::Range;
use thiserror::Error;

pub use extractor::ScanState;
pub use extractor::SchemaExtractor;

#[derive(Error, Debug, PartialEq)]
pub enum SchemaError {
    #[error("Could not find the section '{section}' in the file '{file_name}'")]
    SectionNotFound { section: String, file_name: String },

    #[error("Section '{section}' has {count} layout row(s), at least 3 are required")]
    InsufficientFields { section: String, count: usize },

    #[error("No fields left in section '{section}' after dropping {dropped} of the {available} available")]
    AllFieldsDropped { section: String, dropped: usize, available: usize },

    #[error("Malformed layout row {row} in section '{section}': {reason}")]
    MalformedLayoutRow { section: String, row: usize, reason: String },

    #[error("Invalid byte range for field '{field}': {reason}")]
    InvalidByteRange { field: String, reason: String },
}

/// One field of a fixed-width record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Output column header
    pub name: String,
    /// Length column of the layout, informational only
    pub declared_length: Option<usize>,
    /// First byte of the field (1-indexed, inclusive)
    pub byte_start: usize,
    /// Last byte of the field (1-indexed, inclusive)
    pub byte_end: usize,
}

impl FieldDescriptor {
    pub fn new(name: &str, declared_length: Option<usize>, byte_start: usize, byte_end: usize) -> Self {
        FieldDescriptor {
            name: name.to_owned(),
            declared_length,
            byte_start,
            byte_end,
        }
    }

    /// The 0-indexed half-open range `[byte_start - 1, byte_end)`.
    /// A reversed range comes out empty.
    pub fn byte_range(&self) -> Range<usize> {
        let start = self.byte_start.saturating_sub(1);
        start..self.byte_end.max(start)
    }

    /// Checks `1 <= byte_start <= byte_end` and, when present, the declared length.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidByteRange {
            field: self.name.to_owned(),
            reason,
        };
        if self.byte_start == 0 {
            return Err(invalid("byte start must be at least 1".to_owned()));
        }
        if self.byte_start > self.byte_end {
            return Err(invalid(format!(
                "byte start {} is after byte end {}",
                self.byte_start, self.byte_end
            )));
        }
        let width = self.byte_end - self.byte_start + 1;
        match self.declared_length {
            Some(length) if length != width => Err(invalid(format!(
                "declared length {} does not match bytes {}-{} ({} bytes)",
                length, self.byte_start, self.byte_end, width
            ))),
            _ => Ok(()),
        }
    }
}

/// How the layout workbook is read.
#[derive(Clone, Debug)]
pub struct LayoutOptions {
    pub sheet: SheetSelector,
    /// Leading rows consumed as the table caption and never scanned
    pub skip_rows: usize,
    /// Cell texts treated as missing values.
    ///
    /// Only the empty string by default. The tool this replaces also read `NA`, `N/A`,
    /// `#N/A`, `null`, `NaN` and similar literals as missing, so layouts relying on
    /// those markers must list them here.
    pub nulls: HashSet<String>,
    /// Validate every byte range with [`FieldDescriptor::validate`]
    pub strict: bool,
    /// Descriptors dropped from the front after the boundary trim
    pub drop_leading: usize,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        LayoutOptions {
            sheet: SheetSelector::default(),
            skip_rows: 1,
            nulls: HashSet::from([String::new()]),
            strict: false,
            drop_leading: 0,
        }
    }
}
