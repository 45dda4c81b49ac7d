//! # Field Segregator
//!
//! Splits fixed-width text records into delimited rows. The byte layout of each
//! record is read from a named section of a spreadsheet.
//!
//! ## Features
//!
//! - **Native spreadsheet reading**: Office Open XML (`.xlsx`, `.xlsm`, `.xlam`) and
//!   OpenDocument (`.ods`) workbooks, parsed straight from the zip package
//! - **Section extraction**: locate a layout section by name and turn its rows into
//!   [`FieldDescriptor`]s
//! - **Streaming segregation**: the data file is processed one line at a time and
//!   bytes are copied verbatim, so any encoding passes through
//! - **Optional strict mode**: reject reversed byte ranges and mismatched lengths
//!
//! ## Example
//!
//! ```no_run
//! use field_segregator::{segregate_fields, LayoutOptions, SegregateOptions};
//!
//! let report = segregate_fields(
//!     "layout.xlsx",
//!     "DEMO",
//!     "records.txt",
//!     None,
//!     &LayoutOptions::default(),
//!     SegregateOptions::default(),
//! )?;
//! println!("{} records written to {}", report.records, report.output_path);
//! # Ok::<(), field_segregator::FieldSegregatorError>(())
//! ```
pub mod error;
mod helpers;
pub mod schema;
pub mod segregator;
pub mod spreadsheet;

pub use crate::error::FieldSegregatorError;
pub use crate::schema::FieldDescriptor;
pub use crate::schema::LayoutOptions;
pub use crate::schema::SchemaError;
pub use crate::schema::SchemaExtractor;
pub use crate::segregator::FixedWidthSegregator;
pub use crate::segregator::SegregateOptions;
pub use crate::segregator::SegregationReport;
pub use crate::spreadsheet::SheetSelector;

/// Extracts the fields of `section_name` from `schema_source`, then segregates `data_path`.
pub fn segregate_fields(
    schema_source: &str,
    section_name: &str,
    data_path: &str,
    output_path: Option<&str>,
    layout: &LayoutOptions,
    options: SegregateOptions,
) -> Result<SegregationReport, FieldSegregatorError> {
    let fields = SchemaExtractor::new(layout.clone()).extract(schema_source, section_name)?;
    FixedWidthSegregator::new(&fields, options).segregate(data_path, output_path)
}
