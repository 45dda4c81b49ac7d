//! # Spreadsheet Reading
//!
//! Native readers for the layout workbooks: Office Open XML (`.xlsx`, `.xlsm`, `.xlam`)
//! and OpenDocument (`.ods`). Both parse the zip package with `quick-xml` and hand out
//! one [`Sheet`] of typed cells at a time.
pub mod cell;
pub mod ods;
pub mod reference;
pub mod sheet;
pub mod xlsx;

use crate::error::FieldSegregatorError;
use crate::spreadsheet::ods::OdsSpreadsheet;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::xlsx::XlsxSpreadsheet;
use std::fmt::Display;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// OLE2 compound document signature. Encrypted OOXML packages and legacy `.xls` use it.
const CFB_SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Cannot detect spreadsheet format for '{0}'")]
    UnsupportedFormat(String),

    #[error("Spreadsheet '{0}' is password protected or not a zip package")]
    PasswordProtected(String),

    #[error("Sheet {selector} not found in '{file_name}'")]
    SheetNotFound { file_name: String, selector: String },

    #[error("Missing part '{part}' in '{file_name}'")]
    MissingPart { file_name: String, part: String },

    #[error("Invalid cell value at {file_name}!{sheet_name}!{reference}: {message}")]
    CellValue {
        file_name: String,
        sheet_name: String,
        reference: String,
        message: String,
    },
}

/// Which worksheet of the workbook to read.
#[derive(Clone, Debug, PartialEq)]
pub enum SheetSelector {
    /// 0-based position in workbook order
    Index(usize),
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::Index(0)
    }
}

impl SheetSelector {
    /// Picks the position of the selected sheet among `names`.
    pub(crate) fn position(&self, names: &[String]) -> Option<usize> {
        match self {
            SheetSelector::Index(index) => (*index < names.len()).then_some(*index),
            SheetSelector::Name(name) => names.iter().position(|candidate| candidate == name),
        }
    }
}

impl Display for SheetSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SheetSelector::Index(index) => write!(f, "#{}", index + 1),
            SheetSelector::Name(name) => write!(f, "'{}'", name),
        }
    }
}

/// A workbook opened for reading.
pub trait Spreadsheet {
    /// File name the workbook was opened from
    fn name(&self) -> String;

    /// Worksheet names in workbook order
    fn sheet_names(&self) -> Vec<String>;

    /// Reads every non-empty cell of the selected worksheet.
    fn read_sheet(&mut self, selector: &SheetSelector) -> Result<Sheet, FieldSegregatorError>;
}

/// Opens a workbook, choosing the reader from the file extension.
pub fn open_spreadsheet(file_name: &str) -> Result<Box<dyn Spreadsheet>, FieldSegregatorError> {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase());
    match extension.as_deref() {
        Some("xlsx") | Some("xlsm") | Some("xlam") => {
            check_not_compound_document(file_name)?;
            Ok(Box::new(XlsxSpreadsheet::open(file_name)?))
        }
        Some("ods") => {
            check_not_compound_document(file_name)?;
            Ok(Box::new(OdsSpreadsheet::open(file_name)?))
        }
        _ => Err(SpreadsheetError::UnsupportedFormat(file_name.to_owned()))?,
    }
}

fn check_not_compound_document(file_name: &str) -> Result<(), FieldSegregatorError> {
    let mut header = [0u8; 8];
    let mut file = File::open(file_name)?;
    let read = file.read(&mut header)?;
    if read == header.len() && header == CFB_SIGNATURE {
        Err(SpreadsheetError::PasswordProtected(file_name.to_owned()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn selector_position() {
        let names = vec!["Layout".to_owned(), "Notes".to_owned()];
        assert_eq!(SheetSelector::default().position(&names), Some(0));
        assert_eq!(SheetSelector::Index(1).position(&names), Some(1));
        assert_eq!(SheetSelector::Index(2).position(&names), None);
        assert_eq!(SheetSelector::Name("Notes".to_owned()).position(&names), Some(1));
        assert_eq!(SheetSelector::Name("notes".to_owned()).position(&names), None);
    }

    #[test]
    fn selector_display() {
        assert_eq!(SheetSelector::Index(0).to_string(), "#1");
        assert_eq!(SheetSelector::Name("Layout".to_owned()).to_string(), "'Layout'");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let error = open_spreadsheet("layout.csv").err().unwrap();
        assert!(matches!(
            error,
            FieldSegregatorError::SpreadsheetError(SpreadsheetError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn compound_document_is_rejected() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("locked.xlsx");
        let mut file = File::create(&path).unwrap();
        file.write_all(&CFB_SIGNATURE).unwrap();
        file.write_all(&[0u8; 504]).unwrap();
        drop(file);

        let error = open_spreadsheet(path.to_str().unwrap()).err().unwrap();
        assert!(matches!(
            error,
            FieldSegregatorError::SpreadsheetError(SpreadsheetError::PasswordProtected(_))
        ));
    }
}
