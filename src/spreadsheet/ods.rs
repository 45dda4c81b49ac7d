use crate::error::FieldSegregatorError;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SheetSelector;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use quick_xml::events::Event;
use quick_xml::name::QName;
use std::fs::File;
use std::io::BufReader;
use std::io::Read;
use thiserror::Error;
use zip::ZipArchive;

const MIME_TYPE: &[u8] = b"application/vnd.oasis.opendocument.spreadsheet";
const CONTENT: &str = "content.xml";
const MANIFEST: &str = "META-INF/manifest.xml";

const TABLE: QName = QName(b"table:table");
const TABLE_ROW: QName = QName(b"table:table-row");
const TABLE_CELL: QName = QName(b"table:table-cell");
/// Cell hidden under a merged range
const TABLE_COVERED_CELL: QName = QName(b"table:covered-table-cell");
/// Comment attached to a cell
const ANNOTATION: QName = QName(b"office:annotation");
const PARAGRAPH: QName = QName(b"text:p");
/// Run of `text:c` spaces
const SPACES: QName = QName(b"text:s");
const MANIFEST_FILE_ENTRY: QName = QName(b"manifest:file-entry");
const MANIFEST_ENCRYPTION_DATA: QName = QName(b"manifest:encryption-data");

#[derive(Error, Debug)]
pub enum OdsError {
    #[error("Invalid ODS MIME type")]
    MimeType,
}

/// An OpenDocument spreadsheet (`.ods`).
pub struct OdsSpreadsheet {
    name: String,
    zip: ZipArchive<BufReader<File>>,
    sheets: Vec<String>,
}

impl OdsSpreadsheet {
    pub fn open(file_name: &str) -> Result<Self, FieldSegregatorError> {
        let file = File::open(file_name)?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;
        check_mime(&mut zip)?;
        if is_password_protected(&mut zip)? {
            Err(SpreadsheetError::PasswordProtected(file_name.to_owned()))?;
        }
        let sheets = load_table_names(&mut zip, file_name)?;
        debug!("Opened '{}' with {} table(s)", file_name, sheets.len());
        Ok(OdsSpreadsheet {
            name: file_name.to_owned(),
            zip,
            sheets,
        })
    }
}

impl Spreadsheet for OdsSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.clone()
    }

    /// Reads the selected `table:table`, expanding repeated rows and columns.
    fn read_sheet(&mut self, selector: &SheetSelector) -> Result<Sheet, FieldSegregatorError> {
        let position = selector
            .position(&self.sheets)
            .ok_or_else(|| SpreadsheetError::SheetNotFound {
                file_name: self.name.to_owned(),
                selector: selector.to_string(),
            })?;
        let mut sheet = Sheet::new(&self.name, &self.sheets[position]);
        let mut reader = self.zip
            .xml_reader(CONTENT)?
            .ok_or_else(|| SpreadsheetError::MissingPart {
                file_name: self.name.to_owned(),
                part: CONTENT.to_owned(),
            })?;

        // Skip to the start of the selected table
        let mut table = 0usize;
        let mut found = false;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == TABLE => {
                if table == position {
                    found = true;
                    break;
                }
                table += 1;
            }
        });
        if !found {
            Err(SpreadsheetError::MissingPart {
                file_name: self.name.to_owned(),
                part: format!("{}#{}", CONTENT, sheet.name),
            })?;
        }

        let mut row = 0usize;
        let mut col = 0usize;
        let mut row_count = 1usize;
        let mut col_count = 1usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        let mut in_text = false;
        let mut in_annotation = false;
        // Only character data inside `text:p` is cell content
        let mut paragraph_depth = 0usize;
        let mut depth = 0usize;
        match_xml_events!(reader => {
            // Nested tables (e.g. inside shapes) must not end the scan early
            Event::Start(event) if event.name() == TABLE => depth += 1,
            Event::End(event) if event.name() == TABLE => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Start(event) if depth == 0 && event.name() == TABLE_ROW => {
                row_count = event.parse_attribute_value("table:number-rows-repeated")?.unwrap_or(1);
                col = 0;
            }
            Event::End(event) if depth == 0 && event.name() == TABLE_ROW => row += row_count,
            Event::Start(event) if depth == 0 && (event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL) => {
                value.clear();
                col_count = event.parse_attribute_value("table:number-columns-repeated")?.unwrap_or(1);
                let value_type = event.get_attribute_value("office:value-type")?.map(|value_type| value_type.to_string());
                kind = match value_type.as_deref() {
                    Some("boolean") => CellType::Boolean,
                    Some("date") => CellType::IsoDateTime,
                    Some("time") => CellType::IsoDuration,
                    Some("string") => {
                        let is_error = event.get_attribute_value("calcext:value-type")?
                            .map(|calc_type| calc_type == "error")
                            .unwrap_or(false);
                        if is_error { CellType::Error } else { CellType::InlineString }
                    }
                    Some(_) => CellType::Number,
                    None => CellType::Empty,
                };
                in_text = kind == CellType::InlineString || kind == CellType::Error;
                let attribute = match value_type.as_deref() {
                    Some("boolean") => Some("office:boolean-value"),
                    Some("date") => Some("office:date-value"),
                    Some("time") => Some("office:time-value"),
                    Some("string") | None => None,
                    Some(_) => Some("office:value"),
                };
                if let Some(attribute) = attribute {
                    if let Some(data) = event.get_attribute_value(attribute)? {
                        if kind == CellType::Boolean {
                            value.push_str(if data == "true" || data == "1" { "1" } else { "0" });
                        } else {
                            value.push_str(&data);
                        }
                    }
                }
            }
            Event::End(event) if depth == 0 && (event.name() == TABLE_CELL || event.name() == TABLE_COVERED_CELL) => {
                if kind != CellType::Empty && !value.is_empty() {
                    for row_offset in 0..row_count {
                        for col_offset in 0..col_count {
                            sheet.push(Cell::new(row + row_offset, col + col_offset, kind, &value));
                        }
                    }
                }
                col += col_count;
                kind = CellType::Empty;
                in_text = false;
                in_annotation = false;
                paragraph_depth = 0;
            }
            Event::Start(event) if in_text && event.name() == ANNOTATION => in_annotation = true,
            Event::End(event) if in_text && event.name() == ANNOTATION => in_annotation = false,
            Event::Start(event) if in_text && !in_annotation && event.name() == PARAGRAPH => {
                if paragraph_depth == 0 && !value.is_empty() {
                    value.push('\n');
                }
                paragraph_depth += 1;
            }
            Event::End(event) if in_text && !in_annotation && event.name() == PARAGRAPH => {
                paragraph_depth = paragraph_depth.saturating_sub(1);
            }
            Event::Start(event) if in_text && !in_annotation && paragraph_depth > 0 && event.name() == SPACES => {
                let count = event.parse_attribute_value("text:c")?.unwrap_or(1usize);
                value.extend(std::iter::repeat(' ').take(count));
            }
            Event::Text(event) if in_text && !in_annotation && paragraph_depth > 0 => value.push_bytes_text(&event)?,
            Event::GeneralRef(event) if in_text && !in_annotation && paragraph_depth > 0 => value.push_bytes_ref(&event)?,
        });

        Ok(sheet)
    }
}

/// Lists the `table:name` of every top-level table in `content.xml`.
fn load_table_names(zip: &mut ZipArchive<BufReader<File>>, file_name: &str) -> Result<Vec<String>, FieldSegregatorError> {
    let mut reader = zip.xml_reader(CONTENT)?.ok_or_else(|| SpreadsheetError::MissingPart {
        file_name: file_name.to_owned(),
        part: CONTENT.to_owned(),
    })?;
    let mut names = Vec::<String>::new();
    let mut depth = 0usize;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == TABLE => {
            if depth == 0 {
                let name = event.get_attribute_value("table:name")?
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| format!("Sheet{}", names.len() + 1));
                names.push(name);
            }
            depth += 1;
        }
        Event::End(event) if event.name() == TABLE => depth = depth.saturating_sub(1),
    });
    Ok(names)
}

fn check_mime(zip: &mut ZipArchive<BufReader<File>>) -> Result<(), FieldSegregatorError> {
    if let Some(mut file) = zip.file("mimetype")? {
        let mut buffer = Vec::with_capacity(MIME_TYPE.len());
        file.read_to_end(&mut buffer)?;
        if buffer.trim_ascii() != MIME_TYPE {
            Err(OdsError::MimeType)?;
        }
    }
    Ok(())
}

/// Encrypted packages declare `manifest:encryption-data` on their file entries.
fn is_password_protected(zip: &mut ZipArchive<BufReader<File>>) -> Result<bool, FieldSegregatorError> {
    let mut reader = match zip.xml_reader(MANIFEST)? {
        Some(reader) => reader,
        None => return Ok(false),
    };
    let mut in_file_entry = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.name() == MANIFEST_FILE_ENTRY => in_file_entry = true,
        Event::End(event) if event.name() == MANIFEST_FILE_ENTRY => in_file_entry = false,
        Event::Start(event) if in_file_entry && event.name() == MANIFEST_ENCRYPTION_DATA => return Ok(true),
    });
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    const NAMESPACES: &str = concat!(
        r#"xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" "#,
        r#"xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" "#,
        r#"xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0""#,
    );

    fn write_ods(path: &std::path::Path, tables: &str) {
        let mut zip = ZipWriter::new(File::create(path).unwrap());
        zip.start_file("mimetype", SimpleFileOptions::default()).unwrap();
        zip.write_all(MIME_TYPE).unwrap();
        zip.start_file(CONTENT, SimpleFileOptions::default()).unwrap();
        let content = format!(
            "<office:document-content {}><office:body><office:spreadsheet>{}</office:spreadsheet></office:body></office:document-content>",
            NAMESPACES, tables
        );
        zip.write_all(content.as_bytes()).unwrap();
        zip.finish().unwrap();
    }

    fn read_first_sheet(tables: &str) -> Sheet {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("layout.ods");
        write_ods(&path, tables);
        let mut spreadsheet = OdsSpreadsheet::open(path.to_str().unwrap()).unwrap();
        spreadsheet.read_sheet(&SheetSelector::default()).unwrap()
    }

    fn value(sheet: &Sheet, row: usize, col: usize) -> Option<&str> {
        sheet.get(row, col).map(|cell| cell.value.as_str())
    }

    #[test]
    fn indentation_between_tags_is_not_cell_text() {
        let sheet = read_first_sheet(
            r#"
  <table:table table:name="Layout">
    <table:table-row>
      <table:table-cell office:value-type="string">
        <text:p>DEMO</text:p>
      </table:table-cell>
      <table:table-cell office:value-type="float" office:value="6">
        <text:p>6</text:p>
      </table:table-cell>
    </table:table-row>
  </table:table>
"#,
        );

        assert_eq!(value(&sheet, 0, 0), Some("DEMO"));
        assert_eq!(value(&sheet, 0, 1), Some("6"));
    }

    #[test]
    fn paragraphs_spaces_and_annotations() {
        let sheet = read_first_sheet(concat!(
            r#"<table:table table:name="Layout"><table:table-row>"#,
            r#"<table:table-cell office:value-type="string">"#,
            r#"<office:annotation><text:p>reviewed</text:p></office:annotation>"#,
            r#"<text:p>first<text:s text:c="2"/>line</text:p>"#,
            "\n  ",
            r#"<text:p>second &amp; last</text:p>"#,
            r#"</table:table-cell></table:table-row></table:table>"#,
        ));

        assert_eq!(value(&sheet, 0, 0), Some("first  line\nsecond & last"));
    }

    #[test]
    fn repeated_rows_and_columns_are_expanded() {
        let sheet = read_first_sheet(concat!(
            r#"<table:table table:name="Layout">"#,
            r#"<table:table-row table:number-rows-repeated="2">"#,
            r#"<table:table-cell table:number-columns-repeated="2"/>"#,
            r#"<table:table-cell office:value-type="string" table:number-columns-repeated="2"><text:p>x</text:p></table:table-cell>"#,
            r#"</table:table-row></table:table>"#,
        ));

        assert_eq!(value(&sheet, 0, 0), None);
        assert_eq!(value(&sheet, 0, 2), Some("x"));
        assert_eq!(value(&sheet, 1, 3), Some("x"));
        assert_eq!(sheet.row_count(), 2);
        assert_eq!(sheet.col_count(), 4);
    }

    #[test]
    fn wrong_mime_type_is_rejected() {
        let directory = tempfile::tempdir().unwrap();
        let path = directory.path().join("other.ods");
        let mut zip = ZipWriter::new(File::create(&path).unwrap());
        zip.start_file("mimetype", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"application/zip").unwrap();
        zip.finish().unwrap();

        let error = OdsSpreadsheet::open(path.to_str().unwrap()).err().unwrap();
        assert!(matches!(error, FieldSegregatorError::OdsError(OdsError::MimeType)));
    }
}
