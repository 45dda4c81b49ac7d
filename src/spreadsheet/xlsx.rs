use crate::error::FieldSegregatorError;
use crate::helpers::xml::XmlAttributeHelper;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::xml::XmlReader;
use crate::helpers::xml::XmlTextContextHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::reference::reference_to_index;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::SheetSelector;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use log::debug;
use quick_xml::events::Event;
use std::borrow::Cow;
use std::collections::HashMap;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use zip::read::ZipFile;
use zip::ZipArchive;

type XlsxZip = ZipArchive<BufReader<File>>;

// Local names of the SpreadsheetML elements the reader cares about
const TAG_RELATIONSHIP: &[u8] = b"Relationship";
const TAG_WORKBOOK_PROPERTIES: &[u8] = b"workbookPr";
const TAG_SHEET: &[u8] = b"sheet";
const TAG_CUSTOM_FORMATS: &[u8] = b"numFmts";
const TAG_CUSTOM_FORMAT: &[u8] = b"numFmt";
const TAG_FORMAT_INDEXES: &[u8] = b"cellXfs";
const TAG_FORMAT_INDEX: &[u8] = b"xf";
const TAG_SHARED_STRING_ITEM: &[u8] = b"si";
const TAG_PHONETIC_TEXT: &[u8] = b"rPh";
const TAG_TEXT: &[u8] = b"t";
const TAG_ROW: &[u8] = b"row";
const TAG_CELL: &[u8] = b"c";
const TAG_INLINE_STRING: &[u8] = b"is";
const TAG_VALUE: &[u8] = b"v";

const WORKBOOK: &str = "xl/workbook.xml";
const WORKBOOK_RELATIONSHIPS: &str = "xl/_rels/workbook.xml.rels";
const STYLES: &str = "xl/styles.xml";
const SHARED_STRINGS: &str = "xl/sharedStrings.xml";

/// An Office Open XML workbook (`.xlsx`, `.xlsm`, `.xlam`).
pub struct XlsxSpreadsheet {
    name: String,
    zip: XlsxZip,
    /// Cell type per style index (`s` attribute of `<c>`)
    number_formats: Vec<CellType>,
    /// (sheet name, part path) in workbook order
    sheets: Vec<(String, String)>,
}

impl XlsxSpreadsheet {
    pub fn open(file_name: &str) -> Result<XlsxSpreadsheet, FieldSegregatorError> {
        let file = File::open(file_name)?;
        let mut zip = ZipArchive::new(BufReader::new(file))?;
        let (sheets, is_1904) = load_workbook(&mut zip, file_name)?;
        let number_formats = load_number_formats(&mut zip, is_1904)?;
        debug!("Opened '{}' with {} worksheet(s)", file_name, sheets.len());
        Ok(XlsxSpreadsheet {
            name: file_name.to_owned(),
            zip,
            number_formats,
            sheets,
        })
    }
}

impl Spreadsheet for XlsxSpreadsheet {
    fn name(&self) -> String {
        self.name.to_owned()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Streams the worksheet part cell by cell, then resolves shared string references.
    fn read_sheet(&mut self, selector: &SheetSelector) -> Result<Sheet, FieldSegregatorError> {
        let position = selector
            .position(&self.sheet_names())
            .ok_or_else(|| SpreadsheetError::SheetNotFound {
                file_name: self.name.to_owned(),
                selector: selector.to_string(),
            })?;
        let (sheet_name, zip_path) = self.sheets[position].clone();
        let mut sheet = Sheet::new(&self.name, &sheet_name);

        let mut reader = self.zip
            .xml_reader(&zip_path)?
            .ok_or_else(|| SpreadsheetError::MissingPart {
                file_name: self.name.to_owned(),
                part: zip_path.to_owned(),
            })?;
        let mut next_row = 0usize;
        let mut next_col = 0usize;
        let mut row = 0usize;
        let mut col = 0usize;
        let mut kind = CellType::default();
        let mut value = String::new();
        match_xml_events!(reader => {
            Event::Start(event) if event.local_name().as_ref() == TAG_ROW => {
                // Rows may omit `r`; they then follow the previous row
                row = event.parse_attribute_value::<usize>("r")?
                    .filter(|number| *number > 0)
                    .map(|number| number - 1)
                    .unwrap_or(next_row);
                next_col = 0;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_ROW => {
                next_row = row + 1;
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_CELL => {
                (row, col) = event.get_attribute_value("r")?
                    .and_then(|reference| reference_to_index(&reference))
                    .unwrap_or((row, next_col));
                next_col = col + 1;
                value.clear();
                kind = match event.get_attribute_value("t")?.as_deref() {
                    Some("inlineStr") | Some("str") => CellType::InlineString,
                    Some("s") => CellType::SharedString,
                    Some("d") => CellType::IsoDateTime,
                    Some("b") => CellType::Boolean,
                    Some("e") => CellType::Error,
                    _ => CellType::Number,
                };
                if kind == CellType::Number {
                    if let Some(style) = event.parse_attribute_value::<usize>("s")? {
                        kind = self.number_formats.get(style).copied().unwrap_or(CellType::Number);
                    }
                }
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_INLINE_STRING => {
                value = read_string_value(&mut reader, TAG_INLINE_STRING, false)?;
            }
            Event::Start(event) if event.local_name().as_ref() == TAG_VALUE => {
                value = read_string_value(&mut reader, TAG_VALUE, true)?;
            }
            Event::End(event) if event.local_name().as_ref() == TAG_CELL => {
                if !value.is_empty() {
                    sheet.push(Cell::new(row, col, kind, &value));
                    value.clear();
                }
            }
        });
        drop(reader);

        self.resolve_shared_strings(&mut sheet)?;
        Ok(sheet)
    }
}

impl XlsxSpreadsheet {
    /// Replaces shared string indexes with their text, loading only the entries in use.
    fn resolve_shared_strings(&mut self, sheet: &mut Sheet) -> Result<(), FieldSegregatorError> {
        let mut indexes = HashSet::<usize>::new();
        for cell in sheet.cells_mut() {
            if cell.kind == CellType::SharedString {
                indexes.insert(cell.value.trim().parse::<usize>()?);
            }
        }
        if indexes.is_empty() {
            return Ok(());
        }

        let strings = load_shared_strings(&mut self.zip, indexes)?;
        let sheet_name = sheet.name.to_owned();
        for cell in sheet.cells_mut() {
            if cell.kind == CellType::SharedString {
                let index = cell.value.trim().parse::<usize>()?;
                let text = strings.get(&index).ok_or_else(|| SpreadsheetError::CellValue {
                    file_name: self.name.to_owned(),
                    sheet_name: sheet_name.to_owned(),
                    reference: cell.reference(),
                    message: format!("shared string #{} does not exist", index),
                })?;
                cell.value = text.to_owned();
                cell.kind = CellType::InlineString;
            }
        }
        Ok(())
    }
}

/// Reads `xl/workbook.xml` for the worksheet list and the date system.
fn load_workbook(zip: &mut XlsxZip, file_name: &str) -> Result<(Vec<(String, String)>, bool), FieldSegregatorError> {
    let relationships = load_relationships(zip, WORKBOOK_RELATIONSHIPS)?;
    let mut reader = zip.xml_reader(WORKBOOK)?.ok_or_else(|| SpreadsheetError::MissingPart {
        file_name: file_name.to_owned(),
        part: WORKBOOK.to_owned(),
    })?;
    let mut sheets = Vec::<(String, String)>::new();
    let mut is_1904 = false;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHEET => {
            let mut name = None::<Cow<str>>;
            let mut id = None::<Cow<str>>;
            for result in event.attributes() {
                let attribute = result?;
                match attribute.key.local_name().as_ref() {
                    b"name" => name = Some(attribute.get_value()?),
                    b"id" => id = Some(attribute.get_value()?),
                    _ => (),
                }
            }
            if let Some((name, id)) = name.zip(id) {
                if let Some(path) = relationships.get(&*id) {
                    sheets.push((name.to_string(), path.to_owned()));
                }
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_WORKBOOK_PROPERTIES => {
            is_1904 = event.get_attribute_value("date1904")?
                .map(|value| value == "1" || value == "true")
                .unwrap_or(false);
        }
    });
    Ok((sheets, is_1904))
}

/// Maps relationship ids to worksheet part paths.
fn load_relationships(zip: &mut XlsxZip, path: &str) -> Result<HashMap<String, String>, FieldSegregatorError> {
    let mut relationships = HashMap::<String, String>::new();
    let mut reader = match zip.xml_reader(path)? {
        Some(reader) => reader,
        None => return Ok(relationships),
    };
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|kind| kind.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Builds the style index to cell type table from `xl/styles.xml`.
fn load_number_formats(zip: &mut XlsxZip, is_1904: bool) -> Result<Vec<CellType>, FieldSegregatorError> {
    let mut reader = match zip.xml_reader(STYLES)? {
        Some(reader) => reader,
        None => return Ok(Vec::new()),
    };

    let mut in_custom_formats = false;
    let mut custom_formats = HashMap::<String, CellType>::new();
    let mut in_format_indexes = false;
    let mut format_indexes = Vec::<String>::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => in_custom_formats = true,
        Event::End(event) if event.local_name().as_ref() == TAG_CUSTOM_FORMATS => in_custom_formats = false,
        Event::Start(event) if in_custom_formats && event.local_name().as_ref() == TAG_CUSTOM_FORMAT => {
            let id = event.get_attribute_value("numFmtId")?;
            let format = event.get_attribute_value("formatCode")?;
            if let Some((id, format)) = id.zip(format) {
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
        }
        Event::Start(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => in_format_indexes = true,
        Event::End(event) if event.local_name().as_ref() == TAG_FORMAT_INDEXES => in_format_indexes = false,
        Event::Start(event) if in_format_indexes && event.local_name().as_ref() == TAG_FORMAT_INDEX => {
            let id = event.get_attribute_value("numFmtId")?.unwrap_or(Cow::Borrowed("0"));
            format_indexes.push(id.to_string());
        }
    });

    Ok(format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect())
}

/// Loads the shared string entries named by `indexes`.
fn load_shared_strings(zip: &mut XlsxZip, mut indexes: HashSet<usize>) -> Result<HashMap<usize, String>, FieldSegregatorError> {
    let mut strings = HashMap::<usize, String>::new();
    let mut reader = match zip.xml_reader(SHARED_STRINGS)? {
        Some(reader) => reader,
        None => return Ok(strings),
    };

    let mut id = 0usize;
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_SHARED_STRING_ITEM => {
            let text = read_string_value(&mut reader, TAG_SHARED_STRING_ITEM, false)?;
            if indexes.remove(&id) {
                strings.insert(id, text);
                if indexes.is_empty() {
                    break;
                }
            }
            id += 1;
        }
    });
    Ok(strings)
}

/// Collects the text of a `<v>`, `<is>` or `<si>` element up to its end tag.
/// Phonetic runs (`<rPh>`) are skipped.
fn read_string_value(
    reader: &mut XmlReader<BufReader<ZipFile<'_, BufReader<File>>>>,
    end_tag: &[u8],
    is_text_content: bool,
) -> Result<String, FieldSegregatorError> {
    let mut is_phonetic_text = false;
    let mut is_text = is_text_content;
    let mut text = String::new();
    match_xml_events!(reader => {
        Event::End(event) if event.local_name().as_ref() == end_tag => break,
        Event::Start(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = true,
        Event::End(event) if event.local_name().as_ref() == TAG_PHONETIC_TEXT => is_phonetic_text = false,
        Event::Start(event) if !is_phonetic_text && event.local_name().as_ref() == TAG_TEXT => is_text = true,
        Event::End(event) if is_text && event.local_name().as_ref() == TAG_TEXT => is_text = is_text_content,
        Event::Text(event) if is_text => text.push_bytes_text(&event)?,
        Event::CData(event) if is_text => text.push_str(&event.xml_content()?),
        Event::GeneralRef(event) if is_text => text.push_bytes_ref(&event)?,
    });
    Ok(text)
}

/// Normalizes a relationship target to a path inside the package.
fn to_zip_path(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_owned()
    } else if target.starts_with("xl/") {
        target.to_owned()
    } else {
        format!("xl/{}", target)
    }
}
