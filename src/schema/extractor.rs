use crate::error::FieldSegregatorError;
use crate::schema::FieldDescriptor;
use crate::schema::LayoutOptions;
use crate::schema::SchemaError;
use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::sheet::Sheet;
use log::debug;
use log::info;
use log::warn;

/// Section header on entry, blank on the terminator row
const MARKER_COL: usize = 0;
const NAME_COL: usize = 1;
const LENGTH_COL: usize = 4;
const START_COL: usize = 5;
const END_COL: usize = 6;

/// Position of the scan relative to the requested section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanState {
    /// Section header not seen yet
    Searching,
    /// Collecting layout rows
    InSection,
    /// Terminator row collected
    Done,
}

/// Cells of one row inside a section, before conversion.
#[derive(Debug)]
struct LayoutRow<'a> {
    /// 0-based sheet row
    row: usize,
    name: Option<&'a Cell>,
    declared_length: Option<&'a Cell>,
    byte_start: Option<&'a Cell>,
    byte_end: Option<&'a Cell>,
}

impl<'a> LayoutRow<'a> {
    fn read(sheet: &'a Sheet, row: usize) -> Self {
        LayoutRow {
            row,
            name: sheet.get(row, NAME_COL),
            declared_length: sheet.get(row, LENGTH_COL),
            byte_start: sheet.get(row, START_COL),
            byte_end: sheet.get(row, END_COL),
        }
    }
}

/// Reads the field layout of one named section from a layout workbook.
///
/// A section starts at the row whose first cell equals the section name and runs
/// to the next row whose first cell is blank. Every row in between, plus the
/// terminator, is collected; the first and the last collected rows are then
/// discarded as boundary rows and the rest become [`FieldDescriptor`]s.
pub struct SchemaExtractor {
    options: LayoutOptions,
}

impl SchemaExtractor {
    pub fn new(options: LayoutOptions) -> Self {
        SchemaExtractor { options }
    }

    pub fn options(&self) -> &LayoutOptions {
        &self.options
    }

    /// Opens `schema_source` and extracts `section_name` from the configured sheet.
    pub fn extract(&self, schema_source: &str, section_name: &str) -> Result<Vec<FieldDescriptor>, FieldSegregatorError> {
        info!("Parsing the field layout from '{}'", schema_source);
        let mut spreadsheet = open_spreadsheet(schema_source)?;
        let sheet = spreadsheet.read_sheet(&self.options.sheet)?;
        if sheet.is_empty() {
            warn!("Sheet '{}' of '{}' has no cells", sheet.name, spreadsheet.name());
        }
        debug!(
            "Read sheet '{}' with {} row(s) and {} column(s)",
            sheet.name,
            sheet.row_count(),
            sheet.col_count()
        );
        self.extract_from_sheet(&sheet, section_name)
    }

    /// Extracts `section_name` from an already loaded sheet.
    pub fn extract_from_sheet(&self, sheet: &Sheet, section_name: &str) -> Result<Vec<FieldDescriptor>, FieldSegregatorError> {
        let collected = self.scan(sheet, section_name)?;
        if collected.len() < 3 {
            Err(SchemaError::InsufficientFields {
                section: section_name.to_owned(),
                count: collected.len(),
            })?;
        }

        let boundary_trimmed = &collected[1..collected.len() - 1];
        if self.options.drop_leading >= boundary_trimmed.len() {
            Err(SchemaError::AllFieldsDropped {
                section: section_name.to_owned(),
                dropped: self.options.drop_leading,
                available: boundary_trimmed.len(),
            })?;
        }
        let kept = boundary_trimmed.iter().skip(self.options.drop_leading);
        let mut fields = Vec::with_capacity(boundary_trimmed.len());
        for layout_row in kept {
            let field = self.to_descriptor(layout_row, section_name)?;
            if self.options.strict {
                field.validate()?;
            }
            debug!(
                "Field '{}' at bytes {}-{}",
                field.name, field.byte_start, field.byte_end
            );
            fields.push(field);
        }

        info!("Extracted {} field(s) from section '{}'", fields.len(), section_name);
        Ok(fields)
    }

    /// Walks the sheet from `skip_rows` and collects the section rows, terminator included.
    fn scan<'a>(&self, sheet: &'a Sheet, section_name: &str) -> Result<Vec<LayoutRow<'a>>, FieldSegregatorError> {
        let mut state = ScanState::Searching;
        let mut collected = Vec::new();
        for row in self.options.skip_rows..sheet.row_count() {
            let marker = sheet.get(row, MARKER_COL);
            state = match state {
                ScanState::Searching if marker.is_some_and(|cell| is_section_header(cell, section_name)) => {
                    info!("Found the section '{}' at row {}", section_name, row + 1);
                    ScanState::InSection
                }
                ScanState::Searching => ScanState::Searching,
                ScanState::InSection => {
                    collected.push(LayoutRow::read(sheet, row));
                    if marker.map_or(true, |cell| cell.is_blank(&self.options.nulls)) {
                        info!("Finished scanning the section at row {}", row + 1);
                        ScanState::Done
                    } else {
                        ScanState::InSection
                    }
                }
                ScanState::Done => ScanState::Done,
            };
            if state == ScanState::Done {
                break;
            }
        }

        if state != ScanState::Done {
            Err(SchemaError::SectionNotFound {
                section: section_name.to_owned(),
                file_name: sheet.file_name.to_owned(),
            })?;
        }
        Ok(collected)
    }

    fn to_descriptor(&self, layout_row: &LayoutRow, section_name: &str) -> Result<FieldDescriptor, SchemaError> {
        let malformed = |reason: String| SchemaError::MalformedLayoutRow {
            section: section_name.to_owned(),
            row: layout_row.row + 1,
            reason,
        };

        let name = layout_row
            .name
            .filter(|cell| !cell.is_blank(&self.options.nulls))
            .map(|cell| cell.to_string())
            .ok_or_else(|| malformed("missing field name".to_owned()))?;
        let byte_start = to_position(layout_row.byte_start, "byte start").map_err(&malformed)?;
        let byte_end = to_position(layout_row.byte_end, "byte end").map_err(&malformed)?;

        let declared_length = match layout_row.declared_length {
            Some(cell) if !cell.is_blank(&self.options.nulls) => match cell.to_whole_number() {
                Ok(length) if length >= 0 => Some(length as usize),
                Ok(length) => {
                    warn!("Ignoring negative length {} of field '{}' at {}", length, name, cell.reference());
                    None
                }
                Err(message) => {
                    warn!("Ignoring the length of field '{}' at {}: {}", name, cell.reference(), message);
                    None
                }
            },
            _ => None,
        };

        Ok(FieldDescriptor {
            name,
            declared_length,
            byte_start,
            byte_end,
        })
    }
}

fn is_section_header(cell: &Cell, section_name: &str) -> bool {
    matches!(cell.kind, CellType::InlineString | CellType::SharedString) && cell.value == section_name
}

fn to_position(cell: Option<&Cell>, label: &str) -> Result<usize, String> {
    let cell = cell.ok_or_else(|| format!("missing {}", label))?;
    match cell.to_whole_number() {
        Ok(position) if position >= 1 => Ok(position as usize),
        Ok(position) => Err(format!("{} {} at {} must be at least 1", label, position, cell.reference())),
        Err(message) => Err(format!("{} at {}: {}", label, cell.reference(), message)),
    }
}
