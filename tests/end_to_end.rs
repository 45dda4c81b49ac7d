use field_segregator::schema::SchemaError;
use field_segregator::segregate_fields;
use field_segregator::spreadsheet::SpreadsheetError;
use field_segregator::FieldDescriptor;
use field_segregator::FieldSegregatorError;
use field_segregator::LayoutOptions;
use field_segregator::SchemaExtractor;
use field_segregator::SegregateOptions;
use field_segregator::SheetSelector;
use std::fs;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::CompressionMethod;
use zip::ZipWriter;

#[derive(Clone, Copy)]
enum Value {
    Empty,
    /// Stored in the shared string table of xlsx packages
    Text(&'static str),
    /// Stored inline in xlsx packages
    Inline(&'static str),
    Number(usize),
}

use Value::*;

/// Columns A to G: marker, name, two unused columns, length, start, end.
fn layout_rows() -> Vec<Vec<Value>> {
    vec![
        vec![Text("Section"), Text("Field"), Empty, Empty, Text("Length"), Text("Start"), Text("End")],
        vec![Text("OTHER")],
        vec![Inline("x"), Text("Z"), Empty, Empty, Number(2), Number(1), Number(2)],
        vec![],
        vec![Text("DEMO")],
        vec![Inline("x"), Text("A"), Empty, Empty, Number(5), Number(1), Number(5)],
        vec![Inline("x"), Text("B"), Empty, Empty, Number(5), Number(6), Number(10)],
        vec![Inline("x"), Inline("C"), Empty, Empty, Number(5), Number(11), Number(15)],
        vec![Inline("x"), Text("D"), Empty, Empty, Text("five"), Text("16"), Number(20)],
        vec![Empty, Text("notes")],
        vec![Text("LAST")],
    ]
}

fn column_letter(col: usize) -> char {
    (b'A' + col as u8) as char
}

fn write_package(path: &Path, parts: &[(&str, String)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, content) in parts {
        let options = if *name == "mimetype" {
            SimpleFileOptions::default().compression_method(CompressionMethod::Stored)
        } else {
            SimpleFileOptions::default()
        };
        zip.start_file(*name, options).unwrap();
        zip.write_all(content.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn write_xlsx(path: &Path, rows: &[Vec<Value>]) {
    let mut shared_strings = Vec::<&str>::new();
    let mut sheet_data = String::new();
    for (row, values) in rows.iter().enumerate() {
        sheet_data.push_str(&format!("<row r=\"{}\">", row + 1));
        for (col, value) in values.iter().enumerate() {
            let reference = format!("{}{}", column_letter(col), row + 1);
            match value {
                Empty => (),
                Text(text) => {
                    sheet_data.push_str(&format!("<c r=\"{}\" t=\"s\"><v>{}</v></c>", reference, shared_strings.len()));
                    shared_strings.push(*text);
                }
                Inline(text) => {
                    sheet_data.push_str(&format!("<c r=\"{}\" t=\"inlineStr\"><is><t>{}</t></is></c>", reference, text));
                }
                Number(number) => {
                    sheet_data.push_str(&format!("<c r=\"{}\"><v>{}</v></c>", reference, number));
                }
            }
        }
        sheet_data.push_str("</row>");
    }

    let items: String = shared_strings
        .iter()
        .map(|text| format!("<si><t>{}</t></si>", text))
        .collect();
    write_package(path, &[
        ("xl/workbook.xml", r#"<?xml version="1.0" encoding="UTF-8"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<sheets><sheet name="Layout" sheetId="1" r:id="rId1"/></sheets>
</workbook>"#.to_owned()),
        ("xl/_rels/workbook.xml.rels", r#"<?xml version="1.0" encoding="UTF-8"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet1.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/sharedStrings" Target="sharedStrings.xml"/>
</Relationships>"#.to_owned()),
        ("xl/worksheets/sheet1.xml", format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{}</sheetData></worksheet>"#,
            sheet_data
        )),
        ("xl/sharedStrings.xml", format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="{0}" uniqueCount="{0}">{1}</sst>"#,
            shared_strings.len(),
            items
        )),
    ]);
}

/// Writes an ods package whose first table is a short note and whose second table holds `rows`.
fn write_ods(path: &Path, rows: &[Vec<Value>]) {
    let mut table = String::new();
    for values in rows {
        table.push_str("<table:table-row>");
        let mut empty_run = 0usize;
        for value in values {
            let text = match value {
                Empty => {
                    empty_run += 1;
                    continue;
                }
                Text(text) | Inline(text) => format!(
                    "<table:table-cell office:value-type=\"string\"><text:p>{}</text:p></table:table-cell>",
                    text
                ),
                Number(number) => format!(
                    "<table:table-cell office:value-type=\"float\" office:value=\"{0}\"><text:p>{0}</text:p></table:table-cell>",
                    number
                ),
            };
            if empty_run > 0 {
                table.push_str(&format!("<table:table-cell table:number-columns-repeated=\"{}\"/>", empty_run));
                empty_run = 0;
            }
            table.push_str(&text);
        }
        table.push_str("<table:table-cell table:number-columns-repeated=\"1017\"/></table:table-row>");
    }

    write_package(path, &[
        ("mimetype", "application/vnd.oasis.opendocument.spreadsheet".to_owned()),
        ("META-INF/manifest.xml", r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0">
<manifest:file-entry manifest:full-path="/" manifest:media-type="application/vnd.oasis.opendocument.spreadsheet"/>
<manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
</manifest:manifest>"#.to_owned()),
        ("content.xml", format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:table="urn:oasis:names:tc:opendocument:xmlns:table:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0">
<office:body><office:spreadsheet>
<table:table table:name="Notes"><table:table-row><table:table-cell office:value-type="string"><text:p>Read me</text:p></table:table-cell></table:table-row></table:table>
<table:table table:name="Layout">{}<table:table-row table:number-rows-repeated="1048000"><table:table-cell table:number-columns-repeated="1024"/></table:table-row></table:table>
</office:spreadsheet></office:body>
</office:document-content>"#,
            table
        )),
    ]);
}

struct Fixture {
    directory: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Fixture {
            directory: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.directory.path().join(name)
    }

    fn xlsx(&self) -> String {
        let path = self.path("layout.xlsx");
        write_xlsx(&path, &layout_rows());
        path.to_str().unwrap().to_owned()
    }

    fn ods(&self) -> String {
        let path = self.path("layout.ods");
        write_ods(&path, &layout_rows());
        path.to_str().unwrap().to_owned()
    }

    fn data(&self, content: &str) -> String {
        let path = self.path("records.txt");
        fs::write(&path, content).unwrap();
        path.to_str().unwrap().to_owned()
    }
}

fn expected_fields() -> Vec<FieldDescriptor> {
    vec![
        FieldDescriptor::new("B", Some(5), 6, 10),
        FieldDescriptor::new("C", Some(5), 11, 15),
        FieldDescriptor::new("D", None, 16, 20),
    ]
}

fn layout_sheet() -> LayoutOptions {
    LayoutOptions {
        sheet: SheetSelector::Name("Layout".to_owned()),
        ..LayoutOptions::default()
    }
}

#[test]
fn extracts_section_from_xlsx() {
    let fixture = Fixture::new();

    let fields = SchemaExtractor::new(LayoutOptions::default())
        .extract(&fixture.xlsx(), "DEMO")
        .unwrap();

    assert_eq!(fields, expected_fields());
}

#[test]
fn extracts_section_from_ods() {
    let fixture = Fixture::new();

    let fields = SchemaExtractor::new(layout_sheet()).extract(&fixture.ods(), "DEMO").unwrap();

    assert_eq!(fields, expected_fields());
}

#[test]
fn ods_reads_the_first_table_by_default() {
    let fixture = Fixture::new();

    let error = SchemaExtractor::new(LayoutOptions::default())
        .extract(&fixture.ods(), "DEMO")
        .unwrap_err();

    assert!(matches!(
        error,
        FieldSegregatorError::SchemaError(SchemaError::SectionNotFound { .. })
    ));
}

#[test]
fn unknown_sheet_is_reported() {
    let fixture = Fixture::new();
    let options = LayoutOptions {
        sheet: SheetSelector::Name("Missing".to_owned()),
        ..LayoutOptions::default()
    };

    let error = SchemaExtractor::new(options).extract(&fixture.xlsx(), "DEMO").unwrap_err();

    assert!(matches!(
        error,
        FieldSegregatorError::SpreadsheetError(SpreadsheetError::SheetNotFound { .. })
    ));
}

#[test]
fn missing_section_names_the_source() {
    let fixture = Fixture::new();
    let source = fixture.xlsx();

    let error = SchemaExtractor::new(LayoutOptions::default())
        .extract(&source, "NOPE")
        .unwrap_err();

    assert_eq!(
        error.to_string(),
        format!("Could not find the section 'NOPE' in the file '{}'", source)
    );
}

#[test]
fn section_without_enough_rows_fails() {
    let fixture = Fixture::new();

    // OTHER collects its single field and the blank row after it
    let error = SchemaExtractor::new(LayoutOptions::default())
        .extract(&fixture.xlsx(), "OTHER")
        .unwrap_err();

    assert!(matches!(
        error,
        FieldSegregatorError::SchemaError(SchemaError::InsufficientFields { count: 2, .. })
    ));
}

#[test]
fn segregates_data_with_default_output_path() {
    let fixture = Fixture::new();
    let data = fixture.data("AAAAABBBBBCCCCCDDDDD\nAAAAAbbbbbccccc\nAAAAA\n");

    let report = segregate_fields(
        &fixture.xlsx(),
        "DEMO",
        &data,
        None,
        &LayoutOptions::default(),
        SegregateOptions::default(),
    )
    .unwrap();

    let expected_path = fixture.path("records.csv");
    assert_eq!(report.output_path, expected_path.to_str().unwrap());
    assert_eq!(report.records, 3);
    assert_eq!(
        fs::read_to_string(expected_path).unwrap(),
        "B,C,D,\nBBBBB,CCCCC,DDDDD\nbbbbb,ccccc\n\n"
    );
}

#[test]
fn segregates_data_from_ods_with_explicit_output() {
    let fixture = Fixture::new();
    let data = fixture.data("AAAAABBBBBCCCCCDDDDD\r\nAAAAA1234567890");
    let output = fixture.path("out.tsv");

    let report = segregate_fields(
        &fixture.ods(),
        "DEMO",
        &data,
        output.to_str(),
        &layout_sheet(),
        SegregateOptions { delimiter: b'\t' },
    )
    .unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(
        fs::read_to_string(output).unwrap(),
        "B\tC\tD\t\nBBBBB\tCCCCC\tDDDDD\n12345\t67890\n"
    );
}

#[test]
fn strict_mode_accepts_consistent_layout() {
    let fixture = Fixture::new();
    let options = LayoutOptions {
        strict: true,
        ..LayoutOptions::default()
    };

    let fields = SchemaExtractor::new(options).extract(&fixture.xlsx(), "DEMO").unwrap();

    assert_eq!(fields.len(), 3);
}
