//! CLI tool to split a fixed-width data file using a layout section from a spreadsheet.
//!
//! Usage:
//!   sep_fields -e <layout.xlsx> -s <SECTION> -d <records.txt>
//!   sep_fields -e <layout.ods> -s <SECTION> -d <records.txt> -o <output.csv>
//!
//! Without `-o` the output lands next to the data file with a `.csv` extension.

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use env_logger::Env;
use field_segregator::FixedWidthSegregator;
use field_segregator::LayoutOptions;
use field_segregator::SchemaExtractor;
use field_segregator::SegregateOptions;
use field_segregator::SegregationReport;
use field_segregator::SheetSelector;
use log::info;
use std::process;

/// Segregate the fields of a fixed-width text file into a delimited file.
#[derive(Parser)]
#[command(name = "sep_fields", version)]
struct Cli {
    /// Spreadsheet holding the field layout (.xlsx, .xlsm, .xlam, .ods)
    #[arg(short = 'e', long = "excel")]
    schema: String,

    /// Layout section to use (case-sensitive)
    #[arg(short, long)]
    section: String,

    /// Fixed-width data file
    #[arg(short, long)]
    data: String,

    /// Output file (default: the data file name with a .csv extension)
    #[arg(short, long)]
    output: Option<String>,

    /// Worksheet to read instead of the first one
    #[arg(long)]
    sheet: Option<String>,

    /// Leading rows to ignore before scanning
    #[arg(long, default_value_t = 1)]
    skip_rows: usize,

    /// Cell text treated as blank, in addition to the empty string.
    /// The previous tool also took NA, N/A, #N/A, null and NaN as blank;
    /// pass them again (--null NA --null N/A ...) to keep that behaviour
    #[arg(long = "null", value_name = "TEXT")]
    nulls: Vec<String>,

    /// Reject reversed byte ranges and lengths that disagree with them
    #[arg(long)]
    strict: bool,

    /// Fields to drop from the front of the section after the boundary trim.
    /// The previous tool always dropped 1; pass --drop-leading 1 to match its output
    #[arg(long, default_value_t = 0)]
    drop_leading: usize,

    /// Single ASCII character written between values
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    delimiter: u8,
}

impl Cli {
    fn layout_options(&self) -> LayoutOptions {
        let defaults = LayoutOptions::default();
        let mut nulls = defaults.nulls;
        nulls.extend(self.nulls.iter().cloned());
        LayoutOptions {
            sheet: self
                .sheet
                .as_ref()
                .map(|name| SheetSelector::Name(name.to_owned()))
                .unwrap_or(defaults.sheet),
            skip_rows: self.skip_rows,
            nulls,
            strict: self.strict,
            drop_leading: self.drop_leading,
        }
    }
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value.as_bytes() {
        [byte] if byte.is_ascii() && *byte != b'\n' && *byte != b'\r' => Ok(*byte),
        _ => Err(format!("'{}' is not a single ASCII character", value)),
    }
}

fn run(cli: &Cli) -> Result<SegregationReport> {
    let section = cli.section.trim();
    let extractor = SchemaExtractor::new(cli.layout_options());
    let fields = extractor
        .extract(&cli.schema, section)
        .with_context(|| format!("Cannot read section '{}' from '{}'", section, cli.schema))?;

    let options = SegregateOptions {
        delimiter: cli.delimiter,
    };
    let report = FixedWidthSegregator::new(&fields, options)
        .segregate(&cli.data, cli.output.as_deref())
        .with_context(|| format!("Cannot segregate '{}'", cli.data))?;
    Ok(report)
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(report) => info!("Done: {} record(s) in '{}'", report.records, report.output_path),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            process::exit(1);
        }
    }
}
