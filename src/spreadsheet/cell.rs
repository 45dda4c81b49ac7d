use crate::error::FieldSegregatorError;
use crate::spreadsheet::reference::index_to_reference;
use chrono::Duration;
use chrono::NaiveDate;
use std::collections::HashSet;
use std::fmt::Display;

/// Types of cell data in spreadsheet files.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum CellType {
    #[default]
    Empty,
    Boolean,
    Number,
    /// Serial date/time counted from the 1900 epoch
    NumberDateTime1900,
    NumberDate1900,
    NumberTime1900,
    /// Serial date/time counted from the 1904 epoch
    NumberDateTime1904,
    NumberDate1904,
    NumberTime1904,
    /// ISO 8601 date or date-time text (ods)
    IsoDateTime,
    /// ISO 8601 duration text such as `PT12H30M00S` (ods)
    IsoDuration,
    InlineString,
    /// Index into the xlsx shared string table, resolved before the sheet is handed out
    SharedString,
    /// Formula error such as `#N/A`
    Error,
}

impl CellType {
    /// Maps the built-in Excel number format ids that denote dates and times.
    pub(crate) fn parse_builtin_number_format_id(id: &str, is_1904: bool) -> Option<Self> {
        match id {
            "22" => Some(if is_1904 { Self::NumberDateTime1904 } else { Self::NumberDateTime1900 }),
            "14" | "15" | "16" | "17" => Some(if is_1904 { Self::NumberDate1904 } else { Self::NumberDate1900 }),
            "18" | "19" | "20" | "21" | "45" | "46" | "47" => Some(if is_1904 { Self::NumberTime1904 } else { Self::NumberTime1900 }),
            _ => None,
        }
    }

    /// Classifies a custom format code such as `yyyy-mm-dd` or `[Red]0.00`.
    /// Quoted literals, escapes and bracketed sections are not date tokens.
    pub(crate) fn parse_custom_number_format(format: &str, is_1904: bool) -> Self {
        let mut is_escaped = false;
        let mut is_literal = false;
        let mut is_bracket = false;
        let mut is_date = false;
        let mut is_time = false;
        for character in format.chars() {
            match character {
                _ if is_escaped => is_escaped = false,
                '_' | '\\' => is_escaped = true,

                '"' if is_literal => is_literal = false,
                '"' if !is_bracket => is_literal = true,

                ']' if is_bracket => is_bracket = false,
                '[' if !is_literal => is_bracket = true,
                _ if is_literal || is_bracket => (),

                'Y' | 'y' | 'D' | 'd' => is_date = true,
                'H' | 'h' | 'S' | 's' => is_time = true,
                _ => (),
            }
        }

        match (is_date, is_time, is_1904) {
            (true, true, false) => Self::NumberDateTime1900,
            (true, true, true) => Self::NumberDateTime1904,
            (true, false, false) => Self::NumberDate1900,
            (true, false, true) => Self::NumberDate1904,
            (false, true, false) => Self::NumberTime1900,
            (false, true, true) => Self::NumberTime1904,
            (false, false, _) => Self::Number,
        }
    }
}

/// One non-empty cell of a worksheet.
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    /// Row index (0-based)
    pub row: usize,
    /// Column index (0-based)
    pub col: usize,
    pub kind: CellType,
    /// Raw value as stored in the file
    pub value: String,
}

impl Cell {
    pub fn new(row: usize, col: usize, kind: CellType, value: &str) -> Self {
        Cell {
            row,
            col,
            kind,
            value: value.to_owned(),
        }
    }

    /// Returns the Excel-style reference, e.g. "B7".
    pub fn reference(&self) -> String {
        index_to_reference(self.row, self.col)
    }

    /// True when the cell carries no usable value: an empty cell, or text listed in `nulls`.
    pub fn is_blank(&self, nulls: &HashSet<String>) -> bool {
        self.kind == CellType::Empty || nulls.contains(&self.to_string())
    }

    /// Reads the cell as a whole number.
    /// Numeric cells and numeric text both qualify as long as there is no fractional part.
    pub fn to_whole_number(&self) -> Result<i64, String> {
        match self.kind {
            CellType::Number | CellType::InlineString | CellType::SharedString => {
                let text = self.value.trim();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| format!("'{}' is not a number", self.value))?;
                if number.is_finite() && number.fract() == 0.0 {
                    Ok(number as i64)
                } else {
                    Err(format!("'{}' is not a whole number", self.value))
                }
            }
            _ => Err(format!("'{}' is not a number", self)),
        }
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered = match self.kind {
            CellType::Boolean => Ok(if self.value == "1" || self.value == "true" { "true" } else { "false" }.to_owned()),
            CellType::NumberDateTime1900 => to_datetime_string(&self.value, false),
            CellType::NumberDateTime1904 => to_datetime_string(&self.value, true),
            CellType::NumberDate1900 => to_date_string(&self.value, false),
            CellType::NumberDate1904 => to_date_string(&self.value, true),
            CellType::NumberTime1900 | CellType::NumberTime1904 => to_time_string(&self.value),
            CellType::IsoDateTime => Ok(self.value.replace('T', " ")),
            CellType::IsoDuration => Ok(self
                .value
                .replace("PT", "")
                .replace('H', ":")
                .replace('M', ":")
                .replace('S', "")),
            _ => Ok(self.value.to_owned()),
        };
        // Serial numbers outside the calendar fall back to the stored value
        match rendered {
            Ok(value) => write!(f, "{}", value),
            Err(_) => write!(f, "{}", self.value),
        }
    }
}

/// Converts a serial day number to an ISO date.
/// The 1900 system counts the phantom 1900-02-29, so serials below 60 are shifted by a day.
fn to_date_string(value: &str, is_1904: bool) -> Result<String, FieldSegregatorError> {
    let days = value.trim().parse::<f64>()?.trunc() as i64;
    let offset = if is_1904 {
        1462
    } else if days < 60 {
        1
    } else {
        0
    };
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30).ok_or_else(|| {
        FieldSegregatorError::WithContextError("invalid epoch date".to_owned())
    })?;
    let date = Duration::try_days(days + offset)
        .and_then(|duration| epoch.checked_add_signed(duration))
        .ok_or_else(|| FieldSegregatorError::WithContextError(format!("date serial '{}' out of range", value)))?;
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Converts the fractional part of a serial number to `HH:MM:SS[.mmm]`.
fn to_time_string(value: &str) -> Result<String, FieldSegregatorError> {
    let fraction = value.trim().parse::<f64>()?.fract();
    let mut rest = (fraction * 86_400_000f64).round() as i64;
    let milliseconds = rest % 1_000;
    rest /= 1_000;
    let seconds = rest % 60;
    rest /= 60;
    let minutes = rest % 60;
    let hours = rest / 60;
    if milliseconds > 0 {
        Ok(format!("{hours:02}:{minutes:02}:{seconds:02}.{milliseconds:03}"))
    } else {
        Ok(format!("{hours:02}:{minutes:02}:{seconds:02}"))
    }
}

fn to_datetime_string(value: &str, is_1904: bool) -> Result<String, FieldSegregatorError> {
    let date = to_date_string(value, is_1904)?;
    let time = to_time_string(value)?;
    Ok(format!("{date} {time}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(kind: CellType, value: &str) -> Cell {
        Cell::new(0, 0, kind, value)
    }

    #[test]
    fn builtin_formats() {
        assert_eq!(CellType::parse_builtin_number_format_id("14", false), Some(CellType::NumberDate1900));
        assert_eq!(CellType::parse_builtin_number_format_id("22", true), Some(CellType::NumberDateTime1904));
        assert_eq!(CellType::parse_builtin_number_format_id("0", false), None);
    }

    #[test]
    fn custom_formats() {
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd", false), CellType::NumberDate1900);
        assert_eq!(CellType::parse_custom_number_format("hh:mm:ss", false), CellType::NumberTime1900);
        assert_eq!(CellType::parse_custom_number_format("yyyy-mm-dd hh:mm", true), CellType::NumberDateTime1904);
        assert_eq!(CellType::parse_custom_number_format("[Red]0.00", false), CellType::Number);
        assert_eq!(CellType::parse_custom_number_format("\"days\" 0", false), CellType::Number);
    }

    #[test]
    fn display_dates() {
        assert_eq!(cell(CellType::NumberDate1900, "45292").to_string(), "2024-01-01");
        assert_eq!(cell(CellType::NumberDate1900, "1").to_string(), "1900-01-01");
        assert_eq!(cell(CellType::NumberDate1904, "0").to_string(), "1904-01-01");
        assert_eq!(cell(CellType::NumberTime1900, "0.5").to_string(), "12:00:00");
        assert_eq!(cell(CellType::NumberDateTime1900, "45292.25").to_string(), "2024-01-01 06:00:00");
        assert_eq!(cell(CellType::NumberDate1900, "oops").to_string(), "oops");
    }

    #[test]
    fn display_other_kinds() {
        assert_eq!(cell(CellType::Boolean, "1").to_string(), "true");
        assert_eq!(cell(CellType::Boolean, "0").to_string(), "false");
        assert_eq!(cell(CellType::IsoDateTime, "2024-03-01T10:00:00").to_string(), "2024-03-01 10:00:00");
        assert_eq!(cell(CellType::IsoDuration, "PT01H30M00S").to_string(), "01:30:00");
        assert_eq!(cell(CellType::Error, "#N/A").to_string(), "#N/A");
        assert_eq!(cell(CellType::InlineString, "NAME").to_string(), "NAME");
    }

    #[test]
    fn whole_numbers() {
        assert_eq!(cell(CellType::Number, "12").to_whole_number(), Ok(12));
        assert_eq!(cell(CellType::Number, "12.0").to_whole_number(), Ok(12));
        assert_eq!(cell(CellType::InlineString, " 7 ").to_whole_number(), Ok(7));
        assert!(cell(CellType::Number, "12.5").to_whole_number().is_err());
        assert!(cell(CellType::InlineString, "Start").to_whole_number().is_err());
        assert!(cell(CellType::Boolean, "1").to_whole_number().is_err());
        assert!(cell(CellType::NumberDate1900, "45292").to_whole_number().is_err());
    }

    #[test]
    fn blank_cells() {
        let nulls: HashSet<String> = ["".to_owned(), "NA".to_owned()].into_iter().collect();
        assert!(cell(CellType::Empty, "").is_blank(&nulls));
        assert!(cell(CellType::InlineString, "").is_blank(&nulls));
        assert!(cell(CellType::InlineString, "NA").is_blank(&nulls));
        assert!(!cell(CellType::InlineString, " ").is_blank(&nulls));
        assert!(!cell(CellType::Number, "0").is_blank(&nulls));
    }
}
