//! Conversions between A1-style references and 0-based indexes.

/// Converts a column name ("A", "AB") to a 0-based column index.
pub(crate) fn col_to_index(name: &str) -> Option<usize> {
    if name.is_empty() {
        return None;
    }
    let mut index = 0usize;
    for character in name.chars() {
        if !character.is_ascii_alphabetic() {
            return None;
        }
        let digit = (character.to_ascii_uppercase() as u8 - b'A') as usize + 1;
        index = index.checked_mul(26)?.checked_add(digit)?;
    }
    Some(index - 1)
}

/// Converts a 1-based row number ("12") to a 0-based row index.
pub(crate) fn row_to_index(number: &str) -> Option<usize> {
    number.parse::<usize>().ok().filter(|row| *row > 0).map(|row| row - 1)
}

/// Splits a cell reference such as "C7" into (row, col) indexes.
pub(crate) fn reference_to_index(reference: &str) -> Option<(usize, usize)> {
    let split = reference.find(|character: char| character.is_ascii_digit())?;
    let (col, row) = reference.split_at(split);
    Some((row_to_index(row)?, col_to_index(col)?))
}

pub(crate) fn index_to_reference(row: usize, col: usize) -> String {
    let mut name = String::new();
    let mut number = col + 1;
    while number > 0 {
        number -= 1;
        name.insert(0, (b'A' + (number % 26) as u8) as char);
        number /= 26;
    }
    format!("{}{}", name, row + 1)
}
