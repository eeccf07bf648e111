//! A1-style cell references, 1-based on both axes.

use std::sync::LazyLock;

use regex::Regex;

static CELL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\$?([A-Za-z]{1,3})\$?([0-9]+)$").expect("cell reference pattern is valid")
});

/// 1 -> "A", 26 -> "Z", 27 -> "AA".
pub fn col_letter(column: u32) -> String {
    debug_assert!(column > 0, "columns are 1-based");
    let mut n = column.saturating_sub(1);
    let mut s = String::new();
    loop {
        s.insert(0, (b'A' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    s
}

/// "A" -> 1, "AB" -> 28. `None` for anything but ASCII letters.
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || !letters.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    letters.bytes().try_fold(0u32, |acc, b| {
        acc.checked_mul(26)?
            .checked_add(u32::from(b.to_ascii_uppercase() - b'A' + 1))
    })
}

/// "AB12" -> (28, 12) as (column, row).
pub fn parse_cell_ref(coord: &str) -> Option<(u32, u32)> {
    let caps = CELL_REF.captures(coord)?;
    let column = column_index(&caps[1])?;
    let row = caps[2].parse::<u32>().ok().filter(|r| *r > 0)?;
    Some((column, row))
}

/// (28, 12) -> "AB12".
pub fn cell_ref(column: u32, row: u32) -> String {
    format!("{}{row}", col_letter(column))
}
