//! Plate text normalization for the Vietnamese plate grammar
//! (`^[0-9]{2}[A-Z0-9]{2}[0-9]{4,5}$`: province digits, series, serial).

use once_cell::sync::Lazy;
use regex::Regex;

/// Longest plate the grammar allows
pub const MAX_PLATE_LEN: usize = 9;

/// Shorter readings are returned without confusable mapping
const MIN_MAPPED_LEN: usize = 4;

static PLATE_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9]{2}[A-Z0-9]{2}[0-9]{4,5}$")
        .unwrap_or_else(|e| panic!("invalid plate grammar regex: {}", e))
});

/// Letters the recognizer confuses with digits
fn confusable_digit(c: char) -> char {
    match c {
        'O' => '0',
        'I' => '1',
        'Z' => '2',
        'S' => '5',
        'B' => '8',
        'G' => '6',
        other => other,
    }
}

/// Uppercase, keep only `[A-Z0-9]` and truncate to the maximum plate length
pub fn strip_plate(raw: &str) -> String {
    raw.to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .take(MAX_PLATE_LEN)
        .collect()
}

pub fn is_valid_plate(text: &str) -> bool {
    PLATE_GRAMMAR.is_match(text)
}

/// Bring recognizer output into plate form.
///
/// Confusable letters become digits everywhere except the series positions
/// (2 and 3). The mapped string is returned only when it satisfies the plate
/// grammar; otherwise the stripped reading is returned unchanged.
pub fn normalize_plate(raw: &str) -> String {
    let stripped = strip_plate(raw);
    if stripped.len() < MIN_MAPPED_LEN {
        return stripped;
    }

    let mapped: String = stripped
        .chars()
        .enumerate()
        .map(|(i, c)| if i == 2 || i == 3 { c } else { confusable_digit(c) })
        .collect();

    if is_valid_plate(&mapped) {
        mapped
    } else {
        stripped
    }
}
