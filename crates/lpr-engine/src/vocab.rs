use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Recognizer class reserved for "no character"
pub const BLANK_INDEX: usize = 0;

const BLANK_MARKERS: [&str; 3] = ["<blank>", "<BLANK>", "blank"];

/// Index-to-symbol table of the sequence recognizer.
///
/// Class 0 is always the CTC blank and never decodes to text; the charset
/// file lists the printable symbols for classes `1..`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    symbols: Vec<String>,
}

impl Vocabulary {
    /// Build from printable symbols in class order (class 1 first)
    pub fn from_symbols<I, S>(symbols: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();

        let mut seen = HashSet::new();
        for symbol in &symbols {
            if symbol.is_empty() {
                bail!("Charset contains an empty symbol");
            }
            if !seen.insert(symbol.as_str()) {
                bail!("Charset contains duplicate symbol {:?}", symbol);
            }
        }

        Ok(Self { symbols })
    }

    /// Parse a charset table: one symbol per non-empty line, or one symbol per
    /// character when the table is a single line. A leading blank marker line
    /// is skipped.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines: Vec<&str> = raw
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .collect();

        if lines
            .first()
            .is_some_and(|first| BLANK_MARKERS.contains(&first.trim()))
        {
            lines.remove(0);
        }

        if lines.is_empty() {
            bail!("Charset is empty");
        }

        if lines.len() == 1 && lines[0].chars().count() > 1 {
            return Self::from_symbols(lines[0].chars().map(String::from));
        }

        Self::from_symbols(lines)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read charset {}", path.display()))?;
        let vocabulary =
            Self::parse(&raw).with_context(|| format!("Invalid charset {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            symbols = vocabulary.symbols.len(),
            "Loaded recognizer charset"
        );
        Ok(vocabulary)
    }

    /// Number of recognizer classes, blank included
    pub fn len(&self) -> usize {
        self.symbols.len() + 1
    }

    /// Always false: the blank class is always present
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Printable symbol of a class; `None` for the blank and out-of-range indices
    pub fn symbol(&self, index: usize) -> Option<&str> {
        if index == BLANK_INDEX {
            return None;
        }
        self.symbols.get(index - 1).map(String::as_str)
    }

    /// Concatenate the symbols of `indices`, skipping blanks and unknown classes
    pub fn decode(&self, indices: &[usize]) -> String {
        indices.iter().filter_map(|&i| self.symbol(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_one_symbol_per_line() {
        let vocab = Vocabulary::parse("0\n1\n2\nA\r\nB\n\n").unwrap();
        assert_eq!(vocab.len(), 6);
        assert_eq!(vocab.symbol(1), Some("0"));
        assert_eq!(vocab.symbol(4), Some("A"));
        assert_eq!(vocab.symbol(5), Some("B"));
        assert_eq!(vocab.symbol(6), None);
    }

    #[test]
    fn test_parse_single_line_charset() {
        let vocab = Vocabulary::parse("0123456789ABCDEFGHKLMNPSTUVXYZ\n").unwrap();
        assert_eq!(vocab.len(), 31);
        assert_eq!(vocab.symbol(1), Some("0"));
        assert_eq!(vocab.symbol(11), Some("A"));
    }

    #[test]
    fn test_skips_blank_marker() {
        let vocab = Vocabulary::parse("<blank>\nA\nB\n").unwrap();
        assert_eq!(vocab.len(), 3);
        assert_eq!(vocab.symbol(1), Some("A"));
    }

    #[test]
    fn test_blank_never_printable() {
        for raw in ["ABC", "<blank>\nX\nY", "blank\n0\n1"] {
            let vocab = Vocabulary::parse(raw).unwrap();
            assert_eq!(vocab.symbol(BLANK_INDEX), None);
            assert_eq!(vocab.decode(&[0, 0, 0]), "");
        }
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        assert!(Vocabulary::parse("A\nB\nA\n").is_err());
        assert!(Vocabulary::parse("AABC").is_err());
        assert!(Vocabulary::parse("\n\n").is_err());
        assert!(Vocabulary::parse("<blank>\n").is_err());
    }

    #[test]
    fn test_decode_skips_unknown_classes() {
        let vocab = Vocabulary::from_symbols(["5", "1", "F"]).unwrap();
        assert_eq!(vocab.decode(&[1, 2, 3, 0, 99, 1]), "51F5");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0\n1\n2").unwrap();
        let vocab = Vocabulary::load(file.path()).unwrap();
        assert_eq!(vocab.len(), 4);

        assert!(Vocabulary::load(Path::new("models/missing_charset.txt")).is_err());
    }
}
