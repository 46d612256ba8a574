//! Greedy CTC decoding.
//!
//! Best-path decoding only: take the arg-max class at each timestep, collapse
//! runs of the same class and drop blanks. No beam search and no language
//! model.

use crate::recognizer::CharacterLattice;
use crate::vocab::{Vocabulary, BLANK_INDEX};
use serde::Serialize;

/// Text read off a lattice before plate normalization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawDecodedText {
    pub text: String,
    /// Classes emitted after collapsing, in order
    pub indices: Vec<usize>,
    /// Mean probability of the emitted characters; `None` when nothing was emitted
    pub score: Option<f32>,
}

/// Collapse consecutive repeats, then drop blanks.
///
/// A blank between two equal classes separates them, so `[3, 0, 3]` yields
/// two characters while `[3, 3]` yields one.
pub fn ctc_greedy_indices(path: &[usize]) -> Vec<usize> {
    let mut out = Vec::new();
    let mut previous = None;
    for &class in path {
        if previous != Some(class) && class != BLANK_INDEX {
            out.push(class);
        }
        previous = Some(class);
    }
    out
}

/// Decode a lattice into text.
///
/// The score of each emitted character is the probability of its class at the
/// first timestep of its run. Classes with no symbol in the vocabulary are
/// dropped from the text and the score.
pub fn ctc_greedy_decode(lattice: &CharacterLattice, vocabulary: &Vocabulary) -> RawDecodedText {
    let mut text = String::new();
    let mut indices = Vec::new();
    let mut prob_sum = 0.0f32;
    let mut previous = None;

    for (class, log_prob) in lattice.argmax_path() {
        if previous != Some(class) && class != BLANK_INDEX {
            if let Some(symbol) = vocabulary.symbol(class) {
                text.push_str(symbol);
                indices.push(class);
                prob_sum += log_prob.exp();
            }
        }
        previous = Some(class);
    }

    let score = if indices.is_empty() {
        None
    } else {
        Some(prob_sum / indices.len() as f32)
    };

    RawDecodedText {
        text,
        indices,
        score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    /// Lattice whose arg-max path is `path`, with probability `p` on the
    /// chosen class and the remainder spread over the others
    fn lattice_for(path: &[usize], classes: usize, p: f32) -> CharacterLattice {
        let rest = ((1.0 - p) / (classes - 1) as f32).ln();
        let log_probs = Array2::from_shape_fn((path.len(), classes), |(t, c)| {
            if c == path[t] {
                p.ln()
            } else {
                rest
            }
        });
        CharacterLattice::from_log_probs(log_probs)
    }

    fn digits() -> Vocabulary {
        Vocabulary::from_symbols((0..10).map(|d| d.to_string())).unwrap()
    }

    #[test]
    fn test_collapse_and_drop_blanks() {
        assert_eq!(ctc_greedy_indices(&[0, 3, 3, 0, 5, 5, 5, 3]), vec![3, 5, 3]);
        assert_eq!(ctc_greedy_indices(&[3, 0, 3]), vec![3, 3]);
        assert_eq!(ctc_greedy_indices(&[0, 0, 0]), Vec::<usize>::new());
        assert_eq!(ctc_greedy_indices(&[]), Vec::<usize>::new());
    }

    #[test]
    fn test_decode_text_and_score() {
        let vocab = digits();
        // class c maps to digit c - 1
        let lattice = lattice_for(&[0, 6, 6, 0, 2, 2, 0, 2], 11, 0.8);
        let decoded = ctc_greedy_decode(&lattice, &vocab);

        assert_eq!(decoded.text, "511");
        assert_eq!(decoded.indices, vec![6, 2, 2]);
        let score = decoded.score.unwrap();
        assert!((score - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_all_blank_has_no_score() {
        let decoded = ctc_greedy_decode(&lattice_for(&[0, 0, 0, 0], 11, 0.9), &digits());
        assert_eq!(decoded.text, "");
        assert!(decoded.indices.is_empty());
        assert_eq!(decoded.score, None);
    }

    #[test]
    fn test_unknown_classes_are_skipped() {
        let vocab = Vocabulary::from_symbols(["A", "B"]).unwrap();
        let decoded = ctc_greedy_decode(&lattice_for(&[1, 4, 2], 5, 0.6), &vocab);
        assert_eq!(decoded.text, "AB");
        assert_eq!(decoded.indices, vec![1, 2]);
    }

    #[test]
    fn test_score_uses_first_timestep_of_run() {
        let vocab = digits();
        let mut log_probs = Array2::from_elem((2, 11), (0.01f32).ln());
        log_probs[[0, 3]] = (0.9f32).ln();
        log_probs[[1, 3]] = (0.5f32).ln();

        let decoded = ctc_greedy_decode(&CharacterLattice::from_log_probs(log_probs), &vocab);
        assert_eq!(decoded.text, "2");
        assert!((decoded.score.unwrap() - 0.9).abs() < 1e-5);
    }
}
