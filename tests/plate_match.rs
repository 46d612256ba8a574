/// Exit-gate plate comparison on top of normalized recognizer output
use common::{best_match, plates_match, similarity, DEFAULT_MATCH_THRESHOLD};
use lpr_engine::{normalize_plate, LprConfig};

#[test]
fn test_identical_reads_match() {
    assert_eq!(similarity("51F12345", "51F12345"), 1.0);
    assert!(plates_match("51F12345", "51F12345", DEFAULT_MATCH_THRESHOLD));
}

#[test]
fn test_comparison_ignores_case_and_spaces() {
    assert_eq!(similarity("51f 123 45", "51F12345"), 1.0);
}

#[test]
fn test_threshold_is_correctly_signed() {
    // One wrong digit out of eight stays above 0.80
    assert!(plates_match("51F12345", "51F12845", 0.80));
    // A different plate must not pass
    assert!(!plates_match("51F12345", "30A67890", 0.80));
    assert!(similarity("51F12345", "30A67890") < 0.80);
}

#[test]
fn test_normalized_reads_compare_with_stored_plate() {
    // Recognizer confused 0 with O at entry and read cleanly at exit
    let entry = normalize_plate("3OA-999.99");
    let exit = normalize_plate("30A99999");
    assert_eq!(entry, exit);
    assert!(plates_match(&entry, &exit, DEFAULT_MATCH_THRESHOLD));
}

#[test]
fn test_best_match_against_entry_and_registered_plates() {
    let entry_plate = "51F12345";
    let registered_plate = "51F12346";

    let result = best_match("51F12346", [entry_plate, registered_plate], DEFAULT_MATCH_THRESHOLD);
    assert_eq!(result.score, 1.0);
    assert!(result.is_match());

    let result = best_match("", [entry_plate, registered_plate], DEFAULT_MATCH_THRESHOLD);
    assert_eq!(result.score, 0.0);
    assert!(!result.is_match());
}

#[test]
fn test_default_config_threshold() {
    let config = LprConfig::default();
    assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
    assert!(config.validate().is_ok());
}
