pub mod plate_match;
pub mod recognition;

pub use plate_match::{best_match, plates_match, similarity, PlateMatch, DEFAULT_MATCH_THRESHOLD};
pub use recognition::{BoundingBox, RecognitionResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
