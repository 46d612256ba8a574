//! Parking-gate licence plate recognition.
//!
//! The workspace is split into the shared result contracts (`common`), the
//! logging/metrics layer (`telemetry`) and the recognition pipeline itself
//! (`lpr_engine`). This crate only re-exports them for embedding services.

pub use common;
pub use lpr_engine;
pub use telemetry;
