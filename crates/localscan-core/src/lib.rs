//! localscan-core: Shared types for the localscan host-discovery engine.
//!
//! This crate provides the foundational types used across all localscan crates:
//! - Detection records (`DetectionResult`) and their method / diff status tags
//! - Scan events streamed from the scanner to progress consumers

pub mod events;
pub mod types;

pub use events::{ProgressEvent, ProgressTracker, ScanEvent};
pub use types::{DetectionMethod, DetectionResult, DiffStatus};
