//! Analysis logic for parsed captures
//!
//! Pure functions over a [`Capture`](crate::capture::Capture), kept apart from
//! the session so reports can run on any capture, cached or freshly parsed.

pub mod hotspot_analyzer;

pub use hotspot_analyzer::{analyze_hotspots, FunctionHotspot};
