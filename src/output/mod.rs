//! Output formatting
//!
//! - `text`: human-readable console summaries
//! - `json`: machine-readable report with host and timestamp

pub mod json;
pub mod text;
