//! The in-memory splash overlay and its metadata redaction.

pub mod model;
pub mod redact;
