pub mod error;
pub mod geo;
pub(crate) mod parallel;
pub mod report;
