//! Type definitions for the model runner

pub mod record;
pub mod report;
pub mod stats;

pub use record::{InputMessage, InputRecord, OutputMessage, OutputResult};
pub use report::ErrorReport;
pub use stats::SummaryStats;
