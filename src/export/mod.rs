//! # Export Module
//!
//! The user-facing side of an export: format and quality options, the job state
//! machine and the orchestrator that drives compositing, mixing and encoding.

pub mod job;
pub mod options;
pub mod orchestrator;

pub use job::{ExportJob, JobState};
pub use options::{progress_percent, ExportConfiguration, ExportFormat, ExportQuality};
pub use orchestrator::{CancelToken, ExportHandle, Exporter};
