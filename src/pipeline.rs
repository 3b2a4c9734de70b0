//! Batch orchestration: configuration, per-job processing and the seams to
//! external file retrieval and conversion.
pub mod batch;
pub mod config;
pub mod external;
pub mod job;

pub use crate::pipeline::batch::{run_batch, BatchError, BatchSummary, JobFailure};
pub use crate::pipeline::config::{BatchConfig, ConfigError, ConverterConfig, JobConfig};
pub use crate::pipeline::external::{
    Converter, ConverterInputs, ConverterRequest, FileRetriever, LocalFileRetriever,
    ProcessConverter,
};
pub use crate::pipeline::job::{process_job, JobError, JobOutput};
