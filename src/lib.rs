//! Prepare peptide identification results for submission to a public
//! proteomics repository.
//!
//! For each identification job the best match per spectrum is selected under
//! configurable confidence thresholds ([`psm`]), the job's template documents
//! are rewritten in a single streaming pass ([`io::rewrite`]), and every
//! produced and consumed file is recorded in a provenance graph from which
//! the submission manifest is written ([`provenance`]).
pub mod io;
pub mod meta;
pub mod params;
pub mod pipeline;
pub mod provenance;
pub mod psm;
pub mod run;

pub use crate::meta::{EngineKind, InstrumentGroup, SampleMetadata};
pub use crate::pipeline::{run_batch, BatchConfig, JobConfig};
pub use crate::provenance::{FileKind, FileRegistry, SubmissionStatus};
pub use crate::psm::{FilterThresholds, IdentificationRecord, PSMSelector, Selection};
pub use crate::run::RunContext;
