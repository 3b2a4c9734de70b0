//! File identities, derived-from relations and the submission manifest built
//! from them.
pub mod graph;
pub mod manifest;

pub use crate::provenance::graph::{
    FileId, FileKind, FileKindCounts, FileRecord, FileRegistry, ProvenanceError, ResultFileRecord,
    SubmissionStatus,
};
pub use crate::provenance::manifest::{
    describe_thresholds, write_manifest_file, ManifestMetadata, ManifestWriter,
};
