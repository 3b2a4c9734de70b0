//! State shared by every job of one batch.
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::provenance::FileRegistry;
use crate::psm::{ProteinCache, ThresholdsUsed};

/// The mutable state of one run. It is owned by the batch orchestrator and
/// lent to each job in turn, so it must be [`reset`](RunContext::reset)
/// before an independent batch reuses it.
#[derive(Debug, Default)]
pub struct RunContext {
    pub files: FileRegistry,
    pub proteins: ProteinCache,
    pub thresholds_used: ThresholdsUsed,
    /// Spectrum files already materialized by an earlier job, by job-independent name
    artifacts: HashMap<String, PathBuf>,
}

impl RunContext {
    pub fn new(compute_checksums: bool) -> Self {
        Self {
            files: FileRegistry::new(compute_checksums),
            ..Default::default()
        }
    }

    pub fn reset(&mut self) {
        self.files.clear();
        self.proteins.clear();
        self.thresholds_used = ThresholdsUsed::default();
        self.artifacts.clear();
    }

    /// Remember an artifact a later job of the same dataset may reuse
    pub fn share_artifact(&mut self, name: &str, path: &Path) {
        self.artifacts.insert(name.to_lowercase(), path.to_path_buf());
    }

    pub fn shared_artifact(&self, name: &str) -> Option<&Path> {
        self.artifacts.get(&name.to_lowercase()).map(|p| p.as_path())
    }
}
