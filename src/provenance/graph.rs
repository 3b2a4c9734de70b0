use std::collections::{BTreeSet, HashMap};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::io::checksum_file;
use crate::meta::SampleMetadata;

/// Sequential file identity, starting at 1 in first-registration order
pub type FileId = u32;

/// The role a file plays in a submission
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileKind {
    RAW,
    PEAK,
    SEARCH,
    RESULT,
}

impl FileKind {
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::RAW => "RAW",
            Self::PEAK => "PEAK",
            Self::SEARCH => "SEARCH",
            Self::RESULT => "RESULT",
        }
    }
}

impl Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProvenanceError {
    #[error("File {0} has not been registered")]
    UnknownFile(FileId),
    #[error("File {0} is not a submitted file")]
    NotAResultFile(FileId),
    #[error("File {id} is already submitted as {registered}, cannot submit it as {requested}")]
    KindMismatch {
        id: FileId,
        registered: FileKind,
        requested: FileKind,
    },
}

/// One physical file, as first registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub id: FileId,
    pub name: String,
    pub path: PathBuf,
    /// Zero when the file was not present at registration
    pub length: u64,
    /// Lowercase hexadecimal MD5, empty when not computed
    pub checksum: String,
    pub job: String,
}

/// A file that takes part in the submission and the files it derives from
#[derive(Debug, Clone, PartialEq)]
pub struct ResultFileRecord {
    pub id: FileId,
    pub kind: FileKind,
    pub parents: BTreeSet<FileId>,
    pub sample: Option<SampleMetadata>,
}

impl ResultFileRecord {
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Submitted file totals per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileKindCounts {
    pub raw: usize,
    pub peak: usize,
    pub search: usize,
    pub result: usize,
}

impl FileKindCounts {
    pub fn new(raw: usize, peak: usize, search: usize, result: usize) -> Self {
        Self {
            raw,
            peak,
            search,
            result,
        }
    }

    fn add(&mut self, kind: FileKind) {
        match kind {
            FileKind::RAW => self.raw += 1,
            FileKind::PEAK => self.peak += 1,
            FileKind::SEARCH => self.search += 1,
            FileKind::RESULT => self.result += 1,
        }
    }

    /// A submission is complete when there is at least one search file and one
    /// result file, and there are at least as many result files as raw, peak
    /// or search files.
    pub fn submission_status(&self) -> SubmissionStatus {
        let inputs = self.raw.max(self.peak).max(self.search);
        if self.search >= 1 && self.result >= 1 && self.result >= inputs {
            SubmissionStatus::Complete
        } else {
            SubmissionStatus::Partial
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmissionStatus {
    Complete,
    Partial,
}

impl Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete => f.write_str("COMPLETE"),
            Self::Partial => f.write_str("PARTIAL"),
        }
    }
}

/// The file master list and the derived-from graph between submitted files.
///
/// Files are keyed by their case-folded file name, so the same file reached
/// through different directories or spellings shares one identity.
#[derive(Debug, Default)]
pub struct FileRegistry {
    compute_checksums: bool,
    by_name: HashMap<String, FileId>,
    files: Vec<FileRecord>,
    results: IndexMap<FileId, ResultFileRecord>,
}

fn normalize_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_else(|| path.to_string_lossy())
        .to_lowercase()
}

impl FileRegistry {
    pub fn new(compute_checksums: bool) -> Self {
        Self {
            compute_checksums,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
        self.files.clear();
        self.results.clear();
    }

    pub fn find(&self, path: &Path) -> Option<FileId> {
        self.by_name.get(&normalize_name(path)).copied()
    }

    /// Get the identity of the file at `path`, registering it if its name has
    /// not been seen before
    pub fn register(&mut self, path: &Path, job: &str) -> FileId {
        let key = normalize_name(path);
        if let Some(id) = self.by_name.get(&key) {
            return *id;
        }
        let id = self.files.len() as FileId + 1;
        let length = match fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(_) => {
                debug!("{} is not present, registering it without a length", path.display());
                0
            }
        };
        let checksum = if self.compute_checksums && length > 0 {
            checksum_file(path).unwrap_or_else(|e| {
                warn!("Failed to checksum {}: {e}", path.display());
                String::new()
            })
        } else {
            String::new()
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| key.clone());
        self.files.push(FileRecord {
            id,
            name,
            path: path.to_path_buf(),
            length,
            checksum,
            job: job.to_string(),
        });
        self.by_name.insert(key, id);
        id
    }

    /// Register a file whose checksum is already known, such as a document
    /// that was hashed while it was being written
    pub fn register_with_checksum(&mut self, path: &Path, job: &str, checksum: String) -> FileId {
        let id = self.register(path, job);
        if let Some(record) = self.files.get_mut(id as usize - 1) {
            if record.checksum.is_empty() {
                record.checksum = checksum;
            }
        }
        id
    }

    pub fn get(&self, id: FileId) -> Option<&FileRecord> {
        (id as usize).checked_sub(1).and_then(|i| self.files.get(i))
    }

    pub fn files(&self) -> impl Iterator<Item = &FileRecord> {
        self.files.iter()
    }

    /// Mark a registered file as part of the submission. Marking it again
    /// under the same kind does nothing.
    pub fn mark_result(&mut self, id: FileId, kind: FileKind) -> Result<(), ProvenanceError> {
        if self.get(id).is_none() {
            return Err(ProvenanceError::UnknownFile(id));
        }
        match self.results.get(&id) {
            Some(existing) if existing.kind != kind => Err(ProvenanceError::KindMismatch {
                id,
                registered: existing.kind,
                requested: kind,
            }),
            Some(_) => Ok(()),
            None => {
                self.results.insert(
                    id,
                    ResultFileRecord {
                        id,
                        kind,
                        parents: BTreeSet::new(),
                        sample: None,
                    },
                );
                Ok(())
            }
        }
    }

    /// Record that `child` is derived from `parent`
    pub fn add_edge(&mut self, child: FileId, parent: FileId) -> Result<(), ProvenanceError> {
        let record = self
            .results
            .get_mut(&child)
            .ok_or(ProvenanceError::NotAResultFile(child))?;
        record.parents.insert(parent);
        Ok(())
    }

    pub fn set_sample(&mut self, id: FileId, sample: SampleMetadata) -> Result<(), ProvenanceError> {
        let record = self
            .results
            .get_mut(&id)
            .ok_or(ProvenanceError::NotAResultFile(id))?;
        record.sample = Some(sample);
        Ok(())
    }

    pub fn result_file(&self, id: FileId) -> Option<&ResultFileRecord> {
        self.results.get(&id)
    }

    /// Submitted files in ascending identity order
    pub fn result_files(&self) -> Vec<&ResultFileRecord> {
        let mut records: Vec<_> = self.results.values().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn counts(&self) -> FileKindCounts {
        let mut counts = FileKindCounts::default();
        for record in self.results.values() {
            counts.add(record.kind);
        }
        counts
    }

    pub fn submission_status(&self) -> SubmissionStatus {
        self.counts().submission_status()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_case_insensitive_registration() {
        let mut registry = FileRegistry::new(false);
        let a = registry.register(Path::new("/data/Sample.RAW"), "job1");
        let b = registry.register(Path::new("/other/sample.raw"), "job2");
        assert_eq!(a, 1);
        assert_eq!(a, b);
        assert_eq!(registry.len(), 1);
        let record = registry.get(a).unwrap();
        assert_eq!(record.name, "Sample.RAW");
        assert_eq!(record.job, "job1");
        assert_eq!(record.length, 0);
        assert!(record.checksum.is_empty());

        let c = registry.register(Path::new("/data/sample.mzML"), "job1");
        assert_eq!(c, 2);
        assert_eq!(registry.find(Path::new("SAMPLE.MZML")), Some(2));
    }

    #[test]
    fn test_present_file_metadata() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("run.mgf");
        let mut handle = fs::File::create(&path)?;
        handle.write_all(b"BEGIN IONS\nEND IONS\n")?;
        drop(handle);

        let mut registry = FileRegistry::new(true);
        let id = registry.register(&path, "job1");
        let record = registry.get(id).unwrap();
        assert_eq!(record.length, 20);
        assert_eq!(record.checksum, checksum_file(&path)?);

        let mut registry = FileRegistry::new(false);
        let id = registry.register(&path, "job1");
        assert!(registry.get(id).unwrap().checksum.is_empty());
        Ok(())
    }

    #[test]
    fn test_mark_result() {
        let mut registry = FileRegistry::new(false);
        let id = registry.register(Path::new("a.mzid"), "job1");
        assert_eq!(registry.mark_result(id, FileKind::RESULT), Ok(()));
        assert_eq!(registry.mark_result(id, FileKind::RESULT), Ok(()));
        assert_eq!(
            registry.mark_result(id, FileKind::PEAK),
            Err(ProvenanceError::KindMismatch {
                id,
                registered: FileKind::RESULT,
                requested: FileKind::PEAK
            })
        );
        assert_eq!(
            registry.mark_result(9, FileKind::RAW),
            Err(ProvenanceError::UnknownFile(9))
        );
    }

    #[test]
    fn test_edges() {
        let mut registry = FileRegistry::new(false);
        let raw = registry.register(Path::new("a.raw"), "job1");
        let result = registry.register(Path::new("a.mzid"), "job1");
        registry.mark_result(raw, FileKind::RAW).unwrap();
        assert_eq!(
            registry.add_edge(result, raw),
            Err(ProvenanceError::NotAResultFile(result))
        );
        registry.mark_result(result, FileKind::RESULT).unwrap();
        registry.add_edge(result, raw).unwrap();
        registry.add_edge(result, raw).unwrap();
        let record = registry.result_file(result).unwrap();
        assert_eq!(record.parents.len(), 1);
        assert!(!record.is_root());
        assert!(registry.result_file(raw).unwrap().is_root());
    }

    #[test]
    fn test_submission_status() {
        assert_eq!(
            FileKindCounts::new(2, 2, 1, 1).submission_status(),
            SubmissionStatus::Partial
        );
        assert_eq!(
            FileKindCounts::new(2, 2, 2, 2).submission_status(),
            SubmissionStatus::Complete
        );
        assert_eq!(
            FileKindCounts::new(0, 0, 0, 1).submission_status(),
            SubmissionStatus::Partial
        );

        let mut registry = FileRegistry::new(false);
        for (name, kind) in [
            ("a.raw", FileKind::RAW),
            ("a.mgf", FileKind::PEAK),
            ("a_syn.txt", FileKind::SEARCH),
            ("a.mzid", FileKind::RESULT),
        ] {
            let id = registry.register(Path::new(name), "job1");
            registry.mark_result(id, kind).unwrap();
        }
        assert_eq!(registry.counts(), FileKindCounts::new(1, 1, 1, 1));
        assert_eq!(registry.submission_status(), SubmissionStatus::Complete);
        assert_eq!(registry.submission_status().to_string(), "COMPLETE");
    }
}
