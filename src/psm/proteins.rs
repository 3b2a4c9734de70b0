use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};

use crate::io::fasta::{open_fasta, FastaError};
use crate::psm::selector::Selection;

/// A protein that has been matched in the current run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProteinEntry {
    pub accession: String,
    /// Zero-based, assigned in first-seen order and stable for the life of the cache
    pub index: usize,
    pub sequence: Option<String>,
    /// Matches retained for this protein by the most recent job
    pub count: usize,
}

impl ProteinEntry {
    /// Locate `peptide` in the protein sequence, returning one-based inclusive
    /// start and end positions
    pub fn locate(&self, peptide: &str) -> Option<(usize, usize)> {
        if peptide.is_empty() {
            return None;
        }
        let sequence = self.sequence.as_deref()?;
        sequence
            .find(peptide)
            .map(|offset| (offset + 1, offset + peptide.len()))
    }
}

/// The protein database cached across the jobs of one run.
///
/// Switching to a different sequence database rebuilds the cache; reusing the
/// same database keeps every entry and its index but resets the counts.
#[derive(Debug, Default)]
pub struct ProteinCache {
    database: Option<PathBuf>,
    sequences: HashMap<String, String>,
    entries: IndexMap<String, ProteinEntry>,
}

impl ProteinCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database(&self) -> Option<&Path> {
        self.database.as_deref()
    }

    /// The database file name as reported in rewritten documents
    pub fn database_name(&self) -> String {
        self.database
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    /// Make the cache ready for a job searched against `database`
    pub fn prepare(&mut self, database: Option<&Path>) -> Result<(), FastaError> {
        if self.database.as_deref() == database && (database.is_some() || !self.entries.is_empty()) {
            debug!("Reusing protein cache for {:?}", database);
            self.reset_counts();
            return Ok(());
        }
        self.clear();
        if let Some(path) = database {
            for entry in open_fasta(path)? {
                let entry = entry?;
                self.sequences.insert(entry.accession, entry.sequence);
            }
            info!(
                "Loaded {} protein sequences from {}",
                self.sequences.len(),
                path.display()
            );
        }
        self.database = database.map(|p| p.to_path_buf());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.database = None;
        self.sequences.clear();
        self.entries.clear();
    }

    pub fn reset_counts(&mut self) {
        self.entries.values_mut().for_each(|e| e.count = 0);
    }

    /// Fetch the entry for `accession`, creating it with the next index if needed
    pub fn register(&mut self, accession: &str) -> &mut ProteinEntry {
        let index = self.entries.len();
        let sequences = &self.sequences;
        self.entries
            .entry(accession.to_string())
            .or_insert_with(|| ProteinEntry {
                accession: accession.to_string(),
                index,
                sequence: sequences.get(accession).cloned(),
                count: 0,
            })
    }

    /// Record each protein's retained-match count for a job, overwriting the
    /// previous value
    pub fn update_counts(&mut self, selection: &Selection) {
        for (accession, indices) in selection.by_protein.iter() {
            self.register(accession).count = indices.len();
        }
    }

    pub fn get(&self, accession: &str) -> Option<&ProteinEntry> {
        self.entries.get(accession)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries with at least one retained match, in index order
    pub fn retained(&self) -> impl Iterator<Item = &ProteinEntry> {
        self.entries.values().filter(|e| e.count > 0)
    }
}
