use std::collections::{BTreeMap, HashSet};

use indexmap::IndexMap;
use log::{debug, info};

use crate::meta::EngineKind;
use crate::psm::filter::{ConfidenceFilter, DerivedScores, FilterDecision, FilterState};
use crate::psm::record::IdentificationRecord;
use crate::psm::thresholds::{FilterThresholds, ThresholdsUsed};

/// The match retained for one scan, with its derived sequence fields
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedMatch {
    pub record: IdentificationRecord,
    /// Lower is more confident, for every engine
    pub comparison_score: f64,
    pub p_value: Option<f64>,
    /// Whether `comparison_score` is a spectral probability
    pub from_spec_prob: bool,
    pub clean_sequence: String,
    pub prefix: String,
    pub suffix: String,
}

impl SelectedMatch {
    fn new(record: IdentificationRecord, scores: DerivedScores) -> Self {
        let annotation = record.annotation();
        Self {
            clean_sequence: annotation.clean_sequence(),
            prefix: annotation.prefix,
            suffix: annotation.suffix,
            record,
            comparison_score: scores.comparison_score,
            p_value: scores.p_value,
            from_spec_prob: scores.from_spec_prob,
        }
    }

    pub fn scores(&self) -> DerivedScores {
        DerivedScores {
            p_value: self.p_value,
            comparison_score: self.comparison_score,
            from_spec_prob: self.from_spec_prob,
        }
    }

    pub fn scan(&self) -> u32 {
        self.record.scan
    }

    pub fn protein(&self) -> &str {
        &self.record.protein
    }
}

/// The outcome of one selection pass over a job's results
#[derive(Debug, Clone, Default)]
pub struct Selection {
    /// Retained matches in ascending scan order
    pub matches: Vec<SelectedMatch>,
    /// Indices into `matches`, grouped by protein accession in first-seen order
    pub by_protein: IndexMap<String, Vec<usize>>,
    pub records_read: usize,
    pub records_accepted: usize,
    pub filter_state: FilterState,
}

impl Selection {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn protein_count(&self) -> usize {
        self.by_protein.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SelectedMatch> {
        self.matches.iter()
    }

    /// Iterate over each protein and the matches retained for it
    pub fn protein_groups(&self) -> impl Iterator<Item = (&str, Vec<&SelectedMatch>)> + '_ {
        self.by_protein.iter().map(|(accession, indices)| {
            (
                accession.as_str(),
                indices.iter().map(|i| &self.matches[*i]).collect(),
            )
        })
    }
}

/// Retains at most one passing record per scan, the one with the lowest
/// comparison score. Ties keep the record seen first. A record scored by
/// spectral probability replaces one scored by an engine fallback.
#[derive(Debug)]
pub struct PSMSelector<'a> {
    filter: ConfidenceFilter<'a>,
    state: FilterState,
    best: BTreeMap<u32, SelectedMatch>,
    accepted_proteins: HashSet<String>,
    records_read: usize,
    records_accepted: usize,
}

impl<'a> PSMSelector<'a> {
    pub fn new(thresholds: &'a FilterThresholds, engine: EngineKind) -> Self {
        Self {
            filter: ConfidenceFilter::new(thresholds, engine),
            state: FilterState::default(),
            best: BTreeMap::new(),
            accepted_proteins: HashSet::new(),
            records_read: 0,
            records_accepted: 0,
        }
    }

    /// Evaluate one record, returning whether it now represents its scan
    pub fn push(&mut self, record: IdentificationRecord, used: &mut ThresholdsUsed) -> bool {
        self.records_read += 1;
        let already_accepted = self.accepted_proteins.contains(&record.protein);
        let scores = match self
            .filter
            .evaluate(&record, already_accepted, &mut self.state, used)
        {
            FilterDecision::Accept(scores) => scores,
            FilterDecision::Reject(_) => return false,
        };
        self.records_accepted += 1;
        self.accepted_proteins.insert(record.protein.clone());

        match self.best.get(&record.scan) {
            Some(current) if !scores.supersedes(&current.scores()) => false,
            _ => {
                let scan = record.scan;
                let selected = SelectedMatch::new(record, scores);
                if let Some(previous) = self.best.insert(scan, selected) {
                    debug!(
                        "Scan {scan}: {} ({}) superseded by a better match",
                        previous.record.peptide, previous.comparison_score
                    );
                }
                true
            }
        }
    }

    pub fn finish(self) -> Selection {
        let matches: Vec<SelectedMatch> = self.best.into_values().collect();
        let mut by_protein: IndexMap<String, Vec<usize>> = IndexMap::new();
        for (i, m) in matches.iter().enumerate() {
            by_protein.entry(m.protein().to_string()).or_default().push(i);
        }
        let selection = Selection {
            matches,
            by_protein,
            records_read: self.records_read,
            records_accepted: self.records_accepted,
            filter_state: self.state,
        };
        info!(
            "Selected {} scans across {} proteins from {} records ({} passed filtering)",
            selection.len(),
            selection.protein_count(),
            selection.records_read,
            selection.records_accepted
        );
        selection
    }

    /// Run a complete selection pass over `records`, stopping at the first read error
    pub fn select<I, E>(
        thresholds: &'a FilterThresholds,
        engine: EngineKind,
        records: I,
        used: &mut ThresholdsUsed,
    ) -> Result<Selection, E>
    where
        I: IntoIterator<Item = Result<IdentificationRecord, E>>,
    {
        let mut selector = Self::new(thresholds, engine);
        for record in records {
            selector.push(record?, used);
        }
        Ok(selector.finish())
    }
}
