//! Writing a ProteomeXchange-style submission manifest.
//!
//! The manifest has three sections separated by blank lines: `MTD` metadata
//! lines, the `FMH`/`FME` file table and the `SMH`/`SME` sample table.
use std::borrow::Cow;
use std::fs;
use std::io::{self, prelude::*, BufWriter};
use std::path::Path;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use log::info;
use serde::{Deserialize, Serialize};

use super::graph::{FileRegistry, SubmissionStatus};
use crate::meta::SampleMetadata;
use crate::params::{Param, ParamLike};
use crate::psm::{FilterThresholds, ThresholdsUsed};

/// Submission-level descriptions supplied by the submitter
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestMetadata {
    pub submitter_name: String,
    pub submitter_email: String,
    pub submitter_affiliation: String,
    pub lab_head_name: String,
    pub lab_head_email: String,
    pub lab_head_affiliation: String,
    pub project_title: String,
    pub project_description: String,
    pub keywords: Vec<String>,
    pub sample_processing_protocol: String,
    pub data_processing_protocol: String,
    pub experiment_type: Vec<Param>,
}

pub const FILE_TABLE_COLUMNS: [&str; 5] = [
    "file_id",
    "file_type",
    "file_path",
    "file_mapping",
    "file_checksum",
];

pub const SAMPLE_TABLE_COLUMNS: [&str; 9] = [
    "file_id",
    "species",
    "tissue",
    "cell_type",
    "disease",
    "modification",
    "instrument",
    "quantification",
    "experimental_factor",
];

/// Describe the confidence thresholds that were applied during the run
pub fn describe_thresholds(thresholds: &FilterThresholds, used: &ThresholdsUsed) -> Vec<String> {
    let mut described = Vec::new();
    if used.spec_prob {
        described.push(format!("spectral probability < {:e}", thresholds.spec_prob));
    }
    if used.pep_fdr {
        described.push(format!("peptide FDR < {}", thresholds.pep_fdr));
    }
    if used.fdr {
        described.push(format!("FDR < {}", thresholds.fdr));
    }
    if used.p_value {
        described.push(format!("p-value < {}", thresholds.p_value));
    }
    described
}

/// Collect the distinct terms of one sample column across every submitted file
fn distinct_terms<'a, F>(samples: &[&'a SampleMetadata], column: F) -> IndexSet<&'a Param>
where
    F: Fn(&'a SampleMetadata) -> &'a [Param],
{
    samples.iter().copied().flat_map(|s| column(s).iter()).collect()
}

/// Fold tabs and line breaks into single spaces so a cell cannot split its
/// line or shift the columns after it
pub fn sanitize_cell(cell: &str) -> Cow<'_, str> {
    if !cell.contains(['\t', '\r', '\n']) {
        return Cow::Borrowed(cell);
    }
    let mut cleaned = String::with_capacity(cell.len());
    let mut in_break = false;
    for c in cell.chars() {
        if matches!(c, '\t' | '\r' | '\n') {
            if !in_break {
                cleaned.push(' ');
            }
            in_break = true;
        } else {
            cleaned.push(c);
            in_break = false;
        }
    }
    Cow::Owned(cleaned)
}

#[derive(Debug)]
pub struct ManifestWriter<W: Write> {
    handle: BufWriter<W>,
    created: DateTime<Utc>,
}

impl<W: Write> ManifestWriter<W> {
    pub fn new(file: W) -> Self {
        Self {
            handle: BufWriter::new(file),
            created: Utc::now(),
        }
    }

    pub fn with_creation_time(mut self, created: DateTime<Utc>) -> Self {
        self.created = created;
        self
    }

    fn line(&mut self, tag: &str, cells: &[&str]) -> io::Result<()> {
        self.handle.write_all(tag.as_bytes())?;
        for cell in cells {
            self.handle.write_all(b"\t")?;
            self.handle.write_all(sanitize_cell(cell).as_bytes())?;
        }
        self.handle.write_all(b"\n")
    }

    fn metadata(&mut self, key: &str, value: &str) -> io::Result<()> {
        if value.trim().is_empty() {
            return Ok(());
        }
        self.line("MTD", &[key, value])
    }

    fn metadata_terms<'a, I: IntoIterator<Item = &'a Param>>(
        &mut self,
        key: &str,
        terms: I,
    ) -> io::Result<()> {
        for term in terms {
            self.line("MTD", &[key, &term.to_bracketed()])?;
        }
        Ok(())
    }

    pub fn write_header(
        &mut self,
        metadata: &ManifestMetadata,
        status: SubmissionStatus,
        samples: &[&SampleMetadata],
        thresholds: &[String],
    ) -> io::Result<()> {
        let created = self.created.format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let comment = format!(
            "Generated by {} {} on {created}",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
        self.line("COM", &[comment.as_str()])?;
        self.metadata("submitter_name", &metadata.submitter_name)?;
        self.metadata("submitter_email", &metadata.submitter_email)?;
        self.metadata("submitter_affiliation", &metadata.submitter_affiliation)?;
        self.metadata("lab_head_name", &metadata.lab_head_name)?;
        self.metadata("lab_head_email", &metadata.lab_head_email)?;
        self.metadata("lab_head_affiliation", &metadata.lab_head_affiliation)?;
        self.metadata("submission_type", &status.to_string())?;
        self.metadata("project_title", &metadata.project_title)?;
        self.metadata("project_description", &metadata.project_description)?;
        self.metadata("keywords", &metadata.keywords.join(", "))?;
        self.metadata("sample_processing_protocol", &metadata.sample_processing_protocol)?;
        self.metadata("data_processing_protocol", &metadata.data_processing_protocol)?;
        self.metadata_terms("experiment_type", &metadata.experiment_type)?;
        self.metadata_terms("species", distinct_terms(samples, |s| s.species.as_slice()))?;
        self.metadata_terms("tissue", distinct_terms(samples, |s| s.tissue.as_slice()))?;
        self.metadata_terms("cell_type", distinct_terms(samples, |s| s.cell_type.as_slice()))?;
        self.metadata_terms("disease", distinct_terms(samples, |s| s.disease.as_slice()))?;
        self.metadata_terms("instrument", distinct_terms(samples, |s| s.instrument.as_slice()))?;
        self.metadata_terms("modification", distinct_terms(samples, |s| s.modification.as_slice()))?;
        self.metadata_terms("quantification", distinct_terms(samples, |s| s.quantification.as_slice()))?;
        for threshold in thresholds {
            self.metadata("threshold_used", threshold)?;
        }
        Ok(())
    }

    pub fn write_file_table(&mut self, registry: &FileRegistry) -> io::Result<usize> {
        self.handle.write_all(b"\n")?;
        self.line("FMH", &FILE_TABLE_COLUMNS)?;
        let mut rows = 0;
        for result in registry.result_files() {
            let Some(file) = registry.get(result.id) else {
                continue;
            };
            let mapping = result
                .parents
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(",");
            let id = result.id.to_string();
            let path = file.path.to_string_lossy();
            self.line(
                "FME",
                &[
                    id.as_str(),
                    result.kind.tag(),
                    path.as_ref(),
                    mapping.as_str(),
                    file.checksum.as_str(),
                ],
            )?;
            rows += 1;
        }
        Ok(rows)
    }

    pub fn write_sample_table(&mut self, registry: &FileRegistry) -> io::Result<usize> {
        self.handle.write_all(b"\n")?;
        self.line("SMH", &SAMPLE_TABLE_COLUMNS)?;
        let mut rows = 0;
        for result in registry.result_files() {
            let Some(sample) = result.sample.as_ref() else {
                continue;
            };
            let id = result.id.to_string();
            let columns = sample.columns();
            let mut cells: Vec<&str> = vec![id.as_str()];
            cells.extend(columns.iter().map(|c| c.as_str()));
            self.line("SME", &cells)?;
            rows += 1;
        }
        Ok(rows)
    }

    /// Write the complete manifest for `registry`
    pub fn write_manifest(
        &mut self,
        metadata: &ManifestMetadata,
        registry: &FileRegistry,
        thresholds: &[String],
    ) -> io::Result<()> {
        let samples: Vec<&SampleMetadata> = registry
            .result_files()
            .into_iter()
            .filter_map(|r| r.sample.as_ref())
            .collect();
        let status = registry.submission_status();
        self.write_header(metadata, status, &samples, thresholds)?;
        let files = self.write_file_table(registry)?;
        let samples = self.write_sample_table(registry)?;
        info!("Wrote a {status} manifest covering {files} files and {samples} samples");
        self.flush()
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.handle.flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.handle.into_inner().map_err(|e| e.into_error())
    }
}

/// Write the manifest for `registry` to a new file at `path`
pub fn write_manifest_file(
    path: &Path,
    metadata: &ManifestMetadata,
    registry: &FileRegistry,
    thresholds: &[String],
) -> io::Result<()> {
    let mut writer = ManifestWriter::new(fs::File::create(path)?);
    writer.write_manifest(metadata, registry, thresholds)
}
