use std::collections::HashSet;
use std::fs;
use std::io::{self, prelude::*};
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::meta::{EngineKind, SampleMetadata};
use crate::provenance::ManifestMetadata;
use crate::psm::FilterThresholds;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read the configuration: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
    #[error("Failed to parse the configuration: {0}")]
    JSONError(
        #[from]
        #[source]
        serde_json::Error,
    ),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// One identification job: a search engine result file and the files that
/// describe where it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub job_id: String,
    pub dataset: String,
    pub engine: EngineKind,
    /// The search engine's tab-separated synopsis or first-hits file
    pub result_file: PathBuf,
    #[serde(default)]
    pub raw_file: Option<PathBuf>,
    #[serde(default)]
    pub spectrum_file: Option<PathBuf>,
    /// The engine's native output, when it differs from `result_file`
    #[serde(default)]
    pub search_file: Option<PathBuf>,
    #[serde(default)]
    pub fasta: Option<PathBuf>,
    #[serde(default)]
    pub report_template: Option<PathBuf>,
    #[serde(default)]
    pub mzid_template: Option<PathBuf>,
    #[serde(default)]
    pub instrument_group: Option<String>,
    #[serde(default)]
    pub sample: SampleMetadata,
    #[serde(default)]
    pub engine_version: Option<String>,
}

/// How to invoke the external converter that serializes a job's final document.
///
/// Arguments may contain the placeholders `{report}`, `{mzid}`,
/// `{intermediate}`, `{spectra}` and `{output}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterConfig {
    pub program: PathBuf,
    #[serde(default)]
    pub arguments: Vec<String>,
    /// File extension of the converter's output
    #[serde(default = "default_converter_extension")]
    pub output_extension: String,
}

fn default_converter_extension() -> String {
    "xml".to_string()
}

fn default_max_failures() -> usize {
    5
}

fn default_output_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_manifest_name() -> String {
    "submission.px".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub thresholds: FilterThresholds,
    /// How many failed jobs are tolerated before the batch is aborted
    #[serde(default = "default_max_failures")]
    pub max_failures: usize,
    #[serde(default = "default_output_directory")]
    pub output_directory: PathBuf,
    #[serde(default)]
    pub compute_checksums: bool,
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
    #[serde(default)]
    pub manifest: ManifestMetadata,
    #[serde(default)]
    pub converter: Option<ConverterConfig>,
    pub jobs: Vec<JobConfig>,
}

impl BatchConfig {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let handle = io::BufReader::new(fs::File::open(path)?);
        Self::from_reader(handle)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for job in self.jobs.iter() {
            if job.job_id.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "a job of dataset {:?} has no job id",
                    job.dataset
                )));
            }
            if !seen.insert(job.job_id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "job {} is listed more than once",
                    job.job_id
                )));
            }
        }
        if self.manifest_name.trim().is_empty() {
            return Err(ConfigError::Invalid("the manifest name is empty".into()));
        }
        Ok(())
    }

    /// Jobs grouped by dataset. Both datasets and the jobs within them keep
    /// the order they first appear in.
    pub fn jobs_by_dataset(&self) -> IndexMap<&str, Vec<&JobConfig>> {
        let mut groups: IndexMap<&str, Vec<&JobConfig>> = IndexMap::new();
        for job in self.jobs.iter() {
            groups.entry(job.dataset.as_str()).or_default().push(job);
        }
        groups
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_directory.join(&self.manifest_name)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const CONFIG: &str = r#"{
        "thresholds": {"use_spec_prob": true, "spec_prob": 1e-10},
        "output_directory": "/tmp/out",
        "manifest": {"submitter_name": "A. Submitter"},
        "jobs": [
            {"job_id": "1001", "dataset": "DS_B", "engine": "MSGFPlus", "result_file": "b1_syn.txt"},
            {"job_id": "1002", "dataset": "DS_A", "engine": "sequest", "result_file": "a1_syn.txt",
             "instrument_group": "VelosOrbi",
             "sample": {"species": [{"name": "Homo sapiens (Human)", "accession": "9606", "cv": "NEWT"}]}},
            {"job_id": "1003", "dataset": "DS_B", "engine": "X!Tandem", "result_file": "b2_xt.txt"}
        ]
    }"#;

    #[test]
    fn test_parse() -> Result<(), ConfigError> {
        let config = BatchConfig::from_reader(CONFIG.as_bytes())?;
        assert_eq!(config.max_failures, 5);
        assert_eq!(config.manifest_name, "submission.px");
        assert_eq!(config.manifest_path(), PathBuf::from("/tmp/out/submission.px"));
        assert!(config.thresholds.use_spec_prob);
        assert_eq!(config.thresholds.spec_prob, 1e-10);
        assert!(config.thresholds.use_p_value);
        assert_eq!(config.thresholds.p_value, 0.05);
        assert!(config.converter.is_none());

        assert_eq!(config.jobs[1].engine, EngineKind::Sequest);
        assert_eq!(config.jobs[2].engine, EngineKind::XTandem);
        let species = config.jobs[1].sample.primary_species().unwrap();
        assert_eq!(species.accession.as_deref(), Some("9606"));

        let groups = config.jobs_by_dataset();
        let order: Vec<(&str, Vec<&str>)> = groups
            .iter()
            .map(|(k, v)| (*k, v.iter().map(|j| j.job_id.as_str()).collect()))
            .collect();
        assert_eq!(
            order,
            vec![("DS_B", vec!["1001", "1003"]), ("DS_A", vec!["1002"])]
        );
        Ok(())
    }

    #[test]
    fn test_duplicate_job() {
        let text = r#"{"jobs": [
            {"job_id": "7", "dataset": "D", "engine": "Inspect", "result_file": "a.txt"},
            {"job_id": "7", "dataset": "D", "engine": "Inspect", "result_file": "b.txt"}
        ]}"#;
        assert!(matches!(
            BatchConfig::from_reader(text.as_bytes()),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BatchConfig::from_reader(&b"{"[..]),
            Err(ConfigError::JSONError(_))
        ));
    }
}
