use std::fmt::Display;
use std::fs;
use std::io;
use std::path::PathBuf;

use log::{error, info, warn};
use thiserror::Error;

use super::config::BatchConfig;
use super::external::{Converter, FileRetriever};
use super::job::{process_job, write_then_rename, JobError, JobOutput};
use crate::provenance::{describe_thresholds, write_manifest_file, SubmissionStatus};
use crate::run::RunContext;

/// A job that could not be processed
#[derive(Debug)]
pub struct JobFailure {
    pub job_id: String,
    pub dataset: String,
    pub error: JobError,
}

impl Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.dataset, self.error)
    }
}

fn list_failures(failures: &[JobFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Aborting after {} failed jobs: {}", failures.len(), list_failures(failures))]
    TooManyFailures { failures: Vec<JobFailure> },
    #[error("Failed to write the manifest: {0}")]
    ManifestError(#[source] io::Error),
    #[error("An IO error occurred while preparing the output: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub completed: Vec<JobOutput>,
    /// Jobs that produced no identifications. They are not counted as failures.
    pub empty: Vec<String>,
    pub failures: Vec<JobFailure>,
    pub manifest: Option<PathBuf>,
    pub status: Option<SubmissionStatus>,
}

impl BatchSummary {
    pub fn jobs_seen(&self) -> usize {
        self.completed.len() + self.empty.len() + self.failures.len()
    }
}

/// Process every job of `config` in dataset order against `context`, then
/// write the manifest for everything that was produced
pub fn run_batch(
    config: &BatchConfig,
    context: &mut RunContext,
    retriever: &dyn FileRetriever,
    converter: Option<&dyn Converter>,
) -> Result<BatchSummary, BatchError> {
    fs::create_dir_all(&config.output_directory)?;
    let mut summary = BatchSummary::default();
    for (dataset, jobs) in config.jobs_by_dataset() {
        info!("Processing {} jobs of dataset {dataset}", jobs.len());
        for job in jobs {
            match process_job(job, config, context, retriever, converter) {
                Ok(output) => summary.completed.push(output),
                Err(error) if !error.is_fatal() => {
                    warn!("{error}");
                    summary.empty.push(job.job_id.clone());
                }
                Err(error) => {
                    error!("{error}");
                    summary.failures.push(JobFailure {
                        job_id: job.job_id.clone(),
                        dataset: dataset.to_string(),
                        error,
                    });
                    if summary.failures.len() > config.max_failures {
                        error!(
                            "{} jobs failed, more than the {} allowed",
                            summary.failures.len(),
                            config.max_failures
                        );
                        return Err(BatchError::TooManyFailures {
                            failures: summary.failures,
                        });
                    }
                }
            }
        }
    }

    if !context.files.is_empty() {
        let path = config.manifest_path();
        let thresholds = describe_thresholds(&config.thresholds, &context.thresholds_used);
        write_then_rename(&path, |partial| {
            write_manifest_file(partial, &config.manifest, &context.files, &thresholds)
        })
        .map_err(BatchError::ManifestError)?;
        summary.status = Some(context.files.submission_status());
        summary.manifest = Some(path);
    } else {
        warn!("No files were produced, skipping the manifest");
    }
    info!(
        "Batch finished: {} jobs completed, {} empty, {} failed",
        summary.completed.len(),
        summary.empty.len(),
        summary.failures.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::EngineKind;
    use crate::pipeline::config::JobConfig;
    use crate::pipeline::external::LocalFileRetriever;
    use std::path::Path;

    fn job(job_id: &str, dataset: &str, result_file: &str) -> JobConfig {
        JobConfig {
            job_id: job_id.into(),
            dataset: dataset.into(),
            engine: EngineKind::MSGFPlus,
            result_file: result_file.into(),
            raw_file: None,
            spectrum_file: None,
            search_file: None,
            fasta: Some("./test/data/small.fasta".into()),
            report_template: None,
            mzid_template: Some("./test/data/mzid_template.mzid".into()),
            instrument_group: None,
            sample: Default::default(),
            engine_version: None,
        }
    }

    fn batch(output_directory: &Path, max_failures: usize, jobs: Vec<JobConfig>) -> BatchConfig {
        BatchConfig {
            thresholds: Default::default(),
            max_failures,
            output_directory: output_directory.to_path_buf(),
            compute_checksums: false,
            manifest_name: "submission.px".into(),
            manifest: Default::default(),
            converter: None,
            jobs,
        }
    }

    #[test_log::test]
    fn test_empty_selection_is_not_counted() -> Result<(), BatchError> {
        let dir = tempfile::tempdir()?;
        let config = batch(
            dir.path(),
            0,
            vec![
                job("1", "DS1", "./test/data/msgfplus_decoys_syn.txt"),
                job("2", "DS1", "./test/data/msgfplus_syn.txt"),
            ],
        );
        let mut context = RunContext::new(false);
        let summary = run_batch(&config, &mut context, &LocalFileRetriever, None)?;
        assert_eq!(summary.empty, vec!["1".to_string()]);
        assert_eq!(summary.completed.len(), 1);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.jobs_seen(), 2);

        let manifest = summary.manifest.unwrap();
        assert_eq!(manifest, dir.path().join("submission.px"));
        let text = fs::read_to_string(&manifest)?;
        assert!(text.contains("MTD\tsubmission_type\tCOMPLETE"));
        assert!(text.contains("\tRESULT\t"));
        assert_eq!(summary.status, Some(SubmissionStatus::Complete));
        Ok(())
    }

    #[test]
    fn test_failure_budget() {
        let dir = tempfile::tempdir().unwrap();
        let jobs = vec![
            job("1", "DS1", "./test/data/missing_a.txt"),
            job("2", "DS2", "./test/data/msgfplus_syn.txt"),
            job("3", "DS1", "./test/data/missing_b.txt"),
            job("4", "DS2", "./test/data/msgfplus_syn.txt"),
        ];

        let config = batch(dir.path(), 2, jobs.clone());
        let mut context = RunContext::new(false);
        let summary = run_batch(&config, &mut context, &LocalFileRetriever, None).unwrap();
        assert_eq!(summary.failures.len(), 2);
        assert_eq!(summary.completed.len(), 2);
        assert_eq!(summary.failures[0].job_id, "1");
        // Jobs of the first dataset run before the second dataset's
        assert_eq!(summary.failures[1].job_id, "3");

        let config = batch(dir.path(), 1, jobs);
        context.reset();
        match run_batch(&config, &mut context, &LocalFileRetriever, None) {
            Err(BatchError::TooManyFailures { failures }) => {
                assert_eq!(failures.len(), 2);
                assert!(context.files.is_empty());
            }
            other => panic!("Expected the batch to abort, got {other:?}"),
        }
    }
}
