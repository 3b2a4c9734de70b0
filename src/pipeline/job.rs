use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use super::config::{BatchConfig, JobConfig};
use super::external::{Converter, ConverterInputs, ConverterRequest, FileRetriever};
use crate::io::fasta::FastaError;
use crate::io::rewrite::{
    rewrite_file, MzIdContext, MzIdHandler, ReportContext, ReportHandler, RewriteError,
    RewriteHandler,
};
use crate::io::synopsis::{open_result_file, ResultFileError};
use crate::io::write_pseudo_msgf;
use crate::meta::{describe_instrument_group, SourceFile};
use crate::provenance::{FileId, FileKind, ProvenanceError};
use crate::psm::PSMSelector;
use crate::run::RunContext;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Job {job}: required input {} is not available: {source}", path.display())]
    MissingInput {
        job: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Job {job}: {message}")]
    StructuralMismatch { job: String, message: String },
    #[error("Job {job}: no identifications passed filtering")]
    SelectionEmpty { job: String },
    #[error("Job {job}: rewriting {} failed: {source}", template.display())]
    RewriteAborted {
        job: String,
        template: PathBuf,
        #[source]
        source: RewriteError,
    },
    #[error(transparent)]
    ResultFileError(#[from] ResultFileError),
    #[error(transparent)]
    FastaError(#[from] FastaError),
    #[error(transparent)]
    IOError(#[from] io::Error),
}

impl JobError {
    /// Whether the failure counts against the batch's failure budget. An empty
    /// selection is reported but can legitimately happen.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SelectionEmpty { .. })
    }

    fn structural(job: &JobConfig, error: ProvenanceError) -> Self {
        Self::StructuralMismatch {
            job: job.job_id.clone(),
            message: error.to_string(),
        }
    }
}

/// What one successfully processed job produced
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutput {
    pub job_id: String,
    pub dataset: String,
    pub records_read: usize,
    pub scans_retained: usize,
    pub proteins: usize,
    pub intermediate: PathBuf,
    /// Submitted documents with their provenance identities
    pub documents: Vec<(FileId, PathBuf)>,
}

/// The name a file is written under until it is complete
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

/// Run `write` against a temporary path, moving the result into place only
/// when it succeeds
pub fn write_then_rename<T, E, F>(path: &Path, write: F) -> Result<T, E>
where
    F: FnOnce(&Path) -> Result<T, E>,
    E: From<io::Error>,
{
    let partial = partial_path(path);
    match write(&partial) {
        Ok(value) => {
            fs::rename(&partial, path)?;
            Ok(value)
        }
        Err(e) => {
            if partial.exists() {
                if let Err(cleanup) = fs::remove_file(&partial) {
                    warn!("Failed to remove {}: {cleanup}", partial.display());
                }
            }
            Err(e)
        }
    }
}

fn retrieve(
    job: &JobConfig,
    retriever: &dyn FileRetriever,
    path: &Path,
) -> Result<PathBuf, JobError> {
    retriever
        .retrieve(path)
        .map_err(|source| JobError::MissingInput {
            job: job.job_id.clone(),
            path: path.to_path_buf(),
            source,
        })
}

fn retrieve_optional(
    job: &JobConfig,
    retriever: &dyn FileRetriever,
    path: Option<&Path>,
) -> Result<Option<PathBuf>, JobError> {
    path.map(|p| retrieve(job, retriever, p)).transpose()
}

/// Rewrite `template` into `destination`, moving it into place only once
/// `check` accepts the finished handler
fn rewrite_document<H, F>(
    job: &JobConfig,
    template: &Path,
    destination: &Path,
    handler: H,
    check: F,
) -> Result<(H, String), JobError>
where
    H: RewriteHandler,
    F: FnOnce(&H) -> Result<(), JobError>,
{
    write_then_rename(destination, |partial| {
        let (handler, checksum) =
            rewrite_file(template, partial, handler).map_err(|source| match source {
                RewriteError::IOError(e) => JobError::IOError(e),
                source => JobError::RewriteAborted {
                    job: job.job_id.clone(),
                    template: template.to_path_buf(),
                    source,
                },
            })?;
        check(&handler)?;
        Ok((handler, checksum))
    })
}

/// Output files of a job still in progress. They are removed when dropped
/// unless the job was committed.
#[derive(Debug, Default)]
struct PendingOutputs {
    paths: Vec<PathBuf>,
    committed: bool,
}

impl PendingOutputs {
    fn push(&mut self, path: &Path) {
        self.paths.push(path.to_path_buf());
    }

    fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for PendingOutputs {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for path in self.paths.iter().rev() {
            if !path.exists() {
                continue;
            }
            match fs::remove_file(path) {
                Ok(()) => debug!("Discarded {}", path.display()),
                Err(e) => warn!("Failed to remove {}: {e}", path.display()),
            }
        }
    }
}

/// Select, rewrite and register one job's results
pub fn process_job(
    job: &JobConfig,
    config: &BatchConfig,
    context: &mut RunContext,
    retriever: &dyn FileRetriever,
    converter: Option<&dyn Converter>,
) -> Result<JobOutput, JobError> {
    info!("Processing job {} of dataset {} ({})", job.job_id, job.dataset, job.engine);
    let result_file = retrieve(job, retriever, &job.result_file)?;
    let report_template = retrieve_optional(job, retriever, job.report_template.as_deref())?;
    let mzid_template = retrieve_optional(job, retriever, job.mzid_template.as_deref())?;
    let fasta = retrieve_optional(job, retriever, job.fasta.as_deref())?;
    let raw_file = retrieve_optional(job, retriever, job.raw_file.as_deref())?;

    let spectrum_file = match job.spectrum_file.as_deref() {
        Some(path) => {
            let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
            match context.shared_artifact(&name) {
                Some(shared) => {
                    debug!("Reusing {} from an earlier job", shared.display());
                    Some(shared.to_path_buf())
                }
                None => {
                    let local = retrieve(job, retriever, path)?;
                    context.share_artifact(&name, &local);
                    Some(local)
                }
            }
        }
        None => None,
    };
    let source_file = spectrum_file.as_deref().map(SourceFile::from_path);

    context.proteins.prepare(fasta.as_deref())?;

    let mut reader = open_result_file(&result_file, job.engine)?;
    if let Some(source) = source_file.as_ref() {
        reader = reader.with_spectrum_file(source.name.clone());
    }
    let selection = PSMSelector::select(
        &config.thresholds,
        job.engine,
        reader,
        &mut context.thresholds_used,
    )?;
    if selection.is_empty() {
        warn!(
            "Job {}: none of {} records passed filtering",
            job.job_id, selection.records_read
        );
        return Err(JobError::SelectionEmpty {
            job: job.job_id.clone(),
        });
    }
    context.proteins.update_counts(&selection);

    let output_directory = config.output_directory.join(&job.dataset);
    fs::create_dir_all(&output_directory)?;

    let mut pending = PendingOutputs::default();
    let intermediate = output_directory.join(format!("{}_msgf.txt", job.job_id));
    let rows = write_then_rename(&intermediate, |partial| {
        write_pseudo_msgf(partial, &selection, &context.proteins)
    })?;
    pending.push(&intermediate);
    debug!("Wrote {rows} rows to {}", intermediate.display());

    let instrument = match job.instrument_group.as_deref() {
        Some(group) => {
            let found = describe_instrument_group(group);
            if found.is_none() {
                warn!("Job {}: unknown instrument group {group}, keeping the template's", job.job_id);
            }
            found
        }
        None => None,
    };

    let mut documents: Vec<(PathBuf, String)> = Vec::new();
    let mut report_path = None;
    if let Some(template) = report_template.as_deref() {
        let destination = output_directory.join(format!("{}.report.xml", job.job_id));
        let handler = ReportHandler::new(ReportContext {
            engine: job.engine,
            engine_version: job.engine_version.as_deref(),
            instrument,
            sample: &job.sample,
            spectrum_file: source_file.as_ref(),
            selection: &selection,
            proteins: &context.proteins,
            threshold: context.thresholds_used.reported_threshold(&config.thresholds),
        });
        let (_, checksum) = rewrite_document(job, template, &destination, handler, |handler| {
            if handler.identifications_written() {
                Ok(())
            } else {
                Err(JobError::StructuralMismatch {
                    job: job.job_id.clone(),
                    message: format!("{} has no Identifications element", template.display()),
                })
            }
        })?;
        pending.push(&destination);
        report_path = Some(destination.clone());
        documents.push((destination, checksum));
    }

    let mut mzid_path = None;
    if let Some(template) = mzid_template.as_deref() {
        let destination = output_directory.join(format!("{}.mzid", job.job_id));
        let handler = MzIdHandler::new(MzIdContext {
            engine: job.engine,
            engine_version: job.engine_version.as_deref(),
            search_database: fasta.as_deref(),
            spectrum_file: source_file.as_ref(),
        });
        let (handler, checksum) =
            rewrite_document(job, template, &destination, handler, |_| Ok(()))?;
        pending.push(&destination);
        debug!("Applied {} overrides to {}", handler.overrides_applied(), destination.display());
        mzid_path = Some(destination.clone());
        documents.push((destination, checksum));
    }

    if let (Some(converter), Some(converter_config)) = (converter, config.converter.as_ref()) {
        let output = output_directory.join(format!(
            "{}.{}",
            job.job_id, converter_config.output_extension
        ));
        let inputs = ConverterInputs {
            report: report_path.as_deref(),
            mzid: mzid_path.as_deref(),
            intermediate: &intermediate,
            spectra: spectrum_file.as_deref(),
        };
        let request = ConverterRequest::new(converter_config, &inputs, &output);
        let converted = converter.convert(&request)?;
        pending.push(&converted);
        documents.push((converted, String::new()));
    }

    let mut parents = Vec::new();
    for (path, kind) in [
        (raw_file.as_deref(), FileKind::RAW),
        (spectrum_file.as_deref(), FileKind::PEAK),
        (
            Some(job.search_file.as_deref().unwrap_or(result_file.as_path())),
            FileKind::SEARCH,
        ),
    ] {
        if let Some(path) = path {
            let id = context.files.register(path, &job.job_id);
            context
                .files
                .mark_result(id, kind)
                .map_err(|e| JobError::structural(job, e))?;
            parents.push(id);
        }
    }

    let mut registered = Vec::with_capacity(documents.len());
    for (path, checksum) in documents {
        let id = if checksum.is_empty() {
            context.files.register(&path, &job.job_id)
        } else {
            context.files.register_with_checksum(&path, &job.job_id, checksum)
        };
        context
            .files
            .mark_result(id, FileKind::RESULT)
            .map_err(|e| JobError::structural(job, e))?;
        for parent in parents.iter() {
            context
                .files
                .add_edge(id, *parent)
                .map_err(|e| JobError::structural(job, e))?;
        }
        context
            .files
            .set_sample(id, job.sample.clone())
            .map_err(|e| JobError::structural(job, e))?;
        registered.push((id, path));
    }
    pending.commit();

    info!(
        "Finished job {}: {} scans across {} proteins, {} documents",
        job.job_id,
        selection.len(),
        selection.protein_count(),
        registered.len()
    );
    Ok(JobOutput {
        job_id: job.job_id.clone(),
        dataset: job.dataset.clone(),
        records_read: selection.records_read,
        scans_retained: selection.len(),
        proteins: selection.protein_count(),
        intermediate,
        documents: registered,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::meta::EngineKind;
    use crate::params::ControlledVocabulary;
    use crate::pipeline::external::LocalFileRetriever;
    use crate::provenance::SubmissionStatus;

    fn job(job_id: &str, result_file: &str) -> JobConfig {
        JobConfig {
            job_id: job_id.into(),
            dataset: "DS1".into(),
            engine: EngineKind::MSGFPlus,
            result_file: result_file.into(),
            raw_file: None,
            spectrum_file: None,
            search_file: None,
            fasta: Some("./test/data/small.fasta".into()),
            report_template: Some("./test/data/report_template.xml".into()),
            mzid_template: Some("./test/data/mzid_template.mzid".into()),
            instrument_group: Some("QExactive".into()),
            sample: crate::meta::SampleMetadata {
                species: vec![ControlledVocabulary::NEWT.param("9606", "Homo sapiens (Human)")],
                ..Default::default()
            },
            engine_version: Some("v2024.03.26".into()),
        }
    }

    fn batch(output_directory: &Path, jobs: Vec<JobConfig>) -> BatchConfig {
        BatchConfig {
            thresholds: Default::default(),
            max_failures: 1,
            output_directory: output_directory.to_path_buf(),
            compute_checksums: false,
            manifest_name: "submission.px".into(),
            manifest: Default::default(),
            converter: None,
            jobs,
        }
    }

    #[test_log::test]
    fn test_process_job() -> Result<(), JobError> {
        let dir = tempfile::tempdir()?;
        let job = job("1001", "./test/data/msgfplus_syn.txt");
        let config = batch(dir.path(), vec![job.clone()]);
        let mut context = RunContext::new(false);
        let output = process_job(&job, &config, &mut context, &LocalFileRetriever, None)?;

        assert_eq!(output.scans_retained, 4);
        assert_eq!(output.proteins, 2);
        assert_eq!(output.documents.len(), 2);
        assert!(output.intermediate.exists());
        assert!(!partial_path(&output.intermediate).exists());
        let intermediate = fs::read_to_string(&output.intermediate)?;
        assert_eq!(intermediate.lines().count(), 5);

        let report = fs::read_to_string(dir.path().join("DS1").join("1001.report.xml"))?;
        assert!(report.contains("GelFreeIdentification"));
        assert!(report.contains("Q Exactive"));

        assert_eq!(context.files.len(), 3);
        let counts = context.files.counts();
        assert_eq!(counts.search, 1);
        assert_eq!(counts.result, 2);
        assert_eq!(context.files.submission_status(), SubmissionStatus::Complete);
        let (mzid_id, _) = &output.documents[1];
        let record = context.files.get(*mzid_id).unwrap();
        assert_eq!(record.checksum.len(), 32);
        assert!(context.thresholds_used.p_value);
        Ok(())
    }

    #[test]
    fn test_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let job = job("1002", "./test/data/absent_syn.txt");
        let config = batch(dir.path(), vec![job.clone()]);
        let mut context = RunContext::new(false);
        let err = process_job(&job, &config, &mut context, &LocalFileRetriever, None).unwrap_err();
        assert!(matches!(err, JobError::MissingInput { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_selection_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut job = job("1003", "./test/data/msgfplus_decoys_syn.txt");
        job.report_template = None;
        let config = batch(dir.path(), vec![job.clone()]);
        let mut context = RunContext::new(false);
        let err = process_job(&job, &config, &mut context, &LocalFileRetriever, None).unwrap_err();
        assert!(matches!(err, JobError::SelectionEmpty { .. }));
        assert!(!err.is_fatal());
        assert!(context.files.is_empty());
    }

    #[test]
    fn test_report_without_identifications_leaves_no_outputs() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let source = fs::read_to_string("./test/data/report_template.xml")?;
        let start = source.find("<Identifications>").unwrap();
        let end = source.find("</Identifications>").unwrap() + "</Identifications>".len();
        let template = dir.path().join("no_identifications.xml");
        fs::write(&template, format!("{}{}", &source[..start], &source[end..]))?;

        let mut job = job("1004", "./test/data/msgfplus_syn.txt");
        job.report_template = Some(template);
        let config = batch(&dir.path().join("out"), vec![job.clone()]);
        let mut context = RunContext::new(false);
        let err = process_job(&job, &config, &mut context, &LocalFileRetriever, None).unwrap_err();
        assert!(matches!(err, JobError::StructuralMismatch { .. }));
        assert!(err.is_fatal());

        let output_directory = dir.path().join("out").join("DS1");
        let report = output_directory.join("1004.report.xml");
        let intermediate = output_directory.join("1004_msgf.txt");
        assert!(!report.exists());
        assert!(!partial_path(&report).exists());
        assert!(!intermediate.exists());
        assert!(!output_directory.join("1004.mzid").exists());
        assert!(context.files.is_empty());
        Ok(())
    }

    #[test]
    fn test_write_then_rename_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let result: Result<(), io::Error> = write_then_rename(&path, |partial| {
            fs::write(partial, b"half")?;
            Err(io::Error::other("interrupted"))
        });
        assert!(result.is_err());
        assert!(!path.exists());
        assert!(!partial_path(&path).exists());
        assert_eq!(partial_path(&path), dir.path().join("out.txt.partial"));
    }
}
