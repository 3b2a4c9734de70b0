//! Seams to the collaborators that live outside this crate: fetching input
//! files and running the converter that serializes a job's final document.
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use log::{debug, error, info};

use super::config::ConverterConfig;

/// Makes a job's input files available on the local filesystem
pub trait FileRetriever {
    fn retrieve(&self, path: &Path) -> io::Result<PathBuf>;
}

/// Files are already local and are used where they are
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileRetriever;

impl FileRetriever for LocalFileRetriever {
    fn retrieve(&self, path: &Path) -> io::Result<PathBuf> {
        if path.is_file() {
            Ok(path.to_path_buf())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            ))
        }
    }
}

/// The documents a converter invocation works from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterInputs<'a> {
    pub report: Option<&'a Path>,
    pub mzid: Option<&'a Path>,
    pub intermediate: &'a Path,
    pub spectra: Option<&'a Path>,
}

/// A fully resolved converter invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterRequest {
    pub program: PathBuf,
    pub arguments: Vec<OsString>,
    pub output: PathBuf,
}

const DEFAULT_ARGUMENTS: &[&str] = &["{report}", "{intermediate}", "{output}"];

impl ConverterRequest {
    pub fn new(config: &ConverterConfig, inputs: &ConverterInputs<'_>, output: &Path) -> Self {
        let templates: Vec<&str> = if config.arguments.is_empty() {
            DEFAULT_ARGUMENTS.to_vec()
        } else {
            config.arguments.iter().map(|a| a.as_str()).collect()
        };
        let optional = |p: Option<&Path>| p.map(|p| p.to_string_lossy().to_string()).unwrap_or_default();
        let substitutions = [
            ("{report}", optional(inputs.report)),
            ("{mzid}", optional(inputs.mzid)),
            ("{intermediate}", inputs.intermediate.to_string_lossy().to_string()),
            ("{spectra}", optional(inputs.spectra)),
            ("{output}", output.to_string_lossy().to_string()),
        ];
        let arguments = templates
            .into_iter()
            .map(|template| {
                let mut argument = template.to_string();
                for (key, value) in substitutions.iter() {
                    if argument.contains(key) {
                        argument = argument.replace(key, value);
                    }
                }
                OsString::from(argument)
            })
            .collect();
        Self {
            program: config.program.clone(),
            arguments,
            output: output.to_path_buf(),
        }
    }
}

/// Runs a [`ConverterRequest`], returning where the output was written
pub trait Converter {
    fn convert(&self, request: &ConverterRequest) -> io::Result<PathBuf>;
}

/// Runs the converter as a child process and waits for it to finish
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessConverter;

impl Converter for ProcessConverter {
    fn convert(&self, request: &ConverterRequest) -> io::Result<PathBuf> {
        debug!("Running {} {:?}", request.program.display(), request.arguments);
        let output = Command::new(&request.program)
            .args(&request.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!("{} failed: {stderr}", request.program.display());
            return Err(io::Error::other(format!(
                "{} exited with {}: {}",
                request.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        if !request.output.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "{} did not produce {}",
                    request.program.display(),
                    request.output.display()
                ),
            ));
        }
        info!("Converted to {}", request.output.display());
        Ok(request.output.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_local_retriever() {
        let retriever = LocalFileRetriever;
        assert!(retriever.retrieve(Path::new("./test/data/small.fasta")).is_ok());
        let err = retriever
            .retrieve(Path::new("./test/data/not_here.fasta"))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_request_arguments() {
        let config = ConverterConfig {
            program: PathBuf::from("converter"),
            arguments: vec![
                "-R".into(),
                "{report}".into(),
                "--msgf={intermediate}".into(),
                "-P".into(),
                "{spectra}".into(),
                "-O".into(),
                "{output}".into(),
            ],
            output_extension: "xml".into(),
        };
        let inputs = ConverterInputs {
            report: Some(Path::new("/out/job.report.xml")),
            mzid: None,
            intermediate: Path::new("/out/job_msgf.txt"),
            spectra: None,
        };
        let request = ConverterRequest::new(&config, &inputs, Path::new("/out/job.xml"));
        let args: Vec<String> = request
            .arguments
            .iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec!["-R", "/out/job.report.xml", "--msgf=/out/job_msgf.txt", "-P", "", "-O", "/out/job.xml"]
        );

        let config = ConverterConfig {
            arguments: Vec::new(),
            ..config
        };
        let request = ConverterRequest::new(&config, &inputs, Path::new("/out/job.xml"));
        assert_eq!(request.arguments.len(), 3);
        assert_eq!(request.arguments[1], OsString::from("/out/job_msgf.txt"));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_failure() {
        let request = ConverterRequest {
            program: PathBuf::from("false"),
            arguments: Vec::new(),
            output: PathBuf::from("/nonexistent/out.xml"),
        };
        assert!(ProcessConverter.convert(&request).is_err());
    }
}
