use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::io::compression::is_gzipped_extension;
use crate::params::{ControlledVocabulary, ParamCow};

/// Peak list formats a job's spectra may be supplied in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MassSpectrometryFormat {
    MGF,
    MzML,
    MzXML,
    DTA,
    PKL,
    MS2,
    Unknown,
}

const MZML_FORMAT: ParamCow<'static> = ControlledVocabulary::MS.const_param("mzML format", "MS:1000584");
const MGF_FORMAT: ParamCow<'static> = ControlledVocabulary::MS.const_param("Mascot MGF format", "MS:1001062");
const MZXML_FORMAT: ParamCow<'static> = ControlledVocabulary::MS.const_param("ISB mzXML format", "MS:1000566");
const DTA_FORMAT: ParamCow<'static> = ControlledVocabulary::MS.const_param("DTA format", "MS:1000613");
const PKL_FORMAT: ParamCow<'static> = ControlledVocabulary::MS.const_param("Micromass PKL format", "MS:1000565");
const MS2_FORMAT: ParamCow<'static> = ControlledVocabulary::MS.const_param("MS2 format", "MS:1001466");

const KNOWN_FORMAT_ACCESSIONS: &[&str] = &[
    "MS:1000584",
    "MS:1001062",
    "MS:1000566",
    "MS:1000613",
    "MS:1000565",
    "MS:1001466",
];

impl MassSpectrometryFormat {
    /// The file format term describing this format, if it has one
    pub const fn file_format_param(&self) -> Option<ParamCow<'static>> {
        match self {
            Self::MzML => Some(MZML_FORMAT),
            Self::MGF => Some(MGF_FORMAT),
            Self::MzXML => Some(MZXML_FORMAT),
            Self::DTA => Some(DTA_FORMAT),
            Self::PKL => Some(PKL_FORMAT),
            Self::MS2 => Some(MS2_FORMAT),
            Self::Unknown => None,
        }
    }

    pub const fn label(&self) -> &'static str {
        match self {
            Self::MGF => "MGF",
            Self::MzML => "mzML",
            Self::MzXML => "mzXML",
            Self::DTA => "DTA",
            Self::PKL => "PKL",
            Self::MS2 => "MS2",
            Self::Unknown => "unknown",
        }
    }

    /// Whether `accession` names any spectrum file format this crate knows
    pub fn is_format_accession(accession: &str) -> bool {
        KNOWN_FORMAT_ACCESSIONS.contains(&accession)
    }
}

impl Display for MassSpectrometryFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Given a path, infer the file format and whether or not the file at that path is
/// GZIP compressed
pub fn infer_from_path<P: Into<PathBuf>>(path: P) -> (MassSpectrometryFormat, bool) {
    let (is_gzipped, path) = is_gzipped_extension(path.into());
    let format = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("mzml") => MassSpectrometryFormat::MzML,
        Some("mgf") => MassSpectrometryFormat::MGF,
        Some("mzxml") => MassSpectrometryFormat::MzXML,
        Some("dta") => MassSpectrometryFormat::DTA,
        Some("pkl") => MassSpectrometryFormat::PKL,
        Some("ms2") => MassSpectrometryFormat::MS2,
        _ => MassSpectrometryFormat::Unknown,
    };
    (format, is_gzipped)
}

/// A spectrum source file as it is referenced from the rewritten documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub location: String,
    pub file_format: MassSpectrometryFormat,
}

impl SourceFile {
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let location = path.to_string_lossy().to_string();
        let (file_format, _) = infer_from_path(path);
        Self {
            name,
            location,
            file_format,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::params::ParamLike;

    #[test]
    fn test_infer_from_path() {
        assert_eq!(infer_from_path("run_01.mzML"), (MassSpectrometryFormat::MzML, false));
        assert_eq!(infer_from_path("run_01.mgf.gz"), (MassSpectrometryFormat::MGF, true));
        assert_eq!(infer_from_path("run_01.raw"), (MassSpectrometryFormat::Unknown, false));
    }

    #[test]
    fn test_source_file() {
        let source = SourceFile::from_path(Path::new("/data/run_01.mzXML"));
        assert_eq!(source.name, "run_01.mzXML");
        assert_eq!(source.file_format, MassSpectrometryFormat::MzXML);
        let param = source.file_format.file_format_param().unwrap();
        assert_eq!(param.accession(), Some("MS:1000566"));
        assert!(MassSpectrometryFormat::is_format_accession("MS:1001062"));
        assert!(!MassSpectrometryFormat::is_format_accession("MS:1000768"));
    }
}
