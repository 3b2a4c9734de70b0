//! Readers for the tab-separated synopsis and first-hits files each supported
//! search engine produces.
//!
//! Column names differ between engines and between versions of the same
//! engine, so every field is resolved against a list of aliases when the
//! header is read. Only the scan number, peptide and protein columns are
//! required; everything else degrades to "not reported".
use std::io::{self, prelude::*};
use std::path::Path;

use csv::StringRecord;
use log::debug;
use thiserror::Error;

use super::compression::open_text_file;
use crate::meta::EngineKind;
use crate::psm::record::{IdentificationRecord, PeptideAnnotation, SecondaryScores};

#[derive(Debug, Error)]
pub enum ResultFileError {
    #[error("The {engine} result file is missing a {column} column")]
    MissingColumn { engine: EngineKind, column: &'static str },
    #[error("Row {row}: could not parse {value:?} in the {column} column")]
    MalformedValue {
        row: usize,
        column: &'static str,
        value: String,
    },
    #[error("An error occurred while reading tabular data: {0}")]
    CSVError(
        #[from]
        #[source]
        csv::Error,
    ),
    #[error("An IO error occurred while reading a result file: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

impl From<ResultFileError> for io::Error {
    fn from(value: ResultFileError) -> Self {
        match value {
            ResultFileError::IOError(e) => e,
            _ => io::Error::new(io::ErrorKind::InvalidData, value),
        }
    }
}

/// How an engine encodes its p-value column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PValueEncoding {
    Linear,
    /// `log10` of the expectation value
    Log10,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    SpectrumFile,
    Scan,
    Peptide,
    Protein,
    Charge,
    PrimaryScore,
    SpecProb,
    PValue,
    LogEValue,
    FDR,
    PeptideFDR,
    DeltaScore,
    DeltaScoreOther,
    TrypticTermini,
    ResultID,
    TotalPRMScore,
    MedianPRMScore,
    FractionY,
    FractionB,
    Intensity,
    FScore,
}

impl Field {
    const fn label(&self) -> &'static str {
        match self {
            Field::SpectrumFile => "spectrum file",
            Field::Scan => "scan number",
            Field::Peptide => "peptide",
            Field::Protein => "protein",
            Field::Charge => "charge",
            Field::PrimaryScore => "primary score",
            Field::SpecProb => "spectral probability",
            Field::PValue => "p-value",
            Field::LogEValue => "log e-value",
            Field::FDR => "FDR",
            Field::PeptideFDR => "peptide FDR",
            Field::DeltaScore => "delta score",
            Field::DeltaScoreOther => "delta score other",
            Field::TrypticTermini => "tryptic termini",
            Field::ResultID => "result id",
            Field::TotalPRMScore => "total PRM score",
            Field::MedianPRMScore => "median PRM score",
            Field::FractionY => "fraction Y",
            Field::FractionB => "fraction B",
            Field::Intensity => "intensity",
            Field::FScore => "F-score",
        }
    }

    /// The header names this field goes by in `engine`'s output
    fn aliases(&self, engine: EngineKind) -> &'static [&'static str] {
        use EngineKind::*;
        match (self, engine) {
            (Field::SpectrumFile, _) => &["#SpectrumFile", "SpectrumFile", "#SpecFile", "SpecFile"],
            (Field::Scan, Sequest) => &["ScanNum", "Scan"],
            (Field::Scan, _) => &["Scan", "Scan#", "ScanNum"],
            (Field::Peptide, XTandem) => &["Peptide_Sequence", "Peptide"],
            (Field::Peptide, Inspect) => &["Annotation", "Peptide"],
            (Field::Peptide, _) => &["Peptide", "Annotation"],
            (Field::Protein, Sequest) => &["Reference", "Protein"],
            (Field::Protein, XTandem) => &["Protein_Name", "Protein"],
            (Field::Protein, _) => &["Protein", "Reference"],
            (Field::Charge, Sequest) => &["ChargeState", "Charge"],
            (Field::Charge, _) => &["Charge", "ChargeState"],
            (Field::PrimaryScore, Sequest) => &["XCorr"],
            (Field::PrimaryScore, XTandem) => &["Peptide_Hyperscore", "Hyperscore"],
            (Field::PrimaryScore, Inspect) => &["MQScore"],
            (Field::PrimaryScore, MSGFPlus) => &["MSGFScore", "MSGFDB_Score"],
            (Field::SpecProb, MSGFPlus) => &["MSGFDB_SpecEValue", "SpecEValue", "MSGFDB_SpecProb", "SpecProb"],
            (Field::SpecProb, _) => &["MSGF_SpecProb", "SpecProb", "MSGFDB_SpecProb"],
            (Field::PValue, Sequest) => &[],
            (Field::PValue, XTandem) => &[],
            (Field::PValue, Inspect) => &["PValue", "p-value"],
            (Field::PValue, MSGFPlus) => &["EValue", "PValue"],
            (Field::LogEValue, XTandem) => &["Peptide_Expectation_Value_Log(e)", "Peptide_Expectation_Value_LogE"],
            (Field::LogEValue, _) => &[],
            (Field::FDR, MSGFPlus) => &["QValue", "FDR"],
            (Field::FDR, _) => &[],
            (Field::PeptideFDR, MSGFPlus) => &["PepQValue", "PepFDR"],
            (Field::PeptideFDR, _) => &[],
            (Field::DeltaScore, Sequest) => &["DelCn"],
            (Field::DeltaScore, XTandem) => &["DeltaCn2"],
            (Field::DeltaScore, _) => &["DeltaScore"],
            (Field::DeltaScoreOther, Sequest) => &["DelCn2"],
            (Field::DeltaScoreOther, XTandem) => &[],
            (Field::DeltaScoreOther, _) => &["DeltaScoreOther"],
            (Field::TrypticTermini, Sequest) => &["NumTrypticEnds", "NTT"],
            (Field::TrypticTermini, _) => &["NTT", "NumTrypticEnds"],
            (Field::ResultID, Sequest) => &["HitNum", "ResultID"],
            (Field::ResultID, XTandem) => &["Result_ID", "ResultID"],
            (Field::ResultID, _) => &["ResultID", "Result_ID", "RecordNumber"],
            (Field::TotalPRMScore, Inspect) => &["TotalPRMScore"],
            (Field::MedianPRMScore, Inspect) => &["MedianPRMScore"],
            (Field::FractionY, Inspect) => &["FractionY"],
            (Field::FractionB, Inspect) => &["FractionB"],
            (Field::Intensity, Inspect) => &["Intensity"],
            (Field::FScore, Inspect) => &["FScore", "F-Score"],
            (
                Field::TotalPRMScore
                | Field::MedianPRMScore
                | Field::FractionY
                | Field::FractionB
                | Field::Intensity
                | Field::FScore,
                _,
            ) => &[],
        }
    }
}

/// Column positions resolved from a result file's header
#[derive(Debug, Clone, Default)]
struct ColumnMap {
    spectrum_file: Option<usize>,
    scan: usize,
    peptide: usize,
    protein: usize,
    charge: Option<usize>,
    primary_score: Option<usize>,
    spec_prob: Option<usize>,
    p_value: Option<(usize, PValueEncoding)>,
    fdr: Option<usize>,
    pep_fdr: Option<usize>,
    delta_score: Option<usize>,
    delta_score_other: Option<usize>,
    tryptic_termini: Option<usize>,
    result_id: Option<usize>,
    total_prm_score: Option<usize>,
    median_prm_score: Option<usize>,
    fraction_y: Option<usize>,
    fraction_b: Option<usize>,
    intensity: Option<usize>,
    f_score: Option<usize>,
}

impl ColumnMap {
    fn find(headers: &StringRecord, field: Field, engine: EngineKind) -> Option<usize> {
        field.aliases(engine).iter().find_map(|alias| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(alias))
        })
    }

    fn require(headers: &StringRecord, field: Field, engine: EngineKind) -> Result<usize, ResultFileError> {
        Self::find(headers, field, engine).ok_or(ResultFileError::MissingColumn {
            engine,
            column: field.label(),
        })
    }

    fn from_headers(headers: &StringRecord, engine: EngineKind) -> Result<Self, ResultFileError> {
        let find = |field| Self::find(headers, field, engine);
        let p_value = match find(Field::PValue) {
            Some(i) => Some((i, PValueEncoding::Linear)),
            None => find(Field::LogEValue).map(|i| (i, PValueEncoding::Log10)),
        };
        Ok(Self {
            spectrum_file: find(Field::SpectrumFile),
            scan: Self::require(headers, Field::Scan, engine)?,
            peptide: Self::require(headers, Field::Peptide, engine)?,
            protein: Self::require(headers, Field::Protein, engine)?,
            charge: find(Field::Charge),
            primary_score: find(Field::PrimaryScore),
            spec_prob: find(Field::SpecProb),
            p_value,
            fdr: find(Field::FDR),
            pep_fdr: find(Field::PeptideFDR),
            delta_score: find(Field::DeltaScore),
            delta_score_other: find(Field::DeltaScoreOther),
            tryptic_termini: find(Field::TrypticTermini),
            result_id: find(Field::ResultID),
            total_prm_score: find(Field::TotalPRMScore),
            median_prm_score: find(Field::MedianPRMScore),
            fraction_y: find(Field::FractionY),
            fraction_b: find(Field::FractionB),
            intensity: find(Field::Intensity),
            f_score: find(Field::FScore),
        })
    }
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<&str> {
    index
        .and_then(|i| record.get(i))
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Parse an optional score. Values an engine writes for "not computed" parse
/// as `None` rather than failing the row.
fn optional_score(record: &StringRecord, index: Option<usize>) -> Option<f64> {
    cell(record, index)
        .and_then(|v| v.parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn secondary_score(record: &StringRecord, index: Option<usize>) -> f64 {
    optional_score(record, index).unwrap_or_default()
}

/// Iterate over the rows of a search engine's tab-separated result file as
/// [`IdentificationRecord`]s.
pub struct ResultFileReader<R: Read> {
    reader: csv::Reader<R>,
    engine: EngineKind,
    columns: ColumnMap,
    spectrum_file: String,
    record: StringRecord,
    row: usize,
}

impl<R: Read> ResultFileReader<R> {
    pub fn new(handle: R, engine: EngineKind) -> Result<Self, ResultFileError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .has_headers(true)
            .quoting(false)
            .from_reader(handle);
        let headers = reader.headers()?.clone();
        let columns = ColumnMap::from_headers(&headers, engine)?;
        debug!("Resolved {engine} result columns: {columns:?}");
        Ok(Self {
            reader,
            engine,
            columns,
            spectrum_file: String::new(),
            record: StringRecord::new(),
            row: 0,
        })
    }

    /// The spectrum file name reported for rows that do not name their own
    pub fn with_spectrum_file(mut self, name: impl Into<String>) -> Self {
        self.spectrum_file = name.into();
        self
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    fn parse_required<T: std::str::FromStr>(
        &self,
        index: usize,
        field: Field,
    ) -> Result<T, ResultFileError> {
        let value = self.record.get(index).unwrap_or_default().trim();
        value.parse::<T>().map_err(|_| ResultFileError::MalformedValue {
            row: self.row,
            column: field.label(),
            value: value.to_string(),
        })
    }

    fn build_record(&self) -> Result<IdentificationRecord, ResultFileError> {
        let record = &self.record;
        let cols = &self.columns;

        let peptide = record.get(cols.peptide).unwrap_or_default().trim().to_string();
        let protein = record
            .get(cols.protein)
            .unwrap_or_default()
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_string();
        let scan = self.parse_required::<u32>(cols.scan, Field::Scan)?;
        let charge = match cols.charge {
            Some(i) => self.parse_required::<i32>(i, Field::Charge)?,
            None => 0,
        };
        let p_value = cols.p_value.and_then(|(i, encoding)| {
            optional_score(record, Some(i)).map(|v| match encoding {
                PValueEncoding::Linear => v,
                PValueEncoding::Log10 => 10f64.powf(v),
            })
        });
        let tryptic_termini = match cell(record, cols.tryptic_termini).and_then(|v| v.parse::<u8>().ok()) {
            Some(ntt) => ntt,
            None => PeptideAnnotation::parse(&peptide).tryptic_termini(),
        };
        let result_id = match cell(record, cols.result_id).and_then(|v| v.parse::<u64>().ok()) {
            Some(id) => id,
            None => self.row as u64,
        };
        let spectrum_file = cell(record, cols.spectrum_file)
            .map(|s| s.to_string())
            .unwrap_or_else(|| self.spectrum_file.clone());

        Ok(IdentificationRecord {
            spectrum_file,
            scan,
            peptide,
            protein,
            charge,
            primary_score: secondary_score(record, cols.primary_score),
            spec_prob: optional_score(record, cols.spec_prob),
            p_value,
            fdr: optional_score(record, cols.fdr),
            pep_fdr: optional_score(record, cols.pep_fdr),
            delta_score: secondary_score(record, cols.delta_score),
            delta_score_other: secondary_score(record, cols.delta_score_other),
            tryptic_termini,
            secondary: SecondaryScores {
                total_prm_score: secondary_score(record, cols.total_prm_score),
                median_prm_score: secondary_score(record, cols.median_prm_score),
                fraction_y: secondary_score(record, cols.fraction_y),
                fraction_b: secondary_score(record, cols.fraction_b),
                intensity: secondary_score(record, cols.intensity),
                f_score: secondary_score(record, cols.f_score),
            },
            result_id,
        })
    }

    fn read_next(&mut self) -> Result<Option<IdentificationRecord>, ResultFileError> {
        loop {
            if !self.reader.read_record(&mut self.record)? {
                return Ok(None);
            }
            self.row += 1;
            if self.record.iter().all(|v| v.trim().is_empty()) {
                continue;
            }
            return self.build_record().map(Some);
        }
    }
}

impl<R: Read> Iterator for ResultFileReader<R> {
    type Item = Result<IdentificationRecord, ResultFileError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

/// Open a result file, transparently decompressing gzipped input
pub fn open_result_file<P: AsRef<Path>>(
    path: P,
    engine: EngineKind,
) -> Result<ResultFileReader<Box<dyn BufRead>>, ResultFileError> {
    let handle = open_text_file(path)?;
    ResultFileReader::new(handle, engine)
}
