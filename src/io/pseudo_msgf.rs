//! The intermediate per-job record file: one tab-separated row per retained
//! scan, in ascending scan order, laid out the way the external converter
//! reads Inspect-style results.
use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;

use csv::QuoteStyle;

use crate::psm::proteins::ProteinCache;
use crate::psm::selector::{SelectedMatch, Selection};

pub const PSEUDO_MSGF_COLUMNS: [&str; 20] = [
    "#SpectrumFile",
    "Scan#",
    "Annotation",
    "Protein",
    "Charge",
    "MQScore",
    "Length",
    "TotalPRMScore",
    "MedianPRMScore",
    "FractionY",
    "FractionB",
    "Intensity",
    "NTT",
    "p-value",
    "F-Score",
    "DeltaScore",
    "DeltaScoreOther",
    "RecordNumber",
    "DBFilePos",
    "SpecProb",
];

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

pub struct PseudoMSGFWriter<W: Write> {
    writer: csv::Writer<W>,
    rows_written: usize,
}

impl<W: Write> PseudoMSGFWriter<W> {
    pub fn new(handle: W) -> io::Result<Self> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .quote_style(QuoteStyle::Never)
            .from_writer(handle);
        writer.write_record(PSEUDO_MSGF_COLUMNS)?;
        Ok(Self {
            writer,
            rows_written: 0,
        })
    }

    /// Write one retained match. `db_position` is the protein's index in the
    /// run's protein cache.
    pub fn write_match(&mut self, selected: &SelectedMatch, db_position: usize) -> io::Result<()> {
        let record = &selected.record;
        let secondary = &record.secondary;
        let row: [String; 20] = [
            record.spectrum_file.clone(),
            record.scan.to_string(),
            record.peptide.clone(),
            record.protein.clone(),
            record.charge.to_string(),
            record.primary_score.to_string(),
            selected.clean_sequence.len().to_string(),
            secondary.total_prm_score.to_string(),
            secondary.median_prm_score.to_string(),
            secondary.fraction_y.to_string(),
            secondary.fraction_b.to_string(),
            secondary.intensity.to_string(),
            record.tryptic_termini.to_string(),
            format_optional(selected.p_value),
            secondary.f_score.to_string(),
            record.delta_score.to_string(),
            record.delta_score_other.to_string(),
            record.result_id.to_string(),
            db_position.to_string(),
            format_optional(record.spec_prob),
        ];
        self.writer.write_record(&row)?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn write_selection(&mut self, selection: &Selection, proteins: &ProteinCache) -> io::Result<()> {
        for selected in selection.iter() {
            let position = proteins
                .get(selected.protein())
                .map(|p| p.index)
                .unwrap_or_default();
            self.write_match(selected, position)?;
        }
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| io::Error::new(e.error().kind(), e.to_string()))
    }
}

/// Write a job's selection to `path`, returning the number of rows written
pub fn write_pseudo_msgf<P: AsRef<Path>>(
    path: P,
    selection: &Selection,
    proteins: &ProteinCache,
) -> io::Result<usize> {
    let handle = io::BufWriter::new(fs::File::create(path)?);
    let mut writer = PseudoMSGFWriter::new(handle)?;
    writer.write_selection(selection, proteins)?;
    let rows = writer.rows_written();
    writer.into_inner()?.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::io::synopsis::open_result_file;
    use crate::meta::EngineKind;
    use crate::psm::{FilterThresholds, PSMSelector, ThresholdsUsed};

    #[test]
    fn test_write_selection() -> io::Result<()> {
        let thresholds = FilterThresholds::default();
        let mut used = ThresholdsUsed::default();
        let reader = open_result_file("./test/data/msgfplus_syn.txt", EngineKind::MSGFPlus)?
            .with_spectrum_file("sample_01.mzML");
        let selection = PSMSelector::select(&thresholds, EngineKind::MSGFPlus, reader, &mut used)?;

        let mut proteins = ProteinCache::new();
        proteins.update_counts(&selection);

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("job.pseudo_msgf");
        let rows = write_pseudo_msgf(&path, &selection, &proteins)?;
        assert_eq!(rows, selection.len());

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], PSEUDO_MSGF_COLUMNS.join("\t"));
        assert_eq!(lines.len(), selection.len() + 1);
        let first: Vec<&str> = lines[1].split('\t').collect();
        assert_eq!(first.len(), 20);
        assert_eq!(first[0], "sample_01.mzML");
        assert_eq!(first[1], "101");
        assert_eq!(first[2], "K.LVNELTEFAK.T");
        assert_eq!(first[6], "10");
        assert_eq!(first[18], "0");
        let scans: Vec<u32> = lines[1..]
            .iter()
            .map(|l| l.split('\t').nth(1).unwrap().parse().unwrap())
            .collect();
        let mut sorted = scans.clone();
        sorted.sort();
        assert_eq!(scans, sorted);
        Ok(())
    }
}
