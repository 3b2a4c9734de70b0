//! The per-spectrum identification candidates read from search results.

/// Engine-specific scores beyond the primary score that are carried through
/// to the intermediate record file unchanged. Engines which do not report a
/// value leave it at zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SecondaryScores {
    pub total_prm_score: f64,
    pub median_prm_score: f64,
    pub fraction_y: f64,
    pub fraction_b: f64,
    pub intensity: f64,
    pub f_score: f64,
}

/// One peptide-spectrum match candidate.
///
/// The meaning of `primary_score` depends on the originating engine (XCorr,
/// hyperscore, MQScore or MSGFScore). `spec_prob`, `p_value`, `fdr` and `pep_fdr`
/// are `None` when the engine does not report them or the value could not be
/// parsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentificationRecord {
    pub spectrum_file: String,
    pub scan: u32,
    pub peptide: String,
    pub protein: String,
    pub charge: i32,
    pub primary_score: f64,
    pub spec_prob: Option<f64>,
    pub p_value: Option<f64>,
    pub fdr: Option<f64>,
    pub pep_fdr: Option<f64>,
    pub delta_score: f64,
    pub delta_score_other: f64,
    pub tryptic_termini: u8,
    pub secondary: SecondaryScores,
    pub result_id: u64,
}

impl IdentificationRecord {
    pub fn annotation(&self) -> PeptideAnnotation {
        PeptideAnnotation::parse(&self.peptide)
    }
}

/// A peptide annotation split into its flanking residues and sequence,
/// `K.PEPT*IDE.R` → (`K`, `PEPT*IDE`, `R`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeptideAnnotation {
    pub prefix: String,
    pub sequence: String,
    pub suffix: String,
}

impl PeptideAnnotation {
    pub fn parse(annotation: &str) -> Self {
        let annotation = annotation.trim();
        let bytes = annotation.as_bytes();
        let n = bytes.len();
        if n >= 4 && bytes[1] == b'.' && bytes[n - 2] == b'.' {
            Self {
                prefix: annotation[..1].to_string(),
                sequence: annotation[2..n - 2].to_string(),
                suffix: annotation[n - 1..].to_string(),
            }
        } else {
            Self {
                prefix: String::new(),
                sequence: annotation.to_string(),
                suffix: String::new(),
            }
        }
    }

    /// The residue letters alone, without modification symbols or masses
    pub fn clean_sequence(&self) -> String {
        self.sequence
            .chars()
            .filter(|c| c.is_ascii_uppercase())
            .collect()
    }

    /// Count the termini consistent with tryptic cleavage. A protein terminus,
    /// written `-`, counts as tryptic.
    pub fn tryptic_termini(&self) -> u8 {
        let clean = self.clean_sequence();
        let mut count = 0;
        let is_site = |c: Option<char>| matches!(c, Some('K') | Some('R'));
        let prefix = self.prefix.chars().next();
        if prefix == Some('-') || (is_site(prefix) && !clean.starts_with('P')) {
            count += 1;
        }
        let suffix = self.suffix.chars().next();
        if suffix == Some('-') || (is_site(clean.chars().last()) && suffix != Some('P')) {
            count += 1;
        }
        count
    }
}
