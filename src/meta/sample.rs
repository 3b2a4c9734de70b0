use serde::{Deserialize, Serialize};

use crate::params::{Param, ParamLike};

/// Sample annotations attached to a submitted result file. Each column may
/// carry several terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleMetadata {
    pub species: Vec<Param>,
    pub tissue: Vec<Param>,
    pub cell_type: Vec<Param>,
    pub disease: Vec<Param>,
    pub modification: Vec<Param>,
    pub instrument: Vec<Param>,
    pub quantification: Vec<Param>,
    pub experimental_factor: String,
}

impl SampleMetadata {
    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
            && self.tissue.is_empty()
            && self.cell_type.is_empty()
            && self.disease.is_empty()
            && self.modification.is_empty()
            && self.instrument.is_empty()
            && self.quantification.is_empty()
            && self.experimental_factor.is_empty()
    }

    /// The first species term, used when rewriting a template's taxonomy annotation
    pub fn primary_species(&self) -> Option<&Param> {
        self.species.first()
    }

    /// Find a controlled term in any column by its accession
    pub fn find_by_accession(&self, accession: &str) -> Option<&Param> {
        [
            &self.species,
            &self.tissue,
            &self.cell_type,
            &self.disease,
            &self.modification,
            &self.instrument,
            &self.quantification,
        ]
        .into_iter()
        .flatten()
        .find(|p| p.accession() == Some(accession))
    }

    /// Render one column's terms as a comma-separated list of bracketed terms
    pub fn format_terms(terms: &[Param]) -> String {
        terms
            .iter()
            .map(|t| t.to_bracketed())
            .collect::<Vec<_>>()
            .join(",")
    }

    /// The cells of a sample-metadata table row, in column order
    pub fn columns(&self) -> [String; 8] {
        [
            Self::format_terms(&self.species),
            Self::format_terms(&self.tissue),
            Self::format_terms(&self.cell_type),
            Self::format_terms(&self.disease),
            Self::format_terms(&self.modification),
            Self::format_terms(&self.instrument),
            Self::format_terms(&self.quantification),
            self.experimental_factor.clone(),
        ]
    }
}
