//! Confidence filtering and best-match selection of peptide-spectrum matches.
pub mod filter;
pub mod proteins;
pub mod record;
pub mod selector;
pub mod thresholds;

pub use crate::psm::filter::{
    approximate_p_value, derive_scores, is_decoy_protein, ConfidenceFilter, DerivedScores,
    FilterDecision, FilterState, Rejection,
};
pub use crate::psm::proteins::{ProteinCache, ProteinEntry};
pub use crate::psm::record::{IdentificationRecord, PeptideAnnotation, SecondaryScores};
pub use crate::psm::selector::{PSMSelector, SelectedMatch, Selection};
pub use crate::psm::thresholds::{FilterThresholds, ThresholdKind, ThresholdsUsed};
