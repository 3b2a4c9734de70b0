//! Per-record confidence decisions.
//!
//! Each record is evaluated in a fixed order, stopping at the first failure:
//! score derivation, decoy rejection, the FDR-style and spectral-probability
//! thresholds, then the p-value threshold.
use log::trace;

use crate::meta::EngineKind;
use crate::psm::record::IdentificationRecord;
use crate::psm::thresholds::{FilterThresholds, ThresholdKind, ThresholdsUsed};

/// Slope of the fit relating log10 spectral probability to log10 p-value.
/// Both constants come from a single calibration job and are not a general model.
pub const APPROX_PVALUE_SLOPE: f64 = 0.9988;
/// Intercept of the same calibration fit
pub const APPROX_PVALUE_INTERCEPT: f64 = 6.43;

/// Estimate a p-value from a spectral probability using the calibration fit,
/// `log10(p) = log10(specProb) * 0.9988 + 6.43`, capped at 1.
pub fn approximate_p_value(spec_prob: f64) -> f64 {
    if spec_prob <= 0.0 {
        return 0.0;
    }
    let log_p = spec_prob.log10() * APPROX_PVALUE_SLOPE + APPROX_PVALUE_INTERCEPT;
    10f64.powf(log_p).min(1.0)
}

const SEARCH_DECOY_PREFIXES: &[&str] = &["reversed_", "scrambled_", "xxx."];
const MSGF_DECOY_PREFIXES: &[&str] = &["rev_", "xxx_"];

/// Whether `protein` follows the decoy naming convention of `engine`'s family
pub fn is_decoy_protein(engine: EngineKind, protein: &str) -> bool {
    let protein = protein.to_ascii_lowercase();
    let prefixes = match engine {
        EngineKind::MSGFPlus => MSGF_DECOY_PREFIXES,
        EngineKind::Sequest | EngineKind::XTandem | EngineKind::Inspect => {
            SEARCH_DECOY_PREFIXES
        }
    };
    prefixes.iter().any(|p| protein.starts_with(p))
}

/// The normalized scores of an accepted record. `comparison_score` is lower
/// for more confident matches regardless of engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedScores {
    pub p_value: Option<f64>,
    pub comparison_score: f64,
    /// The comparison score is a spectral probability rather than an
    /// engine-native fallback. The two are not on the same scale.
    pub from_spec_prob: bool,
}

impl DerivedScores {
    /// Whether these scores should replace `current` as the best for a scan.
    /// Spectral-probability scores always outrank fallback scores; within one
    /// kind a strictly lower score wins.
    pub fn supersedes(&self, current: &DerivedScores) -> bool {
        match (self.from_spec_prob, current.from_spec_prob) {
            (true, false) => true,
            (false, true) => false,
            _ => self.comparison_score < current.comparison_score,
        }
    }
}

/// State carried across every record of one selection pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterState {
    /// A record with a defined spectral probability has been seen
    pub seen_spec_prob: bool,
    /// An FDR or peptide FDR threshold has actually been applied
    pub fdr_applied: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rejection {
    /// No spectral probability although earlier records of the job had one
    MissingSpecProb,
    Decoy,
    SpecProb,
    PeptideFDR,
    FDR,
    PValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterDecision {
    Accept(DerivedScores),
    Reject(Rejection),
}

impl FilterDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accept(_))
    }
}

/// Map a record's native scores onto a p-value estimate and a lower-is-better
/// comparison score.
///
/// A defined spectral probability is always preferred. Without one, the
/// engine's own scores are used, but only until the first record with a
/// spectral probability has been seen; afterwards such records are not
/// comparable and `None` is returned.
pub fn derive_scores(
    engine: EngineKind,
    record: &IdentificationRecord,
    state: &mut FilterState,
) -> Option<DerivedScores> {
    if let Some(spec_prob) = record.spec_prob {
        state.seen_spec_prob = true;
        let p_value = record.p_value.unwrap_or_else(|| approximate_p_value(spec_prob));
        return Some(DerivedScores {
            p_value: Some(p_value),
            comparison_score: spec_prob,
            from_spec_prob: true,
        });
    }
    if state.seen_spec_prob {
        return None;
    }
    let derived = match engine {
        EngineKind::Sequest => DerivedScores {
            p_value: None,
            comparison_score: -record.primary_score,
            from_spec_prob: false,
        },
        EngineKind::XTandem => DerivedScores {
            p_value: record.p_value,
            comparison_score: record.p_value.unwrap_or(1.0),
            from_spec_prob: false,
        },
        EngineKind::Inspect | EngineKind::MSGFPlus => DerivedScores {
            p_value: record.p_value,
            comparison_score: record.p_value.unwrap_or(-record.primary_score),
            from_spec_prob: false,
        },
    };
    Some(derived)
}

/// Decides whether single records pass the configured thresholds for one engine
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceFilter<'a> {
    pub thresholds: &'a FilterThresholds,
    pub engine: EngineKind,
}

impl<'a> ConfidenceFilter<'a> {
    pub fn new(thresholds: &'a FilterThresholds, engine: EngineKind) -> Self {
        Self { thresholds, engine }
    }

    /// Evaluate `record`. `already_accepted` reports whether the record's protein
    /// was accepted through another record earlier in the pass, which exempts
    /// it from decoy rejection.
    pub fn evaluate(
        &self,
        record: &IdentificationRecord,
        already_accepted: bool,
        state: &mut FilterState,
        used: &mut ThresholdsUsed,
    ) -> FilterDecision {
        let decision = self.evaluate_inner(record, already_accepted, state, used);
        if let FilterDecision::Reject(reason) = decision {
            trace!(
                "Rejected scan {} ({}, {}): {reason:?}",
                record.scan,
                record.peptide,
                record.protein
            );
        }
        decision
    }

    fn evaluate_inner(
        &self,
        record: &IdentificationRecord,
        already_accepted: bool,
        state: &mut FilterState,
        used: &mut ThresholdsUsed,
    ) -> FilterDecision {
        let thresholds = self.thresholds;

        let Some(scores) = derive_scores(self.engine, record, state) else {
            return FilterDecision::Reject(Rejection::MissingSpecProb);
        };

        if !already_accepted && is_decoy_protein(self.engine, &record.protein) {
            return FilterDecision::Reject(Rejection::Decoy);
        }

        let mut evaluated = false;
        if thresholds.use_spec_prob {
            if let Some(spec_prob) = record.spec_prob {
                evaluated = true;
                used.record(ThresholdKind::SpecProb);
                if spec_prob > thresholds.spec_prob {
                    return FilterDecision::Reject(Rejection::SpecProb);
                }
            }
        }

        if thresholds.use_pep_fdr {
            if let Some(pep_fdr) = record.pep_fdr {
                evaluated = true;
                state.fdr_applied = true;
                used.record(ThresholdKind::PeptideFDR);
                if pep_fdr > thresholds.pep_fdr {
                    return FilterDecision::Reject(Rejection::PeptideFDR);
                }
            }
        }

        if thresholds.use_fdr {
            if let Some(fdr) = record.fdr {
                evaluated = true;
                state.fdr_applied = true;
                used.record(ThresholdKind::FDR);
                if fdr > thresholds.fdr {
                    return FilterDecision::Reject(Rejection::FDR);
                }
            }
        }

        if !evaluated {
            if let (Some(limit), Some(spec_prob)) = (thresholds.implicit_spec_prob(), record.spec_prob) {
                used.record(ThresholdKind::SpecProb);
                if spec_prob > limit {
                    return FilterDecision::Reject(Rejection::SpecProb);
                }
            }
        }

        if thresholds.use_p_value {
            if let Some(p_value) = scores.p_value {
                used.record(ThresholdKind::PValue);
                if p_value >= thresholds.p_value {
                    return FilterDecision::Reject(Rejection::PValue);
                }
            }
        }

        FilterDecision::Accept(scores)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn msgf_record(spec_prob: Option<f64>, protein: &str) -> IdentificationRecord {
        IdentificationRecord {
            scan: 101,
            peptide: "K.LLMEGR.A".into(),
            protein: protein.into(),
            charge: 2,
            primary_score: 120.0,
            spec_prob,
            ..Default::default()
        }
    }

    fn evaluate(
        thresholds: &FilterThresholds,
        engine: EngineKind,
        record: &IdentificationRecord,
    ) -> FilterDecision {
        let filter = ConfidenceFilter::new(thresholds, engine);
        let mut state = FilterState::default();
        let mut used = ThresholdsUsed::default();
        filter.evaluate(record, false, &mut state, &mut used)
    }

    #[test]
    fn test_approximate_p_value() {
        let p = approximate_p_value(1e-10);
        assert!((p.log10() - (-10.0 * 0.9988 + 6.43)).abs() < 1e-9);
        assert_eq!(approximate_p_value(0.5), 1.0);
        assert_eq!(approximate_p_value(0.0), 0.0);
    }

    #[test]
    fn test_supersedes_across_score_kinds() {
        let fallback = DerivedScores {
            p_value: None,
            comparison_score: -5.0,
            from_spec_prob: false,
        };
        let spec_prob = DerivedScores {
            p_value: Some(1e-6),
            comparison_score: 1e-12,
            from_spec_prob: true,
        };
        assert!(spec_prob.supersedes(&fallback));
        assert!(!fallback.supersedes(&spec_prob));
        assert!(!spec_prob.supersedes(&spec_prob));
        let better = DerivedScores {
            comparison_score: 1e-15,
            ..spec_prob
        };
        assert!(better.supersedes(&spec_prob));
    }

    #[test]
    fn test_decoy_prefixes() {
        assert!(is_decoy_protein(EngineKind::MSGFPlus, "XXX_P12345"));
        assert!(is_decoy_protein(EngineKind::MSGFPlus, "Rev_P12345"));
        assert!(!is_decoy_protein(EngineKind::MSGFPlus, "Reversed_P12345"));
        assert!(is_decoy_protein(EngineKind::Sequest, "Reversed_P12345"));
        assert!(is_decoy_protein(EngineKind::XTandem, "SCRAMBLED_P12345"));
        assert!(is_decoy_protein(EngineKind::Inspect, "xxx.P12345"));
        assert!(!is_decoy_protein(EngineKind::Inspect, "XXX_P12345"));
    }

    #[test]
    fn test_decoy_rejected_unless_accepted() {
        let thresholds = FilterThresholds::default();
        let filter = ConfidenceFilter::new(&thresholds, EngineKind::MSGFPlus);
        let record = msgf_record(Some(1e-12), "XXX_P12345");
        let mut state = FilterState::default();
        let mut used = ThresholdsUsed::default();
        assert_eq!(
            filter.evaluate(&record, false, &mut state, &mut used),
            FilterDecision::Reject(Rejection::Decoy)
        );
        assert!(filter.evaluate(&record, true, &mut state, &mut used).is_accepted());
    }

    #[test]
    fn test_missing_spec_prob_after_first_seen() {
        let thresholds = FilterThresholds::default();
        let filter = ConfidenceFilter::new(&thresholds, EngineKind::Sequest);
        let mut state = FilterState::default();
        let mut used = ThresholdsUsed::default();

        let without = IdentificationRecord {
            primary_score: 3.2,
            protein: "P1".into(),
            ..Default::default()
        };
        match filter.evaluate(&without, false, &mut state, &mut used) {
            FilterDecision::Accept(scores) => {
                assert_eq!(scores.comparison_score, -3.2);
                assert_eq!(scores.p_value, None);
            }
            other => panic!("Expected acceptance, got {other:?}"),
        }

        let with = msgf_record(Some(1e-12), "P1");
        assert!(filter.evaluate(&with, false, &mut state, &mut used).is_accepted());
        assert!(state.seen_spec_prob);

        assert_eq!(
            filter.evaluate(&without, false, &mut state, &mut used),
            FilterDecision::Reject(Rejection::MissingSpecProb)
        );
    }

    #[test]
    fn test_explicit_spec_prob_threshold() {
        let thresholds = FilterThresholds {
            use_spec_prob: true,
            spec_prob: 1e-4,
            use_p_value: false,
            ..Default::default()
        };
        let pass = msgf_record(Some(1e-5), "P1");
        let fail = msgf_record(Some(1e-3), "P1");
        assert!(evaluate(&thresholds, EngineKind::MSGFPlus, &pass).is_accepted());
        assert_eq!(
            evaluate(&thresholds, EngineKind::MSGFPlus, &fail),
            FilterDecision::Reject(Rejection::SpecProb)
        );
    }

    #[test]
    fn test_implicit_spec_prob_fallback() {
        let thresholds = FilterThresholds {
            spec_prob: 1e-9,
            use_p_value: false,
            ..Default::default()
        };
        let record = msgf_record(Some(1e-8), "P1");
        assert_eq!(
            evaluate(&thresholds, EngineKind::MSGFPlus, &record),
            FilterDecision::Reject(Rejection::SpecProb)
        );

        // An evaluable FDR threshold suppresses the fallback
        let thresholds = FilterThresholds {
            use_fdr: true,
            fdr: 0.01,
            ..thresholds
        };
        let record = IdentificationRecord {
            fdr: Some(0.001),
            ..record
        };
        assert!(evaluate(&thresholds, EngineKind::MSGFPlus, &record).is_accepted());
    }

    #[test]
    fn test_fdr_thresholds() {
        let thresholds = FilterThresholds {
            use_fdr: true,
            fdr: 0.01,
            use_pep_fdr: true,
            pep_fdr: 0.05,
            ..Default::default()
        };
        let filter = ConfidenceFilter::new(&thresholds, EngineKind::MSGFPlus);
        let mut state = FilterState::default();
        let mut used = ThresholdsUsed::default();
        let record = IdentificationRecord {
            fdr: Some(0.02),
            pep_fdr: Some(0.01),
            ..msgf_record(Some(1e-20), "P1")
        };
        assert_eq!(
            filter.evaluate(&record, false, &mut state, &mut used),
            FilterDecision::Reject(Rejection::FDR)
        );
        assert!(state.fdr_applied);
        assert!(used.pep_fdr && used.fdr);

        let record = IdentificationRecord {
            pep_fdr: Some(0.2),
            ..record
        };
        assert_eq!(
            filter.evaluate(&record, false, &mut state, &mut used),
            FilterDecision::Reject(Rejection::PeptideFDR)
        );
    }

    #[test]
    fn test_p_value_threshold() {
        let thresholds = FilterThresholds::default();
        let record = IdentificationRecord {
            p_value: Some(0.05),
            protein: "P1".into(),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&thresholds, EngineKind::Inspect, &record),
            FilterDecision::Reject(Rejection::PValue)
        );
        let record = IdentificationRecord {
            p_value: Some(0.049),
            ..record
        };
        match evaluate(&thresholds, EngineKind::Inspect, &record) {
            FilterDecision::Accept(scores) => assert_eq!(scores.comparison_score, 0.049),
            other => panic!("Expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn test_disabled_thresholds_do_not_matter() {
        let record = IdentificationRecord {
            fdr: Some(0.3),
            pep_fdr: Some(0.3),
            p_value: Some(0.3),
            ..msgf_record(Some(1e-3), "P1")
        };
        // The spectral-probability value stays above the implicit limit so the
        // fallback never engages.
        let base = FilterThresholds {
            use_p_value: false,
            spec_prob: 1e-4,
            ..Default::default()
        };
        let expected = evaluate(&base, EngineKind::MSGFPlus, &record);
        assert!(expected.is_accepted());
        for value in [1e-12, 1e-6, 0.001, 0.5, 1.0] {
            let t = FilterThresholds {
                fdr: value,
                pep_fdr: value,
                p_value: value,
                spec_prob: value.max(1e-4),
                ..base
            };
            assert_eq!(evaluate(&t, EngineKind::MSGFPlus, &record), expected);
        }
    }
}
