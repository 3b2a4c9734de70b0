use log::info;
use serde::{Deserialize, Serialize};

/// A configured spectral-probability threshold below this value is applied even
/// when no threshold is explicitly enabled, as long as no other confidence
/// threshold could be evaluated for the record.
pub const IMPLICIT_SPEC_PROB_LIMIT: f64 = 1e-4;

/// Confidence thresholds for accepting identification records. Only the
/// thresholds whose `use_*` flag is set take part in filtering, with the
/// exception of the implicit spectral-probability fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterThresholds {
    pub p_value: f64,
    pub use_p_value: bool,
    pub fdr: f64,
    pub use_fdr: bool,
    pub pep_fdr: f64,
    pub use_pep_fdr: bool,
    pub spec_prob: f64,
    pub use_spec_prob: bool,
}

impl Default for FilterThresholds {
    fn default() -> Self {
        Self {
            p_value: 0.05,
            use_p_value: true,
            fdr: 0.01,
            use_fdr: false,
            pep_fdr: 0.01,
            use_pep_fdr: false,
            spec_prob: 1e-9,
            use_spec_prob: false,
        }
    }
}

impl FilterThresholds {
    /// The spectral-probability threshold applied when nothing else was
    /// evaluable, if it is strict enough to qualify
    pub fn implicit_spec_prob(&self) -> Option<f64> {
        if self.spec_prob < IMPLICIT_SPEC_PROB_LIMIT {
            Some(self.spec_prob)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThresholdKind {
    PValue,
    FDR,
    PeptideFDR,
    SpecProb,
}

/// Which thresholds have actually been applied to at least one record during
/// the run. Used only for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdsUsed {
    pub p_value: bool,
    pub fdr: bool,
    pub pep_fdr: bool,
    pub spec_prob: bool,
}

impl ThresholdsUsed {
    /// Mark `kind` as used, returning `true` the first time it is seen
    pub fn record(&mut self, kind: ThresholdKind) -> bool {
        let flag = match kind {
            ThresholdKind::PValue => &mut self.p_value,
            ThresholdKind::FDR => &mut self.fdr,
            ThresholdKind::PeptideFDR => &mut self.pep_fdr,
            ThresholdKind::SpecProb => &mut self.spec_prob,
        };
        let first = !*flag;
        *flag = true;
        if first {
            info!("Applying {kind:?} threshold for the first time in this run");
        }
        first
    }

    pub fn any(&self) -> bool {
        self.p_value || self.fdr || self.pep_fdr || self.spec_prob
    }

    /// The threshold that best describes how confidence was controlled:
    /// FDR-style thresholds take precedence over spectral probability,
    /// which takes precedence over the p-value.
    pub fn reported_threshold(&self, thresholds: &FilterThresholds) -> Option<(ThresholdKind, f64)> {
        if self.pep_fdr {
            Some((ThresholdKind::PeptideFDR, thresholds.pep_fdr))
        } else if self.fdr {
            Some((ThresholdKind::FDR, thresholds.fdr))
        } else if self.spec_prob {
            Some((ThresholdKind::SpecProb, thresholds.spec_prob))
        } else if self.p_value {
            Some((ThresholdKind::PValue, thresholds.p_value))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults_from_partial_config() {
        let thresholds: FilterThresholds =
            serde_json::from_str(r#"{"use_spec_prob": true, "spec_prob": 1e-10}"#).unwrap();
        assert!(thresholds.use_spec_prob);
        assert_eq!(thresholds.spec_prob, 1e-10);
        assert_eq!(thresholds.p_value, 0.05);
        assert!(thresholds.use_p_value);
        assert!(!thresholds.use_fdr);
    }

    #[test]
    fn test_implicit_limit() {
        let mut thresholds = FilterThresholds::default();
        assert_eq!(thresholds.implicit_spec_prob(), Some(1e-9));
        thresholds.spec_prob = 1e-4;
        assert_eq!(thresholds.implicit_spec_prob(), None);
    }

    #[test]
    fn test_reported_threshold() {
        let thresholds = FilterThresholds::default();
        let mut used = ThresholdsUsed::default();
        assert!(!used.any());
        assert_eq!(used.reported_threshold(&thresholds), None);

        assert!(used.record(ThresholdKind::PValue));
        assert!(!used.record(ThresholdKind::PValue));
        assert_eq!(
            used.reported_threshold(&thresholds),
            Some((ThresholdKind::PValue, 0.05))
        );
        used.record(ThresholdKind::SpecProb);
        assert_eq!(
            used.reported_threshold(&thresholds),
            Some((ThresholdKind::SpecProb, 1e-9))
        );
        used.record(ThresholdKind::FDR);
        assert_eq!(
            used.reported_threshold(&thresholds),
            Some((ThresholdKind::FDR, 0.01))
        );
    }
}
