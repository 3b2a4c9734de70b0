//! Standardized descriptions of the instrument groups jobs are acquired on.
//!
//! Instrument groups are the coarse categories an acquisition system reports
//! (`"VelosOrbi"`, `"QExactive"`, ...). The report template's instrument block is
//! replaced with the ionization source, mass analyzers and detectors listed here.
use std::fmt::Display;

use crate::params::{ControlledVocabulary, Param, ParamCow};

macro_rules! param {
    ($name:expr, $acc:expr) => {
        ControlledVocabulary::MS.const_param($name, $acc)
    };
}

const ESI: ParamCow<'static> = param!("electrospray ionization", "MS:1000073");
const MALDI: ParamCow<'static> = param!("matrix-assisted laser desorption ionization", "MS:1000075");

const ION_TRAP: ParamCow<'static> = param!("radial ejection linear ion trap", "MS:1000083");
const ORBITRAP: ParamCow<'static> = param!("orbitrap", "MS:1000484");
const FTICR: ParamCow<'static> =
    param!("fourier transform ion cyclotron resonance mass spectrometer", "MS:1000079");
const QUADRUPOLE: ParamCow<'static> = param!("quadrupole", "MS:1000081");
const TOF: ParamCow<'static> = param!("time-of-flight", "MS:1000084");

const ELECTRON_MULTIPLIER: ParamCow<'static> = param!("electron multiplier", "MS:1000253");
const INDUCTIVE_DETECTOR: ParamCow<'static> = param!("inductive detector", "MS:1000624");
const MCP_DETECTOR: ParamCow<'static> = param!("microchannel plate detector", "MS:1000114");

type Terms = &'static [ParamCow<'static>];

const ESI_SOURCE: Terms = &[ESI];
const MALDI_SOURCE: Terms = &[MALDI];

const TRAP_ANALYZERS: Terms = &[ION_TRAP];
const TRAP_FT_ANALYZERS: Terms = &[ION_TRAP, FTICR];
const TRAP_ORBITRAP_ANALYZERS: Terms = &[ION_TRAP, ORBITRAP];
const ORBITRAP_ANALYZERS: Terms = &[ORBITRAP];
const QUAD_ORBITRAP_ANALYZERS: Terms = &[QUADRUPOLE, ORBITRAP];
const TRIBRID_ANALYZERS: Terms = &[QUADRUPOLE, ORBITRAP, ION_TRAP];
const QUAD_ANALYZERS: Terms = &[QUADRUPOLE];
const QTOF_ANALYZERS: Terms = &[QUADRUPOLE, TOF];
const TOF_ANALYZERS: Terms = &[TOF];

const EM_DETECTORS: Terms = &[ELECTRON_MULTIPLIER];
const EM_INDUCTIVE_DETECTORS: Terms = &[ELECTRON_MULTIPLIER, INDUCTIVE_DETECTOR];
const INDUCTIVE_DETECTORS: Terms = &[INDUCTIVE_DETECTOR];
const INDUCTIVE_EM_DETECTORS: Terms = &[INDUCTIVE_DETECTOR, ELECTRON_MULTIPLIER];
const MCP_DETECTORS: Terms = &[MCP_DETECTOR];

/// The components of one instrument group, in the order they are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentDescription {
    pub group: InstrumentGroup,
    pub model: ParamCow<'static>,
    pub sources: Terms,
    pub analyzers: Terms,
    pub detectors: Terms,
}

impl InstrumentDescription {
    pub fn model_param(&self) -> Param {
        self.model.to_param()
    }
}

#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentGroup {
    LTQ,
    LTQ_FT,
    Orbitrap,
    VelosOrbi,
    Exactive,
    QExactive,
    Lumos,
    Eclipse,
    Exploris,
    TSQ,
    Agilent_QTOF,
    Bruker_QTOF,
    IMS_TOF,
    MALDI_TOF,
}

impl Display for InstrumentGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let k = format!("{:?}", self).replace('_', "-");
        write!(f, "{k}")
    }
}

impl InstrumentGroup {
    /// Resolve an instrument group name as reported by the acquisition system.
    /// Matching ignores case and the `-`/`_` distinction.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
        let group = match normalized.as_str() {
            "ltq" | "ltq_etd" | "ltq_prep" | "velospro" => Self::LTQ,
            "ltq_ft" | "ft" => Self::LTQ_FT,
            "orbitrap" | "ltq_orbitrap" => Self::Orbitrap,
            "velosorbi" | "velos_orbi" => Self::VelosOrbi,
            "exactive" => Self::Exactive,
            "qexactive" | "q_exactive" | "qehfx" => Self::QExactive,
            "lumos" => Self::Lumos,
            "eclipse" => Self::Eclipse,
            "exploris" | "qexploris" => Self::Exploris,
            "tsq" | "gc_tsq" => Self::TSQ,
            "agilent_qtof" => Self::Agilent_QTOF,
            "bruker_qtof" | "timstof" => Self::Bruker_QTOF,
            "ims_tof" | "synapt" => Self::IMS_TOF,
            "maldi_tof" | "bruker_maldi" => Self::MALDI_TOF,
            _ => return None,
        };
        Some(group)
    }

    pub fn description(self) -> InstrumentDescription {
        let (model, sources, analyzers, detectors): (ParamCow<'static>, Terms, Terms, Terms) =
            match self {
                Self::LTQ => (
                    param!("LTQ", "MS:1000447"),
                    ESI_SOURCE,
                    TRAP_ANALYZERS,
                    EM_DETECTORS,
                ),
                Self::LTQ_FT => (
                    param!("LTQ FT", "MS:1000448"),
                    ESI_SOURCE,
                    TRAP_FT_ANALYZERS,
                    EM_INDUCTIVE_DETECTORS,
                ),
                Self::Orbitrap => (
                    param!("LTQ Orbitrap", "MS:1000449"),
                    ESI_SOURCE,
                    TRAP_ORBITRAP_ANALYZERS,
                    EM_INDUCTIVE_DETECTORS,
                ),
                Self::VelosOrbi => (
                    param!("LTQ Orbitrap Velos", "MS:1001742"),
                    ESI_SOURCE,
                    TRAP_ORBITRAP_ANALYZERS,
                    EM_INDUCTIVE_DETECTORS,
                ),
                Self::Exactive => (
                    param!("Exactive", "MS:1000649"),
                    ESI_SOURCE,
                    ORBITRAP_ANALYZERS,
                    INDUCTIVE_DETECTORS,
                ),
                Self::QExactive => (
                    param!("Q Exactive", "MS:1001911"),
                    ESI_SOURCE,
                    QUAD_ORBITRAP_ANALYZERS,
                    INDUCTIVE_DETECTORS,
                ),
                Self::Lumos => (
                    param!("Orbitrap Fusion Lumos", "MS:1002732"),
                    ESI_SOURCE,
                    TRIBRID_ANALYZERS,
                    INDUCTIVE_EM_DETECTORS,
                ),
                Self::Eclipse => (
                    param!("Orbitrap Eclipse", "MS:1003029"),
                    ESI_SOURCE,
                    TRIBRID_ANALYZERS,
                    INDUCTIVE_EM_DETECTORS,
                ),
                Self::Exploris => (
                    param!("Orbitrap Exploris 480", "MS:1003028"),
                    ESI_SOURCE,
                    QUAD_ORBITRAP_ANALYZERS,
                    INDUCTIVE_DETECTORS,
                ),
                Self::TSQ => (
                    param!("TSQ Quantum", "MS:1000199"),
                    ESI_SOURCE,
                    QUAD_ANALYZERS,
                    EM_DETECTORS,
                ),
                Self::Agilent_QTOF => (
                    param!("Agilent instrument model", "MS:1000490"),
                    ESI_SOURCE,
                    QTOF_ANALYZERS,
                    MCP_DETECTORS,
                ),
                Self::Bruker_QTOF => (
                    param!("Bruker Daltonics instrument model", "MS:1000122"),
                    ESI_SOURCE,
                    QTOF_ANALYZERS,
                    MCP_DETECTORS,
                ),
                Self::IMS_TOF => (
                    param!("Waters instrument model", "MS:1000126"),
                    ESI_SOURCE,
                    QTOF_ANALYZERS,
                    MCP_DETECTORS,
                ),
                Self::MALDI_TOF => (
                    param!("Bruker Daltonics instrument model", "MS:1000122"),
                    MALDI_SOURCE,
                    TOF_ANALYZERS,
                    MCP_DETECTORS,
                ),
            };
        InstrumentDescription {
            group: self,
            model,
            sources,
            analyzers,
            detectors,
        }
    }
}

/// Look up the standardized description for an instrument group name, if known
pub fn describe_instrument_group(name: &str) -> Option<InstrumentDescription> {
    InstrumentGroup::from_name(name).map(|g| g.description())
}
