//! Classifying where in a known template document the rewriter currently is.
//!
//! Each template dialect has a closed set of zones. The current zone is a pure
//! function of the previous zone, the name of the element being opened and the
//! set of zone-relevant ancestors that are still open.
use std::fmt::{Debug, Display};

use bitflags::bitflags;

bitflags! {
    /// The zone-relevant elements currently open above the element being classified
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AncestorFlags: u16 {
        const MZDATA = 1;
        const MZDATA_DESCRIPTION = 1 << 1;
        const EXPERIMENT = 1 << 2;
        const DATA_COLLECTION = 1 << 3;
        const INPUTS = 1 << 4;
    }
}

pub trait DocumentLocation: Debug + Display + Clone + Copy + PartialEq + Eq {
    fn initial() -> Self;

    /// The flag an open element named `name` contributes to its descendants
    fn ancestor_flag(name: &[u8]) -> AncestorFlags;

    /// The zone entered by opening `name` beneath `ancestors`
    fn transition(self, name: &[u8], ancestors: AncestorFlags) -> Self;
}

/// Zones of the report-style template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportLocation {
    Header,
    Protocol,
    AdminBlock,
    InstrumentBlock,
    DataProcessingBlock,
    ExperimentAdditional,
    Identifications,
    PTMs,
    DatabaseMappings,
    ConfigurationOptions,
}

impl Display for ReportLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl DocumentLocation for ReportLocation {
    fn initial() -> Self {
        Self::Header
    }

    fn ancestor_flag(name: &[u8]) -> AncestorFlags {
        match name {
            b"Experiment" => AncestorFlags::EXPERIMENT,
            b"mzData" => AncestorFlags::MZDATA,
            b"MzDataDescription" => AncestorFlags::MZDATA_DESCRIPTION,
            _ => AncestorFlags::empty(),
        }
    }

    fn transition(self, name: &[u8], ancestors: AncestorFlags) -> Self {
        let in_description = ancestors.contains(AncestorFlags::MZDATA_DESCRIPTION);
        match name {
            b"Protocol" => Self::Protocol,
            b"admin" if in_description => Self::AdminBlock,
            b"instrument" if in_description => Self::InstrumentBlock,
            b"dataProcessing" if in_description => Self::DataProcessingBlock,
            b"additional"
                if ancestors.contains(AncestorFlags::EXPERIMENT)
                    && !ancestors.contains(AncestorFlags::MZDATA) =>
            {
                Self::ExperimentAdditional
            }
            b"Identifications" => Self::Identifications,
            b"PTMs" => Self::PTMs,
            b"DatabaseMappings" => Self::DatabaseMappings,
            b"ConfigurationOptions" => Self::ConfigurationOptions,
            _ => self,
        }
    }
}

/// Zones of the identification-list (mzIdentML) template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MzIdLocation {
    Header,
    SequenceCollection,
    AnalysisCollection,
    AnalysisProtocolCollection,
    DataCollection,
    Inputs,
    InputSearchDatabase,
    InputSpectraData,
    AnalysisData,
}

impl Display for MzIdLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl DocumentLocation for MzIdLocation {
    fn initial() -> Self {
        Self::Header
    }

    fn ancestor_flag(name: &[u8]) -> AncestorFlags {
        match name {
            b"DataCollection" => AncestorFlags::DATA_COLLECTION,
            b"Inputs" => AncestorFlags::INPUTS,
            _ => AncestorFlags::empty(),
        }
    }

    fn transition(self, name: &[u8], ancestors: AncestorFlags) -> Self {
        let in_inputs = ancestors.contains(AncestorFlags::INPUTS);
        match name {
            b"SequenceCollection" => Self::SequenceCollection,
            b"AnalysisCollection" => Self::AnalysisCollection,
            b"AnalysisProtocolCollection" => Self::AnalysisProtocolCollection,
            b"DataCollection" => Self::DataCollection,
            b"Inputs" if ancestors.contains(AncestorFlags::DATA_COLLECTION) => Self::Inputs,
            b"SourceFile" if in_inputs => Self::Inputs,
            b"SearchDatabase" if in_inputs => Self::InputSearchDatabase,
            b"SpectraData" if in_inputs => Self::InputSpectraData,
            b"AnalysisData" => Self::AnalysisData,
            _ => self,
        }
    }
}

/// Follows element open and close events, reporting the current zone
#[derive(Debug, Clone)]
pub struct LocationTracker<L: DocumentLocation> {
    current: L,
    open: Vec<AncestorFlags>,
    ancestors: AncestorFlags,
}

impl<L: DocumentLocation> Default for LocationTracker<L> {
    fn default() -> Self {
        Self {
            current: L::initial(),
            open: Vec::new(),
            ancestors: AncestorFlags::empty(),
        }
    }
}

impl<L: DocumentLocation> LocationTracker<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> L {
        self.current
    }

    pub fn ancestors(&self) -> AncestorFlags {
        self.ancestors
    }

    pub fn depth(&self) -> usize {
        self.open.len()
    }

    /// Open an element that will have children, returning the zone it is in
    pub fn enter(&mut self, name: &[u8]) -> L {
        self.current = self.current.transition(name, self.ancestors);
        let flag = L::ancestor_flag(name);
        self.open.push(flag);
        self.ancestors |= flag;
        self.current
    }

    /// Classify a self-closing element
    pub fn visit(&mut self, name: &[u8]) -> L {
        self.current = self.current.transition(name, self.ancestors);
        self.current
    }

    pub fn leave(&mut self) {
        if self.open.pop().is_some() {
            self.ancestors = self
                .open
                .iter()
                .fold(AncestorFlags::empty(), |acc, flag| acc | *flag);
        }
    }
}
