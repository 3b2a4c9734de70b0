//! Handlers for the identification-list (mzIdentML) template. Apart from a few
//! narrow attribute overrides the template is copied through unchanged.
use std::io::prelude::*;
use std::path::Path;

use log::debug;
use quick_xml::events::{BytesStart, Event};

use super::engine::{attribute_value, HandlerAction, HandlerError, RewriteHandler, XmlSink};
use super::location::MzIdLocation;
use crate::meta::{EngineKind, MassSpectrometryFormat, Software, SourceFile};
use crate::params::{ControlledVocabulary, ParamCow, ParamLike};

macro_rules! unimod {
    ($name:expr, $acc:expr) => {
        ControlledVocabulary::UNIMOD.const_param($name, $acc)
    };
}

/// Canonical names of the modifications most commonly declared in search
/// parameters
const UNIMOD_TERMS: &[ParamCow<'static>] = &[
    unimod!("Acetyl", "UNIMOD:1"),
    unimod!("Amidated", "UNIMOD:2"),
    unimod!("Carbamidomethyl", "UNIMOD:4"),
    unimod!("Carbamyl", "UNIMOD:5"),
    unimod!("Deamidated", "UNIMOD:7"),
    unimod!("Phospho", "UNIMOD:21"),
    unimod!("Glu->pyro-Glu", "UNIMOD:27"),
    unimod!("Gln->pyro-Glu", "UNIMOD:28"),
    unimod!("Methyl", "UNIMOD:34"),
    unimod!("Oxidation", "UNIMOD:35"),
    unimod!("Dimethyl", "UNIMOD:36"),
    unimod!("GG", "UNIMOD:121"),
    unimod!("Label:13C(6)", "UNIMOD:188"),
    unimod!("iTRAQ4plex", "UNIMOD:214"),
    unimod!("Label:13C(6)15N(2)", "UNIMOD:259"),
    unimod!("Label:13C(6)15N(4)", "UNIMOD:267"),
    unimod!("TMT6plex", "UNIMOD:737"),
    unimod!("iTRAQ8plex", "UNIMOD:730"),
    unimod!("TMTpro", "UNIMOD:2016"),
];

pub fn unimod_term(accession: &str) -> Option<&'static ParamCow<'static>> {
    UNIMOD_TERMS
        .iter()
        .find(|t| t.accession() == Some(accession))
}

#[derive(Debug, Clone)]
pub struct MzIdContext<'a> {
    pub engine: EngineKind,
    pub engine_version: Option<&'a str>,
    pub search_database: Option<&'a Path>,
    pub spectrum_file: Option<&'a SourceFile>,
}

#[derive(Debug)]
pub struct MzIdHandler<'a> {
    context: MzIdContext<'a>,
    software: Option<Software>,
    overrides_applied: usize,
}

impl<'a> MzIdHandler<'a> {
    pub fn new(context: MzIdContext<'a>) -> Self {
        Self {
            context,
            software: None,
            overrides_applied: 0,
        }
    }

    pub fn software(&self) -> Option<&Software> {
        self.software.as_ref()
    }

    /// How many elements had attributes rewritten
    pub fn overrides_applied(&self) -> usize {
        self.overrides_applied
    }

    fn software_override(&mut self, element: &BytesStart<'_>) -> HandlerAction {
        let declared = Software::new(
            attribute_value(element, "name").unwrap_or_default(),
            attribute_value(element, "version").unwrap_or_default(),
            String::new(),
        );
        let software = declared.reconcile(self.context.engine, self.context.engine_version);
        let overrides = vec![
            ("name".to_string(), software.name.clone()),
            ("version".to_string(), software.version.clone()),
        ];
        self.software = Some(software);
        HandlerAction::OverrideAttributes(overrides)
    }

    fn file_format_override(&self, element: &BytesStart<'_>) -> HandlerAction {
        let Some(format) = self
            .context
            .spectrum_file
            .and_then(|s| s.file_format.file_format_param())
        else {
            return HandlerAction::PassThrough;
        };
        match attribute_value(element, "accession") {
            Some(accession)
                if MassSpectrometryFormat::is_format_accession(&accession)
                    && Some(accession.as_str()) != format.accession() =>
            {
                HandlerAction::OverrideAttributes(vec![
                    ("accession".into(), format.accession.to_string()),
                    ("name".into(), format.name.to_string()),
                ])
            }
            _ => HandlerAction::PassThrough,
        }
    }

    fn modification_override(&self, element: &BytesStart<'_>) -> HandlerAction {
        if attribute_value(element, "cvRef").as_deref() != Some("UNIMOD") {
            return HandlerAction::PassThrough;
        }
        let accession = attribute_value(element, "accession").unwrap_or_default();
        let current = attribute_value(element, "name").unwrap_or_default();
        match unimod_term(&accession) {
            Some(term) if term.name() != current => {
                debug!(
                    "Renaming modification {accession} from {current:?} to {:?}",
                    term.name()
                );
                HandlerAction::OverrideAttributes(vec![("name".into(), term.name().to_string())])
            }
            _ => HandlerAction::PassThrough,
        }
    }

    fn location_override(path: &str, name: &str) -> HandlerAction {
        HandlerAction::OverrideAttributes(vec![
            ("location".into(), path.into()),
            ("name".into(), name.into()),
        ])
    }
}

impl RewriteHandler for MzIdHandler<'_> {
    type Location = MzIdLocation;

    fn handle_start<W: Write>(
        &mut self,
        location: Self::Location,
        element: &BytesStart<'_>,
        _subtree: Option<&[Event<'static>]>,
        _sink: &mut XmlSink<W>,
    ) -> Result<HandlerAction, HandlerError> {
        let action = match (location, element.name().as_ref()) {
            (MzIdLocation::Header, b"AnalysisSoftware") => self.software_override(element),
            (
                MzIdLocation::SequenceCollection | MzIdLocation::AnalysisProtocolCollection,
                b"cvParam",
            ) => self.modification_override(element),
            (MzIdLocation::InputSearchDatabase, b"SearchDatabase") => {
                match self.context.search_database {
                    Some(path) => {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default();
                        Self::location_override(&path.to_string_lossy(), &name)
                    }
                    None => HandlerAction::PassThrough,
                }
            }
            (MzIdLocation::InputSpectraData, b"SpectraData") => match self.context.spectrum_file {
                Some(source) => Self::location_override(&source.location, &source.name),
                None => HandlerAction::PassThrough,
            },
            (MzIdLocation::InputSpectraData, b"cvParam") => self.file_format_override(element),
            _ => HandlerAction::PassThrough,
        };
        if matches!(action, HandlerAction::OverrideAttributes(_)) {
            self.overrides_applied += 1;
        }
        Ok(action)
    }
}
