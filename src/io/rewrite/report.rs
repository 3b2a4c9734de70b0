//! Handlers for the report-style submission template.
use std::io::prelude::*;

use log::{debug, info};
use quick_xml::events::{BytesStart, Event};

use super::engine::{attribute_value, HandlerAction, HandlerError, RewriteHandler, XmlSink};
use super::location::ReportLocation;
use crate::meta::{EngineKind, InstrumentDescription, SampleMetadata, Software, SourceFile};
use crate::params::{ControlledVocabulary, ParamCow, ParamLike};
use crate::psm::proteins::{ProteinCache, ProteinEntry};
use crate::psm::selector::{SelectedMatch, Selection};
use crate::psm::thresholds::ThresholdKind;

const UPSTREAM_FLANK: ParamCow<'static> =
    ControlledVocabulary::PRIDE.const_param("Upstream flanking sequence", "PRIDE:0000065");
const DOWNSTREAM_FLANK: ParamCow<'static> =
    ControlledVocabulary::PRIDE.const_param("Downstream flanking sequence", "PRIDE:0000066");
const CHARGE_STATE: ParamCow<'static> = ControlledVocabulary::MS.const_param("charge state", "MS:1000041");
const SPEC_EVALUE: ParamCow<'static> =
    ControlledVocabulary::MS.const_param("MS-GF:SpecEValue", "MS:1002052");
const PEPTIDE_PVALUE: ParamCow<'static> =
    ControlledVocabulary::MS.const_param("p-value for peptides", "MS:1001870");

/// Everything the report handlers need from the current job
#[derive(Debug, Clone)]
pub struct ReportContext<'a> {
    pub engine: EngineKind,
    pub engine_version: Option<&'a str>,
    pub instrument: Option<InstrumentDescription>,
    pub sample: &'a SampleMetadata,
    pub spectrum_file: Option<&'a SourceFile>,
    pub selection: &'a Selection,
    pub proteins: &'a ProteinCache,
    pub threshold: Option<(ThresholdKind, f64)>,
}

#[derive(Debug)]
pub struct ReportHandler<'a> {
    context: ReportContext<'a>,
    identifications_written: bool,
    instrument_written: bool,
    software: Option<Software>,
}

impl<'a> ReportHandler<'a> {
    pub fn new(context: ReportContext<'a>) -> Self {
        Self {
            context,
            identifications_written: false,
            instrument_written: false,
            software: None,
        }
    }

    /// The software description written in place of the template's, if the
    /// template had one
    pub fn software(&self) -> Option<&Software> {
        self.software.as_ref()
    }

    pub fn identifications_written(&self) -> bool {
        self.identifications_written
    }

    fn sample_override(&self, element: &BytesStart<'_>) -> HandlerAction {
        let sample = self.context.sample;
        if attribute_value(element, "cvLabel").as_deref() == Some("NEWT") {
            if let Some(species) = sample.primary_species() {
                let value = if species.value().is_empty() {
                    species.name()
                } else {
                    species.value()
                };
                return HandlerAction::OverrideAttributes(vec![
                    ("accession".into(), species.accession().unwrap_or_default().into()),
                    ("name".into(), species.name().into()),
                    ("value".into(), value.into()),
                ]);
            }
        }
        let term = attribute_value(element, "accession")
            .and_then(|acc| sample.find_by_accession(&acc).cloned());
        match term {
            Some(term) if !term.value.is_empty() => {
                HandlerAction::OverrideAttributes(vec![("value".into(), term.value)])
            }
            _ => HandlerAction::PassThrough,
        }
    }

    fn write_source_file<W: Write>(
        &self,
        source: &SourceFile,
        sink: &mut XmlSink<W>,
    ) -> Result<(), HandlerError> {
        sink.start("sourceFile", &[])?;
        sink.text_element("nameOfFile", &source.name)?;
        sink.text_element("pathToFile", &source.location)?;
        sink.text_element("fileType", source.file_format.label())?;
        sink.end("sourceFile")?;
        Ok(())
    }

    fn write_instrument<W: Write>(
        &self,
        description: &InstrumentDescription,
        sink: &mut XmlSink<W>,
    ) -> Result<(), HandlerError> {
        sink.start("source", &[])?;
        for param in description.sources {
            sink.write_cv_param(param)?;
        }
        sink.end("source")?;

        let count = description.analyzers.len().to_string();
        sink.start("analyzerList", &[("count", count.as_str())])?;
        for param in description.analyzers {
            sink.start("analyzer", &[])?;
            sink.write_cv_param(param)?;
            sink.end("analyzer")?;
        }
        sink.end("analyzerList")?;

        sink.start("detector", &[])?;
        for param in description.detectors {
            sink.write_cv_param(param)?;
        }
        sink.end("detector")?;
        Ok(())
    }

    fn write_software<W: Write>(
        &mut self,
        element: &BytesStart<'_>,
        subtree: &[Event<'static>],
        sink: &mut XmlSink<W>,
    ) -> Result<(), HandlerError> {
        let declared = parse_software(subtree)?;
        let software = declared.reconcile(self.context.engine, self.context.engine_version);
        debug!("Software {:?} reported as {:?}", declared.name, software.name);

        sink.write_event(Event::Start(element.to_owned()))?;
        sink.text_element("name", &software.name)?;
        sink.text_element("version", &software.version)?;
        if !software.comments.is_empty() {
            sink.text_element("comments", &software.comments)?;
        }
        sink.end("software")?;
        self.software = Some(software);
        Ok(())
    }

    fn write_peptide<W: Write>(
        &self,
        protein: &ProteinEntry,
        selected: &SelectedMatch,
        sink: &mut XmlSink<W>,
    ) -> Result<(), HandlerError> {
        sink.start("Peptide", &[])?;
        sink.text_element("Sequence", &selected.clean_sequence)?;
        if let Some((start, end)) = protein.locate(&selected.clean_sequence) {
            sink.text_element("Start", &start.to_string())?;
            sink.text_element("End", &end.to_string())?;
        }
        sink.text_element("SpectrumReference", &selected.scan().to_string())?;

        sink.start("additional", &[])?;
        if !selected.prefix.is_empty() {
            sink.write_cv_param(&UPSTREAM_FLANK.to_param().with_value(&selected.prefix))?;
        }
        if !selected.suffix.is_empty() {
            sink.write_cv_param(&DOWNSTREAM_FLANK.to_param().with_value(&selected.suffix))?;
        }
        sink.write_cv_param(&CHARGE_STATE.to_param().with_value(selected.record.charge))?;
        if let Some(spec_prob) = selected.record.spec_prob {
            sink.write_cv_param(&SPEC_EVALUE.to_param().with_value(spec_prob))?;
        }
        if let Some(p_value) = selected.p_value {
            sink.write_cv_param(&PEPTIDE_PVALUE.to_param().with_value(p_value))?;
        }
        sink.end("additional")?;
        sink.end("Peptide")?;
        Ok(())
    }

    fn write_identifications<W: Write>(
        &mut self,
        element: &BytesStart<'_>,
        sink: &mut XmlSink<W>,
    ) -> Result<(), HandlerError> {
        if self.identifications_written {
            return Err(HandlerError::Invalid(
                "The template contains more than one Identifications element".into(),
            ));
        }
        let context = &self.context;
        let database = context.proteins.database_name();
        let threshold = context
            .threshold
            .map(|(_, value)| value.to_string())
            .unwrap_or_default();

        sink.write_event(Event::Start(element.to_owned()))?;
        for (accession, matches) in context.selection.protein_groups() {
            let protein = context.proteins.get(accession).ok_or_else(|| {
                HandlerError::Invalid(format!(
                    "Protein {accession} was selected but is missing from the protein cache"
                ))
            })?;
            sink.start("GelFreeIdentification", &[])?;
            sink.text_element("Accession", accession)?;
            sink.text_element("Database", &database)?;
            for selected in matches.iter() {
                self.write_peptide(protein, selected, sink)?;
            }
            let best = matches
                .iter()
                .map(|m| m.comparison_score)
                .fold(f64::INFINITY, f64::min);
            sink.text_element("Score", &best.to_string())?;
            sink.text_element("Threshold", &threshold)?;
            sink.text_element("SearchEngine", context.engine.label())?;
            let index = protein.index.to_string();
            sink.empty("FastaSequenceReference", &[("index", index.as_str())])?;
            sink.end("GelFreeIdentification")?;
        }
        sink.end("Identifications")?;
        self.write_fasta(sink)?;
        info!(
            "Wrote {} proteins and {} peptides to the report",
            context.selection.protein_count(),
            context.selection.len()
        );
        self.identifications_written = true;
        Ok(())
    }

    fn write_fasta<W: Write>(&self, sink: &mut XmlSink<W>) -> Result<(), HandlerError> {
        let proteins = self.context.proteins;
        let database = proteins.database_name();
        sink.start("Fasta", &[("sourceDb", database.as_str())])?;
        for protein in proteins.retained() {
            let index = protein.index.to_string();
            let attrs = [("id", index.as_str()), ("accession", protein.accession.as_str())];
            match protein.sequence.as_deref() {
                Some(sequence) if !sequence.is_empty() => {
                    sink.start("Sequence", &attrs)?;
                    sink.write_event(Event::Text(quick_xml::events::BytesText::new(sequence)))?;
                    sink.end("Sequence")?;
                }
                _ => sink.empty("Sequence", &attrs)?,
            }
        }
        sink.end("Fasta")?;
        Ok(())
    }
}

/// Read the tool description out of a captured `software` subtree
fn parse_software(subtree: &[Event<'static>]) -> Result<Software, HandlerError> {
    let mut software = Software::default();
    let mut current: Option<Vec<u8>> = None;
    for event in subtree {
        match event {
            Event::Start(e) => current = Some(e.name().as_ref().to_vec()),
            Event::End(_) => current = None,
            Event::Text(text) => {
                let value = text.unescape()?.trim().to_string();
                match current.as_deref() {
                    Some(b"name") => software.name = value,
                    Some(b"version") => software.version = value,
                    Some(b"comments") => software.comments = value,
                    _ => {}
                }
            }
            _ => {}
        }
    }
    Ok(software)
}

impl RewriteHandler for ReportHandler<'_> {
    type Location = ReportLocation;

    fn wants_subtree(&self, location: Self::Location, element: &BytesStart<'_>) -> bool {
        location == ReportLocation::DataProcessingBlock && element.name().as_ref() == b"software"
    }

    fn handle_start<W: Write>(
        &mut self,
        location: Self::Location,
        element: &BytesStart<'_>,
        subtree: Option<&[Event<'static>]>,
        sink: &mut XmlSink<W>,
    ) -> Result<HandlerAction, HandlerError> {
        match (location, element.name().as_ref()) {
            (ReportLocation::AdminBlock, b"cvParam") => Ok(self.sample_override(element)),
            (ReportLocation::AdminBlock, b"sourceFile") => match self.context.spectrum_file {
                Some(source) => {
                    self.write_source_file(source, sink)?;
                    Ok(HandlerAction::Replaced)
                }
                None => Ok(HandlerAction::PassThrough),
            },
            (ReportLocation::InstrumentBlock, b"instrumentName") => {
                match &self.context.instrument {
                    Some(description) => {
                        sink.text_element("instrumentName", description.model.name())?;
                        Ok(HandlerAction::Replaced)
                    }
                    None => Ok(HandlerAction::PassThrough),
                }
            }
            // The first component element reached is replaced by the whole
            // description, the others are dropped
            (ReportLocation::InstrumentBlock, b"source" | b"analyzerList" | b"detector") => {
                match &self.context.instrument {
                    Some(_) if self.instrument_written => Ok(HandlerAction::Skip),
                    Some(description) => {
                        self.write_instrument(description, sink)?;
                        self.instrument_written = true;
                        Ok(HandlerAction::Replaced)
                    }
                    None => Ok(HandlerAction::PassThrough),
                }
            }
            (ReportLocation::DataProcessingBlock, b"software") => {
                self.write_software(element, subtree.unwrap_or_default(), sink)?;
                Ok(HandlerAction::Replaced)
            }
            (ReportLocation::Identifications, b"Identifications") => {
                self.write_identifications(element, sink)?;
                Ok(HandlerAction::Replaced)
            }
            (ReportLocation::Identifications, b"Fasta") => Ok(HandlerAction::Skip),
            _ => Ok(HandlerAction::PassThrough),
        }
    }
}
