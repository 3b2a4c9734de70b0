use criterion::{black_box, criterion_group, criterion_main, Criterion};

use std::fs;
use std::io;
use std::path::Path;

use mzsubmit::io::open_result_file;
use mzsubmit::io::rewrite::{MzIdContext, MzIdHandler, ReportContext, ReportHandler, StreamingRewriter};
use mzsubmit::meta::{EngineKind, InstrumentGroup, SampleMetadata, SourceFile};
use mzsubmit::psm::{FilterThresholds, PSMSelector, ProteinCache, Selection, ThresholdsUsed};

fn select(path: &str, proteins: &mut ProteinCache) -> Selection {
    let thresholds = FilterThresholds::default();
    let mut used = ThresholdsUsed::default();
    let reader = open_result_file(path, EngineKind::MSGFPlus).unwrap();
    let selection = PSMSelector::select(&thresholds, EngineKind::MSGFPlus, reader, &mut used).unwrap();
    proteins.prepare(Some(Path::new("./test/data/small.fasta"))).unwrap();
    proteins.update_counts(&selection);
    selection
}

fn rewrite_mzid(template: &[u8], source: &SourceFile) -> String {
    let handler = MzIdHandler::new(MzIdContext {
        engine: EngineKind::MSGFPlus,
        engine_version: Some("v2024.03.26"),
        search_database: Some(Path::new("/db/small.fasta")),
        spectrum_file: Some(source),
    });
    StreamingRewriter::new(template, io::sink(), handler)
        .rewrite()
        .unwrap()
        .checksum
}

fn rewrite_report(
    template: &[u8],
    source: &SourceFile,
    sample: &SampleMetadata,
    selection: &Selection,
    proteins: &ProteinCache,
) -> String {
    let handler = ReportHandler::new(ReportContext {
        engine: EngineKind::MSGFPlus,
        engine_version: None,
        instrument: Some(InstrumentGroup::QExactive.description()),
        sample,
        spectrum_file: Some(source),
        selection,
        proteins,
        threshold: None,
    });
    StreamingRewriter::new(template, io::sink(), handler)
        .rewrite()
        .unwrap()
        .checksum
}

fn rewriting(c: &mut Criterion) {
    let mzid = fs::read("./test/data/mzid_template.mzid").unwrap();
    let report = fs::read("./test/data/report_template.xml").unwrap();
    let source = SourceFile::from_path(Path::new("/data/sample_01.mzML"));
    let sample = SampleMetadata::default();
    let mut proteins = ProteinCache::new();
    let selection = select("./test/data/msgfplus_syn.txt", &mut proteins);

    c.bench_function("rewrite_mzid", |b| {
        b.iter(|| rewrite_mzid(black_box(&mzid), &source))
    });
    c.bench_function("rewrite_report", |b| {
        b.iter(|| rewrite_report(black_box(&report), &source, &sample, &selection, &proteins))
    });
}

criterion_group!(benches, rewriting);
criterion_main!(benches);
