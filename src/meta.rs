//! Descriptive metadata shared by the rewritten documents and the submission manifest.
pub mod file_description;
pub mod instrument;
pub mod sample;
pub mod software;

pub use crate::meta::file_description::{infer_from_path, MassSpectrometryFormat, SourceFile};
pub use crate::meta::instrument::{describe_instrument_group, InstrumentDescription, InstrumentGroup};
pub use crate::meta::sample::SampleMetadata;
pub use crate::meta::software::{EngineKind, Software};
