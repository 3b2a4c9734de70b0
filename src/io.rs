pub(crate) mod compression;
pub mod fasta;
pub mod pseudo_msgf;
pub mod rewrite;
pub mod synopsis;
mod utils;

pub use crate::io::compression::{is_gzipped, is_gzipped_extension, open_text_file};
pub use crate::io::fasta::{open_fasta, FastaEntry, FastaError, FastaReader};
pub use crate::io::pseudo_msgf::{write_pseudo_msgf, PseudoMSGFWriter, PSEUDO_MSGF_COLUMNS};
pub use crate::io::synopsis::{open_result_file, ResultFileError, ResultFileReader};
pub use crate::io::utils::{checksum_file, MD5HashingStream};
