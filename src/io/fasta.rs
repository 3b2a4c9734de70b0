//! A minimal FASTA reader for protein sequence databases.
use std::io::{self, prelude::*};
use std::path::Path;

use thiserror::Error;

use super::compression::open_text_file;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FastaEntry {
    /// The first whitespace-delimited token of the header line
    pub accession: String,
    pub description: String,
    pub sequence: String,
}

#[derive(Debug, Error)]
pub enum FastaError {
    #[error("Sequence data found before the first header at line {0}")]
    MissingHeader(usize),
    #[error("An IO error occurred while reading a FASTA file: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

/// Iterate over the entries of a FASTA stream
pub struct FastaReader<R: BufRead> {
    handle: R,
    line_number: usize,
    pending: Option<FastaEntry>,
    buffer: String,
    done: bool,
}

impl<R: BufRead> FastaReader<R> {
    pub fn new(handle: R) -> Self {
        Self {
            handle,
            line_number: 0,
            pending: None,
            buffer: String::new(),
            done: false,
        }
    }

    fn start_entry(line: &str) -> FastaEntry {
        let header = line[1..].trim();
        let (accession, description) = match header.split_once(char::is_whitespace) {
            Some((acc, desc)) => (acc.to_string(), desc.trim().to_string()),
            None => (header.to_string(), String::new()),
        };
        FastaEntry {
            accession,
            description,
            sequence: String::new(),
        }
    }

    fn read_next(&mut self) -> Result<Option<FastaEntry>, FastaError> {
        if self.done {
            return Ok(None);
        }
        loop {
            self.buffer.clear();
            let n = self.handle.read_line(&mut self.buffer)?;
            if n == 0 {
                self.done = true;
                return Ok(self.pending.take());
            }
            self.line_number += 1;
            let line = self.buffer.trim_end();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('>') {
                let next = Self::start_entry(line);
                if let Some(entry) = self.pending.replace(next) {
                    return Ok(Some(entry));
                }
            } else {
                match self.pending.as_mut() {
                    Some(entry) => entry.sequence.push_str(line.trim()),
                    None => return Err(FastaError::MissingHeader(self.line_number)),
                }
            }
        }
    }
}

impl<R: BufRead> Iterator for FastaReader<R> {
    type Item = Result<FastaEntry, FastaError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_next().transpose()
    }
}

/// Open a FASTA file, decompressing it if necessary
pub fn open_fasta<P: AsRef<Path>>(path: P) -> io::Result<FastaReader<Box<dyn BufRead>>> {
    Ok(FastaReader::new(open_text_file(path)?))
}
