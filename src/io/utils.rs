use std::fs;
use std::io::{self, prelude::*};
use std::path;

use md5::Context as MD5Context;
use md5::Digest;

const CHECKSUM_BUFFER_SIZE: usize = 2usize.pow(16);

/// A writable stream that keeps a running MD5 checksum of all bytes
#[derive(Clone)]
pub struct MD5HashingStream<T: io::Write> {
    pub stream: T,
    pub context: MD5Context,
}

impl<T: io::Write> MD5HashingStream<T> {
    pub fn new(file: T) -> MD5HashingStream<T> {
        Self {
            stream: file,
            context: MD5Context::new(),
        }
    }

    pub fn compute(&self) -> Digest {
        self.context.clone().compute()
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.stream
    }

    pub fn into_inner(self) -> T {
        self.stream
    }
}

impl<T: io::Write> io::Write for MD5HashingStream<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.stream.write(buf)?;
        self.context.consume(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Compute the MD5 checksum of a file on disk, formatted as lowercase hexadecimal
pub fn checksum_file<P: AsRef<path::Path>>(path: P) -> io::Result<String> {
    let mut handle = io::BufReader::new(fs::File::open(path)?);
    let mut context = MD5Context::new();
    let mut buffer = vec![0u8; CHECKSUM_BUFFER_SIZE];
    loop {
        let n = handle.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", context.compute()))
}
