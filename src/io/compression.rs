use std::fs;
use std::io::{self, prelude::*, BufReader};
use std::path;

use flate2::bufread::MultiGzDecoder;

pub fn is_gzipped(header: &[u8]) -> bool {
    header.starts_with(b"\x1f\x8b")
}

pub fn is_gzipped_extension(path: path::PathBuf) -> (bool, path::PathBuf) {
    if let Some(ext) = path.extension() {
        if ext.to_ascii_lowercase() == "gz" {
            (true, path.with_extension(""))
        } else {
            (false, path)
        }
    } else {
        (false, path)
    }
}

/// Open a text file for buffered reading, transparently decompressing it when
/// its leading bytes carry the gzip magic number.
pub fn open_text_file<P: AsRef<path::Path>>(path: P) -> io::Result<Box<dyn BufRead>> {
    let file = fs::File::open(path.as_ref())?;
    let mut handle = BufReader::new(file);
    let gzipped = is_gzipped(handle.fill_buf()?);
    if gzipped {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(handle))))
    } else {
        Ok(Box::new(handle))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::{write::GzEncoder, Compression};

    #[test]
    fn test_gzip_detection() -> io::Result<()> {
        let tmpdir = tempfile::tempdir()?;
        let plain = tmpdir.path().join("plain.txt");
        fs::write(&plain, b"alpha\nbeta\n")?;

        let compressed = tmpdir.path().join("plain.txt.gz");
        let mut enc = GzEncoder::new(fs::File::create(&compressed)?, Compression::default());
        enc.write_all(b"alpha\nbeta\n")?;
        enc.finish()?;

        for path in [plain, compressed.clone()] {
            let lines: Vec<String> = open_text_file(&path)?.lines().collect::<io::Result<_>>()?;
            assert_eq!(lines, vec!["alpha".to_string(), "beta".to_string()]);
        }

        let (gz, stripped) = is_gzipped_extension(compressed);
        assert!(gz);
        assert_eq!(stripped.file_name().unwrap(), "plain.txt");
        Ok(())
    }
}
