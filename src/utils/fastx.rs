use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use flate2::read::MultiGzDecoder;
use crate::config::defs::FASTQ_LINES_PER_RECORD;
use crate::utils::file::is_gzipped;


/// Enum to hold either an uncompressed or gzipped file reader
pub enum FileReader {
    Uncompressed(BufReader<File>),
    Gzipped(MultiGzDecoder<File>),
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            FileReader::Uncompressed(r) => r.read(buf),
            FileReader::Gzipped(r) => r.read(buf),
        }
    }
}


/// Opens a file for reading, decompressing transparently when the content
/// starts with the gzip magic bytes.
///
/// # Arguments
///
/// * `path` - Plain or gzipped file.
///
/// # Returns
/// io::Result<FileReader>
pub fn file_reader(path: &Path) -> io::Result<FileReader> {
    let gzipped = is_gzipped(path)?;
    let file = File::open(path)?;
    if gzipped {
        Ok(FileReader::Gzipped(MultiGzDecoder::new(file)))
    } else {
        Ok(FileReader::Uncompressed(BufReader::new(file)))
    }
}


/// Counts the newline bytes of a plain or gzipped file, as `wc -l` does. A
/// final line with no terminating newline is not counted.
pub fn line_count(path: &Path) -> io::Result<u64> {
    let mut reader = BufReader::new(file_reader(path)?);
    let mut lines = 0u64;
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            break;
        }
        lines += buf.iter().filter(|&&b| b == b'\n').count() as u64;
        let consumed = buf.len();
        reader.consume(consumed);
    }
    Ok(lines)
}


/// Estimates the number of records in a FASTQ by dividing its line count by
/// four, rounded to the nearest record. Trusts four-line framing; records are
/// never parsed.
///
/// # Arguments
///
/// * `path` - Valid path to a plain or gzipped fastq file.
///
/// # Returns
/// u64: Number of records in the FASTQ.
pub fn read_count(path: &Path) -> io::Result<u64> {
    let lines = line_count(path)?;
    Ok((lines + FASTQ_LINES_PER_RECORD / 2) / FASTQ_LINES_PER_RECORD)
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use tempfile::tempdir;

    fn fastq_text(records: usize) -> String {
        (0..records)
            .map(|i| format!("@read{}\nACGTACGT\n+\nIIIIIIII\n", i))
            .collect()
    }

    #[test]
    fn test_read_count_plain() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reads.fq");
        std::fs::write(&path, fastq_text(7))?;
        assert_eq!(read_count(&path)?, 7);
        Ok(())
    }

    #[test]
    fn test_read_count_gzipped_matches_plain() -> io::Result<()> {
        let dir = tempdir()?;
        let plain = dir.path().join("reads.fq");
        let gz = dir.path().join("reads.fq.gz");
        let text = fastq_text(12);
        std::fs::write(&plain, &text)?;

        let mut encoder = GzEncoder::new(File::create(&gz)?, Compression::best());
        encoder.write_all(text.as_bytes())?;
        encoder.finish()?;

        assert_eq!(read_count(&gz)?, 12);
        assert_eq!(read_count(&gz)?, read_count(&plain)?);
        Ok(())
    }

    #[test]
    fn test_read_count_empty_file() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.fq");
        std::fs::write(&path, "")?;
        assert_eq!(read_count(&path)?, 0);
        Ok(())
    }

    #[test]
    fn test_read_count_missing_final_newline() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("reads.fq");
        std::fs::write(&path, "@r1\nACGT\n+\nIIII\n@r2\nACGT\n+\nIIII")?;
        assert_eq!(line_count(&path)?, 7);
        assert_eq!(read_count(&path)?, 2);
        Ok(())
    }

    #[test]
    fn test_truncated_record_counts_as_empty() -> io::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("truncated.fq");
        std::fs::write(&path, "@r1\nACGT")?;
        assert_eq!(line_count(&path)?, 1);
        assert_eq!(read_count(&path)?, 0);
        Ok(())
    }

    #[test]
    fn test_read_count_missing_file() {
        let dir = tempdir().unwrap();
        assert!(read_count(&dir.path().join("nope.fq")).is_err());
    }
}
