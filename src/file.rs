//! Plaintext and gzip-compressed file input and output.
//!
//! The [`InputFile`] and [`OutputFile`] abstractions are for working with
//! possibly gzip-compressed TSV files. The path `-` stands for standard
//! input or standard output.
//!
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use thiserror::Error;

/// Path denoting standard input or standard output.
pub const STDIO_PATH: &str = "-";

#[derive(Error, Debug)]
pub enum FileError {
    #[error("IO error: {0}")]
    IOError(#[from] io::Error),
    #[error("Cannot open '{0}': {1}")]
    OpenError(String, io::Error),
}

/// Check if a file is gzipped by looking for the magic numbers.
///
/// Files shorter than two bytes are not gzipped.
fn is_gzipped_file(file_path: &str) -> io::Result<bool> {
    let file = File::open(file_path)?;
    let mut buffer = Vec::with_capacity(2);
    file.take(2).read_to_end(&mut buffer)?;
    Ok(buffer == [0x1f, 0x8b])
}

/// An input file, read either as plaintext or through a gzip decoder.
pub struct InputFile {
    pub filepath: String,
}

impl InputFile {
    /// Constructs a new `InputFile`. Compression is detected from the file
    /// contents, not the extension.
    pub fn new(filepath: &str) -> Self {
        Self {
            filepath: filepath.to_string(),
        }
    }

    /// Opens the file and returns a buffered reader, decompressing if needed.
    pub fn reader(&self) -> Result<BufReader<Box<dyn Read>>, FileError> {
        if self.filepath == STDIO_PATH {
            return Ok(BufReader::new(Box::new(io::stdin())));
        }
        let file = File::open(&self.filepath)
            .map_err(|e| FileError::OpenError(self.filepath.clone(), e))?;
        let reader: Box<dyn Read> = if is_gzipped_file(&self.filepath)? {
            Box::new(GzDecoder::new(file))
        } else {
            Box::new(file)
        };
        Ok(BufReader::new(reader))
    }
}

/// An output file.
///
/// Paths ending in `.gz` are written gzip-compressed; `-` writes to
/// standard output.
pub struct OutputFile {
    pub filepath: String,
}

impl OutputFile {
    pub fn new(filepath: &str) -> Self {
        Self {
            filepath: filepath.to_string(),
        }
    }

    /// Opens the file and returns a buffered writer.
    pub fn writer(&self) -> Result<Box<dyn Write>, FileError> {
        let outfile = &self.filepath;
        if outfile == STDIO_PATH {
            return Ok(Box::new(BufWriter::new(io::stdout())));
        }
        let file =
            File::create(outfile).map_err(|e| FileError::OpenError(outfile.clone(), e))?;
        let writer: Box<dyn Write> = if outfile.ends_with(".gz") {
            Box::new(BufWriter::new(GzEncoder::new(file, Compression::default())))
        } else {
            Box::new(BufWriter::new(file))
        };
        Ok(writer)
    }
}
