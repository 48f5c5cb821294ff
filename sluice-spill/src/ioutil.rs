use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use sluice_base::Result;

/// A spill run is written once, sequentially, and later read back once,
/// sequentially; no random access or seeking is required, unlike the
/// teacher's block-oriented columnar file format. `RunFileWriter` /
/// `RunFileReader` are the thin buffered-I/O layer the run codec in
/// [`crate::run`] sits on top of.
pub(crate) struct RunFileWriter {
    file: BufWriter<File>,
    path: PathBuf,
}

impl RunFileWriter {
    pub(crate) fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(RunFileWriter {
            file: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    pub(crate) fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.file.write_all(bytes)?;
        Ok(())
    }

    /// Flushes and closes the file, then atomically renames it into place
    /// at `final_path`, per the spill path layout ("renamed atomically on
    /// pass completion").
    pub(crate) fn finish_and_rename(mut self, final_path: &Path) -> Result<()> {
        self.file.flush()?;
        std::fs::rename(&self.path, final_path)?;
        Ok(())
    }
}

pub(crate) struct RunFileReader {
    file: BufReader<File>,
}

impl RunFileReader {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(RunFileReader {
            file: BufReader::new(file),
        })
    }

    /// Reads exactly `buf.len()` bytes, or returns `Ok(false)` if the file
    /// is exhausted at a record boundary (zero bytes available).
    pub(crate) fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut first = [0u8; 1];
        match self.file.read(&mut first) {
            Ok(0) => return Ok(false),
            Ok(_) => {}
            Err(e) => return Err(e.into()),
        }
        buf[0] = first[0];
        if buf.len() > 1 {
            self.file.read_exact(&mut buf[1..])?;
        }
        Ok(true)
    }

    pub(crate) fn read_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}
