use std::path::{Path, PathBuf};

use sluice_base::{Endian, Result, Tuple};

use crate::ioutil::{RunFileReader, RunFileWriter};

/// Writes the on-disk spill run format from §6: a header-less sequence of
/// `u32 keyLen, keyLen bytes, u32 valueLen, valueLen bytes` records, byte
/// order fixed at aggregator construction. Records must be appended in
/// non-decreasing key order under the configured comparator; the writer
/// trusts its caller for that (the merge/sort stages upstream are what
/// establish it).
pub(crate) struct RunWriter {
    file: RunFileWriter,
    endian: Endian,
    tmp_path: PathBuf,
    final_path: PathBuf,
    records_written: u64,
}

impl RunWriter {
    pub(crate) fn create(final_path: PathBuf, endian: Endian) -> Result<Self> {
        let tmp_path = final_path.with_extension("tmp");
        let file = RunFileWriter::create(&tmp_path)?;
        Ok(RunWriter {
            file,
            endian,
            tmp_path,
            final_path,
            records_written: 0,
        })
    }

    pub(crate) fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut header = Vec::with_capacity(8);
        self.endian.write_u32(&mut header, key.len() as u32);
        self.file.write_all(&header)?;
        self.file.write_all(key)?;
        header.clear();
        self.endian.write_u32(&mut header, value.len() as u32);
        self.file.write_all(&header)?;
        self.file.write_all(value)?;
        self.records_written += 1;
        Ok(())
    }

    pub(crate) fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Renames the (now-complete) run into place, replacing whatever run
    /// previously occupied `final_path`.
    pub(crate) fn finish(self) -> Result<PathBuf> {
        self.file.finish_and_rename(&self.final_path)?;
        Ok(self.final_path)
    }

    pub(crate) fn abandon(self) -> Result<()> {
        drop(self.file);
        if self.tmp_path.exists() {
            std::fs::remove_file(&self.tmp_path)?;
        }
        Ok(())
    }
}

/// Sequential forward-only reader over one run file, handed to the cursor's
/// merge as one source per spilled run.
pub(crate) struct RunReader {
    file: RunFileReader,
    endian: Endian,
    exhausted: bool,
}

impl RunReader {
    pub(crate) fn open(path: &Path, endian: Endian) -> Result<Self> {
        Ok(RunReader {
            file: RunFileReader::open(path)?,
            endian,
            exhausted: false,
        })
    }

    /// Reads the next record, or `None` at end of file. The file is
    /// self-delimiting (no trailing padding), so EOF can only land cleanly
    /// on a record boundary.
    pub(crate) fn next_tuple(&mut self) -> Result<Option<Tuple>> {
        if self.exhausted {
            return Ok(None);
        }
        let mut len_buf = [0u8; 4];
        if !self.file.read_exact_or_eof(&mut len_buf)? {
            self.exhausted = true;
            return Ok(None);
        }
        let key_len = self.endian.read_u32(&len_buf) as usize;
        let key = self.file.read_vec(key_len)?;
        self.file.read_exact_or_eof(&mut len_buf)?;
        let value_len = self.endian.read_u32(&len_buf) as usize;
        let value = self.file.read_vec(value_len)?;
        Ok(Some(Tuple::new(key, value)))
    }
}
