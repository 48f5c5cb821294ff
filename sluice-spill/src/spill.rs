use std::cmp::Ordering;
use std::path::PathBuf;
use std::sync::Arc;

use sluice_base::{Accumulator, Endian, Result};

use crate::order::Order;
use crate::run::{RunReader, RunWriter};

/// Drives one partition's spill pass to completion across however many
/// `advance` calls it takes (§4.2.4 step 2): a bounded external 2-way merge
/// of the partition's previous spilled run (if any) with its freshly sorted
/// in-memory tuples, writing at most `chunk_size` records per call so the
/// caller retains back-pressure control over the whole pass.
pub(crate) struct PartitionSpillJob {
    partition_idx: usize,
    old_run: Option<RunReader>,
    old_run_path: Option<PathBuf>,
    memory: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    writer: RunWriter,
    pending_old: Option<(Vec<u8>, Vec<u8>)>,
    pending_mem: Option<(Vec<u8>, Vec<u8>)>,
    order: Order,
    accumulator: Option<Arc<dyn Accumulator>>,
}

impl PartitionSpillJob {
    pub(crate) fn start(
        partition_idx: usize,
        old_run_path: Option<PathBuf>,
        new_run_path: PathBuf,
        endian: Endian,
        memory: Vec<(Vec<u8>, Vec<u8>)>,
        order: Order,
        accumulator: Option<Arc<dyn Accumulator>>,
    ) -> Result<Self> {
        let old_run = match &old_run_path {
            Some(path) => Some(RunReader::open(path, endian)?),
            None => None,
        };
        Ok(PartitionSpillJob {
            partition_idx,
            old_run,
            old_run_path,
            memory: memory.into_iter(),
            writer: RunWriter::create(new_run_path, endian)?,
            pending_old: None,
            pending_mem: None,
            order,
            accumulator,
        })
    }

    pub(crate) fn partition_idx(&self) -> usize {
        self.partition_idx
    }

    fn pull_old(&mut self) -> Result<()> {
        if self.pending_old.is_none() {
            if let Some(reader) = &mut self.old_run {
                if let Some(tuple) = reader.next_tuple()? {
                    self.pending_old = Some((tuple.key, tuple.value));
                }
            }
        }
        Ok(())
    }

    fn pull_mem(&mut self) {
        if self.pending_mem.is_none() {
            self.pending_mem = self.memory.next();
        }
    }

    /// Writes up to `chunk_size` merged records and returns `true` once both
    /// sources are drained and `finish` can be called.
    pub(crate) fn advance(&mut self, chunk_size: usize) -> Result<bool> {
        for _ in 0..chunk_size {
            self.pull_old()?;
            self.pull_mem();
            match (&self.pending_old, &self.pending_mem) {
                (None, None) => return Ok(true),
                (Some(_), None) => {
                    let (k, v) = self.pending_old.take().unwrap();
                    self.writer.append(&k, &v)?;
                }
                (None, Some(_)) => {
                    let (k, v) = self.pending_mem.take().unwrap();
                    self.writer.append(&k, &v)?;
                }
                (Some((ok, _)), Some((mk, _))) => {
                    let ord = self.order.compare(ok, mk);
                    let combine_now = ord == Ordering::Equal
                        && matches!(&self.accumulator, Some(acc) if acc.is_associative());
                    if combine_now {
                        let (k, ov) = self.pending_old.take().unwrap();
                        let (_, mv) = self.pending_mem.take().unwrap();
                        let mut combined = ov;
                        self.accumulator.as_ref().unwrap().combine(&mut combined, &mv);
                        self.writer.append(&k, &combined)?;
                    } else if ord == Ordering::Greater {
                        let (k, v) = self.pending_mem.take().unwrap();
                        self.writer.append(&k, &v)?;
                    } else {
                        // `Less`, or `Equal` without an associative
                        // accumulator: always drain the old run's side of a
                        // tie first. The in-memory side is already deduped
                        // to at most one record per key (accept() combines
                        // duplicates whenever any accumulator is configured,
                        // associative or not), but the old run can still
                        // hold several not-yet-combined records for the same
                        // key when no accumulator is configured or it is
                        // non-associative, left over from earlier passes.
                        // Draining all of those before ever touching the
                        // single newer in-memory record keeps arrival order
                        // intact for the final cursor-time combine.
                        let (k, v) = self.pending_old.take().unwrap();
                        self.writer.append(&k, &v)?;
                    }
                }
            }
        }
        Ok(false)
    }

    /// Finalizes the new run (atomic rename) and removes the superseded
    /// previous run, if any.
    pub(crate) fn finish(self) -> Result<PathBuf> {
        let new_path = self.writer.finish()?;
        if let Some(old_path) = self.old_run_path {
            if old_path != new_path {
                std::fs::remove_file(&old_path)?;
            }
        }
        Ok(new_path)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::SortOrder;
    use sluice_base::{IntSumAccumulator, Lexicographic};
    use test_log::test;

    fn asc() -> Order {
        Order::new(Arc::new(Lexicographic), SortOrder::Asc)
    }

    fn run_all(job: &mut PartitionSpillJob) {
        while !job.advance(1).unwrap() {}
    }

    #[test]
    fn merges_fresh_run_with_no_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let new_path = dir.path().join("run-0");
        let mut job = PartitionSpillJob::start(
            0,
            None,
            new_path.clone(),
            Endian::Little,
            vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())],
            asc(),
            None,
        )
        .unwrap();
        run_all(&mut job);
        let path = job.finish().unwrap();
        let mut reader = RunReader::open(&path, Endian::Little).unwrap();
        let t1 = reader.next_tuple().unwrap().unwrap();
        assert_eq!(t1.key, b"a");
        let t2 = reader.next_tuple().unwrap().unwrap();
        assert_eq!(t2.key, b"b");
        assert!(reader.next_tuple().unwrap().is_none());
    }

    #[test]
    fn merges_old_run_with_newer_memory_preserving_order() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = dir.path().join("run-0");
        let mut w = RunWriter::create(old_path.clone(), Endian::Little).unwrap();
        w.append(b"a", b"old-a").unwrap();
        w.append(b"c", b"old-c").unwrap();
        w.finish().unwrap();

        let new_path = dir.path().join("run-1");
        let mut job = PartitionSpillJob::start(
            0,
            Some(old_path),
            new_path,
            Endian::Little,
            vec![(b"b".to_vec(), b"new-b".to_vec())],
            asc(),
            None,
        )
        .unwrap();
        run_all(&mut job);
        let path = job.finish().unwrap();
        let mut reader = RunReader::open(&path, Endian::Little).unwrap();
        let keys: Vec<_> = std::iter::from_fn(|| reader.next_tuple().unwrap())
            .map(|t| t.key)
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn associative_accumulator_combines_matching_keys_across_the_merge_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = dir.path().join("run-0");
        let mut w = RunWriter::create(old_path.clone(), Endian::Little).unwrap();
        w.append(b"a", &1i64.to_le_bytes()).unwrap();
        w.finish().unwrap();

        let new_path = dir.path().join("run-1");
        let acc: Arc<dyn Accumulator> = Arc::new(IntSumAccumulator);
        let mut job = PartitionSpillJob::start(
            0,
            Some(old_path),
            new_path,
            Endian::Little,
            vec![(b"a".to_vec(), 2i64.to_le_bytes().to_vec())],
            asc(),
            Some(acc),
        )
        .unwrap();
        run_all(&mut job);
        let path = job.finish().unwrap();
        let mut reader = RunReader::open(&path, Endian::Little).unwrap();
        let t = reader.next_tuple().unwrap().unwrap();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&t.value);
        assert_eq!(i64::from_le_bytes(buf), 3);
        assert!(reader.next_tuple().unwrap().is_none());
    }

    #[test]
    fn non_associative_accumulator_preserves_both_values_in_arrival_order() {
        let dir = tempfile::tempdir().unwrap();
        let old_path = dir.path().join("run-0");
        let mut w = RunWriter::create(old_path.clone(), Endian::Little).unwrap();
        w.append(b"a", b"older").unwrap();
        w.finish().unwrap();

        let new_path = dir.path().join("run-1");
        let acc: Arc<dyn Accumulator> = Arc::new(sluice_base::LastWriteWinsAccumulator);
        let mut job = PartitionSpillJob::start(
            0,
            Some(old_path),
            new_path,
            Endian::Little,
            vec![(b"a".to_vec(), b"newer".to_vec())],
            asc(),
            Some(acc),
        )
        .unwrap();
        run_all(&mut job);
        let path = job.finish().unwrap();
        let mut reader = RunReader::open(&path, Endian::Little).unwrap();
        let t1 = reader.next_tuple().unwrap().unwrap();
        assert_eq!(t1.value, b"older");
        let t2 = reader.next_tuple().unwrap().unwrap();
        assert_eq!(t2.value, b"newer");
        assert!(reader.next_tuple().unwrap().is_none());
    }
}
