//! The spill-to-disk sorted aggregator (§4.2): a partitioned off-heap tuple
//! store that accepts tuples until its block pool is exhausted, spills
//! partitions to disk incrementally, and finally yields a globally sorted
//! (optionally accumulating) cursor over everything accepted.

mod config;
mod cursor;
mod ioutil;
mod order;
mod partition;
mod run;
mod spill;

pub use config::{ChainingRule, SortOrder, SortedAggregatorConfig, SortedAggregatorConfigBuilder};
pub use cursor::Cursor;

use std::path::PathBuf;

use tracing::{debug, trace};

use sluice_base::{invariant, partition_of, BlockPool, Result, TupleRef};

use cursor::{memory_source, run_source};
use order::Order;
use partition::{AcceptOutcome, Partition};
use spill::PartitionSpillJob;

/// The aggregator's externally visible phase (§4.2.4, §9: "enforced by the
/// type system where possible"). `Broken` is entered on any I/O failure and
/// rejects everything but `dispose`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Accepting,
    SpillingActive,
    Broken,
}

/// State for a spill pass in progress: which partition is currently being
/// merged (round-robin, §4.2.4) and its in-flight merge job, if started.
struct SpillPass {
    next_partition: usize,
    job: Option<PartitionSpillJob>,
}

/// Partitioned off-heap sorted aggregator. See module docs and §4.2.
pub struct SortedAggregator {
    config: SortedAggregatorConfig,
    pool: BlockPool,
    partitions: Vec<Partition>,
    order: Order,
    phase: Phase,
    spill: Option<SpillPass>,
    sort_cursor: usize,
    sorted: bool,
    arrival_seq: u64,
    disposed: bool,
}

impl SortedAggregator {
    pub fn new(config: SortedAggregatorConfig) -> Result<Self> {
        let pool = BlockPool::new(config.block_size, config.block_count)?;
        std::fs::create_dir_all(&config.spill_dir)?;
        let has_accumulator = config.accumulator.is_some();
        let partitions = (0..config.partition_count)
            .map(|_| Partition::new(has_accumulator))
            .collect();
        let order = Order::new(config.comparator.clone(), config.sort_order);
        Ok(SortedAggregator {
            config,
            pool,
            partitions,
            order,
            phase: Phase::Accepting,
            spill: None,
            sort_cursor: 0,
            sorted: false,
            arrival_seq: 0,
            disposed: false,
        })
    }

    fn require_accepting(&self) -> Result<()> {
        if self.disposed {
            return Err(invariant("method called after dispose()"));
        }
        if self.phase != Phase::Accepting {
            return Err(invariant(format!(
                "accept() called while in phase {:?}, not Accepting",
                self.phase
            )));
        }
        Ok(())
    }

    fn run_path(&self, partition_idx: usize, run_seq: u64) -> PathBuf {
        self.config
            .spill_dir
            .join(format!("partition-{partition_idx}"))
            .join(format!("run-{run_seq}"))
    }

    /// Ingests one tuple. Returns `false` if the block pool has no more
    /// blocks to give the tuple's partition; the caller must drive a full
    /// spill pass (`start_spilling`/`spill_next_chunk`.../`finish_spilling`)
    /// and retry (§4.2, §4.2.3).
    pub fn accept(&mut self, tuple: TupleRef<'_>) -> Result<bool> {
        self.require_accepting()?;
        let idx = partition_of(tuple.key, self.config.partition_count);
        let seq = self.arrival_seq;
        let outcome = self.partitions[idx].accept(
            &mut self.pool,
            tuple.key,
            tuple.value,
            self.config.endian,
            self.config.accumulator.as_deref(),
            seq,
        )?;
        match outcome {
            AcceptOutcome::Stored => {
                self.arrival_seq += 1;
                self.sorted = false;
                Ok(true)
            }
            AcceptOutcome::NeedsSpill => Ok(false),
        }
    }

    /// Begins a spill pass. Must be called from `Accepting`; transitions to
    /// `SpillingActive`, during which only `spill_next_chunk` may be called
    /// (§4.2.4).
    pub fn start_spilling(&mut self) -> Result<()> {
        self.require_accepting()?;
        trace!(target: "sluice", "starting spill pass");
        self.phase = Phase::SpillingActive;
        self.spill = Some(SpillPass {
            next_partition: 0,
            job: None,
        });
        Ok(())
    }

    /// Advances the current spill pass by at most one chunk of merged
    /// records. Returns `true` once every partition has been spilled and
    /// `finish_spilling` can be called.
    pub fn spill_next_chunk(&mut self) -> Result<bool> {
        if self.phase != Phase::SpillingActive {
            return Err(invariant(
                "spill_next_chunk() called outside an active spill pass",
            ));
        }
        let result = self.spill_next_chunk_inner();
        if result.is_err() {
            self.phase = Phase::Broken;
        }
        result
    }

    fn spill_next_chunk_inner(&mut self) -> Result<bool> {
        loop {
            let next_partition = self.spill.as_ref().expect("spill pass must be active").next_partition;
            if next_partition >= self.partitions.len() {
                return Ok(true);
            }
            if self.spill.as_ref().unwrap().job.is_none() {
                let idx = next_partition;
                let (memory, run_seq, old_run_path) = {
                    let partition = &mut self.partitions[idx];
                    if partition.is_memory_empty() {
                        // Nothing new to fold in; the existing run (if any)
                        // is already exactly what a rewrite would produce.
                        self.spill.as_mut().unwrap().next_partition += 1;
                        continue;
                    }
                    partition.ensure_sorted(&self.order);
                    let memory: Vec<(Vec<u8>, Vec<u8>)> = partition
                        .sorted_tuples()
                        .map(|(k, v)| (k.to_vec(), v.to_vec()))
                        .collect();
                    (memory, partition.next_run_seq, partition.spilled_run_path.clone())
                };
                let new_path = self.run_path(idx, run_seq);
                if let Some(parent) = new_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let job = PartitionSpillJob::start(
                    idx,
                    old_run_path,
                    new_path,
                    self.config.endian,
                    memory,
                    self.order.clone(),
                    self.config.accumulator.clone(),
                )?;
                self.spill.as_mut().unwrap().job = Some(job);
            }
            let done = {
                let chunk_size = self.config.spilling_chunk_size;
                let job = self.spill.as_mut().unwrap().job.as_mut().unwrap();
                job.advance(chunk_size)?
            };
            if !done {
                return Ok(false);
            }
            let job = self.spill.as_mut().unwrap().job.take().unwrap();
            let idx = job.partition_idx();
            let new_path = job.finish()?;
            let partition = &mut self.partitions[idx];
            partition.release_to_pool(&mut self.pool);
            partition.spilled_run_path = Some(new_path);
            partition.next_run_seq += 1;
            debug!(target: "sluice", partition = idx, "spilled partition to disk");
            self.spill.as_mut().unwrap().next_partition += 1;
        }
    }

    /// Ends the current spill pass; must only be called once
    /// `spill_next_chunk` has returned `true`. Transitions back to
    /// `Accepting`.
    pub fn finish_spilling(&mut self) -> Result<()> {
        if self.phase != Phase::SpillingActive {
            return Err(invariant(
                "finish_spilling() called outside an active spill pass",
            ));
        }
        let pass = self.spill.as_ref().expect("spill pass must be active");
        if pass.next_partition < self.partitions.len() || pass.job.is_some() {
            return Err(invariant(
                "finish_spilling() called before spill_next_chunk() returned true",
            ));
        }
        self.spill = None;
        self.phase = Phase::Accepting;
        trace!(target: "sluice", "spill pass finished");
        Ok(())
    }

    /// Prepares for sorting. Must be called after the aggregator is done
    /// accepting tuples and before `sort`/`cursor` (§4.2.5).
    pub fn prepare_to_sort(&mut self) -> Result<()> {
        self.require_accepting()?;
        self.sort_cursor = 0;
        self.sorted = false;
        Ok(())
    }

    /// Advances the in-memory sort by one partition. Returns `true` once
    /// every partition is sorted and `cursor()` can be called.
    pub fn sort(&mut self) -> Result<bool> {
        self.require_accepting()?;
        if self.sorted {
            return Ok(true);
        }
        if self.sort_cursor >= self.partitions.len() {
            self.sorted = true;
            return Ok(true);
        }
        self.partitions[self.sort_cursor].ensure_sorted(&self.order);
        self.sort_cursor += 1;
        if self.sort_cursor >= self.partitions.len() {
            self.sorted = true;
            debug!(target: "sluice", "sort complete");
            return Ok(true);
        }
        Ok(false)
    }

    /// Returns a cursor over every tuple accepted so far, in the configured
    /// order (§4.2.6). Every partition must already be sorted (`sort()` has
    /// returned `true`).
    pub fn cursor(&mut self) -> Result<Cursor> {
        if self.disposed {
            return Err(invariant("method called after dispose()"));
        }
        if !self.sorted {
            return Err(invariant("cursor() called before sort() completed"));
        }
        let mut sources = Vec::new();
        for partition in &self.partitions {
            if let Some(path) = &partition.spilled_run_path {
                sources.push(run_source(run::RunReader::open(path, self.config.endian)?));
            }
            if !partition.is_memory_empty() {
                let tuples = partition
                    .sorted_tuples()
                    .map(|(k, v)| sluice_base::Tuple::new(k.to_vec(), v.to_vec()))
                    .collect();
                sources.push(memory_source(tuples));
            }
        }
        Ok(Cursor::new(
            sources,
            self.order.clone(),
            self.config.accumulator.clone(),
            self.config.chaining_rule,
        ))
    }

    /// Releases every block back to the pool and deletes all spilled runs.
    /// Idempotent (§5: "cancellation ... calls dispose(), which must ...
    /// even mid-spill").
    pub fn dispose(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        for partition in &mut self.partitions {
            partition.release_to_pool(&mut self.pool);
            if let Some(path) = partition.spilled_run_path.take() {
                let _ = std::fs::remove_file(path);
            }
        }
        self.spill = None;
        let _ = std::fs::remove_dir_all(&self.config.spill_dir);
        self.disposed = true;
        self.phase = Phase::Accepting;
        Ok(())
    }
}

impl Drop for SortedAggregator {
    fn drop(&mut self) {
        if !self.disposed {
            let _ = self.dispose();
        }
    }
}
