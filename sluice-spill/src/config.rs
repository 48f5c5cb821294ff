use std::path::PathBuf;
use std::sync::Arc;

use sluice_base::{config_error, Accumulator, Comparator, Endian, Result};

/// Sort direction. `Desc` is implemented by negating the comparator
/// uniformly (§4.2.6); every other code path is unaffected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Cursor merge strategy (§10.6, supplementing the distilled spec). `Native`
/// is a fast path used when the cursor has exactly one live source and so
/// needs no merge at all; `Heap` is the general bounded-fanout min-heap
/// merge used whenever more than one source is live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainingRule {
    Heap,
    Native,
}

/// Constructor configuration for [`crate::SortedAggregator`] (§6). Validated
/// eagerly in `build()`; never by panicking.
pub struct SortedAggregatorConfig {
    pub(crate) partition_count: usize,
    pub(crate) block_size: usize,
    pub(crate) block_count: usize,
    pub(crate) comparator: Arc<dyn Comparator>,
    pub(crate) accumulator: Option<Arc<dyn Accumulator>>,
    pub(crate) spill_dir: PathBuf,
    pub(crate) sort_order: SortOrder,
    pub(crate) spilling_chunk_size: usize,
    pub(crate) endian: Endian,
    pub(crate) chaining_rule: ChainingRule,
}

/// Default block size (128 KiB), matching §4.2.2's example pool geometry.
pub const DEFAULT_BLOCK_SIZE: usize = 128 * 1024;

impl SortedAggregatorConfig {
    pub fn builder() -> SortedAggregatorConfigBuilder {
        SortedAggregatorConfigBuilder::default()
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }
}

pub struct SortedAggregatorConfigBuilder {
    partition_count: Option<usize>,
    block_size: usize,
    block_count: Option<usize>,
    comparator: Option<Arc<dyn Comparator>>,
    accumulator: Option<Arc<dyn Accumulator>>,
    spill_dir: Option<PathBuf>,
    sort_order: SortOrder,
    spilling_chunk_size: usize,
    endian: Endian,
    chaining_rule: ChainingRule,
}

impl Default for SortedAggregatorConfigBuilder {
    fn default() -> Self {
        SortedAggregatorConfigBuilder {
            partition_count: None,
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: None,
            comparator: None,
            accumulator: None,
            spill_dir: None,
            sort_order: SortOrder::Asc,
            spilling_chunk_size: 1024,
            endian: Endian::Little,
            chaining_rule: ChainingRule::Heap,
        }
    }
}

impl SortedAggregatorConfigBuilder {
    pub fn partition_count(mut self, n: usize) -> Self {
        self.partition_count = Some(n);
        self
    }

    pub fn block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    pub fn block_count(mut self, n: usize) -> Self {
        self.block_count = Some(n);
        self
    }

    pub fn comparator(mut self, comparator: impl Comparator) -> Self {
        self.comparator = Some(Arc::new(comparator));
        self
    }

    pub fn accumulator(mut self, accumulator: impl Accumulator) -> Self {
        self.accumulator = Some(Arc::new(accumulator));
        self
    }

    pub fn spill_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.spill_dir = Some(path.into());
        self
    }

    pub fn sort_order(mut self, order: SortOrder) -> Self {
        self.sort_order = order;
        self
    }

    pub fn spilling_chunk_size(mut self, n: usize) -> Self {
        self.spilling_chunk_size = n;
        self
    }

    pub fn use_big_endian(mut self, big: bool) -> Self {
        self.endian = if big { Endian::Big } else { Endian::Little };
        self
    }

    pub fn chaining_rule(mut self, rule: ChainingRule) -> Self {
        self.chaining_rule = rule;
        self
    }

    pub fn build(self) -> Result<SortedAggregatorConfig> {
        let partition_count = self
            .partition_count
            .ok_or_else(|| config_error("partitionCount is required"))?;
        if partition_count == 0 {
            return Err(config_error("partitionCount must be positive"));
        }
        let block_count = self
            .block_count
            .ok_or_else(|| config_error("blockCount is required"))?;
        if block_count == 0 {
            return Err(config_error("blockCount must be positive"));
        }
        if self.block_size == 0 {
            return Err(config_error("blockSize must be positive"));
        }
        if self.spilling_chunk_size == 0 {
            return Err(config_error("spillingChunkSize must be positive"));
        }
        let spill_dir = self
            .spill_dir
            .ok_or_else(|| config_error("spillDir is required"))?;
        let comparator = self
            .comparator
            .ok_or_else(|| config_error("comparator is required"))?;

        Ok(SortedAggregatorConfig {
            partition_count,
            block_size: self.block_size,
            block_count,
            comparator,
            accumulator: self.accumulator,
            spill_dir,
            sort_order: self.sort_order,
            spilling_chunk_size: self.spilling_chunk_size,
            endian: self.endian,
            chaining_rule: self.chaining_rule,
        })
    }
}
