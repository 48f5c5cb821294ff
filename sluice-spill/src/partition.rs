use std::path::PathBuf;

use sluice_base::{invariant, Accumulator, Block, BlockPool, Endian, Result};

use crate::order::Order;

/// Where a stored tuple's record lives: which block, what byte offset, and
/// (to avoid re-parsing the length header on every read) its key/value
/// lengths. Tuples are never moved once written; only the metadata entry
/// pointing at them is replaced, e.g. when an accumulator combine produces
/// a new record for an already-seen key.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StoredTupleMeta {
    block_idx: u32,
    offset: u32,
    key_len: u32,
    value_len: u32,
    arrival_seq: u64,
}

fn encode_record(key: &[u8], value: &[u8], endian: Endian) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + key.len() + value.len());
    endian.write_u32(&mut out, key.len() as u32);
    out.extend_from_slice(key);
    endian.write_u32(&mut out, value.len() as u32);
    out.extend_from_slice(value);
    out
}

fn decode_record<'a>(blocks: &'a [Block], meta: &StoredTupleMeta) -> (&'a [u8], &'a [u8]) {
    let slice = &blocks[meta.block_idx as usize].as_slice()[meta.offset as usize..];
    let key_start = 4;
    let key_end = key_start + meta.key_len as usize;
    let value_start = key_end + 4;
    let value_end = value_start + meta.value_len as usize;
    (&slice[key_start..key_end], &slice[value_start..value_end])
}

/// Open-addressed, linear-probing index from a tuple's serialized key to
/// its slot in [`Partition::metas`], scoped to one partition's not-yet-spilled
/// tuples (§4.2.3). Rebuilt from scratch every time the partition is spilled,
/// since duplicate detection only applies to tuples still resident in memory.
struct DedupIndex {
    slots: Vec<Option<(Vec<u8>, u32)>>,
    len: usize,
}

impl DedupIndex {
    fn new() -> Self {
        DedupIndex {
            slots: vec![None; 16],
            len: 0,
        }
    }

    fn probe_start(&self, key: &[u8]) -> usize {
        (rapidhash::rapidhash(key) as usize) % self.slots.len()
    }

    fn find(&self, key: &[u8]) -> Option<u32> {
        let cap = self.slots.len();
        let mut i = self.probe_start(key);
        for _ in 0..cap {
            match &self.slots[i] {
                Some((slot_key, idx)) if slot_key.as_slice() == key => return Some(*idx),
                Some(_) => i = (i + 1) % cap,
                None => return None,
            }
        }
        None
    }

    /// Updates the slot for `key` to `tuple_idx` if present; otherwise
    /// inserts a new slot. Returns `true` if this was a fresh key.
    fn upsert(&mut self, key: &[u8], tuple_idx: u32) -> bool {
        if self.len * 10 >= self.slots.len() * 7 {
            self.grow();
        }
        let cap = self.slots.len();
        let mut i = self.probe_start(key);
        loop {
            match &mut self.slots[i] {
                Some((slot_key, idx)) if slot_key.as_slice() == key => {
                    *idx = tuple_idx;
                    return false;
                }
                Some(_) => i = (i + 1) % cap,
                None => {
                    self.slots[i] = Some((key.to_vec(), tuple_idx));
                    self.len += 1;
                    return true;
                }
            }
        }
    }

    fn grow(&mut self) {
        let old = std::mem::replace(&mut self.slots, vec![None; self.slots.len() * 2]);
        self.len = 0;
        for slot in old.into_iter().flatten() {
            let (key, idx) = slot;
            self.upsert(&key, idx);
        }
    }

    fn live_indices(&self) -> Vec<u32> {
        self.slots.iter().flatten().map(|(_, idx)| *idx).collect()
    }
}

pub(crate) enum AcceptOutcome {
    Stored,
    NeedsSpill,
}

/// One hash-bucket's worth of tuples (§4.2.1/§4.2.3): an ordered chain of
/// blocks borrowed from the shared pool, a dedup index over not-yet-spilled
/// keys when an accumulator is configured, and (once `sort` has run) a
/// sorted permutation of the live tuple indices.
pub(crate) struct Partition {
    blocks: Vec<Block>,
    metas: Vec<StoredTupleMeta>,
    dedup: Option<DedupIndex>,
    sorted_order: Option<Vec<u32>>,
    pub(crate) spilled_run_path: Option<PathBuf>,
    pub(crate) next_run_seq: u64,
}

impl Partition {
    pub(crate) fn new(has_accumulator: bool) -> Self {
        Partition {
            blocks: Vec::new(),
            metas: Vec::new(),
            dedup: has_accumulator.then(DedupIndex::new),
            sorted_order: None,
            spilled_run_path: None,
            next_run_seq: 0,
        }
    }

    pub(crate) fn is_memory_empty(&self) -> bool {
        self.live_indices().is_empty()
    }

    fn live_indices(&self) -> Vec<u32> {
        match &self.dedup {
            Some(index) => index.live_indices(),
            None => (0..self.metas.len() as u32).collect(),
        }
    }

    fn try_store_record(
        &mut self,
        pool: &mut BlockPool,
        key: &[u8],
        value: &[u8],
        endian: Endian,
    ) -> Result<Option<StoredTupleMeta>> {
        let record = encode_record(key, value, endian);
        if record.len() > pool.block_size() {
            return Err(invariant(format!(
                "tuple of {} bytes exceeds block size {}",
                record.len(),
                pool.block_size()
            )));
        }
        if let Some(block) = self.blocks.last_mut() {
            if let Some(offset) = block.try_append(&record) {
                let block_idx = (self.blocks.len() - 1) as u32;
                return Ok(Some(StoredTupleMeta {
                    block_idx,
                    offset: offset as u32,
                    key_len: key.len() as u32,
                    value_len: value.len() as u32,
                    arrival_seq: 0,
                }));
            }
        }
        let Some(mut block) = pool.acquire() else {
            return Ok(None);
        };
        let offset = block
            .try_append(&record)
            .expect("record already checked to fit in an empty block");
        self.blocks.push(block);
        let block_idx = (self.blocks.len() - 1) as u32;
        Ok(Some(StoredTupleMeta {
            block_idx,
            offset: offset as u32,
            key_len: key.len() as u32,
            value_len: value.len() as u32,
            arrival_seq: 0,
        }))
    }

    /// Appends one tuple, combining it into an existing same-key record via
    /// `accumulator` when one is configured and the key was already seen
    /// since the last spill of this partition (§4.2.3). `arrival_seq` is a
    /// per-aggregator monotonic counter used to break ties deterministically
    /// among tuples with equal keys (§9, open question).
    pub(crate) fn accept(
        &mut self,
        pool: &mut BlockPool,
        key: &[u8],
        value: &[u8],
        endian: Endian,
        accumulator: Option<&dyn Accumulator>,
        arrival_seq: u64,
    ) -> Result<AcceptOutcome> {
        self.sorted_order = None;

        if let (Some(dedup), Some(acc)) = (&self.dedup, accumulator) {
            if let Some(existing_idx) = dedup.find(key) {
                let existing_meta = self.metas[existing_idx as usize];
                let (_, existing_value) = decode_record(&self.blocks, &existing_meta);
                let mut combined = existing_value.to_vec();
                acc.combine(&mut combined, value);
                let Some(mut meta) = self.try_store_record(pool, key, &combined, endian)? else {
                    return Ok(AcceptOutcome::NeedsSpill);
                };
                meta.arrival_seq = existing_meta.arrival_seq;
                let new_idx = self.metas.len() as u32;
                self.metas.push(meta);
                self.dedup.as_mut().unwrap().upsert(key, new_idx);
                return Ok(AcceptOutcome::Stored);
            }
        }

        let Some(mut meta) = self.try_store_record(pool, key, value, endian)? else {
            return Ok(AcceptOutcome::NeedsSpill);
        };
        meta.arrival_seq = arrival_seq;
        let new_idx = self.metas.len() as u32;
        self.metas.push(meta);
        if let Some(dedup) = &mut self.dedup {
            dedup.upsert(key, new_idx);
        }
        Ok(AcceptOutcome::Stored)
    }

    /// Advances this partition's in-memory sort by one step (the whole sort,
    /// since a single partition's tuple count is bounded by what fits in
    /// memory and a full `sort_by` pass over it is the unit of resumable
    /// work per §4.2.5).
    pub(crate) fn ensure_sorted(&mut self, order: &Order) {
        if self.sorted_order.is_some() {
            return;
        }
        let mut indices = self.live_indices();
        let blocks = &self.blocks;
        let metas = &self.metas;
        indices.sort_by(|&a, &b| {
            let (ka, _) = decode_record(blocks, &metas[a as usize]);
            let (kb, _) = decode_record(blocks, &metas[b as usize]);
            order
                .compare(ka, kb)
                .then_with(|| metas[a as usize].arrival_seq.cmp(&metas[b as usize].arrival_seq))
        });
        self.sorted_order = Some(indices);
    }

    pub(crate) fn is_sorted(&self) -> bool {
        self.sorted_order.is_some()
    }

    /// Yields `(key, value)` in sorted order. Panics if `ensure_sorted` has
    /// not been called; callers (spill and the final pre-cursor sort) always
    /// sort before iterating.
    pub(crate) fn sorted_tuples(&self) -> impl Iterator<Item = (&[u8], &[u8])> + '_ {
        let order = self
            .sorted_order
            .as_ref()
            .expect("partition must be sorted before iteration");
        order
            .iter()
            .map(move |&idx| decode_record(&self.blocks, &self.metas[idx as usize]))
    }

    pub(crate) fn len(&self) -> usize {
        self.live_indices().len()
    }

    /// Releases all blocks back to the pool and clears in-memory state,
    /// as happens after a partition's contents have been fully folded into
    /// a spilled run (§4.2.4 step 3). `spilled_run_path`/`next_run_seq`
    /// survive this call; the caller updates those separately.
    pub(crate) fn release_to_pool(&mut self, pool: &mut BlockPool) {
        for block in self.blocks.drain(..) {
            pool.release(block);
        }
        self.metas.clear();
        self.sorted_order = None;
        if let Some(dedup) = &mut self.dedup {
            *dedup = DedupIndex::new();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::SortOrder;
    use sluice_base::{IntSumAccumulator, Lexicographic};
    use std::sync::Arc;
    use test_log::test;

    fn asc() -> Order {
        Order::new(Arc::new(Lexicographic), SortOrder::Asc)
    }

    #[test]
    fn accept_without_accumulator_keeps_duplicate_keys() {
        let mut pool = BlockPool::new(256, 4).unwrap();
        let mut p = Partition::new(false);
        p.accept(&mut pool, b"a", b"1", Endian::Little, None, 0).ok();
        p.accept(&mut pool, b"a", b"2", Endian::Little, None, 1).ok();
        assert_eq!(p.len(), 2);
    }

    #[test]
    fn accept_with_accumulator_combines_duplicate_keys() {
        let mut pool = BlockPool::new(256, 4).unwrap();
        let mut p = Partition::new(true);
        let acc = IntSumAccumulator;
        p.accept(&mut pool, b"a", &1i64.to_le_bytes(), Endian::Little, Some(&acc), 0)
            .unwrap();
        p.accept(&mut pool, b"a", &2i64.to_le_bytes(), Endian::Little, Some(&acc), 1)
            .unwrap();
        assert_eq!(p.len(), 1);
        p.ensure_sorted(&asc());
        let (_, v) = p.sorted_tuples().next().unwrap();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(v);
        assert_eq!(i64::from_le_bytes(buf), 3);
    }

    #[test]
    fn needs_spill_when_pool_exhausted() {
        let mut pool = BlockPool::new(16, 1).unwrap();
        let mut p = Partition::new(false);
        // First record fits (4+1+4+1 = 10 <= 16).
        assert!(matches!(
            p.accept(&mut pool, b"a", b"1", Endian::Little, None, 0).unwrap(),
            AcceptOutcome::Stored
        ));
        // Second does not fit in the remaining 6 bytes, and the pool has no
        // more blocks to rotate into.
        assert!(matches!(
            p.accept(&mut pool, b"b", b"2", Endian::Little, None, 1).unwrap(),
            AcceptOutcome::NeedsSpill
        ));
    }

    #[test]
    fn ensure_sorted_orders_by_comparator_then_arrival() {
        let mut pool = BlockPool::new(256, 4).unwrap();
        let mut p = Partition::new(false);
        p.accept(&mut pool, b"b", b"1", Endian::Little, None, 0).ok();
        p.accept(&mut pool, b"a", b"2", Endian::Little, None, 1).ok();
        p.ensure_sorted(&asc());
        let keys: Vec<_> = p.sorted_tuples().map(|(k, _)| k.to_vec()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn release_to_pool_resets_dedup_index() {
        let mut pool = BlockPool::new(256, 4).unwrap();
        let mut p = Partition::new(true);
        let acc = IntSumAccumulator;
        p.accept(&mut pool, b"a", &1i64.to_le_bytes(), Endian::Little, Some(&acc), 0)
            .unwrap();
        p.release_to_pool(&mut pool);
        assert_eq!(pool.available(), 4);
        assert!(p.is_memory_empty());
        p.accept(&mut pool, b"a", &5i64.to_le_bytes(), Endian::Little, Some(&acc), 2)
            .unwrap();
        p.ensure_sorted(&asc());
        let (_, v) = p.sorted_tuples().next().unwrap();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(v);
        assert_eq!(i64::from_le_bytes(buf), 5, "dedup state should not carry across a spill");
    }
}
