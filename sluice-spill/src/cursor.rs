use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use sluice_base::{Accumulator, Result, Tuple};

use crate::config::ChainingRule;
use crate::order::Order;
use crate::run::RunReader;

/// One still-live producer of sorted tuples: either a partition's in-memory
/// sorted sequence (already materialized as owned tuples, since the cursor
/// outlives the borrow a zero-copy view into partition storage would need)
/// or a spilled run being read back lazily.
enum Source {
    Memory(std::vec::IntoIter<Tuple>),
    Run(RunReader),
}

impl Source {
    fn next(&mut self) -> Result<Option<Tuple>> {
        match self {
            Source::Memory(iter) => Ok(iter.next()),
            Source::Run(reader) => reader.next_tuple(),
        }
    }
}

/// One entry in the merge heap: a source's current head tuple, the comparator
/// order it's measured under, and `rank` (lower = older) used to break ties
/// between equal keys deterministically. Within one partition a spilled run
/// is always older than that partition's current in-memory tuples (a spill
/// always folds the prior run plus everything accepted before it into the
/// fresh run), so assigning a strictly lower rank to each partition's run
/// source than to its memory source preserves arrival order transitively
/// across any number of spill passes without needing to serialize arrival
/// sequence numbers into the run file format.
struct HeapEntry {
    key: Vec<u8>,
    tuple: Tuple,
    rank: usize,
    order: Order,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.order.compare(&self.key, &other.key) == Ordering::Equal && self.rank == other.rank
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the smallest key (and, among
        // equal keys, the lowest rank) to compare greatest so `pop` yields it.
        match self.order.compare(&self.key, &other.key) {
            Ordering::Equal => other.rank.cmp(&self.rank),
            ord => ord.reverse(),
        }
    }
}

/// Forward-only iterator over the globally sorted (or `DESC`-negated)
/// stream across every live partition and every spilled run (§4.2.6).
/// Adjacent tuples with equal keys are folded together with the configured
/// accumulator, if any, as they are produced — duplicate keys can only ever
/// originate from a single partition (routing is a pure function of the
/// key), so this is always safe regardless of merge interleaving.
pub struct Cursor {
    rule: ChainingRule,
    sources: Vec<Source>,
    order: Order,
    accumulator: Option<Arc<dyn Accumulator>>,
    heap: BinaryHeap<HeapEntry>,
    primed: bool,
}

impl Cursor {
    pub(crate) fn new(
        sources: Vec<Source>,
        order: Order,
        accumulator: Option<Arc<dyn Accumulator>>,
        rule: ChainingRule,
    ) -> Self {
        Cursor {
            rule,
            sources,
            order,
            accumulator,
            heap: BinaryHeap::new(),
            primed: false,
        }
    }

    fn raw_next(&mut self) -> Result<Option<Tuple>> {
        if self.sources.len() == 1 && matches!(self.rule, ChainingRule::Native) {
            return self.sources[0].next();
        }
        self.heap_next()
    }

    /// Pulls the next tuple from `sources[rank]`, if any, and pushes it onto
    /// the heap. Called once per source at priming time and again each time
    /// a source's current head is consumed, so the heap always holds at most
    /// one live entry per still-open source (bounded fanout).
    fn refill(&mut self, rank: usize) -> Result<()> {
        if let Some(tuple) = self.sources[rank].next()? {
            self.heap.push(HeapEntry {
                key: tuple.key.clone(),
                tuple,
                rank,
                order: self.order.clone(),
            });
        }
        Ok(())
    }

    fn heap_next(&mut self) -> Result<Option<Tuple>> {
        if !self.primed {
            for rank in 0..self.sources.len() {
                self.refill(rank)?;
            }
            self.primed = true;
        }
        let Some(mut min) = self.heap.pop() else {
            return Ok(None);
        };
        self.refill(min.rank)?;
        if self.accumulator.is_some() {
            while let Some(top) = self.heap.peek() {
                if self.order.compare(&top.key, &min.key) != Ordering::Equal {
                    break;
                }
                let next = self.heap.pop().unwrap();
                let acc = self.accumulator.as_ref().unwrap();
                acc.combine(&mut min.tuple.value, &next.tuple.value);
                self.refill(next.rank)?;
            }
        }
        Ok(Some(min.tuple))
    }

    /// Advances the cursor, returning the next tuple in order or `None`
    /// once every source is exhausted.
    pub fn advance(&mut self) -> Result<Option<Tuple>> {
        self.raw_next()
    }
}

impl Iterator for Cursor {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().transpose()
    }
}

pub(crate) fn memory_source(tuples: Vec<Tuple>) -> Source {
    Source::Memory(tuples.into_iter())
}

pub(crate) fn run_source(reader: RunReader) -> Source {
    Source::Run(reader)
}
