//! Top-level facade over the two operators in this workspace. This crate
//! has no substantial logic of its own: it re-exports `sluice-window` and
//! `sluice-spill`, plus a tiny cooperative scheduler that demonstrates how a
//! real host pipeline would drive them (items and watermarks delivered
//! one at a time, "needs retry" signals handled by looping, not callbacks).

pub use sluice_base::{
    self as base, Accumulator, Block, BlockPool, Comparator, Endian, Error, ErrorKind,
    IntSumAccumulator, LastWriteWinsAccumulator, Lexicographic, LengthPrefixedString, Result,
    Reversed, Tuple, TupleRef,
};
pub use sluice_spill::{
    ChainingRule, Cursor, SortOrder, SortedAggregator, SortedAggregatorConfig,
    SortedAggregatorConfigBuilder,
};
pub use sluice_window::{Session, SessionWindowConfig, SessionWindowConfigBuilder, SessionWindowOperator};

/// Drains a sorted aggregator to completion on a single thread: spills
/// whenever `accept` signals the pool is full, then sorts and returns the
/// merged cursor. Mirrors the cooperative "call until done" loop a real
/// pipeline scheduler runs around the step-wise `…NextChunk()` API (§5).
pub fn drain_sorted_aggregator(
    agg: &mut SortedAggregator,
    tuples: impl IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
) -> Result<Cursor> {
    for (key, value) in tuples {
        while !agg.accept(TupleRef::new(&key, &value))? {
            agg.start_spilling()?;
            while !agg.spill_next_chunk()? {}
            agg.finish_spilling()?;
        }
    }
    agg.prepare_to_sort()?;
    while !agg.sort()? {}
    agg.cursor()
}
