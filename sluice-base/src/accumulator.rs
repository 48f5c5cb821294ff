/// Combines two values sharing the same key into one, in place on the first
/// argument. `associative` accumulators permit partial combines during spill
/// merges (order of combination does not matter); non-associative
/// accumulators must defer all combination to the final global cursor pass.
pub trait Accumulator: Send + Sync + 'static {
    fn is_associative(&self) -> bool;
    fn combine(&self, existing: &mut Vec<u8>, incoming: &[u8]);
}

/// Interprets values as little-endian `i64` and sums them. Associative:
/// partial sums can be combined in any order or grouping.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntSumAccumulator;

impl Accumulator for IntSumAccumulator {
    fn is_associative(&self) -> bool {
        true
    }

    fn combine(&self, existing: &mut Vec<u8>, incoming: &[u8]) {
        let a = read_i64(existing);
        let b = read_i64(incoming);
        *existing = (a + b).to_le_bytes().to_vec();
    }
}

/// Keeps the most recently combined value, discarding the previous one.
/// Non-associative in general: "most recent" depends on an external arrival
/// order that spill/merge boundaries do not preserve on their own, so such
/// an accumulator must defer combination to the single global cursor pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWinsAccumulator;

impl Accumulator for LastWriteWinsAccumulator {
    fn is_associative(&self) -> bool {
        false
    }

    fn combine(&self, existing: &mut Vec<u8>, incoming: &[u8]) {
        existing.clear();
        existing.extend_from_slice(incoming);
    }
}

fn read_i64(bytes: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    let n = bytes.len().min(8);
    buf[..n].copy_from_slice(&bytes[..n]);
    i64::from_le_bytes(buf)
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn int_sum_accumulates_associatively() {
        let acc = IntSumAccumulator;
        let mut total = 1i64.to_le_bytes().to_vec();
        acc.combine(&mut total, &2i64.to_le_bytes());
        acc.combine(&mut total, &3i64.to_le_bytes());
        assert_eq!(read_i64(&total), 6);
        assert!(acc.is_associative());
    }

    #[test]
    fn last_write_wins_replaces_and_is_non_associative() {
        let acc = LastWriteWinsAccumulator;
        let mut v = b"first".to_vec();
        acc.combine(&mut v, b"second");
        assert_eq!(v, b"second");
        assert!(!acc.is_associative());
    }
}
