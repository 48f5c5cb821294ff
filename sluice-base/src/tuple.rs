/// A borrowed view of a tuple's key and value bytes, as handed to `accept`.
/// The store never interprets these beyond delegating to a [`crate::Comparator`]
/// and optional [`crate::Accumulator`].
#[derive(Debug, Clone, Copy)]
pub struct TupleRef<'a> {
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl<'a> TupleRef<'a> {
    pub fn new(key: &'a [u8], value: &'a [u8]) -> Self {
        TupleRef { key, value }
    }
}

/// An owned tuple, as produced by a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuple {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Tuple {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Tuple { key, value }
    }

    pub fn as_ref(&self) -> TupleRef<'_> {
        TupleRef::new(&self.key, &self.value)
    }
}

/// Routes a key to a partition index, as specified: `hash(keyBytes) mod
/// partitionCount`. Uses `rapidhash`, a fast non-cryptographic hash, rather
/// than the stdlib `SipHash`-based `DefaultHasher`, since this is called once
/// per accepted tuple and is not an adversarial-input boundary.
pub fn partition_of(key: &[u8], partition_count: usize) -> usize {
    debug_assert!(partition_count > 0);
    (rapidhash::rapidhash(key) % (partition_count as u64)) as usize
}

#[cfg(test)]
mod test {
    use super::*;
    use test_log::test;

    #[test]
    fn partition_of_is_deterministic_and_in_range() {
        let a = partition_of(b"hello", 7);
        let b = partition_of(b"hello", 7);
        assert_eq!(a, b);
        assert!(a < 7);
    }

    #[test]
    fn partition_of_spreads_distinct_keys() {
        let partitions: std::collections::BTreeSet<usize> =
            (0..1000).map(|i| partition_of(format!("key-{i}").as_bytes(), 16)).collect();
        // Not a strict uniformity test, just a smoke check that we don't
        // collapse every key onto one partition.
        assert!(partitions.len() > 1);
    }
}
