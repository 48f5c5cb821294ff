use std::cmp::Ordering;

/// Totally orders two byte slices representing keys. Implementations must be
/// deterministic and consistent: `cmp(a, b) < 0 <=> cmp(b, a) > 0`.
pub trait Comparator: Send + Sync + 'static {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Plain bytewise lexicographic order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lexicographic;

impl Comparator for Lexicographic {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Keys are a little-endian `u32` length prefix followed by that many bytes of
/// string content (and possibly trailing bytes that are not part of the
/// comparison, e.g. a secondary sort column). Comparing the raw byte slices
/// directly would be wrong: two keys of different lengths have different
/// prefix bytes that do not sort the same way the string content would.
#[derive(Debug, Clone, Copy, Default)]
pub struct LengthPrefixedString;

impl LengthPrefixedString {
    fn content(key: &[u8]) -> &[u8] {
        if key.len() < 4 {
            return &[];
        }
        let len = u32::from_le_bytes([key[0], key[1], key[2], key[3]]) as usize;
        let end = (4 + len).min(key.len());
        &key[4..end]
    }
}

impl Comparator for LengthPrefixedString {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        Self::content(a).cmp(Self::content(b))
    }
}

/// Negates any comparator uniformly, implementing `sortOrder = DESC` without
/// changing any other logic in the sort/merge/cursor paths.
pub struct Reversed<C: Comparator>(pub C);

impl<C: Comparator> Comparator for Reversed<C> {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.0.compare(a, b).reverse()
    }
}
