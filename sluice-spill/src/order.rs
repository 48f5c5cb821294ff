use std::cmp::Ordering;
use std::sync::Arc;

use sluice_base::Comparator;

use crate::config::SortOrder;

/// Binds a configured comparator to a sort direction for one aggregator
/// instance. Held as an `Arc` (cheap to clone) rather than a borrow so it
/// can be threaded through the sort, spill-merge, and long-lived cursor
/// code paths uniformly, negating uniformly for `sortOrder = DESC` per
/// §4.2.6 rather than scattering the check at each comparison site.
#[derive(Clone)]
pub(crate) struct Order {
    comparator: Arc<dyn Comparator>,
    desc: bool,
}

impl Order {
    pub(crate) fn new(comparator: Arc<dyn Comparator>, sort_order: SortOrder) -> Self {
        Order {
            comparator,
            desc: sort_order == SortOrder::Desc,
        }
    }

    pub(crate) fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let ord = self.comparator.compare(a, b);
        if self.desc {
            ord.reverse()
        } else {
            ord
        }
    }
}
