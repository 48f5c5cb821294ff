use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::Hash;

use tracing::{debug, trace};

use crate::config::SessionWindowConfig;

/// One key's open windows, stored as three parallel arrays sorted ascending
/// by `start` (and, by the non-overlap invariant, by `end`). Grows by the
/// usual `Vec` doubling; emitting the head windows shifts the remainder down
/// in place via `Vec::drain`, so no per-window allocation survives a key's
/// whole lifetime.
struct WindowList<A> {
    starts: Vec<i64>,
    ends: Vec<i64>,
    accs: Vec<A>,
}

impl<A> WindowList<A> {
    fn new() -> Self {
        WindowList {
            starts: Vec::new(),
            ends: Vec::new(),
            accs: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.starts.len()
    }

    fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    fn insert(&mut self, idx: usize, start: i64, end: i64, acc: A) {
        self.starts.insert(idx, start);
        self.ends.insert(idx, end);
        self.accs.insert(idx, acc);
    }

    fn remove(&mut self, idx: usize) -> (i64, i64, A) {
        (
            self.starts.remove(idx),
            self.ends.remove(idx),
            self.accs.remove(idx),
        )
    }
}

/// One emitted session, produced by a watermark or `complete()`.
#[derive(Debug, Clone)]
pub struct Session<K, R> {
    pub key: K,
    pub start: i64,
    pub end: i64,
    pub result: R,
}

/// Per-key session construction driven by event-time watermarks. See
/// `accept`/`accept_watermark`/`complete` for the public contract.
pub struct SessionWindowOperator<E, K, A, R>
where
    K: Eq + Hash + Clone,
{
    config: SessionWindowConfig<E, K, A, R>,
    windows: HashMap<K, WindowList<A>>,
    deadlines: BTreeMap<i64, HashSet<K>>,
    last_watermark: i64,
}

impl<E, K, A, R> SessionWindowOperator<E, K, A, R>
where
    K: Eq + Hash + Clone,
{
    pub fn new(config: SessionWindowConfig<E, K, A, R>) -> Self {
        SessionWindowOperator {
            config,
            windows: HashMap::new(),
            deadlines: BTreeMap::new(),
            last_watermark: i64::MIN,
        }
    }

    /// Number of keys with at least one open window. Exposed for `P4` (no
    /// leaks after `complete()`) and similar diagnostics.
    pub fn live_key_count(&self) -> usize {
        self.windows.len()
    }

    pub fn live_deadline_count(&self) -> usize {
        self.deadlines.len()
    }

    fn deadline_insert(&mut self, end: i64, key: K) {
        self.deadlines.entry(end).or_default().insert(key);
    }

    fn deadline_remove(&mut self, end: i64, key: &K) {
        if let Some(keys) = self.deadlines.get_mut(&end) {
            keys.remove(key);
            if keys.is_empty() {
                self.deadlines.remove(&end);
            }
        }
    }

    /// Ingests one event. Implements the event-assignment algorithm: walk
    /// candidate windows (those whose `start` does not exceed the event's
    /// influence interval), accumulate into a covering window, extend or
    /// merge a partially-overlapping one, or insert a fresh window if none
    /// apply.
    pub fn accept(&mut self, event: E) {
        let key = (self.config.key_fn)(&event);
        let t = (self.config.timestamp_fn)(&event);
        let event_end = t + self.config.session_timeout();

        let list = self.windows.entry(key.clone()).or_insert_with(WindowList::new);
        let mut j = 0usize;
        loop {
            let idx = list.starts.partition_point(|&s| s <= event_end);
            if j >= idx {
                break;
            }
            let end_j = list.ends[j];
            if end_j < t {
                j += 1;
                continue;
            }
            let start_j = list.starts[j];
            if start_j <= t && end_j >= event_end {
                (self.config.accumulate)(&mut list.accs[j], &event);
                trace!(target: "sluice_window", ?start_j, end_j, "event absorbed by covering window");
                return;
            }

            let new_start = start_j.min(t);
            let new_end = end_j.max(event_end);
            let merges_next = j + 1 < list.len() && list.starts[j + 1] < new_end;
            if merges_next {
                let (_, next_end, next_acc) = list.remove(j + 1);
                self.deadline_remove(end_j, &key);
                list.ends[j] = next_end;
                (self.config.combine)(&mut list.accs[j], next_acc);
                trace!(target: "sluice_window", j, next_end, "merged adjacent window while assigning event");
                continue;
            }

            list.starts[j] = new_start;
            list.ends[j] = new_end;
            self.deadline_remove(end_j, &key);
            self.deadline_insert(new_end, key.clone());
            (self.config.accumulate)(&mut list.accs[j], &event);
            trace!(target: "sluice_window", new_start, new_end, "extended window to cover event");
            return;
        }

        let mut acc = (self.config.new_acc)();
        (self.config.accumulate)(&mut acc, &event);
        list.insert(j, t, event_end, acc);
        self.deadline_insert(event_end, key);
    }

    /// Emits every session whose `end` is strictly less than `watermark`,
    /// removing their deadline entries and, if a key's last window was
    /// emitted, its per-key state. A watermark that does not advance past
    /// any live deadline is a no-op and therefore idempotent.
    pub fn accept_watermark(&mut self, watermark: i64) -> Vec<Session<K, R>> {
        debug_assert!(
            watermark >= self.last_watermark,
            "watermark regressed: {watermark} < {}",
            self.last_watermark
        );
        self.last_watermark = self.last_watermark.max(watermark);

        let due: Vec<i64> = self.deadlines.range(..watermark).map(|(&end, _)| end).collect();
        if due.is_empty() {
            return Vec::new();
        }
        debug!(target: "sluice_window", watermark, count = due.len(), "emitting due deadlines");

        let mut out = Vec::new();
        for end in due {
            let Some(keys) = self.deadlines.remove(&end) else {
                continue;
            };
            for key in keys {
                let Some(list) = self.windows.get_mut(&key) else {
                    continue;
                };
                debug_assert_eq!(list.ends.first().copied(), Some(end));
                let (start, end, acc) = list.remove(0);
                let result = (self.config.finish)(acc);
                out.push(Session {
                    key: key.clone(),
                    start,
                    end,
                    result,
                });
                if list.is_empty() {
                    self.windows.remove(&key);
                }
            }
        }
        out
    }

    /// Equivalent to `accept_watermark(i64::MAX)`: flushes every open
    /// session regardless of its deadline.
    pub fn complete(&mut self) -> Vec<Session<K, R>> {
        self.accept_watermark(i64::MAX)
    }
}
