//! Hierarchical timing wheel.
//!
//! Four cascaded levels plus an overflow list for deadlines further out
//! than the top level spans:
//!
//! | level | slots | resolution | span  |
//! |-------|-------|------------|-------|
//! | L0    | 20    | 50ms       | 1s    |
//! | L1    | 60    | 1s         | 1min  |
//! | L2    | 60    | 1min       | 1h    |
//! | L3    | 24    | 1h         | 24h   |
//!
//! Schedule and cancel are O(1): cancellation is lazy, implemented by
//! bumping a per-key generation counter and discarding stale entries at
//! fire time rather than searching the wheel. `advance` is O(slots
//! elapsed), not O(elapsed wall time) — each tick drains exactly one L0
//! slot and cascades down from the next level only when a level wraps.
//!
//! Re-scheduling an already-pending key replaces it: the generation bump
//! invalidates the old entry in place, so "latest deadline wins" falls
//! out of the lazy-cancellation mechanism for free.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::hash::Hash;

const L0_SLOTS: usize = 20;
const L0_RES_MS: u64 = 50;
const L1_SLOTS: usize = 60;
const L1_RES_MS: u64 = 1_000;
const L2_SLOTS: usize = 60;
const L2_RES_MS: u64 = 60_000;
const L3_SLOTS: usize = 24;
const L3_RES_MS: u64 = 3_600_000;

const L0_SPAN_MS: u64 = L0_SLOTS as u64 * L0_RES_MS;
const L1_SPAN_MS: u64 = L1_SLOTS as u64 * L1_RES_MS;
const L2_SPAN_MS: u64 = L2_SLOTS as u64 * L2_RES_MS;
const L3_SPAN_MS: u64 = L3_SLOTS as u64 * L3_RES_MS;

struct Entry<K, V> {
    key: K,
    value: V,
    deadline_ms: u64,
    generation: u64,
}

/// A hierarchical timing wheel keyed by `K`, carrying payload `V`.
///
/// `K` must be hashable and cheap to clone — it is used both as the wheel
/// entry's identity and as the lookup key for cancellation.
pub struct TimingWheel<K, V> {
    now_ms: u64,
    l0: Vec<VecDeque<Entry<K, V>>>,
    l1: Vec<VecDeque<Entry<K, V>>>,
    l2: Vec<VecDeque<Entry<K, V>>>,
    l3: Vec<VecDeque<Entry<K, V>>>,
    overflow: BTreeMap<u64, Vec<Entry<K, V>>>,
    cur_l0: usize,
    cur_l1: usize,
    cur_l2: usize,
    cur_l3: usize,
    generation: HashMap<K, u64>,
}

impl<K, V> TimingWheel<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Build a wheel whose clock starts at `now_ms`.
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms,
            l0: (0..L0_SLOTS).map(|_| VecDeque::new()).collect(),
            l1: (0..L1_SLOTS).map(|_| VecDeque::new()).collect(),
            l2: (0..L2_SLOTS).map(|_| VecDeque::new()).collect(),
            l3: (0..L3_SLOTS).map(|_| VecDeque::new()).collect(),
            overflow: BTreeMap::new(),
            cur_l0: 0,
            cur_l1: 0,
            cur_l2: 0,
            cur_l3: 0,
            generation: HashMap::new(),
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Resolution of a single tick (the smallest unit `advance` can observe).
    pub fn tick_resolution_ms() -> u64 {
        L0_RES_MS
    }

    /// Schedule `key` to fire with `value` at `deadline_ms`. If `key` is
    /// already pending, the previous entry is invalidated: the latest
    /// deadline wins.
    pub fn schedule(&mut self, key: K, value: V, deadline_ms: u64) {
        let gen = self.generation.entry(key.clone()).or_insert(0);
        *gen += 1;
        let generation = *gen;
        self.place(Entry {
            key,
            value,
            deadline_ms: deadline_ms.max(self.now_ms),
            generation,
        });
    }

    /// Cancel a pending entry for `key`, if any. O(1): invalidates the
    /// generation so the stale wheel entry is dropped silently when its
    /// slot is eventually drained.
    pub fn cancel(&mut self, key: &K) -> bool {
        self.generation.remove(key).is_some()
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.generation.contains_key(key)
    }

    fn place(&mut self, entry: Entry<K, V>) {
        let delta = entry.deadline_ms.saturating_sub(self.now_ms);
        if delta < L0_SPAN_MS {
            let ticks = delta / L0_RES_MS;
            let slot = (self.cur_l0 + ticks as usize) % L0_SLOTS;
            self.l0[slot].push_back(entry);
        } else if delta < L1_SPAN_MS {
            let ticks = delta / L1_RES_MS;
            let slot = (self.cur_l1 + ticks as usize) % L1_SLOTS;
            self.l1[slot].push_back(entry);
        } else if delta < L2_SPAN_MS {
            let ticks = delta / L2_RES_MS;
            let slot = (self.cur_l2 + ticks as usize) % L2_SLOTS;
            self.l2[slot].push_back(entry);
        } else if delta < L3_SPAN_MS {
            let ticks = delta / L3_RES_MS;
            let slot = (self.cur_l3 + ticks as usize) % L3_SLOTS;
            self.l3[slot].push_back(entry);
        } else {
            self.overflow.entry(entry.deadline_ms).or_default().push(entry);
        }
    }

    /// Advance the wheel to `new_now_ms`, returning every `(key, value)`
    /// whose deadline has elapsed, in fire order. Stale (cancelled or
    /// superseded) entries are discarded without appearing in the result.
    /// Cost is proportional to the number of L0 slots crossed, plus any
    /// cascades triggered when a higher level wraps.
    pub fn advance(&mut self, new_now_ms: u64) -> Vec<(K, V)> {
        let mut fired = Vec::new();
        while self.now_ms < new_now_ms {
            self.now_ms += L0_RES_MS;
            self.cur_l0 = (self.cur_l0 + 1) % L0_SLOTS;

            for entry in self.l0[self.cur_l0].drain(..) {
                self.collect_if_live(entry, &mut fired);
            }

            if self.cur_l0 == 0 {
                self.cur_l1 = (self.cur_l1 + 1) % L1_SLOTS;
                let cascaded: Vec<_> = self.l1[self.cur_l1].drain(..).collect();
                for entry in cascaded {
                    self.place(entry);
                }

                if self.cur_l1 == 0 {
                    self.cur_l2 = (self.cur_l2 + 1) % L2_SLOTS;
                    let cascaded: Vec<_> = self.l2[self.cur_l2].drain(..).collect();
                    for entry in cascaded {
                        self.place(entry);
                    }

                    if self.cur_l2 == 0 {
                        self.cur_l3 = (self.cur_l3 + 1) % L3_SLOTS;
                        let cascaded: Vec<_> = self.l3[self.cur_l3].drain(..).collect();
                        for entry in cascaded {
                            self.place(entry);
                        }

                        if self.cur_l3 == 0 {
                            let threshold = self.now_ms + L3_SPAN_MS;
                            let ready_keys: Vec<u64> = self
                                .overflow
                                .range(..threshold)
                                .map(|(k, _)| *k)
                                .collect();
                            for k in ready_keys {
                                if let Some(entries) = self.overflow.remove(&k) {
                                    for entry in entries {
                                        self.place(entry);
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        fired
    }

    fn collect_if_live(&mut self, entry: Entry<K, V>, fired: &mut Vec<(K, V)>) {
        match self.generation.get(&entry.key) {
            Some(gen) if *gen == entry.generation => {
                self.generation.remove(&entry.key);
                fired.push((entry.key, entry.value));
            }
            _ => {
                // Superseded by a later schedule() or cancelled; drop silently.
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_at_deadline() {
        let mut w: TimingWheel<&'static str, u32> = TimingWheel::new(0);
        w.schedule("a", 1, 200);
        let fired = w.advance(200);
        assert_eq!(fired, vec![("a", 1)]);
    }

    #[test]
    fn does_not_fire_before_deadline() {
        let mut w: TimingWheel<&'static str, u32> = TimingWheel::new(0);
        w.schedule("a", 1, 500);
        let fired = w.advance(100);
        assert!(fired.is_empty());
        let fired = w.advance(500);
        assert_eq!(fired, vec![("a", 1)]);
    }

    #[test]
    fn cancel_prevents_fire() {
        let mut w: TimingWheel<&'static str, u32> = TimingWheel::new(0);
        w.schedule("a", 1, 200);
        assert!(w.cancel(&"a"));
        let fired = w.advance(300);
        assert!(fired.is_empty());
    }

    #[test]
    fn duplicate_key_latest_deadline_wins() {
        let mut w: TimingWheel<&'static str, u32> = TimingWheel::new(0);
        w.schedule("a", 1, 100);
        w.schedule("a", 2, 5_000);
        let fired = w.advance(1_000);
        assert!(fired.is_empty(), "stale first schedule must not fire");
        let fired = w.advance(5_000);
        assert_eq!(fired, vec![("a", 2)]);
    }

    #[test]
    fn cascades_from_l1_into_l0() {
        let mut w: TimingWheel<&'static str, u32> = TimingWheel::new(0);
        // 1500ms lands in L1 (beyond the 1s L0 span) and must cascade down.
        w.schedule("a", 1, 1_500);
        let fired = w.advance(1_500);
        assert_eq!(fired, vec![("a", 1)]);
    }

    #[test]
    fn cascades_from_l2_and_l3() {
        let mut w: TimingWheel<&'static str, u32> = TimingWheel::new(0);
        // 2 hours out: lands in L3.
        let deadline = 2 * 3_600_000;
        w.schedule("a", 1, deadline);
        let fired = w.advance(deadline);
        assert_eq!(fired, vec![("a", 1)]);
    }

    #[test]
    fn overflow_entries_eventually_fire() {
        let mut w: TimingWheel<&'static str, u32> = TimingWheel::new(0);
        // 48 hours out: beyond the 24h L3 span, must land in overflow.
        let deadline = 48 * 3_600_000;
        w.schedule("a", 1, deadline);
        let fired = w.advance(deadline);
        assert_eq!(fired, vec![("a", 1)]);
    }

    #[test]
    fn multiple_keys_fire_in_deadline_order_within_a_slot() {
        let mut w: TimingWheel<&'static str, u32> = TimingWheel::new(0);
        w.schedule("a", 1, 100);
        w.schedule("b", 2, 100);
        let fired = w.advance(100);
        assert_eq!(fired.len(), 2);
    }

    #[test]
    fn is_pending_reflects_schedule_and_cancel() {
        let mut w: TimingWheel<&'static str, u32> = TimingWheel::new(0);
        assert!(!w.is_pending(&"a"));
        w.schedule("a", 1, 1_000);
        assert!(w.is_pending(&"a"));
        w.cancel(&"a");
        assert!(!w.is_pending(&"a"));
    }
}
