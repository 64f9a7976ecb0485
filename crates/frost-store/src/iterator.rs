//! Coldest-first tuple iteration for eviction.
//!
//! Single-pass and not restartable; the eviction manager constructs a fresh
//! iterator per call. The policy decides the walk:
//!
//! - LRU: follow the chain from the cold head.
//! - Timestamp: candidates pre-sorted ascending by timestamp at
//!   construction, cut off at the caller's byte budget.
//! - Clock: sweep the counter array from the cursor, decrementing non-zero
//!   counters; the first zero counter selects its slot and leaves the cursor
//!   one past it.
//! - Batch-evicted tables have an inert tracker and degrade to a slot-order
//!   sweep.

use frost_types::tuple::encoded_len;
use frost_types::{EvictionPolicy, SlotId};

use crate::table::Table;

enum Mode {
    /// LRU: the next chain slot to yield.
    Chain { next: Option<SlotId> },
    /// Timestamp: precomputed coldest-first candidates.
    Sorted { pending: std::vec::IntoIter<SlotId> },
    /// Clock: stateless here, the cursor lives on the table.
    Clock,
    /// Slot-order sweep for batch-evicted tables.
    Sweep { next_raw: u32 },
}

/// Yields slot ids from coldest to warmest under the table's policy.
pub struct EvictionIterator {
    mode: Mode,
    byte_budget: Option<usize>,
    yielded_bytes: usize,
}

impl EvictionIterator {
    /// Build an iterator for one eviction call.
    ///
    /// `byte_budget` is typically `block_size * num_blocks`; it bounds the
    /// timestamp candidate set and the clock/sweep yields. The LRU chain walk
    /// is bounded by block admission instead.
    #[must_use]
    pub fn new(table: &Table, byte_budget: Option<usize>) -> Self {
        let mode = if table.options().batch_evicted {
            Mode::Sweep { next_raw: 1 }
        } else {
            match table.options().policy {
                EvictionPolicy::LruSingle | EvictionPolicy::LruDouble => Mode::Chain {
                    next: table.chain.oldest,
                },
                EvictionPolicy::Timestamp => Mode::Sorted {
                    pending: timestamp_candidates(table, byte_budget).into_iter(),
                },
                EvictionPolicy::Clock(_) => Mode::Clock,
            }
        };
        // the chain walk is bounded by block admission, not by bytes
        let byte_budget = match mode {
            Mode::Chain { .. } => None,
            _ => byte_budget,
        };
        Self {
            mode,
            byte_budget,
            yielded_bytes: 0,
        }
    }

    /// The next-coldest slot, or `None` when the walk (or the byte budget)
    /// is exhausted.
    pub fn next(&mut self, table: &mut Table) -> Option<SlotId> {
        if let Some(budget) = self.byte_budget {
            if self.yielded_bytes >= budget {
                return None;
            }
        }
        let slot = match &mut self.mode {
            Mode::Chain { next } => {
                let current = (*next)?;
                *next = table.slot(current).and_then(|t| t.next);
                Some(current)
            }
            Mode::Sorted { pending } => pending.next(),
            Mode::Clock => clock_sweep(table),
            Mode::Sweep { next_raw } => {
                let mut found = None;
                while *next_raw <= table.high_water() {
                    let slot = SlotId::new(*next_raw)?;
                    *next_raw += 1;
                    if table.slot(slot).is_some() {
                        found = Some(slot);
                        break;
                    }
                }
                found
            }
        }?;
        if let Some(values) = table.values(slot) {
            self.yielded_bytes = self.yielded_bytes.saturating_add(encoded_len(values));
        }
        Some(slot)
    }
}

/// Live slots sorted ascending by `(ts, slot)`, truncated at the budget.
fn timestamp_candidates(table: &Table, byte_budget: Option<usize>) -> Vec<SlotId> {
    let mut candidates: Vec<(u64, SlotId, usize)> = Vec::new();
    for raw in 1..=table.high_water() {
        let Some(slot) = SlotId::new(raw) else {
            continue;
        };
        if let Some(tuple) = table.slot(slot) {
            candidates.push((tuple.ts, slot, encoded_len(&tuple.values)));
        }
    }
    candidates.sort_by_key(|&(ts, slot, _)| (ts, slot));

    let mut taken = Vec::with_capacity(candidates.len());
    let mut total = 0usize;
    for (_, slot, len) in candidates {
        if let Some(budget) = byte_budget {
            if total >= budget {
                break;
            }
        }
        taken.push(slot);
        total = total.saturating_add(len);
    }
    taken
}

/// One clock-sweep step: decrement every non-zero counter passed, select the
/// first zero counter, and leave the cursor one past the selection.
///
/// Bounded by `high_water * (max_count + 1)` visits so an all-hot or empty
/// table terminates with `None`.
fn clock_sweep(table: &mut Table) -> Option<SlotId> {
    let width = table.clock.as_ref()?.width();
    let high = table.high_water();
    if high == 0 {
        return None;
    }
    let max_visits = u64::from(high) * (width.max_count() + 1) + 1;
    for _ in 0..max_visits {
        let raw = {
            let clock = table.clock.as_ref()?;
            if clock.position == 0 || clock.position > high {
                1
            } else {
                clock.position
            }
        };
        let advanced = if raw >= high { 1 } else { raw + 1 };
        table.clock.as_mut()?.position = advanced;

        let slot = SlotId::new(raw)?;
        if table.slot(slot).is_none() {
            continue;
        }
        let count = table.clock.as_ref()?.get(slot);
        if count == 0 {
            return Some(slot);
        }
        table.clock.as_mut()?.set(slot, count - 1);
    }
    None
}
