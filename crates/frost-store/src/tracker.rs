//! Per-table recency tracking.
//!
//! Three interchangeable policies with one external contract: `on_insert`,
//! `on_update` (also fired for plain read access), `on_remove`, and the two
//! uneviction re-registrations. Every operation is a no-op when the table has
//! no stub storage or is flagged batch-evicted.
//!
//! The LRU chain is a slot-indexed intrusive list: `next` runs from the cold
//! head (`oldest`) toward the hot tail (`newest`), and the doubly linked
//! flavour additionally maintains `prev` for O(1) removal. The singly linked
//! flavour scans forward from the head to find a predecessor; that is the
//! price of the saved link slot.

use rand::Rng;

use frost_types::{EvictionPolicy, SlotId};

use crate::table::Table;

/// Register a freshly inserted tuple as immediately evictable.
pub(crate) fn on_insert(table: &mut Table, slot: SlotId) {
    if !table.tracks() {
        return;
    }
    let policy = table.options().policy;
    match policy {
        EvictionPolicy::LruSingle | EvictionPolicy::LruDouble => lru_append_tail(table, slot),
        EvictionPolicy::Timestamp => set_ts(table, slot, 0),
        EvictionPolicy::Clock(_) => set_clock(table, slot, 0),
    }
}

/// Refresh a tuple on access.
///
/// LRU performs a true move-to-tail only once per `lru_sample_rate` calls;
/// approximate recency is acceptable and bounds the per-access cost.
pub(crate) fn on_update(table: &mut Table, slot: SlotId) {
    if !table.tracks() {
        return;
    }
    let policy = table.options().policy;
    match policy {
        EvictionPolicy::LruSingle | EvictionPolicy::LruDouble => {
            let rate = table.options().lru_sample_rate;
            if rate > 1 && table.rng.gen_range(0..rate) != 0 {
                return;
            }
            lru_remove(table, slot);
            lru_append_tail(table, slot);
        }
        EvictionPolicy::Timestamp => {
            table.access_counter += 1;
            let ts = table.access_counter;
            set_ts(table, slot, ts);
        }
        EvictionPolicy::Clock(width) => {
            let current = clock_counter(table, slot);
            if current < width.max_count() {
                set_clock(table, slot, current + 1);
            }
        }
    }
}

/// Drop a tuple from the tracker (delete or eviction).
pub(crate) fn on_remove(table: &mut Table, slot: SlotId) {
    if !table.tracks() {
        return;
    }
    let policy = table.options().policy;
    match policy {
        EvictionPolicy::LruSingle | EvictionPolicy::LruDouble => {
            lru_remove(table, slot);
        }
        EvictionPolicy::Timestamp => {}
        EvictionPolicy::Clock(_) => set_clock(table, slot, 0),
    }
}

/// Re-register a merged-back tuple at the cold end: next in line for
/// eviction.
pub(crate) fn on_unevict_cold(table: &mut Table, slot: SlotId) {
    if !table.tracks() {
        return;
    }
    let policy = table.options().policy;
    match policy {
        EvictionPolicy::LruSingle | EvictionPolicy::LruDouble => lru_push_head(table, slot),
        EvictionPolicy::Timestamp => set_ts(table, slot, 0),
        EvictionPolicy::Clock(_) => set_clock(table, slot, 0),
    }
}

/// Re-register the faulting tuple at the hot end.
pub(crate) fn on_unevict_hot(table: &mut Table, slot: SlotId) {
    if !table.tracks() {
        return;
    }
    let policy = table.options().policy;
    match policy {
        EvictionPolicy::LruSingle | EvictionPolicy::LruDouble => lru_append_tail(table, slot),
        EvictionPolicy::Timestamp => {
            table.access_counter += 1;
            let ts = table.access_counter;
            set_ts(table, slot, ts);
        }
        EvictionPolicy::Clock(_) => set_clock(table, slot, 1),
    }
}

// ----------------------------------------------------------------------
// LRU chain maintenance
// ----------------------------------------------------------------------

fn is_double(table: &Table) -> bool {
    table.options().policy == EvictionPolicy::LruDouble
}

fn set_next(table: &mut Table, slot: SlotId, next: Option<SlotId>) {
    if let Some(tuple) = table.slot_mut(slot) {
        tuple.next = next;
    }
}

fn set_prev(table: &mut Table, slot: SlotId, prev: Option<SlotId>) {
    if let Some(tuple) = table.slot_mut(slot) {
        tuple.prev = prev;
    }
}

fn next_of(table: &Table, slot: SlotId) -> Option<SlotId> {
    table.slot(slot).and_then(|t| t.next)
}

fn prev_of(table: &Table, slot: SlotId) -> Option<SlotId> {
    table.slot(slot).and_then(|t| t.prev)
}

fn lru_append_tail(table: &mut Table, slot: SlotId) {
    set_next(table, slot, None);
    set_prev(table, slot, None);
    match table.chain.newest {
        None => {
            table.chain.oldest = Some(slot);
            table.chain.newest = Some(slot);
            table.chain.count = 1;
        }
        Some(newest) => {
            set_next(table, newest, Some(slot));
            if is_double(table) {
                set_prev(table, slot, Some(newest));
            }
            table.chain.newest = Some(slot);
            table.chain.count += 1;
        }
    }
}

fn lru_push_head(table: &mut Table, slot: SlotId) {
    set_next(table, slot, None);
    set_prev(table, slot, None);
    match table.chain.oldest {
        None => {
            table.chain.oldest = Some(slot);
            table.chain.newest = Some(slot);
            table.chain.count = 1;
        }
        Some(oldest) => {
            set_next(table, slot, Some(oldest));
            if is_double(table) {
                set_prev(table, oldest, Some(slot));
            }
            table.chain.oldest = Some(slot);
            table.chain.count += 1;
        }
    }
}

fn lru_remove(table: &mut Table, slot: SlotId) -> bool {
    if table.chain.count == 0 {
        return false;
    }
    let removed = if is_double(table) {
        lru_remove_double(table, slot)
    } else {
        lru_remove_single(table, slot)
    };
    if removed {
        table.chain.count -= 1;
        set_next(table, slot, None);
        set_prev(table, slot, None);
    }
    removed
}

/// Singly linked removal: head special case, then a forward scan that stops
/// at the target or the tail, then a tail fixup.
fn lru_remove_single(table: &mut Table, slot: SlotId) -> bool {
    if table.chain.oldest == Some(slot) {
        if table.chain.count == 1 {
            table.chain.oldest = None;
            table.chain.newest = None;
        } else {
            table.chain.oldest = next_of(table, slot);
        }
        return true;
    }

    let Some(mut prev) = table.chain.oldest else {
        return false;
    };
    let mut cursor = next_of(table, prev);
    while let Some(current) = cursor {
        if current == slot {
            let after = next_of(table, current);
            set_next(table, prev, after);
            if table.chain.newest == Some(current) {
                table.chain.newest = Some(prev);
            }
            return true;
        }
        if table.chain.newest == Some(current) {
            break;
        }
        prev = current;
        cursor = next_of(table, current);
    }
    false
}

/// Doubly linked removal: O(1) via the tuple's own links, with explicit
/// endpoint handling for the singleton and pair chains.
fn lru_remove_double(table: &mut Table, slot: SlotId) -> bool {
    let at_head = table.chain.oldest == Some(slot);
    let at_tail = table.chain.newest == Some(slot);

    if at_head && at_tail {
        table.chain.oldest = None;
        table.chain.newest = None;
        return true;
    }
    if at_tail {
        if table.chain.count == 2 {
            let survivor = table.chain.oldest;
            table.chain.newest = survivor;
            if let Some(s) = survivor {
                set_next(table, s, None);
                set_prev(table, s, None);
            }
        } else {
            let before = prev_of(table, slot);
            table.chain.newest = before;
            if let Some(b) = before {
                set_next(table, b, None);
            }
        }
        return true;
    }
    if at_head {
        if table.chain.count == 2 {
            let survivor = table.chain.newest;
            table.chain.oldest = survivor;
            if let Some(s) = survivor {
                set_next(table, s, None);
                set_prev(table, s, None);
            }
        } else {
            let after = next_of(table, slot);
            table.chain.oldest = after;
            if let Some(a) = after {
                set_prev(table, a, None);
            }
        }
        return true;
    }

    let before = prev_of(table, slot);
    let after = next_of(table, slot);
    if before.is_none() && after.is_none() {
        // not linked at all: stale call
        return false;
    }
    if let Some(b) = before {
        set_next(table, b, after);
    }
    if let Some(a) = after {
        set_prev(table, a, before);
    }
    true
}

// ----------------------------------------------------------------------
// Timestamp / clock helpers
// ----------------------------------------------------------------------

fn set_ts(table: &mut Table, slot: SlotId, ts: u64) {
    if let Some(tuple) = table.slot_mut(slot) {
        tuple.ts = ts;
    }
}

fn clock_counter(table: &Table, slot: SlotId) -> u64 {
    table.clock.as_ref().map_or(0, |c| c.get(slot))
}

fn set_clock(table: &mut Table, slot: SlotId, value: u64) {
    if let Some(clock) = table.clock.as_mut() {
        clock.set(slot, value);
    }
}
