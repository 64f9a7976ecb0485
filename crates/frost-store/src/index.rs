//! Single-column table indexes.
//!
//! Index entries hold [`TupleAddr`]s, never raw pointers, so eviction can
//! retarget an entry from a live slot to a stub (and uneviction back) without
//! touching the key. Keys order by [`Value::key_cmp`], a total order.

use std::collections::BTreeMap;

use frost_types::{TupleAddr, Value};

/// Declaration of one index at table-creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub column: usize,
    pub unique: bool,
}

impl IndexSpec {
    /// A unique index (the first spec of a table is its primary key).
    #[must_use]
    pub fn unique(name: impl Into<String>, column: usize) -> Self {
        Self {
            name: name.into(),
            column,
            unique: true,
        }
    }

    /// A non-unique index, e.g. a foreign-key index on a child table.
    #[must_use]
    pub fn non_unique(name: impl Into<String>, column: usize) -> Self {
        Self {
            name: name.into(),
            column,
            unique: false,
        }
    }
}

#[derive(Debug, Clone)]
struct IndexKey(Value);

impl PartialEq for IndexKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.key_cmp(&other.0) == std::cmp::Ordering::Equal
    }
}

impl Eq for IndexKey {}

impl PartialOrd for IndexKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.key_cmp(&other.0)
    }
}

/// One single-column index over a table.
#[derive(Debug)]
pub struct Index {
    spec: IndexSpec,
    map: BTreeMap<IndexKey, Vec<TupleAddr>>,
}

impl Index {
    #[must_use]
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            map: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    #[inline]
    #[must_use]
    pub const fn column(&self) -> usize {
        self.spec.column
    }

    #[inline]
    #[must_use]
    pub const fn is_unique(&self) -> bool {
        self.spec.unique
    }

    /// Number of distinct keys.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All addresses under `key`, in insertion order.
    #[must_use]
    pub fn get(&self, key: &Value) -> &[TupleAddr] {
        self.map
            .get(&IndexKey(key.clone()))
            .map_or(&[], Vec::as_slice)
    }

    /// True if a unique insert of `key` would collide.
    #[must_use]
    pub fn would_collide(&self, key: &Value) -> bool {
        self.spec.unique && !self.get(key).is_empty()
    }

    pub(crate) fn insert(&mut self, key: Value, addr: TupleAddr) {
        self.map.entry(IndexKey(key)).or_default().push(addr);
    }

    pub(crate) fn remove(&mut self, key: &Value, addr: TupleAddr) {
        let probe = IndexKey(key.clone());
        if let Some(addrs) = self.map.get_mut(&probe) {
            addrs.retain(|a| *a != addr);
            if addrs.is_empty() {
                self.map.remove(&probe);
            }
        }
    }

    /// Replace `old` with `new` under `key`. Returns false when `old` was not
    /// present.
    pub(crate) fn retarget(&mut self, key: &Value, old: TupleAddr, new: TupleAddr) -> bool {
        let probe = IndexKey(key.clone());
        let Some(addrs) = self.map.get_mut(&probe) else {
            return false;
        };
        for addr in addrs.iter_mut() {
            if *addr == old {
                *addr = new;
                return true;
            }
        }
        false
    }
}
