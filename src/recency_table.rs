//! RecencyTable: structural layer with stable handles and an intrusive
//! recency list threaded through the slots.
//!
//! Entries live in a generational `SlotMap`; a `HashTable` indexes slot
//! keys by the stored hash of the entry key. Each entry also carries
//! `newer`/`older` links so that insertion at the front, removal from any
//! position, and popping the oldest entry are all O(1) without touching
//! the hash index more than once.

use core::borrow::Borrow;
use core::hash::{BuildHasher, Hash};
use hashbrown::hash_table::Entry as IndexEntry;
use hashbrown::HashTable;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::RandomState;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    fn new(k: DefaultKey) -> Self {
        Handle(k)
    }
    fn raw_handle(&self) -> DefaultKey {
        self.0
    }

    pub fn key<'a, K, V, S>(&self, table: &'a RecencyTable<K, V, S>) -> Option<&'a K>
    where
        K: Eq + Hash,
        S: BuildHasher,
    {
        table.handle_key(*self)
    }

    pub fn value<'a, K, V, S>(&self, table: &'a RecencyTable<K, V, S>) -> Option<&'a V>
    where
        K: Eq + Hash,
        S: BuildHasher,
    {
        table.handle_value(*self)
    }
}

#[derive(Debug)]
struct Entry<K, V> {
    key: K,
    value: V,
    hash: u64,
    newer: Option<DefaultKey>,
    older: Option<DefaultKey>,
}

/// Returned by [`RecencyTable::push_front`] when the key is already
/// present. Hands the rejected key and value back to the caller untouched.
#[derive(Debug)]
pub struct DuplicateKey<K, V> {
    pub key: K,
    pub value: V,
}

pub struct RecencyTable<K, V, S = RandomState> {
    hasher: S,
    index: HashTable<DefaultKey>,
    slots: SlotMap<DefaultKey, Entry<K, V>>,
    newest: Option<DefaultKey>,
    oldest: Option<DefaultKey>,
}

impl<K, V> RecencyTable<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::with_hasher(Default::default())
    }
}

impl<K, V> Default for RecencyTable<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over entries from most to least recently inserted.
pub struct Iter<'a, K, V> {
    slots: &'a SlotMap<DefaultKey, Entry<K, V>>,
    cursor: Option<DefaultKey>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (Handle, &'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let k = self.cursor?;
        let e = self.slots.get(k)?;
        self.cursor = e.older;
        self.remaining -= 1;
        Some((Handle::new(k), &e.key, &e.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, K, V> ExactSizeIterator for Iter<'a, K, V> {}

impl<K, V, S> RecencyTable<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            index: HashTable::new(),
            slots: SlotMap::with_key(),
            newest: None,
            oldest: None,
        }
    }

    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn find<Q>(&self, q: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let hash = self.make_hash(q);
        self.index
            .find(hash, |&k| {
                self.slots
                    .get(k)
                    .map(|e| e.key.borrow() == q)
                    .unwrap_or(false)
            })
            .map(|&k| Handle::new(k))
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.find(q).is_some()
    }

    /// Insert at the most-recent position. Duplicate keys are rejected and
    /// handed back without modifying the table.
    pub fn push_front(&mut self, key: K, value: V) -> Result<Handle, DuplicateKey<K, V>> {
        let hash = self.make_hash(&key);
        let entry = Entry {
            key,
            value,
            hash,
            newer: None,
            older: self.newest,
        };
        match self.index.entry(
            hash,
            |&kk| {
                self.slots
                    .get(kk)
                    .map(|e| e.key == entry.key)
                    .unwrap_or(false)
            },
            |&kk| self.slots.get(kk).map(|e| e.hash).unwrap_or(0),
        ) {
            IndexEntry::Occupied(_) => Err(DuplicateKey {
                key: entry.key,
                value: entry.value,
            }),
            IndexEntry::Vacant(v) => {
                let k = self.slots.insert(entry);
                let _ = v.insert(k);
                match self.newest {
                    Some(prev) => {
                        if let Some(e) = self.slots.get_mut(prev) {
                            e.newer = Some(k);
                        }
                    }
                    None => self.oldest = Some(k),
                }
                self.newest = Some(k);
                Ok(Handle::new(k))
            }
        }
    }

    /// Unlink and return the entry. The table is fully consistent again
    /// before the pair is returned, so dropping it may call back into
    /// code that inspects the table.
    pub fn remove(&mut self, handle: Handle) -> Option<(K, V)> {
        let k = handle.raw_handle();
        let entry = self.slots.remove(k)?;

        match entry.newer {
            Some(n) => {
                if let Some(e) = self.slots.get_mut(n) {
                    e.older = entry.older;
                }
            }
            None => self.newest = entry.older,
        }
        match entry.older {
            Some(o) => {
                if let Some(e) = self.slots.get_mut(o) {
                    e.newer = entry.newer;
                }
            }
            None => self.oldest = entry.newer,
        }

        match self.index.find_entry(entry.hash, |&kk| kk == k) {
            Ok(occupied) => {
                let _ = occupied.remove();
            }
            Err(_) => debug_assert!(false, "slot present without an index entry"),
        }

        Some((entry.key, entry.value))
    }

    /// Remove and return the least recently inserted entry.
    pub fn pop_oldest(&mut self) -> Option<(K, V)> {
        let oldest = self.oldest?;
        self.remove(Handle::new(oldest))
    }

    pub fn newest(&self) -> Option<Handle> {
        self.newest.map(Handle::new)
    }

    pub fn oldest(&self) -> Option<Handle> {
        self.oldest.map(Handle::new)
    }

    fn handle_key(&self, h: Handle) -> Option<&K> {
        self.slots.get(h.raw_handle()).map(|e| &e.key)
    }

    fn handle_value(&self, h: Handle) -> Option<&V> {
        self.slots.get(h.raw_handle()).map(|e| &e.value)
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: &self.slots,
            cursor: self.newest,
            remaining: self.slots.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[derive(Clone, Default)]
    struct ConstBuildHasher;
    struct ConstHasher;
    impl BuildHasher for ConstBuildHasher {
        type Hasher = ConstHasher;
        fn build_hasher(&self) -> Self::Hasher {
            ConstHasher
        }
    }
    impl core::hash::Hasher for ConstHasher {
        fn write(&mut self, _bytes: &[u8]) {}
        fn finish(&self) -> u64 {
            0
        }
    }

    fn keys_newest_first<V, S: BuildHasher>(t: &RecencyTable<String, V, S>) -> Vec<String> {
        t.iter().map(|(_h, k, _v)| k.clone()).collect()
    }

    /// Duplicate keys are rejected, the rejected pair comes back, and the
    /// table is unchanged.
    #[test]
    fn duplicate_insert_rejected_and_returned() {
        let mut t: RecencyTable<String, i32> = RecencyTable::new();
        let handle = t.push_front("dup".to_string(), 1).unwrap();
        let err = t.push_front("dup".to_string(), 2).unwrap_err();
        assert_eq!(err.key, "dup");
        assert_eq!(err.value, 2);
        assert_eq!(handle.value(&t), Some(&1));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn find_contains_parity() {
        let mut t: RecencyTable<String, i32> = RecencyTable::new();
        for (i, k) in ["a", "b", "c"].iter().enumerate() {
            t.push_front((*k).to_string(), i as i32).unwrap();
        }
        for k in ["a", "b", "c"] {
            assert!(t.find(k).is_some());
            assert!(t.contains_key(k));
        }
        for k in ["x", "y", "z"] {
            assert!(t.find(k).is_none());
            assert!(!t.contains_key(k));
        }
    }

    /// Removing an entry invalidates its handle; a later insert that reuses
    /// the slot does not resolve through the stale handle.
    #[test]
    fn stale_handle_does_not_alias_new_entry() {
        let mut t: RecencyTable<String, i32> = RecencyTable::new();
        let h1 = t.push_front("old".to_string(), 1).unwrap();
        t.remove(h1).unwrap();
        let h2 = t.push_front("new".to_string(), 2).unwrap();
        assert_ne!(h1, h2);
        assert!(h1.value(&t).is_none());
        assert!(t.contains_key("new"));
        assert!(!t.contains_key("old"));
        assert!(t.remove(h1).is_none());
    }

    #[test]
    fn iteration_is_newest_first() {
        let mut t: RecencyTable<String, i32> = RecencyTable::new();
        for (i, k) in ["k1", "k2", "k3"].iter().enumerate() {
            t.push_front((*k).to_string(), i as i32).unwrap();
        }
        assert_eq!(keys_newest_first(&t), vec!["k3", "k2", "k1"]);
        assert_eq!(t.iter().len(), 3);
        assert_eq!(t.newest().and_then(|h| h.key(&t)).map(String::as_str), Some("k3"));
        assert_eq!(t.oldest().and_then(|h| h.key(&t)).map(String::as_str), Some("k1"));
    }

    /// Unlinking from the middle, the front, and the back keeps the recency
    /// list and the end pointers consistent.
    #[test]
    fn remove_relinks_neighbours() {
        let mut t: RecencyTable<String, i32> = RecencyTable::new();
        let ha = t.push_front("a".to_string(), 1).unwrap();
        let hb = t.push_front("b".to_string(), 2).unwrap();
        let hc = t.push_front("c".to_string(), 3).unwrap();
        let hd = t.push_front("d".to_string(), 4).unwrap();

        t.remove(hb).unwrap();
        assert_eq!(keys_newest_first(&t), vec!["d", "c", "a"]);

        t.remove(hd).unwrap();
        assert_eq!(keys_newest_first(&t), vec!["c", "a"]);
        assert_eq!(t.newest(), Some(hc));

        t.remove(ha).unwrap();
        assert_eq!(keys_newest_first(&t), vec!["c"]);
        assert_eq!(t.oldest(), Some(hc));

        t.remove(hc).unwrap();
        assert!(t.is_empty());
        assert_eq!(t.newest(), None);
        assert_eq!(t.oldest(), None);
        assert_eq!(t.iter().count(), 0);
    }

    #[test]
    fn pop_oldest_drains_in_insertion_order() {
        let mut t: RecencyTable<String, i32> = RecencyTable::new();
        for (i, k) in ["x", "y", "z"].iter().enumerate() {
            t.push_front((*k).to_string(), i as i32).unwrap();
        }
        let mut drained = Vec::new();
        while let Some((k, v)) = t.pop_oldest() {
            drained.push((k, v));
        }
        assert_eq!(
            drained,
            vec![("x".to_string(), 0), ("y".to_string(), 1), ("z".to_string(), 2)]
        );
        assert!(t.is_empty());
        assert!(t.pop_oldest().is_none());
    }

    /// Lookups stay correct when every key lands in the same bucket.
    #[test]
    fn collision_handling_with_const_hasher() {
        let mut t: RecencyTable<String, i32, ConstBuildHasher> =
            RecencyTable::with_hasher(ConstBuildHasher);
        t.push_front("a".to_string(), 1).unwrap();
        t.push_front("b".to_string(), 2).unwrap();
        let ha = t.find("a").expect("find a");
        let hb = t.find("b").expect("find b");
        assert_ne!(ha, hb);
        assert_eq!(ha.value(&t), Some(&1));
        assert_eq!(hb.value(&t), Some(&2));

        t.remove(ha).unwrap();
        assert!(t.find("a").is_none());
        assert_eq!(t.find("b"), Some(hb));
    }

    #[test]
    fn remove_then_reinsert_same_key_moves_to_front() {
        let mut t: RecencyTable<String, i32> = RecencyTable::new();
        let h1 = t.push_front("k".to_string(), 1).unwrap();
        t.push_front("other".to_string(), 0).unwrap();

        let (k, v) = t.remove(h1).expect("present for removal");
        assert_eq!((k.as_str(), v), ("k", 1));
        assert!(!t.contains_key("k"));

        let h2 = t.push_front("k".to_string(), 2).expect("reinsert allowed");
        assert_ne!(h1, h2);
        assert_eq!(t.find("k"), Some(h2));
        assert_eq!(h2.value(&t), Some(&2));
        assert_eq!(keys_newest_first(&t), vec!["k", "other"]);
    }

    #[test]
    fn len_and_is_empty_track_live_entries() {
        let mut t: RecencyTable<String, i32> = RecencyTable::new();
        assert!(t.is_empty());
        let h1 = t.push_front("a".to_string(), 1).unwrap();
        assert!(t.push_front("a".to_string(), 2).is_err());
        assert_eq!(t.len(), 1);
        let _ = t.push_front("b".to_string(), 2).unwrap();
        assert_eq!(t.len(), 2);
        t.remove(h1).unwrap();
        assert_eq!(t.len(), 1);
        let keys: BTreeSet<String> = t.iter().map(|(_, k, _)| k.clone()).collect();
        assert_eq!(keys, ["b".to_string()].into_iter().collect());
    }
}
