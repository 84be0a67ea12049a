pub(crate) mod entry;

use ahash::AHashMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::{Rng, RngCore};

use entry::ManagedEntry;

// ---------------------------------------------------------------------------
// EntryMap
// ---------------------------------------------------------------------------

/// Handle → entry map.
///
/// Not synchronized on its own: the register keeps it behind its single
/// mutex, so every multi-step mutation below happens in one critical
/// section.
#[derive(Default)]
pub(crate) struct EntryMap {
    map: AHashMap<String, ManagedEntry>,
}

impl EntryMap {
    pub(crate) fn new() -> Self {
        EntryMap {
            map: AHashMap::with_capacity(16),
        }
    }

    /// Generates a handle that is not in the map right now.
    ///
    /// The handle is the standard base64 form of 9, 12, … 24 random bytes,
    /// so it is 12 to 32 characters long and never padded.
    pub(crate) fn generate_handle(&self) -> String {
        let mut rng = rand::thread_rng();
        let mut bytes = vec![0u8; 3 * rng.gen_range(3..=8)];
        loop {
            rng.fill_bytes(&mut bytes);
            let handle = STANDARD.encode(&bytes);
            if !self.map.contains_key(&handle) {
                return handle;
            }
        }
    }

    #[inline]
    pub(crate) fn contains(&self, handle: &str) -> bool {
        self.map.contains_key(handle)
    }

    #[inline]
    pub(crate) fn get(&self, handle: &str) -> Option<&ManagedEntry> {
        self.map.get(handle)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, handle: &str) -> Option<&mut ManagedEntry> {
        self.map.get_mut(handle)
    }

    /// Inserts a new entry.  The caller has already checked that the handle
    /// is free.
    pub(crate) fn insert(&mut self, handle: String, entry: ManagedEntry) {
        let previous = self.map.insert(handle, entry);
        debug_assert!(previous.is_none(), "handle collision on insert");
    }

    pub(crate) fn remove(&mut self, handle: &str) -> Option<ManagedEntry> {
        self.map.remove(handle)
    }

    /// Removes every entry matching `pred` and returns them so the caller
    /// can dispose them and notify listeners.
    pub(crate) fn extract_if<F>(&mut self, mut pred: F) -> Vec<(String, ManagedEntry)>
    where
        F: FnMut(&str, &ManagedEntry) -> bool,
    {
        let keys: Vec<String> = self
            .map
            .iter()
            .filter(|&(k, e)| pred(k.as_str(), e))
            .map(|(k, _)| k.clone())
            .collect();
        keys.into_iter()
            .filter_map(|k| self.map.remove(&k).map(|e| (k, e)))
            .collect()
    }

    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &ManagedEntry)> {
        self.map.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.map.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::Managed;
    use crate::policy::PolicySet;
    use std::sync::Arc;

    fn entry(tag: Option<&str>) -> ManagedEntry {
        ManagedEntry::new(
            Arc::new(Managed::new(())),
            tag.map(str::to_string),
            PolicySet::Manual,
            0,
        )
    }

    #[test]
    fn generated_handles_are_base64_of_expected_length() {
        let map = EntryMap::new();
        for _ in 0..200 {
            let h = map.generate_handle();
            assert!((12..=32).contains(&h.len()), "unexpected length {}", h.len());
            assert_eq!(h.len() % 4, 0);
            assert!(!h.ends_with('='), "no padding expected: {h}");
            assert!(STANDARD.decode(&h).is_ok());
        }
    }

    #[test]
    fn generated_handle_avoids_existing_keys() {
        let mut map = EntryMap::new();
        for _ in 0..500 {
            let h = map.generate_handle();
            assert!(!map.contains(&h));
            map.insert(h, entry(None));
        }
        assert_eq!(map.len(), 500);
    }

    #[test]
    fn extract_if_removes_only_matching() {
        let mut map = EntryMap::new();
        map.insert("a".into(), entry(Some("x")));
        map.insert("b".into(), entry(Some("y")));
        map.insert("c".into(), entry(None));

        let mut taken: Vec<String> = map
            .extract_if(|_, e| e.has_tag("x"))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        taken.sort();
        assert_eq!(taken, vec!["a".to_string()]);
        assert_eq!(map.len(), 2);
        assert!(map.contains("b") && map.contains("c"));
    }
}
