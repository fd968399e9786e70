use super::value::{ObjString, Value};
use std::rc::Rc;

// count/capacity threshold before growth; counting tombstones keeps probe
// chains bounded
const MAX_LOAD_NUM: usize = 3;
const MAX_LOAD_DEN: usize = 4;

struct Entry {
    key: Option<Rc<ObjString>>,
    value: Value,
}

impl Entry {
    fn empty() -> Self {
        Self {
            key: None,
            value: Value::Nil,
        }
    }

    // a vacated slot; lookups walk through it, inserts may reuse it
    fn is_tombstone(&self) -> bool {
        self.key.is_none() && !matches!(self.value, Value::Nil)
    }
}

/// Open-addressed hash table with linear probing. Keys are canonical
/// (interned) strings, so key comparison is pointer identity and the cached
/// FNV-1a hash is never recomputed.
pub struct Table {
    count: usize,
    entries: Vec<Entry>,
}

impl Table {
    pub fn new() -> Self {
        Self {
            count: 0,
            entries: Vec::new(),
        }
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn find_entry(entries: &[Entry], key: &Rc<ObjString>) -> usize {
        let capacity = entries.len();
        let mut index = key.hash() as usize % capacity;
        let mut tombstone = None;

        loop {
            let entry = &entries[index];
            match &entry.key {
                None => {
                    if entry.is_tombstone() {
                        tombstone.get_or_insert(index);
                    } else {
                        return tombstone.unwrap_or(index);
                    }
                }
                Some(found) if Rc::ptr_eq(found, key) => return index,
                Some(_) => {}
            }
            index = (index + 1) % capacity;
        }
    }

    fn adjust_capacity(&mut self, capacity: usize) {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, Entry::empty);

        // tombstones are dropped on rehash, so the live count is rebuilt
        self.count = 0;
        for entry in self.entries.drain(..) {
            if let Some(key) = entry.key {
                let dest = Self::find_entry(&entries, &key);
                entries[dest].key = Some(key);
                entries[dest].value = entry.value;
                self.count += 1;
            }
        }
        self.entries = entries;
    }

    pub fn get(&self, key: &Rc<ObjString>) -> Option<&Value> {
        if self.count == 0 {
            return None;
        }
        let entry = &self.entries[Self::find_entry(&self.entries, key)];
        entry.key.as_ref().map(|_| &entry.value)
    }

    /// Inserts or overwrites. Returns whether the key was new.
    pub fn set(&mut self, key: Rc<ObjString>, value: Value) -> bool {
        if (self.count + 1) * MAX_LOAD_DEN > self.capacity() * MAX_LOAD_NUM {
            let capacity = if self.capacity() < 8 {
                8
            } else {
                self.capacity() * 2
            };
            self.adjust_capacity(capacity);
        }

        let index = Self::find_entry(&self.entries, &key);
        let entry = &mut self.entries[index];
        let is_new = entry.key.is_none();
        if is_new && !entry.is_tombstone() {
            self.count += 1;
        }
        entry.key = Some(key);
        entry.value = value;
        is_new
    }

    /// Returns whether the key existed. The slot becomes a tombstone so
    /// probe chains running through it stay intact.
    pub fn delete(&mut self, key: &Rc<ObjString>) -> bool {
        if self.count == 0 {
            return false;
        }
        let index = Self::find_entry(&self.entries, key);
        let entry = &mut self.entries[index];
        if entry.key.is_none() {
            return false;
        }
        entry.key = None;
        entry.value = Value::Bool(true);
        true
    }

    pub fn add_all(&self, to: &mut Table) {
        for entry in &self.entries {
            if let Some(key) = &entry.key {
                to.set(Rc::clone(key), entry.value.clone());
            }
        }
    }

    /// Content lookup for the interner: the one probe that compares bytes,
    /// cheap checks (length, hash) first.
    pub fn find_string(&self, chars: &str, hash: u32) -> Option<Rc<ObjString>> {
        if self.count == 0 {
            return None;
        }
        let mut index = hash as usize % self.capacity();
        loop {
            let entry = &self.entries[index];
            match &entry.key {
                None => {
                    if !entry.is_tombstone() {
                        return None;
                    }
                }
                Some(key)
                    if key.len() == chars.len()
                        && key.hash() == hash
                        && key.as_str() == chars =>
                {
                    return Some(Rc::clone(key));
                }
                Some(_) => {}
            }
            index = (index + 1) % self.capacity();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::hash_str;

    fn key(chars: &str) -> Rc<ObjString> {
        Rc::new(ObjString::new(chars.to_string(), hash_str(chars)))
    }

    #[test]
    fn set_get_overwrite() {
        let mut table = Table::new();
        let a = key("a");
        assert!(table.set(Rc::clone(&a), Value::Number(1.0)));
        assert_eq!(table.get(&a), Some(&Value::Number(1.0)));
        assert!(!table.set(Rc::clone(&a), Value::Number(2.0)));
        assert_eq!(table.get(&a), Some(&Value::Number(2.0)));
    }

    #[test]
    fn keys_are_identity_not_content() {
        let mut table = Table::new();
        let a = key("a");
        table.set(Rc::clone(&a), Value::Nil);
        assert!(table.get(&key("a")).is_none());
        assert!(table.get(&a).is_some());
    }

    #[test]
    fn delete_then_reinsert() {
        let mut table = Table::new();
        let a = key("a");
        assert!(!table.delete(&a));
        table.set(Rc::clone(&a), Value::Bool(true));
        assert!(table.delete(&a));
        assert!(table.get(&a).is_none());
        assert!(table.set(Rc::clone(&a), Value::Bool(false)));
        assert_eq!(table.get(&a), Some(&Value::Bool(false)));
    }

    #[test]
    fn survives_growth() {
        let mut table = Table::new();
        let keys: Vec<_> = (0..64).map(|i| key(&format!("key{}", i))).collect();
        for (i, k) in keys.iter().enumerate() {
            table.set(Rc::clone(k), Value::Number(i as f64));
        }
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(table.get(k), Some(&Value::Number(i as f64)));
        }
    }

    #[test]
    fn probe_chains_cross_tombstones() {
        let mut table = Table::new();
        let keys: Vec<_> = (0..16).map(|i| key(&format!("k{}", i))).collect();
        for k in &keys {
            table.set(Rc::clone(k), Value::Nil);
        }
        // delete half, the rest must stay reachable through the tombstones
        for k in keys.iter().step_by(2) {
            assert!(table.delete(k));
        }
        for k in keys.iter().skip(1).step_by(2) {
            assert!(table.get(k).is_some());
        }
    }

    #[test]
    fn add_all_copies_live_entries() {
        let mut from = Table::new();
        let mut to = Table::new();
        let a = key("a");
        let b = key("b");
        from.set(Rc::clone(&a), Value::Number(1.0));
        from.set(Rc::clone(&b), Value::Number(2.0));
        from.delete(&b);
        from.add_all(&mut to);
        assert_eq!(to.get(&a), Some(&Value::Number(1.0)));
        assert!(to.get(&b).is_none());
    }

    #[test]
    fn find_string_matches_content() {
        let mut table = Table::new();
        let a = key("shared");
        table.set(Rc::clone(&a), Value::Nil);
        let found = table.find_string("shared", hash_str("shared")).unwrap();
        assert!(Rc::ptr_eq(&found, &a));
        assert!(table.find_string("other", hash_str("other")).is_none());
    }
}
