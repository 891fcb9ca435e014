use std::collections::HashMap;

use super::heap::{ObjRef, Object};
use super::value::Value;

/// A map from interned strings to values.
///
/// Keys are always interned, so lookups hash and compare the handle rather than the string content.
/// The one exception is `find_string`, which is how the heap decides whether some content is interned already.
#[derive(Debug, Default, Clone)]
pub struct Table {
    entries: HashMap<ObjRef, Value>,
}

impl Table {
    /// An empty table.
    pub fn new() -> Self {
        Table {
            entries: HashMap::new(),
        }
    }

    /// The value stored under `key`, if any.
    pub fn get(&self, key: ObjRef) -> Option<Value> {
        self.entries.get(&key).copied()
    }

    /// Store `value` under `key`, returning true if the key wasn't present before.
    pub fn set(&mut self, key: ObjRef, value: Value) -> bool {
        self.entries.insert(key, value).is_none()
    }

    /// Remove `key`, returning true if it was present.
    pub fn delete(&mut self, key: ObjRef) -> bool {
        self.entries.remove(&key).is_some()
    }

    /// Copy every entry of `from` into this table, overwriting keys they share.
    pub fn add_all(&mut self, from: &Table) {
        self.entries
            .extend(from.entries.iter().map(|(k, v)| (*k, *v)));
    }

    /// Find a key whose string content is `chars`.
    // Linear in the number of keys.
    pub fn find_string(&self, chars: &str, hash: u32, objects: &[Object]) -> Option<ObjRef> {
        self.entries.keys().copied().find(|key| {
            objects
                .get(key.index())
                .and_then(Object::as_string)
                .map_or(false, |s| s.has_content(chars, hash))
        })
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vm::Heap;

    #[test]
    fn test_set_get_delete() {
        let mut heap = Heap::new();
        let a = heap.copy_string("a");
        let b = heap.copy_string("b");

        let mut table = Table::new();
        assert!(table.set(a, Value::Number(1.0)));
        assert!(!table.set(a, Value::Number(2.0)));
        assert!(matches!(table.get(a), Some(Value::Number(n)) if n == 2.0));
        assert!(table.get(b).is_none());

        assert!(!table.delete(b));
        assert!(table.delete(a));
        assert!(table.get(a).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_add_all() {
        let mut heap = Heap::new();
        let a = heap.copy_string("a");
        let b = heap.copy_string("b");

        let mut from = Table::new();
        from.set(a, Value::Boolean(true));
        from.set(b, Value::Nil);
        let mut to = Table::new();
        to.set(a, Value::Boolean(false));
        to.add_all(&from);

        assert_eq!(to.len(), 2);
        assert!(matches!(to.get(a), Some(Value::Boolean(true))));
        assert!(matches!(to.get(b), Some(Value::Nil)));
    }
}
