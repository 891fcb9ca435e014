//! heap is our internal interface for allocating objects that can be tracked and, some day, GCed. Currently it does not
//! GC, merely allocates and tracks: every object lives until the Heap itself is dropped.
//!
//! The entry points are the `Heap::copy_string`/`Heap::take_string` methods. They return an `ObjRef`, a plain index
//! into the heap's object arena. `ObjRef` is `Copy`, so values holding one can be passed around freely; accessing the
//! object behind it always goes back through the Heap.
//!
//! ```rust
//!    use blox::vm::Heap;
//!    let mut heap = Heap::new();
//!    let a = heap.copy_string("my string");
//!    let b = heap.take_string(String::from("my string"));
//!    // Strings are interned, so equal contents means equal handles.
//!    assert_eq!(a, b);
//!    assert_eq!(heap.as_string(a).map(|s| s.as_str()), Some("my string"));
//! ```

use std::fmt::{Display, Write};

use super::table::Table;
use super::value::Value;

/// A handle to an object owned by a `Heap`. Two handles are equal exactly when they name the same object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(usize);

impl ObjRef {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// An immutable, interned string with its hash cached.
#[derive(Debug)]
pub struct LoxString {
    chars: Box<str>,
    hash: u32,
}

impl LoxString {
    /// The string's content.
    pub fn as_str(&self) -> &str {
        &self.chars
    }

    /// Length in bytes.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// Whether the string is empty.
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The FNV-1a hash of the content.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    pub(crate) fn has_content(&self, chars: &str, hash: u32) -> bool {
        self.hash == hash && &*self.chars == chars
    }
}

impl Display for LoxString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Byte-for-byte comparison. With interning this agrees with handle identity, but it doesn't rely on it.
impl PartialEq for LoxString {
    fn eq(&self, other: &Self) -> bool {
        self.has_content(other.as_str(), other.hash)
    }
}

/// Everything that can live on the heap.
#[derive(Debug)]
pub enum Object {
    /// See `LoxString`.
    String(LoxString),
}

impl Object {
    /// The string inside, if this object is one.
    pub fn as_string(&self) -> Option<&LoxString> {
        match self {
            Object::String(s) => Some(s),
        }
    }

    /// Each object type's own notion of equality.
    pub fn equals(&self, other: &Object) -> bool {
        match (self, other) {
            (Object::String(a), Object::String(b)) => a == b,
        }
    }
}

impl Display for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Object::String(s) => Display::fmt(s, f),
        }
    }
}

/// FNV-1a, 32 bit.
pub fn hash_string(chars: &str) -> u32 {
    let mut hash: u32 = 2166136261;
    for byte in chars.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[derive(Debug, Default)]
/// A type for allocating, tracking, and eventually GCing heap-allocated Lox objects.
pub struct Heap {
    objects: Vec<Object>,
    // Maps each interned string to nil; only the keys matter.
    strings: Table,
}

impl Heap {
    /// A new, empty heap.
    pub fn new() -> Heap {
        Heap {
            objects: Vec::new(),
            strings: Table::new(),
        }
    }

    /// Intern a string, copying `chars` only if no string with that content exists yet.
    pub fn copy_string(&mut self, chars: &str) -> ObjRef {
        let hash = hash_string(chars);
        match self.find_interned(chars, hash) {
            Some(interned) => interned,
            None => self.allocate_string(chars.into(), hash),
        }
    }

    /// Intern a string, taking ownership of the buffer. If the content is already interned, the buffer is dropped.
    pub fn take_string(&mut self, chars: String) -> ObjRef {
        let hash = hash_string(&chars);
        match self.find_interned(&chars, hash) {
            Some(interned) => interned,
            None => self.allocate_string(chars.into_boxed_str(), hash),
        }
    }

    /// Concatenate two strings into a freshly interned one. None if either isn't a string.
    pub fn concatenate(&mut self, a: ObjRef, b: ObjRef) -> Option<ObjRef> {
        let a = self.as_string(a)?;
        let b = self.as_string(b)?;
        let mut chars = String::with_capacity(a.len() + b.len());
        chars.push_str(a.as_str());
        chars.push_str(b.as_str());
        Some(self.take_string(chars))
    }

    /// Look up an interned string by content without allocating.
    pub fn find_string(&self, chars: &str) -> Option<ObjRef> {
        self.find_interned(chars, hash_string(chars))
    }

    /// The object behind a handle, or None if this heap never handed it out.
    ///
    /// Objects are never freed individually, so a handle from this heap stays valid for the heap's lifetime.
    /// A handle from some other heap can't be told apart when its index happens to be in range here.
    pub fn get(&self, obj: ObjRef) -> Option<&Object> {
        self.objects.get(obj.index())
    }

    /// The string behind a handle, if it's a string.
    pub fn as_string(&self, obj: ObjRef) -> Option<&LoxString> {
        self.get(obj)?.as_string()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether nothing has been allocated yet.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The intern table.
    pub fn strings(&self) -> &Table {
        &self.strings
    }

    /// All the objects on the heap, newest first, one per line, for debugging.
    pub fn dump(&self) -> String {
        let mut ret = String::new();
        for (i, object) in self.objects.iter().enumerate().rev() {
            // writing to a String can't fail
            let _ = writeln!(&mut ret, "{:04} {}", i, object);
        }
        ret
    }

    fn find_interned(&self, chars: &str, hash: u32) -> Option<ObjRef> {
        self.strings.find_string(chars, hash, &self.objects)
    }

    fn allocate_string(&mut self, chars: Box<str>, hash: u32) -> ObjRef {
        let obj = self.allocate(Object::String(LoxString { chars, hash }));
        self.strings.set(obj, Value::Nil);
        log::trace!("interned string {:?}", obj);
        obj
    }

    fn allocate(&mut self, object: Object) -> ObjRef {
        self.objects.push(object);
        ObjRef(self.objects.len() - 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_heap() {
        let mut heap = Heap::new();
        let n1 = heap.copy_string("Goodbye, world");
        let n2 = heap.take_string("Hello, world".into());

        assert_eq!(heap.as_string(n1).unwrap().as_str(), "Goodbye, world");
        assert_eq!(heap.as_string(n2).unwrap().as_str(), "Hello, world");
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.dump(), "0001 Hello, world\n0000 Goodbye, world\n");
    }

    #[test]
    fn test_interning_reuses_objects() {
        let mut heap = Heap::new();
        let a = heap.copy_string("lox");
        let b = heap.copy_string("lox");
        let c = heap.take_string(String::from("lox"));
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.strings().len(), 1);
        assert_ne!(a, heap.copy_string("Lox"));
    }

    #[test]
    fn test_concatenation_is_interned() {
        let mut heap = Heap::new();
        let a = heap.copy_string("a");
        let b = heap.copy_string("b");
        let ab = heap.copy_string("ab");
        assert_eq!(heap.concatenate(a, b), Some(ab));
        assert_eq!(heap.len(), 3);

        let empty = heap.copy_string("");
        assert_eq!(heap.concatenate(a, empty), Some(a));
    }

    #[test]
    fn test_find_string() {
        let mut heap = Heap::new();
        assert_eq!(heap.find_string("x"), None);
        let x = heap.copy_string("x");
        assert_eq!(heap.find_string("x"), Some(x));
        assert_eq!(heap.as_string(x).map(LoxString::hash), Some(hash_string("x")));
        assert!(!heap.is_empty());
    }

    #[test]
    fn test_foreign_handle() {
        let mut other = Heap::new();
        other.copy_string("a");
        let b = other.copy_string("b");

        let mut heap = Heap::new();
        heap.copy_string("only one");
        assert!(heap.get(b).is_none());
        assert!(heap.as_string(b).is_none());
    }

    #[test]
    fn test_fnv1a() {
        assert_eq!(hash_string(""), 2166136261);
        assert_eq!(hash_string("a"), 0xe40c292c);
        assert_eq!(hash_string("foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_string_equality_is_by_content() {
        let a = LoxString {
            chars: "same".into(),
            hash: hash_string("same"),
        };
        let b = LoxString {
            chars: "same".into(),
            hash: hash_string("same"),
        };
        assert_eq!(a, b);
        assert!(Object::String(a).equals(&Object::String(b)));
    }
}
