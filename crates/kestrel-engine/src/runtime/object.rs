//! JavaScript object representation.
//!
//! Objects live in a [`Heap`] arena and are addressed by [`ObjectRef`]
//! handles, so cycles (prototype chains, proxies targeting themselves,
//! revoker back-references) need no shared ownership.

use rustc_hash::FxHashMap;

use super::function::{FunctionObject, RevocableFunctionObject};
use super::property::{PropertyDescriptor, PropertyKey};
use super::proxy::ProxyObject;
use super::value::Value;

/// A handle to an object in the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectRef(u32);

impl ObjectRef {
    /// The arena slot this handle points at.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// What an object is, beyond its ordinary property storage.
#[derive(Debug)]
pub enum ObjectKind {
    /// Plain object
    Ordinary,
    /// Array exotic object (`length` is kept in sync by the array helpers)
    Array,
    /// An arguments object
    Arguments,
    /// An error instance
    Error,
    /// Callable function
    Function(FunctionObject),
    /// The revoke function handed out by `Proxy.revocable`
    RevocableFunction(RevocableFunctionObject),
    /// Proxy exotic object
    Proxy(ProxyObject),
    /// Iterator over an array-like
    ArrayIterator(ArrayIteratorState),
}

/// Progress of an array iterator.
#[derive(Debug, Clone)]
pub struct ArrayIteratorState {
    /// The iterated object; `None` once exhausted
    pub iterated: Option<Value>,
    /// Next index to produce
    pub next_index: u32,
}

/// A JavaScript object.
#[derive(Debug)]
pub struct JsObject {
    /// The prototype of this object
    pub prototype: Option<ObjectRef>,
    /// Whether new properties may be added
    pub extensible: bool,
    /// Exotic behavior, if any
    pub kind: ObjectKind,
    properties: FxHashMap<PropertyKey, PropertyDescriptor>,
    order: Vec<PropertyKey>,
}

impl JsObject {
    /// Creates an empty, extensible object.
    pub fn new(kind: ObjectKind, prototype: Option<ObjectRef>) -> Self {
        Self {
            prototype,
            extensible: true,
            kind,
            properties: FxHashMap::default(),
            order: Vec::new(),
        }
    }

    /// Gets an own property descriptor.
    pub fn get_own(&self, key: &PropertyKey) -> Option<&PropertyDescriptor> {
        self.properties.get(key)
    }

    /// Inserts or replaces an own property, preserving insertion order.
    pub fn insert(&mut self, key: PropertyKey, desc: PropertyDescriptor) {
        if self.properties.insert(key.clone(), desc).is_none() {
            self.order.push(key);
        }
    }

    /// Removes an own property.
    pub fn remove(&mut self, key: &PropertyKey) -> Option<PropertyDescriptor> {
        let removed = self.properties.remove(key);
        if removed.is_some() {
            self.order.retain(|k| k != key);
        }
        removed
    }

    /// Own property keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.order.iter()
    }

    /// Returns true if the object is a proxy.
    pub fn is_proxy(&self) -> bool {
        matches!(self.kind, ObjectKind::Proxy(_))
    }

    /// Returns true if the object can be called.
    pub fn is_callable(&self) -> bool {
        matches!(
            self.kind,
            ObjectKind::Function(_) | ObjectKind::RevocableFunction(_)
        )
    }
}

/// Arena of every object created in a realm.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<JsObject>,
}

impl Heap {
    /// Creates an empty heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves an object into the heap and returns its handle.
    pub fn alloc(&mut self, object: JsObject) -> ObjectRef {
        let index = self.objects.len();
        self.objects.push(object);
        ObjectRef(index as u32)
    }

    /// Borrows an object.
    pub fn get(&self, obj: ObjectRef) -> &JsObject {
        &self.objects[obj.index()]
    }

    /// Mutably borrows an object.
    pub fn get_mut(&mut self, obj: ObjectRef) -> &mut JsObject {
        &mut self.objects[obj.index()]
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Returns true if nothing has been allocated.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_survives_overwrite_and_delete() {
        let mut obj = JsObject::new(ObjectKind::Ordinary, None);
        obj.insert("b".into(), PropertyDescriptor::data(Value::Number(1.0)));
        obj.insert("a".into(), PropertyDescriptor::data(Value::Number(2.0)));
        obj.insert("b".into(), PropertyDescriptor::data(Value::Number(3.0)));
        obj.insert("c".into(), PropertyDescriptor::data(Value::Null));
        obj.remove(&"a".into());

        let keys: Vec<String> = obj.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["b", "c"]);
        assert_eq!(
            obj.get_own(&"b".into()).and_then(|d| d.value().cloned()),
            Some(Value::Number(3.0))
        );
    }

    #[test]
    fn test_heap_handles() {
        let mut heap = Heap::new();
        let a = heap.alloc(JsObject::new(ObjectKind::Ordinary, None));
        let b = heap.alloc(JsObject::new(ObjectKind::Array, Some(a)));
        assert_ne!(a, b);
        assert_eq!(heap.get(b).prototype, Some(a));
        heap.get_mut(a).extensible = false;
        assert!(!heap.get(a).extensible);
        assert_eq!(heap.len(), 2);
    }
}
