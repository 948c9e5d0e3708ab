//! Property keys and descriptors.

use std::fmt;

use super::object::ObjectRef;
use super::value::{SymbolId, Value, number_to_string};

/// A property key: a string or a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    /// String-keyed property (array indices included)
    String(String),
    /// Symbol-keyed property
    Symbol(SymbolId),
}

impl PropertyKey {
    /// Returns the key as a string slice, if it is a string key.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyKey::String(s) => Some(s),
            PropertyKey::Symbol(_) => None,
        }
    }

    /// Converts the key back into a script value.
    pub fn to_value(&self) -> Value {
        match self {
            PropertyKey::String(s) => Value::String(s.clone()),
            PropertyKey::Symbol(sym) => Value::Symbol(*sym),
        }
    }

    /// Parses the key as an array index.
    pub fn as_array_index(&self) -> Option<u32> {
        let s = self.as_str()?;
        if s.len() > 1 && s.starts_with('0') {
            return None;
        }
        s.parse::<u32>().ok().filter(|i| *i != u32::MAX)
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::String(s)
    }
}

impl From<u32> for PropertyKey {
    fn from(index: u32) -> Self {
        PropertyKey::String(number_to_string(index as f64))
    }
}

impl From<SymbolId> for PropertyKey {
    fn from(sym: SymbolId) -> Self {
        PropertyKey::Symbol(sym)
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Symbol(sym) => write!(f, "Symbol({})", sym.0),
        }
    }
}

/// A complete property descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyDescriptor {
    /// A data property
    Data {
        /// The stored value
        value: Value,
        /// Whether assignment may change the value
        writable: bool,
        /// Whether the property shows up in enumeration
        enumerable: bool,
        /// Whether the property may be deleted or redefined
        configurable: bool,
    },
    /// An accessor property
    Accessor {
        /// Getter function, if any
        get: Option<ObjectRef>,
        /// Setter function, if any
        set: Option<ObjectRef>,
        /// Whether the property shows up in enumeration
        enumerable: bool,
        /// Whether the property may be deleted or redefined
        configurable: bool,
    },
}

impl PropertyDescriptor {
    /// A writable, enumerable, configurable data property.
    pub fn data(value: Value) -> Self {
        PropertyDescriptor::Data {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }

    /// A writable, configurable, non-enumerable data property (builtins, methods).
    pub fn hidden(value: Value) -> Self {
        PropertyDescriptor::Data {
            value,
            writable: true,
            enumerable: false,
            configurable: true,
        }
    }

    /// A data property with explicit attributes.
    pub fn data_with(value: Value, writable: bool, enumerable: bool, configurable: bool) -> Self {
        PropertyDescriptor::Data {
            value,
            writable,
            enumerable,
            configurable,
        }
    }

    /// Whether the property may be deleted or redefined.
    pub fn is_configurable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { configurable, .. }
            | PropertyDescriptor::Accessor { configurable, .. } => *configurable,
        }
    }

    /// Whether the property shows up in enumeration.
    pub fn is_enumerable(&self) -> bool {
        match self {
            PropertyDescriptor::Data { enumerable, .. }
            | PropertyDescriptor::Accessor { enumerable, .. } => *enumerable,
        }
    }

    /// Returns true for data descriptors.
    pub fn is_data(&self) -> bool {
        matches!(self, PropertyDescriptor::Data { .. })
    }

    /// The stored value of a data descriptor.
    pub fn value(&self) -> Option<&Value> {
        match self {
            PropertyDescriptor::Data { value, .. } => Some(value),
            PropertyDescriptor::Accessor { .. } => None,
        }
    }

    /// Returns true for a non-configurable, non-writable data property.
    pub fn is_frozen_data(&self) -> bool {
        matches!(
            self,
            PropertyDescriptor::Data {
                writable: false,
                configurable: false,
                ..
            }
        )
    }

    /// IsCompatiblePropertyDescriptor: may `desc` be applied over `current`
    /// on an object whose extensibility is `extensible`?
    pub fn is_compatible(extensible: bool, desc: &PropertyDescriptor, current: Option<&PropertyDescriptor>) -> bool {
        let Some(current) = current else {
            return extensible;
        };
        if current.is_configurable() {
            return true;
        }
        if desc.is_configurable() || desc.is_enumerable() != current.is_enumerable() {
            return false;
        }
        match (current, desc) {
            (
                PropertyDescriptor::Data {
                    value: current_value,
                    writable: current_writable,
                    ..
                },
                PropertyDescriptor::Data { value, writable, .. },
            ) => *current_writable || (!*writable && current_value.same_value(value)),
            (
                PropertyDescriptor::Accessor {
                    get: current_get,
                    set: current_set,
                    ..
                },
                PropertyDescriptor::Accessor { get, set, .. },
            ) => current_get == get && current_set == set,
            _ => false,
        }
    }
}

/// A descriptor as written by script code, where any field may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialDescriptor {
    /// `value`
    pub value: Option<Value>,
    /// `writable`
    pub writable: Option<bool>,
    /// `get`; `Some(None)` is an explicit `undefined`
    pub get: Option<Option<ObjectRef>>,
    /// `set`; `Some(None)` is an explicit `undefined`
    pub set: Option<Option<ObjectRef>>,
    /// `enumerable`
    pub enumerable: Option<bool>,
    /// `configurable`
    pub configurable: Option<bool>,
}

impl PartialDescriptor {
    /// Returns true if `get` or `set` is present.
    pub fn is_accessor(&self) -> bool {
        self.get.is_some() || self.set.is_some()
    }

    /// Fills absent fields from `current`, or with the defaults for a new property.
    pub fn complete(self, current: Option<&PropertyDescriptor>) -> PropertyDescriptor {
        let enumerable = self
            .enumerable
            .unwrap_or_else(|| current.is_some_and(|c| c.is_enumerable()));
        let configurable = self
            .configurable
            .unwrap_or_else(|| current.is_some_and(|c| c.is_configurable()));

        if self.is_accessor() {
            let (current_get, current_set) = match current {
                Some(PropertyDescriptor::Accessor { get, set, .. }) => (*get, *set),
                _ => (None, None),
            };
            return PropertyDescriptor::Accessor {
                get: self.get.unwrap_or(current_get),
                set: self.set.unwrap_or(current_set),
                enumerable,
                configurable,
            };
        }

        let (current_value, current_writable) = match current {
            Some(PropertyDescriptor::Data { value, writable, .. }) => (value.clone(), *writable),
            _ => (Value::Undefined, false),
        };
        PropertyDescriptor::Data {
            value: self.value.unwrap_or(current_value),
            writable: self.writable.unwrap_or(current_writable),
            enumerable,
            configurable,
        }
    }
}

impl From<PropertyDescriptor> for PartialDescriptor {
    fn from(desc: PropertyDescriptor) -> Self {
        match desc {
            PropertyDescriptor::Data {
                value,
                writable,
                enumerable,
                configurable,
            } => PartialDescriptor {
                value: Some(value),
                writable: Some(writable),
                enumerable: Some(enumerable),
                configurable: Some(configurable),
                ..Default::default()
            },
            PropertyDescriptor::Accessor {
                get,
                set,
                enumerable,
                configurable,
            } => PartialDescriptor {
                get: Some(get),
                set: Some(set),
                enumerable: Some(enumerable),
                configurable: Some(configurable),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_index_keys() {
        assert_eq!(PropertyKey::from("3").as_array_index(), Some(3));
        assert_eq!(PropertyKey::from("03").as_array_index(), None);
        assert_eq!(PropertyKey::from("x").as_array_index(), None);
        assert_eq!(PropertyKey::from(7u32), PropertyKey::from("7"));
    }

    #[test]
    fn test_non_configurable_compatibility() {
        let frozen = PropertyDescriptor::data_with(Value::Number(1.0), false, true, false);
        let same = frozen.clone();
        let changed = PropertyDescriptor::data_with(Value::Number(2.0), false, true, false);
        assert!(PropertyDescriptor::is_compatible(true, &same, Some(&frozen)));
        assert!(!PropertyDescriptor::is_compatible(true, &changed, Some(&frozen)));
        assert!(!PropertyDescriptor::is_compatible(false, &same, None));
    }

    #[test]
    fn test_partial_completion() {
        let partial = PartialDescriptor {
            value: Some(Value::Number(5.0)),
            ..Default::default()
        };
        assert_eq!(
            partial.complete(None),
            PropertyDescriptor::data_with(Value::Number(5.0), false, false, false)
        );

        let existing = PropertyDescriptor::data(Value::Number(1.0));
        let partial = PartialDescriptor {
            value: Some(Value::Number(2.0)),
            ..Default::default()
        };
        assert_eq!(
            partial.complete(Some(&existing)),
            PropertyDescriptor::data(Value::Number(2.0))
        );
    }
}
