//! Array constructor, Array.prototype methods and the array iterator.

use super::{arg, require_object};
use crate::error::{Error, JsResult};
use crate::runtime::object::{ArrayIteratorState, JsObject, ObjectKind, ObjectRef};
use crate::runtime::property::{PropertyDescriptor, PropertyKey};
use crate::runtime::realm::Realm;
use crate::runtime::value::{SymbolId, Value};

/// Installs `Array`, `Array.prototype` methods and `%ArrayIteratorPrototype%`.
pub fn install(realm: &mut Realm) {
    let prototype = realm.intrinsics.array_prototype;
    let constructor = realm.new_native_constructor("Array", 1, prototype, array_constructor);
    let global = realm.global_object();
    realm.define_builtin(global, "Array", Value::Object(constructor));
    realm.define_builtin_function(constructor, "isArray", 1, array_is_array);

    realm.define_builtin_function(prototype, "push", 1, array_proto_push);
    realm.define_builtin_function(prototype, "join", 1, array_proto_join);
    realm.define_builtin_function(prototype, "toString", 0, array_proto_to_string);
    let values = realm.define_builtin_function(prototype, "values", 0, array_proto_values);
    realm.heap.get_mut(prototype).insert(
        PropertyKey::Symbol(SymbolId::ITERATOR),
        PropertyDescriptor::hidden(Value::Object(values)),
    );

    let iterator_prototype = realm.intrinsics.array_iterator_prototype;
    realm.define_builtin_function(iterator_prototype, "next", 0, array_iterator_next);
    let identity = realm.new_native_function("[Symbol.iterator]", 0, |_, this, _, _| Ok(this.clone()));
    realm.heap.get_mut(iterator_prototype).insert(
        PropertyKey::Symbol(SymbolId::ITERATOR),
        PropertyDescriptor::hidden(Value::Object(identity)),
    );
}

// ============================================================================
// Array Constructor
// ============================================================================

/// `Array(...)` / `new Array(...)`
pub fn array_constructor(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    if let [Value::Number(length)] = args {
        let valid = *length >= 0.0 && length.fract() == 0.0 && *length <= u32::MAX as f64;
        if !valid {
            return Err(Error::RangeError("Invalid array length".to_string()));
        }
        let array = realm.new_array(Vec::new());
        realm.set(array, "length".into(), Value::Number(*length), &Value::Object(array))?;
        return Ok(Value::Object(array));
    }
    Ok(Value::Object(realm.new_array(args.to_vec())))
}

/// IsArray, looking through proxies.
pub fn is_array(realm: &Realm, value: &Value) -> JsResult<bool> {
    let Some(mut object) = value.as_object() else {
        return Ok(false);
    };
    loop {
        match &realm.heap.get(object).kind {
            ObjectKind::Array => return Ok(true),
            ObjectKind::Proxy(proxy) => match proxy.target() {
                Some(target) => object = target,
                None => {
                    return Err(Error::type_error(
                        "Cannot perform 'IsArray' on a proxy that has been revoked",
                    ));
                }
            },
            _ => return Ok(false),
        }
    }
}

/// `Array.isArray(value)`
pub fn array_is_array(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    Ok(Value::Boolean(is_array(realm, &arg(args, 0))?))
}

// ============================================================================
// Array.prototype
// ============================================================================

/// `Array.prototype.push(...items)`
pub fn array_proto_push(realm: &mut Realm, this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let object = require_object(this, "Array.prototype.push")?;
    let mut length = realm.length_of_array_like(object)?;
    for value in args {
        realm.put_value(this, PropertyKey::from(length), value.clone(), true)?;
        length += 1;
    }
    realm.put_value(this, "length".into(), Value::Number(length as f64), true)?;
    Ok(Value::Number(length as f64))
}

/// `Array.prototype.join(separator)`
pub fn array_proto_join(realm: &mut Realm, this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let object = require_object(this, "Array.prototype.join")?;
    let separator = match arg(args, 0) {
        Value::Undefined => ",".to_string(),
        other => realm.to_string(&other)?,
    };
    let length = realm.length_of_array_like(object)?;
    let mut parts = Vec::with_capacity(length as usize);
    for index in 0..length {
        let element = realm.get(object, &PropertyKey::from(index), this)?;
        parts.push(if element.is_nullish() {
            String::new()
        } else {
            realm.to_string(&element)?
        });
    }
    Ok(Value::String(parts.join(&separator)))
}

/// `Array.prototype.toString()`
pub fn array_proto_to_string(realm: &mut Realm, this: &Value, _args: &[Value], _is_new: bool) -> JsResult<Value> {
    array_proto_join(realm, this, &[], false)
}

/// `Array.prototype.values()` and `Array.prototype[Symbol.iterator]()`
pub fn array_proto_values(realm: &mut Realm, this: &Value, _args: &[Value], _is_new: bool) -> JsResult<Value> {
    require_object(this, "Array.prototype.values")?;
    Ok(Value::Object(create_array_iterator(realm, this.clone())))
}

/// CreateArrayIterator over any array-like.
pub fn create_array_iterator(realm: &mut Realm, iterated: Value) -> ObjectRef {
    let prototype = realm.intrinsics.array_iterator_prototype;
    realm.heap.alloc(JsObject::new(
        ObjectKind::ArrayIterator(ArrayIteratorState {
            iterated: Some(iterated),
            next_index: 0,
        }),
        Some(prototype),
    ))
}

// ============================================================================
// %ArrayIteratorPrototype%
// ============================================================================

/// `%ArrayIteratorPrototype%.next()`
pub fn array_iterator_next(realm: &mut Realm, this: &Value, _args: &[Value], _is_new: bool) -> JsResult<Value> {
    let state = match this.as_object().map(|obj| (obj, &realm.heap.get(obj).kind)) {
        Some((iterator, ObjectKind::ArrayIterator(state))) => Some((iterator, state.clone())),
        _ => None,
    };
    let Some((iterator, state)) = state else {
        return Err(Error::type_error("next method called on incompatible receiver"));
    };

    let next = match &state.iterated {
        Some(Value::Object(iterated)) => {
            let length = realm.length_of_array_like(*iterated)?;
            if state.next_index < length {
                let receiver = Value::Object(*iterated);
                Some(realm.get(*iterated, &PropertyKey::from(state.next_index), &receiver)?)
            } else {
                None
            }
        }
        _ => None,
    };

    if let ObjectKind::ArrayIterator(state) = &mut realm.heap.get_mut(iterator).kind {
        if next.is_some() {
            state.next_index += 1;
        } else {
            state.iterated = None;
        }
    }
    let done = next.is_none();
    Ok(create_iter_result(realm, next.unwrap_or_default(), done))
}

/// CreateIterResultObject
pub fn create_iter_result(realm: &mut Realm, value: Value, done: bool) -> Value {
    let result = realm.new_object();
    let object = realm.heap.get_mut(result);
    object.insert("value".into(), PropertyDescriptor::data(value));
    object.insert("done".into(), PropertyDescriptor::data(Value::Boolean(done)));
    Value::Object(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterator_walks_then_stays_done() {
        let mut realm = Realm::new();
        let array = Value::Object(realm.new_array(vec![Value::Number(10.0), Value::Number(20.0)]));
        let iterator = array_proto_values(&mut realm, &array, &[], false).unwrap();

        let mut seen = Vec::new();
        loop {
            let result = array_iterator_next(&mut realm, &iterator, &[], false).unwrap();
            if realm.get_value(&result, &"done".into()).unwrap().to_boolean() {
                break;
            }
            seen.push(realm.get_value(&result, &"value".into()).unwrap());
        }
        assert_eq!(seen, vec![Value::Number(10.0), Value::Number(20.0)]);

        // Growing the array after exhaustion does not revive the iterator.
        array_proto_push(&mut realm, &array, &[Value::Number(30.0)], false).unwrap();
        let result = array_iterator_next(&mut realm, &iterator, &[], false).unwrap();
        assert!(realm.get_value(&result, &"done".into()).unwrap().to_boolean());
    }

    #[test]
    fn test_constructor_length_argument() {
        let mut realm = Realm::new();
        let array = array_constructor(&mut realm, &Value::Undefined, &[Value::Number(3.0)], true).unwrap();
        assert_eq!(realm.get_value(&array, &"length".into()).unwrap(), Value::Number(3.0));
        assert_eq!(realm.get_value(&array, &"0".into()).unwrap(), Value::Undefined);

        let err = array_constructor(&mut realm, &Value::Undefined, &[Value::Number(-1.0)], true).unwrap_err();
        assert!(matches!(err, Error::RangeError(_)));
    }

    #[test]
    fn test_push_and_join() {
        let mut realm = Realm::new();
        let array = Value::Object(realm.new_array(vec![Value::Number(1.0)]));
        let length = array_proto_push(&mut realm, &array, &[Value::Null, Value::from("x")], false).unwrap();
        assert_eq!(length, Value::Number(3.0));
        let joined = array_proto_join(&mut realm, &array, &[Value::from("-")], false).unwrap();
        assert_eq!(joined, Value::from("1--x"));
    }

    #[test]
    fn test_is_array_sees_through_proxies() {
        let mut realm = Realm::new();
        let array = realm.new_array(vec![]);
        let handler = realm.new_object();
        let proxy = realm.new_proxy(array, handler);
        assert!(is_array(&realm, &Value::Object(proxy)).unwrap());
        assert!(!is_array(&realm, &Value::Object(handler)).unwrap());
    }
}
