//! Object constructor and Object.prototype methods.

use super::{arg, require_object};
use crate::error::{Error, JsResult};
use crate::runtime::object::{ObjectKind, ObjectRef};
use crate::runtime::property::{PropertyDescriptor, PropertyKey};
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

/// Installs `Object`, its static methods and `Object.prototype`.
pub fn install(realm: &mut Realm) {
    let prototype = realm.intrinsics.object_prototype;
    let constructor = realm.new_native_constructor("Object", 1, prototype, object_constructor);
    let global = realm.global_object();
    realm.define_builtin(global, "Object", Value::Object(constructor));

    realm.define_builtin_function(constructor, "create", 2, object_create);
    realm.define_builtin_function(constructor, "defineProperty", 3, object_define_property);
    realm.define_builtin_function(constructor, "getPrototypeOf", 1, object_get_prototype_of);
    realm.define_builtin_function(constructor, "setPrototypeOf", 2, object_set_prototype_of);
    realm.define_builtin_function(
        constructor,
        "getOwnPropertyDescriptor",
        2,
        object_get_own_property_descriptor,
    );
    realm.define_builtin_function(constructor, "isExtensible", 1, object_is_extensible);
    realm.define_builtin_function(constructor, "preventExtensions", 1, object_prevent_extensions);
    realm.define_builtin_function(constructor, "keys", 1, object_keys);

    realm.define_builtin_function(prototype, "hasOwnProperty", 1, object_proto_has_own_property);
    realm.define_builtin_function(prototype, "toString", 0, object_proto_to_string);

    let getter = realm.new_native_function("get __proto__", 0, object_proto_get_proto);
    let setter = realm.new_native_function("set __proto__", 1, object_proto_set_proto);
    realm.heap.get_mut(prototype).insert(
        "__proto__".into(),
        PropertyDescriptor::Accessor {
            get: Some(getter),
            set: Some(setter),
            enumerable: false,
            configurable: true,
        },
    );
}

// ============================================================================
// Object Constructor
// ============================================================================

/// `Object(value)`: a fresh object for nullish input, the value itself otherwise.
pub fn object_constructor(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    match arg(args, 0) {
        Value::Undefined | Value::Null => Ok(Value::Object(realm.new_object())),
        value => Ok(value),
    }
}

fn prototype_argument(value: &Value) -> JsResult<Option<ObjectRef>> {
    match value {
        Value::Object(obj) => Ok(Some(*obj)),
        Value::Null => Ok(None),
        other => Err(Error::type_error(format!(
            "Object prototype may only be an Object or null: {other}"
        ))),
    }
}

/// `Object.create(prototype, properties)`
pub fn object_create(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let prototype = prototype_argument(&arg(args, 0))?;
    let object = realm.new_object_with_prototype(prototype);
    let properties = arg(args, 1);
    if !properties.is_undefined() {
        define_properties(realm, object, &properties)?;
    }
    Ok(Value::Object(object))
}

/// ObjectDefineProperties: every own enumerable property of `properties`
/// describes one property of `object`.
fn define_properties(realm: &mut Realm, object: ObjectRef, properties: &Value) -> JsResult<()> {
    let source = require_object(properties, "Object.defineProperties")?;
    let mut descriptors = Vec::new();
    for key in realm.own_property_keys(source)? {
        if !realm
            .get_own_property(source, &key)?
            .is_some_and(|desc| desc.is_enumerable())
        {
            continue;
        }
        let value = realm.get(source, &key, properties)?;
        descriptors.push((key, realm.to_property_descriptor(&value)?));
    }
    for (key, desc) in descriptors {
        if !realm.define_own_property(object, key.clone(), desc)? {
            return Err(Error::type_error(format!("Cannot redefine property: {key}")));
        }
    }
    Ok(())
}

/// `Object.defineProperty(object, key, descriptor)`
pub fn object_define_property(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let target = arg(args, 0);
    let Value::Object(object) = target else {
        return Err(Error::type_error("Object.defineProperty called on non-object"));
    };
    let key = realm.to_property_key(&arg(args, 1))?;
    let desc = realm.to_property_descriptor(&arg(args, 2))?;
    if !realm.define_own_property(object, key.clone(), desc)? {
        return Err(Error::type_error(format!("Cannot redefine property: {key}")));
    }
    Ok(target)
}

/// `Object.getPrototypeOf(object)`
pub fn object_get_prototype_of(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let prototype = match arg(args, 0) {
        Value::Object(obj) => realm.get_prototype_of(obj)?,
        Value::Undefined | Value::Null => {
            return Err(Error::type_error("Cannot convert undefined or null to object"));
        }
        _ => Some(realm.intrinsics.object_prototype),
    };
    Ok(prototype.map_or(Value::Null, Value::Object))
}

/// `Object.setPrototypeOf(object, prototype)`
pub fn object_set_prototype_of(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let target = arg(args, 0);
    if target.is_nullish() {
        return Err(Error::type_error("Object.setPrototypeOf called on null or undefined"));
    }
    let prototype = prototype_argument(&arg(args, 1))?;
    let Value::Object(object) = target else {
        return Ok(target);
    };
    if !realm.set_prototype_of(object, prototype)? {
        return Err(Error::type_error("Object.setPrototypeOf failed: object is not extensible or the chain would cycle"));
    }
    Ok(target)
}

/// `Object.getOwnPropertyDescriptor(object, key)`
pub fn object_get_own_property_descriptor(
    realm: &mut Realm,
    _this: &Value,
    args: &[Value],
    _is_new: bool,
) -> JsResult<Value> {
    let object = require_object(&arg(args, 0), "Object.getOwnPropertyDescriptor")?;
    let key = realm.to_property_key(&arg(args, 1))?;
    Ok(match realm.get_own_property(object, &key)? {
        Some(desc) => realm.from_property_descriptor(&desc),
        None => Value::Undefined,
    })
}

/// `Object.isExtensible(object)`
pub fn object_is_extensible(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    match arg(args, 0) {
        Value::Object(obj) => Ok(Value::Boolean(realm.is_extensible(obj)?)),
        _ => Ok(Value::Boolean(false)),
    }
}

/// `Object.preventExtensions(object)`
pub fn object_prevent_extensions(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let target = arg(args, 0);
    if let Value::Object(obj) = target {
        if !realm.prevent_extensions(obj)? {
            return Err(Error::type_error("Cannot prevent extensions"));
        }
    }
    Ok(target)
}

/// `Object.keys(object)`: own enumerable string keys.
pub fn object_keys(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let object = require_object(&arg(args, 0), "Object.keys")?;
    let mut keys = Vec::new();
    for key in realm.own_property_keys(object)? {
        let PropertyKey::String(name) = &key else {
            continue;
        };
        if realm
            .get_own_property(object, &key)?
            .is_some_and(|desc| desc.is_enumerable())
        {
            keys.push(Value::String(name.clone()));
        }
    }
    Ok(Value::Object(realm.new_array(keys)))
}

// ============================================================================
// Object.prototype
// ============================================================================

/// `Object.prototype.hasOwnProperty(key)`
pub fn object_proto_has_own_property(realm: &mut Realm, this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let key = realm.to_property_key(&arg(args, 0))?;
    let found = match this {
        Value::Object(obj) => realm.get_own_property(*obj, &key)?.is_some(),
        Value::Undefined | Value::Null => {
            return Err(Error::type_error("Cannot convert undefined or null to object"));
        }
        Value::String(s) => {
            key.as_str() == Some("length")
                || key.as_array_index().is_some_and(|i| (i as usize) < s.chars().count())
        }
        _ => false,
    };
    Ok(Value::Boolean(found))
}

/// `Object.prototype.toString()`
pub fn object_proto_to_string(realm: &mut Realm, this: &Value, _args: &[Value], _is_new: bool) -> JsResult<Value> {
    let tag = match this {
        Value::Undefined => "Undefined",
        Value::Null => "Null",
        Value::Boolean(_) => "Boolean",
        Value::Number(_) => "Number",
        Value::String(_) => "String",
        Value::Symbol(_) => "Symbol",
        Value::Object(obj) => match &realm.heap.get(*obj).kind {
            ObjectKind::Array => "Array",
            ObjectKind::Arguments => "Arguments",
            ObjectKind::Error => "Error",
            ObjectKind::Function(_) | ObjectKind::RevocableFunction(_) => "Function",
            _ => "Object",
        },
    };
    Ok(Value::String(format!("[object {tag}]")))
}

/// `get Object.prototype.__proto__`
fn object_proto_get_proto(realm: &mut Realm, this: &Value, _args: &[Value], _is_new: bool) -> JsResult<Value> {
    let prototype = match this {
        Value::Object(obj) => realm.get_prototype_of(*obj)?,
        Value::Undefined | Value::Null => {
            return Err(Error::type_error("Cannot convert undefined or null to object"));
        }
        _ => Some(realm.intrinsics.object_prototype),
    };
    Ok(prototype.map_or(Value::Null, Value::Object))
}

/// `set Object.prototype.__proto__`
fn object_proto_set_proto(realm: &mut Realm, this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    if this.is_nullish() {
        return Err(Error::type_error("Cannot convert undefined or null to object"));
    }
    let prototype = match arg(args, 0) {
        Value::Object(obj) => Some(obj),
        Value::Null => None,
        _ => return Ok(Value::Undefined),
    };
    let Value::Object(object) = this else {
        return Ok(Value::Undefined);
    };
    if !realm.set_prototype_of(*object, prototype)? {
        return Err(Error::type_error("Object.prototype.__proto__ setter failed"));
    }
    Ok(Value::Undefined)
}
