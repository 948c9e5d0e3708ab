//! Error built-in objects.
//!
//! Provides the Error constructor and the native error types the engine
//! raises itself:
//! - TypeError
//! - RangeError
//! - SyntaxError
//! - ReferenceError

use super::arg;
use crate::error::{Error, JsResult};
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

/// Native error constructors installed next to `Error`.
const NATIVE_ERRORS: [&str; 4] = ["TypeError", "RangeError", "SyntaxError", "ReferenceError"];

/// Installs `Error`, the native error constructors and their prototypes.
pub fn install(realm: &mut Realm) {
    let global = realm.global_object();
    for name in std::iter::once("Error").chain(NATIVE_ERRORS) {
        let prototype = realm.error_prototype(name);
        let constructor = realm.new_native_constructor(name, 1, prototype, move |realm, _this, args, _is_new| {
            error_constructor(realm, name, args)
        });
        realm.define_builtin(prototype, "name", Value::from(name));
        realm.define_builtin(prototype, "message", Value::from(""));
        realm.define_builtin(global, name, Value::Object(constructor));
    }
    let prototype = realm.intrinsics.error_prototype;
    realm.define_builtin_function(prototype, "toString", 0, error_proto_to_string);
}

// ============================================================================
// Constructors
// ============================================================================

/// `Error(message)` and the native error constructors; `new` is optional.
fn error_constructor(realm: &mut Realm, name: &str, args: &[Value]) -> JsResult<Value> {
    let message = match arg(args, 0) {
        Value::Undefined => String::new(),
        other => realm.to_string(&other)?,
    };
    Ok(Value::Object(realm.new_error(name, &message)))
}

// ============================================================================
// Error.prototype
// ============================================================================

/// `Error.prototype.toString()`
pub fn error_proto_to_string(realm: &mut Realm, this: &Value, _args: &[Value], _is_new: bool) -> JsResult<Value> {
    let Value::Object(object) = this else {
        return Err(Error::type_error(
            "Error.prototype.toString requires that 'this' be an Object",
        ));
    };
    let read = |realm: &mut Realm, field: &str, default: &str| -> JsResult<String> {
        match realm.get(*object, &field.into(), this)? {
            Value::Undefined => Ok(default.to_string()),
            value => realm.to_string(&value),
        }
    };
    let name = read(realm, "name", "Error")?;
    let message = read(realm, "message", "")?;
    Ok(Value::String(match (name.is_empty(), message.is_empty()) {
        (_, true) => name,
        (true, false) => message,
        (false, false) => format!("{name}: {message}"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_instances() {
        let mut realm = Realm::new();
        let global = Value::Object(realm.global_object());
        let type_error = realm.get_value(&global, &"TypeError".into()).unwrap();
        let instance = realm.construct(&type_error, &[Value::from("bad")]).unwrap();

        assert_eq!(realm.to_string(&instance).unwrap(), "TypeError: bad");
        let error = realm.get_value(&global, &"Error".into()).unwrap();
        assert!(realm.instance_of(&instance, &error).unwrap());
        assert!(matches!(realm.value_to_error(instance), Error::TypeError(m) if m == "bad"));
    }

    #[test]
    fn test_to_string_on_plain_object() {
        let mut realm = Realm::new();
        let obj = realm.new_object();
        realm.create_data_property(obj, "name".into(), Value::from("Custom")).unwrap();
        let s = error_proto_to_string(&mut realm, &Value::Object(obj), &[], false).unwrap();
        assert_eq!(s, Value::from("Custom"));
    }
}
