//! Function.prototype methods.

use super::arg;
use crate::compiler::code_block::NativeCodeBlock;
use crate::error::{Error, JsResult};
use crate::runtime::function::FunctionObject;
use crate::runtime::object::ObjectKind;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

/// Installs `call`, `apply`, `bind` and `toString` on `Function.prototype`.
pub fn install(realm: &mut Realm) {
    let prototype = realm.intrinsics.function_prototype;
    realm.define_builtin_function(prototype, "call", 1, function_proto_call);
    realm.define_builtin_function(prototype, "apply", 2, function_proto_apply);
    realm.define_builtin_function(prototype, "bind", 1, function_proto_bind);
    realm.define_builtin_function(prototype, "toString", 0, function_proto_to_string);
}

/// `Function.prototype.call(thisArg, ...args)`
pub fn function_proto_call(realm: &mut Realm, this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let this_arg = arg(args, 0);
    let rest = args.get(1..).unwrap_or_default();
    realm.call(this, &this_arg, rest)
}

/// `Function.prototype.apply(thisArg, argArray)`
pub fn function_proto_apply(realm: &mut Realm, this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let this_arg = arg(args, 0);
    let list = match arg(args, 1) {
        Value::Undefined | Value::Null => Vec::new(),
        Value::Object(array_like) => {
            let length = realm.length_of_array_like(array_like)?;
            let receiver = Value::Object(array_like);
            let mut list = Vec::with_capacity(length as usize);
            for index in 0..length {
                list.push(realm.get(array_like, &index.into(), &receiver)?);
            }
            list
        }
        _ => return Err(Error::type_error("CreateListFromArrayLike called on non-object")),
    };
    realm.call(this, &this_arg, &list)
}

/// `Function.prototype.bind(thisArg, ...args)`
pub fn function_proto_bind(realm: &mut Realm, this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let Some(target) = this.as_object().filter(|_| realm.is_callable(this)) else {
        return Err(Error::type_error("Bind must be called on a function"));
    };
    let target_length = match &realm.heap.get(target).kind {
        ObjectKind::Function(function) => function.parameter_count(),
        _ => 0,
    };
    let code = NativeCodeBlock::bound(
        target,
        target_length,
        arg(args, 0),
        args.get(1..).unwrap_or_default().to_vec(),
    );
    Ok(Value::Object(realm.new_function_object(FunctionObject::native(code))))
}

/// `Function.prototype.toString()`
pub fn function_proto_to_string(realm: &mut Realm, this: &Value, _args: &[Value], _is_new: bool) -> JsResult<Value> {
    if !realm.is_callable(this) {
        return Err(Error::type_error(
            "Function.prototype.toString requires that 'this' be a Function",
        ));
    }
    Ok(Value::String(realm.to_string(this)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sum(realm: &mut Realm) -> Value {
        Value::Object(realm.new_native_function("sum", 2, |realm, this, args, _| {
            let mut total = if this.is_undefined() { 0.0 } else { realm.to_number(this)? };
            for value in args {
                total += realm.to_number(value)?;
            }
            Ok(Value::Number(total))
        }))
    }

    #[test]
    fn test_call_and_apply_forward_this() {
        let mut realm = Realm::new();
        let f = sum(&mut realm);
        let called = function_proto_call(&mut realm, &f, &[Value::Number(1.0), Value::Number(2.0)], false).unwrap();
        assert_eq!(called, Value::Number(3.0));

        let list = Value::Object(realm.new_array(vec![Value::Number(5.0), Value::Number(6.0)]));
        let applied = function_proto_apply(&mut realm, &f, &[Value::Number(10.0), list], false).unwrap();
        assert_eq!(applied, Value::Number(21.0));
    }

    #[test]
    fn test_bind_prepends_arguments() {
        let mut realm = Realm::new();
        let f = sum(&mut realm);
        let bound = function_proto_bind(&mut realm, &f, &[Value::Number(100.0), Value::Number(1.0)], false).unwrap();
        let result = realm.call(&bound, &Value::Undefined, &[Value::Number(2.0)]).unwrap();
        assert_eq!(result, Value::Number(103.0));
        assert_eq!(
            realm.get_value(&bound, &"length".into()).unwrap(),
            Value::Number(1.0)
        );
    }

    #[test]
    fn test_bind_requires_callable() {
        let mut realm = Realm::new();
        let err = function_proto_bind(&mut realm, &Value::Number(1.0), &[], false).unwrap_err();
        assert!(err.is_type_error());
    }
}
