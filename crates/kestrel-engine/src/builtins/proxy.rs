//! The `Proxy` constructor and `Proxy.revocable`.

use std::rc::Rc;

use tracing::debug;

use super::arg;
use crate::compiler::code_block::NativeCodeBlock;
use crate::error::{Error, JsResult};
use crate::runtime::function::{FunctionObject, RevocableFunctionObject};
use crate::runtime::object::{JsObject, ObjectKind, ObjectRef};
use crate::runtime::property::PropertyDescriptor;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

/// Installs `Proxy` on the global object.
pub fn install(realm: &mut Realm) {
    // Proxy has no `prototype` property, so it is not built with
    // `new_native_constructor`.
    let code = NativeCodeBlock::new("Proxy", 2, true, Rc::new(proxy_constructor));
    let constructor = realm.new_function_object(FunctionObject::native(code));
    realm.define_builtin_function(constructor, "revocable", 2, proxy_revocable);
    let global = realm.global_object();
    realm.define_builtin(global, "Proxy", Value::Object(constructor));
    realm.intrinsics.proxy = Some(constructor);
}

/// ProxyCreate
pub fn proxy_create(realm: &mut Realm, target: &Value, handler: &Value) -> JsResult<ObjectRef> {
    let (Value::Object(target), Value::Object(handler)) = (target, handler) else {
        return Err(Error::type_error(
            "Cannot create proxy with a non-object as target or handler",
        ));
    };
    let revoked = |object: ObjectRef| match &realm.heap.get(object).kind {
        ObjectKind::Proxy(proxy) => proxy.is_revoked(),
        _ => false,
    };
    if revoked(*target) || revoked(*handler) {
        return Err(Error::type_error(
            "Cannot create proxy with a revoked proxy as target or handler",
        ));
    }
    Ok(realm.new_proxy(*target, *handler))
}

/// `new Proxy(target, handler)`
pub fn proxy_constructor(realm: &mut Realm, _this: &Value, args: &[Value], is_new: bool) -> JsResult<Value> {
    if !is_new {
        return Err(Error::type_error("Constructor Proxy requires 'new'"));
    }
    Ok(Value::Object(proxy_create(realm, &arg(args, 0), &arg(args, 1))?))
}

/// `Proxy.revocable(target, handler)`: `{ proxy, revoke }`.
pub fn proxy_revocable(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    let proxy = proxy_create(realm, &arg(args, 0), &arg(args, 1))?;

    let function_prototype = realm.intrinsics.function_prototype;
    let revoker = realm.heap.alloc(JsObject::new(
        ObjectKind::RevocableFunction(RevocableFunctionObject::new(proxy)),
        Some(function_prototype),
    ));
    let object = realm.heap.get_mut(revoker);
    object.insert(
        "length".into(),
        PropertyDescriptor::data_with(Value::Number(0.0), false, false, true),
    );
    object.insert(
        "name".into(),
        PropertyDescriptor::data_with(Value::from(""), false, false, true),
    );
    debug!(proxy = proxy.index(), "revocable proxy created");

    let result = realm.new_object();
    realm.create_data_property(result, "proxy".into(), Value::Object(proxy))?;
    realm.create_data_property(result, "revoke".into(), Value::Object(revoker))?;
    Ok(Value::Object(result))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxy_global(realm: &mut Realm) -> Value {
        let global = Value::Object(realm.global_object());
        realm.get_value(&global, &"Proxy".into()).unwrap()
    }

    #[test]
    fn test_requires_new() {
        let mut realm = Realm::new();
        let proxy = proxy_global(&mut realm);
        let target = Value::Object(realm.new_object());
        let handler = Value::Object(realm.new_object());
        let err = realm.call(&proxy, &Value::Undefined, &[target.clone(), handler.clone()]).unwrap_err();
        assert!(err.is_type_error());
        assert!(realm.construct(&proxy, &[target, handler]).is_ok());
    }

    #[test]
    fn test_rejects_non_objects_and_revoked_proxies() {
        let mut realm = Realm::new();
        let target = Value::Object(realm.new_object());
        assert!(proxy_create(&mut realm, &target, &Value::Null).unwrap_err().is_type_error());

        let pair = proxy_revocable(&mut realm, &Value::Undefined, &[target.clone(), target.clone()], false).unwrap();
        let revoke = realm.get_value(&pair, &"revoke".into()).unwrap();
        let proxy = realm.get_value(&pair, &"proxy".into()).unwrap();
        realm.call(&revoke, &Value::Undefined, &[]).unwrap();
        let err = proxy_create(&mut realm, &proxy, &target).unwrap_err();
        assert!(err.to_string().contains("revoked proxy"));
    }

    #[test]
    fn test_revocable_result_shape() {
        let mut realm = Realm::new();
        let target = Value::Object(realm.new_object());
        let pair = proxy_revocable(&mut realm, &Value::Undefined, &[target.clone(), target], false).unwrap();
        let pair = pair.as_object().unwrap();
        for name in ["proxy", "revoke"] {
            let desc = realm.get_own_property(pair, &name.into()).unwrap().unwrap();
            assert!(desc.is_enumerable());
            assert!(desc.is_configurable());
        }
        let revoke = realm.get(pair, &"revoke".into(), &Value::Object(pair)).unwrap();
        assert!(realm.is_callable(&revoke));
        assert!(!realm.is_constructor(&revoke));
        assert!(realm.construct(&revoke, &[]).unwrap_err().is_type_error());
    }

    #[test]
    fn test_disabled_by_config() {
        let config = crate::config::EngineConfig {
            enable_proxy: false,
            ..Default::default()
        };
        let mut realm = Realm::with_config(config);
        assert_eq!(proxy_global(&mut realm), Value::Undefined);
        assert!(realm.intrinsics.proxy.is_none());
    }
}
