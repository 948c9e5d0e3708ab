//! Proxy exotic objects.
//!
//! Every fundamental operation on a proxy follows the same shape: fail if the
//! proxy was revoked, look up the same-named trap on the handler, forward to
//! the target when there is none, otherwise call the trap with the target as
//! first argument and check its answer against what the target really looks
//! like. Invariant checks only run once the trap call has returned normally.
//!
//! Traps are ordinary calls and may do anything, including revoking the very
//! proxy being operated on, so the target and handler are read out of the heap
//! at the start of each operation and never cached on the Rust side.

use tracing::debug;

use super::object::{ObjectKind, ObjectRef};
use super::property::{PartialDescriptor, PropertyDescriptor, PropertyKey};
use super::realm::Realm;
use super::value::Value;
use crate::error::{Error, JsResult, throw_type_error};

/// Raised by every operation on a revoked proxy.
pub const HANDLER_IS_NULL: &str = "Proxy: handler is null";

/// Target and handler of a proxy. Both are cleared on revocation.
#[derive(Debug, Clone)]
pub struct ProxyObject {
    target: Option<ObjectRef>,
    handler: Option<ObjectRef>,
}

impl ProxyObject {
    /// Creates a live proxy.
    pub fn new(target: ObjectRef, handler: ObjectRef) -> Self {
        Self {
            target: Some(target),
            handler: Some(handler),
        }
    }

    /// The proxied object, `None` once revoked.
    pub fn target(&self) -> Option<ObjectRef> {
        self.target
    }

    /// The trap holder, `None` once revoked.
    pub fn handler(&self) -> Option<ObjectRef> {
        self.handler
    }

    /// Drops both references.
    pub fn revoke(&mut self) {
        self.target = None;
        self.handler = None;
    }

    /// Returns true once [`revoke`](Self::revoke) has run.
    pub fn is_revoked(&self) -> bool {
        self.handler.is_none()
    }
}

/// The live target and handler of `proxy`.
fn parts(realm: &Realm, proxy: ObjectRef) -> JsResult<(ObjectRef, ObjectRef)> {
    match &realm.heap.get(proxy).kind {
        ObjectKind::Proxy(p) => match (p.target, p.handler) {
            (Some(target), Some(handler)) => Ok((target, handler)),
            _ => Err(Error::type_error(HANDLER_IS_NULL)),
        },
        _ => Err(Error::InternalError("proxy operation on a non-proxy object".to_string())),
    }
}

/// GetMethod(handler, name): `None` when the trap is undefined or null.
fn trap(realm: &mut Realm, handler: ObjectRef, name: &str) -> JsResult<Option<Value>> {
    let trap = realm.get(handler, &PropertyKey::from(name), &Value::Object(handler))?;
    match trap {
        Value::Undefined | Value::Null => {
            debug!(trap = name, "proxy trap absent, forwarding to target");
            Ok(None)
        }
        trap if realm.is_callable(&trap) => {
            debug!(trap = name, "dispatching proxy trap");
            Ok(Some(trap))
        }
        _ => Err(Error::type_error(format!(
            "Proxy: handler's {name} trap wasn't undefined, null, or callable"
        ))),
    }
}

fn call_trap(realm: &mut Realm, trap: &Value, handler: ObjectRef, args: &[Value]) -> JsResult<Value> {
    realm.call(trap, &Value::Object(handler), args)
}

fn prototype_value(prototype: Option<ObjectRef>) -> Value {
    prototype.map_or(Value::Null, Value::Object)
}

/// `[[GetPrototypeOf]]`
pub fn get_prototype_of(realm: &mut Realm, proxy: ObjectRef) -> JsResult<Option<ObjectRef>> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "getPrototypeOf")? else {
        return realm.get_prototype_of(target);
    };
    let handler_proto = match call_trap(realm, &trap, handler, &[Value::Object(target)])? {
        Value::Object(obj) => Some(obj),
        Value::Null => None,
        _ => {
            throw_type_error!("Proxy: getPrototypeOf trap returned neither an object nor null");
        }
    };
    if realm.is_extensible(target)? {
        return Ok(handler_proto);
    }
    if realm.get_prototype_of(target)? != handler_proto {
        throw_type_error!("Proxy: getPrototypeOf trap result differs from the prototype of the non-extensible target");
    }
    Ok(handler_proto)
}

/// `[[SetPrototypeOf]]`. A falsy trap result is an error, not a `false` return.
pub fn set_prototype_of(realm: &mut Realm, proxy: ObjectRef, prototype: Option<ObjectRef>) -> JsResult<bool> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "setPrototypeOf")? else {
        return realm.set_prototype_of(target, prototype);
    };
    let result = call_trap(
        realm,
        &trap,
        handler,
        &[Value::Object(target), prototype_value(prototype)],
    )?;
    if !result.to_boolean() {
        throw_type_error!("Proxy: setPrototypeOf trap returned falsish");
    }
    if realm.is_extensible(target)? {
        return Ok(true);
    }
    if realm.get_prototype_of(target)? != prototype {
        throw_type_error!("Proxy: setPrototypeOf trap changed the prototype of the non-extensible target");
    }
    Ok(true)
}

/// `[[IsExtensible]]`. The trap must agree with the target.
pub fn is_extensible(realm: &mut Realm, proxy: ObjectRef) -> JsResult<bool> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "isExtensible")? else {
        return realm.is_extensible(target);
    };
    let result = call_trap(realm, &trap, handler, &[Value::Object(target)])?.to_boolean();
    if result != realm.is_extensible(target)? {
        throw_type_error!("Proxy: isExtensible trap result does not reflect extensibility of the target");
    }
    Ok(result)
}

/// `[[PreventExtensions]]`
pub fn prevent_extensions(realm: &mut Realm, proxy: ObjectRef) -> JsResult<bool> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "preventExtensions")? else {
        return realm.prevent_extensions(target);
    };
    let result = call_trap(realm, &trap, handler, &[Value::Object(target)])?.to_boolean();
    if result && realm.is_extensible(target)? {
        throw_type_error!("Proxy: preventExtensions trap returned truish but the target is extensible");
    }
    Ok(result)
}

/// `[[GetOwnProperty]]`
pub fn get_own_property(realm: &mut Realm, proxy: ObjectRef, key: &PropertyKey) -> JsResult<Option<PropertyDescriptor>> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "getOwnPropertyDescriptor")? else {
        return realm.get_own_property(target, key);
    };
    let result = call_trap(realm, &trap, handler, &[Value::Object(target), key.to_value()])?;
    if !result.is_object() && !result.is_undefined() {
        throw_type_error!("Proxy: getOwnPropertyDescriptor trap returned neither an object nor undefined");
    }

    let target_desc = realm.get_own_property(target, key)?;
    if result.is_undefined() {
        let Some(target_desc) = target_desc else {
            return Ok(None);
        };
        if !target_desc.is_configurable() {
            throw_type_error!("Proxy: getOwnPropertyDescriptor trap hid a non-configurable property of the target");
        }
        if !realm.is_extensible(target)? {
            throw_type_error!("Proxy: getOwnPropertyDescriptor trap hid a property of the non-extensible target");
        }
        return Ok(None);
    }

    let extensible = realm.is_extensible(target)?;
    let result_desc = realm.to_property_descriptor(&result)?.complete(None);
    if !PropertyDescriptor::is_compatible(extensible, &result_desc, target_desc.as_ref()) {
        throw_type_error!("Proxy: getOwnPropertyDescriptor trap returned a descriptor incompatible with the target property");
    }
    if !result_desc.is_configurable() && target_desc.as_ref().is_none_or(|d| d.is_configurable()) {
        throw_type_error!("Proxy: getOwnPropertyDescriptor trap reported non-configurability for a configurable or missing property");
    }
    Ok(Some(result_desc))
}

/// `[[DefineOwnProperty]]`
pub fn define_own_property(
    realm: &mut Realm,
    proxy: ObjectRef,
    key: PropertyKey,
    desc: PartialDescriptor,
) -> JsResult<bool> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "defineProperty")? else {
        return realm.define_own_property(target, key, desc);
    };
    let desc_object = realm.from_partial_descriptor(&desc);
    let result = call_trap(
        realm,
        &trap,
        handler,
        &[Value::Object(target), key.to_value(), desc_object],
    )?;
    if !result.to_boolean() {
        return Ok(false);
    }

    let target_desc = realm.get_own_property(target, &key)?;
    let extensible = realm.is_extensible(target)?;
    let setting_config_false = desc.configurable == Some(false);
    match target_desc {
        None => {
            if !extensible {
                throw_type_error!("Proxy: defineProperty trap added a property to the non-extensible target");
            }
            if setting_config_false {
                throw_type_error!("Proxy: defineProperty trap defined a non-configurable property missing from the target");
            }
        }
        Some(current) => {
            let complete = desc.complete(Some(&current));
            if !PropertyDescriptor::is_compatible(extensible, &complete, Some(&current)) {
                throw_type_error!("Proxy: defineProperty trap accepted a descriptor incompatible with the target property");
            }
            if setting_config_false && current.is_configurable() {
                throw_type_error!("Proxy: defineProperty trap reported non-configurability for a configurable target property");
            }
        }
    }
    Ok(true)
}

/// `[[HasProperty]]`
pub fn has(realm: &mut Realm, proxy: ObjectRef, key: &PropertyKey) -> JsResult<bool> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "has")? else {
        return realm.has_property(target, key);
    };
    let result = call_trap(realm, &trap, handler, &[Value::Object(target), key.to_value()])?.to_boolean();
    if !result {
        if let Some(target_desc) = realm.get_own_property(target, key)? {
            if !target_desc.is_configurable() {
                throw_type_error!("Proxy: has trap hid a non-configurable property of the target");
            }
            if !realm.is_extensible(target)? {
                throw_type_error!("Proxy: has trap hid a property of the non-extensible target");
            }
        }
    }
    Ok(result)
}

/// `[[Get]]`. The trap's receiver argument is the handler.
pub fn get(realm: &mut Realm, proxy: ObjectRef, key: &PropertyKey, receiver: &Value) -> JsResult<Value> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "get")? else {
        return realm.get(target, key, receiver);
    };
    let result = call_trap(
        realm,
        &trap,
        handler,
        &[Value::Object(target), key.to_value(), Value::Object(handler)],
    )?;

    match realm.get_own_property(target, key)? {
        Some(PropertyDescriptor::Data {
            value,
            writable: false,
            configurable: false,
            ..
        }) if !result.same_value(&value) => Err(Error::type_error(
            "Proxy: get trap result differs from the non-writable, non-configurable target property",
        )),
        Some(PropertyDescriptor::Accessor {
            get: None,
            configurable: false,
            ..
        }) if !result.is_undefined() => Err(Error::type_error(
            "Proxy: get trap returned a value for a non-configurable accessor without a getter",
        )),
        _ => Ok(result),
    }
}

/// `[[Set]]`. A falsy trap result fails the assignment without throwing.
pub fn set(realm: &mut Realm, proxy: ObjectRef, key: PropertyKey, value: Value, receiver: &Value) -> JsResult<bool> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "set")? else {
        return realm.set(target, key, value, receiver);
    };
    let result = call_trap(
        realm,
        &trap,
        handler,
        &[Value::Object(target), key.to_value(), value.clone(), receiver.clone()],
    )?;
    if !result.to_boolean() {
        return Ok(false);
    }

    match realm.get_own_property(target, &key)? {
        Some(PropertyDescriptor::Data {
            value: current,
            writable: false,
            configurable: false,
            ..
        }) if !value.same_value(&current) => Err(Error::type_error(
            "Proxy: set trap changed the non-writable, non-configurable target property",
        )),
        Some(PropertyDescriptor::Accessor {
            set: None,
            configurable: false,
            ..
        }) => Err(Error::type_error(
            "Proxy: set trap succeeded for a non-configurable accessor without a setter",
        )),
        _ => Ok(true),
    }
}

/// `[[Delete]]`
pub fn delete(realm: &mut Realm, proxy: ObjectRef, key: &PropertyKey) -> JsResult<bool> {
    let (target, handler) = parts(realm, proxy)?;
    let Some(trap) = trap(realm, handler, "deleteProperty")? else {
        return realm.delete(target, key);
    };
    let result = call_trap(realm, &trap, handler, &[Value::Object(target), key.to_value()])?.to_boolean();
    if !result {
        return Ok(false);
    }
    match realm.get_own_property(target, key)? {
        Some(desc) if !desc.is_configurable() => Err(Error::type_error(
            "Proxy: deleteProperty trap removed a non-configurable property of the target",
        )),
        _ => Ok(true),
    }
}

/// Own property keys. Never trapped: the target's keys are reported as they
/// are, and a revoked proxy has none.
pub fn enumerate(realm: &mut Realm, proxy: ObjectRef) -> JsResult<Vec<PropertyKey>> {
    let target = match &realm.heap.get(proxy).kind {
        ObjectKind::Proxy(p) => p.target(),
        _ => None,
    };
    match target {
        Some(target) => realm.own_property_keys(target),
        None => Ok(Vec::new()),
    }
}

/// The prototype used for property lookups that continue past the proxy.
/// `None` when revoked or when the trap produced `null`.
pub fn get_prototype_object(realm: &mut Realm, proxy: ObjectRef) -> JsResult<Option<ObjectRef>> {
    match &realm.heap.get(proxy).kind {
        ObjectKind::Proxy(p) if p.target().is_some() => get_prototype_of(realm, proxy),
        _ => Ok(None),
    }
}

/// Revokes `proxy`. Later calls are no-ops.
pub fn revoke(realm: &mut Realm, proxy: ObjectRef) {
    if let ObjectKind::Proxy(p) = &mut realm.heap.get_mut(proxy).kind {
        if !p.is_revoked() {
            debug!(proxy = proxy.index(), "proxy revoked");
        }
        p.revoke();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frozen_target(realm: &mut Realm) -> ObjectRef {
        let target = realm.new_object();
        realm.heap.get_mut(target).insert(
            "x".into(),
            PropertyDescriptor::data_with(Value::Number(1.0), false, true, false),
        );
        target
    }

    fn handler_with(realm: &mut Realm, trap: &str, result: Value) -> ObjectRef {
        let handler = realm.new_object();
        let function = realm.new_native_function(trap, 0, move |_, _, _, _| Ok(result.clone()));
        realm
            .heap
            .get_mut(handler)
            .insert(trap.into(), PropertyDescriptor::data(Value::Object(function)));
        handler
    }

    fn new_proxy(realm: &mut Realm, target: ObjectRef, handler: ObjectRef) -> ObjectRef {
        realm.new_proxy(target, handler)
    }

    #[test]
    fn test_get_forwards_without_trap() {
        let mut realm = Realm::new();
        let target = frozen_target(&mut realm);
        let handler = realm.new_object();
        let proxy = new_proxy(&mut realm, target, handler);
        let value = get(&mut realm, proxy, &"x".into(), &Value::Object(proxy)).unwrap();
        assert_eq!(value, Value::Number(1.0));
    }

    #[test]
    fn test_get_invariant() {
        let mut realm = Realm::new();
        let target = frozen_target(&mut realm);

        let lying = handler_with(&mut realm, "get", Value::Number(2.0));
        let proxy = new_proxy(&mut realm, target, lying);
        let err = get(&mut realm, proxy, &"x".into(), &Value::Object(proxy)).unwrap_err();
        assert!(err.is_type_error());

        let honest = handler_with(&mut realm, "get", Value::Number(1.0));
        let proxy = new_proxy(&mut realm, target, honest);
        let value = get(&mut realm, proxy, &"x".into(), &Value::Object(proxy)).unwrap();
        assert_eq!(value, Value::Number(1.0));
    }

    #[test]
    fn test_null_trap_forwards() {
        let mut realm = Realm::new();
        let target = frozen_target(&mut realm);
        let handler = realm.new_object();
        realm
            .heap
            .get_mut(handler)
            .insert("get".into(), PropertyDescriptor::data(Value::Null));
        let proxy = new_proxy(&mut realm, target, handler);
        assert_eq!(
            get(&mut realm, proxy, &"x".into(), &Value::Object(proxy)).unwrap(),
            Value::Number(1.0)
        );
    }

    #[test]
    fn test_non_callable_trap_rejected() {
        let mut realm = Realm::new();
        let target = realm.new_object();
        let handler = realm.new_object();
        realm
            .heap
            .get_mut(handler)
            .insert("has".into(), PropertyDescriptor::data(Value::Number(3.0)));
        let proxy = new_proxy(&mut realm, target, handler);
        let err = has(&mut realm, proxy, &"x".into()).unwrap_err();
        assert!(err.to_string().contains("trap wasn't undefined, null, or callable"));
    }

    #[test]
    fn test_set_false_fails_silently() {
        let mut realm = Realm::new();
        let target = realm.new_object();
        let handler = handler_with(&mut realm, "set", Value::Boolean(false));
        let proxy = new_proxy(&mut realm, target, handler);
        let ok = set(&mut realm, proxy, "y".into(), Value::Number(1.0), &Value::Object(proxy)).unwrap();
        assert!(!ok);
        assert!(realm.heap.get(target).get_own(&"y".into()).is_none());
    }

    #[test]
    fn test_set_invariant_on_frozen_property() {
        let mut realm = Realm::new();
        let target = frozen_target(&mut realm);
        let handler = handler_with(&mut realm, "set", Value::Boolean(true));
        let proxy = new_proxy(&mut realm, target, handler);
        let receiver = Value::Object(proxy);
        assert!(set(&mut realm, proxy, "x".into(), Value::Number(1.0), &receiver).unwrap());
        assert!(set(&mut realm, proxy, "x".into(), Value::Number(5.0), &receiver).is_err());
    }

    #[test]
    fn test_has_cannot_hide_non_configurable() {
        let mut realm = Realm::new();
        let target = frozen_target(&mut realm);
        let handler = handler_with(&mut realm, "has", Value::Boolean(false));
        let proxy = new_proxy(&mut realm, target, handler);
        assert!(has(&mut realm, proxy, &"x".into()).unwrap_err().is_type_error());
        assert!(!has(&mut realm, proxy, &"missing".into()).unwrap());
    }

    #[test]
    fn test_is_extensible_must_match() {
        let mut realm = Realm::new();
        let target = realm.new_object();
        let lying = handler_with(&mut realm, "isExtensible", Value::Boolean(false));
        let proxy = new_proxy(&mut realm, target, lying);
        assert!(is_extensible(&mut realm, proxy).is_err());

        let honest = handler_with(&mut realm, "isExtensible", Value::Boolean(true));
        let proxy = new_proxy(&mut realm, target, honest);
        assert!(is_extensible(&mut realm, proxy).unwrap());
    }

    #[test]
    fn test_prevent_extensions_must_take_effect() {
        let mut realm = Realm::new();
        let target = realm.new_object();
        let handler = handler_with(&mut realm, "preventExtensions", Value::Boolean(true));
        let proxy = new_proxy(&mut realm, target, handler);
        assert!(prevent_extensions(&mut realm, proxy).is_err());

        realm.heap.get_mut(target).extensible = false;
        assert!(prevent_extensions(&mut realm, proxy).unwrap());
    }

    #[test]
    fn test_get_prototype_of_on_non_extensible_target() {
        let mut realm = Realm::new();
        let target = realm.new_object();
        realm.heap.get_mut(target).extensible = false;
        let other = realm.new_object();
        let handler = handler_with(&mut realm, "getPrototypeOf", Value::Object(other));
        let proxy = new_proxy(&mut realm, target, handler);
        assert!(get_prototype_of(&mut realm, proxy).is_err());

        let bad = handler_with(&mut realm, "getPrototypeOf", Value::Number(1.0));
        let proxy = new_proxy(&mut realm, target, bad);
        assert!(get_prototype_of(&mut realm, proxy).is_err());
    }

    #[test]
    fn test_set_trap_rejects_success_on_setterless_accessor() {
        let mut realm = Realm::new();
        let target = realm.new_object();
        let getter = realm.new_native_function("get x", 0, |_, _, _, _| Ok(Value::Number(1.0)));
        let accessor = |configurable| PropertyDescriptor::Accessor {
            get: Some(getter),
            set: None,
            enumerable: false,
            configurable,
        };
        realm.heap.get_mut(target).insert("fixed".into(), accessor(false));
        realm.heap.get_mut(target).insert("loose".into(), accessor(true));

        let handler = handler_with(&mut realm, "set", Value::Boolean(true));
        let proxy = new_proxy(&mut realm, target, handler);
        let receiver = Value::Object(proxy);
        let err = set(&mut realm, proxy, "fixed".into(), Value::Number(2.0), &receiver).unwrap_err();
        assert!(err.is_type_error());
        assert!(set(&mut realm, proxy, "loose".into(), Value::Number(2.0), &receiver).unwrap());
        assert!(set(&mut realm, proxy, "absent".into(), Value::Number(2.0), &receiver).unwrap());
    }

    #[test]
    fn test_prototype_traps_accept_the_actual_prototype_of_a_non_extensible_target() {
        let mut realm = Realm::new();
        let target = realm.new_object();
        realm.heap.get_mut(target).extensible = false;
        let actual = realm.intrinsics.object_prototype;

        let getting = handler_with(&mut realm, "getPrototypeOf", Value::Object(actual));
        let proxy = new_proxy(&mut realm, target, getting);
        assert_eq!(get_prototype_of(&mut realm, proxy).unwrap(), Some(actual));

        let setting = handler_with(&mut realm, "setPrototypeOf", Value::Boolean(true));
        let proxy = new_proxy(&mut realm, target, setting);
        assert!(set_prototype_of(&mut realm, proxy, Some(actual)).unwrap());
        let err = set_prototype_of(&mut realm, proxy, None).unwrap_err();
        assert!(err.is_type_error());
    }

    #[test]
    fn test_set_prototype_of_falsy_throws() {
        let mut realm = Realm::new();
        let target = realm.new_object();
        let handler = handler_with(&mut realm, "setPrototypeOf", Value::Boolean(false));
        let proxy = new_proxy(&mut realm, target, handler);
        assert!(set_prototype_of(&mut realm, proxy, None).unwrap_err().is_type_error());
    }

    #[test]
    fn test_delete_cannot_remove_non_configurable() {
        let mut realm = Realm::new();
        let target = frozen_target(&mut realm);
        let handler = handler_with(&mut realm, "deleteProperty", Value::Boolean(true));
        let proxy = new_proxy(&mut realm, target, handler);
        assert!(delete(&mut realm, proxy, &"x".into()).is_err());
        assert!(delete(&mut realm, proxy, &"other".into()).unwrap());
    }

    #[test]
    fn test_revoked_proxy() {
        let mut realm = Realm::new();
        let target = frozen_target(&mut realm);
        let handler = realm.new_object();
        let proxy = new_proxy(&mut realm, target, handler);
        revoke(&mut realm, proxy);
        revoke(&mut realm, proxy);

        let err = get(&mut realm, proxy, &"x".into(), &Value::Object(proxy)).unwrap_err();
        assert_eq!(err.to_string(), format!("TypeError: {HANDLER_IS_NULL}"));
        assert!(enumerate(&mut realm, proxy).unwrap().is_empty());
        assert_eq!(get_prototype_object(&mut realm, proxy).unwrap(), None);
    }

    #[test]
    fn test_enumeration_forwards_to_target() {
        let mut realm = Realm::new();
        let target = frozen_target(&mut realm);
        let handler = realm.new_object();
        let proxy = new_proxy(&mut realm, target, handler);
        assert_eq!(enumerate(&mut realm, proxy).unwrap(), vec![PropertyKey::from("x")]);
    }
}
