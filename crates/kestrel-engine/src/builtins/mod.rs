//! Built-in JavaScript objects and constructors.
//!
//! Only the intrinsics generated code leans on are installed:
//! - `Object` (class lowering calls `Object.create` and
//!   `Object.defineProperty`; `super` walks `__proto__`)
//! - `Function.prototype.call` / `apply` / `bind`
//! - `Array` and the array iterator driving `for-of`
//! - `Error` and the native error constructors
//! - `Proxy` and `Proxy.revocable`
//! - global value properties, `eval` and `Symbol.iterator`

pub mod array;
pub mod error;
pub mod function;
pub mod global;
pub mod object;
pub mod proxy;

use tracing::debug;

use crate::error::{Error, JsResult};
use crate::runtime::object::ObjectRef;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

/// Installs every builtin into a freshly allocated realm.
pub fn install(realm: &mut Realm) {
    object::install(realm);
    function::install(realm);
    array::install(realm);
    error::install(realm);
    global::install(realm);
    if realm.config.enable_proxy {
        proxy::install(realm);
    }
    debug!(proxy = realm.config.enable_proxy, "builtins installed");
}

/// The `index`-th argument, or undefined.
pub(crate) fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

/// RequireObjectCoercible for builtins that need a real object.
pub(crate) fn require_object(value: &Value, method: &str) -> JsResult<ObjectRef> {
    match value {
        Value::Object(obj) => Ok(*obj),
        Value::Undefined | Value::Null => Err(Error::type_error(format!(
            "{method} called on null or undefined"
        ))),
        other => Err(Error::type_error(format!("{method} called on non-object {other}"))),
    }
}
