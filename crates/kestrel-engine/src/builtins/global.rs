//! Global object value properties, `eval` and `Symbol`.

use super::arg;
use crate::error::JsResult;
use crate::runtime::property::PropertyDescriptor;
use crate::runtime::realm::Realm;
use crate::runtime::value::{SymbolId, Value};

/// Installs `globalThis`, `undefined`, `NaN`, `Infinity`, `eval` and `Symbol`.
pub fn install(realm: &mut Realm) {
    let global = realm.global_object();
    realm.define_builtin(global, "globalThis", Value::Object(global));

    let constants = [
        ("undefined", Value::Undefined),
        ("NaN", Value::Number(f64::NAN)),
        ("Infinity", Value::Number(f64::INFINITY)),
    ];
    for (name, value) in constants {
        realm
            .heap
            .get_mut(global)
            .insert(name.into(), PropertyDescriptor::data_with(value, false, false, false));
    }

    let eval = realm.define_builtin_function(global, "eval", 1, global_eval);
    realm.intrinsics.eval = Some(eval);

    // Symbol only carries the well-known symbols generated code uses.
    let symbol = realm.new_object();
    realm.heap.get_mut(symbol).insert(
        "iterator".into(),
        PropertyDescriptor::data_with(Value::Symbol(SymbolId::ITERATOR), false, false, false),
    );
    realm.define_builtin(global, "Symbol", Value::Object(symbol));
}

/// `eval(x)` reached indirectly. Direct calls are recognised by the
/// interpreter before they get here.
pub fn global_eval(realm: &mut Realm, _this: &Value, args: &[Value], _is_new: bool) -> JsResult<Value> {
    match arg(args, 0) {
        Value::String(source) => realm.global_eval(&source),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_properties_are_frozen() {
        let mut realm = Realm::new();
        let global = realm.global_object();
        for name in ["undefined", "NaN", "Infinity"] {
            let desc = realm.get_own_property(global, &name.into()).unwrap().unwrap();
            assert!(desc.is_frozen_data(), "{name}");
        }
        let nan = realm.get_value(&Value::Object(global), &"NaN".into()).unwrap();
        assert!(matches!(nan, Value::Number(n) if n.is_nan()));
    }

    #[test]
    fn test_eval_passes_non_strings_through() {
        let mut realm = Realm::new();
        let result = global_eval(&mut realm, &Value::Undefined, &[Value::Number(7.0)], false).unwrap();
        assert_eq!(result, Value::Number(7.0));
    }

    #[test]
    fn test_eval_without_parser() {
        let mut realm = Realm::new();
        let err = global_eval(&mut realm, &Value::Undefined, &[Value::from("1")], false).unwrap_err();
        assert!(matches!(err, crate::error::Error::SyntaxError(_)));
    }

    #[test]
    fn test_symbol_iterator() {
        let mut realm = Realm::new();
        let global = Value::Object(realm.global_object());
        let symbol = realm.get_value(&global, &"Symbol".into()).unwrap();
        let iterator = realm.get_value(&symbol, &"iterator".into()).unwrap();
        assert_eq!(iterator, Value::Symbol(SymbolId::ITERATOR));
        assert_eq!(realm.intrinsics.eval.map(Value::Object), Some(realm.get_value(&global, &"eval".into()).unwrap()));
    }
}
