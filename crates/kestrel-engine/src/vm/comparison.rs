//! Equality and relational comparison.

use crate::error::JsResult;
use crate::runtime::realm::Realm;
use crate::runtime::value::{Value, string_to_number};

/// Abstract equality comparison (`==`).
///
/// Objects meet primitives through ToPrimitive, which here means their
/// string form.
pub fn abstract_equals(realm: &mut Realm, a: &Value, b: &Value) -> JsResult<bool> {
    Ok(match (a, b) {
        (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
        (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,

        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            *n == string_to_number(s)
        }

        (Value::Boolean(flag), other) | (other, Value::Boolean(flag)) if !matches!(other, Value::Boolean(_)) => {
            let number = Value::Number(if *flag { 1.0 } else { 0.0 });
            return abstract_equals(realm, &number, other);
        }

        (Value::Object(_), Value::Number(_) | Value::String(_))
        | (Value::Number(_) | Value::String(_), Value::Object(_)) => {
            let a = realm.to_primitive(a)?;
            let b = realm.to_primitive(b)?;
            return abstract_equals(realm, &a, &b);
        }

        // Same type, or mismatched types with no coercion path.
        _ => a == b,
    })
}

/// Abstract relational comparison `a < b`. `None` when either side is NaN.
pub fn less_than(realm: &mut Realm, a: &Value, b: &Value) -> JsResult<Option<bool>> {
    let a = realm.to_primitive(a)?;
    let b = realm.to_primitive(b)?;
    if let (Value::String(a), Value::String(b)) = (&a, &b) {
        return Ok(Some(a.encode_utf16().lt(b.encode_utf16())));
    }
    let a = realm.to_number(&a)?;
    let b = realm.to_number(&b)?;
    if a.is_nan() || b.is_nan() {
        return Ok(None);
    }
    Ok(Some(a < b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(a: Value, b: Value) -> bool {
        abstract_equals(&mut Realm::new(), &a, &b).unwrap()
    }

    #[test]
    fn test_abstract_equals_same_type() {
        assert!(eq(Value::Undefined, Value::Undefined));
        assert!(eq(Value::Boolean(true), Value::Boolean(true)));
        assert!(!eq(Value::Boolean(true), Value::Boolean(false)));
        assert!(eq(Value::from("foo"), Value::from("foo")));
    }

    #[test]
    fn test_abstract_equals_null_undefined() {
        assert!(eq(Value::Null, Value::Undefined));
        assert!(!eq(Value::Null, Value::Number(0.0)));
    }

    #[test]
    fn test_abstract_equals_coercions() {
        assert!(eq(Value::Number(42.0), Value::from("42")));
        assert!(!eq(Value::Number(42.0), Value::from("43")));
        assert!(eq(Value::Boolean(true), Value::Number(1.0)));
        assert!(eq(Value::from("0"), Value::Boolean(false)));
        assert!(!eq(Value::Number(f64::NAN), Value::Number(f64::NAN)));
    }

    #[test]
    fn test_objects_compare_by_identity_or_string_form() {
        let mut realm = Realm::new();
        let a = Value::Object(realm.new_array(vec![Value::Number(1.0), Value::Number(2.0)]));
        let b = Value::Object(realm.new_array(vec![]));
        assert!(abstract_equals(&mut realm, &a, &a).unwrap());
        assert!(!abstract_equals(&mut realm, &a, &b).unwrap());
        assert!(abstract_equals(&mut realm, &a, &Value::from("1,2")).unwrap());
    }

    #[test]
    fn test_less_than() {
        let mut realm = Realm::new();
        assert_eq!(less_than(&mut realm, &Value::Number(1.0), &Value::Number(2.0)).unwrap(), Some(true));
        assert_eq!(less_than(&mut realm, &Value::from("b"), &Value::from("a")).unwrap(), Some(false));
        assert_eq!(less_than(&mut realm, &Value::from("10"), &Value::Number(9.0)).unwrap(), Some(false));
        assert_eq!(less_than(&mut realm, &Value::Undefined, &Value::Number(1.0)).unwrap(), None);
    }
}
