//! Read-only traversal helpers over expressions.

use super::*;

/// Calls `f(name, is_assignment)` for every identifier an expression reads or writes.
///
/// Nested function bodies are not entered; they are separate scopes.
pub fn for_each_identifier(expr: &Expression, f: &mut dyn FnMut(&str, bool)) {
    match expr {
        Expression::Identifier(id) => f(&id.name, false),
        Expression::Literal(_) | Expression::This | Expression::Super(_) => {}
        Expression::Function(_) | Expression::Arrow(_) => {}
        Expression::Array(arr) => {
            for element in arr.elements.iter().flatten() {
                for_each_identifier(element, f);
            }
        }
        Expression::Object(obj) => {
            for prop in &obj.properties {
                if let PropertyKey::Computed(key) = &prop.key {
                    for_each_identifier(key, f);
                }
                for_each_identifier(&prop.value, f);
            }
        }
        Expression::Binary(bin) => {
            for_each_identifier(&bin.left, f);
            for_each_identifier(&bin.right, f);
        }
        Expression::Unary(un) => for_each_identifier(&un.argument, f),
        Expression::Assignment(assign) => {
            match assign.left.as_ref() {
                Expression::Identifier(id) => f(&id.name, true),
                other => for_each_identifier(other, f),
            }
            for_each_identifier(&assign.right, f);
        }
        Expression::Update(update) => match update.argument.as_ref() {
            Expression::Identifier(id) => f(&id.name, true),
            other => for_each_identifier(other, f),
        },
        Expression::Call(call) => {
            for_each_identifier(&call.callee, f);
            for arg in &call.arguments {
                for_each_identifier(arg, f);
            }
        }
        Expression::New(new) => {
            for_each_identifier(&new.callee, f);
            for arg in &new.arguments {
                for_each_identifier(arg, f);
            }
        }
        Expression::Member(member) => {
            for_each_identifier(&member.object, f);
            if let MemberProperty::Expression(prop) = &member.property {
                for_each_identifier(prop, f);
            }
        }
        Expression::Conditional(cond) => {
            for_each_identifier(&cond.test, f);
            for_each_identifier(&cond.consequent, f);
            for_each_identifier(&cond.alternate, f);
        }
        Expression::Sequence(seq) => {
            for expr in &seq.expressions {
                for_each_identifier(expr, f);
            }
        }
        Expression::Class(class) => {
            if let Some(super_class) = &class.super_class {
                for_each_identifier(super_class, f);
            }
        }
        Expression::Spread(inner) => for_each_identifier(inner, f),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;

    fn collect(expr: &Expression) -> Vec<(String, bool)> {
        let mut seen = Vec::new();
        for_each_identifier(expr, &mut |name, is_assignment| {
            seen.push((name.to_string(), is_assignment))
        });
        seen
    }

    #[test]
    fn test_assignment_target_is_marked() {
        let expr = call(ident("f"), vec![ident("a"), assign(ident("a"), num(2.0))]);
        assert_eq!(
            collect(&expr),
            vec![
                ("f".to_string(), false),
                ("a".to_string(), false),
                ("a".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_nested_functions_are_skipped() {
        let expr = call(
            ident("g"),
            vec![function_expr(None, &["x"], vec![expr_stmt(ident("y"))])],
        );
        assert_eq!(collect(&expr), vec![("g".to_string(), false)]);
    }
}
