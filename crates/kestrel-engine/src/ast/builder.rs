//! Terse constructors for building ASTs by hand.
//!
//! Hosts that bring their own parser never need these; they exist for
//! embedders generating code and for the test suites.

use super::*;

/// Creates an [`Identifier`].
pub fn id(name: &str) -> Identifier {
    Identifier {
        name: name.to_string(),
    }
}

/// Identifier reference.
pub fn ident(name: &str) -> Expression {
    Expression::Identifier(id(name))
}

/// Numeric literal.
pub fn num(n: f64) -> Expression {
    Expression::Literal(Literal::Number(n))
}

/// String literal.
pub fn string(s: &str) -> Expression {
    Expression::Literal(Literal::String(s.to_string()))
}

/// Boolean literal.
pub fn boolean(b: bool) -> Expression {
    Expression::Literal(Literal::Boolean(b))
}

/// `null`.
pub fn null() -> Expression {
    Expression::Literal(Literal::Null)
}

/// `undefined`.
pub fn undefined() -> Expression {
    Expression::Literal(Literal::Undefined)
}

/// `this`.
pub fn this() -> Expression {
    Expression::This
}

/// `callee(args...)`.
pub fn call(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::Call(CallExpression {
        callee: Box::new(callee),
        arguments,
    })
}

/// `new callee(args...)`.
pub fn new_expr(callee: Expression, arguments: Vec<Expression>) -> Expression {
    Expression::New(NewExpression {
        callee: Box::new(callee),
        arguments,
    })
}

/// `object.name`.
pub fn member(object: Expression, name: &str) -> Expression {
    Expression::Member(MemberExpression {
        object: Box::new(object),
        property: MemberProperty::Identifier(id(name)),
        computed: false,
    })
}

/// `object[property]`.
pub fn index(object: Expression, property: Expression) -> Expression {
    Expression::Member(MemberExpression {
        object: Box::new(object),
        property: MemberProperty::Expression(Box::new(property)),
        computed: true,
    })
}

/// `left = right`.
pub fn assign(left: Expression, right: Expression) -> Expression {
    assign_op(AssignmentOperator::Assign, left, right)
}

/// `left op= right`.
pub fn assign_op(operator: AssignmentOperator, left: Expression, right: Expression) -> Expression {
    Expression::Assignment(AssignmentExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// `left op right`.
pub fn binary(operator: BinaryOperator, left: Expression, right: Expression) -> Expression {
    Expression::Binary(BinaryExpression {
        operator,
        left: Box::new(left),
        right: Box::new(right),
    })
}

/// `op argument`.
pub fn unary(operator: UnaryOperator, argument: Expression) -> Expression {
    Expression::Unary(UnaryExpression {
        operator,
        argument: Box::new(argument),
    })
}

/// `++x`, `x--` and friends.
pub fn update(operator: UpdateOperator, prefix: bool, argument: Expression) -> Expression {
    Expression::Update(UpdateExpression {
        operator,
        argument: Box::new(argument),
        prefix,
    })
}

/// `test ? consequent : alternate`.
pub fn conditional(test: Expression, consequent: Expression, alternate: Expression) -> Expression {
    Expression::Conditional(ConditionalExpression {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
    })
}

/// `(a, b, c)`.
pub fn sequence(expressions: Vec<Expression>) -> Expression {
    Expression::Sequence(SequenceExpression { expressions })
}

/// `[a, b, c]`.
pub fn array(elements: Vec<Expression>) -> Expression {
    Expression::Array(ArrayExpression {
        elements: elements.into_iter().map(Some).collect(),
    })
}

/// `{ key: value, ... }` with identifier keys.
pub fn object(properties: Vec<(&str, Expression)>) -> Expression {
    Expression::Object(ObjectExpression {
        properties: properties
            .into_iter()
            .map(|(key, value)| Property {
                key: PropertyKey::Identifier(id(key)),
                value,
                shorthand: false,
            })
            .collect(),
    })
}

/// `...argument`.
pub fn spread(argument: Expression) -> Expression {
    Expression::Spread(Box::new(argument))
}

fn function_node(name: Option<&str>, params: &[&str], body: Vec<Statement>) -> FunctionExpression {
    FunctionExpression {
        id: name.map(id),
        params: params.iter().map(|p| id(p)).collect(),
        body,
        is_generator: false,
    }
}

/// `function name(params) { body }` as an expression.
pub fn function_expr(name: Option<&str>, params: &[&str], body: Vec<Statement>) -> Expression {
    Expression::Function(function_node(name, params, body))
}

/// `(params) => expr`.
pub fn arrow(params: &[&str], body: Expression) -> Expression {
    Expression::Arrow(ArrowFunctionExpression {
        params: params.iter().map(|p| id(p)).collect(),
        body: ArrowBody::Expression(Box::new(body)),
    })
}

/// `(params) => { body }`.
pub fn arrow_block(params: &[&str], body: Vec<Statement>) -> Expression {
    Expression::Arrow(ArrowFunctionExpression {
        params: params.iter().map(|p| id(p)).collect(),
        body: ArrowBody::Block(body),
    })
}

/// `super(args...)`.
pub fn super_call(arguments: Vec<Expression>) -> Expression {
    call(
        Expression::Super(SuperExpression {
            kind: SuperKind::Constructor,
        }),
        arguments,
    )
}

/// `super.name`.
pub fn super_member(name: &str) -> Expression {
    member(
        Expression::Super(SuperExpression {
            kind: SuperKind::Access,
        }),
        name,
    )
}

/// `super.name = value`.
pub fn super_assign(name: &str, value: Expression) -> Expression {
    assign(
        member(
            Expression::Super(SuperExpression {
                kind: SuperKind::Assign,
            }),
            name,
        ),
        value,
    )
}

fn member_definition(
    name: &str,
    kind: MethodKind,
    is_static: bool,
    params: &[&str],
    body: Vec<Statement>,
) -> MethodDefinition {
    MethodDefinition {
        key: PropertyKey::Identifier(id(name)),
        value: function_node(None, params, body),
        kind,
        is_static,
        is_default_constructor: false,
    }
}

/// `constructor(params) { body }`.
pub fn constructor(params: &[&str], body: Vec<Statement>) -> MethodDefinition {
    member_definition("constructor", MethodKind::Constructor, false, params, body)
}

/// `name(params) { body }`.
pub fn method(name: &str, params: &[&str], body: Vec<Statement>) -> MethodDefinition {
    member_definition(name, MethodKind::Method, false, params, body)
}

/// `static name(params) { body }`.
pub fn static_method(name: &str, params: &[&str], body: Vec<Statement>) -> MethodDefinition {
    member_definition(name, MethodKind::Method, true, params, body)
}

/// `get name() { body }`.
pub fn getter(name: &str, body: Vec<Statement>) -> MethodDefinition {
    member_definition(name, MethodKind::Get, false, &[], body)
}

/// `set name(param) { body }`.
pub fn setter(name: &str, param: &str, body: Vec<Statement>) -> MethodDefinition {
    member_definition(name, MethodKind::Set, false, &[param], body)
}

/// `class name extends super_class { methods }` as an expression.
pub fn class_expr(
    name: Option<&str>,
    super_class: Option<Expression>,
    methods: Vec<MethodDefinition>,
) -> Expression {
    Expression::Class(class_node(name, super_class, methods))
}

fn class_node(
    name: Option<&str>,
    super_class: Option<Expression>,
    methods: Vec<MethodDefinition>,
) -> ClassExpression {
    ClassExpression {
        id: name.map(id),
        super_class: super_class.map(Box::new),
        body: ClassBody { methods },
    }
}

/// `class name extends super_class { methods }`.
pub fn class_decl(
    name: &str,
    super_class: Option<Expression>,
    methods: Vec<MethodDefinition>,
) -> Statement {
    Statement::ClassDeclaration(ClassDeclaration {
        id: id(name),
        class: class_node(Some(name), super_class, methods),
    })
}

/// Expression statement.
pub fn expr_stmt(expression: Expression) -> Statement {
    Statement::Expression(ExpressionStatement { expression })
}

fn declaration(kind: VariableKind, name: &str, init: Option<Expression>) -> VariableDeclaration {
    VariableDeclaration {
        kind,
        declarations: vec![VariableDeclarator { id: id(name), init }],
    }
}

/// `var name = init;`.
pub fn var(name: &str, init: Option<Expression>) -> Statement {
    Statement::VariableDeclaration(declaration(VariableKind::Var, name, init))
}

/// `let name = init;`.
pub fn let_decl(name: &str, init: Option<Expression>) -> Statement {
    Statement::VariableDeclaration(declaration(VariableKind::Let, name, init))
}

/// `const name = init;`.
pub fn const_decl(name: &str, init: Expression) -> Statement {
    Statement::VariableDeclaration(declaration(VariableKind::Const, name, Some(init)))
}

/// `function name(params) { body }`.
pub fn function_decl(name: &str, params: &[&str], body: Vec<Statement>) -> Statement {
    Statement::FunctionDeclaration(FunctionDeclaration {
        id: id(name),
        params: params.iter().map(|p| id(p)).collect(),
        body,
        is_generator: false,
    })
}

/// `return argument;`.
pub fn return_stmt(argument: Option<Expression>) -> Statement {
    Statement::Return(ReturnStatement { argument })
}

/// `if (test) consequent else alternate`.
pub fn if_stmt(test: Expression, consequent: Statement, alternate: Option<Statement>) -> Statement {
    Statement::If(IfStatement {
        test,
        consequent: Box::new(consequent),
        alternate: alternate.map(Box::new),
    })
}

/// `while (test) body`.
pub fn while_stmt(test: Expression, body: Statement) -> Statement {
    Statement::While(WhileStatement {
        test,
        body: Box::new(body),
    })
}

/// `{ body }`.
pub fn block(body: Vec<Statement>) -> Statement {
    Statement::Block(BlockStatement { body })
}

/// `for (var name of right) body`.
pub fn for_of(name: &str, right: Expression, body: Statement) -> Statement {
    Statement::ForOf(ForOfStatement {
        left: ForInLeft::Declaration(Box::new(declaration(VariableKind::Var, name, None))),
        right,
        body: Box::new(body),
    })
}

/// `for (var name in right) body`.
pub fn for_in(name: &str, right: Expression, body: Statement) -> Statement {
    Statement::ForIn(ForInStatement {
        left: ForInLeft::Declaration(Box::new(declaration(VariableKind::Var, name, None))),
        right,
        body: Box::new(body),
    })
}

/// `throw argument;`.
pub fn throw_stmt(argument: Expression) -> Statement {
    Statement::Throw(ThrowStatement { argument })
}

/// `try { block } catch (param) { handler }`.
pub fn try_catch(block: Vec<Statement>, param: &str, handler: Vec<Statement>) -> Statement {
    Statement::Try(TryStatement {
        block: BlockStatement { body: block },
        handler: Some(CatchClause {
            param: Some(id(param)),
            body: BlockStatement { body: handler },
        }),
        finalizer: None,
    })
}

/// `with (object) body`.
pub fn with_stmt(object: Expression, body: Statement) -> Statement {
    Statement::With(WithStatement {
        object,
        body: Box::new(body),
    })
}

/// Builds a [`Program`].
pub fn program(body: Vec<Statement>) -> Program {
    Program::new(body)
}
