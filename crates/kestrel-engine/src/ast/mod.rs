//! Syntax tree consumed by scope analysis and code generation.
//!
//! Node families are closed enums matched exhaustively by the compiler, so
//! adding a node kind is a compile error at every pass that must handle it.
//! The engine does not parse source text itself; hosts hand it a [`Program`]
//! built by their own parser or with the helpers in [`builder`].

#![allow(missing_docs)]

pub mod builder;
pub mod visit;

/// Top-level statement list of a script or an eval unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub body: Vec<Statement>,
}

impl Program {
    /// Creates a program from its statements.
    pub fn new(body: Vec<Statement>) -> Self {
        Self { body }
    }

    /// Returns true if the program starts with a `"use strict"` directive.
    pub fn is_strict(&self) -> bool {
        has_use_strict_directive(&self.body)
    }
}

/// Returns true if the directive prologue of `body` contains `"use strict"`.
pub fn has_use_strict_directive(body: &[Statement]) -> bool {
    for stmt in body {
        match stmt {
            Statement::Expression(ExpressionStatement {
                expression: Expression::Literal(Literal::String(s)),
            }) => {
                if s == "use strict" {
                    return true;
                }
            }
            _ => return false,
        }
    }
    false
}

/// A binding or reference name.
#[derive(Debug, Clone, PartialEq)]
pub struct Identifier {
    pub name: String,
}

/// Statements. Each variant maps onto one generator in
/// `compiler::codegen::statements`.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    VariableDeclaration(VariableDeclaration),
    /// Hoisted: created before the first statement of its body runs
    FunctionDeclaration(FunctionDeclaration),
    /// Compiled as an initializing store of the class expression
    ClassDeclaration(ClassDeclaration),
    /// Its value becomes the completion value at global and eval level
    Expression(ExpressionStatement),
    Block(BlockStatement),
    If(IfStatement),
    Switch(SwitchStatement),
    While(WhileStatement),
    DoWhile(DoWhileStatement),
    For(ForStatement),
    ForIn(ForInStatement),
    /// Lowered to the full iterator protocol
    ForOf(ForOfStatement),
    /// Rejected at top level
    Return(ReturnStatement),
    Break,
    BreakLabel(String),
    Continue,
    ContinueLabel(String),
    Throw(ThrowStatement),
    Try(TryStatement),
    /// Forces named variable storage; a syntax error in strict code
    With(WithStatement),
    Labeled(LabeledStatement),
    /// Compiles to nothing
    Debugger,
    Empty,
}

/// Declaration keyword. `let` and `const` bind at function scope here;
/// `const` only adds immutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableKind {
    Var,
    Let,
    Const,
}

/// `var` / `let` / `const` with one or more declarators.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclaration {
    pub kind: VariableKind,
    pub declarations: Vec<VariableDeclarator>,
}

/// `name = init` inside a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDeclarator {
    pub id: Identifier,
    pub init: Option<Expression>,
}

/// `function name(params) { body }` in statement position.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub id: Identifier,
    pub params: Vec<Identifier>,
    pub body: Vec<Statement>,
    /// Marks the block as yielding; code generation then refuses it
    pub is_generator: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionStatement {
    pub expression: Expression,
}

/// `{ ... }`. Introduces no scope of its own.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockStatement {
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStatement {
    pub test: Expression,
    pub consequent: Box<Statement>,
    pub alternate: Option<Box<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhileStatement {
    pub test: Expression,
    pub body: Box<Statement>,
}

/// `for (init; test; update) body`. Every clause may be absent.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStatement {
    pub init: Option<ForInit>,
    pub test: Option<Expression>,
    pub update: Option<Expression>,
    pub body: Box<Statement>,
}

/// First clause of a `for` statement.
#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Declaration(Box<VariableDeclaration>),
    Expression(Expression),
}

/// Cases are compared with strict equality in source order.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchStatement {
    pub discriminant: Expression,
    pub cases: Vec<SwitchCase>,
}

/// One `case test:` arm, or `default:` when `test` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub test: Option<Expression>,
    pub consequent: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DoWhileStatement {
    pub body: Box<Statement>,
    pub test: Expression,
}

/// `for (left in right) body`. Walks the keys the object enumerates,
/// which for a proxy are its target's keys.
#[derive(Debug, Clone, PartialEq)]
pub struct ForInStatement {
    pub left: ForInLeft,
    pub right: Expression,
    pub body: Box<Statement>,
}

/// `for (left of right) body`. `right` must be iterable; a nullish value is
/// a `TypeError` at run time.
#[derive(Debug, Clone, PartialEq)]
pub struct ForOfStatement {
    pub left: ForInLeft,
    pub right: Expression,
    pub body: Box<Statement>,
}

/// Binding target of `for-in` and `for-of`.
#[derive(Debug, Clone, PartialEq)]
pub enum ForInLeft {
    Declaration(Box<VariableDeclaration>),
    /// An identifier or member expression assigned on every iteration
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStatement {
    pub argument: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThrowStatement {
    pub argument: Expression,
}

/// `try` with a `catch` clause, a `finally` block, or both.
#[derive(Debug, Clone, PartialEq)]
pub struct TryStatement {
    pub block: BlockStatement,
    pub handler: Option<CatchClause>,
    pub finalizer: Option<BlockStatement>,
}

/// `catch (param) body`. A function containing one keeps all of its
/// variables in named storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchClause {
    pub param: Option<Identifier>,
    pub body: BlockStatement,
}

/// `with (object) body`. Names inside `body` resolve against `object` first.
#[derive(Debug, Clone, PartialEq)]
pub struct WithStatement {
    pub object: Expression,
    pub body: Box<Statement>,
}

/// `label: body`, the target of `break label` / `continue label`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledStatement {
    pub label: Identifier,
    pub body: Box<Statement>,
}

/// Expressions. Generators in `compiler::codegen::expressions` write each
/// one into a destination register.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    /// Resolved to a stack slot, a heap slot or a named lookup
    Identifier(Identifier),
    This,
    Array(ArrayExpression),
    Object(ObjectExpression),
    Binary(BinaryExpression),
    Unary(UnaryExpression),
    Assignment(AssignmentExpression),
    /// `eval(...)` with a plain identifier callee is a direct eval
    Call(CallExpression),
    Member(MemberExpression),
    Conditional(ConditionalExpression),
    /// Each one becomes a child code block
    Function(FunctionExpression),
    /// Shares `this` and `arguments` with the nearest non-arrow function
    Arrow(ArrowFunctionExpression),
    New(NewExpression),
    Update(UpdateExpression),
    Sequence(SequenceExpression),
    Class(ClassExpression),
    Super(SuperExpression),
    /// Spread element `...expr` (call arguments only)
    Spread(Box<Expression>),
}

/// Literal constants, stored in the literal table of the code block.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Undefined,
}

/// `[a, , b]`. `None` is a hole.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayExpression {
    pub elements: Vec<Option<Expression>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ObjectExpression {
    pub properties: Vec<Property>,
}

/// `key: value` in an object literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub key: PropertyKey,
    pub value: Expression,
    /// `{ x }` rather than `{ x: x }`
    pub shorthand: bool,
}

/// Key of an object-literal property or class member. Numeric literal keys
/// are converted to their string form; computed class keys are rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyKey {
    Identifier(Identifier),
    Computed(Box<Expression>),
    Literal(Literal),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpression {
    pub operator: BinaryOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

/// Binary operators. The logical ones short-circuit through jumps instead
/// of a binary instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Exponent,
    // Comparison
    Equal,
    NotEqual,
    StrictEqual,
    StrictNotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    // Logical
    LogicalAnd,
    LogicalOr,
    NullishCoalescing,
    // Bitwise
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    // Other
    In,
    InstanceOf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpression {
    pub operator: UnaryOperator,
    pub argument: Box<Expression>,
}

/// Prefix operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Minus,
    Plus,
    LogicalNot,
    BitwiseNot,
    /// Does not throw for unresolvable names
    Typeof,
    Void,
    /// On a bare identifier: `false` in sloppy code, a syntax error in strict code
    Delete,
}

/// `left op= right`. `left` is an identifier or a member expression.
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentExpression {
    pub operator: AssignmentOperator,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
}

/// Assignment operators. Compound forms read, combine and write back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentOperator {
    Assign,
    AddAssign,
    SubtractAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
    ExponentAssign,
    LeftShiftAssign,
    RightShiftAssign,
    UnsignedRightShiftAssign,
    BitwiseAndAssign,
    BitwiseOrAssign,
    BitwiseXorAssign,
    LogicalAndAssign,
    LogicalOrAssign,
    NullishCoalescingAssign,
}

/// `callee(arguments)`. A member callee supplies the receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
}

/// `object.name` or `object[expr]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberExpression {
    pub object: Box<Expression>,
    pub property: MemberProperty,
    /// Bracket notation
    pub computed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MemberProperty {
    Identifier(Identifier),
    Expression(Box<Expression>),
}

/// `test ? consequent : alternate`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalExpression {
    pub test: Box<Expression>,
    pub consequent: Box<Expression>,
    pub alternate: Box<Expression>,
}

/// `function name?(params) { body }`. A name is bound immutably inside
/// the function unless the body declares it again.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionExpression {
    pub id: Option<Identifier>,
    pub params: Vec<Identifier>,
    pub body: Vec<Statement>,
    pub is_generator: bool,
}

/// `(params) => body`. Never a constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrowFunctionExpression {
    pub params: Vec<Identifier>,
    pub body: ArrowBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrowBody {
    /// `=> expr`, returned implicitly
    Expression(Box<Expression>),
    Block(Vec<Statement>),
}

/// `new callee(arguments)`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewExpression {
    pub callee: Box<Expression>,
    pub arguments: Vec<Expression>,
}

/// `++x`, `x--` and friends.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    pub operator: UpdateOperator,
    pub argument: Box<Expression>,
    /// The new value is the result rather than the old one
    pub prefix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperator {
    Increment,
    Decrement,
}

/// Comma operator; the value is that of the last expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceExpression {
    pub expressions: Vec<Expression>,
}

/// A class declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDeclaration {
    /// The class name
    pub id: Identifier,
    /// The class definition
    pub class: ClassExpression,
}

/// A class expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassExpression {
    /// Optional class name
    pub id: Option<Identifier>,
    /// The `extends` clause
    pub super_class: Option<Box<Expression>>,
    /// The class body
    pub body: ClassBody,
}

impl ClassExpression {
    /// The heritage expression that actually names the superclass.
    ///
    /// For `class A extends (a, b, C) {}` only `C` is the superclass; the
    /// leading elements are evaluated for their side effects.
    pub fn effective_super_class(&self) -> Option<&Expression> {
        match self.super_class.as_deref()? {
            Expression::Sequence(seq) => seq.expressions.last(),
            other => Some(other),
        }
    }

    /// Returns true if the heritage clause is the literal `null`.
    pub fn extends_null(&self) -> bool {
        matches!(self.effective_super_class(), Some(Expression::Literal(Literal::Null)))
    }

    /// The class members in generation order.
    ///
    /// When the body declares no constructor, an empty one is synthesized and
    /// placed first. Derived classes get one that forwards its arguments to
    /// the parent constructor.
    pub fn members_with_constructor(&self) -> Vec<std::borrow::Cow<'_, MethodDefinition>> {
        use std::borrow::Cow;

        let mut members: Vec<Cow<'_, MethodDefinition>> =
            self.body.methods.iter().map(Cow::Borrowed).collect();
        if !self.body.methods.iter().any(|m| m.kind == MethodKind::Constructor) {
            members.insert(0, Cow::Owned(self.default_constructor()));
        }
        members
    }

    fn default_constructor(&self) -> MethodDefinition {
        let body = if self.super_class.is_some() {
            vec![Statement::Expression(ExpressionStatement {
                expression: Expression::Call(CallExpression {
                    callee: Box::new(Expression::Super(SuperExpression {
                        kind: SuperKind::Constructor,
                    })),
                    arguments: vec![Expression::Spread(Box::new(Expression::Identifier(
                        Identifier {
                            name: "arguments".to_string(),
                        },
                    )))],
                }),
            })]
        } else {
            Vec::new()
        };
        MethodDefinition {
            key: PropertyKey::Identifier(Identifier {
                name: "constructor".to_string(),
            }),
            value: FunctionExpression {
                id: None,
                params: Vec::new(),
                body,
                is_generator: false,
            },
            kind: MethodKind::Constructor,
            is_static: false,
            is_default_constructor: true,
        }
    }
}

/// The body of a class.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassBody {
    /// Methods, accessors and the constructor in source order
    pub methods: Vec<MethodDefinition>,
}

/// A class member definition.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDefinition {
    /// The member key
    pub key: PropertyKey,
    /// The function implementing the member
    pub value: FunctionExpression,
    /// What kind of member this is
    pub kind: MethodKind,
    /// Whether the member lives on the constructor rather than the prototype
    pub is_static: bool,
    /// Whether this constructor was synthesized for a class without one
    pub is_default_constructor: bool,
}

/// Class member kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// The class constructor
    Constructor,
    /// A plain method
    Method,
    /// A getter
    Get,
    /// A setter
    Set,
}

/// A `super` reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperExpression {
    /// How the reference is used
    pub kind: SuperKind,
}

/// How a `super` reference is used, as classified by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuperKind {
    /// Not classified; reaching code generation with this is an engine bug
    #[default]
    Undefined,
    /// `super(...)` inside a constructor
    Constructor,
    /// `super.x` read
    Access,
    /// `super.x = v` write
    Assign,
}
