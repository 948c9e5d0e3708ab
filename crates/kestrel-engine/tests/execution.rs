//! End-to-end execution tests: programs built with the AST builder are
//! compiled and run through the public [`Engine`] API.

use std::collections::HashMap;

use kestrel_engine::ast::builder::*;
use kestrel_engine::ast::{
    BinaryOperator as B, BlockStatement, Expression, Program, Statement, TryStatement, UnaryOperator,
};
use kestrel_engine::{Engine, Error, SourceParser, Value};

/// Honors `RUST_LOG` when debugging a failing test.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn run(body: Vec<Statement>) -> Result<Value, Error> {
    init_tracing();
    Engine::new().run(&program(body))
}

fn add(left: Expression, right: Expression) -> Expression {
    binary(B::Add, left, right)
}

fn try_finally(block: Vec<Statement>, finalizer: Vec<Statement>) -> Statement {
    Statement::Try(TryStatement {
        block: BlockStatement { body: block },
        handler: None,
        finalizer: Some(BlockStatement { body: finalizer }),
    })
}

/// Maps known source strings to prebuilt programs.
struct CannedParser(HashMap<&'static str, Program>);

impl SourceParser for CannedParser {
    fn parse(&self, source: &str) -> Result<Program, Error> {
        self.0
            .get(source)
            .cloned()
            .ok_or_else(|| Error::syntax_error(format!("unexpected source {source:?}")))
    }
}

// ============================================================================
// Functions and scopes
// ============================================================================

#[test]
fn test_duplicate_parameters_last_wins() {
    // function f(a, a) { return a; } f(1, 2)
    let result = run(vec![
        function_decl("f", &["a", "a"], vec![return_stmt(Some(ident("a")))]),
        expr_stmt(call(ident("f"), vec![num(1.0), num(2.0)])),
    ]);
    assert_eq!(result.unwrap(), Value::Number(2.0));
}

#[test]
fn test_arguments_object_and_missing_parameters() {
    // function f(a, b) { return arguments.length + (typeof b); } f(1)
    let result = run(vec![
        function_decl(
            "f",
            &["a", "b"],
            vec![return_stmt(Some(add(
                member(ident("arguments"), "length"),
                unary(UnaryOperator::Typeof, ident("b")),
            )))],
        ),
        expr_stmt(call(ident("f"), vec![num(1.0)])),
    ]);
    assert_eq!(result.unwrap(), Value::from("1undefined"));
}

#[test]
fn test_counter_closure_keeps_state() {
    // function counter() { var n = 0; return function () { n = n + 1; return n; }; }
    // var c = counter(); c(); c()
    let result = run(vec![
        function_decl(
            "counter",
            &[],
            vec![
                var("n", Some(num(0.0))),
                return_stmt(Some(function_expr(
                    None,
                    &[],
                    vec![
                        expr_stmt(assign(ident("n"), add(ident("n"), num(1.0)))),
                        return_stmt(Some(ident("n"))),
                    ],
                ))),
            ],
        ),
        var("c", Some(call(ident("counter"), vec![]))),
        expr_stmt(call(ident("c"), vec![])),
        expr_stmt(call(ident("c"), vec![])),
    ]);
    assert_eq!(result.unwrap(), Value::Number(2.0));
}

#[test]
fn test_arrow_captures_method_this() {
    // var o = { v: 7, m: function () { var g = () => this.v; return g(); } }; o.m()
    let result = run(vec![
        var(
            "o",
            Some(object(vec![
                ("v", num(7.0)),
                (
                    "m",
                    function_expr(
                        None,
                        &[],
                        vec![
                            var("g", Some(arrow(&[], member(this(), "v")))),
                            return_stmt(Some(call(ident("g"), vec![]))),
                        ],
                    ),
                ),
            ])),
        ),
        expr_stmt(call(member(ident("o"), "m"), vec![])),
    ]);
    assert_eq!(result.unwrap(), Value::Number(7.0));
}

#[test]
fn test_spread_arguments() {
    // function f(a, b, c) { return a + b + c; } f(...[1, 2], 3)
    let result = run(vec![
        function_decl(
            "f",
            &["a", "b", "c"],
            vec![return_stmt(Some(add(add(ident("a"), ident("b")), ident("c"))))],
        ),
        expr_stmt(call(
            ident("f"),
            vec![spread(array(vec![num(1.0), num(2.0)])), num(3.0)],
        )),
    ]);
    assert_eq!(result.unwrap(), Value::Number(6.0));
}

// ============================================================================
// Iteration
// ============================================================================

#[test]
fn test_for_of_sums_array() {
    // var sum = 0; for (var x of [10, 20]) sum = sum + x; sum
    let result = run(vec![
        var("sum", Some(num(0.0))),
        for_of(
            "x",
            array(vec![num(10.0), num(20.0)]),
            expr_stmt(assign(ident("sum"), add(ident("sum"), ident("x")))),
        ),
        expr_stmt(ident("sum")),
    ]);
    assert_eq!(result.unwrap(), Value::Number(30.0));
}

#[test]
fn test_for_of_non_iterable_is_type_error() {
    let err = run(vec![for_of("x", num(1.0), block(vec![]))]).unwrap_err();
    assert!(err.is_type_error(), "{err}");
}

#[test]
fn test_for_in_visits_enumerable_keys_in_order() {
    // var s = ""; for (var k in { a: 1, b: 2 }) s = s + k; s
    let result = run(vec![
        var("s", Some(string(""))),
        for_in(
            "k",
            object(vec![("a", num(1.0)), ("b", num(2.0))]),
            expr_stmt(assign(ident("s"), add(ident("s"), ident("k")))),
        ),
        expr_stmt(ident("s")),
    ]);
    assert_eq!(result.unwrap(), Value::from("ab"));
}

// ============================================================================
// Exceptions
// ============================================================================

#[test]
fn test_finally_runs_and_rethrows() {
    // var log = 0;
    // try { try { throw 1; } finally { log = log + 1; } } catch (e) { log = log + e * 10; }
    // log
    let result = run(vec![
        var("log", Some(num(0.0))),
        try_catch(
            vec![try_finally(
                vec![throw_stmt(num(1.0))],
                vec![expr_stmt(assign(ident("log"), add(ident("log"), num(1.0))))],
            )],
            "e",
            vec![expr_stmt(assign(
                ident("log"),
                add(ident("log"), binary(B::Multiply, ident("e"), num(10.0))),
            ))],
        ),
        expr_stmt(ident("log")),
    ]);
    assert_eq!(result.unwrap(), Value::Number(11.0));
}

#[test]
fn test_finally_runs_on_normal_completion() {
    let result = run(vec![
        var("log", Some(string(""))),
        try_finally(
            vec![expr_stmt(assign(ident("log"), add(ident("log"), string("t"))))],
            vec![expr_stmt(assign(ident("log"), add(ident("log"), string("f"))))],
        ),
        expr_stmt(ident("log")),
    ]);
    assert_eq!(result.unwrap(), Value::from("tf"));
}

#[test]
fn test_engine_errors_are_catchable_objects() {
    // var r; try { null.x; } catch (e) { r = e instanceof TypeError; } r
    let result = run(vec![
        var("r", None),
        try_catch(
            vec![expr_stmt(member(null(), "x"))],
            "e",
            vec![expr_stmt(assign(
                ident("r"),
                binary(B::InstanceOf, ident("e"), ident("TypeError")),
            ))],
        ),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result.unwrap(), Value::Boolean(true));
}

// ============================================================================
// with
// ============================================================================

#[test]
fn test_with_reads_and_writes_object_properties() {
    // var o = { x: 1 }; var r; with (o) { r = x; x = 5; } r + o.x
    let result = run(vec![
        var("o", Some(object(vec![("x", num(1.0))]))),
        var("r", None),
        with_stmt(
            ident("o"),
            block(vec![
                expr_stmt(assign(ident("r"), ident("x"))),
                expr_stmt(assign(ident("x"), num(5.0))),
            ]),
        ),
        expr_stmt(add(ident("r"), member(ident("o"), "x"))),
    ]);
    assert_eq!(result.unwrap(), Value::Number(6.0));
}

#[test]
fn test_call_inside_with_uses_object_as_receiver() {
    // var o = { f: function () { return this === o; } }; var r; with (o) { r = f(); } r
    let result = run(vec![
        var(
            "o",
            Some(object(vec![(
                "f",
                function_expr(None, &[], vec![return_stmt(Some(binary(B::StrictEqual, this(), ident("o"))))]),
            )])),
        ),
        var("r", None),
        with_stmt(ident("o"), expr_stmt(assign(ident("r"), call(ident("f"), vec![])))),
        expr_stmt(ident("r")),
    ]);
    assert_eq!(result.unwrap(), Value::Boolean(true));
}

// ============================================================================
// Classes
// ============================================================================

fn class_hierarchy() -> Vec<Statement> {
    // class A {
    //     constructor(x) { this.x = x; }
    //     get double() { return this.x * 2; }
    //     greet() { return "A"; }
    // }
    // class B extends A {
    //     constructor(x) { super(x + 1); }
    //     greet() { return super.greet() + "B"; }
    //     static make() { return new B(0); }
    // }
    vec![
        class_decl(
            "A",
            None,
            vec![
                constructor(&["x"], vec![expr_stmt(assign(member(this(), "x"), ident("x")))]),
                getter("double", vec![return_stmt(Some(binary(B::Multiply, member(this(), "x"), num(2.0))))]),
                method("greet", &[], vec![return_stmt(Some(string("A")))]),
            ],
        ),
        class_decl(
            "B",
            Some(ident("A")),
            vec![
                constructor(&["x"], vec![expr_stmt(super_call(vec![add(ident("x"), num(1.0))]))]),
                method(
                    "greet",
                    &[],
                    vec![return_stmt(Some(add(call(super_member("greet"), vec![]), string("B"))))],
                ),
                static_method("make", &[], vec![return_stmt(Some(new_expr(ident("B"), vec![num(0.0)])))]),
            ],
        ),
    ]
}

#[test]
fn test_derived_class_runs_parent_constructor() {
    let mut body = class_hierarchy();
    body.push(var("b", Some(new_expr(ident("B"), vec![num(1.0)]))));
    body.push(expr_stmt(member(ident("b"), "double")));
    assert_eq!(run(body).unwrap(), Value::Number(4.0));
}

#[test]
fn test_super_method_call_and_instanceof() {
    let mut body = class_hierarchy();
    body.push(var("b", Some(call(member(ident("B"), "make"), vec![]))));
    body.push(expr_stmt(add(
        call(member(ident("b"), "greet"), vec![]),
        binary(B::InstanceOf, ident("b"), ident("A")),
    )));
    assert_eq!(run(body).unwrap(), Value::from("ABtrue"));
}

#[test]
fn test_class_methods_are_not_enumerable() {
    // var s = ""; for (var k in new A(1)) s = s + k; s
    let mut body = class_hierarchy();
    body.push(var("s", Some(string(""))));
    body.push(for_in(
        "k",
        new_expr(ident("A"), vec![num(1.0)]),
        expr_stmt(assign(ident("s"), add(ident("s"), ident("k")))),
    ));
    body.push(expr_stmt(ident("s")));
    assert_eq!(run(body).unwrap(), Value::from("x"));
}

// ============================================================================
// eval
// ============================================================================

fn eval_engine() -> Engine {
    let mut canned = HashMap::new();
    canned.insert("x + 1", program(vec![expr_stmt(add(ident("x"), num(1.0)))]));
    canned.insert("x", program(vec![expr_stmt(ident("x"))]));
    init_tracing();
    let mut engine = Engine::new();
    engine.set_source_parser(CannedParser(canned));
    engine
}

#[test]
fn test_direct_eval_sees_function_locals() {
    // function f() { var x = 41; return eval("x + 1"); } f()
    let result = eval_engine().run(&program(vec![
        function_decl(
            "f",
            &[],
            vec![
                var("x", Some(num(41.0))),
                return_stmt(Some(call(ident("eval"), vec![string("x + 1")]))),
            ],
        ),
        expr_stmt(call(ident("f"), vec![])),
    ]));
    assert_eq!(result.unwrap(), Value::Number(42.0));
}

#[test]
fn test_indirect_eval_uses_global_scope() {
    // var x = 1; function g() { var x = 2; var e = eval; return e("x"); } g()
    let result = eval_engine().run(&program(vec![
        var("x", Some(num(1.0))),
        function_decl(
            "g",
            &[],
            vec![
                var("x", Some(num(2.0))),
                var("e", Some(ident("eval"))),
                return_stmt(Some(call(ident("e"), vec![string("x")]))),
            ],
        ),
        expr_stmt(call(ident("g"), vec![])),
    ]));
    assert_eq!(result.unwrap(), Value::Number(1.0));
}

#[test]
fn test_eval_without_parser_is_syntax_error() {
    let err = run(vec![expr_stmt(call(ident("eval"), vec![string("1")]))]).unwrap_err();
    assert!(matches!(err, Error::SyntaxError(_)), "{err}");
    let passthrough = run(vec![expr_stmt(call(ident("eval"), vec![num(5.0)]))]).unwrap();
    assert_eq!(passthrough, Value::Number(5.0));
}

// ============================================================================
// Proxy
// ============================================================================

#[test]
fn test_revoke_is_idempotent() {
    // var r = Proxy.revocable({}, {}); r.revoke(); r.revoke(); r.proxy.x
    let err = run(vec![
        var(
            "r",
            Some(call(member(ident("Proxy"), "revocable"), vec![object(vec![]), object(vec![])])),
        ),
        expr_stmt(call(member(ident("r"), "revoke"), vec![])),
        expr_stmt(call(member(ident("r"), "revoke"), vec![])),
        expr_stmt(member(member(ident("r"), "proxy"), "x")),
    ])
    .unwrap_err();
    assert!(err.is_type_error(), "{err}");
}

#[test]
fn test_get_trap_cannot_lie_about_frozen_property() {
    // var t = {}; Object.defineProperty(t, "x", { value: 1 });
    // new Proxy(t, { get: function () { return 2; } }).x
    let err = run(vec![
        var("t", Some(object(vec![]))),
        expr_stmt(call(
            member(ident("Object"), "defineProperty"),
            vec![ident("t"), string("x"), object(vec![("value", num(1.0))])],
        )),
        expr_stmt(member(
            new_expr(
                ident("Proxy"),
                vec![
                    ident("t"),
                    object(vec![("get", function_expr(None, &[], vec![return_stmt(Some(num(2.0)))]))]),
                ],
            ),
            "x",
        )),
    ])
    .unwrap_err();
    assert!(err.is_type_error(), "{err}");
}

#[test]
fn test_is_extensible_trap_must_agree_with_target() {
    // Object.isExtensible(new Proxy({}, { isExtensible: function () { return false; } }))
    let err = run(vec![expr_stmt(call(
        member(ident("Object"), "isExtensible"),
        vec![new_expr(
            ident("Proxy"),
            vec![
                object(vec![]),
                object(vec![(
                    "isExtensible",
                    function_expr(None, &[], vec![return_stmt(Some(boolean(false)))]),
                )]),
            ],
        )],
    ))])
    .unwrap_err();
    assert!(err.is_type_error(), "{err}");
}

#[test]
fn test_get_trap_sees_target_and_key() {
    // var p = new Proxy({ a: 1 }, { get: function (t, k) { return k + t.a; } }); p.hello
    let result = run(vec![
        var(
            "p",
            Some(new_expr(
                ident("Proxy"),
                vec![
                    object(vec![("a", num(1.0))]),
                    object(vec![(
                        "get",
                        function_expr(
                            None,
                            &["t", "k"],
                            vec![return_stmt(Some(add(ident("k"), member(ident("t"), "a"))))],
                        ),
                    )]),
                ],
            )),
        ),
        expr_stmt(member(ident("p"), "hello")),
    ]);
    assert_eq!(result.unwrap(), Value::from("hello1"));
}

#[test]
fn test_proxy_without_new_is_type_error() {
    let err = run(vec![expr_stmt(call(ident("Proxy"), vec![object(vec![]), object(vec![])]))]).unwrap_err();
    assert!(matches!(err, Error::TypeError(ref m) if m == "Constructor Proxy requires 'new'"));
}
