//! Tests for bytecode generation.

use super::*;
use crate::ast::builder::*;
use crate::compiler::bytecode::StaticErrorKind;
use crate::compiler::scope_analysis::analyze_program;

fn generate(program: &Program, fast_path: bool) -> (CodeBlockTree, Vec<ByteCodeBlock>) {
    let tree = analyze_program(program).expect("scope analysis should succeed");
    let blocks = generate_script(&tree, &program.body, fast_path).expect("codegen should succeed");
    (tree, blocks)
}

fn generate_err(program: &Program) -> Error {
    let tree = analyze_program(program).expect("scope analysis should succeed");
    match generate_script(&tree, &program.body, true) {
        Ok(_) => panic!("codegen should fail"),
        Err(err) => err,
    }
}

/// Bytecode of the `n`th child of the root block.
fn child_code(tree: &CodeBlockTree, blocks: &[ByteCodeBlock], n: usize) -> Vec<Instruction> {
    let id = tree.get(CodeBlockTree::new_root_id()).children()[n];
    blocks[id.index()].code.clone()
}

fn count(code: &[Instruction], pred: impl Fn(&Instruction) -> bool) -> usize {
    code.iter().filter(|i| pred(i)).count()
}

#[test]
fn test_global_completion_value() {
    let (_, blocks) = generate(&program(vec![expr_stmt(num(1.0)), expr_stmt(num(2.0))]), true);
    let code = &blocks[0].code;
    assert_eq!(code.last(), Some(&Instruction::End { src: 0 }));
    assert!(code.contains(&Instruction::LoadLiteral {
        dst: 0,
        value: Value::Number(2.0)
    }));
    assert_eq!(blocks[0].required_register_count, 1);
}

#[test]
fn test_global_var_is_stored_by_name() {
    let (_, blocks) = generate(&program(vec![var("x", Some(num(1.0)))]), true);
    assert!(blocks[0].code.iter().any(|i| matches!(
        i,
        Instruction::StoreByName { name, .. } if name == "x"
    )));
}

#[test]
fn test_parameters_live_in_stack_registers() {
    let (tree, blocks) = generate(
        &program(vec![function_decl("f", &["a"], vec![return_stmt(Some(ident("a")))])]),
        true,
    );
    let code = child_code(&tree, &blocks, 0);
    assert_eq!(
        code[0],
        Instruction::Move {
            src: stack_register(2),
            dst: 0
        }
    );
    assert_eq!(code[1], Instruction::ReturnFunction { src: 0 });
}

#[test]
fn test_function_declarations_are_hoisted() {
    let (_, blocks) = generate(
        &program(vec![
            expr_stmt(call(ident("f"), vec![])),
            function_decl("f", &[], vec![]),
        ]),
        true,
    );
    let code = &blocks[0].code;
    let create = code
        .iter()
        .position(|i| matches!(i, Instruction::CreateFunction { .. }))
        .unwrap();
    let call = code
        .iter()
        .position(|i| matches!(i, Instruction::CallFunction { .. }))
        .unwrap();
    assert!(create < call);
    assert!(matches!(
        &code[create + 1],
        Instruction::InitializeByName { name, .. } if name == "f"
    ));
}

#[test]
fn test_direct_register_arguments() {
    let source = program(vec![function_decl(
        "f",
        &["a", "b"],
        vec![expr_stmt(call(ident("g"), vec![ident("a"), ident("b")]))],
    )]);

    let (tree, blocks) = generate(&source, true);
    let code = child_code(&tree, &blocks, 0);
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::CallFunction { args_start, argc: 2, .. } if *args_start == stack_register(2)
    )));
    assert!(!code.iter().any(|i| matches!(i, Instruction::Move { .. })));

    let (tree, blocks) = generate(&source, false);
    let code = child_code(&tree, &blocks, 0);
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::CallFunction { args_start, argc: 2, .. } if !is_stack_register(*args_start)
    )));
}

#[test]
fn test_out_of_order_direct_registers_are_moved() {
    let (tree, blocks) = generate(
        &program(vec![function_decl(
            "f",
            &["a", "b"],
            vec![expr_stmt(call(ident("g"), vec![ident("b"), ident("a")]))],
        )]),
        true,
    );
    let code = child_code(&tree, &blocks, 0);
    let Some(Instruction::CallFunction { args_start, .. }) =
        code.iter().find(|i| matches!(i, Instruction::CallFunction { .. }))
    else {
        panic!("missing call");
    };
    assert!(!is_stack_register(*args_start));
    assert!(code.contains(&Instruction::Move {
        src: stack_register(3),
        dst: *args_start
    }));
}

#[test]
fn test_aliased_arguments_are_copied() {
    // g(a, a = 1)
    let (tree, blocks) = generate(
        &program(vec![function_decl(
            "f",
            &["a"],
            vec![expr_stmt(call(
                ident("g"),
                vec![ident("a"), assign(ident("a"), num(1.0))],
            ))],
        )]),
        true,
    );
    let code = child_code(&tree, &blocks, 0);
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::CallFunction { args_start, argc: 2, .. } if !is_stack_register(*args_start)
    )));
}

#[test]
fn test_captured_variable_uses_heap_slots() {
    let (tree, blocks) = generate(
        &program(vec![function_decl(
            "outer",
            &[],
            vec![
                var("a", Some(num(1.0))),
                return_stmt(Some(function_expr(None, &[], vec![return_stmt(Some(ident("a")))]))),
            ],
        )]),
        true,
    );
    let outer = tree.get(CodeBlockTree::new_root_id()).children()[0];
    let inner = tree.get(outer).children()[0];
    assert!(count(&blocks[outer.index()].code, |i| matches!(
        i,
        Instruction::StoreByHeapIndex { up_index: 0, .. }
    )) == 1);
    assert!(count(&blocks[inner.index()].code, |i| matches!(
        i,
        Instruction::LoadByHeapIndex { up_index: 0, .. }
    )) == 1);
}

#[test]
fn test_direct_eval_forces_named_access() {
    let (tree, blocks) = generate(
        &program(vec![function_decl(
            "f",
            &[],
            vec![
                var("x", Some(num(1.0))),
                expr_stmt(call(ident("eval"), vec![string("x")])),
            ],
        )]),
        true,
    );
    let code = child_code(&tree, &blocks, 0);
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::CallEvalFunction { argc: 1, in_with_scope: false, .. }
    )));
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::StoreByName { name, .. } if name == "x"
    )));
}

#[test]
fn test_calls_inside_with_resolve_receiver() {
    let (_, blocks) = generate(
        &program(vec![with_stmt(
            ident("o"),
            block(vec![expr_stmt(call(ident("g"), vec![num(1.0)]))]),
        )]),
        true,
    );
    let code = &blocks[0].code;
    assert!(code.iter().any(|i| matches!(i, Instruction::WithOperation { .. })));
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::CallFunctionInWithScope { name, argc: 1, .. } if name == "g"
    )));
    assert_eq!(count(code, |i| matches!(i, Instruction::WithExit)), 1);
}

#[test]
fn test_break_out_of_with_unwinds() {
    let (_, blocks) = generate(
        &program(vec![while_stmt(
            boolean(true),
            with_stmt(ident("o"), block(vec![Statement::Break])),
        )]),
        true,
    );
    assert_eq!(count(&blocks[0].code, |i| matches!(i, Instruction::WithExit)), 2);
}

#[test]
fn test_spread_arguments_use_side_table() {
    let (_, blocks) = generate(
        &program(vec![expr_stmt(call(
            ident("g"),
            vec![num(1.0), spread(ident("rest"))],
        ))]),
        true,
    );
    assert!(blocks[0].code.iter().any(|i| matches!(
        i,
        Instruction::CallFunction { spread: Some(0), argc: 2, .. }
    )));
    assert_eq!(blocks[0].literal_data[0].positions, vec![1]);
}

#[test]
fn test_return_at_top_level_is_rejected() {
    let err = generate_err(&program(vec![return_stmt(None)]));
    assert!(matches!(err, Error::SyntaxError(_)));
}

#[test]
fn test_unknown_label_is_rejected() {
    let err = generate_err(&program(vec![while_stmt(
        boolean(true),
        Statement::BreakLabel("missing".to_string()),
    )]));
    assert!(matches!(err, Error::SyntaxError(msg) if msg.contains("missing")));
}

#[test]
fn test_const_reassignment_in_strict_code_throws() {
    let (tree, blocks) = generate(
        &program(vec![
            expr_stmt(string("use strict")),
            function_decl(
                "f",
                &[],
                vec![
                    const_decl("c", num(1.0)),
                    expr_stmt(assign(ident("c"), num(2.0))),
                ],
            ),
        ]),
        true,
    );
    let code = child_code(&tree, &blocks, 0);
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::ThrowStaticError { kind: StaticErrorKind::TypeError, .. }
    )));
}

#[test]
fn test_class_members_are_defined() {
    let (tree, blocks) = generate(
        &program(vec![class_decl(
            "A",
            None,
            vec![
                method("m", &[], vec![]),
                getter("g", vec![return_stmt(Some(num(1.0)))]),
            ],
        )]),
        true,
    );
    let root = CodeBlockTree::new_root_id();
    assert_eq!(tree.get(root).children().len(), 3);
    let code = &blocks[0].code;
    assert_eq!(count(code, |i| matches!(i, Instruction::CreateFunction { .. })), 3);
    assert_eq!(count(code, |i| matches!(i, Instruction::ObjectDefineGetter { .. })), 1);
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::GetObjectPreComputedCase { name, .. } if name == "defineProperty"
    )));
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::InitializeByName { name, .. } if name == "A"
    )));
}

#[test]
fn test_derived_constructor_reaches_parent_through_callee() {
    let (tree, blocks) = generate(
        &program(vec![
            class_decl("A", None, vec![]),
            class_decl("B", Some(ident("A")), vec![]),
        ]),
        true,
    );
    let code = &blocks[0].code;
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::SetObjectPreComputedCase { name, .. } if name == "__proto__"
    )));
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::GetObjectPreComputedCase { name, .. } if name == "create"
    )));

    let constructor = child_code(&tree, &blocks, 1);
    assert!(constructor.iter().any(|i| matches!(
        i,
        Instruction::GetObjectPreComputedCase { object, name, .. }
            if *object == stack_register(1) && name == "__proto__"
    )));
}

#[test]
fn test_super_outside_method_is_rejected() {
    let err = generate_err(&program(vec![function_decl(
        "f",
        &[],
        vec![expr_stmt(super_member("x"))],
    )]));
    assert!(matches!(err, Error::SyntaxError(msg) if msg.contains("super")));
}

#[test]
#[should_panic(expected = "unclassified super")]
fn test_unclassified_super_is_an_engine_bug() {
    let bare = member(Expression::Super(SuperExpression {
        kind: SuperKind::Undefined,
    }), "x");
    let source = program(vec![class_decl(
        "A",
        None,
        vec![method("m", &[], vec![expr_stmt(bare)])],
    )]);
    let _ = generate_err(&source);
}

#[test]
fn test_for_of_protocol() {
    let (_, blocks) = generate(
        &program(vec![for_of("x", ident("items"), block(vec![]))]),
        true,
    );
    let code = &blocks[0].code;
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::LoadLiteral { value: Value::Symbol(_), .. }
    )));
    for name in ["next", "done", "value"] {
        assert!(
            code.iter().any(|i| matches!(
                i,
                Instruction::GetObjectPreComputedCase { name: n, .. } if n == name
            )),
            "missing {name}"
        );
    }
    assert!(code.iter().any(|i| matches!(
        i,
        Instruction::ThrowStaticError { kind: StaticErrorKind::TypeError, .. }
    )));
}

#[test]
fn test_try_finally_rethrows_once() {
    let source = program(vec![Statement::Try(TryStatement {
        block: BlockStatement {
            body: vec![expr_stmt(call(ident("g"), vec![]))],
        },
        handler: None,
        finalizer: Some(BlockStatement {
            body: vec![expr_stmt(call(ident("h"), vec![]))],
        }),
    })]);
    let (_, blocks) = generate(&source, true);
    let code = &blocks[0].code;
    assert_eq!(count(code, |i| matches!(i, Instruction::TryOperation { .. })), 1);
    assert_eq!(count(code, |i| matches!(i, Instruction::ThrowOperation { .. })), 1);
    assert_eq!(
        count(code, |i| matches!(i, Instruction::CallFunction { .. })),
        2,
        "finalizer is emitted once"
    );
}

/// One statement of every kind the global body can hold.
fn statement_zoo() -> Vec<Statement> {
    use BinaryOperator as B;
    vec![
        var("a", Some(binary(B::Add, num(1.0), call(ident("g"), vec![num(2.0), num(3.0)])))),
        let_decl("b", None),
        const_decl("c", object(vec![])),
        expr_stmt(assign(member(ident("c"), "x"), array(vec![num(1.0)]))),
        block(vec![expr_stmt(ident("a"))]),
        if_stmt(ident("a"), expr_stmt(num(1.0)), Some(expr_stmt(num(2.0)))),
        while_stmt(boolean(false), Statement::Break),
        Statement::DoWhile(DoWhileStatement {
            body: Box::new(Statement::Continue),
            test: boolean(false),
        }),
        Statement::For(ForStatement {
            init: Some(ForInit::Expression(assign(ident("b"), num(0.0)))),
            test: Some(binary(B::LessThan, ident("b"), num(2.0))),
            update: Some(assign(ident("b"), binary(B::Add, ident("b"), num(1.0)))),
            body: Box::new(Statement::Empty),
        }),
        for_in("k", ident("c"), block(vec![])),
        for_of("v", array(vec![num(1.0)]), expr_stmt(ident("v"))),
        Statement::Switch(SwitchStatement {
            discriminant: ident("a"),
            cases: vec![
                SwitchCase {
                    test: Some(num(1.0)),
                    consequent: vec![Statement::Break],
                },
                SwitchCase {
                    test: None,
                    consequent: vec![expr_stmt(num(0.0))],
                },
            ],
        }),
        Statement::Labeled(LabeledStatement {
            label: id("outer"),
            body: Box::new(while_stmt(boolean(true), Statement::BreakLabel("outer".to_string()))),
        }),
        Statement::Try(TryStatement {
            block: BlockStatement {
                body: vec![throw_stmt(num(1.0))],
            },
            handler: Some(CatchClause {
                param: Some(id("e")),
                body: BlockStatement {
                    body: vec![expr_stmt(ident("e"))],
                },
            }),
            finalizer: Some(BlockStatement {
                body: vec![expr_stmt(num(2.0))],
            }),
        }),
        with_stmt(ident("c"), expr_stmt(ident("x"))),
        class_decl("K", None, vec![method("m", &[], vec![return_stmt(Some(this()))])]),
        Statement::Empty,
    ]
}

#[test]
fn test_every_statement_kind_keeps_registers_balanced() {
    // The failing statement holds registers for `1 +` and the call when `super` is rejected.
    let failing = expr_stmt(binary(
        BinaryOperator::Add,
        num(1.0),
        call(ident("g"), vec![num(2.0), super_member("x")]),
    ));
    let mut statements = statement_zoo();
    statements.push(failing.clone());
    let source = program(statements);
    let tree = analyze_program(&source).expect("scope analysis should succeed");

    let mut shared = SharedState {
        tree: &tree,
        direct_register_fast_path: true,
        blocks: vec![None; tree.len()],
    };
    let mut ctx = ByteCodeGenerateContext::new(&mut shared, CodeBlockTree::new_root_id());
    let completion = ctx.get_register();
    ctx.completion = Some(completion);

    for stmt in statement_zoo() {
        let before = (ctx.register_depth(), ctx.base_register_count);
        ctx.generate_statement(&stmt).expect("statement should compile");
        assert_eq!((ctx.register_depth(), ctx.base_register_count), before, "{stmt:?}");
    }

    let before = (ctx.register_depth(), ctx.base_register_count);
    let err = ctx.generate_statement(&failing).unwrap_err();
    assert!(matches!(err, Error::SyntaxError(_)));
    assert_eq!((ctx.register_depth(), ctx.base_register_count), before);

    // Generation continues from the restored stack.
    ctx.generate_statement(&expr_stmt(num(4.0))).unwrap();
    assert_eq!((ctx.register_depth(), ctx.base_register_count), before);
    ctx.completion = None;
    ctx.give_up_register();
    assert_eq!(ctx.register_depth(), 0);
}
