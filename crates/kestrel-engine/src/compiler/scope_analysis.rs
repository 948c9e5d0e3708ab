//! Builds the code block tree for a program.
//!
//! Analysis runs in three passes:
//! 1. walk the AST once per function unit, recording declared names, used
//!    names and eval/with/catch/yield facts;
//! 2. create the code blocks parents-first, then let every unit capture what
//!    it needs (`this`, `arguments`, free identifiers) from its ancestors;
//! 3. run `compute_variables` children-first, freezing every layout.
//!
//! The order in which child units are discovered matches the order in which
//! the code generator later asks for them.

use tracing::debug;

use crate::ast::*;
use crate::compiler::code_block::{
    CodeBlockId, CodeBlockInitFlags, CodeBlockKind, CodeBlockTree, FunctionBlockOptions,
    InterpretedCodeBlock, ScopeName,
};
use crate::error::Error;

const ARGUMENTS: &str = "arguments";

/// What a function-like unit looks like before its code block exists.
struct ScopeContext {
    kind: CodeBlockKind,
    options: FunctionBlockOptions,
    names: Vec<ScopeName>,
    used_names: Vec<String>,
    uses_this: bool,
    uses_arguments: bool,
    children: Vec<ScopeContext>,
    block_id: Option<CodeBlockId>,
}

impl ScopeContext {
    fn new(kind: CodeBlockKind, options: FunctionBlockOptions) -> Self {
        Self {
            kind,
            options,
            names: Vec::new(),
            used_names: Vec::new(),
            uses_this: false,
            uses_arguments: false,
            children: Vec::new(),
            block_id: None,
        }
    }

    fn is_arrow(&self) -> bool {
        self.options.flags & CodeBlockInitFlags::IS_ARROW_FUNCTION_EXPRESSION != 0
    }

    fn set_flag(&mut self, flag: u16) {
        self.options.flags |= flag;
    }

    fn declare(&mut self, name: ScopeName) {
        if let Some(existing) = self.names.iter_mut().find(|n| n.name == name.name) {
            existing.is_explicitly_declared_or_parameter_name |=
                name.is_explicitly_declared_or_parameter_name;
            return;
        }
        self.names.push(name);
    }

    fn use_name(&mut self, name: &str) {
        if !self.used_names.iter().any(|n| n == name) {
            self.used_names.push(name.to_string());
        }
    }
}

/// How a nested function unit was written.
enum FunctionShape<'a> {
    Declaration(&'a FunctionDeclaration, bool),
    Expression(&'a FunctionExpression, Option<&'a str>),
    Arrow(&'a ArrowFunctionExpression, Option<&'a str>),
    Method(&'a MethodDefinition, String),
}

/// Walks one function unit's body.
struct ScopeCollector<'c> {
    scope: &'c mut ScopeContext,
    is_strict: bool,
    with_depth: usize,
    catch_depth: usize,
    block_depth: usize,
}

impl<'c> ScopeCollector<'c> {
    fn new(scope: &'c mut ScopeContext, is_strict: bool) -> Self {
        Self {
            scope,
            is_strict,
            with_depth: 0,
            catch_depth: 0,
            block_depth: 0,
        }
    }

    fn visit_statements(&mut self, statements: &[Statement]) -> Result<(), Error> {
        for stmt in statements {
            self.visit_statement(stmt)?;
        }
        Ok(())
    }

    fn visit_nested_statement(&mut self, stmt: &Statement) -> Result<(), Error> {
        self.block_depth += 1;
        let result = self.visit_statement(stmt);
        self.block_depth -= 1;
        result
    }

    fn declare_variables(&mut self, decl: &VariableDeclaration) {
        for declarator in &decl.declarations {
            let name = match decl.kind {
                VariableKind::Const => ScopeName::constant(&declarator.id.name),
                VariableKind::Var | VariableKind::Let => ScopeName::declared(&declarator.id.name),
            };
            self.scope.declare(name);
        }
    }

    fn visit_variable_declaration(&mut self, decl: &VariableDeclaration) -> Result<(), Error> {
        self.declare_variables(decl);
        for declarator in &decl.declarations {
            self.scope.use_name(&declarator.id.name);
            if let Some(init) = &declarator.init {
                self.visit_named_expression(init, Some(&declarator.id.name))?;
            }
        }
        Ok(())
    }

    fn visit_for_left(&mut self, left: &ForInLeft) -> Result<(), Error> {
        match left {
            ForInLeft::Declaration(decl) => self.visit_variable_declaration(decl),
            ForInLeft::Expression(expr) => self.visit_expression(expr),
        }
    }

    fn visit_statement(&mut self, stmt: &Statement) -> Result<(), Error> {
        match stmt {
            Statement::VariableDeclaration(decl) => self.visit_variable_declaration(decl),
            Statement::FunctionDeclaration(decl) => {
                self.scope.declare(ScopeName::declared(&decl.id.name));
                self.scope.use_name(&decl.id.name);
                let special_binding = self.block_depth > 0;
                self.visit_function(FunctionShape::Declaration(decl, special_binding))
            }
            Statement::ClassDeclaration(decl) => {
                self.scope.declare(ScopeName::declared(&decl.id.name));
                self.scope.use_name(&decl.id.name);
                self.visit_class(&decl.class, Some(&decl.id.name))
            }
            Statement::Expression(expr_stmt) => self.visit_expression(&expr_stmt.expression),
            Statement::Block(block) => {
                self.block_depth += 1;
                let result = self.visit_statements(&block.body);
                self.block_depth -= 1;
                result
            }
            Statement::If(if_stmt) => {
                self.visit_expression(&if_stmt.test)?;
                self.visit_nested_statement(&if_stmt.consequent)?;
                if let Some(alternate) = &if_stmt.alternate {
                    self.visit_nested_statement(alternate)?;
                }
                Ok(())
            }
            Statement::Switch(switch) => {
                self.visit_expression(&switch.discriminant)?;
                for case in &switch.cases {
                    if let Some(test) = &case.test {
                        self.visit_expression(test)?;
                    }
                }
                self.block_depth += 1;
                for case in &switch.cases {
                    self.visit_statements(&case.consequent)?;
                }
                self.block_depth -= 1;
                Ok(())
            }
            Statement::While(while_stmt) => {
                self.visit_expression(&while_stmt.test)?;
                self.visit_nested_statement(&while_stmt.body)
            }
            Statement::DoWhile(do_while) => {
                self.visit_nested_statement(&do_while.body)?;
                self.visit_expression(&do_while.test)
            }
            Statement::For(for_stmt) => {
                match &for_stmt.init {
                    Some(ForInit::Declaration(decl)) => self.visit_variable_declaration(decl)?,
                    Some(ForInit::Expression(expr)) => self.visit_expression(expr)?,
                    None => {}
                }
                if let Some(test) = &for_stmt.test {
                    self.visit_expression(test)?;
                }
                self.visit_nested_statement(&for_stmt.body)?;
                if let Some(update) = &for_stmt.update {
                    self.visit_expression(update)?;
                }
                Ok(())
            }
            Statement::ForIn(for_in) => {
                self.visit_expression(&for_in.right)?;
                self.visit_for_left(&for_in.left)?;
                self.visit_nested_statement(&for_in.body)
            }
            Statement::ForOf(for_of) => {
                self.visit_expression(&for_of.right)?;
                self.visit_for_left(&for_of.left)?;
                self.visit_nested_statement(&for_of.body)
            }
            Statement::Return(ret) => match &ret.argument {
                Some(arg) => self.visit_expression(arg),
                None => Ok(()),
            },
            Statement::Throw(throw) => self.visit_expression(&throw.argument),
            Statement::Try(try_stmt) => {
                self.block_depth += 1;
                self.visit_statements(&try_stmt.block.body)?;
                if let Some(handler) = &try_stmt.handler {
                    self.scope.set_flag(CodeBlockInitFlags::HAS_CATCH);
                    if let Some(param) = &handler.param {
                        self.scope.declare(ScopeName::declared(&param.name));
                        self.scope.use_name(&param.name);
                    }
                    self.catch_depth += 1;
                    let result = self.visit_statements(&handler.body.body);
                    self.catch_depth -= 1;
                    result?;
                }
                if let Some(finalizer) = &try_stmt.finalizer {
                    self.visit_statements(&finalizer.body)?;
                }
                self.block_depth -= 1;
                Ok(())
            }
            Statement::With(with) => {
                if self.is_strict {
                    return Err(Error::syntax_error(
                        "Strict mode code may not include a with statement",
                    ));
                }
                self.visit_expression(&with.object)?;
                self.scope.set_flag(CodeBlockInitFlags::HAS_WITH);
                self.with_depth += 1;
                let result = self.visit_nested_statement(&with.body);
                self.with_depth -= 1;
                result
            }
            Statement::Labeled(labeled) => self.visit_statement(&labeled.body),
            Statement::Break
            | Statement::BreakLabel(_)
            | Statement::Continue
            | Statement::ContinueLabel(_)
            | Statement::Debugger
            | Statement::Empty => Ok(()),
        }
    }

    fn visit_expressions(&mut self, exprs: &[Expression]) -> Result<(), Error> {
        for expr in exprs {
            self.visit_expression(expr)?;
        }
        Ok(())
    }

    /// Visits an expression whose value is bound to `name_hint` (so anonymous
    /// functions and classes pick the binding's name).
    fn visit_named_expression(&mut self, expr: &Expression, name_hint: Option<&str>) -> Result<(), Error> {
        match expr {
            Expression::Function(func) if func.id.is_none() => {
                self.visit_function(FunctionShape::Expression(func, name_hint))
            }
            Expression::Arrow(arrow) => self.visit_function(FunctionShape::Arrow(arrow, name_hint)),
            Expression::Class(class) if class.id.is_none() => self.visit_class(class, name_hint),
            other => self.visit_expression(other),
        }
    }

    fn visit_expression(&mut self, expr: &Expression) -> Result<(), Error> {
        match expr {
            Expression::Literal(_) => Ok(()),
            Expression::Identifier(id) => {
                if id.name == ARGUMENTS {
                    self.scope.uses_arguments = true;
                }
                self.scope.use_name(&id.name);
                Ok(())
            }
            Expression::This => {
                self.scope.uses_this = true;
                Ok(())
            }
            Expression::Super(_) => {
                self.scope.uses_this = true;
                Ok(())
            }
            Expression::Array(arr) => {
                for element in arr.elements.iter().flatten() {
                    self.visit_expression(element)?;
                }
                Ok(())
            }
            Expression::Object(obj) => {
                for prop in &obj.properties {
                    if let PropertyKey::Computed(key) = &prop.key {
                        self.visit_expression(key)?;
                    }
                    let hint = match &prop.key {
                        PropertyKey::Identifier(id) => Some(id.name.as_str()),
                        _ => None,
                    };
                    self.visit_named_expression(&prop.value, hint)?;
                }
                Ok(())
            }
            Expression::Binary(bin) => {
                self.visit_expression(&bin.left)?;
                self.visit_expression(&bin.right)
            }
            Expression::Unary(un) => self.visit_expression(&un.argument),
            Expression::Assignment(assign) => {
                self.visit_expression(&assign.left)?;
                let hint = match assign.left.as_ref() {
                    Expression::Identifier(id) => Some(id.name.as_str()),
                    _ => None,
                };
                self.visit_named_expression(&assign.right, hint)
            }
            Expression::Update(update) => self.visit_expression(&update.argument),
            Expression::Call(call) => {
                if let Expression::Identifier(id) = call.callee.as_ref() {
                    if id.name == "eval" {
                        self.scope.set_flag(CodeBlockInitFlags::HAS_EVAL);
                        // eval code may read `this` and `arguments` of this unit
                        self.scope.uses_this = true;
                        self.scope.uses_arguments = true;
                    }
                }
                self.visit_expression(&call.callee)?;
                self.visit_expressions(&call.arguments)
            }
            Expression::New(new) => {
                self.visit_expression(&new.callee)?;
                self.visit_expressions(&new.arguments)
            }
            Expression::Member(member) => {
                self.visit_expression(&member.object)?;
                if let MemberProperty::Expression(prop) = &member.property {
                    self.visit_expression(prop)?;
                }
                Ok(())
            }
            Expression::Conditional(cond) => {
                self.visit_expression(&cond.test)?;
                self.visit_expression(&cond.consequent)?;
                self.visit_expression(&cond.alternate)
            }
            Expression::Function(func) => self.visit_function(FunctionShape::Expression(func, None)),
            Expression::Arrow(arrow) => self.visit_function(FunctionShape::Arrow(arrow, None)),
            Expression::Class(class) => self.visit_class(class, None),
            Expression::Sequence(seq) => self.visit_expressions(&seq.expressions),
            Expression::Spread(inner) => self.visit_expression(inner),
        }
    }

    fn visit_class(&mut self, class: &ClassExpression, name_hint: Option<&str>) -> Result<(), Error> {
        if let Some(super_class) = &class.super_class {
            self.visit_expression(super_class)?;
        }
        let class_name = class
            .id
            .as_ref()
            .map(|id| id.name.as_str())
            .or(name_hint)
            .unwrap_or_default()
            .to_string();
        for member in class.members_with_constructor() {
            if let PropertyKey::Computed(_) = member.key {
                return Err(Error::syntax_error(
                    "computed class member names are not supported",
                ));
            }
            let name = if member.kind == MethodKind::Constructor {
                class_name.clone()
            } else {
                method_key_name(&member.key)?
            };
            self.visit_function(FunctionShape::Method(&member, name))?;
        }
        Ok(())
    }

    fn visit_function(&mut self, shape: FunctionShape<'_>) -> Result<(), Error> {
        let mut flags = CodeBlockInitFlags::IS_SIMPLE_PARAMETER_LIST;
        if self.with_depth > 0 {
            flags |= CodeBlockInitFlags::IN_WITH;
        }
        if self.catch_depth > 0 {
            flags |= CodeBlockInitFlags::IN_CATCH;
        }

        let (options, body, implicit_name) = match shape {
            FunctionShape::Declaration(decl, special_binding) => {
                flags |= CodeBlockInitFlags::IS_FUNCTION_DECLARATION;
                if special_binding {
                    flags |= CodeBlockInitFlags::IS_FUNCTION_DECLARATION_WITH_SPECIAL_BINDING;
                }
                if decl.is_generator {
                    flags |= CodeBlockInitFlags::HAS_YIELD;
                }
                (
                    FunctionBlockOptions {
                        name: decl.id.name.clone(),
                        parameters: param_names(&decl.params),
                        is_strict: self.is_strict || has_use_strict_directive(&decl.body),
                        is_constructor: !decl.is_generator,
                        flags,
                        ..Default::default()
                    },
                    FunctionBody::Statements(&decl.body),
                    None,
                )
            }
            FunctionShape::Expression(func, name_hint) => {
                flags |= CodeBlockInitFlags::IS_FUNCTION_EXPRESSION;
                if func.is_generator {
                    flags |= CodeBlockInitFlags::HAS_YIELD;
                }
                let own_name = func.id.as_ref().map(|id| id.name.clone());
                (
                    FunctionBlockOptions {
                        name: own_name
                            .clone()
                            .or_else(|| name_hint.map(str::to_string))
                            .unwrap_or_default(),
                        parameters: param_names(&func.params),
                        is_strict: self.is_strict || has_use_strict_directive(&func.body),
                        is_constructor: !func.is_generator,
                        flags,
                        ..Default::default()
                    },
                    FunctionBody::Statements(&func.body),
                    own_name,
                )
            }
            FunctionShape::Arrow(arrow, name_hint) => {
                flags |= CodeBlockInitFlags::IS_ARROW_FUNCTION_EXPRESSION;
                let (body, strict_body) = match &arrow.body {
                    ArrowBody::Expression(expr) => (FunctionBody::Expression(expr), false),
                    ArrowBody::Block(stmts) => {
                        (FunctionBody::Statements(stmts), has_use_strict_directive(stmts))
                    }
                };
                (
                    FunctionBlockOptions {
                        name: name_hint.unwrap_or_default().to_string(),
                        parameters: param_names(&arrow.params),
                        is_strict: self.is_strict || strict_body,
                        flags,
                        ..Default::default()
                    },
                    body,
                    None,
                )
            }
            FunctionShape::Method(member, name) => {
                flags |= CodeBlockInitFlags::IS_FUNCTION_EXPRESSION;
                if member.is_default_constructor {
                    flags |= CodeBlockInitFlags::IS_DEFAULT_CONSTRUCTOR;
                }
                (
                    FunctionBlockOptions {
                        name,
                        parameters: param_names(&member.value.params),
                        is_strict: true,
                        is_static: member.is_static,
                        is_method_property: true,
                        is_constructor: member.kind == MethodKind::Constructor,
                        flags,
                    },
                    FunctionBody::Statements(&member.value.body),
                    None,
                )
            }
        };

        let is_strict = options.is_strict;
        let mut child = ScopeContext::new(CodeBlockKind::Function, options);
        {
            let mut collector = ScopeCollector::new(&mut child, is_strict);
            match body {
                FunctionBody::Statements(stmts) => collector.visit_statements(stmts)?,
                FunctionBody::Expression(expr) => collector.visit_expression(expr)?,
            }
        }
        if let Some(name) = implicit_name {
            child.declare(ScopeName::implicit(&name));
        }
        self.scope.children.push(child);
        Ok(())
    }
}

enum FunctionBody<'a> {
    Statements(&'a [Statement]),
    Expression(&'a Expression),
}

fn param_names(params: &[Identifier]) -> Vec<String> {
    params.iter().map(|p| p.name.clone()).collect()
}

/// The property name a class member is installed under.
pub fn method_key_name(key: &PropertyKey) -> Result<String, Error> {
    match key {
        PropertyKey::Identifier(id) => Ok(id.name.clone()),
        PropertyKey::Literal(Literal::String(s)) => Ok(s.clone()),
        PropertyKey::Literal(Literal::Number(n)) => {
            Ok(crate::runtime::value::number_to_string(*n))
        }
        PropertyKey::Literal(_) | PropertyKey::Computed(_) => Err(Error::syntax_error(
            "unsupported class member name",
        )),
    }
}

/// Analyzes a whole program. The root of the returned tree is the program's block.
pub fn analyze_program(program: &Program) -> Result<CodeBlockTree, Error> {
    analyze(program, CodeBlockKind::Global, false, false)
}

/// Analyzes code passed to direct eval.
pub fn analyze_eval(program: &Program, caller_is_strict: bool, in_function: bool) -> Result<CodeBlockTree, Error> {
    analyze(program, CodeBlockKind::Eval, caller_is_strict, in_function)
}

fn analyze(
    program: &Program,
    kind: CodeBlockKind,
    inherited_strict: bool,
    in_function: bool,
) -> Result<CodeBlockTree, Error> {
    let is_strict = inherited_strict || program.is_strict();
    let mut root = ScopeContext::new(
        kind,
        FunctionBlockOptions {
            is_strict,
            ..Default::default()
        },
    );
    ScopeCollector::new(&mut root, is_strict).visit_statements(&program.body)?;

    let mut tree = CodeBlockTree::new();
    create_blocks(&mut tree, &mut root, None, in_function);
    capture_implicit_bindings(&mut tree, &root, &[]);
    resolve_free_names(&mut tree, &root);

    let ids: Vec<CodeBlockId> = tree.ids().collect();
    for id in ids.into_iter().rev() {
        tree.compute_variables(id);
    }
    debug!(blocks = tree.len(), strict = is_strict, "scope analysis finished");
    Ok(tree)
}

fn create_blocks(
    tree: &mut CodeBlockTree,
    scope: &mut ScopeContext,
    parent: Option<CodeBlockId>,
    eval_in_function: bool,
) {
    let block = match scope.kind {
        CodeBlockKind::Function => {
            InterpretedCodeBlock::new_function(scope.options.clone(), &scope.names)
        }
        kind => {
            let mut block = InterpretedCodeBlock::new_global(
                kind,
                scope.options.is_strict,
                &scope.names,
                scope.options.flags,
            );
            if eval_in_function {
                block.set_eval_code_in_function();
            }
            block
        }
    };
    let id = tree.insert(block, parent);
    scope.block_id = Some(id);
    for child in scope.children.iter_mut() {
        create_blocks(tree, child, Some(id), false);
    }
}

/// Captures `this` and `arguments` for arrows and eval, and drops indexed
/// storage where eval/with/yield make it unsound. `enclosing` lists the
/// ancestors of `scope`, outermost first.
fn capture_implicit_bindings(tree: &mut CodeBlockTree, scope: &ScopeContext, enclosing: &[&ScopeContext]) {
    let Some(id) = scope.block_id else {
        unreachable!("code block missing for scope")
    };
    let is_function = scope.kind == CodeBlockKind::Function;

    // The unit whose `this`/`arguments` this scope observes.
    let home = if scope.is_arrow() {
        enclosing
            .iter()
            .rev()
            .find(|s| !s.is_arrow())
            .filter(|s| s.kind == CodeBlockKind::Function)
            .and_then(|s| s.block_id)
    } else if is_function {
        Some(id)
    } else {
        None
    };

    if let Some(home) = home {
        if scope.uses_arguments && !declares_arguments(tree, home) {
            tree.capture_arguments(home);
        }
        if scope.is_arrow() && scope.uses_this {
            tree.capture_this(home);
        }
    }

    let block = tree.get(id);
    if block.has_eval_with_yield() {
        let chain: Vec<CodeBlockId> = tree.ancestors_inclusive(id).collect();
        for ancestor in chain {
            tree.notify_self_or_child_has_eval_with_yield(ancestor);
        }
    }

    let mut nested = enclosing.to_vec();
    nested.push(scope);
    for child in &scope.children {
        capture_implicit_bindings(tree, child, &nested);
    }
}

fn declares_arguments(tree: &CodeBlockTree, id: CodeBlockId) -> bool {
    tree.get(id)
        .identifier(ARGUMENTS)
        .is_some_and(|info| info.is_explicitly_declared_or_parameter_name)
}

/// Asks ancestors to capture every name a scope uses but does not bind.
fn resolve_free_names(tree: &mut CodeBlockTree, scope: &ScopeContext) {
    let Some(id) = scope.block_id else {
        unreachable!("code block missing for scope")
    };
    let mut wanted: Vec<&str> = scope.used_names.iter().map(String::as_str).collect();
    if scope.is_arrow() && scope.uses_this {
        wanted.push("this");
    }
    for name in wanted {
        if tree.get(id).has_name(name) {
            continue;
        }
        let ancestors: Vec<CodeBlockId> = tree.ancestors_inclusive(id).skip(1).collect();
        for ancestor in ancestors {
            if tree.try_capture_identifiers_from_child_code_block(ancestor, name) {
                break;
            }
        }
    }
    for child in &scope.children {
        resolve_free_names(tree, child);
    }
}
