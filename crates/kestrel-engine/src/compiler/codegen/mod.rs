//! Code generation from AST to bytecode.
//!
//! One [`ByteCodeGenerateContext`] exists per code block. It walks the
//! block's AST depth first, hands out registers from a LIFO stack and
//! generates nested functions as it reaches them, so every child code block
//! is produced in the order scope analysis discovered it.

mod class;
mod expressions;
mod statements;

#[cfg(test)]
mod tests;

use tracing::debug;

use crate::ast::*;
use crate::compiler::bytecode::{
    ByteCodeBlock, Instruction, REGULAR_REGISTER_LIMIT, RegisterIndex, THIS_REGISTER,
    is_stack_register, stack_register,
};
use crate::compiler::code_block::{CodeBlock, CodeBlockId, CodeBlockTree, InterpretedCodeBlock};
use crate::error::Error;
use crate::runtime::value::Value;

/// State shared by every context of one script.
pub(crate) struct SharedState<'t> {
    tree: &'t CodeBlockTree,
    direct_register_fast_path: bool,
    blocks: Vec<Option<ByteCodeBlock>>,
}

/// Generates bytecode for every block of `tree`.
///
/// `body` holds the root block's statements; the result is indexed by
/// [`CodeBlockId::index`].
pub fn generate_script(
    tree: &CodeBlockTree,
    body: &[Statement],
    direct_register_fast_path: bool,
) -> Result<Vec<ByteCodeBlock>, Error> {
    let mut shared = SharedState {
        tree,
        direct_register_fast_path,
        blocks: vec![None; tree.len()],
    };
    let mut ctx = ByteCodeGenerateContext::new(&mut shared, CodeBlockTree::new_root_id());
    ctx.generate_global_body(body)?;
    ctx.finish();

    shared
        .blocks
        .into_iter()
        .enumerate()
        .map(|(index, block)| {
            block.ok_or_else(|| {
                Error::InternalError(format!("code block {index} was never generated"))
            })
        })
        .collect()
}

/// Where an identifier lives, as seen from the block being generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IdentifierLocation {
    /// A stack variable of the current frame
    Stack(RegisterIndex),
    /// A slot of a heap environment `up` records out
    Heap { up: usize, index: usize },
    /// Resolved by name at run time
    Named,
}

/// Storage facts about a resolved identifier.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ResolvedIdentifier {
    pub location: IdentifierLocation,
    pub is_mutable: bool,
}

/// A `with` body or `try` block whose exit must be unwound by jumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cleanup {
    Try,
    With,
}

/// A breakable statement currently being generated.
#[derive(Debug, Default)]
struct JumpScope {
    labels: Vec<String>,
    is_loop: bool,
    is_breakable: bool,
    cleanup_depth: usize,
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

/// Per-code-block generation state.
pub struct ByteCodeGenerateContext<'a, 't> {
    shared: &'a mut SharedState<'t>,
    code_block: CodeBlockId,
    block: ByteCodeBlock,

    base_register_count: RegisterIndex,
    register_stack: Vec<RegisterIndex>,
    max_register_count: usize,

    fe_counter: usize,
    fd_counter: usize,

    /// Operands may name a stack variable's register instead of a copy
    pub can_skip_copy_to_register: bool,
    /// Generation is inside a `with` body
    pub is_with_scope: bool,

    jump_scopes: Vec<JumpScope>,
    pending_labels: Vec<String>,
    cleanups: Vec<Cleanup>,
    completion: Option<RegisterIndex>,
}

impl<'a, 't> ByteCodeGenerateContext<'a, 't> {
    pub(crate) fn new(shared: &'a mut SharedState<'t>, code_block: CodeBlockId) -> Self {
        Self {
            shared,
            code_block,
            block: ByteCodeBlock::new(code_block),
            base_register_count: 0,
            register_stack: Vec::new(),
            max_register_count: 0,
            fe_counter: 0,
            fd_counter: 0,
            can_skip_copy_to_register: false,
            is_with_scope: false,
            jump_scopes: Vec::new(),
            pending_labels: Vec::new(),
            cleanups: Vec::new(),
            completion: None,
        }
    }

    fn finish(mut self) {
        debug_assert!(self.register_stack.is_empty(), "registers leaked");
        self.block.required_register_count = self.max_register_count;
        debug!(
            block = self.code_block.index(),
            instructions = self.block.code.len(),
            registers = self.block.required_register_count,
            "generated bytecode"
        );
        let index = self.code_block.index();
        self.shared.blocks[index] = Some(self.block);
    }

    // ========================================================================
    // Code block queries
    // ========================================================================

    pub(crate) fn code_block(&self) -> &'t InterpretedCodeBlock {
        self.shared.tree.get(self.code_block)
    }

    pub(crate) fn is_strict(&self) -> bool {
        self.code_block().is_strict()
    }

    /// The nearest enclosing block that is not an arrow function.
    pub(crate) fn home_code_block(&self) -> &'t InterpretedCodeBlock {
        let tree = self.shared.tree;
        tree.ancestors_inclusive(self.code_block)
            .map(|id| tree.get(id))
            .find(|block| !block.is_arrow_function_expression())
            .unwrap_or_else(|| self.code_block())
    }

    fn next_child(&mut self, declaration: bool) -> CodeBlockId {
        let counter = if declaration {
            &mut self.fd_counter
        } else {
            &mut self.fe_counter
        };
        let n = *counter;
        *counter += 1;
        let tree = self.shared.tree;
        match tree
            .get(self.code_block)
            .children()
            .iter()
            .copied()
            .filter(|id| tree.get(*id).is_function_declaration() == declaration)
            .nth(n)
        {
            Some(id) => id,
            None => panic!(
                "code block {} has no child #{n} (declaration: {declaration})",
                self.code_block.index()
            ),
        }
    }

    /// The next function-expression, arrow or method child block.
    pub(crate) fn next_function_expression_child(&mut self) -> CodeBlockId {
        self.next_child(false)
    }

    /// The next function-declaration child block.
    pub(crate) fn next_function_declaration_child(&mut self) -> CodeBlockId {
        self.next_child(true)
    }

    // ========================================================================
    // Register allocation
    // ========================================================================

    /// Acquires a fresh temporary register.
    pub fn get_register(&mut self) -> RegisterIndex {
        let register = self.base_register_count;
        debug_assert!(register < REGULAR_REGISTER_LIMIT, "register file exhausted");
        self.base_register_count += 1;
        self.register_stack.push(register);
        self.max_register_count = self.max_register_count.max(self.base_register_count as usize);
        register
    }

    /// Pushes an already-live register (a stack variable) so operands can
    /// use it directly. Released with [`give_up_register`](Self::give_up_register).
    pub fn push_register(&mut self, register: RegisterIndex) {
        self.register_stack.push(register);
    }

    /// Releases the most recently acquired register.
    pub fn give_up_register(&mut self) {
        let Some(register) = self.register_stack.pop() else {
            panic!("register stack underflow");
        };
        if !is_stack_register(register) && register + 1 == self.base_register_count {
            self.base_register_count -= 1;
        }
    }

    /// Current depth of the register stack.
    pub fn register_depth(&self) -> usize {
        self.register_stack.len()
    }

    fn restore_registers(&mut self, depth: usize, base: RegisterIndex) {
        self.register_stack.truncate(depth);
        self.base_register_count = base;
    }

    // ========================================================================
    // Emission
    // ========================================================================

    pub(crate) fn emit(&mut self, instruction: Instruction) -> usize {
        self.block.push_code(instruction)
    }

    pub(crate) fn current_position(&self) -> usize {
        self.block.current_position()
    }

    pub(crate) fn patch_jump_to_here(&mut self, position: usize) {
        let here = self.block.current_position();
        self.block.patch_jump(position, here);
    }

    pub(crate) fn emit_literal(&mut self, dst: RegisterIndex, value: Value) {
        self.emit(Instruction::LoadLiteral { dst, value });
    }

    pub(crate) fn emit_string(&mut self, dst: RegisterIndex, s: &str) {
        self.emit_literal(dst, Value::String(s.to_string()));
    }

    // ========================================================================
    // Identifier resolution
    // ========================================================================

    /// Finds where `name` lives relative to the current block.
    pub(crate) fn resolve_identifier(&self, name: &str) -> ResolvedIdentifier {
        let tree = self.shared.tree;
        let mut up = 0;
        for id in tree.ancestors_inclusive(self.code_block) {
            let block = tree.get(id);
            if block.is_global_scope_code_block() || !block.can_use_indexed_variable_storage() {
                let is_mutable = block.identifier(name).is_none_or(|info| info.is_mutable);
                return ResolvedIdentifier {
                    location: IdentifierLocation::Named,
                    is_mutable,
                };
            }
            if let Some(info) = block.identifier(name) {
                let location = if info.need_to_allocate_on_stack {
                    debug_assert!(id == self.code_block, "captured identifier {name} left on stack");
                    IdentifierLocation::Stack(stack_register(info.index_for_indexed_storage))
                } else {
                    IdentifierLocation::Heap {
                        up,
                        index: info.index_for_indexed_storage,
                    }
                };
                return ResolvedIdentifier {
                    location,
                    is_mutable: info.is_mutable,
                };
            }
            if !block.can_allocate_environment_on_stack() {
                up += 1;
            }
        }
        ResolvedIdentifier {
            location: IdentifierLocation::Named,
            is_mutable: true,
        }
    }

    pub(crate) fn emit_load_identifier(&mut self, name: &str, dst: RegisterIndex) {
        match self.resolve_identifier(name).location {
            IdentifierLocation::Stack(src) => {
                if src != dst {
                    self.emit(Instruction::Move { src, dst });
                }
            }
            IdentifierLocation::Heap { up, index } => {
                self.emit(Instruction::LoadByHeapIndex {
                    dst,
                    up_index: up,
                    index,
                });
            }
            IdentifierLocation::Named => {
                self.emit(Instruction::LoadByName {
                    dst,
                    name: name.to_string(),
                });
            }
        }
    }

    /// Stores `src` into `name`. Declarations pass `is_initialization` so
    /// `const` bindings can receive their value.
    pub(crate) fn emit_store_identifier(&mut self, name: &str, src: RegisterIndex, is_initialization: bool) {
        let resolved = self.resolve_identifier(name);
        if !resolved.is_mutable && !is_initialization {
            if self.is_strict() {
                self.emit(Instruction::ThrowStaticError {
                    kind: crate::compiler::bytecode::StaticErrorKind::TypeError,
                    message: "Assignment to constant variable.".to_string(),
                });
            }
            return;
        }
        match resolved.location {
            IdentifierLocation::Stack(dst) => {
                if src != dst {
                    self.emit(Instruction::Move { src, dst });
                }
            }
            IdentifierLocation::Heap { up, index } => {
                self.emit(Instruction::StoreByHeapIndex {
                    src,
                    up_index: up,
                    index,
                });
            }
            IdentifierLocation::Named if is_initialization => {
                self.emit(Instruction::InitializeByName {
                    src,
                    name: name.to_string(),
                });
            }
            IdentifierLocation::Named => {
                self.emit(Instruction::StoreByName {
                    src,
                    name: name.to_string(),
                });
            }
        }
    }

    /// Loads `this`. Arrows read the binding their home function captured.
    pub(crate) fn emit_load_this(&mut self, dst: RegisterIndex) {
        let block = self.code_block();
        let home = self.home_code_block();
        if block.is_arrow_function_expression() && !home.is_global_scope_code_block() {
            self.emit_load_identifier("this", dst);
        } else if dst != THIS_REGISTER {
            self.emit(Instruction::Move {
                src: THIS_REGISTER,
                dst,
            });
        }
    }

    // ========================================================================
    // Jump scopes
    // ========================================================================

    fn push_jump_scope(&mut self, is_loop: bool) {
        let labels = std::mem::take(&mut self.pending_labels);
        self.jump_scopes.push(JumpScope {
            labels,
            is_loop,
            is_breakable: true,
            cleanup_depth: self.cleanups.len(),
            ..Default::default()
        });
    }

    fn push_label_scope(&mut self) {
        let labels = std::mem::take(&mut self.pending_labels);
        self.jump_scopes.push(JumpScope {
            labels,
            is_loop: false,
            is_breakable: false,
            cleanup_depth: self.cleanups.len(),
            ..Default::default()
        });
    }

    /// Pops the innermost scope, pointing its breaks at the current position
    /// and its continues at `continue_target`.
    fn pop_jump_scope(&mut self, continue_target: Option<usize>) {
        let Some(scope) = self.jump_scopes.pop() else {
            panic!("jump scope stack underflow");
        };
        for position in scope.breaks {
            self.patch_jump_to_here(position);
        }
        if let Some(target) = continue_target {
            for position in scope.continues {
                self.block.patch_jump(position, target);
            }
        } else {
            debug_assert!(scope.continues.is_empty());
        }
    }

    fn emit_cleanups_down_to(&mut self, depth: usize) {
        let pending: Vec<Cleanup> = self.cleanups[depth..].iter().rev().copied().collect();
        for cleanup in pending {
            match cleanup {
                Cleanup::Try => self.emit(Instruction::TryExit),
                Cleanup::With => self.emit(Instruction::WithExit),
            };
        }
    }

    fn emit_break(&mut self, label: Option<&str>) -> Result<(), Error> {
        let Some(index) = self.jump_scopes.iter().rposition(|scope| match label {
            Some(label) => scope.labels.iter().any(|l| l == label),
            None => scope.is_breakable,
        }) else {
            return Err(Error::syntax_error(match label {
                Some(label) => format!("Undefined label '{label}'"),
                None => "Illegal break statement".to_string(),
            }));
        };
        self.emit_cleanups_down_to(self.jump_scopes[index].cleanup_depth);
        let position = self.emit(Instruction::Jump { target: usize::MAX });
        self.jump_scopes[index].breaks.push(position);
        Ok(())
    }

    fn emit_continue(&mut self, label: Option<&str>) -> Result<(), Error> {
        let Some(index) = self.jump_scopes.iter().rposition(|scope| {
            scope.is_loop && label.is_none_or(|label| scope.labels.iter().any(|l| l == label))
        }) else {
            return Err(Error::syntax_error("Illegal continue statement"));
        };
        self.emit_cleanups_down_to(self.jump_scopes[index].cleanup_depth);
        let position = self.emit(Instruction::Jump { target: usize::MAX });
        self.jump_scopes[index].continues.push(position);
        Ok(())
    }

    // ========================================================================
    // Code block bodies
    // ========================================================================

    fn generate_global_body(&mut self, body: &[Statement]) -> Result<(), Error> {
        let completion = self.get_register();
        self.emit_literal(completion, Value::Undefined);
        self.completion = Some(completion);
        self.hoist_function_declarations(body)?;
        self.generate_statements(body)?;
        self.emit(Instruction::End { src: completion });
        self.completion = None;
        self.give_up_register();
        Ok(())
    }

    fn generate_function_body(&mut self, body: &[Statement]) -> Result<(), Error> {
        self.hoist_function_declarations(body)?;
        self.generate_statements(body)?;
        let result = self.get_register();
        self.emit_literal(result, Value::Undefined);
        self.emit(Instruction::ReturnFunction { src: result });
        self.give_up_register();
        Ok(())
    }

    fn generate_arrow_expression_body(&mut self, body: &Expression) -> Result<(), Error> {
        let result = self.get_register();
        self.generate_expression(body, result)?;
        self.emit(Instruction::ReturnFunction { src: result });
        self.give_up_register();
        Ok(())
    }

    /// Generates a child code block's bytecode.
    pub(crate) fn generate_child(&mut self, id: CodeBlockId, body: ChildBody<'_>) -> Result<(), Error> {
        let mut child = ByteCodeGenerateContext::new(&mut *self.shared, id);
        match body {
            ChildBody::Statements(stmts) => child.generate_function_body(stmts)?,
            ChildBody::Expression(expr) => child.generate_arrow_expression_body(expr)?,
        }
        child.finish();
        Ok(())
    }

    /// Creates every function declaration of `body` before any statement runs.
    fn hoist_function_declarations(&mut self, body: &[Statement]) -> Result<(), Error> {
        let mut declarations = Vec::new();
        for stmt in body {
            collect_function_declarations(stmt, &mut declarations);
        }
        for decl in declarations {
            if decl.is_generator {
                return Err(Error::syntax_error("generator functions are not supported"));
            }
            let id = self.next_function_declaration_child();
            let register = self.get_register();
            self.emit(Instruction::CreateFunction {
                dst: register,
                code_block: id,
            });
            self.emit_store_identifier(&decl.id.name, register, true);
            self.give_up_register();
            self.generate_child(id, ChildBody::Statements(&decl.body))?;
        }
        Ok(())
    }
}

/// The AST a child code block is generated from.
pub(crate) enum ChildBody<'a> {
    Statements(&'a [Statement]),
    Expression(&'a Expression),
}

fn nested<'a>(stmts: &'a [Statement], out: &mut Vec<&'a FunctionDeclaration>) {
    for stmt in stmts {
        collect_function_declarations(stmt, out);
    }
}

fn collect_function_declarations<'a>(stmt: &'a Statement, out: &mut Vec<&'a FunctionDeclaration>) {
    match stmt {
        Statement::FunctionDeclaration(decl) => out.push(decl),
        Statement::Block(block) => nested(&block.body, out),
        Statement::If(if_stmt) => {
            collect_function_declarations(&if_stmt.consequent, out);
            if let Some(alternate) = &if_stmt.alternate {
                collect_function_declarations(alternate, out);
            }
        }
        Statement::While(while_stmt) => collect_function_declarations(&while_stmt.body, out),
        Statement::DoWhile(do_while) => collect_function_declarations(&do_while.body, out),
        Statement::For(for_stmt) => collect_function_declarations(&for_stmt.body, out),
        Statement::ForIn(for_in) => collect_function_declarations(&for_in.body, out),
        Statement::ForOf(for_of) => collect_function_declarations(&for_of.body, out),
        Statement::Switch(switch) => {
            for case in &switch.cases {
                nested(&case.consequent, out);
            }
        }
        Statement::Try(try_stmt) => {
            nested(&try_stmt.block.body, out);
            if let Some(handler) = &try_stmt.handler {
                nested(&handler.body.body, out);
            }
            if let Some(finalizer) = &try_stmt.finalizer {
                nested(&finalizer.body, out);
            }
        }
        Statement::With(with) => collect_function_declarations(&with.body, out),
        Statement::Labeled(labeled) => collect_function_declarations(&labeled.body, out),
        _ => {}
    }
}
