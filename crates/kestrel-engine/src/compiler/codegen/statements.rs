//! Statement code generation.

use super::{ByteCodeGenerateContext, Cleanup};
use crate::ast::*;
use crate::compiler::bytecode::{Instruction, RegisterIndex, StaticErrorKind};
use crate::error::Error;
use crate::runtime::value::{SymbolId, Value};

impl ByteCodeGenerateContext<'_, '_> {
    pub(crate) fn generate_statements(&mut self, statements: &[Statement]) -> Result<(), Error> {
        for stmt in statements {
            self.generate_statement(stmt)?;
        }
        Ok(())
    }

    /// Generates one statement. The register stack is back at its starting
    /// depth afterwards, also when generation fails.
    pub fn generate_statement(&mut self, stmt: &Statement) -> Result<(), Error> {
        let depth = self.register_depth();
        let base = self.base_register_count;
        let result = self.generate_statement_inner(stmt);
        match &result {
            Ok(()) => debug_assert_eq!(self.register_depth(), depth, "statement leaked registers"),
            Err(_) => self.restore_registers(depth, base),
        }
        result
    }

    fn generate_statement_inner(&mut self, stmt: &Statement) -> Result<(), Error> {
        match stmt {
            Statement::VariableDeclaration(decl) => self.generate_variable_declaration(decl),
            // Hoisted to the top of the enclosing body.
            Statement::FunctionDeclaration(_) => Ok(()),
            Statement::ClassDeclaration(decl) => {
                let class = self.get_register();
                self.generate_class(&decl.class, class)?;
                self.emit_store_identifier(&decl.id.name, class, true);
                self.give_up_register();
                Ok(())
            }
            Statement::Expression(expr_stmt) => match self.completion {
                Some(completion) => self.generate_expression(&expr_stmt.expression, completion),
                None => {
                    let value = self.get_register();
                    self.generate_expression(&expr_stmt.expression, value)?;
                    self.give_up_register();
                    Ok(())
                }
            },
            Statement::Block(block) => self.generate_statements(&block.body),
            Statement::If(if_stmt) => self.generate_if(if_stmt),
            Statement::Switch(switch) => self.generate_switch(switch),
            Statement::While(while_stmt) => self.generate_while(while_stmt),
            Statement::DoWhile(do_while) => self.generate_do_while(do_while),
            Statement::For(for_stmt) => self.generate_for(for_stmt),
            Statement::ForIn(for_in) => self.generate_for_in(for_in),
            Statement::ForOf(for_of) => self.generate_for_of(for_of),
            Statement::Return(ret) => {
                if self.code_block().is_global_scope_code_block() {
                    return Err(Error::syntax_error("Illegal return statement"));
                }
                let value = self.get_register();
                match &ret.argument {
                    Some(arg) => self.generate_expression(arg, value)?,
                    None => self.emit_literal(value, Value::Undefined),
                }
                self.emit(Instruction::ReturnFunction { src: value });
                self.give_up_register();
                Ok(())
            }
            Statement::Break => self.emit_break(None),
            Statement::BreakLabel(label) => self.emit_break(Some(label.as_str())),
            Statement::Continue => self.emit_continue(None),
            Statement::ContinueLabel(label) => self.emit_continue(Some(label.as_str())),
            Statement::Throw(throw) => {
                let value = self.get_register();
                self.generate_expression(&throw.argument, value)?;
                self.emit(Instruction::ThrowOperation { src: value });
                self.give_up_register();
                Ok(())
            }
            Statement::Try(try_stmt) => self.generate_try(try_stmt),
            Statement::With(with) => self.generate_with(with),
            Statement::Labeled(labeled) => self.generate_labeled(labeled),
            Statement::Debugger | Statement::Empty => Ok(()),
        }
    }

    fn generate_variable_declaration(&mut self, decl: &VariableDeclaration) -> Result<(), Error> {
        let is_lexical = decl.kind != VariableKind::Var;
        for declarator in &decl.declarations {
            let value = self.get_register();
            match &declarator.init {
                Some(init) => self.generate_expression(init, value)?,
                None if decl.kind == VariableKind::Let => self.emit_literal(value, Value::Undefined),
                None => {
                    self.give_up_register();
                    continue;
                }
            }
            self.emit_store_identifier(&declarator.id.name, value, is_lexical);
            self.give_up_register();
        }
        Ok(())
    }

    fn generate_if(&mut self, if_stmt: &IfStatement) -> Result<(), Error> {
        let cond = self.get_register();
        self.generate_expression(&if_stmt.test, cond)?;
        let to_else = self.emit(Instruction::JumpIfFalse {
            cond,
            target: usize::MAX,
        });
        self.give_up_register();
        self.generate_statement(&if_stmt.consequent)?;
        match &if_stmt.alternate {
            Some(alternate) => {
                let to_end = self.emit(Instruction::Jump { target: usize::MAX });
                self.patch_jump_to_here(to_else);
                self.generate_statement(alternate)?;
                self.patch_jump_to_here(to_end);
            }
            None => self.patch_jump_to_here(to_else),
        }
        Ok(())
    }

    /// Emits a test of `expr` that jumps out when it is falsy.
    fn emit_loop_test(&mut self, expr: &Expression) -> Result<usize, Error> {
        let cond = self.get_register();
        self.generate_expression(expr, cond)?;
        let exit = self.emit(Instruction::JumpIfFalse {
            cond,
            target: usize::MAX,
        });
        self.give_up_register();
        Ok(exit)
    }

    fn generate_while(&mut self, while_stmt: &WhileStatement) -> Result<(), Error> {
        self.push_jump_scope(true);
        let start = self.current_position();
        let exit = self.emit_loop_test(&while_stmt.test)?;
        self.generate_statement(&while_stmt.body)?;
        self.emit(Instruction::Jump { target: start });
        self.patch_jump_to_here(exit);
        self.pop_jump_scope(Some(start));
        Ok(())
    }

    fn generate_do_while(&mut self, do_while: &DoWhileStatement) -> Result<(), Error> {
        self.push_jump_scope(true);
        let start = self.current_position();
        self.generate_statement(&do_while.body)?;
        let test = self.current_position();
        let cond = self.get_register();
        self.generate_expression(&do_while.test, cond)?;
        self.emit(Instruction::JumpIfTrue { cond, target: start });
        self.give_up_register();
        self.pop_jump_scope(Some(test));
        Ok(())
    }

    fn generate_for(&mut self, for_stmt: &ForStatement) -> Result<(), Error> {
        let labels = std::mem::take(&mut self.pending_labels);
        match &for_stmt.init {
            Some(ForInit::Declaration(decl)) => self.generate_variable_declaration(decl)?,
            Some(ForInit::Expression(expr)) => {
                let value = self.get_register();
                self.generate_expression(expr, value)?;
                self.give_up_register();
            }
            None => {}
        }
        self.pending_labels = labels;
        self.push_jump_scope(true);

        let start = self.current_position();
        let exit = match &for_stmt.test {
            Some(test) => Some(self.emit_loop_test(test)?),
            None => None,
        };
        self.generate_statement(&for_stmt.body)?;
        let update = self.current_position();
        if let Some(expr) = &for_stmt.update {
            let value = self.get_register();
            self.generate_expression(expr, value)?;
            self.give_up_register();
        }
        self.emit(Instruction::Jump { target: start });
        if let Some(exit) = exit {
            self.patch_jump_to_here(exit);
        }
        self.pop_jump_scope(Some(update));
        Ok(())
    }

    /// Stores `value` into the binding a for-in/for-of head names.
    fn store_for_left(&mut self, left: &ForInLeft, value: RegisterIndex) -> Result<(), Error> {
        match left {
            ForInLeft::Declaration(decl) => {
                let [declarator] = decl.declarations.as_slice() else {
                    return Err(Error::syntax_error(
                        "Invalid left-hand side in for-in/for-of loop: must declare a single binding",
                    ));
                };
                self.emit_store_identifier(&declarator.id.name, value, decl.kind != VariableKind::Var);
                Ok(())
            }
            ForInLeft::Expression(Expression::Identifier(id)) => {
                self.emit_store_identifier(&id.name, value, false);
                Ok(())
            }
            ForInLeft::Expression(Expression::Member(member)) => {
                let object = self.get_register();
                self.generate_member_object(&member.object, object)?;
                match &member.property {
                    MemberProperty::Identifier(id) => {
                        self.emit(Instruction::SetObjectPreComputedCase {
                            object,
                            name: id.name.clone(),
                            value,
                        });
                    }
                    MemberProperty::Expression(expr) => {
                        let property = self.get_register();
                        self.generate_expression(expr, property)?;
                        self.emit(Instruction::SetObject {
                            object,
                            property,
                            value,
                        });
                        self.give_up_register();
                    }
                }
                self.give_up_register();
                Ok(())
            }
            ForInLeft::Expression(_) => Err(Error::syntax_error(
                "Invalid left-hand side in for-in/for-of loop",
            )),
        }
    }

    fn generate_for_in(&mut self, for_in: &ForInStatement) -> Result<(), Error> {
        let labels = std::mem::take(&mut self.pending_labels);
        let keys = self.get_register();
        let cursor = self.get_register();
        self.generate_expression(&for_in.right, keys)?;
        self.emit(Instruction::EnumerateObject {
            object: keys,
            dst: keys,
        });
        self.emit_literal(cursor, Value::Number(0.0));

        self.pending_labels = labels;
        self.push_jump_scope(true);
        let next = self.current_position();
        let key = self.get_register();
        let exit = self.emit(Instruction::EnumerateObjectKey {
            keys,
            index: cursor,
            dst: key,
            exit: usize::MAX,
        });
        self.store_for_left(&for_in.left, key)?;
        self.give_up_register();
        self.generate_statement(&for_in.body)?;
        self.emit(Instruction::Jump { target: next });
        self.patch_jump_to_here(exit);
        self.pop_jump_scope(Some(next));

        self.give_up_register();
        self.give_up_register();
        Ok(())
    }

    /// Iterator protocol:
    ///
    /// ```text
    /// method = iterable[Symbol.iterator]      ; TypeError when nullish
    /// iterator = method.call(iterable)
    /// next = iterator.next
    /// loop: result = next.call(iterator)
    ///       if result.done goto exit
    ///       <left> = result.value
    ///       <body>
    ///       goto loop
    /// exit:
    /// ```
    fn generate_for_of(&mut self, for_of: &ForOfStatement) -> Result<(), Error> {
        let labels = std::mem::take(&mut self.pending_labels);
        let iterable = self.get_register();
        self.generate_expression(&for_of.right, iterable)?;

        let method = self.get_register();
        let key = self.get_register();
        self.emit_literal(key, Value::Symbol(SymbolId::ITERATOR));
        self.emit(Instruction::GetObject {
            object: iterable,
            property: key,
            dst: method,
        });
        self.give_up_register();
        let iterable_ok = self.emit(Instruction::JumpIfNotNullish {
            src: method,
            target: usize::MAX,
        });
        self.emit(Instruction::ThrowStaticError {
            kind: StaticErrorKind::TypeError,
            message: "object is not iterable".to_string(),
        });
        self.patch_jump_to_here(iterable_ok);

        let iterator = self.get_register();
        self.emit(Instruction::CallFunctionWithReceiver {
            receiver: iterable,
            callee: method,
            args_start: iterator,
            argc: 0,
            dst: iterator,
            spread: None,
        });

        let next_method = self.get_register();
        self.emit_get_named(iterator, "next", next_method);

        self.pending_labels = labels;
        self.push_jump_scope(true);
        let next = self.current_position();
        let result = self.get_register();
        self.emit(Instruction::CallFunctionWithReceiver {
            receiver: iterator,
            callee: next_method,
            args_start: result,
            argc: 0,
            dst: result,
            spread: None,
        });
        let done = self.get_register();
        self.emit_get_named(result, "done", done);
        let exit = self.emit(Instruction::JumpIfTrue {
            cond: done,
            target: usize::MAX,
        });
        self.give_up_register();
        self.emit_get_named(result, "value", result);
        self.store_for_left(&for_of.left, result)?;
        self.give_up_register();

        self.generate_statement(&for_of.body)?;
        self.emit(Instruction::Jump { target: next });
        self.patch_jump_to_here(exit);
        self.pop_jump_scope(Some(next));

        // next_method, iterator, method, iterable
        for _ in 0..4 {
            self.give_up_register();
        }
        Ok(())
    }

    fn generate_switch(&mut self, switch: &SwitchStatement) -> Result<(), Error> {
        self.push_jump_scope(false);
        let discriminant = self.get_register();
        self.generate_expression(&switch.discriminant, discriminant)?;

        let mut case_jumps = Vec::with_capacity(switch.cases.len());
        for case in &switch.cases {
            let Some(test) = &case.test else {
                case_jumps.push(None);
                continue;
            };
            let matched = self.get_register();
            self.generate_expression(test, matched)?;
            self.emit(Instruction::BinaryOperation {
                op: BinaryOperator::StrictEqual,
                left: discriminant,
                right: matched,
                dst: matched,
            });
            case_jumps.push(Some(self.emit(Instruction::JumpIfTrue {
                cond: matched,
                target: usize::MAX,
            })));
            self.give_up_register();
        }
        let to_default = self.emit(Instruction::Jump { target: usize::MAX });
        self.give_up_register();

        let mut default_target = None;
        for (case, jump) in switch.cases.iter().zip(case_jumps) {
            match jump {
                Some(jump) => self.patch_jump_to_here(jump),
                None => default_target = Some(self.current_position()),
            }
            self.generate_statements(&case.consequent)?;
        }
        let end = self.current_position();
        self.block.patch_jump(to_default, default_target.unwrap_or(end));
        self.pop_jump_scope(None);
        Ok(())
    }

    fn generate_try(&mut self, try_stmt: &TryStatement) -> Result<(), Error> {
        let Some(finalizer) = &try_stmt.finalizer else {
            return self.generate_try_catch(&try_stmt.block, try_stmt.handler.as_ref());
        };

        // The finalizer is emitted once; `thrown` tells whether it must
        // rethrow afterwards.
        let thrown = self.get_register();
        let exception = self.get_register();
        self.emit_literal(thrown, Value::Boolean(false));
        let install = self.emit(Instruction::TryOperation {
            handler: usize::MAX,
            exception_dst: exception,
        });
        self.cleanups.push(Cleanup::Try);
        let result = self.generate_try_catch(&try_stmt.block, try_stmt.handler.as_ref());
        self.cleanups.pop();
        result?;
        self.emit(Instruction::TryExit);
        let to_finalizer = self.emit(Instruction::Jump { target: usize::MAX });
        self.patch_jump_to_here(install);
        self.emit_literal(thrown, Value::Boolean(true));
        self.patch_jump_to_here(to_finalizer);

        self.generate_statements(&finalizer.body)?;
        let done = self.emit(Instruction::JumpIfFalse {
            cond: thrown,
            target: usize::MAX,
        });
        self.emit(Instruction::ThrowOperation { src: exception });
        self.patch_jump_to_here(done);
        self.give_up_register();
        self.give_up_register();
        Ok(())
    }

    fn generate_try_catch(&mut self, block: &BlockStatement, handler: Option<&CatchClause>) -> Result<(), Error> {
        let Some(handler) = handler else {
            return self.generate_statements(&block.body);
        };
        let exception = self.get_register();
        let install = self.emit(Instruction::TryOperation {
            handler: usize::MAX,
            exception_dst: exception,
        });
        self.cleanups.push(Cleanup::Try);
        let result = self.generate_statements(&block.body);
        self.cleanups.pop();
        result?;
        self.emit(Instruction::TryExit);
        let to_end = self.emit(Instruction::Jump { target: usize::MAX });

        self.patch_jump_to_here(install);
        if let Some(param) = &handler.param {
            self.emit_store_identifier(&param.name, exception, true);
        }
        self.generate_statements(&handler.body.body)?;
        self.patch_jump_to_here(to_end);
        self.give_up_register();
        Ok(())
    }

    fn generate_with(&mut self, with: &WithStatement) -> Result<(), Error> {
        let object = self.get_register();
        self.generate_expression(&with.object, object)?;
        self.emit(Instruction::WithOperation { object });
        self.give_up_register();

        let was_with_scope = std::mem::replace(&mut self.is_with_scope, true);
        self.cleanups.push(Cleanup::With);
        let result = self.generate_statement(&with.body);
        self.cleanups.pop();
        self.is_with_scope = was_with_scope;
        result?;
        self.emit(Instruction::WithExit);
        Ok(())
    }

    fn generate_labeled(&mut self, labeled: &LabeledStatement) -> Result<(), Error> {
        self.pending_labels.push(labeled.label.name.clone());
        match labeled.body.as_ref() {
            Statement::While(_)
            | Statement::DoWhile(_)
            | Statement::For(_)
            | Statement::ForIn(_)
            | Statement::ForOf(_)
            | Statement::Switch(_)
            | Statement::Labeled(_) => self.generate_statement(&labeled.body),
            body => {
                self.push_label_scope();
                let result = self.generate_statement(body);
                self.pop_jump_scope(None);
                result
            }
        }
    }
}
