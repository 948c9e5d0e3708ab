//! Expression code generation.

use rustc_hash::FxHashSet;

use super::{ByteCodeGenerateContext, ChildBody, IdentifierLocation};
use crate::ast::visit::for_each_identifier;
use crate::ast::*;
use crate::compiler::bytecode::{Instruction, RegisterIndex, stack_register};
use crate::compiler::code_block::CodeBlock;
use crate::error::Error;
use crate::runtime::value::{Value, number_to_string};

/// Calls with this many arguments or more always copy their arguments.
const DIRECT_REGISTER_ARGUMENT_LIMIT: usize = 16;

/// Argument registers of a call, ready to be named by a call instruction.
struct CallArguments {
    start: RegisterIndex,
    count: usize,
    held: usize,
    spread: Option<usize>,
}

/// How a member's property is addressed.
enum PropertyOperand {
    Name(String),
    Register(RegisterIndex),
}

pub(crate) fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Number(n) => Value::Number(*n),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Null => Value::Null,
        Literal::Undefined => Value::Undefined,
    }
}

fn compound_operator(op: AssignmentOperator) -> Option<BinaryOperator> {
    Some(match op {
        AssignmentOperator::Assign => return None,
        AssignmentOperator::AddAssign => BinaryOperator::Add,
        AssignmentOperator::SubtractAssign => BinaryOperator::Subtract,
        AssignmentOperator::MultiplyAssign => BinaryOperator::Multiply,
        AssignmentOperator::DivideAssign => BinaryOperator::Divide,
        AssignmentOperator::ModuloAssign => BinaryOperator::Modulo,
        AssignmentOperator::ExponentAssign => BinaryOperator::Exponent,
        AssignmentOperator::LeftShiftAssign => BinaryOperator::LeftShift,
        AssignmentOperator::RightShiftAssign => BinaryOperator::RightShift,
        AssignmentOperator::UnsignedRightShiftAssign => BinaryOperator::UnsignedRightShift,
        AssignmentOperator::BitwiseAndAssign => BinaryOperator::BitwiseAnd,
        AssignmentOperator::BitwiseOrAssign => BinaryOperator::BitwiseOr,
        AssignmentOperator::BitwiseXorAssign => BinaryOperator::BitwiseXor,
        AssignmentOperator::LogicalAndAssign => BinaryOperator::LogicalAnd,
        AssignmentOperator::LogicalOrAssign => BinaryOperator::LogicalOr,
        AssignmentOperator::NullishCoalescingAssign => BinaryOperator::NullishCoalescing,
    })
}

fn is_logical(op: BinaryOperator) -> bool {
    matches!(
        op,
        BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr | BinaryOperator::NullishCoalescing
    )
}

/// Returns false when some name is both read and written by `exprs`, in
/// which case argument registers must be copies.
pub(crate) fn can_use_direct_register(exprs: &[&Expression]) -> bool {
    let mut reads = FxHashSet::default();
    let mut writes = FxHashSet::default();
    for expr in exprs {
        for_each_identifier(expr, &mut |name, is_assignment| {
            if is_assignment {
                writes.insert(name.to_string());
            } else {
                reads.insert(name.to_string());
            }
        });
    }
    reads.is_disjoint(&writes)
}

impl ByteCodeGenerateContext<'_, '_> {
    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Generates `expr`, leaving its value in `dst`.
    pub fn generate_expression(&mut self, expr: &Expression, dst: RegisterIndex) -> Result<(), Error> {
        match expr {
            Expression::Literal(lit) => {
                self.emit_literal(dst, literal_value(lit));
                Ok(())
            }
            Expression::Identifier(id) => {
                self.emit_load_identifier(&id.name, dst);
                Ok(())
            }
            Expression::This => {
                self.emit_load_this(dst);
                Ok(())
            }
            Expression::Array(arr) => self.generate_array(arr, dst),
            Expression::Object(obj) => self.generate_object(obj, dst),
            Expression::Binary(bin) => self.generate_binary(bin, dst),
            Expression::Unary(un) => self.generate_unary(un, dst),
            Expression::Assignment(assign) => self.generate_assignment(assign, dst),
            Expression::Update(update) => self.generate_update(update, dst),
            Expression::Call(call) => self.generate_call(call, dst),
            Expression::New(new) => self.generate_new(new, dst),
            Expression::Member(member) => self.generate_member(member, dst),
            Expression::Conditional(cond) => {
                self.generate_expression(&cond.test, dst)?;
                let to_alternate = self.emit(Instruction::JumpIfFalse {
                    cond: dst,
                    target: usize::MAX,
                });
                self.generate_expression(&cond.consequent, dst)?;
                let to_end = self.emit(Instruction::Jump { target: usize::MAX });
                self.patch_jump_to_here(to_alternate);
                self.generate_expression(&cond.alternate, dst)?;
                self.patch_jump_to_here(to_end);
                Ok(())
            }
            Expression::Function(func) => self.generate_function_expression(func, dst),
            Expression::Arrow(arrow) => {
                let id = self.next_function_expression_child();
                self.emit(Instruction::CreateFunction { dst, code_block: id });
                match &arrow.body {
                    ArrowBody::Expression(body) => self.generate_child(id, ChildBody::Expression(body)),
                    ArrowBody::Block(body) => self.generate_child(id, ChildBody::Statements(body)),
                }
            }
            Expression::Class(class) => self.generate_class(class, dst),
            Expression::Sequence(seq) => {
                for expr in &seq.expressions {
                    self.generate_expression(expr, dst)?;
                }
                Ok(())
            }
            Expression::Super(sup) => {
                // A bare `super` only appears as a callee or member object.
                if sup.kind == SuperKind::Undefined {
                    unreachable!("unclassified super reference reached code generation");
                }
                Err(Error::syntax_error("'super' keyword unexpected here"))
            }
            Expression::Spread(_) => Err(Error::syntax_error("Unexpected spread element")),
        }
    }

    /// Generates `expr` into a register the caller must give up.
    ///
    /// With [`can_skip_copy_to_register`](Self::can_skip_copy_to_register)
    /// set, a stack variable is returned as its own register.
    pub(crate) fn generate_expression_to_register(&mut self, expr: &Expression) -> Result<RegisterIndex, Error> {
        if self.can_skip_copy_to_register {
            if let Expression::Identifier(id) = expr {
                if let IdentifierLocation::Stack(register) = self.resolve_identifier(&id.name).location {
                    self.push_register(register);
                    return Ok(register);
                }
            }
        }
        let saved = std::mem::replace(&mut self.can_skip_copy_to_register, false);
        let register = self.get_register();
        let result = self.generate_expression(expr, register);
        self.can_skip_copy_to_register = saved;
        result.map(|()| register)
    }

    pub(crate) fn generate_function_expression(&mut self, func: &FunctionExpression, dst: RegisterIndex) -> Result<(), Error> {
        if func.is_generator {
            return Err(Error::syntax_error("generator functions are not supported"));
        }
        let id = self.next_function_expression_child();
        self.emit(Instruction::CreateFunction { dst, code_block: id });
        self.generate_child(id, ChildBody::Statements(&func.body))
    }

    // ========================================================================
    // Literals
    // ========================================================================

    fn generate_array(&mut self, arr: &ArrayExpression, dst: RegisterIndex) -> Result<(), Error> {
        self.emit(Instruction::CreateArray {
            dst,
            length: arr.elements.len(),
        });
        for (index, element) in arr.elements.iter().enumerate() {
            let Some(element) = element else { continue };
            if matches!(element, Expression::Spread(_)) {
                return Err(Error::syntax_error("spread elements in array literals are not supported"));
            }
            let value = self.get_register();
            self.generate_expression(element, value)?;
            self.emit(Instruction::ArrayDefineOwnProperty {
                array: dst,
                index: index as u32,
                value,
            });
            self.give_up_register();
        }
        Ok(())
    }

    fn generate_object(&mut self, obj: &ObjectExpression, dst: RegisterIndex) -> Result<(), Error> {
        self.emit(Instruction::CreateObject { dst });
        for prop in &obj.properties {
            let key = self.get_register();
            match &prop.key {
                PropertyKey::Identifier(id) => self.emit_string(key, &id.name),
                PropertyKey::Literal(Literal::Number(n)) => self.emit_string(key, &number_to_string(*n)),
                PropertyKey::Literal(lit) => {
                    let name = literal_value(lit).to_string();
                    self.emit_string(key, &name);
                }
                PropertyKey::Computed(expr) => self.generate_expression(expr, key)?,
            }
            let value = self.get_register();
            self.generate_expression(&prop.value, value)?;
            self.emit(Instruction::ObjectDefineOwnProperty {
                object: dst,
                property: key,
                value,
            });
            self.give_up_register();
            self.give_up_register();
        }
        Ok(())
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn generate_binary(&mut self, bin: &BinaryExpression, dst: RegisterIndex) -> Result<(), Error> {
        self.generate_expression(&bin.left, dst)?;
        if is_logical(bin.operator) {
            let skip = self.emit_short_circuit(bin.operator, dst);
            self.generate_expression(&bin.right, dst)?;
            self.patch_jump_to_here(skip);
            return Ok(());
        }
        let right = self.get_register();
        self.generate_expression(&bin.right, right)?;
        self.emit(Instruction::BinaryOperation {
            op: bin.operator,
            left: dst,
            right,
            dst,
        });
        self.give_up_register();
        Ok(())
    }

    /// Emits the jump that skips the right operand of a logical operator.
    fn emit_short_circuit(&mut self, op: BinaryOperator, value: RegisterIndex) -> usize {
        let target = usize::MAX;
        match op {
            BinaryOperator::LogicalAnd => self.emit(Instruction::JumpIfFalse { cond: value, target }),
            BinaryOperator::LogicalOr => self.emit(Instruction::JumpIfTrue { cond: value, target }),
            _ => self.emit(Instruction::JumpIfNotNullish { src: value, target }),
        }
    }

    fn generate_unary(&mut self, un: &UnaryExpression, dst: RegisterIndex) -> Result<(), Error> {
        match (un.operator, un.argument.as_ref()) {
            (UnaryOperator::Delete, Expression::Member(member)) => {
                let object = self.get_register();
                self.generate_member_object(&member.object, object)?;
                let property = self.get_register();
                match &member.property {
                    MemberProperty::Identifier(id) => self.emit_string(property, &id.name),
                    MemberProperty::Expression(expr) => self.generate_expression(expr, property)?,
                }
                self.emit(Instruction::DeleteObject { object, property, dst });
                self.give_up_register();
                self.give_up_register();
                Ok(())
            }
            (UnaryOperator::Delete, Expression::Identifier(_)) => {
                if self.is_strict() {
                    return Err(Error::syntax_error(
                        "Delete of an unqualified identifier in strict mode.",
                    ));
                }
                self.emit_literal(dst, Value::Boolean(false));
                Ok(())
            }
            (UnaryOperator::Delete, other) => {
                self.generate_expression(other, dst)?;
                self.emit_literal(dst, Value::Boolean(true));
                Ok(())
            }
            (UnaryOperator::Typeof, Expression::Identifier(id))
                if self.resolve_identifier(&id.name).location == IdentifierLocation::Named =>
            {
                self.emit(Instruction::TypeofByName {
                    dst,
                    name: id.name.clone(),
                });
                Ok(())
            }
            (UnaryOperator::Void, other) => {
                self.generate_expression(other, dst)?;
                self.emit_literal(dst, Value::Undefined);
                Ok(())
            }
            (op, other) => {
                self.generate_expression(other, dst)?;
                self.emit(Instruction::UnaryOperation { op, src: dst, dst });
                Ok(())
            }
        }
    }

    // ========================================================================
    // Member access
    // ========================================================================

    /// Generates the base of a member expression; `super` yields the
    /// object its property lookups start from.
    pub(crate) fn generate_member_object(&mut self, object: &Expression, dst: RegisterIndex) -> Result<(), Error> {
        match object {
            Expression::Super(sup) => self.generate_super_base(sup.kind, dst),
            other => self.generate_expression(other, dst),
        }
    }

    /// Evaluates a member's property. A register operand stays acquired
    /// until [`release_property`](Self::release_property).
    fn generate_property(&mut self, property: &MemberProperty) -> Result<PropertyOperand, Error> {
        Ok(match property {
            MemberProperty::Identifier(id) => PropertyOperand::Name(id.name.clone()),
            MemberProperty::Expression(expr) => {
                let register = self.get_register();
                self.generate_expression(expr, register)?;
                PropertyOperand::Register(register)
            }
        })
    }

    fn release_property(&mut self, property: &PropertyOperand) {
        if let PropertyOperand::Register(_) = property {
            self.give_up_register();
        }
    }

    fn emit_get_property(&mut self, object: RegisterIndex, property: &PropertyOperand, dst: RegisterIndex) {
        match property {
            PropertyOperand::Name(name) => self.emit(Instruction::GetObjectPreComputedCase {
                object,
                dst,
                name: name.clone(),
            }),
            PropertyOperand::Register(key) => self.emit(Instruction::GetObject {
                object,
                property: *key,
                dst,
            }),
        };
    }

    fn emit_set_property(&mut self, object: RegisterIndex, property: &PropertyOperand, value: RegisterIndex) {
        match property {
            PropertyOperand::Name(name) => self.emit(Instruction::SetObjectPreComputedCase {
                object,
                name: name.clone(),
                value,
            }),
            PropertyOperand::Register(key) => self.emit(Instruction::SetObject {
                object,
                property: *key,
                value,
            }),
        };
    }

    pub(crate) fn emit_get_named(&mut self, object: RegisterIndex, name: &str, dst: RegisterIndex) {
        self.emit(Instruction::GetObjectPreComputedCase {
            object,
            dst,
            name: name.to_string(),
        });
    }

    fn generate_member(&mut self, member: &MemberExpression, dst: RegisterIndex) -> Result<(), Error> {
        let object = self.get_register();
        self.generate_member_object(&member.object, object)?;
        let property = self.generate_property(&member.property)?;
        self.emit_get_property(object, &property, dst);
        self.release_property(&property);
        self.give_up_register();
        Ok(())
    }

    // ========================================================================
    // Assignment and update
    // ========================================================================

    fn generate_assignment(&mut self, assign: &AssignmentExpression, dst: RegisterIndex) -> Result<(), Error> {
        let compound = compound_operator(assign.operator);
        match assign.left.as_ref() {
            Expression::Identifier(id) => {
                match compound {
                    None => self.generate_expression(&assign.right, dst)?,
                    Some(op) if is_logical(op) => {
                        self.emit_load_identifier(&id.name, dst);
                        let skip = self.emit_short_circuit(op, dst);
                        self.generate_expression(&assign.right, dst)?;
                        self.emit_store_identifier(&id.name, dst, false);
                        self.patch_jump_to_here(skip);
                        return Ok(());
                    }
                    Some(op) => {
                        self.emit_load_identifier(&id.name, dst);
                        let right = self.get_register();
                        self.generate_expression(&assign.right, right)?;
                        self.emit(Instruction::BinaryOperation {
                            op,
                            left: dst,
                            right,
                            dst,
                        });
                        self.give_up_register();
                    }
                }
                self.emit_store_identifier(&id.name, dst, false);
                Ok(())
            }
            Expression::Member(member) => {
                let object = self.get_register();
                self.generate_member_object(&member.object, object)?;
                let property = self.generate_property(&member.property)?;
                match compound {
                    None => {
                        self.generate_expression(&assign.right, dst)?;
                        self.emit_set_property(object, &property, dst);
                    }
                    Some(op) if is_logical(op) => {
                        self.emit_get_property(object, &property, dst);
                        let skip = self.emit_short_circuit(op, dst);
                        self.generate_expression(&assign.right, dst)?;
                        self.emit_set_property(object, &property, dst);
                        self.patch_jump_to_here(skip);
                    }
                    Some(op) => {
                        self.emit_get_property(object, &property, dst);
                        let right = self.get_register();
                        self.generate_expression(&assign.right, right)?;
                        self.emit(Instruction::BinaryOperation {
                            op,
                            left: dst,
                            right,
                            dst,
                        });
                        self.give_up_register();
                        self.emit_set_property(object, &property, dst);
                    }
                }
                self.release_property(&property);
                self.give_up_register();
                Ok(())
            }
            _ => Err(Error::syntax_error("Invalid left-hand side in assignment")),
        }
    }

    fn generate_update(&mut self, update: &UpdateExpression, dst: RegisterIndex) -> Result<(), Error> {
        let op = match update.operator {
            UpdateOperator::Increment => BinaryOperator::Add,
            UpdateOperator::Decrement => BinaryOperator::Subtract,
        };
        match update.argument.as_ref() {
            Expression::Identifier(id) => {
                self.emit_load_identifier(&id.name, dst);
                let updated = self.emit_updated_value(op, dst);
                self.emit_store_identifier(&id.name, updated, false);
                self.finish_update(update.prefix, updated, dst);
                Ok(())
            }
            Expression::Member(member) => {
                let object = self.get_register();
                self.generate_member_object(&member.object, object)?;
                let property = self.generate_property(&member.property)?;
                self.emit_get_property(object, &property, dst);
                let updated = self.emit_updated_value(op, dst);
                self.emit_set_property(object, &property, updated);
                self.finish_update(update.prefix, updated, dst);
                self.release_property(&property);
                self.give_up_register();
                Ok(())
            }
            _ => Err(Error::syntax_error(
                "Invalid left-hand side expression in update operation",
            )),
        }
    }

    /// Converts `value` to a number in place and returns a newly acquired
    /// register holding `value op 1`.
    fn emit_updated_value(&mut self, op: BinaryOperator, value: RegisterIndex) -> RegisterIndex {
        self.emit(Instruction::ToNumber { src: value, dst: value });
        let updated = self.get_register();
        self.emit_literal(updated, Value::Number(1.0));
        self.emit(Instruction::BinaryOperation {
            op,
            left: value,
            right: updated,
            dst: updated,
        });
        updated
    }

    fn finish_update(&mut self, prefix: bool, updated: RegisterIndex, dst: RegisterIndex) {
        if prefix {
            self.emit(Instruction::Move { src: updated, dst });
        }
        self.give_up_register();
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Evaluates arguments into consecutive registers.
    ///
    /// `callee_parts` are the expressions evaluated before the arguments;
    /// they take part in the aliasing check of the direct register path.
    fn generate_arguments(
        &mut self,
        arguments: &[Expression],
        callee_parts: &[&Expression],
    ) -> Result<CallArguments, Error> {
        let spread_positions: Vec<u16> = arguments
            .iter()
            .enumerate()
            .filter(|(_, arg)| matches!(arg, Expression::Spread(_)))
            .map(|(position, _)| position as u16)
            .collect();

        let mut parts: Vec<&Expression> = callee_parts.to_vec();
        parts.extend(arguments.iter());
        let use_direct = self.shared.direct_register_fast_path
            && spread_positions.is_empty()
            && arguments.len() < DIRECT_REGISTER_ARGUMENT_LIMIT
            && can_use_direct_register(&parts);

        if use_direct {
            let saved = std::mem::replace(&mut self.can_skip_copy_to_register, true);
            let mut registers = Vec::with_capacity(arguments.len());
            for arg in arguments {
                match self.generate_expression_to_register(arg) {
                    Ok(register) => registers.push(register),
                    Err(err) => {
                        self.can_skip_copy_to_register = saved;
                        return Err(err);
                    }
                }
            }
            self.can_skip_copy_to_register = saved;

            let sorted = registers.windows(2).all(|pair| pair[1] == pair[0] + 1);
            if sorted {
                return Ok(CallArguments {
                    start: registers.first().copied().unwrap_or(0),
                    count: registers.len(),
                    held: registers.len(),
                    spread: None,
                });
            }
            let start = self.acquire_consecutive(registers.len());
            for (offset, src) in registers.iter().enumerate() {
                self.emit(Instruction::Move {
                    src: *src,
                    dst: start + offset as RegisterIndex,
                });
            }
            return Ok(CallArguments {
                start,
                count: registers.len(),
                held: registers.len() * 2,
                spread: None,
            });
        }

        let start = self.acquire_consecutive(arguments.len());
        for (offset, arg) in arguments.iter().enumerate() {
            let value = match arg {
                Expression::Spread(inner) => inner.as_ref(),
                other => other,
            };
            self.generate_expression(value, start + offset as RegisterIndex)?;
        }
        let spread = (!spread_positions.is_empty()).then(|| self.block.push_spread_index(spread_positions));
        Ok(CallArguments {
            start,
            count: arguments.len(),
            held: arguments.len(),
            spread,
        })
    }

    fn acquire_consecutive(&mut self, count: usize) -> RegisterIndex {
        let mut start = None;
        for _ in 0..count {
            let register = self.get_register();
            start.get_or_insert(register);
        }
        start.unwrap_or(0)
    }

    fn release_arguments(&mut self, arguments: &CallArguments) {
        for _ in 0..arguments.held {
            self.give_up_register();
        }
    }

    fn generate_call(&mut self, call: &CallExpression, dst: RegisterIndex) -> Result<(), Error> {
        let has_spread = call.arguments.iter().any(|arg| matches!(arg, Expression::Spread(_)));
        match call.callee.as_ref() {
            Expression::Super(sup) if sup.kind == SuperKind::Constructor => self.generate_super_call(call, dst),
            Expression::Identifier(id) if id.name == "eval" && !has_spread => {
                let eval = self.get_register();
                self.emit_load_identifier(&id.name, eval);
                let args = self.generate_arguments(&call.arguments, &[&call.callee])?;
                self.emit(Instruction::CallEvalFunction {
                    eval,
                    args_start: args.start,
                    argc: args.count,
                    dst,
                    in_with_scope: self.is_with_scope,
                });
                self.release_arguments(&args);
                self.give_up_register();
                Ok(())
            }
            Expression::Identifier(id) if self.is_with_scope => {
                let args = self.generate_arguments(&call.arguments, &[&call.callee])?;
                self.emit(Instruction::CallFunctionInWithScope {
                    name: id.name.clone(),
                    args_start: args.start,
                    argc: args.count,
                    dst,
                    spread: args.spread,
                });
                self.release_arguments(&args);
                Ok(())
            }
            Expression::Member(member) => {
                let receiver = self.get_register();
                let callee = self.get_register();
                if let Expression::Super(sup) = member.object.as_ref() {
                    self.emit_load_this(receiver);
                    self.generate_super_base(sup.kind, callee)?;
                    let property = self.generate_property(&member.property)?;
                    self.emit_get_property(callee, &property, callee);
                    self.release_property(&property);
                } else {
                    self.generate_expression(&member.object, receiver)?;
                    let property = self.generate_property(&member.property)?;
                    self.emit_get_property(receiver, &property, callee);
                    self.release_property(&property);
                }
                let args = self.generate_arguments(&call.arguments, &[&call.callee])?;
                self.emit(Instruction::CallFunctionWithReceiver {
                    receiver,
                    callee,
                    args_start: args.start,
                    argc: args.count,
                    dst,
                    spread: args.spread,
                });
                self.release_arguments(&args);
                self.give_up_register();
                self.give_up_register();
                Ok(())
            }
            other => {
                let callee = self.get_register();
                self.generate_expression(other, callee)?;
                let args = self.generate_arguments(&call.arguments, &[other])?;
                self.emit(Instruction::CallFunction {
                    callee,
                    args_start: args.start,
                    argc: args.count,
                    dst,
                    spread: args.spread,
                });
                self.release_arguments(&args);
                self.give_up_register();
                Ok(())
            }
        }
    }

    fn generate_new(&mut self, new: &NewExpression, dst: RegisterIndex) -> Result<(), Error> {
        let callee = self.get_register();
        self.generate_expression(&new.callee, callee)?;
        let args = self.generate_arguments(&new.arguments, &[&new.callee])?;
        self.emit(Instruction::NewOperation {
            callee,
            args_start: args.start,
            argc: args.count,
            dst,
            spread: args.spread,
        });
        self.release_arguments(&args);
        self.give_up_register();
        Ok(())
    }

    // ========================================================================
    // super
    // ========================================================================

    /// `super(args...)`: calls the parent constructor through its `call`
    /// method with the current `this` as the implicit first argument.
    fn generate_super_call(&mut self, call: &CallExpression, dst: RegisterIndex) -> Result<(), Error> {
        let parent = self.get_register();
        self.generate_super_base(SuperKind::Constructor, parent)?;
        let callee = self.get_register();
        self.emit_get_named(parent, "call", callee);

        let start = self.acquire_consecutive(call.arguments.len() + 1);
        self.emit_load_this(start);
        let mut spread_positions = Vec::new();
        for (offset, arg) in call.arguments.iter().enumerate() {
            let value = match arg {
                Expression::Spread(inner) => {
                    spread_positions.push(offset as u16 + 1);
                    inner.as_ref()
                }
                other => other,
            };
            self.generate_expression(value, start + offset as RegisterIndex + 1)?;
        }
        let spread = (!spread_positions.is_empty()).then(|| self.block.push_spread_index(spread_positions));
        self.emit(Instruction::CallFunctionWithReceiver {
            receiver: parent,
            callee,
            args_start: start,
            argc: call.arguments.len() + 1,
            dst,
            spread,
        });
        for _ in 0..call.arguments.len() + 1 {
            self.give_up_register();
        }
        self.give_up_register();
        self.give_up_register();
        Ok(())
    }

    /// Loads the object a `super` reference of `kind` starts from.
    pub(crate) fn generate_super_base(&mut self, kind: SuperKind, dst: RegisterIndex) -> Result<(), Error> {
        if kind == SuperKind::Undefined {
            unreachable!("unclassified super reference reached code generation");
        }
        let home = self.home_code_block();
        if !home.is_method_property() {
            return Err(Error::syntax_error("'super' keyword unexpected here"));
        }
        match kind {
            SuperKind::Constructor => {
                if !home.is_constructor() {
                    return Err(Error::syntax_error("'super' keyword unexpected here"));
                }
                if self.code_block().is_arrow_function_expression() {
                    self.emit_load_this(dst);
                    self.emit_get_named(dst, "__proto__", dst);
                    self.emit_get_named(dst, "constructor", dst);
                    self.emit_get_named(dst, "__proto__", dst);
                } else {
                    // Stack slot 1 holds the running constructor.
                    self.emit_get_named(stack_register(1), "__proto__", dst);
                }
            }
            SuperKind::Access => {
                self.emit_load_this(dst);
                self.emit_get_named(dst, "__proto__", dst);
                if !home.is_static() {
                    self.emit_get_named(dst, "constructor", dst);
                    self.emit_get_named(dst, "__proto__", dst);
                    self.emit_get_named(dst, "prototype", dst);
                }
            }
            SuperKind::Assign => self.emit_load_this(dst),
            SuperKind::Undefined => unreachable!(),
        }
        Ok(())
    }
}
