//! Bytecode interpreter.
//!
//! Each call of an interpreted function runs in its own [`Frame`]: a register
//! file for temporaries, a stack for the code block's stack-allocated
//! variables (slot 0 is `this`, slot 1 the callee) and the current
//! environment. Codegen emits no prologue; [`Realm::call_interpreted`] sets
//! up `this`, the heap environment, parameters and `arguments` before the
//! first instruction runs.

use std::rc::Rc;

use tracing::{debug, instrument, trace};

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::compiler::bytecode::{
    ByteCodeBlock, Instruction, REGULAR_REGISTER_LIMIT, RegisterIndex, StaticErrorKind, THIS_REGISTER,
};
use crate::compiler::Script;
use crate::compiler::code_block::{CodeBlock, CodeBlockId, CodeBlockKind, NON_INDEXED_PARAMETER, NativeFunctionInfo};
use crate::error::{Error, JsResult};
use crate::runtime::environment::{DeclarativeRecord, EnvRef, Environment, EnvironmentRecord, SlotBinding};
use crate::runtime::function::{FunctionCode, FunctionObject, InterpretedFunction};
use crate::runtime::object::{ObjectKind, ObjectRef};
use crate::runtime::property::{PartialDescriptor, PropertyDescriptor, PropertyKey};
use crate::runtime::proxy;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;
use crate::vm::comparison::{abstract_equals, less_than};

/// An installed `try` handler.
#[derive(Debug, Clone)]
struct Handler {
    target: usize,
    exception_dst: RegisterIndex,
    env: EnvRef,
}

/// Activation state of one code block.
struct Frame {
    script: Rc<Script>,
    code_block: CodeBlockId,
    registers: Vec<Value>,
    stack: Vec<Value>,
    env: EnvRef,
    handlers: Vec<Handler>,
    strict: bool,
    pc: usize,
}

impl Frame {
    fn new(script: Rc<Script>, code_block: CodeBlockId, env: EnvRef) -> Self {
        let block = script.code_block(code_block);
        let strict = block.is_strict();
        let stack = vec![Value::Undefined; block.identifier_on_stack_count().max(2)];
        let registers = vec![Value::Undefined; script.byte_code(code_block).required_register_count];
        Self {
            script,
            code_block,
            registers,
            stack,
            env,
            handlers: Vec::new(),
            strict,
            pc: 0,
        }
    }

    fn get(&self, register: RegisterIndex) -> Value {
        let slot = if register >= REGULAR_REGISTER_LIMIT {
            self.stack.get((register - REGULAR_REGISTER_LIMIT) as usize)
        } else {
            self.registers.get(register as usize)
        };
        slot.cloned().unwrap_or_default()
    }

    fn set(&mut self, register: RegisterIndex, value: Value) {
        let (file, index) = if register >= REGULAR_REGISTER_LIMIT {
            (&mut self.stack, (register - REGULAR_REGISTER_LIMIT) as usize)
        } else {
            (&mut self.registers, register as usize)
        };
        if index >= file.len() {
            file.resize(index + 1, Value::Undefined);
        }
        file[index] = value;
    }

    fn set_stack(&mut self, slot: usize, value: Value) {
        self.set(REGULAR_REGISTER_LIMIT + slot as RegisterIndex, value);
    }

    /// Whether this frame runs function code (directly or through an eval inside one).
    fn in_function(&self) -> bool {
        let block = self.script.code_block(self.code_block);
        match block.kind() {
            CodeBlockKind::Function => true,
            CodeBlockKind::Eval => block.is_eval_code_in_function(),
            CodeBlockKind::Global => false,
        }
    }
}

/// Where a name resolved to.
enum NameReference<'e> {
    Slot(&'e DeclarativeRecord, SlotBinding),
    Object { object: ObjectRef, is_with: bool },
    Unresolved,
}

impl Realm {
    // ========================================================================
    // Entry points
    // ========================================================================

    /// Runs a compiled program in the global environment and returns its
    /// completion value.
    #[instrument(level = "debug", skip_all, fields(blocks = script.code_blocks.len()))]
    pub fn run_script(&mut self, script: Rc<Script>) -> JsResult<Value> {
        let root = script.root();
        let global = self.global_object();
        let names: Vec<String> = script
            .code_block(root)
            .identifier_infos()
            .iter()
            .map(|info| info.name.clone())
            .collect();
        for name in names {
            let key = PropertyKey::from(name);
            if !self.has_property(global, &key)? {
                self.define_own_property(
                    global,
                    key,
                    PropertyDescriptor::data_with(Value::Undefined, true, true, false).into(),
                )?;
            }
        }

        let mut frame = Frame::new(script, root, self.global_env());
        frame.set_stack(0, Value::Object(global));
        let result = self.execute(&mut frame);
        debug!(ok = result.is_ok(), "script finished");
        result
    }

    /// Evaluates `source` the way an indirect `eval` does: global scope,
    /// sloppy mode.
    pub(crate) fn global_eval(&mut self, source: &str) -> JsResult<Value> {
        let script = self.compile_eval_source(source, false, false)?;
        let this = Value::Object(self.global_object());
        let outer = self.global_env();
        self.run_eval(script, outer, this)
    }

    fn compile_eval_source(&mut self, source: &str, strict: bool, in_function: bool) -> JsResult<Rc<Script>> {
        let Some(parser) = self.source_parser.clone() else {
            return Err(Error::syntax_error("eval is unavailable without a source parser"));
        };
        let program = parser.parse(source)?;
        Ok(Rc::new(self.compiler.compile_eval(&program, strict, in_function)?))
    }

    fn direct_eval(&mut self, caller: &Frame, argument: Option<&Value>) -> JsResult<Value> {
        let Some(Value::String(source)) = argument else {
            return Ok(argument.cloned().unwrap_or_default());
        };
        let script = self.compile_eval_source(source, caller.strict, caller.in_function())?;
        self.run_eval(script, caller.env.clone(), caller.get(THIS_REGISTER))
    }

    fn run_eval(&mut self, script: Rc<Script>, outer: EnvRef, this: Value) -> JsResult<Value> {
        let root = script.root();
        let env = Environment::new_declarative(script.clone(), root, Some(outer));
        let mut frame = Frame::new(script, root, env);
        frame.set_stack(0, this);
        self.execute(&mut frame)
    }

    // ========================================================================
    // Call and Construct
    // ========================================================================

    /// Guards both the script call depth and the native stack the nested
    /// `call` / `execute` frames have consumed since the outermost call.
    fn enter_call(&mut self) -> JsResult<()> {
        let marker = 0u8;
        let here = std::hint::black_box(&marker) as *const u8 as usize;
        if self.call_depth == 0 {
            self.native_stack_base = here;
        }
        let used = here.abs_diff(self.native_stack_base);
        if self.call_depth >= self.config.max_call_depth || used > self.config.max_native_stack_bytes {
            debug!(depth = self.call_depth, used, "call stack exhausted");
            return Err(Error::RangeError("Maximum call stack size exceeded".to_string()));
        }
        self.call_depth += 1;
        Ok(())
    }

    /// `[[Call]]`
    pub fn call(&mut self, callee: &Value, this: &Value, args: &[Value]) -> JsResult<Value> {
        let Some(function) = callee.as_object() else {
            return Err(Error::type_error(format!("{} is not a function", self.describe(callee))));
        };
        let code = match &self.heap.get(function).kind {
            ObjectKind::Function(FunctionObject { code }) => code.clone(),
            ObjectKind::RevocableFunction(_) => return self.call_revoker(function),
            _ => return Err(Error::type_error(format!("{} is not a function", self.describe(callee)))),
        };

        self.enter_call()?;
        let result = match code {
            FunctionCode::Native(native) => match &native.info {
                NativeFunctionInfo::Function(f) => f(self, this, args, false),
                NativeFunctionInfo::Bound {
                    target,
                    bound_this,
                    bound_arguments,
                } => {
                    let mut all = bound_arguments.clone();
                    all.extend_from_slice(args);
                    self.call(&Value::Object(*target), bound_this, &all)
                }
            },
            FunctionCode::Interpreted(interpreted) => self.call_interpreted(&interpreted, function, this, args),
        };
        self.call_depth -= 1;
        result
    }

    /// `[[Construct]]`
    pub fn construct(&mut self, callee: &Value, args: &[Value]) -> JsResult<Value> {
        let constructor = callee.as_object().and_then(|function| match &self.heap.get(function).kind {
            ObjectKind::Function(f) if f.is_constructor() => Some((function, f.code.clone())),
            _ => None,
        });
        let Some((function, code)) = constructor else {
            return Err(Error::type_error(format!("{} is not a constructor", self.describe(callee))));
        };

        self.enter_call()?;
        let result = match code {
            FunctionCode::Native(native) => match &native.info {
                NativeFunctionInfo::Function(f) => f(self, &Value::Undefined, args, true),
                NativeFunctionInfo::Bound { target, bound_arguments, .. } => {
                    let mut all = bound_arguments.clone();
                    all.extend_from_slice(args);
                    self.construct(&Value::Object(*target), &all)
                }
            },
            FunctionCode::Interpreted(interpreted) => {
                self.construct_interpreted(&interpreted, function, args)
            }
        };
        self.call_depth -= 1;
        result
    }

    fn construct_interpreted(
        &mut self,
        interpreted: &InterpretedFunction,
        function: ObjectRef,
        args: &[Value],
    ) -> JsResult<Value> {
        let prototype = match self.get(function, &"prototype".into(), &Value::Object(function))? {
            Value::Object(prototype) => prototype,
            _ => self.intrinsics.object_prototype,
        };
        let this = Value::Object(self.new_object_with_prototype(Some(prototype)));
        let result = self.call_interpreted(interpreted, function, &this, args)?;
        Ok(if result.is_object() { result } else { this })
    }

    fn call_revoker(&mut self, revoker: ObjectRef) -> JsResult<Value> {
        let revocable = match &mut self.heap.get_mut(revoker).kind {
            ObjectKind::RevocableFunction(state) => state.revocable.take(),
            _ => None,
        };
        if let Some(proxy_object) = revocable {
            proxy::revoke(self, proxy_object);
        }
        Ok(Value::Undefined)
    }

    fn call_interpreted(
        &mut self,
        function: &InterpretedFunction,
        callee: ObjectRef,
        this: &Value,
        args: &[Value],
    ) -> JsResult<Value> {
        let script = function.script.clone();
        let id = function.code_block;
        let block = script.code_block(id);
        trace!(name = block.function_name(), argc = args.len(), "call");

        let this = if block.is_arrow_function_expression() {
            function.lexical_this.clone()
        } else if !block.is_strict() && this.is_nullish() {
            Value::Object(self.global_object())
        } else {
            this.clone()
        };

        let env = if block.can_allocate_environment_on_stack() {
            function.environment.clone()
        } else {
            Environment::new_declarative(script.clone(), id, Some(function.environment.clone()))
        };
        let mut frame = Frame::new(script.clone(), id, env.clone());
        frame.set_stack(0, this.clone());
        frame.set_stack(1, Value::Object(callee));
        let record = env.declarative().filter(|_| !block.can_allocate_environment_on_stack());

        if block.is_function_name_save_on_heap() && !block.is_function_name_explicitly_declared() {
            if let Some((record, binding)) = record.and_then(|r| r.find(block.function_name()).map(|b| (r, b))) {
                record.set(binding.index, Value::Object(callee));
            }
        }
        if block.needs_to_store_this_value() {
            if let Some((record, binding)) = record.and_then(|r| r.find("this").map(|b| (r, b))) {
                record.set(binding.index, this);
            }
        }

        let argument = |i: usize| args.get(i).cloned().unwrap_or_default();
        if !block.needs_complex_parameter_copy() {
            for (i, parameter) in block.parameters().iter().enumerate() {
                frame.set_stack((parameter.index + 2) as usize, argument(i));
            }
        } else {
            for (i, parameter) in block.parameters().iter().enumerate() {
                if parameter.is_duplicated {
                    continue;
                }
                if parameter.is_heap_allocated {
                    let index = if parameter.index == NON_INDEXED_PARAMETER {
                        record.and_then(|r| r.find(&parameter.name)).map(|b| b.index)
                    } else {
                        Some(parameter.index as usize)
                    };
                    if let (Some(record), Some(index)) = (record, index) {
                        record.set(index, argument(i));
                    }
                } else {
                    frame.set_stack((parameter.index + 2) as usize, argument(i));
                }
            }
        }

        if block.uses_arguments_object() {
            let arguments = Value::Object(self.new_arguments_object(args));
            if let Some(info) = block.identifier("arguments") {
                if info.need_to_allocate_on_stack {
                    frame.set_stack(info.index_for_indexed_storage, arguments);
                } else if let Some(record) = record {
                    record.set(info.index_for_indexed_storage, arguments);
                }
            }
        }

        self.execute(&mut frame)
    }

    // ========================================================================
    // Dispatch loop
    // ========================================================================

    fn execute(&mut self, frame: &mut Frame) -> JsResult<Value> {
        let script = frame.script.clone();
        let byte_code = script.byte_code(frame.code_block);
        loop {
            let Some(instruction) = byte_code.code.get(frame.pc) else {
                return Ok(Value::Undefined);
            };
            frame.pc += 1;
            match self.step(frame, byte_code, instruction) {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(error) => {
                    let Some(handler) = frame.handlers.pop() else {
                        return Err(error);
                    };
                    trace!(%error, target = handler.target, "exception caught");
                    let value = self.error_to_value(error);
                    frame.env = handler.env;
                    frame.set(handler.exception_dst, value);
                    frame.pc = handler.target;
                }
            }
        }
    }

    fn step(&mut self, frame: &mut Frame, byte_code: &ByteCodeBlock, instruction: &Instruction) -> JsResult<Option<Value>> {
        match instruction {
            Instruction::LoadLiteral { dst, value } => frame.set(*dst, value.clone()),
            Instruction::Move { src, dst } => frame.set(*dst, frame.get(*src)),

            Instruction::LoadByName { dst, name } => {
                let env = frame.env.clone();
                let value = match self.resolve_name(&env, name)? {
                    NameReference::Unresolved => {
                        return Err(Error::reference_error(format!("{name} is not defined")));
                    }
                    reference => self.read_reference(reference, name)?,
                };
                frame.set(*dst, value);
            }
            Instruction::StoreByName { src, name } => {
                let env = frame.env.clone();
                let value = frame.get(*src);
                self.store_by_name(&env, name, value, frame.strict)?;
            }
            Instruction::InitializeByName { src, name } => {
                let env = frame.env.clone();
                self.initialize_by_name(&env, name, frame.get(*src))?;
            }
            Instruction::TypeofByName { dst, name } => {
                let env = frame.env.clone();
                let type_name = match self.resolve_name(&env, name)? {
                    NameReference::Unresolved => "undefined",
                    reference => {
                        let value = self.read_reference(reference, name)?;
                        self.type_of(&value)
                    }
                };
                frame.set(*dst, Value::from(type_name));
            }
            Instruction::LoadByHeapIndex { dst, up_index, index } => {
                let value = heap_record(&frame.env, *up_index)?.get(*index);
                frame.set(*dst, value);
            }
            Instruction::StoreByHeapIndex { src, up_index, index } => {
                heap_record(&frame.env, *up_index)?.set(*index, frame.get(*src));
            }
            Instruction::GetGlobalObject { dst, name } => {
                let global = self.global_object();
                let value = self.get(global, &name.as_str().into(), &Value::Object(global))?;
                frame.set(*dst, value);
            }

            Instruction::GetObject { object, property, dst } => {
                let key = self.to_property_key(&frame.get(*property))?;
                let value = self.get_value(&frame.get(*object), &key)?;
                frame.set(*dst, value);
            }
            Instruction::SetObject { object, property, value } => {
                let key = self.to_property_key(&frame.get(*property))?;
                self.put_value(&frame.get(*object), key, frame.get(*value), frame.strict)?;
            }
            Instruction::GetObjectPreComputedCase { object, dst, name } => {
                let value = self.get_value(&frame.get(*object), &name.as_str().into())?;
                frame.set(*dst, value);
            }
            Instruction::SetObjectPreComputedCase { object, name, value } => {
                self.put_value(&frame.get(*object), name.as_str().into(), frame.get(*value), frame.strict)?;
            }
            Instruction::DeleteObject { object, property, dst } => {
                let base = frame.get(*object);
                let key = self.to_property_key(&frame.get(*property))?;
                let deleted = match base {
                    Value::Undefined | Value::Null => {
                        return Err(Error::type_error("Cannot convert undefined or null to object"));
                    }
                    Value::Object(obj) => self.delete(obj, &key)?,
                    _ => true,
                };
                if !deleted && frame.strict {
                    return Err(Error::type_error(format!("Cannot delete property '{key}' of object")));
                }
                frame.set(*dst, Value::Boolean(deleted));
            }

            Instruction::CreateObject { dst } => {
                let object = self.new_object();
                frame.set(*dst, Value::Object(object));
            }
            Instruction::CreateArray { dst, length } => {
                let array = self.new_array(Vec::new());
                self.set(array, "length".into(), Value::Number(*length as f64), &Value::Object(array))?;
                frame.set(*dst, Value::Object(array));
            }
            Instruction::ArrayDefineOwnProperty { array, index, value } => {
                let array = expect_object(&frame.get(*array))?;
                self.create_data_property(array, PropertyKey::from(*index), frame.get(*value))?;
            }
            Instruction::ObjectDefineOwnProperty { object, property, value } => {
                let object = expect_object(&frame.get(*object))?;
                let key = self.to_property_key(&frame.get(*property))?;
                self.create_data_property(object, key, frame.get(*value))?;
            }
            Instruction::ObjectDefineGetter { object, property, getter } => {
                self.define_accessor(frame, *object, *property, *getter, true)?;
            }
            Instruction::ObjectDefineSetter { object, property, setter } => {
                self.define_accessor(frame, *object, *property, *setter, false)?;
            }
            Instruction::CreateFunction { dst, code_block } => {
                let function = self.create_function(frame, *code_block)?;
                frame.set(*dst, Value::Object(function));
            }

            Instruction::CallFunction {
                callee,
                args_start,
                argc,
                dst,
                spread,
            } => {
                let args = self.collect_arguments(frame, byte_code, *args_start, *argc, *spread)?;
                let result = self.call(&frame.get(*callee), &Value::Undefined, &args)?;
                frame.set(*dst, result);
            }
            Instruction::CallFunctionWithReceiver {
                receiver,
                callee,
                args_start,
                argc,
                dst,
                spread,
            } => {
                let args = self.collect_arguments(frame, byte_code, *args_start, *argc, *spread)?;
                let result = self.call(&frame.get(*callee), &frame.get(*receiver), &args)?;
                frame.set(*dst, result);
            }
            Instruction::CallEvalFunction {
                eval,
                args_start,
                argc,
                dst,
                in_with_scope,
            } => {
                let callee = frame.get(*eval);
                let args = self.collect_arguments(frame, byte_code, *args_start, *argc, None)?;
                let is_direct = self.intrinsics.eval.is_some_and(|eval| callee.as_object() == Some(eval));
                let result = if is_direct {
                    trace!(in_with_scope = *in_with_scope, "direct eval");
                    self.direct_eval(frame, args.first())?
                } else {
                    self.call(&callee, &Value::Undefined, &args)?
                };
                frame.set(*dst, result);
            }
            Instruction::CallFunctionInWithScope {
                name,
                args_start,
                argc,
                dst,
                spread,
            } => {
                let env = frame.env.clone();
                let (callee, receiver) = match self.resolve_name(&env, name)? {
                    NameReference::Unresolved => {
                        return Err(Error::reference_error(format!("{name} is not defined")));
                    }
                    NameReference::Object { object, is_with: true } => {
                        let callee = self.get(object, &name.as_str().into(), &Value::Object(object))?;
                        (callee, Value::Object(object))
                    }
                    reference => (self.read_reference(reference, name)?, Value::Undefined),
                };
                let args = self.collect_arguments(frame, byte_code, *args_start, *argc, *spread)?;
                let result = self.call(&callee, &receiver, &args)?;
                frame.set(*dst, result);
            }
            Instruction::NewOperation {
                callee,
                args_start,
                argc,
                dst,
                spread,
            } => {
                let args = self.collect_arguments(frame, byte_code, *args_start, *argc, *spread)?;
                let result = self.construct(&frame.get(*callee), &args)?;
                frame.set(*dst, result);
            }

            Instruction::BinaryOperation { op, left, right, dst } => {
                let result = self.binary_operation(*op, &frame.get(*left), &frame.get(*right))?;
                frame.set(*dst, result);
            }
            Instruction::UnaryOperation { op, src, dst } => {
                let result = self.unary_operation(*op, &frame.get(*src))?;
                frame.set(*dst, result);
            }
            Instruction::ToNumber { src, dst } => {
                let number = self.to_number(&frame.get(*src))?;
                frame.set(*dst, Value::Number(number));
            }

            Instruction::Jump { target } => frame.pc = *target,
            Instruction::JumpIfTrue { cond, target } => {
                if frame.get(*cond).to_boolean() {
                    frame.pc = *target;
                }
            }
            Instruction::JumpIfFalse { cond, target } => {
                if !frame.get(*cond).to_boolean() {
                    frame.pc = *target;
                }
            }
            Instruction::JumpIfNotNullish { src, target } => {
                if !frame.get(*src).is_nullish() {
                    frame.pc = *target;
                }
            }

            Instruction::ThrowOperation { src } => return Err(Error::Thrown(frame.get(*src))),
            Instruction::ThrowStaticError { kind, message } => {
                return Err(match kind {
                    StaticErrorKind::TypeError => Error::type_error(message.clone()),
                    StaticErrorKind::ReferenceError => Error::reference_error(message.clone()),
                });
            }
            Instruction::TryOperation { handler, exception_dst } => {
                frame.handlers.push(Handler {
                    target: *handler,
                    exception_dst: *exception_dst,
                    env: frame.env.clone(),
                });
            }
            Instruction::TryExit => {
                frame.handlers.pop();
            }
            Instruction::WithOperation { object } => {
                let Value::Object(object) = frame.get(*object) else {
                    return Err(Error::type_error("Cannot convert undefined or null to object"));
                };
                frame.env = Environment::new_with(object, frame.env.clone());
            }
            Instruction::WithExit => {
                let Some(outer) = frame.env.outer.clone() else {
                    return Err(Error::InternalError("with exit without an enclosing environment".to_string()));
                };
                frame.env = outer;
            }

            Instruction::EnumerateObject { object, dst } => {
                let keys = match frame.get(*object) {
                    Value::Object(obj) => self
                        .enumerate(obj)?
                        .into_iter()
                        .map(|key| key.to_value())
                        .collect(),
                    Value::String(s) => (0..s.chars().count())
                        .map(|i| Value::String(i.to_string()))
                        .collect(),
                    _ => Vec::new(),
                };
                let keys = self.new_array(keys);
                frame.set(*dst, Value::Object(keys));
            }
            Instruction::EnumerateObjectKey { keys, index, dst, exit } => {
                let keys = expect_object(&frame.get(*keys))?;
                let cursor = frame.get(*index).to_number() as u32;
                if cursor >= self.length_of_array_like(keys)? {
                    frame.pc = *exit;
                } else {
                    let key = self.get(keys, &PropertyKey::from(cursor), &Value::Object(keys))?;
                    frame.set(*dst, key);
                    frame.set(*index, Value::Number(cursor as f64 + 1.0));
                }
            }

            Instruction::ReturnFunction { src } | Instruction::End { src } => {
                return Ok(Some(frame.get(*src)));
            }
        }
        Ok(None)
    }

    // ========================================================================
    // Instruction helpers
    // ========================================================================

    fn resolve_name<'e>(&mut self, env: &'e EnvRef, name: &str) -> JsResult<NameReference<'e>> {
        let key = PropertyKey::from(name);
        for link in env.chain() {
            match &link.record {
                EnvironmentRecord::Declarative(record) => {
                    if let Some(binding) = record.find(name) {
                        return Ok(NameReference::Slot(record, binding));
                    }
                }
                EnvironmentRecord::With(object) => {
                    if self.has_property(*object, &key)? {
                        return Ok(NameReference::Object {
                            object: *object,
                            is_with: true,
                        });
                    }
                }
                EnvironmentRecord::Global(object) => {
                    if self.has_property(*object, &key)? {
                        return Ok(NameReference::Object {
                            object: *object,
                            is_with: false,
                        });
                    }
                }
            }
        }
        Ok(NameReference::Unresolved)
    }

    fn read_reference(&mut self, reference: NameReference<'_>, name: &str) -> JsResult<Value> {
        match reference {
            NameReference::Slot(record, binding) => Ok(record.get(binding.index)),
            NameReference::Object { object, .. } => self.get(object, &name.into(), &Value::Object(object)),
            NameReference::Unresolved => Ok(Value::Undefined),
        }
    }

    fn store_by_name(&mut self, env: &EnvRef, name: &str, value: Value, strict: bool) -> JsResult<()> {
        match self.resolve_name(env, name)? {
            NameReference::Slot(record, binding) => {
                if binding.is_mutable {
                    record.set(binding.index, value);
                } else if strict {
                    return Err(Error::type_error("Assignment to constant variable."));
                }
                Ok(())
            }
            NameReference::Object { object, .. } => {
                self.put_value(&Value::Object(object), name.into(), value, strict)
            }
            NameReference::Unresolved if strict => {
                Err(Error::reference_error(format!("{name} is not defined")))
            }
            NameReference::Unresolved => {
                let global = Value::Object(self.global_object());
                self.put_value(&global, name.into(), value, false)
            }
        }
    }

    fn initialize_by_name(&mut self, env: &EnvRef, name: &str, value: Value) -> JsResult<()> {
        for link in env.chain() {
            match &link.record {
                EnvironmentRecord::Declarative(record) => {
                    if let Some(binding) = record.find(name) {
                        record.set(binding.index, value);
                        return Ok(());
                    }
                }
                EnvironmentRecord::With(_) => {}
                EnvironmentRecord::Global(object) => {
                    return self.put_value(&Value::Object(*object), name.into(), value, false);
                }
            }
        }
        Err(Error::InternalError(format!("no environment to initialize {name}")))
    }

    fn define_accessor(
        &mut self,
        frame: &Frame,
        object: RegisterIndex,
        property: RegisterIndex,
        function: RegisterIndex,
        is_getter: bool,
    ) -> JsResult<()> {
        let object = expect_object(&frame.get(object))?;
        let key = self.to_property_key(&frame.get(property))?;
        let function = frame.get(function).as_object();
        let desc = PartialDescriptor {
            get: is_getter.then_some(function),
            set: (!is_getter).then_some(function),
            enumerable: Some(false),
            configurable: Some(true),
            ..Default::default()
        };
        self.define_own_property(object, key, desc)?;
        Ok(())
    }

    fn create_function(&mut self, frame: &Frame, code_block: CodeBlockId) -> JsResult<ObjectRef> {
        let child = frame.script.code_block(code_block);
        let lexical_this = if child.is_arrow_function_expression() {
            frame.get(THIS_REGISTER)
        } else {
            Value::Undefined
        };
        let is_constructor = child.is_constructor();
        let function = self.new_function_object(FunctionObject {
            code: FunctionCode::Interpreted(InterpretedFunction {
                script: frame.script.clone(),
                code_block,
                environment: frame.env.clone(),
                lexical_this,
            }),
        });
        if is_constructor {
            let prototype = self.new_object();
            self.define_builtin(prototype, "constructor", Value::Object(function));
            self.heap.get_mut(function).insert(
                "prototype".into(),
                PropertyDescriptor::data_with(Value::Object(prototype), true, false, false),
            );
        }
        Ok(function)
    }

    fn collect_arguments(
        &mut self,
        frame: &Frame,
        byte_code: &ByteCodeBlock,
        start: RegisterIndex,
        argc: usize,
        spread: Option<usize>,
    ) -> JsResult<Vec<Value>> {
        let positions = spread
            .and_then(|index| byte_code.literal_data.get(index))
            .map(|data| data.positions.as_slice())
            .unwrap_or_default();
        let mut args = Vec::with_capacity(argc);
        for offset in 0..argc {
            let value = frame.get(start + offset as RegisterIndex);
            if !positions.contains(&(offset as u16)) {
                args.push(value);
                continue;
            }
            let Value::Object(list) = value else {
                return Err(Error::type_error(format!(
                    "Spread syntax requires an iterable, got {}",
                    self.describe(&value)
                )));
            };
            let length = self.length_of_array_like(list)?;
            for index in 0..length {
                args.push(self.get(list, &PropertyKey::from(index), &Value::Object(list))?);
            }
        }
        Ok(args)
    }

    /// A short description of a value for error messages.
    fn describe(&self, value: &Value) -> String {
        match value {
            Value::String(s) => format!("\"{s}\""),
            Value::Object(obj) => match &self.heap.get(*obj).kind {
                ObjectKind::Function(f) if !f.name().is_empty() => f.name().to_string(),
                ObjectKind::Proxy(_) => "#<Proxy>".to_string(),
                _ => "#<Object>".to_string(),
            },
            other => other.to_string(),
        }
    }

    // ========================================================================
    // Operators
    // ========================================================================

    fn binary_operation(&mut self, op: BinaryOperator, left: &Value, right: &Value) -> JsResult<Value> {
        use BinaryOperator::*;
        Ok(match op {
            Add => {
                let left = self.to_primitive(left)?;
                let right = self.to_primitive(right)?;
                if matches!(left, Value::String(_)) || matches!(right, Value::String(_)) {
                    let mut s = self.to_string(&left)?;
                    s.push_str(&self.to_string(&right)?);
                    Value::String(s)
                } else {
                    Value::Number(self.to_number(&left)? + self.to_number(&right)?)
                }
            }
            Subtract | Multiply | Divide | Modulo | Exponent => {
                let a = self.to_number(left)?;
                let b = self.to_number(right)?;
                Value::Number(match op {
                    Subtract => a - b,
                    Multiply => a * b,
                    Divide => a / b,
                    Modulo => a % b,
                    _ => exponent(a, b),
                })
            }
            Equal => Value::Boolean(abstract_equals(self, left, right)?),
            NotEqual => Value::Boolean(!abstract_equals(self, left, right)?),
            StrictEqual => Value::Boolean(left == right),
            StrictNotEqual => Value::Boolean(left != right),
            LessThan => Value::Boolean(less_than(self, left, right)? == Some(true)),
            GreaterThan => Value::Boolean(less_than(self, right, left)? == Some(true)),
            LessThanEqual => Value::Boolean(less_than(self, right, left)? == Some(false)),
            GreaterThanEqual => Value::Boolean(less_than(self, left, right)? == Some(false)),
            BitwiseAnd | BitwiseOr | BitwiseXor | LeftShift | RightShift | UnsignedRightShift => {
                let a = Value::Number(self.to_number(left)?);
                let b = Value::Number(self.to_number(right)?);
                let shift = b.to_uint32() & 31;
                Value::Number(match op {
                    BitwiseAnd => (a.to_int32() & b.to_int32()) as f64,
                    BitwiseOr => (a.to_int32() | b.to_int32()) as f64,
                    BitwiseXor => (a.to_int32() ^ b.to_int32()) as f64,
                    LeftShift => a.to_int32().wrapping_shl(shift) as f64,
                    RightShift => (a.to_int32() >> shift) as f64,
                    _ => (a.to_uint32() >> shift) as f64,
                })
            }
            In => {
                let Value::Object(object) = right else {
                    return Err(Error::type_error(format!(
                        "Cannot use 'in' operator to search for '{}' in {}",
                        self.to_string(left).unwrap_or_default(),
                        right
                    )));
                };
                let key = self.to_property_key(left)?;
                Value::Boolean(self.has_property(*object, &key)?)
            }
            InstanceOf => Value::Boolean(self.instance_of(left, right)?),
            LogicalAnd | LogicalOr | NullishCoalescing => {
                return Err(Error::InternalError(format!("{op:?} is lowered to jumps")));
            }
        })
    }

    fn unary_operation(&mut self, op: UnaryOperator, value: &Value) -> JsResult<Value> {
        Ok(match op {
            UnaryOperator::Minus => Value::Number(-self.to_number(value)?),
            UnaryOperator::Plus => Value::Number(self.to_number(value)?),
            UnaryOperator::LogicalNot => Value::Boolean(!value.to_boolean()),
            UnaryOperator::BitwiseNot => {
                let number = Value::Number(self.to_number(value)?);
                Value::Number(!number.to_int32() as f64)
            }
            UnaryOperator::Typeof => Value::from(self.type_of(value)),
            UnaryOperator::Void => Value::Undefined,
            UnaryOperator::Delete => {
                return Err(Error::InternalError("delete is lowered to DeleteObject".to_string()));
            }
        })
    }

    /// OrdinaryHasInstance, looking through bound functions.
    pub(crate) fn instance_of(&mut self, value: &Value, constructor: &Value) -> JsResult<bool> {
        if !self.is_callable(constructor) {
            return Err(Error::type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let Some(mut constructor) = constructor.as_object() else {
            return Ok(false);
        };
        while let ObjectKind::Function(FunctionObject {
            code: FunctionCode::Native(native),
        }) = &self.heap.get(constructor).kind
        {
            match &native.info {
                NativeFunctionInfo::Bound { target, .. } => constructor = *target,
                NativeFunctionInfo::Function(_) => break,
            }
        }
        let &Value::Object(mut object) = value else {
            return Ok(false);
        };
        let prototype = self.get(constructor, &"prototype".into(), &Value::Object(constructor))?;
        let Value::Object(prototype) = prototype else {
            return Err(Error::type_error(format!(
                "Function has non-object prototype '{prototype}' in instanceof check"
            )));
        };
        for _ in 0..self.config.max_prototype_chain_depth {
            match self.get_prototype_of(object)? {
                Some(next) if next == prototype => return Ok(true),
                Some(next) => object = next,
                None => return Ok(false),
            }
        }
        Err(Error::RangeError("Maximum prototype chain depth exceeded".to_string()))
    }
}

/// The declarative record `up` links out, which codegen guarantees exists.
fn heap_record(env: &EnvRef, up: usize) -> JsResult<&DeclarativeRecord> {
    env.ancestor(up)
        .and_then(|link| link.declarative())
        .ok_or_else(|| Error::InternalError(format!("no heap environment {up} links out")))
}

fn expect_object(value: &Value) -> JsResult<ObjectRef> {
    value
        .as_object()
        .ok_or_else(|| Error::InternalError(format!("expected an object, got {value}")))
}

/// `a ** b`, with the cases where IEEE `pow` and ECMAScript disagree.
fn exponent(base: f64, exponent: f64) -> f64 {
    if exponent.is_nan() || (base.abs() == 1.0 && exponent.is_infinite()) {
        f64::NAN
    } else {
        base.powf(exponent)
    }
}
