//! JavaScript function representation.

use std::rc::Rc;

use super::environment::EnvRef;
use super::object::ObjectRef;
use super::value::Value;
use crate::compiler::Script;
use crate::compiler::code_block::{CodeBlock, CodeBlockId, NativeCodeBlock};

/// A function object: the code it runs plus whatever it closed over.
#[derive(Debug, Clone)]
pub struct FunctionObject {
    /// What runs when the function is called
    pub code: FunctionCode,
}

/// The code behind a function object.
#[derive(Debug, Clone)]
pub enum FunctionCode {
    /// Host-implemented (builtins, bound functions)
    Native(Rc<NativeCodeBlock>),
    /// Compiled script code
    Interpreted(InterpretedFunction),
}

/// A closure over an interpreted code block.
#[derive(Debug, Clone)]
pub struct InterpretedFunction {
    /// The compiled script owning the code block
    pub script: Rc<Script>,
    /// Which code block of the script to run
    pub code_block: CodeBlockId,
    /// Environment the function was created in
    pub environment: EnvRef,
    /// `this` at creation time; only arrow functions consult it
    pub lexical_this: Value,
}

impl FunctionObject {
    /// Wraps a native code block.
    pub fn native(code_block: NativeCodeBlock) -> Self {
        Self {
            code: FunctionCode::Native(Rc::new(code_block)),
        }
    }

    /// The function's name.
    pub fn name(&self) -> &str {
        match &self.code {
            FunctionCode::Native(native) => native.function_name(),
            FunctionCode::Interpreted(func) => {
                func.script.code_blocks.get(func.code_block).function_name()
            }
        }
    }

    /// Declared parameter count, used for `length`.
    pub fn parameter_count(&self) -> usize {
        match &self.code {
            FunctionCode::Native(native) => native.parameter_count(),
            FunctionCode::Interpreted(func) => {
                func.script.code_blocks.get(func.code_block).parameter_count()
            }
        }
    }

    /// Whether `new` may be applied to this function.
    pub fn is_constructor(&self) -> bool {
        match &self.code {
            FunctionCode::Native(native) => native.is_constructor(),
            FunctionCode::Interpreted(func) => {
                func.script.code_blocks.get(func.code_block).is_constructor()
            }
        }
    }
}

/// The revoke function created by `Proxy.revocable`.
///
/// Holds the proxy it revokes until it is called once.
#[derive(Debug, Clone)]
pub struct RevocableFunctionObject {
    /// The proxy still to revoke, cleared on first call
    pub revocable: Option<ObjectRef>,
}

impl RevocableFunctionObject {
    /// Creates a revoker bound to `proxy`.
    pub fn new(proxy: ObjectRef) -> Self {
        Self {
            revocable: Some(proxy),
        }
    }
}
