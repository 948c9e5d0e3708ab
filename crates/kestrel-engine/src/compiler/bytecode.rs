//! Bytecode definitions.
//!
//! The instruction set is register based. Operands name slots of the
//! frame's register file: indices below [`REGULAR_REGISTER_LIMIT`] are
//! temporaries handed out by the code generator, indices at or above it are
//! the code block's stack-allocated variables (slot 0 is `this`).

use crate::ast::{BinaryOperator, UnaryOperator};
use crate::compiler::code_block::CodeBlockId;
use crate::runtime::value::Value;

/// Index into a frame's register file.
pub type RegisterIndex = u32;

/// First register index that addresses a stack-allocated variable.
pub const REGULAR_REGISTER_LIMIT: RegisterIndex = 1 << 16;

/// Stack slot 0 holds `this`.
pub const THIS_REGISTER: RegisterIndex = REGULAR_REGISTER_LIMIT;

/// The register addressing stack variable `slot`.
pub fn stack_register(slot: usize) -> RegisterIndex {
    REGULAR_REGISTER_LIMIT + slot as RegisterIndex
}

/// Returns true if `register` addresses a stack variable.
pub fn is_stack_register(register: RegisterIndex) -> bool {
    register >= REGULAR_REGISTER_LIMIT
}

/// Error kinds raised by [`Instruction::ThrowStaticError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaticErrorKind {
    /// TypeError
    TypeError,
    /// ReferenceError
    ReferenceError,
}

/// Argument positions that hold spread values, flattened at call time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpreadIndexData {
    /// Positions in the argument list, ascending
    pub positions: Vec<u16>,
}

/// A single bytecode instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    /// `dst = value`
    LoadLiteral {
        /// Destination
        dst: RegisterIndex,
        /// A primitive constant
        value: Value,
    },
    /// `dst = src`
    Move {
        /// Source
        src: RegisterIndex,
        /// Destination
        dst: RegisterIndex,
    },
    /// Resolves `name` through the environment chain.
    LoadByName {
        /// Destination
        dst: RegisterIndex,
        /// Binding name
        name: String,
    },
    /// Assigns `name` through the environment chain.
    StoreByName {
        /// Value to store
        src: RegisterIndex,
        /// Binding name
        name: String,
    },
    /// Initializes the nearest declared binding of `name`, ignoring
    /// immutability (declarations of `const`, functions and classes).
    InitializeByName {
        /// Value to store
        src: RegisterIndex,
        /// Binding name
        name: String,
    },
    /// `typeof name`, yielding `"undefined"` for unresolvable names.
    TypeofByName {
        /// Destination
        dst: RegisterIndex,
        /// Binding name
        name: String,
    },
    /// Reads a heap environment slot `up_index` records out.
    LoadByHeapIndex {
        /// Destination
        dst: RegisterIndex,
        /// Environment records to skip
        up_index: usize,
        /// Slot within the record
        index: usize,
    },
    /// Writes a heap environment slot `up_index` records out.
    StoreByHeapIndex {
        /// Value to store
        src: RegisterIndex,
        /// Environment records to skip
        up_index: usize,
        /// Slot within the record
        index: usize,
    },
    /// Reads a property of the global object, bypassing local bindings.
    GetGlobalObject {
        /// Destination
        dst: RegisterIndex,
        /// Property name
        name: String,
    },
    /// `dst = object[property]`
    GetObject {
        /// Base object
        object: RegisterIndex,
        /// Key register
        property: RegisterIndex,
        /// Destination
        dst: RegisterIndex,
    },
    /// `object[property] = value`
    SetObject {
        /// Base object
        object: RegisterIndex,
        /// Key register
        property: RegisterIndex,
        /// Value to store
        value: RegisterIndex,
    },
    /// `dst = object.name`
    GetObjectPreComputedCase {
        /// Base object
        object: RegisterIndex,
        /// Destination
        dst: RegisterIndex,
        /// Property name
        name: String,
    },
    /// `object.name = value`
    SetObjectPreComputedCase {
        /// Base object
        object: RegisterIndex,
        /// Property name
        name: String,
        /// Value to store
        value: RegisterIndex,
    },
    /// `dst = delete object[property]`
    DeleteObject {
        /// Base object
        object: RegisterIndex,
        /// Key register
        property: RegisterIndex,
        /// Destination
        dst: RegisterIndex,
    },
    /// `dst = {}`
    CreateObject {
        /// Destination
        dst: RegisterIndex,
    },
    /// `dst = new Array(length)`
    CreateArray {
        /// Destination
        dst: RegisterIndex,
        /// Initial length (holes included)
        length: usize,
    },
    /// Defines element `index` of a fresh array literal.
    ArrayDefineOwnProperty {
        /// The array
        array: RegisterIndex,
        /// Element index
        index: u32,
        /// Element value
        value: RegisterIndex,
    },
    /// Defines an enumerable data property on an object literal.
    ObjectDefineOwnProperty {
        /// The object
        object: RegisterIndex,
        /// Key register
        property: RegisterIndex,
        /// Value
        value: RegisterIndex,
    },
    /// Installs a non-enumerable getter.
    ObjectDefineGetter {
        /// The object
        object: RegisterIndex,
        /// Key register
        property: RegisterIndex,
        /// Getter function
        getter: RegisterIndex,
    },
    /// Installs a non-enumerable setter.
    ObjectDefineSetter {
        /// The object
        object: RegisterIndex,
        /// Key register
        property: RegisterIndex,
        /// Setter function
        setter: RegisterIndex,
    },
    /// Creates a closure over a child code block.
    CreateFunction {
        /// Destination
        dst: RegisterIndex,
        /// The child code block
        code_block: CodeBlockId,
    },
    /// Calls `callee` with an undefined receiver.
    CallFunction {
        /// Function register
        callee: RegisterIndex,
        /// First argument register
        args_start: RegisterIndex,
        /// Argument count
        argc: usize,
        /// Destination
        dst: RegisterIndex,
        /// Literal-data index of spread positions
        spread: Option<usize>,
    },
    /// Calls `callee` with `receiver` as `this`.
    CallFunctionWithReceiver {
        /// Receiver register
        receiver: RegisterIndex,
        /// Function register
        callee: RegisterIndex,
        /// First argument register
        args_start: RegisterIndex,
        /// Argument count
        argc: usize,
        /// Destination
        dst: RegisterIndex,
        /// Literal-data index of spread positions
        spread: Option<usize>,
    },
    /// Direct `eval(...)`.
    CallEvalFunction {
        /// Register holding whatever `eval` resolved to
        eval: RegisterIndex,
        /// First argument register
        args_start: RegisterIndex,
        /// Argument count
        argc: usize,
        /// Destination
        dst: RegisterIndex,
        /// The call sits inside a `with` body
        in_with_scope: bool,
    },
    /// Calls an identifier inside a `with` body; a `with` object providing
    /// the binding becomes the receiver.
    CallFunctionInWithScope {
        /// Callee name
        name: String,
        /// First argument register
        args_start: RegisterIndex,
        /// Argument count
        argc: usize,
        /// Destination
        dst: RegisterIndex,
        /// Literal-data index of spread positions
        spread: Option<usize>,
    },
    /// `dst = new callee(args...)`
    NewOperation {
        /// Constructor register
        callee: RegisterIndex,
        /// First argument register
        args_start: RegisterIndex,
        /// Argument count
        argc: usize,
        /// Destination
        dst: RegisterIndex,
        /// Literal-data index of spread positions
        spread: Option<usize>,
    },
    /// `dst = left op right` (never a logical operator)
    BinaryOperation {
        /// Operator
        op: BinaryOperator,
        /// Left operand
        left: RegisterIndex,
        /// Right operand
        right: RegisterIndex,
        /// Destination
        dst: RegisterIndex,
    },
    /// `dst = op src` (never `delete`)
    UnaryOperation {
        /// Operator
        op: UnaryOperator,
        /// Operand
        src: RegisterIndex,
        /// Destination
        dst: RegisterIndex,
    },
    /// `dst = ToNumber(src)`
    ToNumber {
        /// Operand
        src: RegisterIndex,
        /// Destination
        dst: RegisterIndex,
    },
    /// Unconditional jump.
    Jump {
        /// Instruction index
        target: usize,
    },
    /// Jumps when `cond` is truthy.
    JumpIfTrue {
        /// Condition register
        cond: RegisterIndex,
        /// Instruction index
        target: usize,
    },
    /// Jumps when `cond` is falsy.
    JumpIfFalse {
        /// Condition register
        cond: RegisterIndex,
        /// Instruction index
        target: usize,
    },
    /// Jumps when `src` is neither null nor undefined.
    JumpIfNotNullish {
        /// Tested register
        src: RegisterIndex,
        /// Instruction index
        target: usize,
    },
    /// `throw src`
    ThrowOperation {
        /// Thrown value
        src: RegisterIndex,
    },
    /// Throws an error with a fixed message.
    ThrowStaticError {
        /// Error kind
        kind: StaticErrorKind,
        /// Message
        message: String,
    },
    /// Installs an exception handler until the matching `TryExit`.
    TryOperation {
        /// Instruction index of the handler
        handler: usize,
        /// Receives the caught value
        exception_dst: RegisterIndex,
    },
    /// Removes the innermost exception handler.
    TryExit,
    /// Pushes an object environment for a `with` body.
    WithOperation {
        /// The binding object
        object: RegisterIndex,
    },
    /// Pops the innermost `with` environment.
    WithExit,
    /// `dst` = enumerable string keys of `object` and its prototypes.
    EnumerateObject {
        /// Enumerated object
        object: RegisterIndex,
        /// Destination (an array of keys)
        dst: RegisterIndex,
    },
    /// Produces the next enumerated key or jumps to `exit`.
    EnumerateObjectKey {
        /// Register holding the key array
        keys: RegisterIndex,
        /// Register holding the cursor
        index: RegisterIndex,
        /// Destination for the key
        dst: RegisterIndex,
        /// Jump target when exhausted
        exit: usize,
    },
    /// Returns from the current function.
    ReturnFunction {
        /// Return value
        src: RegisterIndex,
    },
    /// Ends program or eval code with a completion value.
    End {
        /// Completion value
        src: RegisterIndex,
    },
}

/// The bytecode of one code block.
#[derive(Debug, Clone)]
pub struct ByteCodeBlock {
    /// The code block this bytecode belongs to
    pub code_block: CodeBlockId,
    /// Instructions in execution order
    pub code: Vec<Instruction>,
    /// Side table referenced by index from instructions
    pub literal_data: Vec<SpreadIndexData>,
    /// Number of temporary registers the code needs
    pub required_register_count: usize,
}

impl ByteCodeBlock {
    /// Creates an empty block.
    pub fn new(code_block: CodeBlockId) -> Self {
        Self {
            code_block,
            code: Vec::new(),
            literal_data: Vec::new(),
            required_register_count: 0,
        }
    }

    /// Appends an instruction and returns its position.
    pub fn push_code(&mut self, instruction: Instruction) -> usize {
        let position = self.code.len();
        self.code.push(instruction);
        position
    }

    /// Position the next instruction will occupy.
    pub fn current_position(&self) -> usize {
        self.code.len()
    }

    /// Stores a spread position list and returns its literal-data index.
    pub fn push_spread_index(&mut self, positions: Vec<u16>) -> usize {
        let index = self.literal_data.len();
        self.literal_data.push(SpreadIndexData { positions });
        index
    }

    /// Points the jump at `position` to `target`.
    pub fn patch_jump(&mut self, position: usize, new_target: usize) {
        match &mut self.code[position] {
            Instruction::Jump { target }
            | Instruction::JumpIfTrue { target, .. }
            | Instruction::JumpIfFalse { target, .. }
            | Instruction::JumpIfNotNullish { target, .. }
            | Instruction::EnumerateObjectKey { exit: target, .. }
            | Instruction::TryOperation {
                handler: target, ..
            } => *target = new_target,
            other => unreachable!("patching non-jump instruction {other:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_patch() {
        let mut block = ByteCodeBlock::new(crate::compiler::code_block::CodeBlockTree::new_root_id());
        let jump = block.push_code(Instruction::JumpIfFalse {
            cond: 0,
            target: usize::MAX,
        });
        block.push_code(Instruction::LoadLiteral {
            dst: 0,
            value: Value::Number(1.0),
        });
        let end = block.current_position();
        block.patch_jump(jump, end);
        assert_eq!(
            block.code[jump],
            Instruction::JumpIfFalse { cond: 0, target: 2 }
        );
    }

    #[test]
    fn test_stack_registers() {
        assert_eq!(stack_register(0), THIS_REGISTER);
        assert!(is_stack_register(stack_register(3)));
        assert!(!is_stack_register(5));
    }

    #[test]
    fn test_spread_side_table() {
        let mut block = ByteCodeBlock::new(crate::compiler::code_block::CodeBlockTree::new_root_id());
        assert_eq!(block.push_spread_index(vec![1]), 0);
        assert_eq!(block.push_spread_index(vec![0, 2]), 1);
        assert_eq!(block.literal_data[1].positions, vec![0, 2]);
    }
}
