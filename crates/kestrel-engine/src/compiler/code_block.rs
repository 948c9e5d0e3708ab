//! Compiled-code metadata and variable layout.
//!
//! Every program, function, method, arrow and eval unit gets a code block.
//! Interpreted code blocks record where each identifier lives: in a stack
//! slot of the call's register file, in a slot of a heap environment record,
//! or (when indexed storage is impossible) under its name. The layout is
//! decided once by [`CodeBlockTree::compute_variables`] and frozen afterwards.

use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::JsResult;
use crate::runtime::object::ObjectRef;
use crate::runtime::realm::Realm;
use crate::runtime::value::Value;

/// Sentinel for an identifier that has not been given an index yet.
pub const INVALID_INDEX: usize = usize::MAX;

/// Parameter index used when the block has no indexed storage.
pub const NON_INDEXED_PARAMETER: i32 = i32::MAX;

const THIS_NAME: &str = "this";
const ARGUMENTS_NAME: &str = "arguments";

/// Handle to a code block inside a [`CodeBlockTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodeBlockId(u32);

impl CodeBlockId {
    /// The arena slot this id refers to.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Facts discovered by scope analysis, passed when a code block is created.
pub struct CodeBlockInitFlags;

impl CodeBlockInitFlags {
    /// The unit contains a direct `eval` call
    pub const HAS_EVAL: u16 = 1 << 0;
    /// The unit contains a `with` statement
    pub const HAS_WITH: u16 = 1 << 1;
    /// The unit contains a `catch` clause
    pub const HAS_CATCH: u16 = 1 << 2;
    /// The unit is a generator
    pub const HAS_YIELD: u16 = 1 << 3;
    /// The unit is nested inside a `catch` body
    pub const IN_CATCH: u16 = 1 << 4;
    /// The unit is nested inside a `with` body
    pub const IN_WITH: u16 = 1 << 5;
    /// Function declaration
    pub const IS_FUNCTION_DECLARATION: u16 = 1 << 6;
    /// Function declaration inside a block, bound outside the function's own scope
    pub const IS_FUNCTION_DECLARATION_WITH_SPECIAL_BINDING: u16 = 1 << 7;
    /// Function expression (including class members)
    pub const IS_FUNCTION_EXPRESSION: u16 = 1 << 8;
    /// Arrow function
    pub const IS_ARROW_FUNCTION_EXPRESSION: u16 = 1 << 9;
    /// Parameters are plain identifiers
    pub const IS_SIMPLE_PARAMETER_LIST: u16 = 1 << 10;
    /// Constructor synthesized for a class without one
    pub const IS_DEFAULT_CONSTRUCTOR: u16 = 1 << 11;
}

/// Common surface of native and interpreted code blocks.
pub trait CodeBlock {
    /// The function name, empty for anonymous code.
    fn function_name(&self) -> &str;
    /// Whether the code runs in strict mode.
    fn is_strict(&self) -> bool;
    /// Whether `new` may be applied to functions built from this block.
    fn is_constructor(&self) -> bool;
    /// Number of declared parameters (`length`).
    fn parameter_count(&self) -> usize;
    /// Whether calls dispatch to host code.
    fn has_call_native_function_code(&self) -> bool;
}

/// Host function signature: `(realm, this, arguments, is_new) -> result`.
pub type NativeFunction = Rc<dyn Fn(&mut Realm, &Value, &[Value], bool) -> JsResult<Value>>;

/// What a native code block runs.
#[derive(Clone)]
pub enum NativeFunctionInfo {
    /// A host function
    Function(NativeFunction),
    /// `Function.prototype.bind` result
    Bound {
        /// The wrapped function
        target: ObjectRef,
        /// `this` for plain calls
        bound_this: Value,
        /// Arguments prepended to every call
        bound_arguments: Vec<Value>,
    },
}

/// Code block for builtins and bound functions.
#[derive(Clone)]
pub struct NativeCodeBlock {
    function_name: String,
    parameter_count: usize,
    is_strict: bool,
    is_constructor: bool,
    /// The behavior behind the block
    pub info: NativeFunctionInfo,
}

impl NativeCodeBlock {
    /// Wraps a host function.
    pub fn new(
        name: impl Into<String>,
        parameter_count: usize,
        is_constructor: bool,
        function: NativeFunction,
    ) -> Self {
        Self {
            function_name: name.into(),
            parameter_count,
            is_strict: true,
            is_constructor,
            info: NativeFunctionInfo::Function(function),
        }
    }

    /// Describes a bound function. `length` is what the target still expects.
    pub fn bound(
        target: ObjectRef,
        target_parameter_count: usize,
        bound_this: Value,
        bound_arguments: Vec<Value>,
    ) -> Self {
        Self {
            function_name: "bound".to_string(),
            parameter_count: target_parameter_count.saturating_sub(bound_arguments.len()),
            is_strict: false,
            is_constructor: false,
            info: NativeFunctionInfo::Bound {
                target,
                bound_this,
                bound_arguments,
            },
        }
    }
}

impl fmt::Debug for NativeCodeBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.info {
            NativeFunctionInfo::Function(_) => "native",
            NativeFunctionInfo::Bound { .. } => "bound",
        };
        write!(f, "NativeCodeBlock({}, {})", self.function_name, kind)
    }
}

impl CodeBlock for NativeCodeBlock {
    fn function_name(&self) -> &str {
        &self.function_name
    }

    fn is_strict(&self) -> bool {
        self.is_strict
    }

    fn is_constructor(&self) -> bool {
        self.is_constructor
    }

    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn has_call_native_function_code(&self) -> bool {
        true
    }
}

/// A name a scope declares or implicitly binds, as found by scope analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeName {
    /// The identifier
    pub name: String,
    /// Declared with var/let/const/function/class or as a parameter
    pub is_explicitly_declared_or_parameter_name: bool,
    /// False for `const` bindings
    pub is_mutable: bool,
}

impl ScopeName {
    /// A `var`-like declaration or parameter.
    pub fn declared(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_explicitly_declared_or_parameter_name: true,
            is_mutable: true,
        }
    }

    /// A `const` declaration.
    pub fn constant(name: &str) -> Self {
        Self {
            is_mutable: false,
            ..Self::declared(name)
        }
    }

    /// A binding the engine introduces (function expression names).
    pub fn implicit(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_explicitly_declared_or_parameter_name: false,
            is_mutable: true,
        }
    }
}

/// Storage record for one identifier of a code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierInfo {
    /// The identifier
    pub name: String,
    /// Lives in a stack slot (true) or a heap environment slot (false)
    pub need_to_allocate_on_stack: bool,
    /// Whether assignment may change the binding
    pub is_mutable: bool,
    /// Declared in source rather than introduced by the engine
    pub is_explicitly_declared_or_parameter_name: bool,
    /// Slot within its storage class, [`INVALID_INDEX`] until laid out
    pub index_for_indexed_storage: usize,
}

/// Storage record for one formal parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterInfo {
    /// The parameter name
    pub name: String,
    /// A later parameter has the same name, so this one is never written
    pub is_duplicated: bool,
    /// The parameter's binding lives in the heap environment
    pub is_heap_allocated: bool,
    /// Heap slot, or stack slot minus two (so `-1` is the function-name slot)
    pub index: i32,
}

/// What kind of unit a code block compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeBlockKind {
    /// Top-level script
    Global,
    /// Function, method or arrow body
    Function,
    /// Code passed to direct `eval`
    Eval,
}

/// Code block of script code, with its scope layout.
#[derive(Debug, Clone)]
pub struct InterpretedCodeBlock {
    kind: CodeBlockKind,
    function_name: String,
    is_strict: bool,
    is_constructor: bool,
    is_static: bool,
    is_method_property: bool,
    parameter_count: usize,

    has_eval: bool,
    has_with: bool,
    has_catch: bool,
    has_yield: bool,
    in_catch: bool,
    in_with: bool,
    is_function_declaration: bool,
    is_function_declaration_with_special_binding: bool,
    is_function_expression: bool,
    is_arrow_function_expression: bool,
    is_simple_parameter_list: bool,
    is_default_constructor: bool,
    is_eval_code_in_function: bool,

    uses_arguments_object: bool,
    can_use_indexed_variable_storage: bool,
    can_allocate_environment_on_stack: bool,
    needs_complex_parameter_copy: bool,
    is_function_name_explicitly_declared: bool,
    is_function_name_save_on_heap: bool,

    identifier_infos: Vec<IdentifierInfo>,
    parameters: Vec<ParameterInfo>,
    identifier_on_stack_count: usize,
    identifier_on_heap_count: usize,

    parent: Option<CodeBlockId>,
    children: Vec<CodeBlockId>,
    finalized: bool,
}

/// Options for creating a function code block.
#[derive(Debug, Clone, Default)]
pub struct FunctionBlockOptions {
    /// The function name, empty when anonymous
    pub name: String,
    /// Formal parameter names in order
    pub parameters: Vec<String>,
    /// Strict mode
    pub is_strict: bool,
    /// Static class member
    pub is_static: bool,
    /// Class member or object-literal method
    pub is_method_property: bool,
    /// Usable with `new`
    pub is_constructor: bool,
    /// [`CodeBlockInitFlags`] bits
    pub flags: u16,
}

impl InterpretedCodeBlock {
    fn empty(kind: CodeBlockKind, is_strict: bool, flags: u16) -> Self {
        let has = |bit: u16| flags & bit != 0;
        Self {
            kind,
            function_name: String::new(),
            is_strict,
            is_constructor: false,
            is_static: false,
            is_method_property: false,
            parameter_count: 0,
            has_eval: has(CodeBlockInitFlags::HAS_EVAL),
            has_with: has(CodeBlockInitFlags::HAS_WITH),
            has_catch: has(CodeBlockInitFlags::HAS_CATCH),
            has_yield: has(CodeBlockInitFlags::HAS_YIELD),
            in_catch: has(CodeBlockInitFlags::IN_CATCH),
            in_with: has(CodeBlockInitFlags::IN_WITH),
            is_function_declaration: has(CodeBlockInitFlags::IS_FUNCTION_DECLARATION),
            is_function_declaration_with_special_binding: has(
                CodeBlockInitFlags::IS_FUNCTION_DECLARATION_WITH_SPECIAL_BINDING,
            ),
            is_function_expression: has(CodeBlockInitFlags::IS_FUNCTION_EXPRESSION),
            is_arrow_function_expression: has(CodeBlockInitFlags::IS_ARROW_FUNCTION_EXPRESSION),
            is_simple_parameter_list: has(CodeBlockInitFlags::IS_SIMPLE_PARAMETER_LIST),
            is_default_constructor: has(CodeBlockInitFlags::IS_DEFAULT_CONSTRUCTOR),
            is_eval_code_in_function: false,
            uses_arguments_object: false,
            can_use_indexed_variable_storage: false,
            can_allocate_environment_on_stack: false,
            needs_complex_parameter_copy: false,
            is_function_name_explicitly_declared: false,
            is_function_name_save_on_heap: false,
            identifier_infos: Vec::new(),
            parameters: Vec::new(),
            identifier_on_stack_count: 0,
            identifier_on_heap_count: 0,
            parent: None,
            children: Vec::new(),
            finalized: false,
        }
    }

    fn push_names(&mut self, names: &[ScopeName], on_stack: bool) {
        for scope_name in names {
            if self.has_name(&scope_name.name) {
                continue;
            }
            self.identifier_infos.push(IdentifierInfo {
                name: scope_name.name.clone(),
                need_to_allocate_on_stack: on_stack,
                is_mutable: scope_name.is_mutable,
                is_explicitly_declared_or_parameter_name: scope_name
                    .is_explicitly_declared_or_parameter_name,
                index_for_indexed_storage: INVALID_INDEX,
            });
        }
    }

    /// Creates the code block of a program or eval unit.
    ///
    /// These never use indexed storage: their bindings are reached by name.
    pub fn new_global(kind: CodeBlockKind, is_strict: bool, names: &[ScopeName], flags: u16) -> Self {
        debug_assert!(kind != CodeBlockKind::Function);
        let mut block = Self::empty(kind, is_strict, flags);
        block.push_names(names, false);
        block
    }

    /// Creates the code block of a function, method or arrow.
    ///
    /// Parameters are bound first, then every other name in `names`.
    pub fn new_function(options: FunctionBlockOptions, names: &[ScopeName]) -> Self {
        let mut block = Self::empty(CodeBlockKind::Function, options.is_strict, options.flags);
        block.function_name = options.name;
        block.is_static = options.is_static;
        block.is_method_property = options.is_method_property;
        block.is_constructor = options.is_constructor && !block.is_arrow_function_expression;
        block.parameter_count = options.parameters.len();
        block.parameters = options
            .parameters
            .into_iter()
            .map(|name| ParameterInfo {
                name,
                is_duplicated: false,
                is_heap_allocated: false,
                index: 0,
            })
            .collect();

        block.can_use_indexed_variable_storage = !block.has_eval_with_yield()
            && !block.has_catch
            && !block.in_catch
            && !block.in_with;
        block.can_allocate_environment_on_stack = block.can_use_indexed_variable_storage;

        let on_stack = block.can_use_indexed_variable_storage;
        let parameter_names: Vec<ScopeName> = block
            .parameters
            .iter()
            .map(|p| ScopeName::declared(&p.name))
            .collect();
        block.push_names(&parameter_names, on_stack);
        block.push_names(names, on_stack);
        block
    }

    /// Unit kind.
    pub fn kind(&self) -> CodeBlockKind {
        self.kind
    }

    /// True for the top-level program and eval code.
    pub fn is_global_scope_code_block(&self) -> bool {
        self.kind != CodeBlockKind::Function
    }

    /// True for eval code.
    pub fn is_eval_code(&self) -> bool {
        self.kind == CodeBlockKind::Eval
    }

    /// Marks eval code whose caller is a function.
    pub fn set_eval_code_in_function(&mut self) {
        self.is_eval_code_in_function = true;
    }

    /// Eval code compiled on behalf of a function.
    pub fn is_eval_code_in_function(&self) -> bool {
        self.is_eval_code_in_function
    }

    /// Direct eval, with or generator.
    pub fn has_eval_with_yield(&self) -> bool {
        self.has_eval || self.has_with || self.has_yield
    }

    /// Contains direct eval.
    pub fn has_eval(&self) -> bool {
        self.has_eval
    }

    /// Contains a with statement.
    pub fn has_with(&self) -> bool {
        self.has_with
    }

    /// Contains a catch clause.
    pub fn has_catch(&self) -> bool {
        self.has_catch
    }

    /// Is a generator.
    pub fn has_yield(&self) -> bool {
        self.has_yield
    }

    /// Nested in a catch body.
    pub fn in_catch(&self) -> bool {
        self.in_catch
    }

    /// Nested in a with body.
    pub fn in_with(&self) -> bool {
        self.in_with
    }

    /// Function declaration.
    pub fn is_function_declaration(&self) -> bool {
        self.is_function_declaration
    }

    /// Block-level function declaration.
    pub fn is_function_declaration_with_special_binding(&self) -> bool {
        self.is_function_declaration_with_special_binding
    }

    /// Function expression or class member.
    pub fn is_function_expression(&self) -> bool {
        self.is_function_expression
    }

    /// Arrow function.
    pub fn is_arrow_function_expression(&self) -> bool {
        self.is_arrow_function_expression
    }

    /// Plain identifier parameters only.
    pub fn is_simple_parameter_list(&self) -> bool {
        self.is_simple_parameter_list
    }

    /// Synthesized class constructor.
    pub fn is_default_constructor(&self) -> bool {
        self.is_default_constructor
    }

    /// Static class member.
    pub fn is_static(&self) -> bool {
        self.is_static
    }

    /// Class member.
    pub fn is_method_property(&self) -> bool {
        self.is_method_property
    }

    /// The body references `arguments`.
    pub fn uses_arguments_object(&self) -> bool {
        self.uses_arguments_object
    }

    /// Identifiers may be addressed by slot index.
    pub fn can_use_indexed_variable_storage(&self) -> bool {
        self.can_use_indexed_variable_storage
    }

    /// No heap environment record is needed for calls of this block.
    pub fn can_allocate_environment_on_stack(&self) -> bool {
        self.can_allocate_environment_on_stack
    }

    /// Parameters cannot be copied straight into stack slots.
    pub fn needs_complex_parameter_copy(&self) -> bool {
        self.needs_complex_parameter_copy
    }

    /// The function's name is also a parameter or declared variable.
    pub fn is_function_name_explicitly_declared(&self) -> bool {
        self.is_function_name_explicitly_declared
    }

    /// The function-name binding lives in the heap environment.
    pub fn is_function_name_save_on_heap(&self) -> bool {
        self.is_function_name_save_on_heap
    }

    /// Stack slots used, including the reserved ones.
    pub fn identifier_on_stack_count(&self) -> usize {
        self.identifier_on_stack_count
    }

    /// Heap environment slots used.
    pub fn identifier_on_heap_count(&self) -> usize {
        self.identifier_on_heap_count
    }

    /// All identifier records.
    pub fn identifier_infos(&self) -> &[IdentifierInfo] {
        &self.identifier_infos
    }

    /// All parameter records.
    pub fn parameters(&self) -> &[ParameterInfo] {
        &self.parameters
    }

    /// Enclosing code block, for lookup only.
    pub fn parent(&self) -> Option<CodeBlockId> {
        self.parent
    }

    /// Nested code blocks in creation order.
    pub fn children(&self) -> &[CodeBlockId] {
        &self.children
    }

    /// Whether `compute_variables` has run.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Position of `name` in the identifier list.
    pub fn find_name(&self, name: &str) -> Option<usize> {
        self.identifier_infos.iter().position(|info| info.name == name)
    }

    /// Whether the block binds `name`.
    pub fn has_name(&self, name: &str) -> bool {
        self.find_name(name).is_some()
    }

    /// The identifier record for `name`.
    pub fn identifier(&self, name: &str) -> Option<&IdentifierInfo> {
        self.identifier_infos.iter().find(|info| info.name == name)
    }

    /// Whether `name` is one of the formal parameters.
    pub fn has_parameter(&self, name: &str) -> bool {
        self.parameters.iter().any(|p| p.name == name)
    }

    /// Entry code must copy `this` into its binding for nested arrows.
    pub fn needs_to_store_this_value(&self) -> bool {
        self.has_name(THIS_NAME)
    }
}

impl CodeBlock for InterpretedCodeBlock {
    fn function_name(&self) -> &str {
        &self.function_name
    }

    fn is_strict(&self) -> bool {
        self.is_strict
    }

    fn is_constructor(&self) -> bool {
        self.is_constructor
    }

    fn parameter_count(&self) -> usize {
        self.parameter_count
    }

    fn has_call_native_function_code(&self) -> bool {
        false
    }
}

/// Arena owning every interpreted code block of one script.
///
/// Parents own children by id; children refer back to their parent by id.
#[derive(Debug, Clone, Default)]
pub struct CodeBlockTree {
    blocks: Vec<InterpretedCodeBlock>,
}

impl CodeBlockTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the first inserted block receives.
    pub fn new_root_id() -> CodeBlockId {
        CodeBlockId(0)
    }

    /// Adds a block under `parent` and returns its id.
    pub fn insert(&mut self, mut block: InterpretedCodeBlock, parent: Option<CodeBlockId>) -> CodeBlockId {
        let id = CodeBlockId(self.blocks.len() as u32);
        block.parent = parent;
        if let Some(parent) = parent {
            debug_assert!(!self.get(parent).finalized);
            self.get_mut(parent).children.push(id);
        }
        self.blocks.push(block);
        id
    }

    /// Borrows a block.
    pub fn get(&self, id: CodeBlockId) -> &InterpretedCodeBlock {
        &self.blocks[id.index()]
    }

    fn get_mut(&mut self, id: CodeBlockId) -> &mut InterpretedCodeBlock {
        &mut self.blocks[id.index()]
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Returns true if the tree has no blocks.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Every block id, parents before children.
    pub fn ids(&self) -> impl Iterator<Item = CodeBlockId> + '_ {
        (0..self.blocks.len() as u32).map(CodeBlockId)
    }

    /// Iterates `id` and its ancestors, innermost first.
    pub fn ancestors_inclusive(&self, id: CodeBlockId) -> impl Iterator<Item = CodeBlockId> + '_ {
        std::iter::successors(Some(id), move |current| self.get(*current).parent)
    }

    /// Marks `id` and every ancestor as needing a heap environment.
    fn disable_environment_on_stack(&mut self, id: CodeBlockId) {
        for ancestor in self.ancestors_inclusive(id).collect::<Vec<_>>() {
            let block = self.get_mut(ancestor);
            if block.can_allocate_environment_on_stack {
                trace!(block = ancestor.index(), "environment moved to heap");
                block.can_allocate_environment_on_stack = false;
            }
        }
    }

    /// Gives the block a heap-resident `this` binding for nested arrows. Idempotent.
    pub fn capture_this(&mut self, id: CodeBlockId) {
        let block = self.get_mut(id);
        debug_assert!(!block.is_global_scope_code_block());
        debug_assert!(!block.finalized);
        if block.has_name(THIS_NAME) {
            return;
        }
        block.identifier_infos.push(IdentifierInfo {
            name: THIS_NAME.to_string(),
            need_to_allocate_on_stack: false,
            is_mutable: true,
            is_explicitly_declared_or_parameter_name: false,
            index_for_indexed_storage: INVALID_INDEX,
        });
        self.disable_environment_on_stack(id);
    }

    /// Gives the block an `arguments` object. Idempotent.
    ///
    /// Parameters move to the heap so the arguments object and the
    /// parameter bindings share storage.
    pub fn capture_arguments(&mut self, id: CodeBlockId) {
        let block = self.get_mut(id);
        debug_assert!(!block.is_global_scope_code_block() && !block.is_arrow_function_expression());
        debug_assert!(!block.has_parameter(ARGUMENTS_NAME));
        debug_assert!(!block.finalized);
        if block.uses_arguments_object {
            return;
        }
        block.uses_arguments_object = true;
        if !block.has_name(ARGUMENTS_NAME) {
            let on_stack = block.can_use_indexed_variable_storage;
            block.identifier_infos.push(IdentifierInfo {
                name: ARGUMENTS_NAME.to_string(),
                need_to_allocate_on_stack: on_stack,
                is_mutable: true,
                is_explicitly_declared_or_parameter_name: false,
                index_for_indexed_storage: INVALID_INDEX,
            });
        }
        if block.parameter_count > 0 {
            let parameter_names: Vec<String> =
                block.parameters.iter().map(|p| p.name.clone()).collect();
            for info in block.identifier_infos.iter_mut() {
                if parameter_names.contains(&info.name) {
                    info.need_to_allocate_on_stack = false;
                }
            }
            self.disable_environment_on_stack(id);
        }
    }

    /// Called when a nested block cannot resolve `name` itself.
    ///
    /// Returns true if `id` binds the name, in which case the binding moves
    /// to the heap so the nested closure can outlive this call's frame.
    pub fn try_capture_identifiers_from_child_code_block(&mut self, id: CodeBlockId, name: &str) -> bool {
        let block = self.get_mut(id);
        debug_assert!(!block.finalized);
        let Some(position) = block.find_name(name) else {
            return false;
        };
        block.identifier_infos[position].need_to_allocate_on_stack = false;
        trace!(block = id.index(), name, "identifier captured by nested scope");
        self.disable_environment_on_stack(id);
        true
    }

    /// Drops indexed storage for a block that itself, or a nested block,
    /// uses eval, with or yield.
    pub fn notify_self_or_child_has_eval_with_yield(&mut self, id: CodeBlockId) {
        let block = self.get_mut(id);
        debug_assert!(!block.finalized);
        block.can_use_indexed_variable_storage = false;
        for info in block.identifier_infos.iter_mut() {
            info.index_for_indexed_storage = INVALID_INDEX;
            info.need_to_allocate_on_stack = false;
        }
        self.disable_environment_on_stack(id);
    }

    fn in_not_indexed_code_block_scope(&self, id: CodeBlockId) -> bool {
        // Program and eval blocks are never indexed; only function ancestors count.
        self.ancestors_inclusive(id).skip(1).any(|ancestor| {
            let block = self.get(ancestor);
            !block.is_global_scope_code_block() && !block.can_use_indexed_variable_storage
        })
    }

    fn in_eval_with_yield_scope(&self, id: CodeBlockId) -> bool {
        self.ancestors_inclusive(id)
            .any(|ancestor| self.get(ancestor).has_eval_with_yield())
    }

    /// Assigns every identifier and parameter its storage slot and freezes the block.
    pub fn compute_variables(&mut self, id: CodeBlockId) {
        let mut disable_on_stack = self.get(id).uses_arguments_object
            || self.get(id).has_catch
            || self.in_eval_with_yield_scope(id)
            || self.in_not_indexed_code_block_scope(id);
        if !self.get(id).can_allocate_environment_on_stack {
            disable_on_stack = true;
        }
        if disable_on_stack {
            self.disable_environment_on_stack(id);
        }

        let block = self.get_mut(id);
        debug_assert!(!block.finalized, "compute_variables ran twice");

        if !block.function_name.is_empty() {
            let function_name = block.function_name.clone();
            if block.is_function_expression {
                if let Some(info) = block.identifier_infos.iter_mut().find(|info| {
                    info.name == function_name && !info.is_explicitly_declared_or_parameter_name
                }) {
                    info.is_mutable = false;
                    block.needs_complex_parameter_copy = true;
                }
            }
            if block.has_parameter(&function_name) {
                block.needs_complex_parameter_copy = true;
            }
        }

        if block.can_use_indexed_variable_storage {
            block.layout_indexed();
        } else {
            block.layout_named();
        }
        block.finalized = true;

        debug!(
            block = id.index(),
            name = %block.function_name,
            indexed = block.can_use_indexed_variable_storage,
            on_stack = block.can_allocate_environment_on_stack,
            stack_slots = block.identifier_on_stack_count,
            heap_slots = block.identifier_on_heap_count,
            complex_parameter_copy = block.needs_complex_parameter_copy,
            "computed variable layout"
        );
    }
}

impl InterpretedCodeBlock {
    fn layout_indexed(&mut self) {
        let mut stack_index = if self.is_global_scope_code_block() { 1 } else { 2 };
        let mut heap_index = 0;
        let function_name = self.function_name.clone();

        for info in self.identifier_infos.iter_mut() {
            if !function_name.is_empty() && info.name == function_name {
                self.needs_complex_parameter_copy = true;
                if info.is_explicitly_declared_or_parameter_name {
                    self.is_function_name_explicitly_declared = true;
                }
                if info.need_to_allocate_on_stack {
                    // An explicit declaration of the name keeps a stack slot of its own reserved.
                    if self.is_function_name_explicitly_declared {
                        stack_index += 1;
                    }
                    info.index_for_indexed_storage = 1;
                } else {
                    self.is_function_name_save_on_heap = true;
                    info.index_for_indexed_storage = heap_index;
                    heap_index += 1;
                }
                continue;
            }
            if info.need_to_allocate_on_stack {
                info.index_for_indexed_storage = stack_index;
                stack_index += 1;
            } else {
                info.index_for_indexed_storage = heap_index;
                heap_index += 1;
            }
        }
        self.identifier_on_stack_count = stack_index;
        self.identifier_on_heap_count = heap_index;

        for i in 0..self.parameters.len() {
            let name = self.parameters[i].name.clone();
            let Some(info) = self.identifier(&name).cloned() else {
                unreachable!("parameter {name} has no identifier record");
            };
            let is_heap = !info.need_to_allocate_on_stack;
            let index = if is_heap {
                info.index_for_indexed_storage as i32
            } else {
                info.index_for_indexed_storage as i32 - 2
            };

            if let Some(previous) = self.parameters[..i].iter().rposition(|p| p.name == name) {
                self.parameters[previous].is_duplicated = true;
                self.needs_complex_parameter_copy = true;
            }
            if is_heap {
                self.needs_complex_parameter_copy = true;
            }
            let parameter = &mut self.parameters[i];
            parameter.is_heap_allocated = is_heap;
            parameter.index = index;
        }
    }

    fn layout_named(&mut self) {
        self.needs_complex_parameter_copy = true;

        if self.is_eval_code_in_function {
            if let Some(position) = self.find_name(ARGUMENTS_NAME) {
                self.identifier_infos.remove(position);
            }
        }

        let function_name = self.function_name.clone();
        let mut heap_index = 0;
        for info in self.identifier_infos.iter_mut() {
            info.need_to_allocate_on_stack = false;
            if !function_name.is_empty() && info.name == function_name {
                if info.is_explicitly_declared_or_parameter_name {
                    self.is_function_name_explicitly_declared = true;
                }
                self.is_function_name_save_on_heap = true;
            }
            info.index_for_indexed_storage = heap_index;
            heap_index += 1;
        }

        for i in 0..self.parameters.len() {
            let name = self.parameters[i].name.clone();
            if let Some(previous) = self.parameters[..i].iter().rposition(|p| p.name == name) {
                self.parameters[previous].is_duplicated = true;
            }
            let parameter = &mut self.parameters[i];
            parameter.is_heap_allocated = true;
            parameter.index = NON_INDEXED_PARAMETER;
        }

        self.identifier_on_stack_count = if self.is_global_scope_code_block() { 1 } else { 2 };
        self.identifier_on_heap_count = heap_index;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function_block(name: &str, params: &[&str], locals: &[&str], flags: u16) -> InterpretedCodeBlock {
        let mut names: Vec<ScopeName> = params.iter().map(|p| ScopeName::declared(p)).collect();
        names.extend(locals.iter().map(|l| ScopeName::declared(l)));
        InterpretedCodeBlock::new_function(
            FunctionBlockOptions {
                name: name.to_string(),
                parameters: params.iter().map(|p| p.to_string()).collect(),
                is_constructor: true,
                flags,
                ..Default::default()
            },
            &names,
        )
    }

    fn tree_with(block: InterpretedCodeBlock) -> (CodeBlockTree, CodeBlockId, CodeBlockId) {
        let mut tree = CodeBlockTree::new();
        let global = tree.insert(
            InterpretedCodeBlock::new_global(CodeBlockKind::Global, false, &[], 0),
            None,
        );
        let id = tree.insert(block, Some(global));
        (tree, global, id)
    }

    #[test]
    fn test_stack_layout_starts_after_reserved_slots() {
        let (mut tree, _, id) = tree_with(function_block("f", &["a", "b"], &["c"], 0));
        tree.compute_variables(id);
        let block = tree.get(id);

        assert!(block.can_use_indexed_variable_storage());
        assert!(block.can_allocate_environment_on_stack());
        assert_eq!(block.identifier("a").unwrap().index_for_indexed_storage, 2);
        assert_eq!(block.identifier("b").unwrap().index_for_indexed_storage, 3);
        assert_eq!(block.identifier("c").unwrap().index_for_indexed_storage, 4);
        assert_eq!(block.identifier_on_stack_count(), 5);
        assert_eq!(block.identifier_on_heap_count(), 0);
        assert_eq!(block.parameters()[0].index, 0);
        assert_eq!(block.parameters()[1].index, 1);
        assert!(!block.needs_complex_parameter_copy());
    }

    #[test]
    fn test_eval_disables_indexed_storage() {
        let (mut tree, global, id) =
            tree_with(function_block("f", &["a"], &["b"], CodeBlockInitFlags::HAS_EVAL));
        tree.compute_variables(id);
        tree.compute_variables(global);
        let block = tree.get(id);

        assert!(!block.can_use_indexed_variable_storage());
        assert!(!block.can_allocate_environment_on_stack());
        assert!(block.needs_complex_parameter_copy());
        assert!(block.identifier_infos().iter().all(|i| !i.need_to_allocate_on_stack));
        assert_eq!(block.identifier("a").unwrap().index_for_indexed_storage, 0);
        assert_eq!(block.identifier("b").unwrap().index_for_indexed_storage, 1);
        assert_eq!(block.parameters()[0].index, NON_INDEXED_PARAMETER);
        assert!(block.parameters()[0].is_heap_allocated);
    }

    #[test]
    fn test_catch_disables_indexed_storage() {
        let (mut tree, _, id) =
            tree_with(function_block("f", &[], &["e"], CodeBlockInitFlags::HAS_CATCH));
        tree.compute_variables(id);
        assert!(!tree.get(id).can_use_indexed_variable_storage());
    }

    #[test]
    fn test_capture_moves_identifier_to_heap_and_propagates() {
        let (mut tree, global, outer) = tree_with(function_block("outer", &[], &["x", "y"], 0));
        let inner = tree.insert(function_block("inner", &[], &[], 0), Some(outer));

        assert!(tree.try_capture_identifiers_from_child_code_block(outer, "x"));
        assert!(!tree.try_capture_identifiers_from_child_code_block(outer, "z"));

        for id in [inner, outer, global] {
            tree.compute_variables(id);
        }
        let block = tree.get(outer);
        assert!(!block.can_allocate_environment_on_stack());
        assert!(!tree.get(global).can_allocate_environment_on_stack());
        assert!(tree.get(inner).can_allocate_environment_on_stack());
        assert_eq!(block.identifier("x").unwrap().index_for_indexed_storage, 0);
        assert!(!block.identifier("x").unwrap().need_to_allocate_on_stack);
        assert_eq!(block.identifier("y").unwrap().index_for_indexed_storage, 2);
        assert_eq!(block.identifier_on_heap_count(), 1);
    }

    #[test]
    fn test_capture_this_is_idempotent() {
        let (mut tree, _, id) = tree_with(function_block("f", &[], &[], 0));
        tree.capture_this(id);
        tree.capture_this(id);
        let block = tree.get(id);
        assert_eq!(block.identifier_infos().len(), 1);
        assert!(block.needs_to_store_this_value());
        assert!(!block.can_allocate_environment_on_stack());
    }

    #[test]
    fn test_capture_arguments_forces_parameters_to_heap() {
        let (mut tree, _, id) = tree_with(function_block("f", &["a", "b"], &[], 0));
        tree.capture_arguments(id);
        tree.capture_arguments(id);
        tree.compute_variables(id);
        let block = tree.get(id);

        assert!(block.uses_arguments_object());
        assert_eq!(
            block.identifier_infos().iter().filter(|i| i.name == "arguments").count(),
            1
        );
        assert!(block.parameters().iter().all(|p| p.is_heap_allocated));
        assert!(block.identifier("arguments").unwrap().need_to_allocate_on_stack);
        assert!(block.needs_complex_parameter_copy());
    }

    #[test]
    fn test_capture_arguments_without_parameters_keeps_stack() {
        let (mut tree, _, id) = tree_with(function_block("f", &[], &[], 0));
        tree.capture_arguments(id);
        assert!(tree.get(id).identifier("arguments").unwrap().need_to_allocate_on_stack);
    }

    #[test]
    fn test_duplicate_parameters_share_a_slot() {
        let (mut tree, _, id) = tree_with(function_block("f", &["a", "a"], &[], 0));
        tree.compute_variables(id);
        let block = tree.get(id);

        assert!(block.needs_complex_parameter_copy());
        assert!(block.parameters()[0].is_duplicated);
        assert!(!block.parameters()[1].is_duplicated);
        assert_eq!(block.parameters()[0].index, block.parameters()[1].index);
    }

    #[test]
    fn test_function_expression_name_is_immutable_slot_one() {
        let mut names = vec![ScopeName::declared("a")];
        names.push(ScopeName::implicit("fact"));
        let block = InterpretedCodeBlock::new_function(
            FunctionBlockOptions {
                name: "fact".to_string(),
                parameters: vec!["a".to_string()],
                flags: CodeBlockInitFlags::IS_FUNCTION_EXPRESSION,
                ..Default::default()
            },
            &names,
        );
        let (mut tree, _, id) = tree_with(block);
        tree.compute_variables(id);
        let block = tree.get(id);

        let name = block.identifier("fact").unwrap();
        assert!(!name.is_mutable);
        assert_eq!(name.index_for_indexed_storage, 1);
        assert!(!block.is_function_name_explicitly_declared());
        assert!(block.needs_complex_parameter_copy());
    }

    #[test]
    fn test_parameter_named_like_function_uses_name_slot() {
        let (mut tree, _, id) = tree_with(function_block("f", &["f"], &[], 0));
        tree.compute_variables(id);
        let block = tree.get(id);

        assert!(block.is_function_name_explicitly_declared());
        assert_eq!(block.parameters()[0].index, -1);
        assert!(block.needs_complex_parameter_copy());
    }

    #[test]
    fn test_explicitly_declared_function_name_reserves_a_stack_slot() {
        // function f(a) { var f; var b; }
        let (mut tree, _, id) = tree_with(function_block("f", &["a"], &["f", "b"], 0));
        tree.compute_variables(id);
        let block = tree.get(id);

        assert!(block.is_function_name_explicitly_declared());
        assert!(!block.is_function_name_save_on_heap());
        assert_eq!(block.identifier("f").unwrap().index_for_indexed_storage, 1);
        assert_eq!(block.identifier("a").unwrap().index_for_indexed_storage, 2);
        assert_eq!(block.identifier("b").unwrap().index_for_indexed_storage, 4);
        assert_eq!(block.identifier_on_stack_count(), 5);
        assert_eq!(block.parameters()[0].index, 0);
    }

    #[test]
    fn test_arrow_is_never_a_constructor() {
        let block = InterpretedCodeBlock::new_function(
            FunctionBlockOptions {
                is_constructor: true,
                flags: CodeBlockInitFlags::IS_ARROW_FUNCTION_EXPRESSION,
                ..Default::default()
            },
            &[],
        );
        assert!(!block.is_constructor());
    }

    #[test]
    fn test_eval_code_in_function_drops_arguments() {
        let mut block = InterpretedCodeBlock::new_global(
            CodeBlockKind::Eval,
            false,
            &[ScopeName::implicit("arguments"), ScopeName::declared("x")],
            0,
        );
        block.set_eval_code_in_function();
        let mut tree = CodeBlockTree::new();
        let id = tree.insert(block, None);
        tree.compute_variables(id);
        let block = tree.get(id);
        assert!(!block.has_name("arguments"));
        assert_eq!(block.identifier("x").unwrap().index_for_indexed_storage, 0);
        assert_eq!(block.identifier_on_stack_count(), 1);
    }

    #[test]
    fn test_bound_parameter_count() {
        let mut heap = crate::runtime::object::Heap::new();
        let target = heap.alloc(crate::runtime::object::JsObject::new(
            crate::runtime::object::ObjectKind::Ordinary,
            None,
        ));
        let bound = NativeCodeBlock::bound(target, 3, Value::Undefined, vec![Value::Null]);
        assert_eq!(bound.parameter_count(), 2);
        let over = NativeCodeBlock::bound(target, 1, Value::Undefined, vec![Value::Null; 4]);
        assert_eq!(over.parameter_count(), 0);
        assert!(over.has_call_native_function_code());
    }
}
