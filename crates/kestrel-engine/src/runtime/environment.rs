//! Environment records for heap-resident and named bindings.
//!
//! Stack-allocated variables never show up here; they live in the frame's
//! register file. What remains is a chain of:
//!
//! - declarative records: one per call of a code block that cannot keep its
//!   environment on the stack, plus one per eval. Slots are laid out by the
//!   code block's heap indices, and named lookups go through its identifier
//!   table.
//! - `with` records wrapping a binding object.
//! - the global record, backed by the global object.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::object::ObjectRef;
use super::value::Value;
use crate::compiler::Script;
use crate::compiler::code_block::CodeBlockId;

/// Shared handle to an environment.
pub type EnvRef = Rc<Environment>;

/// One link of the scope chain.
#[derive(Debug)]
pub struct Environment {
    /// The bindings this link contributes
    pub record: EnvironmentRecord,
    /// The enclosing environment
    pub outer: Option<EnvRef>,
}

/// What kind of bindings an environment holds.
#[derive(Debug)]
pub enum EnvironmentRecord {
    /// Heap slots of one code block activation
    Declarative(DeclarativeRecord),
    /// Properties of a `with` statement's object
    With(ObjectRef),
    /// Properties of the global object
    Global(ObjectRef),
}

/// Heap slots of a code block, addressable by index or by name.
pub struct DeclarativeRecord {
    script: Rc<Script>,
    code_block: CodeBlockId,
    slots: RefCell<Vec<Value>>,
}

/// A heap binding found by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotBinding {
    /// Slot index within the record
    pub index: usize,
    /// False for `const` and implicit function-name bindings
    pub is_mutable: bool,
}

impl DeclarativeRecord {
    /// The code block whose heap layout this record follows.
    pub fn code_block(&self) -> CodeBlockId {
        self.code_block
    }

    /// Looks up a heap-resident identifier of the owning code block.
    pub fn find(&self, name: &str) -> Option<SlotBinding> {
        self.script
            .code_block(self.code_block)
            .identifier(name)
            .filter(|info| !info.need_to_allocate_on_stack)
            .map(|info| SlotBinding {
                index: info.index_for_indexed_storage,
                is_mutable: info.is_mutable,
            })
    }

    /// Reads a slot.
    pub fn get(&self, index: usize) -> Value {
        self.slots.borrow().get(index).cloned().unwrap_or_default()
    }

    /// Writes a slot.
    pub fn set(&self, index: usize, value: Value) {
        let mut slots = self.slots.borrow_mut();
        if index >= slots.len() {
            slots.resize(index + 1, Value::Undefined);
        }
        slots[index] = value;
    }
}

impl fmt::Debug for DeclarativeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeclarativeRecord")
            .field("code_block", &self.code_block.index())
            .field("slots", &self.slots.borrow().len())
            .finish()
    }
}

impl Environment {
    /// The global environment.
    pub fn new_global(global_object: ObjectRef) -> EnvRef {
        Rc::new(Self {
            record: EnvironmentRecord::Global(global_object),
            outer: None,
        })
    }

    /// A declarative record sized for `code_block`'s heap identifiers.
    pub fn new_declarative(script: Rc<Script>, code_block: CodeBlockId, outer: Option<EnvRef>) -> EnvRef {
        let size = script.code_block(code_block).identifier_on_heap_count();
        Rc::new(Self {
            record: EnvironmentRecord::Declarative(DeclarativeRecord {
                script,
                code_block,
                slots: RefCell::new(vec![Value::Undefined; size]),
            }),
            outer,
        })
    }

    /// A `with` record over `object`.
    pub fn new_with(object: ObjectRef, outer: EnvRef) -> EnvRef {
        Rc::new(Self {
            record: EnvironmentRecord::With(object),
            outer: Some(outer),
        })
    }

    /// The declarative record, if this is one.
    pub fn declarative(&self) -> Option<&DeclarativeRecord> {
        match &self.record {
            EnvironmentRecord::Declarative(record) => Some(record),
            _ => None,
        }
    }

    /// Iterates this environment and every enclosing one, innermost first.
    pub fn chain(self: &Rc<Self>) -> impl Iterator<Item = &Environment> {
        std::iter::successors(Some(self.as_ref()), |env| env.outer.as_deref())
    }

    /// The environment `up` links out.
    pub fn ancestor(self: &Rc<Self>, up: usize) -> Option<&Environment> {
        self.chain().nth(up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builder::*;
    use crate::compiler::{CodeBlockTree, Compiler};

    fn closure_script() -> Rc<Script> {
        // function outer() { var a = 1, b; return function () { return a; }; }
        let program = program(vec![function_decl(
            "outer",
            &[],
            vec![
                var("a", Some(num(1.0))),
                var("b", None),
                return_stmt(Some(function_expr(None, &[], vec![return_stmt(Some(ident("a")))]))),
            ],
        )]);
        Rc::new(Compiler::default().compile(&program).unwrap())
    }

    #[test]
    fn test_declarative_record_finds_heap_identifiers_only() {
        let script = closure_script();
        let outer = script.code_block(CodeBlockTree::new_root_id()).children()[0];
        let env = Environment::new_declarative(script.clone(), outer, None);
        let record = env.declarative().unwrap();

        let a = record.find("a").unwrap();
        assert!(a.is_mutable);
        assert!(record.find("b").is_none());
        assert!(record.find("missing").is_none());

        record.set(a.index, Value::Number(7.0));
        assert_eq!(record.get(a.index), Value::Number(7.0));
    }

    #[test]
    fn test_ancestor_walk() {
        let script = closure_script();
        let outer = script.code_block(CodeBlockTree::new_root_id()).children()[0];
        let global = Environment::new_global(crate::runtime::realm::Realm::new().global_object());
        let function = Environment::new_declarative(script, outer, Some(global));

        assert!(function.ancestor(0).unwrap().declarative().is_some());
        assert!(matches!(
            function.ancestor(1).unwrap().record,
            EnvironmentRecord::Global(_)
        ));
        assert!(function.ancestor(2).is_none());
        assert_eq!(function.chain().count(), 2);
    }
}
