//! Bytecode compiler for JavaScript.
//!
//! Compilation runs in two passes over the AST:
//!
//! - `scope_analysis`: builds the [`CodeBlockTree`] and decides where each
//!   variable lives (stack, heap environment or named lookup)
//! - `codegen`: emits register-based bytecode for every code block
//!
//! # Module Structure
//!
//! - `bytecode`: Instruction set and per-block bytecode containers
//! - `code_block`: Code block metadata and variable layout
//! - `scope_analysis`: AST walk producing the code block tree
//! - `codegen`: Code generation from AST

pub mod bytecode;
pub mod code_block;
pub mod codegen;
pub mod scope_analysis;

use tracing::{debug, instrument};

use crate::ast::Program;
use crate::config::EngineConfig;
use crate::error::Error;

pub use bytecode::{ByteCodeBlock, Instruction, RegisterIndex};
pub use code_block::{CodeBlock, CodeBlockId, CodeBlockTree, InterpretedCodeBlock};

/// A compiled program or eval unit: its code block tree and the bytecode of
/// every block, indexed by [`CodeBlockId::index`].
#[derive(Debug)]
pub struct Script {
    /// Scope metadata for every code block
    pub code_blocks: CodeBlockTree,
    /// Bytecode for every code block
    pub byte_code: Vec<ByteCodeBlock>,
}

impl Script {
    /// The block the script starts executing in.
    pub fn root(&self) -> CodeBlockId {
        CodeBlockTree::new_root_id()
    }

    /// Scope metadata of `id`.
    pub fn code_block(&self, id: CodeBlockId) -> &InterpretedCodeBlock {
        self.code_blocks.get(id)
    }

    /// Bytecode of `id`.
    pub fn byte_code(&self, id: CodeBlockId) -> &ByteCodeBlock {
        &self.byte_code[id.index()]
    }
}

/// Compiles AST to bytecode.
#[derive(Debug, Clone)]
pub struct Compiler {
    direct_register_fast_path: bool,
}

impl Compiler {
    /// Creates a compiler using the relevant settings of `config`.
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            direct_register_fast_path: config.direct_register_fast_path,
        }
    }

    /// Compiles a program.
    #[instrument(level = "debug", skip_all, fields(statements = program.body.len()))]
    pub fn compile(&self, program: &Program) -> Result<Script, Error> {
        let code_blocks = scope_analysis::analyze_program(program)?;
        self.finish(code_blocks, program)
    }

    /// Compiles the source of a direct `eval` call made from code with the
    /// given strictness, inside a function or at the top level.
    #[instrument(level = "debug", skip_all, fields(strict = caller_is_strict, in_function = in_function))]
    pub fn compile_eval(&self, program: &Program, caller_is_strict: bool, in_function: bool) -> Result<Script, Error> {
        let code_blocks = scope_analysis::analyze_eval(program, caller_is_strict, in_function)?;
        self.finish(code_blocks, program)
    }

    fn finish(&self, code_blocks: CodeBlockTree, program: &Program) -> Result<Script, Error> {
        let byte_code = codegen::generate_script(&code_blocks, &program.body, self.direct_register_fast_path)?;
        debug!(
            blocks = byte_code.len(),
            instructions = byte_code.iter().map(|b| b.code.len()).sum::<usize>(),
            "compiled script"
        );
        Ok(Script { code_blocks, byte_code })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Statement;
    use crate::ast::builder::*;

    #[test]
    fn test_every_block_gets_bytecode() {
        let program = program(vec![
            function_decl("f", &["a"], vec![return_stmt(Some(arrow(&[], ident("a"))))]),
            class_decl("C", None, vec![method("m", &[], vec![])]),
        ]);
        let script = Compiler::default().compile(&program).unwrap();
        assert_eq!(script.byte_code.len(), script.code_blocks.len());
        for id in script.code_blocks.ids() {
            assert_eq!(script.byte_code(id).code_block, id);
            assert!(!script.byte_code(id).code.is_empty());
        }
    }

    #[test]
    fn test_eval_code_inherits_strictness() {
        let program = program(vec![var("x", Some(num(1.0)))]);
        let script = Compiler::default().compile_eval(&program, true, true).unwrap();
        let root = script.code_block(script.root());
        assert!(root.is_eval_code());
        assert!(root.is_strict());
    }

    #[test]
    fn test_syntax_errors_surface() {
        let program = program(vec![Statement::Break]);
        let err = Compiler::default().compile(&program).unwrap_err();
        assert!(matches!(err, Error::SyntaxError(_)));
    }
}
