// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # kestrel-engine
//!
//! The core of an ECMAScript engine: scope resolution, register-based
//! bytecode generation, an interpreter and the `Proxy` exotic object.
//!
//! ## Overview
//!
//! - Scope analysis decides for every variable whether it lives in a
//!   register, a heap environment or behind a named lookup
//! - Code generation lowers the AST (including classes, `super` and
//!   `for-of`) to register bytecode
//! - The realm implements the object internal methods and dispatches
//!   proxies to their handler traps with invariant checks
//!
//! Source text is never parsed here. Hosts build a [`ast::Program`] with
//! their own parser (or [`ast::builder`]) and, to support `eval`, register
//! a [`SourceParser`].
//!
//! ## Quick Start
//!
//! ```rust
//! use kestrel_engine::ast::BinaryOperator;
//! use kestrel_engine::ast::builder::*;
//! use kestrel_engine::{Engine, Value};
//!
//! let program = program(vec![
//!     var("x", Some(num(40.0))),
//!     expr_stmt(binary(BinaryOperator::Add, ident("x"), num(2.0))),
//! ]);
//! let mut engine = Engine::new();
//! assert_eq!(engine.run(&program).unwrap(), Value::Number(42.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod builtins;
pub mod compiler;
pub mod config;
pub mod error;
pub mod runtime;
pub mod vm;

use std::rc::Rc;

use tracing::instrument;

pub use ast::Program;
pub use compiler::{Compiler, Script};
pub use config::EngineConfig;
pub use error::{Error, JsResult};
pub use runtime::{ObjectRef, PropertyKey, Realm, Value};

/// Turns source text into a [`Program`]. Required for `eval`.
pub trait SourceParser {
    /// Parses `source` as a script.
    fn parse(&self, source: &str) -> Result<Program, Error>;
}

/// A JavaScript engine instance: one realm plus the compiler that feeds it.
pub struct Engine {
    realm: Realm,
}

impl Engine {
    /// Creates an engine with the process-wide default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::process_default().clone())
    }

    /// Creates an engine with an explicit configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            realm: Realm::with_config(config),
        }
    }

    /// Compiles `program` without running it.
    pub fn compile(&self, program: &Program) -> Result<Script, Error> {
        self.realm.compiler.compile(program)
    }

    /// Compiles and runs `program`, returning its completion value.
    ///
    /// An uncaught native error instance comes back as the matching
    /// [`Error`] variant; any other thrown value as [`Error::Thrown`].
    #[instrument(level = "debug", skip_all)]
    pub fn run(&mut self, program: &Program) -> Result<Value, Error> {
        let script = Rc::new(self.compile(program)?);
        match self.realm.run_script(script) {
            Err(Error::Thrown(value)) => Err(self.realm.value_to_error(value)),
            other => other,
        }
    }

    /// Registers the parser `eval` uses.
    pub fn set_source_parser(&mut self, parser: impl SourceParser + 'static) {
        self.realm.set_source_parser(Rc::new(parser));
    }

    /// The realm scripts run in.
    pub fn realm(&self) -> &Realm {
        &self.realm
    }

    /// Mutable access to the realm, e.g. to call functions a script returned.
    pub fn realm_mut(&mut self) -> &mut Realm {
        &mut self.realm
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
