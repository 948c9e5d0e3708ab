//! The bytecode virtual machine.
//!
//! ## Structure
//!
//! - `interpreter` - Frame setup, the dispatch loop, `[[Call]]` and
//!   `[[Construct]]`, direct eval
//! - `comparison` - Abstract equality and relational comparison

mod interpreter;

pub mod comparison;
