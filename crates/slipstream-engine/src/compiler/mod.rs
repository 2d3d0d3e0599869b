//! Bytecode compiler for JavaScript.
//!
//! Transforms AST into bytecode that can be executed by the VM.

pub mod bytecode;
pub mod codegen;

pub use bytecode::{Chunk, Const, FunctionProto, Instruction, OpCode};
pub use codegen::Compiler;
