// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # slipstream-engine
//!
//! A compact JavaScript engine with a serializable bytecode cache.
//!
//! ## Overview
//!
//! The engine covers the subset of the language needed to run precompiled
//! CommonJS-style modules and plain scripts:
//!
//! - Lexer and recursive-descent parser
//! - Bytecode compiler and stack interpreter
//! - Function values with lexical closures
//! - Object and array literals, property access, `console.log`
//! - Cached-data serialization: compiled scripts round-trip through a
//!   versioned binary format (see [`cache`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use slipstream_engine::{Engine, Value};
//!
//! let mut engine = Engine::new();
//! let script = engine.compile("1 + 2;")?;
//! assert_eq!(engine.run(&script)?, Value::Number(3.0));
//! ```
//!
//! The cache entry points mirror what an embedder needs for ahead-of-time
//! compilation: [`Engine::compile_with_cache`] produces a byte buffer, and
//! [`Engine::script_from_cache`] reconstructs a runnable script from one,
//! reporting [`Error::CacheRejected`] when the buffer does not match this
//! engine build or the supplied source.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ast;
pub mod cache;
pub mod compiler;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod vm;

mod builtins;

use std::rc::Rc;

use compiler::{Chunk, Compiler};
use parser::Parser;
pub use cache::CacheOptions;
pub use runtime::{Callable, Env, JsObject, NativeFn, Value};

/// A compiled, runnable script.
#[derive(Debug, Clone)]
pub struct Script {
    chunk: Rc<Chunk>,
}

impl Script {
    /// The script's bytecode chunk.
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }
}

/// The main JavaScript engine instance.
///
/// Owns the object heap and the global scope. Values produced by one engine
/// must not be used with another.
pub struct Engine {
    pub(crate) heap: Vec<JsObject>,
    pub(crate) globals: Env,
}

impl Engine {
    /// Creates a new engine with the default globals installed.
    pub fn new() -> Self {
        let mut engine = Self {
            heap: Vec::with_capacity(64),
            globals: Env::default(),
        };
        builtins::install(&mut engine);
        engine
    }

    /// Compiles JavaScript source code into a script.
    pub fn compile(&mut self, source: &str) -> Result<Script, Error> {
        let program = Parser::new(source).parse_program()?;
        let chunk = Compiler::new().compile(&program)?;
        Ok(Script {
            chunk: Rc::new(chunk),
        })
    }

    /// Compiles source code and produces a cache buffer alongside the script.
    ///
    /// The buffer is a self-contained cached-data image (header + payload)
    /// that [`Engine::script_from_cache`] accepts. For degenerate input that
    /// compiles to an empty program the engine declines to produce a cache
    /// and the buffer comes back empty; callers must check.
    pub fn compile_with_cache(&mut self, source: &str) -> Result<(Script, Vec<u8>), Error> {
        self.compile_with_cache_options(source, &CacheOptions::default())
    }

    /// Like [`Engine::compile_with_cache`], with explicit cache options.
    pub fn compile_with_cache_options(
        &mut self,
        source: &str,
        options: &CacheOptions,
    ) -> Result<(Script, Vec<u8>), Error> {
        let script = self.compile(source)?;
        if cache::is_degenerate(script.chunk()) {
            return Ok((script, Vec::new()));
        }
        let bytes = cache::serialize(script.chunk(), source.len(), options);
        Ok((script, bytes))
    }

    /// Reconstructs a script from cached data.
    ///
    /// `source` is validated against the cache header; a mismatch in magic,
    /// version tag, flags or source digest fails with [`Error::CacheRejected`]
    /// rather than producing a broken script.
    pub fn script_from_cache(&mut self, source: &[u8], bytes: &[u8]) -> Result<Script, Error> {
        let chunk = cache::deserialize(source, bytes)?;
        Ok(Script {
            chunk: Rc::new(chunk),
        })
    }

    /// Runs a script to completion and returns its completion value.
    pub fn run(&mut self, script: &Script) -> Result<Value, Error> {
        let globals = Rc::clone(&self.globals);
        self.execute(script.chunk(), globals)
    }

    /// Evaluates source text directly (compile + run).
    pub fn eval(&mut self, source: &str) -> Result<Value, Error> {
        let script = self.compile(source)?;
        self.run(&script)
    }

    /// Calls a function value with the given arguments.
    pub fn call(&mut self, callee: &Value, args: &[Value]) -> Result<Value, Error> {
        self.call_value(callee.clone(), args)
    }

    /// Allocates a fresh empty object and returns its handle.
    pub fn alloc_object(&mut self) -> Value {
        let index = self.heap.len();
        self.heap.push(JsObject::default());
        Value::Object(index)
    }

    /// Reads a property off an object value, `undefined` when absent.
    pub fn get_property(&self, object: &Value, name: &str) -> Value {
        match object {
            Value::Object(index) => self
                .heap
                .get(*index)
                .and_then(|obj| obj.props.get(name).cloned())
                .unwrap_or(Value::Undefined),
            Value::String(s) if name == "length" => Value::Number(s.chars().count() as f64),
            _ => Value::Undefined,
        }
    }

    /// Sets a property on an object value.
    pub fn set_property(&mut self, object: &Value, name: &str, value: Value) -> Result<(), Error> {
        match object {
            Value::Object(index) => match self.heap.get_mut(*index) {
                Some(obj) => {
                    obj.props.insert(name.to_string(), value);
                    Ok(())
                }
                None => Err(Error::InternalError(format!(
                    "dangling object handle {}",
                    index
                ))),
            },
            other => Err(Error::TypeError(format!(
                "cannot set property '{}' on {}",
                name,
                other.type_of()
            ))),
        }
    }

    /// Defines a global binding.
    pub fn define_global(&mut self, name: &str, value: Value) {
        self.globals
            .borrow_mut()
            .vars
            .insert(name.to_string(), value);
    }

    /// Wraps a Rust closure as a callable native function value.
    pub fn native(
        &mut self,
        name: &str,
        func: impl Fn(&mut Engine, &[Value]) -> Result<Value, Error> + 'static,
    ) -> Value {
        Value::Function(Rc::new(Callable::Native {
            name: name.to_string(),
            func: Rc::new(func),
        }))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur during compilation or execution.
#[derive(Debug, Clone)]
pub enum Error {
    /// Syntax error during parsing
    SyntaxError(String),
    /// Type error during execution
    TypeError(String),
    /// Reference error (undefined variable)
    ReferenceError(String),
    /// Range error (out of bounds, etc.)
    RangeError(String),
    /// Internal engine error
    InternalError(String),
    /// Cached data did not match this engine build or the supplied source
    CacheRejected(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::SyntaxError(msg) => write!(f, "SyntaxError: {}", msg),
            Error::TypeError(msg) => write!(f, "TypeError: {}", msg),
            Error::ReferenceError(msg) => write!(f, "ReferenceError: {}", msg),
            Error::RangeError(msg) => write!(f, "RangeError: {}", msg),
            Error::InternalError(msg) => write!(f, "InternalError: {}", msg),
            Error::CacheRejected(msg) => write!(f, "CacheRejected: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
