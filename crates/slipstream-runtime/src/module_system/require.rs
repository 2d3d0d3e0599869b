// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CommonJS require() implementation.
//!
//! Each module gets its own `require` closure bound to the module's path, so
//! relative specifiers resolve against the requiring file. Loading dispatches
//! on the extension registry: source files are wrapped and compiled, JSON is
//! parsed, and `.jsb` artifacts go through the bytecode loader when the hook
//! is installed.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use slipstream_engine::{Engine, Value};

use crate::artifact::{self, Artifact};
use crate::error::{Error, Result};
use crate::loader::{run_bytecode, ModuleScope};
use crate::module_system::cache::{CachedModule, ModuleCache};
use crate::module_system::hook::{self, ExtensionKind};
use crate::module_system::resolver::ModuleResolver;

/// Module loader state: resolver plus cache.
#[derive(Debug, Default)]
pub struct ModuleLoader {
    resolver: ModuleResolver,
    cache: ModuleCache,
}

impl ModuleLoader {
    /// Creates a new module loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// The module cache.
    pub fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Clears the module cache.
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

/// Shared handle to a module loader; `require` closures keep one alive.
pub type SharedLoader = Rc<RefCell<ModuleLoader>>;

/// Creates a fresh shared module loader.
pub fn new_shared() -> SharedLoader {
    Rc::new(RefCell::new(ModuleLoader::new()))
}

/// Loads a module for `specifier`, resolved relative to `parent`.
pub fn require_from(
    loader: &SharedLoader,
    engine: &mut Engine,
    specifier: &str,
    parent: &Path,
) -> Result<Value> {
    let resolved = loader.borrow().resolver.resolve(specifier, parent)?;
    let abs_path = resolved.canonicalize().unwrap_or(resolved);

    if let Some(cached) = loader.borrow().cache.get(&abs_path) {
        return Ok(cached.exports.clone());
    }

    let extension = abs_path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_string();
    let kind = hook::handler_for(&extension).ok_or_else(|| Error::ModuleResolution {
        module: abs_path.display().to_string(),
        reason: format!("no handler registered for extension '.{}'", extension),
    })?;

    tracing::debug!(path = %abs_path.display(), ?kind, "loading module");

    match kind {
        ExtensionKind::Source => load_source_module(loader, engine, &abs_path),
        ExtensionKind::Json => load_json_module(loader, engine, &abs_path),
        ExtensionKind::Bytecode => load_bytecode_module(loader, engine, &abs_path),
    }
}

/// Builds the `require` function value for a module at `parent`.
pub fn make_require(loader: &SharedLoader, engine: &mut Engine, parent: PathBuf) -> Value {
    let loader = Rc::clone(loader);
    engine.native("require", move |engine, args| {
        let specifier = match args.first() {
            Some(Value::String(s)) => s.clone(),
            _ => {
                return Err(slipstream_engine::Error::TypeError(
                    "require expects a module specifier string".into(),
                ));
            }
        };
        require_from(&loader, engine, &specifier, &parent).map_err(into_engine_error)
    })
}

/// Maps runtime errors onto engine errors at the native-function boundary,
/// keeping the message (and the cache-rejection kind) intact.
fn into_engine_error(err: Error) -> slipstream_engine::Error {
    match err {
        Error::Engine(inner) => inner,
        Error::CacheRejected(reason) => slipstream_engine::Error::CacheRejected(reason),
        Error::ModuleNotFound(module) => {
            slipstream_engine::Error::TypeError(format!("Cannot find module '{}'", module))
        }
        other => slipstream_engine::Error::InternalError(other.to_string()),
    }
}

/// Creates the module scope for `path` and inserts the in-progress cache
/// entry so circular requires observe partial exports.
fn make_module_scope(loader: &SharedLoader, engine: &mut Engine, path: &Path) -> ModuleScope {
    let exports = engine.alloc_object();
    let module = engine.alloc_object();
    let _ = engine.set_property(&module, "exports", exports.clone());
    let _ = engine.set_property(
        &module,
        "filename",
        Value::String(path.display().to_string()),
    );
    let require = make_require(loader, engine, path.to_path_buf());

    loader.borrow_mut().cache.set(
        path.to_path_buf(),
        CachedModule {
            exports: exports.clone(),
            filename: path.to_path_buf(),
            loaded: false,
        },
    );

    let dirname = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .display()
        .to_string();
    ModuleScope {
        exports,
        require,
        module,
        filename: path.display().to_string(),
        dirname,
    }
}

/// Marks a module as fully loaded with its final exports.
fn finalize(loader: &SharedLoader, path: &Path, exports: &Value) {
    loader.borrow_mut().cache.set(
        path.to_path_buf(),
        CachedModule {
            exports: exports.clone(),
            filename: path.to_path_buf(),
            loaded: true,
        },
    );
}

fn load_source_module(
    loader: &SharedLoader,
    engine: &mut Engine,
    path: &Path,
) -> Result<Value> {
    let source = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let scope = make_module_scope(loader, engine, path);

    let wrapped = artifact::wrap_module(&source);
    let script = engine.compile(&wrapped).map_err(|err| match err {
        slipstream_engine::Error::SyntaxError(msg) => {
            Error::Compile(format!("{}: {}", path.display(), msg))
        }
        other => Error::Engine(other),
    })?;
    let wrapper = engine.run(&script)?;

    let args = [
        scope.exports.clone(),
        scope.require.clone(),
        scope.module.clone(),
        Value::String(scope.filename.clone()),
        Value::String(scope.dirname.clone()),
    ];
    engine.call(&wrapper, &args)?;

    let exports = engine.get_property(&scope.module, "exports");
    finalize(loader, path, &exports);
    Ok(exports)
}

fn load_json_module(loader: &SharedLoader, engine: &mut Engine, path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let json: serde_json::Value = serde_json::from_str(&content)?;
    let value = json_to_value(engine, &json);
    finalize(loader, path, &value);
    Ok(value)
}

fn load_bytecode_module(
    loader: &SharedLoader,
    engine: &mut Engine,
    path: &Path,
) -> Result<Value> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let artifact = Artifact::from_bytes(bytes);
    let scope = make_module_scope(loader, engine, path);

    let exports = run_bytecode(engine, &artifact, Some(scope))?;
    finalize(loader, path, &exports);
    Ok(exports)
}

/// Converts a serde_json value into engine values.
fn json_to_value(engine: &mut Engine, json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(arr) => {
            let object = engine.alloc_object();
            for (i, element) in arr.iter().enumerate() {
                let value = json_to_value(engine, element);
                let _ = engine.set_property(&object, &i.to_string(), value);
            }
            let _ = engine.set_property(&object, "length", Value::Number(arr.len() as f64));
            object
        }
        serde_json::Value::Object(map) => {
            let object = engine.alloc_object();
            for (key, value) in map {
                let value = json_to_value(engine, value);
                let _ = engine.set_property(&object, key, value);
            }
            object
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_require_source_module() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dep.js"), "module.exports = 41 + 2;").unwrap();

        let loader = new_shared();
        let mut engine = Engine::new();
        let value = require_from(
            &loader,
            &mut engine,
            "./dep.js",
            &dir.path().join("main.js"),
        )
        .unwrap();
        assert_eq!(value, Value::Number(43.0));
    }

    #[test]
    fn test_require_caches_by_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("state.js"),
            "exports.calls = (exports.calls || 0) + 1;",
        )
        .unwrap();

        let loader = new_shared();
        let mut engine = Engine::new();
        let parent = dir.path().join("main.js");
        let first = require_from(&loader, &mut engine, "./state.js", &parent).unwrap();
        let again = require_from(&loader, &mut engine, "./state.js", &parent).unwrap();
        assert_eq!(first, again);
        assert_eq!(engine.get_property(&first, "calls"), Value::Number(1.0));
    }

    #[test]
    fn test_require_transitive_dependency() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("leaf.js"), "module.exports = 40;").unwrap();
        fs::write(
            dir.path().join("mid.js"),
            "module.exports = require('./leaf.js') + 3;",
        )
        .unwrap();

        let loader = new_shared();
        let mut engine = Engine::new();
        let value = require_from(
            &loader,
            &mut engine,
            "./mid.js",
            &dir.path().join("main.js"),
        )
        .unwrap();
        assert_eq!(value, Value::Number(43.0));
    }

    #[test]
    fn test_require_json_module() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), r#"{"answer": 43}"#).unwrap();

        let loader = new_shared();
        let mut engine = Engine::new();
        let value = require_from(
            &loader,
            &mut engine,
            "./config.json",
            &dir.path().join("main.js"),
        )
        .unwrap();
        assert_eq!(engine.get_property(&value, "answer"), Value::Number(43.0));
    }

    #[test]
    fn test_require_missing_module() {
        let loader = new_shared();
        let mut engine = Engine::new();
        let err =
            require_from(&loader, &mut engine, "./gone.js", Path::new("/tmp/main.js")).unwrap_err();
        assert!(matches!(err, Error::ModuleNotFound(_)));
    }

    #[test]
    fn test_require_unregistered_extension_fails() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("dep.wasm"), b"\0asm").unwrap();

        let loader = new_shared();
        let mut engine = Engine::new();
        let err = require_from(
            &loader,
            &mut engine,
            "./dep.wasm",
            &dir.path().join("main.js"),
        )
        .unwrap_err();
        assert!(matches!(err, Error::ModuleResolution { .. }));
    }
}
