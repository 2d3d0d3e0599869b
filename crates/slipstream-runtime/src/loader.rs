// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Runtime loader: executes binary artifacts in a module-shaped scope.

use std::path::Path;

use slipstream_engine::cache;
use slipstream_engine::{Engine, Value};

use crate::artifact::{Artifact, HeaderLayout};
use crate::error::{Error, Result};

/// The module-shaped scope an artifact executes against.
///
/// Mirrors the CommonJS wrapper parameter list: `exports`, `require`,
/// `module`, `__filename`, `__dirname`.
#[derive(Debug, Clone)]
pub struct ModuleScope {
    /// The initial exports object
    pub exports: Value,
    /// The `require` function visible to the module
    pub require: Value,
    /// The module object (`module.exports` is read back after execution)
    pub module: Value,
    /// Absolute path of the module file
    pub filename: String,
    /// Directory of the module file
    pub dirname: String,
}

impl ModuleScope {
    /// Builds a fresh scope for a module at `path`, with a `require` that
    /// rejects: artifacts loaded outside the module system have no resolver
    /// to delegate to.
    pub fn synthetic(engine: &mut Engine, path: &Path) -> Self {
        let exports = engine.alloc_object();
        let module = engine.alloc_object();
        // set_property on fresh objects cannot fail
        let _ = engine.set_property(&module, "exports", exports.clone());
        let require = engine.native("require", |_engine, _args| {
            Err(slipstream_engine::Error::TypeError(
                "require is not available outside the module system".into(),
            ))
        });
        let dirname = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .display()
            .to_string();
        Self {
            exports,
            require,
            module,
            filename: path.display().to_string(),
            dirname,
        }
    }
}

/// Reconstructs a code object from an artifact and executes it.
///
/// The engine is handed the fixed placeholder source whose digest
/// [`crate::artifact::patch_header`] stamped into the header; an unpatched,
/// tampered or version-mismatched artifact fails with
/// [`Error::CacheRejected`] and never executes.
///
/// If the completion value is callable (the artifact was compiled as a
/// module) it is invoked against `scope`, or a fresh module-like scope,
/// and `module.exports` is returned. Otherwise the completion value itself
/// is returned.
pub fn run_bytecode(
    engine: &mut Engine,
    artifact: &Artifact,
    scope: Option<ModuleScope>,
) -> Result<Value> {
    if artifact.is_empty() {
        return Err(Error::CacheRejected("artifact is empty".into()));
    }
    // Unknown engine versions fail here, before the digest comparison
    HeaderLayout::for_artifact(artifact)?;

    let script = engine
        .script_from_cache(cache::PLACEHOLDER_SOURCE, artifact.as_bytes())
        .map_err(|err| match err {
            slipstream_engine::Error::CacheRejected(reason) => Error::CacheRejected(reason),
            other => Error::Engine(other),
        })?;

    let completion = engine.run(&script)?;
    if !completion.is_function() {
        return Ok(completion);
    }

    let scope = match scope {
        Some(scope) => scope,
        None => ModuleScope::synthetic(engine, Path::new("<anonymous>")),
    };
    tracing::debug!(filename = %scope.filename, "executing module artifact");

    let args = [
        scope.exports.clone(),
        scope.require.clone(),
        scope.module.clone(),
        Value::String(scope.filename.clone()),
        Value::String(scope.dirname.clone()),
    ];
    engine.call(&completion, &args)?;
    Ok(engine.get_property(&scope.module, "exports"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{self, CodecOptions};

    fn compiled(source: &str, as_module: bool) -> Artifact {
        let mut engine = Engine::new();
        let mut artifact = artifact::compile(
            &mut engine,
            source,
            &CodecOptions {
                compile_as_module: as_module,
            },
        )
        .unwrap();
        artifact::patch_header(&mut artifact).unwrap();
        artifact
    }

    #[test]
    fn test_plain_script_returns_completion_value() {
        let artifact = compiled("console.log('hi'); 43;", false);
        let mut engine = Engine::new();
        let value = run_bytecode(&mut engine, &artifact, None).unwrap();
        assert_eq!(value, Value::Number(43.0));
    }

    #[test]
    fn test_module_returns_exports() {
        let artifact = compiled("module.exports = 40 + 3;", true);
        let mut engine = Engine::new();
        let value = run_bytecode(&mut engine, &artifact, None).unwrap();
        assert_eq!(value, Value::Number(43.0));
    }

    #[test]
    fn test_unpatched_artifact_is_rejected() {
        let mut engine = Engine::new();
        let artifact =
            artifact::compile(&mut engine, "1;", &CodecOptions::default()).unwrap();
        // No patch_header call
        let err = run_bytecode(&mut engine, &artifact, None).unwrap_err();
        assert!(matches!(err, Error::CacheRejected(_)));
    }

    #[test]
    fn test_tampered_digest_is_rejected() {
        let mut artifact = compiled("1 + 1;", false);
        let mut bytes = artifact.clone().into_bytes();
        let offset = slipstream_engine::cache::SOURCE_DIGEST_OFFSET;
        bytes[offset] = bytes[offset].wrapping_add(1);
        artifact = Artifact::from_bytes(bytes);

        let mut engine = Engine::new();
        let err = run_bytecode(&mut engine, &artifact, None).unwrap_err();
        assert!(matches!(err, Error::CacheRejected(_)));
    }

    #[test]
    fn test_empty_artifact_is_rejected() {
        let mut engine = Engine::new();
        let err = run_bytecode(&mut engine, &Artifact::from_bytes(Vec::new()), None).unwrap_err();
        assert!(matches!(err, Error::CacheRejected(_)));
    }

    #[test]
    fn test_scope_receives_filename() {
        let artifact = compiled("module.exports = __filename;", true);
        let mut engine = Engine::new();
        let scope = ModuleScope::synthetic(&mut engine, Path::new("/srv/app/mod.jsb"));
        let value = run_bytecode(&mut engine, &artifact, Some(scope)).unwrap();
        assert_eq!(value, Value::String("/srv/app/mod.jsb".into()));
    }
}
