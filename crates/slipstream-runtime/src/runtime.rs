// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The runtime driver: one engine instance wired to one module loader.

use std::path::{Path, PathBuf};

use slipstream_engine::{Engine, Value};

use crate::error::{Error, Result};
use crate::module_system::{self, SharedLoader};

/// An embedding of the engine plus the module system.
///
/// This is what the CLI `run` subcommand uses; library consumers can reach
/// the underlying engine through [`Runtime::engine_mut`].
pub struct Runtime {
    engine: Engine,
    loader: SharedLoader,
    cwd: PathBuf,
}

impl Runtime {
    /// Creates a runtime rooted at the current working directory.
    pub fn new() -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_cwd(cwd)
    }

    /// Creates a runtime rooted at `cwd`.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        Self {
            engine: Engine::new(),
            loader: module_system::new_shared(),
            cwd,
        }
    }

    /// The underlying engine.
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Loads and executes a file as the main module, returning its exports
    /// (or completion value for plain-script artifacts).
    pub fn run_file(&mut self, path: &Path) -> Result<Value> {
        let abs_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        };
        if !abs_path.is_file() {
            return Err(Error::FileNotFound(abs_path));
        }

        let specifier = abs_path.display().to_string();
        let parent = self.cwd.join("__main__");
        module_system::require_from(&self.loader, &mut self.engine, &specifier, &parent)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_run_file_returns_exports() {
        let dir = tempfile::tempdir().unwrap();
        let main = dir.path().join("main.js");
        fs::write(&main, "module.exports = 6 * 7;").unwrap();

        let mut runtime = Runtime::with_cwd(dir.path().to_path_buf());
        assert_eq!(runtime.run_file(&main).unwrap(), Value::Number(42.0));
    }

    #[test]
    fn test_run_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let mut runtime = Runtime::with_cwd(dir.path().to_path_buf());
        let err = runtime.run_file(Path::new("absent.js")).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
