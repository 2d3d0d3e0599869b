// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module path resolution.
//!
//! Relative and absolute specifiers only; the trial order for extension
//! inference comes from the process-wide extension registry, so `.jsb`
//! candidates participate exactly when the bytecode hook is installed.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::module_system::hook;

/// Resolves module specifiers to files on disk.
#[derive(Debug, Default)]
pub struct ModuleResolver;

impl ModuleResolver {
    /// Creates a new module resolver.
    pub fn new() -> Self {
        Self
    }

    /// Resolves a specifier relative to the requiring module's path.
    pub fn resolve(&self, specifier: &str, parent_path: &Path) -> Result<PathBuf> {
        let is_path = specifier.starts_with("./")
            || specifier.starts_with("../")
            || Path::new(specifier).is_absolute();
        if !is_path {
            // Package resolution is out of scope
            return Err(Error::ModuleNotFound(specifier.to_string()));
        }

        let base = if Path::new(specifier).is_absolute() {
            PathBuf::from(specifier)
        } else {
            let parent_dir = parent_path.parent().unwrap_or_else(|| Path::new("."));
            parent_dir.join(specifier)
        };

        // Exact match first
        if base.is_file() {
            return Ok(base);
        }

        // Extension inference over the registered handlers
        if base.extension().is_none() {
            for ext in hook::registered_extensions() {
                let candidate = base.with_extension(&ext);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        Err(Error::ModuleNotFound(specifier.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_resolve_exact_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dep.js");
        fs::write(&file, "1;").unwrap();
        let parent = dir.path().join("main.js");

        let resolver = ModuleResolver::new();
        assert_eq!(resolver.resolve("./dep.js", &parent).unwrap(), file);
    }

    #[test]
    fn test_resolve_infers_extension() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("dep.js");
        fs::write(&file, "1;").unwrap();
        let parent = dir.path().join("main.js");

        let resolver = ModuleResolver::new();
        assert_eq!(resolver.resolve("./dep", &parent).unwrap(), file);
    }

    #[test]
    fn test_bare_specifier_is_not_found() {
        let resolver = ModuleResolver::new();
        let err = resolver
            .resolve("left-pad", Path::new("/srv/main.js"))
            .unwrap_err();
        assert!(matches!(err, Error::ModuleNotFound(_)));
    }

    #[test]
    fn test_missing_relative_file_is_not_found() {
        let resolver = ModuleResolver::new();
        let err = resolver
            .resolve("./nope.js", Path::new("/definitely/missing/main.js"))
            .unwrap_err();
        assert!(matches!(err, Error::ModuleNotFound(_)));
    }
}
