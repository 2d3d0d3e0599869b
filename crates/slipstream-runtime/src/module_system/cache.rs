// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Module cache for require()

use std::collections::HashMap;
use std::path::PathBuf;

use slipstream_engine::Value;

/// Cached module entry
#[derive(Debug, Clone)]
pub struct CachedModule {
    /// The module's exports
    pub exports: Value,
    /// The module's filename
    pub filename: PathBuf,
    /// Whether the module has finished loading
    pub loaded: bool,
}

/// Per-runtime module cache.
///
/// Entries are inserted before the module body runs, so circular requires
/// observe the in-progress exports object instead of recursing forever.
#[derive(Debug, Default)]
pub struct ModuleCache {
    cache: HashMap<PathBuf, CachedModule>,
}

impl ModuleCache {
    /// Create a new empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached module by path
    pub fn get(&self, path: &PathBuf) -> Option<&CachedModule> {
        self.cache.get(path)
    }

    /// Check if a module is cached
    pub fn has(&self, path: &PathBuf) -> bool {
        self.cache.contains_key(path)
    }

    /// Add a module to the cache
    pub fn set(&mut self, path: PathBuf, module: CachedModule) {
        self.cache.insert(path, module);
    }

    /// Remove a module from the cache
    pub fn delete(&mut self, path: &PathBuf) -> Option<CachedModule> {
        self.cache.remove(path)
    }

    /// Clear the entire cache
    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// Get the number of cached modules
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
