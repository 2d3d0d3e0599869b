// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Error types for the bytecode pipeline and module system.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while compiling, emitting or loading artifacts.
#[derive(Debug, Error)]
pub enum Error {
    /// JavaScript engine error
    #[error("{0}")]
    Engine(#[from] slipstream_engine::Error),

    /// Invalid combination of compile options
    #[error("invalid compile configuration: {0}")]
    Config(String),

    /// Source text failed to parse
    #[error("compile error: {0}")]
    Compile(String),

    /// The engine declined to produce a bytecode cache for this source.
    ///
    /// Recoverable: the caller may fall back to shipping source text.
    #[error("engine produced no bytecode cache for this source")]
    CacheUnavailable,

    /// The artifact's header or payload does not match this engine build
    #[error("bytecode cache rejected: {0}")]
    CacheRejected(String),

    /// The shell runtime never reached its ready state
    #[error("shell runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Input file missing
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// File system error carrying the offending path
    #[error("{}: {source}", path.display())]
    Io {
        /// The path being read or written
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// Module not found
    #[error("Cannot find module '{0}'")]
    ModuleNotFound(String),

    /// Module resolution error
    #[error("Error resolving module '{module}': {reason}")]
    ModuleResolution {
        /// Module specifier
        module: String,
        /// Reason for failure
        reason: String,
    },

    /// JSON module parsing error
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),
}

impl Error {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
