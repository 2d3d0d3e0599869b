// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! # slipstream-runtime
//!
//! Ahead-of-time bytecode pipeline for the Slipstream JavaScript engine:
//! compile source to a binary artifact, ship the artifact instead of the
//! source, and load it transparently through the module system.
//!
//! ## The pipeline
//!
//! - [`artifact`]: compile source into an engine cache buffer and patch its
//!   header so it loads without the original source text
//! - [`compiler`]: the facade: sync compiles for the standard runtime,
//!   async compiles routed through the GUI-shell host, and whole-file
//!   compiles with optional loader stubs
//! - [`emit`]: write artifacts and loader stubs to disk
//! - [`loader`]: reconstruct and execute an artifact in a module scope
//! - [`module_system`]: `require()`, the module cache and the explicit
//!   `.jsb` extension hook
//! - [`shell`]: the GUI-shell runtime's compile service
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use slipstream_runtime::{compiler, module_system, Runtime};
//!
//! // Compile foo.js to foo.jsb with a loader stub
//! compiler::compile_file(&compiler::CompileRequest {
//!     filename: Some("foo.js".into()),
//!     loader_filename: Some("%.loader.js".into()),
//!     ..Default::default()
//! })
//! .await?;
//!
//! // Later, in another process: run the artifact
//! module_system::install();
//! let mut runtime = Runtime::new();
//! let exports = runtime.run_file(Path::new("foo.jsb"))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod artifact;
pub mod compiler;
pub mod emit;
pub mod error;
pub mod loader;
pub mod module_system;
pub mod runtime;
pub mod shell;

// Re-exports
pub use artifact::{Artifact, ARTIFACT_EXTENSION};
pub use compiler::{CompileRequest, CompileSummary};
pub use error::{Error, Result};
pub use loader::{run_bytecode, ModuleScope};
pub use runtime::Runtime;
pub use shell::ShellHost;

/// Version of the slipstream runtime
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
