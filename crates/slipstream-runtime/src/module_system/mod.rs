// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! CommonJS-style module system.
//!
//! - `require()` with per-module resolution and caching
//! - Extension dispatch through a process-wide registry
//! - The bytecode hook that routes `.jsb` files to the artifact loader
//!
//! The hook mutates process-wide state and is therefore explicit: nothing in
//! this crate installs it as a side effect of being loaded.

mod cache;
pub mod hook;
mod require;
mod resolver;

pub use cache::{CachedModule, ModuleCache};
pub use hook::{install, is_installed, uninstall, ExtensionKind};
pub use require::{make_require, new_shared, require_from, ModuleLoader, SharedLoader};
pub use resolver::ModuleResolver;
