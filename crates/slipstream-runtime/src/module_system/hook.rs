// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! The bytecode extension hook.
//!
//! Loading `.jsb` files goes through a process-wide extension registry, the
//! same registry the source and JSON handlers live in. Registering the
//! bytecode handler mutates global state, so it never happens implicitly:
//! callers opt in with [`install`] and tests tear down with [`uninstall`].

use std::sync::LazyLock;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::artifact::ARTIFACT_EXTENSION;

/// How a resolved file is turned into module exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionKind {
    /// Parse and execute as JavaScript source
    Source,
    /// Parse as JSON
    Json,
    /// Load as a binary bytecode artifact
    Bytecode,
}

/// Process-wide extension registry (extension without dot → handler kind).
static EXTENSIONS: LazyLock<DashMap<String, ExtensionKind>> = LazyLock::new(|| {
    let map = DashMap::new();
    map.insert("js".to_string(), ExtensionKind::Source);
    map.insert("json".to_string(), ExtensionKind::Json);
    map
});

/// Whether the bytecode hook is currently installed.
static HOOK_INSTALLED: AtomicBool = AtomicBool::new(false);

/// Registers the bytecode handler for `.jsb` files.
///
/// Idempotent and race-free: concurrent callers race on a compare-and-set
/// and exactly one performs the registration.
pub fn install() {
    if HOOK_INSTALLED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        EXTENSIONS.insert(ARTIFACT_EXTENSION.to_string(), ExtensionKind::Bytecode);
        tracing::debug!(extension = ARTIFACT_EXTENSION, "bytecode hook installed");
    }
}

/// Removes the bytecode handler again.
pub fn uninstall() {
    if HOOK_INSTALLED
        .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
        .is_ok()
    {
        EXTENSIONS.remove(ARTIFACT_EXTENSION);
        tracing::debug!(extension = ARTIFACT_EXTENSION, "bytecode hook removed");
    }
}

/// True if the bytecode hook is installed.
pub fn is_installed() -> bool {
    HOOK_INSTALLED.load(Ordering::SeqCst)
}

/// Looks up the handler for a file extension (without dot).
pub fn handler_for(extension: &str) -> Option<ExtensionKind> {
    EXTENSIONS.get(extension).map(|entry| *entry.value())
}

/// Extensions currently registered, in resolution-preference order.
pub fn registered_extensions() -> Vec<String> {
    let mut extensions: Vec<String> = EXTENSIONS.iter().map(|e| e.key().clone()).collect();
    // Deterministic trial order: source first, artifacts last
    extensions.sort_by_key(|ext| match handler_for(ext) {
        Some(ExtensionKind::Source) => 0,
        Some(ExtensionKind::Json) => 1,
        Some(ExtensionKind::Bytecode) => 2,
        None => 3,
    });
    extensions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_is_idempotent() {
        install();
        install();
        assert!(is_installed());
        assert_eq!(
            handler_for(ARTIFACT_EXTENSION),
            Some(ExtensionKind::Bytecode)
        );
        uninstall();
        uninstall();
        assert!(!is_installed());
        assert_eq!(handler_for(ARTIFACT_EXTENSION), None);
    }

    #[test]
    fn test_default_handlers_present() {
        assert_eq!(handler_for("js"), Some(ExtensionKind::Source));
        assert_eq!(handler_for("json"), Some(ExtensionKind::Json));
        assert_eq!(handler_for("wasm"), None);
    }
}
