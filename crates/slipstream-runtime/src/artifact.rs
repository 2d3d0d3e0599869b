// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Artifact codec: compile source into a cache buffer and repair its header
//! for source-less loading.
//!
//! The engine records a digest of the compile-time source in the buffer
//! header and refuses to consume the buffer against anything else. Artifacts
//! are loaded long after the source is gone, so after compiling we overwrite
//! two header fields (the rejected flag and the source digest) through a
//! version-keyed layout table. A patched artifact validates against the
//! engine's fixed placeholder source while still executing the originally
//! compiled code.

use slipstream_engine::cache;
use slipstream_engine::Engine;

use crate::error::{Error, Result};

/// File extension for artifact files (without the dot).
pub const ARTIFACT_EXTENSION: &str = "jsb";

/// A binary bytecode artifact.
///
/// Opaque engine bytes apart from the header fields the codec patches.
/// Immutable once patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    bytes: Vec<u8>,
}

impl Artifact {
    /// Wraps raw bytes read from disk or returned by an engine.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// The raw artifact bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the artifact, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// True when the engine declined to produce a cache (the
    /// `CacheUnavailable` condition).
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Byte offsets of the patchable header fields, keyed by the cache format
/// version found in the artifact itself.
///
/// This is the single most fragile coupling to the engine: the offsets move
/// when the engine revs its cache format, so they live in a table that fails
/// loudly for unknown versions instead of guessing.
#[derive(Debug, Clone, Copy)]
pub struct HeaderLayout {
    /// Offset of the flags word
    pub flags_offset: usize,
    /// Offset of the source digest word
    pub digest_offset: usize,
}

impl HeaderLayout {
    /// Layout for cache format version 1.
    pub const V1: HeaderLayout = HeaderLayout {
        flags_offset: cache::FLAGS_OFFSET,
        digest_offset: cache::SOURCE_DIGEST_OFFSET,
    };

    /// Looks up the layout for a format version tag.
    pub fn for_version(version: u32) -> Option<HeaderLayout> {
        match version {
            1 => Some(Self::V1),
            _ => None,
        }
    }

    /// Reads the version tag out of an artifact and resolves its layout.
    pub fn for_artifact(artifact: &Artifact) -> Result<HeaderLayout> {
        let bytes = artifact.as_bytes();
        if bytes.len() < cache::HEADER_LEN {
            return Err(Error::CacheRejected("artifact too short for header".into()));
        }
        if bytes[0..4] != cache::CACHE_MAGIC {
            return Err(Error::CacheRejected("artifact has bad magic".into()));
        }
        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        Self::for_version(version).ok_or_else(|| {
            Error::CacheRejected(format!("unrecognized cache format version {}", version))
        })
    }
}

/// Options for the codec compile step.
#[derive(Debug, Clone, Copy)]
pub struct CodecOptions {
    /// Wrap the source in the CommonJS function wrapper before compiling,
    /// so top-level `require`, `module`, `exports`, `__filename` and
    /// `__dirname` resolve at run time.
    pub compile_as_module: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            compile_as_module: true,
        }
    }
}

/// Opening of the CommonJS module wrapper.
pub const MODULE_WRAPPER_OPEN: &str =
    "(function (exports, require, module, __filename, __dirname) {\n";

/// Closing of the CommonJS module wrapper.
pub const MODULE_WRAPPER_CLOSE: &str = "\n});";

/// Wraps source code in the CommonJS module wrapper.
pub fn wrap_module(source: &str) -> String {
    format!("{}{}{}", MODULE_WRAPPER_OPEN, source, MODULE_WRAPPER_CLOSE)
}

/// Compiles source text into an artifact.
///
/// Pure transform: no I/O, no header patching. Degenerate input yields an
/// empty artifact rather than an error; check [`Artifact::is_empty`].
pub fn compile(engine: &mut Engine, source: &str, options: &CodecOptions) -> Result<Artifact> {
    let text = if options.compile_as_module {
        wrap_module(source)
    } else {
        source.to_string()
    };
    let (_, bytes) = engine.compile_with_cache(&text).map_err(|err| match err {
        slipstream_engine::Error::SyntaxError(msg) => Error::Compile(msg),
        other => Error::Engine(other),
    })?;
    Ok(Artifact::from_bytes(bytes))
}

/// Repairs an artifact header so the engine accepts it without the original
/// source text.
///
/// Overwrites the rejected flag (forced clear) and the source digest (forced
/// to the placeholder's digest). Idempotent: patching twice is byte-identical.
pub fn patch_header(artifact: &mut Artifact) -> Result<()> {
    if artifact.is_empty() {
        return Err(Error::CacheUnavailable);
    }
    let layout = HeaderLayout::for_artifact(artifact)?;
    let bytes = &mut artifact.bytes;

    let mut flags = u32::from_le_bytes([
        bytes[layout.flags_offset],
        bytes[layout.flags_offset + 1],
        bytes[layout.flags_offset + 2],
        bytes[layout.flags_offset + 3],
    ]);
    flags &= !cache::FLAG_REJECTED;
    bytes[layout.flags_offset..layout.flags_offset + 4].copy_from_slice(&flags.to_le_bytes());

    let digest = cache::source_digest(cache::PLACEHOLDER_SOURCE.len());
    bytes[layout.digest_offset..layout.digest_offset + 4].copy_from_slice(&digest.to_le_bytes());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_produces_nonempty_artifact() {
        let mut engine = Engine::new();
        let artifact = compile(&mut engine, "43;", &CodecOptions::default()).unwrap();
        assert!(!artifact.is_empty());
    }

    #[test]
    fn test_degenerate_plain_script_is_empty() {
        let mut engine = Engine::new();
        let artifact = compile(
            &mut engine,
            "",
            &CodecOptions {
                compile_as_module: false,
            },
        )
        .unwrap();
        assert!(artifact.is_empty());
    }

    #[test]
    fn test_syntax_error_maps_to_compile_error() {
        let mut engine = Engine::new();
        let err = compile(&mut engine, "var = 1;", &CodecOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Compile(_)));
    }

    #[test]
    fn test_patch_header_is_idempotent() {
        let mut engine = Engine::new();
        let mut artifact = compile(&mut engine, "1 + 2;", &CodecOptions::default()).unwrap();
        patch_header(&mut artifact).unwrap();
        let once = artifact.clone();
        patch_header(&mut artifact).unwrap();
        assert_eq!(artifact, once);
    }

    #[test]
    fn test_patch_rejects_unknown_version() {
        let mut artifact = Artifact::from_bytes({
            let mut bytes = vec![0u8; 32];
            bytes[0..4].copy_from_slice(b"JSBC");
            bytes[4..8].copy_from_slice(&99u32.to_le_bytes());
            bytes
        });
        let err = patch_header(&mut artifact).unwrap_err();
        assert!(matches!(err, Error::CacheRejected(_)));
    }

    #[test]
    fn test_patch_rejects_foreign_bytes() {
        let mut artifact = Artifact::from_bytes(b"definitely not an artifact".to_vec());
        assert!(matches!(
            patch_header(&mut artifact),
            Err(Error::CacheRejected(_))
        ));
    }

    #[test]
    fn test_layout_table_covers_current_engine_version() {
        assert!(HeaderLayout::for_version(cache::CACHE_FORMAT_VERSION).is_some());
        assert!(HeaderLayout::for_version(0).is_none());
    }
}
