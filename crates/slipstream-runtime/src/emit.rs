// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! File emitter: writes artifacts and loader stubs to disk.
//!
//! Failures carry the offending path and are never retried; file-system
//! problems are the caller's to handle.

use std::fs;
use std::path::Path;

use crate::artifact::Artifact;
use crate::error::{Error, Result};

/// Writes a compiled artifact to `path`.
pub fn write_artifact(path: &Path, artifact: &Artifact) -> Result<()> {
    fs::write(path, artifact.as_bytes()).map_err(|e| Error::io(path, e))?;
    tracing::debug!(path = %path.display(), bytes = artifact.len(), "artifact written");
    Ok(())
}

/// Writes a loader stub that redirects `require` to a sibling artifact.
///
/// `artifact_file` is the artifact's file name; the stub lives next to it.
pub fn write_loader_stub(path: &Path, artifact_file: &str) -> Result<()> {
    let stub = format!("module.exports = require('./{}');\n", artifact_file);
    fs::write(path, stub).map_err(|e| Error::io(path, e))?;
    tracing::debug!(path = %path.display(), target = artifact_file, "loader stub written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_artifact_roundtrips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsb");
        let artifact = Artifact::from_bytes(vec![1, 2, 3]);
        write_artifact(&path, &artifact).unwrap();
        assert_eq!(fs::read(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_write_loader_stub_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("foo.js");
        write_loader_stub(&path, "foo.jsb").unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "module.exports = require('./foo.jsb');\n"
        );
    }

    #[test]
    fn test_write_into_missing_directory_fails_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no/such/dir/out.jsb");
        let err = write_artifact(&path, &Artifact::from_bytes(vec![0])).unwrap_err();
        match err {
            Error::Io { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected Io error, got {:?}", other),
        }
    }
}
