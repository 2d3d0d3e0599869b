// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Compiler facade: the compile entry points callers use.
//!
//! Composes the artifact codec for the two target runtimes. The standard
//! runtime compiles synchronously in-process; the GUI-shell target routes
//! the compile through a [`ShellHost`] and is therefore asynchronous.

use std::path::{Path, PathBuf};
use std::time::Duration;

use slipstream_engine::Engine;

use crate::artifact::{self, Artifact, CodecOptions, ARTIFACT_EXTENSION};
use crate::emit;
use crate::error::{Error, Result};
use crate::shell::{ShellHost, DEFAULT_READY_TIMEOUT};

/// A compile request.
///
/// Exactly one of `filename` and `code` must be supplied.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Path to read source from
    pub filename: Option<PathBuf>,
    /// Inline source text
    pub code: Option<String>,
    /// Wrap the source in the CommonJS wrapper (default true)
    pub compile_as_module: bool,
    /// Target the GUI-shell runtime instead of the standard one
    pub shell: bool,
    /// Destination for the artifact; defaults to `filename` with the
    /// artifact extension
    pub output: Option<PathBuf>,
    /// Destination for a loader stub; `%` is replaced with the input's
    /// file stem. No stub is written when absent.
    pub loader_filename: Option<String>,
    /// How long to wait for shell readiness (shell target only)
    pub shell_ready_timeout: Option<Duration>,
}

impl Default for CompileRequest {
    fn default() -> Self {
        Self {
            filename: None,
            code: None,
            compile_as_module: true,
            shell: false,
            output: None,
            loader_filename: None,
            shell_ready_timeout: None,
        }
    }
}

impl CompileRequest {
    fn validate(&self) -> Result<()> {
        match (&self.filename, &self.code) {
            (Some(_), Some(_)) => Err(Error::Config(
                "filename and code are mutually exclusive".into(),
            )),
            (None, None) => Err(Error::Config(
                "either filename or code must be supplied".into(),
            )),
            _ => Ok(()),
        }
    }

    fn codec_options(&self) -> CodecOptions {
        CodecOptions {
            compile_as_module: self.compile_as_module,
        }
    }
}

/// Paths produced by a file compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileSummary {
    /// Where the artifact was written
    pub output: PathBuf,
    /// Where the loader stub was written, if requested
    pub loader: Option<PathBuf>,
}

/// Compiles source text for the standard runtime: codec compile plus header
/// patch, synchronously.
pub fn compile_code(engine: &mut Engine, source: &str, options: &CodecOptions) -> Result<Artifact> {
    let mut compiled = artifact::compile(engine, source, options)?;
    if compiled.is_empty() {
        return Err(Error::CacheUnavailable);
    }
    artifact::patch_header(&mut compiled)?;
    Ok(compiled)
}

/// Compiles source text for the GUI-shell runtime.
///
/// Suspends until the shell reports readiness (bounded by `timeout`),
/// compiles inside the shell's environment and patches the resulting header.
pub async fn compile_code_for_shell(
    source: &str,
    options: &CodecOptions,
    timeout: Option<Duration>,
) -> Result<Artifact> {
    let text = if options.compile_as_module {
        artifact::wrap_module(source)
    } else {
        source.to_string()
    };
    let host = ShellHost::spawn()?;
    let bytes = host
        .compile(&text, timeout.unwrap_or(DEFAULT_READY_TIMEOUT))
        .await?;
    let mut compiled = Artifact::from_bytes(bytes);
    if compiled.is_empty() {
        return Err(Error::CacheUnavailable);
    }
    artifact::patch_header(&mut compiled)?;
    Ok(compiled)
}

/// Compiles a file (or inline code) to an artifact on disk, optionally
/// emitting a loader stub.
pub async fn compile_file(request: &CompileRequest) -> Result<CompileSummary> {
    request.validate()?;

    let source = match &request.filename {
        Some(path) => {
            if !path.is_file() {
                return Err(Error::FileNotFound(path.clone()));
            }
            std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?
        }
        None => request.code.clone().unwrap_or_default(),
    };

    let output = match (&request.output, &request.filename) {
        (Some(output), _) => output.clone(),
        (None, Some(filename)) => filename.with_extension(ARTIFACT_EXTENSION),
        (None, None) => {
            return Err(Error::Config(
                "inline code requires an explicit output path".into(),
            ));
        }
    };

    let options = request.codec_options();
    let compiled = if request.shell {
        compile_code_for_shell(&source, &options, request.shell_ready_timeout).await?
    } else {
        compile_code(&mut Engine::new(), &source, &options)?
    };

    emit::write_artifact(&output, &compiled)?;
    tracing::info!(output = %output.display(), shell = request.shell, "compiled");

    let loader = match &request.loader_filename {
        Some(template) => Some(write_loader(request, template, &output)?),
        None => None,
    };

    Ok(CompileSummary { output, loader })
}

/// Expands the loader template and writes the stub next to the artifact.
fn write_loader(request: &CompileRequest, template: &str, output: &Path) -> Result<PathBuf> {
    let stem = request
        .filename
        .as_deref()
        .unwrap_or(output)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string();
    let expanded = template.replace('%', &stem);

    // Relative templates resolve against the artifact's directory
    let expanded = PathBuf::from(expanded);
    let loader_path = if expanded.is_absolute() {
        expanded
    } else {
        output
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(expanded)
    };

    let artifact_file = output
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config(format!("invalid output path {}", output.display())))?;
    emit::write_loader_stub(&loader_path, artifact_file)?;
    Ok(loader_path)
}
