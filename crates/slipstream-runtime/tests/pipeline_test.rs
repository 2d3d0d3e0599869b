//! End-to-end tests for the compile → emit → hook → load pipeline.

use std::fs;
use std::path::Path;

use slipstream_engine::{Engine, Value};
use slipstream_runtime::compiler::{self, CompileRequest};
use slipstream_runtime::{artifact, loader, module_system, Error, Runtime};

/// Compile source in memory and run the artifact, plain-script mode.
fn compile_and_run_plain(source: &str) -> Value {
    let mut engine = Engine::new();
    let compiled = compiler::compile_code(
        &mut engine,
        source,
        &artifact::CodecOptions {
            compile_as_module: false,
        },
    )
    .unwrap();
    let mut fresh = Engine::new();
    loader::run_bytecode(&mut fresh, &compiled, None).unwrap()
}

#[test]
fn test_bytecode_run_matches_direct_execution() {
    let source = "var a = 6; var b = 7; a * b + 1;";
    let direct = Engine::new().eval(source).unwrap();
    assert_eq!(compile_and_run_plain(source), direct);
}

#[test]
fn test_end_to_end_plain_script_value() {
    assert_eq!(
        compile_and_run_plain("console.log('hi'); 43;"),
        Value::Number(43.0)
    );
}

#[tokio::test]
async fn test_compile_file_writes_artifact_and_loader() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("foo.js");
    fs::write(&input, "module.exports = 43;").unwrap();

    let summary = compiler::compile_file(&CompileRequest {
        filename: Some(input.clone()),
        loader_filename: Some("%.js".into()),
        ..CompileRequest::default()
    })
    .await
    .unwrap();

    // Artifact next to the input, loader template expanded to foo.js
    assert_eq!(summary.output, dir.path().join("foo.jsb"));
    assert_eq!(summary.loader, Some(dir.path().join("foo.js")));
    assert_eq!(
        fs::read_to_string(dir.path().join("foo.js")).unwrap(),
        "module.exports = require('./foo.jsb');\n"
    );
}

#[tokio::test]
async fn test_loader_stub_loads_same_value_as_artifact() {
    module_system::install();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("foo.js");
    fs::write(&input, "console.log('hi'); module.exports = 43;").unwrap();

    compiler::compile_file(&CompileRequest {
        filename: Some(input.clone()),
        loader_filename: Some("%.js".into()),
        ..CompileRequest::default()
    })
    .await
    .unwrap();

    // Loading the artifact directly...
    let mut runtime = Runtime::with_cwd(dir.path().to_path_buf());
    let via_artifact = runtime.run_file(Path::new("foo.jsb")).unwrap();

    // ...and through the loader stub (which replaced foo.js)
    let mut runtime = Runtime::with_cwd(dir.path().to_path_buf());
    let via_stub = runtime.run_file(Path::new("foo.js")).unwrap();

    assert_eq!(via_artifact, Value::Number(43.0));
    assert_eq!(via_stub, Value::Number(43.0));
}

#[tokio::test]
async fn test_double_install_does_not_double_execute() {
    module_system::install();
    module_system::install();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("counted.js");
    // The module bumps a counter on the object it exports every time the
    // body runs; a double execution would be visible as calls == 2.
    fs::write(&input, "exports.calls = (exports.calls || 0) + 1;").unwrap();

    compiler::compile_file(&CompileRequest {
        filename: Some(input.clone()),
        ..CompileRequest::default()
    })
    .await
    .unwrap();

    let dep = dir.path().join("main.js");
    fs::write(
        &dep,
        "var a = require('./counted.jsb'); var b = require('./counted.jsb'); \
         module.exports = a.calls;",
    )
    .unwrap();

    let mut runtime = Runtime::with_cwd(dir.path().to_path_buf());
    assert_eq!(runtime.run_file(Path::new("main.js")).unwrap(), Value::Number(1.0));
}

#[tokio::test]
async fn test_shell_compile_file_produces_loadable_artifact() {
    module_system::install();

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("shellmod.js");
    fs::write(&input, "module.exports = 'from the shell';").unwrap();

    compiler::compile_file(&CompileRequest {
        filename: Some(input.clone()),
        shell: true,
        ..CompileRequest::default()
    })
    .await
    .unwrap();

    let mut runtime = Runtime::with_cwd(dir.path().to_path_buf());
    assert_eq!(
        runtime.run_file(Path::new("shellmod.jsb")).unwrap(),
        Value::String("from the shell".into())
    );
}

#[test]
fn test_tampered_artifact_never_executes() {
    let mut engine = Engine::new();
    let compiled = compiler::compile_code(
        &mut engine,
        "module.exports = 1;",
        &artifact::CodecOptions::default(),
    )
    .unwrap();

    let mut bytes = compiled.into_bytes();
    let offset = slipstream_engine::cache::SOURCE_DIGEST_OFFSET;
    bytes[offset] ^= 0xFF;
    let tampered = artifact::Artifact::from_bytes(bytes);

    let err = loader::run_bytecode(&mut engine, &tampered, None).unwrap_err();
    assert!(matches!(err, Error::CacheRejected(_)));
}

#[test]
fn test_artifact_from_newer_engine_version_is_rejected() {
    let mut engine = Engine::new();
    let compiled = compiler::compile_code(
        &mut engine,
        "module.exports = 1;",
        &artifact::CodecOptions::default(),
    )
    .unwrap();

    let mut bytes = compiled.into_bytes();
    bytes[4..8].copy_from_slice(&2u32.to_le_bytes());
    let from_future = artifact::Artifact::from_bytes(bytes);

    let err = loader::run_bytecode(&mut engine, &from_future, None).unwrap_err();
    assert!(matches!(err, Error::CacheRejected(_)));
}

#[tokio::test]
async fn test_require_mixes_source_and_bytecode_modules() {
    module_system::install();

    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("answer.js"), "module.exports = 42;").unwrap();
    compiler::compile_file(&CompileRequest {
        filename: Some(dir.path().join("answer.js")),
        output: Some(dir.path().join("answer.jsb")),
        ..CompileRequest::default()
    })
    .await
    .unwrap();

    fs::write(
        dir.path().join("main.js"),
        "var compiled = require('./answer.jsb'); \
         var source = require('./answer.js'); \
         module.exports = compiled === source;",
    )
    .unwrap();

    let mut runtime = Runtime::with_cwd(dir.path().to_path_buf());
    assert_eq!(
        runtime.run_file(Path::new("main.js")).unwrap(),
        Value::Boolean(true)
    );
}
