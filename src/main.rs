// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! slipstream CLI - compile JavaScript to bytecode artifacts and run them

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use slipstream_runtime::compiler::{self, CompileRequest};
use slipstream_runtime::{module_system, Runtime, VERSION};

#[derive(Parser)]
#[command(
    name = "slipstream",
    about = "Ahead-of-time bytecode compiler and loader for the Slipstream JavaScript engine",
    version = VERSION,
    author = "Pegasus Heavy Industries"
)]
struct Cli {
    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a JavaScript file to a bytecode artifact
    #[command(alias = "c")]
    Compile {
        /// JavaScript file to compile
        file: Option<PathBuf>,

        /// Compile inline code instead of a file
        #[arg(short = 'e', long = "eval", conflicts_with = "file")]
        code: Option<String>,

        /// Output path for the artifact (default: input with .jsb extension)
        #[arg(short = 'o', long = "out")]
        output: Option<PathBuf>,

        /// Also write a loader stub; '%' expands to the input's file stem
        #[arg(short = 'l', long = "loader")]
        loader: Option<String>,

        /// Compile inside the GUI-shell runtime
        #[arg(long)]
        shell: bool,

        /// Seconds to wait for shell readiness
        #[arg(long, requires = "shell")]
        timeout: Option<u64>,

        /// Compile as a plain script instead of a CommonJS module
        #[arg(long)]
        plain_script: bool,
    },

    /// Run a JavaScript file or bytecode artifact
    #[command(alias = "r")]
    Run {
        /// File to execute (.js, .json or .jsb)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("slipstream=debug,slipstream_runtime=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("slipstream=warn,slipstream_runtime=warn")
            .init();
    }

    match cli.command {
        Commands::Compile {
            file,
            code,
            output,
            loader,
            shell,
            timeout,
            plain_script,
        } => {
            let request = CompileRequest {
                filename: file,
                code,
                compile_as_module: !plain_script,
                shell,
                output,
                loader_filename: loader,
                shell_ready_timeout: timeout.map(Duration::from_secs),
            };
            match compiler::compile_file(&request).await {
                Ok(summary) => {
                    println!(
                        "{} {}",
                        "compiled".green().bold(),
                        summary.output.display()
                    );
                    if let Some(loader_path) = summary.loader {
                        println!("{} {}", "loader".green().bold(), loader_path.display());
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Run { file } => {
            // Route .jsb files through the artifact loader
            module_system::install();
            let mut runtime = Runtime::new();
            match runtime.run_file(&file) {
                Ok(result) => {
                    if !result.is_undefined() {
                        println!("{}", result);
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", "Error".red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}
