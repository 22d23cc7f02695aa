//! Manual/integration test harness for `lua-sandbox`. Reads a Lua script
//! from stdin or `--file`, builds a [`SandboxConfig`] from flags, drives
//! `create`/`init`/`invoke`/`terminate`, and prints a single JSON object to
//! stdout. Not part of the core sandbox contract.

use std::io::{self, Read};
use std::path::PathBuf;

use clap::Parser;
use lua_sandbox::{Metric, Resource, Sandbox, SandboxConfig};
use serde::Serialize;

/// Drive one lua-sandbox invocation and emit a JSON result.
#[derive(Parser, Debug)]
#[command(name = "sandbox-cli", about = "Run a Lua script inside lua-sandbox and emit JSON result")]
struct Args {
    /// Read Lua source from a file instead of stdin.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Integer argument passed to the guest's `process(arg)` entry point.
    #[arg(long, default_value_t = 0)]
    arg: i64,

    /// Memory ceiling in bytes (0 = unbounded).
    #[arg(long, default_value_t = 8_388_608)]
    memory_limit: u64,

    /// Instruction ceiling (0 = unbounded).
    #[arg(long, default_value_t = 10_000_000)]
    instruction_limit: u64,

    /// Output ceiling in bytes (0 = unbounded).
    #[arg(long, default_value_t = 1_048_576)]
    output_limit: u64,

    /// Directory external (non-built-in) modules resolve against.
    #[arg(long)]
    module_root: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct UsageSnapshot {
    memory_current: u64,
    memory_maximum: u64,
    instructions_current: u64,
    instructions_maximum: u64,
    output_current: u64,
    output_maximum: u64,
}

#[derive(Debug, Serialize)]
struct CliResult {
    status: Option<i64>,
    output: String,
    error: Option<String>,
    usage: UsageSnapshot,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let source = if let Some(path) = &args.file {
        std::fs::read_to_string(path).unwrap_or_else(|e| {
            eprintln!("error reading {}: {e}", path.display());
            std::process::exit(1);
        })
    } else {
        let mut buf = String::new();
        io::stdin().read_to_string(&mut buf).unwrap_or_else(|e| {
            eprintln!("error reading stdin: {e}");
            std::process::exit(1);
        });
        buf
    };

    let config = SandboxConfig {
        output_limit: args.output_limit,
        memory_limit: args.memory_limit,
        instruction_limit: args.instruction_limit,
        module_root: args.module_root,
        preservation_path: None,
    };

    let mut sandbox = match Sandbox::create(config) {
        Ok(s) => s,
        Err(e) => {
            print_result(CliResult {
                status: None,
                output: String::new(),
                error: Some(e.to_string()),
                usage: empty_usage(),
            });
            return;
        }
    };

    let result = match sandbox.init(&source) {
        Ok(()) => match sandbox.invoke(args.arg) {
            Ok(outcome) => CliResult {
                status: Some(outcome.status),
                output: String::from_utf8_lossy(&outcome.output).into_owned(),
                error: sandbox.last_error().map(str::to_string),
                usage: snapshot(&sandbox),
            },
            Err(e) => CliResult {
                status: None,
                output: String::new(),
                error: Some(e.to_string()),
                usage: snapshot(&sandbox),
            },
        },
        Err(e) => CliResult {
            status: None,
            output: String::new(),
            error: Some(e.to_string()),
            usage: snapshot(&sandbox),
        },
    };

    sandbox.terminate();
    print_result(result);
    // Errors are encoded in the JSON body, not the process exit code.
}

fn snapshot(sandbox: &Sandbox) -> UsageSnapshot {
    UsageSnapshot {
        memory_current: sandbox.usage(Resource::Memory, Metric::Current),
        memory_maximum: sandbox.usage(Resource::Memory, Metric::Maximum),
        instructions_current: sandbox.usage(Resource::Instructions, Metric::Current),
        instructions_maximum: sandbox.usage(Resource::Instructions, Metric::Maximum),
        output_current: sandbox.usage(Resource::Output, Metric::Current),
        output_maximum: sandbox.usage(Resource::Output, Metric::Maximum),
    }
}

fn empty_usage() -> UsageSnapshot {
    UsageSnapshot {
        memory_current: 0,
        memory_maximum: 0,
        instructions_current: 0,
        instructions_maximum: 0,
        output_current: 0,
        output_maximum: 0,
    }
}

fn print_result(result: CliResult) {
    let json = serde_json::to_string(&result).expect("CliResult is always serializable");
    println!("{json}");
}
