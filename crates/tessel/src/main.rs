mod demo; // Demo component graph for `boot`

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{error, info};
use serde_json::{Value, json};
use tessel_core::kernel::constants::ENV_PREFIX;
use tessel_core::{CastHint, Definition, EmitOptions, Kernel, KernelBuilder, Result};

use crate::demo::{Greeter, TRACE_CONFIGURE, TRACE_START, TRACE_STOP};

/// Tessel: an in-process dependency-injection kernel
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// Simple ping command for testing
    #[arg(long)]
    ping: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// State sources shared by every command.
#[derive(clap::Args, Debug)]
struct StateArgs {
    /// JSON, YAML or TOML file loaded into state
    #[arg(long)]
    config: Option<PathBuf>,

    /// Set a state value (repeatable), e.g. --set greeting=hi
    #[arg(long = "set", value_parser = parse_key_val)]
    set: Vec<(String, String)>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Boot the demo component graph, serve some requests and shut down
    Boot {
        #[command(flatten)]
        state: StateArgs,

        /// Number of request events to emit
        #[arg(long, default_value_t = 1)]
        requests: usize,
    },
    /// Print a typed state lookup
    Env {
        /// State key to look up
        key: String,

        /// Cast string values: number or boolean
        #[arg(long)]
        cast: Option<CastHint>,

        #[command(flatten)]
        state: StateArgs,
    },
}

fn parse_key_val(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

fn build_kernel(state: StateArgs) -> Result<Kernel> {
    let mut builder = KernelBuilder::new();
    if let Some(path) = &state.config {
        builder = builder.config_file(path)?;
    }
    builder = builder.process_env(Some(ENV_PREFIX));
    for (key, value) in state.set {
        builder = builder.state(key, value);
    }
    Ok(builder.build())
}

fn trace(kernel: &Kernel, key: &str) -> String {
    match kernel.state(key) {
        Some(Value::String(s)) => s,
        _ => String::new(),
    }
}

async fn boot(state: StateArgs, requests: usize) -> Result<()> {
    println!("Initializing kernel...");
    let kernel = build_kernel(state)?;
    kernel.with([Definition::<Greeter>::class().into()])?;

    println!("Starting kernel...");
    kernel.start().await?;
    println!("configure: {}", trace(&kernel, TRACE_CONFIGURE));
    println!("start: {}", trace(&kernel, TRACE_START));

    for n in 1..=requests {
        let payload = json!({ "name": format!("guest-{}", n) });
        for result in kernel.emit("request", payload, EmitOptions::default()).await {
            match result {
                Ok(reply) => println!(
                    "request {}: {} (context {}, db {})",
                    n,
                    reply["reply"].as_str().unwrap_or_default(),
                    reply["context"].as_str().unwrap_or_default(),
                    reply["db"].as_str().unwrap_or_default()
                ),
                Err(e) => error!("request {} failed: {}", n, e),
            }
        }
    }

    println!("Shutting down kernel...");
    kernel.stop().await?;
    println!("stop: {}", trace(&kernel, TRACE_STOP));
    Ok(())
}

fn lookup(key: &str, cast: Option<CastHint>, state: StateArgs) -> Result<bool> {
    let kernel = build_kernel(state)?;
    match kernel.env(key, cast) {
        Some(value) => {
            println!("{}", value);
            Ok(true)
        }
        None => {
            eprintln!("'{}' is not set", key);
            Ok(false)
        }
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let args = CliArgs::parse();

    if args.ping {
        println!("pong");
        return;
    }

    let outcome = match args.command {
        Some(Commands::Boot { state, requests }) => boot(state, requests).await.map(|_| true),
        Some(Commands::Env { key, cast, state }) => lookup(&key, cast, state),
        None => {
            info!("No command given");
            println!("Nothing to do; see --help");
            Ok(true)
        }
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
