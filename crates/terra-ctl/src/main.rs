//! terra-ctl — command-line interface for the Terra controller.

use std::path::Path;

use anyhow::{Context, Result};

use terra_core::config::TerraConfig;

mod cmd;

use cmd::batches::{cmd_batch, cmd_batches};
use cmd::rpc::{SubmissionFile, cmd_greet, cmd_submit};
use cmd::status::cmd_status;

fn print_usage() {
    println!("terra-ctl — Terra controller CLI");
    println!();
    println!("Usage: terra-ctl [--port <api_port>] [--controller <host:port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                Controller status (default)");
    println!("  batches [job]         List received batches, optionally for one job");
    println!("  batch <id>            Show one batch in full");
    println!("  greet <name>          Say hello over RPC");
    println!("  submit <file.json>    Resolve, aggregate and submit shuffle info");
    println!("  demo                  Submit the built-in sample shuffle info");
    println!("  help                  Show this message");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = TerraConfig::load().unwrap_or_default();
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --port / --controller options
    let mut port = config.controller.api_port;
    let mut settings = config.client.clone();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--port" {
            i += 1;
            port = args
                .get(i)
                .context("--port requires a value")?
                .parse()
                .context("--port must be a number")?;
        } else if args[i] == "--controller" {
            i += 1;
            settings.controller_addr = args
                .get(i)
                .context("--controller requires host:port")?
                .clone();
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | []                => cmd_status(port).await,
        ["batches"]                    => cmd_batches(port, None).await,
        ["batches", job]               => cmd_batches(port, Some(*job)).await,
        ["batch", id]                  => cmd_batch(port, id).await,
        ["greet", name]                => cmd_greet(settings, name).await,
        ["submit", file]               => cmd_submit(settings, SubmissionFile::load(Path::new(file))?).await,
        ["demo"]                       => cmd_submit(settings, SubmissionFile::demo()).await,
        ["help"] | ["--help"] | ["-h"] => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
