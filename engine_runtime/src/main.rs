//! Standalone runtime binary.
//!
//! Usage:
//!   cargo run -p engine_runtime -- [--config runtime.json] [--build-dir data/build]
//!       [--platform linux] [--boot-pkg boot] [--boot-unit level1] [--autoload]
//!
//! Boots the configured package, spawns the boot unit and then reads console
//! commands from stdin.
//!
//! Console commands:
//!   resource.reload_all       - Reload every loaded resource from disk
//!   resource.stats            - Show cache entry counts
//!   package.load <name>       - Load a package and schedule its contents
//!   unit.spawn <name> [world] - Spawn a unit
//!   quit                      - Exit

use std::env;
use std::io::{BufRead, Write};

use anyhow::Context;
use engine_resource::config::ResourceConfig;
use engine_runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{info, warn};

fn parse_args() -> anyhow::Result<ResourceConfig> {
    let args: Vec<String> = env::args().collect();

    // A config file, if given, is the base the other flags override.
    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let text = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            ResourceConfig::from_json_str(&text).context("parse config")?
        }
        _ => ResourceConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--build-dir" if i + 1 < args.len() => {
                cfg.build_dir = args[i + 1].clone();
                i += 2;
            }
            "--platform" if i + 1 < args.len() => {
                cfg.platform = args[i + 1].clone();
                i += 2;
            }
            "--boot-pkg" if i + 1 < args.len() => {
                cfg.boot_package = args[i + 1].clone();
                i += 2;
            }
            "--boot-unit" if i + 1 < args.len() => {
                cfg.boot_unit = Some(args[i + 1].clone());
                i += 2;
            }
            "--autoload" => {
                cfg.autoload = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(build_dir = %cfg.build_dir, platform = %cfg.platform, boot_pkg = %cfg.boot_package, "Starting runtime");

    let mut runtime = Runtime::with_directory(cfg).context("create runtime")?;
    if let Some(root) = runtime.boot().await? {
        info!(root = root.0, "Boot unit spawned");
    }

    // Console input arrives from a stdin reader thread.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Runtime ready. Type 'help' for commands, 'quit' to exit.");

    while let Some(line) = console_rx.recv().await {
        if line == "quit" {
            break;
        }
        match runtime.exec(&line) {
            Ok(output) => {
                for out in output {
                    println!("{}", out);
                }
            }
            Err(e) => warn!(error = %format!("{e:#}"), "command failed"),
        }
    }

    runtime.shutdown()?;
    Ok(())
}
