mod config;
mod db;
mod ipc;
mod roster;
mod session;
mod sheet;
mod stats;
mod templates;
mod uploads;
mod validate;
mod workbook;

use clap::Parser;
use serde_json::json;
use std::io::{self, BufRead, Write};

fn main() {
    let args = config::Args::parse();
    config::setup_logging(&args);

    let startup_workspace = args.workspace.clone();
    let mut state = ipc::AppState::new(args);
    if let Some(path) = startup_workspace {
        if let Err(e) = ipc::select_workspace(&mut state, &path) {
            let msg = format!("{e:#}");
            tracing::error!(workspace = %path.to_string_lossy(), error = %msg, "failed to open workspace");
        }
    }
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gradesheetd ready");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to answer to.
                let resp = json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{resp}");
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    tracing::info!("stdin closed, exiting");
}
