// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Headless CLI front end for [`worker`] (spec §2 item 7): loads a board
//! config and a compiled guest binary from disk, drives a [`Worker`]
//! without a browser, and prints `stdout`/`update` traffic to the
//! terminal. This exists so the engine is exercisable on its own; it is
//! not the UI, and knows nothing about `postMessage` or a DOM.

use abi::{BinarySource, CoreEvent, Message, StartConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use worker::Worker;

/// Runs a simulated board headlessly against a compiled guest binary.
#[derive(Debug, Parser)]
#[clap(max_term_width = 80)]
struct Args {
    /// Path to a board config file, JSON-encoded as a `StartConfig` (the
    /// same `{parts, wires, mainPart}` shape the UI sends in `start`).
    config: PathBuf,
    /// Path to the compiled guest `.wasm` binary.
    wasm: PathBuf,
    /// Stop the run after this many milliseconds of virtual time, even if
    /// the guest never calls `os.Exit`. Without this, `simhost` runs until
    /// the guest exits or the process is interrupted.
    #[clap(long)]
    timeout_ms: Option<u64>,
    /// Suppress `notifyUpdate` lines; `stdout`/`stderr` from the guest is
    /// always printed.
    #[clap(long)]
    quiet: bool,
}

enum Outcome {
    Exited(i32),
    Error(String),
    TimedOut,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_text = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading config {}", args.config.display()))?;
    let config: StartConfig = serde_json::from_str(&config_text)
        .with_context(|| format!("parsing config {}", args.config.display()))?;
    let wasm_bytes = std::fs::read(&args.wasm).with_context(|| format!("reading wasm {}", args.wasm.display()))?;

    let (done_tx, done_rx) = mpsc::channel::<Outcome>();
    let done_tx = Arc::new(Mutex::new(done_tx));
    let quiet = args.quiet;

    let done_tx_events = Arc::clone(&done_tx);
    let mut worker = Worker::spawn(move |event| match event {
        CoreEvent::Stdout { data } => print!("{data}"),
        CoreEvent::Loading => eprintln!("simhost: loading guest binary"),
        CoreEvent::Started => eprintln!("simhost: guest started"),
        CoreEvent::Exited { exit_code } => {
            let _ = done_tx_events.lock().unwrap().send(Outcome::Exited(exit_code));
        }
        CoreEvent::Error { message, source } => {
            let tag = source.map(|s| format!(" [{s}]")).unwrap_or_default();
            eprintln!("simhost: error{tag}: {message}");
            let _ = done_tx_events.lock().unwrap().send(Outcome::Error(message));
        }
        CoreEvent::NotifyUpdate => {
            if !quiet {
                eprintln!("simhost: notifyUpdate");
            }
        }
        _ => {}
    });

    worker.send(Message::Start { config, binary: BinarySource::Inline(wasm_bytes), runner_url: None });

    if let Some(timeout_ms) = args.timeout_ms {
        let done_tx_timeout = Arc::clone(&done_tx);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(timeout_ms));
            let _ = done_tx_timeout.lock().unwrap().send(Outcome::TimedOut);
        });
    }

    let outcome = done_rx.recv().unwrap_or(Outcome::Error("worker channel closed unexpectedly".to_string()));
    worker.shutdown();

    match outcome {
        Outcome::Exited(code) => {
            eprintln!("simhost: guest exited with code {code}");
            std::process::exit(code);
        }
        Outcome::Error(message) => anyhow::bail!(message),
        Outcome::TimedOut => {
            eprintln!("simhost: timeout reached, stopping");
            Ok(())
        }
    }
}
