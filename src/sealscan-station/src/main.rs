//! sealscan-station - terminal driver for the SealScan verification engine.
//!
//! Scanners configured as keyboard wedges type their decoded payload into
//! stdin; the station feeds each line through the scan coalescers into the
//! verification engine and hands completed session snapshots to a JSON file
//! sink.
//!
//! ## Usage
//!
//! ```bash
//! # Drive an interactive verification session
//! sealscan-station run --output verifications/
//!
//! # One-shot check of a module/enclosure pair (exit code 1 on fail)
//! sealscan-station check \
//!     --module 869487066634998 \
//!     --payload "https://tydendigital.com/#/scan-device/869487066634998" \
//!     --device tydenbrooks --pretty
//!
//! # Classify which device family a payload belongs to
//! sealscan-station detect --payload "https://dev-vynd-full.web.app/#/scan-device/"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sealscan_core::{
    DeviceType, PatternRegistry, ScanCoalescer, ScanSlot, SessionSnapshot, StepState,
    VerificationEngine, VerificationSession, VerifyConfig,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Terminal driver for the SealScan verification engine.
#[derive(Parser)]
#[command(name = "sealscan-station")]
#[command(version = VERSION)]
#[command(about = "Device verification station driver")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive an interactive verification session from stdin
    Run {
        /// Directory where completed session snapshots are written
        #[arg(short, long, default_value = "verifications")]
        output: PathBuf,

        /// Debounce window in milliseconds for chunked scanner input
        #[arg(long, default_value_t = 120)]
        debounce_ms: u64,

        /// Device type preselected for new sessions
        #[arg(long, default_value = "tydenbrooks")]
        device: DeviceType,
    },

    /// Verify one module/enclosure pair and print the snapshot as JSON
    Check {
        /// Module barcode text
        #[arg(long)]
        module: String,

        /// Enclosure QR payload
        #[arg(long)]
        payload: String,

        /// Device type to match against
        #[arg(long, default_value = "tydenbrooks")]
        device: DeviceType,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Classify which device family a payload belongs to
    Detect {
        /// Enclosure QR payload
        #[arg(long)]
        payload: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    let code = match cli.command {
        Commands::Run {
            output,
            debounce_ms,
            device,
        } => {
            run_station(&output, debounce_ms, device).await?;
            0
        },
        Commands::Check {
            module,
            payload,
            device,
            pretty,
        } => check(&module, &payload, device, pretty)?,
        Commands::Detect { payload } => detect(&payload)?,
    };

    std::process::exit(code);
}

/// Interactive session loop: scan lines in, verdicts out.
async fn run_station(output: &Path, debounce_ms: u64, device: DeviceType) -> anyhow::Result<()> {
    let config = VerifyConfig {
        debounce_window: Duration::from_millis(debounce_ms),
        default_device: Some(device),
        ..VerifyConfig::default()
    };
    let early_len = config.early_complete_min_len;
    let window = config.debounce_window;
    let mut engine = VerificationEngine::with_config(config)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut module_reader =
        ScanCoalescer::new(ScanSlot::ModuleBarcode, window, engine.lock_flag(), tx.clone());
    let mut enclosure_reader =
        ScanCoalescer::new(ScanSlot::EnclosureQr, window, engine.lock_flag(), tx)
            .with_early_complete(ScanCoalescer::url_predicate(early_len));

    println!("SealScan station ready - scan the module barcode.");
    println!("Commands: :type <tydenbrooks|vynd|none>  :attach <slot> <path>  :done  :reset  :reset-all  :quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if let Some(command) = line.strip_prefix(':') {
                    let keep_going = handle_command(
                        command,
                        &mut engine,
                        &mut module_reader,
                        &mut enclosure_reader,
                        output,
                    )?;
                    if !keep_going {
                        break;
                    }
                } else {
                    match engine.session().step {
                        StepState::AwaitingModuleId => {
                            module_reader.on_partial_input(&line);
                            module_reader.on_complete_signal();
                        },
                        StepState::AwaitingEnclosurePayload => {
                            enclosure_reader.on_partial_input(&line);
                            enclosure_reader.on_complete_signal();
                        },
                        step => println!("no scan expected at {step:?}; use :done or :reset"),
                    }
                }
            }
            Some(event) = rx.recv() => {
                engine.handle_scan(&event);
                report(engine.session());
            }
        }
    }
    Ok(())
}

/// Handle a `:` command line; returns `false` to quit.
fn handle_command(
    command: &str,
    engine: &mut VerificationEngine,
    module_reader: &mut ScanCoalescer,
    enclosure_reader: &mut ScanCoalescer,
    output: &Path,
) -> anyhow::Result<bool> {
    let mut parts = command.split_whitespace();
    match parts.next() {
        Some("type") => match parts.next() {
            Some("none") => {
                engine.set_device_type(None);
                println!("device type cleared");
            },
            Some(name) => match name.parse::<DeviceType>() {
                Ok(device) => {
                    engine.set_device_type(Some(device));
                    println!("device type: {device}");
                    report(engine.session());
                },
                Err(err) => println!("{err}"),
            },
            None => println!("usage: :type <tydenbrooks|vynd|none>"),
        },
        Some("attach") => match (parts.next(), parts.next()) {
            (Some(slot), Some(path)) => {
                let data = fs::read(path).with_context(|| format!("reading {path}"))?;
                let filename = Path::new(path)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.to_string());
                engine.attach_file(slot, &filename, data);
                println!("attached {filename} as {slot}");
            },
            _ => println!("usage: :attach <slot> <path>"),
        },
        Some("done") => match engine.complete() {
            Ok(_) => {
                if engine.can_persist() {
                    let path = persist(output, &engine.serialize())?;
                    println!("PASS - snapshot saved to {}", path.display());
                }
                module_reader.cancel();
                enclosure_reader.cancel();
                engine.reset(true);
                println!("ready - scan the next module barcode.");
            },
            Err(err) => println!("cannot complete: {err}"),
        },
        Some("reset") => {
            module_reader.cancel();
            enclosure_reader.cancel();
            engine.reset(true);
            println!("session reset - scan the module barcode.");
        },
        Some("reset-all") => {
            module_reader.cancel();
            enclosure_reader.cancel();
            engine.reset(false);
            println!("session reset to defaults - scan the module barcode.");
        },
        Some("quit") => return Ok(false),
        _ => println!("unknown command: {command}"),
    }
    Ok(true)
}

/// Print the operator-facing view of the session after a scan landed.
fn report(session: &VerificationSession) {
    if session.locked {
        println!("FAIL - {}", session.failure_reason());
        if session
            .failure
            .is_some_and(|reason| reason.suggests_reselect())
        {
            println!("check the device type (:type), then :reset to re-scan");
        } else {
            println!(":reset to re-scan");
        }
        return;
    }
    match session.step {
        StepState::AwaitingModuleId => {
            println!("module scan not usable - scan the module barcode again");
        },
        StepState::AwaitingEnclosurePayload => {
            println!("module IMEI {} - scan the enclosure QR.", session.module_imei);
        },
        StepState::AwaitingAttachments => {
            println!(
                "verified ({:?}) - attach files with :attach, then :done",
                session.imei_match
            );
        },
        StepState::Complete => println!("verification complete"),
    }
}

/// Write a completed snapshot to the sink directory.
fn persist(output: &Path, snapshot: &SessionSnapshot) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(output)
        .with_context(|| format!("creating {}", output.display()))?;
    let path = output.join(format!("verification-{}.json", snapshot.module_imei));
    let json = serde_json::to_string_pretty(snapshot)?;
    fs::write(&path, json).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "session snapshot persisted");
    Ok(path)
}

/// One-shot verification; returns the process exit code.
fn check(module: &str, payload: &str, device: DeviceType, pretty: bool) -> anyhow::Result<i32> {
    let config = VerifyConfig {
        default_device: Some(device),
        ..VerifyConfig::default()
    };
    let mut engine = VerificationEngine::with_config(config)?;
    engine.submit_module_id(module);
    engine.submit_enclosure_payload(payload);

    let snapshot = engine.serialize();
    let json = if pretty {
        serde_json::to_string_pretty(&snapshot)?
    } else {
        serde_json::to_string(&snapshot)?
    };
    println!("{json}");
    Ok(i32::from(!snapshot.passed))
}

/// Classify a payload's device family; returns the process exit code.
fn detect(payload: &str) -> anyhow::Result<i32> {
    let registry = PatternRegistry::new()?;
    match registry.detect_type(payload.trim()) {
        Some(device) => {
            println!("{device}");
            Ok(0)
        },
        None => {
            println!("unknown");
            Ok(1)
        },
    }
}
