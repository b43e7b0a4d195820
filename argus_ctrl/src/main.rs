//! # ARGUS Example Controller
//!
//! A thin demo process exercising the runtime end to end: a state machine
//! with a couple of operational states, typed commands fed from a stdin
//! console through a worker queue, a loopback-bus subscription, and an
//! execute hook standing in for the hardware polling a real controller
//! would do.
//!
//! Hardware business logic is deliberately a stub; this binary exists to
//! show the wiring.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use argus_codec::hex_dump;
use argus_core::bus::{Bus, LoopbackBus};
use argus_core::event::Event;
use argus_core::{state, ConfigError, ConfigLoader, RuntimeConfig, SharedConfig, StateMachine, WorkQueue};

const STATE_ARMED: i32 = 1;
const STATE_SCANNING: i32 = 2;

/// ARGUS example controller — runtime demo process
#[derive(Parser, Debug)]
#[command(name = "argus_ctrl")]
#[command(author = "ARGUS")]
#[command(version)]
#[command(about = "Example control process built on the ARGUS runtime")]
struct Args {
    /// Path to the controller configuration TOML.
    #[arg(default_value = "config/argus.toml")]
    config: PathBuf,

    /// Enable verbose logging (DEBUG level).
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Deserialize)]
struct CtrlConfig {
    shared: SharedConfig,
    #[serde(default)]
    runtime: RuntimeConfig,
}

impl Default for CtrlConfig {
    fn default() -> Self {
        Self {
            shared: SharedConfig {
                log_level: Default::default(),
                process_name: "DEMO".to_string(),
            },
            runtime: RuntimeConfig::default(),
        }
    }
}

fn main() {
    let args = Args::parse();
    setup_tracing(&args);

    info!("ARGUS controller v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(&args) {
        error!("FATAL: {e}");
        process::exit(1);
    }

    info!("ARGUS controller shutdown complete");
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = match CtrlConfig::load(&args.config) {
        Ok(config) => {
            config.shared.validate()?;
            config.runtime.validate()?;
            info!("Config OK: process={}", config.shared.process_name);
            config
        }
        Err(ConfigError::FileNotFound) => {
            warn!(
                "No config at '{}', using defaults",
                args.config.display()
            );
            CtrlConfig::default()
        }
        Err(e) => return Err(Box::new(e)),
    };

    let machine = Arc::new(StateMachine::with_config(
        &config.shared.process_name,
        &config.runtime,
    ));
    register_states_and_commands(&machine);

    // Loopback bus standing in for the site transport: a ticker publishes a
    // heartbeat this process subscribes to.
    let bus = Arc::new(LoopbackBus::new());
    wire_heartbeat(&machine, &bus);
    spawn_ticker(&bus, &config.shared.process_name);

    // Console lines flow through a worker queue so a slow dispatcher never
    // blocks stdin reading.
    let console_target = Arc::clone(&machine);
    let console: Arc<WorkQueue<String>> = Arc::new(WorkQueue::new(move |line: &String| {
        handle_console_line(&console_target, line)
    }));
    spawn_console(Arc::clone(&console));

    let interrupted = Arc::downgrade(&machine);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        if let Some(machine) = interrupted.upgrade() {
            machine.stop(1);
        }
    })?;

    info!(
        "Entering dispatch loop; type 'help' for console commands, ctrl-c to exit"
    );
    let scan_steps = Arc::new(AtomicU64::new(0));
    let stepper = Arc::clone(&scan_steps);
    let hooked = Arc::clone(&machine);
    let rc = machine.run_with(move || {
        // Stub for the hardware polling a real controller does per cycle.
        if hooked.state() == STATE_SCANNING {
            let n = stepper.fetch_add(1, Ordering::Relaxed) + 1;
            if n % 500 == 0 {
                debug!(steps = n, "scan in progress");
            }
        }
        state::KEEP_STATE
    });

    console.abort();
    info!(rc, steps = scan_steps.load(Ordering::Relaxed), "dispatch loop ended");
    if rc < 0 {
        return Err("dispatch loop terminated abnormally".into());
    }
    Ok(())
}

fn register_states_and_commands(machine: &Arc<StateMachine>) {
    machine.add_state(STATE_ARMED, "Armed", "Hardware powered, ready to scan");
    machine.add_state(STATE_SCANNING, "Scanning", "Rate scan in progress");

    machine
        .add_event("ARM", &[state::READY], "")
        .assign(|_| STATE_ARMED)
        .describe("power the hardware and get ready");

    machine
        .add_event("START", &[STATE_ARMED], "D:2")
        .assign(|ev| {
            match ev.values() {
                Ok(v) => info!(from = %v[0], to = %v[1], "scan range set"),
                Err(e) => warn!(%e, "scan range undecodable"),
            }
            STATE_SCANNING
        })
        .describe("begin a rate scan over (from, to)");

    machine
        .add_event("STOP", &[STATE_ARMED, STATE_SCANNING], "")
        .assign(|_| STATE_ARMED)
        .describe("stop the scan, stay armed");

    machine
        .add_event("DISARM", &[STATE_ARMED], "")
        .assign(|_| state::READY)
        .describe("power down to Ready");

    let exiter = Arc::downgrade(machine);
    machine
        .add_event("EXIT", &[], "")
        .assign(move |_| {
            if let Some(machine) = exiter.upgrade() {
                machine.stop(1);
            }
            state::KEEP_STATE
        })
        .describe("leave the dispatch loop");
}

/// Subscribe to the heartbeat service and feed bus deliveries into the FIFO.
fn wire_heartbeat(machine: &Arc<StateMachine>, bus: &Arc<LoopbackBus>) {
    let service = format!("{}/HEARTBEAT", machine.name());
    let handle = machine.subscribe(&service).assign(|ev| {
        debug!(
            payload = %hex_dump(ev.payload(), 4),
            "heartbeat received"
        );
        state::KEEP_STATE
    });

    let feeder = Arc::clone(machine);
    let slot = Arc::clone(handle.slot());
    bus.subscribe(
        &service,
        Box::new(move |msg| {
            feeder.post(Event::from_bus(&slot, msg.payload, msg.timestamp, msg.quality));
        }),
    )
    .expect("loopback subscribe cannot fail");
}

fn spawn_ticker(bus: &Arc<LoopbackBus>, process: &str) {
    let bus = Arc::clone(bus);
    let service = format!("{process}/HEARTBEAT");
    std::thread::spawn(move || {
        let mut count = 0u32;
        loop {
            std::thread::sleep(Duration::from_secs(1));
            count += 1;
            let stamp = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs() as u32)
                .unwrap_or(0);
            let mut payload = Vec::with_capacity(8);
            payload.extend_from_slice(&(count as i32).to_ne_bytes());
            payload.extend_from_slice(&(stamp as i32).to_ne_bytes());
            if bus.send_command(&service, &payload).is_err() {
                break;
            }
        }
    });
}

fn spawn_console(console: Arc<WorkQueue<String>>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        console.post(trimmed.to_string());
                    }
                }
            }
        }
    });
}

/// Process one console line: local introspection keywords, everything else
/// is a command for the machine.
fn handle_console_line(machine: &Arc<StateMachine>, line: &str) -> bool {
    match line {
        "help" => {
            println!("console commands: help, states, events, allowed");
            println!("machine commands:\n{}", machine.print_events(None));
        }
        "states" => print!("{}", machine.print_states()),
        "events" => print!("{}", machine.print_events(None)),
        "allowed" => print!("{}", machine.print_allowed_events()),
        command => {
            if let Err(e) = machine.post_text(command) {
                warn!(%e, "command rejected");
            }
        }
    }
    true
}

/// Setup tracing subscriber based on CLI arguments.
fn setup_tracing(args: &Args) {
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_machine_walks_its_states() {
        let machine = Arc::new(StateMachine::new("DEMO"));
        register_states_and_commands(&machine);

        let runner = Arc::clone(&machine);
        let worker = std::thread::spawn(move || runner.run());
        while machine.state() == state::NOT_READY {
            std::thread::sleep(Duration::from_millis(1));
        }

        machine.post_text("ARM").unwrap();
        machine.post_text("START 10.0 20.0").unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(machine.state(), STATE_SCANNING);

        machine.post_text("STOP").unwrap();
        machine.post_text("EXIT").unwrap();
        assert_eq!(worker.join().unwrap(), 0);
        assert_eq!(machine.state(), state::NOT_READY);
    }

    #[test]
    fn console_introspection_keywords() {
        let machine = Arc::new(StateMachine::new("DEMO"));
        register_states_and_commands(&machine);
        assert!(handle_console_line(&machine, "states"));
        assert!(handle_console_line(&machine, "help"));
        assert!(handle_console_line(&machine, "NO_SUCH 1"));
    }
}
