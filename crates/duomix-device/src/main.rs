//! duomix - two-source stereo mixer device
//!
//! Wires the control plane to the audio pipeline:
//! 1. Loads the device config (first argument, or `<config_dir>/duomix/config.yaml`)
//! 2. Builds the parameter store, EQ arbiter and voice state, relaying EQ into tone gains
//! 3. Opens the serial link to the DSP, if configured: changes go out, inbound lines come in
//! 4. Polls the physical dials, if configured
//! 5. Starts the producer/consumer pipeline (muted output follows the voice state)
//! 6. Runs the stdin console until EOF, `quit`, or a pipeline fault, then shuts down
//!
//! A pipeline fault ends the process with a non-zero exit code.
//!
//! ## Command line flags
//!
//! - `--init-config`: write a default config to the config path and exit

mod console;

use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use duomix_core::audio::{AudioPipeline, FileBackend};
use duomix_core::config::{
    default_config_path, load_device_config, save_config, DeviceConfig,
};
use duomix_core::control::{
    connect_eq_to_tone, spawn_dial_poller, DialPoller, EqInputArbiter, FileDialSensor,
    ParameterStore, StatusMessage, VoiceModeManager,
};
use duomix_core::serial::{SerialControlLink, SerialForwarder};

use console::{Console, ConsoleExit};

/// How often the console checks the pipeline for faults while idle
const FAULT_POLL: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    // Set RUST_LOG=debug for per-change status messages
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);

    if args.iter().any(|arg| arg == "--init-config") {
        save_config(&DeviceConfig::default(), &config_path)?;
        println!("Wrote default config to {}", config_path.display());
        return Ok(());
    }

    log::info!("duomix starting up");
    let config = load_device_config(&config_path);

    let store = Arc::new(ParameterStore::new(config.initial_parameters()));
    let arbiter = Arc::new(EqInputArbiter::new(config.eq.deadzone));
    let voice = Arc::new(VoiceModeManager::new(config.voice));
    connect_eq_to_tone(&arbiter, &store);
    log_status_changes(&store, &arbiter, &voice);

    let forwarder = match &config.serial.device {
        Some(device) => match start_serial(device, &store) {
            Ok(forwarder) => Some(forwarder),
            Err(e) => {
                log::error!("DSP relay disabled: {:#}", e);
                None
            }
        },
        None => {
            log::info!("No serial device configured, DSP relay disabled");
            None
        }
    };

    let mut dials = start_dials(&config, &arbiter);

    let mut pipeline = AudioPipeline::new(config.audio.clone(), config.crossover, Arc::clone(&store))
        .with_voice(Arc::clone(&voice));
    pipeline
        .start(&FileBackend)
        .context("Audio pipeline failed to start")?;

    let lines = console::spawn_line_reader(BufReader::new(std::io::stdin()))
        .context("Failed to start console input")?;
    let console = Console::new(
        Arc::clone(&store),
        Arc::clone(&arbiter),
        Arc::clone(&voice),
        forwarder.as_ref(),
    );
    let console_result = console.run(&lines, &mut std::io::stdout(), FAULT_POLL, || {
        pipeline.has_faulted()
    });

    match &console_result {
        Ok(ConsoleExit::Halted) => log::error!("Audio pipeline faulted, shutting down"),
        Ok(exit) => log::info!("Console finished ({:?}), shutting down", exit),
        Err(_) => {}
    }

    if let Some(poller) = dials.as_mut() {
        poller.stop();
    }
    pipeline.stop().context("Audio pipeline stopped with a fault")?;
    console_result.context("Console output failed")?;

    log::info!("duomix stopped");
    Ok(())
}

/// Debug-log every status message a UI client would receive
fn log_status_changes(store: &ParameterStore, arbiter: &EqInputArbiter, voice: &VoiceModeManager) {
    fn emit(message: StatusMessage) {
        if let Ok(json) = message.to_json() {
            log::debug!("status {}", json);
        }
    }

    arbiter.add_listener(|_, snapshot| emit(StatusMessage::dial(snapshot)));
    store.add_listener(|_, snapshot| emit(StatusMessage::dsp_mixer(&snapshot.mixer)));
    voice.add_listener(|event| emit(StatusMessage::voice(event)));
}

/// Open the DSP port both ways, mirror the store to it and apply inbound lines
fn start_serial(device: &Path, store: &Arc<ParameterStore>) -> Result<SerialForwarder> {
    let (link, reader) = SerialControlLink::open_duplex(device)
        .with_context(|| format!("Failed to open serial device {:?}", device))?;
    let forwarder = SerialForwarder::spawn(link).context("Failed to start serial forwarder")?;
    forwarder.connect_store(store);
    forwarder.resend_all(&store.get_all())?;

    // Detached: a read blocked on an idle port ends with the process
    reader
        .spawn(Arc::clone(store))
        .context("Failed to start serial reader")?;
    Ok(forwarder)
}

fn start_dials(config: &DeviceConfig, arbiter: &Arc<EqInputArbiter>) -> Option<DialPoller> {
    let Some(inputs) = &config.eq.inputs else {
        log::info!("No dial inputs configured, EQ is digital only");
        return None;
    };
    let sensor = FileDialSensor::new(inputs);
    match spawn_dial_poller(Box::new(sensor), Arc::clone(arbiter), config.dial_poll_interval()) {
        Ok(poller) => Some(poller),
        Err(e) => {
            log::error!("Dial poller disabled: {}", e);
            None
        }
    }
}
