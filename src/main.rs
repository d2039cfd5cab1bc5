//! Pitayascope - Red Pitaya oscilloscope acquisition tool
//!
//! Entry point for the command-line driver.

use anyhow::{bail, Context, Result};
use pitayascope::acquisition::rates;
use pitayascope::config::AppConfig;
use pitayascope::stats::store::CaptureStats;
use pitayascope::transport::TcpTransport;
use pitayascope::{
    AcquisitionConfig, AcquisitionOutcome, AcquisitionResult, Channel, Decimation, Orchestrator,
    TriggerOutcome, TriggerSource,
};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// What the driver does once connected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Single,
    Continuous,
    TriggerTest,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pitayascope=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut mode = Mode::Single;
    let mut config_path: Option<PathBuf> = None;
    let mut save_config = false;
    let mut host: Option<String> = None;
    let mut port: Option<u16> = None;
    let mut decimation: Option<Decimation> = None;
    let mut buffer: Option<usize> = None;
    let mut pretrigger: Option<usize> = None;
    let mut source: Option<TriggerSource> = None;
    let mut level: Option<f64> = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-v" => {
                println!("pitayascope {}", pitayascope::VERSION);
                return Ok(());
            }
            "--single" => mode = Mode::Single,
            "--continuous" | "-c" => mode = Mode::Continuous,
            "--trigger-test" | "-t" => mode = Mode::TriggerTest,
            "--save-config" => save_config = true,
            "--host" | "--port" | "--decimation" | "--buffer" | "--pretrigger" | "--source"
            | "--level" | "--config" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("Error: {} requires a value", flag);
                    return Ok(());
                };
                match flag {
                    "--host" => host = Some(value.clone()),
                    "--port" => port = Some(value.parse().context("invalid --port")?),
                    "--decimation" => {
                        let factor: u32 = value.parse().context("invalid --decimation")?;
                        decimation = Some(Decimation::try_from(factor)?);
                    }
                    "--buffer" => buffer = Some(value.parse().context("invalid --buffer")?),
                    "--pretrigger" => {
                        pretrigger = Some(value.parse().context("invalid --pretrigger")?)
                    }
                    "--source" => source = Some(value.parse()?),
                    "--level" => level = Some(value.parse().context("invalid --level")?),
                    _ => config_path = Some(PathBuf::from(value)),
                }
                i += 2;
                continue;
            }
            arg => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                return Ok(());
            }
        }
        i += 1;
    }

    let path = config_path.unwrap_or_else(AppConfig::path);
    let mut app = AppConfig::load_from(&path);
    if let Some(h) = host {
        app.host = h;
    }
    if let Some(p) = port {
        app.port = p;
    }
    let base = app.acquisition;
    app.acquisition = AcquisitionConfig::new(
        decimation.unwrap_or(base.decimation),
        buffer.unwrap_or(base.buffer_size),
        pretrigger.unwrap_or(base.pretrigger_samples),
        source.unwrap_or(base.trigger_source),
        level.unwrap_or(base.trigger_level_volts),
    )?;

    if save_config {
        app.save(&path)?;
        println!("Configuration saved to {}", path.display());
    }

    print_banner(&app);

    let mut engine = match Orchestrator::connect(
        &app.host,
        app.port,
        app.timeout(),
        app.acquisition,
        app.timing(),
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!(host = %app.host, port = app.port, error = %e, "Connection failed");
            bail!("could not connect to {}:{}: {}", app.host, app.port, e);
        }
    };
    println!("{}", engine.status_message());
    println!();

    let result = match mode {
        Mode::Single => run_single(&mut engine),
        Mode::Continuous => run_continuous(&mut engine, &app),
        Mode::TriggerTest => run_trigger_test(&mut engine),
    };

    engine.disconnect();
    result
}

fn print_help() {
    println!("Usage: pitayascope [OPTIONS]");
    println!();
    println!("Modes:");
    println!("      --single            Run one acquisition (default)");
    println!("  -c, --continuous        Acquire repeatedly until Ctrl+C");
    println!("  -t, --trigger-test      Check that the trigger fires, then capture");
    println!();
    println!("Options:");
    println!("      --host HOST         Instrument address (default: 169.254.195.129)");
    println!("      --port PORT         SCPI port (default: 5000)");
    println!("      --decimation N      1, 8, 64, 1024, 8192 or 65536");
    println!("      --buffer N          Samples per channel (10-16384)");
    println!("      --pretrigger N      Pre-trigger samples (0-8192)");
    println!("      --source SRC        DISABLED, CH1_PE, CH1_NE, CH2_PE, CH2_NE, EXT_PE, EXT_NE");
    println!("      --level VOLTS       Trigger level (-20 to 20)");
    println!("      --config PATH       Config file (default: {})", AppConfig::path().display());
    println!("      --save-config       Write the effective settings to the config file");
    println!("  -v, --version           Show version");
    println!("  -h, --help              Show this help");
    println!();
    println!("Examples:");
    println!("  pitayascope --host rp-f0a1b2.local --decimation 64 --buffer 4096");
    println!("  pitayascope -t --source CH1_PE --level 0.5");
}

fn print_banner(app: &AppConfig) {
    let acq = &app.acquisition;
    println!("Pitayascope v{}", pitayascope::VERSION);
    println!("  Instrument:  {}:{}", app.host, app.port);
    println!(
        "  Sampling:    decimation {} ({})",
        acq.decimation,
        rates::label(acq.decimation)
    );
    println!(
        "  Buffer:      {} samples ({} pre-trigger)",
        acq.buffer_size, acq.pretrigger_samples
    );
    if acq.trigger_source.is_enabled() {
        println!(
            "  Trigger:     {} at {:.3} V",
            acq.trigger_source, acq.trigger_level_volts
        );
    } else {
        println!("  Trigger:     disabled (free running)");
    }
    println!();
}

fn run_single(engine: &mut Orchestrator<TcpTransport>) -> Result<()> {
    let outcome = engine.run_single_acquisition()?;
    report(&outcome);
    println!("{}", engine.status_message());
    Ok(())
}

fn run_trigger_test(engine: &mut Orchestrator<TcpTransport>) -> Result<()> {
    let budget = engine.timing().trigger_test.budget();
    println!(
        "Testing trigger for up to {:.1} s...",
        budget.as_secs_f64()
    );

    match engine.run_trigger_test()? {
        TriggerOutcome::Timeout => {
            println!("{}", engine.status_message());
            println!();
            println!("Suggestions:");
            println!("  1. Check that a signal is connected to the trigger input");
            println!("  2. Lower the trigger level or try the opposite edge");
            println!("  3. Run with --source DISABLED to see the raw signal");
            Ok(())
        }
        TriggerOutcome::Immediate => {
            println!("{}", engine.status_message());
            Ok(())
        }
        TriggerOutcome::Triggered => {
            println!("{}", engine.status_message());
            println!();
            run_single(engine)
        }
    }
}

fn run_continuous(engine: &mut Orchestrator<TcpTransport>, app: &AppConfig) -> Result<()> {
    let handle = engine.continuous_handle();
    ctrlc::set_handler(move || {
        println!();
        println!("Stopping...");
        handle.stop();
    })
    .context("failed to install Ctrl+C handler")?;

    println!("Continuous acquisition, press Ctrl+C to stop");
    println!();

    let mut stats = CaptureStats::new();
    let count = engine.run_continuous(app.continuous_interval(), |outcome| {
        stats.record(outcome);
        report(outcome);
    })?;

    let running = stats.stats();
    println!();
    info!(
        acquisitions = count,
        captures = running.captures,
        timeouts = running.trigger_timeouts,
        "Continuous acquisition finished"
    );
    println!(
        "Acquisitions: {}  captured: {}  trigger timeouts: {} ({:.0}%)",
        count,
        running.captures,
        running.trigger_timeouts,
        stats.timeout_ratio() * 100.0
    );
    if running.zero_filled_reads > 0 {
        warn!(reads = running.zero_filled_reads, "Some channel reads fell back to zeros");
    }
    for channel in Channel::BOTH {
        println!(
            "{} average frequency: {}",
            channel,
            format_frequency(stats.average_frequency(channel))
        );
    }
    Ok(())
}

fn report(outcome: &AcquisitionOutcome) {
    match outcome {
        AcquisitionOutcome::TriggerTimeout => {
            println!("[{}] Trigger timeout - no trigger detected", now());
        }
        AcquisitionOutcome::Captured(result) => print_result(result),
    }
}

fn print_result(result: &AcquisitionResult) {
    println!(
        "[{}] {} samples over {:.3} ms",
        result.captured_at.format("%H:%M:%S%.3f"),
        result.ch1.len(),
        result.ch1.duration() * 1e3
    );
    for channel in Channel::BOTH {
        let m = result.measurement(channel);
        let marker = if result.buffer(channel).zero_filled {
            "  (read failed, zeros)"
        } else {
            ""
        };
        println!(
            "  {}: Vpp {:.3} V  RMS {:.3} V  Freq {}{}",
            channel,
            m.vpp,
            m.vrms,
            format_frequency(m.frequency_hz),
            marker
        );
    }
}

fn now() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

/// Format a frequency with an adaptive unit, `"N/A"` when absent
fn format_frequency(freq: Option<f64>) -> String {
    match freq {
        None => "N/A".to_string(),
        Some(f) if f >= 1e6 => format!("{:.2} MHz", f / 1e6),
        Some(f) if f >= 1e3 => format!("{:.2} kHz", f / 1e3),
        Some(f) => format!("{:.2} Hz", f),
    }
}
