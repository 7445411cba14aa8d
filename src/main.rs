use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use lora_reliable::config::EngineConfig;
use lora_reliable::constants::{EU868_CHANNEL_COUNT, EU868_FREQUENCIES};
use lora_reliable::link::{open_serial, JammingDetector, LineProtocolClient};
use lora_reliable::logging::{init_logger_with_level, log_info, log_warn, verbosity_to_level};
use std::path::PathBuf;
use tokio_serial::SerialStream;

#[derive(Parser)]
#[command(name = "lora-reliable")]
#[command(about = "Diagnostics for RN2483-class LoRa modules")]
struct Cli {
    /// Serial port of the module
    #[arg(short, long, default_value = "/dev/ttyUSB0")]
    port: String,

    /// Overrides the configured baud rate
    #[arg(short, long)]
    baudrate: Option<u32>,

    /// JSON engine configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// More output (-v info, -vv wire traffic)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum DetectorKind {
    Trigger,
    Composite,
}

#[derive(Subcommand)]
enum Commands {
    /// Send one raw command and print the reply
    Raw { command: Vec<String> },
    /// Pause the MAC, print the pause window, resume
    Pause,
    /// Probe a frequency for jamming
    Probe {
        /// Frequency in Hz
        #[arg(short, long, default_value_t = EU868_FREQUENCIES[0])]
        frequency: u32,
        /// Detector to run; defaults to the configured one
        #[arg(short, long, value_enum)]
        detector: Option<DetectorKind>,
    },
    /// Restrict the module to one EU868 channel and read it back
    LockChannel { channel: u8 },
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if let Some(baudrate) = cli.baudrate {
        config.link.baudrate = baudrate;
    }
    Ok(config)
}

async fn pause(client: &mut LineProtocolClient<SerialStream>) -> Result<()> {
    let window = client.pause_mac().await.context("mac pause")?;
    if window.is_indefinite() {
        println!("MAC paused indefinitely");
    } else {
        println!("MAC paused for {} ms", window.window_ms);
    }
    client.resume_mac().await.context("mac resume")?;
    Ok(())
}

async fn probe(
    client: &mut LineProtocolClient<SerialStream>,
    frequency: u32,
    detector: &JammingDetector,
) -> Result<()> {
    let window = client.pause_mac().await.context("mac pause")?;
    if !window.is_sufficient() && !window.is_indefinite() {
        log_warn(&format!(
            "Pause window of {} ms is shorter than a probe",
            window.window_ms
        ));
    }

    let verdict = client.detect_jamming(frequency, detector).await;
    if let Err(e) = client.resume_mac().await {
        log_warn(&format!("mac resume failed: {e}"));
    }
    let verdict = verdict.context("jamming probe")?;

    println!(
        "{} Hz: {} ({:?})",
        frequency,
        if verdict.jammed { "JAMMED" } else { "clear" },
        verdict.evidence
    );
    Ok(())
}

async fn lock_channel(client: &mut LineProtocolClient<SerialStream>, channel: u8) -> Result<()> {
    if channel as usize >= EU868_CHANNEL_COUNT {
        bail!("channel must be below {EU868_CHANNEL_COUNT}");
    }
    let frequency = EU868_FREQUENCIES[channel as usize];

    client
        .configure_eu868_channel(channel, frequency)
        .await
        .context("channel configuration")?;
    client
        .enable_only_channel(channel)
        .await
        .context("channel enable")?;
    if let Err(e) = client.save_configuration().await {
        log_warn(&format!("mac save failed: {e}"));
    }

    let report = client.verify_channel(channel).await;
    println!(
        "Channel {}: status={} freq={}",
        report.channel_id,
        report.status.as_deref().unwrap_or("?"),
        report.frequency.as_deref().unwrap_or("?")
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger_with_level(verbosity_to_level(cli.verbose));

    let config = load_config(&cli)?;
    let mut client = open_serial(&cli.port, &config.link)
        .with_context(|| format!("opening {}", cli.port))?;
    log_info(&format!("Connected to {}", cli.port));

    match cli.command {
        Commands::Raw { command } => {
            let text = command.join(" ");
            let reply = client.query(&text).await.context("raw command")?;
            println!("{reply}");
        }
        Commands::Pause => pause(&mut client).await?,
        Commands::Probe {
            frequency,
            detector,
        } => {
            let detector = match detector {
                Some(DetectorKind::Trigger) => JammingDetector::trigger_and_listen(),
                Some(DetectorKind::Composite) => JammingDetector::composite(),
                None => config.lbt.detector.clone(),
            };
            probe(&mut client, frequency, &detector).await?;
        }
        Commands::LockChannel { channel } => lock_channel(&mut client, channel).await?,
    }

    Ok(())
}
