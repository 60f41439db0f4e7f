//! Binary entrypoint for the enocean-link CLI.
//!
//! Commands:
//! - `init` - write a starter `enocean.toml`
//! - `monitor [--port <path>] [--seconds <n>]` - log every packet the transceiver sends
//! - `teach-in [--port <path>] [--timeout <s>] [--target <id> --eep <RR-FF-TT>]` - open a
//!   teach-in window and print each new device as JSON
//! - `version [--port <path>]` - query CO_RD_VERSION and CO_RD_IDBASE
//!
//! See the library crate docs for module-level details: `enocean_link::`.
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use enocean_link::config::Config;
use enocean_link::device::{Address, Device, EepId};
use enocean_link::esp3::command::parse_id_base;
use enocean_link::esp3::{CommonCommand, Packet, PacketType, ReturnCode, Telegram, VersionInfo};
use enocean_link::link::{FrameListener, Link};
use enocean_link::teachin::{TeachInEngine, TeachInListener};

#[derive(Parser)]
#[command(name = "enocean-link")]
#[command(about = "Host-side ESP3 stack for EnOcean transceivers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "enocean.toml", global = true)]
    config: String,

    /// Serial port, overriding the configured one
    #[arg(short, long, global = true)]
    port: Option<String>,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Log every packet received from the transceiver
    Monitor {
        /// Stop after this many seconds (runs until Ctrl-C when omitted)
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    /// Open a teach-in window and print devices as they pair
    TeachIn {
        /// Window length in seconds (defaults to teach_in.default_timeout_secs)
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Only accept this sender id (hex, e.g. 0180A1B2)
        #[arg(long, requires = "eep")]
        target: Option<String>,
        /// Profile for the target when its telegram carries none
        #[arg(long, requires = "target")]
        eep: Option<EepId>,
    },
    /// Print transceiver version and base id
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::Init = cli.command {
        Config::create_default(&cli.config).await?;
        println!("Wrote default configuration to {}", cli.config);
        return Ok(());
    }

    let config = match Config::load(&cli.config).await {
        Ok(c) => Some(c),
        Err(e) => {
            eprintln!("{} (using defaults)", e);
            None
        }
    };
    init_logging(&config, cli.verbose);
    let mut config = config.unwrap_or_default();
    if let Some(port) = cli.port {
        config.serial.port = port;
    }

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Monitor { seconds } => monitor(&config, seconds).await,
        Commands::TeachIn {
            timeout,
            target,
            eep,
        } => {
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.teach_in_timeout());
            let target = match (target, eep) {
                (Some(id), Some(eep)) => Some((parse_address(&id)?, eep)),
                _ => None,
            };
            teach_in(&config, timeout, target).await
        }
        Commands::Version => version(&config).await,
    }
}

#[cfg(feature = "serial")]
async fn connect(config: &Config) -> Result<Link> {
    info!(
        "Connecting to transceiver on {} at {} baud",
        config.serial.port, config.serial.baud_rate
    );
    Link::open_serial(&config.serial.port, config.serial.baud_rate, config.link_tuning()).await
}

#[cfg(not(feature = "serial"))]
async fn connect(_config: &Config) -> Result<Link> {
    Err(anyhow!("built without the `serial` feature"))
}

fn parse_address(raw: &str) -> Result<Address> {
    let digits = raw.trim().trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16)
        .map(Address::from_u32)
        .map_err(|e| anyhow!("invalid device id '{}': {}", raw, e))
}

/// Forwards every received packet into a channel.
struct Forwarder(mpsc::UnboundedSender<Packet>);

impl FrameListener for Forwarder {
    fn on_frame(&self, packet: &Packet) {
        let _ = self.0.send(packet.clone());
    }
}

fn describe(packet: &Packet) -> String {
    match packet.packet_type() {
        PacketType::Radio => match Telegram::parse(packet) {
            Ok(t) => format!(
                "{:?} from {} payload [{}] status 0x{:02X} hops {}{}",
                t.kind(),
                t.sender(),
                enocean_link::logutil::hex_snippet(t.payload(), 16),
                t.status(),
                t.repeater_count(),
                t.dbm().map(|d| format!(" -{} dBm", d)).unwrap_or_default()
            ),
            Err(e) => format!("radio ({})", e),
        },
        PacketType::Response => format!("RESPONSE {:?}", ReturnCode::of(packet)),
        PacketType::Event => format!(
            "EVENT {:?}",
            enocean_link::esp3::EventCode::of(packet)
        ),
        other => format!("{:?} {:?}", other, packet),
    }
}

async fn monitor(config: &Config, seconds: Option<u64>) -> Result<()> {
    let link = connect(config).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    link.add_listener(Arc::new(Forwarder(tx)));

    let deadline = seconds.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));
    loop {
        let sleep = async {
            match deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            Some(packet) = rx.recv() => info!("{}", describe(&packet)),
            _ = sleep => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let stats = link.stats().snapshot();
    link.shutdown().await?;
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

struct DevicePrinter(mpsc::UnboundedSender<Option<Device>>);

impl TeachInListener for DevicePrinter {
    fn on_teach_in_ended(&self) {
        let _ = self.0.send(None);
    }

    fn on_device_found(&self, device: &Device) {
        let _ = self.0.send(Some(device.clone()));
    }
}

async fn teach_in(config: &Config, timeout: Duration, target: Option<(Address, EepId)>) -> Result<()> {
    let link = connect(config).await?;
    let registry = Arc::new(config.device_table());
    let engine = Arc::new(TeachInEngine::new(registry.clone(), link.sender()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    engine.add_listener(Arc::new(DevicePrinter(tx)));
    link.add_listener(engine.clone());

    match target {
        Some((address, eep)) => engine.enable_for(address, eep, timeout),
        None => engine.enable(timeout),
    };
    let open_for = engine
        .state()
        .remaining(std::time::Instant::now())
        .unwrap_or_default();
    println!("Teach-in open for {}s; press the learn button on the device", open_for.as_secs());

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(Some(device)) => println!("{}", serde_json::to_string(&device)?),
                Some(None) | None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                engine.disable();
                break;
            }
        }
    }

    info!("{} device(s) learned", registry.len());
    link.shutdown().await
}

async fn version(config: &Config) -> Result<()> {
    let link = connect(config).await?;
    let (tx, mut rx) = mpsc::unbounded_channel();
    link.add_listener(Arc::new(Forwarder(tx)));
    let sender = link.sender();

    let mut answers = Vec::new();
    for command in [CommonCommand::ReadVersion, CommonCommand::ReadIdBase] {
        sender.send(command.packet()?);
        let response = tokio::time::timeout(Duration::from_secs(3), async {
            while let Some(packet) = rx.recv().await {
                if packet.packet_type() == PacketType::Response {
                    return Some(packet);
                }
                debug!("Skipping {}", describe(&packet));
            }
            None
        })
        .await
        .ok()
        .flatten();
        match response {
            Some(p) => answers.push(p),
            None => {
                warn!("No response to {:?}", command);
                link.shutdown().await?;
                return Err(anyhow!("transceiver did not answer {:?}", command));
            }
        }
    }

    match VersionInfo::parse(&answers[0]) {
        Some(info) => println!("{}", info),
        None => println!("Version query failed: {:?}", ReturnCode::of(&answers[0])),
    }
    match parse_id_base(&answers[1]) {
        Some(base) => println!("Base id: {}", base),
        None => println!("Base id query failed: {:?}", ReturnCode::of(&answers[1])),
    }
    link.shutdown().await
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Base level from CLI verbosity overrides config
    let base_level = match verbosity {
        0 => config
            .as_ref()
            .and_then(|c| c.logging.level.parse().ok())
            .unwrap_or(log::LevelFilter::Info),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });

    match file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Echo to the console only when attached to a terminal.
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                writeln!(
                    fmt,
                    "{} [{}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.args()
                )
            });
        }
    }
    let _ = builder.try_init();
}
