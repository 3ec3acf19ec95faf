use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use banlanx_led_controller::*;
use clap::{Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{bail, eyre, Result};
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{debug, info, instrument};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "bxc.toml")]
    config: PathBuf,

    /// Override the polling interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Override the number of retries per transaction
    #[arg(long)]
    retries: Option<u8>,

    #[command(subcommand)]
    command: Commands,
}

/// Which controller to talk to
#[derive(Args, Debug)]
struct Target {
    /// IP address or hostname of a network controller
    #[arg(long)]
    host: Option<String>,

    /// Model code (e.g. 0x4E) or name (e.g. SP530E) of the network controller
    #[arg(long, requires = "host")]
    model: Option<String>,

    /// MAC address or ID of a Bluetooth controller, first one found otherwise
    #[arg(long, conflicts_with = "host")]
    address: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum Switch {
    On,
    Off,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum TransportArg {
    Net,
    Ble,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported models
    Models {
        #[arg(short, long, value_enum)]
        transport: Option<TransportArg>,
    },
    /// Resolve a model name or code
    Match {
        #[arg(long, conflicts_with = "code", required_unless_present = "code")]
        name: Option<String>,
        /// Decimal or 0x prefixed hex
        #[arg(long)]
        code: Option<String>,
    },
    /// Search the local network for controllers
    Discover {
        /// Scan duration in seconds
        #[arg(short, long, default_value_t = 10)]
        timeout: u64,
        /// Probe a single host instead of broadcasting
        #[arg(long)]
        address: Option<IpAddr>,
    },
    /// Print the current device state
    Status {
        #[command(flatten)]
        target: Target,
    },
    /// Switch the device on or off
    Power {
        #[command(flatten)]
        target: Target,
        #[arg(value_enum)]
        state: Switch,
    },
    /// Select an effect, optionally switching the light mode first
    Effect {
        #[command(flatten)]
        target: Target,
        /// Effect name, e.g. "Solid Color"
        name: String,
        /// Light mode name, e.g. "Dynamic Color"
        #[arg(short, long)]
        mode: Option<String>,
    },
    /// Set brightness
    Brightness {
        #[command(flatten)]
        target: Target,
        /// Brightness level (0-255)
        #[arg(short, long, default_value_t = 255)]
        level: u8,
    },
    /// Run the update coordinator for a number of ticks
    Poll {
        #[command(flatten)]
        target: Target,
        #[arg(short = 'n', long, default_value_t = 3)]
        ticks: u32,
    },
}

/// A device command, run under the coordinator lock
enum Action {
    Status,
    Power(bool),
    Effect { name: String, mode: Option<EffectMode> },
    Brightness(u8),
    Poll(u32),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("banlanx_led_controller=info")),
        )
        .compact()
        .init();

    color_eyre::install()?;

    let cli = Cli::parse();
    debug!("Parsed command line arguments");

    let mut settings = Settings::load(&cli.config)?;
    if let Some(interval) = cli.interval {
        settings.update_interval = interval.max(1);
    }
    if let Some(retries) = cli.retries {
        settings.retry_count = retries;
    }

    let registry = Registry::builtin();

    let (target, action) = match cli.command {
        Commands::Models { transport } => {
            let models = match transport {
                Some(TransportArg::Net) => registry.models_for(Transport::Net),
                Some(TransportArg::Ble) => registry.models_for(Transport::Ble),
                None => registry.models(),
            };
            for model in models {
                println!("{model}");
            }
            return Ok(());
        }
        Commands::Match { name, code } => {
            let model = match (name, code) {
                (Some(name), _) => registry.match_model_name(&name),
                (None, Some(code)) => registry.match_model_code(parse_code(&code)?),
                (None, None) => None,
            };
            match model {
                Some(model) => print_model(&model),
                None => bail!("No matching model"),
            }
            return Ok(());
        }
        Commands::Discover { timeout, address } => {
            let scanner = NetScanner::new(registry);
            let found = scanner
                .scan(Duration::from_secs(timeout), address)
                .await?;
            if found.is_empty() {
                println!("No controllers found");
            }
            for discovery in found {
                println!("{discovery}");
            }
            return Ok(());
        }
        Commands::Status { target } => (target, Action::Status),
        Commands::Power { target, state } => (target, Action::Power(matches!(state, Switch::On))),
        Commands::Effect { target, name, mode } => {
            let mode = match mode {
                Some(mode) => Some(
                    EffectMode::from_name(&mode).ok_or_else(|| eyre!("Unknown light mode '{mode}'"))?,
                ),
                None => None,
            };
            (target, Action::Effect { name, mode })
        }
        Commands::Brightness { target, level } => (target, Action::Brightness(level)),
        Commands::Poll { target, ticks } => (target, Action::Poll(ticks)),
    };

    match target.host {
        Some(host) => {
            let Some(model) = target.model else {
                bail!("--model is required with --host");
            };
            let model = resolve_model(&registry, &model)?;
            if model.transport() != Transport::Net {
                bail!("{} is not a network controller", model.name);
            }
            let session = NetSession::new(host.clone(), host, model, &settings);
            run(session, action, &settings).await
        }
        None => {
            let session = match target.address {
                Some(address) => BleSession::with_address(&registry, &address, &settings).await?,
                None => BleSession::discover(&registry, &settings).await?,
            };
            run(session, action, &settings).await
        }
    }
}

fn parse_code(code: &str) -> Result<u8> {
    let parsed = match code.strip_prefix("0x").or_else(|| code.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => code.parse(),
    };
    parsed.map_err(|e| eyre!("Invalid model code '{code}': {e}"))
}

fn resolve_model(registry: &Registry, model: &str) -> Result<ProtocolModel> {
    let found = match parse_code(model) {
        Ok(code) => registry.match_model_code(code),
        Err(_) => registry.match_model_name(model),
    };
    found.ok_or_else(|| eyre!("Unsupported model '{model}'"))
}

fn print_model(model: &ProtocolModel) {
    println!("{model}");
    println!("  manufacturer: {}", model.manufacturer);
    match model.params {
        TransportParams::Net { port, .. } => println!("  port: {port}"),
        TransportParams::Ble { manufacturer_id, .. } => {
            println!("  manufacturer id: {manufacturer_id}")
        }
    }
    for name in model.light_type_names() {
        println!("  light type: {name}");
    }
}

fn print_state(name: &str, state: &DeviceState) {
    println!("{name}");
    let Some(power) = state.power else {
        println!("  state unknown");
        return;
    };
    println!("  power: {}", if power { "on" } else { "off" });
    if let Some(config) = state.config {
        println!("  light type: {}", config.name);
    }
    if let Some(firmware) = &state.firmware {
        println!("  firmware: {firmware}");
    }
    if let Some(mode) = state.mode {
        println!("  mode: {mode}");
    }
    if let Some(effect) = state.effect_name {
        println!("  effect: {effect}");
    }
    if let Some(brightness) = state.brightness {
        println!("  brightness: {brightness}");
    }
    if let Some([r, g, b]) = state.rgb {
        println!("  color: {r},{g},{b}");
    }
    if let Some(speed) = state.speed {
        println!("  speed: {speed}");
    }
    if let Some(order) = &state.chip_order {
        println!("  chip order: {order}");
    }
    if let Some(updated) = state.updated {
        println!("  updated: {}", updated.format("%H:%M:%S"));
    }
}

#[instrument(skip_all, fields(device = %session.name()))]
async fn run<S: LightControl + 'static>(session: S, action: Action, settings: &Settings) -> Result<()> {
    // The command line owns the entry; it is loaded as long as we run
    let (entry, lifecycle) = watch::channel(EntryState::Loaded);
    let coordinator = Arc::new(UpdateCoordinator::new(session, lifecycle, settings));
    let name = coordinator.session().name().to_string();

    coordinator.refresh(coordinator.context()).await?;

    match action {
        Action::Status => {}
        Action::Power(on) => {
            coordinator.command(|s| s.set_power(on)).await?;
        }
        Action::Effect { name, mode } => {
            coordinator
                .command::<(), _>(|s| {
                    Box::pin(async move {
                        if let Some(mode) = mode {
                            s.set_light_mode(mode, None).await?;
                            s.update(None, false).await?;
                        }
                        s.set_effect(&name).await
                    })
                })
                .await?;
        }
        Action::Brightness(level) => {
            coordinator.command(|s| s.set_brightness(level)).await?;
        }
        Action::Poll(ticks) => {
            let _listener = coordinator.add_listener();
            let poller = coordinator.spawn();
            for tick in 1..=ticks {
                tokio::time::sleep(coordinator.update_interval()).await;
                let status = coordinator.last_update();
                info!(tick, success = status.success, "Poll");
                print_state(&name, &coordinator.state());
            }
            coordinator.shutdown().await;
            poller.await?;
            entry.send_replace(EntryState::NotLoaded);
            return Ok(());
        }
    }

    coordinator.refresh(coordinator.context()).await?;
    print_state(&name, &coordinator.state());
    coordinator.shutdown().await;
    entry.send_replace(EntryState::NotLoaded);
    Ok(())
}
