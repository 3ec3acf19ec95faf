use std::sync::Arc;

use banlanx_led_controller::*;
use color_eyre::eyre::{eyre, Result};
use tokio::io::{self, AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: bxd <host> <model code or name>";

/// One line of the stdin protocol
#[derive(Debug, Clone, Copy, PartialEq)]
enum Request {
    PowerOn,
    PowerOff,
    Brightness(u8),
    Effect(EffectMode, u8),
    Refresh,
    State,
}

fn parse_request(line: &str) -> std::result::Result<Request, String> {
    let mut parts = line.trim().splitn(2, ':');
    let command = parts.next().unwrap_or_default();
    let argument = parts.next().map(str::trim);
    match (command, argument) {
        ("", _) => Err("No command given".into()),
        ("power_on", None) => Ok(Request::PowerOn),
        ("power_off", None) => Ok(Request::PowerOff),
        ("refresh", None) => Ok(Request::Refresh),
        ("state", None) => Ok(Request::State),
        ("set_brightness", Some(level)) => level
            .parse()
            .map(Request::Brightness)
            .map_err(|_| "Brightness must be between 0 and 255".into()),
        ("set_effect", Some(argument)) => {
            let Some((mode, code)) = argument.split_once(',') else {
                return Err("Invalid effect format. Use MODE,CODE (e.g., 2,3)".into());
            };
            let mode = mode
                .trim()
                .parse()
                .ok()
                .and_then(EffectMode::from_code)
                .ok_or_else(|| format!("Unknown light mode: {mode}"))?;
            let code = code
                .trim()
                .parse()
                .map_err(|_| format!("Invalid effect code: {code}"))?;
            Ok(Request::Effect(mode, code))
        }
        ("set_brightness" | "set_effect", None) => Err(format!("{command} needs an argument")),
        (other, _) => Err(format!("Unknown command: {other}")),
    }
}

fn describe(state: &DeviceState) -> String {
    let Some(power) = state.power else {
        return "unknown".into();
    };
    let mut fields = vec![format!("power={}", if power { "on" } else { "off" })];
    if let Some(mode) = state.mode {
        fields.push(format!("mode={}", mode.code()));
    }
    if let Some(effect) = state.effect {
        fields.push(format!("effect={effect}"));
    }
    if let Some(brightness) = state.brightness {
        fields.push(format!("brightness={brightness}"));
    }
    if let Some([r, g, b]) = state.rgb {
        fields.push(format!("rgb={r},{g},{b}"));
    }
    fields.join(" ")
}

async fn handle(coordinator: &Arc<UpdateCoordinator<NetSession>>, request: Request) -> Result<String> {
    match request {
        Request::PowerOn => coordinator.command(|s| s.set_power(true)).await?,
        Request::PowerOff => coordinator.command(|s| s.set_power(false)).await?,
        Request::Brightness(level) => coordinator.command(|s| s.set_brightness(level)).await?,
        Request::Effect(mode, code) => {
            coordinator
                .command(|s| s.set_light_mode(mode, Some(code)))
                .await?
        }
        Request::Refresh => {
            coordinator.force_next_update();
            coordinator.refresh(coordinator.context()).await?;
        }
        Request::State => return Ok(describe(&coordinator.state())),
    }
    if !matches!(request, Request::Refresh) {
        coordinator.request_refresh();
    }
    Ok("OK".into())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("banlanx_led_controller=warn")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
    color_eyre::install()?;

    let args: Vec<_> = std::env::args().collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        eprintln!("{USAGE}");
        return Ok(());
    }
    let [_, host, model] = args.as_slice() else {
        eprintln!("{USAGE}");
        std::process::exit(1);
    };

    let settings = Settings::load(std::path::Path::new("bxd.toml"))?;
    let registry = Registry::builtin();
    let model = match model.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16)
            .ok()
            .and_then(|code| registry.match_model_code(code)),
        None => registry.match_model_name(model),
    }
    .filter(|model| model.transport() == Transport::Net)
    .ok_or_else(|| eyre!("Unsupported network model: {model}"))?;

    let session = NetSession::new(host.as_str(), host.as_str(), model, &settings);
    let (entry, lifecycle) = watch::channel(EntryState::SetupInProgress);
    let coordinator = Arc::new(UpdateCoordinator::new(session, lifecycle, &settings));

    // First contact happens during setup, without protocol retries
    coordinator.refresh(coordinator.context()).await?;
    entry.send_replace(EntryState::Loaded);
    let poller = coordinator.spawn();
    println!("OK");

    let mut lines = BufReader::new(io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let request = match parse_request(&line) {
            Ok(request) => request,
            Err(e) => {
                println!("ERR {e}");
                continue;
            }
        };
        match handle(&coordinator, request).await {
            Ok(reply) => println!("{reply}"),
            Err(e) => {
                warn!(error = %e, "Command failed");
                println!("ERR {e}");
            }
        }
    }

    info!("Shutting down");
    entry.send_replace(EntryState::UnloadInProgress);
    coordinator.shutdown().await;
    poller.await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_requests() {
        assert_eq!(parse_request("power_on\n"), Ok(Request::PowerOn));
        assert_eq!(parse_request("set_brightness: 128"), Ok(Request::Brightness(128)));
        assert_eq!(
            parse_request("set_effect:2,3"),
            Ok(Request::Effect(EffectMode::from_code(2).expect("mode"), 3))
        );
        assert_eq!(parse_request("state"), Ok(Request::State));
    }

    #[test]
    fn rejects_bad_requests() {
        assert!(parse_request("").is_err());
        assert!(parse_request("set_brightness:300").is_err());
        assert!(parse_request("set_effect:9,1").is_err());
        assert!(parse_request("set_effect:2").is_err());
        assert!(parse_request("set_brightness").is_err());
        assert!(parse_request("dance").is_err());
    }
}
