use std::{borrow::Cow, path::Path, sync::Arc};

use clap::{
    builder::{styling::AnsiColor, Styles},
    Parser,
};
use color_eyre::eyre::{bail, WrapErr as _};
use hub_otamgr::{
    attribute::{AttributeStatus, Event},
    dbus::DbusBus,
    dispatch::{Context, Dispatcher},
    settings::{Settings, CFG_DEFAULT_PATH, CFG_ENV_VAR, ENV_VAR_PREFIX},
    shell::Host,
    SYSLOG_IDENTIFIER,
};
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::mpsc,
};
use tracing::{debug, info};

/// Sequences OTA upgrades and device commands received from the attribute bus.
///
/// Configured through `/etc/hub-otamgr.conf` and `HUB_OTAMGR_*` environment
/// variables.
#[derive(Parser, Debug)]
#[clap(version, about, styles = clap_v3_styles())]
struct Cli {}

fn clap_v3_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default())
        .usage(AnsiColor::Green.on_default())
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

fn get_config_source() -> Cow<'static, Path> {
    if let Some(config) = figment::providers::Env::var(CFG_ENV_VAR) {
        Cow::Owned(std::path::PathBuf::from(config))
    } else {
        Cow::Borrowed(CFG_DEFAULT_PATH.as_ref())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let _args = Cli::parse();

    let config_path = get_config_source();
    let settings = Settings::get(&config_path, ENV_VAR_PREFIX)
        .wrap_err("failed reading settings")?;
    let telemetry = hub_telemetry::TelemetryConfig::new()
        .with_journald(SYSLOG_IDENTIFIER)
        .with_default_level(settings.log_level)
        .init();
    info!("using config at `{}`", config_path.display());
    debug!(?settings, "starting otamgr with settings");

    let result = run(settings).await;
    telemetry.flush().await;
    result
}

async fn run(settings: Settings) -> color_eyre::Result<()> {
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let bus = DbusBus::connect(settings.dbus_address.as_deref(), events_tx.clone())
        .await
        .wrap_err("failed opening attribute bus")?;

    let mut sigterm =
        signal(SignalKind::terminate()).wrap_err("failed installing SIGTERM handler")?;
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
        }
        events_tx
            .send(Event::Close {
                status: AttributeStatus::Ok.as_i32(),
            })
            .ok();
    });

    let dispatcher = Dispatcher::new(Context {
        bus: Arc::new(bus),
        shell: Arc::new(Host),
        settings,
    });

    match dispatcher.run(events_rx).await {
        Some(status) if !AttributeStatus::is_ok(status) => {
            bail!("attribute bus closed with status {status}")
        }
        _ => Ok(()),
    }
}
