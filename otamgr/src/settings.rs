use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use figment::providers::Format as _;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr, DurationMilliSeconds};
use tracing::level_filters::LevelFilter;

pub const CFG_DEFAULT_PATH: &str = "/etc/hub-otamgr.conf";
pub const ENV_VAR_PREFIX: &str = "HUB_OTAMGR_";
pub const CFG_ENV_VAR: &str = const_format::concatcp!(ENV_VAR_PREFIX, "CONFIG");

/// How the grace period before a reboot or credential wipe is spent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GraceMode {
    /// Sleep inside the handler; events that arrive meanwhile wait in the
    /// queue.
    #[default]
    Blocking,
    /// Run the delayed action on a separate task and keep dispatching.
    Deferred,
}

/// What to do with a get request for an attribute we do not serve.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnsupportedGet {
    /// Log it and send nothing back.
    #[default]
    Ignore,
    /// Answer with a not-implemented status.
    Reject,
}

/// `Settings` are the configurable options for running the OTA manager.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Settings {
    /// Keep-file consumed by the upgrade tool.
    pub recovery_marker: PathBuf,
    pub reboot_reason: PathBuf,
    /// Directory that survives the upgrade and receives the image header.
    pub header_dst_dir: PathBuf,
    /// Answer to the OTA path prefix get.
    pub ota_path_prefix: String,
    #[serde_as(as = "DurationMilliSeconds")]
    pub reboot_grace: Duration,
    #[serde_as(as = "DurationMilliSeconds")]
    pub clear_credentials_grace: Duration,
    pub grace_mode: GraceMode,
    pub unsupported_get: UnsupportedGet,
    /// Process that wipes stored credentials and is terminated afterwards.
    pub credentials_process: String,
    /// Used when `RUST_LOG` is not set.
    #[serde_as(as = "DisplayFromStr")]
    pub log_level: LevelFilter,
    /// Bus to connect to. The system bus is used if unset.
    pub dbus_address: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            recovery_marker: PathBuf::from("/etc/keep.d/otamgr.keep"),
            reboot_reason: PathBuf::from("/etc/reboot_reason"),
            header_dst_dir: PathBuf::from("/etc"),
            ota_path_prefix: "/tmp".to_owned(),
            reboot_grace: Duration::from_secs(5),
            clear_credentials_grace: Duration::from_secs(4),
            grace_mode: GraceMode::default(),
            unsupported_get: UnsupportedGet::default(),
            credentials_process: "hubby".to_owned(),
            log_level: LevelFilter::INFO,
            dbus_address: None,
        }
    }
}

impl Settings {
    /// Constructs `Settings` from defaults, a config file and environment
    /// variables. Environment variables take precedence over the config file.
    /// A missing config file is skipped.
    pub fn get(
        config: impl AsRef<Path>,
        env_prefix: &str,
    ) -> figment::error::Result<Settings> {
        figment::Figment::new()
            .merge(figment::providers::Serialized::defaults(Settings::default()))
            .merge(figment::providers::Toml::file(config))
            .merge(figment::providers::Env::prefixed(env_prefix))
            .extract()
    }
}
