//! Routes bus events to the handlers. Events are handled one at a time, in
//! arrival order.

use std::{ops::ControlFlow, sync::Arc};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    attribute::{AttributeId, AttributeStatus, Event},
    bus::AttributeBus,
    command::{CommandHandler, GraceConfig},
    marker::RecoveryMarker,
    paths::PathResolver,
    reboot_reason::RebootReasonStore,
    settings::Settings,
    shell::Shell,
    state::StateMirror,
    upgrade::UpgradeExecutor,
};

/// Process wide dependencies, built once at startup and handed to the
/// [`Dispatcher`].
#[derive(Clone)]
pub struct Context {
    pub bus: Arc<dyn AttributeBus>,
    pub shell: Arc<dyn Shell>,
    pub settings: Settings,
}

pub struct Dispatcher {
    bus: Arc<dyn AttributeBus>,
    upgrade: UpgradeExecutor,
    commands: CommandHandler,
    state: StateMirror,
}

impl Dispatcher {
    pub fn new(ctx: Context) -> Self {
        let Context {
            bus,
            shell,
            settings,
        } = ctx;
        let reboot_reason = RebootReasonStore::new(&settings.reboot_reason);

        let upgrade = UpgradeExecutor::new(
            PathResolver::new(&settings.header_dst_dir),
            RecoveryMarker::new(&settings.recovery_marker),
            reboot_reason.clone(),
            Arc::clone(&shell),
        );
        let commands = CommandHandler::new(
            reboot_reason,
            shell,
            GraceConfig {
                mode: settings.grace_mode,
                reboot: settings.reboot_grace,
                clear_credentials: settings.clear_credentials_grace,
            },
            settings.credentials_process,
        );
        let state = StateMirror::new(&settings.ota_path_prefix, settings.unsupported_get);

        Self {
            bus,
            upgrade,
            commands,
            state,
        }
    }

    #[must_use]
    pub fn state(&self) -> &StateMirror {
        &self.state
    }

    /// Handles one event. Breaks with the close status once the bus is gone.
    pub async fn handle(&self, event: Event) -> ControlFlow<i32> {
        match event {
            Event::Open { status } => self.on_open(status).await,
            Event::Close { status } => {
                if AttributeStatus::is_ok(status) {
                    info!("attribute bus closed");
                } else {
                    error!(status, "unexpected_close");
                }
                return ControlFlow::Break(status);
            }
            Event::Notify { id, value } => self.on_notify(id, &value).await,
            Event::Get { id, get_id } => {
                if let Err(e) = self.state.on_get(&*self.bus, id, get_id).await {
                    error!(error = ?e, get_id, "failed sending get response");
                }
            }
            Event::GetReply { id, status, value } => {
                if AttributeId::try_from(id) == Ok(AttributeId::HubStateGet) {
                    self.state.on_get_reply(status, &value);
                } else {
                    warn!(attribute_id = id, "unexpected get reply");
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Drains `events` until the bus closes or every sender is dropped.
    /// Returns the close status if there was one.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<Event>) -> Option<i32> {
        while let Some(event) = events.recv().await {
            if let ControlFlow::Break(status) = self.handle(event).await {
                return Some(status);
            }
        }
        debug!("event queue closed");
        None
    }

    async fn on_open(&self, status: i32) {
        if !AttributeStatus::is_ok(status) {
            error!(status, "open_failed");
            return;
        }
        info!("attribute bus open");
        if let Err(e) = self.state.on_open(&*self.bus).await {
            error!(error = ?e, "failed requesting hub state");
        }
    }

    async fn on_notify(&self, id: u32, value: &[u8]) {
        let attribute = match AttributeId::try_from(id) {
            Ok(attribute) => attribute,
            Err(e) => {
                warn!(error = %e, "ignoring notification");
                return;
            }
        };

        match attribute {
            AttributeId::OtaUpgradePath => {
                info!(path = %String::from_utf8_lossy(value), "ota_notification");
                match self.upgrade.run(value).await {
                    Ok(status) => debug!(%status, "upgrade tool exited"),
                    Err(e) => error!(error = ?e, "upgrade aborted"),
                }
            }
            AttributeId::HubState => self.state.on_notify(value),
            AttributeId::DeviceCommand => {
                let handled = self.commands.handle(value).await;
                debug!(?handled, "device command handled");
            }
            AttributeId::OtaPathPrefix | AttributeId::HubStateGet => {
                warn!(%attribute, "ignoring notification for get-only attribute");
            }
        }
    }
}
