//! The attribute bus carried over dbus.
//!
//! Inbound calls on `com.afero.AttributeClient1` are queued as [`Event`]s for
//! the dispatch loop; outbound traffic goes through [`DbusBus`].

use async_trait::async_trait;
use futures::StreamExt as _;
use hub_otamgr_dbus::{
    AttrdProxy, AttributeClient, AttributeClientT, OBJ_PATH, SERVICE,
};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};
use zbus::{connection, Connection, SignalContext};

use crate::{
    attribute::{AttributeId, AttributeStatus, Event},
    bus::{AttributeBus, BusError},
};

/// Receives the attribute daemon's calls and forwards them to the dispatch loop.
#[derive(Debug)]
pub struct Inbound {
    events: mpsc::UnboundedSender<Event>,
}

impl Inbound {
    pub fn new(events: mpsc::UnboundedSender<Event>) -> Self {
        Self { events }
    }

    fn queue(&self, event: Event) -> zbus::fdo::Result<()> {
        self.events.send(event).map_err(|e| {
            zbus::fdo::Error::Failed(format!("failed to queue event: {e}"))
        })
    }
}

#[async_trait]
impl AttributeClientT for Inbound {
    async fn notify(&self, attribute_id: u32, value: Vec<u8>) -> zbus::fdo::Result<()> {
        debug!(attribute_id, len = value.len(), "received notify");
        self.queue(Event::Notify {
            id: attribute_id,
            value,
        })
    }

    async fn get(&self, attribute_id: u32, get_id: u16) -> zbus::fdo::Result<()> {
        debug!(attribute_id, get_id, "received get");
        self.queue(Event::Get {
            id: attribute_id,
            get_id,
        })
    }

    async fn close(&self, status: i32) -> zbus::fdo::Result<()> {
        self.queue(Event::Close { status })
    }
}

/// Outbound half of the attribute bus over a dbus connection.
#[derive(Debug, Clone)]
pub struct DbusBus {
    conn: Connection,
    events: mpsc::UnboundedSender<Event>,
}

impl DbusBus {
    /// Connects to `address`, or the system bus if `None`, claims [`SERVICE`],
    /// and starts serving the attribute client interface.
    ///
    /// Queues [`Event::Open`] once the connection is up and [`Event::Close`]
    /// if the service name is lost afterwards.
    pub async fn connect(
        address: Option<&str>,
        events: mpsc::UnboundedSender<Event>,
    ) -> Result<Self, BusError> {
        let builder = if let Some(address) = address {
            connection::Builder::address(address)?
        } else {
            connection::Builder::system()?
        };
        let conn = builder
            .name(SERVICE)?
            .serve_at(OBJ_PATH, AttributeClient(Inbound::new(events.clone())))?
            .build()
            .await?;
        debug!(
            unique_bus_name = ?conn.unique_name(),
            "dbus assigned unique bus name",
        );

        let dbus = zbus::fdo::DBusProxy::new(&conn).await?;
        let mut name_lost = dbus.receive_name_lost().await?;
        let lost_events = events.clone();
        tokio::spawn(async move {
            if name_lost.next().await.is_some() {
                warn!("lost dbus name `{SERVICE}`");
                lost_events
                    .send(Event::Close {
                        status: AttributeStatus::Disconnected.as_i32(),
                    })
                    .ok();
            }
        });

        events
            .send(Event::Open {
                status: AttributeStatus::Ok.as_i32(),
            })
            .map_err(|_| BusError::QueueClosed)?;

        Ok(Self { conn, events })
    }
}

#[async_trait]
impl AttributeBus for DbusBus {
    async fn send_get_response(
        &self,
        status: AttributeStatus,
        get_id: u16,
        value: Vec<u8>,
    ) -> Result<(), BusError> {
        let ctxt = SignalContext::new(&self.conn, OBJ_PATH)?;
        AttributeClient::<Inbound>::get_response(&ctxt, status.as_i32(), get_id, value)
            .await?;
        Ok(())
    }

    async fn issue_get(&self, id: AttributeId) -> Result<(), BusError> {
        let proxy = AttrdProxy::new(&self.conn).await?;
        let events = self.events.clone();
        tokio::spawn(async move {
            let (status, value) = match proxy.get(id.as_u32()).await {
                Ok(reply) => reply,
                Err(e) => {
                    error!(error = ?e, %id, "get failed");
                    (AttributeStatus::Disconnected.as_i32(), Vec::new())
                }
            };
            events
                .send(Event::GetReply {
                    id: id.as_u32(),
                    status,
                    value,
                })
                .ok();
        });
        Ok(())
    }
}
