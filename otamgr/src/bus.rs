//! Outbound half of the attribute bus. The inbound half arrives as
//! [`crate::attribute::Event`]s.

use async_trait::async_trait;

use crate::attribute::{AttributeId, AttributeStatus};

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("error occurred in zbus communication")]
    Zbus(#[from] zbus::Error),
    #[error("event queue is closed")]
    QueueClosed,
}

#[async_trait]
pub trait AttributeBus: Send + Sync {
    /// Answers a get request previously delivered as [`crate::attribute::Event::Get`].
    async fn send_get_response(
        &self,
        status: AttributeStatus,
        get_id: u16,
        value: Vec<u8>,
    ) -> Result<(), BusError>;

    /// Asks the bus for the current value of `id`. The answer is delivered
    /// later as [`crate::attribute::Event::GetReply`].
    async fn issue_get(&self, id: AttributeId) -> Result<(), BusError>;
}
