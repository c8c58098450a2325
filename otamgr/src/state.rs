//! Mirrors the hub state byte between the attribute bus and local consumers,
//! and answers the constant OTA path prefix attribute.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    attribute::{AttributeId, AttributeStatus},
    bus::{AttributeBus, BusError},
    settings::UnsupportedGet,
};

/// Indicator state of the hub as one opaque byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HubState(pub u8);

#[derive(Debug)]
pub struct StateMirror {
    ota_path_prefix: Vec<u8>,
    unsupported_get: UnsupportedGet,
    state: watch::Sender<Option<HubState>>,
}

impl StateMirror {
    pub fn new(ota_path_prefix: &str, unsupported_get: UnsupportedGet) -> Self {
        // answered as a C string, terminator included
        let mut prefix = ota_path_prefix.as_bytes().to_vec();
        prefix.push(0);
        let (state, _rx) = watch::channel(None);
        Self {
            ota_path_prefix: prefix,
            unsupported_get,
            state,
        }
    }

    /// Local consumers (the indicator driver) follow the state through this.
    pub fn subscribe(&self) -> watch::Receiver<Option<HubState>> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn current(&self) -> Option<HubState> {
        *self.state.borrow()
    }

    /// Reconciles with the bus once it is open by asking for its last known
    /// state.
    pub async fn on_open(&self, bus: &dyn AttributeBus) -> Result<(), BusError> {
        debug!("requesting current hub state");
        bus.issue_get(AttributeId::HubStateGet).await
    }

    /// Answers a get request. Only the OTA path prefix is served.
    pub async fn on_get(
        &self,
        bus: &dyn AttributeBus,
        id: u32,
        get_id: u16,
    ) -> Result<(), BusError> {
        if AttributeId::try_from(id) == Ok(AttributeId::OtaPathPrefix) {
            let value = self.ota_path_prefix.clone();
            return bus
                .send_get_response(AttributeStatus::Ok, get_id, value)
                .await;
        }

        warn!(attribute_id = id, get_id, "on_get_unknown_attr");
        match self.unsupported_get {
            UnsupportedGet::Ignore => Ok(()),
            UnsupportedGet::Reject => {
                bus.send_get_response(
                    AttributeStatus::NotImplemented,
                    get_id,
                    Vec::new(),
                )
                .await
            }
        }
    }

    /// Applies a hub state pushed by the bus.
    pub fn on_notify(&self, value: &[u8]) {
        if value.len() != 1 {
            warn!(len = value.len(), "hub state payload should be one byte");
        }
        match value.first() {
            Some(&byte) => self.set(HubState(byte)),
            None => warn!("ignoring empty hub state"),
        }
    }

    /// Applies the answer to the get issued in [`Self::on_open`].
    pub fn on_get_reply(&self, status: i32, value: &[u8]) {
        if !AttributeStatus::is_ok(status) {
            warn!(status, "hub state get failed");
            return;
        }
        self.on_notify(value);
    }

    fn set(&self, state: HubState) {
        let changed = self.state.send_if_modified(|current| {
            let changed = *current != Some(state);
            *current = Some(state);
            changed
        });
        if changed {
            info!(state = state.0, "hub state changed");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct FakeBus {
        responses: Mutex<Vec<(AttributeStatus, u16, Vec<u8>)>>,
        gets: Mutex<Vec<AttributeId>>,
    }

    #[async_trait]
    impl AttributeBus for FakeBus {
        async fn send_get_response(
            &self,
            status: AttributeStatus,
            get_id: u16,
            value: Vec<u8>,
        ) -> Result<(), BusError> {
            self.responses.lock().unwrap().push((status, get_id, value));
            Ok(())
        }

        async fn issue_get(&self, id: AttributeId) -> Result<(), BusError> {
            self.gets.lock().unwrap().push(id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn answers_path_prefix_with_terminator() {
        let bus = FakeBus::default();
        let mirror = StateMirror::new("/tmp", UnsupportedGet::Ignore);

        mirror
            .on_get(&bus, AttributeId::OtaPathPrefix.as_u32(), 7)
            .await
            .unwrap();

        assert_eq!(
            *bus.responses.lock().unwrap(),
            vec![(AttributeStatus::Ok, 7, b"/tmp\0".to_vec())]
        );
    }

    #[tokio::test]
    async fn unknown_get_is_not_answered_by_default() {
        let bus = FakeBus::default();
        let mirror = StateMirror::new("/tmp", UnsupportedGet::Ignore);

        mirror.on_get(&bus, 1234, 1).await.unwrap();
        mirror
            .on_get(&bus, AttributeId::HubState.as_u32(), 2)
            .await
            .unwrap();

        assert!(bus.responses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_get_can_be_rejected() {
        let bus = FakeBus::default();
        let mirror = StateMirror::new("/tmp", UnsupportedGet::Reject);

        mirror.on_get(&bus, 1234, 9).await.unwrap();

        assert_eq!(
            *bus.responses.lock().unwrap(),
            vec![(AttributeStatus::NotImplemented, 9, vec![])]
        );
    }

    #[tokio::test]
    async fn open_requests_hub_state_once() {
        let bus = FakeBus::default();
        let mirror = StateMirror::new("/tmp", UnsupportedGet::Ignore);

        mirror.on_open(&bus).await.unwrap();

        assert_eq!(*bus.gets.lock().unwrap(), vec![AttributeId::HubStateGet]);
    }

    #[test]
    fn notify_updates_subscribers() {
        let mirror = StateMirror::new("/tmp", UnsupportedGet::Ignore);
        let mut rx = mirror.subscribe();
        assert_eq!(mirror.current(), None);

        mirror.on_notify(&[3]);

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), Some(HubState(3)));

        mirror.on_notify(&[3]);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn failed_reply_and_empty_payload_leave_state_alone() {
        let mirror = StateMirror::new("/tmp", UnsupportedGet::Ignore);

        mirror.on_get_reply(-1, &[5]);
        mirror.on_notify(&[]);
        assert_eq!(mirror.current(), None);

        mirror.on_get_reply(0, &[5, 6]);
        assert_eq!(mirror.current(), Some(HubState(5)));
    }
}
