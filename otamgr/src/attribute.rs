//! Attribute identifiers owned or consumed by this daemon, and the events the
//! attribute bus delivers for them.

use std::fmt::{self, Display};

/// First attribute of the range registered by this daemon.
pub const RANGE_START: u32 = 51611;
/// Last attribute of the range registered by this daemon (inclusive).
pub const RANGE_END: u32 = 51615;

/// Attributes this daemon handles. Every other ID is an [`UnknownAttribute`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AttributeId {
    /// Notify: base path of a staged OTA image, without extension.
    OtaUpgradePath = 51611,
    /// Notify: single byte hub state.
    HubState = 51612,
    /// Notify: four byte device command.
    DeviceCommand = 51613,
    /// Get: directory prefix that staged OTA images are placed under.
    OtaPathPrefix = 51614,
    /// Get: current hub state as last known by the bus.
    HubStateGet = 51615,
}

impl AttributeId {
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for AttributeId {
    type Error = UnknownAttribute;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            51611 => Self::OtaUpgradePath,
            51612 => Self::HubState,
            51613 => Self::DeviceCommand,
            51614 => Self::OtaPathPrefix,
            51615 => Self::HubStateGet,
            unknown => return Err(UnknownAttribute(unknown)),
        })
    }
}

impl Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}({})", self.as_u32())
    }
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unknown attribute `{0}`")]
pub struct UnknownAttribute(pub u32);

/// Status codes exchanged with the attribute bus.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum AttributeStatus {
    Ok = 0,
    /// The bus connection went away underneath us.
    Disconnected = -1,
    NotImplemented = -4,
}

impl AttributeStatus {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn is_ok(status: i32) -> bool {
        status == Self::Ok.as_i32()
    }
}

/// Everything the bus can deliver to the dispatch loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// The bus connection finished opening.
    Open { status: i32 },
    /// The bus connection closed. Ends the dispatch loop.
    Close { status: i32 },
    /// An attribute value was pushed to us. `id` is kept raw so that unknown
    /// attributes can still be logged.
    Notify { id: u32, value: Vec<u8> },
    /// Somebody asked for the value of one of our attributes.
    Get { id: u32, get_id: u16 },
    /// Answer to a get this daemon issued through
    /// [`crate::bus::AttributeBus::issue_get`].
    GetReply { id: u32, status: i32, value: Vec<u8> },
}
