//! The attribute bus as seen over dbus by `hub-otamgr`.
//!
//! Inject an OTA notification by hand:
//! ```bash
//! gdbus call --system -d com.afero.OtaMgr1 -o /com/afero/OtaMgr1 \
//!   -m com.afero.AttributeClient1.Notify 51611 "[byte 0x2f, 0x74, 0x6d, 0x70]"
//! ```
//!
//! Monitor get responses:
//! ```bash
//! dbus-monitor --system type='signal',sender='com.afero.OtaMgr1'
//! ```

use async_trait::async_trait;
use zbus::fdo::Result;
use zbus::{interface, proxy, SignalContext};

pub const SERVICE: &str = "com.afero.OtaMgr1";
pub const IFACE: &str = "com.afero.AttributeClient1";
pub const OBJ_PATH: &str = "/com/afero/OtaMgr1";

/// Callbacks that the attribute daemon delivers to an attribute owner.
#[async_trait]
pub trait AttributeClientT: 'static + Send + Sync {
    async fn notify(&self, attribute_id: u32, value: Vec<u8>) -> Result<()>;
    async fn get(&self, attribute_id: u32, get_id: u16) -> Result<()>;
    async fn close(&self, status: i32) -> Result<()>;
}

#[derive(Debug, derive_more::From)]
pub struct AttributeClient<T>(pub T);

#[interface(name = "com.afero.AttributeClient1")]
impl<T: AttributeClientT> AttributeClient<T> {
    async fn notify(&self, attribute_id: u32, value: Vec<u8>) -> Result<()> {
        self.0.notify(attribute_id, value).await
    }

    async fn get(&self, attribute_id: u32, get_id: u16) -> Result<()> {
        self.0.get(attribute_id, get_id).await
    }

    async fn close(&self, status: i32) -> Result<()> {
        self.0.close(status).await
    }

    /// Answer to a previous `Get`, correlated by `get_id`.
    #[zbus(signal)]
    pub async fn get_response(
        ctxt: &SignalContext<'_>,
        status: i32,
        get_id: u16,
        value: Vec<u8>,
    ) -> zbus::Result<()>;
}

/// The attribute daemon that owns the attributes this process reads.
#[proxy(
    interface = "com.afero.Attrd1",
    gen_async = true,
    gen_blocking = false,
    default_service = "com.afero.Attrd1",
    default_path = "/com/afero/Attrd1"
)]
pub trait Attrd {
    /// Returns the attribute status code and the current value.
    fn get(&self, attribute_id: u32) -> zbus::Result<(i32, Vec<u8>)>;
}
