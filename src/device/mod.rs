//! Device/transport collaborators.
//!
//! The graph core only talks to devices through [`Transport`] (typed message
//! subscriptions) and [`DevicePanel`] (connect/disconnect notifications).
//! [`DeviceHub`] is an in-process implementation of both, fed by
//! [`SimulatedDevice`] threads or by any real decoder that calls
//! [`DeviceHub::publish`].

use std::fmt;
use std::sync::{mpsc, Arc};

use crate::error::Result;
use crate::message::{Message, MessageKind};

mod hub;
mod simulated;

pub use hub::DeviceHub;
pub use simulated::{Notification, SimulatedDevice, Status};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device #{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Connected(DeviceInfo),
    Disconnected(DeviceId),
}

/// Opaque registration id handed out by a [`Transport`].
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub struct CallbackId(pub u64);

pub type MessageCallback = Arc<dyn Fn(&Message) + Send + Sync>;

pub trait Transport: Send + Sync {
    /// Register `callback` for every `kind` message of `device`.
    ///
    /// Fails with `NotConnected` if the device is unknown or gone.
    fn subscribe(
        &self,
        device: DeviceId,
        kind: MessageKind,
        callback: MessageCallback,
    ) -> Result<CallbackId>;

    /// Stop deliveries for `id`. Unknown ids are ignored.
    fn unsubscribe(&self, id: CallbackId);
}

pub trait DevicePanel {
    fn devices(&self) -> Vec<DeviceInfo>;

    /// Receive every connect/disconnect happening after this call.
    fn watch(&self) -> mpsc::Receiver<DeviceEvent>;
}
