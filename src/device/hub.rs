use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;

use parking_lot::{Mutex, RwLock};

use crate::device::{
    CallbackId, DeviceEvent, DeviceId, DeviceInfo, DevicePanel, MessageCallback, Transport,
};
use crate::error::{GraphError, Result};
use crate::message::{Message, MessageKind};

struct Registration {
    id: CallbackId,
    kind: MessageKind,
    callback: MessageCallback,
}

struct Connected {
    info: DeviceInfo,
    registrations: Vec<Registration>,
}

/// In-process router between message producers and graph subscriptions.
///
/// Callbacks are invoked on the publishing thread, outside any hub lock.
pub struct DeviceHub {
    devices: RwLock<HashMap<DeviceId, Connected>>,
    watchers: Mutex<Vec<mpsc::Sender<DeviceEvent>>>,
    next_callback_id: AtomicU64,
}

impl DeviceHub {
    pub fn new() -> DeviceHub {
        DeviceHub {
            devices: RwLock::new(HashMap::new()),
            watchers: Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(1),
        }
    }

    pub fn connect(&self, id: DeviceId, name: impl Into<String>) {
        let info = DeviceInfo {
            id,
            name: name.into(),
        };

        {
            let mut devices = self.devices.write();
            if devices.contains_key(&id) {
                log::warn!("{} is already connected, ignoring", id);
                return;
            }
            devices.insert(
                id,
                Connected {
                    info: info.clone(),
                    registrations: Vec::new(),
                },
            );
        }

        log::info!("{} connected ({})", id, info.name);
        self.notify(DeviceEvent::Connected(info));
    }

    /// Drop the device and every registration it still had.
    pub fn disconnect(&self, id: DeviceId) {
        let removed = self.devices.write().remove(&id);

        match removed {
            Some(device) => {
                log::info!(
                    "{} disconnected, dropping {} registration(s)",
                    id,
                    device.registrations.len()
                );
                self.notify(DeviceEvent::Disconnected(id));
            }
            None => log::debug!("disconnect of unknown {}", id),
        }
    }

    pub fn is_connected(&self, id: DeviceId) -> bool {
        self.devices.read().contains_key(&id)
    }

    /// Deliver `message` to every matching registration on the calling thread.
    ///
    /// Returns the number of callbacks invoked.
    pub fn publish(&self, device: DeviceId, message: &Message) -> usize {
        let kind = message.kind();

        let callbacks: Vec<MessageCallback> = match self.devices.read().get(&device) {
            Some(connected) => connected
                .registrations
                .iter()
                .filter(|registration| registration.kind == kind)
                .map(|registration| registration.callback.clone())
                .collect(),
            None => return 0,
        };

        for callback in &callbacks {
            callback(message);
        }

        callbacks.len()
    }

    /// Number of live registrations across all devices.
    pub fn subscription_count(&self) -> usize {
        self.devices
            .read()
            .values()
            .map(|device| device.registrations.len())
            .sum()
    }

    fn notify(&self, event: DeviceEvent) {
        // watchers whose receiver was dropped are pruned here
        self.watchers
            .lock()
            .retain(|watcher| watcher.send(event.clone()).is_ok());
    }
}

impl Default for DeviceHub {
    fn default() -> Self {
        DeviceHub::new()
    }
}

impl Transport for DeviceHub {
    fn subscribe(
        &self,
        device: DeviceId,
        kind: MessageKind,
        callback: MessageCallback,
    ) -> Result<CallbackId> {
        let mut devices = self.devices.write();
        let connected = devices
            .get_mut(&device)
            .ok_or(GraphError::NotConnected(device))?;

        let id = CallbackId(self.next_callback_id.fetch_add(1, Ordering::Relaxed));
        connected.registrations.push(Registration { id, kind, callback });

        log::trace!("registered callback {:?} for {} {}", id, device, kind);

        Ok(id)
    }

    fn unsubscribe(&self, id: CallbackId) {
        let mut devices = self.devices.write();
        for device in devices.values_mut() {
            if let Some(index) = device
                .registrations
                .iter()
                .position(|registration| registration.id == id)
            {
                device.registrations.swap_remove(index);
                log::trace!("removed callback {:?} from {}", id, device.info.id);
                return;
            }
        }
    }
}

impl DevicePanel for DeviceHub {
    fn devices(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<DeviceInfo> = self
            .devices
            .read()
            .values()
            .map(|device| device.info.clone())
            .collect();
        devices.sort_by_key(|info| info.id);
        devices
    }

    fn watch(&self) -> mpsc::Receiver<DeviceEvent> {
        let (tx, rx) = mpsc::channel();
        self.watchers.lock().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    use super::*;
    use crate::message::TemperatureMessage;

    fn temperature(timestamp: u64) -> Message {
        Message::Temperature(TemperatureMessage {
            timestamp,
            temperature: 21.0,
        })
    }

    #[test]
    fn subscribing_to_unknown_device_fails() {
        let hub = DeviceHub::new();
        let result = hub.subscribe(
            DeviceId(3),
            MessageKind::Battery,
            Arc::new(|_: &Message| {}),
        );

        match result {
            Err(GraphError::NotConnected(DeviceId(3))) => {}
            other => panic!("expected NotConnected, got {other:?}"),
        }
    }

    #[test]
    fn publish_only_reaches_matching_kind() {
        let hub = DeviceHub::new();
        hub.connect(DeviceId(1), "imu");

        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        hub.subscribe(
            DeviceId(1),
            MessageKind::Temperature,
            Arc::new(move |_: &Message| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();
        hub.subscribe(DeviceId(1), MessageKind::Battery, Arc::new(|_: &Message| {}))
            .unwrap();

        assert_eq!(hub.publish(DeviceId(1), &temperature(1)), 1);
        assert_eq!(hub.publish(DeviceId(2), &temperature(2)), 0);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(hub.subscription_count(), 2);
    }

    #[test]
    fn disconnect_drops_registrations_and_notifies() {
        let hub = DeviceHub::new();
        let events = hub.watch();

        hub.connect(DeviceId(1), "imu");
        let id = hub
            .subscribe(DeviceId(1), MessageKind::Temperature, Arc::new(|_: &Message| {}))
            .unwrap();
        hub.disconnect(DeviceId(1));

        assert_eq!(hub.subscription_count(), 0);
        // unsubscribing after the device went away is a no-op
        hub.unsubscribe(id);

        let received: Vec<DeviceEvent> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                DeviceEvent::Connected(DeviceInfo {
                    id: DeviceId(1),
                    name: "imu".into()
                }),
                DeviceEvent::Disconnected(DeviceId(1)),
            ]
        );
    }
}
