use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use crate::device::{DeviceHub, DeviceId};
use crate::message::{
    BatteryMessage, EulerAnglesMessage, InertialMessage, Message, QuaternionMessage, RssiMessage,
    TemperatureMessage, Vector3Message,
};

/// Rate of the slow housekeeping messages (temperature, battery, RSSI).
const HOUSEKEEPING_RATE: f64 = 5.0;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Status {
    Initializing,
    Streaming,
    Paused,
    Terminated,
}

#[derive(Debug, Clone)]
pub enum Notification {
    NewStatus(Status),
    Error(String),
}

#[derive(Debug)]
enum ThreadCommand {
    Pause,
    Resume,
    Stop,
}

/// A fake device that streams every message kind from its own delivery thread.
pub struct SimulatedDevice {
    id: DeviceId,
    join_handle: thread::JoinHandle<()>,
    command_tx: mpsc::Sender<ThreadCommand>,
    notifications_rx: mpsc::Receiver<Notification>,
}

impl SimulatedDevice {
    /// Connect `id` to `hub` and start publishing at `rate` Hz.
    pub fn start(hub: Arc<DeviceHub>, id: DeviceId, name: &str, rate: f64) -> SimulatedDevice {
        let (command_tx, command_rx) = mpsc::channel();
        let (notifications_tx, notifications_rx) = mpsc::channel();

        hub.connect(id, name);

        let join_handle = thread::spawn(move || {
            let result = device_thread(&hub, id, rate, command_rx, notifications_tx.clone());

            if let Err(err) = result {
                log::error!("{} thread returned with error {:?}", id, err);

                // at this point nobody may be listening anymore, so send errors are only logged
                if let Err(e) = notifications_tx.send(Notification::Error(format!("{:?}", err))) {
                    log::error!("error notification send failed: {:?}", e);
                }
                if let Err(e) = notifications_tx.send(Notification::NewStatus(Status::Terminated)) {
                    log::error!("new status notification send failed: {:?}", e);
                }
            }

            hub.disconnect(id);
        });

        SimulatedDevice {
            id,
            join_handle,
            command_tx,
            notifications_rx,
        }
    }

    pub fn id(&self) -> DeviceId {
        self.id
    }

    pub fn notification_channel(&self) -> &mpsc::Receiver<Notification> {
        &self.notifications_rx
    }

    pub fn pause(&self) {
        if let Err(err) = self.command_tx.send(ThreadCommand::Pause) {
            log::error!("failed to send pause command: {:?}", err);
        }
    }

    pub fn resume(&self) {
        if let Err(err) = self.command_tx.send(ThreadCommand::Resume) {
            log::error!("failed to send resume command: {:?}", err);
        }
    }

    /// Stop streaming, disconnect from the hub and join the thread.
    pub fn stop(self) {
        if let Err(err) = self.command_tx.send(ThreadCommand::Stop) {
            log::debug!(
                "asked to stop {} but thread seems to already be dead (command send failed: {:?})",
                self.id,
                err
            );
        }

        if let Err(err) = self.join_handle.join() {
            log::warn!("failed to join {} thread: {:?}", self.id, err);
        }
    }
}

fn device_thread(
    hub: &DeviceHub,
    id: DeviceId,
    rate: f64,
    command_rx: mpsc::Receiver<ThreadCommand>,
    notifications_tx: mpsc::Sender<Notification>,
) -> anyhow::Result<()> {
    if !(rate.is_finite() && rate > 0.0) {
        anyhow::bail!("invalid streaming rate {rate}");
    }

    let period = Duration::from_secs_f64(1.0 / rate);
    let housekeeping_every = ((rate / HOUSEKEEPING_RATE).round() as u64).max(1);
    // spread devices apart so their traces are distinguishable
    let phase = id.0 as f64 * 0.7;

    let mut status = Status::Initializing;
    let mut last_sent_at = Instant::now();
    let mut tick: u64 = 0;

    loop {
        let mut maybe_new_status = None;

        match status {
            Status::Initializing => {
                maybe_new_status = Some(Status::Streaming);
                last_sent_at = Instant::now();
            }
            Status::Streaming => match command_rx.try_recv() {
                Ok(ThreadCommand::Stop) => maybe_new_status = Some(Status::Terminated),
                Ok(ThreadCommand::Pause) => maybe_new_status = Some(Status::Paused),
                Ok(other) => log::warn!("unexpected command in streaming state: {:?}", other),
                Err(mpsc::TryRecvError::Empty) => {
                    let elapsed = last_sent_at.elapsed();
                    if elapsed < period {
                        thread::sleep(period - elapsed);
                    }
                    last_sent_at += period;

                    let timestamp = (tick as f64 * period.as_secs_f64() * 1e6) as u64;
                    let t = timestamp as f64 * 1e-6 + phase;

                    for message in motion_messages(timestamp, t) {
                        hub.publish(id, &message);
                    }
                    if tick % housekeeping_every == 0 {
                        for message in housekeeping_messages(timestamp, t) {
                            hub.publish(id, &message);
                        }
                    }

                    tick += 1;
                }
                Err(mpsc::TryRecvError::Disconnected) => {
                    anyhow::bail!("command channel closed TX end")
                }
            },
            Status::Paused => match command_rx.recv() {
                Ok(ThreadCommand::Stop) => maybe_new_status = Some(Status::Terminated),
                Ok(ThreadCommand::Resume) => {
                    maybe_new_status = Some(Status::Streaming);
                    last_sent_at = Instant::now();
                }
                Ok(other) => log::warn!("unexpected command in paused state: {:?}", other),
                Err(err) => anyhow::bail!("closed TX end of command channel ({})", err),
            },
            Status::Terminated => break,
        }

        match maybe_new_status {
            Some(new_status) if new_status != status => {
                // the owner may have dropped the receiver, which is fine
                let _ = notifications_tx.send(Notification::NewStatus(new_status));
                status = new_status;
            }
            _ => {}
        }
    }

    Ok(())
}

fn motion_messages(timestamp: u64, t: f64) -> [Message; 7] {
    let (roll, pitch, yaw) = (
        30.0 * (0.5 * t).sin(),
        15.0 * (0.3 * t).cos(),
        180.0 * (0.1 * t).sin(),
    );
    let (half_roll, half_pitch, half_yaw) = (
        roll.to_radians() / 2.0,
        pitch.to_radians() / 2.0,
        yaw.to_radians() / 2.0,
    );
    let (sr, cr) = half_roll.sin_cos();
    let (sp, cp) = half_pitch.sin_cos();
    let (sy, cy) = half_yaw.sin_cos();

    let accel = [
        0.2 * (2.0 * t).sin(),
        0.2 * (2.0 * t).cos(),
        1.0 + 0.05 * (5.0 * t).sin(),
    ];
    let vector = |x: f64, y: f64, z: f64| Vector3Message {
        timestamp,
        x: x as f32,
        y: y as f32,
        z: z as f32,
    };

    [
        Message::Inertial(InertialMessage {
            timestamp,
            gyroscope: [
                (15.0 * (0.5 * t).cos()) as f32,
                (4.5 * (0.3 * t).sin()) as f32,
                (18.0 * (0.1 * t).cos()) as f32,
            ],
            accelerometer: accel.map(|a| a as f32),
        }),
        Message::Magnetometer(vector(
            (0.3 * t).cos() * 0.5,
            (0.3 * t).sin() * 0.5,
            -0.4,
        )),
        Message::Quaternion(QuaternionMessage {
            timestamp,
            w: (cr * cp * cy + sr * sp * sy) as f32,
            x: (sr * cp * cy - cr * sp * sy) as f32,
            y: (cr * sp * cy + sr * cp * sy) as f32,
            z: (cr * cp * sy - sr * sp * cy) as f32,
        }),
        Message::EulerAngles(EulerAnglesMessage {
            timestamp,
            roll: roll as f32,
            pitch: pitch as f32,
            yaw: yaw as f32,
        }),
        Message::LinearAcceleration(vector(accel[0], accel[1], accel[2] - 1.0)),
        Message::EarthAcceleration(vector(accel[1], accel[0], accel[2] - 1.0)),
        Message::HighGAccelerometer(vector(accel[0] * 4.0, accel[1] * 4.0, accel[2])),
    ]
}

fn housekeeping_messages(timestamp: u64, t: f64) -> [Message; 3] {
    // a slow discharge that wraps around so long runs keep moving
    let percentage = 100.0 - (t * 0.5) % 100.0;

    [
        Message::Temperature(TemperatureMessage {
            timestamp,
            temperature: (25.0 + 2.0 * (0.05 * t).sin()) as f32,
        }),
        Message::Battery(BatteryMessage {
            timestamp,
            percentage: percentage as f32,
            voltage: (3.3 + 0.9 * percentage / 100.0) as f32,
            charging_status: 0.0,
        }),
        Message::Rssi(RssiMessage {
            timestamp,
            percentage: (70.0 + 10.0 * (0.2 * t).sin()) as f32,
            power: (-55.0 + 5.0 * (0.2 * t).sin()) as f32,
        }),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::device::Transport;
    use crate::message::MessageKind;

    #[test]
    fn streams_until_stopped_then_disconnects() {
        let hub = Arc::new(DeviceHub::new());
        let device = SimulatedDevice::start(hub.clone(), DeviceId(9), "sim", 500.0);

        let received = Arc::new(AtomicUsize::new(0));
        let counter = received.clone();
        hub.subscribe(
            DeviceId(9),
            MessageKind::Inertial,
            Arc::new(move |_: &Message| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(100));
        device.stop();

        assert!(received.load(Ordering::SeqCst) > 0);
        assert!(!hub.is_connected(DeviceId(9)));
        assert_eq!(hub.subscription_count(), 0);
    }

    #[test]
    fn invalid_rate_terminates_with_error() {
        let hub = Arc::new(DeviceHub::new());
        let device = SimulatedDevice::start(hub.clone(), DeviceId(1), "broken", 0.0);

        let notification = device
            .notification_channel()
            .recv_timeout(Duration::from_secs(1))
            .expect("error notification");
        assert!(matches!(notification, Notification::Error(_)));

        device.stop();
        assert!(!hub.is_connected(DeviceId(1)));
    }
}
