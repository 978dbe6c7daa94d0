//! Decoded device messages, as delivered by the transport layer.
//!
//! Decoding raw bytes into these types happens upstream; the graph core only
//! relies on the shapes below. All timestamps are device-clock microseconds.

use std::fmt;

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum MessageKind {
    Inertial,
    Magnetometer,
    Quaternion,
    EulerAngles,
    LinearAcceleration,
    EarthAcceleration,
    HighGAccelerometer,
    Temperature,
    Battery,
    Rssi,
}

impl MessageKind {
    pub const ALL: [MessageKind; 10] = [
        MessageKind::Inertial,
        MessageKind::Magnetometer,
        MessageKind::Quaternion,
        MessageKind::EulerAngles,
        MessageKind::LinearAcceleration,
        MessageKind::EarthAcceleration,
        MessageKind::HighGAccelerometer,
        MessageKind::Temperature,
        MessageKind::Battery,
        MessageKind::Rssi,
    ];
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InertialMessage {
    pub timestamp: u64,
    pub gyroscope: [f32; 3],
    pub accelerometer: [f32; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector3Message {
    pub timestamp: u64,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuaternionMessage {
    pub timestamp: u64,
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EulerAnglesMessage {
    pub timestamp: u64,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TemperatureMessage {
    pub timestamp: u64,
    pub temperature: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatteryMessage {
    pub timestamp: u64,
    pub percentage: f32,
    pub voltage: f32,
    pub charging_status: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RssiMessage {
    pub timestamp: u64,
    pub percentage: f32,
    pub power: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Inertial(InertialMessage),
    Magnetometer(Vector3Message),
    Quaternion(QuaternionMessage),
    EulerAngles(EulerAnglesMessage),
    LinearAcceleration(Vector3Message),
    EarthAcceleration(Vector3Message),
    HighGAccelerometer(Vector3Message),
    Temperature(TemperatureMessage),
    Battery(BatteryMessage),
    Rssi(RssiMessage),
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Inertial(_) => MessageKind::Inertial,
            Message::Magnetometer(_) => MessageKind::Magnetometer,
            Message::Quaternion(_) => MessageKind::Quaternion,
            Message::EulerAngles(_) => MessageKind::EulerAngles,
            Message::LinearAcceleration(_) => MessageKind::LinearAcceleration,
            Message::EarthAcceleration(_) => MessageKind::EarthAcceleration,
            Message::HighGAccelerometer(_) => MessageKind::HighGAccelerometer,
            Message::Temperature(_) => MessageKind::Temperature,
            Message::Battery(_) => MessageKind::Battery,
            Message::Rssi(_) => MessageKind::Rssi,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Message::Inertial(m) => m.timestamp,
            Message::Magnetometer(m)
            | Message::LinearAcceleration(m)
            | Message::EarthAcceleration(m)
            | Message::HighGAccelerometer(m) => m.timestamp,
            Message::Quaternion(m) => m.timestamp,
            Message::EulerAngles(m) => m.timestamp,
            Message::Temperature(m) => m.timestamp,
            Message::Battery(m) => m.timestamp,
            Message::Rssi(m) => m.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_and_timestamp_follow_the_variant() {
        let message = Message::Battery(BatteryMessage {
            timestamp: 42,
            percentage: 80.0,
            voltage: 3.9,
            charging_status: 0.0,
        });

        assert_eq!(message.kind(), MessageKind::Battery);
        assert_eq!(message.timestamp(), 42);

        let message = Message::EarthAcceleration(Vector3Message {
            timestamp: 7,
            x: 0.0,
            y: 0.0,
            z: 1.0,
        });
        assert_eq!(message.kind(), MessageKind::EarthAcceleration);
        assert_eq!(message.timestamp(), 7);
    }
}
