//! Sample-shape descriptors.
//!
//! A [`Metric`] says which message kind a graph listens to and how to turn one
//! such message into a [`Sample`]; the rest of the graph machinery is generic
//! over it, so every graph type is a handful of constants.

use crate::message::{Message, MessageKind};
use crate::sample::Sample;
use crate::settings::GraphSettings;
use crate::view::Range;

pub trait Metric: Send + Sync + 'static {
    const KIND: MessageKind;
    const NAME: &'static str;
    const UNITS: &'static str;
    /// Labels of the plotted fields, in sample order.
    const FIELDS: &'static [&'static str];
    const DEFAULT_RANGE: (f64, f64);
    /// Typical message rate in Hz, used to size buffers.
    const EXPECTED_RATE: f64;

    /// `None` if `message` is not of [`Metric::KIND`].
    fn decode(message: &Message) -> Option<Sample>;

    fn default_settings() -> GraphSettings {
        let (min, max) = Self::DEFAULT_RANGE;
        GraphSettings::for_fields(Self::FIELDS, Self::UNITS, Range::new(min, max))
    }
}

macro_rules! metric {
    (
        $(#[$meta:meta])*
        $name:ident: $variant:ident, $title:expr, $units:expr,
        fields [$($field:expr),+], range ($min:expr, $max:expr), rate $rate:expr,
        |$message:ident| $values:expr
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name;

        impl Metric for $name {
            const KIND: MessageKind = MessageKind::$variant;
            const NAME: &'static str = $title;
            const UNITS: &'static str = $units;
            const FIELDS: &'static [&'static str] = &[$($field),+];
            const DEFAULT_RANGE: (f64, f64) = ($min, $max);
            const EXPECTED_RATE: f64 = $rate;

            fn decode(message: &Message) -> Option<Sample> {
                match message {
                    Message::$variant($message) => {
                        let values: &[f32] = &$values;
                        let mut fields = [0.0; crate::sample::MAX_FIELDS];
                        for (field, value) in fields.iter_mut().zip(values) {
                            *field = *value as f64;
                        }
                        Some(Sample::new(
                            $message.timestamp,
                            &fields[..values.len().min(crate::sample::MAX_FIELDS)],
                        ))
                    }
                    _ => None,
                }
            }
        }
    };
}

metric! {
    Gyroscope: Inertial, "Gyroscope", "°/s",
    fields ["X", "Y", "Z"], range (-250.0, 250.0), rate 400.0,
    |m| m.gyroscope
}

metric! {
    Accelerometer: Inertial, "Accelerometer", "g",
    fields ["X", "Y", "Z"], range (-2.0, 2.0), rate 400.0,
    |m| m.accelerometer
}

metric! {
    Magnetometer: Magnetometer, "Magnetometer", "a.u.",
    fields ["X", "Y", "Z"], range (-1.0, 1.0), rate 100.0,
    |m| [m.x, m.y, m.z]
}

metric! {
    Quaternion: Quaternion, "Quaternion", "",
    fields ["W", "X", "Y", "Z"], range (-1.0, 1.0), rate 400.0,
    |m| [m.w, m.x, m.y, m.z]
}

metric! {
    EulerAngles: EulerAngles, "Euler Angles", "°",
    fields ["Roll", "Pitch", "Yaw"], range (-180.0, 180.0), rate 400.0,
    |m| [m.roll, m.pitch, m.yaw]
}

metric! {
    LinearAcceleration: LinearAcceleration, "Linear Acceleration", "g",
    fields ["X", "Y", "Z"], range (-2.0, 2.0), rate 400.0,
    |m| [m.x, m.y, m.z]
}

metric! {
    EarthAcceleration: EarthAcceleration, "Earth Acceleration", "g",
    fields ["X", "Y", "Z"], range (-2.0, 2.0), rate 400.0,
    |m| [m.x, m.y, m.z]
}

metric! {
    HighGAccelerometer: HighGAccelerometer, "High-g Accelerometer", "g",
    fields ["X", "Y", "Z"], range (-16.0, 16.0), rate 400.0,
    |m| [m.x, m.y, m.z]
}

metric! {
    Temperature: Temperature, "Temperature", "°C",
    fields ["Temperature"], range (0.0, 50.0), rate 5.0,
    |m| [m.temperature]
}

metric! {
    BatteryPercentage: Battery, "Battery Percentage", "%",
    fields ["Percentage"], range (0.0, 100.0), rate 5.0,
    |m| [m.percentage]
}

metric! {
    /// Battery voltage, the scalar metric most windows are modelled after.
    BatteryVoltage: Battery, "Battery Voltage", "V",
    fields ["Voltage"], range (3.0, 4.5), rate 5.0,
    |m| [m.voltage]
}

metric! {
    RssiPercentage: Rssi, "RSSI Percentage", "%",
    fields ["Percentage"], range (0.0, 100.0), rate 5.0,
    |m| [m.percentage]
}

metric! {
    RssiPower: Rssi, "RSSI Power", "dBm",
    fields ["Power"], range (-100.0, 0.0), rate 5.0,
    |m| [m.power]
}

/// Every graph type the application can open.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum GraphKind {
    Gyroscope,
    Accelerometer,
    Magnetometer,
    Quaternion,
    EulerAngles,
    LinearAcceleration,
    EarthAcceleration,
    HighGAccelerometer,
    Temperature,
    BatteryPercentage,
    BatteryVoltage,
    RssiPercentage,
    RssiPower,
}

impl GraphKind {
    pub const ALL: [GraphKind; 13] = [
        GraphKind::Gyroscope,
        GraphKind::Accelerometer,
        GraphKind::Magnetometer,
        GraphKind::Quaternion,
        GraphKind::EulerAngles,
        GraphKind::LinearAcceleration,
        GraphKind::EarthAcceleration,
        GraphKind::HighGAccelerometer,
        GraphKind::Temperature,
        GraphKind::BatteryPercentage,
        GraphKind::BatteryVoltage,
        GraphKind::RssiPercentage,
        GraphKind::RssiPower,
    ];

    pub fn title(self) -> &'static str {
        match self {
            GraphKind::Gyroscope => Gyroscope::NAME,
            GraphKind::Accelerometer => Accelerometer::NAME,
            GraphKind::Magnetometer => Magnetometer::NAME,
            GraphKind::Quaternion => Quaternion::NAME,
            GraphKind::EulerAngles => EulerAngles::NAME,
            GraphKind::LinearAcceleration => LinearAcceleration::NAME,
            GraphKind::EarthAcceleration => EarthAcceleration::NAME,
            GraphKind::HighGAccelerometer => HighGAccelerometer::NAME,
            GraphKind::Temperature => Temperature::NAME,
            GraphKind::BatteryPercentage => BatteryPercentage::NAME,
            GraphKind::BatteryVoltage => BatteryVoltage::NAME,
            GraphKind::RssiPercentage => RssiPercentage::NAME,
            GraphKind::RssiPower => RssiPower::NAME,
        }
    }
}
