//! Graph settings shared between the UI controls and the render path.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::layout::LayoutNode;
use crate::view::Range;

/// Name of the layout child holding the settings subtree.
pub const SETTINGS_NODE: &str = "GraphSettings";

const MIN_TIME_WINDOW: f64 = 0.1;
const MAX_TIME_WINDOW: f64 = 600.0;
const MIN_CAPACITY: usize = 16;
const MAX_CAPACITY: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Color {
        Color { r, g, b }
    }

    pub const RED: Color = Color::rgb(0xE7, 0x4C, 0x3C);
    pub const GREEN: Color = Color::rgb(0x2E, 0xCC, 0x71);
    pub const BLUE: Color = Color::rgb(0x34, 0x98, 0xDB);
    pub const YELLOW: Color = Color::rgb(0xF1, 0xC4, 0x0F);
    pub const WHITE: Color = Color::rgb(0xEC, 0xF0, 0xF1);

    /// Default per-field colors: X/Y/Z in red/green/blue, a leading W in white.
    pub fn palette(fields: usize) -> Vec<Color> {
        match fields {
            1 => vec![Color::YELLOW],
            4 => vec![Color::WHITE, Color::RED, Color::GREEN, Color::BLUE],
            n => [Color::RED, Color::GREEN, Color::BLUE, Color::YELLOW]
                .into_iter()
                .cycle()
                .take(n)
                .collect(),
        }
    }

    pub fn to_rgba_f32(self) -> [f32; 4] {
        [
            self.r as f32 / 255.0,
            self.g as f32 / 255.0,
            self.b as f32 / 255.0,
            1.0,
        ]
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseColorError(String);

impl fmt::Display for ParseColorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid color {:?}, expected #rrggbb", self.0)
    }
}

impl std::error::Error for ParseColorError {}

impl FromStr for Color {
    type Err = ParseColorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || ParseColorError(s.to_owned());

        let hex = s.strip_prefix('#').ok_or_else(error)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(error());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| error());

        Ok(Color::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

impl Serialize for Color {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Color {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Axis, scaling and styling of one graph window, indexed per field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSettings {
    pub time_window_seconds: f64,
    pub autoscale: bool,
    pub range_min: f64,
    pub range_max: f64,
    /// Time without out-of-range data before an autoscaled axis may shrink.
    pub autoscale_decay_seconds: f64,
    /// Symmetric margin around the observed extent, as a fraction of its span.
    pub autoscale_margin: f64,
    pub trace_labels: Vec<String>,
    pub trace_colors: Vec<Color>,
    pub trace_visible: Vec<bool>,
    pub units: String,
}

impl GraphSettings {
    pub fn for_fields(fields: &[&str], units: &str, range: Range) -> GraphSettings {
        GraphSettings {
            time_window_seconds: 5.0,
            autoscale: true,
            range_min: range.min,
            range_max: range.max,
            autoscale_decay_seconds: 2.0,
            autoscale_margin: 0.05,
            trace_labels: fields.iter().map(|field| field.to_string()).collect(),
            trace_colors: Color::palette(fields.len()),
            trace_visible: vec![true; fields.len()],
            units: units.to_owned(),
        }
    }

    pub fn field_count(&self) -> usize {
        self.trace_labels.len()
    }

    pub fn manual_range(&self) -> Range {
        Range::new(self.range_min, self.range_max)
    }

    pub fn time_window(&self) -> Duration {
        Duration::from_secs_f64(self.time_window_seconds)
    }

    /// Time window in device-clock microseconds.
    pub fn time_window_micros(&self) -> u64 {
        (self.time_window_seconds * 1e6) as u64
    }

    pub fn autoscale_decay(&self) -> Duration {
        Duration::from_secs_f64(self.autoscale_decay_seconds)
    }

    pub fn trace_color(&self, field: usize) -> Color {
        self.trace_colors
            .get(field)
            .copied()
            .unwrap_or(Color::WHITE)
    }

    pub fn is_trace_visible(&self, field: usize) -> bool {
        self.trace_visible.get(field).copied().unwrap_or(false)
    }

    pub fn trace_label(&self, field: usize) -> &str {
        self.trace_labels
            .get(field)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Entries needed to hold a full time window at `rate` Hz, with `headroom`.
    pub fn buffer_capacity(&self, rate: f64, headroom: f64) -> usize {
        let wanted = (rate * self.time_window_seconds * headroom).ceil();
        if !wanted.is_finite() || wanted <= 0.0 {
            return MIN_CAPACITY;
        }
        (wanted as usize).clamp(MIN_CAPACITY, MAX_CAPACITY)
    }

    /// Clamp values into their valid domain, filling gaps from `defaults`.
    pub fn sanitize(&mut self, defaults: &GraphSettings) {
        if !self.time_window_seconds.is_finite() {
            self.time_window_seconds = defaults.time_window_seconds;
        }
        self.time_window_seconds = self
            .time_window_seconds
            .clamp(MIN_TIME_WINDOW, MAX_TIME_WINDOW);

        if !self.range_min.is_finite() || !self.range_max.is_finite() {
            self.range_min = defaults.range_min;
            self.range_max = defaults.range_max;
        }
        if self.range_min > self.range_max {
            std::mem::swap(&mut self.range_min, &mut self.range_max);
        }

        if !(self.autoscale_decay_seconds.is_finite() && self.autoscale_decay_seconds >= 0.0) {
            self.autoscale_decay_seconds = defaults.autoscale_decay_seconds;
        }
        if !self.autoscale_margin.is_finite() {
            self.autoscale_margin = defaults.autoscale_margin;
        }
        self.autoscale_margin = self.autoscale_margin.clamp(0.0, 1.0);

        let fields = defaults.field_count();
        self.trace_labels.truncate(fields);
        let labelled = self.trace_labels.len();
        self.trace_labels
            .extend(defaults.trace_labels[labelled..].iter().cloned());
        self.trace_colors.truncate(fields);
        let filled = self.trace_colors.len();
        self.trace_colors
            .extend((filled..fields).map(|field| defaults.trace_color(field)));
        self.trace_visible.resize(fields, true);
    }

    /// Read the settings subtree of `node`, overlaying recognised keys on `defaults`.
    ///
    /// Keys whose value does not fit are skipped with a warning, unknown keys ignored.
    pub fn restore(node: &LayoutNode, defaults: &GraphSettings) -> GraphSettings {
        let Some(Value::Object(stored)) = node.child(SETTINGS_NODE) else {
            return defaults.clone();
        };
        let mut merged = match serde_json::to_value(defaults) {
            Ok(Value::Object(map)) => map,
            _ => return defaults.clone(),
        };

        for (key, value) in stored {
            if !merged.contains_key(key) {
                log::debug!("ignoring unknown settings key {:?}", key);
                continue;
            }

            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value.clone());
            match serde_json::from_value::<GraphSettings>(Value::Object(candidate.clone())) {
                Ok(_) => merged = candidate,
                Err(err) => log::warn!("ignoring settings key {:?}: {}", key, err),
            }
        }

        match serde_json::from_value::<GraphSettings>(Value::Object(merged)) {
            Ok(mut settings) => {
                settings.sanitize(defaults);
                settings
            }
            Err(err) => {
                log::warn!("falling back to default settings: {}", err);
                defaults.clone()
            }
        }
    }

    /// Write this value as the settings subtree of `node`.
    pub fn store(&self, node: &mut LayoutNode) -> crate::error::Result<()> {
        node.set_child(SETTINGS_NODE, serde_json::to_value(self)?);
        Ok(())
    }
}

/// Settings shared between the UI (single writer) and the render path (reader).
///
/// Readers take a full copy under the lock, so a frame never mixes two versions.
#[derive(Clone)]
pub struct SharedSettings {
    current: Arc<RwLock<GraphSettings>>,
    defaults: Arc<GraphSettings>,
}

impl SharedSettings {
    pub fn new(mut settings: GraphSettings, defaults: GraphSettings) -> SharedSettings {
        settings.sanitize(&defaults);
        SharedSettings {
            current: Arc::new(RwLock::new(settings)),
            defaults: Arc::new(defaults),
        }
    }

    pub fn snapshot(&self) -> GraphSettings {
        self.current.read().clone()
    }

    pub fn defaults(&self) -> &GraphSettings {
        &self.defaults
    }

    /// Apply `change` and re-validate; the closure runs under the write lock.
    pub fn update<F: FnOnce(&mut GraphSettings)>(&self, change: F) {
        let mut current = self.current.write();
        change(&mut current);
        current.sanitize(&self.defaults);
    }

    pub fn replace(&self, settings: GraphSettings) {
        self.update(|current| *current = settings);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn defaults() -> GraphSettings {
        GraphSettings::for_fields(&["X", "Y", "Z"], "g", Range::new(-2.0, 2.0))
    }

    #[test]
    fn color_hex_roundtrip() {
        let color: Color = "#1a2B3c".parse().unwrap();
        assert_eq!(color, Color::rgb(0x1a, 0x2b, 0x3c));
        assert_eq!(color.to_string(), "#1a2b3c");

        assert!("1a2b3c".parse::<Color>().is_err());
        assert!("#1a2b".parse::<Color>().is_err());
        assert!("#zz0000".parse::<Color>().is_err());
    }

    #[test]
    fn serializes_with_layout_keys() {
        let value = serde_json::to_value(defaults()).unwrap();

        for key in [
            "timeWindowSeconds",
            "autoscale",
            "rangeMin",
            "rangeMax",
            "traceColors",
            "traceVisible",
        ] {
            assert!(value.get(key).is_some(), "missing key {key}");
        }
        assert_eq!(value["traceColors"][0], json!("#e74c3c"));
    }

    #[test]
    fn restore_overlays_known_keys() {
        let mut node = LayoutNode::new();
        node.set_child(
            SETTINGS_NODE,
            json!({
                "timeWindowSeconds": 12.5,
                "autoscale": false,
                "rangeMin": 4.0,
                "rangeMax": -4.0,
                "traceColors": ["#ffffff"],
                "traceVisible": [false, true, false, true],
                "somethingElse": 1,
            }),
        );

        let settings = GraphSettings::restore(&node, &defaults());

        assert_eq!(settings.time_window_seconds, 12.5);
        assert!(!settings.autoscale);
        assert_eq!(settings.manual_range(), Range::new(-4.0, 4.0));
        assert_eq!(settings.range_min, -4.0);
        assert_eq!(
            settings.trace_colors,
            vec![Color::rgb(255, 255, 255), Color::GREEN, Color::BLUE]
        );
        assert_eq!(settings.trace_visible, vec![false, true, false]);
    }

    #[test]
    fn restore_skips_malformed_keys() {
        let mut node = LayoutNode::new();
        node.set_child(
            SETTINGS_NODE,
            json!({
                "timeWindowSeconds": "long",
                "traceColors": ["red", "#000000"],
                "autoscale": false,
            }),
        );

        let settings = GraphSettings::restore(&node, &defaults());

        assert_eq!(settings.time_window_seconds, defaults().time_window_seconds);
        assert_eq!(settings.trace_colors, defaults().trace_colors);
        assert!(!settings.autoscale);
    }

    #[test]
    fn store_then_restore_gives_same_settings() {
        let mut settings = defaults();
        settings.time_window_seconds = 30.0;
        settings.trace_visible[1] = false;

        let mut node = LayoutNode::new();
        settings.store(&mut node).unwrap();

        assert_eq!(GraphSettings::restore(&node, &defaults()), settings);
    }

    #[test]
    fn sanitize_clamps_time_window() {
        let shared = SharedSettings::new(defaults(), defaults());

        shared.update(|settings| settings.time_window_seconds = -1.0);
        assert_eq!(shared.snapshot().time_window_seconds, MIN_TIME_WINDOW);

        shared.update(|settings| settings.time_window_seconds = f64::NAN);
        assert_eq!(shared.snapshot().time_window_seconds, 5.0);
    }

    #[test]
    fn capacity_follows_rate_and_window() {
        let settings = defaults();

        assert_eq!(settings.buffer_capacity(400.0, 1.5), 3000);
        assert_eq!(settings.buffer_capacity(0.1, 1.5), MIN_CAPACITY);
        assert_eq!(settings.buffer_capacity(1e9, 1.5), MAX_CAPACITY);
    }
}
