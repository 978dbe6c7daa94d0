//! Real-time telemetry graph windows.
//!
//! Devices push typed messages through a [`device::Transport`]; every open
//! graph window keeps one ring buffer per attached device and, once per
//! display refresh, turns the visible part of those buffers into line
//! strips for a [`render::Renderer`].

pub mod autoscale;
pub mod buffer;
pub mod device;
pub mod engine;
pub mod error;
pub mod export;
pub mod frame;
pub mod layout;
pub mod message;
pub mod metric;
pub mod painter;
pub mod parsable;
pub mod render;
pub mod sample;
pub mod settings;
pub mod stream;
pub mod utils;
pub mod view;
pub mod window;

pub use engine::{EngineConfig, EngineState, GraphEngine};
pub use error::{GraphError, Result};
pub use metric::{GraphKind, Metric};
pub use settings::{GraphSettings, SharedSettings};
pub use window::{open_graph, GraphView, GraphWindow};
