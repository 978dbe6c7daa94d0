//! Graph windows as seen by the application shell.
//!
//! A [`GraphWindow`] ties one [`GraphEngine`] to the device panel, a renderer
//! and its persisted layout node. [`open_graph`] builds one for any
//! [`GraphKind`] behind the object-safe [`GraphView`] trait, so the shell can
//! keep windows of different metrics in one list.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Instant;

use crate::device::{DeviceEvent, DeviceId, DevicePanel, Transport};
use crate::engine::{EngineConfig, EngineState, GraphEngine};
use crate::error::{GraphError, Result};
use crate::export::Recording;
use crate::frame::{Frame, TraceId};
use crate::layout::LayoutNode;
use crate::metric::{self, GraphKind, Metric};
use crate::render::{self, Renderer};
use crate::settings::{GraphSettings, SharedSettings};

pub trait GraphView<R: Renderer> {
    fn title(&self) -> &'static str;

    fn fields(&self) -> &'static [&'static str];

    fn settings(&self) -> &SharedSettings;

    fn state(&self) -> EngineState;

    fn devices(&self) -> Vec<DeviceId>;

    /// Apply pending device connects/disconnects.
    fn poll_devices(&mut self);

    /// Poll devices, build the frame for `now` and hand it to the renderer.
    fn on_frame(&mut self, now: Instant) -> Frame;

    fn renderer(&self) -> &R;

    fn renderer_mut(&mut self) -> &mut R;

    fn set_trace_enabled(&self, trace: TraceId, enabled: bool);

    fn is_trace_enabled(&self, trace: TraceId) -> bool;

    fn export(&self) -> Recording;

    fn memory_footprint(&self) -> (usize, usize);

    /// Close the engine and write the settings into the layout node.
    fn close(&mut self) -> Result<()>;

    fn layout(&self) -> &LayoutNode;

    /// Oldest error of a device teardown that has not been reported yet.
    fn take_error(&mut self) -> Option<GraphError>;
}

pub struct GraphWindow<M: Metric, R: Renderer> {
    engine: GraphEngine<M>,
    events: mpsc::Receiver<DeviceEvent>,
    renderer: R,
    layout: LayoutNode,
    errors: VecDeque<GraphError>,
    closed: bool,
}

impl<M: Metric, R: Renderer> GraphWindow<M, R> {
    /// Restore settings from `layout` and attach every device `panel` currently lists.
    pub fn new(
        layout: LayoutNode,
        panel: &dyn DevicePanel,
        transport: Arc<dyn Transport>,
        renderer: R,
        config: EngineConfig,
    ) -> GraphWindow<M, R> {
        let defaults = M::default_settings();
        let settings = GraphSettings::restore(&layout, &defaults);
        let engine = GraphEngine::new(transport, SharedSettings::new(settings, defaults), config);

        // watch before listing, a device connecting in between shows up in both
        let events = panel.watch();

        let window = GraphWindow {
            engine,
            events,
            renderer,
            layout,
            errors: VecDeque::new(),
            closed: false,
        };
        for info in panel.devices() {
            window.attach(info.id);
        }
        log::info!(
            "opened {} graph with {} device(s)",
            M::NAME,
            window.engine.devices().len()
        );

        window
    }

    pub fn engine(&self) -> &GraphEngine<M> {
        &self.engine
    }

    fn attach(&self, device: DeviceId) {
        match self.engine.add_device(device) {
            Ok(()) => {}
            Err(err @ GraphError::NotConnected(_)) => log::warn!("skipping trace: {}", err),
            Err(err) => log::error!("can't add {} to {} graph: {}", device, M::NAME, err),
        }
    }

    fn detach(&mut self, device: DeviceId) {
        if let Err(err) = self.engine.remove_device(device) {
            self.errors.push_back(err);
        }
    }
}

impl<M: Metric, R: Renderer> GraphView<R> for GraphWindow<M, R> {
    fn title(&self) -> &'static str {
        M::NAME
    }

    fn fields(&self) -> &'static [&'static str] {
        M::FIELDS
    }

    fn settings(&self) -> &SharedSettings {
        self.engine.settings()
    }

    fn state(&self) -> EngineState {
        self.engine.state()
    }

    fn devices(&self) -> Vec<DeviceId> {
        self.engine.devices()
    }

    fn poll_devices(&mut self) {
        if self.closed {
            return;
        }
        while let Ok(event) = self.events.try_recv() {
            match event {
                DeviceEvent::Connected(info) => {
                    log::debug!("{} ({}) connected", info.id, info.name);
                    self.attach(info.id);
                }
                DeviceEvent::Disconnected(device) => {
                    log::debug!("{} disconnected", device);
                    self.detach(device);
                }
            }
        }
    }

    fn on_frame(&mut self, now: Instant) -> Frame {
        self.poll_devices();
        let frame = self.engine.on_frame(now);
        render::dispatch(&frame, &mut self.renderer);
        frame
    }

    fn renderer(&self) -> &R {
        &self.renderer
    }

    fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    fn set_trace_enabled(&self, trace: TraceId, enabled: bool) {
        self.engine.set_trace_enabled(trace, enabled);
    }

    fn is_trace_enabled(&self, trace: TraceId) -> bool {
        self.engine.is_trace_enabled(trace)
    }

    fn export(&self) -> Recording {
        self.engine.export_snapshot()
    }

    fn memory_footprint(&self) -> (usize, usize) {
        self.engine.memory_footprint()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let closed = self.engine.close();
        let stored = self.engine.settings().snapshot().store(&mut self.layout);
        closed.and(stored)
    }

    fn layout(&self) -> &LayoutNode {
        &self.layout
    }

    fn take_error(&mut self) -> Option<GraphError> {
        self.errors.pop_front()
    }
}

impl<M: Metric, R: Renderer> Drop for GraphWindow<M, R> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("while closing {} graph: {}", M::NAME, err);
        }
    }
}

/// Open a window for `kind`, rendering into `renderer`.
pub fn open_graph<R: Renderer + 'static>(
    kind: GraphKind,
    layout: LayoutNode,
    panel: &dyn DevicePanel,
    transport: Arc<dyn Transport>,
    renderer: R,
    config: EngineConfig,
) -> Box<dyn GraphView<R>> {
    macro_rules! open {
        ($metric:ty) => {
            Box::new(GraphWindow::<$metric, R>::new(
                layout, panel, transport, renderer, config,
            )) as Box<dyn GraphView<R>>
        };
    }

    match kind {
        GraphKind::Gyroscope => open!(metric::Gyroscope),
        GraphKind::Accelerometer => open!(metric::Accelerometer),
        GraphKind::Magnetometer => open!(metric::Magnetometer),
        GraphKind::Quaternion => open!(metric::Quaternion),
        GraphKind::EulerAngles => open!(metric::EulerAngles),
        GraphKind::LinearAcceleration => open!(metric::LinearAcceleration),
        GraphKind::EarthAcceleration => open!(metric::EarthAcceleration),
        GraphKind::HighGAccelerometer => open!(metric::HighGAccelerometer),
        GraphKind::Temperature => open!(metric::Temperature),
        GraphKind::BatteryPercentage => open!(metric::BatteryPercentage),
        GraphKind::BatteryVoltage => open!(metric::BatteryVoltage),
        GraphKind::RssiPercentage => open!(metric::RssiPercentage),
        GraphKind::RssiPower => open!(metric::RssiPower),
    }
}
