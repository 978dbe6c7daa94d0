//! The per-window graph engine.
//!
//! A [`GraphEngine`] owns one ring buffer and one subscription per attached
//! device. Delivery threads only ever touch their own device's buffer; the
//! render thread reads every buffer once per frame with a bounded wait and
//! skips devices it cannot read in time.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::autoscale::Autoscaler;
use crate::buffer::{Pushed, RingBuffer};
use crate::device::{DeviceId, Transport};
use crate::error::{GraphError, Result};
use crate::export::Recording;
use crate::frame::{self, DeviceSamples, Frame, TraceId};
use crate::metric::Metric;
use crate::sample::Sample;
use crate::settings::SharedSettings;
use crate::stream::{SampleStream, Subscription};
use crate::utils::Throttle;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long unsubscribe waits for in-flight callbacks before reporting `Shutdown`.
    pub drain_timeout: Duration,
    /// Longest the render thread waits for one buffer before skipping it.
    pub snapshot_timeout: Duration,
    pub contention_log_interval: Duration,
    /// Buffer capacity multiplier over rate × time window.
    pub capacity_headroom: f64,
    pub max_vertices_per_trace: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            drain_timeout: Duration::from_millis(500),
            snapshot_timeout: Duration::from_millis(2),
            contention_log_interval: Duration::from_secs(5),
            capacity_headroom: 1.5,
            max_vertices_per_trace: 4096,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EngineState {
    Empty,
    Active,
    Closing,
    Closed,
}

struct DeviceTrace {
    buffer: Arc<RingBuffer<Sample>>,
    subscription: Subscription,
    enabled: Vec<bool>,
}

struct Traces {
    state: EngineState,
    devices: BTreeMap<DeviceId, DeviceTrace>,
}

impl Traces {
    fn settle(&mut self) {
        if matches!(self.state, EngineState::Empty | EngineState::Active) {
            self.state = if self.devices.is_empty() {
                EngineState::Empty
            } else {
                EngineState::Active
            };
        }
    }
}

// render-thread only
struct RenderState {
    autoscaler: Autoscaler,
    scratch: BTreeMap<DeviceId, Vec<Sample>>,
    contention: Throttle,
    autoscale_was_on: bool,
}

pub struct GraphEngine<M: Metric> {
    transport: Arc<dyn Transport>,
    settings: SharedSettings,
    config: EngineConfig,
    traces: Mutex<Traces>,
    render: Mutex<RenderState>,
    _metric: PhantomData<fn() -> M>,
}

impl<M: Metric> GraphEngine<M> {
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: SharedSettings,
        config: EngineConfig,
    ) -> GraphEngine<M> {
        let render = RenderState {
            autoscaler: Autoscaler::new(),
            scratch: BTreeMap::new(),
            contention: Throttle::new(config.contention_log_interval),
            autoscale_was_on: true,
        };

        GraphEngine {
            transport,
            settings,
            config,
            traces: Mutex::new(Traces {
                state: EngineState::Empty,
                devices: BTreeMap::new(),
            }),
            render: Mutex::new(render),
            _metric: PhantomData,
        }
    }

    pub fn state(&self) -> EngineState {
        self.traces.lock().state
    }

    pub fn settings(&self) -> &SharedSettings {
        &self.settings
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn devices(&self) -> Vec<DeviceId> {
        self.traces.lock().devices.keys().copied().collect()
    }

    pub fn contains_device(&self, device: DeviceId) -> bool {
        self.traces.lock().devices.contains_key(&device)
    }

    /// Subscriptions currently registered with the transport.
    pub fn live_subscriptions(&self) -> usize {
        self.traces
            .lock()
            .devices
            .values()
            .filter(|trace| trace.subscription.is_active())
            .count()
    }

    /// Attach `device`: one trace per field, backed by a new buffer.
    ///
    /// Adding a device that is already attached does nothing.
    pub fn add_device(&self, device: DeviceId) -> Result<()> {
        {
            let traces = self.traces.lock();
            if matches!(traces.state, EngineState::Closing | EngineState::Closed) {
                return Err(GraphError::Closed);
            }
            if traces.devices.contains_key(&device) {
                log::debug!("{} already attached to {} graph", device, M::NAME);
                return Ok(());
            }
        }

        let capacity = self
            .settings
            .snapshot()
            .buffer_capacity(M::EXPECTED_RATE, self.config.capacity_headroom);
        let buffer = Arc::new(RingBuffer::new(capacity));

        // subscribing may block on the transport, so it happens outside the lock
        let subscription = {
            let buffer = buffer.clone();
            SampleStream::<M>::subscribe(
                self.transport.clone(),
                device,
                self.config.drain_timeout,
                move |sample| {
                    if let Pushed::Reset = buffer.push(sample) {
                        log::info!("{} clock went backwards, buffer cleared", device);
                    }
                },
            )?
        };

        let mut traces = self.traces.lock();
        if matches!(traces.state, EngineState::Closing | EngineState::Closed) {
            drop(traces);
            drop(subscription);
            return Err(GraphError::Closed);
        }
        if traces.devices.contains_key(&device) {
            // lost a race with a concurrent add of the same device
            drop(traces);
            drop(subscription);
            return Ok(());
        }

        traces.devices.insert(
            device,
            DeviceTrace {
                buffer,
                subscription,
                enabled: vec![true; M::FIELDS.len()],
            },
        );
        traces.settle();
        log::info!(
            "{} added to {} graph, buffer of {} samples",
            device,
            M::NAME,
            capacity
        );

        Ok(())
    }

    /// Detach `device`, blocking until its in-flight callbacks have drained.
    ///
    /// Its buffered samples are discarded. Removing an unknown device does nothing.
    pub fn remove_device(&self, device: DeviceId) -> Result<()> {
        let trace = {
            let mut traces = self.traces.lock();
            let trace = traces.devices.remove(&device);
            traces.settle();
            trace
        };

        let Some(mut trace) = trace else {
            return Ok(());
        };
        self.render.lock().scratch.remove(&device);

        let result = trace.subscription.unsubscribe();
        match &result {
            Ok(()) => log::info!("{} removed from {} graph", device, M::NAME),
            Err(err) => log::error!("{}", err),
        }
        drop(trace);

        result
    }

    /// Show or hide one trace; unknown traces are ignored.
    pub fn set_trace_enabled(&self, trace: TraceId, enabled: bool) {
        let mut traces = self.traces.lock();
        if let Some(flag) = traces
            .devices
            .get_mut(&trace.device)
            .and_then(|device| device.enabled.get_mut(trace.field))
        {
            *flag = enabled;
        }
    }

    pub fn is_trace_enabled(&self, trace: TraceId) -> bool {
        self.traces
            .lock()
            .devices
            .get(&trace.device)
            .and_then(|device| device.enabled.get(trace.field).copied())
            .unwrap_or(false)
    }

    /// Build the frame to draw at `now`.
    ///
    /// Never waits more than `snapshot_timeout` per device; devices whose buffer is
    /// contended are listed in [`Frame::skipped`] and left out of this frame.
    pub fn on_frame(&self, now: Instant) -> Frame {
        let settings = self.settings.snapshot();

        let attached: Vec<(DeviceId, Arc<RingBuffer<Sample>>, Vec<bool>)> = self
            .traces
            .lock()
            .devices
            .iter()
            .map(|(id, trace)| (*id, trace.buffer.clone(), trace.enabled.clone()))
            .collect();

        let mut render = self.render.lock();
        let RenderState {
            autoscaler,
            scratch,
            contention,
            autoscale_was_on,
        } = &mut *render;

        // a device removed since the last frame may have left its scratch behind
        scratch.retain(|device, _| attached.iter().any(|(id, _, _)| id == device));

        let max_age = Some(settings.time_window_micros());
        let mut skipped = Vec::new();
        for (device, buffer, _) in &attached {
            let out = scratch.entry(*device).or_default();
            if buffer
                .try_snapshot_into(self.config.snapshot_timeout, max_age, out)
                .is_err()
            {
                skipped.push(*device);
                if let Some(suppressed) = contention.check(now) {
                    log::warn!(
                        "{} ({} more since last report)",
                        GraphError::BufferContention(*device),
                        suppressed
                    );
                }
            }
        }

        let devices: Vec<DeviceSamples> = attached
            .iter()
            .filter(|(device, _, _)| !skipped.contains(device))
            .filter_map(|(device, _, enabled)| {
                Some(DeviceSamples {
                    device: *device,
                    samples: scratch.get(device)?,
                    enabled,
                })
            })
            .collect();

        let y = if settings.autoscale {
            if !*autoscale_was_on {
                autoscaler.reset();
            }
            autoscaler
                .update(
                    frame::visible_extent(&settings, &devices),
                    settings.autoscale_margin,
                    settings.autoscale_decay(),
                    now,
                )
                .unwrap_or_else(|| settings.manual_range())
        } else {
            settings.manual_range()
        };
        *autoscale_was_on = settings.autoscale;

        frame::assemble(
            &settings,
            y,
            &devices,
            skipped,
            self.config.max_vertices_per_trace,
        )
    }

    /// Copy of every device's buffered samples.
    pub fn export_snapshot(&self) -> Recording {
        let buffers: Vec<_> = self
            .traces
            .lock()
            .devices
            .iter()
            .map(|(id, trace)| (*id, trace.buffer.clone()))
            .collect();

        let mut recording = Recording::new(M::NAME, M::FIELDS);
        for (device, buffer) in buffers {
            recording.add_device(device, buffer.snapshot(None));
        }
        recording
    }

    /// (used, allocated) bytes across all buffers.
    pub fn memory_footprint(&self) -> (usize, usize) {
        self.traces
            .lock()
            .devices
            .values()
            .map(|trace| trace.buffer.memory_footprint())
            .fold((0, 0), |(used, allocated), (u, a)| (used + u, allocated + a))
    }

    /// Unsubscribe every device and release all buffers; later calls do nothing.
    ///
    /// Blocks until in-flight callbacks drained. A device that did not drain in time
    /// is still released and the first such error is returned.
    pub fn close(&self) -> Result<()> {
        let devices = {
            let mut traces = self.traces.lock();
            match traces.state {
                EngineState::Closing | EngineState::Closed => return Ok(()),
                _ => traces.state = EngineState::Closing,
            }
            std::mem::take(&mut traces.devices)
        };

        let mut result = Ok(());
        for (device, mut trace) in devices {
            if let Err(err) = trace.subscription.unsubscribe() {
                log::error!("{}", err);
                if result.is_ok() {
                    result = Err(err);
                }
            } else {
                log::debug!("{} released", device);
            }
        }

        self.render.lock().scratch.clear();
        self.traces.lock().state = EngineState::Closed;
        log::info!("{} graph closed", M::NAME);

        result
    }
}

impl<M: Metric> Drop for GraphEngine<M> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::error!("while dropping {} graph: {}", M::NAME, err);
        }
    }
}
