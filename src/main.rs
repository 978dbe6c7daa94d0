use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use eframe::egui;

use telemetry_graph::device::{self, DeviceHub, DeviceId, SimulatedDevice};
use telemetry_graph::export;
use telemetry_graph::frame::TraceId;
use telemetry_graph::layout::LayoutNode;
use telemetry_graph::painter::PlotPainter;
use telemetry_graph::parsable::ParsableFloat;
use telemetry_graph::settings::Color;
use telemetry_graph::utils::human_readable_size;
use telemetry_graph::{open_graph, EngineConfig, GraphKind, GraphView};

struct DemoDevice {
    device: SimulatedDevice,
    status: Option<device::Status>,
}

struct GraphPanel {
    id: u64,
    kind: GraphKind,
    view: Box<dyn GraphView<PlotPainter>>,
    open: bool,
    time_window: ParsableFloat,
    range_min: ParsableFloat,
    range_max: ParsableFloat,
}

impl GraphPanel {
    fn new(id: u64, kind: GraphKind, view: Box<dyn GraphView<PlotPainter>>) -> GraphPanel {
        let settings = view.settings().snapshot();
        GraphPanel {
            id,
            kind,
            view,
            open: true,
            time_window: settings.time_window_seconds.into(),
            range_min: settings.range_min.into(),
            range_max: settings.range_max.into(),
        }
    }
}

struct TelemetryGraph {
    hub: Arc<DeviceHub>,
    devices: Vec<DemoDevice>,
    next_device_id: u32,
    sample_rate: ParsableFloat,

    graphs: Vec<GraphPanel>,
    next_graph_id: u64,
    graph_kind_to_open: GraphKind,
    // settings of closed windows, restored when the same kind is reopened
    layouts: HashMap<GraphKind, LayoutNode>,

    show_error_dialog: bool,
    error_title: String,
    error_message: String,
}

impl TelemetryGraph {
    pub fn new() -> TelemetryGraph {
        TelemetryGraph {
            hub: Arc::new(DeviceHub::new()),
            devices: Vec::new(),
            next_device_id: 1,
            sample_rate: 400.0.into(),
            graphs: Vec::new(),
            next_graph_id: 0,
            graph_kind_to_open: GraphKind::BatteryVoltage,
            layouts: HashMap::new(),
            show_error_dialog: false,
            error_title: "".into(),
            error_message: "".into(),
        }
    }

    fn show_error(&mut self, title: String, message: String) {
        self.error_title = title;
        self.error_message = message;
        self.show_error_dialog = true;
    }

    fn connect_device(&mut self) {
        let id = DeviceId(self.next_device_id);
        self.next_device_id += 1;

        let device = SimulatedDevice::start(
            self.hub.clone(),
            id,
            &format!("x-IMU3 simulator {}", id.0),
            self.sample_rate.value(),
        );
        self.devices.push(DemoDevice {
            device,
            status: None,
        });
    }

    fn open_graph(&mut self, kind: GraphKind) {
        let layout = self.layouts.remove(&kind).unwrap_or_default();
        let view = open_graph(
            kind,
            layout,
            &*self.hub,
            self.hub.clone(),
            PlotPainter::new(),
            EngineConfig::default(),
        );

        self.graphs.push(GraphPanel::new(self.next_graph_id, kind, view));
        self.next_graph_id += 1;
    }

    fn handle_notifications(&mut self) {
        let mut terminated = Vec::new();
        let mut errors = Vec::new();

        for (index, demo) in self.devices.iter_mut().enumerate() {
            while let Ok(notification) = demo.device.notification_channel().try_recv() {
                match notification {
                    device::Notification::NewStatus(status) => {
                        demo.status = Some(status);
                        if status == device::Status::Terminated {
                            terminated.push(index);
                        }
                    }
                    device::Notification::Error(message) => {
                        errors.push((demo.device.id(), message));
                    }
                }
            }
        }

        for index in terminated.into_iter().rev() {
            self.devices.remove(index).device.stop();
        }

        for (id, message) in errors {
            if !self.show_error_dialog {
                self.show_error(format!("{} error", id), message);
            } else {
                log::warn!("{} error detected, but error dialog already open", id);
            }
        }
    }

    fn close_graph(&mut self, index: usize) {
        let mut panel = self.graphs.remove(index);
        if let Err(err) = panel.view.close() {
            log::error!("closing {} graph: {}", panel.view.title(), err);
        }
        self.layouts.insert(panel.kind, panel.view.layout().clone());
    }
}

fn export_graph(view: &dyn GraphView<PlotPainter>) -> anyhow::Result<()> {
    let maybe_filename = rfd::FileDialog::new()
        .add_filter("CSV file (*.csv)", &["csv"])
        .add_filter("Numpy data (*.npy)", &["npy"])
        .set_file_name("export.csv")
        .save_file();
    let Some(filename) = maybe_filename else {
        // operation was cancelled
        return Ok(());
    };

    let recording = view.export();
    match extension(&filename).as_deref() {
        Some("csv") => export::write_csv(&filename, &recording),
        Some("npy") => export::write_npy(&filename, &recording),
        _ => anyhow::bail!("unsupported export format {:?}", filename),
    }
    .with_context(|| format!("failed to export to {:?}", filename))
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

fn parsed_edit(ui: &mut egui::Ui, value: &mut ParsableFloat, id: egui::Id) -> bool {
    let edit_color = if value.is_parsed_ok() {
        egui::Color32::GREEN
    } else {
        egui::Color32::LIGHT_RED
    };
    let lost_focus = egui::TextEdit::singleline(value.editable_string())
        .id(id)
        .desired_width(50.0)
        .text_color(edit_color)
        .show(ui)
        .response
        .lost_focus();
    if lost_focus {
        value.update();
    }
    lost_focus && value.is_parsed_ok()
}

fn settings_ui(ui: &mut egui::Ui, panel: &mut GraphPanel) {
    let shared = panel.view.settings().clone();
    let current = shared.snapshot();
    let id = |name: &str| egui::Id::new(("graph", panel.id, name.to_owned()));

    ui.horizontal(|ui| {
        ui.label("Time window ");
        if parsed_edit(ui, &mut panel.time_window, id("time-window")) {
            let seconds = panel.time_window.value();
            shared.update(|settings| settings.time_window_seconds = seconds);
            panel.time_window.set(shared.snapshot().time_window_seconds);
        }
        ui.label("s");
    });

    let mut autoscale = current.autoscale;
    if ui.checkbox(&mut autoscale, "Autoscale").changed() {
        shared.update(|settings| settings.autoscale = autoscale);
    }

    ui.horizontal(|ui| {
        ui.set_enabled(!current.autoscale);
        ui.label("Range ");
        let min_changed = parsed_edit(ui, &mut panel.range_min, id("range-min"));
        ui.label("to");
        let max_changed = parsed_edit(ui, &mut panel.range_max, id("range-max"));
        ui.label(&current.units);

        if min_changed || max_changed {
            let (min, max) = (panel.range_min.value(), panel.range_max.value());
            shared.update(|settings| {
                settings.range_min = min;
                settings.range_max = max;
            });
            let updated = shared.snapshot();
            panel.range_min.set(updated.range_min);
            panel.range_max.set(updated.range_max);
        }
    });

    for field in 0..current.field_count() {
        ui.horizontal(|ui| {
            let mut visible = current.is_trace_visible(field);
            if ui.checkbox(&mut visible, current.trace_label(field)).changed() {
                shared.update(|settings| settings.trace_visible[field] = visible);
            }

            let color = current.trace_color(field);
            let mut rgb = [color.r, color.g, color.b];
            if ui.color_edit_button_srgb(&mut rgb).changed() {
                shared.update(|settings| {
                    settings.trace_colors[field] = Color::rgb(rgb[0], rgb[1], rgb[2])
                });
            }
        });
    }

    for device in panel.view.devices() {
        ui.horizontal(|ui| {
            ui.label(device.to_string());
            for (field, label) in panel.view.fields().iter().enumerate() {
                let trace = TraceId::new(device, field);
                let mut enabled = panel.view.is_trace_enabled(trace);
                if ui.checkbox(&mut enabled, *label).changed() {
                    panel.view.set_trace_enabled(trace, enabled);
                }
            }
        });
    }
}

impl eframe::App for TelemetryGraph {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_notifications();

        egui::TopBottomPanel::top("toolbar").show(ctx, |ui| {
            if self.show_error_dialog {
                ui.set_enabled(false);
            }

            ui.heading("Telemetry Graph");
            ui.horizontal(|toolbar| {
                toolbar.label("Rate [Hz]: ");
                parsed_edit(toolbar, &mut self.sample_rate, egui::Id::new("sample-rate"));
                if toolbar.button("Connect simulated device").clicked() {
                    self.connect_device();
                }

                toolbar.separator();

                egui::ComboBox::from_id_source("graph-kind")
                    .selected_text(self.graph_kind_to_open.title())
                    .show_ui(toolbar, |ui| {
                        for kind in GraphKind::ALL {
                            ui.selectable_value(&mut self.graph_kind_to_open, kind, kind.title());
                        }
                    });
                if toolbar.button("Open graph").clicked() {
                    self.open_graph(self.graph_kind_to_open);
                }
            });
        });

        let mut to_stop = None;
        egui::panel::SidePanel::left("devices")
            .resizable(true)
            .default_width(220.0)
            .show(ctx, |ui| {
                ui.label(egui::RichText::new("Devices").strong());

                for (index, demo) in self.devices.iter().enumerate() {
                    ui.group(|ui| {
                        ui.label(demo.device.id().to_string());
                        if let Some(status) = demo.status {
                            ui.label(format!("{:?}", status));
                        }
                        ui.horizontal(|ui| {
                            if ui.button("Pause").clicked() {
                                demo.device.pause();
                            }
                            if ui.button("Resume").clicked() {
                                demo.device.resume();
                            }
                            if ui.button("Disconnect").clicked() {
                                to_stop = Some(index);
                            }
                        });
                    });
                }

                ui.separator();

                ui.label(egui::RichText::new("Buffers").strong());
                let (used, capacity) = self
                    .graphs
                    .iter()
                    .map(|panel| panel.view.memory_footprint())
                    .fold((0, 0), |(u, c), (bu, bc)| (u + bu, c + bc));
                ui.label(format!("Size: {}", human_readable_size(used)));
                ui.label(format!("Capacity: {}", human_readable_size(capacity)));
            });

        if let Some(index) = to_stop {
            self.devices.remove(index).device.stop();
        }

        egui::CentralPanel::default().show(ctx, |_| {});

        let now = Instant::now();
        let mut export_error = None;
        let mut graph_errors = Vec::new();
        for panel in self.graphs.iter_mut() {
            let mut open = panel.open;
            egui::Window::new(panel.view.title())
                .id(egui::Id::new(("graph-window", panel.id)))
                .open(&mut open)
                .default_size([480.0, 320.0])
                .show(ctx, |ui| {
                    egui::CollapsingHeader::new("Settings")
                        .id_source(("graph-settings", panel.id))
                        .show(ui, |ui| {
                            settings_ui(ui, panel);
                            if ui.button("Export data...").clicked() {
                                if let Err(err) = export_graph(panel.view.as_ref()) {
                                    export_error = Some(err);
                                }
                            }
                        });

                    let frame = panel.view.on_frame(now);
                    if !frame.skipped.is_empty() {
                        log::trace!("{} skipped {:?}", panel.view.title(), frame.skipped);
                    }
                    let units = panel.view.settings().snapshot().units;
                    panel.view.renderer().paint(ui, &units);
                });
            panel.open = open;

            while let Some(err) = panel.view.take_error() {
                graph_errors.push((panel.view.title(), err));
            }
        }

        for (title, err) in graph_errors {
            if !self.show_error_dialog {
                self.show_error(format!("{} graph error", title), err.to_string());
            } else {
                log::warn!("{} graph error while error dialog open: {}", title, err);
            }
        }

        if let Some(err) = export_error {
            log::error!("{:?}", err);
            self.show_error("Export failed".into(), format!("{:#}", err));
        }

        while let Some(index) = self.graphs.iter().position(|panel| !panel.open) {
            self.close_graph(index);
        }

        if self.show_error_dialog {
            egui::Window::new(&self.error_title)
                .collapsible(false)
                .resizable(false)
                .show(ctx, |ui| {
                    ui.label(&self.error_message);
                    if ui.button("Close").clicked() {
                        self.show_error_dialog = false;
                    }
                });
        }

        if !self.graphs.is_empty() {
            ctx.request_repaint();
        }
    }
}

impl Drop for TelemetryGraph {
    fn drop(&mut self) {
        // graphs first, so no trace outlives its device's subscription
        while !self.graphs.is_empty() {
            self.close_graph(0);
        }
        for demo in self.devices.drain(..) {
            demo.device.stop();
        }
    }
}

fn main() -> anyhow::Result<()> {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .env()
        .init()
        .context("failed to initialize logger")?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default().with_inner_size([960.0, 640.0]),
        ..Default::default()
    };

    eframe::run_native(
        "Telemetry Graph",
        options,
        Box::new(|_| {
            let app = TelemetryGraph::new();
            Box::new(app)
        }),
    )
    .map_err(|err| anyhow::anyhow!("eframe::run_native error: {}", err))
}
