use crate::config::AppSettings;
use crate::core::{AutofitState, CaptureSnapshot};
use crate::decode::Decoder;
use crate::hardware::{ConnectionStatus, SessionStats};
use imgui::{StyleColor, Ui};
use std::sync::atomic::Ordering;

/// Trace colours, cycled by channel position
const PALETTE: [[f32; 4]; 8] = [
    [1.0, 0.85, 0.2, 1.0],
    [0.3, 0.8, 1.0, 1.0],
    [1.0, 0.4, 0.4, 1.0],
    [0.4, 1.0, 0.5, 1.0],
    [0.9, 0.5, 1.0, 1.0],
    [1.0, 0.6, 0.2, 1.0],
    [0.6, 0.6, 1.0, 1.0],
    [0.8, 0.8, 0.8, 1.0],
];

const AXIS_GAP: f32 = 6.0;
const MIN_PLOT_HEIGHT: f32 = 60.0;

/// Vertical range of one axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisRange {
    pub min: f32,
    pub max: f32,
}

impl Default for AxisRange {
    fn default() -> Self {
        Self { min: -1.0, max: 1.0 }
    }
}

impl AxisRange {
    /// Range covering `values` with 10% padding. Flat or empty data gets a
    /// unit-wide range so it is still drawable.
    pub fn fit<'a>(values: impl Iterator<Item = &'a f32>) -> Self {
        let (min, max) = values
            .filter(|v| v.is_finite())
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

        if min > max {
            return Self::default();
        }
        if min == max {
            return Self { min: min - 0.5, max: max + 0.5 };
        }
        let pad = (max - min) * 0.1;
        Self { min: min - pad, max: max + pad }
    }
}

/// Stacked per-axis plot of the current capture
#[derive(Default)]
pub struct ScopeView {
    ranges: Vec<AxisRange>,
    /// Axis labels the ranges were last fitted for
    labels: Vec<String>,
    fit_requested: bool,
}

impl ScopeView {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn ranges(&self) -> &[AxisRange] {
        &self.ranges
    }

    /// Take this frame's snapshot and act on the autofit latch. The capture
    /// lock is only held inside the decoder calls, never while drawing.
    pub fn sync(&mut self, decoder: &Decoder, settings: &AppSettings) -> CaptureSnapshot {
        let snapshot = decoder.snapshot();

        let mut fit = std::mem::take(&mut self.fit_requested);
        if snapshot.autofit == AutofitState::Requested && decoder.consume_autofit() {
            fit = true;
            if settings.autofit_every_request {
                decoder.rearm_autofit();
            }
        }

        let axes = snapshot.axis_labels.len();
        if fit {
            self.fit_all(&snapshot);
        } else {
            // axes that are new or changed unit since the last frame start out fitted
            self.ranges.resize(axes, AxisRange::default());
            for (axis, label) in snapshot.axis_labels.iter().enumerate() {
                if self.labels.get(axis) != Some(label) {
                    self.ranges[axis] = fit_axis(&snapshot, axis);
                }
            }
        }
        self.labels.clone_from(&snapshot.axis_labels);
        snapshot
    }

    fn fit_all(&mut self, snapshot: &CaptureSnapshot) {
        self.ranges = (0..snapshot.axis_labels.len())
            .map(|axis| fit_axis(snapshot, axis))
            .collect();
    }

    pub fn render(&mut self, ui: &Ui, snapshot: &CaptureSnapshot, settings: &mut AppSettings) {
        if ui.button("Fit") {
            self.fit_requested = true;
        }
        ui.same_line();
        ui.checkbox("Legend", &mut settings.show_legend);
        ui.same_line();
        ui.checkbox("Fit every capture", &mut settings.autofit_every_request);
        ui.same_line();
        ui.text(format!(
            "depth {}  |  {} Hz  |  trigger at {}",
            snapshot.depth, snapshot.nominal_frequency, snapshot.trigger_offset
        ));

        if snapshot.axis_labels.is_empty() || snapshot.traces.is_empty() {
            ui.text_disabled("No capture yet");
            return;
        }

        let avail = ui.content_region_avail();
        let axes = snapshot.axis_labels.len();
        let height = ((avail[1] - AXIS_GAP * (axes as f32 - 1.0)) / axes as f32).max(MIN_PLOT_HEIGHT);

        for (axis, label) in snapshot.axis_labels.iter().enumerate() {
            let range = self.ranges.get(axis).copied().unwrap_or_default();
            self.render_axis(ui, snapshot, axis, label, range, [avail[0], height], settings.show_legend);
            if axis + 1 < axes {
                ui.dummy([avail[0], AXIS_GAP]);
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_axis(
        &self,
        ui: &Ui,
        snapshot: &CaptureSnapshot,
        axis: usize,
        label: &str,
        range: AxisRange,
        size: [f32; 2],
        show_legend: bool,
    ) {
        let draw_list = ui.get_window_draw_list();
        let pos_min = ui.cursor_screen_pos();
        let pos_max = [pos_min[0] + size[0], pos_min[1] + size[1]];

        draw_list
            .add_rect(pos_min, pos_max, ui.style_color(StyleColor::FrameBg))
            .filled(true)
            .build();

        let depth = snapshot.depth.max(2);
        let t_start = snapshot.time_of(0);
        let t_end = snapshot.time_of(depth - 1);
        let x_of = |i: usize| -> f32 {
            let frac = if t_end > t_start {
                ((snapshot.time_of(i) - t_start) / (t_end - t_start)) as f32
            } else {
                i as f32 / (depth - 1) as f32
            };
            pos_min[0] + frac.clamp(0.0, 1.0) * size[0]
        };
        let y_of = |v: f32| -> f32 {
            let span = range.max - range.min;
            let frac = if span > 0.0 { (v - range.min) / span } else { 0.5 };
            pos_max[1] - frac.clamp(0.0, 1.0) * size[1]
        };

        // zero line
        if range.min <= 0.0 && range.max >= 0.0 {
            let y = y_of(0.0);
            draw_list
                .add_line([pos_min[0], y], [pos_max[0], y], [0.5, 0.5, 0.5, 0.3])
                .build();
        }

        // trigger marker at t = 0
        if snapshot.nominal_frequency > 0 && usize::from(snapshot.trigger_offset) < depth {
            let x = x_of(usize::from(snapshot.trigger_offset));
            draw_list
                .add_line([x, pos_min[1]], [x, pos_max[1]], [1.0, 1.0, 0.5, 0.5])
                .build();
        }

        // one vertex per horizontal pixel is enough
        let step = (depth as f32 / size[0].max(1.0)).ceil().max(1.0) as usize;
        for (index, trace) in snapshot.traces_on_axis(axis) {
            let color = PALETTE[index % PALETTE.len()];
            let points: Vec<[f32; 2]> = trace
                .samples
                .iter()
                .enumerate()
                .step_by(step)
                .map(|(i, &v)| [x_of(i), y_of(v)])
                .collect();
            for pair in points.windows(2) {
                draw_list.add_line(pair[0], pair[1], color).thickness(1.5).build();
            }
        }

        let text_color = [0.7, 0.7, 0.7, 0.9];
        draw_list.add_text([pos_min[0] + 4.0, pos_min[1] + 2.0], text_color, format!("{:.3} {}", range.max, label));
        draw_list.add_text([pos_min[0] + 4.0, pos_max[1] - 15.0], text_color, format!("{:.3} {}", range.min, label));
        draw_list.add_text([pos_max[0] - 80.0, pos_max[1] - 15.0], text_color, format_time(t_end, snapshot));

        if show_legend {
            let mut y = pos_min[1] + 2.0;
            for (index, trace) in snapshot.traces_on_axis(axis) {
                let color = PALETTE[index % PALETTE.len()];
                draw_list.add_text([pos_max[0] - 160.0, y], color, &trace.display_name);
                y += 14.0;
            }
        }

        ui.dummy(size);
    }
}

/// Range fitted to every trace on `axis`
fn fit_axis(snapshot: &CaptureSnapshot, axis: usize) -> AxisRange {
    AxisRange::fit(snapshot.traces_on_axis(axis).flat_map(|(_, t)| t.samples.iter()))
}

fn format_time(t: f64, snapshot: &CaptureSnapshot) -> String {
    if snapshot.nominal_frequency == 0 {
        return format!("#{}", snapshot.depth);
    }
    let abs = t.abs();
    if abs >= 1.0 {
        format!("{:.3} s", t)
    } else if abs >= 1e-3 {
        format!("{:.3} ms", t * 1e3)
    } else {
        format!("{:.1} us", t * 1e6)
    }
}

/// Connection line at the bottom of the window
pub fn render_status(ui: &Ui, stats: &SessionStats) {
    let status = stats.status();
    let color = match status {
        ConnectionStatus::Streaming => [0.4, 1.0, 0.5, 1.0],
        ConnectionStatus::Searching => [1.0, 0.8, 0.3, 1.0],
        _ => [0.7, 0.7, 0.7, 1.0],
    };
    ui.text_colored(color, status.label());
    ui.same_line();
    let since = stats
        .connected_since()
        .map(|t| format!("since {}", t.with_timezone(&chrono::Local).format("%H:%M:%S")))
        .unwrap_or_default();
    ui.text(format!(
        "frames {}  stalls {}  errors {}  sessions {}  {}",
        stats.frames_received.load(Ordering::Relaxed),
        stats.stalls.load(Ordering::Relaxed),
        stats.transport_errors.load(Ordering::Relaxed),
        stats.sessions_opened.load(Ordering::Relaxed),
        since
    ));
}
