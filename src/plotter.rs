use egui::Color32;
use egui_plot::{Line, Plot, PlotBounds, PlotPoints};

use crate::buffer::BufferSnapshot;
use crate::config::PlotConfig;

/// 格式化数字为固定宽度的 y 轴标签
fn format_fixed_width_y_label(value: f64) -> String {
    let abs_value = value.abs();
    if abs_value >= 1000.0 {
        // 极大值：科学计数法
        format!("{:-6.1e}", value)
    } else if abs_value >= 100.0 {
        format!("{:-6.0}", value)
    } else if abs_value >= 10.0 {
        format!("{:-6.1}", value)
    } else {
        format!("{:-6.2}", value)
    }
}

/// Seconds since the oldest sample in the window.
pub fn relative_seconds(timestamps: &[i64]) -> Vec<f64> {
    let Some(&origin) = timestamps.first() else {
        return Vec::new();
    };
    timestamps
        .iter()
        .map(|&t| (t - origin) as f64 / 1000.0)
        .collect()
}

/// 动态 Y 轴范围，上下各留 5% 余量
pub fn y_bounds(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    let (y_min, y_max) = values.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(min, max), &val| (min.min(val), max.max(val)),
    );
    let range = (y_max - y_min).max(0.1);
    Some((y_min - range * 0.05, y_max + range * 0.05))
}

fn color(rgb: [u8; 3]) -> Color32 {
    Color32::from_rgb(rgb[0], rgb[1], rgb[2])
}

/// Draws one line chart per axis from a buffer snapshot.
pub struct WaveformPlot<'a> {
    config: &'a PlotConfig,
}

impl<'a> WaveformPlot<'a> {
    pub fn new(config: &'a PlotConfig) -> Self {
        Self { config }
    }

    /// Caller checks `snapshot.is_ready()` first; a snapshot with fewer than
    /// two points is drawn as nothing.
    pub fn ui(&self, ui: &mut egui::Ui, snapshot: &BufferSnapshot) {
        if !snapshot.is_ready() {
            return;
        }

        let seconds = relative_seconds(&snapshot.t);
        let colors = &self.config.colors;

        egui::ScrollArea::vertical().show(ui, |ui| {
            ui.vertical(|ui| {
                ui.heading("Gyroscope");
                self.plot_axis(ui, "X Axis", &seconds, &snapshot.x, color(colors.x_axis));
                self.plot_axis(ui, "Y Axis", &seconds, &snapshot.y, color(colors.y_axis));
                self.plot_axis(ui, "Z Axis", &seconds, &snapshot.z, color(colors.z_axis));
            });
        });
    }

    fn plot_axis(&self, ui: &mut egui::Ui, title: &str, seconds: &[f64], values: &[f64], color: Color32) {
        let Some((y_min, y_max)) = y_bounds(values) else {
            return;
        };
        let x_max = seconds.last().copied().unwrap_or(0.0).max(0.001);

        ui.label(title);
        Plot::new(title)
            .height(self.config.plot_height)
            .x_axis_formatter(|v, _| format!("{:.1}s", v.value))
            .y_axis_formatter(|v, _| format_fixed_width_y_label(v.value))
            .show_axes(self.config.show_axes)
            .show_x(false)
            .show_y(false)
            .allow_drag(self.config.allow_drag)
            .allow_zoom(self.config.allow_zoom)
            .show(ui, |plot_ui| {
                let points: Vec<[f64; 2]> = seconds
                    .iter()
                    .zip(values)
                    .map(|(&t, &v)| [t, v])
                    .collect();

                plot_ui.set_plot_bounds(PlotBounds::from_min_max([0.0, y_min], [x_max, y_max]));
                plot_ui.line(Line::new(title, PlotPoints::from(points)).color(color).width(1.0));
            });
    }
}
