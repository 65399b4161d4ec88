use std::num::NonZeroUsize;
use std::ops::Range;

use eframe::{egui, Frame};
use egui::Color32;
use egui_plot::{Bar, BarChart, Legend, Line, Plot, PlotPoints, Points};

use crate::analysis::LinearModel;
use crate::history::{
    describe, histogram, paired, ColumnSummary, GraphKind, HistoryTable, SampleWindow, HISTOGRAM_BINS,
};

const PALETTE: [Color32; 6] = [
    Color32::RED,
    Color32::GREEN,
    Color32::BLUE,
    Color32::from_rgb(255, 165, 0),
    Color32::from_rgb(255, 20, 147),
    Color32::from_rgb(0, 255, 255),
];

/// Paged view over a recorded CSV: graph type, variable selection,
/// Previous / Next and a summary table of the visible window.
pub struct HistoryViewer {
    file_name: String,
    table: HistoryTable,
    graph: GraphKind,
    selected: Vec<bool>,
    window: SampleWindow,
    plot_height: f32,
}

impl HistoryViewer {
    pub fn new(file_name: String, table: HistoryTable, window_size: NonZeroUsize, plot_height: f32) -> Self {
        let selected = table.default_selection();
        Self {
            file_name,
            table,
            graph: GraphKind::Line,
            selected,
            window: SampleWindow::new(window_size),
            plot_height,
        }
    }

    fn selected_columns(&self) -> Vec<usize> {
        self.selected
            .iter()
            .enumerate()
            .filter_map(|(idx, &on)| on.then_some(idx))
            .collect()
    }

    fn render_controls(&mut self, ui: &mut egui::Ui) {
        let total = self.table.rows();

        ui.heading("📊 History Data");
        ui.label(format!("File: {}", self.file_name));
        ui.label(format!("Total samples: {}", total));
        ui.add_space(10.0);

        ui.horizontal(|ui| {
            ui.label("Graph:");
            egui::ComboBox::from_id_salt("graph_kind")
                .selected_text(self.graph.label())
                .show_ui(ui, |ui| {
                    for kind in GraphKind::ALL {
                        ui.selectable_value(&mut self.graph, kind, kind.label());
                    }
                });
        });

        ui.add_space(5.0);
        ui.label("Variables:");
        ui.horizontal_wrapped(|ui| {
            for (idx, column) in self.table.columns().iter().enumerate() {
                ui.checkbox(&mut self.selected[idx], column.name.as_str());
            }
            if ui.button("All").clicked() {
                self.selected.iter_mut().for_each(|on| *on = true);
            }
        });

        ui.add_space(5.0);
        ui.horizontal(|ui| {
            ui.label("Samples per page:");
            let mut size = self.window.size();
            let response = ui.add(egui::DragValue::new(&mut size).range(1..=total.max(1)));
            if response.changed() {
                if let Some(size) = NonZeroUsize::new(size) {
                    self.window.resize(size);
                }
            }
        });

        let page_count = self.window.page_count(total);
        ui.horizontal(|ui| {
            if ui.add_enabled(self.window.page() > 0, egui::Button::new("◀ Previous")).clicked() {
                self.window.previous();
            }
            ui.label(format!("Page {} of {}", self.window.page() + 1, page_count));
            if ui
                .add_enabled(self.window.page() + 1 < page_count, egui::Button::new("Next ▶"))
                .clicked()
            {
                self.window.next(total);
            }
        });
    }

    fn render_summary(&self, ui: &mut egui::Ui, range: &Range<usize>) {
        let columns = self.selected_columns();
        ui.label("Data Summary:");

        egui::Grid::new("summary_grid").striped(true).show(ui, |ui| {
            ui.label("");
            for &idx in &columns {
                ui.strong(self.table.columns()[idx].name.as_str());
            }
            ui.end_row();

            let summaries: Vec<Option<ColumnSummary>> = columns
                .iter()
                .map(|&idx| describe(&self.table.columns()[idx].values[range.clone()]))
                .collect();

            for (row, label) in ColumnSummary::LABELS.iter().enumerate() {
                ui.label(*label);
                for summary in &summaries {
                    match summary.and_then(|s| s.values()[row]) {
                        Some(value) => ui.monospace(format!("{:.4}", value)),
                        None => ui.colored_label(Color32::GRAY, "-"),
                    };
                }
                ui.end_row();
            }
        });
    }

    fn render_plots(&self, ui: &mut egui::Ui, range: &Range<usize>) {
        let columns = self.selected_columns();
        if columns.is_empty() {
            ui.centered_and_justified(|ui| {
                ui.colored_label(Color32::GRAY, "Please select at least one variable");
            });
            return;
        }

        egui::ScrollArea::vertical().show(ui, |ui| {
            if self.graph == GraphKind::Trend {
                self.render_trend(ui, &columns, range);
            } else {
                for &idx in &columns {
                    self.render_column(ui, idx, range);
                }
            }
        });
    }

    fn render_column(&self, ui: &mut egui::Ui, idx: usize, range: &Range<usize>) {
        let column = &self.table.columns()[idx];
        let color = PALETTE[idx % PALETTE.len()];
        let values = &column.values[range.clone()];
        let name = column.name.as_str();
        // 横轴为原始行号
        let points = paired(&range.clone().map(|row| row as f64).collect::<Vec<_>>(), values);

        ui.label(name);
        Plot::new(("history_plot", idx))
            .height(self.plot_height)
            .allow_drag(true)
            .allow_zoom(true)
            .show(ui, |plot_ui| match self.graph {
                GraphKind::Scatter => {
                    plot_ui.points(Points::new(name, PlotPoints::from(points)).color(color).radius(2.0));
                }
                GraphKind::Bar => {
                    let bars = points.iter().map(|&[x, y]| Bar::new(x, y).width(0.8)).collect();
                    plot_ui.bar_chart(BarChart::new(name, bars).color(color));
                }
                GraphKind::Histogram => {
                    let bars = histogram(values, HISTOGRAM_BINS)
                        .into_iter()
                        .map(|bin| Bar::new(bin.center, bin.count as f64).width(bin.width))
                        .collect();
                    plot_ui.bar_chart(BarChart::new(name, bars).color(color));
                }
                GraphKind::Line | GraphKind::Trend => {
                    plot_ui.line(Line::new(name, PlotPoints::from(points)).color(color).width(1.0));
                }
            });
    }

    fn render_trend(&self, ui: &mut egui::Ui, columns: &[usize], range: &Range<usize>) {
        let [x_idx, y_idx, ..] = columns else {
            ui.colored_label(Color32::GRAY, "Select two variables for a trend plot");
            return;
        };
        let x = &self.table.columns()[*x_idx];
        let y = &self.table.columns()[*y_idx];
        let points = paired(&x.values[range.clone()], &y.values[range.clone()]);
        let model = LinearModel::fit_points(&points);

        match &model {
            Ok(model) => ui.label(format!(
                "{} = {:.4} * {} + {:.4} (R² {:.4})",
                y.name, model.slope, x.name, model.intercept, model.r_squared
            )),
            Err(e) => ui.colored_label(Color32::GRAY, format!("No trend line: {}", e)),
        };

        let x_range = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

        Plot::new("history_trend")
            .height(self.plot_height * 3.0)
            .legend(Legend::default())
            .x_axis_label(x.name.as_str())
            .y_axis_label(y.name.as_str())
            .show(ui, |plot_ui| {
                plot_ui.points(Points::new("Data", PlotPoints::from(points)).color(Color32::BLUE).radius(2.0));
                if let Ok(model) = &model {
                    let (lo, hi) = x_range;
                    let line = vec![[lo, model.predict(lo)], [hi, model.predict(hi)]];
                    plot_ui.line(Line::new("Trend", PlotPoints::from(line)).color(Color32::RED).width(2.0));
                }
            });
    }
}

impl eframe::App for HistoryViewer {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut Frame) {
        egui::SidePanel::left("history_controls")
            .resizable(true)
            .default_width(320.0)
            .width_range(250.0..=600.0)
            .show(ctx, |ui| {
                self.render_controls(ui);
                ui.separator();
                let range = self.window.range(self.table.rows());
                egui::ScrollArea::horizontal().show(ui, |ui| self.render_summary(ui, &range));
            });

        let range = self.window.range(self.table.rows());
        egui::CentralPanel::default().show(ctx, |ui| {
            ui.label(format!("Rows {}..{}", range.start, range.end));
            self.render_plots(ui, &range);
        });
    }
}
