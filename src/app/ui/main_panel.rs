use eframe::egui;

use crate::app::dashboard::LiveDashboard;
use crate::buffer::BufferSnapshot;
use crate::plotter::WaveformPlot;

pub fn render_main_panel(app: &LiveDashboard, ctx: &egui::Context, snapshot: &BufferSnapshot) {
    egui::CentralPanel::default().show(ctx, |ui| {
        // 少于两个样本时不画图
        if !snapshot.is_ready() {
            ui.centered_and_justified(|ui| {
                ui.label("waiting for data...");
            });
            return;
        }

        WaveformPlot::new(app.plot_config()).ui(ui, snapshot);
    });
}
