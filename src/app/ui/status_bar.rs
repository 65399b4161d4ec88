use eframe::egui;

use crate::app::dashboard::LiveDashboard;
use crate::app::status::{FeedState, StatusSummary};

pub fn render_status_bar(app: &mut LiveDashboard, ctx: &egui::Context, summary: &StatusSummary) {
    egui::TopBottomPanel::top("status_bar")
        .min_height(40.0)
        .show(ctx, |ui| {
            ui.add_space(5.0);
            ui.horizontal(|ui| {
                ui.label("Status:");

                let status_color = match summary.state {
                    FeedState::Waiting => egui::Color32::from_rgb(150, 0, 0),  // 红色
                    FeedState::Warming => egui::Color32::from_rgb(255, 165, 0), // 橙色
                    FeedState::Live => egui::Color32::from_rgb(0, 150, 0),     // 绿色
                };
                ui.colored_label(status_color, summary.state.label());

                ui.separator();

                ui.label(format!("Buffer: {}/{}", summary.fill, summary.capacity));
                ui.add(egui::ProgressBar::new(summary.fill_ratio()).desired_width(120.0));

                ui.separator();
                ui.label(format!("Accepted: {}", summary.accepted));
                ui.label(format!("Rejected: {}", summary.rejected));

                if let Some(reason) = &summary.last_rejection {
                    ui.separator();
                    ui.colored_label(egui::Color32::from_rgb(200, 80, 0), format!("Last rejected: {}", reason));
                }

                ui.separator();
                ui.label(format!("Refresh: {} ms", app.refresh_interval().as_millis()));

                // 最右边：导出按钮（仅在持久化开启时）
                if app.has_persistence() {
                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let busy = app.export_in_progress();
                        if ui.add_enabled(!busy, egui::Button::new("📤 Export Session")).clicked() {
                            app.request_session_export();
                        }
                    });
                }
            });
            ui.add_space(5.0);
        });
}

pub fn render_bottom_status_bar(app: &LiveDashboard, ctx: &egui::Context) {
    egui::TopBottomPanel::bottom("bottom_status_bar")
        .min_height(25.0)
        .show(ctx, |ui| {
            ui.add_space(3.0);
            ui.horizontal(|ui| {
                // 左侧：保存状态
                if !app.save_status().is_empty() {
                    ui.colored_label(egui::Color32::from_rgb(0, 100, 200), app.save_status());
                    ui.separator();
                }

                match app.session_id() {
                    Some(session) => ui.label(format!("DB: DuckDB ({})", session)),
                    None => ui.label("DB: off"),
                };

                // 右侧：导出状态
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    if !app.export_status().is_empty() {
                        ui.colored_label(egui::Color32::from_rgb(0, 150, 100), app.export_status());
                    }
                });
            });
            ui.add_space(3.0);
        });
}
