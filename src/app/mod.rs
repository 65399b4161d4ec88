pub mod console;
pub mod dashboard;
pub mod history_viewer;
pub mod status;
pub mod ui;

pub use console::run_console_monitor;
pub use dashboard::{LiveDashboard, PersistenceLink};
pub use history_viewer::HistoryViewer;
