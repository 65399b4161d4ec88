use std::io::{self, Write};

use chrono::Local;
use env_logger::fmt::Formatter;
use env_logger::{Builder, Env};
use log::Record;

/// Used when neither `--log-level` nor `RUST_LOG` is given. rumqttc logs
/// every reconnect attempt at info.
pub const DEFAULT_FILTER: &str = "info,rumqttc=warn";

/// `filters` uses the `RUST_LOG` syntax and is applied on top of it.
pub fn init_logger(filters: Option<&str>) {
    let mut builder = Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER));
    // 命令行参数优先于 RUST_LOG
    if let Some(filters) = filters {
        builder.parse_filters(filters);
    }
    builder.format(write_record).init();
}

fn write_record(buf: &mut Formatter, record: &Record) -> io::Result<()> {
    // 颜色随 RUST_LOG_STYLE / 终端能力自动关闭
    let style = buf.default_level_style(record.level());
    writeln!(
        buf,
        "{} {style}{:<5}{style:#} {}",
        Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
        record.level(),
        context(record, std::thread::current().name()),
    )
}

/// `[thread] [file:line] message`
fn context(record: &Record, thread: Option<&str>) -> String {
    format!(
        "[{}] [{}:{}] {}",
        thread.unwrap_or("main"),
        record.file().unwrap_or("unknown"),
        record.line().unwrap_or(0),
        record.args(),
    )
}
