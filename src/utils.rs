use chrono::{Local, TimeZone, Utc};

/// 当前 Unix 毫秒时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 将毫秒时间戳格式化为本地时间 HH:MM:SS.mmm
pub fn format_timestamp(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(time) => time.format("%H:%M:%S%.3f").to_string(),
        None => format!("Invalid timestamp: {}", timestamp_ms),
    }
}

/// `YYYYMMDDHHMMSS`, the row key the serial recorder writes
pub fn compact_timestamp() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

pub fn generate_session_id() -> String {
    format!("session_{}", Utc::now().format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_have_fixed_shape() {
        let id = generate_session_id();
        assert!(id.starts_with("session_"));
        assert_eq!(id.len(), "session_20240101_000000".len());
    }

    #[test]
    fn compact_timestamp_is_fourteen_digits() {
        let stamp = compact_timestamp();
        assert_eq!(stamp.len(), 14);
        assert!(stamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn out_of_range_timestamp_is_reported() {
        assert!(format_timestamp(i64::MAX).starts_with("Invalid timestamp"));
        assert_eq!(format_timestamp(0).len(), "00:00:00.000".len());
    }
}
