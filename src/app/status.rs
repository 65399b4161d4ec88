use crate::buffer::BufferSnapshot;
use crate::ingest::IngestStats;
use crate::utils::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedState {
    /// 尚无数据
    Waiting,
    /// 只有一个样本，还不能画线
    Warming,
    Live,
}

impl FeedState {
    pub fn of(snapshot: &BufferSnapshot) -> Self {
        if snapshot.is_ready() {
            FeedState::Live
        } else if snapshot.is_empty() {
            FeedState::Waiting
        } else {
            FeedState::Warming
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FeedState::Waiting => "Waiting",
            FeedState::Warming => "Warming up",
            FeedState::Live => "Live",
        }
    }
}

/// What both renderers show above or instead of the charts.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSummary {
    pub state: FeedState,
    pub fill: usize,
    pub capacity: usize,
    pub accepted: u64,
    pub rejected: u64,
    pub last_rejection: Option<String>,
    pub latest: Option<(f64, f64, f64, i64)>,
}

impl StatusSummary {
    pub fn collect(snapshot: &BufferSnapshot, capacity: usize, stats: &IngestStats) -> Self {
        Self {
            state: FeedState::of(snapshot),
            fill: snapshot.len(),
            capacity,
            accepted: stats.accepted(),
            rejected: stats.rejected(),
            last_rejection: stats.last_rejection(),
            latest: snapshot.latest(),
        }
    }

    pub fn fill_ratio(&self) -> f32 {
        if self.capacity == 0 {
            0.0
        } else {
            self.fill as f32 / self.capacity as f32
        }
    }

    pub fn console_line(&self) -> String {
        let mut line = format!(
            "[{}] buffer {}/{} | accepted {} rejected {}",
            self.state.label(),
            self.fill,
            self.capacity,
            self.accepted,
            self.rejected
        );
        if let (FeedState::Live, Some((x, y, z, t))) = (self.state, self.latest) {
            line.push_str(&format!(
                " | x: {:.3}, y: {:.3}, z: {:.3}, time: {}",
                x,
                y,
                z,
                format_timestamp(t)
            ));
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(n: usize) -> BufferSnapshot {
        BufferSnapshot {
            x: (0..n).map(|i| i as f64).collect(),
            y: vec![0.0; n],
            z: vec![1.0; n],
            t: (0..n as i64).collect(),
        }
    }

    #[test]
    fn feed_state_follows_readiness() {
        assert_eq!(FeedState::of(&snapshot(0)), FeedState::Waiting);
        assert_eq!(FeedState::of(&snapshot(1)), FeedState::Warming);
        assert_eq!(FeedState::of(&snapshot(2)), FeedState::Live);
    }

    #[test]
    fn console_line_shows_latest_only_when_live() {
        let stats = IngestStats::default();

        let warming = StatusSummary::collect(&snapshot(1), 200, &stats);
        assert_eq!(warming.console_line(), "[Warming up] buffer 1/200 | accepted 0 rejected 0");

        let live = StatusSummary::collect(&snapshot(3), 4, &stats);
        assert!(live.console_line().contains("x: 2.000, y: 0.000, z: 1.000"));
        assert!((live.fill_ratio() - 0.75).abs() < f32::EPSILON);
    }
}
