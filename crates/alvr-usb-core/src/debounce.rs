//! 最近事件去抖缓存
//!
//! 记录每个序列号最后一次事件的时间。窗口内的重复事件只降低日志级别，
//! 不影响任何状态转换、端口转发、进程启动或钩子执行。

use crate::clock::Clock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 去抖窗口
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(10);

pub struct RecentEvents {
    entries: HashMap<String, Instant>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl RecentEvents {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_window(clock, DEBOUNCE_WINDOW)
    }

    pub fn with_window(clock: Arc<dyn Clock>, window: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            window,
            clock,
        }
    }

    /// 记录事件（覆盖旧时间）
    pub fn record(&mut self, serial: &str) {
        let now = self.clock.now();
        self.entries.insert(serial.to_string(), now);
    }

    /// 条目存在且未过期
    pub fn is_recent(&self, serial: &str) -> bool {
        let now = self.clock.now();
        self.entries
            .get(serial)
            .is_some_and(|&at| now.saturating_duration_since(at) < self.window)
    }

    /// 返回记录前是否处于窗口内，然后记录本次事件
    pub fn check_and_record(&mut self, serial: &str) -> bool {
        let recent = self.is_recent(serial);
        self.record(serial);
        recent
    }

    /// 清除所有过期条目，返回清除数量
    pub fn sweep(&mut self) -> usize {
        let now = self.clock.now();
        let window = self.window;
        let before = self.entries.len();
        self.entries
            .retain(|_, at| now.saturating_duration_since(*at) < window);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for RecentEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecentEvents")
            .field("entries", &self.entries.len())
            .field("window", &self.window)
            .finish()
    }
}
