//! 可注入的单调时钟
//!
//! 去抖缓存与解析重试都通过 [`Clock`] 取时间和休眠，
//! 生产环境使用 [`SystemClock`]，测试中使用 [`ManualClock`] 手动推进时间。

use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    /// 当前单调时间
    fn now(&self) -> Instant;

    /// 阻塞当前线程
    fn sleep(&self, duration: Duration);
}

/// 基于 `Instant` 与 `thread::sleep` 的时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// 手动推进的时钟
///
/// `sleep` 不阻塞，只把时间向前推进，并累计休眠总时长。
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
    slept: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            slept: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.offset.lock() += duration;
    }

    /// 通过 `sleep` 累计的时长
    pub fn total_slept(&self) -> Duration {
        *self.slept.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }

    fn sleep(&self, duration: Duration) {
        *self.slept.lock() += duration;
        self.advance(duration);
    }
}
