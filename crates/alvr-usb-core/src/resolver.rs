//! 设备身份解析
//!
//! 附着通知可能早于完整元数据到达（产品标签为空）。解析器以固定间隔
//! 重新枚举设备，直到产品标签出现或重试次数耗尽。超时不是错误，
//! 只退化为"产品未知"，由允许列表统一拒绝。

use crate::backend::BridgeBackend;
use crate::clock::Clock;
use crate::device::DeviceRecord;
use std::sync::Arc;
use std::time::Duration;

/// 最大重试次数
pub const MAX_ATTEMPTS: u32 = 5;

/// 重试间隔
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// 解析结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// 最终记录（未解析时产品标签为空）
    pub record: DeviceRecord,
    /// 消耗的重试次数（通知已带产品标签时为 0）
    pub attempts: u32,
}

impl Resolution {
    pub fn is_resolved(&self) -> bool {
        self.record.has_product()
    }
}

pub struct DeviceResolver {
    backend: Arc<dyn BridgeBackend>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    interval: Duration,
}

impl DeviceResolver {
    pub fn new(backend: Arc<dyn BridgeBackend>, clock: Arc<dyn Clock>) -> Self {
        Self {
            backend,
            clock,
            max_attempts: MAX_ATTEMPTS,
            interval: RETRY_INTERVAL,
        }
    }

    pub fn with_retry(mut self, max_attempts: u32, interval: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.interval = interval;
        self
    }

    /// 解析设备身份
    ///
    /// 阻塞调用线程（最多 `max_attempts * interval`），只应在该设备的工作线程中调用。
    pub fn resolve(&self, raw: DeviceRecord) -> Resolution {
        if raw.has_product() {
            return Resolution {
                record: raw,
                attempts: 0,
            };
        }

        let mut record = raw;
        for attempt in 1..=self.max_attempts {
            self.clock.sleep(self.interval);

            let devices = match self.backend.list_devices() {
                Ok(devices) => devices,
                Err(e) => {
                    tracing::debug!(
                        "Listing devices for {} failed (attempt {}/{}): {}",
                        record.serial,
                        attempt,
                        self.max_attempts,
                        e
                    );
                    continue;
                },
            };

            if let Some(found) = devices.into_iter().find(|d| d.serial == record.serial) {
                tracing::debug!(
                    "DeviceData: {} {} {} {} (attempt {}/{})",
                    found.model_name,
                    found.display_name,
                    found.product,
                    found.serial,
                    attempt,
                    self.max_attempts
                );
                if found.has_product() {
                    return Resolution {
                        record: found,
                        attempts: attempt,
                    };
                }
                // 保留最新的部分元数据（例如连接状态）
                record = found;
            }
        }

        Resolution {
            record,
            attempts: self.max_attempts,
        }
    }
}
