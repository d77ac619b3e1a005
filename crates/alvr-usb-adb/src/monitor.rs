//! 设备附着/断开监视
//!
//! 后台线程按固定间隔枚举设备，与上一轮结果做差分后推送 [`DeviceEvent`]。
//! 设备首次出现、或产品标签从无到有时推送 `Attached`（重复推送由会话层容忍），
//! 设备消失时推送 `Detached`。枚举失败的一轮直接跳过，不做差分。

use alvr_usb_core::{BackendError, DeviceEvent, DeviceRecord};
use crossbeam_channel::Sender;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 默认轮询间隔
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// 监视线程句柄，drop 时停止线程
pub struct DeviceMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DeviceMonitor {
    /// 启动监视线程
    ///
    /// `list` 每轮调用一次；事件通道断开时线程退出。
    pub fn spawn<F>(
        list: F,
        events: Sender<DeviceEvent>,
        interval: Duration,
    ) -> std::io::Result<Self>
    where
        F: Fn() -> Result<Vec<DeviceRecord>, BackendError> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("adb_device_monitor".into())
            .spawn(move || {
                let mut known: HashMap<String, DeviceRecord> = HashMap::new();

                while !stop_clone.load(Ordering::Relaxed) {
                    match list() {
                        Ok(current) => {
                            for event in diff(&known, &current) {
                                if events.send(event).is_err() {
                                    tracing::debug!("Device event receiver dropped, monitor exiting");
                                    return;
                                }
                            }
                            known = current
                                .into_iter()
                                .map(|device| (device.serial.clone(), device))
                                .collect();
                        },
                        Err(e) => tracing::trace!("Device poll failed: {}", e),
                    }
                    thread::sleep(interval);
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DeviceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// 计算两轮枚举之间的事件
pub fn diff(known: &HashMap<String, DeviceRecord>, current: &[DeviceRecord]) -> Vec<DeviceEvent> {
    let mut events = Vec::new();

    for device in current {
        match known.get(&device.serial) {
            None => events.push(DeviceEvent::Attached(device.clone())),
            Some(previous) if !previous.has_product() && device.has_product() => {
                events.push(DeviceEvent::Attached(device.clone()));
            },
            Some(_) => {},
        }
    }

    let mut gone: Vec<&String> = known
        .keys()
        .filter(|serial| !current.iter().any(|d| &&d.serial == serial))
        .collect();
    gone.sort();
    events.extend(gone.into_iter().map(|serial| DeviceEvent::Detached(serial.clone())));

    events
}
