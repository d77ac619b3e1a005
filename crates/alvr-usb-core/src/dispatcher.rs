//! 设备事件分发
//!
//! 后端通知线程把事件推入单一有序通道，由分发线程串行消费：
//! 断开事件直接在分发线程处理（只持锁，很快），
//! 附着事件交给独立的工作线程，解析重试的休眠不会阻塞其他设备。

use crate::device::DeviceEvent;
use crate::session::SessionManager;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub struct EventDispatcher {
    sessions: Arc<SessionManager>,
    events: Receiver<DeviceEvent>,
}

impl EventDispatcher {
    pub fn new(sessions: Arc<SessionManager>, events: Receiver<DeviceEvent>) -> Self {
        Self { sessions, events }
    }

    /// 在后台线程中运行分发循环
    pub fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("device_events".into())
            .spawn(move || self.run())
    }

    /// 分发循环，通道断开时返回
    pub fn run(self) {
        for event in self.events.iter() {
            // 附着工作线程独立运行，不等待
            let _ = Self::dispatch(&self.sessions, event);
        }
        tracing::debug!("Device event channel closed, dispatcher exiting");
    }

    /// 处理单个事件；附着事件返回其工作线程句柄
    pub fn dispatch(
        sessions: &Arc<SessionManager>,
        event: DeviceEvent,
    ) -> Option<JoinHandle<()>> {
        match event {
            DeviceEvent::Detached(serial) => {
                sessions.handle_detach(&serial);
                None
            },
            DeviceEvent::Attached(device) => {
                let sessions = Arc::clone(sessions);
                let serial = device.serial.clone();
                let spawned = thread::Builder::new()
                    .name(format!("attach-{}", serial))
                    .spawn(move || {
                        sessions.handle_attach(device);
                    });
                match spawned {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        tracing::error!("Failed to spawn attach worker for {}: {}", serial, e);
                        None
                    },
                }
            },
        }
    }
}
