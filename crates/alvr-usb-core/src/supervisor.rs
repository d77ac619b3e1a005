//! 后端监管循环
//!
//! 固定 100ms tick：查询后端状态 → 必要时启动后端 → 必要时连接控制通道
//! → 首次连通后订阅设备事件（整个进程生命周期只订阅一次）→ 清理去抖缓存。
//!
//! 本地回环上的连接被拒绝没有恢复策略，直接返回致命错误；
//! 其他连接错误只记录日志，下一个 tick 重试。

use crate::backend::{BackendError, BridgeBackend};
use crate::device::DeviceEvent;
use crate::session::SessionManager;
use crossbeam_channel::Sender;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// ADB 服务端默认端口
pub const DEFAULT_BACKEND_PORT: u16 = 5037;

/// 监管 tick 间隔
pub const TICK_INTERVAL: Duration = Duration::from_millis(100);

/// 后端连接状态（仅监管循环持有）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendConnectionState {
    /// 尚未查询
    Unknown,
    /// 后端未运行
    Down,
    /// 已发出启动命令
    Starting,
    /// 后端运行中，控制通道未连接
    UpDisconnected,
    /// 后端运行中，控制通道已连接
    UpConnected,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// 后端可执行文件
    pub backend_executable: PathBuf,
    /// 控制通道地址
    pub endpoint: SocketAddr,
    pub tick_interval: Duration,
}

impl SupervisorConfig {
    pub fn new(backend_executable: impl Into<PathBuf>) -> Self {
        Self {
            backend_executable: backend_executable.into(),
            endpoint: SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::LOCALHOST,
                DEFAULT_BACKEND_PORT,
            )),
            tick_interval: TICK_INTERVAL,
        }
    }
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    /// 控制通道连接被拒绝（致命）
    #[error("connection to backend at {endpoint} refused: {source}")]
    ConnectionRefused {
        endpoint: SocketAddr,
        #[source]
        source: BackendError,
    },
}

pub struct Supervisor {
    backend: Arc<dyn BridgeBackend>,
    sessions: Arc<SessionManager>,
    events: Sender<DeviceEvent>,
    config: SupervisorConfig,
    state: BackendConnectionState,
    connected: bool,
    /// 控制通道是否曾经连通过（避免第一个 tick 报告"连接丢失"）
    was_healthy: bool,
    subscribed: bool,
    /// 后端是否由本进程启动（决定退出时是否停止后端）
    launched_backend: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(
        backend: Arc<dyn BridgeBackend>,
        sessions: Arc<SessionManager>,
        events: Sender<DeviceEvent>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            backend,
            sessions,
            events,
            config,
            state: BackendConnectionState::Unknown,
            connected: false,
            was_healthy: false,
            subscribed: false,
            launched_backend: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> BackendConnectionState {
        self.state
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// 后端是否由本进程启动
    pub fn launched_backend(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.launched_backend)
    }

    /// 置位后监管循环在下一个 tick 前退出
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// 运行监管循环，直到关闭或遇到致命错误
    pub fn run(&mut self) -> Result<(), SupervisorError> {
        tracing::debug!("Checking initial ADB server status...");
        while !self.shutdown.load(Ordering::Relaxed) {
            self.tick()?;
            thread::sleep(self.config.tick_interval);
        }
        tracing::debug!("Supervisor loop stopped");
        Ok(())
    }

    /// 执行一次监管 tick
    pub fn tick(&mut self) -> Result<(), SupervisorError> {
        let running = match self.backend.status() {
            Ok(status) => status.running,
            Err(e) => {
                tracing::error!("{}", e);
                false
            },
        };

        if running {
            if !self.connected {
                self.state = BackendConnectionState::UpDisconnected;
            }
        } else {
            if self.was_healthy && self.state == BackendConnectionState::UpConnected {
                tracing::error!("ADB server connection lost...");
            }
            self.state = BackendConnectionState::Down;
            self.connected = false;

            tracing::warn!("Starting ADB server...");
            match self.backend.start(&self.config.backend_executable) {
                Ok(()) => {
                    self.launched_backend.store(true, Ordering::Relaxed);
                    self.state = BackendConnectionState::Starting;
                },
                Err(e) => tracing::error!("Failed to start ADB server: {}", e),
            }
        }

        if !self.connected {
            match self.backend.connect(self.config.endpoint) {
                Ok(()) => {
                    self.connected = true;
                    self.state = BackendConnectionState::UpConnected;
                    if self.was_healthy {
                        tracing::info!("ADB server connection restored!");
                    }
                    self.was_healthy = true;
                },
                Err(e) if e.is_fatal() => {
                    tracing::error!("Connection to ADB server failed!");
                    return Err(SupervisorError::ConnectionRefused {
                        endpoint: self.config.endpoint,
                        source: e,
                    });
                },
                Err(e) => tracing::error!("{}", e),
            }
        }

        if self.connected && !self.subscribed {
            match self.backend.subscribe(self.events.clone()) {
                Ok(()) => {
                    self.subscribed = true;
                    tracing::info!("Monitoring for devices...");
                },
                Err(e) => tracing::error!("Failed to subscribe to device events: {}", e),
            }
        }

        let evicted = self.sessions.sweep_recent();
        if evicted > 0 {
            tracing::trace!("Evicted {} recent device events", evicted);
        }

        Ok(())
    }
}
