//! 后端能力端口
//!
//! 设备桥接后端（ADB）被视为外部协作者，核心层只依赖这里定义的能力面。

use crate::device::{DeviceEvent, DeviceRecord};
use crossbeam_channel::Sender;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

/// 后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// 状态查询失败
    Query,
    /// 本地回环地址上的连接被拒绝（没有恢复策略，致命）
    ConnectionRefused,
    /// 其他连接错误（下一个 tick 重试）
    Connection,
    /// 后端可执行文件启动失败
    Start,
    /// 后端命令执行失败（转发、远程 shell、设备枚举）
    Command,
    /// 后端输出无法解析
    InvalidResponse,
    /// 设备不存在或已断开
    NoDevice,
}

/// 结构化后端错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 是否应终止整个进程
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, BackendErrorKind::ConnectionRefused)
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        Self::new(BackendErrorKind::Command, e.to_string())
    }
}

/// 后端运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackendStatus {
    pub running: bool,
}

/// 设备桥接后端能力
///
/// 所有方法都是同步的，由监管线程、分发线程和附着工作线程并发调用，
/// 因此实现必须是 `Send + Sync`。
pub trait BridgeBackend: Send + Sync {
    /// 查询后端是否在运行
    fn status(&self) -> Result<BackendStatus, BackendError>;

    /// 启动后端进程
    fn start(&self, executable: &Path) -> Result<(), BackendError>;

    /// 连接控制通道
    fn connect(&self, endpoint: SocketAddr) -> Result<(), BackendError>;

    /// 列出当前附着的全部设备
    fn list_devices(&self) -> Result<Vec<DeviceRecord>, BackendError>;

    /// 为设备建立 TCP 转发
    fn create_forward(
        &self,
        device: &DeviceRecord,
        local_port: u16,
        remote_port: u16,
    ) -> Result<(), BackendError>;

    /// 在设备上执行 shell 命令并返回输出（同步）
    fn run_remote_command(&self, device: &DeviceRecord, command: &str)
    -> Result<String, BackendError>;

    /// 停止后端进程
    fn kill(&self) -> Result<(), BackendError>;

    /// 订阅附着/断开通知
    ///
    /// 通知从后端自有的线程异步推送到 `events`，不保证恰好一次。
    fn subscribe(&self, events: Sender<DeviceEvent>) -> Result<(), BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_refused_is_fatal() {
        assert!(BackendError::new(BackendErrorKind::ConnectionRefused, "x").is_fatal());
        assert!(!BackendError::new(BackendErrorKind::Connection, "x").is_fatal());
        assert!(!BackendError::new(BackendErrorKind::Query, "x").is_fatal());
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new(BackendErrorKind::Command, "adb exited with 1");
        assert_eq!(err.to_string(), "Command: adb exited with 1");
    }
}
