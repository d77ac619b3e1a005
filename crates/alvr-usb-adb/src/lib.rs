//! # ADB 后端
//!
//! 通过 `adb` 可执行文件实现 [`BridgeBackend`](alvr_usb_core::BridgeBackend)：
//! - 状态查询与控制通道连接：对服务端端口做 TCP 探测
//! - 启动/停止：`adb start-server` / `adb kill-server`
//! - 设备枚举：`adb devices -l`
//! - 端口转发与远程命令：`adb -s <serial> forward` / `adb -s <serial> shell`
//! - 附着/断开通知：后台线程轮询设备列表并做差分
//!
//! 不实现 ADB 线协议本身。

mod backend;
pub mod monitor;
pub mod parse;

pub use backend::{AdbBackend, adb_executable_name};
pub use monitor::DeviceMonitor;
pub use parse::parse_devices;
