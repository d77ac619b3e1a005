//! 基于 `adb` 命令行的后端实现

use crate::monitor::{DeviceMonitor, POLL_INTERVAL};
use crate::parse::parse_devices;
use alvr_usb_core::{
    BackendError, BackendErrorKind, BackendStatus, BridgeBackend, DeviceEvent, DeviceRecord,
};
use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;

/// 状态探测超时
const PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// 控制通道连接超时
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// 平台相关的 adb 可执行文件名
pub fn adb_executable_name() -> &'static str {
    if cfg!(windows) { "adb.exe" } else { "adb" }
}

/// `adb` 命令执行器（后端与监视线程共享）
struct AdbCli {
    executable: RwLock<PathBuf>,
    server_port: u16,
}

impl AdbCli {
    fn run<I, S>(&self, args: I, kind: BackendErrorKind) -> Result<String, BackendError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        let executable = self.executable.read().clone();
        let output = Command::new(&executable)
            .arg("-P")
            .arg(self.server_port.to_string())
            .args(args)
            .output()
            .map_err(|e| {
                BackendError::new(kind, format!("failed to run {}: {}", executable.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BackendError::new(
                kind,
                format!("adb exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn devices(&self) -> Result<Vec<DeviceRecord>, BackendError> {
        self.run(["devices", "-l"], BackendErrorKind::Command)
            .map(|output| parse_devices(&output))
    }
}

/// ADB 后端
pub struct AdbBackend {
    cli: Arc<AdbCli>,
    endpoint: SocketAddr,
    poll_interval: Duration,
    monitor: Mutex<Option<DeviceMonitor>>,
}

impl AdbBackend {
    /// `executable` 为 adb 可执行文件路径，`endpoint` 为 adb 服务端地址
    pub fn new(executable: impl Into<PathBuf>, endpoint: SocketAddr) -> Self {
        Self {
            cli: Arc::new(AdbCli {
                executable: RwLock::new(executable.into()),
                server_port: endpoint.port(),
            }),
            endpoint,
            poll_interval: POLL_INTERVAL,
            monitor: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn executable(&self) -> PathBuf {
        self.cli.executable.read().clone()
    }
}

impl BridgeBackend for AdbBackend {
    fn status(&self) -> Result<BackendStatus, BackendError> {
        match TcpStream::connect_timeout(&self.endpoint, PROBE_TIMEOUT) {
            Ok(_) => Ok(BackendStatus { running: true }),
            Err(e) if matches!(e.kind(), ErrorKind::ConnectionRefused | ErrorKind::TimedOut) => {
                Ok(BackendStatus { running: false })
            },
            Err(e) => Err(BackendError::new(
                BackendErrorKind::Query,
                format!("failed to query ADB server at {}: {}", self.endpoint, e),
            )),
        }
    }

    fn start(&self, executable: &Path) -> Result<(), BackendError> {
        *self.cli.executable.write() = executable.to_path_buf();
        self.cli
            .run(["start-server"], BackendErrorKind::Start)
            .map(|_| ())
    }

    fn connect(&self, endpoint: SocketAddr) -> Result<(), BackendError> {
        match TcpStream::connect_timeout(&endpoint, CONNECT_TIMEOUT) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::ConnectionRefused && endpoint.ip().is_loopback() => {
                Err(BackendError::new(
                    BackendErrorKind::ConnectionRefused,
                    format!("connection to {} refused", endpoint),
                ))
            },
            Err(e) => Err(BackendError::new(
                BackendErrorKind::Connection,
                format!("failed to connect to {}: {}", endpoint, e),
            )),
        }
    }

    fn list_devices(&self) -> Result<Vec<DeviceRecord>, BackendError> {
        self.cli.devices()
    }

    fn create_forward(
        &self,
        device: &DeviceRecord,
        local_port: u16,
        remote_port: u16,
    ) -> Result<(), BackendError> {
        self.cli
            .run(
                [
                    "-s".to_string(),
                    device.serial.clone(),
                    "forward".to_string(),
                    format!("tcp:{}", local_port),
                    format!("tcp:{}", remote_port),
                ],
                BackendErrorKind::Command,
            )
            .map(|_| ())
    }

    fn run_remote_command(
        &self,
        device: &DeviceRecord,
        command: &str,
    ) -> Result<String, BackendError> {
        self.cli.run(
            ["-s", device.serial.as_str(), "shell", command],
            BackendErrorKind::Command,
        )
    }

    fn kill(&self) -> Result<(), BackendError> {
        if let Some(mut monitor) = self.monitor.lock().take() {
            monitor.stop();
        }
        self.cli
            .run(["kill-server"], BackendErrorKind::Command)
            .map(|_| ())
    }

    fn subscribe(&self, events: Sender<DeviceEvent>) -> Result<(), BackendError> {
        let mut slot = self.monitor.lock();
        if slot.is_some() {
            return Ok(());
        }

        let cli = Arc::clone(&self.cli);
        let monitor = DeviceMonitor::spawn(move || cli.devices(), events, self.poll_interval)
            .map_err(|e| {
                BackendError::new(
                    BackendErrorKind::Command,
                    format!("failed to spawn device monitor: {}", e),
                )
            })?;
        *slot = Some(monitor);
        Ok(())
    }
}
