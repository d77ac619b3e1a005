//! Mock 后端与进程启动器
//!
//! 用于测试的可编排后端：记录所有调用，按队列返回预设结果。

#![allow(dead_code)]

use alvr_usb_core::{
    BackendError, BackendStatus, BridgeBackend, CompanionLauncher, DeviceEvent, DeviceRecord,
    HookCommand, LaunchError, ManualClock, SessionConfig, SessionManager,
};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type ListHook = Box<dyn FnOnce() + Send>;

/// 模拟设备桥接后端
#[derive(Default)]
pub struct MockBackend {
    running: Mutex<bool>,
    status_results: Mutex<VecDeque<Result<BackendStatus, BackendError>>>,
    connect_results: Mutex<VecDeque<Result<(), BackendError>>>,
    devices: Mutex<Vec<DeviceRecord>>,
    responses: Mutex<Vec<(String, String)>>,
    fail_forward: Mutex<Option<BackendError>>,
    command_failures: Mutex<Vec<(String, BackendError)>>,
    forward_gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
    list_hook: Mutex<Option<ListHook>>,

    pub starts: Mutex<Vec<PathBuf>>,
    pub connects: Mutex<Vec<SocketAddr>>,
    pub kills: Mutex<usize>,
    pub list_calls: Mutex<usize>,
    pub forwards: Mutex<Vec<(String, u16, u16)>>,
    pub commands: Mutex<Vec<(String, String)>>,
    pub subscribers: Mutex<Vec<Sender<DeviceEvent>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_running(&self, running: bool) {
        *self.running.lock() = running;
    }

    pub fn push_status(&self, result: Result<BackendStatus, BackendError>) {
        self.status_results.lock().push_back(result);
    }

    pub fn push_connect(&self, result: Result<(), BackendError>) {
        self.connect_results.lock().push_back(result);
    }

    pub fn set_devices(&self, devices: Vec<DeviceRecord>) {
        *self.devices.lock() = devices;
    }

    /// 以 `prefix` 开头的远程命令返回 `output`
    pub fn respond(&self, prefix: &str, output: &str) {
        self.responses
            .lock()
            .push((prefix.to_string(), output.to_string()));
    }

    pub fn fail_forwards(&self, error: BackendError) {
        *self.fail_forward.lock() = Some(error);
    }

    /// 以 `prefix` 开头的远程命令返回 `error`（记录调用后）
    pub fn fail_command(&self, prefix: &str, error: BackendError) {
        self.command_failures
            .lock()
            .push((prefix.to_string(), error));
    }

    /// 让端口转发阻塞：每次转发先通知返回的 `entered`，再等待 `release`
    pub fn gate_forwards(&self) -> (Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        *self.forward_gate.lock() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }

    /// 下一次设备枚举前执行一次 `hook`
    pub fn on_next_list(&self, hook: impl FnOnce() + Send + 'static) {
        *self.list_hook.lock() = Some(Box::new(hook));
    }

    pub fn forward_count(&self) -> usize {
        self.forwards.lock().len()
    }

    pub fn command_log(&self) -> Vec<String> {
        self.commands.lock().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl BridgeBackend for MockBackend {
    fn status(&self) -> Result<BackendStatus, BackendError> {
        if let Some(result) = self.status_results.lock().pop_front() {
            return result;
        }
        Ok(BackendStatus {
            running: *self.running.lock(),
        })
    }

    fn start(&self, executable: &Path) -> Result<(), BackendError> {
        self.starts.lock().push(executable.to_path_buf());
        self.set_running(true);
        Ok(())
    }

    fn connect(&self, endpoint: SocketAddr) -> Result<(), BackendError> {
        self.connects.lock().push(endpoint);
        self.connect_results.lock().pop_front().unwrap_or(Ok(()))
    }

    fn list_devices(&self) -> Result<Vec<DeviceRecord>, BackendError> {
        let hook = self.list_hook.lock().take();
        if let Some(hook) = hook {
            hook();
        }
        *self.list_calls.lock() += 1;
        Ok(self.devices.lock().clone())
    }

    fn create_forward(
        &self,
        device: &DeviceRecord,
        local_port: u16,
        remote_port: u16,
    ) -> Result<(), BackendError> {
        let gate = self.forward_gate.lock().clone();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }
        if let Some(error) = self.fail_forward.lock().clone() {
            return Err(error);
        }
        self.forwards
            .lock()
            .push((device.serial.clone(), local_port, remote_port));
        Ok(())
    }

    fn run_remote_command(
        &self,
        device: &DeviceRecord,
        command: &str,
    ) -> Result<String, BackendError> {
        self.commands
            .lock()
            .push((device.serial.clone(), command.to_string()));
        if let Some((_, error)) = self
            .command_failures
            .lock()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
        {
            return Err(error.clone());
        }
        let output = self
            .responses
            .lock()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default();
        Ok(output)
    }

    fn kill(&self) -> Result<(), BackendError> {
        *self.kills.lock() += 1;
        self.set_running(false);
        Ok(())
    }

    fn subscribe(&self, events: Sender<DeviceEvent>) -> Result<(), BackendError> {
        self.subscribers.lock().push(events);
        Ok(())
    }
}

/// 记录启动请求的进程启动器
#[derive(Default)]
pub struct RecordingLauncher {
    running: Mutex<HashSet<String>>,
    pub launches: Mutex<Vec<PathBuf>>,
    pub hooks: Mutex<Vec<HookCommand>>,
}

impl RecordingLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_running(&self, name: &str) {
        self.running.lock().insert(name.to_string());
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }

    pub fn hook_commands(&self) -> Vec<String> {
        self.hooks.lock().iter().map(|h| h.command.clone()).collect()
    }
}

impl CompanionLauncher for RecordingLauncher {
    fn is_running(&self, process_names: &[&str]) -> bool {
        let running = self.running.lock();
        process_names.iter().any(|name| running.contains(*name))
    }

    fn launch(&self, program: &Path) -> Result<(), LaunchError> {
        self.launches.lock().push(program.to_path_buf());
        Ok(())
    }

    fn run_hook(&self, hook: &HookCommand) -> Result<(), LaunchError> {
        self.hooks.lock().push(hook.clone());
        Ok(())
    }
}

pub const CLIENT_ACTIVITY: &str = "alvr.client.quest/com.polygraphene.alvr.OvrActivity";

/// 配置了服务端、客户端和两个钩子的会话配置
pub fn full_config() -> SessionConfig {
    SessionConfig {
        server_path: Some(PathBuf::from("ALVR Launcher.exe")),
        client_activity: Some(CLIENT_ACTIVITY.to_string()),
        connect_hook: Some(HookCommand::new("echo connected", ".")),
        disconnect_hook: Some(HookCommand::new("echo disconnected", ".")),
        ..SessionConfig::default()
    }
}

pub struct Harness {
    pub backend: Arc<MockBackend>,
    pub launcher: Arc<RecordingLauncher>,
    pub clock: Arc<ManualClock>,
    pub sessions: Arc<SessionManager>,
}

pub fn harness(config: SessionConfig) -> Harness {
    let backend = MockBackend::new();
    let launcher = RecordingLauncher::new();
    let clock = Arc::new(ManualClock::new());
    let sessions = Arc::new(SessionManager::new(
        backend.clone(),
        launcher.clone(),
        clock.clone(),
        config,
    ));
    Harness {
        backend,
        launcher,
        clock,
        sessions,
    }
}

pub fn quest(serial: &str) -> DeviceRecord {
    DeviceRecord::with_product(serial, "hollywood")
}
