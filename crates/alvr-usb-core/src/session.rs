//! 设备会话状态机
//!
//! 全局只有一个会话槽位。第一个通过允许列表的设备占用槽位并转发固定端口，
//! 直到它断开为止；期间其他设备一律拒绝（不排队、不抢占），
//! 因为固定端口无法复用，接纳第二个设备会悄悄打断第一个会话的流量。
//!
//! # 线程模型
//!
//! `handle_attach` 在每个附着事件自己的工作线程中调用（解析可能阻塞数秒），
//! `handle_detach` 在分发线程中调用。槽位、去抖缓存和断开代数共用一把锁，
//! 锁内只做簿记，任何后端调用都不持锁：
//! 先在锁内预占槽位（`pending`，对其他设备视为已占用），
//! 释放锁后转发端口，再重新加锁提交或回滚。
//! 进程启动、客户端探测和钩子同样在锁外执行。

use crate::backend::{BackendError, BridgeBackend};
use crate::clock::Clock;
use crate::debounce::RecentEvents;
use crate::device::{AllowList, DeviceRecord, FORWARDED_PORTS};
use crate::effects::{CompanionLauncher, HookCommand, SERVER_RUNTIME_PROCESS, process_name_of};
use crate::resolver::DeviceResolver;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// 会话相关配置
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// 可进入会话的产品标签
    pub allow_list: AllowList,
    /// 伴随服务端可执行文件（ALVR Launcher）
    pub server_path: Option<PathBuf>,
    /// 头显客户端 Activity（`package/activity`）
    pub client_activity: Option<String>,
    /// 会话建立后执行的钩子
    pub connect_hook: Option<HookCommand>,
    /// 会话关闭后执行的钩子
    pub disconnect_hook: Option<HookCommand>,
}

/// 活跃会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub device: DeviceRecord,
    pub forwarded_ports: [u16; 2],
    pub opened_at: Instant,
}

/// 附着事件的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// 端口已转发，会话建立
    Activated { serial: String },
    /// 同一设备重复附着，没有任何副作用
    AlreadyActive { serial: String },
    /// 产品不在允许列表中；`logged` 为 false 表示日志被去抖降级
    Skipped { label: String, logged: bool },
    /// 其他设备占用着槽位
    Conflict { active_serial: String },
    /// 解析期间设备已断开
    Stale { serial: String },
    /// 端口转发失败，槽位保持为空
    ForwardFailed { serial: String, error: BackendError },
}

/// 断开事件的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachOutcome {
    /// 活跃会话已拆除
    TornDown { serial: String },
    /// 非活跃设备，仅更新去抖缓存
    Ignored { logged: bool },
}

struct SessionState {
    active: Option<Session>,
    /// 已预占槽位、正在转发端口的设备
    pending: Option<String>,
    recent: RecentEvents,
    /// 每个序列号的断开次数，用于丢弃解析期间已失效的附着
    detach_generation: HashMap<String, u64>,
    /// 每个序列号正在处理的附着数
    in_flight: HashMap<String, usize>,
}

impl SessionState {
    fn generation(&self, serial: &str) -> u64 {
        self.detach_generation.get(serial).copied().unwrap_or(0)
    }

    fn active_serial(&self) -> Option<&str> {
        self.active.as_ref().map(|s| s.device.serial.as_str())
    }

    /// 占用槽位的设备（已激活或正在激活）
    fn owner(&self) -> Option<&str> {
        self.active_serial().or(self.pending.as_deref())
    }

    fn finish_attach(&mut self, serial: &str) {
        if let Some(count) = self.in_flight.get_mut(serial) {
            *count -= 1;
            if *count == 0 {
                self.in_flight.remove(serial);
            }
        }
    }

    /// 丢弃没有附着在处理中的断开代数
    fn prune_generations(&mut self) {
        let in_flight = &self.in_flight;
        self.detach_generation
            .retain(|serial, _| in_flight.contains_key(serial));
    }
}

pub struct SessionManager {
    backend: Arc<dyn BridgeBackend>,
    launcher: Arc<dyn CompanionLauncher>,
    clock: Arc<dyn Clock>,
    resolver: DeviceResolver,
    config: SessionConfig,
    state: Mutex<SessionState>,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn BridgeBackend>,
        launcher: Arc<dyn CompanionLauncher>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        let resolver = DeviceResolver::new(Arc::clone(&backend), Arc::clone(&clock));
        let state = SessionState {
            active: None,
            pending: None,
            recent: RecentEvents::new(Arc::clone(&clock)),
            detach_generation: HashMap::new(),
            in_flight: HashMap::new(),
        };
        Self {
            backend,
            launcher,
            clock,
            resolver,
            config,
            state: Mutex::new(state),
        }
    }

    /// 替换解析器（例如调整重试参数）
    pub fn with_resolver(mut self, resolver: DeviceResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// 当前活跃会话的快照
    pub fn session(&self) -> Option<Session> {
        self.state.lock().active.clone()
    }

    pub fn active_serial(&self) -> Option<String> {
        self.state.lock().active_serial().map(str::to_string)
    }

    /// 清除过期的去抖条目（每个监管 tick 调用一次）
    ///
    /// 顺带丢弃不再需要的断开代数。
    pub fn sweep_recent(&self) -> usize {
        let mut state = self.state.lock();
        state.prune_generations();
        state.recent.sweep()
    }

    /// 该序列号当前是否在去抖窗口内
    pub fn is_recent(&self, serial: &str) -> bool {
        self.state.lock().recent.is_recent(serial)
    }

    /// 处理附着通知
    ///
    /// 可能阻塞（身份解析最多约 5 秒，另加端口转发），调用方应在独立线程中执行。
    pub fn handle_attach(&self, raw: DeviceRecord) -> AttachOutcome {
        let serial = raw.serial.clone();

        let generation = {
            let mut state = self.state.lock();
            if state.recent.is_recent(&serial) {
                tracing::debug!("Connected device: {}", serial);
            } else {
                tracing::info!("Connected device: {}", serial);
            }

            if state.owner() == Some(serial.as_str()) {
                tracing::debug!("Device {} already owns the session", serial);
                return AttachOutcome::AlreadyActive { serial };
            }
            *state.in_flight.entry(serial.clone()).or_insert(0) += 1;
            state.generation(&serial)
        };

        let outcome = self.admit(raw, generation);
        self.state.lock().finish_attach(&serial);
        outcome
    }

    fn admit(&self, raw: DeviceRecord, generation: u64) -> AttachOutcome {
        let serial = raw.serial.clone();

        tracing::debug!("ForwardPorts: {:?}", raw);
        let resolution = self.resolver.resolve(raw);
        let device = resolution.record;

        if !self.config.allow_list.contains(&device.product) {
            let logged = !self.state.lock().recent.check_and_record(&serial);
            if logged {
                tracing::info!("Skipped device: {}", device.label());
            } else {
                tracing::debug!("Skipped device: {} (repeated)", device.label());
            }
            return AttachOutcome::Skipped {
                label: device.label().to_string(),
                logged,
            };
        }

        // 预占槽位
        {
            let mut state = self.state.lock();

            if state.generation(&serial) != generation {
                tracing::debug!("Device {} detached while resolving, dropping attach", serial);
                return AttachOutcome::Stale { serial };
            }

            match state.owner() {
                Some(owner) if owner == serial => {
                    return AttachOutcome::AlreadyActive { serial };
                },
                Some(owner) => {
                    // 冲突每次都记录，不去抖
                    tracing::warn!(
                        "Ports already forwarded for device {}, skipped {} ({})",
                        owner,
                        serial,
                        device.product
                    );
                    return AttachOutcome::Conflict {
                        active_serial: owner.to_string(),
                    };
                },
                None => state.pending = Some(serial.clone()),
            }
        }

        let forwarded = FORWARDED_PORTS.iter().try_for_each(|&port| {
            self.backend
                .create_forward(&device, port, port)
                .map_err(|e| (port, e))
        });

        // 提交或回滚
        {
            let mut state = self.state.lock();
            state.pending = None;

            if let Err((port, e)) = forwarded {
                tracing::error!(
                    "Failed to forward port {} for device {}: {}",
                    port,
                    serial,
                    e
                );
                return AttachOutcome::ForwardFailed { serial, error: e };
            }

            if state.generation(&serial) != generation {
                tracing::debug!("Device {} detached while forwarding, dropping attach", serial);
                return AttachOutcome::Stale { serial };
            }

            state.active = Some(Session {
                device: device.clone(),
                forwarded_ports: FORWARDED_PORTS,
                opened_at: self.clock.now(),
            });
        }

        tracing::info!(
            "Forwarded ports for device: {} ({})",
            device.serial,
            device.product
        );

        self.run_activation_effects(&device);

        AttachOutcome::Activated { serial }
    }

    /// 处理断开通知
    pub fn handle_detach(&self, serial: &str) -> DetachOutcome {
        let (torn_down, logged) = {
            let mut state = self.state.lock();
            let logged = !state.recent.check_and_record(serial);
            *state.detach_generation.entry(serial.to_string()).or_insert(0) += 1;

            let torn_down = if state.active_serial() == Some(serial) {
                state.active.take()
            } else {
                None
            };
            (torn_down, logged)
        };

        if logged {
            tracing::info!("Disconnected device: {}", serial);
        } else {
            tracing::debug!("Disconnected device: {}", serial);
        }

        match torn_down {
            Some(session) => {
                tracing::info!(
                    "Closed session for device: {} (open for {:?})",
                    serial,
                    self.clock.now().saturating_duration_since(session.opened_at)
                );
                if let Some(hook) = &self.config.disconnect_hook {
                    self.run_hook(hook, "disconnect");
                }
                DetachOutcome::TornDown {
                    serial: serial.to_string(),
                }
            },
            None => DetachOutcome::Ignored { logged },
        }
    }

    /// 会话建立后的副作用，按顺序执行，互不阻塞
    fn run_activation_effects(&self, device: &DeviceRecord) {
        if let Some(path) = &self.config.server_path {
            self.launch_server(path);
        }
        if let Some(activity) = &self.config.client_activity {
            self.launch_client(device, activity);
        }
        if let Some(hook) = &self.config.connect_hook {
            self.run_hook(hook, "connect");
        }
    }

    /// 启动伴随服务端，除非它已经在运行
    ///
    /// 服务端运行时会改名为 SteamVR 的进程名，所以两个名字都要检查。
    fn launch_server(&self, path: &std::path::Path) {
        if self.launcher.is_running(&[SERVER_RUNTIME_PROCESS]) {
            tracing::debug!("Process found: {}", SERVER_RUNTIME_PROCESS);
            return;
        }
        tracing::debug!("Process not found: {}", SERVER_RUNTIME_PROCESS);

        if let Some(name) = process_name_of(path)
            && self.launcher.is_running(&[name.as_str()])
        {
            tracing::debug!("Process found: {}", name);
            return;
        }

        match self.launcher.launch(path) {
            Ok(()) => tracing::info!("Launching ALVR..."),
            Err(e) => tracing::warn!("Failed to launch ALVR server: {}", e),
        }
    }

    /// 在头显上启动客户端 Activity：已安装且未运行时才发出启动命令
    fn launch_client(&self, device: &DeviceRecord, activity: &str) {
        let package = match activity.split_once('/') {
            Some((package, _)) if !package.is_empty() => package,
            _ => {
                tracing::warn!("Invalid client activity '{}', expected package/activity", activity);
                return;
            },
        };

        let installed = match self
            .backend
            .run_remote_command(device, &format!("pm list packages {}", package))
        {
            Ok(output) => is_package_listed(&output, package),
            Err(e) => {
                tracing::warn!("Failed to query packages on {}: {}", device.serial, e);
                return;
            },
        };
        if !installed {
            tracing::info!("Client {} is not installed on {}", package, device.serial);
            return;
        }

        match self
            .backend
            .run_remote_command(device, &format!("pidof {}", package))
        {
            Ok(output) if !output.trim().is_empty() => {
                tracing::debug!("Client {} already running on {}", package, device.serial);
                return;
            },
            Ok(_) => {},
            // pidof 在进程不存在时返回非零退出码
            Err(e) => {
                tracing::debug!("Client {} not running on {}: {}", package, device.serial, e);
            },
        }

        match self
            .backend
            .run_remote_command(device, &format!("am start -n {}", activity))
        {
            Ok(_) => tracing::info!("Launching ALVR client on {}...", device.serial),
            Err(e) => tracing::warn!("Failed to launch client on {}: {}", device.serial, e),
        }
    }

    fn run_hook(&self, hook: &HookCommand, event: &str) {
        tracing::debug!("Running {} hook: {}", event, hook.command);
        if let Err(e) = self.launcher.run_hook(hook) {
            tracing::warn!("Failed to run {} hook: {}", event, e);
        }
    }
}

/// `pm list packages <name>` 做的是子串匹配，这里要求精确匹配
fn is_package_listed(output: &str, package: &str) -> bool {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("package:"))
        .any(|name| name == package)
}
