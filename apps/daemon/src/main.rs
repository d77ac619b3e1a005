//! alvr-usb 主入口
//!
//! 保持 ADB 服务端存活，并把 ALVR 的固定端口转发到第一个接入的头显。

mod config;
mod discovery;
mod launcher;
mod logging;
mod singleton;

use alvr_usb_adb::AdbBackend;
use alvr_usb_core::{
    BridgeBackend, EventDispatcher, SessionManager, Supervisor, SupervisorConfig, SystemClock,
};
use anyhow::Context;
use clap::Parser;
use config::{CONFIG_FILE_NAME, Settings};
use discovery::AdbLocation;
use launcher::HostLauncher;
use logging::LogOptions;
use singleton::{LockError, SingletonLock};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::Ordering;

/// ALVR USB 转发器
///
/// 监管 ADB 服务端，头显接入后转发 9943/9944 端口并启动 ALVR
#[derive(Parser, Debug)]
#[command(name = "alvr-usb", version)]
#[command(about = "Forwards ALVR ports to a USB-connected headset over ADB", long_about = None)]
struct Args {
    /// 配置文件路径
    ///
    /// 默认: 可执行文件旁的 alvr-usb.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// 输出调试日志
    #[arg(long)]
    debug: bool,

    /// 写日志文件
    #[arg(long)]
    log: bool,

    /// 启动时清空日志文件
    #[arg(long)]
    log_truncate: bool,

    /// 锁文件路径
    ///
    /// 默认: 运行时目录（XDG_RUNTIME_DIR）或系统临时目录
    #[arg(long)]
    lock_file: Option<PathBuf>,
}

fn platform_supported() -> bool {
    cfg!(any(windows, target_os = "linux", target_os = "macos"))
}

/// 可执行文件所在目录，配置、日志和随附 adb 都相对于它
fn base_dir() -> anyhow::Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to locate current executable")?;
    Ok(exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            // 日志可能尚未初始化
            eprintln!("alvr-usb: {:#}", e);
            ExitCode::FAILURE
        },
    }
}

fn run() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let base_dir = base_dir()?;

    // 1. 配置与日志
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| base_dir.join(CONFIG_FILE_NAME));
    let mut settings = Settings::load(&config_path)?;
    settings.apply_flags(args.debug, args.log, args.log_truncate);

    let log_options = LogOptions {
        debug: settings.debug,
        file: settings.logging.then(|| settings.log_path(&base_dir)),
        truncate: settings.log_truncate,
    };
    let _log_guard = logging::init(&log_options)?;

    if settings.logging {
        tracing::debug!("Logging to {}", settings.log_path(&base_dir).display());
    } else {
        tracing::debug!("File logging disabled");
    }

    if !platform_supported() {
        tracing::error!("Unsupported platform!");
        return Ok(ExitCode::FAILURE);
    }

    // 2. 单例锁
    let lock_path = args
        .lock_file
        .clone()
        .unwrap_or_else(singleton::default_lock_path);
    let _lock = match SingletonLock::try_lock(&lock_path) {
        Ok(lock) => lock,
        Err(LockError::Held { path, pid }) => {
            match pid {
                Some(pid) => tracing::error!("alvr-usb is already running (pid {})", pid),
                None => tracing::error!("alvr-usb is already running"),
            }
            tracing::error!("Lock file: {}", path.display());
            return Ok(ExitCode::FAILURE);
        },
        Err(e) => {
            tracing::error!("{}", e);
            return Ok(ExitCode::FAILURE);
        },
    };

    // 3. 查找 adb
    let adb = match discovery::find_adb(&base_dir, settings.adb_override(&base_dir).as_deref()) {
        Some(location) => location,
        None => {
            tracing::error!("ADB executable not found!");
            return Ok(ExitCode::FAILURE);
        },
    };
    match &adb {
        AdbLocation::Configured(path) => tracing::debug!("Using configured ADB: {}", path.display()),
        AdbLocation::Local(path) => tracing::debug!("Found local ADB: {}", path.display()),
        AdbLocation::Global(path) => tracing::debug!("Found global ADB: {}", path.display()),
    }

    // 4. 组装组件
    let session_config = settings.session_config(&base_dir);
    tracing::debug!(
        "Allowed devices: {}",
        session_config.allow_list.iter().collect::<Vec<_>>().join(", ")
    );

    let supervisor_config = SupervisorConfig::new(adb.path());
    let backend = Arc::new(AdbBackend::new(adb.path(), supervisor_config.endpoint));
    let sessions = Arc::new(SessionManager::new(
        backend.clone(),
        Arc::new(HostLauncher::new(base_dir.clone())),
        Arc::new(SystemClock),
        session_config,
    ));

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    EventDispatcher::new(Arc::clone(&sessions), event_rx)
        .spawn()
        .context("failed to spawn device event dispatcher")?;

    let mut supervisor = Supervisor::new(backend.clone(), sessions, event_tx, supervisor_config);

    // 5. 信号处理只置位退出标志，停止后端在主线程完成
    let shutdown = supervisor.shutdown_handle();
    ctrlc::set_handler(move || {
        tracing::info!("Received interrupt signal. Shutting down...");
        shutdown.store(true, Ordering::Relaxed);
    })
    .context("failed to set signal handler")?;

    tracing::info!("alvr-usb {} started", env!("CARGO_PKG_VERSION"));

    // 6. 监管循环（阻塞直到退出）
    if let Err(e) = supervisor.run() {
        tracing::debug!("{}", e);
        return Ok(ExitCode::FAILURE);
    }

    if supervisor.launched_backend().load(Ordering::Relaxed) {
        tracing::info!("Killing ADB server...");
        if let Err(e) = backend.kill() {
            tracing::warn!("Failed to stop ADB server: {}", e);
        }
    }

    Ok(ExitCode::SUCCESS)
}
