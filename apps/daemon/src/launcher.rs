//! 主机进程执行器
//!
//! 实现 [`CompanionLauncher`]：用 `sysinfo` 枚举进程，用 `Command` 启动伴随服务端
//! 和钩子命令。子进程的 stdout/stderr 由后台线程逐行写入日志，
//! 进程结束后在同一线程回收并记录退出状态。

use alvr_usb_core::{CompanionLauncher, HookCommand, LaunchError};
use parking_lot::Mutex;
use std::ffi::OsStr;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use sysinfo::{ProcessesToUpdate, System};

pub struct HostLauncher {
    /// 伴随服务端的工作目录
    working_dir: PathBuf,
    system: Mutex<System>,
}

impl HostLauncher {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            system: Mutex::new(System::new()),
        }
    }
}

impl CompanionLauncher for HostLauncher {
    fn is_running(&self, process_names: &[&str]) -> bool {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);

        system
            .processes()
            .values()
            .any(|process| matches_any(process.name(), process_names))
    }

    fn launch(&self, program: &Path) -> Result<(), LaunchError> {
        let mut command = Command::new(program);
        command.current_dir(&self.working_dir);

        let label = program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());
        spawn_logged(command, label)
    }

    fn run_hook(&self, hook: &HookCommand) -> Result<(), LaunchError> {
        if hook.command.trim().is_empty() {
            return Err(LaunchError::EmptyCommand);
        }

        let mut command = shell_command(&hook.command);
        command.current_dir(&hook.working_dir);
        spawn_logged(command, hook.command.clone())
    }
}

/// 进程名去掉扩展名后与任一名字匹配（不区分大小写）
fn matches_any(process_name: &OsStr, names: &[&str]) -> bool {
    let name = process_name.to_string_lossy();
    let stem = Path::new(process_name)
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();

    names
        .iter()
        .any(|candidate| {
            stem.eq_ignore_ascii_case(candidate) || name.eq_ignore_ascii_case(candidate)
        })
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command
}

/// 启动子进程，不等待结束
fn spawn_logged(mut command: Command, label: String) -> Result<(), LaunchError> {
    let child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| LaunchError::Spawn {
            program: label.clone(),
            source,
        })?;

    tracing::debug!("Spawned '{}' (pid {})", label, child.id());

    let thread_label = label.clone();
    thread::Builder::new()
        .name("child_output".into())
        .spawn(move || drain_and_reap(child, &thread_label))
        .map_err(|source| LaunchError::Spawn {
            program: label,
            source,
        })?;

    Ok(())
}

fn drain_and_reap(mut child: Child, label: &str) {
    let stderr_worker = child.stderr.take().map(|stderr| {
        let label = label.to_string();
        thread::spawn(move || forward_lines(stderr, &label, true))
    });

    if let Some(stdout) = child.stdout.take() {
        forward_lines(stdout, label, false);
    }
    if let Some(worker) = stderr_worker {
        let _ = worker.join();
    }

    match child.wait() {
        Ok(status) if status.success() => tracing::debug!("'{}' exited", label),
        Ok(status) => tracing::warn!("'{}' exited with {}", label, status),
        Err(e) => tracing::warn!("Failed to wait for '{}': {}", label, e),
    }
}

fn forward_lines(stream: impl Read, label: &str, is_stderr: bool) {
    for line in BufReader::new(stream).lines() {
        let Ok(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }
        if is_stderr {
            tracing::warn!("[{}] {}", label, line);
        } else {
            tracing::info!("[{}] {}", label, line);
        }
    }
}
