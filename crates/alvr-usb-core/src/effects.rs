//! 副作用执行器（伴随进程启动、钩子命令）
//!
//! 状态机只调用这里的 trait，不等待进程结束，也不检查退出码。

use std::path::{Path, PathBuf};
use thiserror::Error;

/// SteamVR 运行时的进程名
///
/// ALVR 服务端启动后会以这个名字运行，所以除了检查配置的可执行文件名外还要检查它。
pub const SERVER_RUNTIME_PROCESS: &str = "vrmonitor";

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("empty command")]
    EmptyCommand,
}

/// 用户配置的钩子命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookCommand {
    /// 交给系统 shell 执行的命令行
    pub command: String,
    /// 工作目录
    pub working_dir: PathBuf,
}

impl HookCommand {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
        }
    }
}

/// 主机进程能力
pub trait CompanionLauncher: Send + Sync {
    /// 是否有任一名字匹配的进程在运行
    fn is_running(&self, process_names: &[&str]) -> bool;

    /// 启动伴随服务端（不等待结束）
    fn launch(&self, program: &Path) -> Result<(), LaunchError>;

    /// 异步执行钩子命令（输出写入日志，不等待结束）
    fn run_hook(&self, hook: &HookCommand) -> Result<(), LaunchError>;
}

/// 用于进程匹配的名字：可执行文件名去掉扩展名
pub fn process_name_of(program: &Path) -> Option<String> {
    program
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
}
