//! 配置文件
//!
//! 扁平 TOML 文件，默认位于可执行文件旁的 `alvr-usb.toml`。
//! 文件不存在时使用默认值，缺省的键同样取默认值。
//!
//! ```toml
//! debug = false
//! logging = true
//! log_file = "alvr-usb.log"
//! server_path = "ALVR Launcher.exe"
//! connect_hook = "echo connected"
//! client_activity = "alvr.client.stable/com.polygraphene.alvr.OvrActivity"
//! extra_devices = "eureka, seacliff"
//! ```

use alvr_usb_core::{AllowList, HookCommand, SessionConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 默认配置文件名
pub const CONFIG_FILE_NAME: &str = "alvr-usb.toml";

/// 默认日志文件名
pub const DEFAULT_LOG_FILE: &str = "alvr-usb.log";

/// 默认伴随服务端
pub const DEFAULT_SERVER_PATH: &str = "ALVR Launcher.exe";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 调试级别日志
    pub debug: bool,
    /// 是否写日志文件
    pub logging: bool,
    pub log_file: PathBuf,
    /// 启动时清空日志文件
    pub log_truncate: bool,
    /// 伴随服务端路径，空字符串表示不启动
    pub server_path: PathBuf,
    /// adb 可执行文件，未设置时按 `<exe 目录>/adb/adb[.exe]` → PATH 查找
    pub adb_path: Option<PathBuf>,
    pub connect_hook: Option<String>,
    pub disconnect_hook: Option<String>,
    /// 头显客户端 Activity（`package/activity`）
    pub client_activity: Option<String>,
    /// 额外允许的产品标签（逗号分隔）
    pub extra_devices: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            logging: false,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            log_truncate: false,
            server_path: PathBuf::from(DEFAULT_SERVER_PATH),
            adb_path: None,
            connect_hook: None,
            disconnect_hook: None,
            client_activity: None,
            extra_devices: String::new(),
        }
    }
}

impl Settings {
    /// 读取配置文件；文件不存在时返回默认值
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// 命令行开关只能打开选项，不能关闭
    pub fn apply_flags(&mut self, debug: bool, logging: bool, log_truncate: bool) {
        self.debug |= debug;
        self.logging |= logging;
        self.log_truncate |= log_truncate;
    }

    /// 日志文件的绝对路径
    pub fn log_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.log_file)
    }

    /// 用户显式配置的 adb 路径（相对路径以 `base_dir` 为基准）
    pub fn adb_override(&self, base_dir: &Path) -> Option<PathBuf> {
        self.adb_path
            .as_ref()
            .filter(|path| !path.as_os_str().is_empty())
            .map(|path| base_dir.join(path))
    }

    /// 转换为会话配置
    ///
    /// 伴随服务端不存在时丢弃（记一条 debug 日志），钩子在 `base_dir` 中执行。
    pub fn session_config(&self, base_dir: &Path) -> SessionConfig {
        let server_path = if self.server_path.as_os_str().is_empty() {
            None
        } else {
            let path = base_dir.join(&self.server_path);
            if path.is_file() {
                tracing::debug!("ALVR launcher found at {}", path.display());
                Some(path)
            } else {
                tracing::debug!("ALVR launcher not found at {}", path.display());
                None
            }
        };

        let hook = |command: &Option<String>| {
            command
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(|c| HookCommand::new(c, base_dir))
        };

        SessionConfig {
            allow_list: AllowList::with_extra(&self.extra_devices),
            server_path,
            client_activity: self
                .client_activity
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            connect_hook: hook(&self.connect_hook),
            disconnect_hook: hook(&self.disconnect_hook),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load(&dir.path().join(CONFIG_FILE_NAME)).unwrap();

        assert_eq!(settings, Settings::default());
        assert_eq!(settings.log_file, PathBuf::from("alvr-usb.log"));
        assert_eq!(settings.server_path, PathBuf::from("ALVR Launcher.exe"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let settings = Settings::parse("logging = true\nextra_devices = \"eureka\"\n").unwrap();

        assert!(settings.logging);
        assert!(!settings.debug);
        assert_eq!(settings.log_file, PathBuf::from(DEFAULT_LOG_FILE));
        assert_eq!(settings.extra_devices, "eureka");
    }

    #[test]
    fn test_invalid_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "debug = \"maybe\"\n").unwrap();

        let err = Settings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_flags_only_enable() {
        let mut settings = Settings::parse("debug = true").unwrap();
        settings.apply_flags(false, true, false);

        assert!(settings.debug);
        assert!(settings.logging);
        assert!(!settings.log_truncate);
    }

    #[test]
    fn test_session_config_allow_list_union() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::parse("extra_devices = \" eureka , seacliff,\"").unwrap();

        let config = settings.session_config(dir.path());

        assert!(config.allow_list.contains("hollywood"));
        assert!(config.allow_list.contains("eureka"));
        assert!(config.allow_list.contains("seacliff"));
        assert!(!config.allow_list.contains("unknown_device"));
    }

    #[test]
    fn test_session_config_drops_missing_server() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::default();

        assert_eq!(settings.session_config(dir.path()).server_path, None);

        let launcher = dir.path().join(DEFAULT_SERVER_PATH);
        std::fs::write(&launcher, b"").unwrap();
        assert_eq!(settings.session_config(dir.path()).server_path, Some(launcher));
    }

    #[test]
    fn test_session_config_hooks_run_in_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::parse(
            "connect_hook = \"echo connected\"\ndisconnect_hook = \"  \"\nclient_activity = \"pkg/.Main\"",
        )
        .unwrap();

        let config = settings.session_config(dir.path());

        assert_eq!(
            config.connect_hook,
            Some(HookCommand::new("echo connected", dir.path()))
        );
        assert_eq!(config.disconnect_hook, None);
        assert_eq!(config.client_activity.as_deref(), Some("pkg/.Main"));
    }

    #[test]
    fn test_adb_override_is_relative_to_base_dir() {
        let base = Path::new("/opt/alvr-usb");
        let settings = Settings::parse("adb_path = \"platform-tools/adb\"").unwrap();

        assert_eq!(
            settings.adb_override(base),
            Some(PathBuf::from("/opt/alvr-usb/platform-tools/adb"))
        );
        assert_eq!(Settings::default().adb_override(base), None);
    }
}
