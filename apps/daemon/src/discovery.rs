//! adb 可执行文件查找
//!
//! 顺序：配置中的 `adb_path` → `<exe 目录>/adb/adb[.exe]` → `PATH`。

use alvr_usb_adb::adb_executable_name;
use std::path::{Path, PathBuf};

/// adb 来源
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdbLocation {
    /// 配置文件指定
    Configured(PathBuf),
    /// 随程序附带
    Local(PathBuf),
    /// PATH 中的全局安装
    Global(PathBuf),
}

impl AdbLocation {
    pub fn path(&self) -> &Path {
        match self {
            AdbLocation::Configured(path) | AdbLocation::Local(path) | AdbLocation::Global(path) => {
                path
            },
        }
    }
}

/// 随程序附带的 adb 路径
pub fn bundled_adb(base_dir: &Path) -> PathBuf {
    base_dir.join("adb").join(adb_executable_name())
}

pub fn find_adb(base_dir: &Path, configured: Option<&Path>) -> Option<AdbLocation> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(AdbLocation::Configured(path.to_path_buf()));
        }
        tracing::debug!("Configured ADB not found at {}", path.display());
    }

    let bundled = bundled_adb(base_dir);
    if bundled.is_file() {
        return Some(AdbLocation::Local(bundled));
    }

    which::which(adb_executable_name())
        .ok()
        .map(AdbLocation::Global)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_adb_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = bundled_adb(dir.path());
        std::fs::create_dir_all(bundled.parent().unwrap()).unwrap();
        std::fs::write(&bundled, b"").unwrap();

        assert_eq!(
            find_adb(dir.path(), None),
            Some(AdbLocation::Local(bundled))
        );
    }

    #[test]
    fn test_configured_adb_wins() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = bundled_adb(dir.path());
        std::fs::create_dir_all(bundled.parent().unwrap()).unwrap();
        std::fs::write(&bundled, b"").unwrap();
        let custom = dir.path().join("custom-adb");
        std::fs::write(&custom, b"").unwrap();

        let found = find_adb(dir.path(), Some(&custom)).unwrap();

        assert_eq!(found, AdbLocation::Configured(custom.clone()));
        assert_eq!(found.path(), custom.as_path());
    }

    #[test]
    fn test_missing_configured_falls_back_to_bundled() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = bundled_adb(dir.path());
        std::fs::create_dir_all(bundled.parent().unwrap()).unwrap();
        std::fs::write(&bundled, b"").unwrap();

        let found = find_adb(dir.path(), Some(&dir.path().join("nope")));

        assert_eq!(found, Some(AdbLocation::Local(bundled)));
    }

    #[test]
    fn test_bundled_adb_layout() {
        let path = bundled_adb(Path::new("/opt/alvr-usb"));
        assert!(path.starts_with("/opt/alvr-usb/adb"));
        assert_eq!(path.file_name().unwrap(), adb_executable_name());
    }
}
