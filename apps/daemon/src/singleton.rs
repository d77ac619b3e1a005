//! 单例文件锁
//!
//! 同一时刻只允许一个 alvr-usb 实例运行：两个实例会争抢同一组固定端口，
//! 并互相重启对方的 ADB 服务端。锁文件内容为持有者的 PID，
//! 抢锁失败时读出来报告给用户。

use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 默认锁文件名
pub const LOCK_FILE_NAME: &str = "alvr-usb.lock";

#[derive(Error, Debug)]
pub enum LockError {
    /// 另一个实例持有锁；`pid` 读不出来时为 `None`（Windows 上被锁文件不可读）
    #[error("{} is held by {}", path.display(), holder(*pid))]
    Held { path: PathBuf, pid: Option<u32> },
    #[error("failed to lock {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn holder(pid: Option<u32>) -> String {
    match pid {
        Some(pid) => format!("another alvr-usb instance (pid {})", pid),
        None => "another alvr-usb instance".to_string(),
    }
}

/// 单例文件锁，进程退出或 drop 时释放
pub struct SingletonLock {
    file: File,
}

impl SingletonLock {
    /// 尝试获取单例锁（非阻塞）
    pub fn try_lock(lock_path: impl AsRef<Path>) -> Result<Self, LockError> {
        let path = lock_path.as_ref();
        let io_err = |source| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        // 拿到锁之前不能截断，文件里是持有者的 PID
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(path)
            .map_err(io_err)?;

        if !file.try_lock_exclusive().map_err(io_err)? {
            return Err(LockError::Held {
                path: path.to_path_buf(),
                pid: read_pid(&mut file),
            });
        }

        write_pid(&mut file).map_err(io_err)?;
        Ok(Self { file })
    }
}

impl Drop for SingletonLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn write_pid(file: &mut File) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    writeln!(file, "{}", std::process::id())?;
    file.sync_all()
}

fn read_pid(file: &mut File) -> Option<u32> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}

/// 默认锁文件路径
///
/// 优先使用运行时目录（Linux 上为 `XDG_RUNTIME_DIR`），否则退回系统临时目录。
pub fn default_lock_path() -> PathBuf {
    if let Some(runtime_dir) = dirs::runtime_dir()
        && (runtime_dir.exists() || std::fs::create_dir_all(&runtime_dir).is_ok())
    {
        return runtime_dir.join(LOCK_FILE_NAME);
    }

    std::env::temp_dir().join(LOCK_FILE_NAME)
}
