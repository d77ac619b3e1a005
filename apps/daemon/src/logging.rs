//! 日志初始化
//!
//! stderr 上输出带颜色的日志；开启文件日志后另加一个纯文本层，
//! 通过 `tracing-appender` 的非阻塞写入器追加到日志文件。
//! `RUST_LOG` 优先于配置中的 `debug` 开关。

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("failed to open log file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to install logger: {0}")]
    Install(String),
}

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub debug: bool,
    /// 日志文件；`None` 表示只输出到 stderr
    pub file: Option<PathBuf>,
    pub truncate: bool,
}

/// 初始化全局日志
///
/// 返回的 guard 必须保持到进程退出，drop 时刷新文件缓冲。
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(options.debug)));

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(options.debug);

    let (file_layer, guard) = match &options.file {
        Some(path) => {
            let file = open_log_file(path, options.truncate)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(options.debug);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggingError::Install(e.to_string()))?;

    Ok(guard)
}

fn default_directive(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

/// 以追加方式打开日志文件，`truncate` 为 true 时先清空
fn open_log_file(path: &Path, truncate: bool) -> Result<std::fs::File, LoggingError> {
    let io_err = |source| LoggingError::Io {
        path: path.to_path_buf(),
        source,
    };

    if truncate {
        std::fs::File::create(path).map_err(io_err)?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)
}
