//! # ALVR USB 核心层
//!
//! 本 crate 提供 USB 头显会话管理的核心逻辑，包括：
//! - 后端能力抽象（[`BridgeBackend`]）：状态查询、启动、设备枚举、端口转发、远程命令
//! - 设备身份解析：附着通知缺少产品标签时的有界重试
//! - 会话状态机：全局至多一个活跃设备，先到先得，不抢占
//! - 事件分发：单一有序通道，每个附着事件独立线程处理
//! - 后端监管循环：100ms tick，重启后端、重连控制通道、一次性订阅
//!
//! 后端本身（设备发现、命令执行）与进程启动都是外部协作者，
//! 通过 trait 注入，便于在测试中替换。

pub mod backend;
pub mod clock;
pub mod debounce;
pub mod device;
pub mod dispatcher;
pub mod effects;
pub mod resolver;
pub mod session;
pub mod supervisor;

pub use backend::{BackendError, BackendErrorKind, BackendStatus, BridgeBackend};
pub use clock::{Clock, ManualClock, SystemClock};
pub use debounce::RecentEvents;
pub use device::{
    AllowList, BUILTIN_DEVICE_TAGS, DeviceEvent, DeviceRecord, FORWARDED_PORTS, SERVER_PORT,
    STREAM_PORT,
};
pub use dispatcher::EventDispatcher;
pub use effects::{CompanionLauncher, HookCommand, LaunchError};
pub use resolver::{DeviceResolver, Resolution};
pub use session::{AttachOutcome, DetachOutcome, Session, SessionConfig, SessionManager};
pub use supervisor::{BackendConnectionState, Supervisor, SupervisorConfig, SupervisorError};
