//! 设备记录与允许列表

use std::collections::BTreeSet;

/// ALVR 服务端与头显客户端之间的流端口
pub const STREAM_PORT: u16 = 9943;

/// ALVR 控制端口
pub const SERVER_PORT: u16 = 9944;

/// 会话激活时转发的端口（本地端口与设备端口相同）
///
/// 伴随应用与头显客户端都硬编码了这两个端口，不可配置。
pub const FORWARDED_PORTS: [u16; 2] = [STREAM_PORT, SERVER_PORT];

/// 内置允许列表（Oculus Quest 1/2、Oculus Go 的产品标签）
pub const BUILTIN_DEVICE_TAGS: [&str; 6] = [
    "monterey",
    "vr_monterey",
    "hollywood",
    "vr_hollywood",
    "pacific",
    "vr_pacific",
];

/// 后端报告的设备身份
///
/// 解析过程中不会原地修改，而是用更完整的记录整体替换。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    /// 稳定唯一标识（一旦已知就不为空）
    pub serial: String,
    /// 产品标签（如 `hollywood`），附着瞬间可能为空
    pub product: String,
    /// 设备名（`device:` 字段）
    pub display_name: String,
    /// 型号名（`model:` 字段）
    pub model_name: String,
    /// 后端报告的连接状态（`device`、`offline`、`unauthorized` 等）
    pub state: String,
}

impl DeviceRecord {
    /// 仅含序列号的记录（附着通知尚未携带元数据时）
    pub fn new(serial: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            ..Self::default()
        }
    }

    pub fn with_product(serial: impl Into<String>, product: impl Into<String>) -> Self {
        Self {
            serial: serial.into(),
            product: product.into(),
            state: "device".to_string(),
            ..Self::default()
        }
    }

    /// 产品标签是否已知
    pub fn has_product(&self) -> bool {
        !self.product.is_empty()
    }

    /// 日志中使用的标签：有产品标签时用产品标签，否则用序列号
    pub fn label(&self) -> &str {
        if self.has_product() {
            &self.product
        } else {
            &self.serial
        }
    }
}

/// 后端通知线程推送的设备事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    Attached(DeviceRecord),
    Detached(String),
}

/// 可进入会话的产品标签集合
///
/// 配置中的附加标签与内置列表取并集，不会替换内置列表。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowList {
    tags: BTreeSet<String>,
}

impl AllowList {
    pub fn builtin() -> Self {
        Self {
            tags: BUILTIN_DEVICE_TAGS.iter().map(|tag| tag.to_string()).collect(),
        }
    }

    /// 内置列表加上逗号分隔的附加标签（空白与空项忽略）
    pub fn with_extra(extra: &str) -> Self {
        let mut list = Self::builtin();
        list.extend(extra.split(','));
        list
    }

    pub fn extend<'a>(&mut self, tags: impl IntoIterator<Item = &'a str>) {
        self.tags.extend(
            tags.into_iter()
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(str::to_string),
        );
    }

    pub fn contains(&self, product: &str) -> bool {
        !product.is_empty() && self.tags.contains(product)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }
}

impl Default for AllowList {
    fn default() -> Self {
        Self::builtin()
    }
}
