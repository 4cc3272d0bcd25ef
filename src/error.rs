//! 框架统一错误类型：封闭枚举，按作用域区分（单个插槽 / 单次投递 / 配置）。
use std::{error::Error as StdError, fmt, time::Duration};

#[derive(Debug)]
pub enum FederationError {
    /// 远端地址不可达、拉取失败
    Resolution { container: String, reason: String },
    /// 解析超时（`load_timeout` 到期）
    Timeout { container: String, after: Duration },
    /// 拉取到的模块与导出契约不兼容，或工厂构造失败
    Instantiation { module: String, reason: String },
    /// 布局引用了配置中不存在的远端
    UnknownRemote(String),
    /// 插槽 id 不存在
    UnknownSlot(String),
    /// 非法地址字符串（`container@url` / `container/Export`）
    InvalidTarget(String),
    /// 状态机拒绝的迁移
    InvalidTransition { slot: String, from: &'static str, to: &'static str },
    /// 总线边界处的载荷形状校验失败
    Payload(String),
    /// 配置文件读取或解析失败
    Config(String),
    Other(&'static str),
    Dynamic(String),
}

impl FederationError {
    /// 该错误是否值得在界面上提供“重试”入口。
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FederationError::Resolution { .. } | FederationError::Timeout { .. }
        )
    }
}

impl fmt::Display for FederationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FederationError::Resolution { container, reason } => {
                write!(f, "failed to resolve remote '{container}': {reason}")
            }
            FederationError::Timeout { container, after } => {
                write!(f, "remote '{container}' did not resolve within {after:?}")
            }
            FederationError::Instantiation { module, reason } => {
                write!(f, "failed to instantiate '{module}': {reason}")
            }
            FederationError::UnknownRemote(name) => write!(f, "no remote configured for '{name}'"),
            FederationError::UnknownSlot(id) => write!(f, "unknown slot '{id}'"),
            FederationError::InvalidTarget(s) => write!(f, "invalid module address: {s}"),
            FederationError::InvalidTransition { slot, from, to } => {
                write!(f, "slot '{slot}' cannot move from {from} to {to}")
            }
            FederationError::Payload(s) => write!(f, "malformed event payload: {s}"),
            FederationError::Config(s) => write!(f, "invalid configuration: {s}"),
            FederationError::Other(msg) => write!(f, "{msg}"),
            FederationError::Dynamic(s) => write!(f, "{s}"),
        }
    }
}
impl StdError for FederationError {}

pub type Result<T = ()> = std::result::Result<T, FederationError>;
