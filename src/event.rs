//! 事件载荷与约定的事件名。
//!
//! 所有已知事件共享同一载荷形状 `{ message, timestamp }`；生产者与消费者分别构建、
//! 独立部署，因此形状在总线边界处决定（见 [`EventPayload::from_value`]）。
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

use crate::error::{FederationError, Result};

/// 墙钟时间，UNIX 纪元以来的毫秒数。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Timestamp(ms)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// `HH:MM:SS`（UTC）。超出 chrono 可表示范围时退化为原始毫秒数。
    pub fn clock_label(&self) -> String {
        match i64::try_from(self.0)
            .ok()
            .and_then(chrono::DateTime::<chrono::Utc>::from_timestamp_millis)
        {
            Some(dt) => dt.format("%H:%M:%S").to_string(),
            None => self.0.to_string(),
        }
    }
}

impl From<u64> for Timestamp {
    fn from(ms: u64) -> Self {
        Timestamp(ms)
    }
}

/// 总线事件携带的数据。发出后不可变，所有监听器看到同一个实例。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EventPayload {
    pub message: String,
    pub timestamp: Timestamp,
}

impl EventPayload {
    pub fn new(message: impl Into<String>, timestamp: impl Into<Timestamp>) -> Self {
        Self {
            message: message.into(),
            timestamp: timestamp.into(),
        }
    }

    /// 以当前时间构造。
    pub fn now(message: impl Into<String>) -> Self {
        Self::new(message, Timestamp::now())
    }

    /// 边界校验：独立版本的生产者可能发来任意 JSON，形状不符即拒绝。
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| FederationError::Payload(e.to_string()))
    }
}

impl fmt::Display for EventPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.clock_label(), self.message)
    }
}

/// 仪表盘模块使用的事件名。`"<domain>:<kind>"` 只是命名约定，总线接受任意名字。
pub mod topics {
    pub const ANALYTICS_BROADCAST: &str = "analytics:broadcast";
    pub const AI_INSIGHT: &str = "ai:insight";
    pub const METRICS_REFRESH: &str = "metrics:refresh";

    pub const KNOWN: &[&str] = &[ANALYTICS_BROADCAST, AI_INSIGHT, METRICS_REFRESH];

    /// 拆分 `"domain:kind"`；不符合约定时返回 `None`。
    pub fn split(name: &str) -> Option<(&str, &str)> {
        let (domain, kind) = name.split_once(':')?;
        if domain.is_empty() || kind.is_empty() || kind.contains(':') {
            return None;
        }
        Some((domain, kind))
    }
}
