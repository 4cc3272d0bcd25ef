//! 宿主配置：远端地址表、共享依赖、布局插槽与加载策略。
//!
//! 地址在组合时由配置给出，而不是写死在核心逻辑里。JSON 形态：
//!
//! ```json
//! {
//!   "name": "dashboard_shell",
//!   "remotes": {
//!     "notes_widget": "notes_widget@http://localhost:3001/_next/static/chunks/remoteEntry.js"
//!   },
//!   "shared": [{ "name": "@repo/ui/card", "version": "1.0.0" }],
//!   "slots": [{ "id": "log", "title": "Real-time Log", "module": "notes_widget/Widget" }],
//!   "load_timeout_ms": 5000,
//!   "retry": { "max_attempts": 2, "backoff": { "first_ms": 100, "max_ms": 2000, "factor": 2.0 } }
//! }
//! ```
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, time::Duration};

use crate::error::{FederationError, Result};
use crate::remote::{ModuleRequest, RemoteTarget};

pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_HOST_NAME: &str = "host";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    pub name: String,
    /// 容器名 -> `container@url`
    pub remotes: BTreeMap<String, RemoteTarget>,
    pub shared: Vec<SharedDependency>,
    pub slots: Vec<SlotConfig>,
    pub load_timeout_ms: u64,
    pub retry: RetryPolicy,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_HOST_NAME.to_string(),
            remotes: BTreeMap::new(),
            shared: Vec::new(),
            slots: Vec::new(),
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
            retry: RetryPolicy::default(),
        }
    }
}

impl ComposerConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self =
            serde_json::from_str(s).map_err(|e| FederationError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FederationError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    /// 插槽 id 唯一；远端表的键必须与地址中的容器名一致。
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for slot in &self.slots {
            if !seen.insert(slot.id.as_str()) {
                return Err(FederationError::Config(format!(
                    "duplicate slot id '{}'",
                    slot.id
                )));
            }
        }
        for (key, target) in &self.remotes {
            if key != target.container() {
                return Err(FederationError::Config(format!(
                    "remote key '{key}' does not match container '{}'",
                    target.container()
                )));
            }
        }
        Ok(())
    }

    pub fn remote(mut self, target: RemoteTarget) -> Self {
        self.remotes.insert(target.container().to_string(), target);
        self
    }

    pub fn slot(mut self, id: impl Into<String>, module: ModuleRequest) -> Self {
        let id = id.into();
        self.slots.push(SlotConfig {
            title: id.clone(),
            id,
            module,
        });
        self
    }

    pub fn shared_dep(mut self, dep: SharedDependency) -> Self {
        self.shared.push(dep);
        self
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotConfig {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// `container/Export`
    pub module: ModuleRequest,
}

/// 宿主以会话级单例提供的共享包。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedDependency {
    pub name: String,
    pub version: String,
    /// 版本不一致时拒绝实例化，而不是警告后沿用宿主版本
    #[serde(default)]
    pub strict: bool,
}

impl SharedDependency {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            strict: false,
        }
    }
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// 单次尝试失败后自动重新进入 `loading` 的策略。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// 总尝试次数（含首次），最少为 1
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryPolicy {
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// 第 `n` 次重试（从 0 计）的延迟为 `first × factor^n`，上限 `max`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub first_ms: u64,
    pub max_ms: u64,
    pub factor: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first_ms: 100,
            max_ms: 5_000,
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    pub fn next(&self, attempt: u32) -> Duration {
        let max = Duration::from_millis(self.max_ms);
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = Duration::from_millis(self.first_ms).as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs < 0.0 || secs > max.as_secs_f64() {
            max
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}
