//! 共享依赖协调：同一会话内每个共享包只使用一个版本（宿主提供的那份）。
use std::collections::BTreeMap;

use crate::config::SharedDependency;
use crate::error::{FederationError, Result};

#[derive(Debug, Clone, Default)]
pub struct SharedScope {
    provided: BTreeMap<String, SharedDependency>,
}

impl SharedScope {
    /// 同名条目以首次出现者为准。
    pub fn new(deps: &[SharedDependency]) -> Self {
        let mut provided = BTreeMap::new();
        for dep in deps {
            if provided.contains_key(&dep.name) {
                tracing::warn!(package = %dep.name, version = %dep.version, "shared package declared twice; keeping first");
                continue;
            }
            provided.insert(dep.name.clone(), dep.clone());
        }
        Self { provided }
    }

    pub fn version(&self, name: &str) -> Option<&str> {
        self.provided.get(name).map(|d| d.version.as_str())
    }

    pub fn len(&self) -> usize {
        self.provided.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provided.is_empty()
    }

    /// 用会话中的版本核对模块声明的共享包。
    /// 不一致时告警并沿用宿主版本；宿主标记为 strict 的包直接拒绝。
    pub fn reconcile(&self, module: &str, declared: &[(&str, &str)]) -> Result<()> {
        for (name, version) in declared {
            let Some(host) = self.provided.get(*name) else {
                tracing::debug!(module, package = name, "package not shared by host; module keeps its own copy");
                continue;
            };
            if host.version == *version {
                continue;
            }
            if host.strict {
                return Err(FederationError::Instantiation {
                    module: module.to_string(),
                    reason: format!(
                        "shared package '{name}' {version} conflicts with host {}",
                        host.version
                    ),
                });
            }
            tracing::warn!(module, package = name, wanted = version, using = %host.version, "shared version mismatch; using host copy");
        }
        Ok(())
    }
}
