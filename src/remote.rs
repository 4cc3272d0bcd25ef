//! 远端模块寻址与解析。
//!
//! 宿主只认识逻辑名（`container/Export`）；逻辑名到地址（`container@url`）的映射来自配置，
//! 真正的拉取与实例化由 [`RemoteLoader`] 完成，这是整个组合过程中唯一的异步步骤。
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr, sync::Arc, time::Duration};

use crate::error::{FederationError, Result};
use crate::widget::WidgetFactory;

/// 远端入口的构建类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Server,
}

/// 远端容器的运行时地址：`container@url`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RemoteTarget {
    container: String,
    url: String,
}

fn valid_ident(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl RemoteTarget {
    pub fn new(container: impl Into<String>, url: impl Into<String>) -> Result<Self> {
        let container = container.into();
        let url = url.into();
        if !valid_ident(&container) {
            return Err(FederationError::InvalidTarget(format!(
                "bad container name '{container}'"
            )));
        }
        match url.split_once("://") {
            Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => {}
            _ => {
                return Err(FederationError::InvalidTarget(format!(
                    "'{url}' is not an absolute url"
                )))
            }
        }
        Ok(Self { container, url })
    }

    /// `container@http://localhost:<port>/_next/static/{chunks|ssr}/remoteEntry.js`
    pub fn localhost(container: &str, port: u16, side: Side) -> Self {
        let dir = match side {
            Side::Client => "chunks",
            Side::Server => "ssr",
        };
        Self {
            container: container.to_string(),
            url: format!("http://localhost:{port}/_next/static/{dir}/remoteEntry.js"),
        }
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl FromStr for RemoteTarget {
    type Err = FederationError;
    fn from_str(s: &str) -> Result<Self> {
        let (container, url) = s
            .split_once('@')
            .ok_or_else(|| FederationError::InvalidTarget(format!("'{s}' lacks 'container@'")))?;
        Self::new(container, url)
    }
}

impl TryFrom<String> for RemoteTarget {
    type Error = FederationError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<RemoteTarget> for String {
    fn from(t: RemoteTarget) -> Self {
        t.to_string()
    }
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.container, self.url)
    }
}

/// 宿主请求的逻辑模块名 `container/Export`；容器以导出名 `./Export` 提供。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleRequest {
    container: String,
    export: String,
}

impl ModuleRequest {
    pub fn new(container: impl Into<String>, export: impl Into<String>) -> Result<Self> {
        let container = container.into();
        let export = export.into();
        let export = export.strip_prefix("./").unwrap_or(&export).to_string();
        if !valid_ident(&container) || !valid_ident(&export) {
            return Err(FederationError::InvalidTarget(format!(
                "bad module request '{container}/{export}'"
            )));
        }
        Ok(Self { container, export })
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    /// 容器暴露的导出名，如 `./Widget`。
    pub fn expose(&self) -> String {
        format!("./{}", self.export)
    }
}

impl FromStr for ModuleRequest {
    type Err = FederationError;
    fn from_str(s: &str) -> Result<Self> {
        let (container, export) = s
            .split_once('/')
            .ok_or_else(|| FederationError::InvalidTarget(format!("'{s}' lacks '/Export'")))?;
        Self::new(container, export)
    }
}

impl TryFrom<String> for ModuleRequest {
    type Error = FederationError;
    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<ModuleRequest> for String {
    fn from(m: ModuleRequest) -> Self {
        m.to_string()
    }
}

impl fmt::Display for ModuleRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.export)
    }
}

/// 拉取 [`RemoteTarget`] 背后的代码，返回所请求导出名下的工厂。
#[async_trait]
pub trait RemoteLoader: Send + Sync + 'static {
    async fn load(
        &self,
        target: &RemoteTarget,
        request: &ModuleRequest,
    ) -> Result<Arc<dyn WidgetFactory>>;
}

/// 编译期声明，由 `#[expose]` 生成、经 `inventory` 收集。
pub struct Exposure {
    pub container: &'static str,
    pub module: &'static str,
    pub create: fn() -> Arc<dyn WidgetFactory>,
}
inventory::collect!(Exposure);

struct Container {
    modules: HashMap<String, Arc<dyn WidgetFactory>>,
    online: bool,
    latency: Option<Duration>,
}

impl Container {
    fn new() -> Self {
        Self {
            modules: HashMap::new(),
            online: true,
            latency: None,
        }
    }
}

/// 独立部署的远端容器在进程内的替身。
///
/// 运行时可以发布、下线部署或调整其延迟；组合器只通过 [`RemoteLoader`] 看到它。
#[derive(Default)]
pub struct ContainerRegistry {
    containers: RwLock<HashMap<String, Container>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 收集所有 `#[expose]` 声明。
    pub fn discover() -> Self {
        let reg = Self::new();
        for exp in inventory::iter::<Exposure> {
            reg.deploy(exp.container, exp.module, (exp.create)());
        }
        reg
    }

    /// 以 `module`（可带或不带 `./` 前缀）发布 `factory`。
    pub fn deploy(&self, container: &str, module: &str, factory: Arc<dyn WidgetFactory>) {
        let module = if module.starts_with("./") {
            module.to_string()
        } else {
            format!("./{module}")
        };
        tracing::debug!(container, module = %module, factory = factory.type_name(), "module deployed");
        self.containers
            .write()
            .entry(container.to_string())
            .or_insert_with(Container::new)
            .modules
            .insert(module, factory);
    }

    pub fn set_online(&self, container: &str, online: bool) {
        if let Some(c) = self.containers.write().get_mut(container) {
            c.online = online;
        }
    }

    pub fn set_latency(&self, container: &str, latency: Option<Duration>) {
        if let Some(c) = self.containers.write().get_mut(container) {
            c.latency = latency;
        }
    }

    pub fn exposes(&self, container: &str, module: &str) -> bool {
        self.containers
            .read()
            .get(container)
            .is_some_and(|c| c.modules.contains_key(module))
    }
}

#[async_trait]
impl RemoteLoader for ContainerRegistry {
    async fn load(
        &self,
        target: &RemoteTarget,
        request: &ModuleRequest,
    ) -> Result<Arc<dyn WidgetFactory>> {
        let container = target.container();
        // 不跨 await 持锁
        let latency = {
            let containers = self.containers.read();
            let c = containers
                .get(container)
                .ok_or_else(|| FederationError::Resolution {
                    container: container.to_string(),
                    reason: format!("nothing deployed at {}", target.url()),
                })?;
            if !c.online {
                return Err(FederationError::Resolution {
                    container: container.to_string(),
                    reason: format!("{} unreachable", target.url()),
                });
            }
            c.latency
        };
        if let Some(d) = latency {
            tokio::time::sleep(d).await;
        }
        let expose = request.expose();
        let factory = self
            .containers
            .read()
            .get(container)
            .and_then(|c| c.modules.get(&expose).cloned());
        factory.ok_or_else(|| FederationError::Instantiation {
                module: request.to_string(),
                reason: format!("container '{container}' does not expose '{expose}'"),
            })
    }
}
