//! 组合器：为布局中的每个插槽解析并挂载远端模块。
//!
//! - 总线在首次访问时创建，之后以句柄形式显式传给每个模块；
//! - 插槽之间相互独立并发加载，某个远端失败只影响自己的插槽；
//! - 卸载时由模块自己释放订阅，组合器只负责调用 `Widget::unmount`。
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::Instrument;
use uuid::Uuid;

use crate::{
    bus::{panic_message, BusHandle, EventBus},
    config::{ComposerConfig, RetryPolicy},
    error::{FederationError, Result},
    remote::{ModuleRequest, RemoteLoader, RemoteTarget},
    shared::SharedScope,
    slot::{view_of, LoadState, MountedWidget, Slot, SlotView},
    widget::{Widget, WidgetFactory, WidgetProps},
};

type SlotTable = Arc<Mutex<Vec<Slot>>>;

pub struct Composer {
    session: Uuid,
    cfg: ComposerConfig,
    bus: OnceLock<EventBus>,
    loader: Arc<dyn RemoteLoader>,
    shared: Arc<SharedScope>,
    remotes: Arc<BTreeMap<String, RemoteTarget>>,
    slots: SlotTable,
    started: bool,
}

/// 单个加载任务需要的全部上下文（可跨任务移动）。
#[derive(Clone)]
struct LoadCtx {
    slots: SlotTable,
    loader: Arc<dyn RemoteLoader>,
    bus: BusHandle,
    shared: Arc<SharedScope>,
    remotes: Arc<BTreeMap<String, RemoteTarget>>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl Composer {
    pub fn new(cfg: ComposerConfig, loader: Arc<dyn RemoteLoader>) -> Result<Self> {
        cfg.validate()?;
        let slots = cfg.slots.iter().cloned().map(Slot::new).collect();
        Ok(Self {
            session: Uuid::new_v4(),
            shared: Arc::new(SharedScope::new(&cfg.shared)),
            remotes: Arc::new(cfg.remotes.clone()),
            cfg,
            bus: OnceLock::new(),
            loader,
            slots: Arc::new(Mutex::new(slots)),
            started: false,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    /// 会话总线，首次访问时创建；每次调用都返回同一条总线的句柄。
    pub fn bus(&self) -> BusHandle {
        self.bus
            .get_or_init(|| {
                tracing::debug!(session = %self.session, "event bus created");
                EventBus::new()
            })
            .handle()
    }

    pub fn shared_scope(&self) -> &SharedScope {
        &self.shared
    }

    /// 调度所有 `pending` 插槽；重复调用无效果。
    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        if self.cfg.slots.is_empty() {
            tracing::warn!(session = %self.session, host = %self.cfg.name, "composer started without slots");
        }
        for id in self.slot_ids() {
            if self.state(&id) == Some(LoadState::Pending) {
                self.mount(&id)?;
            }
        }
        self.started = true;
        tracing::info!(session = %self.session, host = %self.cfg.name, slots = self.cfg.slots.len(), "composition started");
        // 让加载任务先跑起来
        tokio::task::yield_now().await;
        Ok(())
    }

    /// 单个插槽 `pending → loading`。
    pub fn mount(&self, slot_id: &str) -> Result<()> {
        self.schedule(slot_id, |s| matches!(s, LoadState::Pending))
    }

    /// 手动重试：`failed → loading`。
    pub fn retry(&self, slot_id: &str) -> Result<()> {
        tracing::info!(slot = slot_id, "retry requested");
        self.schedule(slot_id, |s| matches!(s, LoadState::Failed { .. }))
    }

    fn schedule(&self, slot_id: &str, allowed: impl Fn(&LoadState) -> bool) -> Result<()> {
        let ctx = self.load_ctx();
        let mut slots = self.slots.lock();
        let slot = find(&mut slots, slot_id)?;
        let cur = slot.state();
        let next = LoadState::Loading { attempt: 1 };
        if !allowed(&cur) {
            return Err(FederationError::InvalidTransition {
                slot: slot_id.to_string(),
                from: cur.label(),
                to: next.label(),
            });
        }
        slot.transition(next)?;
        slot.generation += 1;
        let generation = slot.generation;
        let request = slot.config.module.clone();
        let span = tracing::info_span!("slot_load", session = %self.session, slot = slot_id, module = %request);
        let id = slot_id.to_string();
        slot.task = Some(tokio::spawn(
            run_load(ctx, id, request, generation).instrument(span),
        ));
        Ok(())
    }

    /// 从布局移除插槽中的模块。模块在 `Widget::unmount` 中自行释放总线登记；
    /// 进行中的加载被取消。
    pub fn unmount(&self, slot_id: &str) -> Result<()> {
        let instance = {
            let mut slots = self.slots.lock();
            let slot = find(&mut slots, slot_id)?;
            if slot.state() == LoadState::Pending {
                return Ok(());
            }
            slot.generation += 1;
            if let Some(task) = slot.task.take() {
                task.abort();
            }
            slot.transition(LoadState::Pending)?;
            slot.instance.take()
        };
        // 锁外调用模块代码
        if let Some(name) = instance.and_then(|w| w.retire()) {
            tracing::info!(slot = slot_id, widget = %name, "module unmounted");
        }
        Ok(())
    }

    /// 卸载所有插槽，并等待被取消的加载任务结束。
    pub async fn teardown(&mut self) {
        let ids = self.slot_ids();
        let mut tasks = Vec::new();
        for id in &ids {
            if let Some(t) = find(&mut self.slots.lock(), id).ok().and_then(|s| s.task.take()) {
                tasks.push(t);
            }
            if let Err(e) = self.unmount(id) {
                tracing::warn!(slot = %id, error = %e, "unmount during teardown failed");
            }
        }
        for t in tasks {
            t.abort();
            // 取消或 panic 都忽略
            let _ = t.await;
        }
        self.started = false;
        tracing::info!(session = %self.session, "composition torn down");
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn slot_ids(&self) -> Vec<String> {
        self.slots.lock().iter().map(|s| s.id().to_string()).collect()
    }

    pub fn state(&self, slot_id: &str) -> Option<LoadState> {
        self.slots
            .lock()
            .iter()
            .find(|s| s.id() == slot_id)
            .map(Slot::state)
    }

    pub fn watch(&self, slot_id: &str) -> Option<watch::Receiver<LoadState>> {
        self.slots
            .lock()
            .iter()
            .find(|s| s.id() == slot_id)
            .map(Slot::subscribe)
    }

    /// 等待插槽离开 `loading`。未被调度（`pending`）的插槽立即返回 `pending`。
    pub async fn wait_settled(&self, slot_id: &str) -> Result<LoadState> {
        let mut rx = self
            .watch(slot_id)
            .ok_or_else(|| FederationError::UnknownSlot(slot_id.to_string()))?;
        let state = rx
            .wait_for(|s| !s.is_in_flight())
            .await
            .map_err(|_| FederationError::Other("slot state channel closed"))?;
        Ok(state.clone())
    }

    /// 依次等待所有插槽；未调度的插槽以 `pending` 出现在结果里。
    pub async fn settle_all(&self) -> Vec<(String, LoadState)> {
        let mut out = Vec::new();
        for id in self.slot_ids() {
            match self.wait_settled(&id).await {
                Ok(state) => out.push((id, state)),
                Err(e) => tracing::warn!(slot = %id, error = %e, "could not wait for slot"),
            }
        }
        out
    }

    /// 按插槽顺序给出布局快照；渲染在插槽表解锁后进行。
    pub fn layout(&self) -> Vec<(String, SlotView)> {
        let rows: Vec<_> = self
            .slots
            .lock()
            .iter()
            .map(|s| (s.config.title.clone(), s.state(), s.instance.clone()))
            .collect();
        rows.into_iter()
            .map(|(title, state, widget)| (title, view_of(state, widget.as_deref())))
            .collect()
    }

    /// 对已挂载的模块执行 `f`。模块不存在、正忙或已卸载时返回 `None`。
    pub fn with_widget<R>(&self, slot_id: &str, f: impl FnOnce(&mut dyn Widget) -> R) -> Option<R> {
        let widget = self.mounted(slot_id).ok()?;
        widget.with(f)
    }

    /// 把用户输入转交给插槽中的模块。模块在这里同步触发的监听器可以回读组合器。
    pub fn interact(&self, slot_id: &str, input: &str) -> Result<()> {
        let widget = self.mounted(slot_id)?;
        match widget.with(|w| w.interact(input)) {
            Some(res) => res.map_err(|e| FederationError::Dynamic(format!("{slot_id}: {e:#}"))),
            None => Err(FederationError::Dynamic(format!(
                "slot '{slot_id}' widget is busy or unmounted"
            ))),
        }
    }

    /// 只在插槽表锁内克隆句柄，调用方在锁外使用。
    fn mounted(&self, slot_id: &str) -> Result<Arc<MountedWidget>> {
        let mut slots = self.slots.lock();
        let slot = find(&mut slots, slot_id)?;
        slot.instance.clone().ok_or_else(|| {
            FederationError::Dynamic(format!("slot '{slot_id}' has no mounted widget"))
        })
    }

    fn load_ctx(&self) -> LoadCtx {
        LoadCtx {
            slots: self.slots.clone(),
            loader: self.loader.clone(),
            bus: self.bus(),
            shared: self.shared.clone(),
            remotes: self.remotes.clone(),
            timeout: self.cfg.load_timeout(),
            retry: self.cfg.retry,
        }
    }
}

impl std::fmt::Debug for Composer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("session", &self.session)
            .field("host", &self.cfg.name)
            .field("started", &self.started)
            .finish()
    }
}

fn find<'a>(slots: &'a mut [Slot], id: &str) -> Result<&'a mut Slot> {
    slots
        .iter_mut()
        .find(|s| s.id() == id)
        .ok_or_else(|| FederationError::UnknownSlot(id.to_string()))
}

/// 仅当代次匹配时更新状态；返回 false 表示该加载已过期。
fn update(slots: &SlotTable, id: &str, generation: u64, next: LoadState) -> bool {
    let mut slots = slots.lock();
    match slots.iter_mut().find(|s| s.id() == id) {
        Some(slot) if slot.generation == generation => match slot.transition(next) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "slot update rejected");
                false
            }
        },
        _ => false,
    }
}

async fn run_load(ctx: LoadCtx, id: String, request: ModuleRequest, generation: u64) {
    let attempts = ctx.retry.attempts();
    let mut last_err = FederationError::Other("no load attempt made");
    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = ctx.retry.backoff.next(attempt - 2);
            tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
            tokio::time::sleep(delay).await;
            if !update(&ctx.slots, &id, generation, LoadState::Loading { attempt }) {
                return;
            }
        }
        match load_once(&ctx, &request).await {
            Ok(widget) => {
                install(&ctx.slots, &id, generation, widget);
                return;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "load attempt failed");
                let retryable = e.is_retryable();
                last_err = e;
                // 确定性失败，重试也不会改变结果
                if !retryable {
                    break;
                }
            }
        }
    }
    tracing::error!(error = %last_err, "slot failed");
    update(
        &ctx.slots,
        &id,
        generation,
        LoadState::Failed {
            retryable: last_err.is_retryable(),
            reason: last_err.to_string(),
        },
    );
}

async fn load_once(ctx: &LoadCtx, request: &ModuleRequest) -> Result<Box<dyn Widget>> {
    let target = ctx
        .remotes
        .get(request.container())
        .cloned()
        .ok_or_else(|| FederationError::UnknownRemote(request.container().to_string()))?;
    let loader = ctx.loader.clone();
    let req = request.clone();
    let tgt = target.clone();
    // 独立任务承载拉取：panic 只表现为 JoinError；本加载被取消时随之中止
    let mut fetch = FetchTask(tokio::spawn(async move { loader.load(&tgt, &req).await }));
    let factory = match tokio::time::timeout(ctx.timeout, &mut fetch.0).await {
        Err(_) => {
            return Err(FederationError::Timeout {
                container: target.container().to_string(),
                after: ctx.timeout,
            });
        }
        Ok(Err(join)) => {
            let reason = if join.is_panic() {
                format!("loader panicked: {}", panic_message(join.into_panic().as_ref()))
            } else {
                "load cancelled".to_string()
            };
            return Err(FederationError::Resolution {
                container: target.container().to_string(),
                reason,
            });
        }
        Ok(Ok(res)) => res?,
    };
    let module = request.to_string();
    ctx.shared.reconcile(&module, factory.shared())?;
    let props = WidgetProps {
        event_bus: ctx.bus.clone(),
    };
    match panic::catch_unwind(AssertUnwindSafe(|| factory.instantiate(props))) {
        Ok(Ok(widget)) => Ok(widget),
        Ok(Err(e)) => Err(FederationError::Instantiation {
            module,
            reason: format!("{e:#}"),
        }),
        Err(p) => Err(FederationError::Instantiation {
            module,
            reason: format!("factory panicked: {}", panic_message(p.as_ref())),
        }),
    }
}

struct FetchTask(JoinHandle<Result<Arc<dyn WidgetFactory>>>);

impl Drop for FetchTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn install(slots: &SlotTable, id: &str, generation: u64, widget: Box<dyn Widget>) {
    let stray = {
        let mut slots = slots.lock();
        match slots.iter_mut().find(|s| s.id() == id) {
            Some(slot) if slot.generation == generation => {
                match slot.transition(LoadState::Ready) {
                    Ok(()) => {
                        tracing::info!(widget = widget.name(), "module mounted");
                        slot.instance = Some(MountedWidget::new(widget));
                        slot.task = None;
                        None
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot mount into slot");
                        Some(widget)
                    }
                }
            }
            _ => Some(widget),
        }
    };
    // 过期结果：实例可能已在构造时订阅了总线，必须立即清理
    if let Some(mut w) = stray {
        tracing::debug!(widget = w.name(), "discarding stale module instance");
        w.unmount();
    }
}
