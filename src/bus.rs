//! 会话级事件总线：按事件名索引的同步发布/订阅。
//!
//! - 投递顺序 = 订阅顺序；不同事件名之间无顺序保证。
//! - `emit` 先对监听列表做快照再逐个调用，监听器内部可以安全地 `on`/`off`/`emit`。
//! - 每条登记带有存活标记：`off` 返回后该登记不会再被调用（包括正在进行的投递）。
//! - 单个监听器的错误或 panic 只记录日志，不影响其余监听器。
use smallvec::SmallVec;

use parking_lot::RwLock;
use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use crate::error::Result;
use crate::event::EventPayload;

/// 单次登记的标识。同一回调登记两次得到两个 id；`off` 只移除 id 指向的那一次登记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

pub type Callback = Box<dyn Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync>;

/// 诊断计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    /// `emit` 调用次数（包括无人订阅的事件）
    pub events_emitted: u64,
    /// 实际发生的监听器调用次数（含失败）
    pub deliveries: u64,
    /// 返回错误或 panic 的调用次数
    pub listener_failures: u64,
    /// 当前存活的登记数
    pub active_subscriptions: usize,
}

struct Registration {
    id: SubscriptionId,
    callback: Callback,
    once: bool,
    live: AtomicBool,
}

struct BusInner {
    subs: RwLock<HashMap<String, Vec<Arc<Registration>>>>,
    emitted: AtomicU64,
    deliveries: AtomicU64,
    failures: AtomicU64,
    active: AtomicUsize,
}

/// 会话总线的可克隆句柄，也是模块从组合器得到的唯一输入。
#[derive(Clone)]
pub struct BusHandle {
    inner: Arc<BusInner>,
}

impl fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusHandle")
            .field("active_subscriptions", &self.inner.active.load(Ordering::Relaxed))
            .finish()
    }
}

/// 总线状态的所有者，负责分发 [`BusHandle`]。
pub struct EventBus {
    handle: BusHandle,
}

impl EventBus {
    pub fn new() -> Self {
        let inner = BusInner {
            subs: RwLock::new(HashMap::new()),
            emitted: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            active: AtomicUsize::new(0),
        };
        Self {
            handle: BusHandle {
                inner: Arc::new(inner),
            },
        }
    }
    pub fn handle(&self) -> BusHandle {
        self.handle.clone()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl BusHandle {
    /// 此后每次 `event` 被发出都调用 `callback`，直到被移除。
    pub fn on<F>(&self, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(event, Box::new(callback), false)
    }

    /// 同 [`BusHandle::on`]，但登记在首次调用之前就被移除，
    /// 回调里再次发出同名事件不会再触发自己。
    pub fn once<F>(&self, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.register(event, Box::new(callback), true)
    }

    fn register(&self, event: &str, callback: Callback, once: bool) -> SubscriptionId {
        let id = SubscriptionId::next();
        let reg = Arc::new(Registration {
            id,
            callback,
            once,
            live: AtomicBool::new(true),
        });
        self.inner
            .subs
            .write()
            .entry(event.to_string())
            .or_default()
            .push(reg);
        self.inner.active.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(event, subscription = %id, once, "listener registered");
        id
    }

    /// 从 `event` 移除登记 `id`。未知或已移除的 id 不做任何事；返回是否真的移除了。
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        let removed = self.detach(event, id);
        if !removed {
            tracing::trace!(event, subscription = %id, "off for unknown subscription ignored");
        }
        removed
    }

    fn detach(&self, event: &str, id: SubscriptionId) -> bool {
        let mut subs = self.inner.subs.write();
        let Some(list) = subs.get_mut(event) else {
            return false;
        };
        let Some(pos) = list.iter().position(|r| r.id == id) else {
            return false;
        };
        let reg = list.remove(pos);
        reg.live.store(false, Ordering::Release);
        if list.is_empty() {
            subs.remove(event);
        }
        self.inner.active.fetch_sub(1, Ordering::Relaxed);
        true
    }

    /// 按登记顺序把 `payload` 同步投递给 `event` 的所有监听器；无人订阅时什么也不做。
    pub fn emit(&self, event: &str, payload: EventPayload) {
        self.inner.emitted.fetch_add(1, Ordering::Relaxed);
        // 快照后立即释放锁：监听器内的 on/off/emit 不会死锁，也不会破坏本次遍历
        let snapshot: SmallVec<[Arc<Registration>; 8]> = {
            let subs = self.inner.subs.read();
            match subs.get(event) {
                Some(list) => list.iter().cloned().collect(),
                None => SmallVec::new(),
            }
        };
        if snapshot.is_empty() {
            tracing::trace!(event, "emit without listeners");
            return;
        }
        for reg in snapshot.iter() {
            if reg.once {
                if !reg.live.swap(false, Ordering::AcqRel) {
                    continue;
                }
                self.detach(event, reg.id);
            } else if !reg.live.load(Ordering::Acquire) {
                continue;
            }
            self.deliver(event, reg, &payload);
        }
    }

    /// 边界校验后投递；形状不符时不投递任何监听器。
    pub fn emit_value(&self, event: &str, value: serde_json::Value) -> Result<()> {
        let payload = EventPayload::from_value(value).inspect_err(|e| {
            tracing::warn!(event, error = %e, "rejected malformed payload");
        })?;
        self.emit(event, payload);
        Ok(())
    }

    fn deliver(&self, event: &str, reg: &Registration, payload: &EventPayload) {
        self.inner.deliveries.fetch_add(1, Ordering::Relaxed);
        match panic::catch_unwind(AssertUnwindSafe(|| (reg.callback)(payload))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.inner.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(event, subscription = %reg.id, error = %e, "listener failed; delivery continues");
            }
            Err(p) => {
                self.inner.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(event, subscription = %reg.id, panic = %panic_message(p.as_ref()), "listener panicked; delivery continues");
            }
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.subs.read().get(event).map_or(0, Vec::len)
    }

    /// 当前至少有一个监听器的事件名。
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.subs.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            events_emitted: self.inner.emitted.load(Ordering::Relaxed),
            deliveries: self.inner.deliveries.load(Ordering::Relaxed),
            listener_failures: self.inner.failures.load(Ordering::Relaxed),
            active_subscriptions: self.inner.active.load(Ordering::Relaxed),
        }
    }

    /// 两个句柄是否指向同一条总线。
    pub fn same_bus(&self, other: &BusHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

pub(crate) fn panic_message(p: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// 单个模块持有的登记集合。`release`（或 drop）把它们全部从总线移除，总线本身不受影响。
pub struct Subscriptions {
    bus: BusHandle,
    held: Vec<(String, SubscriptionId)>,
}

impl Subscriptions {
    pub fn new(bus: BusHandle) -> Self {
        Self {
            bus,
            held: Vec::new(),
        }
    }

    pub fn bus(&self) -> &BusHandle {
        &self.bus
    }

    pub fn on<F>(&mut self, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.bus.on(event, callback);
        self.held.push((event.to_string(), id));
        id
    }

    pub fn once<F>(&mut self, event: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&EventPayload) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = self.bus.once(event, callback);
        self.held.push((event.to_string(), id));
        id
    }

    pub fn len(&self) -> usize {
        self.held.len()
    }

    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// 返回仍在总线上存活的登记数。
    pub fn release(&mut self) -> usize {
        let mut removed = 0;
        for (event, id) in self.held.drain(..) {
            if self.bus.off(&event, id) {
                removed += 1;
            }
        }
        removed
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("held", &self.held)
            .finish()
    }
}
