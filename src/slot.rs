//! 布局插槽的加载状态机。
//!
//! - pending → loading：插槽被调度
//! - loading → ready / failed：加载结论
//! - failed → loading：重试
//! - loading / ready / failed → pending：卸载
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};

use crate::config::SlotConfig;
use crate::error::{FederationError, Result};
use crate::widget::Widget;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadState {
    Pending,
    /// `attempt` 从 1 开始，随自动重试递增。
    Loading {
        attempt: u32,
    },
    Ready,
    Failed {
        reason: String,
        retryable: bool,
    },
}

impl LoadState {
    pub fn label(&self) -> &'static str {
        match self {
            LoadState::Pending => "pending",
            LoadState::Loading { .. } => "loading",
            LoadState::Ready => "ready",
            LoadState::Failed { .. } => "failed",
        }
    }

    /// `ready` 或 `failed`：本次挂载尝试已有结论。
    pub fn is_settled(&self) -> bool {
        matches!(self, LoadState::Ready | LoadState::Failed { .. })
    }

    /// 仅 `loading` 表示有加载任务在进行；`pending` 的插槽没有被调度。
    pub fn is_in_flight(&self) -> bool {
        matches!(self, LoadState::Loading { .. })
    }

    pub fn can_move_to(&self, next: &LoadState) -> bool {
        use LoadState::*;
        match (self, next) {
            (Pending, Loading { .. }) => true,
            (Loading { attempt: a }, Loading { attempt: b }) => b > a,
            (Loading { .. }, Ready | Failed { .. }) => true,
            (Failed { .. }, Loading { .. }) => true,
            (Loading { .. } | Ready | Failed { .. }, Pending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for LoadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadState::Loading { attempt } if *attempt > 1 => {
                write!(f, "loading (attempt {attempt})")
            }
            LoadState::Failed { reason, .. } => write!(f, "failed: {reason}"),
            other => f.write_str(other.label()),
        }
    }
}

/// 布局中插槽的呈现。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotView {
    /// 模块尚未挂载时的占位。
    Placeholder,
    /// 内联错误；`retryable` 决定是否提供重试入口。
    Error { reason: String, retryable: bool },
    Mounted { content: String },
}

impl SlotView {
    pub const PLACEHOLDER_TEXT: &'static str = "Loading...";
}

impl fmt::Display for SlotView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotView::Placeholder => f.write_str(Self::PLACEHOLDER_TEXT),
            SlotView::Error { reason, retryable } => {
                write!(f, "Failed to load: {reason}")?;
                if *retryable {
                    f.write_str(" [Retry]")?;
                }
                Ok(())
            }
            SlotView::Mounted { content } => f.write_str(content),
        }
    }
}

/// 同线程重入同一模块（例如监听器回调到正在交互的模块）时最多等待这么久
const BUSY_WAIT: Duration = Duration::from_millis(100);

/// 已挂载的模块实例。
///
/// 插槽表只保存它的 `Arc`，模块代码总是在插槽表解锁之后才被调用，
/// 因此模块在 `interact`/`render` 中同步触发的监听器可以安全地回读组合器。
pub(crate) struct MountedWidget {
    widget: Mutex<Option<Box<dyn Widget>>>,
    retired: AtomicBool,
}

impl MountedWidget {
    pub(crate) fn new(widget: Box<dyn Widget>) -> Arc<Self> {
        Arc::new(Self {
            widget: Mutex::new(Some(widget)),
            retired: AtomicBool::new(false),
        })
    }

    /// 对实例执行 `f`；实例正忙或已卸载时返回 `None`。
    /// 若执行期间插槽被卸载，由这里补做 `Widget::unmount`。
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut dyn Widget) -> R) -> Option<R> {
        let mut guard = self.widget.try_lock_for(BUSY_WAIT)?;
        let out = guard.as_mut().map(|w| f(w.as_mut()));
        if self.retired.load(Ordering::Acquire) {
            if let Some(mut w) = guard.take() {
                w.unmount();
                tracing::info!(widget = w.name(), "deferred unmount completed");
            }
        }
        out
    }

    /// 标记卸载并立即调用 `Widget::unmount`；实例正被使用时推迟到使用者返回。
    /// 返回本次实际卸载的模块名。
    pub(crate) fn retire(&self) -> Option<String> {
        self.retired.store(true, Ordering::Release);
        let Some(mut guard) = self.widget.try_lock_for(BUSY_WAIT) else {
            tracing::debug!("widget busy; unmount deferred to current caller");
            return None;
        };
        guard.take().map(|mut w| {
            w.unmount();
            w.name().to_string()
        })
    }
}

pub(crate) struct Slot {
    pub(crate) config: SlotConfig,
    state: watch::Sender<LoadState>,
    /// 每次调度/卸载递增；过期的加载结果据此丢弃
    pub(crate) generation: u64,
    pub(crate) instance: Option<Arc<MountedWidget>>,
    pub(crate) task: Option<JoinHandle<()>>,
}

impl Slot {
    pub(crate) fn new(config: SlotConfig) -> Self {
        let (state, _) = watch::channel(LoadState::Pending);
        Self {
            config,
            state,
            generation: 0,
            instance: None,
            task: None,
        }
    }

    pub(crate) fn id(&self) -> &str {
        &self.config.id
    }

    pub(crate) fn state(&self) -> LoadState {
        self.state.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    pub(crate) fn transition(&mut self, next: LoadState) -> Result<()> {
        let cur = self.state();
        if !cur.can_move_to(&next) {
            return Err(FederationError::InvalidTransition {
                slot: self.config.id.clone(),
                from: cur.label(),
                to: next.label(),
            });
        }
        tracing::debug!(slot = %self.config.id, from = cur.label(), to = %next, "slot transition");
        // 无接收者时也要更新当前值
        self.state.send_replace(next);
        Ok(())
    }
}

/// 在插槽表锁之外调用，渲染会进入模块代码。
pub(crate) fn view_of(state: LoadState, widget: Option<&MountedWidget>) -> SlotView {
    match state {
        LoadState::Pending | LoadState::Loading { .. } => SlotView::Placeholder,
        LoadState::Failed { reason, retryable } => SlotView::Error { reason, retryable },
        LoadState::Ready => SlotView::Mounted {
            content: widget
                .and_then(|w| w.with(|w| w.render()))
                .unwrap_or_default(),
        },
    }
}
