use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};

use crate::bus::Subscriptions;
use crate::event::{topics, EventPayload};
use crate::widget::{FnFactory, Mountable, Widget, WidgetFactory, WidgetProps};

pub const DEFAULT_HISTORY_LIMIT: usize = 5;
pub const EMPTY_TEXT: &str = "Waiting for events from other widgets...";

/// 有上限、最新在前的记录列表；克隆共享同一份存储。
#[derive(Clone, Debug)]
pub struct History {
    inner: Arc<Mutex<VecDeque<String>>>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(limit))),
            limit,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 新条目在最前；超出上限时淘汰最旧的。
    pub fn push(&self, note: String) {
        let mut notes = self.inner.lock();
        notes.push_front(note);
        notes.truncate(self.limit);
    }

    pub fn entries(&self) -> Vec<String> {
        self.inner.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

/// 实时记录其他模块广播的内容。
#[widget_federation::expose(container = "notes_widget", module = "./Widget")]
pub struct NotesLog {
    history: History,
    subs: Subscriptions,
}

impl NotesLog {
    pub fn attach(props: WidgetProps, history: History) -> Self {
        let mut subs = Subscriptions::new(props.event_bus);
        let h = history.clone();
        subs.on(topics::ANALYTICS_BROADCAST, move |p: &EventPayload| {
            h.push(note("Analytics", p));
            Ok(())
        });
        let h = history.clone();
        subs.on(topics::AI_INSIGHT, move |p: &EventPayload| {
            h.push(note("AI Insight", p));
            Ok(())
        });
        Self { history, subs }
    }

    /// 所有实例都写入 `history` 的工厂，宿主可在布局之外观察日志。
    pub fn factory(history: History) -> impl WidgetFactory {
        FnFactory::new("notes_widget::NotesLog", move |props| {
            Ok(Box::new(NotesLog::attach(props, history.clone())) as Box<dyn Widget>)
        })
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn clear(&self) {
        self.history.clear();
    }
}

fn note(tag: &str, p: &EventPayload) -> String {
    format!("[{}] [{tag}] {}", p.timestamp.clock_label(), p.message)
}

impl Mountable for NotesLog {
    fn mount(props: WidgetProps) -> anyhow::Result<Self> {
        Ok(Self::attach(props, History::default()))
    }
}

impl Widget for NotesLog {
    fn name(&self) -> &str {
        "notes_widget"
    }

    fn unmount(&mut self) {
        self.subs.release();
    }

    fn render(&self) -> String {
        let notes = self.history.entries();
        if notes.is_empty() {
            EMPTY_TEXT.to_string()
        } else {
            notes.join("\n")
        }
    }

    fn interact(&mut self, input: &str) -> anyhow::Result<()> {
        match input.trim() {
            "clear" => {
                self.clear();
                Ok(())
            }
            other => anyhow::bail!("notes log does not understand '{other}'"),
        }
    }
}
