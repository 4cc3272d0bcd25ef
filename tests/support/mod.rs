#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc,
};

use widget_federation::bus::Subscriptions;
use widget_federation::event::EventPayload;
use widget_federation::widget::{FnFactory, Widget, WidgetFactory, WidgetProps};
use widget_federation::widgets::History;

/// Observes a recorder widget from outside the layout.
#[derive(Clone)]
pub struct Tap {
    pub log: History,
    pub disposed: Arc<AtomicBool>,
    /// 卸载后仍被调用的次数（应始终为 0）
    pub late_calls: Arc<AtomicUsize>,
}

impl Tap {
    pub fn new(limit: usize) -> Self {
        Self {
            log: History::new(limit),
            disposed: Arc::new(AtomicBool::new(false)),
            late_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn late_calls(&self) -> usize {
        self.late_calls.load(Ordering::SeqCst)
    }
}

struct Recorder {
    subs: Subscriptions,
    tap: Tap,
}

impl Widget for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }
    fn unmount(&mut self) {
        self.subs.release();
        self.tap.disposed.store(true, Ordering::SeqCst);
    }
    fn render(&self) -> String {
        self.tap.log.entries().join("\n")
    }
}

/// Consumer that logs every `event` payload into `tap.log`.
pub fn recorder(
    event: &'static str,
    tap: Tap,
) -> FnFactory<impl Fn(WidgetProps) -> anyhow::Result<Box<dyn Widget>> + Send + Sync> {
    FnFactory::new("support::Recorder", move |props: WidgetProps| {
        let mut subs = Subscriptions::new(props.event_bus);
        let p = tap.clone();
        subs.on(event, move |payload: &EventPayload| {
            if p.disposed.load(Ordering::SeqCst) {
                p.late_calls.fetch_add(1, Ordering::SeqCst);
            }
            p.log.push(payload.message.clone());
            Ok(())
        });
        Ok(Box::new(Recorder {
            subs,
            tap: tap.clone(),
        }) as Box<dyn Widget>)
    })
}

struct Emitter {
    event: &'static str,
    props: WidgetProps,
    sent: AtomicU64,
}

impl Widget for Emitter {
    fn name(&self) -> &str {
        "emitter"
    }
    fn unmount(&mut self) {}
    /// 每次交互发出一个事件，时间戳依次为 1000、2000……
    fn interact(&mut self, input: &str) -> anyhow::Result<()> {
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        self.props
            .event_bus
            .emit(self.event, EventPayload::new(input, n * 1_000));
        Ok(())
    }
}

/// Producer that emits `event` with the interaction text as message.
pub fn emitter(event: &'static str) -> impl WidgetFactory {
    FnFactory::new("support::Emitter", move |props: WidgetProps| {
        Ok(Box::new(Emitter {
            event,
            props,
            sent: AtomicU64::new(0),
        }) as Box<dyn Widget>)
    })
}

/// Factory whose instantiation always fails.
pub fn broken(reason: &'static str) -> impl WidgetFactory {
    FnFactory::new("support::Broken", move |_props: WidgetProps| {
        Err(anyhow::anyhow!(reason))
    })
}
