use crate::bus::BusHandle;
use crate::event::{topics, EventPayload};
use crate::widget::{Mountable, Widget, WidgetProps};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AnalyticsStats {
    pub page_views: u64,
    pub sign_ups: u64,
    pub revenue: u64,
}

type StatsSource = Box<dyn FnMut() -> AnalyticsStats + Send>;

/// 展示核心指标，每次刷新都会广播。
#[widget_federation::expose(container = "analytics_widget", module = "./Widget")]
pub struct AnalyticsPanel {
    bus: BusHandle,
    stats: AnalyticsStats,
    source: StatsSource,
}

impl AnalyticsPanel {
    pub fn with_source(
        props: WidgetProps,
        source: impl FnMut() -> AnalyticsStats + Send + 'static,
    ) -> Self {
        let mut source: StatsSource = Box::new(source);
        // 挂载时先取一次数据，但不广播
        let stats = source();
        Self {
            bus: props.event_bus,
            stats,
            source,
        }
    }

    pub fn stats(&self) -> AnalyticsStats {
        self.stats
    }

    /// 拉取最新数据并发出 `analytics:broadcast`。
    pub fn refresh(&mut self) -> AnalyticsStats {
        self.stats = (self.source)();
        let payload = EventPayload::now(format!(
            "Analytics data refreshed. New revenue: ${}",
            group_thousands(self.stats.revenue)
        ));
        self.bus.emit(topics::ANALYTICS_BROADCAST, payload);
        self.stats
    }
}

/// 演示数据：xorshift，种子取自当前时间。
fn mock_source() -> impl FnMut() -> AnalyticsStats + Send {
    let mut state = crate::event::Timestamp::now().as_millis() | 1;
    move || {
        let mut next = |lo: u64, span: u64| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            lo + state % span
        };
        AnalyticsStats {
            page_views: next(1_000, 5_000),
            sign_ups: next(50, 200),
            revenue: next(2_000, 10_000),
        }
    }
}

pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

impl Mountable for AnalyticsPanel {
    fn mount(props: WidgetProps) -> anyhow::Result<Self> {
        Ok(Self::with_source(props, mock_source()))
    }
}

impl Widget for AnalyticsPanel {
    fn name(&self) -> &str {
        "analytics_widget"
    }

    // 纯生产者，没有订阅需要释放
    fn unmount(&mut self) {}

    fn render(&self) -> String {
        format!(
            "Page Views {}\nSign Ups {}\nRevenue ${}",
            group_thousands(self.stats.page_views),
            group_thousands(self.stats.sign_ups),
            group_thousands(self.stats.revenue)
        )
    }

    fn interact(&mut self, input: &str) -> anyhow::Result<()> {
        match input.trim() {
            "refresh" => {
                self.refresh();
                Ok(())
            }
            other => anyhow::bail!("analytics panel does not understand '{other}'"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn thousands_grouping() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(12_345_678), "12,345,678");
    }

    #[test]
    fn refresh_broadcasts_revenue() {
        let bus = EventBus::new().handle();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        bus.on(topics::ANALYTICS_BROADCAST, move |p| {
            s.lock().push(p.message.clone());
            Ok(())
        });
        let mut panel = AnalyticsPanel::with_source(
            WidgetProps {
                event_bus: bus.clone(),
            },
            || AnalyticsStats {
                page_views: 1_500,
                sign_ups: 60,
                revenue: 7_250,
            },
        );
        // 挂载本身不广播
        assert!(seen.lock().is_empty());
        panel.interact("refresh").expect("refresh");
        assert_eq!(
            *seen.lock(),
            vec!["Analytics data refreshed. New revenue: $7,250".to_string()]
        );
        assert_eq!(panel.render(), "Page Views 1,500\nSign Ups 60\nRevenue $7,250");
    }

    #[test]
    fn mock_source_stays_in_range() {
        let mut src = mock_source();
        for _ in 0..100 {
            let s = src();
            assert!((1_000..6_000).contains(&s.page_views));
            assert!((50..250).contains(&s.sign_ups));
            assert!((2_000..12_000).contains(&s.revenue));
        }
    }
}
