//! 仪表盘演示：三个独立部署的部件在同一宿主中组合，只通过总线交流。
//!
//! `cargo run --example dashboard`；传入秒数可在结束前保持会话（Ctrl-C 提前退出）。
use std::{sync::Arc, time::Duration};

use widget_federation::config::SharedDependency;
use widget_federation::prelude::*;
use widget_federation::remote::Side;

fn print_layout(composer: &Composer) {
    for (title, view) in composer.layout() {
        println!("== {title} ==");
        println!("{view}\n");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let cfg = ComposerConfig::default()
        .remote(RemoteTarget::localhost("notes_widget", 3001, Side::Client))
        .remote(RemoteTarget::localhost("analytics_widget", 3002, Side::Client))
        .remote(RemoteTarget::localhost("ai_chat", 3003, Side::Client))
        .shared_dep(SharedDependency::new("@repo/ui/card", "1.0.0"))
        .slot("analytics", "analytics_widget/Widget".parse()?)
        .slot("chat", "ai_chat/Widget".parse()?)
        .slot("log", "notes_widget/Widget".parse()?);

    let registry = Arc::new(ContainerRegistry::discover());
    // 模拟网络：对话部件的远端稍慢
    registry.set_latency("ai_chat", Some(Duration::from_millis(150)));

    let mut composer = Composer::new(cfg, registry)?;
    composer.start().await?;
    print_layout(&composer);

    for (slot, state) in composer.settle_all().await {
        tracing::info!(slot = %slot, state = %state, "slot settled");
    }

    composer.interact("analytics", "refresh")?;
    composer.interact("chat", "Tell me about the analytics widget")?;
    print_layout(&composer);

    let hold = std::env::args()
        .nth(1)
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);
    if hold > 0 {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
            _ = tokio::time::sleep(Duration::from_secs(hold)) => {}
        }
    }

    let stats = composer.bus().stats();
    tracing::info!(
        emitted = stats.events_emitted,
        deliveries = stats.deliveries,
        failures = stats.listener_failures,
        "bus summary"
    );
    composer.teardown().await;
    Ok(())
}
