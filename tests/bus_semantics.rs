use parking_lot::Mutex;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use widget_federation::bus::{EventBus, SubscriptionId};
use widget_federation::prelude::*;

fn payload(msg: &str) -> EventPayload {
    EventPayload::new(msg, 1_000)
}

/// 每个监听器把自己的编号写入共享日志
fn tagged(log: &Arc<Mutex<Vec<usize>>>, tag: usize) -> impl Fn(&EventPayload) -> anyhow::Result<()> {
    let log = log.clone();
    move |_| {
        log.lock().push(tag);
        Ok(())
    }
}

#[test]
fn delivery_follows_subscription_order() {
    let bus = EventBus::new().handle();
    let log = Arc::new(Mutex::new(Vec::new()));
    for i in 1..=5 {
        bus.on("metrics:refresh", tagged(&log, i));
    }
    bus.emit("metrics:refresh", payload("a"));
    bus.emit("metrics:refresh", payload("b"));
    assert_eq!(*log.lock(), vec![1, 2, 3, 4, 5, 1, 2, 3, 4, 5]);
}

#[test]
fn all_listeners_observe_the_same_payload() {
    let bus = EventBus::new().handle();
    let seen = Arc::new(Mutex::new(Vec::<usize>::new()));
    for _ in 0..3 {
        let s = seen.clone();
        bus.on("p:x", move |p: &EventPayload| {
            s.lock().push(p as *const EventPayload as usize);
            Ok(())
        });
    }
    bus.emit("p:x", payload("shared"));
    let seen = seen.lock();
    assert_eq!(seen.len(), 3);
    assert!(seen.iter().all(|addr| *addr == seen[0]));
}

#[test]
fn off_is_idempotent_and_targets_one_registration() {
    let bus = EventBus::new().handle();
    let log = Arc::new(Mutex::new(Vec::new()));
    let a = bus.on("e:x", tagged(&log, 1));
    let _b = bus.on("e:x", tagged(&log, 2));
    assert!(bus.off("e:x", a));
    assert!(!bus.off("e:x", a));
    // 未登记过的名字 / 错误的事件名
    assert!(!bus.off("never:seen", a));
    let c = bus.on("e:y", tagged(&log, 3));
    assert!(!bus.off("e:x", c));
    bus.emit("e:x", payload("x"));
    bus.emit("e:y", payload("y"));
    assert_eq!(*log.lock(), vec![2, 3]);
}

#[test]
fn same_logic_registered_twice_is_two_entries() {
    let bus = EventBus::new().handle();
    let count = Arc::new(AtomicUsize::new(0));
    let make = |c: Arc<AtomicUsize>| {
        move |_: &EventPayload| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    };
    let first = bus.on("d:x", make(count.clone()));
    let second = bus.on("d:x", make(count.clone()));
    assert_ne!(first, second);
    bus.emit("d:x", payload("1"));
    assert_eq!(count.load(Ordering::SeqCst), 2);
    bus.off("d:x", first);
    bus.emit("d:x", payload("2"));
    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert_eq!(bus.listener_count("d:x"), 1);
}

#[test]
fn listener_removing_itself_does_not_disturb_others() {
    let bus = EventBus::new().handle();
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.on("r:x", tagged(&log, 1));
    let own_id: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
    let (b, l, own) = (bus.clone(), log.clone(), own_id.clone());
    let id = bus.on("r:x", move |_| {
        l.lock().push(2);
        if let Some(id) = *own.lock() {
            b.off("r:x", id);
        }
        Ok(())
    });
    *own_id.lock() = Some(id);
    bus.on("r:x", tagged(&log, 3));
    bus.on("r:x", tagged(&log, 4));

    bus.emit("r:x", payload("first"));
    bus.emit("r:x", payload("second"));
    assert_eq!(*log.lock(), vec![1, 2, 3, 4, 1, 3, 4]);
}

#[test]
fn removing_a_later_listener_mid_emit_skips_only_that_listener() {
    let bus = EventBus::new().handle();
    let log = Arc::new(Mutex::new(Vec::new()));
    let victim: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
    let (b, l, v) = (bus.clone(), log.clone(), victim.clone());
    bus.on("r:y", move |_| {
        l.lock().push(1);
        if let Some(id) = v.lock().take() {
            b.off("r:y", id);
        }
        Ok(())
    });
    bus.on("r:y", tagged(&log, 2));
    *victim.lock() = Some(bus.on("r:y", tagged(&log, 3)));
    bus.on("r:y", tagged(&log, 4));

    bus.emit("r:y", payload("x"));
    assert_eq!(*log.lock(), vec![1, 2, 4]);
}

#[test]
fn removing_an_earlier_listener_mid_emit_is_not_a_double_call() {
    let bus = EventBus::new().handle();
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = bus.on("r:z", tagged(&log, 1));
    let (b, l) = (bus.clone(), log.clone());
    bus.on("r:z", move |_| {
        l.lock().push(2);
        b.off("r:z", first);
        Ok(())
    });
    bus.on("r:z", tagged(&log, 3));
    bus.emit("r:z", payload("x"));
    bus.emit("r:z", payload("y"));
    assert_eq!(*log.lock(), vec![1, 2, 3, 2, 3]);
}

#[test]
fn failing_listener_is_isolated() {
    let bus = EventBus::new().handle();
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.on("f:x", tagged(&log, 1));
    bus.on("f:x", |_| Err(anyhow::anyhow!("widget exploded")));
    bus.on("f:x", tagged(&log, 3));
    bus.emit("f:x", payload("x"));
    assert_eq!(*log.lock(), vec![1, 3]);
    let stats = bus.stats();
    assert_eq!(stats.deliveries, 3);
    assert_eq!(stats.listener_failures, 1);
}

#[test]
fn panicking_listener_is_isolated() {
    let bus = EventBus::new().handle();
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.on("f:y", tagged(&log, 1));
    bus.on("f:y", |_| panic!("listener bug"));
    bus.on("f:y", tagged(&log, 3));
    bus.emit("f:y", payload("x"));
    bus.emit("f:y", payload("y"));
    assert_eq!(*log.lock(), vec![1, 3, 1, 3]);
    assert_eq!(bus.stats().listener_failures, 2);
}

#[test]
fn no_implicit_broadcast_across_names() {
    let bus = EventBus::new().handle();
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.on("y", tagged(&log, 1));
    bus.on("x:y", tagged(&log, 2));
    bus.emit("x", payload("x"));
    assert!(log.lock().is_empty());
}

#[test]
fn emit_without_listeners_is_a_noop() {
    let bus = EventBus::new().handle();
    bus.emit("nobody:home", payload("x"));
    bus.emit("", payload("empty name"));
    let stats = bus.stats();
    assert_eq!(stats.events_emitted, 2);
    assert_eq!(stats.deliveries, 0);
}

#[test]
fn once_fires_a_single_time() {
    let bus = EventBus::new().handle();
    let log = Arc::new(Mutex::new(Vec::new()));
    bus.once("o:x", tagged(&log, 1));
    bus.on("o:x", tagged(&log, 2));
    bus.emit("o:x", payload("1"));
    bus.emit("o:x", payload("2"));
    assert_eq!(*log.lock(), vec![1, 2, 2]);
    assert_eq!(bus.listener_count("o:x"), 1);
}

#[test]
fn handles_are_shared_across_threads() {
    let bus = EventBus::new().handle();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    bus.on("t:x", move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let b = bus.clone();
            std::thread::spawn(move || {
                for _ in 0..25 {
                    b.emit("t:x", EventPayload::now("tick"));
                }
            })
        })
        .collect();
    for h in handles {
        h.join().expect("emitter thread");
    }
    assert_eq!(count.load(Ordering::SeqCst), 100);
}
