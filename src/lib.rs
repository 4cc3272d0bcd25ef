pub mod bus;
pub mod composer;
pub mod config;
pub mod error;
pub mod event;
pub mod remote;
pub mod shared;
pub mod slot;
pub mod widget;
pub mod widgets;

// 允许在本 crate 内通过 `widget_federation::...` 自引用（供 proc-macro 展开使用）
extern crate self as widget_federation;

pub mod prelude {
    pub use crate::bus::{BusHandle, EventBus, SubscriptionId, Subscriptions};
    pub use crate::composer::Composer;
    pub use crate::config::ComposerConfig;
    pub use crate::error::{FederationError, Result};
    pub use crate::event::{topics, EventPayload, Timestamp};
    pub use crate::remote::{ContainerRegistry, ModuleRequest, RemoteLoader, RemoteTarget};
    pub use crate::slot::{LoadState, SlotView};
    pub use crate::widget::{Mountable, Widget, WidgetFactory, WidgetProps};
}

pub use federation_macros::expose;

#[doc(hidden)]
pub mod __private {
    pub use inventory;
}
