//! 仪表盘里协作的三个部件：分析面板（生产者）、助手对话（生产者 + 消费者）、实时日志（消费者）。
//!
//! 业务逻辑保持为演示级别；重点是它们只通过总线彼此交流。
pub mod analytics;
pub mod chat;
pub mod notes;

pub use analytics::{AnalyticsPanel, AnalyticsStats};
pub use chat::{AssistantChat, ChatMessage, Sender};
pub use notes::{History, NotesLog, DEFAULT_HISTORY_LIMIT};
