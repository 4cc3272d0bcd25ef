use parking_lot::Mutex;
use std::sync::Arc;

use crate::bus::Subscriptions;
use crate::event::{topics, EventPayload};
use crate::widget::{Mountable, Widget, WidgetProps};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sender {
    User,
    Ai,
    System,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
        }
    }
}

pub const INSIGHT_MESSAGE: &str = "AI provided insight about the Analytics widget.";

/// 预设回复的助手：响应数据刷新并播报洞察。
#[widget_federation::expose(container = "ai_chat", module = "./Widget")]
pub struct AssistantChat {
    messages: Arc<Mutex<Vec<ChatMessage>>>,
    subs: Subscriptions,
}

impl AssistantChat {
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().clone()
    }

    /// 记录问题并作答；回答带有洞察时发出 `ai:insight`。空白输入被忽略。
    pub fn ask(&mut self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        let reply = canned_reply(text);
        {
            let mut msgs = self.messages.lock();
            msgs.push(ChatMessage::new(Sender::User, text));
            msgs.push(ChatMessage::new(Sender::Ai, reply));
        }
        if reply.contains(topics::AI_INSIGHT) {
            self.subs
                .bus()
                .emit(topics::AI_INSIGHT, EventPayload::now(INSIGHT_MESSAGE));
        }
        Some(reply.to_string())
    }
}

fn canned_reply(message: &str) -> &'static str {
    let msg = message.to_lowercase();
    if msg.contains("hello") || msg.contains("hi") {
        "Hello! How can I help you with your dashboard today?"
    } else if msg.contains("analytics") {
        "The Analytics widget shows key metrics. I will now emit an 'ai:insight' event for the log to capture."
    } else if msg.contains("log") {
        "The Real-time Log widget listens for events from other widgets. You just saw it react to an analytics refresh."
    } else {
        "I'm not sure how to respond to that. Try asking about 'analytics' or 'log'."
    }
}

impl Mountable for AssistantChat {
    fn mount(props: WidgetProps) -> anyhow::Result<Self> {
        let messages = Arc::new(Mutex::new(Vec::new()));
        let mut subs = Subscriptions::new(props.event_bus);
        let m = messages.clone();
        subs.on(topics::ANALYTICS_BROADCAST, move |p: &EventPayload| {
            m.lock().push(ChatMessage::new(
                Sender::System,
                format!(
                    "I noticed the analytics data was refreshed. New message: \"{}\"",
                    p.message
                ),
            ));
            Ok(())
        });
        Ok(Self { messages, subs })
    }
}

impl Widget for AssistantChat {
    fn name(&self) -> &str {
        "ai_chat"
    }

    fn unmount(&mut self) {
        self.subs.release();
    }

    fn render(&self) -> String {
        self.messages
            .lock()
            .iter()
            .map(|m| match m.sender {
                Sender::User => format!("> {}", m.text),
                Sender::Ai => m.text.clone(),
                Sender::System => format!("* {}", m.text),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn interact(&mut self, input: &str) -> anyhow::Result<()> {
        self.ask(input);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::EventBus;

    fn mount() -> (crate::bus::BusHandle, AssistantChat) {
        let bus = EventBus::new().handle();
        let chat = AssistantChat::mount(WidgetProps {
            event_bus: bus.clone(),
        })
        .expect("mount");
        (bus, chat)
    }

    #[test]
    fn analytics_question_emits_insight() {
        let (bus, mut chat) = mount();
        let insights = Arc::new(Mutex::new(Vec::new()));
        let i = insights.clone();
        bus.on(topics::AI_INSIGHT, move |p| {
            i.lock().push(p.message.clone());
            Ok(())
        });
        chat.ask("Tell me about ANALYTICS");
        chat.ask("what about the log?");
        assert_eq!(*insights.lock(), vec![INSIGHT_MESSAGE.to_string()]);
        assert_eq!(chat.messages().len(), 4);
        assert!(chat.ask("   ").is_none());
    }

    #[test]
    fn notices_analytics_refresh() {
        let (bus, mut chat) = mount();
        bus.emit(topics::ANALYTICS_BROADCAST, EventPayload::new("rev up", 1));
        assert_eq!(
            chat.messages(),
            vec![ChatMessage::new(
                Sender::System,
                "I noticed the analytics data was refreshed. New message: \"rev up\""
            )]
        );
        chat.unmount();
        bus.emit(topics::ANALYTICS_BROADCAST, EventPayload::new("again", 2));
        assert_eq!(chat.messages().len(), 1);
    }

    #[test]
    fn greeting_wins_over_topics() {
        assert!(canned_reply("hi, analytics?").starts_with("Hello!"));
        assert!(canned_reply("zzz").starts_with("I'm not sure"));
    }
}
