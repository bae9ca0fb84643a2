//! Callbacks invoked by the receive loop

use std::sync::Arc;

use crate::protocol::InboundMessage;

/// Called on the receive thread when the trigger token arrives
pub type TriggerCallback = Arc<dyn Fn() + Send + Sync>;

/// Called with any other (trimmed, non-empty) inbound text
pub type MessageCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Dispatch table handed to each receiver when it is spawned
#[derive(Clone, Default)]
pub struct MessageHandlers {
    on_trigger: Option<TriggerCallback>,
    on_message: Option<MessageCallback>,
}

impl MessageHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_trigger(&mut self, callback: TriggerCallback) {
        self.on_trigger = Some(callback);
    }

    pub fn set_message(&mut self, callback: MessageCallback) {
        self.on_message = Some(callback);
    }

    /// Route one decoded message. Runs the trigger synchronously.
    pub fn dispatch(&self, message: InboundMessage) {
        match message {
            InboundMessage::Trigger => match &self.on_trigger {
                Some(callback) => callback(),
                None => log::warn!("Trigger received but no capture pipeline is attached"),
            },
            InboundMessage::Text(text) => {
                if text.is_empty() {
                    return;
                }
                match &self.on_message {
                    Some(callback) => callback(&text),
                    None => log::info!("{}", text),
                }
            }
        }
    }
}

impl std::fmt::Debug for MessageHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandlers")
            .field("on_trigger", &self.on_trigger.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_dispatch_routes_trigger_and_text() {
        let triggers = Arc::new(AtomicUsize::new(0));
        let texts = Arc::new(Mutex::new(Vec::new()));

        let mut handlers = MessageHandlers::new();
        let t = triggers.clone();
        handlers.set_trigger(Arc::new(move || {
            t.fetch_add(1, Ordering::SeqCst);
        }));
        let m = texts.clone();
        handlers.set_message(Arc::new(move |text: &str| m.lock().push(text.to_string())));

        handlers.dispatch(InboundMessage::classify(" [HX_ARD] 1 \n"));
        handlers.dispatch(InboundMessage::classify("[BOX_ARD] OPEN_70\n"));
        handlers.dispatch(InboundMessage::classify("   \n"));

        assert_eq!(triggers.load(Ordering::SeqCst), 1);
        assert_eq!(*texts.lock(), vec!["[BOX_ARD] OPEN_70".to_string()]);
    }

    #[test]
    fn test_dispatch_without_handlers_does_not_panic() {
        let handlers = MessageHandlers::new();
        handlers.dispatch(InboundMessage::Trigger);
        handlers.dispatch(InboundMessage::Text("hi".into()));
    }
}
