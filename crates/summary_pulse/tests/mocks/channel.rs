use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use summary_pulse::{ChannelEvent, CommandChannel, EventFilter, OutboundMessage};
use tokio::sync::mpsc;

/// In-memory stand-in for the push channel. Tests inject events with
/// [`MockChannel::emit`] and inspect what the orchestrator sent.
#[derive(Clone)]
pub struct MockChannel {
    connected: Arc<AtomicBool>,
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    subscribers: Arc<Mutex<Vec<(EventFilter, mpsc::UnboundedSender<ChannelEvent>)>>>,
}

impl MockChannel {
    pub fn new() -> Self {
        MockChannel {
            connected: Arc::new(AtomicBool::new(true)),
            sent: Arc::new(Mutex::new(Vec::new())),
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn disconnected() -> Self {
        let channel = Self::new();
        channel.connected.store(false, Ordering::Relaxed);
        channel
    }

    pub fn emit(&self, event: ChannelEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(filter, tx)| {
            if !filter.matches(&event) {
                return !tx.is_closed();
            }
            tx.send(event.clone()).is_ok()
        });
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl CommandChannel for MockChannel {
    fn send(&self, message: OutboundMessage) -> bool {
        if !self.connected.load(Ordering::Relaxed) {
            return false;
        }
        self.sent.lock().unwrap().push(message);
        true
    }

    fn subscribe(&self, filter: EventFilter) -> mpsc::UnboundedReceiver<ChannelEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push((filter, tx));
        rx
    }
}
