use std::sync::{Arc, Mutex};

use summary_pulse::Notifier;

/// Captures notifications as `(title, message)` pairs.
#[derive(Clone, Default)]
pub struct MockNotifier {
    notices: Arc<Mutex<Vec<(String, String)>>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<(String, String)> {
        self.notices.lock().unwrap().clone()
    }
}

impl Notifier for MockNotifier {
    fn notify(&self, title: &str, message: &str) {
        self.notices
            .lock()
            .unwrap()
            .push((title.to_string(), message.to_string()));
    }
}
