/// Fire-and-forget user notices. Implementations must not block and must not
/// fail; a notice that goes nowhere is acceptable, a notice that takes the
/// pipeline down is not.
pub trait Notifier {
    fn notify(&self, title: &str, message: &str);
}

/// Default notifier: notices land in the structured log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, message: &str) {
        tracing::info!(notice = %title, "{message}");
    }
}
