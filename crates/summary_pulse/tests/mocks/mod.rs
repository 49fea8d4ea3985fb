mod channel;
mod exporter;
mod notifier;
mod streamer;

pub use channel::MockChannel;
pub use exporter::MockExporter;
pub use notifier::MockNotifier;
pub use streamer::MockStreamer;
