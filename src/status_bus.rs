//! Process-wide status bus.
//!
//! A write-mostly broadcast channel of ASCII status lines, shaped
//! `"<backend>/<model> -> <op>"`. Treated as an injectable service: built
//! once, cloned into collaborators that need to publish. Subscribers
//! (a UI, a log tailer) may lag or drop; the bus never blocks a publisher
//! on a slow subscriber.

use tokio::sync::broadcast;

#[derive(Clone)]
pub struct StatusBus {
    tx: broadcast::Sender<String>,
}

impl StatusBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Publish a status line. Decorative unicode belongs to the UI layer,
    /// not here -- lines published through this bus are ASCII by contract.
    pub fn publish(&self, line: impl Into<String>) {
        let line = line.into();
        debug_assert!(line.is_ascii(), "status bus lines must be ASCII: {line}");
        let _ = self.tx.send(line);
    }

    pub fn publish_op(&self, backend: &str, model: &str, op: &str) {
        self.publish(format!("{backend}/{model} -> {op}"));
    }

    pub fn clear(&self, backend: &str, model: &str) {
        self.publish(format!("{backend}/{model} -> idle"));
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new(256)
    }
}
