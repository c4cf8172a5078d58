use crate::types::EventRecord;
use tokio::sync::broadcast;

/// Fan-out channel for review lifecycle events. Subscribers that fall behind
/// lose the oldest records; the persisted event log is the durable copy.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventRecord>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.sender.subscribe()
    }

    pub fn publish(
        &self,
        event: EventRecord,
    ) -> Result<(), broadcast::error::SendError<EventRecord>> {
        self.sender.send(event).map(|_| ())
    }
}
