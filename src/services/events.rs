//! In-process change feed

use tokio::sync::broadcast;

use crate::models::event::ChangeEvent;

/// Fan-out of committed writes to live subscribers
#[derive(Clone)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Announce a change; events are dropped when nobody listens
    pub fn publish(&self, event: ChangeEvent) {
        tracing::debug!(
            table = event.table.as_str(),
            action = ?event.action,
            id = %event.id,
            "change published"
        );
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::{ChangeAction, ChangeTable};

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let feed = ChangeFeed::new(8);
        let mut rx = feed.subscribe();
        assert_eq!(feed.subscriber_count(), 1);

        feed.publish(ChangeEvent::deleted(ChangeTable::Books, "42"));
        let event = rx.recv().await.unwrap();
        assert_eq!(event.table, ChangeTable::Books);
        assert_eq!(event.action, ChangeAction::Delete);
        assert_eq!(event.id, "42");
        assert!(event.record.is_none());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let feed = ChangeFeed::new(1);
        feed.publish(ChangeEvent::deleted(ChangeTable::Categories, 1));
        assert_eq!(feed.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber() {
        let feed = ChangeFeed::new(2);
        let mut rx = feed.subscribe();
        for i in 0..5 {
            feed.publish(ChangeEvent::deleted(ChangeTable::Books, i));
        }
        assert!(matches!(rx.recv().await, Err(broadcast::error::RecvError::Lagged(_))));
        assert_eq!(rx.recv().await.unwrap().id, "3");
    }
}
