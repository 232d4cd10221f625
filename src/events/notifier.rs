//! Notifier trait and the broadcast implementation.

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::topology::TopologyDocument;

/// Receives every committed document.
pub trait ChangeNotifier: Send + Sync {
    fn publish(&self, document: Arc<TopologyDocument>);
}

/// Relays documents to any number of subscribers over a broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Arc<TopologyDocument>>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TopologyDocument>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(16)
    }
}

impl ChangeNotifier for BroadcastNotifier {
    fn publish(&self, document: Arc<TopologyDocument>) {
        // No subscribers is the normal state between client sessions.
        if let Ok(delivered) = self.tx.send(document) {
            tracing::debug!(subscribers = delivered, "Published topology update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Host;
    use std::net::Ipv4Addr;

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = BroadcastNotifier::new(4);
        notifier.publish(Arc::new(TopologyDocument::default()));
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribers_receive_documents() {
        let notifier = BroadcastNotifier::new(4);
        let mut rx = notifier.subscribe();

        let mut doc = TopologyDocument::default();
        doc.hosts.push(Host::new(Ipv4Addr::new(10, 0, 0, 1), "sw1"));
        notifier.publish(Arc::new(doc.clone()));

        let received = rx.recv().await.unwrap();
        assert_eq!(*received, doc);
    }
}
