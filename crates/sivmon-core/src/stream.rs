// ── Reactive entity streams ──
//
// Subscription handles over a published collection: point-in-time
// access plus change notification.

use std::sync::Arc;

use tokio::sync::watch;

/// A subscription to a collection of entities.
pub struct EntityStream<T: Send + Sync + 'static> {
    current: Arc<Vec<Arc<T>>>,
    receiver: watch::Receiver<Arc<Vec<Arc<T>>>>,
}

impl<T: Send + Sync + 'static> EntityStream<T> {
    pub(crate) fn new(mut receiver: watch::Receiver<Arc<Vec<Arc<T>>>>) -> Self {
        let current = receiver.borrow_and_update().clone();
        Self { current, receiver }
    }

    /// The snapshot captured at creation (or at the last `changed()`).
    pub fn current(&self) -> &Arc<Vec<Arc<T>>> {
        &self.current
    }

    /// The latest snapshot, which may be newer than `current()`.
    pub fn latest(&self) -> Arc<Vec<Arc<T>>> {
        self.receiver.borrow().clone()
    }

    /// Wait for the next change. `None` once the publisher is gone.
    pub async fn changed(&mut self) -> Option<Arc<Vec<Arc<T>>>> {
        self.receiver.changed().await.ok()?;
        let snap = self.receiver.borrow_and_update().clone();
        self.current = snap.clone();
        Some(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn changed_tracks_publisher() {
        let (tx, rx) = watch::channel(Arc::new(vec![Arc::new(1_u32)]));
        let mut stream = EntityStream::new(rx);
        assert_eq!(stream.current().len(), 1);

        tx.send_modify(|v| *v = Arc::new(vec![Arc::new(1), Arc::new(2)]));
        let snap = stream.changed().await;
        assert_eq!(snap.map(|s| s.len()), Some(2));
        assert_eq!(stream.current().len(), 2);

        drop(tx);
        assert!(stream.changed().await.is_none());
    }
}
