use crossbeam_channel::{bounded, Receiver, Sender};

/// Wraps a value in flight on an inter-stage queue, or a shutdown
/// sentinel. Cancellation closes the producer side by sending `Shutdown`
/// so a draining consumer sees every already-queued item before it sees
/// the close, rather than racing a separate cancellation flag.
enum Message<T> {
    Item(T),
    Shutdown,
}

/// A bounded inter-stage queue (§4.3 Async mode). `send_blocking` blocks
/// the producer when full — the queue's backpressure contract; `try_send`
/// is the non-blocking alternative Capture's rate control uses to skip a
/// frame rather than wait.
pub struct BoundedQueue<T> {
    sender: Sender<Message<T>>,
    receiver: Receiver<Message<T>>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = bounded(capacity);
        Self { sender, receiver, capacity }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.sender.is_full()
    }

    /// Blocks until there is room. Returns `Err(item)` if the queue has
    /// already been closed.
    pub fn send_blocking(&self, item: T) -> Result<(), T> {
        match self.sender.send(Message::Item(item)) {
            Ok(()) => Ok(()),
            Err(err) => match err.into_inner() {
                Message::Item(v) => Err(v),
                Message::Shutdown => unreachable!("producer never sends Shutdown via send_blocking"),
            },
        }
    }

    /// Never blocks. Returns `false` if the queue was full, in which case
    /// the caller (Capture) should skip the item rather than wait,
    /// advancing its frame counter regardless (§5).
    pub fn try_send(&self, item: T) -> bool {
        matches!(self.sender.try_send(Message::Item(item)), Ok(()))
    }

    /// Signals no more items will be produced. Already-queued items are
    /// still delivered to the consumer before it observes the close.
    pub fn close(&self) {
        let _ = self.sender.send(Message::Shutdown);
    }

    /// Blocks for the next item. Returns `None` once the queue has been
    /// closed and fully drained.
    pub fn recv_blocking(&self) -> Option<T> {
        match self.receiver.recv() {
            Ok(Message::Item(v)) => Some(v),
            Ok(Message::Shutdown) | Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_recv_round_trips() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        q.send_blocking(7).unwrap();
        assert_eq!(q.recv_blocking(), Some(7));
    }

    #[test]
    fn close_drains_then_ends() {
        let q: BoundedQueue<i32> = BoundedQueue::new(4);
        q.send_blocking(1).unwrap();
        q.send_blocking(2).unwrap();
        q.close();
        assert_eq!(q.recv_blocking(), Some(1));
        assert_eq!(q.recv_blocking(), Some(2));
        assert_eq!(q.recv_blocking(), None);
    }

    #[test]
    fn try_send_fails_when_full() {
        let q: BoundedQueue<i32> = BoundedQueue::new(1);
        assert!(q.try_send(1));
        assert!(!q.try_send(2));
    }
}
