//! Multi-consumer work queue with completion tracking.
//!
//! Every `put` (task or shutdown marker) adds one unfinished item and every
//! `task_done` removes one; [`WorkQueue::join`] waits for the count to reach
//! zero. Consumers exit when they receive [`QueueItem::Shutdown`].

use tokio::sync::{mpsc, watch, Mutex};

#[derive(Debug, PartialEq, Eq)]
pub enum QueueItem<T> {
    Task(T),
    Shutdown,
}

pub struct WorkQueue<T> {
    sender: mpsc::UnboundedSender<QueueItem<T>>,
    receiver: Mutex<mpsc::UnboundedReceiver<QueueItem<T>>>,
    unfinished: watch::Sender<usize>,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let (unfinished, _) = watch::channel(0);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            unfinished,
        }
    }

    pub fn put(&self, task: T) {
        self.push(QueueItem::Task(task));
    }

    /// Enqueue one shutdown marker; one consumer exits per marker.
    pub fn put_shutdown(&self) {
        self.push(QueueItem::Shutdown);
    }

    fn push(&self, item: QueueItem<T>) {
        self.unfinished.send_modify(|n| *n += 1);
        if self.sender.send(item).is_err() {
            // Receiver lives in `self`, so this only happens mid-drop.
            self.unfinished.send_modify(|n| *n = n.saturating_sub(1));
        }
    }

    /// Take the next item, waiting if the queue is empty.
    pub async fn get(&self) -> QueueItem<T> {
        let mut receiver = self.receiver.lock().await;
        receiver.recv().await.unwrap_or(QueueItem::Shutdown)
    }

    /// Mark one previously taken item as processed.
    pub fn task_done(&self) {
        self.unfinished.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }

    /// Wait until every enqueued item has been marked done.
    pub async fn join(&self) {
        let mut rx = self.unfinished.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn join_on_empty_queue_returns() {
        let queue: WorkQueue<u32> = WorkQueue::new();
        tokio::time::timeout(Duration::from_millis(100), queue.join())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn fifo_and_counting() {
        let queue = WorkQueue::new();
        queue.put(1);
        queue.put(2);
        queue.put_shutdown();
        assert_eq!(queue.unfinished(), 3);

        assert_eq!(queue.get().await, QueueItem::Task(1));
        assert_eq!(queue.get().await, QueueItem::Task(2));
        assert_eq!(queue.get().await, QueueItem::Shutdown);
        queue.task_done();
        queue.task_done();
        assert_eq!(queue.unfinished(), 1);
        queue.task_done();
        queue.join().await;
    }

    #[tokio::test]
    async fn consumers_drain_then_exit_on_markers() {
        let queue = Arc::new(WorkQueue::new());
        for id in 1..=20u32 {
            queue.put(id);
        }

        let mut consumers = tokio::task::JoinSet::new();
        for _ in 0..3 {
            let queue = Arc::clone(&queue);
            consumers.spawn(async move {
                let mut seen = Vec::new();
                loop {
                    match queue.get().await {
                        QueueItem::Shutdown => {
                            queue.task_done();
                            break;
                        }
                        QueueItem::Task(id) => {
                            tokio::task::yield_now().await;
                            seen.push(id);
                            queue.task_done();
                        }
                    }
                }
                seen
            });
        }

        queue.join().await;
        for _ in 0..3 {
            queue.put_shutdown();
        }

        let mut all = Vec::new();
        while let Some(seen) = consumers.join_next().await {
            all.extend(seen.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (1..=20).collect::<Vec<_>>());
        assert_eq!(queue.unfinished(), 0);
    }
}
