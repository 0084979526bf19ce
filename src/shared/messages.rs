//! Messages redispatched from pipeline threads to the UI thread

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::trace;

use crate::vision::DetectionUpdate;

/// Messages sent from the pipeline to the UI thread
#[derive(Debug, Clone)]
pub enum PipelineToUi {
    /// A detection result ready to be drawn
    Detections(DetectionUpdate),
}

/// Wakes the UI thread after a message was queued
pub type UiWaker = Arc<dyn Fn() + Send + Sync>;

/// Sending half of the UI channel, cloneable into any pipeline thread
#[derive(Clone)]
pub struct UiDispatcher {
    sender: Sender<PipelineToUi>,
    waker: Arc<RwLock<Option<UiWaker>>>,
}

impl UiDispatcher {
    /// Create a dispatcher and the receiver the UI thread drains
    pub fn new() -> (Self, Receiver<PipelineToUi>) {
        let (sender, receiver) = unbounded();
        (
            Self {
                sender,
                waker: Arc::new(RwLock::new(None)),
            },
            receiver,
        )
    }

    /// Install the waker once the UI exists
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.waker.write() = Some(Arc::new(waker));
    }

    /// Queue a message and wake the UI. Returns false once the UI is gone.
    pub fn send(&self, message: PipelineToUi) -> bool {
        if self.sender.send(message).is_err() {
            trace!("UI channel closed, dropping message");
            return false;
        }
        self.wake();
        true
    }

    pub fn wake(&self) {
        if let Some(waker) = self.waker.read().as_ref() {
            waker();
        }
    }
}

/// Drain every queued message without blocking
pub fn drain(receiver: &Receiver<PipelineToUi>) -> Vec<PipelineToUi> {
    let mut messages = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(message) => messages.push(message),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::Generation;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn detections(generation: u64) -> PipelineToUi {
        PipelineToUi::Detections(DetectionUpdate {
            generation: Generation(generation),
            regions: Vec::new(),
            latency: Duration::ZERO,
        })
    }

    #[test]
    fn test_send_wakes_ui() {
        let (dispatcher, receiver) = UiDispatcher::new();
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = wakes.clone();
        dispatcher.set_waker(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(dispatcher.send(detections(1)));
        assert!(dispatcher.clone().send(detections(2)));

        assert_eq!(wakes.load(Ordering::SeqCst), 2);
        assert_eq!(drain(&receiver).len(), 2);
        assert!(drain(&receiver).is_empty());
    }

    #[test]
    fn test_send_without_waker_still_queues() {
        let (dispatcher, receiver) = UiDispatcher::new();
        assert!(dispatcher.send(detections(1)));
        assert!(matches!(
            receiver.try_recv(),
            Ok(PipelineToUi::Detections(update)) if update.generation == Generation(1)
        ));
    }

    #[test]
    fn test_send_after_ui_dropped() {
        let (dispatcher, receiver) = UiDispatcher::new();
        drop(receiver);
        assert!(!dispatcher.send(detections(1)));
    }
}
