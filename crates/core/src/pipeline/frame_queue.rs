/// Bounded single-producer/single-consumer frame hand-off between the
/// capture and processing workers.
///
/// The producer never blocks: offering a frame to a full queue drops that
/// frame. The consumer waits at most `timeout` for the next frame so it can
/// keep checking for cancellation.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::shared::frame::Frame;

pub fn frame_queue(capacity: usize) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
    let stats = QueueStats::default();
    (
        FrameSender {
            tx,
            stats: stats.clone(),
        },
        FrameReceiver { rx, stats },
    )
}

/// Running enqueue/drop counters, shared by both ends and the controller.
#[derive(Clone, Debug, Default)]
pub struct QueueStats {
    enqueued: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
}

impl QueueStats {
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct FrameSender {
    tx: Sender<Frame>,
    stats: QueueStats,
}

impl FrameSender {
    /// Enqueues `frame` if there is room. Returns `false` when the frame was
    /// dropped because the queue is full or the consumer is gone.
    pub fn offer(&self, frame: Frame) -> bool {
        match self.tx.try_send(frame) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.clone()
    }
}

#[derive(Debug)]
pub enum Poll {
    Frame(Frame),
    /// Nothing arrived within the timeout.
    Empty,
    /// The producer is gone and the queue is drained.
    Closed,
}

pub struct FrameReceiver {
    rx: Receiver<Frame>,
    stats: QueueStats,
}

impl FrameReceiver {
    pub fn poll(&self, timeout: Duration) -> Poll {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Poll::Frame(frame),
            Err(RecvTimeoutError::Timeout) => Poll::Empty,
            Err(RecvTimeoutError::Disconnected) => Poll::Closed,
        }
    }

    /// Frames currently waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.rx.capacity().unwrap_or(0)
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame(index: usize) -> Frame {
        Frame::new(vec![0u8; 3], 1, 1, 3, index)
    }

    #[test]
    fn test_excess_frames_are_dropped_without_blocking() {
        let (tx, rx) = frame_queue(3);
        let start = Instant::now();
        let accepted: Vec<bool> = (0..5).map(|i| tx.offer(frame(i))).collect();

        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(accepted, vec![true, true, true, false, false]);
        assert_eq!(rx.len(), 3);
        assert_eq!(tx.stats().enqueued(), 3);
        assert_eq!(tx.stats().dropped(), 2);
    }

    #[test]
    fn test_oldest_frames_survive_overflow() {
        let (tx, rx) = frame_queue(2);
        for i in 0..4 {
            tx.offer(frame(i));
        }
        let indices: Vec<usize> = (0..2)
            .map(|_| match rx.poll(Duration::from_millis(10)) {
                Poll::Frame(f) => f.index(),
                other => panic!("expected frame, got {other:?}"),
            })
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_poll_times_out_when_empty() {
        let (_tx, rx) = frame_queue(3);
        let start = Instant::now();
        assert!(matches!(rx.poll(Duration::from_millis(10)), Poll::Empty));
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_poll_reports_closed_after_drain() {
        let (tx, rx) = frame_queue(3);
        tx.offer(frame(0));
        drop(tx);
        assert!(matches!(rx.poll(Duration::from_millis(10)), Poll::Frame(_)));
        assert!(matches!(rx.poll(Duration::from_millis(10)), Poll::Closed));
    }

    #[test]
    fn test_offer_after_consumer_gone_is_not_counted_as_drop() {
        let (tx, rx) = frame_queue(3);
        drop(rx);
        assert!(!tx.offer(frame(0)));
        assert_eq!(tx.stats().dropped(), 0);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let (tx, rx) = frame_queue(0);
        assert_eq!(rx.capacity(), 1);
        assert!(tx.offer(frame(0)));
    }
}
