use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};

use crate::emotion::domain::emotion::Emotion;
use crate::emotion::domain::emotion_classifier::EmotionClassifier;
use crate::shared::frame::Frame;

type Reply = (u64, Result<Option<Emotion>, String>);

/// Decorator that bounds every classification by a deadline.
///
/// The wrapped classifier runs on its own thread. A call that cannot be
/// handed over (the thread is still busy with an earlier face) or that does
/// not answer within the deadline fails; late answers are discarded by
/// sequence number. The thread exits once this decorator is dropped and the
/// in-flight call, if any, returns.
pub struct DeadlineClassifier {
    request_tx: Sender<(u64, Frame)>,
    reply_rx: Receiver<Reply>,
    deadline: Duration,
    next_seq: u64,
}

impl DeadlineClassifier {
    pub fn new(inner: Box<dyn EmotionClassifier>, deadline: Duration) -> Self {
        let (request_tx, request_rx) = crossbeam_channel::bounded::<(u64, Frame)>(1);
        let (reply_tx, reply_rx) = crossbeam_channel::unbounded::<Reply>();
        spawn_classifier(inner, request_rx, reply_tx);
        Self {
            request_tx,
            reply_rx,
            deadline,
            next_seq: 0,
        }
    }
}

fn spawn_classifier(
    mut inner: Box<dyn EmotionClassifier>,
    request_rx: Receiver<(u64, Frame)>,
    reply_tx: Sender<Reply>,
) {
    std::thread::spawn(move || {
        for (seq, face) in request_rx {
            let result = match panic::catch_unwind(AssertUnwindSafe(|| inner.classify(&face))) {
                Ok(result) => result.map_err(|e| e.to_string()),
                Err(_) => Err("classifier panicked".to_string()),
            };
            if reply_tx.send((seq, result)).is_err() {
                break;
            }
        }
    });
}

impl EmotionClassifier for DeadlineClassifier {
    fn classify(&mut self, face: &Frame) -> Result<Option<Emotion>, Box<dyn std::error::Error>> {
        let seq = self.next_seq;
        self.next_seq += 1;

        match self.request_tx.try_send((seq, face.clone())) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => return Err("classifier busy".into()),
            Err(TrySendError::Disconnected(_)) => return Err("classifier thread exited".into()),
        }

        let expires = Instant::now() + self.deadline;
        loop {
            let remaining = expires.saturating_duration_since(Instant::now());
            match self.reply_rx.recv_timeout(remaining) {
                Ok((reply_seq, result)) if reply_seq == seq => {
                    return result.map_err(Into::into);
                }
                // Stale answer to a call that already timed out.
                Ok(_) => continue,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(format!("classification exceeded {:?}", self.deadline).into());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err("classifier thread exited".into());
                }
            }
        }
    }
}
