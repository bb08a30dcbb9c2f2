use std::sync::Arc;
use std::time::Duration;

use crate::pipeline::snapshot::SnapshotCell;
use crate::pipeline::worker::WorkerHealth;
use crate::shared::cancellation::CancellationToken;
use crate::streaming::multipart::encode_chunk;

/// Lazy sequence of encoded stream chunks for one session.
///
/// Polls the latest snapshot every `interval` and yields a chunk whenever a
/// newer annotated frame has been published. Ends, for good, once the
/// session is stopped or one of its workers has died.
pub struct FrameStream {
    snapshots: Arc<SnapshotCell>,
    token: CancellationToken,
    workers: Vec<WorkerHealth>,
    interval: Duration,
    quality: u8,
    last_cycle: u64,
    finished: bool,
}

impl FrameStream {
    pub fn new(
        snapshots: Arc<SnapshotCell>,
        token: CancellationToken,
        workers: Vec<WorkerHealth>,
        interval: Duration,
        quality: u8,
    ) -> Self {
        Self {
            snapshots,
            token,
            workers,
            interval,
            quality,
            last_cycle: 0,
            finished: false,
        }
    }

    fn should_end(&self) -> bool {
        self.token.is_cancelled() || self.workers.iter().any(WorkerHealth::is_dead)
    }
}

impl Iterator for FrameStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        while !self.finished {
            if self.should_end() {
                self.finished = true;
                break;
            }

            let snapshot = self.snapshots.load();
            if snapshot.cycle > self.last_cycle {
                if let Some(frame) = &snapshot.frame {
                    self.last_cycle = snapshot.cycle;
                    match encode_chunk(frame, self.quality) {
                        Ok(chunk) => return Some(chunk),
                        Err(e) => log::warn!("Dropping stream frame {}: {e}", snapshot.cycle),
                    }
                    continue;
                }
            }
            self.token.wait(self.interval);
        }
        None
    }
}

impl std::iter::FusedIterator for FrameStream {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::snapshot::PipelineSnapshot;
    use crate::pipeline::worker::spawn_worker;
    use crate::shared::frame::Frame;
    use std::thread;
    use std::time::Instant;

    fn publish(cell: &SnapshotCell, cycle: u64) {
        cell.publish(
            cell.epoch(),
            PipelineSnapshot {
                cycle,
                frame: Some(Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, 3, cycle as usize)),
                ..PipelineSnapshot::default()
            },
        );
    }

    fn stream(cell: &Arc<SnapshotCell>, token: &CancellationToken) -> FrameStream {
        FrameStream::new(
            cell.clone(),
            token.clone(),
            Vec::new(),
            Duration::from_millis(5),
            80,
        )
    }

    #[test]
    fn test_yields_each_new_frame_once() {
        let cell = Arc::new(SnapshotCell::new());
        let token = CancellationToken::new();
        let mut frames = stream(&cell, &token);

        publish(&cell, 1);
        assert!(frames.next().unwrap().starts_with(b"--frame\r\n"));

        let publisher = {
            let cell = cell.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                publish(&cell, 2);
            })
        };
        let start = Instant::now();
        assert!(frames.next().is_some());
        assert!(start.elapsed() >= Duration::from_millis(20));
        publisher.join().unwrap();
    }

    #[test]
    fn test_waits_until_first_frame() {
        let cell = Arc::new(SnapshotCell::new());
        let token = CancellationToken::new();
        let mut frames = stream(&cell, &token);

        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                token.cancel();
            })
        };
        assert!(frames.next().is_none());
        canceller.join().unwrap();
    }

    #[test]
    fn test_ends_after_cancel_and_stays_ended() {
        let cell = Arc::new(SnapshotCell::new());
        let token = CancellationToken::new();
        let mut frames = stream(&cell, &token);
        publish(&cell, 1);

        token.cancel();
        assert!(frames.next().is_none());
        publish(&cell, 2);
        assert!(frames.next().is_none());
    }

    #[test]
    fn test_ends_when_a_worker_died() {
        let cell = Arc::new(SnapshotCell::new());
        publish(&cell, 1);
        let dead = spawn_worker("doomed", (), |_| panic!("gone"));
        let health = dead.health();
        dead.finish(Duration::from_secs(2)).unwrap();

        let mut frames = FrameStream::new(
            cell,
            CancellationToken::new(),
            vec![health],
            Duration::from_millis(5),
            80,
        );
        assert!(frames.next().is_none());
    }
}
