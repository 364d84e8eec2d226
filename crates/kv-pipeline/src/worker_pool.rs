//! Drives a [`VisibilityScheduler`] from a small pool of OS threads.
//!
//! Each worker loops: reserve the next eligible item, run the caller's
//! build-and-commit closure against it, report the outcome back to the
//! scheduler. Workers idle briefly when nothing is eligible rather than
//! busy-spinning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use kv_core::VisibilityEvent;

use crate::scheduler::{SchedulerError, VisibilityScheduler};

const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct WorkerPool {
    stop: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `worker_count` threads driving `scheduler`, each invoking
    /// `build_and_commit` for every reserved item.
    ///
    /// Each reservation's build runs on its own detached thread so the
    /// worker loop can bound how long it waits on `recv_timeout`. A build
    /// that outruns `scheduler.processing_timeout_ms()` is completed as
    /// `SchedulerError::VisibilityTimeout` and the overrun thread is left to
    /// finish (or never finish) on its own; its eventual result is dropped.
    pub fn spawn<F>(scheduler: Arc<VisibilityScheduler>, worker_count: usize, build_and_commit: F) -> Self
    where
        F: Fn(&VisibilityEvent) -> Result<(), SchedulerError> + Send + Sync + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let build_and_commit = Arc::new(build_and_commit);
        let mut handles = Vec::with_capacity(worker_count);

        for _ in 0..worker_count {
            let scheduler = Arc::clone(&scheduler);
            let stop = Arc::clone(&stop);
            let build_and_commit = Arc::clone(&build_and_commit);
            handles.push(thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    match scheduler.reserve_next(Utc::now()) {
                        Some(reservation) => {
                            let timeout = Duration::from_millis(scheduler.processing_timeout_ms());
                            let (tx, rx) = mpsc::channel();
                            let event = reservation.event().clone();
                            let build_and_commit = Arc::clone(&build_and_commit);
                            thread::spawn(move || {
                                let result = build_and_commit(&event);
                                let _ = tx.send(result);
                            });

                            let result = match rx.recv_timeout(timeout) {
                                Ok(result) => result,
                                Err(mpsc::RecvTimeoutError::Timeout) => {
                                    Err(SchedulerError::VisibilityTimeout {
                                        version_id: reservation.event().version_id.clone(),
                                    })
                                }
                                Err(mpsc::RecvTimeoutError::Disconnected) => {
                                    Err(SchedulerError::BuildStageFailed("build thread panicked".into()))
                                }
                            };
                            scheduler.complete(reservation, result);
                        }
                        None => thread::sleep(IDLE_POLL_INTERVAL),
                    }
                }
            }));
        }

        Self { stop, handles }
    }

    /// Signal all workers to stop after their current item, then drain the
    /// scheduler's remaining queued work as failed.
    pub fn shutdown(self, scheduler: &VisibilityScheduler) {
        self.stop.store(true, Ordering::Relaxed);
        for handle in self.handles {
            let _ = handle.join();
        }
        scheduler.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulerConfig;
    use kv_core::VisibilityOp;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    #[test]
    fn worker_pool_processes_submitted_items() {
        let scheduler = Arc::new(VisibilityScheduler::new(SchedulerConfig::default()));
        scheduler.submit(VisibilityEvent::new("ver_1", "note_1", VisibilityOp::Publish, vec!["col_1".into()]));

        let processed = Arc::new(AtomicUsize::new(0));
        let processed_clone = Arc::clone(&processed);
        let pool = WorkerPool::spawn(Arc::clone(&scheduler), 2, move |_event| {
            processed_clone.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        thread::sleep(StdDuration::from_millis(100));
        pool.shutdown(&scheduler);

        assert_eq!(processed.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.status("ver_1"), Some(crate::stage::OperationStage::Committed));
    }
}
