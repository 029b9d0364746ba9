//! Integration tests for the local FIFO work queue.
//!
//! Covers enqueue order with one and many producers, the single in-flight
//! task guarantee, failure isolation, ring capacity, and worker restart.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use jobtrack::local::{LocalSnapshot, LocalStatus, LocalWorkQueue, WorkQueue};
use jobtrack::{JobError, JobTrackConfig};

/// Waits until `n` tasks have completed (finished or failed).
async fn wait_for_completed(queue: &LocalWorkQueue, n: usize) -> LocalSnapshot {
    for _ in 0..2000 {
        let snap = queue.get_queue_snapshot();
        if snap.counts.finished + snap.counts.failed >= n {
            return snap;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("queue never completed {n} tasks");
}

/// Enqueues a body that appends `label` to `log`.
fn push_label(queue: &LocalWorkQueue, log: &Arc<Mutex<Vec<String>>>, label: String) -> String {
    let log = Arc::clone(log);
    let name = label.clone();
    queue
        .enqueue_task(Some(&name), move || async move {
            log.lock().push(label);
            Ok(())
        })
        .unwrap()
}

mod ordering_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_single_producer_runs_in_enqueue_order() {
        let queue = LocalWorkQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let worker = queue.start().unwrap();

        let ids: Vec<String> = (0..20)
            .map(|i| push_label(&queue, &log, format!("job-{i}")))
            .collect();

        let snap = wait_for_completed(&queue, 20).await;
        let expected: Vec<String> = (0..20).map(|i| format!("job-{i}")).collect();
        assert_eq!(*log.lock(), expected);

        let completed: Vec<String> = snap.finished_recent.iter().map(|t| t.id.clone()).collect();
        assert_eq!(completed, ids);
        worker.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_producers_preserve_per_producer_order() {
        let queue = LocalWorkQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let worker = queue.start().unwrap();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let queue = queue.clone();
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    for i in 0..10 {
                        push_label(&queue, &log, format!("{p}:{i}"));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        wait_for_completed(&queue, 40).await;
        let log = log.lock().clone();
        assert_eq!(log.len(), 40);
        for p in 0..4 {
            let seen: Vec<&String> = log.iter().filter(|l| l.starts_with(&format!("{p}:"))).collect();
            let expected: Vec<String> = (0..10).map(|i| format!("{p}:{i}")).collect();
            assert_eq!(seen, expected.iter().collect::<Vec<_>>());
        }
        worker.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_producers_run_in_pending_order() {
        let queue = LocalWorkQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        let producers: Vec<_> = (0..8)
            .map(|p| {
                let queue = queue.clone();
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    for i in 0..25 {
                        push_label(&queue, &log, format!("{p}:{i}"));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.await.unwrap();
        }

        let queued: Vec<String> = queue
            .get_queue_snapshot()
            .pending
            .iter()
            .map(|t| t.label().to_string())
            .collect();
        assert_eq!(queued.len(), 200);

        let worker = queue.start().unwrap();
        let snap = wait_for_completed(&queue, 200).await;
        assert_eq!(*log.lock(), queued);

        let completed: Vec<String> = snap
            .finished_recent
            .iter()
            .map(|t| t.label().to_string())
            .collect();
        assert_eq!(completed, queued[180..].to_vec());
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_tasks_are_pending_before_worker_starts() {
        let queue = LocalWorkQueue::new();
        let id = queue.enqueue_task(None, || async { Ok(()) }).unwrap();

        let snap = queue.get_queue_snapshot();
        assert_eq!(snap.counts.pending, 1);
        assert_eq!(snap.pending[0].id, id);
        assert_eq!(snap.pending[0].status, LocalStatus::Pending);
    }
}

mod execution_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_at_most_one_task_in_flight() {
        let queue = LocalWorkQueue::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let worker = queue.start().unwrap();

        for _ in 0..15 {
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            let probe = queue.clone();
            queue
                .enqueue_task(None, move || async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    assert!(probe.get_queue_snapshot().counts.running <= 1);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .unwrap();
        }

        let snap = wait_for_completed(&queue, 15).await;
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(snap.counts.failed, 0);
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_recorded_and_loop_continues() {
        let queue = LocalWorkQueue::new();
        let worker = queue.start().unwrap();

        let bad = queue
            .enqueue_task(Some("bad"), || async {
                Err(anyhow::anyhow!("sample rate mismatch"))
            })
            .unwrap();
        let panicky = queue
            .enqueue_blocking(Some("panicky"), || panic!("corrupt archive"))
            .unwrap();
        let good = queue.enqueue_task(Some("good"), || async { Ok(()) }).unwrap();

        let snap = wait_for_completed(&queue, 3).await;
        assert_eq!(snap.counts.failed, 2);
        assert_eq!(snap.counts.finished, 1);

        let bad = queue.task(&bad).unwrap();
        assert_eq!(bad.status, LocalStatus::Failed);
        assert_eq!(bad.error.as_deref(), Some("sample rate mismatch"));

        let panicky = queue.task(&panicky).unwrap();
        assert_eq!(panicky.status, LocalStatus::Failed);
        assert!(panicky.error.unwrap().contains("corrupt archive"));

        assert_eq!(queue.task(&good).unwrap().status, LocalStatus::Finished);
        assert!(worker.is_running());
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_finished_ring_is_capped() {
        let queue = LocalWorkQueue::new();
        let worker = queue.start().unwrap();

        let ids: Vec<String> = (0..250)
            .map(|_| queue.enqueue_task(None, || async { Ok(()) }).unwrap())
            .collect();

        for _ in 0..2000 {
            if queue.task(&ids[249]).map(|t| t.status) == Some(LocalStatus::Finished) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let snap = queue.get_queue_snapshot();
        assert_eq!(snap.counts.finished, 200);
        assert_eq!(snap.finished_recent.len(), 20);
        assert_eq!(snap.finished_recent.last().unwrap().id, ids[249]);
        assert!(queue.task(&ids[0]).is_none());
        assert!(queue.task(&ids[50]).is_some());
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_config_sizes_the_ring() {
        let config = JobTrackConfig {
            finished_capacity: 5,
            finished_recent: 2,
            ..JobTrackConfig::default()
        };
        let queue = LocalWorkQueue::with_config(&config);
        let worker = queue.start().unwrap();
        for _ in 0..8 {
            queue.enqueue_task(None, || async { Ok(()) }).unwrap();
        }

        let snap = wait_for_completed(&queue, 5).await;
        assert!(snap.counts.finished <= 5);
        assert!(snap.finished_recent.len() <= 2);
        worker.shutdown().await.unwrap();
    }
}

mod lifecycle_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_start_twice_fails() {
        let queue = LocalWorkQueue::new();
        let worker = queue.start().unwrap();
        assert!(matches!(queue.start(), Err(JobError::AlreadyStarted)));
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_restart_runs_tasks_queued_while_stopped() {
        let queue = LocalWorkQueue::new();
        let worker = queue.start().unwrap();
        queue.enqueue_task(None, || async { Ok(()) }).unwrap();
        wait_for_completed(&queue, 1).await;
        worker.shutdown().await.unwrap();

        let id = queue.enqueue_task(None, || async { Ok(()) }).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.task(&id).unwrap().status, LocalStatus::Pending);

        let worker = queue.start().unwrap();
        wait_for_completed(&queue, 2).await;
        assert_eq!(queue.task(&id).unwrap().status, LocalStatus::Finished);
        worker.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight_task() {
        let queue = LocalWorkQueue::new();
        let worker = queue.start().unwrap();
        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let id = queue
            .enqueue_task(None, move || async move {
                let _ = started_tx.send(());
                tokio::time::sleep(Duration::from_millis(30)).await;
                Ok(())
            })
            .unwrap();

        started_rx.await.unwrap();
        worker.shutdown().await.unwrap();
        assert_eq!(queue.task(&id).unwrap().status, LocalStatus::Finished);
    }

    #[tokio::test]
    async fn test_queue_is_usable_through_trait_object() {
        let queue: Arc<dyn WorkQueue> = Arc::new(LocalWorkQueue::new());
        let id = queue
            .enqueue(
                Some("boxed"),
                Box::new(|| -> BoxFuture<'static, anyhow::Result<()>> { Box::pin(async { Ok(()) }) }),
            )
            .unwrap();
        assert_eq!(queue.task(&id).unwrap().label(), "boxed");
        assert_eq!(queue.snapshot().counts.pending, 1);
    }
}
