/// Integration tests for the worker pool against the in-memory queue
use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use task_queue::{
    EnqueueOptions, InMemoryTaskQueue, TaskEnvelope, TaskError, TaskHandler, TaskProducer,
    Worker, WorkerConfig,
};
use tokio::sync::watch;

fn fast_config(concurrency: usize) -> WorkerConfig {
    WorkerConfig {
        concurrency,
        max_retry: 10,
        task_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(20),
        forward_interval: Duration::from_millis(10),
        base_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
        ..Default::default()
    }
}

fn options(max_retry: u32) -> EnqueueOptions {
    EnqueueOptions {
        max_retry,
        timeout: Duration::from_secs(5),
    }
}

/// Counts calls; fails the first `fail_first` of them.
struct FlakyHandler {
    calls: AtomicU32,
    fail_first: u32,
}

impl FlakyHandler {
    fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            fail_first,
        })
    }
}

#[async_trait]
impl TaskHandler for FlakyHandler {
    async fn handle(&self, _envelope: &TaskEnvelope) -> Result<(), TaskError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.fail_first {
            Err(TaskError::Failed(format!("attempt {n} failed")))
        } else {
            Ok(())
        }
    }
}

struct SlowHandler {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    finished: AtomicUsize,
}

impl SlowHandler {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TaskHandler for SlowHandler {
    async fn handle(&self, _envelope: &TaskEnvelope) -> Result<(), TaskError> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within 2s");
}

#[tokio::test]
async fn test_worker_completes_task() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let handler = FlakyHandler::new(0);
    queue
        .enqueue(TaskEnvelope::new("job", "{}", &options(3)))
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(fast_config(2), queue.clone()).handle("job", handler.clone());
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| queue.completed().len() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert!(queue.archived().is_empty());
}

#[tokio::test]
async fn test_worker_retries_then_succeeds() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let handler = FlakyHandler::new(2);
    queue
        .enqueue(TaskEnvelope::new("job", "{}", &options(3)))
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(fast_config(1), queue.clone()).handle("job", handler.clone());
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| queue.completed().len() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    assert_eq!(queue.completed()[0].retried, 2);
}

#[tokio::test]
async fn test_worker_archives_after_max_retry() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let handler = FlakyHandler::new(u32::MAX);
    queue
        .enqueue(TaskEnvelope::new("job", "{}", &options(2)))
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(fast_config(1), queue.clone()).handle("job", handler.clone());
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| queue.archived().len() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    // First attempt plus two redeliveries
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    let (envelope, error) = &queue.archived()[0];
    assert_eq!(envelope.retried, 2);
    assert!(error.contains("attempt 2 failed"));
    assert!(queue.completed().is_empty());
}

#[tokio::test]
async fn test_worker_config_caps_envelope_retries() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let handler = FlakyHandler::new(u32::MAX);
    queue
        .enqueue(TaskEnvelope::new("job", "{}", &options(50)))
        .await
        .unwrap();

    let config = WorkerConfig {
        max_retry: 1,
        ..fast_config(1)
    };
    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(config, queue.clone()).handle("job", handler.clone());
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| queue.archived().len() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_worker_times_out_slow_task() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let handler = SlowHandler::new(Duration::from_secs(10));
    queue
        .enqueue(TaskEnvelope::new("job", "{}", &options(1)))
        .await
        .unwrap();

    let config = WorkerConfig {
        max_retry: 0,
        task_timeout: Duration::from_millis(50),
        ..fast_config(1)
    };
    // max_retry 0 is normalized to the default; the envelope's budget of 1 wins
    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(config, queue.clone()).handle("job", handler.clone());
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| queue.archived().len() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    let (_, error) = &queue.archived()[0];
    assert!(error.contains("timed out"));
    assert_eq!(handler.finished.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unknown_kind_is_archived() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    queue
        .enqueue(TaskEnvelope::new("mystery", "{}", &options(0)))
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(fast_config(1), queue.clone()).handle("job", FlakyHandler::new(0));
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| queue.archived().len() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    let (_, error) = &queue.archived()[0];
    assert!(error.contains("mystery"));
}

#[tokio::test]
async fn test_concurrency_is_bounded() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let handler = SlowHandler::new(Duration::from_millis(50));
    for _ in 0..9 {
        queue
            .enqueue(TaskEnvelope::new("job", "{}", &options(0)))
            .await
            .unwrap();
    }

    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(fast_config(3), queue.clone()).handle("job", handler.clone());
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| queue.completed().len() == 9).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    assert!(handler.peak.load(Ordering::SeqCst) <= 3);
    assert!(handler.peak.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_tasks() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let handler = SlowHandler::new(Duration::from_millis(200));
    queue
        .enqueue(TaskEnvelope::new("job", "{}", &options(0)))
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(fast_config(1), queue.clone()).handle("job", handler.clone());
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| handler.running.load(Ordering::SeqCst) == 1).await;
    tx.send(true).unwrap();

    // Tasks enqueued after the signal are left for the next worker
    queue
        .enqueue(TaskEnvelope::new("job", "{}", &options(0)))
        .await
        .unwrap();

    run.await.unwrap().unwrap();

    assert_eq!(handler.finished.load(Ordering::SeqCst), 1);
    assert_eq!(queue.completed().len(), 1);
    assert_eq!(queue.pending().len(), 1);
}

#[tokio::test]
async fn test_dropped_shutdown_sender_stops_worker() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(fast_config(2), queue.clone()).handle("job", FlakyHandler::new(0));
    let run = tokio::spawn(worker.run(rx));

    drop(tx);
    tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .expect("worker should stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_start_recovers_orphaned_tasks() {
    use task_queue::TaskBroker;

    let queue = Arc::new(InMemoryTaskQueue::new());
    queue
        .enqueue(TaskEnvelope::new("job", "{}", &options(0)))
        .await
        .unwrap();
    // Simulate a crashed worker that took the task but never acknowledged it
    queue.dequeue(99, Duration::from_millis(10)).await.unwrap();
    assert_eq!(queue.in_flight_len(), 1);

    let handler = FlakyHandler::new(0);
    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(fast_config(1), queue.clone()).handle("job", handler.clone());
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| queue.completed().len() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

/// Rejects every task; counts calls.
struct RejectingHandler {
    calls: AtomicU32,
}

#[async_trait]
impl TaskHandler for RejectingHandler {
    async fn handle(&self, _envelope: &TaskEnvelope) -> Result<(), TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(TaskError::Rejected("width must be greater than 0".into()))
    }
}

#[tokio::test]
async fn test_rejected_task_is_archived_without_retry() {
    let queue = Arc::new(InMemoryTaskQueue::new());
    let handler = Arc::new(RejectingHandler {
        calls: AtomicU32::new(0),
    });
    queue
        .enqueue(TaskEnvelope::new("job", "{}", &options(3)))
        .await
        .unwrap();

    let (tx, rx) = watch::channel(false);
    let worker = Worker::new(fast_config(1), queue.clone()).handle("job", handler.clone());
    let run = tokio::spawn(worker.run(rx));

    wait_until(|| queue.archived().len() == 1).await;
    tx.send(true).unwrap();
    run.await.unwrap().unwrap();

    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    let (envelope, error) = &queue.archived()[0];
    assert_eq!(envelope.retried, 0);
    assert!(error.contains("width must be greater than 0"));
    assert_eq!(queue.scheduled_len(), 0);
}
