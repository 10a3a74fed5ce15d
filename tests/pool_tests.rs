mod common;

use common::{pool_with, Behaviour, TestHost};
use shakespeare::config::WorkerLostPolicy;
use shakespeare::error::EvolveError;
use shakespeare::genome::{Genome, Target};
use shakespeare::pool::{PoolOptions, SlotState};
use shakespeare::protocol::{Job, Reply};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn spawn_job() -> Job {
    let target = Target::new("AB");
    let parents = vec![
        Genome::from_text("AB", &target).unwrap(),
        Genome::from_text("BA", &target).unwrap(),
    ];
    Job::spawn(&parents, &target)
}

fn options(timeout_ms: Option<u64>, policy: WorkerLostPolicy, max_respawns: usize) -> PoolOptions {
    PoolOptions {
        dispatch_timeout: timeout_ms.map(Duration::from_millis),
        on_worker_lost: policy,
        max_respawns,
    }
}

#[tokio::test]
async fn test_occupancy_never_exceeds_pool_size() {
    let host = TestHost::new(Behaviour::Normal, Duration::from_millis(10));
    let (pool, stats) = pool_with(host, PoolOptions::default());
    pool.spawn(3).unwrap();

    pool.queue_many(&spawn_job(), 20).unwrap();
    let replies = pool.run_queue().await.unwrap();

    assert_eq!(replies.len(), 20);
    assert!(replies.iter().all(|r| matches!(r, Reply::Children { .. })));
    assert!(stats.peak() <= 3, "peak worker activity {}", stats.peak());
    assert!(pool.peak_in_flight() <= 3);
    assert!(pool.peak_in_flight() >= 1);
    assert!(!stats.overlapped.load(Ordering::SeqCst), "a worker held two jobs");
    assert_eq!(pool.in_flight(), 0);
    assert_eq!(pool.slot_states(), vec![SlotState::Idle; 3]);
    assert_eq!(pool.queued(), 0);
}

#[tokio::test]
async fn test_second_run_queue_is_refused() {
    let host = TestHost::new(Behaviour::Normal, Duration::from_millis(40));
    let (pool, _stats) = pool_with(host, PoolOptions::default());
    pool.spawn(2).unwrap();
    pool.queue_many(&spawn_job(), 6).unwrap();

    let first = tokio::spawn({
        let pool = pool.clone();
        async move { pool.run_queue().await }
    });
    while !pool.is_running() {
        tokio::task::yield_now().await;
    }

    let refused = pool.run_queue().await;
    assert!(matches!(refused, Err(EvolveError::PoolBusy)));

    let replies = first.await.unwrap().unwrap();
    assert_eq!(replies.len(), 6, "refusal must not disturb the running drain");
    assert!(!pool.is_running());

    // The flag resets, so the pool is usable again.
    pool.queue(&spawn_job()).unwrap();
    assert_eq!(pool.run_queue().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_terminate_twice_leaves_pool_empty() {
    let host = TestHost::new(Behaviour::Normal, Duration::ZERO);
    let (pool, _stats) = pool_with(host, PoolOptions::default());
    pool.spawn(3).unwrap();

    pool.terminate();
    assert_eq!(pool.live_workers(), 0);
    pool.terminate();
    assert_eq!(pool.live_workers(), 0);
    assert!(pool.slot_states().is_empty());

    let err = pool.dispatch(&spawn_job()).await.unwrap_err();
    assert!(matches!(err, EvolveError::PoolTerminated));

    pool.queue(&spawn_job()).unwrap();
    assert!(matches!(pool.run_queue().await, Err(EvolveError::PoolTerminated)));
}

#[tokio::test]
async fn test_invalid_job_keeps_worker_alive() {
    let host = TestHost::new(Behaviour::Normal, Duration::ZERO);
    let (pool, _stats) = pool_with(host, PoolOptions::default());
    pool.spawn(1).unwrap();

    let reply = pool.dispatch_raw(r#"{"method":"juggle"}"#).await.unwrap();
    assert_eq!(reply, Reply::invalid_job());
    assert_eq!(pool.idle_workers(), 1);

    let reply = pool.dispatch(&spawn_job()).await.unwrap();
    assert!(matches!(reply, Reply::Children { ref children } if children.len() == 2));
}

#[tokio::test]
async fn test_silent_worker_times_out_as_lost() {
    let host = TestHost::new(Behaviour::Silent, Duration::ZERO);
    let (pool, _stats) = pool_with(host, options(Some(50), WorkerLostPolicy::Abort, 0));
    pool.spawn(1).unwrap();

    let err = pool.dispatch(&spawn_job()).await.unwrap_err();
    assert!(matches!(err, EvolveError::WorkerLost { worker: 0, .. }));
    assert_eq!(pool.live_workers(), 0);
    assert_eq!(pool.in_flight(), 0);
}

#[tokio::test]
async fn test_lost_worker_is_respawned_and_job_retried() {
    let host = TestHost::new(Behaviour::DieFirst(1), Duration::ZERO);
    let (pool, stats) = pool_with(host, options(None, WorkerLostPolicy::Respawn, 1));
    pool.spawn(1).unwrap();

    let reply = pool.dispatch(&spawn_job()).await.unwrap();
    assert!(matches!(reply, Reply::Children { .. }));
    assert_eq!(stats.spawned.load(Ordering::SeqCst), 2);
    assert_eq!(pool.slot_states(), vec![SlotState::Idle]);
}

#[tokio::test]
async fn test_respawn_budget_is_bounded() {
    let host = TestHost::new(Behaviour::DieFirst(2), Duration::ZERO);
    let (pool, stats) = pool_with(host, options(None, WorkerLostPolicy::Respawn, 1));
    pool.spawn(1).unwrap();

    let err = pool.dispatch(&spawn_job()).await.unwrap_err();
    assert!(matches!(err, EvolveError::WorkerLost { .. }));
    assert_eq!(stats.spawned.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_abort_policy_fails_on_lost_worker() {
    let host = TestHost::new(Behaviour::DieFirst(1), Duration::ZERO);
    let (pool, stats) = pool_with(host, PoolOptions::default());
    pool.spawn(2).unwrap();

    pool.queue_many(&spawn_job(), 4).unwrap();
    let err = pool.run_queue().await.unwrap_err();
    assert!(matches!(err, EvolveError::WorkerLost { .. }));
    assert_eq!(stats.spawned.load(Ordering::SeqCst), 2, "abort never respawns");
    assert_eq!(pool.queued(), 0);
}

#[tokio::test]
async fn test_terminate_abandons_in_flight_job() {
    let host = TestHost::new(Behaviour::Normal, Duration::from_millis(300));
    let (pool, _stats) = pool_with(host, PoolOptions::default());
    pool.spawn(1).unwrap();

    let pending = tokio::spawn({
        let pool = pool.clone();
        async move { pool.dispatch(&spawn_job()).await }
    });
    while pool.in_flight() == 0 {
        tokio::task::yield_now().await;
    }

    pool.terminate();
    let err = pending.await.unwrap().unwrap_err();
    assert!(matches!(err, EvolveError::WorkerLost { .. }));
    assert_eq!(pool.live_workers(), 0);
}

#[tokio::test]
async fn test_dropped_run_queue_discards_unsent_jobs() {
    let host = TestHost::new(Behaviour::Normal, Duration::from_millis(10));
    let (pool, _stats) = pool_with(host, PoolOptions::default());
    pool.spawn(2).unwrap();
    pool.queue_many(&spawn_job(), 10).unwrap();

    let interrupted = tokio::time::timeout(Duration::from_millis(20), pool.run_queue()).await;
    assert!(interrupted.is_err(), "ten 10ms jobs on two workers outlast 20ms");
    assert_eq!(pool.queued(), 0);
    assert!(!pool.is_running());

    // The next run sees only its own job.
    pool.spawn(2).unwrap();
    pool.queue(&spawn_job()).unwrap();
    assert_eq!(pool.run_queue().await.unwrap().len(), 1);
}
