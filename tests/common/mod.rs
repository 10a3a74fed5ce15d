#![allow(dead_code)]

use fastrand::Rng;
use shakespeare::error::EvResult;
use shakespeare::optimizer::GeneticOperators;
use shakespeare::pool::{PoolOptions, WorkerChannels, WorkerHost, WorkerPool};
use shakespeare::worker::{Outcome, Worker};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Answers every job after `delay`.
    Normal,
    /// Swallows jobs and never answers.
    Silent,
    /// The first `n` workers spawned hang up on their first job.
    DieFirst(usize),
}

/// Worker-side observations, shared with the test.
#[derive(Default)]
pub struct Stats {
    pub spawned: AtomicUsize,
    pub jobs: AtomicUsize,
    pub active: AtomicUsize,
    pub peak_active: AtomicUsize,
    /// Set when a worker finds a second job waiting while it is still busy.
    pub overlapped: AtomicBool,
}

impl Stats {
    pub fn peak(&self) -> usize {
        self.peak_active.load(Ordering::SeqCst)
    }
}

pub struct TestHost {
    pub operators: GeneticOperators,
    pub delay: Duration,
    pub behaviour: Behaviour,
    pub stats: Arc<Stats>,
}

impl TestHost {
    pub fn new(behaviour: Behaviour, delay: Duration) -> Self {
        Self {
            operators: GeneticOperators::default(),
            delay,
            behaviour,
            stats: Arc::new(Stats::default()),
        }
    }

    pub fn with_operators(mut self, operators: GeneticOperators) -> Self {
        self.operators = operators;
        self
    }
}

impl WorkerHost for TestHost {
    fn spawn_worker(&self, id: usize) -> EvResult<WorkerChannels> {
        let nth = self.stats.spawned.fetch_add(1, Ordering::SeqCst);
        let mut worker = Worker::new(id, self.operators.clone(), Rng::with_seed(nth as u64 + 1));
        let stats = Arc::clone(&self.stats);
        let delay = self.delay;
        let behaviour = self.behaviour;

        WorkerChannels::spawn_thread(format!("test-worker-{}", id), move |inbox, outbox| {
            let mut backlog = Vec::new();
            loop {
                let message = match backlog.pop() {
                    Some(m) => m,
                    None => match inbox.recv() {
                        Ok(m) => m,
                        Err(_) => return,
                    },
                };

                let is_cleanup = message.contains("cleanup");
                if !is_cleanup {
                    stats.jobs.fetch_add(1, Ordering::SeqCst);
                    match behaviour {
                        Behaviour::Silent => continue,
                        Behaviour::DieFirst(n) if nth < n => return,
                        _ => {}
                    }
                }

                let now = stats.active.fetch_add(1, Ordering::SeqCst) + 1;
                stats.peak_active.fetch_max(now, Ordering::SeqCst);
                thread::sleep(delay);
                if let Ok(extra) = inbox.try_recv() {
                    if !extra.contains("cleanup") {
                        stats.overlapped.store(true, Ordering::SeqCst);
                    }
                    backlog.push(extra);
                }
                stats.active.fetch_sub(1, Ordering::SeqCst);

                match worker.handle(&message) {
                    Outcome::Exit => return,
                    Outcome::Reply(reply) => {
                        if outbox.send(reply).is_err() {
                            return;
                        }
                    }
                }
            }
        })
    }
}

pub fn pool_with(host: TestHost, options: PoolOptions) -> (Arc<WorkerPool>, Arc<Stats>) {
    let stats = Arc::clone(&host.stats);
    (Arc::new(WorkerPool::new(Arc::new(host), options)), stats)
}
