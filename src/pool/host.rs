use crate::error::EvResult;
use crate::optimizer::GeneticOperators;
use crate::worker::Worker;
use fastrand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// The pool's end of one worker: where to post jobs, where replies arrive,
/// and (optionally) the OS thread backing it.
pub struct WorkerChannels {
    pub inbox: Sender<Arc<str>>,
    pub outbox: UnboundedReceiver<String>,
    pub thread: Option<JoinHandle<()>>,
}

impl WorkerChannels {
    /// Runs `body` on a named OS thread wired to a fresh pair of channels.
    pub fn spawn_thread<F>(name: String, body: F) -> EvResult<Self>
    where
        F: FnOnce(Receiver<Arc<str>>, UnboundedSender<String>) + Send + 'static,
    {
        let (inbox, inbox_rx) = mpsc::channel();
        let (outbox_tx, outbox) = unbounded_channel();

        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || body(inbox_rx, outbox_tx))?;

        Ok(Self {
            inbox,
            outbox,
            thread: Some(thread),
        })
    }
}

/// The "spawn worker" capability supplied by the host environment.
pub trait WorkerHost: Send + Sync {
    fn spawn_worker(&self, id: usize) -> EvResult<WorkerChannels>;
}

/// Default host: one OS thread per worker, each running [`Worker::serve`].
pub struct ThreadHost {
    operators: GeneticOperators,
    seed: Option<u64>,
    spawned: AtomicU64,
}

impl ThreadHost {
    pub fn new(operators: GeneticOperators, seed: Option<u64>) -> Self {
        Self {
            operators,
            seed,
            spawned: AtomicU64::new(0),
        }
    }
}

impl WorkerHost for ThreadHost {
    fn spawn_worker(&self, id: usize) -> EvResult<WorkerChannels> {
        let nth = self.spawned.fetch_add(1, Ordering::Relaxed);
        let rng = match self.seed {
            Some(s) => Rng::with_seed(s.wrapping_add(nth + 1)),
            None => Rng::new(),
        };
        let worker = Worker::new(id, self.operators.clone(), rng);

        let name = format!("shakespeare-worker-{}", id);
        WorkerChannels::spawn_thread(name, move |inbox, outbox| worker.serve(inbox, outbox))
    }
}
