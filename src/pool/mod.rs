pub mod host;

pub use self::host::{ThreadHost, WorkerChannels, WorkerHost};

use crate::config::{PoolParams, WorkerLostPolicy};
use crate::error::{EvResult, EvolveError};
use crate::protocol::{Job, Reply};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;
use strum_macros::Display;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Per-worker state machine: `Idle -> Busy -> Idle`, and either of those to
/// the terminal `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SlotState {
    Idle,
    Busy,
    Terminated,
}

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub dispatch_timeout: Option<Duration>,
    pub on_worker_lost: WorkerLostPolicy,
    pub max_respawns: usize,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self::from(&PoolParams::default())
    }
}

impl From<&PoolParams> for PoolOptions {
    fn from(params: &PoolParams) -> Self {
        Self {
            dispatch_timeout: params.dispatch_timeout(),
            on_worker_lost: params.on_worker_lost,
            max_respawns: params.max_respawns,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct WorkerSlot {
    id: usize,
    state: Mutex<SlotState>,
    inbox: Mutex<Option<Sender<Arc<str>>>>,
    outbox: tokio::sync::Mutex<UnboundedReceiver<String>>,
    abort: Notify,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerSlot {
    fn new(id: usize, channels: WorkerChannels) -> Self {
        Self {
            id,
            state: Mutex::new(SlotState::Idle),
            inbox: Mutex::new(Some(channels.inbox)),
            outbox: tokio::sync::Mutex::new(channels.outbox),
            abort: Notify::new(),
            thread: Mutex::new(channels.thread),
        }
    }

    fn state(&self) -> SlotState {
        *lock(&self.state)
    }

    fn try_claim(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == SlotState::Idle {
            *state = SlotState::Busy;
            true
        } else {
            false
        }
    }

    /// Busy -> Idle. Returns false if the slot was terminated meanwhile.
    fn settle(&self) -> bool {
        let mut state = lock(&self.state);
        if *state == SlotState::Busy {
            *state = SlotState::Idle;
            true
        } else {
            false
        }
    }

    fn post(&self, payload: Arc<str>) -> bool {
        match lock(&self.inbox).as_ref() {
            Some(inbox) => inbox.send(payload).is_ok(),
            None => false,
        }
    }

    /// Asks the worker to exit, abandons any pending reply and releases the
    /// handle. Safe to call any number of times.
    fn terminate(&self) {
        {
            let mut state = lock(&self.state);
            if *state == SlotState::Terminated {
                return;
            }
            *state = SlotState::Terminated;
        }

        if let Some(inbox) = lock(&self.inbox).take() {
            if let Ok(cleanup) = Job::Cleanup.encode() {
                let _ = inbox.send(Arc::from(cleanup));
            }
        }
        self.abort.notify_one();
        // Detached: a worker busy with a job exits once it reads the cleanup.
        drop(lock(&self.thread).take());
    }
}

enum ExchangeError {
    /// The pool tore the worker down while the job was in flight.
    Aborted,
    Lost(String),
}

/// A claimed (Busy) slot. Dropping a claim without settling it retires the
/// worker, since a reply may still be on its way.
struct SlotClaim<'a> {
    pool: &'a WorkerPool,
    slot: Arc<WorkerSlot>,
    idle: Arc<Semaphore>,
    settled: bool,
}

impl SlotClaim<'_> {
    async fn exchange(&self, payload: Arc<str>) -> Result<String, ExchangeError> {
        let slot = &self.slot;
        if slot.state() == SlotState::Terminated {
            return Err(ExchangeError::Aborted);
        }
        if !slot.post(payload) {
            return Err(ExchangeError::Lost("inbox closed".into()));
        }

        let mut outbox = slot.outbox.lock().await;
        let receive = async {
            outbox
                .recv()
                .await
                .ok_or_else(|| ExchangeError::Lost("worker exited".into()))
        };
        let bounded = async {
            match self.pool.options.dispatch_timeout {
                Some(limit) => match tokio::time::timeout(limit, receive).await {
                    Ok(reply) => reply,
                    Err(_) => Err(ExchangeError::Lost(format!("no reply within {:?}", limit))),
                },
                None => receive.await,
            }
        };

        tokio::select! {
            reply = bounded => reply,
            _ = slot.abort.notified() => Err(ExchangeError::Aborted),
        }
    }

    fn release(mut self) {
        self.settled = true;
        self.pool.in_flight.fetch_sub(1, Ordering::AcqRel);
        if self.slot.settle() {
            self.idle.add_permits(1);
        }
    }

    fn retire(mut self) {
        self.settled = true;
        self.pool.in_flight.fetch_sub(1, Ordering::AcqRel);
        self.pool.retire_slot(&self.slot, &self.idle);
    }
}

impl Drop for SlotClaim<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.pool.in_flight.fetch_sub(1, Ordering::AcqRel);
            self.pool.retire_slot(&self.slot, &self.idle);
        }
    }
}

/// Ends a queue run however it ends, including the run future being dropped:
/// jobs nobody picked up are discarded, then the single-flight flag is reset.
struct QueueRunGuard<'a>(&'a WorkerPool);

impl Drop for QueueRunGuard<'_> {
    fn drop(&mut self) {
        let stale = std::mem::take(&mut *lock(&self.0.queue)).len();
        if stale > 0 {
            debug!("Discarding {} unsent jobs", stale);
        }
        self.0.queue_running.store(false, Ordering::Release);
    }
}

/// Fixed set of worker execution units fed by message passing.
///
/// Idle workers are counted by a semaphore: a dispatch first takes a permit,
/// then claims any Idle slot, so no worker ever holds more than one job.
pub struct WorkerPool {
    host: Arc<dyn WorkerHost>,
    options: PoolOptions,
    slots: Mutex<Vec<Arc<WorkerSlot>>>,
    idle: Mutex<Arc<Semaphore>>,
    queue: Mutex<VecDeque<Arc<str>>>,
    queue_running: AtomicBool,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl WorkerPool {
    pub fn new(host: Arc<dyn WorkerHost>, options: PoolOptions) -> Self {
        Self {
            host,
            options,
            slots: Mutex::new(Vec::new()),
            idle: Mutex::new(Arc::new(Semaphore::new(0))),
            queue: Mutex::new(VecDeque::new()),
            queue_running: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Replaces any existing workers with `n` fresh Idle ones.
    pub fn spawn(&self, n: usize) -> EvResult<()> {
        self.terminate();

        let mut slots = Vec::with_capacity(n);
        for id in 0..n {
            match self.host.spawn_worker(id) {
                Ok(channels) => slots.push(Arc::new(WorkerSlot::new(id, channels))),
                Err(e) => {
                    for slot in &slots {
                        slot.terminate();
                    }
                    return Err(e);
                }
            }
        }

        *lock(&self.slots) = slots;
        *lock(&self.idle) = Arc::new(Semaphore::new(n));
        info!("🐒 Spawned {} workers", n);
        Ok(())
    }

    /// Abandons in-flight jobs, drops queued ones and releases every worker.
    /// Calling it on an empty pool is a no-op.
    pub fn terminate(&self) {
        let slots = std::mem::take(&mut *lock(&self.slots));
        lock(&self.idle).close();
        lock(&self.queue).clear();

        for slot in &slots {
            slot.terminate();
        }
        if !slots.is_empty() {
            info!("🛑 Terminated {} workers", slots.len());
        }
    }

    pub fn live_workers(&self) -> usize {
        lock(&self.slots)
            .iter()
            .filter(|s| s.state() != SlotState::Terminated)
            .count()
    }

    pub fn idle_workers(&self) -> usize {
        lock(&self.slots)
            .iter()
            .filter(|s| s.state() == SlotState::Idle)
            .count()
    }

    pub fn slot_states(&self) -> Vec<SlotState> {
        lock(&self.slots).iter().map(|s| s.state()).collect()
    }

    /// Jobs currently assigned to a worker and awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest value `in_flight` has reached since the pool was created.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.queue_running.load(Ordering::Acquire)
    }

    pub fn queued(&self) -> usize {
        lock(&self.queue).len()
    }

    pub fn queue(&self, job: &Job) -> EvResult<()> {
        self.queue_many(job, 1)
    }

    /// Queues `count` copies of `job`, encoding it once.
    pub fn queue_many(&self, job: &Job, count: usize) -> EvResult<()> {
        let payload: Arc<str> = Arc::from(job.encode()?);
        let mut queue = lock(&self.queue);
        queue.extend(std::iter::repeat(payload).take(count));
        Ok(())
    }

    /// Sends `job` to an Idle worker, waiting for one if all are Busy, and
    /// returns its reply.
    pub async fn dispatch(&self, job: &Job) -> EvResult<Reply> {
        let payload: Arc<str> = Arc::from(job.encode()?);
        self.dispatch_payload(payload).await
    }

    /// Sends an already-encoded message. Workers answer anything they cannot
    /// parse with an invalid-job reply.
    pub async fn dispatch_raw(&self, raw: &str) -> EvResult<Reply> {
        self.dispatch_payload(Arc::from(raw)).await
    }

    async fn dispatch_payload(&self, payload: Arc<str>) -> EvResult<Reply> {
        let mut respawns = 0;

        loop {
            let claim = self.claim_idle().await?;
            let worker = claim.slot.id;

            match claim.exchange(payload.clone()).await {
                Ok(raw) => {
                    claim.release();
                    return Reply::decode(&raw);
                }
                Err(ExchangeError::Aborted) => {
                    claim.retire();
                    return Err(EvolveError::worker_lost(worker, "job abandoned by pool teardown"));
                }
                Err(ExchangeError::Lost(reason)) => {
                    claim.retire();
                    warn!("⚠️  Worker {} lost: {}", worker, reason);

                    let may_respawn = self.options.on_worker_lost == WorkerLostPolicy::Respawn
                        && respawns < self.options.max_respawns;
                    if !may_respawn || !self.respawn(worker)? {
                        return Err(EvolveError::worker_lost(worker, reason));
                    }
                    respawns += 1;
                }
            }
        }
    }

    async fn claim_idle(&self) -> EvResult<SlotClaim<'_>> {
        if self.live_workers() == 0 {
            return Err(EvolveError::PoolTerminated);
        }

        let idle = lock(&self.idle).clone();
        let permit = idle
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EvolveError::PoolTerminated)?;
        permit.forget();

        let slot = lock(&self.slots).iter().find(|s| s.try_claim()).cloned();
        let Some(slot) = slot else {
            return Err(EvolveError::PoolTerminated);
        };

        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);

        Ok(SlotClaim {
            pool: self,
            slot,
            idle,
            settled: false,
        })
    }

    fn retire_slot(&self, slot: &WorkerSlot, idle: &Semaphore) {
        slot.terminate();
        if self.live_workers() == 0 {
            idle.close();
        }
    }

    /// Puts a fresh worker where `id` used to be. Returns false if the pool
    /// has been torn down in the meantime.
    fn respawn(&self, id: usize) -> EvResult<bool> {
        let mut slots = lock(&self.slots);
        let Some(position) = slots
            .iter()
            .position(|s| s.id == id && s.state() == SlotState::Terminated)
        else {
            return Ok(false);
        };

        let channels = self.host.spawn_worker(id)?;
        slots[position] = Arc::new(WorkerSlot::new(id, channels));

        let mut idle = lock(&self.idle);
        if idle.is_closed() {
            // The last live worker was retired and closed the semaphore.
            *idle = Arc::new(Semaphore::new(0));
        }
        idle.add_permits(1);
        drop(idle);

        info!("♻️  Respawned worker {}", id);
        Ok(true)
    }

    /// Drains every queued job across all live workers concurrently and
    /// returns the replies in completion order. Refuses with `PoolBusy` if a
    /// previous run is still in progress.
    pub async fn run_queue(self: &Arc<Self>) -> EvResult<Vec<Reply>> {
        if self
            .queue_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(EvolveError::PoolBusy);
        }
        let _running = QueueRunGuard(self);

        let runners = self.live_workers();
        if runners == 0 {
            let dropped = std::mem::take(&mut *lock(&self.queue)).len();
            return if dropped == 0 {
                Ok(Vec::new())
            } else {
                Err(EvolveError::PoolTerminated)
            };
        }
        debug!("Draining {} jobs across {} workers", self.queued(), runners);

        let mut tasks = JoinSet::new();
        for _ in 0..runners {
            let pool = Arc::clone(self);
            tasks.spawn(async move { pool.drain().await });
        }

        let mut replies = Vec::new();
        let mut failure = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(batch)) => replies.extend(batch),
                Ok(Err(e)) => {
                    if failure.is_none() {
                        lock(&self.queue).clear();
                        tasks.abort_all();
                        failure = Some(e);
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    if failure.is_none() {
                        lock(&self.queue).clear();
                        tasks.abort_all();
                        failure = Some(EvolveError::RunTask(e.to_string()));
                    }
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(replies),
        }
    }

    /// One runner: keeps its current worker saturated until the queue is empty.
    async fn drain(&self) -> EvResult<Vec<Reply>> {
        let mut replies = Vec::new();
        loop {
            let next = lock(&self.queue).pop_front();
            let Some(payload) = next else {
                break;
            };
            replies.push(self.dispatch_payload(payload).await?);
        }
        Ok(replies)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.terminate();
    }
}
