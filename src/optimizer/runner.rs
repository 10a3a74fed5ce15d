use crate::config::{Config, ExecutionMode, FrontRunnerPolicy};
use crate::error::{EvResult, EvolveError};
use crate::genome::{sort_by_fitness, Genome, Target};
use crate::optimizer::{GeneticOperators, ParentSelector};
use crate::pool::{PoolOptions, ThreadHost, WorkerHost, WorkerPool};
use crate::protocol::Job;
use fastrand::Rng;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub population_size: usize,
    pub front_runners: FrontRunnerPolicy,
    pub max_generations: Option<usize>,
    pub seed: Option<u64>,
    pub mode: ExecutionMode,
    pub pool_size: usize,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RunOptions {
    fn from(cfg: &Config) -> Self {
        Self {
            population_size: cfg.search.population_size,
            front_runners: cfg.search.front_runners,
            max_generations: cfg.search.max_generations,
            seed: cfg.search.seed,
            mode: cfg.search.mode,
            pool_size: cfg.pool.pool_size,
        }
    }
}

/// Snapshot of one completed generation.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationEvent {
    pub generation: usize,
    pub rate: f64,
    pub best_text: String,
    pub best_fitness: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Progress(GenerationEvent),
    /// Sent once, on convergence. Nothing follows it.
    Complete(GenerationEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Converged(GenerationEvent),
    Cancelled { generation: usize },
    GenerationLimit(GenerationEvent),
}

impl RunOutcome {
    pub fn generation(&self) -> usize {
        match self {
            RunOutcome::Converged(ev) | RunOutcome::GenerationLimit(ev) => ev.generation,
            RunOutcome::Cancelled { generation } => *generation,
        }
    }
}

/// Event channel that can be shut from another task. Emission and closing
/// share one lock, so once `close` returns nothing more gets through.
struct EventSink {
    tx: Mutex<Option<UnboundedSender<RunEvent>>>,
}

impl EventSink {
    fn new(tx: UnboundedSender<RunEvent>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
        }
    }

    fn emit(&self, event: RunEvent) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = tx.as_ref() {
            // A dropped receiver only means nobody is listening.
            let _ = tx.send(event);
        }
    }

    fn close(&self) {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Stops a run from any task or thread.
#[derive(Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
    pool: Arc<WorkerPool>,
    sink: Arc<EventSink>,
}

impl CancelHandle {
    /// Silences the event stream, then tears the pool down so any in-flight
    /// dispatch fails at once. The run loop notices at its next boundary.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.sink.close();
        self.pool.terminate();
        info!("🛑 Run cancelled");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// True when both handles stop the same orchestrator.
    pub fn same_run(&self, other: &CancelHandle) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

/// Drives the generation loop: breed, fold, trim, report.
pub struct Orchestrator {
    operators: GeneticOperators,
    options: RunOptions,
    pool: Arc<WorkerPool>,
    sink: Arc<EventSink>,
    cancelled: Arc<AtomicBool>,
    population: Vec<Genome>,
    generation: usize,
}

impl Orchestrator {
    pub fn new(
        operators: GeneticOperators,
        options: RunOptions,
        pool: Arc<WorkerPool>,
    ) -> (Self, UnboundedReceiver<RunEvent>) {
        let (tx, rx) = unbounded_channel();
        let orchestrator = Self {
            operators,
            options,
            pool,
            sink: Arc::new(EventSink::new(tx)),
            cancelled: Arc::new(AtomicBool::new(false)),
            population: Vec::new(),
            generation: 1,
        };
        (orchestrator, rx)
    }

    /// Builds an orchestrator whose workers are local OS threads.
    pub fn from_config(config: &Config) -> EvResult<(Self, UnboundedReceiver<RunEvent>)> {
        let operators = GeneticOperators::from_params(&config.genetics)?;
        let host = ThreadHost::new(operators, config.search.seed);
        Self::with_host(config, Arc::new(host))
    }

    pub fn with_host(
        config: &Config,
        host: Arc<dyn WorkerHost>,
    ) -> EvResult<(Self, UnboundedReceiver<RunEvent>)> {
        config.validate()?;
        let operators = GeneticOperators::from_params(&config.genetics)?;
        let pool = Arc::new(WorkerPool::new(host, PoolOptions::from(&config.pool)));
        Ok(Self::new(operators, RunOptions::from(config), pool))
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
            pool: Arc::clone(&self.pool),
            sink: Arc::clone(&self.sink),
        }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    /// Current population, sorted fittest first once a generation completes.
    pub fn population(&self) -> &[Genome] {
        &self.population
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Releases the workers and forgets the population. Safe to repeat.
    pub fn cleanup(&mut self) {
        self.pool.terminate();
        self.population.clear();
        self.generation = 1;
    }

    /// Evolves a population toward `target_text` until it converges, hits the
    /// generation cap, is cancelled, or fails.
    pub async fn run(&mut self, target_text: &str) -> EvResult<RunOutcome> {
        let target = Target::new(target_text);
        let size = self.options.population_size;
        let mut rng = match self.options.seed {
            Some(s) => Rng::with_seed(s),
            None => Rng::new(),
        };

        self.generation = 1;
        self.population = self.operators.random_population(&target, size, &mut rng);
        sort_by_fitness(&mut self.population);

        if self.options.mode == ExecutionMode::Pool
            && self.pool.live_workers() == 0
            && !self.is_cancelled()
        {
            self.pool.spawn(self.options.pool_size)?;
        }

        info!(
            "🚀 Evolving {} genomes toward {} symbols ({} mode)",
            size,
            target.len(),
            self.options.mode
        );
        let start_time = Instant::now();

        loop {
            if self.is_cancelled() {
                return Ok(self.cancelled_outcome());
            }

            let count = self.options.front_runners.count(size).min(self.population.len());
            let front_runners = self.population[..count].to_vec();

            let offspring = match self.options.mode {
                ExecutionMode::Pool => self.breed_on_pool(&front_runners, &target).await,
                ExecutionMode::Local => self.breed_locally(front_runners, &mut rng).await,
            };

            let mut offspring = match offspring {
                Ok(offspring) => offspring,
                Err(_) if self.is_cancelled() => return Ok(self.cancelled_outcome()),
                Err(e) => {
                    warn!("Generation {} failed: {}", self.generation, e);
                    self.pool.terminate();
                    self.sink.close();
                    return Err(e);
                }
            };

            sort_by_fitness(&mut offspring);
            offspring.truncate(size);
            self.population = offspring;

            // Cancellation discards the generation that was in progress.
            if self.is_cancelled() {
                return Ok(self.cancelled_outcome());
            }

            let elapsed = start_time.elapsed().as_secs_f64();
            let event = self.snapshot(elapsed);
            debug!(
                "Generation {}: best fitness {} ({:.2} gen/s)",
                event.generation, event.best_fitness, event.rate
            );

            if event.best_fitness == 0 {
                info!(
                    "🏁 Converged at generation {} after {:.2}s",
                    event.generation, elapsed
                );
                self.sink.emit(RunEvent::Complete(event.clone()));
                self.sink.close();
                self.pool.terminate();
                return Ok(RunOutcome::Converged(event));
            }

            self.sink.emit(RunEvent::Progress(event.clone()));

            if self.options.max_generations == Some(self.generation) {
                info!("Generation limit {} reached", self.generation);
                self.sink.close();
                self.pool.terminate();
                return Ok(RunOutcome::GenerationLimit(event));
            }
            self.generation += 1;
        }
    }

    fn cancelled_outcome(&mut self) -> RunOutcome {
        // Workers spawned while cancel() raced the lazy spawn must go too.
        self.pool.terminate();
        self.population.clear();
        RunOutcome::Cancelled {
            generation: self.generation,
        }
    }

    fn snapshot(&self, elapsed_secs: f64) -> GenerationEvent {
        let (best_text, best_fitness) = match self.population.first() {
            Some(best) => (best.text_string(), best.fitness()),
            None => (String::new(), 0),
        };
        GenerationEvent {
            generation: self.generation,
            rate: self.generation as f64 / elapsed_secs.max(1.0),
            best_text,
            best_fitness,
        }
    }

    /// Keeps every worker saturated with spawn jobs for the same breeding
    /// subset until at least a full population of children has come back.
    async fn breed_on_pool(
        &self,
        front_runners: &[Genome],
        target: &Target,
    ) -> EvResult<Vec<Genome>> {
        let size = self.options.population_size;
        let job = Job::spawn(front_runners, target);
        let mut accumulator = Vec::with_capacity(size + 1);

        while accumulator.len() < size {
            let pairs = (size - accumulator.len()).div_ceil(2);
            self.pool.queue_many(&job, pairs)?;

            let before = accumulator.len();
            for reply in self.pool.run_queue().await? {
                accumulator.extend(reply.into_children(target, front_runners.len())?);
            }
            if accumulator.len() == before {
                return Err(EvolveError::InvalidJob("workers returned no children".into()));
            }
        }
        Ok(accumulator)
    }

    /// Breeds in-process on the rayon pool. Each pair gets its own RNG seeded
    /// from the run RNG, so seeded runs stay reproducible.
    async fn breed_locally(
        &self,
        front_runners: Vec<Genome>,
        rng: &mut Rng,
    ) -> EvResult<Vec<Genome>> {
        let pairs = self.options.population_size.div_ceil(2);
        let seeds: Vec<u64> = (0..pairs).map(|_| rng.u64(..)).collect();
        let operators = self.operators.clone();

        let broods = tokio::task::spawn_blocking(move || {
            let selector = ParentSelector::new(&front_runners);
            seeds
                .par_iter()
                .map(|&seed| operators.breed(&selector, &mut Rng::with_seed(seed)))
                .collect::<EvResult<Vec<[Genome; 2]>>>()
        })
        .await
        .map_err(|e| EvolveError::RunTask(e.to_string()))??;

        Ok(broods.into_iter().flatten().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config(population: usize) -> Config {
        let mut config = Config::default();
        config.search.population_size = population;
        config.search.mode = ExecutionMode::Local;
        config.search.seed = Some(7);
        config.search.max_generations = Some(200);
        config.genetics.custom_alphabet = Some("AB".into());
        config
    }

    #[tokio::test]
    async fn test_local_run_converges() {
        let (mut orch, mut events) = Orchestrator::from_config(&local_config(50)).unwrap();
        let outcome = orch.run("AB").await.unwrap();

        let RunOutcome::Converged(done) = outcome else {
            panic!("expected convergence, got {:?}", outcome);
        };
        assert_eq!(done.best_text, "AB");
        assert_eq!(orch.population().len(), 50);

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert_eq!(last, Some(RunEvent::Complete(done)));
    }

    #[tokio::test]
    async fn test_generation_limit_stops_run() {
        let mut config = local_config(10);
        config.genetics.custom_alphabet = None;
        config.search.max_generations = Some(3);

        let (mut orch, mut events) = Orchestrator::from_config(&config).unwrap();
        let outcome = orch.run("a fairly long target sentence").await.unwrap();
        assert!(matches!(outcome, RunOutcome::GenerationLimit(_)));
        assert_eq!(outcome.generation(), 3);

        let mut progress = 0;
        while let Some(event) = events.recv().await {
            assert!(matches!(event, RunEvent::Progress(_)));
            progress += 1;
        }
        assert_eq!(progress, 3);
    }

    #[tokio::test]
    async fn test_cancel_before_run() {
        let (mut orch, mut events) = Orchestrator::from_config(&local_config(10)).unwrap();
        orch.cancel_handle().cancel();

        let outcome = orch.run("AB").await.unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled { generation: 1 });
        assert!(orch.population().is_empty());
        assert!(events.recv().await.is_none());
    }

    #[test]
    fn test_rate_floor_is_one_second() {
        let (orch, _events) = Orchestrator::from_config(&local_config(4)).unwrap();
        let event = orch.snapshot(0.25);
        assert_eq!(event.rate, 1.0);
    }

    #[test]
    fn test_cleanup_twice() {
        let (mut orch, _events) = Orchestrator::from_config(&local_config(4)).unwrap();
        orch.cleanup();
        orch.cleanup();
        assert!(orch.population().is_empty());
        assert_eq!(orch.pool().live_workers(), 0);
    }
}
