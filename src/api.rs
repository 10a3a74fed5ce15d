use crate::config::Config;
use crate::error::{EvResult, EvolveError};
use crate::optimizer::{CancelHandle, GeneticOperators, Orchestrator, RunEvent, RunOutcome};
use crate::pool::{ThreadHost, WorkerHost};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;

/// The surface a front end drives: start a run, cancel it, read its events.
///
/// At most one run is active per session. Starting a new run cancels the
/// previous one first.
pub struct Session {
    config: Config,
    host: Option<Arc<dyn WorkerHost>>,
    active: Arc<Mutex<Option<CancelHandle>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

/// Live view of a started run.
pub struct RunSubscription {
    pub events: UnboundedReceiver<RunEvent>,
    task: JoinHandle<EvResult<RunOutcome>>,
}

impl RunSubscription {
    /// Next progress or completion event; `None` once the run has stopped
    /// reporting.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    /// Waits for the run to end and returns how it ended.
    pub async fn finish(self) -> EvResult<RunOutcome> {
        self.task
            .await
            .map_err(|e| EvolveError::RunTask(e.to_string()))?
    }
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            host: None,
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Uses `host` to spawn workers instead of local threads.
    pub fn with_host(config: Config, host: Arc<dyn WorkerHost>) -> Self {
        Self {
            config,
            host: Some(host),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Starts evolving toward `target` on the current tokio runtime.
    pub fn start_run(&self, target: &str, population_size: usize) -> EvResult<RunSubscription> {
        let mut config = self.config.clone();
        config.search.population_size = population_size;
        config.validate()?;

        let host = match &self.host {
            Some(host) => Arc::clone(host),
            None => {
                let operators = GeneticOperators::from_params(&config.genetics)?;
                Arc::new(ThreadHost::new(operators, config.search.seed))
            }
        };
        let (mut orchestrator, events) = Orchestrator::with_host(&config, host)?;
        let handle = orchestrator.cancel_handle();

        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = active.replace(handle.clone()) {
            previous.cancel();
        }
        drop(active);

        info!("Starting run: population {}", population_size);
        let target = target.to_string();
        let registry = Arc::clone(&self.active);
        let task = tokio::spawn(async move {
            let outcome = orchestrator.run(&target).await;
            orchestrator.cleanup();

            // A newer run may already own the slot; only clear our own entry.
            let mut active = registry.lock().unwrap_or_else(PoisonError::into_inner);
            if active.as_ref().is_some_and(|current| current.same_run(&handle)) {
                active.take();
            }
            outcome
        });

        Ok(RunSubscription { events, task })
    }

    /// Cancels the active run. Returns false if there was none.
    pub fn cancel_run(&self) -> bool {
        let handle = self
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match handle {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }
}
