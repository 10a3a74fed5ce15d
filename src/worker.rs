//! The worker execution unit.
//!
//! A worker owns nothing but its operator configuration and its RNG. Every
//! spawn job builds a fresh [`Brood`] from the message payload, breeds one
//! pair of children from it, and drops it; no population state survives
//! between jobs.

use crate::error::EvolveError;
use crate::genome::{Genome, Target};
use crate::optimizer::{GeneticOperators, ParentSelector};
use crate::protocol::{GenomeRecord, Job, Reply, SELECTION_EXHAUSTED};
use fastrand::Rng;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// What the serve loop should do after handling one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Reply(String),
    Exit,
}

pub struct Worker {
    id: usize,
    operators: GeneticOperators,
    rng: Rng,
}

/// Per-job breeding context.
struct Brood {
    parents: Vec<Genome>,
}

impl Brood {
    fn from_records(records: Vec<GenomeRecord>, target: &str) -> Result<Self, EvolveError> {
        let target = Target::new(target);
        let parents = records
            .into_iter()
            .map(|r| r.into_genome(&target))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parents })
    }

    fn breed(
        &self,
        operators: &GeneticOperators,
        rng: &mut Rng,
    ) -> Result<[Genome; 2], EvolveError> {
        let selector = ParentSelector::new(&self.parents);
        operators.breed(&selector, rng)
    }
}

impl Worker {
    pub fn new(id: usize, operators: GeneticOperators, rng: Rng) -> Self {
        Self { id, operators, rng }
    }

    pub fn handle(&mut self, raw: &str) -> Outcome {
        let job = match Job::decode(raw) {
            Ok(job) => job,
            Err(e) => {
                warn!("Worker {} rejecting message: {}", self.id, e);
                return Outcome::Reply(encode(&Reply::invalid_job()));
            }
        };

        match job {
            Job::Cleanup => Outcome::Exit,
            Job::Spawn { parents, target } => Outcome::Reply(encode(&self.spawn(parents, &target))),
        }
    }

    fn spawn(&mut self, parents: Vec<GenomeRecord>, target: &str) -> Reply {
        let brood = match Brood::from_records(parents, target) {
            Ok(brood) => brood,
            Err(e) => {
                warn!("Worker {} received unusable parents: {}", self.id, e);
                return Reply::invalid_job();
            }
        };

        match brood.breed(&self.operators, &mut self.rng) {
            Ok(children) => Reply::children(&children),
            Err(EvolveError::SelectionExhausted { candidates }) => {
                warn!(
                    "Worker {} exhausted selection over {} candidates",
                    self.id, candidates
                );
                Reply::Error {
                    error: SELECTION_EXHAUSTED.to_string(),
                }
            }
            Err(_) => Reply::invalid_job(),
        }
    }

    /// Blocks on `inbox` until a cleanup message arrives or either side hangs up.
    pub fn serve(mut self, inbox: Receiver<Arc<str>>, outbox: UnboundedSender<String>) {
        debug!("Worker {} online", self.id);

        while let Ok(message) = inbox.recv() {
            match self.handle(&message) {
                Outcome::Exit => break,
                Outcome::Reply(reply) => {
                    if outbox.send(reply).is_err() {
                        break;
                    }
                }
            }
        }

        debug!("Worker {} exiting", self.id);
    }
}

fn encode(reply: &Reply) -> String {
    reply
        .encode()
        .unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, crate::protocol::INVALID_JOB))
}
