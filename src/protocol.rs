//! Messages exchanged between the pool and its workers.
//!
//! Everything crossing the boundary is JSON text; no memory is shared. Fitness
//! values on the wire are informational only: receivers rebuild genomes from
//! their text and recompute fitness against their own copy of the target.

use crate::error::{EvResult, EvolveError};
use crate::genome::{Genome, Target};
use serde::{Deserialize, Serialize};

pub const INVALID_JOB: &str = "invalid job";
pub const SELECTION_EXHAUSTED: &str = "selection exhausted";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct GenomeRecord {
    pub text: String,
    pub fitness: usize,
}

impl From<&Genome> for GenomeRecord {
    fn from(genome: &Genome) -> Self {
        Self {
            text: genome.text_string(),
            fitness: genome.fitness(),
        }
    }
}

impl GenomeRecord {
    pub fn into_genome(self, target: &Target) -> EvResult<Genome> {
        Genome::from_text(&self.text, target)
    }
}

/// Pool → worker.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "lowercase")]
pub enum Job {
    Spawn {
        parents: Vec<GenomeRecord>,
        target: String,
    },
    Cleanup,
}

impl Job {
    pub fn spawn(parents: &[Genome], target: &Target) -> Self {
        Job::Spawn {
            parents: parents.iter().map(GenomeRecord::from).collect(),
            target: target.as_str().to_string(),
        }
    }

    pub fn encode(&self) -> EvResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> EvResult<Self> {
        serde_json::from_str(raw).map_err(|e| EvolveError::InvalidJob(e.to_string()))
    }
}

/// Worker → pool. `Cleanup` never produces a reply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Reply {
    Children { children: Vec<GenomeRecord> },
    Error { error: String },
}

impl Reply {
    pub fn children(children: &[Genome]) -> Self {
        Reply::Children {
            children: children.iter().map(GenomeRecord::from).collect(),
        }
    }

    pub fn invalid_job() -> Self {
        Reply::Error {
            error: INVALID_JOB.to_string(),
        }
    }

    pub fn encode(&self) -> EvResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> EvResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| EvolveError::InvalidJob(format!("Malformed reply: {}", e)))
    }

    /// Rebuilds the children against `target`. `candidates` is the size of the
    /// breeding subset that was sent, used to describe a selection failure.
    pub fn into_children(self, target: &Target, candidates: usize) -> EvResult<Vec<Genome>> {
        match self {
            Reply::Children { children } => children
                .into_iter()
                .map(|record| record.into_genome(target))
                .collect(),
            Reply::Error { error } if error == SELECTION_EXHAUSTED => {
                Err(EvolveError::SelectionExhausted { candidates })
            }
            Reply::Error { error } => Err(EvolveError::InvalidJob(error)),
        }
    }
}
