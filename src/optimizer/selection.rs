use crate::error::{EvResult, EvolveError};
use crate::genome::Genome;
use fastrand::Rng;

/// Fitness-proportionate ("roulette") sampler over a fixed breeding pool.
///
/// Lower fitness maps to higher weight: `weight(g) = (max_fitness + 1) - g.fitness`,
/// so the least fit genome still keeps weight 1. The ceiling and the total are
/// computed once; every draw is a single linear walk.
pub struct ParentSelector<'a> {
    pool: &'a [Genome],
    ceiling: u64,
    total_weight: u64,
}

impl<'a> ParentSelector<'a> {
    pub fn new(pool: &'a [Genome]) -> Self {
        let max_fitness = pool.iter().map(Genome::fitness).max().unwrap_or(0) as u64;
        let ceiling = max_fitness + 1;
        let total_weight = pool.iter().map(|g| ceiling - g.fitness() as u64).sum();

        Self {
            pool,
            ceiling,
            total_weight,
        }
    }

    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    #[inline(always)]
    pub fn weight(&self, genome: &Genome) -> u64 {
        self.ceiling - genome.fitness() as u64
    }

    pub fn select(&self, rng: &mut Rng) -> EvResult<&'a Genome> {
        if self.total_weight == 0 {
            return Err(EvolveError::SelectionExhausted {
                candidates: self.pool.len(),
            });
        }

        let r = rng.u64(0..self.total_weight);
        let mut running = 0u64;
        for genome in self.pool {
            running += self.weight(genome);
            if running > r {
                return Ok(genome);
            }
        }

        Err(EvolveError::SelectionExhausted {
            candidates: self.pool.len(),
        })
    }
}
