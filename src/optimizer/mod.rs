pub mod crossover;
pub mod mutation;
pub mod runner;
pub mod selection;

pub use self::runner::{
    CancelHandle, GenerationEvent, Orchestrator, RunEvent, RunOptions, RunOutcome,
};
pub use self::selection::ParentSelector;

use crate::config::{GeneticParams, MutationPolicy};
use crate::error::EvResult;
use crate::genome::{Alphabet, Genome, Target};
use fastrand::Rng;

/// Stateless genetic operator set. Carries configuration only and is passed
/// by reference into every call.
#[derive(Debug, Clone)]
pub struct GeneticOperators {
    pub alphabet: Alphabet,
    pub crossover_probability: f64,
    pub mutation_probability: f64,
    pub mutation: MutationPolicy,
}

impl Default for GeneticOperators {
    fn default() -> Self {
        let params = GeneticParams::default();
        Self {
            alphabet: Alphabet::from_policy(params.alphabet),
            crossover_probability: params.crossover_probability,
            mutation_probability: params.mutation_probability,
            mutation: params.mutation,
        }
    }
}

impl GeneticOperators {
    pub fn from_params(params: &GeneticParams) -> EvResult<Self> {
        let alphabet = match &params.custom_alphabet {
            Some(symbols) => Alphabet::new(symbols.chars())?,
            None => Alphabet::from_policy(params.alphabet),
        };

        Ok(Self {
            alphabet,
            crossover_probability: params.crossover_probability,
            mutation_probability: params.mutation_probability,
            mutation: params.mutation,
        })
    }

    pub fn random_genome(&self, target: &Target, rng: &mut Rng) -> Genome {
        Genome::random(target, &self.alphabet, rng)
    }

    pub fn random_population(&self, target: &Target, size: usize, rng: &mut Rng) -> Vec<Genome> {
        (0..size).map(|_| self.random_genome(target, rng)).collect()
    }

    pub fn crossover(
        &self,
        mother: &Genome,
        father: &Genome,
        rng: &mut Rng,
    ) -> EvResult<(Genome, Genome)> {
        crossover::crossover(mother, father, rng)
    }

    pub fn mutate(&self, genome: &Genome, rng: &mut Rng) -> Genome {
        mutation::mutate(genome, self.mutation, &self.alphabet, rng)
    }

    /// Crossover with `crossover_probability` (else both parents pass through),
    /// then each child independently mutates with `mutation_probability`.
    pub fn create_children(
        &self,
        mother: &Genome,
        father: &Genome,
        rng: &mut Rng,
    ) -> EvResult<[Genome; 2]> {
        let (mut first, mut second) = if rng.f64() < self.crossover_probability {
            self.crossover(mother, father, rng)?
        } else {
            (mother.clone(), father.clone())
        };

        if rng.f64() < self.mutation_probability {
            first = self.mutate(&first, rng);
        }
        if rng.f64() < self.mutation_probability {
            second = self.mutate(&second, rng);
        }

        Ok([first, second])
    }

    /// Draws two parents from `selector` and produces their pair of children.
    pub fn breed(&self, selector: &ParentSelector<'_>, rng: &mut Rng) -> EvResult<[Genome; 2]> {
        let mother = selector.select(rng)?;
        let father = selector.select(rng)?;
        self.create_children(mother, father, rng)
    }
}
