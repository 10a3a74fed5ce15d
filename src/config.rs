use crate::error::{EvResult, EvolveError};
use clap::{parser::ValueSource, ArgMatches, Args, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use strum_macros::{Display, EnumIter, EnumString};

// === POLICIES ===

/// Symbol set for random genomes and substitution mutation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum AlphabetPolicy {
    /// `\n`, `\r` and space through `~` (97 symbols).
    #[default]
    Printable,
    /// Every code point in 0..=255.
    FullByte,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum MutationPolicy {
    /// Replace one position with a freshly sampled symbol.
    #[default]
    Substitute,
    /// Move one position to a neighbouring symbol (±1 in alphabet order).
    Nudge,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum FrontRunnerPolicy {
    /// Fittest half of the population breeds.
    #[default]
    Half,
    /// Fittest tenth of the population breeds.
    Decile,
}

impl FrontRunnerPolicy {
    /// Number of genomes selected from a population of `population` (at least one).
    pub fn count(self, population: usize) -> usize {
        let divisor = match self {
            FrontRunnerPolicy::Half => 2,
            FrontRunnerPolicy::Decile => 10,
        };
        population.div_ceil(divisor).max(1)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Offspring are produced by the worker pool.
    #[default]
    Pool,
    /// Offspring are produced in-process on the rayon thread pool.
    Local,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum WorkerLostPolicy {
    /// A lost worker fails the run.
    #[default]
    Abort,
    /// A lost worker is replaced and its job retried, up to `max_respawns` times.
    Respawn,
}

// === PARAMETERS ===

#[derive(Args, Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[command(flatten)]
    #[serde(default)]
    pub search: SearchParams,
    #[command(flatten)]
    #[serde(default)]
    pub genetics: GeneticParams,
    #[command(flatten)]
    #[serde(default)]
    pub pool: PoolParams,
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    #[arg(long, default_value_t = 1000)]
    pub population_size: usize,
    #[arg(long, value_enum, default_value_t = FrontRunnerPolicy::Half)]
    pub front_runners: FrontRunnerPolicy,
    #[arg(long)]
    pub max_generations: Option<usize>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, value_enum, default_value_t = ExecutionMode::Pool)]
    pub mode: ExecutionMode,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            population_size: 1000,
            front_runners: FrontRunnerPolicy::Half,
            max_generations: None,
            seed: None,
            mode: ExecutionMode::Pool,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticParams {
    #[arg(long, default_value_t = 0.80)]
    pub crossover_probability: f64,
    #[arg(long, default_value_t = 0.25)]
    pub mutation_probability: f64,
    #[arg(long, value_enum, default_value_t = MutationPolicy::Substitute)]
    pub mutation: MutationPolicy,
    #[arg(long, value_enum, default_value_t = AlphabetPolicy::Printable)]
    pub alphabet: AlphabetPolicy,
    /// Explicit symbol set; overrides `--alphabet` when present.
    #[arg(long)]
    pub custom_alphabet: Option<String>,
}

impl Default for GeneticParams {
    fn default() -> Self {
        Self {
            crossover_probability: 0.80,
            mutation_probability: 0.25,
            mutation: MutationPolicy::Substitute,
            alphabet: AlphabetPolicy::Printable,
            custom_alphabet: None,
        }
    }
}

#[derive(Args, Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolParams {
    #[arg(long, default_value_t = 3)]
    pub pool_size: usize,
    /// Per-dispatch timeout. Absent means a dispatch may wait forever.
    #[arg(long)]
    pub dispatch_timeout_ms: Option<u64>,
    #[arg(long, value_enum, default_value_t = WorkerLostPolicy::Abort)]
    pub on_worker_lost: WorkerLostPolicy,
    #[arg(long, default_value_t = 1)]
    pub max_respawns: usize,
}

impl Default for PoolParams {
    fn default() -> Self {
        Self {
            pool_size: 3,
            dispatch_timeout_ms: None,
            on_worker_lost: WorkerLostPolicy::Abort,
            max_respawns: 1,
        }
    }
}

impl PoolParams {
    pub fn dispatch_timeout(&self) -> Option<Duration> {
        self.dispatch_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> EvResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Overlays every argument the user typed explicitly onto `self`.
    pub fn merge_from_cli(&mut self, cli: &Config, matches: &ArgMatches) {
        macro_rules! update_if_present {
            ($section:ident . $field:ident) => {
                if matches.value_source(stringify!($field)) == Some(ValueSource::CommandLine) {
                    self.$section.$field = cli.$section.$field.clone();
                }
            };
        }

        update_if_present!(search.population_size);
        update_if_present!(search.front_runners);
        update_if_present!(search.max_generations);
        update_if_present!(search.seed);
        update_if_present!(search.mode);

        update_if_present!(genetics.crossover_probability);
        update_if_present!(genetics.mutation_probability);
        update_if_present!(genetics.mutation);
        update_if_present!(genetics.alphabet);
        update_if_present!(genetics.custom_alphabet);

        update_if_present!(pool.pool_size);
        update_if_present!(pool.dispatch_timeout_ms);
        update_if_present!(pool.on_worker_lost);
        update_if_present!(pool.max_respawns);
    }

    pub fn validate(&self) -> EvResult<()> {
        if self.search.population_size == 0 {
            return Err(EvolveError::Config("population_size must be positive".into()));
        }
        if self.search.max_generations == Some(0) {
            return Err(EvolveError::Config("max_generations must be positive".into()));
        }
        if self.pool.pool_size == 0 && self.search.mode == ExecutionMode::Pool {
            return Err(EvolveError::Config("pool_size must be positive".into()));
        }
        for (name, p) in [
            ("crossover_probability", self.genetics.crossover_probability),
            ("mutation_probability", self.genetics.mutation_probability),
        ] {
            if !(0.0..=1.0).contains(&p) {
                let reason = format!("{} must lie in [0, 1], got {}", name, p);
                return Err(EvolveError::Config(reason));
            }
        }
        if let Some(custom) = &self.genetics.custom_alphabet {
            if custom.is_empty() {
                return Err(EvolveError::Config("custom_alphabet must not be empty".into()));
            }
        }
        Ok(())
    }
}
