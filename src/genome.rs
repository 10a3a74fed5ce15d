use crate::config::AlphabetPolicy;
use crate::error::{EvResult, EvolveError};
use fastrand::Rng;
use std::fmt;
use std::sync::Arc;

/// Ordered, de-duplicated set of symbols a genome may be built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alphabet {
    symbols: Arc<[char]>,
}

impl Alphabet {
    pub fn new<I: IntoIterator<Item = char>>(symbols: I) -> EvResult<Self> {
        let mut symbols: Vec<char> = symbols.into_iter().collect();
        symbols.sort_unstable();
        symbols.dedup();

        if symbols.is_empty() {
            return Err(EvolveError::Config("Alphabet must not be empty".into()));
        }

        Ok(Self {
            symbols: symbols.into(),
        })
    }

    pub fn from_policy(policy: AlphabetPolicy) -> Self {
        let symbols: Vec<char> = match policy {
            // Newline, carriage return, then space through tilde: 97 symbols.
            AlphabetPolicy::Printable => ['\n', '\r']
                .into_iter()
                .chain((0x20u8..=0x7e).map(char::from))
                .collect(),
            AlphabetPolicy::FullByte => (0u8..=255).map(char::from).collect(),
        };

        Self {
            symbols: symbols.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[char] {
        &self.symbols
    }

    pub fn contains(&self, c: char) -> bool {
        self.position(c).is_some()
    }

    pub fn position(&self, c: char) -> Option<usize> {
        self.symbols.binary_search(&c).ok()
    }

    #[inline(always)]
    pub fn sample(&self, rng: &mut Rng) -> char {
        self.symbols[rng.usize(0..self.symbols.len())]
    }
}

impl Default for Alphabet {
    fn default() -> Self {
        Self::from_policy(AlphabetPolicy::Printable)
    }
}

/// The string every genome in a run is measured against. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    text: Arc<str>,
    chars: Arc<[char]>,
}

impl Target {
    pub fn new(text: &str) -> Self {
        Self {
            text: Arc::from(text),
            chars: text.chars().collect::<Vec<_>>().into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    /// Length in symbols, not bytes.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One candidate string and its Hamming distance to the target.
///
/// Genomes are values: every operator that "changes" one builds a new genome,
/// and fitness is computed once at construction. There is no way to obtain a
/// genome whose fitness disagrees with its text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genome {
    text: Vec<char>,
    target: Target,
    fitness: usize,
}

impl Genome {
    pub(crate) fn new(text: Vec<char>, target: &Target) -> Self {
        debug_assert_eq!(text.len(), target.len(), "Genome length must match target");
        let fitness = hamming(&text, target.chars());
        Self {
            text,
            target: target.clone(),
            fitness,
        }
    }

    /// Builds a genome from external input, rejecting text of the wrong length.
    pub fn from_text(text: &str, target: &Target) -> EvResult<Self> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() != target.len() {
            return Err(EvolveError::InvalidJob(format!(
                "Genome length {} does not match target length {}",
                chars.len(),
                target.len()
            )));
        }
        Ok(Self::new(chars, target))
    }

    pub fn random(target: &Target, alphabet: &Alphabet, rng: &mut Rng) -> Self {
        let text = (0..target.len()).map(|_| alphabet.sample(rng)).collect();
        Self::new(text, target)
    }

    /// Same target, new text. Callers keep the length unchanged.
    pub(crate) fn with_text(&self, text: Vec<char>) -> Self {
        Self::new(text, &self.target)
    }

    pub fn text(&self) -> &[char] {
        &self.text
    }

    pub fn text_string(&self) -> String {
        self.text.iter().collect()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    #[inline(always)]
    pub fn fitness(&self) -> usize {
        self.fitness
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn is_optimal(&self) -> bool {
        self.fitness == 0
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in &self.text {
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

#[inline(always)]
fn hamming(text: &[char], target: &[char]) -> usize {
    text.iter().zip(target).filter(|(a, b)| a != b).count() + text.len().abs_diff(target.len())
}

/// Fitter first. Stable, so ties keep their incoming order.
pub fn sort_by_fitness(population: &mut [Genome]) {
    population.sort_by_key(Genome::fitness);
}
