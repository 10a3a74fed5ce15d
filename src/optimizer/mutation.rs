use crate::config::MutationPolicy;
use crate::genome::{Alphabet, Genome};
use fastrand::Rng;

/// Changes exactly one position of `genome` according to `policy`, returning
/// a new genome. Empty genomes are returned unchanged.
pub fn mutate(
    genome: &Genome,
    policy: MutationPolicy,
    alphabet: &Alphabet,
    rng: &mut Rng,
) -> Genome {
    if genome.is_empty() {
        return genome.clone();
    }

    let index = rng.usize(0..genome.len());
    let current = genome.text()[index];

    let replacement = match policy {
        MutationPolicy::Substitute => alphabet.sample(rng),
        MutationPolicy::Nudge => nudge(current, alphabet, rng),
    };

    let mut text = genome.text().to_vec();
    text[index] = replacement;
    genome.with_text(text)
}

/// Neighbouring symbol in alphabet order, wrapping at both ends. A symbol
/// outside the alphabet is resampled.
fn nudge(current: char, alphabet: &Alphabet, rng: &mut Rng) -> char {
    let Some(pos) = alphabet.position(current) else {
        return alphabet.sample(rng);
    };

    let n = alphabet.len();
    let next = if rng.bool() {
        (pos + 1) % n
    } else {
        (pos + n - 1) % n
    };
    alphabet.symbols()[next]
}
